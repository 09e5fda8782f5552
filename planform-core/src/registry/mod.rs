//! # Registry
//!
//! Read model of the editor's objects and categories. The editor is the sole writer, through
//! [`SharedRegistry::write_with`]; the containment engine only ever reads, usually from a
//! [fork](SharedRegistry::fork) tagged with the world version it reflects.

pub mod writer;

use crate::config::EngineConfig;
use crate::raster::{self, CanvasSize, GeometryError, Mask, Point, Rect};
use crate::world::{WorldClock, WorldVersion};
use std::sync::Arc;

pub type CategoryID = crate::id::StableID<Category>;
pub type ObjectID = crate::id::StableID<Object>;
pub type ElementID = crate::id::StableID<Element>;

#[derive(
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    Debug,
    strum::AsRefStr,
    strum::EnumIter,
    strum::FromRepr,
    serde::Serialize,
    serde::Deserialize,
)]
#[repr(u8)]
pub enum CategoryKind {
    /// Drawing components. The only kind that can be inside a planform.
    Component = 0,
    /// Other planforms.
    Planform = 1,
    /// Text, hatching, marks.
    Annotation = 2,
}

#[derive(Clone, Debug)]
pub struct Category {
    pub id: CategoryID,
    pub name: String,
    pub visible: bool,
    pub kind: CategoryKind,
}
impl Category {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: CategoryKind) -> Self {
        Self {
            id: CategoryID::default(),
            name: name.into(),
            visible: true,
            kind,
        }
    }
}

#[derive(
    Copy, Clone, PartialEq, Eq, Hash, Debug, strum::AsRefStr, strum::EnumIter, strum::FromRepr,
)]
#[repr(u8)]
pub enum ElementMode {
    /// Filled polygon region.
    Filled = 0,
    /// Closed outline stroke.
    Polyline = 1,
    /// Open freehand stroke.
    Freeform = 2,
    /// Open straight segments.
    Line = 3,
}

#[derive(Clone, Debug)]
pub struct Element {
    pub id: ElementID,
    pub category: CategoryID,
    pub mode: ElementMode,
    pub points: Arc<[Point]>,
    pub mask: Arc<Mask>,
}
impl Element {
    /// Build an element, rasterizing its mask from `points` according to `mode`.
    /// Stroke modes draw with a round brush `stroke_thickness` pixels wide.
    pub fn from_points(
        category: CategoryID,
        mode: ElementMode,
        canvas: CanvasSize,
        points: &[Point],
        stroke_thickness: f32,
    ) -> Result<Self, GeometryError> {
        let mask = rasterize(
            mode,
            canvas,
            points,
            raster::BOUNDARY_TOLERANCE,
            stroke_thickness,
        )?;
        Ok(Self::with_mask(category, mode, points.into(), mask))
    }
    /// Like [`Element::from_points`], with fill tolerance and stroke width taken from `config`.
    pub fn with_config(
        category: CategoryID,
        mode: ElementMode,
        canvas: CanvasSize,
        points: &[Point],
        config: &EngineConfig,
    ) -> Result<Self, GeometryError> {
        let mask = rasterize(
            mode,
            canvas,
            points,
            config.boundary_tolerance,
            config.stroke_thickness,
        )?;
        Ok(Self::with_mask(category, mode, points.into(), mask))
    }
    /// Use a pre-rasterized mask as-is.
    #[must_use]
    pub fn with_mask(
        category: CategoryID,
        mode: ElementMode,
        points: Arc<[Point]>,
        mask: Mask,
    ) -> Self {
        Self {
            id: ElementID::default(),
            category,
            mode,
            points,
            mask: Arc::new(mask),
        }
    }
    #[must_use]
    pub fn pixel_count(&self) -> u64 {
        self.mask.pixel_count()
    }
}

fn rasterize(
    mode: ElementMode,
    canvas: CanvasSize,
    points: &[Point],
    tolerance: f64,
    stroke_thickness: f32,
) -> Result<Mask, GeometryError> {
    Ok(match mode {
        ElementMode::Filled => raster::rasterize_polygon_with(canvas, points, tolerance)?,
        ElementMode::Polyline => raster::rasterize_polyline(canvas, points, true, stroke_thickness),
        ElementMode::Freeform | ElementMode::Line => {
            raster::rasterize_polyline(canvas, points, false, stroke_thickness)
        }
    })
}

/// One semantic entity made of one or more elements.
#[derive(Clone, Debug)]
pub struct Object {
    pub id: ObjectID,
    pub category: CategoryID,
    // Optimize for exactly one element (the most common case)
    pub elements: smallvec::SmallVec<[Element; 1]>,
}
impl Object {
    #[must_use]
    pub fn new(category: CategoryID, elements: impl IntoIterator<Item = Element>) -> Self {
        Self {
            id: ObjectID::default(),
            category,
            elements: elements.into_iter().collect(),
        }
    }
    /// Sum of element pixel counts. Pixels shared by two elements are counted twice.
    #[must_use]
    pub fn total_pixel_count(&self) -> u64 {
        self.elements.iter().map(Element::pixel_count).sum()
    }
    /// Union of the element mask bounds.
    #[must_use]
    pub fn bounds(&self) -> Option<Rect> {
        self.elements
            .iter()
            .filter_map(|element| element.mask.bounds())
            .reduce(|a, b| a.union(&b))
    }
    /// Mean of every element vertex. Elements without points (pure rasters) fall back to
    /// the centre of the bounds.
    #[must_use]
    pub fn centroid(&self) -> Option<Point> {
        let vertices: Vec<Point> = self
            .elements
            .iter()
            .flat_map(|element| element.points.iter().copied())
            .collect();
        raster::centroid(&vertices).or_else(|| {
            let b = self.bounds()?;
            Some([
                (b.min_x as f32 + b.max_x as f32) / 2.0,
                (b.min_y as f32 + b.max_y as f32) / 2.0,
            ])
        })
    }
}

/// Id-indexed categories and objects of one page.
#[derive(Clone, Default, Debug)]
pub struct Registry {
    pub(crate) categories: hashbrown::HashMap<CategoryID, Category>,
    pub(crate) objects: hashbrown::HashMap<ObjectID, Arc<Object>>,
}
impl Registry {
    #[must_use]
    pub fn category(&self, id: CategoryID) -> Option<&Category> {
        self.categories.get(&id)
    }
    pub fn categories(&self) -> impl Iterator<Item = &Category> + '_ {
        self.categories.values()
    }
    #[must_use]
    pub fn object(&self, id: ObjectID) -> Option<&Arc<Object>> {
        self.objects.get(&id)
    }
    pub fn objects(&self) -> impl Iterator<Item = &Arc<Object>> + '_ {
        self.objects.values()
    }
    #[must_use]
    pub fn contains_object(&self, id: ObjectID) -> bool {
        self.objects.contains_key(&id)
    }
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }
    /// Missing categories count as hidden.
    #[must_use]
    pub fn is_visible(&self, category: CategoryID) -> bool {
        self.category(category).is_some_and(|c| c.visible)
    }
    /// Whether the object is of a kind that may be inside a planform at all.
    /// Says nothing about visibility.
    #[must_use]
    pub fn is_candidate(&self, object: &Object) -> bool {
        self.category(object.category)
            .is_some_and(|c| c.kind == CategoryKind::Component)
    }
}

/// The registry shared between the editor and the engine, with its world clock.
#[derive(Clone, Default)]
pub struct SharedRegistry {
    registry: Arc<parking_lot::RwLock<Registry>>,
    clock: Arc<WorldClock>,
}
impl SharedRegistry {
    #[must_use]
    pub fn new(registry: Registry) -> Self {
        Self {
            registry: Arc::new(parking_lot::RwLock::new(registry)),
            clock: Arc::default(),
        }
    }
    /// Current world version.
    #[must_use]
    pub fn version(&self) -> WorldVersion {
        self.clock.current()
    }
    /// Borrow the live registry. Holding this blocks the editor.
    pub fn read(&self) -> parking_lot::RwLockReadGuard<'_, Registry> {
        self.registry.read()
    }
    /// A private copy of the registry and the version it reflects, as one consistent pair.
    #[must_use]
    pub fn fork(&self) -> (Registry, WorldVersion) {
        let lock = self.registry.read();
        // Versions only advance under the write lock, so this can't tear.
        (lock.clone(), self.clock.current())
    }
    /// Advance the world version without changing anything, for mutations the registry
    /// doesn't model.
    pub fn bump(&self) -> WorldVersion {
        let _lock = self.registry.write();
        self.clock.bump()
    }
    /// Mutate the registry. If anything changed, the world version is bumped exactly once
    /// when the writer is dropped.
    pub fn write_with<T>(&self, f: impl FnOnce(&mut writer::RegistryWriter<'_>) -> T) -> T {
        let mut writer = writer::RegistryWriter {
            lock: self.registry.write(),
            clock: &self.clock,
            mutations: smallvec::SmallVec::new(),
        };
        f(&mut writer)
    }
}
