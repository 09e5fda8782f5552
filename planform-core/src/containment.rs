//! # Containment
//!
//! Decides whether an object lies inside a planform. The decision is made on pixel overlap
//! alone; bounding boxes and centroids only ever short-circuit the "clearly disjoint" case.
//!
//! An object is inside iff its category is visible, and its overlap with the planform mask
//! clears the [`ContainmentPolicy`].

use crate::planform::{Planform, PlanformID};
use crate::raster::{Mask, Rect};
use crate::registry::{CategoryID, Element, ElementID, ElementMode, Object, ObjectID, Registry};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use std::borrow::Borrow;

/// Thresholds of the containment predicate. An object is inside if *either* threshold is met.
#[derive(Copy, Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ContainmentPolicy {
    /// Overlap in pixels that is always enough, however large the object.
    pub min_absolute_pixels: u64,
    /// Fraction of the object's pixels that is always enough, however small the object.
    pub min_fraction: f64,
}
impl Default for ContainmentPolicy {
    fn default() -> Self {
        Self {
            min_absolute_pixels: 10,
            min_fraction: 0.01,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, thiserror::Error)]
pub enum PolicyError {
    #[error("minimum absolute overlap must be at least one pixel")]
    ZeroAbsolute,
    #[error("minimum overlap fraction must be in (0, 1], got {0}")]
    Fraction(f64),
}

impl ContainmentPolicy {
    pub fn new(min_absolute_pixels: u64, min_fraction: f64) -> Result<Self, PolicyError> {
        let policy = Self {
            min_absolute_pixels,
            min_fraction,
        };
        policy.validate()?;
        Ok(policy)
    }
    /// Both thresholds must be unreachable with zero overlap.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.min_absolute_pixels == 0 {
            return Err(PolicyError::ZeroAbsolute);
        }
        // Negated to also catch NaN.
        if !(self.min_fraction > 0.0 && self.min_fraction <= 1.0) {
            return Err(PolicyError::Fraction(self.min_fraction));
        }
        Ok(())
    }
    /// The predicate itself.
    #[must_use]
    pub fn admits(&self, overlap_pixels: u64, total_pixels: u64) -> bool {
        if overlap_pixels == 0 || total_pixels == 0 {
            return false;
        }
        overlap_pixels >= self.min_absolute_pixels
            || overlap_fraction(overlap_pixels, total_pixels) >= self.min_fraction
    }
}

fn overlap_fraction(overlap_pixels: u64, total_pixels: u64) -> f64 {
    if total_pixels == 0 {
        0.0
    } else {
        overlap_pixels as f64 / total_pixels as f64
    }
}

/// Outcome of the cheap geometric pre-check.
#[derive(Copy, Clone, Debug, PartialEq, Eq, strum::AsRefStr)]
pub enum Prefilter {
    /// Bounding boxes don't intersect. Conclusive.
    Disjoint,
    /// Boxes intersect and the object's centroid is inside the outline.
    CentroidInside,
    /// Boxes intersect but the centroid is outside, as happens in the notch of a concave
    /// planform. Advisory only.
    CentroidOutside,
}

#[must_use]
pub fn prefilter(object: &Object, planform: &Planform) -> Prefilter {
    let intersects = object
        .bounds()
        .zip(planform.bounds())
        .is_some_and(|(a, b)| a.intersects(&b));
    if !intersects {
        return Prefilter::Disjoint;
    }
    match object.centroid() {
        Some(c) if planform.contains_point(c) => Prefilter::CentroidInside,
        _ => Prefilter::CentroidOutside,
    }
}

fn element_overlap(element: &Element, planform: &Mask) -> u64 {
    element.mask.overlap_count(planform)
}

/// Is `object` inside `planform`? Visibility is read from `registry` every time.
#[must_use]
pub fn is_object_inside(
    object: &Object,
    planform: &Planform,
    policy: &ContainmentPolicy,
    registry: &Registry,
) -> bool {
    if !registry.is_visible(object.category) {
        log::trace!("{} hidden", object.id);
        return false;
    }
    let total = object.total_pixel_count();
    if total == 0 || planform.mask().is_empty() {
        return false;
    }
    if prefilter(object, planform) == Prefilter::Disjoint {
        return false;
    }
    let mut overlap = 0;
    for element in &object.elements {
        overlap += element_overlap(element, planform.mask());
        // Absolute rule already satisfied, no need to look further.
        if overlap >= policy.min_absolute_pixels {
            break;
        }
    }
    let inside = policy.admits(overlap, total);
    log::trace!(
        "{} vs {}: {overlap}/{total} px -> {inside}",
        object.id,
        planform.id()
    );
    inside
}

/// Ids of the `objects` inside `planform`. Runs in parallel.
pub fn evaluate<O>(
    objects: &[O],
    planform: &Planform,
    policy: &ContainmentPolicy,
    registry: &Registry,
) -> hashbrown::HashSet<ObjectID>
where
    O: Borrow<Object> + Sync,
{
    objects
        .par_iter()
        .map(<O as Borrow<Object>>::borrow)
        .filter(|object| is_object_inside(object, planform, policy, registry))
        .map(|object| object.id)
        .collect::<Vec<_>>()
        .into_iter()
        .collect()
}

/// [`evaluate`] over every candidate object of the registry. Objects of other planforms and of
/// annotation categories are never members.
pub fn evaluate_registry(
    registry: &Registry,
    planform: &Planform,
    policy: &ContainmentPolicy,
) -> hashbrown::HashSet<ObjectID> {
    let candidates: Vec<&Object> = registry
        .objects()
        .filter(|object| registry.is_candidate(object))
        .map(|object| &**object)
        .collect();
    evaluate(&candidates, planform, policy, registry)
}

#[derive(Clone, Debug)]
pub struct ElementReport {
    pub element: ElementID,
    pub mode: ElementMode,
    pub total_pixels: u64,
    pub overlap_pixels: u64,
    pub bounds: Option<Rect>,
}
impl ElementReport {
    #[must_use]
    pub fn overlap_fraction(&self) -> f64 {
        overlap_fraction(self.overlap_pixels, self.total_pixels)
    }
}

/// Full breakdown of a containment decision.
#[derive(Clone, Debug)]
pub struct ContainmentReport {
    pub object: ObjectID,
    pub planform: PlanformID,
    pub visible: bool,
    pub total_pixels: u64,
    pub overlap_pixels: u64,
    pub bounds: Option<Rect>,
    pub prefilter: Prefilter,
    pub elements: Vec<ElementReport>,
    pub inside: bool,
}
impl ContainmentReport {
    #[must_use]
    pub fn overlap_fraction(&self) -> f64 {
        overlap_fraction(self.overlap_pixels, self.total_pixels)
    }
}
impl std::fmt::Display for ContainmentReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}: {}/{} px ({:.2}%), {}",
            self.object,
            if self.inside { "inside" } else { "outside" },
            self.overlap_pixels,
            self.total_pixels,
            self.overlap_fraction() * 100.0,
            self.prefilter.as_ref(),
        )?;
        if !self.visible {
            f.write_str(", hidden")?;
        }
        if let Some(bounds) = self.bounds {
            write!(f, ", bounds {bounds}")?;
        }
        Ok(())
    }
}

/// Same decision as [`is_object_inside`], with every element's overlap counted in full.
#[must_use]
pub fn inspect(
    object: &Object,
    planform: &Planform,
    policy: &ContainmentPolicy,
    registry: &Registry,
) -> ContainmentReport {
    let elements: Vec<_> = object
        .elements
        .iter()
        .map(|element| ElementReport {
            element: element.id,
            mode: element.mode,
            total_pixels: element.pixel_count(),
            overlap_pixels: element_overlap(element, planform.mask()),
            bounds: element.mask.bounds(),
        })
        .collect();
    let visible = registry.is_visible(object.category);
    let total_pixels = elements.iter().map(|e| e.total_pixels).sum();
    let overlap_pixels = elements.iter().map(|e| e.overlap_pixels).sum();
    let prefilter = prefilter(object, planform);
    let inside = visible
        && prefilter != Prefilter::Disjoint
        && policy.admits(overlap_pixels, total_pixels);
    ContainmentReport {
        object: object.id,
        planform: planform.id(),
        visible,
        total_pixels,
        overlap_pixels,
        bounds: object.bounds(),
        prefilter,
        elements,
        inside,
    }
}

#[derive(Clone, Debug)]
pub struct ClippedElement {
    pub element: ElementID,
    pub mode: ElementMode,
    pub mask: Mask,
}
/// An object's geometry restricted to a planform.
#[derive(Clone, Debug)]
pub struct ClippedObject {
    pub object: ObjectID,
    pub category: CategoryID,
    /// Elements with at least one pixel inside. Never empty for a member object.
    pub elements: Vec<ClippedElement>,
}
impl ClippedObject {
    #[must_use]
    pub fn pixel_count(&self) -> u64 {
        self.elements.iter().map(|e| e.mask.pixel_count()).sum()
    }
}

/// Intersect every element of `object` with the planform mask, dropping elements that end up
/// empty.
#[must_use]
pub fn clip_to_planform(object: &Object, planform: &Planform) -> ClippedObject {
    let elements = object
        .elements
        .iter()
        .filter_map(|element| {
            let mask = element.mask.intersection(planform.mask());
            (!mask.is_empty()).then_some(ClippedElement {
                element: element.id,
                mode: element.mode,
                mask,
            })
        })
        .collect();
    ClippedObject {
        object: object.id,
        category: object.category,
        elements,
    }
}
