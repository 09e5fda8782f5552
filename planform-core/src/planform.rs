use crate::raster::{self, CanvasSize, GeometryError, Mask, Point, Rect};
use std::sync::Arc;

pub type PlanformID = crate::id::StableID<Planform>;

/// A user-drawn boundary region. The polyline is fixed at creation; editing the outline means
/// creating a new planform.
#[derive(Clone, Debug)]
pub struct Planform {
    id: PlanformID,
    points: Arc<[Point]>,
    /// Canonical mask. Once loaded from disk this is trusted verbatim and never regenerated.
    mask: Arc<Mask>,
    /// Edge tolerance the mask was rasterized with.
    tolerance: f64,
}
impl Planform {
    /// Rasterize a new planform.
    pub fn new(canvas: CanvasSize, points: &[Point]) -> Result<Self, GeometryError> {
        Self::with_tolerance(canvas, points, raster::BOUNDARY_TOLERANCE)
    }
    pub fn with_tolerance(
        canvas: CanvasSize,
        points: &[Point],
        tolerance: f64,
    ) -> Result<Self, GeometryError> {
        let mask = raster::rasterize_polygon_with(canvas, points, tolerance)?;
        Ok(Self {
            id: PlanformID::default(),
            points: points.into(),
            mask: Arc::new(mask),
            tolerance,
        })
    }
    /// Reassemble from stored parts without re-rasterizing.
    #[must_use]
    pub fn from_parts(
        id: PlanformID,
        points: Arc<[Point]>,
        mask: Arc<Mask>,
        tolerance: f64,
    ) -> Self {
        Self {
            id,
            points,
            mask,
            tolerance,
        }
    }
    #[must_use]
    pub fn id(&self) -> PlanformID {
        self.id
    }
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.points
    }
    #[must_use]
    pub fn mask(&self) -> &Arc<Mask> {
        &self.mask
    }
    #[must_use]
    pub fn canvas(&self) -> CanvasSize {
        self.mask.canvas()
    }
    /// Bounds of the mask, which is what containment is decided against.
    #[must_use]
    pub fn bounds(&self) -> Option<Rect> {
        self.mask.bounds()
    }
    #[must_use]
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }
    /// Boundary-inclusive point test against the outline, using the same tolerance as the mask.
    #[must_use]
    pub fn contains_point(&self, point: Point) -> bool {
        raster::point_in_polygon(point, &self.points, self.tolerance)
    }
}
