//! Pixel-space primitives shared by every mask on a page.
//!
//! A pixel `(x, y)` is identified with the point at its integer coordinates. All masks on a
//! page share one [`CanvasSize`], and every set pixel lies within `[0, width) × [0, height)`.

pub mod polygon;

use az::SaturatingAs;
use bitvec::{order::Lsb0, slice::BitSlice, vec::BitVec};

pub use polygon::{
    bounding_box, centroid, point_in_polygon, polygon_area, rasterize_polygon,
    rasterize_polygon_with, rasterize_polyline, Degeneracy, GeometryError, Point,
    BOUNDARY_TOLERANCE,
};

type Bits = BitVec<u8, Lsb0>;
type BitRow = BitSlice<u8, Lsb0>;

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, serde::Serialize, serde::Deserialize)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}
impl CanvasSize {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
    /// The whole canvas as a rect, or `None` for a zero-sized canvas.
    #[must_use]
    pub fn bounds(&self) -> Option<Rect> {
        Rect::new(
            0,
            0,
            self.width.checked_sub(1)?,
            self.height.checked_sub(1)?,
        )
    }
    #[must_use]
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && x < i64::from(self.width) && y < i64::from(self.height)
    }
}

/// Pixel rectangle, inclusive on all sides. Never empty.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct Rect {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}
impl Rect {
    /// `None` if the max corner is before the min corner.
    #[must_use]
    pub fn new(min_x: u32, min_y: u32, max_x: u32, max_y: u32) -> Option<Self> {
        (min_x <= max_x && min_y <= max_y).then_some(Self {
            min_x,
            min_y,
            max_x,
            max_y,
        })
    }
    #[must_use]
    pub fn point(x: u32, y: u32) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        }
    }
    /// Pixel bounds of a floating point extent, grown outward to whole pixels and clamped to
    /// the canvas. `None` if it misses the canvas entirely.
    ///
    /// Extents must be finite.
    #[must_use]
    pub fn from_extent(min: [f64; 2], max: [f64; 2], canvas: CanvasSize) -> Option<Self> {
        let canvas_rect = canvas.bounds()?;
        let lo = |v: f64| v.floor().saturating_as::<i64>();
        let hi = |v: f64| v.ceil().saturating_as::<i64>();
        let (min_x, min_y, max_x, max_y) = (lo(min[0]), lo(min[1]), hi(max[0]), hi(max[1]));
        if max_x < 0 || max_y < 0 || min_x > max_x || min_y > max_y {
            return None;
        }
        let clamp_x = |v: i64| v.clamp(0, i64::from(canvas_rect.max_x)).saturating_as::<u32>();
        let clamp_y = |v: i64| v.clamp(0, i64::from(canvas_rect.max_y)).saturating_as::<u32>();
        if min_x > i64::from(canvas_rect.max_x) || min_y > i64::from(canvas_rect.max_y) {
            return None;
        }
        Rect::new(clamp_x(min_x), clamp_y(min_y), clamp_x(max_x), clamp_y(max_y))
    }
    #[must_use]
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }
    #[must_use]
    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }
    #[must_use]
    pub fn area(&self) -> u64 {
        u64::from(self.width()) * u64::from(self.height())
    }
    #[must_use]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        (self.min_x..=self.max_x).contains(&x) && (self.min_y..=self.max_y).contains(&y)
    }
    #[must_use]
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        Rect::new(
            self.min_x.max(other.min_x),
            self.min_y.max(other.min_y),
            self.max_x.min(other.max_x),
            self.max_y.min(other.max_y),
        )
    }
    #[must_use]
    pub fn intersects(&self, other: &Rect) -> bool {
        self.intersect(other).is_some()
    }
    #[must_use]
    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }
    /// The part of this rect on the canvas.
    #[must_use]
    pub fn clamp_to(&self, canvas: CanvasSize) -> Option<Rect> {
        self.intersect(&canvas.bounds()?)
    }
    #[must_use]
    pub fn as_tuple(&self) -> (u32, u32, u32, u32) {
        (self.min_x, self.min_y, self.max_x, self.max_y)
    }
    /// Offset of `(x, y)` into a row-major raster covering this rect.
    fn index_of(&self, x: u32, y: u32) -> usize {
        (y - self.min_y) as usize * self.width() as usize + (x - self.min_x) as usize
    }
}
impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {})..=({}, {})",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}

/// A set of canvas pixels.
///
/// Stored as a bit raster over the tight bounding box of the set, so small shapes on huge
/// canvases stay small. Masks are never mutated once built; use a [`MaskBuilder`].
#[derive(Clone, PartialEq, Eq)]
pub struct Mask {
    canvas: CanvasSize,
    /// Tight bounds of the set pixels. `None` iff empty.
    bounds: Option<Rect>,
    /// Row-major over `bounds`.
    bits: Bits,
}
impl std::fmt::Debug for Mask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mask")
            .field("canvas", &self.canvas)
            .field("bounds", &self.bounds)
            .field("pixels", &self.pixel_count())
            .finish()
    }
}
impl Mask {
    #[must_use]
    pub fn empty(canvas: CanvasSize) -> Self {
        Self {
            canvas,
            bounds: None,
            bits: Bits::new(),
        }
    }
    /// Collect a mask from pixel coordinates. Coordinates off the canvas are dropped,
    /// duplicates are merged.
    pub fn from_pixels(canvas: CanvasSize, pixels: impl IntoIterator<Item = (i64, i64)>) -> Self {
        let pixels: Vec<(u32, u32)> = pixels
            .into_iter()
            .filter(|&(x, y)| canvas.contains(x, y))
            .map(|(x, y)| (x.saturating_as(), y.saturating_as()))
            .collect();
        let Some(bounds) = pixels
            .iter()
            .map(|&(x, y)| Rect::point(x, y))
            .reduce(|a, b| a.union(&b))
        else {
            return Self::empty(canvas);
        };
        let mut bits = Bits::repeat(false, bounds.area() as usize);
        for (x, y) in pixels {
            bits.set(bounds.index_of(x, y), true);
        }
        Self {
            canvas,
            bounds: Some(bounds),
            bits,
        }
    }
    #[must_use]
    pub fn canvas(&self) -> CanvasSize {
        self.canvas
    }
    /// Tight bounding box of the set pixels, `None` if the mask is empty.
    #[must_use]
    pub fn bounds(&self) -> Option<Rect> {
        self.bounds
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bounds.is_none()
    }
    #[must_use]
    pub fn pixel_count(&self) -> u64 {
        self.bits.count_ones() as u64
    }
    #[must_use]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        match self.bounds {
            Some(bounds) if bounds.contains(x, y) => self.bits[bounds.index_of(x, y)],
            _ => false,
        }
    }
    /// Iterate set pixels in row-major order.
    pub fn iter_pixels(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let width = self.bounds.map_or(1, |b| b.width() as usize);
        let (min_x, min_y) = self.bounds.map_or((0, 0), |b| (b.min_x, b.min_y));
        self.bits.iter_ones().map(move |idx| {
            (
                min_x + (idx % width) as u32,
                min_y + (idx / width) as u32,
            )
        })
    }
    /// Region of interest for comparing two masks: the intersection of their bounds.
    #[must_use]
    pub fn roi(&self, other: &Mask) -> Option<Rect> {
        self.bounds?.intersect(&other.bounds?)
    }
    /// `|self ∩ other|`.
    #[must_use]
    pub fn overlap_count(&self, other: &Mask) -> u64 {
        self.roi(other)
            .map_or(0, |roi| overlap_pixel_count(self, other, roi))
    }
    /// The pixel set `self ∩ other`.
    ///
    /// Walks exactly the rows [`overlap_pixel_count`] walks, so
    /// `a.intersection(b).pixel_count() == a.overlap_count(b)` always holds.
    #[must_use]
    pub fn intersection(&self, other: &Mask) -> Mask {
        let Some(roi) = self.roi(other) else {
            return Mask::empty(self.canvas);
        };
        let mut builder = MaskBuilder::new(self.canvas, roi);
        for_each_shared_row(self, other, roi, |y, min_x, a, b| {
            for offs in a.iter_ones().filter(|&i| b[i]) {
                builder.set(i64::from(min_x) + offs as i64, i64::from(y));
            }
        });
        builder.finish()
    }
    /// Pack the raster, one bit per pixel of [`Self::bounds`], row-major, least significant
    /// bit first. Trailing bits of the last byte are zero.
    #[must_use]
    pub fn to_packed_bytes(&self) -> Vec<u8> {
        self.bits
            .chunks(8)
            .map(|chunk| {
                chunk
                    .iter()
                    .by_vals()
                    .enumerate()
                    .fold(0u8, |byte, (bit, set)| byte | (u8::from(set) << bit))
            })
            .collect()
    }
    /// Inverse of [`Self::to_packed_bytes`]. `None` if the bounds lie off the canvas or the
    /// byte count doesn't match the bounds.
    ///
    /// The result is re-tightened, so a raster with slack around it still yields a valid mask.
    #[must_use]
    pub fn from_packed(canvas: CanvasSize, bounds: Option<Rect>, bytes: &[u8]) -> Option<Mask> {
        let Some(bounds) = bounds else {
            return bytes.is_empty().then(|| Mask::empty(canvas));
        };
        if bounds.clamp_to(canvas) != Some(bounds) {
            return None;
        }
        let len = usize::try_from(bounds.area()).ok()?;
        if bytes.len() != len.div_ceil(8) {
            return None;
        }
        let mut bits = Bits::from_vec(bytes.to_vec());
        bits.truncate(len);
        Some(tighten(canvas, bounds, bits))
    }
}

/// Count `|a ∩ b|` within `roi`. Pixels outside `roi` are not considered, even if both masks
/// contain them.
#[must_use]
pub fn overlap_pixel_count(a: &Mask, b: &Mask, roi: Rect) -> u64 {
    let mut count = 0u64;
    for_each_shared_row(a, b, roi, |_, _, ra, rb| {
        count += ra.iter_ones().filter(|&i| rb[i]).count() as u64;
    });
    count
}

/// Visit each row of `roi` covered by both masks, handing out equal-length row slices that
/// start at the same canvas x.
fn for_each_shared_row(
    a: &Mask,
    b: &Mask,
    roi: Rect,
    mut f: impl FnMut(u32, u32, &BitRow, &BitRow),
) {
    let (Some(a_bounds), Some(b_bounds)) = (a.bounds, b.bounds) else {
        return;
    };
    let Some(shared) = roi
        .intersect(&a_bounds)
        .and_then(|r| r.intersect(&b_bounds))
    else {
        return;
    };
    for y in shared.min_y..=shared.max_y {
        let ra = row_of(&a.bits, a_bounds, y, shared.min_x, shared.max_x);
        let rb = row_of(&b.bits, b_bounds, y, shared.min_x, shared.max_x);
        f(y, shared.min_x, ra, rb);
    }
}

/// Slice of row `y` spanning `min_x..=max_x`. All must lie within `bounds`.
fn row_of(bits: &BitRow, bounds: Rect, y: u32, min_x: u32, max_x: u32) -> &BitRow {
    let start = bounds.index_of(min_x, y);
    let end = bounds.index_of(max_x, y) + 1;
    &bits[start..end]
}

/// Shrink `bits`, a raster over `region`, to the tight bounds of its set pixels.
fn tighten(canvas: CanvasSize, region: Rect, bits: Bits) -> Mask {
    let width = region.width() as usize;
    let mut tight: Option<Rect> = None;
    for (row_idx, row) in bits.chunks(width).enumerate() {
        let (Some(first), Some(last)) = (row.first_one(), row.last_one()) else {
            continue;
        };
        let y = region.min_y + row_idx as u32;
        let row_rect = Rect {
            min_x: region.min_x + first as u32,
            min_y: y,
            max_x: region.min_x + last as u32,
            max_y: y,
        };
        tight = Some(tight.map_or(row_rect, |t| t.union(&row_rect)));
    }
    let Some(tight) = tight else {
        return Mask::empty(canvas);
    };
    if tight == region {
        return Mask {
            canvas,
            bounds: Some(tight),
            bits,
        };
    }
    let mut packed = Bits::with_capacity(tight.area() as usize);
    for y in tight.min_y..=tight.max_y {
        packed.extend_from_bitslice(row_of(&bits, region, y, tight.min_x, tight.max_x));
    }
    Mask {
        canvas,
        bounds: Some(tight),
        bits: packed,
    }
}

/// Accumulates pixels within a fixed region, then produces a tight [`Mask`].
pub struct MaskBuilder {
    canvas: CanvasSize,
    /// `None` when the requested region missed the canvas. Every `set` is then a no-op.
    region: Option<Rect>,
    bits: Bits,
}
impl MaskBuilder {
    /// Start a mask whose pixels will all lie within `region`. The region is clamped to the
    /// canvas.
    #[must_use]
    pub fn new(canvas: CanvasSize, region: Rect) -> Self {
        let region = region.clamp_to(canvas);
        let len = region.map_or(0, |r| r.area() as usize);
        Self {
            canvas,
            region,
            bits: Bits::repeat(false, len),
        }
    }
    #[must_use]
    pub fn region(&self) -> Option<Rect> {
        self.region
    }
    /// Mark a pixel. Pixels outside the region are ignored.
    pub fn set(&mut self, x: i64, y: i64) {
        let Some(region) = self.region else {
            return;
        };
        let (Ok(x), Ok(y)) = (u32::try_from(x), u32::try_from(y)) else {
            return;
        };
        if region.contains(x, y) {
            self.bits.set(region.index_of(x, y), true);
        }
    }
    #[must_use]
    pub fn finish(self) -> Mask {
        match self.region {
            Some(region) => tighten(self.canvas, region, self.bits),
            None => Mask::empty(self.canvas),
        }
    }
}
