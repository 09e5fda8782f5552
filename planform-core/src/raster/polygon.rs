//! Polygon and polyline rasterization.

use super::{CanvasSize, Mask, MaskBuilder, Rect};

/// Canvas-space point, in pixels. Pixel `(x, y)` sits at `[x as f32, y as f32]`.
pub type Point = [f32; 2];

/// Pixels whose centre lies within this distance of a polygon edge are part of the fill.
pub const BOUNDARY_TOLERANCE: f64 = 0.5;

#[derive(Copy, Clone, PartialEq, Debug, thiserror::Error)]
pub enum Degeneracy {
    #[error("need at least 3 points, got {0}")]
    TooFewPoints(usize),
    #[error("polygon has zero area")]
    ZeroArea,
    #[error("non-finite coordinate")]
    NonFinite,
}
#[derive(Copy, Clone, PartialEq, Debug, thiserror::Error)]
pub enum GeometryError {
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(#[from] Degeneracy),
}

fn widen([x, y]: Point) -> [f64; 2] {
    [f64::from(x), f64::from(y)]
}
/// Closed-loop edges, `(previous, current)`, widened to f64.
fn edges(points: &[Point]) -> impl Iterator<Item = ([f64; 2], [f64; 2])> + '_ {
    let last = points.last().copied().map(widen);
    points
        .iter()
        .copied()
        .map(widen)
        .scan(last, |prev, cur| prev.replace(cur).map(|prev| (prev, cur)))
}
fn extent(points: impl Iterator<Item = [f64; 2]>) -> Option<([f64; 2], [f64; 2])> {
    points.fold(None, |acc, [x, y]| match acc {
        None => Some(([x, y], [x, y])),
        Some((min, max)) => Some((
            [min[0].min(x), min[1].min(y)],
            [max[0].max(x), max[1].max(y)],
        )),
    })
}

/// Signed shoelace area. Positive for counter-clockwise winding in a y-up space.
#[must_use]
pub fn polygon_area(points: &[Point]) -> f64 {
    edges(points)
        .map(|(a, b)| a[0] * b[1] - b[0] * a[1])
        .sum::<f64>()
        / 2.0
}

/// Arithmetic mean of the vertices. Only good for pre-filtering, as it can fall outside
/// concave shapes.
#[must_use]
pub fn centroid(points: &[Point]) -> Option<Point> {
    if points.is_empty() {
        return None;
    }
    let [sx, sy] = points
        .iter()
        .copied()
        .map(widen)
        .fold([0.0, 0.0], |[sx, sy], [x, y]| [sx + x, sy + y]);
    let n = points.len() as f64;
    Some([(sx / n) as f32, (sy / n) as f32])
}

/// Pixel bounds of a point list, clamped to the canvas. `None` if empty, non-finite, or
/// entirely off-canvas.
#[must_use]
pub fn bounding_box(points: &[Point], canvas: CanvasSize) -> Option<Rect> {
    if points.iter().flatten().any(|v| !v.is_finite()) {
        return None;
    }
    let (min, max) = extent(points.iter().copied().map(widen))?;
    Rect::from_extent(min, max, canvas)
}

fn distance_to_segment(p: [f64; 2], a: [f64; 2], b: [f64; 2]) -> f64 {
    let ab = [b[0] - a[0], b[1] - a[1]];
    let ap = [p[0] - a[0], p[1] - a[1]];
    let len_sq = ab[0] * ab[0] + ab[1] * ab[1];
    let t = if len_sq > 0.0 {
        ((ap[0] * ab[0] + ap[1] * ab[1]) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let closest = [a[0] + ab[0] * t, a[1] + ab[1] * t];
    (p[0] - closest[0]).hypot(p[1] - closest[1])
}

/// Does a ray cast in +x from `p` cross edge `a -> b`? Half-open in y so shared vertices are
/// counted once.
fn crosses_ray(p: [f64; 2], a: [f64; 2], b: [f64; 2]) -> bool {
    ((a[1] > p[1]) != (b[1] > p[1])) && p[0] < (b[0] - a[0]) * (p[1] - a[1]) / (b[1] - a[1]) + a[0]
}

/// Ray-parity inclusion, where anything within `tolerance` of an edge counts as inside.
#[must_use]
pub fn point_in_polygon(point: Point, points: &[Point], tolerance: f64) -> bool {
    let p = widen(point);
    let mut inside = false;
    for (a, b) in edges(points) {
        if distance_to_segment(p, a, b) <= tolerance {
            return true;
        }
        if crosses_ray(p, a, b) {
            inside = !inside;
        }
    }
    inside && points.len() >= 3
}

fn validate(points: &[Point]) -> Result<(), Degeneracy> {
    if points.len() < 3 {
        return Err(Degeneracy::TooFewPoints(points.len()));
    }
    if points.iter().flatten().any(|v| !v.is_finite()) {
        return Err(Degeneracy::NonFinite);
    }
    if polygon_area(points).abs() < f64::EPSILON {
        return Err(Degeneracy::ZeroArea);
    }
    Ok(())
}

/// Fill a simple closed polygon, boundary included, with the default tolerance.
pub fn rasterize_polygon(canvas: CanvasSize, points: &[Point]) -> Result<Mask, GeometryError> {
    rasterize_polygon_with(canvas, points, BOUNDARY_TOLERANCE)
}

/// Fill a simple closed polygon. Pixels strictly inside by even-odd scanline, plus every pixel
/// within `tolerance` of an edge.
///
/// A polygon entirely off the canvas is valid and yields an empty mask.
pub fn rasterize_polygon_with(
    canvas: CanvasSize,
    points: &[Point],
    tolerance: f64,
) -> Result<Mask, GeometryError> {
    validate(points)?;
    let tolerance = tolerance.max(0.0);
    let Some((min, max)) = extent(points.iter().copied().map(widen)) else {
        return Err(Degeneracy::TooFewPoints(0).into());
    };
    let Some(region) = Rect::from_extent(
        [min[0] - tolerance, min[1] - tolerance],
        [max[0] + tolerance, max[1] + tolerance],
        canvas,
    ) else {
        return Ok(Mask::empty(canvas));
    };
    let mut builder = MaskBuilder::new(canvas, region);

    let mut crossings = Vec::new();
    for y in region.min_y..=region.max_y {
        let py = f64::from(y);
        crossings.clear();
        crossings.extend(
            edges(points)
                .filter(|(a, b)| (a[1] > py) != (b[1] > py))
                .map(|(a, b)| a[0] + (py - a[1]) * (b[0] - a[0]) / (b[1] - a[1])),
        );
        crossings.sort_unstable_by(f64::total_cmp);
        // Spans may reach far past the canvas; only walk the part inside the region.
        let (left, right) = (f64::from(region.min_x), f64::from(region.max_x));
        for span in crossings.chunks_exact(2) {
            let (start, end) = (span[0].ceil().max(left), span[1].floor().min(right));
            if start > end {
                continue;
            }
            for x in start as i64..=end as i64 {
                builder.set(x, i64::from(y));
            }
        }
    }
    for (a, b) in edges(points) {
        stamp_segment(&mut builder, a, b, tolerance);
    }
    Ok(builder.finish())
}

/// Set every pixel of the builder's region within `radius` of segment `a -> b`.
fn stamp_segment(builder: &mut MaskBuilder, a: [f64; 2], b: [f64; 2], radius: f64) {
    let Some(region) = builder.region() else {
        return;
    };
    let Some(bounds) = Rect::from_extent(
        [a[0].min(b[0]) - radius, a[1].min(b[1]) - radius],
        [a[0].max(b[0]) + radius, a[1].max(b[1]) + radius],
        builder.canvas,
    )
    .and_then(|r| r.intersect(&region)) else {
        return;
    };
    for y in bounds.min_y..=bounds.max_y {
        for x in bounds.min_x..=bounds.max_x {
            if distance_to_segment([f64::from(x), f64::from(y)], a, b) <= radius {
                builder.set(i64::from(x), i64::from(y));
            }
        }
    }
}

/// Draw a polyline with a round brush `thickness` pixels wide. Non-finite points are skipped.
/// `closed` joins the last point back to the first.
#[must_use]
pub fn rasterize_polyline(
    canvas: CanvasSize,
    points: &[Point],
    closed: bool,
    thickness: f32,
) -> Mask {
    let points: Vec<[f64; 2]> = points
        .iter()
        .copied()
        .filter(|p| p.iter().all(|v| v.is_finite()))
        .map(widen)
        .collect();
    let radius = f64::from(thickness.max(1.0)) / 2.0;
    let Some((min, max)) = extent(points.iter().copied()) else {
        return Mask::empty(canvas);
    };
    let Some(region) = Rect::from_extent(
        [min[0] - radius, min[1] - radius],
        [max[0] + radius, max[1] + radius],
        canvas,
    ) else {
        return Mask::empty(canvas);
    };
    let mut builder = MaskBuilder::new(canvas, region);
    match points.as_slice() {
        [only] => stamp_segment(&mut builder, *only, *only, radius),
        _ => {
            for pair in points.windows(2) {
                stamp_segment(&mut builder, pair[0], pair[1], radius);
            }
            if closed && points.len() > 2 {
                if let (Some(&first), Some(&last)) = (points.first(), points.last()) {
                    stamp_segment(&mut builder, last, first, radius);
                }
            }
        }
    }
    builder.finish()
}

#[cfg(test)]
mod test {
    use super::*;

    const CANVAS: CanvasSize = CanvasSize {
        width: 100,
        height: 100,
    };
    const SQUARE: [Point; 4] = [[10.0, 10.0], [50.0, 10.0], [50.0, 50.0], [10.0, 50.0]];
    const ELL: [Point; 6] = [
        [10.0, 10.0],
        [60.0, 10.0],
        [60.0, 30.0],
        [30.0, 30.0],
        [30.0, 60.0],
        [10.0, 60.0],
    ];

    #[test]
    fn square_includes_boundary() {
        let mask = rasterize_polygon(CANVAS, &SQUARE).unwrap();
        assert_eq!(mask.pixel_count(), 1681);
        assert_eq!(mask.bounds(), Rect::new(10, 10, 50, 50));
        assert!(mask.contains(10, 10));
        assert!(mask.contains(50, 30));
        assert!(!mask.contains(9, 30));
        assert!(!mask.contains(51, 51));
    }
    #[test]
    fn winding_does_not_matter() {
        let mut reversed = SQUARE;
        reversed.reverse();
        assert_eq!(
            rasterize_polygon(CANVAS, &reversed).unwrap(),
            rasterize_polygon(CANVAS, &SQUARE).unwrap()
        );
    }
    #[test]
    fn concave_notch_left_empty() {
        let mask = rasterize_polygon(CANVAS, &ELL).unwrap();
        assert!(mask.contains(20, 50));
        assert!(mask.contains(55, 20));
        assert!(!mask.contains(45, 45));
        // 51x21 top bar plus 21x30 leg below it.
        assert_eq!(mask.pixel_count(), 51 * 21 + 21 * 30);
    }
    #[test]
    fn degenerate_polygons() {
        assert_eq!(
            rasterize_polygon(CANVAS, &SQUARE[..2]),
            Err(GeometryError::DegenerateGeometry(Degeneracy::TooFewPoints(2)))
        );
        let collinear = [[0.0, 0.0], [10.0, 10.0], [20.0, 20.0]];
        assert_eq!(
            rasterize_polygon(CANVAS, &collinear),
            Err(GeometryError::DegenerateGeometry(Degeneracy::ZeroArea))
        );
        let nan = [[0.0, 0.0], [f32::NAN, 10.0], [20.0, 0.0]];
        assert_eq!(
            rasterize_polygon(CANVAS, &nan),
            Err(GeometryError::DegenerateGeometry(Degeneracy::NonFinite))
        );
    }
    #[test]
    fn partially_off_canvas_is_clamped() {
        let points = [[-10.0, -10.0], [20.0, -10.0], [20.0, 20.0], [-10.0, 20.0]];
        let mask = rasterize_polygon(CANVAS, &points).unwrap();
        assert_eq!(mask.bounds(), Rect::new(0, 0, 20, 20));
        assert_eq!(mask.pixel_count(), 21 * 21);
        assert_eq!(bounding_box(&points, CANVAS), Rect::new(0, 0, 20, 20));

        let gone = [[200.0, 200.0], [220.0, 200.0], [220.0, 220.0]];
        assert!(rasterize_polygon(CANVAS, &gone).unwrap().is_empty());
        assert_eq!(bounding_box(&gone, CANVAS), None);
    }
    #[test]
    fn far_off_canvas_vertices() {
        let points = [[-1e12, 10.0], [50.0, 10.0], [50.0, 50.0], [-1e12, 50.0]];
        let mask = rasterize_polygon(CANVAS, &points).unwrap();
        assert_eq!(mask.bounds(), Rect::new(0, 10, 50, 50));
        assert_eq!(mask.pixel_count(), 51 * 41);

        let wide = [[-1e12, -1e12], [1e12, -1e12], [1e12, 1e12], [-1e12, 1e12]];
        assert_eq!(rasterize_polygon(CANVAS, &wide).unwrap().pixel_count(), 100 * 100);
    }
    #[test]
    fn point_tests() {
        assert!(point_in_polygon([30.0, 30.0], &SQUARE, 0.0));
        assert!(!point_in_polygon([60.0, 30.0], &SQUARE, 0.0));
        // On the edge, inside only thanks to tolerance.
        assert!(point_in_polygon([50.3, 30.0], &SQUARE, 0.5));
        assert!(!point_in_polygon([50.6, 30.0], &SQUARE, 0.5));
        // Centroid of the L lands in its notch.
        let c = centroid(&ELL).unwrap();
        assert!(!point_in_polygon(c, &ELL, BOUNDARY_TOLERANCE));
        assert_eq!(polygon_area(&SQUARE).abs(), 1600.0);
    }
    #[test]
    fn polyline_thickness() {
        let line = rasterize_polyline(CANVAS, &[[10.0, 10.0], [20.0, 10.0]], false, 3.0);
        assert_eq!(line.bounds(), Rect::new(9, 9, 21, 11));
        // 11 x 3 body, plus a 3 pixel cap at each end.
        assert_eq!(line.pixel_count(), 11 * 3 + 2 * 3);
        let dot = rasterize_polyline(CANVAS, &[[5.0, 5.0]], false, 1.0);
        assert_eq!(dot.pixel_count(), 1);
        assert!(rasterize_polyline(CANVAS, &[], true, 3.0).is_empty());
    }
}
