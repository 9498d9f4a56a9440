//! Polygon approximation and square-candidate extraction from contours.

use crate::{Contour, DetectorParams};
use nalgebra::{Point2, Vector2};

/// Largest corner shift accepted from line-fit refinement, in pixels.
const MAX_REFINE_SHIFT: f64 = 3.0;

/// A convex quadrilateral candidate, corners clockwise in image space.
#[derive(Clone, Debug, PartialEq)]
pub struct Quad {
    pub corners: [Point2<f64>; 4],
    /// Length of the source contour in pixels.
    pub perimeter: usize,
}

impl Quad {
    pub fn centroid(&self) -> Point2<f64> {
        let sum = self
            .corners
            .iter()
            .fold(Vector2::zeros(), |acc, p| acc + p.coords);
        Point2::from(sum / 4.0)
    }

    pub fn min_side(&self) -> f64 {
        (0..4)
            .map(|i| (self.corners[(i + 1) % 4] - self.corners[i]).norm())
            .fold(f64::INFINITY, f64::min)
    }
}

/// Closed Douglas-Peucker simplification.
///
/// The contour is split at the point farthest from `contour[0]` and both
/// halves are simplified with tolerance `epsilon`. Returns indices into
/// `contour`, in contour order.
pub fn approx_polygon(contour: &[[i32; 2]], epsilon: f64) -> Vec<usize> {
    let n = contour.len();
    if n < 3 {
        return (0..n).collect();
    }

    let pt = |i: usize| {
        let [x, y] = contour[i % n];
        Point2::new(x as f64, y as f64)
    };

    let p0 = pt(0);
    let far = (1..n)
        .max_by(|&a, &b| {
            let da = (pt(a) - p0).norm_squared();
            let db = (pt(b) - p0).norm_squared();
            da.total_cmp(&db)
        })
        .unwrap_or(n / 2);

    let mut keep = vec![false; n];
    keep[0] = true;
    keep[far] = true;

    // Index `n` stands for `0` so the second half closes the loop.
    let mut stack = vec![(0usize, far), (far, n)];
    while let Some((first, last)) = stack.pop() {
        if last <= first + 1 {
            continue;
        }
        let a = pt(first);
        let b = pt(last);
        let mut best = (first, -1.0f64);
        for i in first + 1..last {
            let d = point_line_distance(&pt(i), &a, &b);
            if d > best.1 {
                best = (i, d);
            }
        }
        if best.1 > epsilon {
            keep[best.0] = true;
            stack.push((first, best.0));
            stack.push((best.0, last));
        }
    }

    keep.iter()
        .enumerate()
        .filter_map(|(i, &k)| k.then_some(i))
        .collect()
}

/// Extract convex quadrilaterals passing the size and border limits.
pub fn find_quads(
    contours: &[Contour],
    width: usize,
    height: usize,
    params: &DetectorParams,
) -> Vec<Quad> {
    let max_dim = width.max(height) as f64;
    let min_perimeter = params.min_marker_perimeter_rate as f64 * max_dim;
    let max_perimeter = params.max_marker_perimeter_rate as f64 * max_dim;
    let border = params.min_distance_to_border as f64;

    let mut out = Vec::new();
    for contour in contours {
        let len = contour.points.len();
        if (len as f64) < min_perimeter || (len as f64) > max_perimeter {
            continue;
        }

        let eps = len as f64 * params.polygonal_approx_accuracy_rate as f64;
        let idx = approx_polygon(&contour.points, eps);
        let &[i0, i1, i2, i3] = idx.as_slice() else {
            continue;
        };
        let indices = [i0, i1, i2, i3];
        let mut corners = indices.map(|i| {
            let [x, y] = contour.points[i];
            Point2::new(x as f64, y as f64)
        });

        if !is_convex(&corners) {
            continue;
        }

        let min_dist = len as f64 * params.min_corner_distance_rate as f64;
        let min_side_sq = (0..4)
            .map(|i| (corners[(i + 1) % 4] - corners[i]).norm_squared())
            .fold(f64::INFINITY, f64::min);
        if min_side_sq < min_dist * min_dist {
            continue;
        }

        let inside = corners.iter().all(|p| {
            p.x >= border
                && p.y >= border
                && p.x <= width as f64 - 1.0 - border
                && p.y <= height as f64 - 1.0 - border
        });
        if !inside {
            continue;
        }

        if params.refine_corners {
            corners = refine_corners(&contour.points, &indices, &corners);
        }
        if signed_area(&corners) < 0.0 {
            corners.swap(1, 3);
        }

        out.push(Quad {
            corners,
            perimeter: len,
        });
    }
    out
}

/// Twice the signed area; positive for clockwise order in image space.
pub(crate) fn signed_area(c: &[Point2<f64>; 4]) -> f64 {
    (0..4)
        .map(|i| {
            let a = c[i];
            let b = c[(i + 1) % 4];
            a.x * b.y - b.x * a.y
        })
        .sum()
}

fn is_convex(c: &[Point2<f64>; 4]) -> bool {
    let mut sign = 0.0f64;
    for i in 0..4 {
        let a = c[i];
        let b = c[(i + 1) % 4];
        let d = c[(i + 2) % 4];
        let cross = (b - a).perp(&(d - b));
        if cross.abs() < 1e-9 {
            return false;
        }
        if sign == 0.0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return false;
        }
    }
    true
}

fn point_line_distance(p: &Point2<f64>, a: &Point2<f64>, b: &Point2<f64>) -> f64 {
    let ab = b - a;
    let len = ab.norm();
    if len < 1e-12 {
        return (p - a).norm();
    }
    ab.perp(&(p - a)).abs() / len
}

/// Line `n · p = c` with unit normal `n`.
#[derive(Clone, Copy, Debug)]
struct Line {
    n: Vector2<f64>,
    c: f64,
}

impl Line {
    fn intersect(&self, other: &Line) -> Option<Point2<f64>> {
        let det = self.n.perp(&other.n);
        if det.abs() < 1e-9 {
            return None;
        }
        let x = (self.c * other.n.y - other.c * self.n.y) / det;
        let y = (self.n.x * other.c - other.n.x * self.c) / det;
        Some(Point2::new(x, y))
    }
}

/// Total least squares fit through boundary pixels, pushed half a pixel
/// outward so it lies on the dark/light edge rather than on pixel centres.
fn fit_side(points: &[Point2<f64>], centroid: &Point2<f64>) -> Option<Line> {
    if points.len() < 3 {
        return None;
    }
    let m = points.iter().fold(Vector2::zeros(), |acc, p| acc + p.coords) / points.len() as f64;
    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    for p in points {
        let d = p.coords - m;
        sxx += d.x * d.x;
        sxy += d.x * d.y;
        syy += d.y * d.y;
    }
    let theta = 0.5 * (2.0 * sxy).atan2(sxx - syy);
    let mut n = Vector2::new(-theta.sin(), theta.cos());
    if n.dot(&(centroid.coords - m)) > 0.0 {
        n = -n;
    }
    Some(Line {
        n,
        c: n.dot(&m) + 0.5,
    })
}

fn refine_corners(
    contour: &[[i32; 2]],
    indices: &[usize; 4],
    corners: &[Point2<f64>; 4],
) -> [Point2<f64>; 4] {
    let n = contour.len();
    let centroid = Point2::from(
        corners
            .iter()
            .fold(Vector2::zeros(), |acc, p| acc + p.coords)
            / 4.0,
    );

    let mut lines = [None; 4];
    for (s, line) in lines.iter_mut().enumerate() {
        let from = indices[s];
        let to = indices[(s + 1) % 4];
        let span = (to + n - from) % n;
        // Drop points near the corners where the boundary bends.
        let trim = (span / 8).max(1);
        if span <= 2 * trim {
            return *corners;
        }
        let pts: Vec<Point2<f64>> = (trim..=span - trim)
            .map(|k| {
                let [x, y] = contour[(from + k) % n];
                Point2::new(x as f64, y as f64)
            })
            .collect();
        *line = fit_side(&pts, &centroid);
    }

    let mut refined = *corners;
    for (i, corner) in refined.iter_mut().enumerate() {
        let (Some(prev), Some(next)) = (lines[(i + 3) % 4], lines[i]) else {
            continue;
        };
        if let Some(p) = prev.intersect(&next) {
            if p.x.is_finite() && p.y.is_finite() && (p - *corner).norm() <= MAX_REFINE_SHIFT {
                *corner = p;
            }
        }
    }
    refined
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{label_components, trace_outer_contours, BinaryImage};
    use approx::assert_abs_diff_eq;

    fn rect_contour(x0: i32, y0: i32, x1: i32, y1: i32) -> Vec<[i32; 2]> {
        let mut pts = Vec::new();
        for x in x0..x1 {
            pts.push([x, y0]);
        }
        for y in y0..y1 {
            pts.push([x1, y]);
        }
        for x in (x0 + 1..=x1).rev() {
            pts.push([x, y1]);
        }
        for y in (y0 + 1..=y1).rev() {
            pts.push([x0, y]);
        }
        pts
    }

    #[test]
    fn approx_polygon_finds_rectangle_corners() {
        let pts = rect_contour(10, 10, 40, 30);
        let idx = approx_polygon(&pts, 1.5);
        let corners: Vec<[i32; 2]> = idx.iter().map(|&i| pts[i]).collect();
        assert_eq!(corners.len(), 4);
        for c in [[10, 10], [40, 10], [40, 30], [10, 30]] {
            assert!(corners.contains(&c), "missing corner {c:?}");
        }
    }

    #[test]
    fn find_quads_refines_to_pixel_edges() {
        let mut bin = BinaryImage::new(80, 80);
        for y in 20..50 {
            for x in 15..55 {
                bin.data[y * 80 + x] = 1;
            }
        }
        let map = label_components(&bin);
        let contours = trace_outer_contours(&map, 4, 10_000);
        let quads = find_quads(&contours, 80, 80, &DetectorParams::default());
        assert_eq!(quads.len(), 1);

        let q = &quads[0];
        assert!(signed_area(&q.corners) > 0.0);
        let expected = [(14.5, 19.5), (54.5, 19.5), (54.5, 49.5), (14.5, 49.5)];
        for (c, (ex, ey)) in q.corners.iter().zip(expected) {
            assert_abs_diff_eq!(c.x, ex, epsilon = 1e-6);
            assert_abs_diff_eq!(c.y, ey, epsilon = 1e-6);
        }
    }

    #[test]
    fn rejects_triangles_and_tiny_shapes() {
        let mut bin = BinaryImage::new(60, 60);
        for y in 10..40 {
            for x in 10..=(10 + (y - 10)) {
                bin.data[y * 60 + x] = 1;
            }
        }
        bin.data[50 * 60 + 50] = 1;
        let map = label_components(&bin);
        let contours = trace_outer_contours(&map, 1, 10_000);
        assert!(find_quads(&contours, 60, 60, &DetectorParams::default()).is_empty());
    }

    #[test]
    fn convexity_and_winding() {
        let cw = [
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(10.0, 10.0),
            Point2::new(0.0, 10.0),
        ];
        assert!(is_convex(&cw));
        assert!(signed_area(&cw) > 0.0);

        let dart = [
            Point2::new(0.0, 0.0),
            Point2::new(10.0, 0.0),
            Point2::new(3.0, 3.0),
            Point2::new(0.0, 10.0),
        ];
        assert!(!is_convex(&dart));
    }
}
