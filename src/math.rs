//! Small vector helpers shared by the mesh pipeline.
//!
//! **Mathematical Foundation**
//! - Triangle normals follow the right-hand rule on `(b - a) × (c - a)`.
//! - 2D projection uses the frame `(axis, normal × axis)` anchored at an
//!   origin, which keeps counter-clockwise 3D winding counter-clockwise in 2D.
//! - Two non-coplanar triangles cross along the line `D = n₁ × n₂`; each
//!   triangle cuts that line in an interval and the overlap of the intervals
//!   is the intersection segment.

use crate::float_types::{Real, tolerance};
use nalgebra::{Point2, Point3, Vector3};

/// Unit normal of triangle `(a, b, c)`, or the zero vector when degenerate.
#[inline]
pub fn triangle_normal(a: &Point3<Real>, b: &Point3<Real>, c: &Point3<Real>) -> Vector3<Real> {
    (b - a)
        .cross(&(c - a))
        .try_normalize(Real::EPSILON)
        .unwrap_or_else(Vector3::zeros)
}

/// Twice the area of triangle `(a, b, c)`.
#[inline]
pub fn triangle_area2(a: &Point3<Real>, b: &Point3<Real>, c: &Point3<Real>) -> Real {
    (b - a).cross(&(c - a)).norm()
}

#[inline]
pub fn triangle_centroid(a: &Point3<Real>, b: &Point3<Real>, c: &Point3<Real>) -> Point3<Real> {
    Point3::from((a.coords + b.coords + c.coords) / 3.0)
}

/// Project `point` into the plane frame `(axis, normal × axis)` centered on `origin`.
#[inline]
pub fn project_to_2d(
    point: &Point3<Real>,
    normal: &Vector3<Real>,
    axis: &Vector3<Real>,
    origin: &Point3<Real>,
) -> Point2<Real> {
    let direction = point - origin;
    let perpendicular = normal.cross(axis);
    Point2::new(direction.dot(axis), direction.dot(&perpendicular))
}

/// Where segment `p0 → p1` crosses the plane through `plane_point` with
/// `plane_normal`. `None` when parallel or when the crossing falls outside
/// the segment.
pub fn intersect_segment_and_plane(
    p0: &Point3<Real>,
    p1: &Point3<Real>,
    plane_point: &Point3<Real>,
    plane_normal: &Vector3<Real>,
) -> Option<Point3<Real>> {
    let u = p1 - p0;
    let w = p0 - plane_point;
    let d = plane_normal.dot(&u);
    let n = -plane_normal.dot(&w);
    if d.abs() <= Real::EPSILON {
        return None;
    }
    let s = n / d;
    if !(0.0..=1.0).contains(&s) {
        return None;
    }
    Some(p0 + u * s)
}

/// Angle between two vectors in radians; `0` if either is zero.
pub fn angle_between(a: &Vector3<Real>, b: &Vector3<Real>) -> Real {
    match (a.try_normalize(Real::EPSILON), b.try_normalize(Real::EPSILON)) {
        (Some(a), Some(b)) => a.dot(&b).clamp(-1.0, 1.0).acos(),
        _ => 0.0,
    }
}

/// Inclusive point-in-triangle test for a point already lying on the
/// triangle plane. Points on an edge or corner count as inside.
pub fn point_in_triangle(
    point: &Point3<Real>,
    triangle: &[Point3<Real>; 3],
    normal: &Vector3<Real>,
) -> bool {
    let eps = tolerance();
    for i in 0..3 {
        let j = (i + 1) % 3;
        let edge = triangle[j] - triangle[i];
        let to_point = point - triangle[i];
        let side = edge.cross(&to_point).dot(normal);
        // Scale by edge length so the test is in distance units.
        if side < -eps * edge.norm().max(1.0) {
            return false;
        }
    }
    true
}

/// Points where the plane with signed `distances` (one per corner) cuts
/// `triangle`. Corners on the plane are reported as-is.
fn plane_cut(triangle: &[Point3<Real>; 3], distances: &[Real; 3], eps: Real) -> Vec<Point3<Real>> {
    let mut points: Vec<Point3<Real>> = Vec::with_capacity(3);
    let mut push = |point: Point3<Real>| {
        if points.iter().all(|existing| (existing - point).norm() > eps) {
            points.push(point);
        }
    };
    for i in 0..3 {
        if distances[i].abs() <= eps {
            push(triangle[i]);
        }
    }
    for i in 0..3 {
        let j = (i + 1) % 3;
        let (di, dj) = (distances[i], distances[j]);
        if (di > eps && dj < -eps) || (di < -eps && dj > eps) {
            let t = di / (di - dj);
            push(triangle[i] + (triangle[j] - triangle[i]) * t);
        }
    }
    points
}

fn signed_distances(
    triangle: &[Point3<Real>; 3],
    plane_point: &Point3<Real>,
    plane_normal: &Vector3<Real>,
) -> [Real; 3] {
    [
        plane_normal.dot(&(triangle[0] - plane_point)),
        plane_normal.dot(&(triangle[1] - plane_point)),
        plane_normal.dot(&(triangle[2] - plane_point)),
    ]
}

fn straddles(distances: &[Real; 3], eps: Real) -> bool {
    let all_above = distances.iter().all(|&d| d > eps);
    let all_below = distances.iter().all(|&d| d < -eps);
    let all_on = distances.iter().all(|&d| d.abs() <= eps);
    !(all_above || all_below || all_on)
}

/// Segment along which triangles `a` and `b` cross.
///
/// Returns `None` when the triangles are separated, coplanar or parallel,
/// degenerate, or only touch at a single point.
pub fn intersect_triangles(
    a: &[Point3<Real>; 3],
    a_normal: &Vector3<Real>,
    b: &[Point3<Real>; 3],
    b_normal: &Vector3<Real>,
) -> Option<(Point3<Real>, Point3<Real>)> {
    let eps = tolerance();
    if a_normal.norm_squared() < 0.5 || b_normal.norm_squared() < 0.5 {
        return None;
    }

    let b_distances = signed_distances(b, &a[0], a_normal);
    if !straddles(&b_distances, eps) {
        return None;
    }
    let a_distances = signed_distances(a, &b[0], b_normal);
    if !straddles(&a_distances, eps) {
        return None;
    }

    let direction = a_normal.cross(b_normal).try_normalize(eps)?;

    let a_cut = plane_cut(a, &a_distances, eps);
    let b_cut = plane_cut(b, &b_distances, eps);
    if a_cut.len() != 2 || b_cut.len() != 2 {
        return None;
    }

    let interval = |cut: &[Point3<Real>]| {
        let t0 = direction.dot(&cut[0].coords);
        let t1 = direction.dot(&cut[1].coords);
        if t0 <= t1 {
            ((t0, cut[0]), (t1, cut[1]))
        } else {
            ((t1, cut[1]), (t0, cut[0]))
        }
    };
    let (a_low, a_high) = interval(&a_cut);
    let (b_low, b_high) = interval(&b_cut);

    let low = if a_low.0 >= b_low.0 { a_low } else { b_low };
    let high = if a_high.0 <= b_high.0 { a_high } else { b_high };
    if high.0 - low.0 <= eps {
        return None;
    }
    Some((low.1, high.1))
}

/// Twice the signed area of the 2D triangle `(a, b, c)`; positive when
/// counter-clockwise.
#[inline]
pub fn signed_area_2d(a: &Point2<Real>, b: &Point2<Real>, c: &Point2<Real>) -> Real {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

/// Distance from `point` to segment `a → b` and the clamped parameter of the
/// closest point along it.
pub fn distance_to_segment_2d(point: &Point2<Real>, a: &Point2<Real>, b: &Point2<Real>) -> (Real, Real) {
    let ab = b - a;
    let length2 = ab.norm_squared();
    if length2 <= Real::EPSILON {
        return ((point - a).norm(), 0.0);
    }
    let t = ((point - a).dot(&ab) / length2).clamp(0.0, 1.0);
    let closest = a + ab * t;
    ((point - closest).norm(), t)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn normal_of_ccw_triangle() {
        let n = triangle_normal(
            &Point3::origin(),
            &Point3::new(1.0, 0.0, 0.0),
            &Point3::new(0.0, 1.0, 0.0),
        );
        assert_eq!(n, Vector3::z());
        let degenerate = triangle_normal(
            &Point3::origin(),
            &Point3::new(1.0, 0.0, 0.0),
            &Point3::new(2.0, 0.0, 0.0),
        );
        assert_eq!(degenerate, Vector3::zeros());
    }

    #[test]
    fn segment_plane_crossing() {
        let hit = intersect_segment_and_plane(
            &Point3::new(0.0, 0.0, -1.0),
            &Point3::new(0.0, 0.0, 3.0),
            &Point3::new(5.0, 5.0, 1.0),
            &Vector3::z(),
        );
        assert_eq!(hit, Some(Point3::new(0.0, 0.0, 1.0)));
        let miss = intersect_segment_and_plane(
            &Point3::new(0.0, 0.0, 2.0),
            &Point3::new(0.0, 0.0, 3.0),
            &Point3::origin(),
            &Vector3::z(),
        );
        assert!(miss.is_none());
    }

    #[test]
    fn crossing_triangles_share_a_segment() {
        let a = [
            Point3::new(-1.0, -1.0, 0.0),
            Point3::new(2.0, -1.0, 0.0),
            Point3::new(-1.0, 2.0, 0.0),
        ];
        let b = [
            Point3::new(0.0, 0.0, -1.0),
            Point3::new(0.5, 0.0, 1.0),
            Point3::new(0.0, 0.5, 1.0),
        ];
        let na = triangle_normal(&a[0], &a[1], &a[2]);
        let nb = triangle_normal(&b[0], &b[1], &b[2]);
        let (p, q) = intersect_triangles(&a, &na, &b, &nb).expect("triangles cross");
        assert!(p.z.abs() < 1e-12 && q.z.abs() < 1e-12);
        assert!(((p - q).norm() - (0.125 as Real).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn coplanar_triangles_do_not_intersect() {
        let a = [Point3::origin(), Point3::new(1.0, 0.0, 0.0), Point3::new(0.0, 1.0, 0.0)];
        let b = [
            Point3::new(0.2, 0.2, 0.0),
            Point3::new(2.0, 0.2, 0.0),
            Point3::new(0.2, 2.0, 0.0),
        ];
        let n = Vector3::z();
        assert!(intersect_triangles(&a, &n, &b, &n).is_none());
    }

    #[test]
    fn projection_keeps_winding() {
        let normal = Vector3::z();
        let axis = Vector3::x();
        let origin = Point3::origin();
        let a = project_to_2d(&Point3::new(0.0, 0.0, 0.0), &normal, &axis, &origin);
        let b = project_to_2d(&Point3::new(1.0, 0.0, 0.0), &normal, &axis, &origin);
        let c = project_to_2d(&Point3::new(0.0, 1.0, 0.0), &normal, &axis, &origin);
        assert!(signed_area_2d(&a, &b, &c) > 0.0);
    }
}
