use crate::float_types::Real;
use nalgebra::{Point3, Vector3};

/// Axis-aligned bounding box that also accumulates the running sum of the
/// points fed to it, so the mean of those points can serve as a split center.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub mins: Point3<Real>,
    pub maxs: Point3<Real>,
    sum: Vector3<Real>,
    count: usize,
    center: Point3<Real>,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    /// A box containing nothing. Every bound is inverted so the first
    /// `update` snaps both corners to that point.
    pub fn empty() -> Self {
        Self {
            mins: Point3::new(Real::MAX, Real::MAX, Real::MAX),
            maxs: Point3::new(-Real::MAX, -Real::MAX, -Real::MAX),
            sum: Vector3::new(0.0, 0.0, 0.0),
            count: 0,
            center: Point3::new(0.0, 0.0, 0.0),
        }
    }

    /// Build a box from explicit corners. The corners count as two samples
    /// for the purpose of the center.
    pub fn new(mins: Point3<Real>, maxs: Point3<Real>) -> Self {
        let mut aabb = Self::empty();
        aabb.update(&mins);
        aabb.update(&maxs);
        aabb.update_center();
        aabb
    }

    pub fn from_points<'a, I>(points: I) -> Self
    where
        I: IntoIterator<Item = &'a Point3<Real>>,
    {
        let mut aabb = Self::empty();
        for point in points {
            aabb.update(point);
        }
        aabb.update_center();
        aabb
    }

    /// Grow the box to include `point`.
    #[inline]
    pub fn update(&mut self, point: &Point3<Real>) {
        self.mins = self.mins.inf(point);
        self.maxs = self.maxs.sup(point);
        self.sum += point.coords;
        self.count += 1;
    }

    /// Recompute the center as the mean of every point added so far.
    pub fn update_center(&mut self) {
        if self.count == 0 {
            return;
        }
        self.center = Point3::from(self.sum / self.count as Real);
    }

    /// Only meaningful after [`Aabb::update_center`].
    #[inline]
    pub const fn center(&self) -> &Point3<Real> {
        &self.center
    }

    #[inline]
    pub const fn lower_bound(&self) -> &Point3<Real> {
        &self.mins
    }

    #[inline]
    pub const fn upper_bound(&self) -> &Point3<Real> {
        &self.maxs
    }

    #[inline]
    pub const fn count(&self) -> usize {
        self.count
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    #[inline]
    pub fn intersects(&self, other: &Self) -> bool {
        self.maxs.x >= other.mins.x
            && self.mins.x <= other.maxs.x
            && self.maxs.y >= other.mins.y
            && self.mins.y <= other.maxs.y
            && self.maxs.z >= other.mins.z
            && self.mins.z <= other.maxs.z
    }

    #[inline]
    pub fn contains_point(&self, point: &Point3<Real>) -> bool {
        point.x >= self.mins.x
            && point.x <= self.maxs.x
            && point.y >= self.mins.y
            && point.y <= self.maxs.y
            && point.z >= self.mins.z
            && point.z <= self.maxs.z
    }

    /// Union of bounds. Running sums are merged too, so the center of the
    /// result is the mean over both sample sets once recomputed.
    pub fn merge(&mut self, other: &Self) {
        if other.is_empty() {
            return;
        }
        self.mins = self.mins.inf(&other.mins);
        self.maxs = self.maxs.sup(&other.maxs);
        self.sum += other.sum;
        self.count += other.count;
    }

    pub fn extents(&self) -> Vector3<Real> {
        if self.is_empty() {
            return Vector3::zeros();
        }
        self.maxs - self.mins
    }

    pub fn diagonal_length(&self) -> Real {
        self.extents().norm()
    }

    /// Index (0, 1, 2) of the axis with the largest extent. Ties favor the
    /// lower axis.
    pub fn longest_axis(&self) -> usize {
        let extents = self.extents();
        let mut axis = 0;
        for candidate in 1..3 {
            if extents[candidate] > extents[axis] {
                axis = candidate;
            }
        }
        axis
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_box_intersects_nothing() {
        let empty = Aabb::empty();
        let unit = Aabb::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        assert!(!empty.intersects(&unit));
        assert!(!unit.intersects(&empty));
    }

    #[test]
    fn center_is_mean_of_points() {
        let points = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(3.0, 0.0, 0.0),
            Point3::new(0.0, 6.0, 0.0),
        ];
        let aabb = Aabb::from_points(points.iter());
        assert_eq!(*aabb.center(), Point3::new(1.0, 2.0, 0.0));
        assert_eq!(*aabb.upper_bound(), Point3::new(3.0, 6.0, 0.0));
        assert_eq!(aabb.longest_axis(), 1);
    }

    #[test]
    fn touching_boxes_intersect() {
        let a = Aabb::new(Point3::origin(), Point3::new(1.0, 1.0, 1.0));
        let b = Aabb::new(Point3::new(1.0, 0.0, 0.0), Point3::new(2.0, 1.0, 1.0));
        assert!(a.intersects(&b));
    }
}
