//! Quantized positions used as map keys for welding coincident vertices

use crate::float_types::Real;
use nalgebra::{Point3, Vector3};

/// Positions are stored as fixed-point integers with this many steps per unit.
pub const POSITION_KEY_FACTOR: Real = 100000.0;

/// A 3D position rounded to a `1 / POSITION_KEY_FACTOR` grid.
///
/// Two positions that land on the same grid cell compare equal, which is how
/// independently generated meshes are welded at shared seams. Ordering is
/// lexicographic on `(x, y, z)` so keys can drive deterministic `BTreeMap`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PositionKey {
    x: i64,
    y: i64,
    z: i64,
}

impl PositionKey {
    #[inline]
    pub fn new(x: Real, y: Real, z: Real) -> Self {
        Self {
            x: quantize(x),
            y: quantize(y),
            z: quantize(z),
        }
    }

    /// The quantized position this key stands for
    pub fn position(&self) -> Point3<Real> {
        Point3::new(
            self.x as Real / POSITION_KEY_FACTOR,
            self.y as Real / POSITION_KEY_FACTOR,
            self.z as Real / POSITION_KEY_FACTOR,
        )
    }
}

#[inline]
fn quantize(value: Real) -> i64 {
    (value * POSITION_KEY_FACTOR).round() as i64
}

impl From<Point3<Real>> for PositionKey {
    fn from(point: Point3<Real>) -> Self {
        Self::new(point.x, point.y, point.z)
    }
}

impl From<&Point3<Real>> for PositionKey {
    fn from(point: &Point3<Real>) -> Self {
        Self::new(point.x, point.y, point.z)
    }
}

impl From<Vector3<Real>> for PositionKey {
    fn from(vector: Vector3<Real>) -> Self {
        Self::new(vector.x, vector.y, vector.z)
    }
}
