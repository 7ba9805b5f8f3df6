//! Cyclic coordinate descent inverse kinematics over a joint chain.
//!
//! [`ccd::CcdIkSolver`] does the numeric work; [`mover::SkeletonIkMover`]
//! wraps it for skeleton nodes identified by UUID and versions each solve so
//! late results can be told apart from current ones.

use crate::float_types::{PI, Real};
use nalgebra::{Unit, UnitQuaternion, Vector3};

pub mod ccd;
pub mod mover;

/// Tunables shared by the solver and the mover
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IkSolverConfig {
    /// Upper bound on CCD sweeps per solve
    pub max_round: usize,
    /// Stop once the end effector is this close to the target
    pub distance_threshold: Real,
    /// Stop once a sweep changes the squared distance by no more than the
    /// square of this value
    pub distance_cease_threshold: Real,
}

impl Default for IkSolverConfig {
    fn default() -> Self {
        Self {
            max_round: 4,
            distance_threshold: 0.01,
            distance_cease_threshold: 0.01,
        }
    }
}

/// Shortest-arc rotation taking the direction of `from` onto the direction of
/// `to`.
///
/// A zero vector gives the identity. Opposite directions give a half turn
/// about an axis orthogonal to `from`.
pub fn rotation_to(from: &Vector3<Real>, to: &Vector3<Real>) -> UnitQuaternion<Real> {
    let (Some(from), Some(to)) = (from.try_normalize(Real::EPSILON), to.try_normalize(Real::EPSILON)) else {
        return UnitQuaternion::identity();
    };
    if let Some(rotation) = UnitQuaternion::rotation_between(&from, &to) {
        return rotation;
    }
    let mut axis = Vector3::x().cross(&from);
    if axis.norm_squared() < 1e-6 {
        axis = Vector3::y().cross(&from);
    }
    UnitQuaternion::from_axis_angle(&Unit::new_normalize(axis), PI)
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rotation_maps_direction() {
        let from = Vector3::new(1.0, 0.0, 0.0);
        let to = Vector3::new(0.0, 3.0, 0.0);
        let rotated = rotation_to(&from, &to) * from;
        assert_relative_eq!(rotated, Vector3::new(0.0, 1.0, 0.0), epsilon = 1e-9);
    }

    #[test]
    fn opposite_directions_half_turn() {
        let from = Vector3::new(0.0, 0.0, 2.0);
        let to = Vector3::new(0.0, 0.0, -1.0);
        let rotated = rotation_to(&from, &to) * Vector3::z();
        assert_relative_eq!(rotated, -Vector3::z(), epsilon = 1e-9);

        let along_x = rotation_to(&Vector3::x(), &-Vector3::x()) * Vector3::x();
        assert_relative_eq!(along_x, -Vector3::x(), epsilon = 1e-9);
    }

    #[test]
    fn zero_vector_is_identity() {
        assert_eq!(rotation_to(&Vector3::zeros(), &Vector3::x()), UnitQuaternion::identity());
    }
}
