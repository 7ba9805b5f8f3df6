use crate::float_types::{Real, to_degrees, to_radians};
use crate::ik::{IkSolverConfig, rotation_to};
use log::{trace, warn};
use nalgebra::{Point3, UnitQuaternion, Vector3};

/// One joint of the chain
#[derive(Debug, Clone, PartialEq)]
pub struct CcdIkNode {
    pub position: Point3<Real>,
    /// Hinge axis; zero for a free joint
    pub axis: Vector3<Real>,
    pub min_limit_degrees: Real,
    pub max_limit_degrees: Real,
}

impl CcdIkNode {
    pub fn new(position: Point3<Real>) -> Self {
        Self {
            position,
            axis: Vector3::zeros(),
            min_limit_degrees: 0.0,
            max_limit_degrees: 0.0,
        }
    }

    #[inline]
    pub fn has_hinge(&self) -> bool {
        self.axis != Vector3::zeros()
    }
}

/// Cyclic coordinate descent solver.
///
/// Nodes form a chain from the root (index 0) to the end effector (last).
/// Every sweep walks the joints from the one before the end effector back to
/// the solve-from index and turns the rest of the chain so the end effector
/// points at the target.
#[derive(Debug, Clone)]
pub struct CcdIkSolver {
    nodes: Vec<CcdIkNode>,
    destination: Point3<Real>,
    from_node_index: usize,
    max_round: usize,
    distance_threshold2: Real,
    distance_cease_threshold2: Real,
}

impl Default for CcdIkSolver {
    fn default() -> Self {
        Self::with_config(&IkSolverConfig::default())
    }
}

impl CcdIkSolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: &IkSolverConfig) -> Self {
        Self {
            nodes: Vec::new(),
            destination: Point3::origin(),
            from_node_index: 0,
            max_round: config.max_round,
            distance_threshold2: config.distance_threshold * config.distance_threshold,
            distance_cease_threshold2: config.distance_cease_threshold * config.distance_cease_threshold,
        }
    }

    pub fn set_max_round(&mut self, max_round: usize) {
        self.max_round = max_round;
    }

    pub fn set_distance_threshold(&mut self, threshold: Real) {
        self.distance_threshold2 = threshold * threshold;
    }

    pub fn set_distance_cease_threshold(&mut self, threshold: Real) {
        self.distance_cease_threshold2 = threshold * threshold;
    }

    /// Nodes before `index` stay where they are.
    pub fn set_solve_from(&mut self, index: usize) {
        self.from_node_index = index;
    }

    /// Append a node to the chain and return its index.
    pub fn add_node_in_order(&mut self, position: Point3<Real>) -> usize {
        self.nodes.push(CcdIkNode::new(position));
        self.nodes.len() - 1
    }

    /// Limit node `index` to turn about `axis`, with the angle between its
    /// parent and child kept in `[min_degrees, max_degrees]`.
    pub fn set_node_hinge_constraint(
        &mut self,
        index: usize,
        axis: Vector3<Real>,
        min_degrees: Real,
        max_degrees: Real,
    ) {
        match self.nodes.get_mut(index) {
            Some(node) => {
                node.axis = axis;
                node.min_limit_degrees = min_degrees;
                node.max_limit_degrees = max_degrees;
            },
            None => warn!("Hinge constraint on missing node {}", index),
        }
    }

    /// Run up to `max_round` sweeps towards `target`. Returns the number of
    /// sweeps run. Stopping without reaching the target is not an error.
    pub fn solve_to(&mut self, target: Point3<Real>) -> usize {
        self.destination = target;
        if self.nodes.len() < 2 {
            return 0;
        }
        let mut last_distance2 = 0.0;
        let mut rounds = 0;
        for round in 0..self.max_round {
            let distance2 = (self.end_effector() - self.destination).norm_squared();
            trace!("Round {} distance2 {}", round, distance2);
            if distance2 <= self.distance_threshold2 {
                break;
            }
            if last_distance2 > 0.0 && (distance2 - last_distance2).abs() <= self.distance_cease_threshold2 {
                break;
            }
            last_distance2 = distance2;
            self.iterate();
            rounds += 1;
        }
        rounds
    }

    #[inline]
    fn end_effector(&self) -> Point3<Real> {
        self.nodes[self.nodes.len() - 1].position
    }

    fn rotate_children(&mut self, rotation: &UnitQuaternion<Real>, index: usize) {
        let origin = self.nodes[index].position;
        for next in &mut self.nodes[index + 1..] {
            next.position = origin + rotation * (next.position - origin);
        }
    }

    /// One sweep over the chain.
    pub fn iterate(&mut self) {
        if self.nodes.len() < 2 {
            return;
        }
        for i in (self.from_node_index..self.nodes.len() - 1).rev() {
            let origin = self.nodes[i].position;
            let from = self.end_effector() - origin;
            let to = self.destination - origin;
            let rotation = rotation_to(&from, &to);
            self.rotate_children(&rotation, i);

            let node = &self.nodes[i];
            if !node.has_hinge() {
                continue;
            }
            let (axis, min_degrees, max_degrees) = (node.axis, node.min_limit_degrees, node.max_limit_degrees);
            let hinge_rotation = rotation_to(&(rotation * axis), &axis);
            self.rotate_children(&hinge_rotation, i);

            // Only the angle about the X axis is limited.
            if i == 0 {
                continue;
            }
            let Some(degrees) = self.angle_about_x(i) else {
                continue;
            };
            if degrees < min_degrees {
                let correction = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), to_radians(min_degrees - degrees));
                self.rotate_children(&correction, i);
            } else if degrees > max_degrees {
                let correction = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), to_radians(max_degrees - degrees));
                self.rotate_children(&correction, i);
            }
        }
    }

    /// Angle at node `index` from its parent to its child, projected onto the
    /// YZ plane and measured counter-clockwise about +X in `[0, 360)`.
    pub fn angle_about_x(&self, index: usize) -> Option<Real> {
        if index == 0 || index + 1 >= self.nodes.len() {
            return None;
        }
        let flatten = |point: &Point3<Real>| Vector3::new(0.0, point.y, point.z);
        let origin = flatten(&self.nodes[index].position);
        let from = (flatten(&self.nodes[index - 1].position) - origin).try_normalize(Real::EPSILON)?;
        let to = (flatten(&self.nodes[index + 1].position) - origin).try_normalize(Real::EPSILON)?;
        Some(angle_in_range_360(&from, &to, &Vector3::x()))
    }

    pub fn node_solved_position(&self, index: usize) -> Option<&Point3<Real>> {
        self.nodes.get(index).map(|node| &node.position)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[CcdIkNode] {
        &self.nodes
    }
}

/// Angle from `a` to `b` in degrees, taken past 180 when `a × b` points
/// against `plane_normal`.
pub fn angle_in_range_360(a: &Vector3<Real>, b: &Vector3<Real>, plane_normal: &Vector3<Real>) -> Real {
    let degrees = to_degrees(a.dot(b).clamp(-1.0, 1.0).acos());
    if a.cross(b).dot(plane_normal) < 0.0 {
        360.0 - degrees
    } else {
        degrees
    }
}
