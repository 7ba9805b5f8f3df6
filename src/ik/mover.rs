//! Skeleton-facing IK: UUID-tagged nodes in, solved positions out.
//!
//! A mover is built for one request, carries the caller's version number
//! through the solve, and hands it back with the result. Consumers keep an
//! [`IkVersionTracker`] and drop any result whose version has been overtaken
//! by a newer request.

use crate::float_types::Real;
use crate::ik::IkSolverConfig;
use crate::ik::ccd::CcdIkSolver;
use hashbrown::{HashMap, HashSet};
use log::debug;
use nalgebra::{Point3, Vector3};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct SkeletonIkNode {
    pub id: Uuid,
    pub position: Point3<Real>,
    /// Equal to `position` until a solve runs
    pub new_position: Point3<Real>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct HingeConstraint {
    axis: Vector3<Real>,
    min_degrees: Real,
    max_degrees: Real,
}

/// A finished solve as delivered to the consumer
#[derive(Debug, Clone, PartialEq)]
pub struct IkSolveOutcome {
    pub version: u64,
    pub nodes: Vec<SkeletonIkNode>,
}

#[derive(Debug, Clone)]
pub struct SkeletonIkMover {
    nodes: Vec<SkeletonIkNode>,
    hinges: HashMap<Uuid, HingeConstraint>,
    target: Point3<Real>,
    update_version: u64,
    config: IkSolverConfig,
}

impl Default for SkeletonIkMover {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            hinges: HashMap::new(),
            target: Point3::origin(),
            update_version: 0,
            config: IkSolverConfig::default(),
        }
    }
}

impl SkeletonIkMover {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a node; nodes are chained in the order they are added, root
    /// first and end effector last.
    pub fn add_node(&mut self, id: Uuid, position: Point3<Real>) {
        self.nodes.push(SkeletonIkNode {
            id,
            position,
            new_position: position,
        });
    }

    pub fn set_target(&mut self, target: Point3<Real>) {
        self.target = target;
    }

    pub fn set_update_version(&mut self, version: u64) {
        self.update_version = version;
    }

    pub fn update_version(&self) -> u64 {
        self.update_version
    }

    pub fn set_config(&mut self, config: IkSolverConfig) {
        self.config = config;
    }

    /// Hinge node `id` about `axis`, see
    /// [`CcdIkSolver::set_node_hinge_constraint`].
    pub fn set_hinge_constraint(&mut self, id: Uuid, axis: Vector3<Real>, min_degrees: Real, max_degrees: Real) {
        self.hinges.insert(
            id,
            HingeConstraint {
                axis,
                min_degrees,
                max_degrees,
            },
        );
    }

    pub fn ik_nodes(&self) -> &[SkeletonIkNode] {
        &self.nodes
    }

    pub fn process(&mut self) {
        self.resolve();
    }

    fn resolve(&mut self) {
        let mut solver = CcdIkSolver::with_config(&self.config);
        for node in &self.nodes {
            let index = solver.add_node_in_order(node.position);
            if let Some(hinge) = self.hinges.get(&node.id) {
                solver.set_node_hinge_constraint(index, hinge.axis, hinge.min_degrees, hinge.max_degrees);
            }
        }
        if self.nodes.len() >= 2 {
            solver.set_solve_from(1);
        }
        let rounds = solver.solve_to(self.target);
        debug!(
            "IK version {} solved {} nodes in {} rounds",
            self.update_version,
            self.nodes.len(),
            rounds
        );
        for (index, node) in self.nodes.iter_mut().enumerate() {
            if let Some(position) = solver.node_solved_position(index) {
                node.new_position = *position;
            }
        }
    }

    pub fn into_outcome(self) -> IkSolveOutcome {
        IkSolveOutcome {
            version: self.update_version,
            nodes: self.nodes,
        }
    }

    /// Solve on a worker thread.
    pub fn spawn(mut self) -> JoinHandle<IkSolveOutcome> {
        thread::spawn(move || {
            self.process();
            self.into_outcome()
        })
    }
}

/// Walk a skeleton from `end_effector` through nodes of degree one or two
/// and return the chain root first, ready for [`SkeletonIkMover::add_node`].
///
/// The walk stops at a branching node, a missing node, or a node already
/// visited.
pub fn collect_chain(
    end_effector: Uuid,
    positions: &HashMap<Uuid, Point3<Real>>,
    neighbors: &HashMap<Uuid, Vec<Uuid>>,
) -> Vec<(Uuid, Point3<Real>)> {
    let mut chain = Vec::new();
    let mut visited: HashSet<Uuid> = HashSet::new();
    let mut current = end_effector;
    loop {
        visited.insert(current);
        let Some(&position) = positions.get(&current) else {
            break;
        };
        chain.push((current, position));
        let linked = neighbors.get(&current).map(Vec::as_slice).unwrap_or_default();
        if linked.is_empty() || linked.len() > 2 {
            break;
        }
        match linked.iter().find(|id| !visited.contains(*id)) {
            Some(&next) => current = next,
            None => break,
        }
    }
    chain.reverse();
    chain
}

/// Consumer-side guard against stale solves
#[derive(Debug, Default)]
pub struct IkVersionTracker {
    latest_issued: AtomicU64,
    latest_accepted: AtomicU64,
}

impl IkVersionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Version for a new request. Issuing one makes every older outcome stale.
    pub fn next_version(&self) -> u64 {
        self.latest_issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn latest_version(&self) -> u64 {
        self.latest_issued.load(Ordering::SeqCst)
    }

    /// Pass `outcome` through only if it answers the newest request and is
    /// not older than anything accepted before.
    pub fn accept(&self, outcome: IkSolveOutcome) -> Option<IkSolveOutcome> {
        if outcome.version != self.latest_issued.load(Ordering::SeqCst) {
            return None;
        }
        let previous = self.latest_accepted.fetch_max(outcome.version, Ordering::SeqCst);
        (outcome.version >= previous).then_some(outcome)
    }
}
