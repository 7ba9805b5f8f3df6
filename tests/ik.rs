mod support;

use dust3d_core::{
    float_types::Real,
    ik::{
        IkSolverConfig,
        ccd::CcdIkSolver,
        mover::{IkVersionTracker, SkeletonIkMover},
    },
};
use nalgebra::{Point3, Vector3};
use proptest::prelude::*;
use uuid::Uuid;

use crate::support::point;

fn link_lengths(solver: &CcdIkSolver) -> Vec<Real> {
    solver
        .nodes()
        .windows(2)
        .map(|pair| (pair[1].position - pair[0].position).norm())
        .collect()
}

#[test]
fn chain_converges_and_keeps_its_links() {
    let mut solver = CcdIkSolver::new();
    for x in 0..4 {
        solver.add_node_in_order(point(x as Real, 0.0, 0.0));
    }
    let before = link_lengths(&solver);
    solver.set_max_round(100);
    solver.set_distance_threshold(0.01);
    solver.set_distance_cease_threshold(1e-5);

    let target = point(1.5, 1.5, 0.5);
    let rounds = solver.solve_to(target);
    assert!(rounds >= 1);
    let end = solver.node_solved_position(3).unwrap();
    assert!((end - target).norm() < 0.05, "end effector at {}", end);

    for (a, b) in before.iter().zip(link_lengths(&solver).iter()) {
        assert!((a - b).abs() < 1e-9);
    }
}

/// Root, elbow and hand, with the elbow held at a right angle about X.
fn right_angle_arm() -> (CcdIkSolver, usize) {
    let mut solver = CcdIkSolver::new();
    solver.add_node_in_order(point(0.0, 0.0, 0.0));
    let elbow = solver.add_node_in_order(point(0.0, 1.0, 0.0));
    solver.add_node_in_order(point(0.0, 1.0, -1.0));
    solver.set_node_hinge_constraint(elbow, Vector3::x(), 90.0, 90.0);
    (solver, elbow)
}

#[test]
fn hinge_limit_clamps_the_joint_angle() {
    let (mut solver, elbow) = right_angle_arm();
    solver.solve_to(point(0.0, 1.5, -1.5));
    let angle = solver.angle_about_x(elbow).unwrap();
    assert!((angle - 90.0).abs() < 1e-6, "angle {}", angle);
    let elbow_position = solver.node_solved_position(elbow).unwrap();
    assert!((elbow_position - point(0.0, 1.0, 0.0)).norm() < 1e-9);
}

#[test]
fn configured_solver_stops_within_threshold() {
    let config = IkSolverConfig {
        max_round: 1,
        ..Default::default()
    };
    let mut solver = CcdIkSolver::with_config(&config);
    solver.add_node_in_order(point(0.0, 0.0, 0.0));
    solver.add_node_in_order(point(1.0, 0.0, 0.0));
    assert_eq!(solver.solve_to(point(1.005, 0.0, 0.0)), 0);
    assert_eq!(solver.solve_to(point(0.0, 1.0, 0.0)), 1);
    let end = solver.node_solved_position(1).unwrap();
    assert!((end - point(0.0, 1.0, 0.0)).norm() < 1e-9);
}

#[test]
fn mover_solves_on_a_worker_and_stale_results_drop() {
    let tracker = IkVersionTracker::new();
    let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
    let build = |version: u64| {
        let mut mover = SkeletonIkMover::new();
        for (k, id) in ids.iter().enumerate() {
            mover.add_node(*id, Point3::new(k as Real, 0.0, 0.0));
        }
        mover.set_target(point(1.0, 1.0, 0.0));
        mover.set_update_version(version);
        mover
    };

    let stale = build(tracker.next_version()).spawn();
    let current_version = tracker.next_version();
    let current = build(current_version).spawn();

    assert!(tracker.accept(stale.join().unwrap()).is_none());
    let outcome = tracker.accept(current.join().unwrap()).unwrap();
    assert_eq!(outcome.version, current_version);
    assert_eq!(tracker.latest_version(), current_version);

    let ids_out: Vec<Uuid> = outcome.nodes.iter().map(|node| node.id).collect();
    assert_eq!(ids_out, ids);
    assert_eq!(outcome.nodes[0].new_position, outcome.nodes[0].position);
    assert_eq!(outcome.nodes[1].new_position, outcome.nodes[1].position);
    assert!((outcome.nodes[2].new_position - point(1.0, 1.0, 0.0)).norm() < 1e-6);
}

#[test]
fn mover_applies_hinges_by_id() {
    let (root, elbow, hand) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let mut mover = SkeletonIkMover::new();
    mover.add_node(root, point(0.0, 0.0, 0.0));
    mover.add_node(elbow, point(0.0, 1.0, 0.0));
    mover.add_node(hand, point(0.0, 1.0, -1.0));
    mover.set_hinge_constraint(elbow, Vector3::x(), 90.0, 90.0);
    mover.set_target(point(0.0, 1.5, -1.5));
    mover.process();

    let nodes = mover.ik_nodes();
    let upper = nodes[0].new_position - nodes[1].new_position;
    let lower = nodes[2].new_position - nodes[1].new_position;
    assert!(upper.dot(&lower).abs() < 1e-6);
}

proptest! {
    #[test]
    fn pinned_hinge_holds_for_any_target(x in -3.0..3.0f64, y in -3.0..3.0f64, z in -3.0..3.0f64) {
        let target = point(x as Real, y as Real, z as Real);
        prop_assume!((target - point(0.0, 1.0, 0.0)).norm() > 1e-3);
        let (mut solver, elbow) = right_angle_arm();
        solver.set_solve_from(elbow);
        solver.solve_to(target);

        let angle = solver.angle_about_x(elbow).unwrap();
        prop_assert!((angle - 90.0).abs() < 1e-6, "angle {} for target {}", angle, target);
        prop_assert_eq!(solver.node_solved_position(0), Some(&point(0.0, 0.0, 0.0)));
        prop_assert_eq!(solver.node_solved_position(elbow), Some(&point(0.0, 1.0, 0.0)));
        let hand = solver.node_solved_position(2).unwrap();
        prop_assert!(((hand - point(0.0, 1.0, 0.0)).norm() - 1.0).abs() < 1e-9);
    }
}
