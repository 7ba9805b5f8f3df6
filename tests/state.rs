mod support;

use dust3d_core::{
    errors::CombineError,
    float_types::Real,
    mesh::{
        cache::{CombinationCache, CombineMode, combine_cached, combine_multiple},
        combiner::Method,
        shapes,
        state::{CombineTree, MeshState, SeamUvMap},
    },
    position_key::PositionKey,
};
use nalgebra::Vector2;
use std::sync::Arc;

use crate::support::{cube_state_at, is_closed, point};

fn seam_map(x: Real) -> SeamUvMap {
    let mut uvs = SeamUvMap::new();
    uvs.insert(
        [
            PositionKey::from(point(x, 0.0, 0.0)),
            PositionKey::from(point(x, 1.0, 0.0)),
            PositionKey::from(point(x, 0.0, 1.0)),
        ],
        [Vector2::new(0.0, 0.0), Vector2::new(1.0, 0.0), Vector2::new(0.0, 1.0)],
    );
    uvs
}

#[test]
fn overlapping_states_combine_closed() {
    let first = cube_state_at(0.0, 0.0, 0.0);
    let second = cube_state_at(0.5, 0.37, 0.29);
    for recombine in [false, true] {
        let combined = MeshState::combine_with(&first, &second, Method::Union, recombine).unwrap();
        assert!(!combined.is_null());
        assert!(is_closed(&combined.mesh));
        assert!(combined.broken_triangles.is_empty());
        assert_eq!(combined.seam_triangle_uvs.is_empty(), !recombine);
    }
}

#[test]
fn seam_uvs_carry_over_in_order() {
    let mut first = cube_state_at(0.0, 0.0, 0.0);
    first.seam_triangle_uvs.push(seam_map(0.0));
    let mut second = cube_state_at(5.0, 0.0, 0.0);
    second.seam_triangle_uvs.push(seam_map(5.0));

    let combined = MeshState::combine(&first, &second, Method::Union).unwrap();
    assert_eq!(combined.seam_triangle_uvs, vec![seam_map(0.0), seam_map(5.0)]);
    assert_eq!(combined.mesh.triangles().len(), 24);
}

#[test]
fn combine_tree_evaluates_bottom_up() {
    let tree = CombineTree::node(
        Method::Difference,
        CombineTree::node(
            Method::Union,
            CombineTree::leaf(cube_state_at(0.0, 0.0, 0.0)),
            CombineTree::leaf(cube_state_at(5.0, 0.0, 0.0)),
        ),
        CombineTree::leaf(cube_state_at(10.0, 0.0, 0.0)),
    );
    let state = tree.evaluate(true).unwrap();
    assert_eq!(state.mesh.triangles().len(), 24);
    assert_eq!(state.mesh.vertices().len(), 16);
}

#[test]
fn combine_tree_reports_failures() {
    let tree = CombineTree::node(
        Method::Intersection,
        CombineTree::leaf(cube_state_at(0.0, 0.0, 0.0)),
        CombineTree::leaf(cube_state_at(5.0, 0.0, 0.0)),
    );
    assert_eq!(tree.evaluate(false).unwrap_err(), CombineError::EmptyResult);
}

#[test]
fn multiple_parts_fold_through_the_cache() {
    let cache = CombinationCache::new();
    let parts = || {
        vec![
            (Some(cube_state_at(0.0, 0.0, 0.0)), CombineMode::Normal, "a".to_string()),
            (Some(cube_state_at(5.0, 0.0, 0.0)), CombineMode::Normal, "b".to_string()),
            (Some(cube_state_at(10.0, 0.0, 0.0)), CombineMode::Inversion, "c".to_string()),
        ]
    };

    let assembly = combine_multiple(parts(), true, &cache);
    assert!(assembly.successful);
    let state = assembly.state.unwrap();
    assert_eq!(state.mesh.triangles().len(), 24);
    assert_eq!(cache.len(), 2);
    assert!(matches!(cache.get("a+b!"), Some(Some(_))));
    assert!(matches!(cache.get("a+b!-c!"), Some(Some(_))));

    let again = combine_multiple(parts(), true, &cache).state.unwrap();
    assert!(Arc::ptr_eq(&state, &again));

    combine_multiple(parts(), false, &cache);
    assert_eq!(cache.len(), 4);
    cache.clear();
    assert!(cache.is_empty());
}

#[test]
fn failed_step_is_skipped() {
    let cache = CombinationCache::new();
    let (vertices, faces) = shapes::translated(shapes::cube(3.0), -1.0, -1.0, -1.0);
    let enclosing = MeshState::new(vertices, &faces).unwrap();
    let parts = vec![
        (Some(cube_state_at(0.0, 0.0, 0.0)), CombineMode::Normal, "a".to_string()),
        (Some(enclosing), CombineMode::Inversion, "big".to_string()),
        (Some(cube_state_at(5.0, 0.0, 0.0)), CombineMode::Normal, "b".to_string()),
    ];
    let assembly = combine_multiple(parts, false, &cache);
    assert!(!assembly.successful);
    let state = assembly.state.unwrap();
    assert_eq!(state.mesh.triangles().len(), 24);
    assert!(matches!(cache.get("a-big"), Some(None)));
    assert!(matches!(cache.get("a-big+b"), Some(Some(_))));
}

#[test]
fn cached_failure_is_remembered() {
    let cache = CombinationCache::new();
    let first = cube_state_at(0.0, 0.0, 0.0);
    let second = cube_state_at(5.0, 0.0, 0.0);
    let error = combine_cached(&cache, "x", &first, &second, Method::Intersection, false).unwrap_err();
    assert_eq!(error, CombineError::EmptyResult);
    let again = combine_cached(&cache, "x", &first, &second, Method::Intersection, false).unwrap_err();
    assert!(matches!(again, CombineError::Geometric(_)));

    let union = combine_cached(&cache, "y", &first, &second, Method::Union, false).unwrap();
    let cached = combine_cached(&cache, "y", &first, &second, Method::Union, false).unwrap();
    assert!(Arc::ptr_eq(&union, &cached));
}
