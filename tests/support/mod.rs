//! Test support library
//! Shape builders and geometric checks shared by the integration tests.

#![allow(dead_code)]

use dust3d_core::{
    float_types::Real,
    mesh::{Mesh, manifold, shapes, state::MeshState},
};
use nalgebra::Point3;

/// Returns the bounding box `[min_x, min_y, min_z, max_x, max_y, max_z]` of
/// the vertices referenced by at least one triangle.
pub fn bounding_box(mesh: &Mesh) -> [Real; 6] {
    let mut bounds = [Real::MAX, Real::MAX, Real::MAX, Real::MIN, Real::MIN, Real::MIN];
    for triangle in mesh.triangles() {
        for &index in triangle {
            let p = mesh.vertices()[index];
            for axis in 0..3 {
                bounds[axis] = bounds[axis].min(p[axis]);
                bounds[axis + 3] = bounds[axis + 3].max(p[axis]);
            }
        }
    }
    bounds
}

/// Quick helper to compare floating-point results with an acceptable tolerance.
pub fn approx_eq(a: Real, b: Real, eps: Real) -> bool {
    (a - b).abs() < eps
}

/// Signed volume by the divergence theorem. Positive for outward winding.
pub fn volume(mesh: &Mesh) -> Real {
    mesh.triangles()
        .iter()
        .map(|t| {
            let [a, b, c] = t.map(|index| mesh.vertices()[index].coords);
            a.dot(&b.cross(&c)) / 6.0
        })
        .sum()
}

pub fn is_closed(mesh: &Mesh) -> bool {
    manifold::is_watertight(mesh.triangles())
}

/// Unit cube at the origin, shifted by `(x, y, z)`.
pub fn cube_at(x: Real, y: Real, z: Real) -> Mesh {
    let (vertices, faces) = shapes::translated(shapes::cube(1.0), x, y, z);
    Mesh::new(vertices, &faces).unwrap()
}

pub fn cube_state_at(x: Real, y: Real, z: Real) -> MeshState {
    MeshState::from_mesh(cube_at(x, y, z))
}

pub fn sphere_at(radius: Real, x: Real, y: Real, z: Real) -> Mesh {
    let (vertices, faces) = shapes::translated(shapes::uv_sphere(radius, 16, 8), x, y, z);
    Mesh::new(vertices, &faces).unwrap()
}

pub fn point(x: Real, y: Real, z: Real) -> Point3<Real> {
    Point3::new(x, y, z)
}
