//! Closed primitive solids as `(vertices, faces)` pairs.
//!
//! Faces wind counter-clockwise seen from outside. Feed them to
//! [`Mesh::new`](crate::mesh::Mesh::new) or
//! [`MeshState::new`](crate::mesh::state::MeshState::new).

use crate::float_types::{PI, Real, TAU};
use nalgebra::Point3;

pub type Shape = (Vec<Point3<Real>>, Vec<Vec<usize>>);

/// Axis-aligned box spanning `[0, width] × [0, length] × [0, height]`, made
/// of six quads over eight shared corners.
pub fn cuboid(width: Real, length: Real, height: Real) -> Shape {
    let vertices = vec![
        Point3::new(0.0, 0.0, 0.0),          // 0: origin
        Point3::new(width, 0.0, 0.0),        // 1: +X
        Point3::new(width, length, 0.0),     // 2: +X+Y
        Point3::new(0.0, length, 0.0),       // 3: +Y
        Point3::new(0.0, 0.0, height),       // 4: +Z
        Point3::new(width, 0.0, height),     // 5: +X+Z
        Point3::new(width, length, height),  // 6: +X+Y+Z
        Point3::new(0.0, length, height),    // 7: +Y+Z
    ];
    let faces = vec![
        vec![0, 3, 2, 1], // bottom
        vec![4, 5, 6, 7], // top
        vec![0, 1, 5, 4], // front
        vec![3, 7, 6, 2], // back
        vec![0, 4, 7, 3], // left
        vec![1, 2, 6, 5], // right
    ];
    (vertices, faces)
}

pub fn cube(size: Real) -> Shape {
    cuboid(size, size, size)
}

/// Regular octahedron with its corners on the axes at distance `radius`.
pub fn octahedron(radius: Real) -> Shape {
    let vertices = vec![
        Point3::new(radius, 0.0, 0.0),
        Point3::new(-radius, 0.0, 0.0),
        Point3::new(0.0, radius, 0.0),
        Point3::new(0.0, -radius, 0.0),
        Point3::new(0.0, 0.0, radius),
        Point3::new(0.0, 0.0, -radius),
    ];
    let faces = vec![
        vec![0, 2, 4],
        vec![2, 1, 4],
        vec![1, 3, 4],
        vec![3, 0, 4],
        vec![5, 2, 0],
        vec![5, 1, 2],
        vec![5, 3, 1],
        vec![5, 0, 3],
    ];
    (vertices, faces)
}

/// UV sphere around the origin with poles on the Y axis.
///
/// ```text
/// vertex 0            north pole (0, r, 0)
/// 1 + (j-1)*segments  first vertex of ring j, j in 1..stacks
/// last                south pole (0, -r, 0)
/// ```
///
/// Caps are triangle fans; every band between two rings is split into two
/// triangles per segment. `segments` is at least 3 and `stacks` at least 2.
pub fn uv_sphere(radius: Real, segments: usize, stacks: usize) -> Shape {
    let segments = segments.max(3);
    let stacks = stacks.max(2);

    let mut vertices = Vec::with_capacity(2 + (stacks - 1) * segments);
    vertices.push(Point3::new(0.0, radius, 0.0));
    for j in 1..stacks {
        let phi = j as Real / stacks as Real * PI;
        let y = radius * phi.cos();
        let ring_radius = radius * phi.sin();
        for i in 0..segments {
            let theta = i as Real / segments as Real * TAU;
            vertices.push(Point3::new(ring_radius * theta.cos(), y, ring_radius * theta.sin()));
        }
    }
    vertices.push(Point3::new(0.0, -radius, 0.0));

    let north_pole = 0;
    let south_pole = vertices.len() - 1;
    let ring = |j: usize, i: usize| 1 + (j - 1) * segments + i % segments;

    let mut faces = Vec::with_capacity(2 * segments * (stacks - 1));
    for i in 0..segments {
        faces.push(vec![north_pole, ring(1, i + 1), ring(1, i)]);
    }
    for j in 1..stacks - 1 {
        for i in 0..segments {
            let (v1, v2) = (ring(j, i), ring(j, i + 1));
            let (v3, v4) = (ring(j + 1, i), ring(j + 1, i + 1));
            faces.push(vec![v1, v2, v4]);
            faces.push(vec![v1, v4, v3]);
        }
    }
    for i in 0..segments {
        faces.push(vec![south_pole, ring(stacks - 1, i), ring(stacks - 1, i + 1)]);
    }
    (vertices, faces)
}

/// Shift every vertex of `shape` by `(x, y, z)`.
pub fn translated(shape: Shape, x: Real, y: Real, z: Real) -> Shape {
    let (vertices, faces) = shape;
    let vertices = vertices
        .into_iter()
        .map(|vertex| Point3::new(vertex.x + x, vertex.y + y, vertex.z + z))
        .collect();
    (vertices, faces)
}
