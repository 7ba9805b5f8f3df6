//! Triangle soup with the derived data the boolean pipeline queries:
//! per-triangle normals and boxes plus a bounding-volume tree over them.

use crate::aabb::Aabb;
use crate::aabb_tree::AabbTree;
use crate::errors::CombineError;
use crate::float_types::Real;
use crate::math::triangle_normal;
use nalgebra::{Point3, Vector3};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[derive(Clone, Debug)]
pub struct SolidMesh {
    vertices: Vec<Point3<Real>>,
    triangles: Vec<[usize; 3]>,
    triangle_normals: Vec<Vector3<Real>>,
    bounding_box: Aabb,
    tree: AabbTree,
}

impl SolidMesh {
    /// Take ownership of finalized triangle data and prepare it for queries.
    ///
    /// Every index is checked against the vertex count; nothing is derived
    /// from a mesh that references missing vertices.
    pub fn new(vertices: Vec<Point3<Real>>, triangles: Vec<[usize; 3]>) -> Result<Self, CombineError> {
        for (face, triangle) in triangles.iter().enumerate() {
            if let Some(&index) = triangle.iter().find(|&&index| index >= vertices.len()) {
                return Err(CombineError::InvalidInput {
                    face,
                    index,
                    vertex_count: vertices.len(),
                });
            }
        }
        Ok(Self::prepare(vertices, triangles))
    }

    /// Skip index validation for data derived from an already valid mesh.
    pub(crate) fn from_valid(vertices: Vec<Point3<Real>>, triangles: Vec<[usize; 3]>) -> Self {
        Self::prepare(vertices, triangles)
    }

    /// Compute normals, boxes and the tree. Runs once per mesh.
    fn prepare(vertices: Vec<Point3<Real>>, triangles: Vec<[usize; 3]>) -> Self {
        let describe = |triangle: &[usize; 3]| {
            let [a, b, c] = [&vertices[triangle[0]], &vertices[triangle[1]], &vertices[triangle[2]]];
            let mut aabb = Aabb::empty();
            aabb.update(a);
            aabb.update(b);
            aabb.update(c);
            aabb.update_center();
            (triangle_normal(a, b, c), aabb)
        };

        #[cfg(feature = "parallel")]
        let described: Vec<(Vector3<Real>, Aabb)> = triangles.par_iter().map(describe).collect();

        #[cfg(not(feature = "parallel"))]
        let described: Vec<(Vector3<Real>, Aabb)> = triangles.iter().map(describe).collect();

        let (triangle_normals, triangle_boxes): (Vec<_>, Vec<_>) = described.into_iter().unzip();

        let mut bounding_box = Aabb::empty();
        for aabb in &triangle_boxes {
            bounding_box.update(aabb.lower_bound());
            bounding_box.update(aabb.upper_bound());
        }
        bounding_box.update_center();

        let indices = (0..triangles.len()).collect();
        let tree = AabbTree::new(triangle_boxes, indices, bounding_box);

        Self {
            vertices,
            triangles,
            triangle_normals,
            bounding_box,
            tree,
        }
    }

    #[inline]
    pub fn vertices(&self) -> &[Point3<Real>] {
        &self.vertices
    }

    #[inline]
    pub fn triangles(&self) -> &[[usize; 3]] {
        &self.triangles
    }

    #[inline]
    pub fn triangle_normals(&self) -> &[Vector3<Real>] {
        &self.triangle_normals
    }

    #[inline]
    pub fn triangle_boxes(&self) -> &[Aabb] {
        self.tree.boxes()
    }

    #[inline]
    pub const fn bounding_box(&self) -> &Aabb {
        &self.bounding_box
    }

    #[inline]
    pub const fn tree(&self) -> &AabbTree {
        &self.tree
    }

    /// Corner positions of triangle `index`.
    #[inline]
    pub fn triangle_positions(&self, index: usize) -> [Point3<Real>; 3] {
        let triangle = &self.triangles[index];
        [
            self.vertices[triangle[0]],
            self.vertices[triangle[1]],
            self.vertices[triangle[2]],
        ]
    }
}
