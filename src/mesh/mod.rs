//! `Mesh`: a closed triangle mesh ready to take part in boolean combination.
//!
//! Construction triangulates polygon faces, then prepares the [`SolidMesh`]
//! the boolean pipeline queries. The submodules hold the pipeline itself.

use crate::errors::CombineError;
use crate::float_types::Real;
use crate::mesh::solid::SolidMesh;
use crate::mesh::triangulate::triangulate;
use nalgebra::Point3;

pub mod boolean;
pub mod cache;
pub mod combiner;
pub mod manifold;
pub mod recombiner;
pub mod retriangulate;
pub mod shapes;
pub mod solid;
pub mod state;
pub mod triangulate;

#[derive(Clone, Debug)]
pub struct Mesh {
    solid: SolidMesh,
}

impl Mesh {
    /// Build a mesh from polygon faces.
    ///
    /// Quads split along their first diagonal and larger polygons are
    /// ear-clipped. Any index outside `vertices` is rejected.
    pub fn new(vertices: Vec<Point3<Real>>, faces: &[Vec<usize>]) -> Result<Self, CombineError> {
        let triangles = triangulate(&vertices, faces)?;
        Self::from_triangles(vertices, triangles)
    }

    /// Build a mesh from faces that are already triangles.
    pub fn from_triangles(vertices: Vec<Point3<Real>>, triangles: Vec<[usize; 3]>) -> Result<Self, CombineError> {
        Ok(Self {
            solid: SolidMesh::new(vertices, triangles)?,
        })
    }

    /// The null mesh: no vertices and no faces.
    pub fn empty() -> Self {
        Self {
            solid: SolidMesh::from_valid(Vec::new(), Vec::new()),
        }
    }

    /// Copy out the vertices and the faces, one `Vec` per triangle.
    pub fn fetch(&self) -> (Vec<Point3<Real>>, Vec<Vec<usize>>) {
        (
            self.solid.vertices().to_vec(),
            self.solid.triangles().iter().map(|triangle| triangle.to_vec()).collect(),
        )
    }

    #[inline]
    pub fn vertices(&self) -> &[Point3<Real>] {
        self.solid.vertices()
    }

    #[inline]
    pub fn triangles(&self) -> &[[usize; 3]] {
        self.solid.triangles()
    }

    #[inline]
    pub const fn solid(&self) -> &SolidMesh {
        &self.solid
    }

    /// True when the mesh has no vertices.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.solid.vertices().is_empty()
    }

    /// Mirror across the YZ plane. Faces are reversed so the mirrored solid
    /// keeps outward-facing normals.
    pub fn x_mirrored(&self) -> Self {
        let vertices = self
            .vertices()
            .iter()
            .map(|vertex| Point3::new(-vertex.x, vertex.y, vertex.z))
            .collect();
        let triangles = self.triangles().iter().map(|t| [t[2], t[1], t[0]]).collect();
        Self {
            solid: SolidMesh::from_valid(vertices, triangles),
        }
    }
}

impl Default for Mesh {
    fn default() -> Self {
        Self::empty()
    }
}
