//! `MeshState`: a combinable mesh plus the data that survives combination.

use crate::errors::CombineError;
use crate::float_types::Real;
use crate::mesh::Mesh;
use crate::mesh::combiner::{Method, combine_with_sources};
use crate::mesh::manifold::{self, broken_triangles};
use crate::mesh::recombiner::MeshRecombiner;
use crate::position_key::PositionKey;
use log::{debug, trace};
use nalgebra::{Point3, Vector2};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// UVs of the bridging triangles of one seam, keyed by corner positions.
pub type SeamUvMap = BTreeMap<[PositionKey; 3], [Vector2<Real>; 3]>;

#[derive(Clone, Debug, Default)]
pub struct MeshState {
    pub mesh: Mesh,
    /// One map per seam, newest combination first
    pub seam_triangle_uvs: Vec<SeamUvMap>,
    /// Triangles of `mesh` along an open or doubled edge
    pub broken_triangles: BTreeSet<[PositionKey; 3]>,
}

impl MeshState {
    pub fn new(vertices: Vec<Point3<Real>>, faces: &[Vec<usize>]) -> Result<Self, CombineError> {
        Ok(Self::from_mesh(Mesh::new(vertices, faces)?))
    }

    pub fn from_mesh(mesh: Mesh) -> Self {
        Self {
            mesh,
            ..Default::default()
        }
    }

    pub fn fetch(&self) -> (Vec<Point3<Real>>, Vec<Vec<usize>>) {
        self.mesh.fetch()
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.mesh.is_null()
    }

    /// Every directed edge appears once and has its reverse.
    pub fn is_watertight(faces: &[Vec<usize>]) -> bool {
        manifold::is_watertight(faces)
    }

    /// Combine and recombine the seams.
    pub fn combine(first: &MeshState, second: &MeshState, method: Method) -> Result<MeshState, CombineError> {
        Self::combine_with(first, second, method, true)
    }

    /// Combine two states. With `recombine` the seams are rebuilt, and the
    /// rebuilt mesh is kept only when it is still watertight.
    pub fn combine_with(
        first: &MeshState,
        second: &MeshState,
        method: Method,
        recombine: bool,
    ) -> Result<MeshState, CombineError> {
        if first.is_null() || second.is_null() {
            return Err(CombineError::NullInput);
        }
        let (mut mesh, sources) = combine_with_sources(&first.mesh, &second.mesh, method)?;
        let mut seam_triangle_uvs = Vec::new();

        if recombine && !mesh.is_null() {
            let (vertices, faces) = mesh.fetch();
            match MeshRecombiner::new(&vertices, &sources, &faces).recombine() {
                Ok(recombined) if manifold::is_watertight(&recombined.faces) => {
                    match Mesh::new(recombined.vertices, &recombined.faces) {
                        Ok(remesh) if !remesh.is_null() => {
                            for seam in &recombined.seam_triangle_uvs {
                                let uvs: SeamUvMap = seam
                                    .iter()
                                    .map(|(positions, uv)| (positions.map(|p| PositionKey::from(&p)), *uv))
                                    .collect();
                                if !uvs.is_empty() {
                                    seam_triangle_uvs.push(uvs);
                                }
                            }
                            trace!("Recombined into {} seams", seam_triangle_uvs.len());
                            mesh = remesh;
                        },
                        Ok(_) => debug!("Recombined mesh is null, keeping the combined mesh"),
                        Err(error) => debug!("Recombined mesh rejected: {}", error),
                    }
                },
                Ok(_) => debug!("Recombined mesh is not watertight, keeping the combined mesh"),
                Err(reason) => debug!("Recombine degraded: {}", reason),
            }
        }

        if mesh.is_null() {
            return Err(CombineError::EmptyResult);
        }
        seam_triangle_uvs.extend(first.seam_triangle_uvs.iter().cloned());
        seam_triangle_uvs.extend(second.seam_triangle_uvs.iter().cloned());
        let broken_triangles = broken_triangles(mesh.vertices(), mesh.triangles());
        if !broken_triangles.is_empty() {
            debug!("{} broken triangles after combination", broken_triangles.len());
        }
        Ok(MeshState {
            mesh,
            seam_triangle_uvs,
            broken_triangles,
        })
    }
}

/// A tree of boolean combinations over shared leaf states
#[derive(Clone, Debug)]
pub enum CombineTree {
    Leaf(Arc<MeshState>),
    Node {
        method: Method,
        first: Box<CombineTree>,
        second: Box<CombineTree>,
    },
}

impl CombineTree {
    pub fn leaf(state: MeshState) -> Self {
        CombineTree::Leaf(Arc::new(state))
    }

    pub fn node(method: Method, first: CombineTree, second: CombineTree) -> Self {
        CombineTree::Node {
            method,
            first: Box::new(first),
            second: Box::new(second),
        }
    }

    /// Combine bottom-up. Sibling subtrees are evaluated concurrently with
    /// the `parallel` feature; a node waits for both.
    pub fn evaluate(&self, recombine: bool) -> Result<Arc<MeshState>, CombineError> {
        match self {
            CombineTree::Leaf(state) => Ok(Arc::clone(state)),
            CombineTree::Node { method, first, second } => {
                #[cfg(feature = "parallel")]
                let (first, second) = rayon::join(|| first.evaluate(recombine), || second.evaluate(recombine));

                #[cfg(not(feature = "parallel"))]
                let (first, second) = (first.evaluate(recombine), second.evaluate(recombine));

                let state = MeshState::combine_with(&*first?, &*second?, *method, recombine)?;
                Ok(Arc::new(state))
            },
        }
    }
}
