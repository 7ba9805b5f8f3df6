//! Boolean combination of two [`Mesh`]es with vertex provenance.

use crate::errors::CombineError;
use crate::float_types::Real;
use crate::mesh::Mesh;
use crate::mesh::boolean::BooleanOperation;
use crate::position_key::PositionKey;
use log::trace;
use nalgebra::Point3;
use std::collections::BTreeMap;

pub use crate::mesh::boolean::Method;

/// Which input a combined vertex was taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Source {
    First,
    Second,
    /// Created where the two surfaces cross
    #[default]
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VertexSource {
    pub source: Source,
    /// Vertex index in the source mesh; `0` for [`Source::None`]
    pub index: usize,
}

impl VertexSource {
    pub const fn new(source: Source, index: usize) -> Self {
        Self { source, index }
    }
}

/// Combine two meshes. Either input being null fails before any geometry work.
pub fn combine(first: &Mesh, second: &Mesh, method: Method) -> Result<Mesh, CombineError> {
    let (vertices, triangles) = run(first, second, method)?;
    Mesh::from_triangles(vertices, triangles)
}

/// Combine two meshes and report where every output vertex came from.
///
/// A position present in both inputs is attributed to the first.
pub fn combine_with_sources(
    first: &Mesh,
    second: &Mesh,
    method: Method,
) -> Result<(Mesh, Vec<VertexSource>), CombineError> {
    let (vertices, triangles) = run(first, second, method)?;

    let mut source_map: BTreeMap<PositionKey, VertexSource> = BTreeMap::new();
    for (mesh, source) in [(first, Source::First), (second, Source::Second)] {
        for (index, vertex) in mesh.vertices().iter().enumerate() {
            source_map
                .entry(PositionKey::from(vertex))
                .or_insert(VertexSource::new(source, index));
        }
    }
    let sources: Vec<VertexSource> = vertices
        .iter()
        .map(|vertex| source_map.get(&PositionKey::from(vertex)).copied().unwrap_or_default())
        .collect();
    trace!(
        "{} of {} combined vertices are new",
        sources.iter().filter(|s| s.source == Source::None).count(),
        sources.len()
    );

    Ok((Mesh::from_triangles(vertices, triangles)?, sources))
}

fn run(
    first: &Mesh,
    second: &Mesh,
    method: Method,
) -> Result<(Vec<Point3<Real>>, Vec<[usize; 3]>), CombineError> {
    if first.is_null() || second.is_null() {
        return Err(CombineError::NullInput);
    }
    let mut operation = BooleanOperation::new(first.solid(), second.solid());
    operation.combine()?;
    operation.fetch(method)
}

impl Mesh {
    pub fn union(&self, other: &Mesh) -> Result<Mesh, CombineError> {
        combine(self, other, Method::Union)
    }

    pub fn difference(&self, other: &Mesh) -> Result<Mesh, CombineError> {
        combine(self, other, Method::Difference)
    }

    pub fn intersection(&self, other: &Mesh) -> Result<Mesh, CombineError> {
        combine(self, other, Method::Intersection)
    }
}
