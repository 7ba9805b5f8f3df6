//! Combination and triangulation errors

use std::fmt::Display;

/// All the ways a boolean combination can fail to produce a mesh
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CombineError {
    /// (NullInput) One of the inputs has no vertices
    NullInput,
    /// (InvalidInput) A face references a vertex that does not exist
    InvalidInput {
        face: usize,
        index: usize,
        vertex_count: usize,
    },
    /// (Geometric) The intersection could not be resolved into a closed result
    Geometric(String),
    /// (EmptyResult) The operation kept no triangles
    EmptyResult,
    /// Polygon triangulation failed
    Triangulate(#[from] TriangulateError),
}

impl Display for CombineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CombineError::NullInput => write!(f, "(NullInput) One of the input meshes is empty"),
            CombineError::InvalidInput { face, index, vertex_count } => write!(
                f,
                "(InvalidInput) Face {} references vertex {} but only {} vertices exist",
                face, index, vertex_count
            ),
            CombineError::Geometric(reason) => write!(f, "(Geometric) {}", reason),
            CombineError::EmptyResult => write!(f, "(EmptyResult) The combination kept no triangles"),
            CombineError::Triangulate(error) => error.fmt(f),
        }
    }
}

/// Failures while turning polygons into triangles
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TriangulateError {
    /// (Earcut) The ear clipper rejected the projected polygon
    Earcut(String),
    /// (DegeneratePolygon) The polygon has no usable area or plane
    DegeneratePolygon(usize),
    /// (Branching) An intersection point joins more than two edges
    Branching(usize),
    /// (Unresolved) The split edges do not partition the triangle
    Unresolved(String),
}

impl Display for TriangulateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriangulateError::Earcut(reason) => write!(f, "(Earcut) Ear clipping failed: {}", reason),
            TriangulateError::DegeneratePolygon(count) => write!(
                f,
                "(DegeneratePolygon) A polygon of {} points does not span a plane",
                count
            ),
            TriangulateError::Branching(index) => write!(f, "(Branching) Point {} has more than two split edges", index),
            TriangulateError::Unresolved(reason) => write!(f, "(Unresolved) {}", reason),
        }
    }
}
