//! Geometry core for procedural 3D modeling: **boolean combination** of
//! closed triangle meshes, **seam recombination** of the combined result, and
//! **cyclic coordinate descent** inverse kinematics for skeleton chains.
//!
//! The boolean pipeline intersects the triangles of two [`mesh::Mesh`]es found
//! through their [`aabb_tree::AabbTree`]s, welds new points by
//! [`position_key::PositionKey`], re-triangulates every cut face and keeps the
//! triangle groups the chosen [`mesh::combiner::Method`] selects.
//!
//! # Features
//! #### Default
//! - **f64**: use f64 as Real
//!
//! #### Optional
//! - **f32**: use f32 as Real, this conflicts with f64
//! - **parallel**: use rayon for multithreading

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod aabb;
pub mod aabb_tree;
pub mod errors;
pub mod float_types;
pub mod ik;
pub mod math;
pub mod mesh;
pub mod position_key;

#[cfg(any(all(feature = "f64", feature = "f32"), not(any(feature = "f64", feature = "f32"))))]
compile_error!("Either 'f64' or 'f32' feature must be specified, but not both");

pub use errors::CombineError;
pub use mesh::Mesh;
pub use mesh::combiner::Method;
pub use mesh::state::MeshState;
