//! Spine 3.8 skeletal animation runtime for offline rendering.
//!
//! This crate is renderer-agnostic: it loads skeletons and atlases, poses skeletons from
//! animations and flattens them into a [`DrawList`]. GPU rasterization lives in
//! `spinevid-wgpu`, the batch video renderer in `spinevid-render`.

#![forbid(unsafe_code)]

mod atlas;
mod attachment;
mod error;
mod geometry;
#[cfg(any(feature = "json", feature = "binary"))]
mod ids;
#[cfg(any(feature = "json", feature = "binary"))]
mod loader;
mod model;
mod render;
mod runtime;
mod version;

#[cfg(feature = "json")]
pub mod json;

#[cfg(feature = "binary")]
pub mod binary;

pub use atlas::*;
pub use attachment::QUAD_TRIANGLES;
pub use error::*;
pub use geometry::{Affine2, wrap_degrees};
pub use model::*;
pub use render::*;
pub use runtime::*;
pub use version::*;

#[cfg(test)]
mod geometry_tests;

#[cfg(all(test, feature = "json"))]
mod json_tests;

#[cfg(all(test, feature = "binary"))]
mod binary_tests;
