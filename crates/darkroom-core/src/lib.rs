//! # darkroom-core
//!
//! Core types for adaptive image processing.
//!
//! This crate provides the foundational vocabulary shared by the darkroom
//! engine crates:
//!
//! - [`Backend`] - The two execution paths work can be routed to
//! - [`OperationKind`] - Closed set of operation tags used as selection keys
//! - [`Error`], [`Result`] - Fail-fast validation errors
//! - [`rgb_to_rgba`], [`rgba_to_rgb`] - Lossless pixel-format conversion
//! - [`DispatchGrid`] - Workgroup geometry for 2D compute passes
//!
//! ## Crate Structure
//!
//! This crate is the foundation of the workspace and has no internal
//! dependencies:
//!
//! ```text
//! darkroom-core (this crate)
//!    ^
//!    |
//!    +-- darkroom-compute (adaptive dispatch engine, pools, kernels)
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backend;
pub mod error;
pub mod geometry;
pub mod pixel;

// Re-exports for convenience
pub use backend::{Backend, OperationKind};
pub use error::{Error, Result};
pub use geometry::{DispatchGrid, DEFAULT_WORKGROUP_SIZE};
pub use pixel::{rgb_to_rgba, rgba_to_rgb, OPAQUE_ALPHA};
