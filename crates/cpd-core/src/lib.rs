#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Linear algebra utilities.
pub mod linalg;

/// Joint normalization of point set pairs.
pub mod normalization;

/// Dense point set container.
pub mod pointset;

/// Rotation matrix builders.
pub mod transforms;

pub use pointset::{PointSet, PointSetError};
