#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Registration configuration.
pub mod config;

/// Stopping rule of the EM loop.
pub mod convergence;

/// Error types of the registration.
pub mod error;

/// Transformation model abstraction.
pub mod model;

/// E-step responsibilities.
pub mod probabilities;

mod registration;
pub use registration::*;

/// Rigid transform and its estimator.
pub mod rigid;

pub use config::{EmOptions, RigidConfig};
pub use error::{Degeneracy, RegistrationError};
pub use model::TransformationModel;
pub use rigid::{Rigid, RigidTransform};
