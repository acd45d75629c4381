use cpd_core::PointSetError;
use thiserror::Error;

/// Kind of numerical collapse detected while iterating.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Degeneracy {
    /// The total responsibility mass vanished, no moving point explains any fixed point.
    VanishingResponsibility {
        /// Total responsibility mass.
        np: f64,
    },
    /// The moving points were mapped onto a single location.
    Collapse {
        /// Mass weighted spread of the transformed moving points.
        spread: f64,
    },
    /// The noise variance is not a finite number.
    NonFinite {
        /// Offending variance.
        sigma2: f64,
    },
}

impl std::fmt::Display for Degeneracy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Degeneracy::VanishingResponsibility { np } => {
                write!(f, "responsibility mass vanished (Np = {np:e})")
            }
            Degeneracy::Collapse { spread } => {
                write!(f, "moving points collapsed to a single location (spread = {spread:e})")
            }
            Degeneracy::NonFinite { sigma2 } => write!(f, "non finite noise variance {sigma2}"),
        }
    }
}

/// Error types for the registration solvers.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// Invalid input data - a point set has no points.
    #[error("The {name} point set is empty")]
    EmptyPointSet {
        /// Which point set, `fixed` or `moving`.
        name: &'static str,
    },

    /// Invalid input data - the point sets have different dimensions.
    #[error("Dimension mismatch: fixed points are {fixed}D, moving points are {moving}D")]
    DimensionMismatch {
        /// Dimension of the fixed points.
        fixed: usize,
        /// Dimension of the moving points.
        moving: usize,
    },

    /// Invalid input data - a coordinate is NaN or infinite.
    #[error("The {name} point set contains non finite coordinates")]
    NonFinitePoint {
        /// Which point set, `fixed` or `moving`.
        name: &'static str,
    },

    /// Invalid configuration value.
    #[error("Invalid parameter {name} = {value}: {reason}")]
    InvalidParameter {
        /// Name of the parameter.
        name: &'static str,
        /// Value that was rejected.
        value: f64,
        /// Accepted range.
        reason: &'static str,
    },

    /// Point set construction failed.
    #[error(transparent)]
    PointSet(#[from] PointSetError),

    /// The parameter estimation hit a numerical collapse.
    #[error("Degenerate estimation: {0}")]
    Degenerate(Degeneracy),

    /// The registration loop terminated on a numerical collapse.
    #[error("Registration failed after {iterations} iterations (sigma2 = {sigma2:e}): {cause}")]
    RegistrationFailed {
        /// Number of completed iterations.
        iterations: usize,
        /// Last valid noise variance.
        sigma2: f64,
        /// What collapsed.
        cause: Degeneracy,
    },
}

impl RegistrationError {
    /// Whether the error was raised by input validation, before any iteration ran.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            RegistrationError::EmptyPointSet { .. }
                | RegistrationError::DimensionMismatch { .. }
                | RegistrationError::NonFinitePoint { .. }
                | RegistrationError::InvalidParameter { .. }
                | RegistrationError::PointSet(_)
        )
    }
}
