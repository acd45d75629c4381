use serde::{Deserialize, Serialize};

use crate::{convergence::ConvergenceCriteria, error::RegistrationError, rigid::Rigid};

/// Options of the EM loop shared by every transformation model.
#[derive(Debug, Clone, PartialEq)]
pub struct EmOptions {
    /// Stopping rule.
    pub criteria: ConvergenceCriteria,
    /// Expected fraction of outliers, in `[0, 1)`.
    pub outlier_weight: f64,
    /// Request an approximate E-step. Resolved to the exact computation.
    pub use_fast_approximation: bool,
    /// Register normalized copies of the point sets and map the result back.
    pub normalize: bool,
    /// Extract the most likely fixed point of every moving point.
    pub correspondence: bool,
    /// Start from this noise variance instead of the mean squared distance.
    pub initial_sigma2: Option<f64>,
}

impl Default for EmOptions {
    fn default() -> Self {
        RigidConfig::default().em_options()
    }
}

impl EmOptions {
    /// Check the options before any iteration runs.
    pub fn validate(&self) -> Result<(), RegistrationError> {
        let tolerance = self.criteria.tolerance;
        if !(tolerance.is_finite() && tolerance > 0.0) {
            return Err(RegistrationError::InvalidParameter {
                name: "tolerance",
                value: tolerance,
                reason: "must be finite and strictly positive",
            });
        }
        if self.criteria.max_iterations < 1 {
            return Err(RegistrationError::InvalidParameter {
                name: "max_iterations",
                value: self.criteria.max_iterations as f64,
                reason: "must be at least 1",
            });
        }
        if !(0.0..1.0).contains(&self.outlier_weight) {
            return Err(RegistrationError::InvalidParameter {
                name: "outlier_weight",
                value: self.outlier_weight,
                reason: "must be in [0, 1)",
            });
        }
        if let Some(sigma2) = self.initial_sigma2 {
            if !(sigma2.is_finite() && sigma2 > 0.0) {
                return Err(RegistrationError::InvalidParameter {
                    name: "initial_sigma2",
                    value: sigma2,
                    reason: "must be finite and strictly positive",
                });
            }
        }
        Ok(())
    }
}

/// Configuration of a rigid CPD registration.
///
/// Deserializing accepts partial documents, missing fields take their default value.
///
/// Example:
///
/// ```
/// use cpd_registration::RigidConfig;
///
/// let config = RigidConfig {
///     allow_scaling: false,
///     ..Default::default()
/// };
/// assert_eq!(config.max_iterations, 150);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigidConfig {
    /// Convergence tolerance on the relative change of the noise variance.
    pub tolerance: f64,
    /// Maximum number of iterations to perform.
    pub max_iterations: usize,
    /// Expected fraction of outliers, in `[0, 1)`.
    pub outlier_weight: f64,
    /// Request an approximate E-step. Resolved to the exact computation.
    pub use_fast_approximation: bool,
    /// Force a proper rotation by correcting reflections.
    pub strict_rotation: bool,
    /// Estimate a uniform scale.
    pub allow_scaling: bool,
    /// Register normalized copies of the point sets and map the result back.
    pub normalize: bool,
    /// Extract the most likely fixed point of every moving point.
    pub correspondence: bool,
    /// Start from this noise variance instead of the mean squared distance.
    pub initial_sigma2: Option<f64>,
}

impl Default for RigidConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-5,
            max_iterations: 150,
            outlier_weight: 0.1,
            use_fast_approximation: false,
            strict_rotation: true,
            allow_scaling: true,
            normalize: false,
            correspondence: false,
            initial_sigma2: None,
        }
    }
}

impl RigidConfig {
    /// The rigid parameter estimator described by this configuration.
    pub fn model(&self) -> Rigid {
        Rigid {
            strict_rotation: self.strict_rotation,
            allow_scaling: self.allow_scaling,
        }
    }

    /// The model independent loop options described by this configuration.
    pub fn em_options(&self) -> EmOptions {
        EmOptions {
            criteria: ConvergenceCriteria {
                tolerance: self.tolerance,
                max_iterations: self.max_iterations,
            },
            outlier_weight: self.outlier_weight,
            use_fast_approximation: self.use_fast_approximation,
            normalize: self.normalize,
            correspondence: self.correspondence,
            initial_sigma2: self.initial_sigma2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RigidConfig::default();
        assert_eq!(config.tolerance, 1e-5);
        assert_eq!(config.max_iterations, 150);
        assert_eq!(config.outlier_weight, 0.1);
        assert!(!config.use_fast_approximation);
        assert!(config.strict_rotation);
        assert!(config.allow_scaling);
        assert!(config.em_options().validate().is_ok());
    }

    #[test]
    fn test_deserialize_partial() -> Result<(), Box<dyn std::error::Error>> {
        let config: RigidConfig =
            serde_json::from_str(r#"{ "allow_scaling": false, "outlier_weight": 0.25 }"#)?;
        assert!(!config.allow_scaling);
        assert_eq!(config.outlier_weight, 0.25);
        assert_eq!(config.max_iterations, 150);
        assert_eq!(config.initial_sigma2, None);

        let json = serde_json::to_string(&config)?;
        let back: RigidConfig = serde_json::from_str(&json)?;
        assert_eq!(back, config);
        Ok(())
    }

    #[test]
    fn test_validate() {
        let invalid = [
            RigidConfig {
                tolerance: 0.0,
                ..Default::default()
            },
            RigidConfig {
                tolerance: f64::NAN,
                ..Default::default()
            },
            RigidConfig {
                max_iterations: 0,
                ..Default::default()
            },
            RigidConfig {
                outlier_weight: 1.0,
                ..Default::default()
            },
            RigidConfig {
                outlier_weight: -0.1,
                ..Default::default()
            },
            RigidConfig {
                initial_sigma2: Some(0.0),
                ..Default::default()
            },
        ];
        for config in invalid.iter() {
            let err = config.em_options().validate().unwrap_err();
            assert!(err.is_invalid_input(), "{err}");
        }

        let valid = RigidConfig {
            outlier_weight: 0.0,
            initial_sigma2: Some(2.0),
            ..Default::default()
        };
        assert!(valid.em_options().validate().is_ok());
    }

    #[test]
    fn test_model() {
        let config = RigidConfig {
            strict_rotation: false,
            ..Default::default()
        };
        let model = config.model();
        assert!(!model.strict_rotation);
        assert!(model.allow_scaling);
    }
}
