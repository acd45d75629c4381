use cpd_core::{linalg, PointSet};
use serde::{Deserialize, Serialize};

use crate::error::Degeneracy;

/// Ratio between the noise variance floor and the initial noise variance.
pub const SIGMA2_FLOOR_RATIO: f64 = 1e-8;

/// Structure to define the stopping rule of the EM loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceCriteria {
    /// Convergence tolerance on the relative change of the noise variance between two iterations.
    pub tolerance: f64,
    /// Maximum number of iterations to perform.
    pub max_iterations: usize,
}

impl Default for ConvergenceCriteria {
    fn default() -> Self {
        Self {
            tolerance: 1e-5,
            max_iterations: 150,
        }
    }
}

/// State of the EM loop after an iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConvergenceState {
    /// Keep iterating.
    Running,
    /// The relative change of the noise variance dropped below the tolerance.
    Converged,
    /// The iteration cap was hit, the last estimate is still usable.
    MaxIterationsReached,
    /// The estimate collapsed numerically.
    Degenerate(Degeneracy),
}

impl ConvergenceState {
    /// Whether the loop must stop.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ConvergenceState::Running)
    }
}

/// Loop local record threaded through the E-step, M-step and convergence check.
#[derive(Debug, Clone)]
pub struct IterationState<T> {
    /// Number of completed iterations.
    pub iteration: usize,
    /// Current transform estimate.
    pub transform: T,
    /// Current noise variance.
    pub sigma2: f64,
    /// Relative change of the noise variance in the last iteration.
    pub relative_change: f64,
    /// Negative log-likelihood of the last E-step.
    pub objective: f64,
}

/// Compute the initial noise variance of a registration.
///
/// The mean squared distance between every fixed and every moving point, divided by
/// the dimension, so that the first Gaussian kernels span the whole point spread.
pub fn initial_sigma2(fixed: &PointSet, moving: &PointSet) -> f64 {
    let denominator = (fixed.len() * moving.len() * fixed.dim()) as f64;
    linalg::sum_squared_distances(fixed.as_mat(), moving.as_mat()) / denominator
}

/// Convergence controller of the EM loop.
#[derive(Debug, Clone)]
pub struct Convergence {
    criteria: ConvergenceCriteria,
    sigma2_floor: f64,
    fixed_spread: f64,
}

impl Convergence {
    /// Create a controller for a run starting at `initial_sigma2`.
    ///
    /// # Arguments
    ///
    /// * `criteria` - The stopping rule.
    /// * `initial_sigma2` - The noise variance the loop starts from.
    /// * `fixed` - The fixed points, used to tell an alignment apart from a collapse.
    pub fn new(criteria: ConvergenceCriteria, initial_sigma2: f64, fixed: &PointSet) -> Self {
        let centroid = fixed.centroid();
        let weights = vec![1.0; fixed.len()];
        let total = fixed.len() as f64;
        let fixed_spread =
            linalg::weighted_second_moment(fixed.as_mat(), &weights, centroid.as_ref(), total)
                / total;

        Self {
            criteria,
            sigma2_floor: initial_sigma2 * SIGMA2_FLOOR_RATIO,
            fixed_spread,
        }
    }

    /// The lower bound of the noise variance for this run.
    #[inline]
    pub fn sigma2_floor(&self) -> f64 {
        self.sigma2_floor
    }

    /// The stopping rule of this run.
    #[inline]
    pub fn criteria(&self) -> &ConvergenceCriteria {
        &self.criteria
    }

    /// Relative change between two consecutive noise variances.
    #[inline]
    pub fn relative_change(sigma2_prev: f64, sigma2_new: f64) -> f64 {
        (sigma2_prev - sigma2_new).abs() / sigma2_prev
    }

    /// Evaluate the loop state after an M-step.
    ///
    /// # Arguments
    ///
    /// * `iteration` - Number of completed iterations, including this one.
    /// * `sigma2_prev` - Noise variance before the M-step.
    /// * `sigma2_new` - Noise variance estimated by the M-step.
    /// * `moving_spread` - Mass weighted spread of the transformed moving points.
    pub fn evaluate(
        &self,
        iteration: usize,
        sigma2_prev: f64,
        sigma2_new: f64,
        moving_spread: f64,
    ) -> ConvergenceState {
        if !sigma2_new.is_finite() {
            return ConvergenceState::Degenerate(Degeneracy::NonFinite { sigma2: sigma2_new });
        }

        // a collapse drives the variance to the floor while losing the spread of the fixed
        // points, an exact alignment keeps that spread and a pure translation keeps the variance
        if sigma2_new <= self.sigma2_floor
            && moving_spread <= self.sigma2_floor
            && self.fixed_spread > self.sigma2_floor
        {
            return ConvergenceState::Degenerate(Degeneracy::Collapse {
                spread: moving_spread,
            });
        }

        if Self::relative_change(sigma2_prev, sigma2_new) < self.criteria.tolerance {
            return ConvergenceState::Converged;
        }

        if iteration >= self.criteria.max_iterations {
            return ConvergenceState::MaxIterationsReached;
        }

        ConvergenceState::Running
    }
}
