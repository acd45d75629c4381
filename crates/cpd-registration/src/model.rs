use cpd_core::{normalization::Normalization, PointSet};

use crate::{error::RegistrationError, probabilities::Responsibilities};

/// A transform estimated by the M-step together with the updated noise variance.
#[derive(Debug, Clone)]
pub struct Estimate<T> {
    /// The estimated transform, mapping moving points onto fixed points.
    pub transform: T,
    /// The updated noise variance, already floored.
    pub sigma2: f64,
    /// Spread of the transformed moving points, `sum_m p1_m ||T(y_m) - mean||^2 / Np`.
    ///
    /// Used by the convergence controller to tell an alignment apart from a collapse.
    pub moving_spread: f64,
}

/// Capability shared by the transform families CPD can estimate.
///
/// A model knows how to apply its transform to a point set and how to estimate
/// it in closed form from the E-step responsibilities.
pub trait TransformationModel {
    /// The transform estimated by this model.
    type Transform: Clone + std::fmt::Debug + Send + Sync;

    /// The transform that leaves points of dimension `dim` unchanged.
    fn identity(&self, dim: usize) -> Self::Transform;

    /// Apply a transform to a point set.
    fn apply(&self, transform: &Self::Transform, points: &PointSet) -> PointSet;

    /// Estimate the transform and noise variance from the responsibilities.
    ///
    /// # Arguments
    ///
    /// * `fixed` - The N×D fixed points.
    /// * `moving` - The untransformed M×D moving points.
    /// * `probabilities` - Responsibilities computed on the currently transformed moving points.
    /// * `sigma2_floor` - Lower bound for the returned variance.
    fn estimate(
        &self,
        fixed: &PointSet,
        moving: &PointSet,
        probabilities: &Responsibilities,
        sigma2_floor: f64,
    ) -> Result<Estimate<Self::Transform>, RegistrationError>;

    /// Number of free parameters of the transform for points of dimension `dim`.
    fn degrees_of_freedom(&self, dim: usize) -> usize;

    /// Express a transform estimated between normalized sets in the original frames.
    fn denormalize(&self, transform: &Self::Transform, normalization: &Normalization)
        -> Self::Transform;
}
