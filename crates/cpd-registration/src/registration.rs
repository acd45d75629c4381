use std::{
    borrow::Cow,
    ops::ControlFlow,
    time::{Duration, Instant},
};

use cpd_core::{normalization::Normalization, PointSet};

use crate::{
    config::{EmOptions, RigidConfig},
    convergence::{initial_sigma2, Convergence, ConvergenceState, IterationState},
    error::RegistrationError,
    model::TransformationModel,
    probabilities::compute_responsibilities,
    rigid::RigidTransform,
};

/// How the registration loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The relative change of the noise variance dropped below the tolerance.
    Converged,
    /// The iteration cap was hit before converging.
    MaxIterationsReached,
    /// The observer asked to stop.
    Stopped,
}

/// Result of a CPD registration.
///
/// The transform maps the moving points onto the fixed points.
#[derive(Debug, Clone)]
pub struct RegistrationResult<T> {
    /// Estimated transform.
    pub transform: T,
    /// Final noise variance.
    pub sigma2: f64,
    /// The moving points after applying the estimated transform.
    pub points: PointSet,
    /// The total number of iterations performed.
    pub iterations: usize,
    /// How the loop ended.
    pub termination: Termination,
    /// Negative log-likelihood of the last E-step, in normalized units when normalizing.
    pub objective: f64,
    /// Index of the most likely fixed point of every moving point, if requested.
    pub correspondence: Option<Vec<usize>>,
    /// Wall clock time of the registration.
    pub runtime: Duration,
}

impl<T> RegistrationResult<T> {
    /// Whether the loop stopped on the convergence tolerance.
    #[inline]
    pub fn converged(&self) -> bool {
        self.termination == Termination::Converged
    }
}

/// Result of a rigid CPD registration.
pub type RigidResult = RegistrationResult<RigidTransform>;

/// Progress of the EM loop handed to the observer after every iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationReport {
    /// Number of completed iterations.
    pub iteration: usize,
    /// Noise variance after the iteration.
    pub sigma2: f64,
    /// Relative change of the noise variance in the iteration.
    pub relative_change: f64,
    /// Negative log-likelihood of the iteration's E-step.
    pub objective: f64,
}

fn validate_inputs(fixed: &PointSet, moving: &PointSet) -> Result<(), RegistrationError> {
    if fixed.is_empty() {
        return Err(RegistrationError::EmptyPointSet { name: "fixed" });
    }
    if moving.is_empty() {
        return Err(RegistrationError::EmptyPointSet { name: "moving" });
    }
    if fixed.dim() != moving.dim() {
        return Err(RegistrationError::DimensionMismatch {
            fixed: fixed.dim(),
            moving: moving.dim(),
        });
    }
    if !fixed.is_finite() {
        return Err(RegistrationError::NonFinitePoint { name: "fixed" });
    }
    if !moving.is_finite() {
        return Err(RegistrationError::NonFinitePoint { name: "moving" });
    }
    Ok(())
}

/// Coherent Point Drift registration with any transformation model.
///
/// # Arguments
///
/// * `model` - The transformation model estimated in the M-step.
/// * `fixed` - The N×D fixed points.
/// * `moving` - The M×D moving points.
/// * `options` - Options of the EM loop.
/// * `observer` - Called after every iteration, return `ControlFlow::Break(())` to stop early.
///
/// # Returns
///
/// The estimated transform with the transformed moving points and the loop diagnostics.
/// Hitting the iteration cap is not an error, see [`RegistrationResult::termination`].
///
/// # Errors
///
/// Invalid inputs are reported before the loop starts. A numerical collapse during the
/// loop is reported as [`RegistrationError::RegistrationFailed`] with the last valid state.
pub fn register<M, F>(
    model: &M,
    fixed: &PointSet,
    moving: &PointSet,
    options: &EmOptions,
    mut observer: F,
) -> Result<RegistrationResult<M::Transform>, RegistrationError>
where
    M: TransformationModel,
    F: FnMut(&IterationReport) -> ControlFlow<()>,
{
    let start = Instant::now();

    validate_inputs(fixed, moving)?;
    options.validate()?;

    if options.use_fast_approximation {
        log::warn!("fast approximation requested, computing the exact E-step");
    }

    let (normalization, fixed, moving) = match options.normalize {
        true => {
            let (normalization, fixed, moving) = Normalization::new(fixed, moving);
            (Some(normalization), Cow::Owned(fixed), Cow::Owned(moving))
        }
        false => (None, Cow::Borrowed(fixed), Cow::Borrowed(moving)),
    };
    let sigma2_scale = normalization.as_ref().map_or(1.0, |n| n.scale * n.scale);

    let sigma2_init = match options.initial_sigma2 {
        Some(sigma2) => sigma2 / sigma2_scale,
        None => initial_sigma2(&fixed, &moving),
    };
    if !(sigma2_init.is_finite() && sigma2_init > 0.0) {
        return Err(RegistrationError::InvalidParameter {
            name: "sigma2",
            value: sigma2_init,
            reason: "initial noise variance must be strictly positive, do all points coincide?",
        });
    }

    let convergence = Convergence::new(options.criteria, sigma2_init, &fixed);

    let mut state = IterationState {
        iteration: 0,
        transform: model.identity(fixed.dim()),
        sigma2: sigma2_init,
        relative_change: f64::INFINITY,
        objective: f64::INFINITY,
    };
    let mut points = model.apply(&state.transform, &moving);

    log::debug!(
        "CPD on {} fixed and {} moving points of dimension {}, initial sigma2 {:e}",
        fixed.len(),
        moving.len(),
        fixed.dim(),
        sigma2_init
    );

    // main em loop
    let termination = loop {
        let now = Instant::now();

        // E-step on the currently transformed moving points
        let probabilities =
            compute_responsibilities(&fixed, &points, state.sigma2, options.outlier_weight, false)?;

        // M-step on the untransformed moving points
        let estimate = model
            .estimate(&fixed, &moving, &probabilities, convergence.sigma2_floor())
            .map_err(|err| match err {
                RegistrationError::Degenerate(cause) => RegistrationError::RegistrationFailed {
                    iterations: state.iteration,
                    sigma2: state.sigma2 * sigma2_scale,
                    cause,
                },
                other => other,
            })?;

        let iteration = state.iteration + 1;
        let status = convergence.evaluate(
            iteration,
            state.sigma2,
            estimate.sigma2,
            estimate.moving_spread,
        );
        if let ConvergenceState::Degenerate(cause) = status {
            return Err(RegistrationError::RegistrationFailed {
                iterations: state.iteration,
                sigma2: state.sigma2 * sigma2_scale,
                cause,
            });
        }

        state = IterationState {
            iteration,
            relative_change: Convergence::relative_change(state.sigma2, estimate.sigma2),
            transform: estimate.transform,
            sigma2: estimate.sigma2,
            objective: probabilities.objective,
        };
        points = model.apply(&state.transform, &moving);

        log::debug!(
            "Iteration: {} sigma2: {:e} change: {:e} objective: {}",
            state.iteration,
            state.sigma2,
            state.relative_change,
            state.objective
        );
        log::debug!("elapsed: {:?}", now.elapsed());

        let flow = observer(&IterationReport {
            iteration: state.iteration,
            sigma2: state.sigma2 * sigma2_scale,
            relative_change: state.relative_change,
            objective: state.objective,
        });

        match status {
            ConvergenceState::Converged => break Termination::Converged,
            ConvergenceState::MaxIterationsReached => {
                log::warn!(
                    "CPD stopped at the cap of {} iterations, change {:e} above tolerance {:e}",
                    state.iteration,
                    state.relative_change,
                    convergence.criteria().tolerance
                );
                break Termination::MaxIterationsReached;
            }
            _ if flow.is_break() => break Termination::Stopped,
            _ => {}
        }
    };

    log::debug!(
        "CPD finished with {:?} in {} iterations, sigma2 {:e}",
        termination,
        state.iteration,
        state.sigma2
    );

    let correspondence = match options.correspondence {
        true => {
            compute_responsibilities(&fixed, &points, state.sigma2, options.outlier_weight, true)?
                .correspondence
        }
        false => None,
    };

    let (transform, points) = match &normalization {
        Some(normalization) => (
            model.denormalize(&state.transform, normalization),
            normalization.denormalize_points(&points),
        ),
        None => (state.transform, points),
    };

    Ok(RegistrationResult {
        transform,
        sigma2: state.sigma2 * sigma2_scale,
        points,
        iterations: state.iteration,
        termination,
        objective: state.objective,
        correspondence,
        runtime: start.elapsed(),
    })
}

/// Rigid Coherent Point Drift registration.
///
/// # Arguments
///
/// * `fixed` - The N×D fixed points.
/// * `moving` - The M×D moving points.
/// * `config` - Registration configuration.
///
/// # Returns
///
/// The rotation, scale and translation mapping the moving points onto the fixed points.
///
/// Example:
///
/// ```
/// use cpd_core::{transforms::rotation_2d, PointSet};
/// use cpd_registration::{rigid_registration, RigidConfig};
///
/// let moving = PointSet::from_rows(&[[0.0, 0.0], [2.0, 0.0], [0.0, 1.0], [3.0, 1.5]]).unwrap();
/// let fixed = moving.transformed(rotation_2d(0.2).as_ref(), 1.0, faer::col![1.0, 0.0].as_ref());
///
/// let result = rigid_registration(&fixed, &moving, &RigidConfig::default()).unwrap();
/// assert_eq!(result.points.len(), moving.len());
/// ```
pub fn rigid_registration(
    fixed: &PointSet,
    moving: &PointSet,
    config: &RigidConfig,
) -> Result<RigidResult, RegistrationError> {
    rigid_registration_with_observer(fixed, moving, config, |_| ControlFlow::Continue(()))
}

/// Rigid Coherent Point Drift registration reporting every iteration to an observer.
///
/// The observer may return `ControlFlow::Break(())` to stop the loop early, the
/// result then carries [`Termination::Stopped`].
pub fn rigid_registration_with_observer<F>(
    fixed: &PointSet,
    moving: &PointSet,
    config: &RigidConfig,
    observer: F,
) -> Result<RigidResult, RegistrationError>
where
    F: FnMut(&IterationReport) -> ControlFlow<()>,
{
    register(&config.model(), fixed, moving, &config.em_options(), observer)
}

impl RigidConfig {
    /// Register `moving` onto `fixed` with this configuration.
    pub fn compute(
        &self,
        fixed: &PointSet,
        moving: &PointSet,
    ) -> Result<RigidResult, RegistrationError> {
        rigid_registration(fixed, moving, self)
    }
}
