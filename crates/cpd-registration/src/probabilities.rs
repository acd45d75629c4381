use std::f64::consts::PI;

use cpd_core::PointSet;
use faer::Mat;
use rayon::prelude::*;

use crate::error::RegistrationError;

/// Soft correspondences between a fixed and a moving point set (E-step output).
///
/// The moving points are the centroids of a Gaussian mixture and the fixed
/// points are the data it explains, plus one uniform outlier component. Entry
/// `(m, n)` of `p` is the posterior probability that moving point `m` generated
/// fixed point `n`, so every column sums to at most one and the remainder is the
/// probability that fixed point `n` is an outlier.
///
/// Normalization is per fixed point: what the row-wise formulation of CPD calls a row
/// is a column of `p` here, bounded by one, while the row sums in `p1` can exceed one.
#[derive(Debug, Clone)]
pub struct Responsibilities {
    /// The M×N posterior matrix.
    pub p: Mat<f64>,
    /// Row sums `P * 1`, one per moving point.
    pub p1: Vec<f64>,
    /// Column sums `P^T * 1`, one per fixed point.
    pub pt1: Vec<f64>,
    /// The M×D product `P * X`.
    pub px: Mat<f64>,
    /// Total responsibility mass `sum(P)`.
    pub np: f64,
    /// Negative log-likelihood of the mixture, up to a constant.
    pub objective: f64,
    /// Index of the most likely fixed point for every moving point, if requested.
    pub correspondence: Option<Vec<usize>>,
}

/// Compute the responsibilities of a moving point set over a fixed point set.
///
/// # Arguments
///
/// * `fixed` - The N×D fixed points.
/// * `moving` - The M×D moving points, already transformed by the current estimate.
/// * `sigma2` - The isotropic variance shared by all Gaussian components.
/// * `outlier_weight` - Expected fraction of outliers, in `[0, 1)`.
/// * `with_correspondence` - Also extract the most likely fixed point per moving point.
///
/// # Returns
///
/// The responsibilities with the marginals needed by the parameter estimators.
///
/// A fixed point whose normalizer underflows to zero gets an all zero column,
/// i.e. it is treated as a pure outlier and skipped in the objective.
pub fn compute_responsibilities(
    fixed: &PointSet,
    moving: &PointSet,
    sigma2: f64,
    outlier_weight: f64,
    with_correspondence: bool,
) -> Result<Responsibilities, RegistrationError> {
    if !(sigma2.is_finite() && sigma2 > 0.0) {
        return Err(RegistrationError::InvalidParameter {
            name: "sigma2",
            value: sigma2,
            reason: "must be finite and strictly positive",
        });
    }
    if !(0.0..1.0).contains(&outlier_weight) {
        return Err(RegistrationError::InvalidParameter {
            name: "outlier_weight",
            value: outlier_weight,
            reason: "must be in [0, 1)",
        });
    }
    if fixed.dim() != moving.dim() {
        return Err(RegistrationError::DimensionMismatch {
            fixed: fixed.dim(),
            moving: moving.dim(),
        });
    }

    let (num_fixed, num_moving, dim) = (fixed.len(), moving.len(), fixed.dim());
    let x = fixed.as_mat();
    let y = moving.as_mat();

    // uniform density of the outlier component, scaled into kernel units
    let ksig = -2.0 * sigma2;
    let outlier_term = outlier_weight / (1.0 - outlier_weight)
        * (num_moving as f64 / num_fixed as f64)
        * (2.0 * PI * sigma2).powf(0.5 * dim as f64);

    // column major buffer, one contiguous column of M entries per fixed point
    let mut data = vec![0.0; num_moving * num_fixed];
    let log_normalizers = data
        .par_chunks_mut(num_moving)
        .enumerate()
        .map(|(n, column)| {
            let mut sp = 0.0;
            for (m, value) in column.iter_mut().enumerate() {
                let mut dist = 0.0;
                for k in 0..dim {
                    dist += (x.read(n, k) - y.read(m, k)).powi(2);
                }
                *value = (dist / ksig).exp();
                sp += *value;
            }
            sp += outlier_term;

            if sp > 0.0 && sp.is_finite() {
                column.iter_mut().for_each(|v| *v /= sp);
                Some(sp.ln())
            } else {
                column.iter_mut().for_each(|v| *v = 0.0);
                None
            }
        })
        .collect::<Vec<_>>();

    let num_underflow = log_normalizers.iter().filter(|l| l.is_none()).count();
    if num_underflow > 0 {
        log::debug!("{} fixed points underflowed to pure outliers", num_underflow);
    }

    let objective = -log_normalizers.iter().flatten().sum::<f64>()
        + 0.5 * (num_fixed * dim) as f64 * sigma2.ln();

    let pt1 = data
        .chunks(num_moving)
        .map(|column| column.iter().sum::<f64>())
        .collect::<Vec<_>>();

    let mut p1 = vec![0.0; num_moving];
    for column in data.chunks(num_moving) {
        for (acc, v) in p1.iter_mut().zip(column.iter()) {
            *acc += v;
        }
    }

    let np = pt1.iter().sum::<f64>();
    let p = Mat::from_fn(num_moving, num_fixed, |m, n| data[n * num_moving + m]);
    let px = p.as_ref() * x;

    let correspondence = with_correspondence.then(|| {
        (0..num_moving)
            .map(|m| {
                let mut best = (0, f64::NEG_INFINITY);
                for n in 0..num_fixed {
                    let v = data[n * num_moving + m];
                    if v > best.1 {
                        best = (n, v);
                    }
                }
                best.0
            })
            .collect::<Vec<_>>()
    });

    Ok(Responsibilities {
        p,
        p1,
        pt1,
        px,
        np,
        objective,
        correspondence,
    })
}
