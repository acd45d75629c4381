use cpd_core::{linalg, normalization::Normalization, PointSet};
use faer::{Col, Mat};

use crate::{
    error::{Degeneracy, RegistrationError},
    model::{Estimate, TransformationModel},
    probabilities::Responsibilities,
};

/// A rigid transform with optional uniform scale.
///
/// Maps a moving point `y` onto the fixed frame as `scale * rotation * y + translation`.
#[derive(Debug, Clone)]
pub struct RigidTransform {
    /// D×D rotation matrix.
    pub rotation: Mat<f64>,
    /// Uniform scale, `1.0` when scaling is disabled.
    pub scale: f64,
    /// D dimensional translation vector.
    pub translation: Col<f64>,
}

impl RigidTransform {
    /// The identity transform for points of dimension `dim`.
    pub fn identity(dim: usize) -> Self {
        Self {
            rotation: Mat::identity(dim, dim),
            scale: 1.0,
            translation: Col::zeros(dim),
        }
    }

    /// Dimension of the points this transform applies to.
    #[inline]
    pub fn dim(&self) -> usize {
        self.rotation.nrows()
    }

    /// Apply the transform to a point set.
    pub fn apply(&self, points: &PointSet) -> PointSet {
        points.transformed(self.rotation.as_ref(), self.scale, self.translation.as_ref())
    }

    /// The transform as a (D+1)×(D+1) homogeneous matrix.
    pub fn matrix(&self) -> Mat<f64> {
        linalg::homogeneous_matrix(self.rotation.as_ref(), self.scale, self.translation.as_ref())
    }

    /// The inverse transform, mapping fixed points back onto the moving frame.
    ///
    /// PRECONDITION: the scale is not zero.
    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.transpose().to_owned();
        let scale = 1.0 / self.scale;
        let rt = rotation.as_ref() * self.translation.as_ref();
        let translation = Col::from_fn(self.dim(), |i| -scale * rt.read(i));
        Self {
            rotation,
            scale,
            translation,
        }
    }
}

/// Rigid CPD parameter estimator (M-step).
///
/// Solves the weighted orthogonal Procrustes problem in closed form from the
/// singular value decomposition of the weighted cross-covariance.
#[derive(Debug, Clone, Copy)]
pub struct Rigid {
    /// Force a proper rotation (`det(R) = +1`) by correcting reflections.
    pub strict_rotation: bool,
    /// Estimate a uniform scale instead of fixing it to one.
    pub allow_scaling: bool,
}

impl Default for Rigid {
    fn default() -> Self {
        Self {
            strict_rotation: true,
            allow_scaling: true,
        }
    }
}

impl TransformationModel for Rigid {
    type Transform = RigidTransform;

    fn identity(&self, dim: usize) -> RigidTransform {
        RigidTransform::identity(dim)
    }

    fn apply(&self, transform: &RigidTransform, points: &PointSet) -> PointSet {
        transform.apply(points)
    }

    fn estimate(
        &self,
        fixed: &PointSet,
        moving: &PointSet,
        probabilities: &Responsibilities,
        sigma2_floor: f64,
    ) -> Result<Estimate<RigidTransform>, RegistrationError> {
        let np = probabilities.np;
        if !(np > f64::EPSILON) {
            return Err(RegistrationError::Degenerate(
                Degeneracy::VanishingResponsibility { np },
            ));
        }

        let dim = fixed.dim();
        let x = fixed.as_mat();
        let y = moving.as_mat();

        // weighted centroids
        let mu_x = linalg::weighted_centroid(x, &probabilities.pt1, np);
        let mu_y = linalg::weighted_centroid(y, &probabilities.p1, np);

        // cross covariance A = Y^T * P * X - Np * mu_y * mu_x^T, rows indexed by moving axes
        let ytpx = y.transpose() * probabilities.px.as_ref();
        let a = Mat::from_fn(dim, dim, |i, j| {
            ytpx.read(i, j) - np * mu_y.read(i) * mu_x.read(j)
        });

        // A = U * S * V^T, the optimal rotation is R = V * C * U^T
        let svd = a.svd();
        let u = svd.u();
        let s = svd.s_diagonal();
        let mut v = svd.v().to_owned();

        let mut c_last = 1.0;
        if self.strict_rotation && (v.as_ref() * u.transpose()).determinant() < 0.0 {
            // flip the axis of the smallest singular value to turn the reflection into a rotation
            for i in 0..dim {
                v.write(i, dim - 1, -v.read(i, dim - 1));
            }
            c_last = -1.0;
            log::trace!("reflection corrected in rigid estimate");
        }
        let rotation = v.as_ref() * u.transpose();

        // trace(S * C)
        let trace_sc = (0..dim)
            .map(|i| s.read(i) * if i + 1 == dim { c_last } else { 1.0 })
            .sum::<f64>();

        let x_moment = linalg::weighted_second_moment(x, &probabilities.pt1, mu_x.as_ref(), np);
        let y_moment = linalg::weighted_second_moment(y, &probabilities.p1, mu_y.as_ref(), np);

        let scale = match self.allow_scaling {
            true => {
                let scale = trace_sc / y_moment;
                if !(y_moment > 0.0 && scale.is_finite() && scale > 0.0) {
                    let spread = match scale.is_finite() {
                        true => scale * scale * y_moment / np,
                        false => 0.0,
                    };
                    return Err(RegistrationError::Degenerate(Degeneracy::Collapse {
                        spread,
                    }));
                }
                scale
            }
            false => 1.0,
        };

        // t = mu_x - s * R * mu_y
        let r_mu_y = rotation.as_ref() * mu_y.as_ref();
        let translation = Col::from_fn(dim, |i| mu_x.read(i) - scale * r_mu_y.read(i));

        // weighted residual sum_mn P_mn ||x_n - (s R y_m + t)||^2 expanded around the centroids
        let residual = x_moment - 2.0 * scale * trace_sc + scale * scale * y_moment;
        let sigma2 = residual / (np * dim as f64);
        if !sigma2.is_finite() {
            return Err(RegistrationError::Degenerate(Degeneracy::NonFinite {
                sigma2,
            }));
        }

        Ok(Estimate {
            transform: RigidTransform {
                rotation,
                scale,
                translation,
            },
            sigma2: sigma2.max(sigma2_floor),
            moving_spread: scale * scale * y_moment / np,
        })
    }

    fn degrees_of_freedom(&self, dim: usize) -> usize {
        let rotation = dim * dim.saturating_sub(1) / 2;
        rotation + dim + usize::from(self.allow_scaling)
    }

    fn denormalize(
        &self,
        transform: &RigidTransform,
        normalization: &Normalization,
    ) -> RigidTransform {
        // both sets share the normalization scale, so the estimated scale carries over
        let scale = transform.scale;
        let r_mu = transform.rotation.as_ref() * normalization.moving_mean.as_ref();
        let translation = Col::from_fn(transform.dim(), |i| {
            normalization.scale * transform.translation.read(i) + normalization.fixed_mean.read(i)
                - scale * r_mu.read(i)
        });
        RigidTransform {
            rotation: transform.rotation.clone(),
            scale,
            translation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probabilities::compute_responsibilities;
    use approx::assert_relative_eq;
    use cpd_core::transforms::{axis_angle_to_rotation_matrix, rotation_2d};

    fn shape_2d() -> PointSet {
        let rows = (0..30)
            .map(|i| {
                let t = i as f64 / 30.0 * std::f64::consts::TAU;
                [2.0 * t.cos() + 0.3 * (2.0 * t).cos(), 0.7 * t.sin() + 0.2 * (3.0 * t).sin()]
            })
            .collect::<Vec<_>>();
        PointSet::from_rows(&rows).unwrap()
    }

    /// Responsibilities of a perfect one to one correspondence.
    fn identity_responsibilities(fixed: &PointSet) -> Responsibilities {
        let n = fixed.len();
        let p = Mat::<f64>::identity(n, n);
        let px = p.as_ref() * fixed.as_mat();
        Responsibilities {
            p,
            p1: vec![1.0; n],
            pt1: vec![1.0; n],
            px,
            np: n as f64,
            objective: 0.0,
            correspondence: None,
        }
    }

    #[test]
    fn test_estimate_known_correspondences() -> Result<(), Box<dyn std::error::Error>> {
        let moving = shape_2d();
        let expected = RigidTransform {
            rotation: rotation_2d(0.4),
            scale: 1.5,
            translation: faer::col![0.3, -2.0],
        };
        let fixed = expected.apply(&moving);

        let estimate = Rigid::default().estimate(
            &fixed,
            &moving,
            &identity_responsibilities(&fixed),
            1e-12,
        )?;

        for i in 0..2 {
            for j in 0..2 {
                assert_relative_eq!(
                    estimate.transform.rotation.read(i, j),
                    expected.rotation.read(i, j),
                    epsilon = 1e-9
                );
            }
            assert_relative_eq!(
                estimate.transform.translation.read(i),
                expected.translation.read(i),
                epsilon = 1e-9
            );
        }
        assert_relative_eq!(estimate.transform.scale, 1.5, epsilon = 1e-9);
        // exact fit drops to the floor
        assert_relative_eq!(estimate.sigma2, 1e-12);
        Ok(())
    }

    #[test]
    fn test_estimate_without_scaling() -> Result<(), Box<dyn std::error::Error>> {
        let moving = shape_2d();
        let expected = RigidTransform {
            rotation: rotation_2d(-0.2),
            scale: 2.0,
            translation: faer::col![1.0, 1.0],
        };
        let fixed = expected.apply(&moving);

        let rigid = Rigid {
            strict_rotation: true,
            allow_scaling: false,
        };
        let estimate = rigid.estimate(&fixed, &moving, &identity_responsibilities(&fixed), 1e-12)?;

        assert_eq!(estimate.transform.scale, 1.0);
        assert!(linalg::is_rotation(estimate.transform.rotation.as_ref(), 1e-9));
        // the residual of fitting a scaled shape without scale stays positive
        assert!(estimate.sigma2 > 1e-3);
        Ok(())
    }

    #[test]
    fn test_reflection_is_corrected() -> Result<(), Box<dyn std::error::Error>> {
        let moving = shape_2d();
        // mirror the shape about the x axis
        let fixed = moving.map(|_, j, v| if j == 1 { -v } else { v });
        let probabilities = identity_responsibilities(&fixed);

        let strict = Rigid::default().estimate(&fixed, &moving, &probabilities, 1e-12)?;
        assert_relative_eq!(strict.transform.rotation.determinant(), 1.0, epsilon = 1e-9);
        assert!(linalg::is_rotation(strict.transform.rotation.as_ref(), 1e-9));

        let lenient = Rigid {
            strict_rotation: false,
            allow_scaling: true,
        }
        .estimate(&fixed, &moving, &probabilities, 1e-12)?;
        assert_relative_eq!(lenient.transform.rotation.determinant(), -1.0, epsilon = 1e-9);
        // the reflection explains the data exactly
        assert!(lenient.sigma2 < strict.sigma2);
        Ok(())
    }

    #[test]
    fn test_reflection_is_corrected_3d() -> Result<(), Box<dyn std::error::Error>> {
        let rows = (0..20)
            .map(|i| {
                let t = i as f64 * 0.37;
                [3.0 * t.cos(), 1.5 * (1.3 * t).sin(), 0.5 * t]
            })
            .collect::<Vec<_>>();
        let moving = PointSet::from_rows(&rows)?;
        let fixed = moving.map(|_, j, v| if j == 2 { -v } else { v });

        let estimate =
            Rigid::default().estimate(&fixed, &moving, &identity_responsibilities(&fixed), 1e-12)?;
        assert!(linalg::is_rotation(estimate.transform.rotation.as_ref(), 1e-9));
        Ok(())
    }

    #[test]
    fn test_vanishing_responsibility() -> Result<(), Box<dyn std::error::Error>> {
        let fixed = shape_2d();
        let mut probabilities = identity_responsibilities(&fixed);
        probabilities.np = 0.0;
        let result = Rigid::default().estimate(&fixed, &fixed, &probabilities, 1e-12);
        assert!(matches!(
            result,
            Err(RegistrationError::Degenerate(
                Degeneracy::VanishingResponsibility { .. }
            ))
        ));
        Ok(())
    }

    #[test]
    fn test_collapsed_moving_points() -> Result<(), Box<dyn std::error::Error>> {
        let fixed = shape_2d();
        let moving = fixed.map(|_, _, _| 1.0);
        let result =
            Rigid::default().estimate(&fixed, &moving, &identity_responsibilities(&fixed), 1e-12);
        assert!(matches!(
            result,
            Err(RegistrationError::Degenerate(Degeneracy::Collapse { .. }))
        ));
        Ok(())
    }

    #[test]
    fn test_estimate_from_soft_responsibilities() -> Result<(), Box<dyn std::error::Error>> {
        let moving = shape_2d();
        let expected = RigidTransform {
            rotation: rotation_2d(0.1),
            scale: 1.0,
            translation: faer::col![0.05, 0.0],
        };
        let fixed = expected.apply(&moving);
        let probabilities = compute_responsibilities(&fixed, &moving, 0.05, 0.1, false)?;
        let estimate = Rigid::default().estimate(&fixed, &moving, &probabilities, 1e-12)?;

        // a single step moves the estimate towards the true rotation
        let angle = estimate
            .transform
            .rotation
            .read(1, 0)
            .atan2(estimate.transform.rotation.read(0, 0));
        assert!(angle > 0.0 && angle < 0.2, "angle {angle}");
        assert!(linalg::is_rotation(estimate.transform.rotation.as_ref(), 1e-9));
        assert!(estimate.sigma2 > 0.0);
        Ok(())
    }

    #[test]
    fn test_inverse_and_matrix() -> Result<(), Box<dyn std::error::Error>> {
        let transform = RigidTransform {
            rotation: axis_angle_to_rotation_matrix(&[0.0, 1.0, 1.0], 0.8)?,
            scale: 2.0,
            translation: faer::col![1.0, -2.0, 0.5],
        };
        let points = PointSet::from_rows(&[[1.0, 2.0, 3.0], [-1.0, 0.0, 4.0]])?;
        let roundtrip = transform.inverse().apply(&transform.apply(&points));
        for i in 0..points.len() {
            for j in 0..3 {
                assert_relative_eq!(roundtrip.coord(i, j), points.coord(i, j), epsilon = 1e-12);
            }
        }

        let m = transform.matrix();
        assert_eq!((m.nrows(), m.ncols()), (4, 4));
        assert_relative_eq!(m.read(0, 3), 1.0);
        assert_relative_eq!(m.read(3, 3), 1.0);
        Ok(())
    }

    #[test]
    fn test_degrees_of_freedom() {
        assert_eq!(Rigid::default().degrees_of_freedom(2), 4);
        assert_eq!(Rigid::default().degrees_of_freedom(3), 7);
        let no_scale = Rigid {
            strict_rotation: true,
            allow_scaling: false,
        };
        assert_eq!(no_scale.degrees_of_freedom(3), 6);
    }

    #[test]
    fn test_denormalize() -> Result<(), Box<dyn std::error::Error>> {
        let moving = shape_2d();
        let expected = RigidTransform {
            rotation: rotation_2d(0.6),
            scale: 1.2,
            translation: faer::col![10.0, -4.0],
        };
        let fixed = expected.apply(&moving);

        let (normalization, fixed_n, moving_n) = Normalization::new(&fixed, &moving);
        let rigid = Rigid::default();
        let estimate =
            rigid.estimate(&fixed_n, &moving_n, &identity_responsibilities(&fixed_n), 1e-12)?;
        let transform = rigid.denormalize(&estimate.transform, &normalization);

        assert_relative_eq!(transform.scale, 1.2, epsilon = 1e-9);
        assert_relative_eq!(transform.translation.read(0), 10.0, epsilon = 1e-9);
        assert_relative_eq!(transform.translation.read(1), -4.0, epsilon = 1e-9);
        Ok(())
    }
}
