use faer::Col;

use crate::pointset::PointSet;

/// Parameters of a joint normalization of a fixed and a moving point set.
///
/// Both sets are centered on their own centroid and divided by one shared
/// scale, the larger of the two root mean square radii. Sharing the scale keeps
/// a rigid motion between the normalized sets rigid in the original frame.
#[derive(Debug, Clone)]
pub struct Normalization {
    /// Centroid of the fixed point set.
    pub fixed_mean: Col<f64>,
    /// Centroid of the moving point set.
    pub moving_mean: Col<f64>,
    /// Shared scale both sets were divided by.
    pub scale: f64,
}

impl Normalization {
    /// Normalize a pair of point sets.
    ///
    /// # Returns
    ///
    /// The normalization parameters together with the normalized fixed and moving sets.
    ///
    /// PRECONDITION: both point sets have the same dimension.
    pub fn new(fixed: &PointSet, moving: &PointSet) -> (Self, PointSet, PointSet) {
        assert_eq!(fixed.dim(), moving.dim());

        let fixed_mean = fixed.centroid();
        let moving_mean = moving.centroid();

        let rms_radius = |points: &PointSet, mean: &Col<f64>| {
            let mut sum = 0.0;
            for i in 0..points.len() {
                for j in 0..points.dim() {
                    sum += (points.coord(i, j) - mean.read(j)).powi(2);
                }
            }
            (sum / points.len() as f64).sqrt()
        };

        let scale = rms_radius(fixed, &fixed_mean).max(rms_radius(moving, &moving_mean));
        // every point coincides with its centroid, only remove the offset
        let scale = if scale > 0.0 { scale } else { 1.0 };

        let normalization = Self {
            fixed_mean,
            moving_mean,
            scale,
        };

        let fixed = normalization.apply(fixed, &normalization.fixed_mean);
        let moving = normalization.apply(moving, &normalization.moving_mean);

        (normalization, fixed, moving)
    }

    fn apply(&self, points: &PointSet, mean: &Col<f64>) -> PointSet {
        points.map(|_, j, v| (v - mean.read(j)) / self.scale)
    }

    /// Map normalized points back into the frame of the fixed point set.
    pub fn denormalize_points(&self, points: &PointSet) -> PointSet {
        points.map(|_, j, v| v * self.scale + self.fixed_mean.read(j))
    }
}
