use faer::Mat;

/// Compute the 2D rotation matrix of an angle.
///
/// # Arguments
///
/// * `angle` - The counter clockwise angle of rotation in radians.
///
/// Example:
///
/// ```
/// use cpd_core::transforms::rotation_2d;
///
/// let rotation = rotation_2d(std::f64::consts::FRAC_PI_2);
/// assert!((rotation.read(1, 0) - 1.0).abs() < 1e-12);
/// ```
pub fn rotation_2d(angle: f64) -> Mat<f64> {
    let (s, c) = angle.sin_cos();
    faer::mat![[c, -s], [s, c]]
}

/// Compute the 3D rotation matrix from an axis and angle.
///
/// # Arguments
///
/// * `axis` - The axis of rotation, normalized internally.
/// * `angle` - The angle of rotation in radians.
///
/// # Returns
///
/// The 3×3 rotation matrix.
///
/// Example:
///
/// ```
/// use cpd_core::transforms::axis_angle_to_rotation_matrix;
///
/// let rotation = axis_angle_to_rotation_matrix(&[0.0, 0.0, 2.0], 0.3).unwrap();
/// assert_eq!(rotation.nrows(), 3);
/// ```
pub fn axis_angle_to_rotation_matrix(
    axis: &[f64; 3],
    angle: f64,
) -> Result<Mat<f64>, &'static str> {
    let [x, y, z] = {
        let magnitude = (axis[0].powi(2) + axis[1].powi(2) + axis[2].powi(2)).sqrt();
        match magnitude < 1e-10 {
            true => return Err("cannot compute rotation matrix from a zero vector"),
            false => [
                axis[0] / magnitude,
                axis[1] / magnitude,
                axis[2] / magnitude,
            ],
        }
    };

    let (s, c) = angle.sin_cos();
    let t = 1.0 - c;

    Ok(faer::mat![
        [c + x * x * t, x * y * t - z * s, x * z * t + y * s],
        [x * y * t + z * s, c + y * y * t, y * z * t - x * s],
        [x * z * t - y * s, y * z * t + x * s, c + z * z * t],
    ])
}
