use faer::{linalg::matmul::matmul, Col, ColRef, Mat, MatRef, Parallelism};

/// Transform a set of points with a similarity transform.
///
/// Each row `y` of `src_points` is mapped to `scale * rotation * y + translation`.
///
/// # Arguments
///
/// * `src_points` - An N×D matrix with one point per row.
/// * `rotation` - A D×D rotation matrix.
/// * `scale` - A uniform scale factor.
/// * `translation` - A D dimensional translation vector.
///
/// # Returns
///
/// The transformed N×D points.
///
/// PRECONDITION: the rotation is D×D and the translation has D entries.
///
/// Example:
///
/// ```
/// use cpd_core::linalg::transform_points;
///
/// let points = faer::mat![[1.0, 0.0], [0.0, 2.0]];
/// let rotation = faer::Mat::<f64>::identity(2, 2);
/// let translation = faer::col![1.0, 1.0];
/// let dst = transform_points(points.as_ref(), rotation.as_ref(), 2.0, translation.as_ref());
/// assert_eq!(dst.read(1, 1), 5.0);
/// ```
pub fn transform_points(
    src_points: MatRef<'_, f64>,
    rotation: MatRef<'_, f64>,
    scale: f64,
    translation: ColRef<'_, f64>,
) -> Mat<f64> {
    assert_eq!(src_points.ncols(), rotation.nrows());
    assert_eq!(rotation.nrows(), translation.nrows());

    // points are stored as rows, so apply the transform as Y * R^T
    let mut dst_points = Mat::<f64>::zeros(src_points.nrows(), src_points.ncols());
    matmul(
        dst_points.as_mut(),
        src_points,
        rotation.transpose(),
        None,
        scale,
        Parallelism::None,
    );

    for j in 0..dst_points.ncols() {
        let t = translation.read(j);
        for i in 0..dst_points.nrows() {
            dst_points.write(i, j, dst_points.read(i, j) + t);
        }
    }

    dst_points
}

/// Compute the sum of squared distances between every pair of points of two sets.
///
/// Evaluates `sum_n sum_m ||x_n - y_m||^2` in closed form as
/// `M * sum ||x||^2 + N * sum ||y||^2 - 2 * (sum x) . (sum y)`.
pub fn sum_squared_distances(x: MatRef<'_, f64>, y: MatRef<'_, f64>) -> f64 {
    assert_eq!(x.ncols(), y.ncols());
    let (n, m) = (x.nrows() as f64, y.nrows() as f64);

    let mut xx = 0.0;
    let mut yy = 0.0;
    let mut cross = 0.0;
    for j in 0..x.ncols() {
        let mut sx = 0.0;
        for i in 0..x.nrows() {
            let v = x.read(i, j);
            sx += v;
            xx += v * v;
        }
        let mut sy = 0.0;
        for i in 0..y.nrows() {
            let v = y.read(i, j);
            sy += v;
            yy += v * v;
        }
        cross += sx * sy;
    }

    m * xx + n * yy - 2.0 * cross
}

/// Compute the centroid of a set of points weighted per row.
///
/// # Arguments
///
/// * `points` - An N×D matrix with one point per row.
/// * `weights` - One weight per point.
/// * `total` - The sum of the weights.
pub fn weighted_centroid(points: MatRef<'_, f64>, weights: &[f64], total: f64) -> Col<f64> {
    assert_eq!(points.nrows(), weights.len());
    Col::from_fn(points.ncols(), |j| {
        weights
            .iter()
            .enumerate()
            .map(|(i, w)| w * points.read(i, j))
            .sum::<f64>()
            / total
    })
}

/// Compute the weighted second moment of a set of points about its weighted centroid.
///
/// Evaluates `sum_i w_i ||p_i||^2 - total * ||centroid||^2`, which equals
/// `sum_i w_i ||p_i - centroid||^2` when `centroid` is the weighted centroid.
pub fn weighted_second_moment(
    points: MatRef<'_, f64>,
    weights: &[f64],
    centroid: ColRef<'_, f64>,
    total: f64,
) -> f64 {
    assert_eq!(points.nrows(), weights.len());
    let mut moment = 0.0;
    for (i, w) in weights.iter().enumerate() {
        let sq_norm = (0..points.ncols())
            .map(|j| points.read(i, j).powi(2))
            .sum::<f64>();
        moment += w * sq_norm;
    }
    moment - total * squared_norm(centroid)
}

/// Compute the squared euclidean norm of a vector.
#[inline]
pub fn squared_norm(v: ColRef<'_, f64>) -> f64 {
    (0..v.nrows()).map(|i| v.read(i).powi(2)).sum()
}

/// Compute the trace of a square matrix.
pub fn trace(m: MatRef<'_, f64>) -> f64 {
    assert_eq!(m.nrows(), m.ncols());
    (0..m.nrows()).map(|i| m.read(i, i)).sum()
}

/// Check whether a matrix is a proper rotation, i.e. `R^T * R = I` and `det(R) = +1`.
pub fn is_rotation(m: MatRef<'_, f64>, tolerance: f64) -> bool {
    if m.nrows() != m.ncols() {
        return false;
    }
    let rtr = m.transpose() * m;
    for i in 0..m.nrows() {
        for j in 0..m.ncols() {
            let expected = if i == j { 1.0 } else { 0.0 };
            if (rtr.read(i, j) - expected).abs() > tolerance {
                return false;
            }
        }
    }
    (m.determinant() - 1.0).abs() <= tolerance
}

/// Compose a similarity transform into a (D+1)×(D+1) homogeneous matrix.
///
/// The top-left block holds `scale * rotation`, the last column the translation.
pub fn homogeneous_matrix(
    rotation: MatRef<'_, f64>,
    scale: f64,
    translation: ColRef<'_, f64>,
) -> Mat<f64> {
    let d = rotation.nrows();
    Mat::from_fn(d + 1, d + 1, |i, j| match (i < d, j < d) {
        (true, true) => scale * rotation.read(i, j),
        (true, false) => translation.read(i),
        (false, true) => 0.0,
        (false, false) => 1.0,
    })
}
