use faer::{Col, ColRef, Mat, MatRef};

use crate::linalg;
use thiserror::Error;

/// Error type for point set construction and shape checks.
#[derive(Debug, Error, PartialEq)]
pub enum PointSetError {
    /// The point set has no points or zero dimensions.
    #[error("Point set must contain at least one point of dimension >= 1, got {num_points}x{dim}")]
    Empty {
        /// Number of points provided.
        num_points: usize,
        /// Dimension of the points provided.
        dim: usize,
    },

    /// A row has a different length than the first row.
    #[error("Row {row} has {actual} coordinates, expected {expected}")]
    RaggedRows {
        /// Index of the offending row.
        row: usize,
        /// Number of coordinates of the first row.
        expected: usize,
        /// Number of coordinates of the offending row.
        actual: usize,
    },

    /// The flat buffer length does not match the requested shape.
    #[error("Buffer of length {len} cannot be viewed as {num_points}x{dim}")]
    ShapeMismatch {
        /// Length of the flat buffer.
        len: usize,
        /// Requested number of points.
        num_points: usize,
        /// Requested dimension.
        dim: usize,
    },
}

/// A set of N points of dimension D stored as an N×D matrix, one point per row.
///
/// The storage is a dense [`faer::Mat<f64>`] so that the registration kernels can
/// use matrix products directly on it.
#[derive(Debug, Clone)]
pub struct PointSet {
    points: Mat<f64>,
}

impl PointSet {
    /// Create a point set from an N×D matrix.
    ///
    /// # Errors
    ///
    /// Returns [`PointSetError::Empty`] if the matrix has no rows or no columns.
    pub fn new(points: Mat<f64>) -> Result<Self, PointSetError> {
        if points.nrows() == 0 || points.ncols() == 0 {
            return Err(PointSetError::Empty {
                num_points: points.nrows(),
                dim: points.ncols(),
            });
        }
        Ok(Self { points })
    }

    /// Create a point set from fixed size rows, e.g. `[[f64; 3]]` for 3D points.
    ///
    /// Example:
    ///
    /// ```
    /// use cpd_core::pointset::PointSet;
    ///
    /// let points = PointSet::from_rows(&[[0.0, 1.0], [2.0, 3.0], [4.0, 5.0]]).unwrap();
    /// assert_eq!(points.len(), 3);
    /// assert_eq!(points.dim(), 2);
    /// ```
    pub fn from_rows<const D: usize>(rows: &[[f64; D]]) -> Result<Self, PointSetError> {
        Self::new(Mat::from_fn(rows.len(), D, |i, j| rows[i][j]))
    }

    /// Create a point set from rows of arbitrary length.
    ///
    /// # Errors
    ///
    /// Returns [`PointSetError::RaggedRows`] if the rows do not share the same length.
    pub fn from_vecs(rows: &[Vec<f64>]) -> Result<Self, PointSetError> {
        let dim = rows.first().map_or(0, |r| r.len());
        if let Some((row, r)) = rows.iter().enumerate().find(|(_, r)| r.len() != dim) {
            return Err(PointSetError::RaggedRows {
                row,
                expected: dim,
                actual: r.len(),
            });
        }
        Self::new(Mat::from_fn(rows.len(), dim, |i, j| rows[i][j]))
    }

    /// Create a point set from a row-major buffer holding `num_points * dim` values.
    pub fn from_row_major(
        data: &[f64],
        num_points: usize,
        dim: usize,
    ) -> Result<Self, PointSetError> {
        if data.len() != num_points * dim {
            return Err(PointSetError::ShapeMismatch {
                len: data.len(),
                num_points,
                dim,
            });
        }
        Self::new(Mat::from_fn(num_points, dim, |i, j| data[i * dim + j]))
    }

    /// Get the number of points.
    #[inline]
    pub fn len(&self) -> usize {
        self.points.nrows()
    }

    /// Check if the point set is empty.
    ///
    /// Always false for a constructed point set, kept for API symmetry with `len`.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.nrows() == 0
    }

    /// Get the dimension of the points.
    #[inline]
    pub fn dim(&self) -> usize {
        self.points.ncols()
    }

    /// Get a view of the underlying N×D matrix.
    #[inline]
    pub fn as_mat(&self) -> MatRef<'_, f64> {
        self.points.as_ref()
    }

    /// Consume the point set and return the underlying matrix.
    pub fn into_mat(self) -> Mat<f64> {
        self.points
    }

    /// Read a single coordinate.
    #[inline]
    pub fn coord(&self, point: usize, axis: usize) -> f64 {
        self.points.read(point, axis)
    }

    /// Copy a single point into a vector.
    pub fn point(&self, index: usize) -> Vec<f64> {
        (0..self.dim()).map(|j| self.points.read(index, j)).collect()
    }

    /// Copy all points into a vector of rows.
    pub fn to_vecs(&self) -> Vec<Vec<f64>> {
        (0..self.len()).map(|i| self.point(i)).collect()
    }

    /// Check that every coordinate is finite.
    pub fn is_finite(&self) -> bool {
        (0..self.dim()).all(|j| (0..self.len()).all(|i| self.points.read(i, j).is_finite()))
    }

    /// Build a new point set of the same shape by mapping every coordinate.
    ///
    /// The closure receives the point index, the axis and the current value.
    pub fn map<F>(&self, f: F) -> PointSet
    where
        F: Fn(usize, usize, f64) -> f64,
    {
        Self {
            points: Mat::from_fn(self.len(), self.dim(), |i, j| {
                f(i, j, self.points.read(i, j))
            }),
        }
    }

    /// Apply a similarity transform `scale * rotation * p + translation` to every point.
    pub fn transformed(
        &self,
        rotation: MatRef<'_, f64>,
        scale: f64,
        translation: ColRef<'_, f64>,
    ) -> PointSet {
        Self {
            points: linalg::transform_points(self.as_mat(), rotation, scale, translation),
        }
    }

    /// Compute the mean point.
    pub fn centroid(&self) -> Col<f64> {
        let n = self.len() as f64;
        Col::from_fn(self.dim(), |j| {
            (0..self.len()).map(|i| self.points.read(i, j)).sum::<f64>() / n
        })
    }
}

impl TryFrom<Mat<f64>> for PointSet {
    type Error = PointSetError;

    fn try_from(points: Mat<f64>) -> Result<Self, Self::Error> {
        Self::new(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_from_rows() -> Result<(), Box<dyn std::error::Error>> {
        let points = PointSet::from_rows(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]])?;
        assert_eq!(points.len(), 2);
        assert_eq!(points.dim(), 3);
        assert_eq!(points.coord(1, 2), 6.0);
        assert_eq!(points.point(0), vec![1.0, 2.0, 3.0]);
        Ok(())
    }

    #[test]
    fn test_empty_is_rejected() {
        let rows: [[f64; 2]; 0] = [];
        assert_eq!(
            PointSet::from_rows(&rows).unwrap_err(),
            PointSetError::Empty {
                num_points: 0,
                dim: 2
            }
        );
        assert!(PointSet::new(Mat::zeros(3, 0)).is_err());
    }

    #[test]
    fn test_ragged_rows() {
        let rows = vec![vec![0.0, 1.0], vec![2.0, 3.0], vec![4.0]];
        assert_eq!(
            PointSet::from_vecs(&rows).unwrap_err(),
            PointSetError::RaggedRows {
                row: 2,
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn test_from_row_major() -> Result<(), Box<dyn std::error::Error>> {
        let data = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        let points = PointSet::from_row_major(&data, 3, 2)?;
        assert_eq!(points.to_vecs(), vec![vec![0.0, 1.0], vec![2.0, 3.0], vec![4.0, 5.0]]);
        assert!(PointSet::from_row_major(&data, 4, 2).is_err());
        Ok(())
    }

    #[test]
    fn test_centroid_and_finite() -> Result<(), Box<dyn std::error::Error>> {
        let points = PointSet::from_rows(&[[1.0, 2.0], [3.0, 6.0]])?;
        let centroid = points.centroid();
        assert_relative_eq!(centroid.read(0), 2.0);
        assert_relative_eq!(centroid.read(1), 4.0);
        assert!(points.is_finite());

        let points = PointSet::from_rows(&[[1.0, f64::NAN]])?;
        assert!(!points.is_finite());
        Ok(())
    }

    #[test]
    fn test_map() -> Result<(), Box<dyn std::error::Error>> {
        let points = PointSet::from_rows(&[[1.0, 2.0], [3.0, 4.0]])?;
        let shifted = points.map(|i, j, v| v + (i * 10 + j) as f64);
        assert_eq!(shifted.to_vecs(), vec![vec![1.0, 3.0], vec![13.0, 15.0]]);
        Ok(())
    }
}
