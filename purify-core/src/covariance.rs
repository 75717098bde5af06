use nalgebra::{DMatrix, DVector};

use crate::error::{PurifyError, PurifyResult};
use crate::graph::Node;

const SYMMETRY_TOL: f64 = 1e-9;

/// Covariance matrix over named variables, with the sample size it came from.
#[derive(Debug, Clone)]
pub struct CovarianceMatrix {
    variables: Vec<Node>,
    matrix: DMatrix<f64>,
    sample_size: usize,
}

impl CovarianceMatrix {
    /// Wrap an existing matrix. It must be square, finite, symmetric and
    /// match `variables` in size.
    pub fn new(variables: Vec<Node>, matrix: DMatrix<f64>, sample_size: usize) -> PurifyResult<Self> {
        if matrix.nrows() != matrix.ncols() {
            return Err(PurifyError::DimensionMismatch {
                expected: matrix.nrows(),
                actual: matrix.ncols(),
            });
        }
        if matrix.nrows() != variables.len() {
            return Err(PurifyError::DimensionMismatch {
                expected: variables.len(),
                actual: matrix.nrows(),
            });
        }
        if matrix.iter().any(|v| !v.is_finite()) {
            return Err(PurifyError::data("covariance matrix has non-finite entries"));
        }
        let n = matrix.nrows();
        for i in 0..n {
            for j in i + 1..n {
                let (a, b) = (matrix[(i, j)], matrix[(j, i)]);
                if (a - b).abs() > SYMMETRY_TOL * (1.0 + a.abs().max(b.abs())) {
                    return Err(PurifyError::data(format!(
                        "covariance matrix is not symmetric at ({i}, {j})"
                    )));
                }
            }
        }
        Ok(Self {
            variables,
            matrix,
            sample_size,
        })
    }

    /// Build from row-major rows (rows x cols).
    pub fn from_rows(variables: Vec<Node>, rows: &[Vec<f64>], sample_size: usize) -> PurifyResult<Self> {
        let n = variables.len();
        if let Some(bad) = rows.iter().find(|r| r.len() != n) {
            return Err(PurifyError::DimensionMismatch {
                expected: n,
                actual: bad.len(),
            });
        }
        if rows.len() != n {
            return Err(PurifyError::DimensionMismatch {
                expected: n,
                actual: rows.len(),
            });
        }
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        Self::new(variables, DMatrix::from_row_slice(n, n, &flat), sample_size)
    }

    /// Unbiased sample covariance of `data` (one row per case).
    pub fn from_data(variables: Vec<Node>, data: &[Vec<f64>]) -> PurifyResult<Self> {
        let cols = variables.len();
        let rows = data.len();
        if rows < 2 {
            return Err(PurifyError::data(format!(
                "need at least 2 cases to estimate a covariance, got {rows}"
            )));
        }
        if let Some(bad) = data.iter().find(|r| r.len() != cols) {
            return Err(PurifyError::DimensionMismatch {
                expected: cols,
                actual: bad.len(),
            });
        }
        let flat: Vec<f64> = data.iter().flatten().copied().collect();
        if flat.iter().any(|v| !v.is_finite()) {
            return Err(PurifyError::data("data has non-finite entries"));
        }
        let x = DMatrix::from_row_slice(rows, cols, &flat);
        let means: DVector<f64> = x.row_mean().transpose();
        let centered = DMatrix::from_fn(rows, cols, |r, c| x[(r, c)] - means[c]);
        let cov = centered.transpose() * &centered / (rows as f64 - 1.0);
        Self::new(variables, cov, rows)
    }

    pub fn variables(&self) -> &[Node] {
        &self.variables
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    pub fn dimension(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.matrix[(i, j)]
    }

    /// Principal sub-matrix over the given positions, in the given order.
    pub fn submatrix(&self, indices: &[usize]) -> DMatrix<f64> {
        DMatrix::from_fn(indices.len(), indices.len(), |r, c| {
            self.matrix[(indices[r], indices[c])]
        })
    }

    /// Determinant of the 2x2 principal sub-matrix over `i` and `j`.
    pub fn det2(&self, i: usize, j: usize) -> f64 {
        self.get(i, i) * self.get(j, j) - self.get(i, j) * self.get(j, i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::nodes;

    #[test]
    fn sample_covariance_of_small_table() {
        let data = vec![
            vec![1.0, 2.0],
            vec![2.0, 4.0],
            vec![3.0, 6.0],
            vec![4.0, 8.0],
        ];
        let cov = CovarianceMatrix::from_data(nodes(&["A", "B"]), &data).unwrap();
        assert_eq!(cov.sample_size(), 4);
        // var(A) = 5/3, cov(A,B) = 10/3, var(B) = 20/3
        assert!((cov.get(0, 0) - 5.0 / 3.0).abs() < 1e-12);
        assert!((cov.get(0, 1) - 10.0 / 3.0).abs() < 1e-12);
        assert!((cov.get(1, 1) - 20.0 / 3.0).abs() < 1e-12);
        assert!(cov.det2(0, 1).abs() < 1e-9);
    }

    #[test]
    fn rejects_asymmetric_matrix() {
        let rows = vec![vec![1.0, 0.5], vec![0.2, 1.0]];
        let err = CovarianceMatrix::from_rows(nodes(&["A", "B"]), &rows, 100).unwrap_err();
        assert!(matches!(err, PurifyError::InvalidData { .. }));
    }

    #[test]
    fn rejects_wrong_dimension() {
        let rows = vec![vec![1.0, 0.5], vec![0.5, 1.0]];
        let err = CovarianceMatrix::from_rows(nodes(&["A", "B", "C"]), &rows, 100).unwrap_err();
        assert!(matches!(err, PurifyError::DimensionMismatch { expected: 3, actual: 2 }));
    }

    #[test]
    fn submatrix_follows_index_order() {
        let rows = vec![
            vec![1.0, 0.1, 0.2],
            vec![0.1, 2.0, 0.3],
            vec![0.2, 0.3, 3.0],
        ];
        let cov = CovarianceMatrix::from_rows(nodes(&["A", "B", "C"]), &rows, 10).unwrap();
        let sub = cov.submatrix(&[2, 0]);
        assert_eq!(sub[(0, 0)], 3.0);
        assert_eq!(sub[(0, 1)], 0.2);
        assert_eq!(sub[(1, 1)], 1.0);
    }
}
