use statrs::distribution::{ContinuousCDF, Normal};

use crate::covariance::CovarianceMatrix;
use crate::error::{PurifyError, PurifyResult};
use crate::graph::Node;
use crate::tetrad::TetradTest;

/// Vanishing-tetrad test using Wishart's standard error for a tetrad
/// difference, two-sided against a standard normal.
#[derive(Debug, Clone)]
pub struct WishartTetradTest {
    cov: CovarianceMatrix,
    significance: f64,
    normal: Normal,
}

impl WishartTetradTest {
    pub fn new(cov: CovarianceMatrix, significance: f64) -> PurifyResult<Self> {
        if !(significance > 0.0 && significance < 1.0) {
            return Err(PurifyError::config(format!(
                "significance must lie in (0, 1), got {significance}"
            )));
        }
        if cov.sample_size() <= 2 {
            return Err(PurifyError::config(format!(
                "sample size must exceed 2, got {}",
                cov.sample_size()
            )));
        }
        let normal = Normal::new(0.0, 1.0).map_err(PurifyError::oracle)?;
        Ok(Self {
            cov,
            significance,
            normal,
        })
    }

    pub fn covariance(&self) -> &CovarianceMatrix {
        &self.cov
    }

    /// `σij·σkl - σik·σjl`
    pub fn tetrad_difference(&self, i: usize, j: usize, k: usize, l: usize) -> f64 {
        let c = &self.cov;
        c.get(i, j) * c.get(k, l) - c.get(i, k) * c.get(j, l)
    }

    /// Sampling variance of the tetrad difference.
    pub fn variance(&self, i: usize, j: usize, k: usize, l: usize) -> f64 {
        let n = self.cov.sample_size() as f64;
        // i-l and j-k are the pairs the difference never multiplies together.
        let d_il = self.cov.det2(i, l);
        let d_jk = self.cov.det2(j, k);
        let det = self.cov.submatrix(&[i, j, k, l]).determinant();
        d_il * d_jk * (n + 1.0) / ((n - 1.0) * (n - 2.0)) - det / (n - 2.0)
    }
}

impl TetradTest for WishartTetradTest {
    fn variables(&self) -> &[Node] {
        self.cov.variables()
    }

    fn significance(&self) -> f64 {
        self.significance
    }

    fn tetrad_p_value(&self, i: usize, j: usize, k: usize, l: usize) -> PurifyResult<f64> {
        let dim = self.cov.dimension();
        if let Some(&bad) = [i, j, k, l].iter().find(|&&v| v >= dim) {
            return Err(PurifyError::Precondition {
                message: format!("variable position {bad} out of range for {dim} variables"),
            });
        }
        let tau = self.tetrad_difference(i, j, k, l);
        let var = self.variance(i, j, k, l);
        if !var.is_finite() || var <= 0.0 {
            return Err(PurifyError::oracle(format!(
                "non-positive tetrad variance {var} for ({i}, {j}, {k}, {l}); covariance may be singular"
            )));
        }
        let z = tau.abs() / var.sqrt();
        Ok((2.0 * self.normal.cdf(-z)).min(1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::nodes;
    use nalgebra::DMatrix;

    /// One factor, loadings 0.9/0.8/0.7/0.6 plus `cross` covariance between
    /// variables 0 and 1 beyond the factor.
    fn one_factor(cross: f64, n: usize) -> WishartTetradTest {
        let l = [0.9, 0.8, 0.7, 0.6];
        let m = DMatrix::from_fn(4, 4, |r, c| {
            if r == c {
                1.0
            } else if (r, c) == (0, 1) || (r, c) == (1, 0) {
                l[r] * l[c] + cross
            } else {
                l[r] * l[c]
            }
        });
        let cov = CovarianceMatrix::new(nodes(&["A", "B", "C", "D"]), m, n).unwrap();
        WishartTetradTest::new(cov, 0.01).unwrap()
    }

    #[test]
    fn vanishing_tetrads_have_p_value_one() {
        let test = one_factor(0.0, 500);
        for (i, j, k, l) in [(0, 1, 2, 3), (0, 1, 3, 2), (0, 2, 3, 1)] {
            let p = test.tetrad_p_value(i, j, k, l).unwrap();
            assert!(p > 0.999, "p = {p}");
        }
    }

    #[test]
    fn correlated_errors_break_tetrads_involving_the_pair() {
        let test = one_factor(0.2, 2000);
        // Both of these multiply σ01.
        let p = test.tetrad_p_value(0, 1, 2, 3).unwrap();
        assert!(p < 0.01, "p = {p}");
        let p = test.tetrad_p_value(0, 1, 3, 2).unwrap();
        assert!(p < 0.01, "p = {p}");
        // σ02·σ31 - σ03·σ21 never touches σ01.
        let clean = test.tetrad_p_value(0, 2, 3, 1).unwrap();
        assert!(clean > 0.999, "p = {clean}");
    }

    #[test]
    fn rejects_bad_configuration() {
        let cov = CovarianceMatrix::new(nodes(&["A"]), DMatrix::from_element(1, 1, 1.0), 2).unwrap();
        assert!(WishartTetradTest::new(cov, 0.05).is_err());
        let cov = CovarianceMatrix::new(nodes(&["A"]), DMatrix::from_element(1, 1, 1.0), 50).unwrap();
        assert!(WishartTetradTest::new(cov.clone(), 0.0).is_err());
        assert!(WishartTetradTest::new(cov, 1.5).is_err());
    }

    #[test]
    fn singular_covariance_is_an_oracle_error() {
        let cov = CovarianceMatrix::new(nodes(&["A", "B", "C", "D"]), DMatrix::from_element(4, 4, 1.0), 100)
            .unwrap();
        let test = WishartTetradTest::new(cov, 0.05).unwrap();
        assert!(matches!(
            test.tetrad_p_value(0, 1, 2, 3),
            Err(PurifyError::OracleComputation { .. })
        ));
    }
}
