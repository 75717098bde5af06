//! Linear factor models for generating test covariances and data.

use nalgebra::{Cholesky, DMatrix, DVector};
use rand::Rng;
use rand_distr::StandardNormal;

use crate::covariance::CovarianceMatrix;
use crate::error::{PurifyError, PurifyResult};
use crate::graph::{Edge, Node};

/// `x = Λ f + e` with `f ~ N(0, Φ)` and independent errors `e ~ N(0, Ψ)`.
#[derive(Debug, Clone)]
pub struct MeasurementModel {
    indicators: Vec<Node>,
    factors: Vec<Node>,
    loadings: DMatrix<f64>,
    factor_correlation: DMatrix<f64>,
    error_variances: DVector<f64>,
    clusters: Vec<Vec<usize>>,
}

impl MeasurementModel {
    /// `clusters` factors with `indicators` indicators each, every indicator
    /// loading `loading` on its own factor only. Error variances are
    /// `1 - loading²`, so indicators have unit variance. All factor pairs share
    /// `factor_correlation`.
    pub fn pure(clusters: usize, indicators: usize, loading: f64, factor_correlation: f64) -> PurifyResult<Self> {
        if clusters == 0 || indicators == 0 {
            return Err(PurifyError::config("a model needs at least one factor and one indicator"));
        }
        if !(loading.abs() > 0.0 && loading.abs() < 1.0) {
            return Err(PurifyError::config(format!("loading must lie in (-1, 1) \\ {{0}}, got {loading}")));
        }

        let p = clusters * indicators;
        let indicator_nodes = (1..=p).map(|i| Node::new(format!("X{i}"))).collect();
        let factors = (1..=clusters).map(|f| Node::latent(format!("L{f}"))).collect();
        let loadings = DMatrix::from_fn(p, clusters, |r, c| if r / indicators == c { loading } else { 0.0 });
        let factor_correlation =
            DMatrix::from_fn(clusters, clusters, |r, c| if r == c { 1.0 } else { factor_correlation });
        if Cholesky::new(factor_correlation.clone()).is_none() {
            return Err(PurifyError::config("factor correlation matrix is not positive definite"));
        }
        let error_variances = DVector::from_element(p, 1.0 - loading * loading);
        let clusters = (0..clusters)
            .map(|c| (c * indicators..(c + 1) * indicators).collect())
            .collect();

        Ok(Self {
            indicators: indicator_nodes,
            factors,
            loadings,
            factor_correlation,
            error_variances,
            clusters,
        })
    }

    /// Add a loading of `indicator` on `factor` beyond its own. The indicator
    /// stays in its hypothesised cluster, which makes that cluster impure.
    pub fn with_cross_loading(mut self, indicator: &str, factor: usize, loading: f64) -> PurifyResult<Self> {
        let row = self
            .indicators
            .iter()
            .position(|n| n.name() == indicator)
            .ok_or_else(|| PurifyError::UnknownVariable {
                name: indicator.to_string(),
            })?;
        if factor >= self.factors.len() {
            return Err(PurifyError::config(format!(
                "factor {factor} out of range for {} factors",
                self.factors.len()
            )));
        }
        if !loading.is_finite() {
            return Err(PurifyError::config("cross loading must be finite"));
        }
        self.loadings[(row, factor)] = loading;
        Ok(self)
    }

    pub fn indicators(&self) -> &[Node] {
        &self.indicators
    }

    pub fn factors(&self) -> &[Node] {
        &self.factors
    }

    /// Hypothesised clustering: each indicator under the factor it was built for.
    pub fn clustering(&self) -> Vec<Vec<Node>> {
        self.clusters
            .iter()
            .map(|c| c.iter().map(|&i| self.indicators[i].clone()).collect())
            .collect()
    }

    /// Factor-to-indicator edges for every nonzero loading, then one
    /// `E_<name> --> <name>` error edge per indicator.
    pub fn edges(&self) -> Vec<Edge> {
        let mut edges = Vec::new();
        for (r, x) in self.indicators.iter().enumerate() {
            for (c, f) in self.factors.iter().enumerate() {
                if self.loadings[(r, c)] != 0.0 {
                    edges.push(Edge::directed(f.clone(), x.clone()));
                }
            }
        }
        for x in &self.indicators {
            edges.push(Edge::directed(Node::error(format!("E_{}", x.name())), x.clone()));
        }
        edges
    }

    /// `Λ Φ Λᵀ + Ψ`, labelled as if estimated from `sample_size` cases.
    pub fn implied_covariance(&self, sample_size: usize) -> PurifyResult<CovarianceMatrix> {
        let mut sigma = &self.loadings * &self.factor_correlation * self.loadings.transpose();
        for (i, psi) in self.error_variances.iter().enumerate() {
            sigma[(i, i)] += psi;
        }
        CovarianceMatrix::new(self.indicators.clone(), sigma, sample_size)
    }

    /// Draw `n` cases, one row per case in indicator order.
    pub fn sample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> PurifyResult<Vec<Vec<f64>>> {
        let chol = Cholesky::new(self.factor_correlation.clone())
            .ok_or_else(|| PurifyError::config("factor correlation matrix is not positive definite"))?;
        let l = chol.l();
        let k = self.factors.len();
        let sd = self.error_variances.map(f64::sqrt);

        let mut rows = Vec::with_capacity(n);
        for _ in 0..n {
            let z = DVector::from_fn(k, |_, _| rng.sample::<f64, _>(StandardNormal));
            let f = &l * z;
            let mut x = &self.loadings * f;
            for (i, v) in x.iter_mut().enumerate() {
                *v += sd[i] * rng.sample::<f64, _>(StandardNormal);
            }
            rows.push(x.iter().copied().collect());
        }
        Ok(rows)
    }
}
