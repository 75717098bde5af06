//! Conditional independence tests, singly and pooled across data sets.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};
use tracing::debug;

use crate::covariance::CovarianceMatrix;
use crate::error::{PurifyError, PurifyResult};
use crate::graph::Node;
use crate::index::VariableIndex;

/// Decides `x ⫫ y | z` over a fixed set of variables.
pub trait IndependenceTest {
    fn variables(&self) -> &[Node];

    fn alpha(&self) -> f64;

    fn is_independent(&self, x: &Node, y: &Node, z: &[Node]) -> PurifyResult<bool>;

    fn is_dependent(&self, x: &Node, y: &Node, z: &[Node]) -> PurifyResult<bool> {
        Ok(!self.is_independent(x, y, z)?)
    }

    fn variable(&self, name: &str) -> Option<&Node> {
        self.variables().iter().find(|v| v.name() == name)
    }

    fn variable_names(&self) -> Vec<String> {
        self.variables().iter().map(|v| v.name.clone()).collect()
    }
}

/// A test that also reports the p-value behind each verdict.
pub trait PValueTest: IndependenceTest {
    fn p_value(&self, x: &Node, y: &Node, z: &[Node]) -> PurifyResult<f64>;
}

/// Renders `x _||_ y | z1, z2`.
pub fn independence_fact(x: &Node, y: &Node, z: &[Node]) -> String {
    let mut fact = format!("{x} _||_ {y}");
    if !z.is_empty() {
        let given: Vec<&str> = z.iter().map(Node::name).collect();
        fact.push_str(" | ");
        fact.push_str(&given.join(", "));
    }
    fact
}

/// Fisher z test of vanishing partial correlation.
#[derive(Debug, Clone)]
pub struct FisherZTest {
    cov: CovarianceMatrix,
    index: VariableIndex,
    alpha: f64,
    normal: Normal,
}

impl FisherZTest {
    pub fn new(cov: CovarianceMatrix, alpha: f64) -> PurifyResult<Self> {
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(PurifyError::config(format!("alpha must lie in (0, 1), got {alpha}")));
        }
        let index = VariableIndex::new(cov.variables())?;
        let normal = Normal::new(0.0, 1.0).map_err(PurifyError::oracle)?;
        Ok(Self {
            cov,
            index,
            alpha,
            normal,
        })
    }

    /// Partial correlation of `x` and `y` given `z`.
    pub fn partial_correlation(&self, x: &Node, y: &Node, z: &[Node]) -> PurifyResult<f64> {
        let mut positions = vec![self.index.resolve(x)?, self.index.resolve(y)?];
        for node in z {
            positions.push(self.index.resolve(node)?);
        }
        let precision = self.cov.submatrix(&positions).try_inverse().ok_or_else(|| {
            PurifyError::oracle(format!(
                "singular covariance for {}",
                independence_fact(x, y, z)
            ))
        })?;
        let r = -precision[(0, 1)] / (precision[(0, 0)] * precision[(1, 1)]).sqrt();
        if !r.is_finite() {
            return Err(PurifyError::oracle(format!(
                "partial correlation undefined for {}",
                independence_fact(x, y, z)
            )));
        }
        Ok(r)
    }
}

impl IndependenceTest for FisherZTest {
    fn variables(&self) -> &[Node] {
        self.cov.variables()
    }

    fn alpha(&self) -> f64 {
        self.alpha
    }

    fn is_independent(&self, x: &Node, y: &Node, z: &[Node]) -> PurifyResult<bool> {
        Ok(self.p_value(x, y, z)? > self.alpha)
    }
}

impl PValueTest for FisherZTest {
    fn p_value(&self, x: &Node, y: &Node, z: &[Node]) -> PurifyResult<f64> {
        let dof = self.cov.sample_size() as f64 - z.len() as f64 - 3.0;
        if dof <= 0.0 {
            return Err(PurifyError::data(format!(
                "sample size {} too small to condition on {} variables",
                self.cov.sample_size(),
                z.len()
            )));
        }
        let r = self.partial_correlation(x, y, z)?;
        if r.abs() >= 1.0 {
            return Ok(0.0);
        }
        let fisher = 0.5 * ((1.0 + r) / (1.0 - r)).ln() * dof.sqrt();
        Ok((2.0 * self.normal.cdf(-fisher.abs())).min(1.0))
    }
}

/// How member p-values are combined into one verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolingMethod {
    /// `-2 Σ ln p` against chi-square with `2k` degrees of freedom.
    Fisher,
    /// Smallest p against the Šidák-corrected level.
    Tippett,
    /// Largest p, raised to the `k`th power.
    WorsleyFriston,
    /// Mean normal score of the p-values.
    Stouffer,
    /// Mean p-value.
    Average,
    /// More than half of the members judge independence.
    Majority,
}

/// Independence judged jointly over several tests of the same variables.
pub struct PooledIndependenceTest {
    variables: Vec<Node>,
    tests: Vec<Box<dyn PValueTest>>,
    method: PoolingMethod,
}

impl PooledIndependenceTest {
    /// Every test must cover the same variable names; the first test's
    /// variables are reported as the pooled test's own.
    pub fn new(tests: Vec<Box<dyn PValueTest>>, method: PoolingMethod) -> PurifyResult<Self> {
        let Some(first) = tests.first() else {
            return Err(PurifyError::config("pooling needs at least one test"));
        };
        let expected: BTreeSet<String> = first.variable_names().into_iter().collect();
        for (i, test) in tests.iter().enumerate().skip(1) {
            let names: BTreeSet<String> = test.variable_names().into_iter().collect();
            if names != expected {
                return Err(PurifyError::config(format!(
                    "data sets must have the same variables; test {i} differs from test 0"
                )));
            }
        }
        Ok(Self {
            variables: first.variables().to_vec(),
            tests,
            method,
        })
    }

    pub fn method(&self) -> PoolingMethod {
        self.method
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    fn p_values(&self, x: &Node, y: &Node, z: &[Node]) -> PurifyResult<Vec<f64>> {
        self.tests.iter().map(|t| t.p_value(x, y, z)).collect()
    }

    fn pooled_verdict(&self, x: &Node, y: &Node, z: &[Node]) -> PurifyResult<bool> {
        let alpha = self.alpha();
        let k = self.tests.len() as f64;

        let independent = match self.method {
            PoolingMethod::Fisher => {
                let p_values = self.p_values(x, y, z)?;
                if p_values.iter().any(|&p| p <= 0.0) {
                    false
                } else {
                    let stat: f64 = -2.0 * p_values.iter().map(|p| p.ln()).sum::<f64>();
                    let chi = ChiSquared::new(2.0 * k).map_err(PurifyError::oracle)?;
                    1.0 - chi.cdf(stat) > alpha
                }
            }
            PoolingMethod::Tippett => {
                let min = self.p_values(x, y, z)?.into_iter().fold(f64::INFINITY, f64::min);
                min > 1.0 - (1.0 - alpha).powf(1.0 / k)
            }
            PoolingMethod::WorsleyFriston => {
                let max = self.p_values(x, y, z)?.into_iter().fold(0.0, f64::max);
                max.powf(k) > alpha
            }
            PoolingMethod::Stouffer => {
                let normal = Normal::new(0.0, 1.0).map_err(PurifyError::oracle)?;
                let score: f64 = self
                    .p_values(x, y, z)?
                    .into_iter()
                    .map(|p| normal.inverse_cdf(p.clamp(f64::EPSILON, 1.0 - f64::EPSILON)))
                    .sum::<f64>()
                    / k.sqrt();
                normal.cdf(score) > alpha
            }
            PoolingMethod::Average => self.p_values(x, y, z)?.iter().sum::<f64>() / k > alpha,
            PoolingMethod::Majority => {
                let mut votes = 0usize;
                for test in &self.tests {
                    if test.is_independent(x, y, z)? {
                        votes += 1;
                    }
                }
                2 * votes > self.tests.len()
            }
        };
        Ok(independent)
    }
}

impl IndependenceTest for PooledIndependenceTest {
    fn variables(&self) -> &[Node] {
        &self.variables
    }

    /// Level of the first member test.
    fn alpha(&self) -> f64 {
        self.tests.first().map_or(0.05, |t| t.alpha())
    }

    fn is_independent(&self, x: &Node, y: &Node, z: &[Node]) -> PurifyResult<bool> {
        let independent = self.pooled_verdict(x, y, z)?;
        if independent {
            debug!(fact = %independence_fact(x, y, z), "In aggregate independent");
        } else {
            debug!(fact = %independence_fact(x, y, z), "In aggregate dependent");
        }
        Ok(independent)
    }
}

impl fmt::Display for PooledIndependenceTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pooled Independence Test:  alpha = {}", self.alpha())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::nodes;
    use nalgebra::DMatrix;

    /// Returns the same p-value for every question.
    struct ConstantTest {
        variables: Vec<Node>,
        p: f64,
    }

    impl IndependenceTest for ConstantTest {
        fn variables(&self) -> &[Node] {
            &self.variables
        }
        fn alpha(&self) -> f64 {
            0.05
        }
        fn is_independent(&self, x: &Node, y: &Node, z: &[Node]) -> PurifyResult<bool> {
            Ok(self.p_value(x, y, z)? > self.alpha())
        }
    }

    impl PValueTest for ConstantTest {
        fn p_value(&self, _: &Node, _: &Node, _: &[Node]) -> PurifyResult<f64> {
            Ok(self.p)
        }
    }

    fn constant(ps: &[f64]) -> Vec<Box<dyn PValueTest>> {
        ps.iter()
            .map(|&p| {
                Box::new(ConstantTest {
                    variables: nodes(&["X", "Y", "Z"]),
                    p,
                }) as Box<dyn PValueTest>
            })
            .collect()
    }

    fn pooled(ps: &[f64], method: PoolingMethod) -> bool {
        let test = PooledIndependenceTest::new(constant(ps), method).unwrap();
        test.is_independent(&Node::new("X"), &Node::new("Y"), &[]).unwrap()
    }

    /// X -> Z -> Y with unit-variance chain coefficients 0.6.
    fn chain(n: usize) -> FisherZTest {
        let m = DMatrix::from_row_slice(3, 3, &[1.0, 0.36, 0.6, 0.36, 1.0, 0.6, 0.6, 0.6, 1.0]);
        let cov = CovarianceMatrix::new(nodes(&["X", "Y", "Z"]), m, n).unwrap();
        FisherZTest::new(cov, 0.05).unwrap()
    }

    #[test]
    fn fisher_z_sees_screening_off() {
        let test = chain(500);
        let (x, y, z) = (Node::new("X"), Node::new("Y"), Node::new("Z"));
        assert!(test.is_dependent(&x, &y, &[]).unwrap());
        assert!(test.is_independent(&x, &y, &[z.clone()]).unwrap());
        assert!(test.partial_correlation(&x, &y, &[z]).unwrap().abs() < 1e-12);
        assert!(test.is_independent(&x, &Node::new("W"), &[]).is_err());
    }

    #[test]
    fn fisher_z_needs_enough_cases() {
        let test = chain(4);
        let z = Node::new("Z");
        assert!(matches!(
            test.p_value(&Node::new("X"), &Node::new("Y"), &[z]),
            Err(PurifyError::InvalidData { .. })
        ));
    }

    #[test]
    fn pooling_methods() {
        assert!(pooled(&[0.5, 0.6, 0.7], PoolingMethod::Fisher));
        assert!(!pooled(&[0.001, 0.6, 0.7], PoolingMethod::Fisher));
        assert!(!pooled(&[0.0, 0.9], PoolingMethod::Fisher));

        // Šidák level for k = 2 at 0.05 is about 0.0253.
        assert!(pooled(&[0.03, 0.9], PoolingMethod::Tippett));
        assert!(!pooled(&[0.02, 0.9], PoolingMethod::Tippett));

        assert!(pooled(&[0.3, 0.25], PoolingMethod::WorsleyFriston));
        assert!(!pooled(&[0.2, 0.1], PoolingMethod::WorsleyFriston));

        assert!(pooled(&[0.5, 0.5], PoolingMethod::Stouffer));
        assert!(!pooled(&[0.04, 0.04], PoolingMethod::Stouffer));
        assert!(pooled(&[0.0, 1.0], PoolingMethod::Stouffer));

        assert!(pooled(&[0.01, 0.2], PoolingMethod::Average));
        assert!(!pooled(&[0.01, 0.05], PoolingMethod::Average));

        assert!(pooled(&[0.01, 0.2, 0.3], PoolingMethod::Majority));
        assert!(!pooled(&[0.01, 0.2], PoolingMethod::Majority));
    }

    #[test]
    fn members_must_share_variables() {
        let mut tests = constant(&[0.5]);
        tests.push(Box::new(ConstantTest {
            variables: nodes(&["X", "Y", "W"]),
            p: 0.5,
        }));
        assert!(PooledIndependenceTest::new(tests, PoolingMethod::Average).is_err());
        assert!(PooledIndependenceTest::new(Vec::new(), PoolingMethod::Average).is_err());

        let test = PooledIndependenceTest::new(constant(&[0.5, 0.4]), PoolingMethod::Fisher).unwrap();
        assert_eq!(test.method(), PoolingMethod::Fisher);
        assert_eq!(test.len(), 2);
        assert!(!test.is_empty());
        assert_eq!(test.variable_names(), vec!["X", "Y", "Z"]);
        assert!(test.variable("Z").is_some());
        assert!(test.variable("Q").is_none());
        assert_eq!(test.to_string(), "Pooled Independence Test:  alpha = 0.05");
    }

    #[test]
    fn pooled_fisher_z_over_two_samples() {
        let tests: Vec<Box<dyn PValueTest>> = vec![Box::new(chain(300)), Box::new(chain(800))];
        let pooled = PooledIndependenceTest::new(tests, PoolingMethod::Fisher).unwrap();
        let (x, y, z) = (Node::new("X"), Node::new("Y"), Node::new("Z"));
        assert!(pooled.is_dependent(&x, &y, &[]).unwrap());
        assert!(pooled.is_independent(&x, &y, &[z]).unwrap());
    }

    #[test]
    fn fact_rendering() {
        let fact = independence_fact(&Node::new("A"), &Node::new("B"), &nodes(&["C", "D"]));
        assert_eq!(fact, "A _||_ B | C, D");
    }
}
