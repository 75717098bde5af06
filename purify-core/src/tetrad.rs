//! Tetrad evidence records and the oracle that scores them.

use std::cell::Cell;
use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{PurifyError, PurifyResult};
use crate::graph::Node;
use crate::index::VariableIndex;

/// Statistical oracle for vanishing tetrads.
///
/// `tetrad_p_value(i, j, k, l)` tests `σij·σkl = σik·σjl` for variables at
/// those positions of [`TetradTest::variables`]. Low p-values are evidence
/// that the constraint fails.
pub trait TetradTest {
    fn variables(&self) -> &[Node];

    /// Cutoff below which a p-value counts as a violated tetrad.
    fn significance(&self) -> f64;

    fn tetrad_p_value(&self, i: usize, j: usize, k: usize, l: usize) -> PurifyResult<f64>;
}

/// One scored pairing of four variables, by canonical position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tetrad {
    pub nodes: [usize; 4],
    pub p_value: f64,
}

impl Tetrad {
    pub fn new(nodes: [usize; 4], p_value: f64) -> Self {
        Self { nodes, p_value }
    }

    pub fn node_set(&self) -> BTreeSet<usize> {
        self.nodes.iter().copied().collect()
    }

    pub fn contains(&self, node: usize) -> bool {
        self.nodes.contains(&node)
    }

    /// Renders with variable names, e.g. `<X1, X2, X3, X4> p = 0.0012`.
    pub fn display<'a>(&'a self, index: &'a VariableIndex) -> TetradDisplay<'a> {
        TetradDisplay {
            tetrad: self,
            index,
        }
    }
}

pub struct TetradDisplay<'a> {
    tetrad: &'a Tetrad,
    index: &'a VariableIndex,
}

impl fmt::Display for TetradDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{}> p = {:.4e}",
            self.index.describe(&self.tetrad.nodes),
            self.tetrad.p_value
        )
    }
}

/// Typed pass-through to a [`TetradTest`], counting evaluations against an
/// optional budget.
pub struct TetradOracle<'t, T: TetradTest + ?Sized> {
    test: &'t T,
    evaluations: Cell<u64>,
    budget: Option<u64>,
}

impl<'t, T: TetradTest + ?Sized> TetradOracle<'t, T> {
    pub fn new(test: &'t T, budget: Option<u64>) -> Self {
        Self {
            test,
            evaluations: Cell::new(0),
            budget,
        }
    }

    /// Score the pairing encoded by the order of `quad`.
    pub fn score(&self, quad: [usize; 4]) -> PurifyResult<Tetrad> {
        let used = self.evaluations.get();
        if let Some(limit) = self.budget {
            if used >= limit {
                return Err(PurifyError::BudgetExhausted { limit });
            }
        }
        self.evaluations.set(used + 1);

        let [i, j, k, l] = quad;
        let p = self.test.tetrad_p_value(i, j, k, l)?;
        if !(0.0..=1.0).contains(&p) {
            return Err(PurifyError::oracle(format!(
                "p-value {p} for ({i}, {j}, {k}, {l}) is outside [0, 1]"
            )));
        }
        trace!(i, j, k, l, p_value = p, "tetrad evaluated");
        Ok(Tetrad::new(quad, p))
    }

    pub fn evaluations(&self) -> u64 {
        self.evaluations.get()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Oracle whose p-values come from a closure over positions.
    pub(crate) struct FnTetradTest<F> {
        pub variables: Vec<Node>,
        pub alpha: f64,
        pub f: F,
    }

    impl<F> FnTetradTest<F>
    where
        F: Fn(usize, usize, usize, usize) -> f64,
    {
        pub fn new(variables: Vec<Node>, alpha: f64, f: F) -> Self {
            Self { variables, alpha, f }
        }
    }

    impl<F> TetradTest for FnTetradTest<F>
    where
        F: Fn(usize, usize, usize, usize) -> f64,
    {
        fn variables(&self) -> &[Node] {
            &self.variables
        }

        fn significance(&self) -> f64 {
            self.alpha
        }

        fn tetrad_p_value(&self, i: usize, j: usize, k: usize, l: usize) -> PurifyResult<f64> {
            Ok((self.f)(i, j, k, l))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FnTetradTest;
    use super::*;
    use crate::graph::nodes;

    #[test]
    fn budget_is_enforced() {
        let test = FnTetradTest::new(nodes(&["A", "B", "C", "D"]), 0.05, |_, _, _, _| 0.5);
        let oracle = TetradOracle::new(&test, Some(2));
        assert!(oracle.score([0, 1, 2, 3]).is_ok());
        assert!(oracle.score([0, 1, 3, 2]).is_ok());
        assert!(matches!(
            oracle.score([0, 2, 3, 1]),
            Err(PurifyError::BudgetExhausted { limit: 2 })
        ));
        assert_eq!(oracle.evaluations(), 2);
    }

    #[test]
    fn out_of_range_p_value_is_an_oracle_error() {
        let test = FnTetradTest::new(nodes(&["A", "B", "C", "D"]), 0.05, |_, _, _, _| f64::NAN);
        let oracle = TetradOracle::new(&test, None);
        assert!(matches!(
            oracle.score([0, 1, 2, 3]),
            Err(PurifyError::OracleComputation { .. })
        ));
    }

    #[test]
    fn display_uses_names() {
        let index = VariableIndex::new(&nodes(&["A", "B", "C", "D"])).unwrap();
        let t = Tetrad::new([0, 2, 3, 1], 0.001);
        assert_eq!(t.display(&index).to_string(), "<A, C, D, B> p = 1.0000e-3");
        assert_eq!(t.node_set().into_iter().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    }
}
