//! Probabilities over discrete data under a symmetric Dirichlet prior.
//!
//! With prior weight `α`, every cell of the joint table receives `α` pseudo
//! counts. A proposition allowing `m` of the `M = ∏ dims` cells then has
//! probability `(count + α·m) / (N + α·M)`. `α = 0` gives plain relative
//! frequencies.

use serde::{Deserialize, Serialize};

use crate::error::{PurifyError, PurifyResult};
use crate::graph::Node;

/// A variable with named categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscreteVariable {
    pub node: Node,
    pub categories: Vec<String>,
}

impl DiscreteVariable {
    pub fn new<S: AsRef<str>>(name: &str, categories: &[S]) -> Self {
        Self {
            node: Node::new(name),
            categories: categories.iter().map(|c| c.as_ref().to_string()).collect(),
        }
    }

    pub fn num_categories(&self) -> usize {
        self.categories.len()
    }

    pub fn category_index(&self, category: &str) -> Option<usize> {
        self.categories.iter().position(|c| c == category)
    }
}

/// Cases of category indices, one row per case.
#[derive(Debug, Clone)]
pub struct DiscreteDataSet {
    variables: Vec<DiscreteVariable>,
    rows: Vec<Vec<usize>>,
}

impl DiscreteDataSet {
    pub fn new(variables: Vec<DiscreteVariable>, rows: Vec<Vec<usize>>) -> PurifyResult<Self> {
        if let Some(v) = variables.iter().find(|v| v.categories.is_empty()) {
            return Err(PurifyError::data(format!("variable {} has no categories", v.node)));
        }
        for (r, row) in rows.iter().enumerate() {
            if row.len() != variables.len() {
                return Err(PurifyError::DimensionMismatch {
                    expected: variables.len(),
                    actual: row.len(),
                });
            }
            for (value, var) in row.iter().zip(&variables) {
                if *value >= var.num_categories() {
                    return Err(PurifyError::data(format!(
                        "row {r}: category {value} out of range for {} ({} categories)",
                        var.node,
                        var.num_categories()
                    )));
                }
            }
        }
        Ok(Self { variables, rows })
    }

    pub fn variables(&self) -> &[DiscreteVariable] {
        &self.variables
    }

    pub fn rows(&self) -> &[Vec<usize>] {
        &self.rows
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn dims(&self) -> Vec<usize> {
        self.variables.iter().map(DiscreteVariable::num_categories).collect()
    }
}

/// A conjunction of per-variable category restrictions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposition {
    allowed: Vec<Vec<bool>>,
}

impl Proposition {
    /// Allows every category of every variable.
    pub fn tautology(dims: &[usize]) -> Self {
        Self {
            allowed: dims.iter().map(|&d| vec![true; d]).collect(),
        }
    }

    pub fn dims(&self) -> Vec<usize> {
        self.allowed.iter().map(Vec::len).collect()
    }

    /// Allow only `category` for `variable`.
    pub fn restrict_to(&mut self, variable: usize, category: usize) -> PurifyResult<&mut Self> {
        self.check(variable, category)?;
        for (c, slot) in self.allowed[variable].iter_mut().enumerate() {
            *slot = c == category;
        }
        Ok(self)
    }

    pub fn disallow(&mut self, variable: usize, category: usize) -> PurifyResult<&mut Self> {
        self.check(variable, category)?;
        self.allowed[variable][category] = false;
        Ok(self)
    }

    /// True if some category of `variable` is ruled out.
    pub fn is_conditioned(&self, variable: usize) -> bool {
        self.allowed[variable].iter().any(|a| !a)
    }

    pub fn num_allowed(&self, variable: usize) -> usize {
        self.allowed[variable].iter().filter(|a| **a).count()
    }

    pub fn is_permissible(&self, point: &[usize]) -> bool {
        point.len() == self.allowed.len()
            && point
                .iter()
                .zip(&self.allowed)
                .all(|(&v, allowed)| allowed.get(v).copied().unwrap_or(false))
    }

    /// Cells of the joint table this proposition allows.
    pub fn num_cells(&self) -> f64 {
        (0..self.allowed.len()).map(|v| self.num_allowed(v) as f64).product()
    }

    pub fn and(&self, other: &Proposition) -> PurifyResult<Proposition> {
        self.same_shape(other)?;
        Ok(Proposition {
            allowed: self
                .allowed
                .iter()
                .zip(&other.allowed)
                .map(|(a, b)| a.iter().zip(b).map(|(x, y)| *x && *y).collect())
                .collect(),
        })
    }

    fn same_shape(&self, other: &Proposition) -> PurifyResult<()> {
        if self.dims() != other.dims() {
            return Err(PurifyError::config(format!(
                "propositions over different variables: {:?} vs {:?}",
                self.dims(),
                other.dims()
            )));
        }
        Ok(())
    }

    fn check(&self, variable: usize, category: usize) -> PurifyResult<()> {
        let dims = self.allowed.get(variable).ok_or(PurifyError::DimensionMismatch {
            expected: self.allowed.len(),
            actual: variable + 1,
        })?;
        if category >= dims.len() {
            return Err(PurifyError::config(format!(
                "category {category} out of range for variable {variable}"
            )));
        }
        Ok(())
    }
}

/// Smoothed probability estimates over a [`DiscreteDataSet`].
#[derive(Debug, Clone)]
pub struct DirichletProbs {
    data: DiscreteDataSet,
    prior: f64,
    dims: Vec<usize>,
}

impl DirichletProbs {
    pub fn new(data: DiscreteDataSet, prior: f64) -> PurifyResult<Self> {
        if !(prior >= 0.0 && prior.is_finite()) {
            return Err(PurifyError::config(format!("prior weight must be non-negative, got {prior}")));
        }
        let dims = data.dims();
        Ok(Self { data, prior, dims })
    }

    pub fn data(&self) -> &DiscreteDataSet {
        &self.data
    }

    pub fn prior(&self) -> f64 {
        self.prior
    }

    pub fn tautology(&self) -> Proposition {
        Proposition::tautology(&self.dims)
    }

    /// Probability of the single cell `values`.
    pub fn cell_prob(&self, values: &[usize]) -> PurifyResult<f64> {
        let mut cell = self.tautology();
        if values.len() != self.dims.len() {
            return Err(PurifyError::DimensionMismatch {
                expected: self.dims.len(),
                actual: values.len(),
            });
        }
        for (v, &value) in values.iter().enumerate() {
            cell.restrict_to(v, value)?;
        }
        self.prob(&cell)
    }

    pub fn prob(&self, proposition: &Proposition) -> PurifyResult<f64> {
        self.matches_data(proposition)?;
        let total = self.tautology().num_cells();
        ratio(
            self.count(proposition) + self.prior * proposition.num_cells(),
            self.data.num_rows() as f64 + self.prior * total,
        )
    }

    /// `P(assertion | condition)` as smoothed joint over smoothed condition.
    pub fn conditional_prob(&self, assertion: &Proposition, condition: &Proposition) -> PurifyResult<f64> {
        self.matches_data(assertion)?;
        self.matches_data(condition)?;
        let joint = assertion.and(condition)?;
        ratio(
            self.count(&joint) + self.prior * joint.num_cells(),
            self.count(condition) + self.prior * condition.num_cells(),
        )
    }

    fn count(&self, proposition: &Proposition) -> f64 {
        self.data
            .rows()
            .iter()
            .filter(|row| proposition.is_permissible(row))
            .count() as f64
    }

    fn matches_data(&self, proposition: &Proposition) -> PurifyResult<()> {
        if proposition.dims() != self.dims {
            return Err(PurifyError::config(format!(
                "proposition shape {:?} does not match data {:?}",
                proposition.dims(),
                self.dims
            )));
        }
        Ok(())
    }
}

fn ratio(num: f64, den: f64) -> PurifyResult<f64> {
    if den <= 0.0 {
        return Err(PurifyError::data("probability undefined: no cases and no prior mass"));
    }
    Ok(num / den)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> DiscreteDataSet {
        let vars = vec![
            DiscreteVariable::new("A", &["lo", "hi"]),
            DiscreteVariable::new("B", &["x", "y", "z"]),
        ];
        let rows = vec![vec![0, 0], vec![0, 1], vec![1, 1], vec![1, 1], vec![1, 2], vec![0, 0]];
        DiscreteDataSet::new(vars, rows).unwrap()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn zero_prior_is_relative_frequency() {
        let probs = DirichletProbs::new(data(), 0.0).unwrap();
        assert!(close(probs.cell_prob(&[1, 1]).unwrap(), 2.0 / 6.0));
        assert!(close(probs.cell_prob(&[0, 2]).unwrap(), 0.0));

        let mut a_hi = probs.tautology();
        a_hi.restrict_to(0, 1).unwrap();
        assert!(close(probs.prob(&a_hi).unwrap(), 0.5));

        let mut b_y = probs.tautology();
        b_y.restrict_to(1, 1).unwrap();
        assert!(close(probs.conditional_prob(&b_y, &a_hi).unwrap(), 2.0 / 3.0));
    }

    #[test]
    fn prior_smooths_every_cell() {
        let probs = DirichletProbs::new(data(), 1.0).unwrap();
        // (0 + 1) / (6 + 6)
        assert!(close(probs.cell_prob(&[0, 2]).unwrap(), 1.0 / 12.0));

        let mut a_hi = probs.tautology();
        a_hi.restrict_to(0, 1).unwrap();
        let mut b_y = probs.tautology();
        b_y.restrict_to(1, 1).unwrap();
        // (2 + 1) / (3 + 3)
        assert!(close(probs.conditional_prob(&b_y, &a_hi).unwrap(), 0.5));

        let mut not_z = probs.tautology();
        not_z.disallow(1, 2).unwrap();
        assert!(not_z.is_conditioned(1));
        assert!(!not_z.is_conditioned(0));
        assert_eq!(not_z.num_allowed(1), 2);
        // (5 + 4) / (6 + 6)
        assert!(close(probs.prob(&not_z).unwrap(), 0.75));
        assert!(close(probs.prob(&probs.tautology()).unwrap(), 1.0));
    }

    #[test]
    fn shapes_are_checked() {
        let probs = DirichletProbs::new(data(), 0.5).unwrap();
        let other = Proposition::tautology(&[2, 2]);
        assert!(probs.prob(&other).is_err());
        assert!(probs.conditional_prob(&probs.tautology(), &other).is_err());
        assert!(probs.cell_prob(&[0]).is_err());
        assert!(probs.cell_prob(&[0, 3]).is_err());
        assert!(DirichletProbs::new(data(), -1.0).is_err());
    }

    #[test]
    fn bad_rows_are_rejected() {
        let vars = vec![DiscreteVariable::new("A", &["0", "1"])];
        assert!(DiscreteDataSet::new(vars.clone(), vec![vec![2]]).is_err());
        assert!(DiscreteDataSet::new(vars, vec![vec![0, 1]]).is_err());
    }

    #[test]
    fn empty_data_without_prior_is_undefined() {
        let vars = vec![DiscreteVariable::new("A", &["0", "1"])];
        let probs = DirichletProbs::new(DiscreteDataSet::new(vars, Vec::new()).unwrap(), 0.0).unwrap();
        assert!(probs.cell_prob(&[0]).is_err());
    }
}
