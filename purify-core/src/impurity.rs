//! Search for tetrad evidence of impurity in a clustering.
//!
//! Candidate quads are scanned in a fixed order: within-cluster quads of each
//! cluster (clustering order, lexicographic combinations), then the
//! cross-construct quads of [`cross_construct_quads`]. A quad is scored under
//! the pairings `(i,j,k,l)`, `(i,j,l,k)`, `(i,k,l,j)` in that order, except 2+2
//! cross quads which are scored under `(i,k,l,j)` only. The first tetrad below
//! the cutoff that also passes the exclusion check wins.

use std::collections::BTreeSet;

use tracing::debug;

use crate::choice::{select, ChoiceGenerator};
use crate::cross::cross_construct_quads;
use crate::error::{PurifyError, PurifyResult};
use crate::tetrad::{Tetrad, TetradOracle, TetradTest};

pub struct ImpurityDetector<'t, T: TetradTest + ?Sized> {
    oracle: TetradOracle<'t, T>,
    cutoff: f64,
}

impl<'t, T: TetradTest + ?Sized> ImpurityDetector<'t, T> {
    pub fn new(oracle: TetradOracle<'t, T>, cutoff: f64) -> Self {
        Self { oracle, cutoff }
    }

    pub fn oracle(&self) -> &TetradOracle<'t, T> {
        &self.oracle
    }

    /// True if any quad of `clustering` has a pairing below the cutoff.
    pub fn exists_impurity(&self, clustering: &[Vec<usize>]) -> PurifyResult<bool> {
        Ok(self.find_impurity(&[], clustering, &[])?.is_some())
    }

    /// First qualifying tetrad among quads containing every node of
    /// `must_include`, or `None`.
    pub fn find_impurity(
        &self,
        must_include: &[usize],
        clustering: &[Vec<usize>],
        excluded: &[BTreeSet<usize>],
    ) -> PurifyResult<Option<Tetrad>> {
        for cluster in clustering {
            if !contains_all(cluster, must_include) {
                continue;
            }
            if let Some(tetrad) = self.find_within_cluster_impurity(must_include, cluster, excluded)? {
                return Ok(Some(tetrad));
            }
        }
        self.find_cross_construct_impurity(must_include, clustering, excluded)
    }

    fn find_within_cluster_impurity(
        &self,
        must_include: &[usize],
        cluster: &[usize],
        excluded: &[BTreeSet<usize>],
    ) -> PurifyResult<Option<Tetrad>> {
        if cluster.len() < 4 {
            return Ok(None);
        }
        for choice in ChoiceGenerator::new(cluster.len(), 4) {
            let quad = select(&choice, cluster);
            if let Some(tetrad) = self.find_three_tetrad_impurity(must_include, &quad, excluded)? {
                return Ok(Some(tetrad));
            }
        }
        Ok(None)
    }

    fn find_cross_construct_impurity(
        &self,
        must_include: &[usize],
        clustering: &[Vec<usize>],
        excluded: &[BTreeSet<usize>],
    ) -> PurifyResult<Option<Tetrad>> {
        for quad in cross_construct_quads(clustering) {
            let found = if quad.shape.uses_three_pairings() {
                self.find_three_tetrad_impurity(must_include, &quad.nodes, excluded)?
            } else {
                self.find_two_by_two_impurity(must_include, &quad.nodes, excluded)?
            };
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }

    /// Score all three pairings of `quad`.
    pub fn find_three_tetrad_impurity(
        &self,
        must_include: &[usize],
        quad: &[usize],
        excluded: &[BTreeSet<usize>],
    ) -> PurifyResult<Option<Tetrad>> {
        let [ci, cj, ck, cl] = as_quad(quad)?;
        if !contains_all(quad, must_include) {
            return Ok(None);
        }
        for pairing in [[ci, cj, ck, cl], [ci, cj, cl, ck], [ci, ck, cl, cj]] {
            if let Some(tetrad) = self.qualifying(pairing, must_include, excluded)? {
                return Ok(Some(tetrad));
            }
        }
        Ok(None)
    }

    /// Score only the cross pairing of a quad split two and two.
    pub fn find_two_by_two_impurity(
        &self,
        must_include: &[usize],
        quad: &[usize],
        excluded: &[BTreeSet<usize>],
    ) -> PurifyResult<Option<Tetrad>> {
        let [ci, cj, ck, cl] = as_quad(quad)?;
        if !contains_all(quad, must_include) {
            return Ok(None);
        }
        self.qualifying([ci, ck, cl, cj], must_include, excluded)
    }

    fn qualifying(
        &self,
        pairing: [usize; 4],
        must_include: &[usize],
        excluded: &[BTreeSet<usize>],
    ) -> PurifyResult<Option<Tetrad>> {
        let tetrad = self.oracle.score(pairing)?;
        if tetrad.p_value < self.cutoff && checks_out(&tetrad, excluded, must_include) {
            debug!(nodes = ?tetrad.nodes, p_value = tetrad.p_value, "found tetrad");
            return Ok(Some(tetrad));
        }
        Ok(None)
    }
}

/// True unless some excluded set, less the `must_include` nodes, shares a node
/// with `tetrad`.
pub fn checks_out(tetrad: &Tetrad, excluded: &[BTreeSet<usize>], must_include: &[usize]) -> bool {
    excluded.iter().all(|set| {
        set.iter()
            .filter(|n| !must_include.contains(n))
            .all(|&n| !tetrad.contains(n))
    })
}

fn contains_all(haystack: &[usize], needles: &[usize]) -> bool {
    needles.iter().all(|n| haystack.contains(n))
}

fn as_quad(quad: &[usize]) -> PurifyResult<[usize; 4]> {
    <[usize; 4]>::try_from(quad).map_err(|_| PurifyError::Precondition {
        message: format!("expected a 4-node quad, got {} nodes: {:?}", quad.len(), quad),
    })
}
