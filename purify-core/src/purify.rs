//! Incremental purification of a hypothesised clustering.
//!
//! Output clusters start empty. Candidate nodes are admitted one at a time; an
//! admission that completes an impure quad either evicts a node implicated by
//! independent evidence or is itself rejected.
//!
//! The result depends on the visitation order when several resolutions of the
//! same impurity are equally valid. The order is therefore part of
//! [`PurifyConfig`]; a shuffled order without a seed draws one from the OS and
//! reports it in [`Purification::seed`].

use std::collections::{BTreeSet, HashMap, VecDeque};

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::choice::{select, ChoiceGenerator};
use crate::error::{PurifyError, PurifyResult};
use crate::graph::Node;
use crate::impurity::ImpurityDetector;
use crate::index::VariableIndex;
use crate::tetrad::{Tetrad, TetradOracle, TetradTest};

/// Order in which candidate nodes are offered for admission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VisitOrder {
    /// First-appearance order, shuffled with a ChaCha8 generator.
    Shuffled { seed: Option<u64> },
    /// Every clustered variable name exactly once.
    Fixed(Vec<String>),
}

impl Default for VisitOrder {
    fn default() -> Self {
        VisitOrder::Shuffled { seed: None }
    }
}

/// Configuration for a purification run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PurifyConfig {
    pub visit_order: VisitOrder,

    /// Upper bound on oracle calls; `None` searches without limit.
    pub max_tetrad_evaluations: Option<u64>,

    /// Replaces the oracle's own significance level as the cutoff.
    pub significance: Option<f64>,
}

impl PurifyConfig {
    pub fn seeded(seed: u64) -> Self {
        Self {
            visit_order: VisitOrder::Shuffled { seed: Some(seed) },
            ..Default::default()
        }
    }

    pub fn fixed<S: AsRef<str>>(order: &[S]) -> Self {
        Self {
            visit_order: VisitOrder::Fixed(order.iter().map(|s| s.as_ref().to_string()).collect()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    Unresolved,
    Admitted,
    Rejected,
}

/// A tetrad reported with variable names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub nodes: [String; 4],
    pub p_value: f64,
}

impl std::fmt::Display for Evidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{}> p = {:.4e}", self.nodes.join(", "), self.p_value)
    }
}

/// Outcome of resolving one candidate, in the order decisions were made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Admitted {
        node: Node,
    },
    Rejected {
        node: Node,
        /// The tetrad found when the triggering candidate was added.
        evidence: Evidence,
        /// Independent tetrad implicating `node`, when it was evicted in
        /// place of the triggering candidate.
        corroboration: Option<Evidence>,
    },
}

impl Decision {
    pub fn node(&self) -> &Node {
        match self {
            Decision::Admitted { node } | Decision::Rejected { node, .. } => node,
        }
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, Decision::Rejected { .. })
    }
}

/// Purified clustering plus the trail that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Purification {
    /// Same length as the input clustering; members in insertion order.
    pub clusters: Vec<Vec<Node>>,
    pub decisions: Vec<Decision>,
    /// Final state of every clustered node, in first-appearance order.
    pub states: Vec<(Node, NodeState)>,
    /// Seed of the shuffled visitation order, if one was used.
    pub seed: Option<u64>,
    pub tetrad_evaluations: u64,
}

impl Purification {
    /// Nodes removed during the run.
    pub fn rejected(&self) -> Vec<&Node> {
        self.decisions
            .iter()
            .filter(|d| d.is_rejection())
            .map(Decision::node)
            .collect()
    }

    /// Final state of the node called `name`, if it was clustered.
    pub fn state(&self, name: &str) -> Option<NodeState> {
        self.states
            .iter()
            .find(|(node, _)| node.name() == name)
            .map(|&(_, state)| state)
    }
}

/// Tetrad-based purifier over a fixed oracle.
pub struct Purifier<'t, T: TetradTest + ?Sized> {
    test: &'t T,
    index: VariableIndex,
    config: PurifyConfig,
}

impl<'t, T: TetradTest + ?Sized> Purifier<'t, T> {
    pub fn new(test: &'t T) -> PurifyResult<Self> {
        Self::with_config(test, PurifyConfig::default())
    }

    pub fn with_config(test: &'t T, config: PurifyConfig) -> PurifyResult<Self> {
        if let Some(alpha) = config.significance {
            if !(alpha > 0.0 && alpha < 1.0) {
                return Err(PurifyError::config(format!(
                    "significance must lie in (0, 1), got {alpha}"
                )));
            }
        }
        let index = VariableIndex::new(test.variables())?;
        Ok(Self {
            test,
            index,
            config,
        })
    }

    pub fn cutoff(&self) -> f64 {
        self.config.significance.unwrap_or_else(|| self.test.significance())
    }

    /// Purify `clustering`, returning clusters built from the caller's nodes.
    pub fn purify(&self, clustering: &[Vec<Node>]) -> PurifyResult<Purification> {
        let (input, originals) = self.canonicalize(clustering)?;
        let (order, seed) = self.visit_order(&input)?;

        let detector = self.detector();
        let mut output: Vec<Vec<usize>> = vec![Vec::new(); input.len()];
        let mut states = vec![NodeState::Unresolved; self.index.len()];
        let mut decisions = Vec::new();

        self.add_pure_nodes(&detector, &input, &mut output, order, &mut states, &mut decisions)?;

        let clusters: Vec<Vec<Node>> = output
            .iter()
            .map(|cluster| cluster.iter().map(|p| originals[p].clone()).collect())
            .collect();
        let mut seen = BTreeSet::new();
        let states: Vec<(Node, NodeState)> = input
            .iter()
            .flatten()
            .filter(|&&p| seen.insert(p))
            .map(|&p| (originals[&p].clone(), states[p]))
            .collect();
        info!(
            clusters = ?output.iter().map(|c| self.index.describe(c)).collect::<Vec<_>>(),
            evaluations = detector.oracle().evaluations(),
            "purified clustering"
        );

        Ok(Purification {
            clusters,
            decisions,
            states,
            seed,
            tetrad_evaluations: detector.oracle().evaluations(),
        })
    }

    /// True if any quad of `clustering` shows a tetrad below the cutoff.
    pub fn exists_impurity(&self, clustering: &[Vec<Node>]) -> PurifyResult<bool> {
        let (input, _) = self.canonicalize(clustering)?;
        self.detector().exists_impurity(&input)
    }

    /// The first violated tetrad of `clustering` in scan order, if any.
    pub fn first_impurity(&self, clustering: &[Vec<Node>]) -> PurifyResult<Option<Evidence>> {
        let (input, _) = self.canonicalize(clustering)?;
        let found = self.detector().find_impurity(&[], &input, &[])?;
        Ok(found.map(|t| self.evidence(&t)))
    }

    fn detector(&self) -> ImpurityDetector<'t, T> {
        let oracle = TetradOracle::new(self.test, self.config.max_tetrad_evaluations);
        ImpurityDetector::new(oracle, self.cutoff())
    }

    fn add_pure_nodes(
        &self,
        detector: &ImpurityDetector<'t, T>,
        input: &[Vec<usize>],
        output: &mut [Vec<usize>],
        order: Vec<usize>,
        states: &mut [NodeState],
        decisions: &mut Vec<Decision>,
    ) -> PurifyResult<()> {
        let mut to_try: VecDeque<usize> = order.into();
        let mut added = 0usize;

        while let Some(node) = to_try.pop_front() {
            let Some(home) = input.iter().position(|c| c.contains(&node)) else {
                return Err(PurifyError::Precondition {
                    message: format!("{} is not in any input cluster", self.index.name(node)),
                });
            };
            if output[home].contains(&node) {
                continue;
            }
            output[home].push(node);

            let Some(tetrad) = detector.find_impurity(&[node], output, &[])? else {
                added += 1;
                states[node] = NodeState::Admitted;
                info!(node = %self.index.name(node), index = added, "Added");
                decisions.push(Decision::Admitted {
                    node: self.index.node(node).clone(),
                });
                continue;
            };

            let (victim, corroboration) = match self.narrower_culprit(detector, output, &tetrad)? {
                Some((culprit, second)) => (culprit, Some(second)),
                None => (node, None),
            };
            for cluster in output.iter_mut() {
                cluster.retain(|&n| n != victim);
            }
            states[victim] = NodeState::Rejected;

            if victim != node {
                added += 1;
                states[node] = NodeState::Admitted;
                decisions.push(Decision::Admitted {
                    node: self.index.node(node).clone(),
                });
            }
            info!(
                node = %self.index.name(victim),
                tetrad = %tetrad.display(&self.index),
                corroboration = ?corroboration.map(|t| t.display(&self.index).to_string()),
                "Removed"
            );
            decisions.push(Decision::Rejected {
                node: self.index.node(victim).clone(),
                evidence: self.evidence(&tetrad),
                corroboration: corroboration.map(|t| self.evidence(&t)),
            });
        }

        debug_assert!(input.iter().flatten().all(|&n| states[n] != NodeState::Unresolved));
        Ok(())
    }

    /// Look for a pair of the implicated nodes that is impure on evidence not
    /// involving the other two; returns the pair's first node and that
    /// evidence.
    fn narrower_culprit(
        &self,
        detector: &ImpurityDetector<'t, T>,
        output: &[Vec<usize>],
        tetrad: &Tetrad,
    ) -> PurifyResult<Option<(usize, Tetrad)>> {
        let implicated = [tetrad.node_set()];
        for choice in ChoiceGenerator::new(tetrad.nodes.len(), 2) {
            let pair = select(&choice, &tetrad.nodes);
            if let Some(second) = detector.find_impurity(&pair, output, &implicated)? {
                debug!(pair = %self.index.describe(&pair), "pair implicated independently");
                return Ok(Some((pair[0], second)));
            }
        }
        Ok(None)
    }

    /// Resolve every node to its canonical position, remembering the caller's
    /// own node for each position.
    fn canonicalize(&self, clustering: &[Vec<Node>]) -> PurifyResult<(Vec<Vec<usize>>, HashMap<usize, Node>)> {
        let mut originals = HashMap::new();
        let mut input = Vec::with_capacity(clustering.len());
        for (c, cluster) in clustering.iter().enumerate() {
            let mut positions = Vec::with_capacity(cluster.len());
            for node in cluster {
                let pos = self.index.resolve(node)?;
                if positions.contains(&pos) {
                    return Err(PurifyError::DuplicateVariable {
                        name: node.name.clone(),
                        cluster: c,
                    });
                }
                positions.push(pos);
                originals.entry(pos).or_insert_with(|| node.clone());
            }
            input.push(positions);
        }
        Ok((input, originals))
    }

    fn visit_order(&self, input: &[Vec<usize>]) -> PurifyResult<(Vec<usize>, Option<u64>)> {
        let mut distinct = Vec::new();
        let mut seen = BTreeSet::new();
        for &pos in input.iter().flatten() {
            if seen.insert(pos) {
                distinct.push(pos);
            }
        }

        match &self.config.visit_order {
            VisitOrder::Shuffled { seed } => {
                let seed = match seed {
                    Some(s) => *s,
                    None => {
                        let s = rand::random::<u64>();
                        warn!(seed = s, "no seed configured; visitation order is not reproducible without it");
                        s
                    }
                };
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                distinct.shuffle(&mut rng);
                Ok((distinct, Some(seed)))
            }
            VisitOrder::Fixed(names) => {
                let mut order = Vec::with_capacity(names.len());
                let mut listed = BTreeSet::new();
                for name in names {
                    let pos = self.index.position(name).ok_or_else(|| PurifyError::InvalidVisitOrder {
                        message: format!("'{name}' is not a variable of the tetrad test"),
                    })?;
                    if !seen.contains(&pos) {
                        return Err(PurifyError::InvalidVisitOrder {
                            message: format!("'{name}' is not in any cluster"),
                        });
                    }
                    if !listed.insert(pos) {
                        return Err(PurifyError::InvalidVisitOrder {
                            message: format!("'{name}' is listed twice"),
                        });
                    }
                    order.push(pos);
                }
                if let Some(&missing) = distinct.iter().find(|p| !listed.contains(p)) {
                    return Err(PurifyError::InvalidVisitOrder {
                        message: format!("'{}' is never visited", self.index.name(missing)),
                    });
                }
                Ok((order, None))
            }
        }
    }

    fn evidence(&self, tetrad: &Tetrad) -> Evidence {
        Evidence {
            nodes: tetrad.nodes.map(|p| self.index.name(p).to_string()),
            p_value: tetrad.p_value,
        }
    }
}
