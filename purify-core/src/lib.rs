// Shared model: nodes, edges, variable indexing, and errors
pub mod error;
pub mod graph;
pub mod index;

// Tetrad subsystem: combinatorics, oracle contract, and impurity search
pub mod choice;
pub mod cross;
pub mod tetrad;
pub mod impurity;
pub mod purify;

// Statistical collaborators: covariance, concrete tests, and estimators
pub mod covariance;
pub mod wishart;
pub mod pooled;
pub mod dirichlet;
pub mod simulate;

// Public model API
pub use crate::error::{PurifyError, PurifyResult};
pub use crate::graph::{Edge, Endpoint, GraphConstraint, NoEdgesIntoError, Node, NodeType};
pub use crate::index::VariableIndex;

// Public purification API
pub use crate::tetrad::{Tetrad, TetradOracle, TetradTest};
pub use crate::impurity::ImpurityDetector;
pub use crate::purify::{
	Decision, Evidence, NodeState, Purification, Purifier, PurifyConfig, VisitOrder,
};

// Public statistics API
pub use crate::covariance::CovarianceMatrix;
pub use crate::wishart::WishartTetradTest;
pub use crate::pooled::{
	FisherZTest, IndependenceTest, PValueTest, PooledIndependenceTest, PoolingMethod,
};
pub use crate::dirichlet::{DirichletProbs, DiscreteDataSet, DiscreteVariable, Proposition};
pub use crate::simulate::MeasurementModel;
