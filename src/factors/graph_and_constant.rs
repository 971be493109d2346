//! Gaussian factor graph annotated with a log-normalization constant, and the
//! decision tree of such subproblems indexed by discrete assignment.

use std::fmt;
use std::hash::Hasher;
use std::sync::Arc;

use crate::core::key::{KeyFormatter, default_key_formatter};
use crate::core::{ApproxEq, DEFAULT_TOLERANCE, KeyFormat};
use crate::decision_tree::{DecisionTree, LeafHash};
use crate::error::HybridResult;
use crate::linalg::{GaussianFactorGraph, JacobianFactor};

/// Gaussian factor graph and the log of its normalizing constant.
///
/// This is the continuous subproblem selected by one discrete assignment of a
/// hybrid model. The constant typically accumulates the log normalization terms
/// of the mixture components that contributed factors to `graph`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphAndConstant {
    pub graph: GaussianFactorGraph,
    pub constant: f64,
}

/// Decision tree of Gaussian factor graphs, one per discrete assignment
pub type GaussianFactorGraphTree = DecisionTree<GraphAndConstant>;

impl GraphAndConstant {
    pub fn new(graph: GaussianFactorGraph, constant: f64) -> Self {
        Self { graph, constant }
    }

    /// Subproblem with a single factor
    pub fn from_factor(factor: impl Into<Arc<JacobianFactor>>, constant: f64) -> Self {
        let mut graph = GaussianFactorGraph::new();
        graph.push(factor);
        Self { graph, constant }
    }

    /// Concatenate the graphs and add the constants
    pub fn combine(&self, other: &GraphAndConstant) -> GraphAndConstant {
        GraphAndConstant {
            graph: self.graph.concat(&other.graph),
            constant: self.constant + other.constant,
        }
    }

    /// Copy with one more factor appended to the graph
    pub fn with_factor(&self, factor: Arc<JacobianFactor>) -> GraphAndConstant {
        let mut graph = self.graph.clone();
        graph.push(factor);
        GraphAndConstant {
            graph,
            constant: self.constant,
        }
    }

    /// Equality with the default tolerance of `1e-9`
    pub fn equals(&self, other: &GraphAndConstant) -> bool {
        self.approx_eq(other, DEFAULT_TOLERANCE)
    }
}

impl ApproxEq for GraphAndConstant {
    fn approx_eq(&self, other: &Self, tol: f64) -> bool {
        self.graph.approx_eq(&other.graph, tol) && self.constant.approx_eq(&other.constant, tol)
    }
}

impl LeafHash for GraphAndConstant {
    fn leaf_hash<H: Hasher>(&self, state: &mut H) {
        self.graph.leaf_hash(state);
        self.constant.leaf_hash(state);
    }
}

impl KeyFormat for GraphAndConstant {
    fn fmt_keys(&self, f: &mut fmt::Formatter<'_>, formatter: &KeyFormatter) -> fmt::Result {
        write!(f, "{}", self.graph.display(formatter))?;
        write!(f, "Constant: {}", self.constant)
    }
}

impl fmt::Display for GraphAndConstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_keys(f, &default_key_formatter)
    }
}

/// Combine two graph trees: at every joint assignment, concatenate the graphs
/// and sum the constants.
pub fn add_graph_trees(
    a: &GaussianFactorGraphTree,
    b: &GaussianFactorGraphTree,
) -> HybridResult<GaussianFactorGraphTree> {
    a.apply2(b, GraphAndConstant::combine)
}
