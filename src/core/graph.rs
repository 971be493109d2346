//! Hybrid Gaussian factor graph.
//!
//! Holds continuous, discrete and mixture factors side by side and assembles
//! the decision tree of continuous subproblems used by hybrid elimination.

use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

use tracing::debug;

use crate::core::key::{DiscreteKey, DiscreteKeys, Key, KeyFormatter, default_key_formatter};
use crate::core::values::{HybridValues, VectorValues};
use crate::core::{ApproxEq, KeyFormat};
use crate::decision_tree::DecisionTree;
use crate::error::HybridResult;
use crate::factors::{
    DecisionTreeFactor, FactorKeys, GaussianFactorGraphTree, GaussianMixtureFactor, GraphAndConstant,
    HybridFactor, HybridGaussianFactor,
};

/// Statistics about a hybrid factor graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HybridGraphStatistics {
    pub num_factors: usize,
    pub num_continuous_factors: usize,
    pub num_discrete_factors: usize,
    pub num_mixture_factors: usize,
    pub num_continuous_keys: usize,
    pub num_discrete_keys: usize,
}

impl fmt::Display for HybridGraphStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HybridGaussianFactorGraph Statistics:\n\
             Factors: {} (continuous: {}, discrete: {}, mixture: {})\n\
             Keys: {} continuous, {} discrete",
            self.num_factors,
            self.num_continuous_factors,
            self.num_discrete_factors,
            self.num_mixture_factors,
            self.num_continuous_keys,
            self.num_discrete_keys
        )
    }
}

/// Any factor that can live in a [`HybridGaussianFactorGraph`]
#[derive(Debug, Clone, PartialEq)]
pub enum HybridGraphFactor {
    Continuous(HybridGaussianFactor),
    Discrete(DecisionTreeFactor),
    Mixture(GaussianMixtureFactor),
}

impl HybridGraphFactor {
    fn as_factor(&self) -> &dyn HybridFactor {
        match self {
            HybridGraphFactor::Continuous(factor) => factor,
            HybridGraphFactor::Discrete(factor) => factor,
            HybridGraphFactor::Mixture(factor) => factor,
        }
    }
}

impl HybridFactor for HybridGraphFactor {
    fn factor_keys(&self) -> &FactorKeys {
        self.as_factor().factor_keys()
    }

    fn error(&self, values: &HybridValues) -> HybridResult<f64> {
        self.as_factor().error(values)
    }

    fn as_any(&self) -> &dyn Any {
        self.as_factor().as_any()
    }

    fn equals(&self, other: &dyn HybridFactor, tol: f64) -> bool {
        self.as_factor().equals(other, tol)
    }
}

impl ApproxEq for HybridGraphFactor {
    fn approx_eq(&self, other: &Self, tol: f64) -> bool {
        self.equals(other, tol)
    }
}

impl KeyFormat for HybridGraphFactor {
    fn fmt_keys(&self, f: &mut fmt::Formatter<'_>, formatter: &KeyFormatter) -> fmt::Result {
        match self {
            HybridGraphFactor::Continuous(factor) => factor.fmt_keys(f, formatter),
            HybridGraphFactor::Discrete(factor) => factor.fmt_keys(f, formatter),
            HybridGraphFactor::Mixture(factor) => factor.fmt_keys(f, formatter),
        }
    }
}

impl From<HybridGaussianFactor> for HybridGraphFactor {
    fn from(factor: HybridGaussianFactor) -> Self {
        HybridGraphFactor::Continuous(factor)
    }
}

impl From<DecisionTreeFactor> for HybridGraphFactor {
    fn from(factor: DecisionTreeFactor) -> Self {
        HybridGraphFactor::Discrete(factor)
    }
}

impl From<GaussianMixtureFactor> for HybridGraphFactor {
    fn from(factor: GaussianMixtureFactor) -> Self {
        HybridGraphFactor::Mixture(factor)
    }
}

/// Factor graph over continuous and discrete variables
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HybridGaussianFactorGraph {
    factors: Vec<HybridGraphFactor>,
}

impl HybridGaussianFactorGraph {
    /// Creates a new, empty factor graph
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, factor: impl Into<HybridGraphFactor>) {
        self.factors.push(factor.into());
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HybridGraphFactor> {
        self.factors.iter()
    }

    /// Discrete keys of all factors, concatenated in factor order
    pub fn discrete_keys(&self) -> DiscreteKeys {
        self.factors
            .iter()
            .flat_map(|factor| factor.discrete_keys().iter().copied())
            .collect()
    }

    pub fn discrete_key_set(&self) -> BTreeSet<Key> {
        self.discrete_keys().into_iter().map(|dk| dk.key).collect()
    }

    /// Map from key identifier to discrete key; later factors win on repeats
    pub fn discrete_key_map(&self) -> HashMap<Key, DiscreteKey> {
        self.discrete_keys().into_iter().map(|dk| (dk.key, dk)).collect()
    }

    pub fn continuous_key_set(&self) -> BTreeSet<Key> {
        self.factors
            .iter()
            .flat_map(|factor| factor.continuous_keys().iter().copied())
            .collect()
    }

    pub fn statistics(&self) -> HybridGraphStatistics {
        let count = |pred: fn(&HybridGraphFactor) -> bool| self.factors.iter().filter(|f| pred(f)).count();
        HybridGraphStatistics {
            num_factors: self.factors.len(),
            num_continuous_factors: count(|f| matches!(f, HybridGraphFactor::Continuous(_))),
            num_discrete_factors: count(|f| matches!(f, HybridGraphFactor::Discrete(_))),
            num_mixture_factors: count(|f| matches!(f, HybridGraphFactor::Mixture(_))),
            num_continuous_keys: self.continuous_key_set().len(),
            num_discrete_keys: self.discrete_key_set().len(),
        }
    }

    /// Collect the continuous subproblem for every discrete assignment.
    ///
    /// Continuous factors are appended to every subproblem, mixtures contribute
    /// the component selected by each assignment, and discrete-only factors are
    /// skipped since only continuous variables are eliminated from the result.
    pub fn assemble_graph_tree(&self) -> HybridResult<GaussianFactorGraphTree> {
        let mut result = GaussianFactorGraphTree::leaf(GraphAndConstant::default());
        for factor in &self.factors {
            match factor {
                HybridGraphFactor::Continuous(gaussian) => {
                    let inner = gaussian.inner();
                    result = result.map(|leaf| leaf.with_factor(inner.clone()));
                }
                HybridGraphFactor::Mixture(mixture) => {
                    result = mixture.add(&result)?;
                }
                HybridGraphFactor::Discrete(_) => {}
            }
        }
        debug!(
            "Assembled graph tree from {} factors: {} nodes, {} distinct subproblems",
            self.factors.len(),
            result.num_nodes(),
            result.num_leaves()
        );
        Ok(result)
    }

    /// Sum of all factor errors at a joint assignment
    pub fn error(&self, values: &HybridValues) -> HybridResult<f64> {
        self.factors.iter().map(|factor| factor.error(values)).sum()
    }

    /// Unnormalized probability `exp(-error)`
    pub fn prob_prime(&self, values: &HybridValues) -> HybridResult<f64> {
        Ok((-self.error(values)?).exp())
    }

    /// Error at fixed continuous values for every assignment of the mixture
    /// keys. Discrete-only factors are not included.
    pub fn error_tree(&self, values: &VectorValues) -> HybridResult<DecisionTree<f64>> {
        let mut result = DecisionTree::leaf(0.0);
        for factor in &self.factors {
            match factor {
                HybridGraphFactor::Continuous(gaussian) => {
                    let error = gaussian.inner().error(values)?;
                    result = result.map(|leaf| leaf + error);
                }
                HybridGraphFactor::Mixture(mixture) => {
                    result = result.apply2(&mixture.error_tree(values)?, |a, b| a + b)?;
                }
                HybridGraphFactor::Discrete(_) => {}
            }
        }
        Ok(result)
    }

    /// `exp(-error)` at every leaf of [`error_tree`](Self::error_tree)
    pub fn prob_prime_tree(&self, values: &VectorValues) -> HybridResult<DecisionTree<f64>> {
        Ok(self.error_tree(values)?.map(|error| (-error).exp()))
    }
}

impl FromIterator<HybridGraphFactor> for HybridGaussianFactorGraph {
    fn from_iter<I: IntoIterator<Item = HybridGraphFactor>>(iter: I) -> Self {
        Self {
            factors: iter.into_iter().collect(),
        }
    }
}

impl ApproxEq for HybridGaussianFactorGraph {
    fn approx_eq(&self, other: &Self, tol: f64) -> bool {
        self.factors.len() == other.factors.len()
            && self
                .factors
                .iter()
                .zip(&other.factors)
                .all(|(a, b)| a.approx_eq(b, tol))
    }
}

impl KeyFormat for HybridGaussianFactorGraph {
    fn fmt_keys(&self, f: &mut fmt::Formatter<'_>, formatter: &KeyFormatter) -> fmt::Result {
        writeln!(f, "HybridGaussianFactorGraph: {} factors", self.factors.len())?;
        for (i, factor) in self.factors.iter().enumerate() {
            writeln!(f, "Factor {i}: {}", factor.display(formatter))?;
        }
        Ok(())
    }
}

impl fmt::Display for HybridGaussianFactorGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_keys(f, &default_key_formatter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::key::symbol;
    use crate::core::values::DiscreteValues;
    use crate::factors::FactorAndConstant;
    use crate::linalg::JacobianFactor;
    use nalgebra::{dmatrix, dvector};
    use std::sync::Arc;

    const TOLERANCE: f64 = 1e-12;

    fn x(i: u64) -> Key {
        symbol('x', i)
    }

    fn m(i: u64) -> DiscreteKey {
        DiscreteKey::new(symbol('m', i), 2)
    }

    /// x0 prior, mixture on x0 switched by m0, discrete prior on m0
    fn small_graph() -> Result<HybridGaussianFactorGraph, Box<dyn std::error::Error>> {
        let mut graph = HybridGaussianFactorGraph::new();
        graph.push(HybridGaussianFactor::new(JacobianFactor::unary(
            x(0),
            dmatrix![1.0],
            dvector![0.0],
        )?)?);
        graph.push(GaussianMixtureFactor::from_components(
            vec![x(0)],
            vec![m(0)],
            vec![
                FactorAndConstant::new(JacobianFactor::unary(x(0), dmatrix![1.0], dvector![1.0])?, 0.0),
                FactorAndConstant::new(JacobianFactor::unary(x(0), dmatrix![2.0], dvector![1.0])?, 0.5),
            ],
        )?);
        graph.push(DecisionTreeFactor::new(vec![m(0)], vec![0.4, 0.6])?);
        Ok(graph)
    }

    #[test]
    fn test_key_queries() -> Result<(), Box<dyn std::error::Error>> {
        let graph = small_graph()?;
        assert_eq!(graph.len(), 3);
        assert_eq!(graph.discrete_keys(), vec![m(0), m(0)]);
        assert_eq!(graph.discrete_key_set(), BTreeSet::from([m(0).key]));
        assert_eq!(graph.discrete_key_map().get(&m(0).key), Some(&m(0)));
        assert_eq!(graph.continuous_key_set(), BTreeSet::from([x(0)]));

        let stats = graph.statistics();
        assert_eq!(stats.num_continuous_factors, 1);
        assert_eq!(stats.num_discrete_factors, 1);
        assert_eq!(stats.num_mixture_factors, 1);
        assert_eq!(stats.num_discrete_keys, 1);
        Ok(())
    }

    #[test]
    fn test_assemble_graph_tree() -> Result<(), Box<dyn std::error::Error>> {
        let graph = small_graph()?;
        let tree = graph.assemble_graph_tree()?;
        assert_eq!(tree.num_leaves(), 2);

        let HybridGraphFactor::Mixture(mixture) = &graph.factors[1] else {
            panic!("second factor should be a mixture");
        };
        let HybridGraphFactor::Continuous(prior) = &graph.factors[0] else {
            panic!("first factor should be continuous");
        };
        for (state, constant) in [(0, 0.0), (1, 0.5)] {
            let assignment = DiscreteValues::from([(m(0).key, state)]);
            let leaf = tree.get(&assignment)?;
            assert_eq!(leaf.graph.len(), 2);
            assert!(Arc::ptr_eq(&leaf.graph.factors()[0], prior.inner()));
            assert!(Arc::ptr_eq(&leaf.graph.factors()[1], mixture.factor_at(&assignment)?));
            assert_eq!(leaf.constant, constant);
        }
        Ok(())
    }

    #[test]
    fn test_empty_graph_assembles_single_empty_subproblem() -> Result<(), Box<dyn std::error::Error>> {
        let tree = HybridGaussianFactorGraph::new().assemble_graph_tree()?;
        assert!(tree.is_leaf());
        assert!(tree.get(&DiscreteValues::new())?.graph.is_empty());
        Ok(())
    }

    #[test]
    fn test_error_and_prob_prime() -> Result<(), Box<dyn std::error::Error>> {
        let graph = small_graph()?;
        let continuous = VectorValues::new().with(x(0), dvector![1.0]);
        let values = HybridValues::new(continuous.clone(), DiscreteValues::from([(m(0).key, 1)]));

        // prior 0.5 * 1, mixture 0.5 * (2 - 1)^2 - 0.5, discrete -ln 0.6
        let expected = 0.5 + 0.0 - 0.6f64.ln();
        assert!((graph.error(&values)? - expected).abs() < TOLERANCE);
        assert!((graph.prob_prime(&values)? - (-expected).exp()).abs() < TOLERANCE);

        let tree = graph.error_tree(&continuous)?;
        assert!((tree.get(&DiscreteValues::from([(m(0).key, 0)]))? - 0.5).abs() < TOLERANCE);
        assert!((tree.get(&DiscreteValues::from([(m(0).key, 1)]))? - 0.5).abs() < TOLERANCE);

        let probs = graph.prob_prime_tree(&continuous)?;
        for leaf in probs.leaves() {
            assert!((leaf - (-0.5f64).exp()).abs() < TOLERANCE);
        }
        Ok(())
    }

    #[test]
    fn test_factor_equality_through_enum() -> Result<(), Box<dyn std::error::Error>> {
        let a = small_graph()?;
        let b = small_graph()?;
        assert!(a.approx_eq(&b, 0.0));
        assert!(a.factors[2].equals(&b.factors[2], TOLERANCE));
        assert!(!a.factors[0].equals(&b.factors[2], TOLERANCE));
        assert!(a.to_string().starts_with("HybridGaussianFactorGraph: 3 factors"));
        Ok(())
    }
}
