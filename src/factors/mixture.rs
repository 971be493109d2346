//! Gaussian mixture factor: one linear Gaussian component per discrete
//! assignment, each carrying the log of its normalizing constant.

use std::any::Any;
use std::fmt;
use std::hash::Hasher;
use std::sync::Arc;

use tracing::debug;

use super::graph_and_constant::{GaussianFactorGraphTree, GraphAndConstant, add_graph_trees};
use super::{FactorKeys, HybridFactor};
use crate::core::key::{DiscreteKey, KeyFormatter, KeyVector, default_key_formatter};
use crate::core::values::{DiscreteValues, HybridValues, VectorValues};
use crate::core::{ApproxEq, KeyFormat};
use crate::decision_tree::{DecisionTree, LeafHash};
use crate::error::{HybridError, HybridResult};
use crate::linalg::JacobianFactor;

/// Linear Gaussian factor together with a log-normalization constant
#[derive(Debug, Clone, PartialEq)]
pub struct FactorAndConstant {
    pub factor: Arc<JacobianFactor>,
    pub constant: f64,
}

impl FactorAndConstant {
    pub fn new(factor: impl Into<Arc<JacobianFactor>>, constant: f64) -> Self {
        Self {
            factor: factor.into(),
            constant,
        }
    }

    /// Negative log-likelihood: the quadratic error minus the log constant
    pub fn error(&self, values: &VectorValues) -> HybridResult<f64> {
        Ok(self.factor.error(values)? - self.constant)
    }
}

impl ApproxEq for FactorAndConstant {
    fn approx_eq(&self, other: &Self, tol: f64) -> bool {
        (Arc::ptr_eq(&self.factor, &other.factor) || self.factor.approx_eq(&other.factor, tol))
            && self.constant.approx_eq(&other.constant, tol)
    }
}

impl LeafHash for FactorAndConstant {
    fn leaf_hash<H: Hasher>(&self, state: &mut H) {
        self.factor.leaf_hash(state);
        self.constant.leaf_hash(state);
    }
}

impl KeyFormat for FactorAndConstant {
    fn fmt_keys(&self, f: &mut fmt::Formatter<'_>, formatter: &KeyFormatter) -> fmt::Result {
        write!(f, "{} (constant {})", self.factor.display(formatter), self.constant)
    }
}

/// Hybrid factor selecting a Gaussian component by discrete assignment.
///
/// # Example
///
/// ```
/// use apex_hybrid::core::key::DiscreteKey;
/// use apex_hybrid::core::values::DiscreteValues;
/// use apex_hybrid::factors::{FactorAndConstant, GaussianMixtureFactor};
/// use apex_hybrid::linalg::JacobianFactor;
/// use nalgebra::{dmatrix, dvector};
///
/// # fn example() -> Result<(), apex_hybrid::HybridError> {
/// let mode = DiscreteKey::new(10u64, 2);
/// let mixture = GaussianMixtureFactor::from_components(
///     vec![0],
///     vec![mode],
///     vec![
///         FactorAndConstant::new(JacobianFactor::unary(0, dmatrix![1.0], dvector![0.0])?, 0.0),
///         FactorAndConstant::new(JacobianFactor::unary(0, dmatrix![1.0], dvector![5.0])?, 0.0),
///     ],
/// )?;
/// let factor = mixture.factor_at(&DiscreteValues::from([(10, 1)]))?;
/// assert_eq!(factor.rhs()[0], 5.0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianMixtureFactor {
    keys: FactorKeys,
    components: DecisionTree<FactorAndConstant>,
}

impl GaussianMixtureFactor {
    /// Create a mixture from a tree of components.
    ///
    /// # Errors
    ///
    /// - [`HybridError::EmptyKeys`] when either key set is empty
    /// - [`HybridError::UndeclaredKey`] when a component touches a continuous key
    ///   outside `continuous_keys`, or the tree branches on a key outside
    ///   `discrete_keys`
    /// - [`HybridError::CardinalityMismatch`] when a branch disagrees with the
    ///   declared cardinality of its key
    pub fn new(
        continuous_keys: KeyVector,
        discrete_keys: Vec<DiscreteKey>,
        components: DecisionTree<FactorAndConstant>,
    ) -> HybridResult<Self> {
        let keys = FactorKeys::hybrid(continuous_keys, discrete_keys)?;

        for branch in components.discrete_keys() {
            let declared = keys
                .discrete_keys()
                .iter()
                .find(|dk| dk.key == branch.key)
                .ok_or(HybridError::UndeclaredKey(branch.key))?;
            if declared.cardinality != branch.cardinality {
                return Err(HybridError::CardinalityMismatch {
                    key: branch.key,
                    expected: declared.cardinality,
                    actual: branch.cardinality,
                });
            }
        }

        for component in components.leaves() {
            if let Some(&key) = component
                .factor
                .keys()
                .iter()
                .find(|key| !keys.continuous_keys().contains(key))
            {
                return Err(HybridError::UndeclaredKey(key));
            }
        }

        debug!(
            "Created Gaussian mixture on {} continuous and {} discrete keys with {} distinct components",
            keys.continuous_keys().len(),
            keys.discrete_keys().len(),
            components.num_leaves()
        );
        Ok(Self { keys, components })
    }

    /// Create a mixture from one component per assignment of `discrete_keys`,
    /// enumerated lexicographically with the first key most significant.
    pub fn from_components(
        continuous_keys: KeyVector,
        discrete_keys: Vec<DiscreteKey>,
        components: Vec<FactorAndConstant>,
    ) -> HybridResult<Self> {
        let tree = DecisionTree::from_enumeration(&discrete_keys, components)?;
        Self::new(continuous_keys, discrete_keys, tree)
    }

    /// Same as [`from_components`](Self::from_components) with every log
    /// constant set to zero
    pub fn from_factors(
        continuous_keys: KeyVector,
        discrete_keys: Vec<DiscreteKey>,
        factors: Vec<JacobianFactor>,
    ) -> HybridResult<Self> {
        let components = factors
            .into_iter()
            .map(|factor| FactorAndConstant::new(factor, 0.0))
            .collect();
        Self::from_components(continuous_keys, discrete_keys, components)
    }

    pub fn components(&self) -> &DecisionTree<FactorAndConstant> {
        &self.components
    }

    /// Component selected by a discrete assignment
    pub fn component_at(&self, assignment: &DiscreteValues) -> HybridResult<&FactorAndConstant> {
        self.components.get(assignment)
    }

    /// Linear factor selected by a discrete assignment
    pub fn factor_at(&self, assignment: &DiscreteValues) -> HybridResult<&Arc<JacobianFactor>> {
        Ok(&self.component_at(assignment)?.factor)
    }

    /// Error of every component at the same continuous values
    pub fn error_tree(&self, values: &VectorValues) -> HybridResult<DecisionTree<f64>> {
        self.components.try_map(|component| component.error(values))
    }

    /// The components as single-factor subproblems
    pub fn as_graph_tree(&self) -> GaussianFactorGraphTree {
        self.components
            .map(|component| GraphAndConstant::from_factor(component.factor.clone(), component.constant))
    }

    /// Combine `sum` with this mixture: every subproblem of the result holds
    /// the factors of `sum` followed by the component at the same assignment.
    pub fn add(&self, sum: &GaussianFactorGraphTree) -> HybridResult<GaussianFactorGraphTree> {
        let result = add_graph_trees(sum, &self.as_graph_tree())?;
        debug!(
            "Added Gaussian mixture to graph tree: {} -> {} nodes",
            sum.num_nodes(),
            result.num_nodes()
        );
        Ok(result)
    }
}

impl HybridFactor for GaussianMixtureFactor {
    fn factor_keys(&self) -> &FactorKeys {
        &self.keys
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn equals(&self, other: &dyn HybridFactor, tol: f64) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|other| self.approx_eq(other, tol))
    }

    fn error(&self, values: &HybridValues) -> HybridResult<f64> {
        self.component_at(values.discrete())?
            .error(values.continuous())
    }
}

impl ApproxEq for GaussianMixtureFactor {
    fn approx_eq(&self, other: &Self, tol: f64) -> bool {
        self.keys == other.keys && self.components.approx_eq(&other.components, tol)
    }
}

impl KeyFormat for GaussianMixtureFactor {
    fn fmt_keys(&self, f: &mut fmt::Formatter<'_>, formatter: &KeyFormatter) -> fmt::Result {
        self.fmt_factor(f, formatter)?;
        writeln!(f)?;
        write!(f, "{}", self.components.display(formatter))
    }
}

impl fmt::Display for GaussianMixtureFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_keys(f, &default_key_formatter)
    }
}
