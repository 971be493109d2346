//! Discrete-only hybrid factor holding a table of potentials.

use std::any::Any;
use std::fmt;

use super::{FactorKeys, HybridFactor};
use crate::core::key::{DiscreteKey, KeyFormatter, default_key_formatter};
use crate::core::values::{DiscreteValues, HybridValues};
use crate::core::{ApproxEq, KeyFormat};
use crate::decision_tree::DecisionTree;
use crate::error::{HybridError, HybridResult};

/// Non-negative potentials over an assignment of discrete keys.
///
/// The error of the factor at an assignment is `-ln(potential)`, so a zero
/// potential yields an infinite error.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionTreeFactor {
    keys: FactorKeys,
    potentials: DecisionTree<f64>,
}

impl DecisionTreeFactor {
    /// Build from one potential per assignment, enumerated lexicographically
    /// with the first key most significant.
    ///
    /// # Errors
    ///
    /// - [`HybridError::InvalidPotential`] for a negative, infinite or NaN entry
    /// - [`HybridError::MalformedTree`] when the count does not match the keys
    /// - [`HybridError::EmptyKeys`] when `keys` is empty
    pub fn new(keys: Vec<DiscreteKey>, potentials: Vec<f64>) -> HybridResult<Self> {
        if let Some(&bad) = potentials.iter().find(|p| !p.is_finite() || **p < 0.0) {
            return Err(HybridError::InvalidPotential(bad));
        }
        let tree = DecisionTree::from_enumeration(&keys, potentials)?;
        Ok(Self {
            keys: FactorKeys::discrete(keys)?,
            potentials: tree,
        })
    }

    pub fn potentials(&self) -> &DecisionTree<f64> {
        &self.potentials
    }

    /// Potential at a discrete assignment
    pub fn value(&self, assignment: &DiscreteValues) -> HybridResult<f64> {
        self.potentials.get(assignment).copied()
    }
}

impl HybridFactor for DecisionTreeFactor {
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
        Ok(-self.value(values.discrete())?.ln())
    }
}

impl ApproxEq for DecisionTreeFactor {
    fn approx_eq(&self, other: &Self, tol: f64) -> bool {
        self.keys == other.keys && self.potentials.approx_eq(&other.potentials, tol)
    }
}

impl KeyFormat for DecisionTreeFactor {
    fn fmt_keys(&self, f: &mut fmt::Formatter<'_>, formatter: &KeyFormatter) -> fmt::Result {
        self.fmt_factor(f, formatter)?;
        writeln!(f)?;
        write!(f, "{}", self.potentials.display(formatter))
    }
}

impl fmt::Display for DecisionTreeFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_keys(f, &default_key_formatter)
    }
}
