//! Hybrid factors
//!
//! A hybrid factor is a term of a factor graph that depends on continuous
//! variables, discrete variables, or both. This module provides:
//!
//! - [`FactorKeys`]: the closed classification of a factor's variables. Each
//!   variant carries only the key sets relevant to it, so a factor is always
//!   exactly one of continuous-only, discrete-only or hybrid.
//! - [`HybridFactor`]: the common interface (key accessors, `error`, equality,
//!   printing) implemented by every concrete factor.
//! - [`HybridFactorRecord`]: the stable serializable field list
//!   `{flags, discrete keys, continuous keys}`.
//! - Concrete factors: [`HybridGaussianFactor`] (continuous-only),
//!   [`DecisionTreeFactor`] (discrete-only) and [`GaussianMixtureFactor`] (hybrid).
//! - [`GraphAndConstant`] and [`GaussianFactorGraphTree`]: the per-assignment
//!   continuous subproblems that downstream elimination consumes.
//!
//! # Module Structure
//!
//! - `graph_and_constant`: annotated linear subproblem and its decision tree
//! - `gaussian`: continuous-only wrapper around a Jacobian factor
//! - `discrete`: discrete-only table of potentials
//! - `mixture`: Gaussian mixture indexed by discrete assignment

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;

use crate::core::key::{DiscreteKey, DiscreteKeys, Key, KeyFormatter, KeyVector, collect_keys_with_discrete};
use crate::core::values::HybridValues;
use crate::error::{HybridError, HybridResult};

pub mod discrete;
pub mod gaussian;
pub mod graph_and_constant;
pub mod mixture;

pub use discrete::DecisionTreeFactor;
pub use gaussian::HybridGaussianFactor;
pub use graph_and_constant::{GaussianFactorGraphTree, GraphAndConstant, add_graph_trees};
pub use mixture::{FactorAndConstant, GaussianMixtureFactor};

/// Which kinds of variables a factor touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FactorKind {
    Continuous,
    Discrete,
    Hybrid,
}

impl fmt::Display for FactorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FactorKind::Continuous => write!(f, "Continuous"),
            FactorKind::Discrete => write!(f, "Discrete"),
            FactorKind::Hybrid => write!(f, "Hybrid"),
        }
    }
}

/// Variables of a hybrid factor, classified by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactorKeys {
    /// Continuous variables only
    Continuous(KeyVector),
    /// Discrete variables only
    Discrete(DiscreteKeys),
    /// Both continuous and discrete variables
    Hybrid {
        continuous: KeyVector,
        discrete: DiscreteKeys,
    },
}

impl FactorKeys {
    /// Classify a pair of key sets.
    ///
    /// # Errors
    ///
    /// [`HybridError::EmptyKeys`] when both sets are empty.
    pub fn new(continuous: KeyVector, discrete: DiscreteKeys) -> HybridResult<Self> {
        match (continuous.is_empty(), discrete.is_empty()) {
            (true, true) => Err(HybridError::EmptyKeys),
            (false, true) => Ok(FactorKeys::Continuous(continuous)),
            (true, false) => Ok(FactorKeys::Discrete(discrete)),
            (false, false) => Ok(FactorKeys::Hybrid {
                continuous,
                discrete,
            }),
        }
    }

    pub fn continuous(keys: KeyVector) -> HybridResult<Self> {
        Self::new(keys, DiscreteKeys::new()).and_then(|keys| match keys {
            FactorKeys::Continuous(_) => Ok(keys),
            _ => Err(HybridError::EmptyKeys),
        })
    }

    pub fn discrete(keys: DiscreteKeys) -> HybridResult<Self> {
        Self::new(KeyVector::new(), keys).and_then(|keys| match keys {
            FactorKeys::Discrete(_) => Ok(keys),
            _ => Err(HybridError::EmptyKeys),
        })
    }

    pub fn hybrid(continuous: KeyVector, discrete: DiscreteKeys) -> HybridResult<Self> {
        if continuous.is_empty() || discrete.is_empty() {
            return Err(HybridError::EmptyKeys);
        }
        Ok(FactorKeys::Hybrid {
            continuous,
            discrete,
        })
    }

    pub fn kind(&self) -> FactorKind {
        match self {
            FactorKeys::Continuous(_) => FactorKind::Continuous,
            FactorKeys::Discrete(_) => FactorKind::Discrete,
            FactorKeys::Hybrid { .. } => FactorKind::Hybrid,
        }
    }

    pub fn continuous_keys(&self) -> &[Key] {
        match self {
            FactorKeys::Continuous(keys) => keys,
            FactorKeys::Discrete(_) => &[],
            FactorKeys::Hybrid { continuous, .. } => continuous,
        }
    }

    pub fn discrete_keys(&self) -> &[DiscreteKey] {
        match self {
            FactorKeys::Continuous(_) => &[],
            FactorKeys::Discrete(keys) => keys,
            FactorKeys::Hybrid { discrete, .. } => discrete,
        }
    }

    /// Continuous keys followed by discrete key identifiers
    pub fn all_keys(&self) -> KeyVector {
        collect_keys_with_discrete(self.continuous_keys(), self.discrete_keys())
    }
}

/// Common interface of every hybrid factor.
///
/// Implementors supply their keys and an `error` evaluation; classification and
/// key accessors are derived from [`FactorKeys`].
pub trait HybridFactor: fmt::Debug + Send + Sync {
    /// The classified keys of this factor
    fn factor_keys(&self) -> &FactorKeys;

    /// Contribution of this factor (negative log-likelihood up to a constant) at
    /// a joint assignment.
    ///
    /// # Errors
    ///
    /// Missing continuous or discrete values are propagated from the value
    /// containers, never replaced by defaults.
    fn error(&self, values: &HybridValues) -> HybridResult<f64>;

    /// The concrete factor, for type-aware comparison in [`equals`](Self::equals)
    fn as_any(&self) -> &dyn Any;

    fn kind(&self) -> FactorKind {
        self.factor_keys().kind()
    }

    /// True if this is a factor of discrete variables only
    fn is_discrete(&self) -> bool {
        self.kind() == FactorKind::Discrete
    }

    /// True if this is a factor of continuous variables only
    fn is_continuous(&self) -> bool {
        self.kind() == FactorKind::Continuous
    }

    /// True if this factor depends on both continuous and discrete variables
    fn is_hybrid(&self) -> bool {
        self.kind() == FactorKind::Hybrid
    }

    /// Number of continuous variables
    fn nr_continuous(&self) -> usize {
        self.continuous_keys().len()
    }

    fn continuous_keys(&self) -> &[Key] {
        self.factor_keys().continuous_keys()
    }

    fn discrete_keys(&self) -> &[DiscreteKey] {
        self.factor_keys().discrete_keys()
    }

    /// Continuous keys followed by discrete key identifiers
    fn keys(&self) -> KeyVector {
        self.factor_keys().all_keys()
    }

    /// Equality of kind and key sets. Concrete factors override this to also
    /// compare their own state within `tol`.
    fn equals(&self, other: &dyn HybridFactor, _tol: f64) -> bool {
        self.factor_keys() == other.factor_keys()
    }

    /// Print kind and keys through `formatter`
    fn fmt_factor(&self, f: &mut fmt::Formatter<'_>, formatter: &KeyFormatter) -> fmt::Result {
        write!(f, "{} factor", self.kind())?;
        if !self.continuous_keys().is_empty() {
            let names: Vec<String> = self.continuous_keys().iter().map(|k| formatter(*k)).collect();
            write!(f, " continuous [{}]", names.join(", "))?;
        }
        if !self.discrete_keys().is_empty() {
            let names: Vec<String> = self
                .discrete_keys()
                .iter()
                .map(|dk| format!("{}:{}", formatter(dk.key), dk.cardinality))
                .collect();
            write!(f, " discrete [{}]", names.join(", "))?;
        }
        Ok(())
    }
}

/// Serializable form of a factor's classification and keys.
///
/// Concrete factors serialize their own state next to this record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HybridFactorRecord {
    pub is_discrete: bool,
    pub is_continuous: bool,
    pub is_hybrid: bool,
    pub discrete_keys: DiscreteKeys,
    pub continuous_keys: KeyVector,
}

impl From<&FactorKeys> for HybridFactorRecord {
    fn from(keys: &FactorKeys) -> Self {
        let kind = keys.kind();
        Self {
            is_discrete: kind == FactorKind::Discrete,
            is_continuous: kind == FactorKind::Continuous,
            is_hybrid: kind == FactorKind::Hybrid,
            discrete_keys: keys.discrete_keys().to_vec(),
            continuous_keys: keys.continuous_keys().to_vec(),
        }
    }
}

impl TryFrom<HybridFactorRecord> for FactorKeys {
    type Error = HybridError;

    fn try_from(record: HybridFactorRecord) -> Result<Self, Self::Error> {
        let expected = (record.is_continuous, record.is_discrete, record.is_hybrid);
        let keys = FactorKeys::new(record.continuous_keys, record.discrete_keys)?;
        let kind = keys.kind();
        let derived = (
            kind == FactorKind::Continuous,
            kind == FactorKind::Discrete,
            kind == FactorKind::Hybrid,
        );
        if derived != expected {
            return Err(HybridError::InvalidRecord(format!(
                "flags (continuous, discrete, hybrid) = {expected:?} do not match keys of a {kind} factor"
            )));
        }
        Ok(keys)
    }
}
