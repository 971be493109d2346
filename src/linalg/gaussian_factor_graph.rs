use std::fmt;
use std::hash::Hasher;
use std::sync::Arc;

use super::JacobianFactor;
use crate::core::key::{KeyFormatter, KeyVector, collect_keys};
use crate::core::values::VectorValues;
use crate::core::{ApproxEq, KeyFormat};
use crate::decision_tree::LeafHash;
use crate::error::HybridResult;

/// Ordered collection of linear Gaussian factors.
///
/// Factors are held behind `Arc` so that graphs produced by concatenation share
/// the underlying factor storage. Equality accepts either the same shared factor
/// or an equal factor value at every position.
#[derive(Debug, Clone, Default)]
pub struct GaussianFactorGraph {
    factors: Vec<Arc<JacobianFactor>>,
}

impl GaussianFactorGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, factor: impl Into<Arc<JacobianFactor>>) {
        self.factors.push(factor.into());
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<JacobianFactor>> {
        self.factors.iter()
    }

    pub fn factors(&self) -> &[Arc<JacobianFactor>] {
        &self.factors
    }

    /// All keys touched by the graph, in first-occurrence order
    pub fn keys(&self) -> KeyVector {
        self.factors
            .iter()
            .fold(KeyVector::new(), |acc, factor| collect_keys(&acc, factor.keys()))
    }

    /// Append all factors of `other`, sharing them
    pub fn extend_from(&mut self, other: &GaussianFactorGraph) {
        self.factors.extend(other.factors.iter().cloned());
    }

    /// New graph holding the factors of `self` followed by those of `other`
    pub fn concat(&self, other: &GaussianFactorGraph) -> GaussianFactorGraph {
        let mut result = self.clone();
        result.extend_from(other);
        result
    }

    /// Sum of the factor errors
    pub fn error(&self, values: &VectorValues) -> HybridResult<f64> {
        self.factors
            .iter()
            .map(|factor| factor.error(values))
            .sum()
    }
}

impl From<Vec<JacobianFactor>> for GaussianFactorGraph {
    fn from(factors: Vec<JacobianFactor>) -> Self {
        Self {
            factors: factors.into_iter().map(Arc::new).collect(),
        }
    }
}

impl FromIterator<Arc<JacobianFactor>> for GaussianFactorGraph {
    fn from_iter<I: IntoIterator<Item = Arc<JacobianFactor>>>(iter: I) -> Self {
        Self {
            factors: iter.into_iter().collect(),
        }
    }
}

impl PartialEq for GaussianFactorGraph {
    fn eq(&self, other: &Self) -> bool {
        self.factors.len() == other.factors.len()
            && self
                .factors
                .iter()
                .zip(&other.factors)
                .all(|(a, b)| Arc::ptr_eq(a, b) || a == b)
    }
}

impl ApproxEq for GaussianFactorGraph {
    fn approx_eq(&self, other: &Self, tol: f64) -> bool {
        self.factors.len() == other.factors.len()
            && self
                .factors
                .iter()
                .zip(&other.factors)
                .all(|(a, b)| Arc::ptr_eq(a, b) || a.approx_eq(b, tol))
    }
}

/// Hashes factor contents, so shared and copied factors land in one bucket
impl LeafHash for GaussianFactorGraph {
    fn leaf_hash<H: Hasher>(&self, state: &mut H) {
        self.factors.as_slice().leaf_hash(state);
    }
}

impl KeyFormat for GaussianFactorGraph {
    fn fmt_keys(&self, f: &mut fmt::Formatter<'_>, formatter: &KeyFormatter) -> fmt::Result {
        writeln!(f, "GaussianFactorGraph: {} factors", self.factors.len())?;
        for (i, factor) in self.factors.iter().enumerate() {
            writeln!(f, "Factor {i}: {}", factor.display(formatter))?;
        }
        Ok(())
    }
}
