//! Containers for continuous values, discrete assignments and their combination.
//!
//! Lookups never substitute defaults: a missing key is reported as
//! [`HybridError::MissingContinuousKey`] or [`HybridError::MissingDiscreteKey`] and
//! propagated by the callers.

use nalgebra::DVector;
use std::collections::{BTreeMap, HashMap};

use crate::core::key::Key;
use crate::error::{HybridError, HybridResult};

/// Assignment of discrete states to discrete keys
pub type DiscreteValues = BTreeMap<Key, usize>;

/// Continuous values, one vector per key
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorValues {
    values: HashMap<Key, DVector<f64>>,
}

impl VectorValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the value for `key`
    pub fn insert(&mut self, key: Key, value: DVector<f64>) -> Option<DVector<f64>> {
        self.values.insert(key, value)
    }

    /// Builder-style insert
    pub fn with(mut self, key: Key, value: DVector<f64>) -> Self {
        self.values.insert(key, value);
        self
    }

    pub fn at(&self, key: Key) -> HybridResult<&DVector<f64>> {
        self.values
            .get(&key)
            .ok_or(HybridError::MissingContinuousKey(key))
    }

    pub fn contains(&self, key: Key) -> bool {
        self.values.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.values.keys()
    }
}

impl FromIterator<(Key, DVector<f64>)> for VectorValues {
    fn from_iter<I: IntoIterator<Item = (Key, DVector<f64>)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Looks up the state of `key` in a discrete assignment
pub fn discrete_value(assignment: &DiscreteValues, key: Key) -> HybridResult<usize> {
    assignment
        .get(&key)
        .copied()
        .ok_or(HybridError::MissingDiscreteKey(key))
}

/// Joint assignment of continuous values and discrete states
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HybridValues {
    continuous: VectorValues,
    discrete: DiscreteValues,
}

impl HybridValues {
    pub fn new(continuous: VectorValues, discrete: DiscreteValues) -> Self {
        Self {
            continuous,
            discrete,
        }
    }

    pub fn continuous(&self) -> &VectorValues {
        &self.continuous
    }

    pub fn discrete(&self) -> &DiscreteValues {
        &self.discrete
    }

    pub fn at(&self, key: Key) -> HybridResult<&DVector<f64>> {
        self.continuous.at(key)
    }

    pub fn at_discrete(&self, key: Key) -> HybridResult<usize> {
        discrete_value(&self.discrete, key)
    }
}
