//! Variable keys, symbols and key-set utilities.
//!
//! Continuous variables are identified by a plain [`Key`]. Discrete variables carry
//! a cardinality alongside their key in a [`DiscreteKey`]. Keys are often built from
//! a [`Symbol`], which packs a character tag and an index into a single `u64`, so
//! that `x3` and `m1` print readably.
//!
//! The merge utilities preserve first-occurrence order and never sort by value:
//! the order of a discrete key set decides the branching order of decision trees.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::{HybridError, HybridResult};

/// Opaque variable identifier
pub type Key = u64;

/// Ordered continuous keys
pub type KeyVector = Vec<Key>;

/// Ordered discrete keys
pub type DiscreteKeys = Vec<DiscreteKey>;

/// Maps a key to a human readable name, used only for printing
pub type KeyFormatter = dyn Fn(Key) -> String;

const CHR_BITS: u32 = 8;
const INDEX_BITS: u32 = u64::BITS - CHR_BITS;
const INDEX_MASK: u64 = (1 << INDEX_BITS) - 1;

/// Character-tagged key, packed as `(chr << 56) | index`.
///
/// The tag must be an ASCII character so it fits the 8-bit tag field, and the
/// index is limited to the low 56 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol {
    pub chr: u8,
    pub index: u64,
}

impl Symbol {
    /// # Panics
    ///
    /// When `chr` is not ASCII; [`Symbol::try_new`] reports this instead.
    pub fn new(chr: char, index: u64) -> Self {
        match Self::try_new(chr, index) {
            Some(symbol) => symbol,
            None => panic!("symbol tag {chr:?} is not an ASCII character"),
        }
    }

    /// Symbol for an ASCII `chr`, `None` for any other character
    pub fn try_new(chr: char, index: u64) -> Option<Self> {
        let chr = u8::try_from(chr).ok().filter(u8::is_ascii)?;
        Some(Self {
            chr,
            index: index & INDEX_MASK,
        })
    }

    pub fn key(&self) -> Key {
        ((self.chr as u64) << INDEX_BITS) | self.index
    }

    pub fn from_key(key: Key) -> Self {
        Self {
            chr: (key >> INDEX_BITS) as u8,
            index: key & INDEX_MASK,
        }
    }
}

impl From<Symbol> for Key {
    fn from(symbol: Symbol) -> Self {
        symbol.key()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.chr as char, self.index)
    }
}

/// Shorthand for `Symbol::new(chr, index).key()`
pub fn symbol(chr: char, index: u64) -> Key {
    Symbol::new(chr, index).key()
}

/// Formats a key as its decimal value
pub fn default_key_formatter(key: Key) -> String {
    key.to_string()
}

/// Formats keys tagged with a printable ASCII character as symbols (`x3`),
/// falling back to the decimal value otherwise.
pub fn symbol_key_formatter(key: Key) -> String {
    let symbol = Symbol::from_key(key);
    if symbol.chr.is_ascii_graphic() {
        symbol.to_string()
    } else {
        key.to_string()
    }
}

/// Discrete variable: key plus number of states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DiscreteKey {
    pub key: Key,
    pub cardinality: usize,
}

impl DiscreteKey {
    pub fn new(key: impl Into<Key>, cardinality: usize) -> Self {
        Self {
            key: key.into(),
            cardinality,
        }
    }
}

impl From<(Key, usize)> for DiscreteKey {
    fn from((key, cardinality): (Key, usize)) -> Self {
        Self { key, cardinality }
    }
}

/// Ordered union of two continuous key sequences without duplicates.
///
/// Keys keep their first-occurrence order, scanning `keys1` before `keys2`.
pub fn collect_keys(keys1: &[Key], keys2: &[Key]) -> KeyVector {
    let mut seen = HashSet::with_capacity(keys1.len() + keys2.len());
    keys1
        .iter()
        .chain(keys2)
        .copied()
        .filter(|key| seen.insert(*key))
        .collect()
}

/// Continuous keys followed by the identifiers of the discrete keys, deduplicated.
pub fn collect_keys_with_discrete(continuous_keys: &[Key], discrete_keys: &[DiscreteKey]) -> KeyVector {
    let discrete_ids: KeyVector = discrete_keys.iter().map(|dk| dk.key).collect();
    collect_keys(continuous_keys, &discrete_ids)
}

/// Ordered union of two discrete key sets, deduplicated by identifier.
///
/// A key that appears in both inputs must have the same cardinality in each,
/// otherwise [`HybridError::CardinalityMismatch`] is returned.
pub fn collect_discrete_keys(keys1: &[DiscreteKey], keys2: &[DiscreteKey]) -> HybridResult<DiscreteKeys> {
    let mut merged: DiscreteKeys = Vec::with_capacity(keys1.len() + keys2.len());
    for dk in keys1.iter().chain(keys2) {
        match merged.iter().find(|existing| existing.key == dk.key) {
            Some(existing) if existing.cardinality != dk.cardinality => {
                return Err(HybridError::CardinalityMismatch {
                    key: dk.key,
                    expected: existing.cardinality,
                    actual: dk.cardinality,
                });
            }
            Some(_) => {}
            None => merged.push(*dk),
        }
    }
    Ok(merged)
}

/// Rejects zero cardinalities and repeated identifiers within one key set.
pub fn validate_discrete_keys(keys: &[DiscreteKey]) -> HybridResult<()> {
    for (i, dk) in keys.iter().enumerate() {
        if dk.cardinality == 0 {
            return Err(HybridError::InvalidCardinality(dk.key));
        }
        if keys[..i].iter().any(|other| other.key == dk.key) {
            return Err(HybridError::DuplicateDiscreteKey(dk.key));
        }
    }
    Ok(())
}
