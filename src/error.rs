//! Error types for the apex-hybrid library
//!
//! This module provides the main error and result types used throughout the library.
//! All errors use the `thiserror` crate for automatic trait implementations.
//!
//! Errors at this layer are either precondition violations detected at construction
//! time (key merging, tree building) or lookup failures propagated unchanged from the
//! value containers. Nothing here attempts recovery.

use crate::core::key::Key;
use thiserror::Error;

/// Main result type used throughout the apex-hybrid library
pub type HybridResult<T> = Result<T, HybridError>;

/// Main error type for the apex-hybrid library
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HybridError {
    /// Both the continuous and the discrete key set were empty
    #[error("Hybrid factor requires at least one continuous or discrete key")]
    EmptyKeys,

    /// The same discrete key was given with two different cardinalities
    #[error("Discrete key {key} has cardinality {expected}, got {actual}")]
    CardinalityMismatch {
        key: Key,
        expected: usize,
        actual: usize,
    },

    /// A discrete key listed twice in one key set
    #[error("Discrete key {0} appears more than once")]
    DuplicateDiscreteKey(Key),

    /// A discrete key with no states
    #[error("Discrete key {0} must have a cardinality of at least 1")]
    InvalidCardinality(Key),

    /// A continuous value lookup failed
    #[error("No continuous value for key {0}")]
    MissingContinuousKey(Key),

    /// A discrete assignment lookup failed
    #[error("No discrete value for key {0}")]
    MissingDiscreteKey(Key),

    /// A discrete assignment outside the key's range
    #[error("Discrete value {value} out of range for key {key} with cardinality {cardinality}")]
    InvalidAssignment {
        key: Key,
        value: usize,
        cardinality: usize,
    },

    /// Explicit enumeration does not match the product of cardinalities
    #[error("Decision tree expects {expected} leaves, got {actual}")]
    MalformedTree { expected: usize, actual: usize },

    /// Matrix or vector sizes do not agree
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Discrete potentials must be finite and non-negative
    #[error("Invalid potential {0}: must be finite and non-negative")]
    InvalidPotential(f64),

    /// A mixture component or branch uses a key the mixture does not declare
    #[error("Key {0} is not declared by the mixture factor")]
    UndeclaredKey(Key),

    /// A serialized factor record whose flags contradict its key sets
    #[error("Invalid factor record: {0}")]
    InvalidRecord(String),
}
