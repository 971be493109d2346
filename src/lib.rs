//! Hybrid discrete-continuous factor graph building blocks.
//!
//! - [`core`](crate::core): keys, value containers, tolerance-aware equality and the hybrid
//!   Gaussian factor graph
//! - [`decision_tree`]: arena-backed decision trees over discrete assignments
//! - [`factors`]: the hybrid factor abstraction, concrete factors and the tree
//!   of per-assignment Gaussian subproblems
//! - [`linalg`]: linear Gaussian factors and factor graphs

pub mod core;
pub mod decision_tree;
pub mod error;
pub mod factors;
pub mod linalg;
pub mod logger;

pub use crate::core::graph::{HybridGaussianFactorGraph, HybridGraphFactor};
pub use crate::core::key::{DiscreteKey, Key, symbol};
pub use crate::core::values::{DiscreteValues, HybridValues, VectorValues};
pub use crate::core::{ApproxEq, DEFAULT_TOLERANCE, KeyFormat};
pub use crate::decision_tree::{DecisionTree, LeafHash};
pub use error::{HybridError, HybridResult};
pub use factors::{GaussianFactorGraphTree, GraphAndConstant, HybridFactor};
pub use logger::{init_logger, init_logger_with_level, try_init_logger};
