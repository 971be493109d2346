//! Linear Gaussian building blocks.
//!
//! This module provides the continuous side of a hybrid model:
//! - [`JacobianFactor`]: a whitened linear constraint `½‖Σ Aᵢxᵢ − b‖²` on dense
//!   nalgebra blocks
//! - [`GaussianFactorGraph`]: an ordered, shareable list of such factors that
//!   supports concatenation, error evaluation, equality and printing

pub mod gaussian_factor_graph;
pub mod jacobian_factor;

pub use gaussian_factor_graph::GaussianFactorGraph;
pub use jacobian_factor::JacobianFactor;
