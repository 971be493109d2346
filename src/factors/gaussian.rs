//! Continuous-only hybrid factor.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::{FactorKeys, HybridFactor};
use crate::core::key::{KeyFormatter, default_key_formatter};
use crate::core::values::HybridValues;
use crate::core::{ApproxEq, KeyFormat};
use crate::error::HybridResult;
use crate::linalg::JacobianFactor;

/// Linear Gaussian factor seen as a hybrid factor with no discrete keys.
#[derive(Debug, Clone, PartialEq)]
pub struct HybridGaussianFactor {
    keys: FactorKeys,
    inner: Arc<JacobianFactor>,
}

impl HybridGaussianFactor {
    pub fn new(factor: impl Into<Arc<JacobianFactor>>) -> HybridResult<Self> {
        let inner = factor.into();
        let keys = FactorKeys::continuous(inner.keys().to_vec())?;
        Ok(Self { keys, inner })
    }

    /// The wrapped linear factor, shared
    pub fn inner(&self) -> &Arc<JacobianFactor> {
        &self.inner
    }
}

impl HybridFactor for HybridGaussianFactor {
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
        self.inner.error(values.continuous())
    }
}

impl ApproxEq for HybridGaussianFactor {
    fn approx_eq(&self, other: &Self, tol: f64) -> bool {
        self.keys == other.keys
            && (Arc::ptr_eq(&self.inner, &other.inner) || self.inner.approx_eq(&other.inner, tol))
    }
}

impl KeyFormat for HybridGaussianFactor {
    fn fmt_keys(&self, f: &mut fmt::Formatter<'_>, formatter: &KeyFormatter) -> fmt::Result {
        self.fmt_factor(f, formatter)?;
        writeln!(f)?;
        write!(f, "{}", self.inner.display(formatter))
    }
}

impl fmt::Display for HybridGaussianFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_keys(f, &default_key_formatter)
    }
}
