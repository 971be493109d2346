use nalgebra::{DMatrix, DVector};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::core::key::{Key, KeyFormatter, KeyVector};
use crate::core::values::VectorValues;
use crate::core::{ApproxEq, KeyFormat};
use crate::decision_tree::LeafHash;
use crate::error::{HybridError, HybridResult};

/// Whitened linear Gaussian factor.
///
/// Represents the quadratic error
///
/// ```text
/// E(x) = ½ ‖ Σᵢ Aᵢ xᵢ − b ‖²
/// ```
///
/// where every `Aᵢ` block has as many rows as `b` and as many columns as the
/// dimension of variable `xᵢ`. Noise models are expected to be folded into the
/// blocks and the right-hand side before construction.
///
/// # Example
///
/// ```
/// use apex_hybrid::linalg::JacobianFactor;
/// use apex_hybrid::core::values::VectorValues;
/// use nalgebra::{DMatrix, dvector};
///
/// # fn example() -> Result<(), apex_hybrid::HybridError> {
/// // Prior x0 ≈ 1.0
/// let prior = JacobianFactor::unary(0, DMatrix::identity(1, 1), dvector![1.0])?;
/// let values = VectorValues::new().with(0, dvector![3.0]);
/// assert_eq!(prior.error(&values)?, 2.0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct JacobianFactor {
    keys: KeyVector,
    blocks: Vec<DMatrix<f64>>,
    rhs: DVector<f64>,
}

impl JacobianFactor {
    /// Create a factor from `(key, Aᵢ)` terms and the right-hand side `b`.
    ///
    /// # Errors
    ///
    /// [`HybridError::DimensionMismatch`] when a block's row count differs from
    /// `b.len()` or a key is repeated.
    pub fn new(terms: Vec<(Key, DMatrix<f64>)>, rhs: DVector<f64>) -> HybridResult<Self> {
        let mut keys = Vec::with_capacity(terms.len());
        let mut blocks = Vec::with_capacity(terms.len());
        for (key, block) in terms {
            if block.nrows() != rhs.len() {
                return Err(HybridError::DimensionMismatch(format!(
                    "block for key {} has {} rows, right-hand side has {}",
                    key,
                    block.nrows(),
                    rhs.len()
                )));
            }
            if keys.contains(&key) {
                return Err(HybridError::DimensionMismatch(format!(
                    "key {key} appears twice in one factor"
                )));
            }
            keys.push(key);
            blocks.push(block);
        }
        Ok(Self { keys, blocks, rhs })
    }

    pub fn unary(key: Key, a: DMatrix<f64>, b: DVector<f64>) -> HybridResult<Self> {
        Self::new(vec![(key, a)], b)
    }

    pub fn binary(
        key1: Key,
        a1: DMatrix<f64>,
        key2: Key,
        a2: DMatrix<f64>,
        b: DVector<f64>,
    ) -> HybridResult<Self> {
        Self::new(vec![(key1, a1), (key2, a2)], b)
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn blocks(&self) -> &[DMatrix<f64>] {
        &self.blocks
    }

    pub fn rhs(&self) -> &DVector<f64> {
        &self.rhs
    }

    /// Number of residual rows
    pub fn rows(&self) -> usize {
        self.rhs.len()
    }

    /// Residual `Σᵢ Aᵢ xᵢ − b`
    pub fn unweighted_error(&self, values: &VectorValues) -> HybridResult<DVector<f64>> {
        let mut residual = -self.rhs.clone();
        for (key, block) in self.keys.iter().zip(&self.blocks) {
            let x = values.at(*key)?;
            if x.len() != block.ncols() {
                return Err(HybridError::DimensionMismatch(format!(
                    "value for key {} has dimension {}, block expects {}",
                    key,
                    x.len(),
                    block.ncols()
                )));
            }
            residual += block * x;
        }
        Ok(residual)
    }

    /// Quadratic error `½ ‖Σᵢ Aᵢ xᵢ − b‖²`
    pub fn error(&self, values: &VectorValues) -> HybridResult<f64> {
        Ok(0.5 * self.unweighted_error(values)?.norm_squared())
    }
}

impl ApproxEq for JacobianFactor {
    fn approx_eq(&self, other: &Self, tol: f64) -> bool {
        self.keys == other.keys
            && self.rhs.approx_eq(&other.rhs, tol)
            && self
                .blocks
                .iter()
                .zip(&other.blocks)
                .all(|(a, b)| a.approx_eq(b, tol))
    }
}

impl LeafHash for JacobianFactor {
    fn leaf_hash<H: Hasher>(&self, state: &mut H) {
        self.keys.hash(state);
        for block in &self.blocks {
            block.shape().hash(state);
            block.as_slice().leaf_hash(state);
        }
        self.rhs.as_slice().leaf_hash(state);
    }
}

impl KeyFormat for JacobianFactor {
    fn fmt_keys(&self, f: &mut fmt::Formatter<'_>, formatter: &KeyFormatter) -> fmt::Result {
        let names: Vec<String> = self.keys.iter().map(|k| formatter(*k)).collect();
        writeln!(f, "JacobianFactor on [{}]", names.join(", "))?;
        for (name, block) in names.iter().zip(&self.blocks) {
            write!(f, "  A[{name}] = {block}")?;
        }
        write!(f, "  b = {}", self.rhs.transpose())
    }
}
