//! Core building blocks shared by every hybrid component:
//! - Keys, symbols and key-set merging
//! - Continuous, discrete and joint value containers
//! - The hybrid Gaussian factor graph
//! - Tolerance-aware equality and key-formatted printing

use std::fmt;

pub mod graph;
pub mod key;
pub mod values;

use key::KeyFormatter;

/// Tolerance used when a caller does not supply one
pub const DEFAULT_TOLERANCE: f64 = 1e-9;

/// Tolerance-bounded equality.
///
/// Implementations must be reflexive at zero tolerance and monotonic in `tol`:
/// a looser tolerance never turns `true` into `false`.
pub trait ApproxEq {
    fn approx_eq(&self, other: &Self, tol: f64) -> bool;
}

impl ApproxEq for f64 {
    fn approx_eq(&self, other: &Self, tol: f64) -> bool {
        self == other || (self - other).abs() <= tol
    }
}

impl ApproxEq for nalgebra::DMatrix<f64> {
    fn approx_eq(&self, other: &Self, tol: f64) -> bool {
        self.shape() == other.shape() && self.iter().zip(other.iter()).all(|(a, b)| a.approx_eq(b, tol))
    }
}

impl ApproxEq for nalgebra::DVector<f64> {
    fn approx_eq(&self, other: &Self, tol: f64) -> bool {
        self.len() == other.len() && self.iter().zip(other.iter()).all(|(a, b)| a.approx_eq(b, tol))
    }
}

/// Printing through a caller-supplied key formatter.
pub trait KeyFormat {
    fn fmt_keys(&self, f: &mut fmt::Formatter<'_>, formatter: &KeyFormatter) -> fmt::Result;

    /// Wraps `self` so it can be used with `{}` and the given formatter
    fn display<'a>(&'a self, formatter: &'a KeyFormatter) -> Formatted<'a, Self> {
        Formatted {
            value: self,
            formatter,
        }
    }
}

impl KeyFormat for f64 {
    fn fmt_keys(&self, f: &mut fmt::Formatter<'_>, _formatter: &KeyFormatter) -> fmt::Result {
        write!(f, "{self}")
    }
}

/// `Display` adapter returned by [`KeyFormat::display`]
pub struct Formatted<'a, T: ?Sized> {
    value: &'a T,
    formatter: &'a KeyFormatter,
}

impl<T: KeyFormat + ?Sized> fmt::Display for Formatted<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt_keys(f, self.formatter)
    }
}
