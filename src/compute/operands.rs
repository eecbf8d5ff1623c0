//! Operand pairs for the element-wise difference kernel

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Two numeric sequences supplied as compute input
///
/// The pair is kept exactly as supplied; length agreement is checked by
/// `check()` at the start of every compute invocation so that a bad pair
/// fails the one task that received it and nothing else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operands {
    pub a: Vec<f64>,
    pub b: Vec<f64>,
}

impl Operands {
    pub fn new(a: Vec<f64>, b: Vec<f64>) -> Self {
        Self { a, b }
    }

    /// Verify both sides have the same, non-zero length
    ///
    /// Returns the common length.
    pub fn check(&self) -> Result<usize> {
        if self.a.len() != self.b.len() {
            return Err(Error::SizeMismatch {
                left: self.a.len(),
                right: self.b.len(),
            });
        }
        if self.a.is_empty() {
            return Err(Error::EmptyOperands);
        }
        Ok(self.a.len())
    }
}

/// Reject a result that JSON cannot carry
///
/// `serde_json` writes infinities and NaN as `null`, which a peer can no
/// longer decode as a number.
pub fn ensure_finite(values: Vec<f64>) -> Result<Vec<f64>> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(Error::NonFiniteResult {
            index,
            value: values[index],
        }),
        None => Ok(values),
    }
}
