//! In-process evaluator.
//!
//! Mirrors SQLite REAL arithmetic so a backfilled value equals the value the
//! installed rule would compute for the same inputs: division by zero and NaN
//! results are NULL (`None`), infinities pass through.

use super::{BinaryOp, Expr};
use crate::model::AttributeId;

impl Expr {
    /// Evaluates the expression; `lookup` supplies dependency values.
    ///
    /// Returns `None` when a referenced value is missing or the arithmetic
    /// result is NULL under store semantics.
    pub fn evaluate<F>(&self, lookup: &F) -> Option<f64>
    where
        F: Fn(AttributeId) -> Option<f64>,
    {
        match self {
            Self::Constant(value) => Some(*value),
            Self::Reference(id) => lookup(*id),
            Self::Negate(inner) => inner.evaluate(lookup).map(|value| -value),
            Self::Binary { op, left, right } => {
                let left = left.evaluate(lookup)?;
                let right = right.evaluate(lookup)?;
                let result = match op {
                    BinaryOp::Add => left + right,
                    BinaryOp::Subtract => left - right,
                    BinaryOp::Multiply => left * right,
                    BinaryOp::Divide => {
                        if right == 0.0 {
                            return None;
                        }
                        left / right
                    }
                };
                if result.is_nan() {
                    None
                } else {
                    Some(result)
                }
            }
        }
    }
}
