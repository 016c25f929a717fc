//! Error types for tree algebra.

use structnet_core::CoreError;
use thiserror::Error;

use crate::tree::TreeKind;

/// Errors raised when two trees, tensors or operators do not fit together.
///
/// All of these are caller bugs: the operation that detects the mismatch
/// returns immediately and nothing is retried.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TreeError {
    /// Tensor shapes cannot be combined.
    #[error("Shape mismatch in {op}: {left:?} vs {right:?}")]
    ShapeMismatch {
        op: &'static str,
        left: (usize, usize),
        right: (usize, usize),
    },

    /// Two tree layers have different numbers of columns.
    #[error("Width mismatch: expected {expected}, got {got}")]
    WidthMismatch { expected: usize, got: usize },

    /// A Sum layer met a Prod layer where equal kinds are required.
    #[error("Kind mismatch: expected {expected:?}, got {got:?}")]
    KindMismatch { expected: TreeKind, got: TreeKind },

    /// Operators of different structure were combined.
    #[error("Operator mismatch: {reason}")]
    OperatorMismatch { reason: String },

    /// A row mask or row count does not fit the tree.
    #[error("Row mismatch: expected {expected} rows, got {got}")]
    RowMismatch { expected: usize, got: usize },

    /// Raw data does not describe a valid tensor or tree.
    #[error("Invalid data: {reason}")]
    InvalidData { reason: String },

    /// A type descriptor could not be used.
    #[error(transparent)]
    Type(#[from] CoreError),
}
