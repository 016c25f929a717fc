//! Error types for network execution.

use structnet_core::CoreError;
use structnet_tree::TreeError;
use thiserror::Error;

use crate::data::DataPointer;

/// Errors raised while wiring or running networks.
///
/// A failed match and an exhausted recursion bound are not errors; they are
/// handled by guarded dispatch and the depth handler.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RuntimeError {
    /// Two bags with different batch sizes were joined, or a bag's tree
    /// disagrees with its declared size.
    #[error("Batch size mismatch: expected {expected} rows, got {got}")]
    SizeMismatch { expected: usize, got: usize },

    /// A scope boundary points past the end of a bag.
    #[error("Pointer {pointer:?} out of range for a bag with {slots} slots and {nets} nets")]
    PointerOutOfRange {
        pointer: DataPointer,
        slots: usize,
        nets: usize,
    },

    /// A data or net slot index past the end of a bag.
    #[error("Slot {index} out of range (length {len})")]
    SlotOutOfRange { index: usize, len: usize },

    /// The data slot exists but carries no tree.
    #[error("Slot {index} is absent")]
    AbsentSlot { index: usize },

    /// The bag's data is neither empty nor a tuple of slots.
    #[error("Bag data is not a tuple")]
    NotATuple,

    /// The callee of an application did not evaluate to a network.
    #[error("Operand 0 of an application is not a network")]
    NotCallable,

    /// A network showed up where a tree was required.
    #[error("Expected a tree, found network {name}")]
    ExpectedData { name: &'static str },

    /// A tree showed up where a network was required.
    #[error("Operand {index} must be a network")]
    ExpectedNet { index: usize },

    /// A pattern refers to a column the tree does not have.
    #[error("Pattern position {position} out of range for width {width}")]
    PatternPosition { position: usize, width: usize },

    /// A pattern does not fit the layout of the tree it is matched against.
    #[error("Pattern shape: {reason}")]
    PatternShape { reason: String },

    /// A tail call came back where a value was required.
    #[error("Tail call outside of tail position")]
    UnexpectedTailCall,

    /// A guarded case ran on a subset of rows and asked for a tail call,
    /// which would lose the other rows.
    #[error("Tail call from a row-restricted guarded case")]
    PartialTailCall,

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Type(#[from] CoreError),
}
