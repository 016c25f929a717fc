//! # Error Types
//!
//! Type errors are construction-time failures: a descriptor was used where
//! a concrete, sized layout is required, or it names an ADT that nobody
//! defined. They are never recovered from at runtime.

use thiserror::Error;

use crate::spec::TypeSpec;

/// Errors raised while inspecting or resolving type descriptors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    /// The descriptor has no size until it is unwrapped or instantiated.
    #[error("Type {spec} has no size (unwrap or instantiate it first)")]
    Unsized { spec: TypeSpec },

    /// A named ADT is missing from the defined-types table.
    #[error("Unknown type: {name}")]
    UnknownType { name: String },

    /// The descriptor cannot be used for the requested operation.
    #[error("Unsupported type {spec}: {reason}")]
    Unsupported { spec: TypeSpec, reason: String },

    /// Instantiation left a type variable without a binding.
    #[error("Type variable {name} is not bound")]
    UnboundVariable { name: String },
}
