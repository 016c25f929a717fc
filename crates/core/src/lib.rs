//! # Core - Type Descriptors for Structured Networks
//!
//! This crate describes the algebraic data types a structured network
//! operates over:
//!
//! - **Specs**: `Sum`, `Product`, `Literal`, `Variable`, `Recursive` and
//!   `Named` descriptors with size, unwrapping and substitution
//! - **Registry**: the defined-types table and its reference graph
//! - **Errors**: construction-time type failures
//!
//! ## Example
//!
//! ```rust
//! use structnet_core::TypeSpec;
//!
//! // Nat = μn. Sum(Lit, Prod(n))
//! let nat = TypeSpec::recursive(
//!     "n",
//!     TypeSpec::Sum(vec![
//!         TypeSpec::Literal,
//!         TypeSpec::Product(vec![TypeSpec::var("n")]),
//!     ]),
//! );
//!
//! assert!(nat.size().is_err());
//! assert_eq!(nat.unwrap(0), TypeSpec::empty());
//! assert_eq!(nat.unwrap(2).size().unwrap(), 2);
//! ```

pub mod error;
pub mod registry;
pub mod spec;

pub use error::CoreError;
pub use registry::TypeRegistry;
pub use spec::TypeSpec;
