//! # Runtime - Scoping and Control Flow for Structured Networks
//!
//! Composes sub-networks over typed tensor trees into program graphs:
//!
//! - **Scope**: a [`DataBag`] of argument slots and visible networks, cut
//!   into enclosing and local parts by a [`DataPointer`]
//! - **Networks**: anything implementing [`Network`]; layers compose them
//! - **Patterns**: soft structural matching that extracts sub-trees with a
//!   per-row confidence
//! - **Control flow**: application, guarded dispatch, bounded general and
//!   tail recursion
//!
//! ## Example: boolean negation by cases
//!
//! ```rust
//! use std::sync::Arc;
//! use structnet_core::TypeSpec;
//! use structnet_runtime::{
//!     ConstantLayer, DataPointer, NetRef, NetworkExt, Pattern, RuntimeConfig,
//! };
//! use structnet_tree::{Tensor, TensorTree, TreeKind};
//!
//! let bool_type = TypeSpec::Sum(vec![TypeSpec::Literal, TypeSpec::Literal]);
//! let false_: NetRef = Arc::new(ConstantLayer::new(&bool_type, 0).unwrap());
//! let true_: NetRef = Arc::new(ConstantLayer::new(&bool_type, 1).unwrap());
//!
//! let config = RuntimeConfig::default();
//! let not = config.guarded(
//!     vec![
//!         (Pattern::constructor(0, vec![Pattern::Literal(0)]), true_),
//!         (Pattern::constructor(0, vec![Pattern::Literal(1)]), false_.clone()),
//!     ],
//!     false_,
//!     DataPointer::START,
//! );
//!
//! // 80% true
//! let b = TensorTree::leaf(TreeKind::Sum, Tensor::row(vec![0.2, 0.8]));
//! let out = not.call(vec![Arc::new(b)]).unwrap();
//! assert!(out.tensor().approx_eq(&Tensor::row(vec![0.8, 0.2]), 1e-6));
//! ```

pub mod config;
pub mod data;
mod error;
pub mod layers;
pub mod network;
pub mod pattern;

pub use config::RuntimeConfig;
pub use data::{DataBag, DataPointer};
pub use error::RuntimeError;
pub use layers::{
    AnonymousLayer, ApplicationLayer, Case, ConstantLayer, ConstructorLayer, GuardedLayer,
    Operand, RecursionMode, RecursiveLayer, Variable, ZeroLayer,
};
pub use network::{Evaluation, NetRef, Network, NetworkExt, Value};
pub use pattern::{Match, Pattern};
