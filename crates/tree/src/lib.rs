//! # Tree - Typed Tensor Tree Algebra
//!
//! Values of algebraic data types as nested tensors of presence weights,
//! and the structured linear maps between them.
//!
//! ## Core Concepts
//!
//! - **Tensor**: a dense `[rows, cols]` matrix; rows are batch items
//! - **TensorTree**: one tensor per type layer, Sum (alternatives) or Prod
//!   (fields), with an optional sub-tree per column
//! - **OperatorTree**: weights shaped like the trees they connect; applying
//!   one generalises vector-matrix multiplication to nested structure
//! - **OperatorBuilder**: derives operator shapes and link masks from types
//!
//! ## Example: a soft boolean
//!
//! ```rust
//! use std::sync::Arc;
//! use structnet_tree::{make_tuple, Tensor, TensorTree, TreeKind};
//!
//! // 70% true, 30% false
//! let b = TensorTree::leaf(TreeKind::Sum, Tensor::row(vec![0.3, 0.7]));
//! assert!((b.presence().data()[0] - 1.0).abs() < 1e-6);
//!
//! let pair = make_tuple(vec![Arc::new(b.clone()), Arc::new(b)]).unwrap();
//! assert_eq!(pair.tuple_operands().unwrap().len(), 2);
//! ```

pub mod activation;
pub mod builder;
mod error;
pub mod operator;
pub mod tensor;
pub mod tree;

pub use activation::StructuredActivation;
pub use builder::{LayerContext, LayerWeights, OperatorBuilder};
pub use error::TreeError;
pub use operator::OperatorTree;
pub use tensor::Tensor;
pub use tree::{make_tuple, stack, LinkMask, TensorTree, TreeKind};

/// Weights below this magnitude do not carry structure through a Prod matmul.
pub const LINK_EPSILON: f32 = 1e-3;

/// Operator branches whose source column stays below this in every row are
/// skipped.
pub const OPERATOR_EPSILON: f32 = 1e-4;

/// Tolerance for numeric comparisons of trees.
pub const TOLERANCE: f32 = 1e-5;
