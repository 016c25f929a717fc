//! Tree Algebra - Soft Values of Algebraic Data Types
//!
//! Run with: cargo run -p structnet-tree --example tree_algebra
//!
//! Set `RUST_LOG=structnet_tree=trace` to see pruned operator branches.
//!
//! This example demonstrates:
//! - Encoding values of Bool and Nat as tensor trees
//! - Stacking values into a batch and taking it apart again
//! - Building a typed operator and applying it
//! - Hardening and flattening results

use std::sync::Arc;

use structnet_core::{TypeRegistry, TypeSpec};
use structnet_tree::{
    make_tuple, stack, OperatorBuilder, Tensor, TensorTree, TreeError, TreeKind,
};
use tracing_subscriber::EnvFilter;

fn zero() -> TensorTree {
    TensorTree::leaf(TreeKind::Sum, Tensor::row(vec![1.0, 0.0]))
}

fn succ(n: TensorTree) -> Result<TensorTree, TreeError> {
    let fields = TensorTree::prod(Tensor::row(vec![n.presence().data()[0]]), vec![Some(Arc::new(n))])?;
    TensorTree::sum(Tensor::row(vec![0.0, 1.0]), vec![None, Some(Arc::new(fields))])
}

fn main() -> Result<(), TreeError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Tree Algebra ===\n");

    // -------------------------------------------------------------------------
    // Encoding Values
    // -------------------------------------------------------------------------
    println!("1. Encoding Values");
    println!("------------------");

    let two = succ(succ(zero())?)?;
    println!("two: {} columns at the top, flat width {}", two.width(), two.flat_width());
    println!("two flattened: {:?}", two.flatten(None)?.data());

    let maybe_true = TensorTree::leaf(TreeKind::Sum, Tensor::row(vec![0.3, 0.7]));
    println!("70% true: presence {:?}", maybe_true.presence().data());
    println!();

    // -------------------------------------------------------------------------
    // Batching
    // -------------------------------------------------------------------------
    println!("2. Batching");
    println!("-----------");

    let one = succ(zero())?;
    let batch = stack(&[zero(), one, two.clone()])?;
    println!("batch of {} naturals, top layer {:?}", batch.rows(), batch.tensor().data());
    let last = batch.select_row(2)?;
    println!("row 2 recovers two: {}", last.approx_eq(&two, 1e-6));
    println!();

    // -------------------------------------------------------------------------
    // Typed Operators
    // -------------------------------------------------------------------------
    println!("3. Typed Operators");
    println!("------------------");

    let registry = TypeRegistry::new()
        .with_type("Bool", TypeSpec::Sum(vec![TypeSpec::Literal, TypeSpec::Literal]));
    let builder = OperatorBuilder::new(&registry);
    let ty = TypeSpec::tuple(vec![TypeSpec::named("Bool")]);
    let depth = builder.layers_for(&ty, 8)?;
    let op = builder.weights(&ty, &ty, depth, depth, 42)?;
    println!("operator over {} with {} learnable tensors", ty, op.parameters().len());

    let input = make_tuple(vec![Arc::new(maybe_true)])?;
    let output = op.typed_tree_mul(&input)?;
    let field = output
        .tuple_operands()
        .and_then(|fields| fields[0].clone())
        .ok_or(TreeError::InvalidData {
            reason: "operator output is not a tuple".to_string(),
        })?;
    println!("output field: {:?}", field.tensor().data());
    println!("hardened:     {:?}", field.strict(0.5).tensor().data());

    Ok(())
}
