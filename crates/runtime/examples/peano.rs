//! Peano Arithmetic - Control Flow over Typed Tensor Trees
//!
//! Run with: cargo run -p structnet-runtime --example peano
//!
//! Set `RUST_LOG=structnet_runtime=debug` to see mismatch and depth
//! handlers fire, `trace` for case confidences and trampoline iterations.
//!
//! This example demonstrates:
//! - Guarded dispatch with a zero fallback (predecessor)
//! - General recursion (addition)
//! - Tail recursion with a trampoline (accumulating addition)
//! - Soft inputs blending the branches they partially match

use std::sync::Arc;

use structnet_core::{TypeRegistry, TypeSpec};
use structnet_runtime::{
    ApplicationLayer, ConstructorLayer, DataPointer, NetRef, NetworkExt, Pattern, RuntimeConfig,
    RuntimeError, Variable, ZeroLayer,
};
use structnet_tree::{stack, Tensor, TensorTree, TreeKind};
use tracing_subscriber::EnvFilter;

fn zero() -> TensorTree {
    TensorTree::leaf(TreeKind::Sum, Tensor::row(vec![1.0, 0.0]))
}

fn nat(succ: &NetRef, n: usize) -> Result<TensorTree, RuntimeError> {
    let mut value = zero();
    for _ in 0..n {
        value = succ.call(vec![Arc::new(value)])?;
    }
    Ok(value)
}

/// Follow the most likely constructor down the tree.
fn decode(tree: &TensorTree) -> usize {
    let mut count = 0;
    let mut node = tree;
    loop {
        let row = node.tensor().row_values(0);
        if row.len() < 2 || row[1] <= row[0] {
            return count;
        }
        match node.child(1).and_then(|fields| fields.child(0)) {
            Some(inner) => {
                count += 1;
                node = inner;
            }
            None => return count + 1,
        }
    }
}

fn main() -> Result<(), RuntimeError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Peano Arithmetic ===\n");

    let registry = Arc::new(TypeRegistry::new().with_type(
        "Nat",
        TypeSpec::Sum(vec![
            TypeSpec::Literal,
            TypeSpec::Product(vec![TypeSpec::named("Nat")]),
        ]),
    ));
    let succ: NetRef = Arc::new(ConstructorLayer::named(&registry, "Nat", 1)?);
    let zero_value: NetRef = Arc::new(ZeroLayer::new(registry.clone(), TypeSpec::named("Nat")));
    let config = RuntimeConfig::default();

    // -------------------------------------------------------------------------
    // Guarded Dispatch
    // -------------------------------------------------------------------------
    println!("1. Predecessor");
    println!("--------------");

    let pred = config.guarded(
        vec![(
            Pattern::constructor(0, vec![Pattern::constructor(1, vec![Pattern::Variable])]),
            Arc::new(Variable::Data(0)) as NetRef,
        )],
        zero_value.clone(),
        DataPointer::START,
    );
    for n in [3, 1, 0] {
        let out = pred.call(vec![Arc::new(nat(&succ, n)?)])?;
        println!("pred {} -> {} (top layer {:?})", n, decode(&out), out.tensor().data());
    }
    println!();

    // -------------------------------------------------------------------------
    // General Recursion
    // -------------------------------------------------------------------------
    println!("2. Addition");
    println!("-----------");

    let zero_and_any = Pattern::constructor(0, vec![Pattern::Literal(0), Pattern::Variable]);
    let succ_and_any = Pattern::constructor(
        0,
        vec![
            Pattern::constructor(1, vec![Pattern::Variable]),
            Pattern::Variable,
        ],
    );

    // add (Z, m) = m; add (S n, m) = S (add (n, m))
    let recurse: NetRef = Arc::new(
        ApplicationLayer::new(vec![
            Variable::Net(0).into(),
            Variable::Data(0).into(),
            Variable::Data(1).into(),
        ])
        .with_call([0, 1, 2])
        .with_data([1, 2]),
    );
    let wrap: NetRef = Arc::new(
        ApplicationLayer::new(vec![succ.clone().into(), recurse.into()])
            .with_call([1])
            .with_data([1]),
    );
    let body = config.guarded(
        vec![
            (zero_and_any.clone(), Arc::new(Variable::Data(0)) as NetRef),
            (succ_and_any.clone(), wrap),
        ],
        zero_value.clone(),
        DataPointer::new(0, 1),
    );
    let add = config.recursive(Arc::new(body), zero_value.clone(), DataPointer::START);

    for (a, b) in [(2, 1), (0, 4), (5, 5)] {
        let out = add.call(vec![Arc::new(nat(&succ, a)?), Arc::new(nat(&succ, b)?)])?;
        println!("{} + {} = {}", a, b, decode(&out));
    }
    println!();

    // -------------------------------------------------------------------------
    // Tail Recursion
    // -------------------------------------------------------------------------
    println!("3. Accumulating Addition");
    println!("------------------------");

    // add (Z, m) = m; add (S n, m) = add (n, S m)
    let succ_second: NetRef = Arc::new(
        ApplicationLayer::new(vec![succ.clone().into(), Variable::Data(1).into()])
            .with_call([1])
            .with_data([1]),
    );
    let tail_recurse: NetRef = Arc::new(
        ApplicationLayer::new(vec![
            Variable::Net(0).into(),
            Variable::Data(0).into(),
            succ_second.into(),
        ])
        .with_call([0, 1, 2])
        .with_data([1, 2]),
    );
    let tail_body = config.guarded(
        vec![
            (zero_and_any, Arc::new(Variable::Data(0)) as NetRef),
            (succ_and_any, tail_recurse),
        ],
        zero_value.clone(),
        DataPointer::new(0, 1),
    );
    let tail_add = config.tail_recursive(Arc::new(tail_body), zero_value, DataPointer::START);

    let big = 300;
    let out = tail_add.call(vec![Arc::new(nat(&succ, big)?), Arc::new(nat(&succ, 2)?)])?;
    println!("{} + 2 = {} in constant stack depth", big, decode(&out));
    println!();

    // -------------------------------------------------------------------------
    // Soft Inputs
    // -------------------------------------------------------------------------
    println!("4. Soft Inputs");
    println!("--------------");

    // a batch: 1 and 2 as separate rows
    let batch = stack(&[nat(&succ, 1)?, nat(&succ, 2)?])?;
    let out = pred.call(vec![Arc::new(batch)])?;
    for row in 0..out.rows() {
        println!("pred row {}: {}", row, decode(&out.select_row(row)?));
    }

    // a single value that is Z with 25% and S Z with 75%
    let soft = TensorTree::sum(
        Tensor::row(vec![0.25, 0.75]),
        nat(&succ, 1)?.children().to_vec(),
    )?;
    let out = pred.call(vec![Arc::new(soft)])?;
    println!("pred of (25% 0, 75% 1): top layer {:?}", out.tensor().data());

    Ok(())
}
