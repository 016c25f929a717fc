//! # Peano Arithmetic Tests
//!
//! Whole programs over `Nat = Z | S Nat` built from the control layers:
//! - Predecessor by guarded dispatch with a zero fallback
//! - Addition by general recursion
//! - Addition by tail recursion, with trampoline iteration counts
//! - Soft inputs ending the trampoline on the first pass with a value
//! - Recursion bounds and tail calls outside tail position

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use structnet_core::{TypeRegistry, TypeSpec};
use structnet_runtime::{
    ApplicationLayer, ConstructorLayer, DataBag, DataPointer, Evaluation, NetRef, Network,
    NetworkExt, Pattern, RuntimeConfig, RuntimeError, Variable, ZeroLayer,
};
use structnet_tree::{Tensor, TensorTree, TreeKind, TOLERANCE};

// ============================================================================
// Helpers
// ============================================================================

fn registry() -> Arc<TypeRegistry> {
    Arc::new(TypeRegistry::new().with_type(
        "Nat",
        TypeSpec::Sum(vec![
            TypeSpec::Literal,
            TypeSpec::Product(vec![TypeSpec::named("Nat")]),
        ]),
    ))
}

fn zero() -> TensorTree {
    TensorTree::leaf(TreeKind::Sum, Tensor::row(vec![1.0, 0.0]))
}

fn succ(n: TensorTree) -> TensorTree {
    let fields = TensorTree::prod(n.presence(), vec![Some(Arc::new(n))]).unwrap();
    TensorTree::sum(Tensor::row(vec![0.0, 1.0]), vec![None, Some(Arc::new(fields))]).unwrap()
}

fn nat(n: usize) -> TensorTree {
    (0..n).fold(zero(), |acc, _| succ(acc))
}

fn zero_value() -> NetRef {
    Arc::new(ZeroLayer::new(registry(), TypeSpec::named("Nat")))
}

fn succ_layer() -> NetRef {
    Arc::new(ConstructorLayer::named(&registry(), "Nat", 1).unwrap())
}

/// `(Z, m)`
fn zero_and_any() -> Pattern {
    Pattern::constructor(0, vec![Pattern::Literal(0), Pattern::Variable])
}

/// `(S n, m)`
fn succ_and_any() -> Pattern {
    Pattern::constructor(
        0,
        vec![
            Pattern::constructor(1, vec![Pattern::Variable]),
            Pattern::Variable,
        ],
    )
}

/// `S (slot)`
fn succ_of(slot: usize) -> NetRef {
    Arc::new(
        ApplicationLayer::new(vec![succ_layer().into(), Variable::Data(slot).into()])
            .with_call([1])
            .with_data([1]),
    )
}

/// `self arg1 arg2` where the self reference sits at net slot 0.
fn call_self(arg1: NetRef, arg2: NetRef) -> ApplicationLayer {
    ApplicationLayer::new(vec![Variable::Net(0).into(), arg1.into(), arg2.into()])
        .with_call([0, 1, 2])
        .with_data([1, 2])
}

/// Counts how often the wrapped network runs.
#[derive(Debug)]
struct Counting {
    inner: NetRef,
    calls: AtomicUsize,
}

impl Counting {
    fn new(inner: impl Network + 'static) -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(inner),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Network for Counting {
    fn forward(&self, bag: &DataBag) -> Result<Evaluation, RuntimeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.forward(bag)
    }
}

// ============================================================================
// Guarded Dispatch
// ============================================================================

#[test]
fn test_predecessor() {
    let config = RuntimeConfig::default();
    let pred = config.guarded(
        vec![(
            Pattern::constructor(0, vec![Pattern::constructor(1, vec![Pattern::Variable])]),
            Arc::new(Variable::Data(0)) as NetRef,
        )],
        zero_value(),
        DataPointer::START,
    );

    let out = pred.call(vec![Arc::new(nat(3))]).unwrap();
    assert!(out.approx_eq(&nat(2), TOLERANCE));

    // no case matches Z: the handler gives the zero value, not Z
    let out = pred.call(vec![Arc::new(nat(0))]).unwrap();
    assert_eq!(out.tensor().data(), &[0.0, 0.0]);
}

// ============================================================================
// General Recursion
// ============================================================================

/// add (Z, m) = m; add (S n, m) = S (add (n, m))
fn general_add(config: &RuntimeConfig) -> NetRef {
    let recurse: NetRef = Arc::new(call_self(
        Arc::new(Variable::Data(0)),
        Arc::new(Variable::Data(1)),
    ));
    let wrap: NetRef = Arc::new(
        ApplicationLayer::new(vec![succ_layer().into(), recurse.into()])
            .with_call([1])
            .with_data([1]),
    );
    let body = config.guarded(
        vec![
            (zero_and_any(), Arc::new(Variable::Data(0)) as NetRef),
            (succ_and_any(), wrap),
        ],
        zero_value(),
        DataPointer::new(0, 1),
    );
    Arc::new(config.recursive(Arc::new(body), zero_value(), DataPointer::START))
}

#[test]
fn test_general_addition() {
    let add = general_add(&RuntimeConfig::default());
    for (a, b) in [(0, 0), (0, 2), (2, 1), (3, 3)] {
        let out = add.call(vec![Arc::new(nat(a)), Arc::new(nat(b))]).unwrap();
        assert!(out.approx_eq(&nat(a + b), TOLERANCE), "{} + {}", a, b);
    }
}

#[test]
fn test_general_addition_past_the_bound() {
    // the innermost call hits the bound and contributes a zero value
    let add = general_add(&RuntimeConfig::default().with_recursion_depth(2));
    let out = add.call(vec![Arc::new(nat(3)), Arc::new(nat(1))]).unwrap();
    let innermost = TensorTree::leaf(TreeKind::Sum, Tensor::zeros(1, 2));
    assert!(out.approx_eq(&succ(succ(innermost)), TOLERANCE));
}

// ============================================================================
// Tail Recursion
// ============================================================================

/// add (Z, m) = m; add (S n, m) = add (n, S m)
fn tail_add_body(config: &RuntimeConfig) -> impl Network {
    let recurse: NetRef = Arc::new(call_self(Arc::new(Variable::Data(0)), succ_of(1)));
    config.guarded(
        vec![
            (zero_and_any(), Arc::new(Variable::Data(0)) as NetRef),
            (succ_and_any(), recurse),
        ],
        zero_value(),
        DataPointer::new(0, 1),
    )
}

#[test]
fn test_tail_addition() {
    let config = RuntimeConfig::default();
    let body = Counting::new(tail_add_body(&config));
    let add = config.tail_recursive(body.clone(), zero_value(), DataPointer::START);

    let out = add.call(vec![Arc::new(nat(3)), Arc::new(nat(2))]).unwrap();
    assert!(out.approx_eq(&nat(5), TOLERANCE));
    // one pass per predecessor plus the final one
    assert_eq!(body.calls(), 4);
}

#[test]
fn test_tail_addition_runs_long() {
    let config = RuntimeConfig::default();
    let add = config.tail_recursive(
        Arc::new(tail_add_body(&config)),
        zero_value(),
        DataPointer::START,
    );
    let out = add.call(vec![Arc::new(nat(200)), Arc::new(nat(0))]).unwrap();
    assert!(out.approx_eq(&nat(200), TOLERANCE));
}

#[test]
fn test_tail_bound_falls_back_to_handler() {
    let config = RuntimeConfig::default().with_tail_recursion_depth(3);
    let body = Counting::new(tail_add_body(&config));
    let add = config.tail_recursive(body.clone(), zero_value(), DataPointer::START);

    let out = add.call(vec![Arc::new(nat(5)), Arc::new(nat(0))]).unwrap();
    assert_eq!(out.tensor().data(), &[0.0, 0.0]);
    assert_eq!(body.calls(), 3);
}

#[test]
fn test_tail_addition_stops_at_first_value() {
    // n = 0.5 Z + 0.5 S Z: the (Z, m) case already yields 0.5 m in the first
    // pass, so the tail call from (S n, m) is not followed
    let config = RuntimeConfig::default();
    let body = Counting::new(tail_add_body(&config));
    let add = config.tail_recursive(body.clone(), zero_value(), DataPointer::START);

    let soft = TensorTree::sum(Tensor::row(vec![0.5, 0.5]), nat(1).children().to_vec()).unwrap();
    let out = add.call(vec![Arc::new(soft), Arc::new(zero())]).unwrap();

    assert_eq!(body.calls(), 1);
    assert!(out.tensor().approx_eq(&Tensor::row(vec![0.5, 0.0]), TOLERANCE));
}

#[test]
fn test_self_call_outside_tail_position() {
    // S (self (n, m)) cannot be trampolined
    let recurse: NetRef = Arc::new(call_self(
        Arc::new(Variable::Data(0)),
        Arc::new(Variable::Data(1)),
    ));
    let body = ApplicationLayer::new(vec![succ_layer().into(), recurse.into()])
        .with_call([1])
        .with_data([1]);
    let config = RuntimeConfig::default();
    let looping = config.tail_recursive(Arc::new(body), zero_value(), DataPointer::START);

    let err = looping
        .call(vec![Arc::new(nat(1)), Arc::new(nat(1))])
        .unwrap_err();
    assert_eq!(err, RuntimeError::UnexpectedTailCall);
}
