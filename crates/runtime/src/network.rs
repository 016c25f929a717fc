//! # Networks
//!
//! Every layer of a program graph implements one capability: evaluate a
//! [`DataBag`] into a tree. This is the whole interface between the control
//! constructs and the leaf layers; the tree algebra knows nothing about it.
//!
//! ## Tail Calls
//!
//! A network in tail position may answer [`Evaluation::TailCall`] instead of
//! a tree. The sentinel carries the newest arguments and travels back up to
//! the tail-recursive layer that owns the trampoline, which runs its body
//! again with them. Anywhere a value is actually needed the sentinel is an
//! error ([`RuntimeError::UnexpectedTailCall`]).

use std::fmt;
use std::sync::Arc;

use structnet_tree::{make_tuple, TensorTree};

use crate::data::{DataBag, DataPointer};
use crate::error::RuntimeError;

/// Shared handle to a network.
pub type NetRef = Arc<dyn Network>;

/// Result of evaluating a network.
#[derive(Debug, Clone)]
pub enum Evaluation {
    /// A finished value.
    Ready(TensorTree),
    /// Run the enclosing tail-recursive body again with these arguments.
    TailCall(DataBag),
}

impl Evaluation {
    pub fn is_ready(&self) -> bool {
        matches!(self, Evaluation::Ready(_))
    }

    /// The finished value; a tail call is an error here.
    pub fn ready(self) -> Result<TensorTree, RuntimeError> {
        match self {
            Evaluation::Ready(tree) => Ok(tree),
            Evaluation::TailCall(_) => Err(RuntimeError::UnexpectedTailCall),
        }
    }
}

impl From<TensorTree> for Evaluation {
    fn from(tree: TensorTree) -> Self {
        Evaluation::Ready(tree)
    }
}

/// A callable sub-network.
///
/// Implementations must not keep per-call state: one instance can appear
/// in many scopes at once and is shared through [`NetRef`].
pub trait Network: Send + Sync + fmt::Debug {
    /// Evaluate the network in the scope `bag`.
    fn forward(&self, bag: &DataBag) -> Result<Evaluation, RuntimeError>;

    /// Scope boundary this network was declared at. Callers keep their
    /// scope up to this pointer when invoking it.
    fn pointer(&self) -> DataPointer {
        DataPointer::START
    }

    /// Name used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// What a variable or an application operand evaluates to.
#[derive(Debug, Clone)]
pub enum Value {
    Tree(Arc<TensorTree>),
    Net(NetRef),
}

impl Value {
    /// The tree, or [`RuntimeError::ExpectedData`] for a network.
    pub fn into_tree(self) -> Result<Arc<TensorTree>, RuntimeError> {
        match self {
            Value::Tree(tree) => Ok(tree),
            Value::Net(net) => Err(RuntimeError::ExpectedData { name: net.name() }),
        }
    }
}

/// Convenience calls for any network.
pub trait NetworkExt: Network {
    /// Evaluate on a tuple of `trees` with no visible nets and require a
    /// finished value.
    fn call(&self, trees: Vec<Arc<TensorTree>>) -> Result<TensorTree, RuntimeError> {
        self.call_with(trees, Vec::new())
    }

    /// [`call`](Self::call) with nets in scope.
    fn call_with(
        &self,
        trees: Vec<Arc<TensorTree>>,
        nets: Vec<NetRef>,
    ) -> Result<TensorTree, RuntimeError> {
        let bag = DataBag::new(make_tuple(trees)?, nets);
        self.forward(&bag)?.ready()
    }
}

impl<N: Network + ?Sized> NetworkExt for N {}
