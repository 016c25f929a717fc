//! # Recursion
//!
//! A recursive layer makes its body able to call itself through net slot 0
//! of the scope. Both modes are bounded: when the bound is hit the depth
//! handler runs on the arguments of the call that would have gone too deep.
//!
//! ## General Recursion
//!
//! The self reference is a [`LimitedRecursion`] holding a call counter that
//! belongs to one activation of the layer. Every self call in that
//! activation counts, however the calls nest, and the call after the bound
//! runs the depth handler. The layer itself stays immutable.
//!
//! ## Tail Recursion
//!
//! The self reference only packages its arguments into
//! [`Evaluation::TailCall`]. The layer runs a loop: the body is evaluated,
//! a tail call restarts it with the new arguments, the first finished value
//! is the result. Stack depth stays constant however long the loop runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::data::{DataBag, DataPointer};
use crate::error::RuntimeError;
use crate::network::{Evaluation, NetRef, Network};

/// Default bound for general recursion.
pub const DEFAULT_RECURSION_DEPTH: usize = 50;

/// Default bound for tail recursion.
pub const DEFAULT_TAIL_RECURSION_DEPTH: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecursionMode {
    General,
    Tail,
}

/// A body that may call itself through net slot 0.
#[derive(Debug, Clone)]
pub struct RecursiveLayer {
    net: NetRef,
    depth_handler: NetRef,
    pointer: DataPointer,
    mode: RecursionMode,
    max_depth: usize,
}

impl RecursiveLayer {
    /// General recursion with the default bound.
    pub fn new(net: NetRef, depth_handler: NetRef, pointer: DataPointer) -> Self {
        Self {
            net,
            depth_handler,
            pointer,
            mode: RecursionMode::General,
            max_depth: DEFAULT_RECURSION_DEPTH,
        }
    }

    /// Tail recursion with the default bound. Every recursive call in the
    /// body must be in tail position.
    pub fn tail(net: NetRef, depth_handler: NetRef, pointer: DataPointer) -> Self {
        Self {
            mode: RecursionMode::Tail,
            max_depth: DEFAULT_TAIL_RECURSION_DEPTH,
            ..Self::new(net, depth_handler, pointer)
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn mode(&self) -> RecursionMode {
        self.mode
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    fn forward_general(&self, bag: &DataBag) -> Result<Evaluation, RuntimeError> {
        let limited = Arc::new(LimitedRecursion {
            net: self.net.clone(),
            handler: self.depth_handler.clone(),
            pointer: self.pointer.with_self_slot(),
            calls: AtomicUsize::new(0),
            max_depth: self.max_depth,
        });
        let scope = bag.with_self_reference(limited.clone());
        limited.forward(&scope)
    }

    fn forward_tail(&self, bag: &DataBag) -> Result<Evaluation, RuntimeError> {
        let pointer = self.pointer.with_self_slot();
        let mut args = bag.with_self_reference(Arc::new(TailSelf { pointer }));

        for iteration in 1..=self.max_depth {
            tracing::trace!(iteration, "tail recursion");
            match self.net.forward(&args)? {
                Evaluation::Ready(tree) => return Ok(tree.into()),
                Evaluation::TailCall(next) => args = next,
            }
        }

        tracing::debug!(
            max_depth = self.max_depth,
            handler = self.depth_handler.name(),
            "tail recursion bound reached"
        );
        let (_, local) = args.split(pointer)?;
        self.depth_handler.forward(&local)
    }
}

impl Network for RecursiveLayer {
    fn forward(&self, bag: &DataBag) -> Result<Evaluation, RuntimeError> {
        match self.mode {
            RecursionMode::General => self.forward_general(bag),
            RecursionMode::Tail => self.forward_tail(bag),
        }
    }

    fn pointer(&self) -> DataPointer {
        self.pointer
    }

    fn name(&self) -> &'static str {
        "RecursiveLayer"
    }
}

/// The self reference of general recursion for one activation.
#[derive(Debug)]
struct LimitedRecursion {
    net: NetRef,
    handler: NetRef,
    pointer: DataPointer,
    calls: AtomicUsize,
    max_depth: usize,
}

impl Network for LimitedRecursion {
    fn forward(&self, bag: &DataBag) -> Result<Evaluation, RuntimeError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call > self.max_depth {
            tracing::debug!(
                call,
                handler = self.handler.name(),
                "recursion bound reached"
            );
            let (_, local) = bag.split(self.pointer)?;
            return self.handler.forward(&local);
        }
        self.net.forward(bag)
    }

    fn pointer(&self) -> DataPointer {
        self.pointer
    }

    fn name(&self) -> &'static str {
        "LimitedRecursion"
    }
}

/// The self reference of tail recursion: hands its scope back to the loop.
#[derive(Debug, Clone, Copy)]
struct TailSelf {
    pointer: DataPointer,
}

impl Network for TailSelf {
    fn forward(&self, bag: &DataBag) -> Result<Evaluation, RuntimeError> {
        Ok(Evaluation::TailCall(bag.clone()))
    }

    fn pointer(&self) -> DataPointer {
        self.pointer
    }

    fn name(&self) -> &'static str {
        "TailSelf"
    }
}
