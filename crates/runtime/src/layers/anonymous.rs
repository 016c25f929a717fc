//! Closures: networks declared inside another network's scope.

use crate::data::{DataBag, DataPointer};
use crate::error::RuntimeError;
use crate::network::{Evaluation, NetRef, Network};

/// Wraps a network and the scope pointer it was declared at, so callers
/// splice their scope correctly when invoking it.
#[derive(Debug, Clone)]
pub struct AnonymousLayer {
    net: NetRef,
    pointer: DataPointer,
}

impl AnonymousLayer {
    pub fn new(net: NetRef, pointer: DataPointer) -> Self {
        Self { net, pointer }
    }

    pub fn inner(&self) -> &NetRef {
        &self.net
    }
}

impl Network for AnonymousLayer {
    fn forward(&self, bag: &DataBag) -> Result<Evaluation, RuntimeError> {
        self.net.forward(bag)
    }

    fn pointer(&self) -> DataPointer {
        self.pointer
    }

    fn name(&self) -> &'static str {
        "AnonymousLayer"
    }
}
