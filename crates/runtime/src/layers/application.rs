//! # Application
//!
//! The composition primitive: `f x g` becomes an application whose slot 0
//! evaluates to `f` and whose other slots produce the arguments.
//!
//! ## Roles
//!
//! Each operand slot carries a set of roles:
//!
//! | Role | Meaning |
//! |------|---------|
//! | `call` | evaluate the operand against the scope first |
//! | `constants` | the (possibly evaluated) operand is a network; run it on the scope |
//! | `data` | the result is a tree argument |
//! | `nets` | the result is a network argument |
//!
//! An operand that is not called stays a network. The data arguments are
//! packed into a tuple, the net arguments into a list, and the callee runs
//! in [`DataBag::next_scope`] of its declared pointer.

use std::collections::BTreeSet;
use std::sync::Arc;

use structnet_tree::TensorTree;

use crate::data::DataBag;
use crate::error::RuntimeError;
use crate::network::{Evaluation, NetRef, Network, Value};

use super::variable::Variable;

/// One slot of an application.
#[derive(Debug, Clone)]
pub enum Operand {
    Variable(Variable),
    Net(NetRef),
}

impl From<Variable> for Operand {
    fn from(variable: Variable) -> Self {
        Operand::Variable(variable)
    }
}

impl From<NetRef> for Operand {
    fn from(net: NetRef) -> Self {
        Operand::Net(net)
    }
}

impl Operand {
    fn evaluate(&self, bag: &DataBag, call: bool) -> Result<Value, RuntimeError> {
        match (self, call) {
            (Operand::Variable(variable), true) => variable.resolve(bag),
            (Operand::Variable(variable), false) => Ok(Value::Net(Arc::new(variable.clone()))),
            (Operand::Net(net), true) => Ok(Value::Tree(Arc::new(net.forward(bag)?.ready()?))),
            (Operand::Net(net), false) => Ok(Value::Net(net.clone())),
        }
    }
}

/// Calls the network in slot 0 with the results of the other slots.
#[derive(Debug, Clone)]
pub struct ApplicationLayer {
    operands: Vec<Operand>,
    call: BTreeSet<usize>,
    constants: BTreeSet<usize>,
    data: BTreeSet<usize>,
    nets: BTreeSet<usize>,
}

impl ApplicationLayer {
    pub fn new(operands: Vec<Operand>) -> Self {
        Self {
            operands,
            call: BTreeSet::new(),
            constants: BTreeSet::new(),
            data: BTreeSet::new(),
            nets: BTreeSet::new(),
        }
    }

    /// Slots evaluated against the scope before anything else.
    pub fn with_call(mut self, slots: impl IntoIterator<Item = usize>) -> Self {
        self.call.extend(slots);
        self
    }

    /// Slots whose network is run on the scope to produce a value.
    pub fn with_constants(mut self, slots: impl IntoIterator<Item = usize>) -> Self {
        self.constants.extend(slots);
        self
    }

    /// Slots passed as tree arguments.
    pub fn with_data(mut self, slots: impl IntoIterator<Item = usize>) -> Self {
        self.data.extend(slots);
        self
    }

    /// Slots passed as network arguments.
    pub fn with_nets(mut self, slots: impl IntoIterator<Item = usize>) -> Self {
        self.nets.extend(slots);
        self
    }

    pub fn operands(&self) -> &[Operand] {
        &self.operands
    }
}

impl Network for ApplicationLayer {
    fn forward(&self, bag: &DataBag) -> Result<Evaluation, RuntimeError> {
        let mut values = Vec::with_capacity(self.operands.len());
        for (index, operand) in self.operands.iter().enumerate() {
            values.push(operand.evaluate(bag, self.call.contains(&index))?);
        }

        for index in self.constants.iter().copied().filter(|&i| i > 0) {
            let Some(value) = values.get_mut(index) else {
                continue;
            };
            let Value::Net(net) = value else {
                return Err(RuntimeError::ExpectedNet { index });
            };
            let tree = net.forward(bag)?.ready()?;
            *value = Value::Tree(Arc::new(tree));
        }

        let mut values = values.into_iter();
        let callee = match values.next() {
            Some(Value::Net(net)) => net,
            _ => return Err(RuntimeError::NotCallable),
        };

        let mut trees: Vec<Arc<TensorTree>> = Vec::new();
        let mut nets: Vec<NetRef> = Vec::new();
        for (index, value) in values.enumerate().map(|(i, v)| (i + 1, v)) {
            if self.data.contains(&index) {
                trees.push(value.clone().into_tree()?);
            }
            if self.nets.contains(&index) {
                match value {
                    Value::Net(net) => nets.push(net),
                    Value::Tree(_) => return Err(RuntimeError::ExpectedNet { index }),
                }
            }
        }

        let args = DataBag::from_slots(trees, nets, bag.size())?;
        let scope = bag.next_scope(callee.pointer(), &args)?;
        callee.forward(&scope)
    }

    fn name(&self) -> &'static str {
        "ApplicationLayer"
    }
}
