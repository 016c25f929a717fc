//! Read-only accessors into the scope.

use crate::data::DataBag;
use crate::error::RuntimeError;
use crate::network::{Evaluation, NetRef, Network, Value};

/// Reads a data slot or a net.
#[derive(Debug, Clone)]
pub enum Variable {
    /// Data slot at the given index.
    Data(usize),
    /// Net slot at the given index.
    Net(usize),
    /// A network fixed at construction, independent of the scope.
    External(NetRef),
}

impl Variable {
    pub fn resolve(&self, bag: &DataBag) -> Result<Value, RuntimeError> {
        match self {
            Variable::Data(index) => Ok(Value::Tree(bag.get_tree(*index)?)),
            Variable::Net(index) => Ok(Value::Net(bag.get_net(*index)?)),
            Variable::External(net) => Ok(Value::Net(net.clone())),
        }
    }
}

impl Network for Variable {
    fn forward(&self, bag: &DataBag) -> Result<Evaluation, RuntimeError> {
        let tree = self.resolve(bag)?.into_tree()?;
        Ok(Evaluation::Ready(tree.as_ref().clone()))
    }

    fn name(&self) -> &'static str {
        "Variable"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::layers::ConstantLayer;
    use structnet_core::TypeSpec;
    use structnet_tree::{Tensor, TensorTree, TreeKind};

    fn bag() -> DataBag {
        let x = Arc::new(TensorTree::leaf(TreeKind::Sum, Tensor::row(vec![0.2, 0.8])));
        let net: NetRef = Arc::new(ConstantLayer::new(&TypeSpec::unit(), 0).unwrap());
        DataBag::from_slots(vec![x], vec![net], 1).unwrap()
    }

    #[test]
    fn test_resolve_each_kind() {
        let b = bag();
        assert!(matches!(Variable::Data(0).resolve(&b).unwrap(), Value::Tree(_)));
        match Variable::Net(0).resolve(&b).unwrap() {
            Value::Net(net) => assert!(Arc::ptr_eq(&net, &b.nets()[0])),
            Value::Tree(_) => panic!("expected a net"),
        }
        let fixed: NetRef = Arc::new(ConstantLayer::new(&TypeSpec::unit(), 0).unwrap());
        match Variable::External(fixed.clone()).resolve(&DataBag::empty()).unwrap() {
            Value::Net(net) => assert!(Arc::ptr_eq(&net, &fixed)),
            Value::Tree(_) => panic!("expected a net"),
        }
    }

    #[test]
    fn test_forward_returns_slot() {
        let b = bag();
        let out = Variable::Data(0).forward(&b).unwrap().ready().unwrap();
        assert_eq!(out.tensor().data(), &[0.2, 0.8]);
        assert!(matches!(
            Variable::Net(0).forward(&b),
            Err(RuntimeError::ExpectedData { .. })
        ));
        assert!(matches!(
            Variable::Data(3).forward(&b),
            Err(RuntimeError::SlotOutOfRange { index: 3, len: 1 })
        ));
    }
}
