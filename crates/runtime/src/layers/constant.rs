//! # Leaf Layers
//!
//! Structural values that are not learned: constants of an ADT, constructor
//! applications and the all-zero value. All three are declared at global
//! scope and produce one row per row of the bag.

use std::sync::Arc;

use structnet_core::{CoreError, TypeRegistry, TypeSpec};
use structnet_tree::{Tensor, TensorTree, TreeKind};

use crate::data::DataBag;
use crate::error::RuntimeError;
use crate::network::{Evaluation, Network};

/// `[rows, width]` with ones in column `position` and zeros elsewhere.
fn one_hot(rows: usize, width: usize, position: usize) -> Result<Tensor, RuntimeError> {
    let row: Vec<f32> = (0..width)
        .map(|j| if j == position { 1.0 } else { 0.0 })
        .collect();
    Ok(Tensor::ones(rows, 1).mul(&Tensor::row(row))?)
}

/// Number of constructors of `definition`, checking `position` against it.
fn constructor_count(definition: &TypeSpec, position: usize) -> Result<usize, CoreError> {
    if !definition.is_sum() {
        return Err(CoreError::Unsupported {
            spec: definition.clone(),
            reason: "constructors belong to a sum type".to_string(),
        });
    }
    let width = definition.operands().len();
    if position >= width {
        return Err(CoreError::Unsupported {
            spec: definition.clone(),
            reason: format!("no constructor at position {}", position),
        });
    }
    Ok(width)
}

/// An argument-free constructor of an ADT, e.g. `True` or `Z`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantLayer {
    width: usize,
    position: usize,
}

impl ConstantLayer {
    /// Constant `position` of the sum type `definition`.
    pub fn new(definition: &TypeSpec, position: usize) -> Result<Self, CoreError> {
        let width = constructor_count(definition, position)?;
        Ok(Self { width, position })
    }

    /// Constant `position` of the registered type `name`.
    pub fn named(registry: &TypeRegistry, name: &str, position: usize) -> Result<Self, CoreError> {
        Self::new(registry.get(name)?, position)
    }
}

impl Network for ConstantLayer {
    fn forward(&self, bag: &DataBag) -> Result<Evaluation, RuntimeError> {
        let tensor = one_hot(bag.size(), self.width, self.position)?;
        Ok(TensorTree::leaf(TreeKind::Sum, tensor).into())
    }

    fn name(&self) -> &'static str {
        "ConstantLayer"
    }
}

/// Applies a constructor to the bag's argument tuple: the tuple's product
/// becomes the child of the constructor column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstructorLayer {
    width: usize,
    position: usize,
}

impl ConstructorLayer {
    /// Constructor `position` of the sum type `definition`.
    pub fn new(definition: &TypeSpec, position: usize) -> Result<Self, CoreError> {
        let width = constructor_count(definition, position)?;
        Ok(Self { width, position })
    }

    /// Constructor `position` of the registered type `name`.
    pub fn named(registry: &TypeRegistry, name: &str, position: usize) -> Result<Self, CoreError> {
        Self::new(registry.get(name)?, position)
    }
}

impl Network for ConstructorLayer {
    fn forward(&self, bag: &DataBag) -> Result<Evaluation, RuntimeError> {
        let product = match bag.data().child(0) {
            Some(product) if bag.data().tuple_operands().is_some() => product.clone(),
            _ => return Err(RuntimeError::NotATuple),
        };
        let tensor = one_hot(bag.size(), self.width, self.position)?;
        let mut children: Vec<Option<Arc<TensorTree>>> = vec![None; self.width];
        children[self.position] = Some(product);
        Ok(TensorTree::sum(tensor, children)?.into())
    }

    fn name(&self) -> &'static str {
        "ConstructorLayer"
    }
}

/// The all-zero value of a registered ADT.
///
/// Serves as the default mismatch and depth handler: it contributes
/// nothing when summed into a result. The type is looked up on every call,
/// so a registry can be completed after the layer is built.
#[derive(Debug, Clone)]
pub struct ZeroLayer {
    registry: Arc<TypeRegistry>,
    result: TypeSpec,
}

impl ZeroLayer {
    pub fn new(registry: Arc<TypeRegistry>, result: TypeSpec) -> Self {
        Self { registry, result }
    }

    pub fn result(&self) -> &TypeSpec {
        &self.result
    }
}

impl Network for ZeroLayer {
    fn forward(&self, bag: &DataBag) -> Result<Evaluation, RuntimeError> {
        let TypeSpec::Named { name, .. } = &self.result else {
            return Err(CoreError::Unsupported {
                spec: self.result.clone(),
                reason: "zero values exist only for named types".to_string(),
            }
            .into());
        };
        let definition = self.registry.get(name)?;
        if !definition.is_sum() {
            return Err(CoreError::Unsupported {
                spec: definition.clone(),
                reason: "zero values exist only for sum types".to_string(),
            }
            .into());
        }
        let tensor = Tensor::zeros(bag.size(), definition.operands().len());
        Ok(TensorTree::leaf(TreeKind::Sum, tensor).into())
    }

    fn name(&self) -> &'static str {
        "ZeroLayer"
    }
}
