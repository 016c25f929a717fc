//! Structured activations: one function for Sum layers, one for Prod layers.
//!
//! Sum columns are alternatives, so the usual choice normalises them per row
//! (softmax). Prod columns are independent, so each is squashed on its own
//! (sigmoid).

use crate::tensor::Tensor;

/// A pair of layer functions applied by [`TensorTree::apply_structured`].
///
/// [`TensorTree::apply_structured`]: crate::TensorTree::apply_structured
#[derive(Clone, Copy)]
pub struct StructuredActivation {
    sum: fn(&Tensor) -> Tensor,
    prod: fn(&Tensor) -> Tensor,
}

impl StructuredActivation {
    /// Leaves every layer unchanged.
    pub const LINEAR: StructuredActivation = StructuredActivation {
        sum: Tensor::clone,
        prod: Tensor::clone,
    };

    /// Softmax over Sum layers, sigmoid over Prod layers.
    pub const SIGMOID: StructuredActivation = StructuredActivation {
        sum: Tensor::softmax_rows,
        prod: Tensor::sigmoid,
    };

    pub fn new(sum: fn(&Tensor) -> Tensor, prod: fn(&Tensor) -> Tensor) -> Self {
        Self { sum, prod }
    }

    pub fn sum(&self, tensor: &Tensor) -> Tensor {
        (self.sum)(tensor)
    }

    pub fn prod(&self, tensor: &Tensor) -> Tensor {
        (self.prod)(tensor)
    }
}

impl std::fmt::Debug for StructuredActivation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructuredActivation").finish_non_exhaustive()
    }
}
