//! # Operator Trees
//!
//! An [`OperatorTree`] is the tree-shaped generalisation of a weight matrix.
//! Its `tree` holds the `[source width, destination width]` weights of one
//! source layer (with the link mask deciding which structure may flow), and
//! it has one child operator per source column that carries further
//! structure.
//!
//! ```text
//!   OperatorTree(W0)
//!     ├── None            (source column 0 is atomic)
//!     └── OperatorTree(W1) (source column 1 is a product)
//!           └── ...
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::TreeError;
use crate::tensor::Tensor;
use crate::tree::{TensorTree, TreeKind};
use crate::OPERATOR_EPSILON;

/// A structured linear map between two typed tensor trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorTree {
    tree: TensorTree,
    children: Vec<Option<OperatorTree>>,
}

impl OperatorTree {
    pub fn new(tree: TensorTree, children: Vec<Option<OperatorTree>>) -> Self {
        Self { tree, children }
    }

    /// An operator with no structural children.
    pub fn flat(tree: TensorTree) -> Self {
        let children = vec![None; tree.rows()];
        Self { tree, children }
    }

    pub fn tree(&self) -> &TensorTree {
        &self.tree
    }

    pub fn children(&self) -> &[Option<OperatorTree>] {
        &self.children
    }

    pub fn child(&self, index: usize) -> Option<&OperatorTree> {
        self.children.get(index).and_then(Option::as_ref)
    }

    /// Elementwise product of two operators of the same structure.
    pub fn pointwise_mul(&self, other: &OperatorTree) -> Result<OperatorTree, TreeError> {
        if self.children.len() != other.children.len() {
            return Err(TreeError::OperatorMismatch {
                reason: format!(
                    "{} children vs {} children",
                    self.children.len(),
                    other.children.len()
                ),
            });
        }

        let tree = self.tree.mul(&other.tree)?;
        let mut children = Vec::with_capacity(self.children.len());
        for (i, pair) in self.children.iter().zip(other.children.iter()).enumerate() {
            let next = match pair {
                (None, None) => None,
                (Some(a), Some(b)) => Some(a.pointwise_mul(b)?),
                _ => {
                    return Err(TreeError::OperatorMismatch {
                        reason: format!("child {} is present in only one operator", i),
                    })
                }
            };
            children.push(next);
        }
        Ok(OperatorTree { tree, children })
    }

    /// Apply this operator to a tree.
    ///
    /// Each child operator is applied to the matching source child and its
    /// result is scaled by the source column. Branches whose column stays
    /// below [`OPERATOR_EPSILON`] in every row are skipped.
    pub fn tree_mul(&self, tree: &TensorTree) -> Result<TensorTree, TreeError> {
        let mut result = tree.tree_mul(&self.tree)?;

        for (index, pair) in self.children.iter().zip(tree.children().iter()).enumerate() {
            let (Some(operator), Some(child)) = pair else {
                continue;
            };
            let Some(presence) = live_column(tree, index)? else {
                continue;
            };
            let contribution = operator.tree_mul(child)?.cmul(&presence)?;
            result = result.add(&contribution)?;
        }
        Ok(result)
    }

    /// Apply this operator to a tree of alternating Sum and Prod layers.
    ///
    /// The operator's own tree must be a Sum layer like `tree`. Child
    /// operators skip one level: their Prod weight trees are multiplied into
    /// the source product directly, and their own children into the
    /// product's fields.
    pub fn typed_tree_mul(&self, tree: &TensorTree) -> Result<TensorTree, TreeError> {
        if tree.kind() != TreeKind::Sum {
            return Err(TreeError::KindMismatch {
                expected: TreeKind::Sum,
                got: tree.kind(),
            });
        }
        let mut result = tree.typed_tree_mul(&self.tree)?;
        let rows = tree.rows();

        for (index, pair) in self.children.iter().zip(tree.children().iter()).enumerate() {
            let (Some(operator), Some(product)) = pair else {
                continue;
            };
            let Some(presence) = live_column(tree, index)? else {
                continue;
            };

            let weights = operator.tree();
            let mut columns = Vec::with_capacity(weights.width());
            let mut children = Vec::with_capacity(weights.width());
            for weight in weights.children() {
                match weight {
                    None => {
                        columns.push(Tensor::zeros(rows, 1));
                        children.push(None);
                    }
                    Some(weight) => {
                        let multiplied = product.typed_tree_mul(weight)?;
                        columns.push(multiplied.presence());
                        children.push(Some(Arc::new(multiplied)));
                    }
                }
            }
            let layer = TensorTree::sum(Tensor::from_columns(rows, &columns)?, children)?;
            result = result.add(&layer.cmul(&presence)?)?;

            for (field_op, field) in operator.children.iter().zip(product.children().iter()) {
                if let (Some(field_op), Some(field)) = (field_op, field) {
                    let contribution = field_op.typed_tree_mul(field)?.cmul(&presence)?;
                    result = result.add(&contribution)?;
                }
            }
        }
        Ok(result)
    }

    /// Learnable tensors with the operator path that reaches them.
    ///
    /// Paths are operator child indices followed by tree column indices.
    pub fn parameters(&self) -> Vec<(Vec<usize>, &Tensor)> {
        let mut out = Vec::new();
        self.collect_parameters(&mut Vec::new(), &mut out);
        out
    }

    fn collect_parameters<'a>(&'a self, path: &mut Vec<usize>, out: &mut Vec<(Vec<usize>, &'a Tensor)>) {
        for (tree_path, tensor) in self.tree.tensors() {
            if tensor.learnable() {
                let mut full = path.clone();
                full.extend(tree_path);
                out.push((full, tensor));
            }
        }
        for (i, child) in self.children.iter().enumerate() {
            if let Some(child) = child {
                path.push(i);
                child.collect_parameters(path, out);
                path.pop();
            }
        }
    }
}

/// Column `index` of `tree`, or `None` when it is negligible in every row.
fn live_column(tree: &TensorTree, index: usize) -> Result<Option<Tensor>, TreeError> {
    let column = tree.tensor().col(index)?;
    if column.all(|x| x < OPERATOR_EPSILON) {
        tracing::trace!(column = index, "operator_branch_pruned");
        return Ok(None);
    }
    Ok(Some(column))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::LinkMask;
    use crate::TOLERANCE;

    fn leaf(kind: TreeKind, rows: &[Vec<f32>]) -> TensorTree {
        TensorTree::leaf(kind, Tensor::from_rows(rows).unwrap())
    }

    #[test]
    fn test_pointwise_mul_structure() {
        let a = OperatorTree::new(
            leaf(TreeKind::Sum, &[vec![2.0], vec![3.0]]),
            vec![None, Some(OperatorTree::flat(leaf(TreeKind::Sum, &[vec![1.0]])))],
        );
        let b = OperatorTree::new(
            leaf(TreeKind::Sum, &[vec![0.5], vec![2.0]]),
            vec![None, Some(OperatorTree::flat(leaf(TreeKind::Sum, &[vec![4.0]])))],
        );
        let c = a.pointwise_mul(&b).unwrap();
        assert_eq!(c.tree().tensor().data(), &[1.0, 6.0]);
        assert_eq!(c.child(1).unwrap().tree().tensor().data(), &[4.0]);

        let short = OperatorTree::new(leaf(TreeKind::Sum, &[vec![1.0], vec![1.0]]), vec![None]);
        assert!(matches!(
            a.pointwise_mul(&short),
            Err(TreeError::OperatorMismatch { .. })
        ));

        let lopsided = OperatorTree::new(leaf(TreeKind::Sum, &[vec![1.0], vec![1.0]]), vec![None, None]);
        assert!(matches!(
            a.pointwise_mul(&lopsided),
            Err(TreeError::OperatorMismatch { .. })
        ));
    }

    #[test]
    fn test_tree_mul_skips_negligible_branch() {
        // source: Sum over [atomic, product]
        let field = Arc::new(leaf(TreeKind::Sum, &[vec![1.0], vec![1.0]]));
        let product = Arc::new(TensorTree::prod(Tensor::column(vec![1.0, 1.0]), vec![Some(field)]).unwrap());
        let live = TensorTree::sum(
            Tensor::from_rows(&[vec![0.5, 0.5], vec![0.0, 1.0]]).unwrap(),
            vec![None, Some(product.clone())],
        )
        .unwrap();
        let dead = TensorTree::sum(
            Tensor::from_rows(&[vec![1.0, 0.0], vec![1.0, 0.00001]]).unwrap(),
            vec![None, Some(product)],
        )
        .unwrap();

        // child operators map into the same destination layer as the root
        let inner = OperatorTree::flat(leaf(TreeKind::Sum, &[vec![2.0]]));
        let op = OperatorTree::new(
            leaf(TreeKind::Sum, &[vec![1.0], vec![1.0]]),
            vec![None, Some(inner)],
        );

        let out = op.tree_mul(&live).unwrap();
        // top: row sums 1.0 each, plus branch contribution 2 * column 1
        assert!(out.tensor().approx_eq(&Tensor::column(vec![2.0, 3.0]), TOLERANCE));

        let skipped = op.tree_mul(&dead).unwrap();
        assert!(skipped.tensor().approx_eq(&Tensor::column(vec![1.0, 1.00001]), TOLERANCE));
    }

    #[test]
    fn test_parameters_only_learnable() {
        let w = TensorTree::leaf(TreeKind::Sum, Tensor::ones(2, 1).with_learnable(true))
            .with_links(LinkMask::new(2, 1))
            .unwrap();
        let fixed = leaf(TreeKind::Prod, &[vec![1.0]]);
        let op = OperatorTree::new(w, vec![None, Some(OperatorTree::flat(fixed))]);
        let params = op.parameters();
        assert_eq!(params.len(), 1);
        assert!(params[0].0.is_empty());
    }
}
