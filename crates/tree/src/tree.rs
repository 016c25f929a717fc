//! # Typed Tensor Trees
//!
//! A [`TensorTree`] is a tensor plus one optional sub-tree per column. It
//! encodes a (soft) value of an algebraic data type:
//!
//! ```text
//!   succ(zero)  ==  Sum [0, 1]
//!                       │  └── Prod [1]
//!                       │          └── Sum [1, 0]
//!                       └── (absent)
//! ```
//!
//! ## Layer Kinds
//!
//! | Kind | Columns | Presence |
//! |------|---------|----------|
//! | Sum  | mutually exclusive alternatives | row sum |
//! | Prod | co-occurring fields | row product |
//!
//! An ADT value is a Sum layer whose populated child is a Prod layer holding
//! the constructor arguments. A tuple is a Prod layer wrapped in a unary Sum.
//!
//! ## Absent Children
//!
//! `None` in `children` is a first-class state: the column has no tracked
//! substructure and its mass is atomic. It is *not* the same as a present
//! sub-tree full of zeros. Pointwise operations never discard a present
//! child in favour of a bare coefficient.
//!
//! Trees are immutable. Every operation returns a new tree and sub-trees are
//! shared through `Arc`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use structnet_core::TypeSpec;

use crate::activation::StructuredActivation;
use crate::error::TreeError;
use crate::tensor::Tensor;
use crate::LINK_EPSILON;

/// Which dual encoding a tree layer uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TreeKind {
    Sum,
    Prod,
}

impl TreeKind {
    /// The other kind.
    pub fn dual(self) -> Self {
        match self {
            TreeKind::Sum => TreeKind::Prod,
            TreeKind::Prod => TreeKind::Sum,
        }
    }
}

/// Boolean `[source, destination]` mask: which source children may flow
/// into which destination columns during [`TensorTree::matmul`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkMask {
    rows: usize,
    cols: usize,
    allowed: Vec<bool>,
}

impl LinkMask {
    /// A mask that allows nothing.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            allowed: vec![false; rows * cols],
        }
    }

    /// A mask that allows every pair.
    pub fn full(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            allowed: vec![true; rows * cols],
        }
    }

    pub fn from_fn(rows: usize, cols: usize, f: impl Fn(usize, usize) -> bool) -> Self {
        let mut mask = Self::new(rows, cols);
        for i in 0..rows {
            for j in 0..cols {
                mask.allowed[i * cols + j] = f(i, j);
            }
        }
        mask
    }

    pub fn allow(&mut self, row: usize, col: usize) {
        if row < self.rows && col < self.cols {
            self.allowed[row * self.cols + col] = true;
        }
    }

    pub fn allows(&self, row: usize, col: usize) -> bool {
        row < self.rows && col < self.cols && self.allowed[row * self.cols + col]
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    fn combine(
        a: Option<&Arc<LinkMask>>,
        b: Option<&Arc<LinkMask>>,
        f: impl Fn(bool, bool) -> bool,
    ) -> Result<Option<Arc<LinkMask>>, TreeError> {
        let (a, b) = match (a, b) {
            (None, None) => return Ok(None),
            (Some(a), None) | (None, Some(a)) => {
                let out = LinkMask::from_fn(a.rows, a.cols, |i, j| f(a.allows(i, j), false));
                return Ok(Some(Arc::new(out)));
            }
            (Some(a), Some(b)) => (a, b),
        };
        if a.shape() != b.shape() {
            return Err(TreeError::ShapeMismatch {
                op: "links",
                left: a.shape(),
                right: b.shape(),
            });
        }
        Ok(Some(Arc::new(LinkMask::from_fn(a.rows, a.cols, |i, j| {
            f(a.allows(i, j), b.allows(i, j))
        }))))
    }
}

#[derive(Debug, Clone, Copy)]
enum Pointwise {
    Add,
    Mul,
}

impl Pointwise {
    fn tensors(self, a: &Tensor, b: &Tensor) -> Result<Tensor, TreeError> {
        match self {
            Pointwise::Add => a.add(b),
            Pointwise::Mul => a.mul(b),
        }
    }

    fn constant(self, tree: &TensorTree, c: &Tensor) -> Result<TensorTree, TreeError> {
        match self {
            Pointwise::Add => tree.cadd(c),
            Pointwise::Mul => tree.cmul(c),
        }
    }

    fn links(self, a: bool, b: bool) -> bool {
        match self {
            Pointwise::Add => a || b,
            Pointwise::Mul => a && b,
        }
    }
}

/// A typed tensor tree: one layer tensor and one optional child per column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorTree {
    kind: TreeKind,
    tensor: Tensor,
    children: Vec<Option<Arc<TensorTree>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    links: Option<Arc<LinkMask>>,
}

impl AsRef<TensorTree> for TensorTree {
    fn as_ref(&self) -> &TensorTree {
        self
    }
}

impl TensorTree {
    /// Create a tree, checking that there is one child slot per column.
    pub fn new(
        kind: TreeKind,
        tensor: Tensor,
        children: Vec<Option<Arc<TensorTree>>>,
    ) -> Result<Self, TreeError> {
        if children.len() != tensor.cols() {
            return Err(TreeError::WidthMismatch {
                expected: tensor.cols(),
                got: children.len(),
            });
        }
        Ok(Self {
            kind,
            tensor,
            children,
            links: None,
        })
    }

    pub fn sum(tensor: Tensor, children: Vec<Option<Arc<TensorTree>>>) -> Result<Self, TreeError> {
        Self::new(TreeKind::Sum, tensor, children)
    }

    pub fn prod(tensor: Tensor, children: Vec<Option<Arc<TensorTree>>>) -> Result<Self, TreeError> {
        Self::new(TreeKind::Prod, tensor, children)
    }

    /// A single layer without children.
    pub fn leaf(kind: TreeKind, tensor: Tensor) -> Self {
        let children = vec![None; tensor.cols()];
        Self {
            kind,
            tensor,
            children,
            links: None,
        }
    }

    /// The canonical empty tree: 0 rows, zero width, no children.
    pub fn empty() -> Self {
        Self::leaf(TreeKind::Sum, Tensor::zeros(0, 0))
    }

    /// All-zero layer of the given type with `rows` rows and no children.
    pub fn zeros(spec: &TypeSpec, rows: usize) -> Result<Self, TreeError> {
        let kind = match spec {
            TypeSpec::Product(_) => TreeKind::Prod,
            _ => TreeKind::Sum,
        };
        Ok(Self::leaf(kind, Tensor::zeros(rows, spec.width()?)))
    }

    /// Attach a link mask; its shape must equal the tensor's.
    pub fn with_links(mut self, links: LinkMask) -> Result<Self, TreeError> {
        if links.shape() != self.tensor.shape() {
            return Err(TreeError::ShapeMismatch {
                op: "with_links",
                left: self.tensor.shape(),
                right: links.shape(),
            });
        }
        self.links = Some(Arc::new(links));
        Ok(self)
    }

    pub fn kind(&self) -> TreeKind {
        self.kind
    }

    pub fn tensor(&self) -> &Tensor {
        &self.tensor
    }

    pub fn children(&self) -> &[Option<Arc<TensorTree>>] {
        &self.children
    }

    /// Child at `index`, `None` when absent or out of range.
    pub fn child(&self, index: usize) -> Option<&Arc<TensorTree>> {
        self.children.get(index).and_then(Option::as_ref)
    }

    pub fn links(&self) -> Option<&LinkMask> {
        self.links.as_deref()
    }

    pub fn rows(&self) -> usize {
        self.tensor.rows()
    }

    pub fn width(&self) -> usize {
        self.tensor.cols()
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 && self.rows() == 0
    }

    /// Operands of a tuple (a unary Sum over a Prod layer).
    pub fn tuple_operands(&self) -> Option<&[Option<Arc<TensorTree>>]> {
        if self.kind != TreeKind::Sum || self.width() != 1 {
            return None;
        }
        match self.child(0) {
            Some(product) if product.kind == TreeKind::Prod => Some(product.children()),
            _ => None,
        }
    }

    /// Per-row presence `[rows, 1]`: row sum for Sum, row product for Prod.
    pub fn presence(&self) -> Tensor {
        match self.kind {
            TreeKind::Sum => self.tensor.sum_cols(),
            TreeKind::Prod => self.tensor.prod_cols(),
        }
    }

    /// Rebuild every layer tensor with `f`, keeping the structure.
    pub fn try_map<F>(&self, f: &F) -> Result<TensorTree, TreeError>
    where
        F: Fn(TreeKind, &Tensor) -> Result<Tensor, TreeError>,
    {
        let tensor = f(self.kind, &self.tensor)?;
        let children = self
            .children
            .iter()
            .map(|child| match child {
                Some(c) => c.try_map(f).map(|m| Some(Arc::new(m))),
                None => Ok(None),
            })
            .collect::<Result<Vec<_>, _>>()?;
        let links = self
            .links
            .clone()
            .filter(|l| l.shape() == tensor.shape());
        Ok(TensorTree {
            kind: self.kind,
            tensor,
            children,
            links,
        })
    }

    /// Apply an infallible tensor function to every layer.
    pub fn map(&self, f: impl Fn(&Tensor) -> Tensor) -> TensorTree {
        self.map_ref(&f)
    }

    fn map_ref(&self, f: &dyn Fn(&Tensor) -> Tensor) -> TensorTree {
        TensorTree {
            kind: self.kind,
            tensor: f(&self.tensor),
            children: self
                .children
                .iter()
                .map(|c| c.as_ref().map(|c| Arc::new(c.map_ref(f))))
                .collect(),
            links: self.links.clone(),
        }
    }

    /// Multiply the tensor and every present child by a broadcastable constant.
    pub fn cmul(&self, constant: &Tensor) -> Result<TensorTree, TreeError> {
        self.try_map(&|_, t| t.mul(constant))
    }

    /// Add a broadcastable constant to the tensor and every present child.
    pub fn cadd(&self, constant: &Tensor) -> Result<TensorTree, TreeError> {
        self.try_map(&|_, t| t.add(constant))
    }

    /// Structural pointwise addition.
    pub fn add(&self, other: &TensorTree) -> Result<TensorTree, TreeError> {
        self.pointwise(other, Pointwise::Add)
    }

    /// Structural pointwise multiplication.
    pub fn mul(&self, other: &TensorTree) -> Result<TensorTree, TreeError> {
        self.pointwise(other, Pointwise::Mul)
    }

    fn pointwise(&self, other: &TensorTree, op: Pointwise) -> Result<TensorTree, TreeError> {
        if self.kind != other.kind {
            return Err(TreeError::KindMismatch {
                expected: self.kind,
                got: other.kind,
            });
        }
        if self.width() != other.width() {
            return Err(TreeError::WidthMismatch {
                expected: self.width(),
                got: other.width(),
            });
        }

        let tensor = op.tensors(&self.tensor, &other.tensor)?;
        let mut children = Vec::with_capacity(self.width());
        for (i, pair) in self.children.iter().zip(other.children.iter()).enumerate() {
            let next = match pair {
                (None, None) => None,
                (None, Some(theirs)) => Some(op.constant(theirs, &self.tensor.col(i)?)?),
                (Some(ours), None) => Some(op.constant(ours, &other.tensor.col(i)?)?),
                (Some(ours), Some(theirs)) => Some(ours.pointwise(theirs, op)?),
            };
            children.push(next.map(Arc::new));
        }

        let links = LinkMask::combine(self.links.as_ref(), other.links.as_ref(), |a, b| {
            op.links(a, b)
        })?;
        Ok(TensorTree {
            kind: self.kind,
            tensor,
            children,
            links,
        })
    }

    /// Multiply the top layer by a weight tree's tensor.
    ///
    /// Only Prod sources propagate children: child `i` is scaled by `w[i, j]`
    /// and added into destination column `j` when the weight's link mask
    /// allows the pair and `|w[i, j]| >= LINK_EPSILON`. The result takes the
    /// weight tree's kind.
    pub fn matmul(&self, weights: &TensorTree) -> Result<TensorTree, TreeError> {
        let tensor = self.tensor.matmul(&weights.tensor)?;
        let columns = weights.width();
        let mut children: Vec<Option<Arc<TensorTree>>> = vec![None; columns];

        if let (TreeKind::Prod, Some(links)) = (self.kind, weights.links.as_ref()) {
            for (i, child) in self.children.iter().enumerate() {
                let Some(child) = child else { continue };
                for (j, slot) in children.iter_mut().enumerate() {
                    let w = weights.tensor.get(i, j).unwrap_or(0.0);
                    if !links.allows(i, j) || w.abs() < LINK_EPSILON {
                        continue;
                    }
                    let scaled = child.cmul(&Tensor::scalar(w))?;
                    let next = match slot.take() {
                        None => scaled,
                        Some(acc) => acc.add(&scaled)?,
                    };
                    *slot = Some(Arc::new(next));
                }
            }
        }

        TensorTree::new(weights.kind, tensor, children)
    }

    /// Tree generalisation of a vector-matrix product.
    ///
    /// Multiplies the top layer by `other`, then multiplies this tree into
    /// every present child of `other` and folds each result's presence back
    /// as a column. The result follows `other`'s shape.
    pub fn tree_mul(&self, other: &TensorTree) -> Result<TensorTree, TreeError> {
        let base = self.matmul(other)?;
        let rows = base.rows();

        let mut columns = Vec::with_capacity(other.width());
        let mut children = Vec::with_capacity(other.width());
        for child in &other.children {
            match child {
                None => {
                    columns.push(Tensor::zeros(rows, 1));
                    children.push(None);
                }
                Some(c) => {
                    let multiplied = self.tree_mul(c)?;
                    columns.push(multiplied.presence());
                    children.push(Some(Arc::new(multiplied)));
                }
            }
        }

        let folded = TensorTree::new(other.kind, Tensor::from_columns(rows, &columns)?, children)?;
        base.add(&folded)
    }

    /// [`tree_mul`](Self::tree_mul) for trees that alternate Sum and Prod
    /// layers. Both trees must have the same kind; the layer below `other`
    /// is skipped and this tree is multiplied into the one after it.
    pub fn typed_tree_mul(&self, other: &TensorTree) -> Result<TensorTree, TreeError> {
        if self.kind != other.kind {
            return Err(TreeError::KindMismatch {
                expected: self.kind,
                got: other.kind,
            });
        }
        let base = self.matmul(other)?;
        let rows = self.rows();

        let mut outer_columns = Vec::with_capacity(other.width());
        let mut outer_children = Vec::with_capacity(other.width());
        for product in &other.children {
            let Some(product) = product else {
                outer_columns.push(Tensor::zeros(rows, 1));
                outer_children.push(None);
                continue;
            };

            let mut columns = Vec::with_capacity(product.width());
            let mut children = Vec::with_capacity(product.width());
            for inner in &product.children {
                match inner {
                    None => {
                        columns.push(Tensor::zeros(rows, 1));
                        children.push(None);
                    }
                    Some(inner) => {
                        let multiplied = self.typed_tree_mul(inner)?;
                        columns.push(multiplied.presence());
                        children.push(Some(Arc::new(multiplied)));
                    }
                }
            }

            let layer = TensorTree::new(
                self.kind.dual(),
                Tensor::from_columns(rows, &columns)?,
                children,
            )?;
            outer_columns.push(layer.presence());
            outer_children.push(Some(Arc::new(layer)));
        }

        let folded = TensorTree::new(
            self.kind,
            Tensor::from_columns(rows, &outer_columns)?,
            outer_children,
        )?;
        base.add(&folded)
    }

    /// Keep only the rows where `mask` is true, in every layer.
    pub fn select_rows(&self, mask: &[bool]) -> Result<TensorTree, TreeError> {
        self.try_map(&|_, t| t.select_rows(mask))
    }

    /// Keep a single row.
    pub fn select_row(&self, row: usize) -> Result<TensorTree, TreeError> {
        let mask: Vec<bool> = (0..self.rows()).map(|i| i == row).collect();
        self.select_rows(&mask)
    }

    /// Inverse of [`select_rows`](Self::select_rows): scatter rows back,
    /// zero-filling the rows where `mask` is false.
    pub fn expand_rows(&self, mask: &[bool]) -> Result<TensorTree, TreeError> {
        self.try_map(&|_, t| t.expand_rows(mask))
    }

    /// Number of columns [`flatten`](Self::flatten) produces.
    pub fn flat_width(&self) -> usize {
        self.children
            .iter()
            .map(|c| c.as_ref().map_or(1, |c| c.flat_width()))
            .sum()
    }

    /// Erase the structure into one `[rows, flat_width]` tensor, weighting
    /// every leaf by the product of the coefficients along its path.
    ///
    /// With `like`, columns where `like` has structure and `self` does not
    /// become zeros of the like-child's flat width, so trees of different
    /// sparsity flatten to the same layout.
    pub fn flatten(&self, like: Option<&TensorTree>) -> Result<Tensor, TreeError> {
        if let Some(like) = like {
            if like.width() != self.width() {
                return Err(TreeError::WidthMismatch {
                    expected: self.width(),
                    got: like.width(),
                });
            }
        }

        let rows = self.rows();
        let mut parts = Vec::with_capacity(self.width());
        for (pos, child) in self.children.iter().enumerate() {
            let like_child = like.and_then(|l| l.child(pos)).map(|c| &**c);
            let column = self.tensor.col(pos)?;
            let part = match (child, like_child) {
                (None, Some(lc)) => Tensor::zeros(rows, lc.flat_width()),
                (None, None) => column,
                (Some(c), lc) => c.cmul(&column)?.flatten(lc)?,
            };
            parts.push(part);
        }
        Tensor::concat_cols(rows, &parts)
    }

    /// Drop children whose column never exceeds `eps`, and zero the rows of
    /// the remaining children whose parent coefficient is below `eps`.
    pub fn prune(&self, eps: f32) -> Result<TensorTree, TreeError> {
        self.prune_with(eps, None)
    }

    fn prune_with(&self, eps: f32, multiplier: Option<&Tensor>) -> Result<TensorTree, TreeError> {
        let tensor = match multiplier {
            Some(m) => self.tensor.mul(m)?,
            None => self.tensor.clone(),
        };
        let mut children = Vec::with_capacity(self.width());
        for (pos, child) in self.children.iter().enumerate() {
            let Some(child) = child else {
                children.push(None);
                continue;
            };
            let keep = self.tensor.col(pos)?.map(|x| if x > eps { 1.0 } else { 0.0 });
            if !keep.any(|x| x > 0.0) {
                children.push(None);
                continue;
            }
            let next = match multiplier {
                Some(m) => m.mul(&keep)?,
                None => keep,
            };
            children.push(Some(Arc::new(child.prune_with(eps, Some(&next))?)));
        }
        Ok(TensorTree {
            kind: self.kind,
            tensor,
            children,
            links: self.links.clone(),
        })
    }

    /// Harden the tree: Sum layers become one-hot at their argmax, Prod
    /// layers become 1 where the value exceeds `eps` and 0 elsewhere.
    pub fn strict(&self, eps: f32) -> TensorTree {
        self.map_kinds(
            &|t| t.one_hot_argmax(),
            &|t| t.map(|x| if x > eps { 1.0 } else { 0.0 }),
        )
    }

    /// Apply the sum function to Sum layers and the prod function to Prod
    /// layers.
    pub fn apply_structured(&self, activation: &StructuredActivation) -> TensorTree {
        self.map_kinds(&|t| activation.sum(t), &|t| activation.prod(t))
    }

    fn map_kinds(
        &self,
        on_sum: &dyn Fn(&Tensor) -> Tensor,
        on_prod: &dyn Fn(&Tensor) -> Tensor,
    ) -> TensorTree {
        let tensor = match self.kind {
            TreeKind::Sum => on_sum(&self.tensor),
            TreeKind::Prod => on_prod(&self.tensor),
        };
        TensorTree {
            kind: self.kind,
            tensor,
            children: self
                .children
                .iter()
                .map(|c| c.as_ref().map(|c| Arc::new(c.map_kinds(on_sum, on_prod))))
                .collect(),
            links: self.links.clone(),
        }
    }

    /// Every layer tensor with the column path that reaches it.
    pub fn tensors(&self) -> Vec<(Vec<usize>, &Tensor)> {
        let mut out = Vec::new();
        self.collect_tensors(&mut Vec::new(), &mut out);
        out
    }

    fn collect_tensors<'a>(&'a self, path: &mut Vec<usize>, out: &mut Vec<(Vec<usize>, &'a Tensor)>) {
        out.push((path.clone(), &self.tensor));
        for (i, child) in self.children.iter().enumerate() {
            if let Some(child) = child {
                path.push(i);
                child.collect_tensors(path, out);
                path.pop();
            }
        }
    }

    /// Same structure and every tensor within `tol`.
    pub fn approx_eq(&self, other: &TensorTree, tol: f32) -> bool {
        self.kind == other.kind
            && self.tensor.approx_eq(&other.tensor, tol)
            && self.children.len() == other.children.len()
            && self
                .children
                .iter()
                .zip(other.children.iter())
                .all(|pair| match pair {
                    (None, None) => true,
                    (Some(a), Some(b)) => a.approx_eq(b, tol),
                    _ => false,
                })
    }
}

/// Concatenate same-typed trees along the row dimension.
///
/// Where some trees lack a child that another has, a neutral filler stands
/// in: `1/k` per column for a Sum branch of width `k`, `0.5` per column for a
/// Prod branch. An empty list stacks to [`TensorTree::empty`].
pub fn stack<T: AsRef<TensorTree>>(trees: &[T]) -> Result<TensorTree, TreeError> {
    let Some(first) = trees.first().map(AsRef::as_ref) else {
        return Ok(TensorTree::empty());
    };
    if trees.len() == 1 {
        return Ok(first.clone());
    }

    for tree in trees.iter().map(AsRef::as_ref) {
        if tree.kind != first.kind {
            return Err(TreeError::KindMismatch {
                expected: first.kind,
                got: tree.kind,
            });
        }
        if tree.width() != first.width() {
            return Err(TreeError::WidthMismatch {
                expected: first.width(),
                got: tree.width(),
            });
        }
    }

    let tensors: Vec<&Tensor> = trees.iter().map(|t| &t.as_ref().tensor).collect();
    let tensor = Tensor::concat_rows(&tensors)?;

    let mut children = Vec::with_capacity(first.width());
    for cur in 0..first.width() {
        let column: Vec<Option<&Arc<TensorTree>>> =
            trees.iter().map(|t| t.as_ref().child(cur)).collect();
        let Some(template) = column.iter().flatten().next() else {
            children.push(None);
            continue;
        };

        let width = template.width();
        let filler_value = match template.kind {
            TreeKind::Sum => 1.0 / width as f32,
            TreeKind::Prod => 0.5,
        };
        let parts: Vec<TensorTree> = column
            .iter()
            .zip(trees.iter())
            .map(|(child, owner)| match child {
                Some(c) => TensorTree::clone(c),
                None => TensorTree::leaf(
                    template.kind,
                    Tensor::full(owner.as_ref().rows(), width, filler_value),
                ),
            })
            .collect();
        children.push(Some(Arc::new(stack(&parts)?)));
    }

    TensorTree::new(first.kind, tensor, children)
}

/// Wrap already-built trees into a tuple: a `[rows, 1]` Sum of ones over a
/// Prod layer whose columns are the operands' presences.
pub fn make_tuple(operands: Vec<Arc<TensorTree>>) -> Result<TensorTree, TreeError> {
    let Some(first) = operands.first() else {
        return Ok(TensorTree::empty());
    };
    let rows = first.rows();
    let presences: Vec<Tensor> = operands.iter().map(|t| t.presence()).collect();
    let tensor = Tensor::from_columns(rows, &presences)?;
    let product = TensorTree::prod(tensor, operands.into_iter().map(Some).collect())?;
    TensorTree::sum(Tensor::ones(rows, 1), vec![Some(Arc::new(product))])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TOLERANCE;

    fn sum_leaf(rows: &[&[f32]]) -> TensorTree {
        let rows: Vec<Vec<f32>> = rows.iter().map(|r| r.to_vec()).collect();
        TensorTree::leaf(TreeKind::Sum, Tensor::from_rows(&rows).unwrap())
    }

    fn prod_leaf(rows: &[&[f32]]) -> TensorTree {
        let rows: Vec<Vec<f32>> = rows.iter().map(|r| r.to_vec()).collect();
        TensorTree::leaf(TreeKind::Prod, Tensor::from_rows(&rows).unwrap())
    }

    #[test]
    fn test_width_invariant() {
        let err = TensorTree::sum(Tensor::zeros(1, 2), vec![None]).unwrap_err();
        assert_eq!(err, TreeError::WidthMismatch { expected: 2, got: 1 });
    }

    #[test]
    fn test_presence_composition() {
        let s = sum_leaf(&[&[0.2, 0.3], &[0.5, 0.5]]);
        let p = prod_leaf(&[&[0.2, 0.3], &[0.5, 0.5]]);
        assert!(s.presence().approx_eq(&Tensor::column(vec![0.5, 1.0]), TOLERANCE));
        assert!(p.presence().approx_eq(&Tensor::column(vec![0.06, 0.25]), TOLERANCE));
    }

    #[test]
    fn test_cmul_reaches_children() {
        let inner = Arc::new(prod_leaf(&[&[1.0], &[2.0]]));
        let tree = TensorTree::sum(
            Tensor::from_rows(&[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap(),
            vec![None, Some(inner)],
        )
        .unwrap();
        let scaled = tree.cmul(&Tensor::column(vec![2.0, 3.0])).unwrap();
        assert_eq!(scaled.tensor().data(), &[2.0, 0.0, 0.0, 3.0]);
        assert_eq!(scaled.child(1).unwrap().tensor().data(), &[2.0, 6.0]);
        assert!(scaled.child(0).is_none());
    }

    #[test]
    fn test_add_absent_child_uses_other_coefficient() {
        let inner = Arc::new(prod_leaf(&[&[0.5]]));
        let with_child = TensorTree::sum(Tensor::row(vec![0.1, 0.9]), vec![None, Some(inner)]).unwrap();
        let bare = sum_leaf(&[&[0.3, 0.2]]);

        let a = with_child.add(&bare).unwrap();
        let b = bare.add(&with_child).unwrap();
        assert!(a.approx_eq(&b, TOLERANCE));
        // present child kept, shifted by the bare tree's column coefficient
        let child = a.child(1).unwrap();
        assert!(child.tensor().approx_eq(&Tensor::scalar(0.7), TOLERANCE));
        assert!(a.child(0).is_none());
    }

    #[test]
    fn test_kind_mismatch_is_fatal() {
        let s = sum_leaf(&[&[1.0]]);
        let p = prod_leaf(&[&[1.0]]);
        assert!(matches!(s.add(&p), Err(TreeError::KindMismatch { .. })));
        let wide = sum_leaf(&[&[1.0, 2.0]]);
        assert!(matches!(s.mul(&wide), Err(TreeError::WidthMismatch { .. })));
    }

    #[test]
    fn test_matmul_follows_links() {
        let a = Arc::new(sum_leaf(&[&[1.0, 0.0]]));
        let b = Arc::new(sum_leaf(&[&[0.0, 1.0]]));
        let source = TensorTree::prod(Tensor::row(vec![1.0, 1.0]), vec![Some(a), Some(b)]).unwrap();

        let mut links = LinkMask::new(2, 2);
        links.allow(0, 0);
        links.allow(1, 0);
        links.allow(1, 1);
        let weights = TensorTree::leaf(
            TreeKind::Prod,
            Tensor::from_rows(&[vec![0.5, 0.0], vec![0.5, 0.0001]]).unwrap(),
        )
        .with_links(links)
        .unwrap();

        let out = source.matmul(&weights).unwrap();
        assert_eq!(out.kind(), TreeKind::Prod);
        assert!(out.tensor().approx_eq(&Tensor::row(vec![1.0, 0.0001]), TOLERANCE));
        // column 0 accumulates both children, column 1 is below the epsilon
        let merged = out.child(0).unwrap();
        assert!(merged.tensor().approx_eq(&Tensor::row(vec![0.5, 0.5]), TOLERANCE));
        assert!(out.child(1).is_none());
    }

    #[test]
    fn test_sum_source_matmul_drops_children() {
        let inner = Arc::new(prod_leaf(&[&[1.0]]));
        let source = TensorTree::sum(Tensor::row(vec![0.0, 1.0]), vec![None, Some(inner)]).unwrap();
        let weights = TensorTree::leaf(TreeKind::Sum, Tensor::ones(2, 2))
            .with_links(LinkMask::full(2, 2))
            .unwrap();
        let out = source.matmul(&weights).unwrap();
        assert!(out.children().iter().all(Option::is_none));
    }

    #[test]
    fn test_make_tuple_shares_operands() {
        let t = Arc::new(sum_leaf(&[&[0.25, 0.25], &[1.0, 0.0]]));
        let tuple = make_tuple(vec![t.clone()]).unwrap();
        assert_eq!(tuple.kind(), TreeKind::Sum);
        assert_eq!(tuple.tensor(), &Tensor::ones(2, 1));
        let product = tuple.child(0).unwrap();
        assert!(Arc::ptr_eq(product.child(0).unwrap(), &t));
        assert!(product.tensor().approx_eq(&Tensor::column(vec![0.5, 1.0]), TOLERANCE));
        assert_eq!(make_tuple(vec![]).unwrap(), TensorTree::empty());
    }

    #[test]
    fn test_stack_fillers() {
        let sum_child = Arc::new(sum_leaf(&[&[1.0, 0.0, 0.0]]));
        let prod_child = Arc::new(prod_leaf(&[&[0.9, 0.8]]));
        let full = TensorTree::prod(Tensor::row(vec![1.0, 1.0]), vec![Some(sum_child), Some(prod_child)])
            .unwrap();
        let bare = prod_leaf(&[&[0.3, 0.4], &[0.5, 0.6]]);

        let stacked = stack(&[full, bare]).unwrap();
        assert_eq!(stacked.rows(), 3);
        let s = stacked.child(0).unwrap();
        assert!(s.tensor().approx_eq(
            &Tensor::from_rows(&[vec![1.0, 0.0, 0.0], vec![1.0 / 3.0; 3], vec![1.0 / 3.0; 3]]).unwrap(),
            TOLERANCE
        ));
        let p = stacked.child(1).unwrap();
        assert!(p.tensor().approx_eq(
            &Tensor::from_rows(&[vec![0.9, 0.8], vec![0.5, 0.5], vec![0.5, 0.5]]).unwrap(),
            TOLERANCE
        ));

        assert_eq!(stack::<TensorTree>(&[]).unwrap(), TensorTree::empty());
    }

    #[test]
    fn test_flatten_weights_paths() {
        let inner = Arc::new(sum_leaf(&[&[0.5, 0.5]]));
        let tree = TensorTree::sum(Tensor::row(vec![0.2, 0.8]), vec![None, Some(inner)]).unwrap();
        assert_eq!(tree.flat_width(), 3);
        let flat = tree.flatten(None).unwrap();
        assert!(flat.approx_eq(&Tensor::row(vec![0.2, 0.4, 0.4]), TOLERANCE));

        // a bare tree flattened like the structured one is padded with zeros
        let bare = sum_leaf(&[&[0.2, 0.8]]);
        let padded = bare.flatten(Some(&tree)).unwrap();
        assert!(padded.approx_eq(&Tensor::row(vec![0.2, 0.0, 0.0]), TOLERANCE));
    }

    #[test]
    fn test_prune_and_strict() {
        let inner = Arc::new(sum_leaf(&[&[0.4, 0.6], &[0.7, 0.3]]));
        let dead = Arc::new(sum_leaf(&[&[1.0], &[1.0]]));
        let tree = TensorTree::sum(
            Tensor::from_rows(&[vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 1.0]]).unwrap(),
            vec![Some(dead), Some(inner), None],
        )
        .unwrap();

        let pruned = tree.prune(1e-3).unwrap();
        assert!(pruned.child(0).is_none());
        let kept = pruned.child(1).unwrap();
        assert!(kept.tensor().approx_eq(
            &Tensor::from_rows(&[vec![0.4, 0.6], vec![0.0, 0.0]]).unwrap(),
            TOLERANCE
        ));

        let hard = tree.strict(0.5);
        assert_eq!(hard.child(1).unwrap().tensor().data(), &[0.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_select_and_expand_rows() {
        let tree = sum_leaf(&[&[1.0, 0.0], &[0.0, 1.0], &[0.5, 0.5]]);
        let mask = [false, true, true];
        let selected = tree.select_rows(&mask).unwrap();
        assert_eq!(selected.rows(), 2);
        let restored = selected.expand_rows(&mask).unwrap();
        assert_eq!(restored.tensor().data(), &[0.0, 0.0, 0.0, 1.0, 0.5, 0.5]);
        assert_eq!(tree.select_row(0).unwrap().tensor().data(), &[1.0, 0.0]);
    }
}
