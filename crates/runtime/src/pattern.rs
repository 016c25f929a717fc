//! # Pattern Matching
//!
//! Patterns compute, per row, how strongly a tree matches a shape, and
//! extract the sub-trees bound by variables.
//!
//! | Pattern | Confidence | Extracted |
//! |---------|------------|-----------|
//! | `Literal(i)` | column `i` | nothing |
//! | `Variable` | 1 | the whole tree |
//! | `Constructor(i, ps)` | column `i` × product columns × operand confidences | operands' extractions in order |
//!
//! A constructor needs the child at its position. When that child (or a
//! field a non-variable operand looks into) is absent, the match fails
//! structurally and returns `None` before any arithmetic is done. A small
//! numeric confidence is still a match; thresholds are the caller's
//! business.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use structnet_tree::{Tensor, TensorTree, TreeKind};

use crate::error::RuntimeError;

/// A pattern over a Sum layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pattern {
    /// An argument-free constructor at the given column.
    Literal(usize),
    /// Binds the whole tree.
    Variable,
    /// A constructor at `position` whose fields match `operands`.
    Constructor {
        position: usize,
        operands: Vec<Pattern>,
    },
}

/// A successful match.
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    /// Per-row confidence, `[rows, 1]`.
    pub confidence: Tensor,
    /// Trees bound by variable patterns, left to right.
    pub extracted: Vec<Arc<TensorTree>>,
}

impl Pattern {
    pub fn constructor(position: usize, operands: Vec<Pattern>) -> Self {
        Pattern::Constructor { position, operands }
    }

    /// Number of trees a successful match extracts.
    pub fn arity(&self) -> usize {
        match self {
            Pattern::Literal(_) => 0,
            Pattern::Variable => 1,
            Pattern::Constructor { operands, .. } => operands.iter().map(Pattern::arity).sum(),
        }
    }

    /// Match against `tree`. `Ok(None)` means a structural mismatch.
    pub fn get_trees(&self, tree: &Arc<TensorTree>) -> Result<Option<Match>, RuntimeError> {
        match self {
            Pattern::Literal(position) => Ok(Some(Match {
                confidence: column(tree, *position)?,
                extracted: Vec::new(),
            })),
            Pattern::Variable => Ok(Some(Match {
                confidence: Tensor::ones(tree.rows(), 1),
                extracted: vec![tree.clone()],
            })),
            Pattern::Constructor { position, operands } => {
                check_position(tree, *position)?;
                let Some(product) = tree.child(*position) else {
                    return Ok(None);
                };
                let mut confidence = column(tree, *position)?;
                if product.kind() != TreeKind::Prod {
                    return Err(RuntimeError::PatternShape {
                        reason: format!("constructor child at {} is not a product", position),
                    });
                }
                if operands.len() != product.width() {
                    return Err(RuntimeError::PatternShape {
                        reason: format!(
                            "{} operand patterns for a product of width {}",
                            operands.len(),
                            product.width()
                        ),
                    });
                }

                let mut extracted = Vec::with_capacity(self.arity());
                for (index, operand) in operands.iter().enumerate() {
                    let field = product.tensor().col(index)?;
                    let matched = match (product.child(index), operand) {
                        (Some(child), _) => operand.get_trees(child)?,
                        (None, Pattern::Variable) => {
                            let atomic = Arc::new(TensorTree::leaf(TreeKind::Sum, field.clone()));
                            Pattern::Variable.get_trees(&atomic)?
                        }
                        (None, _) => None,
                    };
                    let Some(matched) = matched else {
                        return Ok(None);
                    };
                    confidence = confidence.mul(&field)?.mul(&matched.confidence)?;
                    extracted.extend(matched.extracted);
                }
                Ok(Some(Match {
                    confidence,
                    extracted,
                }))
            }
        }
    }
}

fn check_position(tree: &TensorTree, position: usize) -> Result<(), RuntimeError> {
    if position >= tree.width() {
        return Err(RuntimeError::PatternPosition {
            position,
            width: tree.width(),
        });
    }
    Ok(())
}

fn column(tree: &TensorTree, position: usize) -> Result<Tensor, RuntimeError> {
    check_position(tree, position)?;
    Ok(tree.tensor().col(position)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use structnet_tree::TOLERANCE;

    fn zero() -> TensorTree {
        TensorTree::leaf(TreeKind::Sum, Tensor::row(vec![1.0, 0.0]))
    }

    fn succ(n: TensorTree) -> TensorTree {
        let presence = n.presence();
        let fields = TensorTree::prod(presence, vec![Some(Arc::new(n))]).unwrap();
        TensorTree::sum(Tensor::row(vec![0.0, 1.0]), vec![None, Some(Arc::new(fields))]).unwrap()
    }

    #[test]
    fn test_literal_reads_column() {
        let soft = Arc::new(TensorTree::leaf(TreeKind::Sum, Tensor::row(vec![0.3, 0.7])));
        let m = Pattern::Literal(1).get_trees(&soft).unwrap().unwrap();
        assert!(m.confidence.approx_eq(&Tensor::scalar(0.7), TOLERANCE));
        assert!(m.extracted.is_empty());

        assert_eq!(
            Pattern::Literal(2).get_trees(&soft).unwrap_err(),
            RuntimeError::PatternPosition { position: 2, width: 2 }
        );
    }

    #[test]
    fn test_variable_binds_whole_tree() {
        let t = Arc::new(zero());
        let m = Pattern::Variable.get_trees(&t).unwrap().unwrap();
        assert_eq!(m.confidence, Tensor::ones(1, 1));
        assert!(Arc::ptr_eq(&m.extracted[0], &t));
    }

    #[test]
    fn test_constructor_extracts_predecessor() {
        let one = Arc::new(succ(zero()));
        let p = Pattern::constructor(1, vec![Pattern::Variable]);
        let m = p.get_trees(&one).unwrap().unwrap();
        assert!(m.confidence.approx_eq(&Tensor::scalar(1.0), TOLERANCE));
        assert_eq!(m.extracted.len(), 1);
        assert_eq!(m.extracted[0].as_ref(), &zero());

        // nested: S (S _) does not fit one, S Z does
        let deeper = Pattern::constructor(1, vec![Pattern::constructor(1, vec![Pattern::Variable])]);
        assert!(deeper.get_trees(&one).unwrap().is_none());
        let s_z = Pattern::constructor(1, vec![Pattern::Literal(0)]);
        let m = s_z.get_trees(&one).unwrap().unwrap();
        assert!(m.confidence.approx_eq(&Tensor::scalar(1.0), TOLERANCE));
        assert!(m.extracted.is_empty());
    }

    #[test]
    fn test_absent_child_short_circuits() {
        // the first operand is absent; the second would raise if reached
        let fields = TensorTree::prod(Tensor::row(vec![1.0, 1.0]), vec![None, Some(Arc::new(zero()))]).unwrap();
        let tree = Arc::new(TensorTree::sum(Tensor::row(vec![1.0]), vec![Some(Arc::new(fields))]).unwrap());
        let p = Pattern::constructor(0, vec![Pattern::Literal(0), Pattern::Literal(99)]);
        assert_eq!(p.get_trees(&tree).unwrap(), None);

        let zero = Arc::new(zero());
        assert_eq!(Pattern::constructor(0, vec![]).get_trees(&zero).unwrap(), None);
    }

    #[test]
    fn test_variable_binds_atomic_field() {
        let fields = TensorTree::prod(Tensor::row(vec![0.8]), vec![None]).unwrap();
        let tree = Arc::new(TensorTree::sum(Tensor::row(vec![0.5]), vec![Some(Arc::new(fields))]).unwrap());
        let m = Pattern::constructor(0, vec![Pattern::Variable])
            .get_trees(&tree)
            .unwrap()
            .unwrap();
        assert!(m.confidence.approx_eq(&Tensor::scalar(0.4), TOLERANCE));
        assert_eq!(m.extracted[0].tensor(), &Tensor::scalar(0.8));
    }

    #[test]
    fn test_operand_count_must_match() {
        let one = Arc::new(succ(zero()));
        let p = Pattern::constructor(1, vec![Pattern::Variable, Pattern::Variable]);
        assert!(matches!(
            p.get_trees(&one),
            Err(RuntimeError::PatternShape { .. })
        ));
    }

    #[test]
    fn test_batched_confidence() {
        let two_rows = Arc::new(
            TensorTree::leaf(
                TreeKind::Sum,
                Tensor::from_rows(&[vec![1.0, 0.0], vec![0.25, 0.75]]).unwrap(),
            ),
        );
        let m = Pattern::Literal(0).get_trees(&two_rows).unwrap().unwrap();
        assert!(m.confidence.approx_eq(&Tensor::column(vec![1.0, 0.25]), TOLERANCE));
        assert_eq!(Pattern::constructor(0, vec![Pattern::Variable]).arity(), 1);
    }
}
