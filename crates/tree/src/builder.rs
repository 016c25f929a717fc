//! # Operator Builder
//!
//! Builds weight trees and operator trees whose shape follows a pair of
//! types, so that every operator is structurally compatible with the trees
//! it will be applied to.
//!
//! ## Depth
//!
//! Depths count *tree* layers. One layer of a type definition is two tree
//! layers: a Sum over the constructors and a Prod over each constructor's
//! fields. Recursive types are cut off when the depth runs out.
//!
//! ## Link Masks
//!
//! The default weights follow three rules:
//!
//! | Source | Destination | Allowed |
//! |--------|-------------|---------|
//! | Sum | Sum | literal destination columns (any value can produce a literal) |
//! | Prod | Prod | fields of equal type (a value can produce its own type), linked |
//! | Sum | Prod, or Prod to Sum | nothing |
//!
//! Only Sum-to-Sum and Prod-to-Prod layers are learnable.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use structnet_core::registry::{contains_binder, references};
use structnet_core::{CoreError, TypeRegistry, TypeSpec};

use crate::error::TreeError;
use crate::operator::OperatorTree;
use crate::tensor::Tensor;
use crate::tree::{LinkMask, TensorTree, TreeKind};

/// Type-parameter bindings in scope while building.
pub type Params = BTreeMap<String, TypeSpec>;

/// Recursive descriptors are unrolled at most this many times per layer.
const MAX_UNROLL: usize = 16;

/// What the tensor initialiser of one layer gets to see.
#[derive(Debug)]
pub struct LayerContext<'a> {
    /// Source layer (Sum or Product), one tensor row per operand
    pub from: &'a TypeSpec,
    /// Destination layer (Sum or Product), one tensor column per operand
    pub to: &'a TypeSpec,
    pub rows: usize,
    pub cols: usize,
    pub params: &'a Params,
}

/// Tensor and optional link mask for one weight layer.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerWeights {
    pub tensor: Tensor,
    pub links: Option<LinkMask>,
}

impl From<Tensor> for LayerWeights {
    fn from(tensor: Tensor) -> Self {
        Self {
            tensor,
            links: None,
        }
    }
}

/// Builds operator and weight trees through a [`TypeRegistry`].
#[derive(Debug, Clone, Copy)]
pub struct OperatorBuilder<'r> {
    registry: &'r TypeRegistry,
}

impl<'r> OperatorBuilder<'r> {
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &'r TypeRegistry {
        self.registry
    }

    /// Resolve variables, named references and binders until a Sum,
    /// Product or Literal layer (or an unbound variable) remains.
    pub fn layer(&self, spec: &TypeSpec, params: &Params) -> Result<(TypeSpec, Params), TreeError> {
        let mut current = spec.clone();
        let mut params = params.clone();
        for _ in 0..MAX_UNROLL {
            let next = match &current {
                TypeSpec::Variable(name) => {
                    match params.get(name).filter(|b| *b != &current).cloned() {
                        Some(bound) => bound,
                        None => return Ok((current.clone(), params)),
                    }
                }
                TypeSpec::Named { name, args } => {
                    let definition = self.registry.get(name)?.clone();
                    let bound: Params = args
                        .iter()
                        .map(|(k, v)| (k.clone(), v.instantiate(&params)))
                        .collect();
                    params.extend(bound);
                    definition
                }
                TypeSpec::Recursive { name, body } => body.substitute(name, &current),
                _ => return Ok((current.clone(), params)),
            };
            current = next;
        }
        Err(CoreError::Unsupported {
            spec: spec.clone(),
            reason: "does not unfold to a Sum or Product".to_string(),
        }
        .into())
    }

    fn structural(&self, spec: &TypeSpec, params: &Params) -> Result<(TypeSpec, Params), TreeError> {
        let (layer, params) = self.layer(spec, params)?;
        if layer.is_sum() || layer.is_product() {
            return Ok((layer, params));
        }
        Err(CoreError::Unsupported {
            spec: layer,
            reason: "a tree layer must be a Sum or Product".to_string(),
        }
        .into())
    }

    /// Next layer below operand `operand` of `parent`: `None` when the
    /// operand is atomic.
    fn descend(
        &self,
        parent: &TypeSpec,
        operand: &TypeSpec,
        params: &Params,
    ) -> Result<Option<(TypeSpec, Params)>, TreeError> {
        let (layer, next_params) = self.layer(operand, params)?;
        match (parent, &layer) {
            (_, TypeSpec::Literal) | (TypeSpec::Product(_), TypeSpec::Variable(_)) => return Ok(None),
            (TypeSpec::Sum(_), TypeSpec::Product(_)) | (TypeSpec::Product(_), TypeSpec::Sum(_)) => {}
            _ => {
                return Err(CoreError::Unsupported {
                    spec: layer.clone(),
                    reason: format!("cannot appear directly inside {}", parent),
                }
                .into())
            }
        }
        Ok(Some((layer, next_params)))
    }

    /// Build a tree shaped like `to`, with one tensor row per operand of
    /// `from` in every layer.
    pub fn build_tree<F>(
        &self,
        from: &TypeSpec,
        to: &TypeSpec,
        depth: usize,
        init: &mut F,
    ) -> Result<TensorTree, TreeError>
    where
        F: FnMut(&LayerContext<'_>) -> Result<LayerWeights, TreeError>,
    {
        let (from, from_params) = self.structural(from, &Params::new())?;
        self.tree_layer(&from, &from_params, to, &Params::new(), depth, init)
    }

    fn tree_layer<F>(
        &self,
        from: &TypeSpec,
        from_params: &Params,
        to: &TypeSpec,
        to_params: &Params,
        depth: usize,
        init: &mut F,
    ) -> Result<TensorTree, TreeError>
    where
        F: FnMut(&LayerContext<'_>) -> Result<LayerWeights, TreeError>,
    {
        let (to, to_params) = self.structural(to, to_params)?;
        let mut params = from_params.clone();
        params.extend(to_params.clone());

        let (rows, cols) = (from.operands().len(), to.operands().len());
        let weights = init(&LayerContext {
            from,
            to: &to,
            rows,
            cols,
            params: &params,
        })?;
        if weights.tensor.shape() != (rows, cols) {
            return Err(TreeError::ShapeMismatch {
                op: "build_tree",
                left: (rows, cols),
                right: weights.tensor.shape(),
            });
        }

        let kind = if to.is_sum() { TreeKind::Sum } else { TreeKind::Prod };
        let mut children = Vec::with_capacity(cols);
        for operand in to.operands() {
            let child = match depth {
                0 => None,
                _ => match self.descend(&to, operand, &to_params)? {
                    Some((next, next_params)) => Some(Arc::new(self.tree_layer(
                        from,
                        from_params,
                        &next,
                        &next_params,
                        depth - 1,
                        init,
                    )?)),
                    None => None,
                },
            };
            children.push(child);
        }

        let tree = TensorTree::new(kind, weights.tensor, children)?;
        match weights.links {
            Some(links) => tree.with_links(links),
            None => Ok(tree),
        }
    }

    /// Build an operator from `from`-shaped trees to `to`-shaped trees.
    pub fn build_operator<F>(
        &self,
        from: &TypeSpec,
        to: &TypeSpec,
        from_depth: usize,
        to_depth: usize,
        init: &mut F,
    ) -> Result<OperatorTree, TreeError>
    where
        F: FnMut(&LayerContext<'_>) -> Result<LayerWeights, TreeError>,
    {
        let (from, params) = self.structural(from, &Params::new())?;
        self.operator_layer(&from, &params, to, from_depth, to_depth, init)
    }

    fn operator_layer<F>(
        &self,
        from: &TypeSpec,
        params: &Params,
        to: &TypeSpec,
        from_depth: usize,
        to_depth: usize,
        init: &mut F,
    ) -> Result<OperatorTree, TreeError>
    where
        F: FnMut(&LayerContext<'_>) -> Result<LayerWeights, TreeError>,
    {
        let weight = self.tree_layer(from, params, to, &Params::new(), to_depth, init)?;

        let mut children = Vec::with_capacity(from.operands().len());
        for operand in from.operands() {
            let child = match from_depth {
                0 => None,
                _ => match self.descend(from, operand, params)? {
                    Some((next, next_params)) => Some(self.operator_layer(
                        &next,
                        &next_params,
                        to,
                        from_depth - 1,
                        to_depth,
                        init,
                    )?),
                    None => None,
                },
            };
            children.push(child);
        }
        Ok(OperatorTree::new(weight, children))
    }

    /// Default mask for one weight layer, see the module docs.
    pub fn link_mask(&self, ctx: &LayerContext<'_>) -> Result<LayerWeights, TreeError> {
        let mut mask = Tensor::zeros(ctx.rows, ctx.cols);
        match (ctx.from, ctx.to) {
            (TypeSpec::Sum(_), TypeSpec::Sum(to)) => {
                let literal: Vec<f32> = to
                    .iter()
                    .map(|o| if o.is_literal() { 1.0 } else { 0.0 })
                    .collect();
                mask = mask.add(&Tensor::row(literal))?;
                Ok(mask.into())
            }
            (TypeSpec::Product(from), TypeSpec::Product(to)) => {
                let from: Vec<TypeSpec> = from
                    .iter()
                    .map(|o| self.layer_name(o, ctx.params))
                    .collect::<Result<_, _>>()?;
                let to: Vec<TypeSpec> = to
                    .iter()
                    .map(|o| self.layer_name(o, ctx.params))
                    .collect::<Result<_, _>>()?;
                let links = LinkMask::from_fn(ctx.rows, ctx.cols, |i, j| from[i] == to[j]);
                let values: Vec<f32> = (0..ctx.rows * ctx.cols)
                    .map(|k| if links.allows(k / ctx.cols, k % ctx.cols) { 1.0 } else { 0.0 })
                    .collect();
                Ok(LayerWeights {
                    tensor: Tensor::from_vec(ctx.rows, ctx.cols, values)?,
                    links: Some(links),
                })
            }
            _ => Ok(mask.into()),
        }
    }

    /// Follow bound variables only; named references are compared by name.
    fn layer_name(&self, spec: &TypeSpec, params: &Params) -> Result<TypeSpec, TreeError> {
        let mut current = spec;
        for _ in 0..MAX_UNROLL {
            match current {
                TypeSpec::Variable(name) => match params.get(name) {
                    Some(bound) if bound != current => current = bound,
                    _ => return Ok(current.clone()),
                },
                other => return Ok(other.clone()),
            }
        }
        Err(CoreError::Unsupported {
            spec: spec.clone(),
            reason: "type variables are bound in a cycle".to_string(),
        }
        .into())
    }

    /// Random weights under the default masks. Layers are seeded
    /// `seed, seed + 1, ...` in build order.
    pub fn weights(
        &self,
        from: &TypeSpec,
        to: &TypeSpec,
        from_depth: usize,
        to_depth: usize,
        seed: u64,
    ) -> Result<OperatorTree, TreeError> {
        let mut layer_seed = seed;
        self.build_operator(from, to, from_depth, to_depth, &mut |ctx| {
            let mask = self.link_mask(ctx)?;
            let random = Tensor::randn_seeded(ctx.rows, ctx.cols, 1.0, layer_seed);
            layer_seed = layer_seed.wrapping_add(1);
            let learnable = ctx.from.is_sum() == ctx.to.is_sum();
            Ok(LayerWeights {
                tensor: random.mul(&mask.tensor)?.with_learnable(learnable),
                links: mask.links,
            })
        })
    }

    /// A learnable bias tree shaped like `to`, with a single row.
    pub fn bias(&self, to: &TypeSpec, depth: usize, seed: u64) -> Result<TensorTree, TreeError> {
        let mut layer_seed = seed;
        self.build_tree(&TypeSpec::unit(), to, depth, &mut |ctx| {
            let tensor = Tensor::randn_seeded(ctx.rows, ctx.cols, 1.0, layer_seed);
            layer_seed = layer_seed.wrapping_add(1);
            Ok(tensor.with_learnable(true).into())
        })
    }

    /// Tree layers needed to cover `spec` completely, or `recursive_layers`
    /// when a recursive type is reachable from it.
    pub fn layers_for(&self, spec: &TypeSpec, recursive_layers: usize) -> Result<usize, TreeError> {
        let mut names = BTreeSet::new();
        let body = match spec {
            TypeSpec::Named { name, args } => {
                for arg in args.values() {
                    names.extend(references(arg));
                }
                self.registry.get(name)?
            }
            other => other,
        };
        if contains_binder(body) {
            return Ok(recursive_layers);
        }
        names.extend(references(body));

        let mut deepest = 0;
        for name in &names {
            match self.registry.natural_depth(name)? {
                Some(depth) => deepest = deepest.max(depth),
                None => return Ok(recursive_layers),
            }
        }
        Ok(2 * deepest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TypeRegistry {
        TypeRegistry::new()
            .with_type("Bool", TypeSpec::Sum(vec![TypeSpec::Literal, TypeSpec::Literal]))
            .with_type(
                "Nat",
                TypeSpec::Sum(vec![
                    TypeSpec::Literal,
                    TypeSpec::Product(vec![TypeSpec::named("Nat")]),
                ]),
            )
    }

    #[test]
    fn test_tree_shape_follows_destination() {
        let reg = registry();
        let builder = OperatorBuilder::new(&reg);
        let tree = builder
            .build_tree(&TypeSpec::unit(), &TypeSpec::named("Nat"), 4, &mut |ctx| {
                Ok(Tensor::ones(ctx.rows, ctx.cols).into())
            })
            .unwrap();

        // Nat -> Prod -> Nat -> Prod -> Nat (cut)
        assert_eq!(tree.kind(), TreeKind::Sum);
        assert_eq!(tree.width(), 2);
        assert!(tree.child(0).is_none());
        let succ = tree.child(1).unwrap();
        assert_eq!(succ.kind(), TreeKind::Prod);
        let next = succ.child(0).unwrap().child(1).unwrap().child(0).unwrap();
        assert!(next.children().iter().all(Option::is_none));
    }

    #[test]
    fn test_prod_mask_links_equal_fields() {
        let reg = registry();
        let builder = OperatorBuilder::new(&reg);
        let from = TypeSpec::Product(vec![TypeSpec::named("Bool"), TypeSpec::named("Nat")]);
        let to = TypeSpec::Product(vec![TypeSpec::named("Nat")]);
        let params = Params::new();
        let ctx = LayerContext {
            from: &from,
            to: &to,
            rows: 2,
            cols: 1,
            params: &params,
        };
        let weights = builder.link_mask(&ctx).unwrap();
        assert_eq!(weights.tensor.data(), &[0.0, 1.0]);
        let links = weights.links.unwrap();
        assert!(!links.allows(0, 0));
        assert!(links.allows(1, 0));
    }

    #[test]
    fn test_unknown_type_is_reported() {
        let reg = registry();
        let builder = OperatorBuilder::new(&reg);
        let err = builder
            .weights(
                &TypeSpec::tuple(vec![TypeSpec::named("Tree")]),
                &TypeSpec::unit(),
                2,
                2,
                0,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            TreeError::Type(CoreError::UnknownType { name }) if name == "Tree"
        ));
    }

    #[test]
    fn test_layers_for() {
        let reg = registry();
        let builder = OperatorBuilder::new(&reg);
        assert_eq!(builder.layers_for(&TypeSpec::named("Bool"), 8).unwrap(), 0);
        assert_eq!(
            builder
                .layers_for(&TypeSpec::tuple(vec![TypeSpec::named("Bool")]), 8)
                .unwrap(),
            2
        );
        assert_eq!(builder.layers_for(&TypeSpec::named("Nat"), 8).unwrap(), 8);
    }
}
