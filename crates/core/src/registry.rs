//! # Type Registry
//!
//! The defined-types table. Leaf layers that synthesize values of a named ADT
//! (zero values, constants, operator weights) look the definition up here.
//!
//! ## Reference Graph
//!
//! Definitions refer to each other through [`TypeSpec::Named`]. The registry
//! views these references as a directed graph: an edge `A -> B` means the
//! definition of `A` mentions `B`. A type is recursive when it sits on a cycle
//! of that graph or its definition contains a `μ` binder.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::spec::TypeSpec;

/// Table of named type definitions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeRegistry {
    types: BTreeMap<String, TypeSpec>,
}

impl TypeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a definition.
    pub fn define(&mut self, name: impl Into<String>, spec: TypeSpec) {
        self.types.insert(name.into(), spec);
    }

    /// Builder-style [`define`](Self::define).
    pub fn with_type(mut self, name: impl Into<String>, spec: TypeSpec) -> Self {
        self.define(name, spec);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Look up a definition.
    pub fn get(&self, name: &str) -> Result<&TypeSpec, CoreError> {
        self.types.get(name).ok_or_else(|| CoreError::UnknownType {
            name: name.to_string(),
        })
    }

    /// Defined names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Replace a top-level [`TypeSpec::Named`] by its instantiated definition.
    ///
    /// Only the outermost reference is followed; nested references stay
    /// named so recursive definitions do not expand forever. Any other
    /// descriptor is returned unchanged.
    pub fn resolve(&self, spec: &TypeSpec) -> Result<TypeSpec, CoreError> {
        match spec {
            TypeSpec::Named { name, args } => {
                let definition = self.get(name)?;
                let resolved = definition.instantiate(args);
                if let Some(unbound) = resolved.free_variables().into_iter().next() {
                    return Err(CoreError::UnboundVariable { name: unbound });
                }
                Ok(resolved)
            }
            other => Ok(other.clone()),
        }
    }

    /// Check that every referenced name is defined.
    pub fn validate(&self) -> Result<(), CoreError> {
        for spec in self.types.values() {
            for name in references(spec) {
                if !self.contains(&name) {
                    return Err(CoreError::UnknownType { name });
                }
            }
        }
        Ok(())
    }

    /// Build the reference graph over the defined names.
    ///
    /// References to undefined names are skipped; use
    /// [`validate`](Self::validate) to reject them.
    pub fn reference_graph(&self) -> (DiGraph<String, ()>, HashMap<String, NodeIndex>) {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        for name in self.types.keys() {
            index.insert(name.clone(), graph.add_node(name.clone()));
        }
        for (name, spec) in &self.types {
            let from = index[name];
            for target in references(spec) {
                if let Some(&to) = index.get(&target) {
                    graph.add_edge(from, to, ());
                }
            }
        }
        (graph, index)
    }

    /// Whether values of `name` can nest without bound.
    pub fn is_recursive(&self, name: &str) -> Result<bool, CoreError> {
        let spec = self.get(name)?;
        if contains_binder(spec) {
            return Ok(true);
        }
        let (graph, index) = self.reference_graph();
        let node = index[name];
        if graph.contains_edge(node, node) {
            return Ok(true);
        }
        Ok(tarjan_scc(&graph)
            .iter()
            .any(|component| component.len() > 1 && component.contains(&node)))
    }

    /// Longest chain of named definitions reachable from `name`, counting
    /// `name` itself. `None` when a recursive type is reachable.
    pub fn natural_depth(&self, name: &str) -> Result<Option<usize>, CoreError> {
        self.get(name)?;
        let (graph, index) = self.reference_graph();

        let mut dfs = Dfs::new(&graph, index[name]);
        while let Some(node) = dfs.next(&graph) {
            if self.is_recursive(&graph[node])? {
                return Ok(None);
            }
        }

        let mut memo = HashMap::new();
        Ok(Some(self.depth_of(name, &mut memo)))
    }

    fn depth_of(&self, name: &str, memo: &mut HashMap<String, usize>) -> usize {
        if let Some(&depth) = memo.get(name) {
            return depth;
        }
        let below = self
            .types
            .get(name)
            .map(|spec| {
                references(spec)
                    .into_iter()
                    .filter(|target| self.contains(target))
                    .map(|target| self.depth_of(&target, memo))
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0);
        memo.insert(name.to_string(), below + 1);
        below + 1
    }
}

/// Names mentioned through [`TypeSpec::Named`] anywhere inside `spec`.
pub fn references(spec: &TypeSpec) -> BTreeSet<String> {
    fn walk(spec: &TypeSpec, out: &mut BTreeSet<String>) {
        match spec {
            TypeSpec::Sum(operands) | TypeSpec::Product(operands) => {
                operands.iter().for_each(|o| walk(o, out));
            }
            TypeSpec::Named { name, args } => {
                out.insert(name.clone());
                args.values().for_each(|a| walk(a, out));
            }
            TypeSpec::Recursive { body, .. } => walk(body, out),
            TypeSpec::Literal | TypeSpec::Variable(_) => {}
        }
    }
    let mut out = BTreeSet::new();
    walk(spec, &mut out);
    out
}

/// Whether `spec` contains a `μ` binder anywhere.
pub fn contains_binder(spec: &TypeSpec) -> bool {
    match spec {
        TypeSpec::Recursive { .. } => true,
        TypeSpec::Sum(operands) | TypeSpec::Product(operands) => {
            operands.iter().any(contains_binder)
        }
        TypeSpec::Named { args, .. } => args.values().any(contains_binder),
        TypeSpec::Literal | TypeSpec::Variable(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TypeRegistry {
        TypeRegistry::new()
            .with_type("Bool", TypeSpec::Sum(vec![TypeSpec::Literal, TypeSpec::Literal]))
            .with_type(
                "Pair",
                TypeSpec::tuple(vec![TypeSpec::named("Bool"), TypeSpec::named("Bool")]),
            )
            .with_type(
                "Nat",
                TypeSpec::Sum(vec![
                    TypeSpec::Literal,
                    TypeSpec::Product(vec![TypeSpec::named("Nat")]),
                ]),
            )
            .with_type(
                "Even",
                TypeSpec::Sum(vec![
                    TypeSpec::Literal,
                    TypeSpec::Product(vec![TypeSpec::named("Odd")]),
                ]),
            )
            .with_type(
                "Odd",
                TypeSpec::Sum(vec![TypeSpec::Product(vec![TypeSpec::named("Even")])]),
            )
    }

    #[test]
    fn test_unknown_type() {
        let err = registry().get("Tree").unwrap_err();
        assert_eq!(
            err,
            CoreError::UnknownType {
                name: "Tree".to_string()
            }
        );
    }

    #[test]
    fn test_recursion_detection() {
        let reg = registry();
        assert!(!reg.is_recursive("Bool").unwrap());
        assert!(!reg.is_recursive("Pair").unwrap());
        assert!(reg.is_recursive("Nat").unwrap());
        assert!(reg.is_recursive("Even").unwrap());
        assert!(reg.is_recursive("Odd").unwrap());
    }

    #[test]
    fn test_natural_depth() {
        let reg = registry();
        assert_eq!(reg.natural_depth("Bool").unwrap(), Some(1));
        assert_eq!(reg.natural_depth("Pair").unwrap(), Some(2));
        assert_eq!(reg.natural_depth("Nat").unwrap(), None);
    }

    #[test]
    fn test_validate_rejects_dangling_reference() {
        let mut reg = registry();
        assert!(reg.validate().is_ok());
        reg.define("Bad", TypeSpec::tuple(vec![TypeSpec::named("Missing")]));
        assert!(matches!(
            reg.validate(),
            Err(CoreError::UnknownType { name }) if name == "Missing"
        ));
    }

    #[test]
    fn test_resolve_instantiates_parameters() {
        let reg = TypeRegistry::new().with_type(
            "Maybe",
            TypeSpec::Sum(vec![
                TypeSpec::Literal,
                TypeSpec::Product(vec![TypeSpec::var("a")]),
            ]),
        );

        let mut args = BTreeMap::new();
        args.insert("a".to_string(), TypeSpec::unit());
        let resolved = reg
            .resolve(&TypeSpec::Named {
                name: "Maybe".to_string(),
                args,
            })
            .unwrap();
        assert_eq!(resolved.operands()[1].operands()[0], TypeSpec::unit());

        let err = reg.resolve(&TypeSpec::named("Maybe")).unwrap_err();
        assert_eq!(
            err,
            CoreError::UnboundVariable {
                name: "a".to_string()
            }
        );
    }
}
