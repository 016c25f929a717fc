//! # Type Descriptor Tests
//!
//! Tests for the type layer:
//! - Sizes and widths of common ADTs
//! - Recursive unwrapping against a registry
//! - Serialization of descriptors

use std::collections::BTreeMap;

use structnet_core::{CoreError, TypeRegistry, TypeSpec};

fn list_of(elem: TypeSpec) -> TypeSpec {
    TypeSpec::recursive(
        "l",
        TypeSpec::Sum(vec![
            TypeSpec::Literal,
            TypeSpec::Product(vec![elem, TypeSpec::var("l")]),
        ]),
    )
}

// ============================================================================
// Size Tests
// ============================================================================

#[test]
fn test_tuple_size_counts_fields() {
    let t = TypeSpec::tuple(vec![TypeSpec::unit(), TypeSpec::unit(), TypeSpec::unit()]);
    assert_eq!(t.size().unwrap(), 3);
    assert_eq!(t.width().unwrap(), 1);
}

#[test]
fn test_sum_size_adds_alternatives() {
    let t = TypeSpec::Sum(vec![
        TypeSpec::Literal,
        TypeSpec::Literal,
        TypeSpec::Product(vec![TypeSpec::Literal, TypeSpec::Literal]),
    ]);
    assert_eq!(t.size().unwrap(), 4);
    assert_eq!(t.width().unwrap(), 3);
}

#[test]
fn test_unwrapped_list_is_sized() {
    let list = list_of(TypeSpec::unit());
    assert!(matches!(list.size(), Err(CoreError::Unsized { .. })));

    for depth in 1..5 {
        let unrolled = list.unwrap(depth);
        // one literal column plus a two-field cons cell
        assert_eq!(unrolled.size().unwrap(), 3);
    }
}

#[test]
fn test_empty_and_unit() {
    assert_eq!(TypeSpec::empty().size().unwrap(), 0);
    assert_eq!(TypeSpec::unit().size().unwrap(), 1);
    assert_eq!(TypeSpec::tuple(vec![]).size().unwrap(), 0);
}

// ============================================================================
// Registry Tests
// ============================================================================

#[test]
fn test_registry_resolves_generic_list() {
    let mut reg = TypeRegistry::new();
    reg.define("List", list_of(TypeSpec::var("a")));
    reg.define("Bool", TypeSpec::Sum(vec![TypeSpec::Literal, TypeSpec::Literal]));
    assert!(reg.validate().is_ok());

    let mut args = BTreeMap::new();
    args.insert("a".to_string(), TypeSpec::named("Bool"));
    let resolved = reg
        .resolve(&TypeSpec::Named {
            name: "List".to_string(),
            args,
        })
        .unwrap();

    assert_eq!(resolved, list_of(TypeSpec::named("Bool")));
    assert!(reg.is_recursive("List").unwrap());
    assert_eq!(reg.natural_depth("List").unwrap(), None);
    assert_eq!(reg.natural_depth("Bool").unwrap(), Some(1));
}

#[test]
fn test_registry_unknown_name() {
    let reg = TypeRegistry::new();
    assert!(matches!(
        reg.resolve(&TypeSpec::named("Nat")),
        Err(CoreError::UnknownType { .. })
    ));
    assert!(matches!(
        reg.is_recursive("Nat"),
        Err(CoreError::UnknownType { .. })
    ));
}

#[test]
fn test_reference_graph_edges() {
    let reg = TypeRegistry::new()
        .with_type("A", TypeSpec::tuple(vec![TypeSpec::named("B")]))
        .with_type("B", TypeSpec::unit());
    let (graph, index) = reg.reference_graph();
    assert_eq!(graph.node_count(), 2);
    assert!(graph.contains_edge(index["A"], index["B"]));
    assert!(!graph.contains_edge(index["B"], index["A"]));
}

// ============================================================================
// Serialization
// ============================================================================

#[test]
fn test_spec_json_preserves_structure() {
    let list = list_of(TypeSpec::named("Bool"));
    let json = serde_json::to_string(&list).unwrap();
    let back: TypeSpec = serde_json::from_str(&json).unwrap();
    assert_eq!(back, list);
    assert_eq!(back.to_string(), "μl.Sum(Lit, Prod(Bool, l))");
}
