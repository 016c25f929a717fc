//! # Type Descriptors
//!
//! A [`TypeSpec`] describes the *shape* a tensor tree must have. It is never
//! executed; every other component consumes it to decide how many columns a
//! layer has and which columns carry further structure.
//!
//! ```text
//!   Nat = μn. Sum( Lit , Prod( n ) )
//!              zero    succ
//! ```
//!
//! Sum operands are mutually exclusive alternatives, product operands are
//! co-occurring fields. A literal is a constructor without arguments.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Descriptor of an algebraic data type.
///
/// Equality is structural with two twists: every [`TypeSpec::Literal`] is
/// equal to every other one, and a [`TypeSpec::Recursive`] is compared by
/// unwrapping one layer, so the name of the bound variable does not matter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TypeSpec {
    /// Sum of types (alternatives).
    Sum(Vec<TypeSpec>),
    /// Product of types (fields).
    Product(Vec<TypeSpec>),
    /// Constructor without arguments.
    Literal,
    /// Type variable, unsized until instantiated.
    Variable(String),
    /// Reference to a type from a [`TypeRegistry`](crate::TypeRegistry).
    Named {
        name: String,
        #[serde(default)]
        args: BTreeMap<String, TypeSpec>,
    },
    /// Self-referential type; `body` mentions `Variable(name)`.
    Recursive { name: String, body: Box<TypeSpec> },
}

impl TypeSpec {
    /// The empty sum type, which has no values.
    pub fn empty() -> Self {
        TypeSpec::Sum(Vec::new())
    }

    /// The unit type: a sum with a single literal.
    pub fn unit() -> Self {
        TypeSpec::Sum(vec![TypeSpec::Literal])
    }

    /// A tuple: a product wrapped in a unary sum.
    pub fn tuple(types: Vec<TypeSpec>) -> Self {
        TypeSpec::Sum(vec![TypeSpec::Product(types)])
    }

    /// Reference a defined type without parameters.
    pub fn named(name: impl Into<String>) -> Self {
        TypeSpec::Named {
            name: name.into(),
            args: BTreeMap::new(),
        }
    }

    /// Create a variable.
    pub fn var(name: impl Into<String>) -> Self {
        TypeSpec::Variable(name.into())
    }

    /// Create a recursive type `μname.body`.
    pub fn recursive(name: impl Into<String>, body: TypeSpec) -> Self {
        TypeSpec::Recursive {
            name: name.into(),
            body: Box::new(body),
        }
    }

    /// Operands of a sum or product; empty for everything else.
    pub fn operands(&self) -> &[TypeSpec] {
        match self {
            TypeSpec::Sum(operands) | TypeSpec::Product(operands) => operands,
            _ => &[],
        }
    }

    pub fn is_sum(&self) -> bool {
        matches!(self, TypeSpec::Sum(_))
    }

    pub fn is_product(&self) -> bool {
        matches!(self, TypeSpec::Product(_))
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, TypeSpec::Literal)
    }

    /// Number of flat leaf columns: a sum adds its operands' sizes, a
    /// product counts its operands, a literal is 1.
    pub fn size(&self) -> Result<usize, CoreError> {
        match self {
            TypeSpec::Sum(operands) => operands.iter().map(TypeSpec::size).sum(),
            TypeSpec::Product(operands) => Ok(operands.len()),
            TypeSpec::Literal => Ok(1),
            _ => Err(CoreError::Unsized { spec: self.clone() }),
        }
    }

    /// Number of tensor columns in one tree layer of this type.
    pub fn width(&self) -> Result<usize, CoreError> {
        match self {
            TypeSpec::Sum(operands) | TypeSpec::Product(operands) => Ok(operands.len()),
            TypeSpec::Literal => Ok(1),
            _ => Err(CoreError::Unsized { spec: self.clone() }),
        }
    }

    /// Expand a recursive definition `depth` times.
    ///
    /// Depth 0 is the empty sum type; depth `n` substitutes the depth `n - 1`
    /// expansion for the bound variable. Non-recursive types are returned
    /// unchanged.
    pub fn unwrap(&self, depth: usize) -> TypeSpec {
        match self {
            TypeSpec::Recursive { name, body } => {
                let mut current = TypeSpec::empty();
                for _ in 0..depth {
                    current = body.substitute(name, &current);
                }
                current
            }
            other => other.clone(),
        }
    }

    /// Names of the variables not bound by an enclosing recursive type.
    pub fn free_variables(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_free(&mut Vec::new(), &mut out);
        out
    }

    fn collect_free<'a>(&'a self, bound: &mut Vec<&'a str>, out: &mut BTreeSet<String>) {
        match self {
            TypeSpec::Sum(operands) | TypeSpec::Product(operands) => {
                for operand in operands {
                    operand.collect_free(bound, out);
                }
            }
            TypeSpec::Literal => {}
            TypeSpec::Variable(name) => {
                if !bound.contains(&name.as_str()) {
                    out.insert(name.clone());
                }
            }
            TypeSpec::Named { args, .. } => {
                for arg in args.values() {
                    arg.collect_free(bound, out);
                }
            }
            TypeSpec::Recursive { name, body } => {
                bound.push(name);
                body.collect_free(bound, out);
                bound.pop();
            }
        }
    }

    /// Replace free occurrences of `Variable(name)`.
    pub fn substitute(&self, name: &str, replacement: &TypeSpec) -> TypeSpec {
        let mut params = BTreeMap::new();
        params.insert(name.to_string(), replacement.clone());
        self.instantiate(&params)
    }

    /// Replace every free variable bound in `params`, simultaneously.
    ///
    /// A recursive type that rebinds one of the names shadows it inside its
    /// body.
    pub fn instantiate(&self, params: &BTreeMap<String, TypeSpec>) -> TypeSpec {
        if params.is_empty() {
            return self.clone();
        }
        match self {
            TypeSpec::Sum(operands) => {
                TypeSpec::Sum(operands.iter().map(|o| o.instantiate(params)).collect())
            }
            TypeSpec::Product(operands) => {
                TypeSpec::Product(operands.iter().map(|o| o.instantiate(params)).collect())
            }
            TypeSpec::Literal => TypeSpec::Literal,
            TypeSpec::Variable(name) => match params.get(name) {
                Some(bound) => bound.clone(),
                None => self.clone(),
            },
            TypeSpec::Named { name, args } => TypeSpec::Named {
                name: name.clone(),
                args: args
                    .iter()
                    .map(|(k, v)| (k.clone(), v.instantiate(params)))
                    .collect(),
            },
            TypeSpec::Recursive { name, body } => {
                let mut inner = params.clone();
                inner.remove(name);
                TypeSpec::Recursive {
                    name: name.clone(),
                    body: Box::new(body.instantiate(&inner)),
                }
            }
        }
    }
}

impl PartialEq for TypeSpec {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TypeSpec::Recursive { .. }, _) | (_, TypeSpec::Recursive { .. }) => {
                self.unwrap(1) == other.unwrap(1)
            }
            (TypeSpec::Sum(a), TypeSpec::Sum(b)) => a == b,
            (TypeSpec::Product(a), TypeSpec::Product(b)) => a == b,
            (TypeSpec::Literal, TypeSpec::Literal) => true,
            (TypeSpec::Variable(a), TypeSpec::Variable(b)) => a == b,
            (
                TypeSpec::Named { name: a, args: x },
                TypeSpec::Named { name: b, args: y },
            ) => a == b && x == y,
            _ => false,
        }
    }
}

fn write_operands(f: &mut fmt::Formatter<'_>, head: &str, operands: &[TypeSpec]) -> fmt::Result {
    write!(f, "{}(", head)?;
    for (i, operand) in operands.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", operand)?;
    }
    write!(f, ")")
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSpec::Sum(operands) => write_operands(f, "Sum", operands),
            TypeSpec::Product(operands) => write_operands(f, "Prod", operands),
            TypeSpec::Literal => write!(f, "Lit"),
            TypeSpec::Variable(name) => write!(f, "{}", name),
            TypeSpec::Named { name, args } if args.is_empty() => write!(f, "{}", name),
            TypeSpec::Named { name, args } => {
                write!(f, "({}", name)?;
                for (k, v) in args {
                    write!(f, " {}={}", k, v)?;
                }
                write!(f, ")")
            }
            TypeSpec::Recursive { name, body } => write!(f, "μ{}.{}", name, body),
        }
    }
}
