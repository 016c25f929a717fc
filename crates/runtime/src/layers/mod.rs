//! # Layers
//!
//! The building blocks of a program graph. Control layers compose other
//! networks; leaf layers synthesize values.
//!
//! | Layer | Role |
//! |-------|------|
//! | [`Variable`] | read a data slot or a net from the scope |
//! | [`ApplicationLayer`] | evaluate operands and call the first one with the rest |
//! | [`GuardedLayer`] | pattern-matched dispatch over [`Case`]s |
//! | [`RecursiveLayer`] | self reference with a depth bound, general or tail |
//! | [`AnonymousLayer`] | a network that remembers the scope it was declared in |
//! | [`ConstantLayer`], [`ConstructorLayer`], [`ZeroLayer`] | structural leaf values |

mod anonymous;
mod application;
mod constant;
mod guarded;
mod recursive;
mod variable;

pub use anonymous::AnonymousLayer;
pub use application::{ApplicationLayer, Operand};
pub use constant::{ConstantLayer, ConstructorLayer, ZeroLayer};
pub use guarded::{Case, GuardedLayer, DEFAULT_GUARD_THRESHOLD};
pub use recursive::{
    RecursionMode, RecursiveLayer, DEFAULT_RECURSION_DEPTH, DEFAULT_TAIL_RECURSION_DEPTH,
};
pub use variable::Variable;
