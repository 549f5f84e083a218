//! # vole-core
//!
//! The type-compatibility and value-coercion layer of Vole's symbolic graph.
//!
//! This crate provides:
//! - [`TensorType`] — dtype + broadcast-pattern descriptor of a symbolic
//!   tensor, with subtyping, variable conversion, and value filtering
//! - [`Variable`] — symbolic graph variable (leaf, constant, or retyped view)
//! - [`Value`] — concrete n-dimensional array value with shared storage
//! - [`DType`] / [`WithDType`] — element types and their Rust-type bridge
//! - [`Shape`] / [`Layout`] — dimension sizes, strides, and memory layout
//! - [`config`] — process defaults (the `float_x` default float dtype)

pub mod config;
pub mod dtype;
pub mod error;
pub mod layout;
pub mod shape;
pub mod ttype;
pub mod value;
pub mod variable;

pub use dtype::{DType, WithDType};
pub use error::{Error, Result};
pub use layout::Layout;
pub use shape::Shape;
pub use ttype::{FilterInput, TensorType, APPROX_ATOL, APPROX_RTOL};
pub use value::{Scalar, Storage, Value};
pub use variable::{Origin, VarId, Variable};
