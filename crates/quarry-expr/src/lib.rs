//! Quarry expression trees.
//!
//! This crate defines the node vocabulary that query expressions are built
//! from, independent of any model or backend.
//!
//! # Modules
//!
//! - [`value`] - Runtime scalar values and parameter values
//! - [`types`] - Static types carried by nodes
//! - [`method`] - Method identities for call nodes
//! - [`expr`] - The expression node enum and its payloads
//! - [`visit`] - Child walking and parameter substitution
//! - [`query`] - Fluent builder for query expressions
//! - [`json`] - JSON encoding
//! - [`error`] - Expression error types

pub mod error;
pub mod expr;
pub mod json;
pub mod method;
pub mod query;
pub mod types;
pub mod value;
pub mod visit;

pub use error::{Error, Result};
pub use expr::{BinaryOp, Constant, Expr, Lambda, Parameter, QueryRoot, UnaryOp};
pub use method::{DatePart, Method, QueryMethod};
pub use query::{fresh_parameter, Query};
pub use types::Type;
pub use value::{ParameterValue, ScalarType, Value};
