//! SQL statement model, dialect serializer and parameterized commands.
//!
//! The compiler builds a [`SelectStatement`]; the [`Serializer`] renders it
//! once per plan into a [`CommandTemplate`]; each execution binds the
//! parameter values into a concrete [`Command`].

mod command;
mod serializer;
mod statement;

pub use command::{Command, CommandTemplate, Segment};
pub use serializer::Serializer;
pub use statement::{
    Join, JoinKind, OrderItem, SelectItem, SelectStatement, SqlExpr, SqlFunction, SqlOp,
    TableSource,
};
