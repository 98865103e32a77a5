//! Plan invocation against a command executor.
//!
//! A bound plan runs through exactly one of three shapes:
//!
//! - [`execute_scalar`] for aggregates and other single values,
//! - [`execute_enumerable`] for element-per-row results, read lazily
//!   through [`Rows`],
//! - [`execute_complex`] for grouped collection includes, read in full.
//!
//! Whatever the shape, the row reader is released as soon as reading stops,
//! including when a row fetch fails: the caller sees the error only after
//! the reader has been dropped.

use std::sync::Arc;

use quarry_expr::{ParameterValue, Type, Value};
use tracing::trace;

use crate::compile::{
    CompiledQuery, GroupingMaterializer, MaterializeContext, ResultMaterializer, ResultShape,
    SingleKind,
};
use crate::config::QueryOptions;
use crate::error::{Error, ExecutionError, Result};
use crate::identity::{IdentityResolver, TrackingState};
use crate::object::Object;
use crate::sql::Command;

/// One result row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row(Vec<Value>);

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_values(self) -> Vec<Value> {
        self.0
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

/// A forward-only cursor over a command's rows.
///
/// Holds whatever backend resources the command needs; dropping the reader
/// releases them.
pub trait RowReader {
    /// The next row, or `None` once the result is exhausted.
    fn read(&mut self) -> std::result::Result<Option<Row>, ExecutionError>;
}

/// The backend boundary.
pub trait CommandExecutor: Send + Sync {
    /// Run a command and open a reader over its rows.
    fn execute_reader<'a>(
        &'a self,
        command: &Command,
    ) -> std::result::Result<Box<dyn RowReader + 'a>, ExecutionError>;

    /// Run a command and return the first column of its first row.
    fn execute_scalar(&self, command: &Command) -> std::result::Result<Value, ExecutionError> {
        let mut reader = self.execute_reader(command)?;
        let row = reader.read()?;
        Ok(row
            .and_then(|row| row.into_values().into_iter().next())
            .unwrap_or(Value::Null))
    }
}

/// Per-invocation collaborators.
#[derive(Clone, Copy)]
pub struct ExecutionContext<'a> {
    pub executor: &'a dyn CommandExecutor,
    pub identity: &'a dyn IdentityResolver,
    pub options: QueryOptions,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(executor: &'a dyn CommandExecutor, identity: &'a dyn IdentityResolver) -> Self {
        Self {
            executor,
            identity,
            options: QueryOptions::default(),
        }
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn tracking(&self) -> TrackingState {
        TrackingState::from_flag(self.options.use_tracking)
    }
}

/// The result of executing a query.
pub enum QueryResult<'a> {
    /// A lazily read sequence.
    Sequence(Rows<'a>),
    /// A single element, scalar, or fully read complex result.
    Value(Object),
}

impl std::fmt::Debug for QueryResult<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryResult::Sequence(rows) => f.debug_tuple("Sequence").field(rows).finish(),
            QueryResult::Value(value) => f.debug_tuple("Value").field(value).finish(),
        }
    }
}

impl<'a> QueryResult<'a> {
    /// The value, if this is not a sequence.
    pub fn into_value(self) -> Option<Object> {
        match self {
            QueryResult::Value(value) => Some(value),
            QueryResult::Sequence(_) => None,
        }
    }

    /// The lazy rows, if this is a sequence.
    pub fn into_rows(self) -> Option<Rows<'a>> {
        match self {
            QueryResult::Sequence(rows) => Some(rows),
            QueryResult::Value(_) => None,
        }
    }

    /// Read the whole result as a list of elements. A single value becomes
    /// a one-element list and a list value is returned as is.
    pub fn into_objects(self) -> Result<Vec<Object>> {
        match self {
            QueryResult::Sequence(rows) => rows.collect(),
            QueryResult::Value(Object::List(items)) => Ok(items),
            QueryResult::Value(value) => Ok(vec![value]),
        }
    }
}

/// Lazily materialized rows.
///
/// Owns the reader until the result is exhausted, a row fails to read or
/// materialize, or the iterator is dropped.
pub struct Rows<'a> {
    reader: Option<Box<dyn RowReader + 'a>>,
    plan: Arc<CompiledQuery>,
    parameters: Vec<ParameterValue>,
    identity: &'a dyn IdentityResolver,
    tracking: TrackingState,
}

impl std::fmt::Debug for Rows<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rows")
            .field("open", &self.is_open())
            .field("shape", &self.plan.shape)
            .finish()
    }
}

impl Rows<'_> {
    /// Check if the reader is still held.
    pub fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    fn close(&mut self) {
        if self.reader.take().is_some() {
            trace!("row reader released");
        }
    }
}

impl Iterator for Rows<'_> {
    type Item = Result<Object>;

    fn next(&mut self) -> Option<Self::Item> {
        let reader = self.reader.as_mut()?;
        let row = match reader.read() {
            Ok(Some(row)) => row,
            Ok(None) => {
                self.close();
                return None;
            }
            Err(source) => {
                self.close();
                return Some(Err(Error::Execution(source)));
            }
        };
        let ResultMaterializer::Rows(materializer) = &self.plan.materializer else {
            self.close();
            return Some(Err(Error::Compile("plan does not read one element per row".into())));
        };
        let cx = MaterializeContext {
            parameters: &self.parameters,
            resolver: self.identity,
            tracking: self.tracking,
        };
        let object = materializer.materialize(&row, &cx);
        if object.is_err() {
            self.close();
        }
        Some(object)
    }
}

/// Invoke a single-value command.
///
/// A null from an aggregate whose type cannot be null (`Min`/`Max` over
/// an empty sequence) is [`Error::NoElements`].
pub fn execute_scalar(executor: &dyn CommandExecutor, command: &Command, ty: &Type) -> Result<Object> {
    let value = executor.execute_scalar(command).map_err(Error::Execution)?;
    if value.is_null() {
        return if ty.is_nullable() {
            Ok(Object::Null)
        } else {
            Err(Error::NoElements)
        };
    }
    let value = match ty.scalar() {
        Some(scalar) => value.clone().coerce(scalar).ok_or_else(|| {
            Error::InvalidData(format!("cannot read {value:?} as {}", scalar.name()))
        })?,
        None => value,
    };
    Ok(Object::Value(value))
}

/// Invoke a row-per-element command, returning the lazy rows.
pub fn execute_enumerable<'a>(
    executor: &'a dyn CommandExecutor,
    command: &Command,
    plan: Arc<CompiledQuery>,
    parameters: Vec<ParameterValue>,
    identity: &'a dyn IdentityResolver,
    tracking: TrackingState,
) -> Result<Rows<'a>> {
    let reader = executor.execute_reader(command).map_err(Error::Execution)?;
    Ok(Rows {
        reader: Some(reader),
        plan,
        parameters,
        identity,
        tracking,
    })
}

/// Invoke a grouped command, reading every row.
pub fn execute_complex(
    executor: &dyn CommandExecutor,
    command: &Command,
    grouping: &GroupingMaterializer,
    cx: &MaterializeContext<'_>,
) -> Result<Vec<Object>> {
    let mut reader = executor.execute_reader(command).map_err(Error::Execution)?;
    let rows = std::iter::from_fn(|| reader.read().map_err(Error::Execution).transpose());
    grouping.materialize_all(rows, cx)
}

/// Reduce a sequence to one element under `kind`'s rules.
pub fn single<I>(kind: SingleKind, items: I) -> Result<Object>
where
    I: IntoIterator<Item = Result<Object>>,
{
    let mut items = items.into_iter();
    let first = match items.next() {
        Some(first) => first?,
        None if kind.or_default() => return Ok(Object::Null),
        None => return Err(Error::NoElements),
    };
    if kind.is_single() {
        if let Some(second) = items.next() {
            second?;
            return Err(Error::MoreThanOneElement);
        }
    }
    Ok(first)
}

/// Run a bound plan through its shape.
pub(crate) fn run<'a>(
    plan: Arc<CompiledQuery>,
    command: &Command,
    parameters: Vec<ParameterValue>,
    context: &ExecutionContext<'a>,
) -> Result<QueryResult<'a>> {
    let tracking = context.tracking();
    match (&plan.shape, &plan.materializer) {
        (ResultShape::Scalar(ty), _) => {
            execute_scalar(context.executor, command, ty).map(QueryResult::Value)
        }
        (ResultShape::Sequence, _) => execute_enumerable(
            context.executor,
            command,
            plan.clone(),
            parameters,
            context.identity,
            tracking,
        )
        .map(QueryResult::Sequence),
        (ResultShape::Single(kind), _) => {
            let kind = *kind;
            let rows = execute_enumerable(
                context.executor,
                command,
                plan.clone(),
                parameters,
                context.identity,
                tracking,
            )?;
            single(kind, rows).map(QueryResult::Value)
        }
        (ResultShape::Complex(kind), ResultMaterializer::Grouped(grouping)) => {
            let cx = MaterializeContext {
                parameters: &parameters,
                resolver: context.identity,
                tracking,
            };
            let parents = execute_complex(context.executor, command, grouping, &cx)?;
            match kind {
                Some(kind) => single(*kind, parents.into_iter().map(Ok)).map(QueryResult::Value),
                None => Ok(QueryResult::Value(Object::List(parents))),
            }
        }
        (ResultShape::Complex(_), ResultMaterializer::Rows(_)) => Err(Error::Compile(
            "complex plan without a grouping materializer".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Scripted(Vec<std::result::Result<Row, &'static str>>);

    struct ScriptedReader(VecDeque<std::result::Result<Row, &'static str>>);

    impl RowReader for ScriptedReader {
        fn read(&mut self) -> std::result::Result<Option<Row>, ExecutionError> {
            match self.0.pop_front() {
                Some(Ok(row)) => Ok(Some(row)),
                Some(Err(message)) => Err(message.into()),
                None => Ok(None),
            }
        }
    }

    impl CommandExecutor for Scripted {
        fn execute_reader<'a>(
            &'a self,
            _command: &Command,
        ) -> std::result::Result<Box<dyn RowReader + 'a>, ExecutionError> {
            Ok(Box::new(ScriptedReader(self.0.iter().cloned().collect())))
        }
    }

    fn command() -> Command {
        Command {
            text: "SELECT 1".into(),
            parameters: vec![],
        }
    }

    fn ints(values: &[i32]) -> Vec<Result<Object>> {
        values.iter().map(|v| Ok(Object::Value(Value::Int32(*v)))).collect()
    }

    #[test]
    fn test_single_semantics() {
        assert!(matches!(single(SingleKind::First, ints(&[])), Err(Error::NoElements)));
        assert_eq!(single(SingleKind::FirstOrDefault, ints(&[])).unwrap(), Object::Null);
        assert_eq!(
            single(SingleKind::First, ints(&[1, 2])).unwrap(),
            Object::Value(Value::Int32(1))
        );
        assert!(matches!(
            single(SingleKind::SingleOrDefault, ints(&[1, 2])),
            Err(Error::MoreThanOneElement)
        ));
    }

    #[test]
    fn test_default_scalar_reads_first_column() {
        let executor = Scripted(vec![Ok(Row::new(vec![Value::Int64(3), Value::Int64(9)]))]);
        let value = execute_scalar(&executor, &command(), &Type::int32()).unwrap();
        assert_eq!(value, Object::Value(Value::Int32(3)));
    }

    #[test]
    fn test_null_non_nullable_scalar_is_no_elements() {
        let executor = Scripted(vec![Ok(Row::new(vec![Value::Null]))]);
        assert!(matches!(
            execute_scalar(&executor, &command(), &Type::int32()),
            Err(Error::NoElements)
        ));
        let executor = Scripted(vec![]);
        let value = execute_scalar(&executor, &command(), &Type::Nullable(quarry_expr::ScalarType::Float64));
        assert_eq!(value.unwrap(), Object::Null);
    }

    #[test]
    fn test_reader_error_keeps_original_source() {
        let executor = Scripted(vec![Err("connection reset")]);
        let err = execute_scalar(&executor, &command(), &Type::int32()).unwrap_err();
        assert_eq!(err.execution_source().unwrap().to_string(), "connection reset");
    }
}
