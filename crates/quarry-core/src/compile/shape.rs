//! Result shapes.

use std::fmt;

use quarry_expr::{QueryMethod, Type};

/// Element operator at the top of a single-result query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SingleKind {
    First,
    FirstOrDefault,
    Single,
    SingleOrDefault,
}

impl SingleKind {
    pub fn from_method(method: QueryMethod) -> Option<Self> {
        match method {
            QueryMethod::First => Some(SingleKind::First),
            QueryMethod::FirstOrDefault => Some(SingleKind::FirstOrDefault),
            QueryMethod::Single => Some(SingleKind::Single),
            QueryMethod::SingleOrDefault => Some(SingleKind::SingleOrDefault),
            _ => None,
        }
    }

    /// Check if an empty result yields null instead of an error.
    pub fn or_default(&self) -> bool {
        matches!(self, SingleKind::FirstOrDefault | SingleKind::SingleOrDefault)
    }

    /// Check if a second row is an error.
    pub fn is_single(&self) -> bool {
        matches!(self, SingleKind::Single | SingleKind::SingleOrDefault)
    }

    /// Rows to fetch: one for `First`, two to detect a second for `Single`.
    pub fn row_limit(&self) -> i32 {
        if self.is_single() {
            2
        } else {
            1
        }
    }
}

/// How a compiled query's rows become a result.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultShape {
    /// A lazily materialized sequence, one element per row.
    Sequence,
    /// One element out of at most two rows.
    Single(SingleKind),
    /// A single scalar read with `execute_scalar`.
    Scalar(Type),
    /// Rows grouped by parent key to fill collection includes, read in
    /// full; `Some` when an element operator follows.
    Complex(Option<SingleKind>),
}

impl fmt::Display for ResultShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultShape::Sequence => write!(f, "sequence"),
            ResultShape::Single(kind) => write!(f, "single({kind:?})"),
            ResultShape::Scalar(ty) => write!(f, "scalar({ty:?})"),
            ResultShape::Complex(None) => write!(f, "complex"),
            ResultShape::Complex(Some(kind)) => write!(f, "complex({kind:?})"),
        }
    }
}
