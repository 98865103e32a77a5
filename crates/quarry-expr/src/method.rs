//! Method identities for call nodes.

use serde::{Deserialize, Serialize};

/// Query operators. Always called statically with the source as the first
/// argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryMethod {
    Where,
    Select,
    OrderBy,
    OrderByDescending,
    ThenBy,
    ThenByDescending,
    Take,
    Skip,
    Distinct,
    /// `Join(outer, inner, outer_key, inner_key, result)`.
    Join,
    /// Same shape as `Join`, keeping outer elements without a match.
    LeftJoin,
    /// `Include(source, e => e.Navigation)`.
    Include,
    First,
    FirstOrDefault,
    Single,
    SingleOrDefault,
    Any,
    All,
    Count,
    Sum,
    Min,
    Max,
    Average,
}

impl QueryMethod {
    /// Check if this operator produces a sequence.
    pub fn returns_sequence(&self) -> bool {
        matches!(
            self,
            QueryMethod::Where
                | QueryMethod::Select
                | QueryMethod::OrderBy
                | QueryMethod::OrderByDescending
                | QueryMethod::ThenBy
                | QueryMethod::ThenByDescending
                | QueryMethod::Take
                | QueryMethod::Skip
                | QueryMethod::Distinct
                | QueryMethod::Join
                | QueryMethod::LeftJoin
                | QueryMethod::Include
        )
    }

    /// Check if this operator returns a single element of the sequence.
    pub fn returns_element(&self) -> bool {
        matches!(
            self,
            QueryMethod::First
                | QueryMethod::FirstOrDefault
                | QueryMethod::Single
                | QueryMethod::SingleOrDefault
        )
    }

    /// Check if this operator reduces the sequence to a scalar.
    pub fn is_aggregate(&self) -> bool {
        matches!(
            self,
            QueryMethod::Any
                | QueryMethod::All
                | QueryMethod::Count
                | QueryMethod::Sum
                | QueryMethod::Min
                | QueryMethod::Max
                | QueryMethod::Average
        )
    }

    /// Check if the optional second argument of this operator is a
    /// predicate (`First(src, pred)`, `Count(src, pred)`, ...).
    pub fn takes_predicate(&self) -> bool {
        matches!(
            self,
            QueryMethod::First
                | QueryMethod::FirstOrDefault
                | QueryMethod::Single
                | QueryMethod::SingleOrDefault
                | QueryMethod::Any
                | QueryMethod::Count
        )
    }

    /// Operator name as written in a query.
    pub fn name(&self) -> &'static str {
        match self {
            QueryMethod::Where => "Where",
            QueryMethod::Select => "Select",
            QueryMethod::OrderBy => "OrderBy",
            QueryMethod::OrderByDescending => "OrderByDescending",
            QueryMethod::ThenBy => "ThenBy",
            QueryMethod::ThenByDescending => "ThenByDescending",
            QueryMethod::Take => "Take",
            QueryMethod::Skip => "Skip",
            QueryMethod::Distinct => "Distinct",
            QueryMethod::Join => "Join",
            QueryMethod::LeftJoin => "LeftJoin",
            QueryMethod::Include => "Include",
            QueryMethod::First => "First",
            QueryMethod::FirstOrDefault => "FirstOrDefault",
            QueryMethod::Single => "Single",
            QueryMethod::SingleOrDefault => "SingleOrDefault",
            QueryMethod::Any => "Any",
            QueryMethod::All => "All",
            QueryMethod::Count => "Count",
            QueryMethod::Sum => "Sum",
            QueryMethod::Min => "Min",
            QueryMethod::Max => "Max",
            QueryMethod::Average => "Average",
        }
    }
}

/// Date parts extractable from a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatePart {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

impl DatePart {
    /// Resolve a member name (`Year`, `Month`, ...) to a date part.
    pub fn from_member(name: &str) -> Option<Self> {
        match name {
            "Year" => Some(DatePart::Year),
            "Month" => Some(DatePart::Month),
            "Day" => Some(DatePart::Day),
            "Hour" => Some(DatePart::Hour),
            "Minute" => Some(DatePart::Minute),
            "Second" => Some(DatePart::Second),
            _ => None,
        }
    }
}

/// The identity of a called method.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    /// A query operator.
    Query(QueryMethod),
    /// `collection.Contains(item)`: target is the collection.
    Contains,
    /// `text.Contains(fragment)` on strings.
    StringContains,
    StartsWith,
    EndsWith,
    ToUpper,
    ToLower,
    Trim,
    /// Character length of a string.
    StringLength,
    /// Extract a part of a timestamp.
    DatePart(DatePart),
    /// `nullable.GetValueOrDefault(fallback)`.
    GetValueOrDefault,
    /// A host method with no known translation.
    Custom(String),
}

impl Method {
    /// The query operator, if this is one.
    pub fn query(&self) -> Option<QueryMethod> {
        match self {
            Method::Query(q) => Some(*q),
            _ => None,
        }
    }

    /// Method name as written in a query.
    pub fn name(&self) -> &str {
        match self {
            Method::Query(q) => q.name(),
            Method::Contains | Method::StringContains => "Contains",
            Method::StartsWith => "StartsWith",
            Method::EndsWith => "EndsWith",
            Method::ToUpper => "ToUpper",
            Method::ToLower => "ToLower",
            Method::Trim => "Trim",
            Method::StringLength => "Length",
            Method::DatePart(_) => "DatePart",
            Method::GetValueOrDefault => "GetValueOrDefault",
            Method::Custom(name) => name,
        }
    }
}

impl From<QueryMethod> for Method {
    fn from(q: QueryMethod) -> Self {
        Method::Query(q)
    }
}
