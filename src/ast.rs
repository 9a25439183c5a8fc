//! Syntax tree for condition strings and projection lists.
//!
//! These types are data-only: names are still unresolved text. They are
//! produced by `parser::parse_condition` / `parser::parse_projection` and
//! bound against a schema by `predicate::Predicate::bind`.
//!
//! # Examples
//! ```
//! use minirel::ast::{ComparisonOp, Condition, Term};
//! use minirel::parser::parse_condition;
//!
//! let condition = parse_condition("age >= 30").unwrap();
//! assert_eq!(
//!     condition,
//!     Condition::Compare {
//!         left: Term::Word("age".into()),
//!         op: ComparisonOp::GtEq,
//!         right: Term::Word("30".into()),
//!     }
//! );
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Binary comparison operators accepted in conditions.
pub enum ComparisonOp {
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `=` (also spelled `==`)
    Eq,
    /// `>=`
    GtEq,
    /// `>`
    Gt,
}

impl ComparisonOp {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "<" => Some(ComparisonOp::Lt),
            "<=" => Some(ComparisonOp::LtEq),
            "=" | "==" => Some(ComparisonOp::Eq),
            ">=" => Some(ComparisonOp::GtEq),
            ">" => Some(ComparisonOp::Gt),
            _ => None,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            ComparisonOp::Lt => "<",
            ComparisonOp::LtEq => "<=",
            ComparisonOp::Eq => "=",
            ComparisonOp::GtEq => ">=",
            ComparisonOp::Gt => ">",
        }
    }

    /// The operator that keeps the comparison true when its operands swap sides.
    pub fn mirrored(self) -> Self {
        match self {
            ComparisonOp::Lt => ComparisonOp::Gt,
            ComparisonOp::LtEq => ComparisonOp::GtEq,
            ComparisonOp::Eq => ComparisonOp::Eq,
            ComparisonOp::GtEq => ComparisonOp::LtEq,
            ComparisonOp::Gt => ComparisonOp::Lt,
        }
    }

    pub fn matches(self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering;
        match self {
            ComparisonOp::Lt => ordering == Ordering::Less,
            ComparisonOp::LtEq => ordering != Ordering::Greater,
            ComparisonOp::Eq => ordering == Ordering::Equal,
            ComparisonOp::GtEq => ordering != Ordering::Less,
            ComparisonOp::Gt => ordering == Ordering::Greater,
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One side of a comparison before it is resolved against a schema.
pub enum Term {
    /// Bare word: a column name, an aggregate expression such as `sum(x)`, or
    /// an unquoted literal.
    Word(String),
    /// Quoted string literal; never resolved as a column.
    Quoted(String),
}

impl Term {
    pub fn text(&self) -> &str {
        match self {
            Term::Word(text) | Term::Quoted(text) => text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Parsed condition string.
pub enum Condition {
    /// `left op right`; either side may be the column.
    Compare {
        /// Left operand.
        left: Term,
        /// Comparison operator.
        op: ComparisonOp,
        /// Right operand.
        right: Term,
    },
    /// `column IN (v1, v2, ...)`.
    In {
        /// Tested column.
        column: String,
        /// Raw member literals.
        values: Vec<Term>,
    },
    /// `column BETWEEN low AND high`, inclusive.
    Between {
        /// Tested column.
        column: String,
        /// Lower bound literal.
        low: Term,
        /// Upper bound literal.
        high: Term,
    },
    /// `column LIKE pattern` with `%` and `_` wildcards.
    Like {
        /// Tested column.
        column: String,
        /// Raw pattern text.
        pattern: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// Aggregate functions usable with a group-by.
pub enum AggregateFunc {
    Sum,
    Avg,
    Min,
    Max,
    Count,
}

impl AggregateFunc {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sum" => Some(AggregateFunc::Sum),
            "avg" => Some(AggregateFunc::Avg),
            "min" => Some(AggregateFunc::Min),
            "max" => Some(AggregateFunc::Max),
            "count" => Some(AggregateFunc::Count),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AggregateFunc::Sum => "sum",
            AggregateFunc::Avg => "avg",
            AggregateFunc::Min => "min",
            AggregateFunc::Max => "max",
            AggregateFunc::Count => "count",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Argument of an aggregate call.
pub enum AggregateArg {
    /// `*`, only meaningful for `count`.
    Star,
    /// Named column.
    Column(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// One entry of a projection list.
pub enum SelectItem {
    /// `*`
    Wildcard,
    /// Plain column reference.
    Column(String),
    /// `func(arg)`
    Aggregate {
        /// Aggregate function.
        func: AggregateFunc,
        /// Function argument.
        arg: AggregateArg,
    },
}

impl SelectItem {
    /// Column heading this item produces in a result table.
    pub fn output_name(&self) -> String {
        match self {
            SelectItem::Wildcard => "*".to_string(),
            SelectItem::Column(name) => name.clone(),
            SelectItem::Aggregate { func, arg } => aggregate_name(*func, arg),
        }
    }
}

pub(crate) fn aggregate_name(func: AggregateFunc, arg: &AggregateArg) -> String {
    match arg {
        AggregateArg::Star => format!("{}(*)", func.name()),
        AggregateArg::Column(column) => format!("{}({})", func.name(), column),
    }
}
