//! Binding of parsed conditions to a schema, and their evaluation on rows.
//!
//! Binding resolves bare words against column names, casts the literal side
//! of a comparison to the column's declared type and compiles LIKE patterns
//! once, so `evaluate` is a pure function of the row.

use crate::ast::{ComparisonOp, Condition, Term};
use crate::error::{EngineError, EngineResult};
use crate::parser::parse_condition;
use crate::storage::{Column, Table, Value};
use regex::Regex;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Column(usize),
    Literal(Value),
}

impl Operand {
    fn resolve<'a>(&'a self, row: &'a [Value]) -> &'a Value {
        match self {
            Operand::Column(idx) => &row[*idx],
            Operand::Literal(value) => value,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Predicate {
    /// Column-vs-literal conditions are normalised so the column is on the left.
    Compare {
        left: Operand,
        op: ComparisonOp,
        right: Operand,
    },
    In {
        column: usize,
        members: HashSet<String>,
    },
    Between {
        column: usize,
        low: String,
        high: String,
        numeric: Option<(f64, f64)>,
    },
    Like {
        column: usize,
        pattern: Regex,
    },
}

impl Predicate {
    pub fn parse(condition: &str, columns: &[Column]) -> EngineResult<Self> {
        let parsed = parse_condition(condition)?;
        Self::bind(&parsed, columns)
    }

    pub fn bind(condition: &Condition, columns: &[Column]) -> EngineResult<Self> {
        match condition {
            Condition::Compare { left, op, right } => {
                match (resolve_term(left, columns), resolve_term(right, columns)) {
                    (Some(l), Some(r)) => Ok(Predicate::Compare {
                        left: Operand::Column(l),
                        op: *op,
                        right: Operand::Column(r),
                    }),
                    (Some(l), None) => Ok(Predicate::Compare {
                        left: Operand::Column(l),
                        op: *op,
                        right: Operand::Literal(cast_literal(right, &columns[l])?),
                    }),
                    (None, Some(r)) => Ok(Predicate::Compare {
                        left: Operand::Column(r),
                        op: op.mirrored(),
                        right: Operand::Literal(cast_literal(left, &columns[r])?),
                    }),
                    (None, None) => Err(EngineError::condition(format!(
                        "condition {} {} {} does not reference an existing column",
                        left.text(),
                        op,
                        right.text()
                    ))),
                }
            }
            Condition::In { column, values } => {
                let idx = require_column(column, columns)?;
                let mut members = HashSet::with_capacity(values.len());
                for term in values {
                    members.insert(cast_literal(term, &columns[idx])?.to_string());
                }
                Ok(Predicate::In {
                    column: idx,
                    members,
                })
            }
            Condition::Between { column, low, high } => {
                let idx = require_column(column, columns)?;
                let numeric = match (
                    low.text().trim().parse::<f64>(),
                    high.text().trim().parse::<f64>(),
                ) {
                    (Ok(l), Ok(h)) => Some((l, h)),
                    _ => None,
                };
                Ok(Predicate::Between {
                    column: idx,
                    low: low.text().to_string(),
                    high: high.text().to_string(),
                    numeric,
                })
            }
            Condition::Like { column, pattern } => {
                let idx = require_column(column, columns)?;
                Ok(Predicate::Like {
                    column: idx,
                    pattern: like_regex(pattern)?,
                })
            }
        }
    }

    /// Null operands never satisfy a predicate.
    pub fn evaluate(&self, row: &[Value]) -> bool {
        match self {
            Predicate::Compare { left, op, right } => left
                .resolve(row)
                .compare(right.resolve(row))
                .map_or(false, |ordering| op.matches(ordering)),
            Predicate::In { column, members } => {
                let value = &row[*column];
                !value.is_null() && members.contains(&value.to_string())
            }
            Predicate::Between {
                column,
                low,
                high,
                numeric,
            } => {
                let value = &row[*column];
                if value.is_null() {
                    return false;
                }
                if let (Some((lo, hi)), Some(v)) = (numeric, value.as_f64()) {
                    return *lo <= v && v <= *hi;
                }
                let text = value.to_string();
                low.as_str() <= text.as_str() && text.as_str() <= high.as_str()
            }
            Predicate::Like { column, pattern } => {
                let value = &row[*column];
                !value.is_null() && pattern.is_match(&value.to_string())
            }
        }
    }

    /// `(op, key)` when this predicate compares column `column` with a literal.
    pub fn key_comparison(&self, column: usize) -> Option<(ComparisonOp, &Value)> {
        match self {
            Predicate::Compare {
                left: Operand::Column(idx),
                op,
                right: Operand::Literal(value),
            } if *idx == column => Some((*op, value)),
            _ => None,
        }
    }
}

fn resolve_term(term: &Term, columns: &[Column]) -> Option<usize> {
    match term {
        Term::Word(word) => columns.iter().position(|c| c.name == *word),
        Term::Quoted(_) => None,
    }
}

fn require_column(name: &str, columns: &[Column]) -> EngineResult<usize> {
    columns
        .iter()
        .position(|c| c.name == name)
        .ok_or_else(|| EngineError::condition(format!("column {} does not exist", name)))
}

fn cast_literal(term: &Term, column: &Column) -> EngineResult<Value> {
    column
        .data_type
        .cast(&Value::Text(term.text().to_string()))
        .ok_or_else(|| {
            EngineError::condition(format!(
                "value {} cannot be cast to {} for column {}",
                term.text(),
                column.data_type,
                column.name
            ))
        })
}

/// Compiles a LIKE pattern into an anchored regex: `%` matches any run of
/// characters, `_` exactly one.
pub fn like_regex(pattern: &str) -> EngineResult<Regex> {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push_str("(?s)^");
    let mut literal = String::new();
    for ch in pattern.chars() {
        match ch {
            '%' | '_' => {
                source.push_str(&regex::escape(&literal));
                literal.clear();
                source.push_str(if ch == '%' { ".*" } else { "." });
            }
            _ => literal.push(ch),
        }
    }
    source.push_str(&regex::escape(&literal));
    source.push('$');
    Regex::new(&source)
        .map_err(|err| EngineError::condition(format!("invalid LIKE pattern {}: {}", pattern, err)))
}

/// Two-table predicate `left_column op right_column`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinPredicate {
    pub left: usize,
    pub op: ComparisonOp,
    pub right: usize,
}

impl JoinPredicate {
    /// Resolves a join condition. Names may be qualified with their table name;
    /// a condition written right-table-first is flipped.
    pub fn bind(condition: &str, left: &Table, right: &Table) -> EngineResult<Self> {
        let (left_name, op, right_name) = match parse_condition(condition)? {
            Condition::Compare {
                left: Term::Word(l),
                op,
                right: Term::Word(r),
            } => (l, op, r),
            _ => {
                return Err(EngineError::condition(format!(
                    "join condition must compare two columns: {}",
                    condition
                )))
            }
        };

        if let (Some(l), Some(r)) = (
            resolve_in(left, &left_name),
            resolve_in(right, &right_name),
        ) {
            return Ok(Self { left: l, op, right: r });
        }
        if let (Some(l), Some(r)) = (
            resolve_in(left, &right_name),
            resolve_in(right, &left_name),
        ) {
            return Ok(Self {
                left: l,
                op: op.mirrored(),
                right: r,
            });
        }
        let (table, column) = if resolve_in(left, &left_name).is_none() {
            (left, left_name)
        } else {
            (right, right_name)
        };
        Err(EngineError::JoinColumn {
            table: table.name().to_string(),
            column,
            valid: table.column_names(),
        })
    }

    pub fn evaluate(&self, left: &[Value], right: &[Value]) -> bool {
        left[self.left]
            .compare(&right[self.right])
            .map_or(false, |ordering| self.op.matches(ordering))
    }
}

fn resolve_in(table: &Table, name: &str) -> Option<usize> {
    table.column_index(name).or_else(|| {
        name.strip_prefix(table.name())
            .and_then(|rest| rest.strip_prefix('.'))
            .filter(|_| !table.name().is_empty())
            .and_then(|column| table.column_index(column))
    })
}
