//! Inner joins over two tables.
//!
//! Nested loop is the reference strategy and accepts every comparison
//! operator. Sort-merge handles equality joins: both sides are ordered on an
//! encoded join key (through the external sort once a side outgrows
//! `sort_memory_rows`) and merged with two cursors.

use crate::ast::ComparisonOp;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::external_sort::ExternalMergeSort;
use crate::predicate::JoinPredicate;
use crate::storage::{Column, DataType, Table, Value};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum JoinStrategy {
    #[default]
    NestedLoop,
    SortMerge,
}

/// Joins `left` and `right` on a two-column condition such as
/// `emp.dept_id = dept.id`.
///
/// The result has every left column followed by every right column, each
/// renamed `table.column`. Tombstoned rows never participate.
pub fn inner_join(
    left: &Table,
    right: &Table,
    condition: &str,
    strategy: JoinStrategy,
    config: &EngineConfig,
) -> EngineResult<Table> {
    let predicate = JoinPredicate::bind(condition, left, right)?;
    debug!(
        left = left.name(),
        right = right.name(),
        ?strategy,
        op = %predicate.op,
        "inner join"
    );
    let pairs = match strategy {
        JoinStrategy::NestedLoop => nested_loop(left, right, &predicate),
        JoinStrategy::SortMerge => {
            if predicate.op != ComparisonOp::Eq {
                return Err(EngineError::condition(format!(
                    "sort-merge join requires an equality condition, got {}",
                    predicate.op
                )));
            }
            sort_merge(left, right, &predicate, config)?
        }
    };

    let mut columns = qualified_columns(left);
    columns.extend(qualified_columns(right));
    let rows = pairs
        .into_iter()
        .filter_map(|(l, r)| {
            let (l, r) = (left.row(l)?, right.row(r)?);
            Some(l.iter().chain(r).cloned().collect())
        })
        .collect();
    Ok(Table::from_parts(String::new(), columns, rows))
}

fn qualified_columns(table: &Table) -> Vec<Column> {
    table
        .columns()
        .iter()
        .map(|c| {
            let name = if table.name().is_empty() {
                c.name.clone()
            } else {
                format!("{}.{}", table.name(), c.name)
            };
            Column::new(name, c.data_type)
        })
        .collect()
}

fn nested_loop(left: &Table, right: &Table, predicate: &JoinPredicate) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    for (l, left_row) in left.live_rows() {
        for (r, right_row) in right.live_rows() {
            if predicate.evaluate(left_row, right_row) {
                pairs.push((l, r));
            }
        }
    }
    pairs
}

#[derive(Debug, Clone, Copy)]
enum KeyEncoding {
    Integer,
    Float,
    Text,
}

impl KeyEncoding {
    fn for_columns(left: DataType, right: DataType) -> Self {
        match (left, right) {
            (DataType::Integer, DataType::Integer) => KeyEncoding::Integer,
            (l, r) if l.is_numeric() && r.is_numeric() => KeyEncoding::Float,
            _ => KeyEncoding::Text,
        }
    }

    /// Text whose byte order matches `Value::compare` for this column pair.
    /// Every encoding carries a letter prefix so the external sort never
    /// treats it as an integer.
    fn encode(self, value: &Value) -> Option<String> {
        if value.is_null() {
            return None;
        }
        match (self, value) {
            (KeyEncoding::Integer, Value::Integer(v)) => {
                Some(format!("i{:016x}", (*v as u64) ^ (1 << 63)))
            }
            (KeyEncoding::Integer | KeyEncoding::Float, _) => {
                let mut f = value.as_f64()?;
                if f == 0.0 {
                    f = 0.0;
                }
                let bits = f.to_bits();
                let ordered = if bits >> 63 == 1 { !bits } else { bits | (1 << 63) };
                Some(format!("f{:016x}", ordered))
            }
            (KeyEncoding::Text, _) => Some(format!("t{}", value)),
        }
    }
}

fn sort_side(
    table: &Table,
    column: usize,
    encoding: KeyEncoding,
    config: &EngineConfig,
) -> EngineResult<Vec<(String, usize)>> {
    let mut keyed: Vec<(String, usize)> = table
        .live_rows()
        .filter_map(|(id, row)| encoding.encode(&row[column]).map(|key| (key, id)))
        .collect();
    if keyed.len() > config.sort_memory_rows {
        debug!(table = table.name(), rows = keyed.len(), "join side spills to external sort");
        keyed = ExternalMergeSort::new(config).sort_pairs(table.name(), keyed)?;
    } else {
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
    }
    Ok(keyed)
}

fn sort_merge(
    left: &Table,
    right: &Table,
    predicate: &JoinPredicate,
    config: &EngineConfig,
) -> EngineResult<Vec<(usize, usize)>> {
    let encoding = KeyEncoding::for_columns(
        left.columns()[predicate.left].data_type,
        right.columns()[predicate.right].data_type,
    );
    let lhs = sort_side(left, predicate.left, encoding, config)?;
    let rhs = sort_side(right, predicate.right, encoding, config)?;

    let mut pairs = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < lhs.len() && j < rhs.len() {
        match lhs[i].0.cmp(&rhs[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                let key = &lhs[i].0;
                let i_end = i + lhs[i..].iter().take_while(|(k, _)| k == key).count();
                let j_end = j + rhs[j..].iter().take_while(|(k, _)| k == key).count();
                for (_, l) in &lhs[i..i_end] {
                    for (_, r) in &rhs[j..j_end] {
                        pairs.push((*l, *r));
                    }
                }
                i = i_end;
                j = j_end;
            }
        }
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(encoding: KeyEncoding, values: &[Value]) -> Vec<String> {
        values.iter().filter_map(|v| encoding.encode(v)).collect()
    }

    #[test]
    fn integer_encoding_orders_like_integers() {
        let keys = encoded(
            KeyEncoding::Integer,
            &[
                Value::Integer(i64::MIN),
                Value::Integer(-5),
                Value::Integer(0),
                Value::Integer(7),
                Value::Integer(i64::MAX),
            ],
        );
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn float_encoding_matches_mixed_numeric_equality() {
        let keys = encoded(
            KeyEncoding::Float,
            &[
                Value::Float(-2.5),
                Value::Float(-0.0),
                Value::Integer(0),
                Value::Float(1.5),
                Value::Integer(2),
            ],
        );
        assert_eq!(keys[1], keys[2]);
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert_eq!(
            KeyEncoding::Float.encode(&Value::Integer(3)),
            KeyEncoding::Float.encode(&Value::Float(3.0))
        );
    }

    #[test]
    fn nulls_have_no_key() {
        assert_eq!(KeyEncoding::Text.encode(&Value::Null), None);
        assert_eq!(KeyEncoding::Integer.encode(&Value::Null), None);
    }
}
