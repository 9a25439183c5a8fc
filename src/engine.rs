//! Query entry points: selection, projection, grouping, joins and the
//! ordering / top-k / distinct post-processing stages.
//!
//! # Examples
//! ```
//! use minirel::engine::{Engine, SelectQuery};
//! use minirel::storage::{Column, DataType, Table, Value};
//!
//! let mut people = Table::new(
//!     "people",
//!     vec![
//!         Column::new("id", DataType::Integer),
//!         Column::new("name", DataType::Text),
//!     ],
//!     Some("id"),
//! )
//! .unwrap();
//! people.insert(vec![Value::Integer(1), Value::from("Alice")]).unwrap();
//! people.insert(vec![Value::Integer(2), Value::from("Bob")]).unwrap();
//!
//! let engine = Engine::default();
//! let result = engine
//!     .select(&people, &SelectQuery::new("name").filter("name LIKE 'A%'"))
//!     .unwrap();
//! assert_eq!(result.rows(), vec![vec![Value::from("Alice")]]);
//! ```

use crate::aggregate;
use crate::ast::{ComparisonOp, SelectItem};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::hash_index::ExtendibleHashIndex;
use crate::join::{self, JoinStrategy};
use crate::parser::parse_projection;
use crate::predicate::Predicate;
use crate::storage::{Column, Table, Value};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Ordered index over a table's primary key, such as a B+Tree maintained
/// outside this crate.
pub trait OrderedIndex {
    /// Row ids whose key satisfies `key op value`.
    fn find(&self, op: ComparisonOp, value: &Value) -> Vec<usize>;
}

/// A selection request. Built with chained setters; only the projection
/// list is required.
#[derive(Clone)]
pub struct SelectQuery<'a> {
    columns: String,
    condition: Option<String>,
    group_by: Option<String>,
    having: Option<String>,
    order_by: Option<String>,
    descending: bool,
    top_k: Option<usize>,
    distinct: bool,
    hash_index: Option<&'a ExtendibleHashIndex>,
    ordered_index: Option<&'a dyn OrderedIndex>,
    verify_index: bool,
}

impl<'a> SelectQuery<'a> {
    /// `columns` is `*` or a comma separated list of columns and aggregates.
    pub fn new(columns: impl Into<String>) -> Self {
        Self {
            columns: columns.into(),
            condition: None,
            group_by: None,
            having: None,
            order_by: None,
            descending: true,
            top_k: None,
            distinct: false,
            hash_index: None,
            ordered_index: None,
            verify_index: false,
        }
    }

    pub fn filter(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn group_by(mut self, column: impl Into<String>) -> Self {
        self.group_by = Some(column.into());
        self
    }

    pub fn having(mut self, condition: impl Into<String>) -> Self {
        self.having = Some(condition.into());
        self
    }

    /// Sorts on `column`, descending unless `ascending` is called.
    pub fn order_by(mut self, column: impl Into<String>) -> Self {
        self.order_by = Some(column.into());
        self
    }

    pub fn ascending(mut self) -> Self {
        self.descending = false;
        self
    }

    pub fn descending(mut self, descending: bool) -> Self {
        self.descending = descending;
        self
    }

    pub fn top_k(mut self, k: usize) -> Self {
        self.top_k = Some(k);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Hash index over the primary key, used for equality conditions on it.
    pub fn with_hash_index(mut self, index: &'a ExtendibleHashIndex) -> Self {
        self.hash_index = Some(index);
        self
    }

    /// Ordered index over the primary key, used for any comparison on it.
    pub fn with_ordered_index(mut self, index: &'a dyn OrderedIndex) -> Self {
        self.ordered_index = Some(index);
        self
    }

    /// Also run the full scan and fail if it disagrees with the index.
    pub fn verify_index(mut self, verify: bool) -> Self {
        self.verify_index = verify;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccessPath {
    Scan,
    HashIndex,
    OrderedIndex,
}

#[derive(Debug, Clone, Default)]
pub struct Engine {
    config: EngineConfig,
}

impl Engine {
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn from_env() -> EngineResult<Self> {
        Self::new(EngineConfig::from_env()?)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Builds an extendible hash index over `column` with this engine's
    /// bucket settings.
    pub fn build_index(&self, table: &Table, column: &str) -> EngineResult<ExtendibleHashIndex> {
        ExtendibleHashIndex::build(table, column, &self.config)
    }

    pub fn select(&self, table: &Table, query: &SelectQuery<'_>) -> EngineResult<Table> {
        let items = parse_projection(&query.columns)?;
        let predicate = query
            .condition
            .as_deref()
            .map(|c| Predicate::parse(c, table.columns()))
            .transpose()?;
        let row_ids = self.qualifying_rows(table, predicate.as_ref(), query)?;

        let result = match &query.group_by {
            Some(column) => aggregate::group_by(
                table,
                &row_ids,
                column,
                &items,
                query.having.as_deref(),
            )?,
            None => {
                if query.having.is_some() {
                    return Err(EngineError::group_by("having requires a group by column"));
                }
                project(table, &row_ids, &items)?
            }
        };
        finish(result, query)
    }

    pub fn inner_join(
        &self,
        left: &Table,
        right: &Table,
        condition: &str,
        strategy: JoinStrategy,
    ) -> EngineResult<Table> {
        join::inner_join(left, right, condition, strategy, &self.config)
    }

    fn qualifying_rows(
        &self,
        table: &Table,
        predicate: Option<&Predicate>,
        query: &SelectQuery<'_>,
    ) -> EngineResult<Vec<usize>> {
        let Some(predicate) = predicate else {
            return Ok(table.live_rows().map(|(id, _)| id).collect());
        };
        let key = table
            .primary_key()
            .and_then(|pk| predicate.key_comparison(pk));

        let (path, mut ids) = match (key, query.hash_index, query.ordered_index) {
            (Some((ComparisonOp::Eq, value)), Some(index), _) => {
                (AccessPath::HashIndex, index.find_all(value))
            }
            (Some((op, value)), _, Some(index)) => (AccessPath::OrderedIndex, index.find(op, value)),
            _ => (AccessPath::Scan, scan(table, predicate)),
        };
        debug!(table = table.name(), ?path, "selection access path");
        if path == AccessPath::Scan {
            return Ok(ids);
        }

        ids.retain(|&id| table.row(id).is_some());
        ids.sort_unstable();
        ids.dedup();
        if query.verify_index {
            let scanned = scan(table, predicate);
            if scanned != ids {
                warn!(
                    table = table.name(),
                    ?path,
                    indexed = ids.len(),
                    scanned = scanned.len(),
                    "index disagrees with full scan"
                );
                return Err(EngineError::index(format!(
                    "{:?} returned {} rows but a full scan of {} returned {}",
                    path,
                    ids.len(),
                    table.name(),
                    scanned.len()
                )));
            }
        }
        Ok(ids)
    }
}

fn scan(table: &Table, predicate: &Predicate) -> Vec<usize> {
    table
        .live_rows()
        .filter(|(_, row)| predicate.evaluate(row))
        .map(|(id, _)| id)
        .collect()
}

fn project(table: &Table, row_ids: &[usize], items: &[SelectItem]) -> EngineResult<Table> {
    let mut indices = Vec::new();
    for item in items {
        match item {
            SelectItem::Wildcard => indices.extend(0..table.columns().len()),
            SelectItem::Column(name) => indices.push(table.column_index(name).ok_or_else(|| {
                EngineError::schema(format!(
                    "column {} does not exist in table {}",
                    name,
                    table.name()
                ))
            })?),
            SelectItem::Aggregate { .. } => {
                return Err(EngineError::group_by(format!(
                    "aggregate {} requires a group by column",
                    item.output_name()
                )))
            }
        }
    }
    let columns: Vec<Column> = indices
        .iter()
        .map(|&i| {
            let source = &table.columns()[i];
            Column::new(source.name.clone(), source.data_type)
        })
        .collect();
    let rows = row_ids
        .iter()
        .filter_map(|&id| table.row(id))
        .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
        .collect();
    Ok(Table::from_parts(table.name().to_string(), columns, rows))
}

/// Applies order_by, then top_k, then distinct.
fn finish(result: Table, query: &SelectQuery<'_>) -> EngineResult<Table> {
    let mut rows = result.rows();
    if let Some(column) = &query.order_by {
        let idx = result.column_index(column).ok_or_else(|| {
            EngineError::schema(format!("cannot order by missing column {}", column))
        })?;
        if query.descending {
            rows.sort_by(|a, b| b[idx].order_cmp(&a[idx]));
        } else {
            rows.sort_by(|a, b| a[idx].order_cmp(&b[idx]));
        }
    }
    if let Some(k) = query.top_k {
        rows.truncate(k);
    }
    if query.distinct {
        let mut seen = HashSet::new();
        rows.retain(|row| seen.insert(format!("{:?}", row)));
    }
    Ok(Table::from_parts(
        result.name().to_string(),
        result.columns().to_vec(),
        rows,
    ))
}
