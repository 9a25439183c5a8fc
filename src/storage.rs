use crate::error::{EngineError, EngineResult};
use crate::predicate::Predicate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

/// Tables whose name starts with this prefix hold catalog data and are
/// compacted on delete instead of tombstoned.
pub const SYSTEM_TABLE_PREFIX: &str = "meta";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// SQL-style comparison: `None` when either side is null, numeric when
    /// both sides are numbers, otherwise by text rendering.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Integer(l), Value::Integer(r)) => Some(l.cmp(r)),
            _ => match (self.as_f64(), other.as_f64()) {
                (Some(l), Some(r)) => Some(l.partial_cmp(&r).unwrap_or(Ordering::Equal)),
                _ => Some(self.to_string().cmp(&other.to_string())),
            },
        }
    }

    /// Total order used for sorting: nulls first, then numbers, then text.
    pub fn order_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Less,
            (_, Value::Null) => Ordering::Greater,
            (Value::Text(l), Value::Text(r)) => l.cmp(r),
            (Value::Text(_), _) => Ordering::Greater,
            (_, Value::Text(_)) => Ordering::Less,
            _ => self.compare(other).unwrap_or(Ordering::Equal),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Integer,
    Float,
    Text,
}

impl DataType {
    pub fn is_numeric(self) -> bool {
        matches!(self, DataType::Integer | DataType::Float)
    }

    /// Converts `value` to this type. Null stays null; `None` means the value
    /// cannot be represented.
    pub fn cast(self, value: &Value) -> Option<Value> {
        match (self, value) {
            (_, Value::Null) => Some(Value::Null),
            (DataType::Integer, Value::Integer(v)) => Some(Value::Integer(*v)),
            (DataType::Integer, Value::Float(v)) => {
                if v.is_finite() && v.abs() < i64::MAX as f64 {
                    Some(Value::Integer(v.trunc() as i64))
                } else {
                    None
                }
            }
            (DataType::Integer, Value::Text(s)) => s.trim().parse::<i64>().ok().map(Value::Integer),
            (DataType::Float, Value::Integer(v)) => Some(Value::Float(*v as f64)),
            (DataType::Float, Value::Float(v)) => Some(Value::Float(*v)),
            (DataType::Float, Value::Text(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(Value::Float),
            (DataType::Text, Value::Text(s)) => Some(Value::Text(s.clone())),
            (DataType::Text, other) => Some(Value::Text(other.to_string())),
        }
    }

    /// Whether `value` is already stored in this type's representation.
    pub fn conforms(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Null)
                | (DataType::Integer, Value::Integer(_))
                | (DataType::Float, Value::Float(_))
                | (DataType::Text, Value::Text(_))
        )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Integer => "int",
            DataType::Float => "float",
            DataType::Text => "str",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub not_null: bool,
    pub unique: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            not_null: false,
            unique: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Opaque, serialisable image of a table for the persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSnapshot {
    pub name: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
    pub primary_key: Option<usize>,
    pub insert_stack: Vec<usize>,
}

/// Ordered, schema-typed row store.
///
/// Row ids are slot positions in `rows`. Deleting from an ordinary table
/// overwrites the slot with an all-null tombstone and remembers it on the
/// insert stack so a later insert can reuse it.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    name: String,
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
    primary_key: Option<usize>,
    insert_stack: Vec<usize>,
    /// Query output: every stored row is live, including all-null ones.
    result: bool,
}

pub(crate) fn is_tombstone(row: &[Value]) -> bool {
    row.iter().all(Value::is_null)
}

impl Table {
    pub fn new(
        name: impl Into<String>,
        columns: Vec<Column>,
        primary_key: Option<&str>,
    ) -> EngineResult<Self> {
        let name = name.into();
        validate_columns(&name, &columns)?;
        let primary_key = match primary_key {
            Some(pk) => Some(columns.iter().position(|c| c.name == pk).ok_or_else(|| {
                EngineError::schema(format!(
                    "primary key column {} does not exist in table {}",
                    pk, name
                ))
            })?),
            None => None,
        };
        Ok(Self {
            name,
            columns,
            rows: Vec::new(),
            primary_key,
            insert_stack: Vec::new(),
            result: false,
        })
    }

    /// Result tables: rows are already typed, there is no primary key and
    /// no row is a tombstone.
    pub(crate) fn from_parts(name: String, columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            name,
            columns,
            rows,
            primary_key: None,
            insert_stack: Vec::new(),
            result: true,
        }
    }

    fn is_deleted(&self, row: &[Value]) -> bool {
        !self.result && is_tombstone(row)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column_types(&self) -> Vec<DataType> {
        self.columns.iter().map(|c| c.data_type).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn primary_key(&self) -> Option<usize> {
        self.primary_key
    }

    pub fn is_system(&self) -> bool {
        self.name.starts_with(SYSTEM_TABLE_PREFIX)
    }

    /// Number of storage slots, tombstones included.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn live_count(&self) -> usize {
        self.rows.iter().filter(|row| !self.is_deleted(row)).count()
    }

    /// Raw storage, tombstones included.
    pub fn raw_rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Live row by id; `None` for tombstones and out-of-range ids.
    pub fn row(&self, row_id: usize) -> Option<&[Value]> {
        self.rows
            .get(row_id)
            .filter(|row| !self.is_deleted(row))
            .map(|row| row.as_slice())
    }

    pub fn live_rows(&self) -> impl Iterator<Item = (usize, &[Value])> + '_ {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, row)| !self.is_deleted(row))
            .map(|(id, row)| (id, row.as_slice()))
    }

    /// Live rows in storage order, cloned.
    pub fn rows(&self) -> Vec<Vec<Value>> {
        self.live_rows().map(|(_, row)| row.to_vec()).collect()
    }

    pub fn insert_stack(&self) -> &[usize] {
        &self.insert_stack
    }

    /// Validates and stores one row, reusing the most recently freed slot
    /// when there is one. Returns the row id written.
    pub fn insert(&mut self, values: Vec<Value>) -> EngineResult<usize> {
        let row = self.validate_row(values)?;
        while let Some(slot) = self.insert_stack.pop() {
            if self.rows.get(slot).is_some_and(|r| is_tombstone(r)) {
                self.rows[slot] = row;
                return Ok(slot);
            }
        }
        self.rows.push(row);
        Ok(self.rows.len() - 1)
    }

    pub fn insert_many<I>(&mut self, rows: I) -> EngineResult<Vec<usize>>
    where
        I: IntoIterator<Item = Vec<Value>>,
    {
        rows.into_iter().map(|row| self.insert(row)).collect()
    }

    fn validate_row(&self, values: Vec<Value>) -> EngineResult<Vec<Value>> {
        if values.len() != self.columns.len() {
            return Err(EngineError::schema(format!(
                "cannot insert {} values, table {} has {} columns",
                values.len(),
                self.name,
                self.columns.len()
            )));
        }
        let mut row = Vec::with_capacity(values.len());
        for (column, value) in self.columns.iter().zip(values.iter()) {
            let cast = column.data_type.cast(value).ok_or_else(|| {
                EngineError::schema(format!(
                    "value {} is not of type {} for column {}",
                    value, column.data_type, column.name
                ))
            })?;
            if column.not_null && cast.is_null() {
                return Err(EngineError::schema(format!(
                    "cannot insert NULL value in column {}",
                    column.name
                )));
            }
            row.push(cast);
        }
        if is_tombstone(&row) {
            return Err(EngineError::schema(
                "cannot insert a row whose values are all NULL",
            ));
        }
        for (idx, value) in row.iter().enumerate() {
            if !value.is_null() && self.is_unique_column(idx) && self.contains_value(idx, value, &[])
            {
                return Err(EngineError::Uniqueness {
                    column: self.columns[idx].name.clone(),
                    value: value.to_string(),
                });
            }
        }
        Ok(row)
    }

    fn is_unique_column(&self, idx: usize) -> bool {
        self.primary_key == Some(idx) || self.columns[idx].unique
    }

    fn contains_value(&self, idx: usize, value: &Value, skip: &[usize]) -> bool {
        self.live_rows()
            .any(|(id, row)| !skip.contains(&id) && row[idx] == *value)
    }

    /// Deletes every live row matching `condition` (all live rows when absent)
    /// and returns their ids. System and result tables are compacted;
    /// ordinary tables keep tombstones whose slots go onto the insert stack.
    pub fn delete_where(&mut self, condition: Option<&str>) -> EngineResult<Vec<usize>> {
        let matched = self.matching_ids(condition)?;
        if self.is_system() || self.result {
            for &id in matched.iter().rev() {
                self.rows.remove(id);
            }
            self.insert_stack.clear();
        } else {
            let width = self.columns.len();
            for &id in &matched {
                self.rows[id] = vec![Value::Null; width];
                self.insert_stack.push(id);
            }
        }
        debug!(table = %self.name, deleted = matched.len(), "delete_where");
        Ok(matched)
    }

    /// Sets `column` to `value` on every matching live row. Applies to all
    /// rows or none.
    pub fn update_where(
        &mut self,
        column: &str,
        value: Value,
        condition: Option<&str>,
    ) -> EngineResult<usize> {
        let idx = self.column_index(column).ok_or_else(|| {
            EngineError::schema(format!("column {} does not exist in table {}", column, self.name))
        })?;
        let target = &self.columns[idx];
        let cast = target.data_type.cast(&value).ok_or_else(|| {
            EngineError::schema(format!(
                "value {} is not of type {} for column {}",
                value, target.data_type, target.name
            ))
        })?;
        if target.not_null && cast.is_null() {
            return Err(EngineError::schema(format!(
                "cannot set NULL value in column {}",
                target.name
            )));
        }
        let matched = self.matching_ids(condition)?;
        if matched.is_empty() {
            return Ok(0);
        }
        if !cast.is_null() && self.is_unique_column(idx) {
            if matched.len() > 1 || self.contains_value(idx, &cast, &matched) {
                return Err(EngineError::Uniqueness {
                    column: target.name.clone(),
                    value: cast.to_string(),
                });
            }
        }
        if cast.is_null() {
            let empties = matched.iter().any(|&id| {
                self.rows[id]
                    .iter()
                    .enumerate()
                    .all(|(i, v)| i == idx || v.is_null())
            });
            if empties {
                return Err(EngineError::schema(
                    "update would leave a row whose values are all NULL",
                ));
            }
        }
        for &id in &matched {
            self.rows[id][idx] = cast.clone();
        }
        debug!(table = %self.name, column, updated = matched.len(), "update_where");
        Ok(matched.len())
    }

    /// Re-types a column, converting every stored value. Nothing changes if
    /// any value fails to convert.
    pub fn cast_column(&mut self, column: &str, data_type: DataType) -> EngineResult<()> {
        let idx = self.column_index(column).ok_or_else(|| {
            EngineError::schema(format!("column {} does not exist in table {}", column, self.name))
        })?;
        let mut converted = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            let cast = data_type.cast(&row[idx]).ok_or_else(|| {
                EngineError::schema(format!(
                    "value {} in column {} cannot be cast to {}",
                    row[idx], column, data_type
                ))
            })?;
            converted.push(cast);
        }
        if self.is_unique_column(idx) {
            let mut seen = HashSet::new();
            for (row, value) in self.rows.iter().zip(converted.iter()) {
                if self.is_deleted(row) || value.is_null() {
                    continue;
                }
                if !seen.insert(value.to_string()) {
                    return Err(EngineError::Uniqueness {
                        column: column.to_string(),
                        value: value.to_string(),
                    });
                }
            }
        }
        for (row, value) in self.rows.iter_mut().zip(converted) {
            row[idx] = value;
        }
        self.columns[idx].data_type = data_type;
        Ok(())
    }

    fn matching_ids(&self, condition: Option<&str>) -> EngineResult<Vec<usize>> {
        let predicate = condition
            .map(|c| Predicate::parse(c, &self.columns))
            .transpose()?;
        Ok(self
            .live_rows()
            .filter(|(_, row)| predicate.as_ref().map_or(true, |p| p.evaluate(row)))
            .map(|(id, _)| id)
            .collect())
    }

    pub fn snapshot(&self) -> TableSnapshot {
        TableSnapshot {
            name: self.name.clone(),
            columns: self.columns.clone(),
            rows: self.rows.clone(),
            primary_key: self.primary_key,
            insert_stack: self.insert_stack.clone(),
        }
    }

    /// Rebuilds a table from a snapshot, re-checking every schema invariant.
    pub fn from_snapshot(snapshot: TableSnapshot) -> EngineResult<Self> {
        validate_columns(&snapshot.name, &snapshot.columns)?;
        if let Some(pk) = snapshot.primary_key {
            if pk >= snapshot.columns.len() {
                return Err(EngineError::schema(format!(
                    "primary key index {} out of range",
                    pk
                )));
            }
        }
        for (id, row) in snapshot.rows.iter().enumerate() {
            if row.len() != snapshot.columns.len() {
                return Err(EngineError::schema(format!(
                    "row {} has {} values, expected {}",
                    id,
                    row.len(),
                    snapshot.columns.len()
                )));
            }
            for (column, value) in snapshot.columns.iter().zip(row) {
                if !column.data_type.conforms(value) {
                    return Err(EngineError::schema(format!(
                        "row {} holds {} in {} column {}",
                        id, value, column.data_type, column.name
                    )));
                }
            }
        }
        let table = Self {
            name: snapshot.name,
            columns: snapshot.columns,
            rows: snapshot.rows,
            primary_key: snapshot.primary_key,
            insert_stack: snapshot.insert_stack,
            result: false,
        };
        for idx in (0..table.columns.len()).filter(|&i| table.is_unique_column(i)) {
            let mut seen = HashSet::new();
            for (_, row) in table.live_rows() {
                if !row[idx].is_null() && !seen.insert(row[idx].to_string()) {
                    return Err(EngineError::Uniqueness {
                        column: table.columns[idx].name.clone(),
                        value: row[idx].to_string(),
                    });
                }
            }
        }
        Ok(table)
    }
}

fn validate_columns(table: &str, columns: &[Column]) -> EngineResult<()> {
    if columns.is_empty() {
        return Err(EngineError::schema(format!(
            "table {} needs at least one column",
            table
        )));
    }
    let mut seen = HashSet::new();
    for column in columns {
        if !seen.insert(column.name.as_str()) {
            return Err(EngineError::schema(format!(
                "duplicate column {} in table {}",
                column.name, table
            )));
        }
    }
    Ok(())
}
