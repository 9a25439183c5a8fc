//! Group-by partitioning, aggregate functions and HAVING.

use crate::ast::{aggregate_name, AggregateArg, AggregateFunc, SelectItem};
use crate::error::{EngineError, EngineResult};
use crate::predicate::Predicate;
use crate::storage::{Column, DataType, Table, Value};
use std::collections::HashMap;
use tracing::debug;

/// One bound output column of a grouped result.
#[derive(Debug, Clone)]
enum Output {
    GroupKey,
    Count,
    Func {
        func: AggregateFunc,
        column: usize,
    },
}

/// Groups `row_ids` of `table` by `group_by`, computes `items` per group
/// and filters the result with `having`.
///
/// Groups appear in order of first occurrence.
pub fn group_by(
    table: &Table,
    row_ids: &[usize],
    group_by: &str,
    items: &[SelectItem],
    having: Option<&str>,
) -> EngineResult<Table> {
    let key_idx = table.column_index(group_by).ok_or_else(|| {
        EngineError::group_by(format!(
            "group by column {} does not exist in table {}",
            group_by,
            table.name()
        ))
    })?;
    let (outputs, columns) = bind_outputs(table, key_idx, items)?;

    let mut order: Vec<Value> = Vec::new();
    let mut partitions: HashMap<String, Vec<&[Value]>> = HashMap::new();
    for row in row_ids.iter().filter_map(|&id| table.row(id)) {
        let key = &row[key_idx];
        partitions
            .entry(format!("{:?}", key))
            .or_insert_with(|| {
                order.push(key.clone());
                Vec::new()
            })
            .push(row);
    }

    let mut rows = Vec::with_capacity(order.len());
    for key in &order {
        let members = partitions
            .get(&format!("{:?}", key))
            .map(Vec::as_slice)
            .unwrap_or_default();
        let mut row = Vec::with_capacity(outputs.len());
        for output in &outputs {
            row.push(match output {
                Output::GroupKey => key.clone(),
                Output::Count => Value::Integer(members.len() as i64),
                Output::Func { func, column } => {
                    let values = members.iter().map(|r| &r[*column]).filter(|v| !v.is_null());
                    apply(*func, values, table.columns()[*column].data_type)?
                }
            });
        }
        rows.push(row);
    }
    debug!(table = table.name(), group_by, groups = rows.len(), "grouped rows");

    if let Some(condition) = having {
        let predicate = Predicate::parse(condition, &columns)?;
        rows.retain(|row| predicate.evaluate(row));
    }
    Ok(Table::from_parts(table.name().to_string(), columns, rows))
}

fn bind_outputs(
    table: &Table,
    key_idx: usize,
    items: &[SelectItem],
) -> EngineResult<(Vec<Output>, Vec<Column>)> {
    let key_column = &table.columns()[key_idx];
    let mut outputs = Vec::with_capacity(items.len());
    let mut columns = Vec::with_capacity(items.len());
    for item in items {
        match item {
            SelectItem::Wildcard => {
                return Err(EngineError::group_by(
                    "* cannot be selected together with group by",
                ))
            }
            SelectItem::Column(name) if *name == key_column.name => {
                outputs.push(Output::GroupKey);
                columns.push(Column::new(name.clone(), key_column.data_type));
            }
            SelectItem::Column(name) => {
                return Err(EngineError::group_by(format!(
                    "column {} must appear in group by or inside an aggregate",
                    name
                )))
            }
            SelectItem::Aggregate { func, arg } => {
                let name = aggregate_name(*func, arg);
                match arg {
                    AggregateArg::Star if *func == AggregateFunc::Count => {
                        outputs.push(Output::Count);
                        columns.push(Column::new(name, DataType::Integer));
                    }
                    AggregateArg::Star => {
                        return Err(EngineError::group_by(format!(
                            "{} requires a column argument",
                            func.name()
                        )))
                    }
                    AggregateArg::Column(column) => {
                        let idx = table.column_index(column).ok_or_else(|| {
                            EngineError::group_by(format!(
                                "column {} does not exist in table {}",
                                column,
                                table.name()
                            ))
                        })?;
                        let input = table.columns()[idx].data_type;
                        let output = result_type(*func, input).ok_or_else(|| {
                            EngineError::group_by(format!(
                                "{} cannot be applied to {} column {}",
                                func.name(),
                                input,
                                column
                            ))
                        })?;
                        outputs.push(Output::Func {
                            func: *func,
                            column: idx,
                        });
                        columns.push(Column::new(name, output));
                    }
                }
            }
        }
    }
    Ok((outputs, columns))
}

/// Type of `func` over a column of type `input`; `None` when undefined.
fn result_type(func: AggregateFunc, input: DataType) -> Option<DataType> {
    match func {
        AggregateFunc::Count => Some(DataType::Integer),
        AggregateFunc::Min | AggregateFunc::Max => Some(input),
        AggregateFunc::Sum if input.is_numeric() => Some(input),
        AggregateFunc::Avg if input.is_numeric() => Some(DataType::Float),
        AggregateFunc::Sum | AggregateFunc::Avg => None,
    }
}

/// Applies `func` to the non-null `values` of a partition. Empty input
/// yields null, except for `count`.
fn apply<'a>(
    func: AggregateFunc,
    values: impl Iterator<Item = &'a Value>,
    input: DataType,
) -> EngineResult<Value> {
    let values: Vec<&Value> = values.collect();
    if func == AggregateFunc::Count {
        return Ok(Value::Integer(values.len() as i64));
    }
    if values.is_empty() {
        return Ok(Value::Null);
    }
    Ok(match func {
        AggregateFunc::Min => values
            .into_iter()
            .min_by(|a, b| a.order_cmp(b))
            .cloned()
            .unwrap_or(Value::Null),
        AggregateFunc::Max => values
            .into_iter()
            .max_by(|a, b| a.order_cmp(b))
            .cloned()
            .unwrap_or(Value::Null),
        AggregateFunc::Sum if input == DataType::Integer => {
            let mut total: i64 = 0;
            for value in &values {
                if let Value::Integer(v) = value {
                    total = total
                        .checked_add(*v)
                        .ok_or_else(|| EngineError::group_by("integer overflow in sum"))?;
                }
            }
            Value::Integer(total)
        }
        AggregateFunc::Sum => Value::Float(values.iter().filter_map(|v| v.as_f64()).sum()),
        AggregateFunc::Avg => {
            let total: f64 = values.iter().filter_map(|v| v.as_f64()).sum();
            Value::Float(total / values.len() as f64)
        }
        AggregateFunc::Count => Value::Integer(values.len() as i64),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_projection;

    fn sales() -> Table {
        let mut table = Table::new(
            "sales",
            vec![
                Column::new("region", DataType::Text),
                Column::new("amount", DataType::Integer),
                Column::new("price", DataType::Float),
            ],
            None,
        )
        .unwrap();
        table
            .insert_many(vec![
                vec!["A".into(), Value::Integer(10), 1.5.into()],
                vec!["A".into(), Value::Integer(20), Value::Null],
                vec!["B".into(), Value::Integer(5), 4.0.into()],
                vec!["A".into(), Value::Null, 2.5.into()],
            ])
            .unwrap();
        table
    }

    fn all_ids(table: &Table) -> Vec<usize> {
        table.live_rows().map(|(id, _)| id).collect()
    }

    fn run(table: &Table, projection: &str, having: Option<&str>) -> EngineResult<Table> {
        let items = parse_projection(projection)?;
        group_by(table, &all_ids(table), "region", &items, having)
    }

    #[test]
    fn sums_per_group_in_first_occurrence_order() {
        let table = sales();
        let result = run(&table, "region, sum(amount)", None).unwrap();
        assert_eq!(result.column_names(), vec!["region", "sum(amount)"]);
        assert_eq!(
            result.rows(),
            vec![
                vec![Value::from("A"), Value::Integer(30)],
                vec![Value::from("B"), Value::Integer(5)],
            ]
        );
    }

    #[test]
    fn avg_and_count_skip_nulls() {
        let table = sales();
        let result = run(&table, "region, avg(price), count(price), count(*)", None).unwrap();
        assert_eq!(
            result.rows()[0],
            vec![
                Value::from("A"),
                Value::Float(2.0),
                Value::Integer(2),
                Value::Integer(3),
            ]
        );
    }

    #[test]
    fn min_max_keep_column_type() {
        let table = sales();
        let result = run(&table, "region, min(amount), max(price)", None).unwrap();
        assert_eq!(
            result.column_types(),
            vec![DataType::Text, DataType::Integer, DataType::Float]
        );
        assert_eq!(
            result.rows()[0],
            vec![Value::from("A"), Value::Integer(10), Value::Float(2.5)]
        );
    }

    #[test]
    fn having_filters_on_aggregate_columns() {
        let table = sales();
        let result = run(&table, "region, sum(amount)", Some("sum(amount) > 10")).unwrap();
        assert_eq!(result.rows(), vec![vec![Value::from("A"), Value::Integer(30)]]);

        let result = run(&table, "region, count(*)", Some("2 > count(*)")).unwrap();
        assert_eq!(result.rows(), vec![vec![Value::from("B"), Value::Integer(1)]]);
    }

    #[test]
    fn rejects_ungrouped_columns() {
        let table = sales();
        let err = run(&table, "region, amount", None).unwrap_err();
        assert!(matches!(err, EngineError::GroupBySchema(_)));
        let err = run(&table, "*", None).unwrap_err();
        assert!(matches!(err, EngineError::GroupBySchema(_)));
    }

    #[test]
    fn rejects_numeric_aggregates_on_text() {
        let table = sales();
        let err = run(&table, "sum(region)", None).unwrap_err();
        assert!(matches!(err, EngineError::GroupBySchema(_)));
        let err = run(&table, "avg(region)", None).unwrap_err();
        assert!(matches!(err, EngineError::GroupBySchema(_)));
        assert!(run(&table, "region, max(region)", None).is_ok());
    }
}
