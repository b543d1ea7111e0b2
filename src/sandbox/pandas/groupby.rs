// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// GroupBy methods.

use std::rc::Rc;

use crate::frame::{Agg, AggSpec, Cell, Groups, Index, Series, Table};

use super::super::interp::Interpreter;
use super::super::value::{short_name, Args, Exception, GroupBy, Res, Selection, Value};
use super::{is_callable, label_of, parse_agg, scalar_cell};

pub(super) fn call(interp: &mut Interpreter, g: &Rc<GroupBy>, name: &str, args: Args) -> Res<Value> {
    match name {
        "sum" | "mean" | "median" | "min" | "max" | "count" | "std" | "var" | "nunique" | "first"
        | "last" => reduce(g, parse_agg(&Value::str(name))?),
        "size" => {
            let mut sizes = g.groups.size();
            if g.as_index {
                return Ok(Value::series(sizes));
            }
            sizes.name = Some("size".into());
            series_to_frame(&sizes, "size")
        }
        "agg" | "aggregate" => aggregate(interp, g, &args),
        "apply" => apply(interp, g, args.require(0, "func", "apply")?),
        "transform" => transform(interp, g, args.require(0, "func", "transform")?),
        "get_group" => {
            let label = label_of(args.require(0, "name", "get_group")?)?;
            let part = g.groups.get_group(&label)?;
            Ok(match &g.selection {
                Some(Selection::One(col)) => Value::series(part.column(col)?),
                Some(Selection::Many(cols)) => Value::frame(part.select(cols)?),
                None => Value::frame(part),
            })
        }
        "head" => {
            let n = args.int_or(0, "n", 5)?.max(0) as usize;
            let mut rows: Vec<usize> = g
                .groups
                .groups
                .iter()
                .flat_map(|(_, rows)| rows.iter().take(n).copied())
                .collect();
            rows.sort_unstable();
            let part = g.groups.table.take(&rows);
            Ok(match &g.selection {
                Some(Selection::One(col)) => Value::series(part.column(col)?),
                _ => Value::frame(part),
            })
        }
        "value_counts" => value_counts(g, &args),
        other => Err(Exception::attribute_error(&Value::GroupBy(g.clone()).type_name(), other)),
    }
}

/// Group labels as an index named after the grouping keys.
fn key_index(groups: &Groups) -> Index {
    Index {
        names: groups.keys.iter().cloned().map(Some).collect(),
        labels: groups.groups.iter().map(|(label, _)| label.clone()).collect(),
    }
}

fn selected(g: &GroupBy) -> Res<Groups> {
    Ok(match &g.selection {
        Some(Selection::Many(cols)) => g.groups.select(cols)?,
        _ => g.groups.clone(),
    })
}

/// A keyed series as a flat frame: key columns then `column`.
fn series_to_frame(series: &Series, column: &str) -> Res<Value> {
    let table = Table::with_index(vec![(column.to_string(), series.values.clone())], series.index.clone())?;
    Ok(Value::frame(table.reset_index(false)))
}

fn finish_table(g: &GroupBy, table: Table) -> Value {
    if g.as_index {
        Value::frame(table)
    } else {
        Value::frame(table.reset_index(false))
    }
}

fn reduce(g: &GroupBy, agg: Agg) -> Res<Value> {
    match &g.selection {
        Some(Selection::One(col)) => {
            let series = g.groups.aggregate_column(col, agg)?;
            if g.as_index {
                Ok(Value::series(series))
            } else {
                series_to_frame(&series, col)
            }
        }
        _ => Ok(finish_table(g, selected(g)?.aggregate_all(agg)?)),
    }
}

fn value_columns(g: &GroupBy, groups: &Groups) -> Vec<String> {
    match &g.selection {
        Some(Selection::One(col)) => vec![col.clone()],
        Some(Selection::Many(cols)) => cols.clone(),
        None => groups
            .table
            .columns
            .iter()
            .filter(|c| !groups.keys.contains(&c.name))
            .map(|c| c.name.clone())
            .collect(),
    }
}

fn agg_label(v: &Value) -> String {
    match v {
        Value::Str(s) => s.to_string(),
        other => short_name(&other.to_str()).to_string(),
    }
}

fn aggregate(interp: &mut Interpreter, g: &Rc<GroupBy>, args: &Args) -> Res<Value> {
    // Named aggregation: agg(total=('amount', 'sum'), ...)
    if args.pos.is_empty() && !args.kw.is_empty() {
        let mut specs = Vec::with_capacity(args.kw.len());
        for (output, spec) in &args.kw {
            let Value::Tuple(pair) = spec else {
                return Err(Exception::type_error(format!(
                    "Must provide 'func' or tuples of '(column, aggfunc)', got {}",
                    spec.type_name()
                )));
            };
            let [column, func] = pair.as_slice() else {
                return Err(Exception::type_error("named aggregation expects (column, aggfunc)"));
            };
            specs.push(AggSpec {
                column: column.to_str(),
                agg: parse_agg(func)?,
                output: output.clone(),
            });
        }
        return Ok(finish_table(g, g.groups.aggregate(&specs)?));
    }

    let func = args.require(0, "func", "agg")?;
    let groups = selected(g)?;
    match func {
        Value::Dict(spec) => {
            let mut specs = Vec::new();
            for (column, funcs) in spec.borrow().entries.iter() {
                let column = column.to_str();
                match funcs {
                    Value::List(list) => {
                        for f in list.borrow().iter() {
                            specs.push(AggSpec {
                                column: column.clone(),
                                agg: parse_agg(f)?,
                                output: format!("{column}_{}", agg_label(f)),
                            });
                        }
                    }
                    f => specs.push(AggSpec {
                        column: column.clone(),
                        agg: parse_agg(f)?,
                        output: column.clone(),
                    }),
                }
            }
            Ok(finish_table(g, g.groups.aggregate(&specs)?))
        }
        Value::List(list) => {
            let funcs = list.borrow().clone();
            let columns = value_columns(g, &groups);
            let single = matches!(g.selection, Some(Selection::One(_)));
            let mut specs = Vec::new();
            for column in &columns {
                for f in &funcs {
                    specs.push(AggSpec {
                        column: column.clone(),
                        agg: parse_agg(f)?,
                        output: if single {
                            agg_label(f)
                        } else {
                            format!("{column}_{}", agg_label(f))
                        },
                    });
                }
            }
            Ok(finish_table(g, g.groups.aggregate(&specs)?))
        }
        f if matches!(f, Value::Function(_)) => apply(interp, g, f),
        f => reduce(g, parse_agg(f)?),
    }
}

/// The per-group object handed to user callbacks.
fn group_part(g: &GroupBy, rows: &[usize]) -> Res<Value> {
    let part = g.groups.table.take(rows);
    Ok(match &g.selection {
        Some(Selection::One(col)) => Value::series(part.column(col)?),
        Some(Selection::Many(cols)) => Value::frame(part.select(cols)?),
        None => Value::frame(part),
    })
}

fn apply(interp: &mut Interpreter, g: &Rc<GroupBy>, func: &Value) -> Res<Value> {
    if !is_callable(func) {
        return reduce(g, parse_agg(func)?);
    }
    let mut results = Vec::with_capacity(g.groups.len());
    for (_, rows) in &g.groups.groups {
        let part = group_part(g, rows)?;
        results.push(interp.call1(func, vec![part])?);
    }
    let index = key_index(&g.groups);

    if results.iter().all(|r| r.to_cell().is_some()) {
        let cells = results.iter().filter_map(Value::to_cell).collect();
        let series = Series::with_index(None, cells, index);
        return if g.as_index {
            Ok(Value::series(series))
        } else {
            series_to_frame(&series, "0")
        };
    }
    if results.iter().all(|r| matches!(r, Value::Frame(_))) {
        let tables: Vec<Table> = results
            .iter()
            .filter_map(|r| match r {
                Value::Frame(t) => Some(t.borrow().clone()),
                _ => None,
            })
            .collect();
        return Ok(Value::frame(Table::concat(&tables, false)?));
    }
    if results.iter().all(|r| matches!(r, Value::Series(_))) {
        let mut names: Vec<String> = Vec::new();
        for r in &results {
            if let Value::Series(s) = r {
                let s = s.borrow();
                for p in 0..s.len() {
                    let key = s.index.label_key(p);
                    if !names.contains(&key) {
                        names.push(key);
                    }
                }
            }
        }
        let mut columns: Vec<(String, Vec<Cell>)> = names.iter().map(|n| (n.clone(), Vec::new())).collect();
        for r in &results {
            if let Value::Series(s) = r {
                let s = s.borrow();
                for (name, cells) in columns.iter_mut() {
                    let found = (0..s.len()).find(|&p| s.index.label_key(p) == *name);
                    cells.push(found.map(|p| s.values[p].clone()).unwrap_or(Cell::Float(f64::NAN)));
                }
            }
        }
        return Ok(finish_table(g, Table::with_index(columns, index)?));
    }
    Err(Exception::type_error(
        "groupby apply results must be scalars, Series or DataFrames",
    ))
}

fn transform(interp: &mut Interpreter, g: &Rc<GroupBy>, func: &Value) -> Res<Value> {
    let Some(Selection::One(col)) = &g.selection else {
        return transform_frame(interp, g, func);
    };
    let table = &g.groups.table;
    let source = table.column(col)?;
    let mut out = vec![Cell::Float(f64::NAN); table.nrows()];
    for (_, rows) in &g.groups.groups {
        let part = source.take(rows);
        let produced = transformed(interp, &part, func)?;
        for (slot, &row) in rows.iter().enumerate() {
            out[row] = match &produced {
                Transformed::Scalar(c) => c.clone(),
                Transformed::Vector(v) => v.get(slot).cloned().unwrap_or(Cell::Float(f64::NAN)),
            };
        }
    }
    Ok(Value::series(Series::with_index(Some(col.clone()), out, table.index.clone())))
}

fn transform_frame(interp: &mut Interpreter, g: &Rc<GroupBy>, func: &Value) -> Res<Value> {
    let groups = selected(g)?;
    let table = &groups.table;
    let mut columns = Vec::new();
    for column in value_columns(g, &groups) {
        let source = table.column(&column)?;
        let mut out = vec![Cell::Float(f64::NAN); table.nrows()];
        let mut usable = true;
        for (_, rows) in &groups.groups {
            let part = source.take(rows);
            let produced = match transformed(interp, &part, func) {
                Ok(p) => p,
                Err(e) if e.kind == "TypeError" && !is_callable(func) => {
                    usable = false;
                    break;
                }
                Err(e) => return Err(e),
            };
            for (slot, &row) in rows.iter().enumerate() {
                out[row] = match &produced {
                    Transformed::Scalar(c) => c.clone(),
                    Transformed::Vector(v) => v.get(slot).cloned().unwrap_or(Cell::Float(f64::NAN)),
                };
            }
        }
        if usable {
            columns.push((column, out));
        }
    }
    Ok(Value::frame(Table::with_index(columns, table.index.clone())?))
}

enum Transformed {
    Scalar(Cell),
    Vector(Vec<Cell>),
}

fn transformed(interp: &mut Interpreter, part: &Series, func: &Value) -> Res<Transformed> {
    if !is_callable(func) {
        return Ok(Transformed::Scalar(part.aggregate(parse_agg(func)?)?));
    }
    let result = interp.call1(func, vec![Value::series(part.clone())])?;
    match &result {
        Value::Series(s) => Ok(Transformed::Vector(s.borrow().values.clone())),
        Value::Array(a) => Ok(Transformed::Vector(a.borrow().clone())),
        other => Ok(Transformed::Scalar(scalar_cell(other)?)),
    }
}

fn value_counts(g: &Rc<GroupBy>, args: &Args) -> Res<Value> {
    let Some(Selection::One(col)) = &g.selection else {
        return Err(Exception::attribute_error("DataFrameGroupBy", "value_counts"));
    };
    let normalize = args.bool_or(0, "normalize", false)?;
    let source = g.groups.table.column(col)?;
    let mut names = g.groups.keys.iter().cloned().map(Some).collect::<Vec<_>>();
    names.push(Some(col.clone()));
    let mut labels = Vec::new();
    let mut values = Vec::new();
    for (key, rows) in &g.groups.groups {
        let counts = source.take(rows).value_counts(normalize, false, true);
        for (p, count) in counts.values.iter().enumerate() {
            let mut label = key.clone();
            label.extend(counts.index.label(p).iter().cloned());
            labels.push(label);
            values.push(count.clone());
        }
    }
    let name = if normalize { "proportion" } else { "count" };
    Ok(Value::series(Series::with_index(
        Some(name.to_string()),
        values,
        Index { names, labels },
    )))
}
