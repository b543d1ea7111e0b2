// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// DataFrame methods.

use std::collections::HashMap;

use crate::frame::{cmp_labels, render_table, Agg, AggSpec, Cell, CellKey, Column, DType, Index, Series, Table};

use super::super::interp::Interpreter;
use super::super::value::{shared, Args, Dict, Exception, Res, Shared, Value};
use super::indexing::row_series;
use super::{
    ascending_flags, axis_is_columns, cells_of, dtype_name, groupby_value, is_callable,
    label_value, map_cells, names_of, parse_agg, scalar_cell,
};

pub(super) fn call(interp: &mut Interpreter, this: &Shared<Table>, name: &str, args: Args) -> Res<Value> {
    let inplace = args.kw("inplace").map(Value::truthy).transpose()?.unwrap_or(false);
    let result = match name {
        "apply" => return apply(interp, this, &args),
        "assign" => return assign(interp, this, args),
        "info" => {
            let text = this.borrow().info();
            interp.write_stdout(&text);
            return Ok(Value::None);
        }
        "insert" => return insert(this, &args),
        "pop" => {
            let column = args.require(0, "item", "pop")?.to_str();
            let mut t = this.borrow_mut();
            let series = t.column(&column)?;
            let remaining = t.drop_columns(&[column])?;
            *t = remaining;
            return Ok(Value::series(series));
        }
        _ => {
            let t = this.borrow();
            table_method(&t, name, &args)?
        }
    };
    if inplace {
        if let Value::Frame(updated) = &result {
            let replacement = updated.borrow().clone();
            *this.borrow_mut() = replacement;
            return Ok(Value::None);
        }
    }
    Ok(result)
}

fn frame(t: Table) -> Value {
    Value::frame(t)
}

fn count_arg(args: &Args, default: i64, len: usize) -> Res<usize> {
    let n = args.int_or(0, "n", default)?;
    Ok(if n < 0 {
        len.saturating_sub(n.unsigned_abs() as usize)
    } else {
        n as usize
    })
}

fn table_method(t: &Table, name: &str, args: &Args) -> Res<Value> {
    Ok(match name {
        "head" => frame(t.head(count_arg(args, 5, t.nrows())?)),
        "tail" => frame(t.tail(count_arg(args, 5, t.nrows())?)),
        "copy" => frame(t.clone()),
        "describe" => frame(t.describe()?),
        "sum" | "mean" | "median" | "min" | "max" | "std" | "var" | "count" => {
            let agg = parse_agg(&Value::str(name))?;
            let numeric_only = args.bool_or(usize::MAX, "numeric_only", false)?;
            if axis_is_columns(args, 0) {
                Value::series(row_reduce(t, agg)?)
            } else {
                Value::series(t.reduce(agg, numeric_only)?)
            }
        }
        "nunique" => Value::series(t.nunique()),
        "groupby" => {
            let by = names_of(args.require(0, "by", "groupby")?)?;
            let as_index = args.bool_or(usize::MAX, "as_index", true)?;
            groupby_value(t.group_by(&by)?, None, as_index)
        }
        "sort_values" => {
            let by = names_of(args.require(0, "by", "sort_values")?)?;
            frame(t.sort_by(&by, &ascending_flags(args, usize::MAX)?)?)
        }
        "sort_index" => {
            let ascending = args.bool_or(usize::MAX, "ascending", true)?;
            frame(t.sort_index(ascending))
        }
        "reset_index" => frame(t.reset_index(args.bool_or(usize::MAX, "drop", false)?)),
        "set_index" => frame(set_index(t, &names_of(args.require(0, "keys", "set_index")?)?)?),
        "dropna" => {
            let subset = args.kw("subset").map(names_of).transpose()?;
            let how_all = matches!(args.kw("how"), Some(Value::Str(s)) if &**s == "all");
            if how_all {
                let names = subset.unwrap_or_else(|| t.column_names());
                let checked = names
                    .iter()
                    .map(|n| t.column_ref(n))
                    .collect::<Result<Vec<_>, _>>()?;
                let keep: Vec<usize> = (0..t.nrows())
                    .filter(|&r| checked.iter().any(|c| !c.values[r].is_missing()))
                    .collect();
                frame(t.take(&keep))
            } else {
                frame(t.dropna(subset.as_deref())?)
            }
        }
        "fillna" => match args.get(0, "value") {
            Some(Value::Dict(fills)) => {
                let mut out = t.clone();
                for (k, v) in fills.borrow().entries.iter() {
                    let column = k.to_str();
                    let filled = out.column(&column)?.fillna(&scalar_cell(v)?);
                    out.set_column(&column, filled.values)?;
                }
                frame(out)
            }
            Some(v) => frame(t.fillna(&scalar_cell(v)?)),
            None => {
                return Err(Exception::value_error("Must specify a fill 'value' or 'method'."))
            }
        },
        "isnull" | "isna" => frame(t.isnull()),
        "notnull" | "notna" => map_cells(&frame(t.clone()), |c| Ok(Cell::Bool(!c.is_missing())))?,
        "drop" => frame(drop(t, args)?),
        "rename" => {
            let mut mapping = HashMap::new();
            if let Some(Value::Dict(d)) = args.kw("columns").or_else(|| args.get(0, "mapper")) {
                for (k, v) in d.borrow().entries.iter() {
                    mapping.insert(k.to_str(), v.to_str());
                }
            }
            frame(t.rename(&mapping))
        }
        "select_dtypes" => {
            let included = match args.get(0, "include") {
                Some(v) => t.select_dtypes(&names_of(v)?),
                None => t.clone(),
            };
            match args.kw("exclude") {
                Some(v) => {
                    let excluded = t.select_dtypes(&names_of(v)?).column_names();
                    frame(included.drop_columns(
                        &excluded
                            .into_iter()
                            .filter(|n| included.has_column(n))
                            .collect::<Vec<_>>(),
                    )?)
                }
                None => frame(included),
            }
        }
        "corr" => frame(t.corr()?),
        "drop_duplicates" => {
            let keep = duplicate_mask(t, args)?;
            let rows: Vec<usize> = (0..t.nrows()).filter(|&r| !keep[r]).collect();
            frame(t.take(&rows))
        }
        "duplicated" => {
            let dup = duplicate_mask(t, args)?;
            Value::series(Series::with_index(
                None,
                dup.into_iter().map(Cell::Bool).collect(),
                t.index.clone(),
            ))
        }
        "nlargest" | "nsmallest" => {
            let n = args.int_or(0, "n", 5)?.max(0) as usize;
            let columns = names_of(args.require(1, "columns", name)?)?;
            let sorted = t.sort_by(&columns, &[name == "nsmallest"])?;
            frame(sorted.head(n))
        }
        "astype" => frame(astype(t, args.require(0, "dtype", "astype")?)?),
        "to_dict" => to_dict(t, args)?,
        "iterrows" => Value::list(
            (0..t.nrows())
                .map(|r| {
                    Value::tuple(vec![
                        label_value(t.index.label(r)),
                        Value::series(row_series(t, r)),
                    ])
                })
                .collect(),
        ),
        "itertuples" => {
            let with_index = args.bool_or(0, "index", true)?;
            Value::list(
                (0..t.nrows())
                    .map(|r| {
                        let mut items = Vec::with_capacity(t.ncols() + 1);
                        if with_index {
                            items.push(label_value(t.index.label(r)));
                        }
                        items.extend(t.row(r).iter().map(|(_, c)| Value::from_cell(c)));
                        Value::tuple(items)
                    })
                    .collect(),
            )
        }
        "items" => Value::list(
            t.columns
                .iter()
                .map(|c| {
                    Ok(Value::tuple(vec![
                        Value::str(&c.name),
                        Value::series(t.column(&c.name)?),
                    ]))
                })
                .collect::<Res<Vec<_>>>()?,
        ),
        "keys" => Value::array(t.column_names().into_iter().map(Cell::Str).collect()),
        "agg" | "aggregate" => aggregate(t, args.require(0, "func", name)?)?,
        "round" => {
            let mut out = t.clone();
            for col in &t.columns {
                let decimals = match args.get(0, "decimals") {
                    Some(Value::Dict(d)) => match d.borrow().get(&Value::str(&col.name))? {
                        Some(v) => v.as_int().unwrap_or(0),
                        None => continue,
                    },
                    Some(v) => v.as_int().unwrap_or(0),
                    None => 0,
                };
                let rounded = t.column(&col.name)?.round(decimals as i32);
                out.set_column(&col.name, rounded.values)?;
            }
            frame(out)
        }
        "abs" => {
            let mut out = t.clone();
            for col in &t.columns {
                out.set_column(&col.name, t.column(&col.name)?.abs()?.values)?;
            }
            frame(out)
        }
        "pivot_table" => frame(pivot_table(t, args)?),
        "merge" => match args.require(0, "right", "merge")? {
            Value::Frame(right) => frame(super::construct::merge(t, &right.borrow(), args, 1)?),
            other => {
                return Err(Exception::type_error(format!(
                    "Can only merge Series or DataFrame objects, a {} was passed",
                    other.type_name()
                )))
            }
        },
        "value_counts" => {
            let subset = match args.get(0, "subset") {
                Some(v) => names_of(v)?,
                None => t.column_names(),
            };
            let counts = t.group_by(&subset)?.size();
            let mut counts = counts.sort_values(args.bool_or(usize::MAX, "ascending", false)?);
            counts.name = Some("count".into());
            Value::series(counts)
        }
        "to_string" => Value::str(render_table(t)),
        "equals" => match args.require(0, "other", "equals")? {
            Value::Frame(other) => Value::Bool(*t == *other.borrow()),
            _ => Value::Bool(false),
        },
        "idxmax" | "idxmin" => {
            let want_max = name == "idxmax";
            let mut labels = Vec::new();
            let mut values = Vec::new();
            for col in t.columns.iter().filter(|c| c.dtype.is_numeric()) {
                let series = t.column(&col.name)?;
                labels.push(Cell::Str(col.name.clone()));
                values.push(match series.arg_extreme(want_max) {
                    Some(p) => t.index.label(p)[0].clone(),
                    None => Cell::Float(f64::NAN),
                });
            }
            Value::series(Series::with_index(None, values, Index::from_cells(None, labels)))
        }
        "quantile" => {
            let q = args.get(0, "q").and_then(Value::as_f64).unwrap_or(0.5);
            let mut labels = Vec::new();
            let mut values = Vec::new();
            for col in t.columns.iter().filter(|c| c.dtype.is_numeric()) {
                labels.push(Cell::Str(col.name.clone()));
                values.push(Cell::Float(t.column(&col.name)?.quantile(q)?));
            }
            Value::series(Series::with_index(
                Some(crate::frame::format_float(q)),
                values,
                Index::from_cells(None, labels),
            ))
        }
        "replace" => {
            let mapping = replacement_pairs(args)?;
            map_cells(&frame(t.clone()), |c| Ok(replace_cell(&mapping, c)))?
        }
        "get" => {
            let key = args.require(0, "key", "get")?;
            match key {
                Value::Str(column) if t.has_column(column) => Value::series(t.column(column)?),
                _ => args.get(1, "default").cloned().unwrap_or(Value::None),
            }
        }
        "any" | "all" => {
            let want_all = name == "all";
            let labels = t.columns.iter().map(|c| Cell::Str(c.name.clone())).collect();
            let values = t
                .columns
                .iter()
                .map(|c| {
                    let mut present = c.values.iter().filter(|v| !v.is_missing());
                    Cell::Bool(if want_all {
                        present.all(Cell::truthy)
                    } else {
                        present.any(Cell::truthy)
                    })
                })
                .collect();
            Value::series(Series::with_index(None, values, Index::from_cells(None, labels)))
        }
        other => return Err(Exception::attribute_error("DataFrame", other)),
    })
}

/// Reduce across each row's numeric cells.
fn row_reduce(t: &Table, agg: Agg) -> Res<Series> {
    let numeric: Vec<&Column> = t
        .columns
        .iter()
        .filter(|c| c.dtype.is_numeric() || c.dtype == DType::Bool)
        .collect();
    let mut values = Vec::with_capacity(t.nrows());
    for r in 0..t.nrows() {
        let row = Series::new(None, numeric.iter().map(|c| c.values[r].clone()).collect());
        values.push(row.aggregate(agg)?);
    }
    Ok(Series::with_index(None, values, t.index.clone()))
}

fn set_index(t: &Table, keys: &[String]) -> Res<Table> {
    if let [single] = keys {
        return Ok(t.set_index(single)?);
    }
    let key_cols = keys
        .iter()
        .map(|k| t.column_ref(k))
        .collect::<Result<Vec<_>, _>>()?;
    let index = Index {
        names: keys.iter().cloned().map(Some).collect(),
        labels: (0..t.nrows())
            .map(|r| key_cols.iter().map(|c| c.values[r].clone()).collect())
            .collect(),
    };
    let rest = t.drop_columns(keys)?;
    Ok(Table::with_index(
        rest.columns.into_iter().map(|c| (c.name, c.values)).collect(),
        index,
    )?)
}

fn drop(t: &Table, args: &Args) -> Res<Table> {
    let ignore = matches!(args.kw("errors"), Some(Value::Str(s)) if &**s == "ignore");
    let (columns, rows) = match (args.kw("columns"), args.kw("index"), args.get(0, "labels")) {
        (Some(c), _, _) => (names_of(c)?, Vec::new()),
        (None, Some(i), _) => (Vec::new(), cells_of_labels(i)?),
        (None, None, Some(labels)) if axis_is_columns(args, 1) => (names_of(labels)?, Vec::new()),
        (None, None, Some(labels)) => (Vec::new(), cells_of_labels(labels)?),
        (None, None, None) => {
            return Err(Exception::value_error(
                "Need to specify at least one of 'labels', 'index' or 'columns'",
            ))
        }
    };
    let mut out = t.clone();
    if !columns.is_empty() {
        let existing: Vec<String> = if ignore {
            columns.into_iter().filter(|c| t.has_column(c)).collect()
        } else {
            columns
        };
        out = out.drop_columns(&existing)?;
    }
    if !rows.is_empty() {
        let mut dropped = Vec::new();
        for label in &rows {
            match out.index.position_of(std::slice::from_ref(label)) {
                Some(p) => dropped.push(p),
                None if ignore => {}
                None => return Err(Exception::key_error(format!("\"[{label}] not found in axis\""))),
            }
        }
        let keep: Vec<usize> = (0..out.nrows()).filter(|p| !dropped.contains(p)).collect();
        out = out.take(&keep);
    }
    Ok(out)
}

fn cells_of_labels(v: &Value) -> Res<Vec<Cell>> {
    match v {
        Value::List(_) | Value::Tuple(_) | Value::Array(_) | Value::Series(_) => cells_of(v),
        other => Ok(vec![scalar_cell(other)?]),
    }
}

/// True for rows repeating an earlier (or, with `keep='last'`, later) row.
fn duplicate_mask(t: &Table, args: &Args) -> Res<Vec<bool>> {
    let subset = match args.get(0, "subset") {
        Some(v) if !v.is_none() => names_of(v)?,
        _ => t.column_names(),
    };
    let cols = subset
        .iter()
        .map(|n| t.column_ref(n))
        .collect::<Result<Vec<_>, _>>()?;
    let keep_last = matches!(args.kw("keep"), Some(Value::Str(s)) if &**s == "last");
    let keep_none = matches!(args.kw("keep"), Some(Value::Bool(false)));
    let key = |r: usize| -> Vec<CellKey> { cols.iter().map(|c| c.values[r].key()).collect() };
    let mut counts: HashMap<Vec<CellKey>, usize> = HashMap::new();
    for r in 0..t.nrows() {
        *counts.entry(key(r)).or_default() += 1;
    }
    let mut seen: HashMap<Vec<CellKey>, usize> = HashMap::new();
    let order: Vec<usize> = if keep_last {
        (0..t.nrows()).rev().collect()
    } else {
        (0..t.nrows()).collect()
    };
    let mut dup = vec![false; t.nrows()];
    for r in order {
        let k = key(r);
        let n = seen.entry(k.clone()).or_default();
        dup[r] = if keep_none { counts[&k] > 1 } else { *n > 0 };
        *n += 1;
    }
    Ok(dup)
}

fn astype(t: &Table, dtype: &Value) -> Res<Table> {
    let mut out = t.clone();
    match dtype {
        Value::Dict(d) => {
            for (k, v) in d.borrow().entries.iter() {
                let column = k.to_str();
                let cast = t.column(&column)?.astype(&dtype_name(v)?)?;
                out.set_column(&column, cast.values)?;
            }
        }
        other => {
            let target = dtype_name(other)?;
            for col in &t.columns {
                let cast = t.column(&col.name)?.astype(&target)?;
                out.set_column(&col.name, cast.values)?;
            }
        }
    }
    Ok(out)
}

fn to_dict(t: &Table, args: &Args) -> Res<Value> {
    let orient = args.str_opt(0, "orient")?.unwrap_or_else(|| "dict".into());
    let row_dict = |r: usize| -> Res<Value> {
        let pairs = t
            .row(r)
            .into_iter()
            .map(|(n, c)| (Value::str(n), Value::from_cell(&c)))
            .collect();
        Ok(Value::Dict(shared(Dict::from_pairs(pairs)?)))
    };
    match orient.as_str() {
        "records" => Ok(Value::list(
            (0..t.nrows()).map(row_dict).collect::<Res<Vec<_>>>()?,
        )),
        "index" => {
            let mut out = Dict::new();
            for r in 0..t.nrows() {
                out.insert(label_value(t.index.label(r)), row_dict(r)?)?;
            }
            Ok(Value::Dict(shared(out)))
        }
        "list" => {
            let mut out = Dict::new();
            for col in &t.columns {
                out.insert(
                    Value::str(&col.name),
                    Value::list(col.values.iter().map(Value::from_cell).collect()),
                )?;
            }
            Ok(Value::Dict(shared(out)))
        }
        "dict" => {
            let mut out = Dict::new();
            for col in &t.columns {
                let mut inner = Dict::new();
                for (r, cell) in col.values.iter().enumerate() {
                    inner.insert(label_value(t.index.label(r)), Value::from_cell(cell))?;
                }
                out.insert(Value::str(&col.name), Value::Dict(shared(inner)))?;
            }
            Ok(Value::Dict(shared(out)))
        }
        other => Err(Exception::value_error(format!(
            "orient '{other}' not understood"
        ))),
    }
}

fn aggregate(t: &Table, func: &Value) -> Res<Value> {
    match func {
        Value::Dict(d) => {
            let mut labels = Vec::new();
            let mut values = Vec::new();
            for (k, v) in d.borrow().entries.iter() {
                let column = k.to_str();
                labels.push(Cell::Str(column.clone()));
                values.push(t.column(&column)?.aggregate(parse_agg(v)?)?);
            }
            Ok(Value::series(Series::with_index(None, values, Index::from_cells(None, labels))))
        }
        Value::List(items) => {
            let aggs: Vec<(String, Agg)> = items
                .borrow()
                .iter()
                .map(|v| Ok((v.to_str(), parse_agg(v)?)))
                .collect::<Res<_>>()?;
            let mut columns = Vec::new();
            for col in t.columns.iter().filter(|c| c.dtype.is_numeric()) {
                let series = t.column(&col.name)?;
                let values = aggs
                    .iter()
                    .map(|(_, agg)| series.aggregate(*agg))
                    .collect::<Result<Vec<_>, _>>()?;
                columns.push((col.name.clone(), values));
            }
            let index = Index::from_cells(
                None,
                aggs.iter()
                    .map(|(n, _)| Cell::Str(super::super::value::short_name(n).to_string()))
                    .collect(),
            );
            Ok(Value::frame(Table::with_index(columns, index)?))
        }
        other => Ok(Value::series(t.reduce(parse_agg(other)?, false)?)),
    }
}

fn pivot_table(t: &Table, args: &Args) -> Res<Table> {
    let index = names_of(
        args.kw("index")
            .ok_or_else(|| Exception::type_error("pivot_table() missing required argument: 'index'"))?,
    )?;
    let pivot = args.kw("columns").map(names_of).transpose()?;
    let agg = match args.kw("aggfunc") {
        Some(v) => parse_agg(v)?,
        None => Agg::Mean,
    };
    let fill = args.kw("fill_value").map(scalar_cell).transpose()?;
    let mut excluded = index.clone();
    excluded.extend(pivot.iter().flatten().cloned());
    let values = match args.get(0, "values") {
        Some(v) if !v.is_none() => names_of(v)?,
        _ => t
            .columns
            .iter()
            .filter(|c| c.dtype.is_numeric() && !excluded.contains(&c.name))
            .map(|c| c.name.clone())
            .collect(),
    };

    let Some(pivot) = pivot else {
        let specs: Vec<AggSpec> = values
            .iter()
            .map(|v| AggSpec {
                column: v.clone(),
                agg,
                output: v.clone(),
            })
            .collect();
        return Ok(t.group_by(&index)?.aggregate(&specs)?);
    };

    let mut keys = index.clone();
    keys.extend(pivot.iter().cloned());
    let groups = t.group_by(&keys)?;
    let same = |a: &[Cell], b: &[Cell]| a.iter().zip(b).all(|(x, y)| x.group_eq(y));
    let mut row_labels: Vec<Vec<Cell>> = Vec::new();
    for (label, _) in &groups.groups {
        let head = &label[..index.len()];
        if !row_labels.iter().any(|r| same(r, head)) {
            row_labels.push(head.to_vec());
        }
    }
    let mut pivot_values: Vec<Vec<Cell>> = Vec::new();
    for (label, _) in &groups.groups {
        let tail = &label[index.len()..];
        if !pivot_values.iter().any(|p| same(p, tail)) {
            pivot_values.push(tail.to_vec());
        }
    }
    pivot_values.sort_by(|a, b| cmp_labels(a, b));

    let mut columns = Vec::new();
    for value in &values {
        let reduced = groups.aggregate_column(value, agg)?;
        for pv in &pivot_values {
            let pv_name: Vec<String> = pv.iter().map(|c| c.to_string()).collect();
            let name = if values.len() == 1 {
                pv_name.join("_")
            } else {
                format!("{value}_{}", pv_name.join("_"))
            };
            let cells = row_labels
                .iter()
                .map(|rl| {
                    let mut full = rl.clone();
                    full.extend(pv.iter().cloned());
                    match reduced.index.position_of(&full) {
                        Some(p) => reduced.values[p].clone(),
                        None => fill.clone().unwrap_or(Cell::Float(f64::NAN)),
                    }
                })
                .collect();
            columns.push((name, cells));
        }
    }
    let out_index = Index {
        names: index.iter().cloned().map(Some).collect(),
        labels: row_labels,
    };
    Ok(Table::with_index(columns, out_index)?)
}

/// `(old, new)` pairs from `replace(to_replace, value)` or a mapping.
pub(super) fn replacement_pairs(args: &Args) -> Res<Vec<(Cell, Cell)>> {
    match (args.get(0, "to_replace"), args.get(1, "value")) {
        (Some(Value::Dict(d)), _) => d
            .borrow()
            .entries
            .iter()
            .map(|(k, v)| Ok((scalar_cell(k)?, scalar_cell(v)?)))
            .collect(),
        (Some(old @ (Value::List(_) | Value::Tuple(_))), Some(new)) => {
            let new_cells = match new {
                Value::List(_) | Value::Tuple(_) => cells_of(new)?,
                scalar => vec![scalar_cell(scalar)?; cells_of(old)?.len()],
            };
            Ok(cells_of(old)?.into_iter().zip(new_cells).collect())
        }
        (Some(old), Some(new)) => Ok(vec![(scalar_cell(old)?, scalar_cell(new)?)]),
        _ => Err(Exception::type_error(
            "replace() requires 'to_replace' and 'value'",
        )),
    }
}

pub(super) fn replace_cell(mapping: &[(Cell, Cell)], cell: &Cell) -> Cell {
    mapping
        .iter()
        .find(|(old, _)| old.group_eq(cell))
        .map(|(_, new)| new.clone())
        .unwrap_or_else(|| cell.clone())
}

// ---------------------------------------------------------------------------
// Methods that call back into the interpreter
// ---------------------------------------------------------------------------

fn apply(interp: &mut Interpreter, this: &Shared<Table>, args: &Args) -> Res<Value> {
    let func = args.require(0, "func", "apply")?.clone();
    let t = this.borrow().clone();
    let by_row = axis_is_columns(args, 1);
    let (labels, inputs): (Index, Vec<Value>) = if by_row {
        (
            t.index.clone(),
            (0..t.nrows()).map(|r| Value::series(row_series(&t, r))).collect(),
        )
    } else {
        (
            Index::from_cells(None, t.column_names().into_iter().map(Cell::Str).collect()),
            t.columns
                .iter()
                .map(|c| Ok(Value::series(t.column(&c.name)?)))
                .collect::<Res<Vec<_>>>()?,
        )
    };
    let mut results = Vec::with_capacity(inputs.len());
    for input in inputs {
        results.push(interp.call1(&func, vec![input])?);
    }
    if results.iter().all(|r| r.to_cell().is_some()) {
        let cells = results.iter().filter_map(Value::to_cell).collect();
        return Ok(Value::series(Series::with_index(None, cells, labels)));
    }
    if by_row && results.iter().all(|r| matches!(r, Value::Series(_))) {
        let mut names: Vec<String> = Vec::new();
        for r in &results {
            if let Value::Series(s) = r {
                for p in 0..s.borrow().len() {
                    let key = s.borrow().index.label_key(p);
                    if !names.contains(&key) {
                        names.push(key);
                    }
                }
            }
        }
        let mut columns: Vec<(String, Vec<Cell>)> =
            names.iter().map(|n| (n.clone(), Vec::new())).collect();
        for r in &results {
            if let Value::Series(s) = r {
                let s = s.borrow();
                for (name, cells) in columns.iter_mut() {
                    let found = (0..s.len()).find(|&p| s.index.label_key(p) == *name);
                    cells.push(found.map(|p| s.values[p].clone()).unwrap_or(Cell::Float(f64::NAN)));
                }
            }
        }
        return Ok(Value::frame(Table::with_index(columns, labels)?));
    }
    Ok(Value::list(results))
}

fn assign(interp: &mut Interpreter, this: &Shared<Table>, args: Args) -> Res<Value> {
    let out = Value::frame(this.borrow().clone());
    for (name, value) in args.kw {
        let computed = if is_callable(&value) {
            interp.call1(&value, vec![out.clone()])?
        } else {
            value
        };
        super::set_item(interp, &out, Value::str(&name), computed)?;
    }
    Ok(out)
}

fn insert(this: &Shared<Table>, args: &Args) -> Res<Value> {
    let loc = args.int_or(0, "loc", 0)?.max(0) as usize;
    let column = args.require(1, "column", "insert")?.to_str();
    let value = args.require(2, "value", "insert")?;
    if this.borrow().has_column(&column) {
        return Err(Exception::value_error(format!("cannot insert {column}, already exists")));
    }
    let values = {
        let t = this.borrow();
        match value {
            Value::Series(_) | Value::Array(_) | Value::List(_) | Value::Tuple(_) => cells_of(value)?,
            scalar => vec![scalar_cell(scalar)?; t.nrows()],
        }
    };
    let mut t = this.borrow_mut();
    t.set_column(&column, values)?;
    if let Some(col) = t.columns.pop() {
        let at = loc.min(t.columns.len());
        t.columns.insert(at, col);
    }
    Ok(Value::None)
}
