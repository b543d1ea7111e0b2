// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// Series methods.

use crate::frame::{cmp_labels, distinct, render_series, Cell, DType, Index, Series, Table};

use super::super::interp::Interpreter;
use super::super::value::{shared, short_name, Args, Dict, Exception, Res, Shared, Value};
use super::methods_frame::{replace_cell, replacement_pairs};
use super::{cells_of, dtype_name, index_value, is_callable, label_value, parse_agg, reduction, scalar_cell};

pub(super) fn call(interp: &mut Interpreter, this: &Shared<Series>, name: &str, args: Args) -> Res<Value> {
    let inplace = args.kw("inplace").map(Value::truthy).transpose()?.unwrap_or(false);
    let result = match name {
        "apply" | "map" => return map(interp, this, &args),
        _ => {
            let s = this.borrow();
            series_method(&s, name, &args)?
        }
    };
    if inplace {
        if let Value::Series(updated) = &result {
            let replacement = updated.borrow().clone();
            *this.borrow_mut() = replacement;
            return Ok(Value::None);
        }
    }
    Ok(result)
}

fn nan() -> Cell {
    Cell::Float(f64::NAN)
}

fn series_method(s: &Series, name: &str, args: &Args) -> Res<Value> {
    Ok(match name {
        "head" | "tail" => {
            let n = args.int_or(0, "n", 5)?;
            let n = if n < 0 {
                s.len().saturating_sub(n.unsigned_abs() as usize)
            } else {
                n as usize
            };
            Value::series(if name == "head" { s.head(n) } else { s.tail(n) })
        }
        "copy" => Value::series(s.clone()),
        "sum" | "mean" | "median" | "min" | "max" | "std" | "var" | "count" | "nunique" => {
            reduction(s, name)?
        }
        "prod" => prod(s)?,
        "unique" => Value::array(s.unique()),
        "value_counts" => {
            let normalize = args.bool_or(0, "normalize", false)?;
            let ascending = args.bool_or(usize::MAX, "ascending", false)?;
            let dropna = args.bool_or(usize::MAX, "dropna", true)?;
            Value::series(s.value_counts(normalize, ascending, dropna))
        }
        "sort_values" => Value::series(s.sort_values(args.bool_or(usize::MAX, "ascending", true)?)),
        "sort_index" => Value::series(s.sort_index(args.bool_or(usize::MAX, "ascending", true)?)),
        "reset_index" => reset_index(s, args)?,
        "isnull" | "isna" => Value::series(s.isnull()),
        "notnull" | "notna" => Value::series(s.notnull()),
        "fillna" => match args.get(0, "value") {
            Some(v) => Value::series(s.fillna(&scalar_cell(v)?)),
            None => match args.kw("method").and_then(Value::as_str) {
                Some("ffill" | "pad") => Value::series(fill_forward(s, false)),
                Some("bfill" | "backfill") => Value::series(fill_forward(s, true)),
                _ => return Err(Exception::value_error("Must specify a fill 'value' or 'method'.")),
            },
        },
        "ffill" => Value::series(fill_forward(s, false)),
        "bfill" => Value::series(fill_forward(s, true)),
        "dropna" => Value::series(s.dropna()),
        "cumsum" => Value::series(s.cumsum()?),
        "round" => Value::series(s.round(args.int_or(0, "decimals", 0)? as i32)),
        "abs" => Value::series(s.abs()?),
        "isin" => Value::series(s.isin(&cells_of(args.require(0, "values", "isin")?)?)),
        "between" => {
            let low = scalar_cell(args.require(0, "left", "between")?)?;
            let high = scalar_cell(args.require(1, "right", "between")?)?;
            Value::series(s.between(&low, &high)?)
        }
        "astype" => Value::series(s.astype(&dtype_name(args.require(0, "dtype", "astype")?)?)?),
        "tolist" | "to_list" => Value::list(s.values.iter().map(Value::from_cell).collect()),
        "to_dict" => {
            let mut out = Dict::new();
            for (p, cell) in s.values.iter().enumerate() {
                out.insert(label_value(s.index.label(p)), Value::from_cell(cell))?;
            }
            Value::Dict(shared(out))
        }
        "to_frame" => {
            let column = match args.get(0, "name") {
                Some(v) => v.to_str(),
                None => s.name.clone().unwrap_or_else(|| "0".into()),
            };
            Value::frame(Table::with_index(vec![(column, s.values.clone())], s.index.clone())?)
        }
        "idxmax" | "idxmin" => match s.arg_extreme(name == "idxmax") {
            Some(p) => label_value(s.index.label(p)),
            None => Value::Float(f64::NAN),
        },
        "argmax" | "argmin" => match s.arg_extreme(name == "argmax") {
            Some(p) => Value::Int(p as i64),
            None => Value::Int(-1),
        },
        "nlargest" => Value::series(s.nlargest(args.int_or(0, "n", 5)?.max(0) as usize)),
        "nsmallest" => Value::series(s.nsmallest(args.int_or(0, "n", 5)?.max(0) as usize)),
        "quantile" => match args.get(0, "q") {
            Some(q @ (Value::List(_) | Value::Tuple(_) | Value::Array(_))) => {
                let qs = cells_of(q)?;
                let mut values = Vec::with_capacity(qs.len());
                for q in &qs {
                    values.push(Cell::Float(s.quantile(q.as_f64().unwrap_or(0.5))?));
                }
                Value::series(Series::with_index(s.name.clone(), values, Index::from_cells(None, qs)))
            }
            q => Value::Float(s.quantile(q.and_then(Value::as_f64).unwrap_or(0.5))?),
        },
        "describe" => describe(s)?,
        "mode" => {
            let groups: Vec<(Cell, usize)> = distinct(&s.values)
                .into_iter()
                .filter(|(c, _)| !c.is_missing())
                .map(|(c, p)| (c, p.len()))
                .collect();
            let top = groups.iter().map(|(_, n)| *n).max().unwrap_or(0);
            let mut modes: Vec<Cell> = groups
                .into_iter()
                .filter(|(_, n)| *n == top)
                .map(|(c, _)| c)
                .collect();
            modes.sort_by(|a, b| a.total_cmp(b));
            Value::series(Series::new(s.name.clone(), modes))
        }
        "any" => Value::Bool(s.values.iter().filter(|c| !c.is_missing()).any(Cell::truthy)),
        "all" => Value::Bool(s.values.iter().filter(|c| !c.is_missing()).all(Cell::truthy)),
        "rename" => match args.get(0, "index") {
            Some(Value::Dict(mapping)) => {
                let mapping = mapping.borrow();
                let mut labels = Vec::with_capacity(s.len());
                for p in 0..s.len() {
                    let label = label_value(s.index.label(p));
                    labels.push(match mapping.get(&label)? {
                        Some(v) => scalar_cell(v)?,
                        None => s.index.label(p)[0].clone(),
                    });
                }
                let mut out = s.clone();
                out.index = Index::from_cells(s.index.names.first().cloned().flatten(), labels);
                Value::series(out)
            }
            Some(v) => {
                let mut out = s.clone();
                out.name = if v.is_none() { None } else { Some(v.to_str()) };
                Value::series(out)
            }
            None => Value::series(s.clone()),
        },
        "items" => Value::list(
            s.values
                .iter()
                .enumerate()
                .map(|(p, c)| Value::tuple(vec![label_value(s.index.label(p)), Value::from_cell(c)]))
                .collect(),
        ),
        "keys" => index_value(&s.index),
        "drop_duplicates" => {
            let keep_last = matches!(args.kw("keep"), Some(Value::Str(k)) if &**k == "last");
            let mut positions: Vec<usize> = distinct(&s.values)
                .into_iter()
                .filter_map(|(_, p)| if keep_last { p.last().copied() } else { p.first().copied() })
                .collect();
            positions.sort_unstable();
            Value::series(s.take(&positions))
        }
        "duplicated" => {
            let mut dup = vec![true; s.len()];
            for (_, positions) in distinct(&s.values) {
                if let Some(&first) = positions.first() {
                    dup[first] = false;
                }
            }
            Value::series(s.derive(dup.into_iter().map(Cell::Bool).collect()))
        }
        "clip" => {
            let lower = args.opt(0, "lower").and_then(Value::as_f64);
            let upper = args.opt(1, "upper").and_then(Value::as_f64);
            let mut out = Vec::with_capacity(s.len());
            for cell in &s.values {
                out.push(match cell.as_f64() {
                    Some(x) if !cell.is_missing() => {
                        let clipped = upper.map_or(x, |u| x.min(u));
                        let clipped = lower.map_or(clipped, |l| clipped.max(l));
                        match cell {
                            Cell::Int(_) if clipped.fract() == 0.0 => Cell::Int(clipped as i64),
                            _ => Cell::Float(clipped),
                        }
                    }
                    _ if cell.is_missing() => cell.clone(),
                    _ => {
                        return Err(Exception::type_error(format!(
                            "'<' not supported between instances of '{}' and 'float'",
                            cell.type_name()
                        )))
                    }
                });
            }
            Value::series(s.derive(out))
        }
        "diff" => lagged(s, args, |cur, prev| cur - prev)?,
        "pct_change" => lagged(s, args, |cur, prev| cur / prev - 1.0)?,
        "shift" => {
            let periods = args.int_or(0, "periods", 1)?;
            let fill = match args.kw("fill_value") {
                Some(v) => scalar_cell(v)?,
                None if s.dtype == DType::DateTime => Cell::NaT,
                None => nan(),
            };
            let values = (0..s.len() as i64)
                .map(|p| {
                    let from = p - periods;
                    if from < 0 || from >= s.len() as i64 {
                        fill.clone()
                    } else {
                        s.values[from as usize].clone()
                    }
                })
                .collect();
            Value::series(s.derive(values))
        }
        "agg" | "aggregate" => match args.require(0, "func", name)? {
            Value::List(funcs) => {
                let funcs = funcs.borrow();
                let mut labels = Vec::with_capacity(funcs.len());
                let mut values = Vec::with_capacity(funcs.len());
                for f in funcs.iter() {
                    labels.push(Cell::Str(short_name(&f.to_str()).to_string()));
                    values.push(s.aggregate(parse_agg(f)?)?);
                }
                Value::series(Series::with_index(s.name.clone(), values, Index::from_cells(None, labels)))
            }
            f => Value::from_cell(&s.aggregate(parse_agg(f)?)?),
        },
        "to_string" => Value::str(render_series(s)),
        "get" => {
            let key = scalar_cell(args.require(0, "key", "get")?)?;
            match s.get_label(&key) {
                Some(cell) => Value::from_cell(cell),
                None => args.get(1, "default").cloned().unwrap_or(Value::None),
            }
        }
        "replace" => {
            let mapping = replacement_pairs(args)?;
            Value::series(s.derive(s.values.iter().map(|c| replace_cell(&mapping, c)).collect()))
        }
        "equals" => match args.require(0, "other", "equals")? {
            Value::Series(other) => Value::Bool(s.values == other.borrow().values),
            _ => Value::Bool(false),
        },
        other => return Err(Exception::attribute_error("Series", other)),
    })
}

fn prod(s: &Series) -> Res<Value> {
    let present: Vec<&Cell> = s.values.iter().filter(|c| !c.is_missing()).collect();
    if present.iter().all(|c| matches!(c, Cell::Int(_) | Cell::Bool(_))) {
        let mut acc: i64 = 1;
        for c in &present {
            let x = c.as_f64().unwrap_or(1.0) as i64;
            acc = acc.wrapping_mul(x);
        }
        return Ok(Value::Int(acc));
    }
    let mut acc = 1.0;
    for c in present {
        acc *= c.as_f64().ok_or_else(|| {
            Exception::type_error(format!("can't multiply sequence by non-int of type '{}'", c.type_name()))
        })?;
    }
    Ok(Value::Float(acc))
}

fn reset_index(s: &Series, args: &Args) -> Res<Value> {
    if args.bool_or(usize::MAX, "drop", false)? {
        return Ok(Value::series(Series::new(s.name.clone(), s.values.clone())));
    }
    let column = match args.kw("name") {
        Some(v) => v.to_str(),
        None => s.name.clone().unwrap_or_else(|| "0".into()),
    };
    let table = Table::with_index(vec![(column, s.values.clone())], s.index.clone())?;
    Ok(Value::frame(table.reset_index(false)))
}

fn fill_forward(s: &Series, backward: bool) -> Series {
    let mut values = s.values.clone();
    let mut last: Option<Cell> = None;
    let order: Vec<usize> = if backward {
        (0..values.len()).rev().collect()
    } else {
        (0..values.len()).collect()
    };
    for p in order {
        if values[p].is_missing() {
            if let Some(fill) = &last {
                values[p] = fill.clone();
            }
        } else {
            last = Some(values[p].clone());
        }
    }
    s.derive(values)
}

/// Element-wise `f(current, lagged)` for `diff` and `pct_change`.
fn lagged(s: &Series, args: &Args, f: impl Fn(f64, f64) -> f64) -> Res<Value> {
    let periods = args.int_or(0, "periods", 1)?;
    let mut out = Vec::with_capacity(s.len());
    for p in 0..s.len() as i64 {
        let from = p - periods;
        if from < 0 || from >= s.len() as i64 {
            out.push(nan());
            continue;
        }
        let (cur, prev) = (&s.values[p as usize], &s.values[from as usize]);
        match (cur, prev) {
            (Cell::DateTime(a), Cell::DateTime(b)) => out.push(Cell::Timedelta(*a - *b)),
            _ => match (cur.as_f64(), prev.as_f64()) {
                (Some(a), Some(b)) => out.push(Cell::Float(f(a, b))),
                _ if cur.is_missing() || prev.is_missing() => out.push(nan()),
                _ => {
                    return Err(Exception::type_error(format!(
                        "unsupported operand type(s) for -: '{}' and '{}'",
                        cur.type_name(),
                        prev.type_name()
                    )))
                }
            },
        }
    }
    Ok(Value::series(s.derive(out)))
}

fn describe(s: &Series) -> Res<Value> {
    if s.dtype.is_numeric() {
        let column = s.name.clone().unwrap_or_else(|| "0".into());
        let summary = Table::new(vec![(column.clone(), s.values.clone())])?.describe()?;
        let mut out = summary.column(&column)?;
        out.name = s.name.clone();
        return Ok(Value::series(out));
    }
    let counts = s.value_counts(false, false, true);
    let (top, freq) = match counts.values.first() {
        Some(freq) => (counts.index.label(0)[0].clone(), freq.clone()),
        None => (Cell::Null, Cell::Null),
    };
    let labels = ["count", "unique", "top", "freq"]
        .iter()
        .map(|l| Cell::Str(l.to_string()))
        .collect();
    let values = vec![
        Cell::Int(s.count() as i64),
        Cell::Int(s.nunique() as i64),
        top,
        freq,
    ];
    Ok(Value::series(Series::with_index(s.name.clone(), values, Index::from_cells(None, labels))))
}

// ---------------------------------------------------------------------------
// apply / map
// ---------------------------------------------------------------------------

fn map(interp: &mut Interpreter, this: &Shared<Series>, args: &Args) -> Res<Value> {
    let func = args.require(0, "func", "map")?.clone();
    let s = this.borrow().clone();
    let skip_missing = matches!(args.kw("na_action"), Some(Value::Str(a)) if &**a == "ignore");
    let mut results = Vec::with_capacity(s.len());
    match &func {
        Value::Dict(mapping) => {
            let mapping = mapping.borrow();
            for cell in &s.values {
                results.push(match mapping.get(&Value::from_cell(cell))? {
                    Some(v) => v.clone(),
                    None => Value::Float(f64::NAN),
                });
            }
        }
        Value::Series(lookup) => {
            let lookup = lookup.borrow();
            for cell in &s.values {
                results.push(
                    lookup
                        .get_label(cell)
                        .map(Value::from_cell)
                        .unwrap_or(Value::Float(f64::NAN)),
                );
            }
        }
        f if is_callable(f) => {
            for cell in &s.values {
                if skip_missing && cell.is_missing() {
                    results.push(Value::from_cell(cell));
                    continue;
                }
                results.push(interp.call1(f, vec![Value::from_cell(cell)])?);
            }
        }
        other => {
            return Err(Exception::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            )))
        }
    }
    if results.iter().all(|r| r.to_cell().is_some()) {
        return Ok(Value::series(s.derive(results.iter().filter_map(Value::to_cell).collect())));
    }
    // Series results expand into a frame, one row per element.
    if results.iter().all(|r| matches!(r, Value::Series(_))) {
        let mut names: Vec<Vec<Cell>> = Vec::new();
        for r in &results {
            if let Value::Series(row) = r {
                let row = row.borrow();
                for p in 0..row.len() {
                    let label = row.index.label(p).to_vec();
                    if !names.iter().any(|n| cmp_labels(n, &label).is_eq()) {
                        names.push(label);
                    }
                }
            }
        }
        let mut columns: Vec<(String, Vec<Cell>)> = names
            .iter()
            .map(|n| (n.iter().map(|c| c.to_string()).collect::<Vec<_>>().join("_"), Vec::new()))
            .collect();
        for r in &results {
            if let Value::Series(row) = r {
                let row = row.borrow();
                for (label, (_, cells)) in names.iter().zip(columns.iter_mut()) {
                    cells.push(
                        row.index
                            .position_of(label)
                            .map(|p| row.values[p].clone())
                            .unwrap_or_else(nan),
                    );
                }
            }
        }
        return Ok(Value::frame(Table::with_index(columns, s.index.clone())?));
    }
    Err(Exception::type_error(
        "apply() results must be scalars or Series",
    ))
}
