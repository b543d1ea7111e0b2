// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// Module-level pandas functions: constructors and converters.

use std::collections::HashMap;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};

use crate::frame::{
    convert_all, format_float, parse_datetime, to_datetime, to_numeric, Cell, CellKey, Errors,
    Index, Series, Table,
};

use super::super::interp::Interpreter;
use super::super::stdlib::{now, timedelta_from_args};
use super::super::value::{Args, Exception, Res, Value};
use super::{cells_of, map_cells, names_of, scalar_cell, MAX_RANGE_CELLS};

pub(crate) fn call_function(interp: &mut Interpreter, func: &str, args: Args) -> Res<Value> {
    match func {
        "DataFrame" => data_frame(interp, &args),
        "Series" => series(&args),
        "to_datetime" => convert_datetime(&args),
        "to_numeric" => {
            let errors = errors_arg(&args)?;
            map_or_scalar(args.require(0, "arg", "to_numeric")?, |c| to_numeric(c, errors))
        }
        "concat" => concat(&args),
        "isna" | "isnull" => {
            map_or_scalar(args.require(0, "obj", func)?, |c| Ok(Cell::Bool(c.is_missing())))
        }
        "notna" | "notnull" => {
            map_or_scalar(args.require(0, "obj", func)?, |c| Ok(Cell::Bool(!c.is_missing())))
        }
        "Timestamp" => match args.require(0, "ts_input", "Timestamp")? {
            Value::Str(text) => parse_datetime(text)
                .map(Value::DateTime)
                .ok_or_else(|| Exception::value_error(format!("could not convert string to Timestamp: '{text}'"))),
            Value::DateTime(dt) => Ok(Value::DateTime(*dt)),
            Value::NaT | Value::None => Ok(Value::NaT),
            other => Err(Exception::type_error(format!(
                "Cannot convert input [{}] of type {} to Timestamp",
                other.repr(),
                other.type_name()
            ))),
        },
        "Timestamp.now" | "Timestamp.today" => Ok(Value::DateTime(now())),
        "Timedelta" => match args.get(0, "value") {
            Some(Value::Str(text)) => parse_timedelta(text)
                .map(Value::Timedelta)
                .ok_or_else(|| Exception::value_error(format!("unit abbreviation w/o a number: '{text}'"))),
            Some(Value::Timedelta(d)) => Ok(Value::Timedelta(*d)),
            _ => Ok(Value::Timedelta(timedelta_from_args(&args)?)),
        },
        "date_range" => date_range(&args),
        "unique" => Ok(Value::array(
            crate::frame::distinct(&cells_of(args.require(0, "values", "unique")?)?)
                .into_iter()
                .map(|(c, _)| c)
                .collect(),
        )),
        "set_option" => Ok(Value::None),
        "cut" => cut(&args),
        "merge" => {
            let (Value::Frame(left), Value::Frame(right)) = (
                args.require(0, "left", "merge")?,
                args.require(1, "right", "merge")?,
            ) else {
                return Err(Exception::type_error("Can only merge Series or DataFrame objects"));
            };
            let merged = merge(&left.borrow(), &right.borrow(), &args, 2)?;
            Ok(Value::frame(merged))
        }
        other => Err(Exception::new(
            "AttributeError",
            format!("module 'pandas' has no attribute '{other}'"),
        )),
    }
}

fn errors_arg(args: &Args) -> Res<Errors> {
    match args.str_opt(usize::MAX, "errors")? {
        Some(text) => Ok(Errors::parse(&text)?),
        None => Ok(Errors::Raise),
    }
}

/// Scalars convert to scalars; lists become arrays; vectors keep their shape.
fn map_or_scalar(v: &Value, f: impl Fn(&Cell) -> Result<Cell, crate::frame::FrameError>) -> Res<Value> {
    match v {
        Value::List(_) | Value::Tuple(_) => Ok(Value::array(convert_all(&cells_of(v)?, f)?)),
        other => map_cells(other, f),
    }
}

// ---------------------------------------------------------------------------
// Constructors
// ---------------------------------------------------------------------------

fn data_frame(interp: &mut Interpreter, args: &Args) -> Res<Value> {
    let index = args.kw("index").map(cells_of).transpose()?;
    let columns_kw = args.kw("columns").map(names_of).transpose()?;
    let table = match args.get(0, "data") {
        None | Some(Value::None) => {
            let names = columns_kw.clone().unwrap_or_default();
            let rows = index.as_ref().map_or(0, Vec::len);
            Table::new(names.into_iter().map(|n| (n, vec![Cell::Null; rows])).collect())?
        }
        Some(Value::Frame(t)) => t.borrow().clone(),
        Some(Value::Dict(d)) => {
            let d = d.borrow();
            let mut lengths = Vec::new();
            for v in d.entries.iter().map(|(_, v)| v) {
                if let Value::List(_) | Value::Tuple(_) | Value::Array(_) | Value::Series(_) | Value::Range(..) = v {
                    lengths.push(cells_of(v)?.len());
                }
            }
            let rows = lengths
                .first()
                .copied()
                .or_else(|| index.as_ref().map(Vec::len))
                .unwrap_or(if d.is_empty() { 0 } else { 1 });
            if lengths.iter().any(|&n| n != rows) {
                return Err(Exception::value_error("All arrays must be of the same length"));
            }
            let mut columns = Vec::with_capacity(d.len());
            for (k, v) in d.entries.iter() {
                let cells = match v {
                    Value::List(_) | Value::Tuple(_) | Value::Array(_) | Value::Series(_) | Value::Range(..) => {
                        cells_of(v)?
                    }
                    scalar => vec![scalar_cell(scalar)?; rows],
                };
                columns.push((k.to_str(), cells));
            }
            let mut table = Table::new(columns)?;
            if let Some(order) = &columns_kw {
                table = table.select(order)?;
            }
            table
        }
        Some(data @ (Value::List(_) | Value::Tuple(_))) => {
            let rows = interp.iterate(data)?;
            if rows.iter().all(|r| matches!(r, Value::Dict(_))) {
                records(&rows)?
            } else {
                let width = rows.iter().map(|r| cells_of(r).map(|c| c.len())).collect::<Res<Vec<_>>>()?;
                let ncols = width.iter().copied().max().unwrap_or(0);
                let names = columns_kw
                    .clone()
                    .unwrap_or_else(|| (0..ncols).map(|i| i.to_string()).collect());
                if names.len() != ncols && !rows.is_empty() {
                    return Err(Exception::value_error(format!(
                        "{} columns passed, passed data had {} columns",
                        names.len(),
                        ncols
                    )));
                }
                let mut columns: Vec<(String, Vec<Cell>)> =
                    names.into_iter().map(|n| (n, Vec::with_capacity(rows.len()))).collect();
                for row in &rows {
                    let cells = cells_of(row)?;
                    for (i, (_, values)) in columns.iter_mut().enumerate() {
                        values.push(cells.get(i).cloned().unwrap_or(Cell::Null));
                    }
                }
                Table::new(columns)?
            }
        }
        Some(other) => {
            return Err(Exception::value_error(format!(
                "DataFrame constructor not properly called! ({})",
                other.type_name()
            )))
        }
    };
    let table = match index {
        Some(labels) => {
            if labels.len() != table.nrows() {
                return Err(Exception::value_error(format!(
                    "Length of values ({}) does not match length of index ({})",
                    table.nrows(),
                    labels.len()
                )));
            }
            Table::with_index(
                table.columns.into_iter().map(|c| (c.name, c.values)).collect(),
                Index::from_cells(None, labels),
            )?
        }
        None => table,
    };
    Ok(Value::frame(table))
}

/// Rows given as dicts; columns in order of first appearance.
fn records(rows: &[Value]) -> Res<Table> {
    let mut names: Vec<String> = Vec::new();
    let mut parsed: Vec<HashMap<String, Cell>> = Vec::with_capacity(rows.len());
    for row in rows {
        let Value::Dict(d) = row else { continue };
        let mut cells = HashMap::new();
        for (k, v) in d.borrow().entries.iter() {
            let name = k.to_str();
            if !names.contains(&name) {
                names.push(name.clone());
            }
            cells.insert(name, scalar_cell(v)?);
        }
        parsed.push(cells);
    }
    let columns = names
        .into_iter()
        .map(|n| {
            let values = parsed
                .iter()
                .map(|row| row.get(&n).cloned().unwrap_or(Cell::Null))
                .collect();
            (n, values)
        })
        .collect();
    Ok(Table::new(columns)?)
}

fn series(args: &Args) -> Res<Value> {
    let name = args.kw("name").filter(|v| !v.is_none()).map(Value::to_str);
    let index = args.kw("index").map(cells_of).transpose()?;
    let (values, labels) = match args.get(0, "data") {
        None | Some(Value::None) => (Vec::new(), None),
        Some(Value::Dict(d)) => {
            let d = d.borrow();
            let mut keys = Vec::with_capacity(d.len());
            let mut values = Vec::with_capacity(d.len());
            for (k, v) in d.entries.iter() {
                keys.push(scalar_cell(k)?);
                values.push(scalar_cell(v)?);
            }
            (values, Some(keys))
        }
        Some(Value::Series(s)) => {
            let s = s.borrow();
            (s.values.clone(), Some(s.index.level_values(0)))
        }
        Some(v @ (Value::List(_) | Value::Tuple(_) | Value::Array(_) | Value::Range(..))) => (cells_of(v)?, None),
        Some(scalar) => {
            let n = index.as_ref().map_or(1, Vec::len);
            (vec![scalar_cell(scalar)?; n], None)
        }
    };
    let labels = index.or(labels);
    let series = match labels {
        Some(labels) => {
            if labels.len() != values.len() {
                return Err(Exception::value_error(format!(
                    "Length of values ({}) does not match length of index ({})",
                    values.len(),
                    labels.len()
                )));
            }
            Series::with_index(name, values, Index::from_cells(None, labels))
        }
        None => Series::new(name, values),
    };
    Ok(Value::series(series))
}

// ---------------------------------------------------------------------------
// Converters
// ---------------------------------------------------------------------------

fn convert_datetime(args: &Args) -> Res<Value> {
    let errors = errors_arg(args)?;
    let format = args.str_opt(usize::MAX, "format")?;
    let arg = args.require(0, "arg", "to_datetime")?;
    match args.str_opt(usize::MAX, "unit")? {
        Some(unit) => {
            let scale = match unit.as_str() {
                "s" => 1_000,
                "ms" => 1,
                "D" => 86_400_000,
                other => return Err(Exception::value_error(format!("invalid unit '{other}'"))),
            };
            map_or_scalar(arg, move |c| {
                Ok(match c.as_f64() {
                    Some(x) if !c.is_missing() => NaiveDate::from_ymd_opt(1970, 1, 1)
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                        .and_then(|epoch| {
                            epoch.checked_add_signed(Duration::milliseconds((x * scale as f64) as i64))
                        })
                        .map(Cell::DateTime)
                        .unwrap_or(Cell::NaT),
                    _ => Cell::NaT,
                })
            })
        }
        None => map_or_scalar(arg, |c| to_datetime(c, format.as_deref(), errors)),
    }
}

/// `'1 days'`, `'2h'`, `'30min'`, `'1 day 02:00:00'`.
fn parse_timedelta(text: &str) -> Option<Duration> {
    let mut total = Duration::zero();
    let mut words: Vec<&str> = text.split_whitespace().collect();
    if let Some(clock) = words.last().copied().filter(|w| w.contains(':')) {
        let parts: Vec<i64> = clock.split(':').map(|p| p.parse().ok()).collect::<Option<_>>()?;
        let [h, m, sec] = parts[..] else { return None };
        total = total + Duration::hours(h) + Duration::minutes(m) + Duration::seconds(sec);
        words.pop();
    }
    let rest = words.concat();
    let mut number = String::new();
    let mut chars = rest.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_ascii_digit() || c == '-' {
            number.push(c);
            continue;
        }
        let mut unit = String::from(c);
        while let Some(&next) = chars.peek() {
            if next.is_ascii_digit() || next == '-' {
                break;
            }
            unit.push(next);
            chars.next();
        }
        let n: i64 = number.parse().ok()?;
        number.clear();
        total = total + unit_duration(&unit, n)?;
    }
    if !number.is_empty() {
        total = total + Duration::seconds(number.parse().ok()?);
    }
    Some(total)
}

fn unit_duration(unit: &str, n: i64) -> Option<Duration> {
    if matches!(unit, "ms" | "millisecond" | "milliseconds") {
        return Some(Duration::milliseconds(n));
    }
    Some(match unit.trim_end_matches('s') {
        "day" | "d" | "D" => Duration::days(n),
        "week" | "w" | "W" => Duration::weeks(n),
        "hour" | "h" | "hr" | "H" => Duration::hours(n),
        "minute" | "min" | "m" | "T" => Duration::minutes(n),
        "second" | "sec" | "" | "S" => Duration::seconds(n),
        _ => return None,
    })
}

fn concat(args: &Args) -> Res<Value> {
    let objs = match args.require(0, "objs", "concat")? {
        Value::List(items) => items.borrow().clone(),
        Value::Tuple(items) => items.to_vec(),
        other => {
            return Err(Exception::type_error(format!(
                "first argument must be an iterable of pandas objects, you passed an object of type \"{}\"",
                other.type_name()
            )))
        }
    };
    if objs.is_empty() {
        return Err(Exception::value_error("No objects to concatenate"));
    }
    let ignore_index = args.bool_or(usize::MAX, "ignore_index", false)?;
    let by_columns = super::axis_is_columns(args, 1);

    if by_columns {
        let mut columns = Vec::new();
        let mut index = None;
        for (i, obj) in objs.iter().enumerate() {
            match obj {
                Value::Frame(t) => {
                    let t = t.borrow();
                    index.get_or_insert_with(|| t.index.clone());
                    columns.extend(t.columns.iter().map(|c| (c.name.clone(), c.values.clone())));
                }
                Value::Series(s) => {
                    let s = s.borrow();
                    index.get_or_insert_with(|| s.index.clone());
                    columns.push((s.name.clone().unwrap_or_else(|| i.to_string()), s.values.clone()));
                }
                other => return Err(not_pandas(other)),
            }
        }
        let index = index.unwrap_or_else(|| Index::range(0));
        return Ok(Value::frame(Table::with_index(columns, index)?));
    }

    if objs.iter().all(|o| matches!(o, Value::Series(_))) {
        let mut values = Vec::new();
        let mut labels = Vec::new();
        let mut name: Option<Option<String>> = None;
        for obj in &objs {
            if let Value::Series(s) = obj {
                let s = s.borrow();
                values.extend(s.values.iter().cloned());
                labels.extend(s.index.labels.iter().cloned());
                name = match name {
                    None => Some(s.name.clone()),
                    Some(n) if n == s.name => Some(n),
                    Some(_) => Some(None),
                };
            }
        }
        let index = if ignore_index {
            Index::range(values.len())
        } else {
            Index {
                names: vec![None],
                labels,
            }
        };
        return Ok(Value::series(Series::with_index(name.flatten(), values, index)));
    }

    let mut tables = Vec::with_capacity(objs.len());
    for obj in &objs {
        match obj {
            Value::Frame(t) => tables.push(t.borrow().clone()),
            Value::Series(s) => {
                let s = s.borrow();
                let name = s.name.clone().unwrap_or_else(|| "0".into());
                tables.push(Table::with_index(vec![(name, s.values.clone())], s.index.clone())?);
            }
            other => return Err(not_pandas(other)),
        }
    }
    Ok(Value::frame(Table::concat(&tables, ignore_index)?))
}

fn not_pandas(v: &Value) -> Exception {
    Exception::type_error(format!(
        "cannot concatenate object of type '{}'; only Series and DataFrame objs are valid",
        v.type_name()
    ))
}

// ---------------------------------------------------------------------------
// date_range and cut
// ---------------------------------------------------------------------------

fn timestamp_arg(args: &Args, i: usize, name: &str) -> Res<Option<NaiveDateTime>> {
    match args.opt(i, name) {
        None => Ok(None),
        Some(Value::DateTime(dt)) => Ok(Some(*dt)),
        Some(Value::Str(text)) => parse_datetime(text)
            .map(Some)
            .ok_or_else(|| Exception::value_error(format!("could not convert string to Timestamp: '{text}'"))),
        Some(other) => Err(Exception::type_error(format!(
            "Cannot convert input of type {} to Timestamp",
            other.type_name()
        ))),
    }
}

fn add_months(dt: NaiveDateTime, months: i32, month_end: bool) -> Option<NaiveDateTime> {
    let total = dt.year() * 12 + dt.month0() as i32 + months;
    let (year, month0) = (total.div_euclid(12), total.rem_euclid(12) as u32);
    let first = NaiveDate::from_ymd_opt(year, month0 + 1, 1)?;
    let date = if month_end {
        let next = if month0 == 11 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(year, month0 + 2, 1)?
        };
        next.pred_opt()?
    } else {
        first
    };
    Some(date.and_time(dt.time()))
}

fn date_range(args: &Args) -> Res<Value> {
    let start = timestamp_arg(args, 0, "start")?;
    let end = timestamp_arg(args, 1, "end")?;
    let periods = args.opt(2, "periods").and_then(Value::as_int);
    let freq = args.str_opt(3, "freq")?.unwrap_or_else(|| "D".into());

    #[derive(Clone, Copy)]
    enum Step {
        Fixed(Duration),
        Months(i32, bool),
    }
    let (count, unit) = split_freq(&freq);
    let step = match unit {
        "D" => Step::Fixed(Duration::days(count)),
        "h" | "H" => Step::Fixed(Duration::hours(count)),
        "min" | "T" => Step::Fixed(Duration::minutes(count)),
        "s" | "S" => Step::Fixed(Duration::seconds(count)),
        "W" => Step::Fixed(Duration::weeks(count)),
        "M" | "ME" => Step::Months(count as i32, true),
        "MS" => Step::Months(count as i32, false),
        "Y" | "YE" | "A" => Step::Months(12 * count as i32, true),
        "YS" | "AS" => Step::Months(12 * count as i32, false),
        "Q" | "QE" => Step::Months(3 * count as i32, true),
        other => return Err(Exception::value_error(format!("Invalid frequency: {other}"))),
    };
    let nth = |base: NaiveDateTime, i: i64| -> Option<NaiveDateTime> {
        match step {
            Step::Fixed(d) => base.checked_add_signed(d * i as i32),
            Step::Months(m, end) => add_months(base, m * i as i32, end),
        }
    };
    // month-anchored ranges start on the first anchor at or after `start`
    let anchor = |dt: NaiveDateTime| -> Option<NaiveDateTime> {
        match step {
            Step::Months(_, true) => {
                let candidate = add_months(dt, 0, true)?;
                Some(candidate)
            }
            Step::Months(_, false) if dt.day() != 1 => add_months(dt, 1, false),
            _ => Some(dt),
        }
    };

    let mut out = Vec::new();
    match (start, end, periods) {
        (Some(s), Some(e), _) => {
            let base = anchor(s).ok_or_else(overflow)?;
            let mut i = 0;
            while let Some(dt) = nth(base, i) {
                if dt > e || out.len() >= MAX_RANGE_CELLS {
                    break;
                }
                out.push(Cell::DateTime(dt));
                i += 1;
            }
        }
        (Some(s), None, Some(n)) => {
            let base = anchor(s).ok_or_else(overflow)?;
            for i in 0..n.clamp(0, MAX_RANGE_CELLS as i64) {
                out.push(Cell::DateTime(nth(base, i).ok_or_else(overflow)?));
            }
        }
        (None, Some(e), Some(n)) => {
            let n = n.clamp(0, MAX_RANGE_CELLS as i64);
            let base = match step {
                Step::Months(_, true) => add_months(e, 0, true).filter(|m| *m <= e).unwrap_or(e),
                _ => e,
            };
            for i in (0..n).rev() {
                out.push(Cell::DateTime(nth(base, -i).ok_or_else(overflow)?));
            }
        }
        _ => {
            return Err(Exception::value_error(
                "Of the four parameters: start, end, periods, and freq, exactly three must be specified",
            ))
        }
    }
    Ok(Value::array(out))
}

fn overflow() -> Exception {
    Exception::new("OverflowError", "date value out of range")
}

/// `'15min'` -> `(15, "min")`.
fn split_freq(freq: &str) -> (i64, &str) {
    let digits = freq.chars().take_while(char::is_ascii_digit).count();
    let count = freq[..digits].parse().unwrap_or(1);
    (count, &freq[digits..])
}

fn cut(args: &Args) -> Res<Value> {
    let x = args.require(0, "x", "cut")?;
    let values = cells_of(x)?;
    let right = args.bool_or(usize::MAX, "right", true)?;
    let edges: Vec<f64> = match args.require(1, "bins", "cut")? {
        Value::Int(n) if *n > 0 => {
            let present: Vec<f64> = values.iter().filter(|c| !c.is_missing()).filter_map(Cell::as_f64).collect();
            let lo = present.iter().copied().fold(f64::INFINITY, f64::min);
            let hi = present.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if !lo.is_finite() {
                return Err(Exception::value_error("Cannot cut empty array"));
            }
            let n = *n as usize;
            let width = (hi - lo) / n as f64;
            let mut edges: Vec<f64> = (0..=n).map(|i| lo + width * i as f64).collect();
            let pad = if hi > lo { (hi - lo) * 0.001 } else { lo.abs().max(1.0) * 0.001 };
            if right {
                edges[0] -= pad;
            } else {
                edges[n] += pad;
            }
            edges
        }
        bins => cells_of(bins)?
            .iter()
            .map(|c| c.as_f64().ok_or_else(|| Exception::type_error("bins must be numeric")))
            .collect::<Res<_>>()?,
    };
    if edges.windows(2).any(|w| w[0] >= w[1]) {
        return Err(Exception::value_error("bins must increase monotonically."));
    }
    let labels: Vec<Cell> = match args.kw("labels") {
        Some(Value::Bool(false)) => (0..edges.len() - 1).map(|i| Cell::Int(i as i64)).collect(),
        Some(v) if !v.is_none() => {
            let labels = cells_of(v)?;
            if labels.len() + 1 != edges.len() {
                return Err(Exception::value_error(
                    "Bin labels must be one fewer than the number of bin edges",
                ));
            }
            labels
        }
        _ => edges
            .windows(2)
            .map(|w| {
                let (a, b) = (format_float(w[0]), format_float(w[1]));
                Cell::Str(if right { format!("({a}, {b}]") } else { format!("[{a}, {b})") })
            })
            .collect(),
    };
    let binned: Vec<Cell> = values
        .iter()
        .map(|c| {
            let Some(x) = c.as_f64().filter(|_| !c.is_missing()) else {
                return Cell::Float(f64::NAN);
            };
            edges
                .windows(2)
                .position(|w| if right { x > w[0] && x <= w[1] } else { x >= w[0] && x < w[1] })
                .map(|i| labels[i].clone())
                .unwrap_or(Cell::Float(f64::NAN))
        })
        .collect();
    Ok(match x {
        Value::Series(s) => Value::series(s.borrow().derive(binned)),
        _ => Value::array(binned),
    })
}

// ---------------------------------------------------------------------------
// merge
// ---------------------------------------------------------------------------

/// Database-style join of two tables. `first` is the position of `how`
/// among the positional arguments.
pub(super) fn merge(left: &Table, right: &Table, args: &Args, first: usize) -> Res<Table> {
    let how = args.str_opt(first, "how")?.unwrap_or_else(|| "inner".into());
    let (left_on, right_on) = match (args.opt(first + 1, "on"), args.kw("left_on"), args.kw("right_on")) {
        (Some(on), _, _) => (names_of(on)?, names_of(on)?),
        (None, Some(l), Some(r)) => (names_of(l)?, names_of(r)?),
        _ => {
            let shared: Vec<String> = left
                .column_names()
                .into_iter()
                .filter(|n| right.has_column(n))
                .collect();
            if shared.is_empty() {
                return Err(Exception::new(
                    "MergeError",
                    "No common columns to perform merge on.",
                ));
            }
            (shared.clone(), shared)
        }
    };
    if left_on.len() != right_on.len() {
        return Err(Exception::value_error("len(right_on) must equal len(left_on)"));
    }
    let suffixes = match args.kw("suffixes") {
        Some(v) => {
            let s = names_of(v)?;
            (s.first().cloned().unwrap_or_default(), s.get(1).cloned().unwrap_or_default())
        }
        None => ("_x".to_string(), "_y".to_string()),
    };

    let key_of = |t: &Table, names: &[String], r: usize| -> Res<Vec<CellKey>> {
        names
            .iter()
            .map(|n| Ok(t.column_ref(n)?.values[r].key()))
            .collect()
    };
    let mut right_rows: HashMap<Vec<CellKey>, Vec<usize>> = HashMap::new();
    for r in 0..right.nrows() {
        right_rows.entry(key_of(right, &right_on, r)?).or_default().push(r);
    }

    let mut pairs: Vec<(Option<usize>, Option<usize>)> = Vec::new();
    let mut matched_right = vec![false; right.nrows()];
    for l in 0..left.nrows() {
        match right_rows.get(&key_of(left, &left_on, l)?) {
            Some(rs) => {
                for &r in rs {
                    matched_right[r] = true;
                    pairs.push((Some(l), Some(r)));
                }
            }
            None if how == "left" || how == "outer" => pairs.push((Some(l), None)),
            None => {}
        }
    }
    match how.as_str() {
        "inner" | "left" => {}
        "outer" => pairs.extend(
            (0..right.nrows()).filter(|&r| !matched_right[r]).map(|r| (None, Some(r))),
        ),
        "right" => {
            let mut by_right: Vec<(Option<usize>, Option<usize>)> = Vec::new();
            for r in 0..right.nrows() {
                let mut any = false;
                for pair in pairs.iter().filter(|p| p.1 == Some(r)) {
                    by_right.push(*pair);
                    any = true;
                }
                if !any {
                    by_right.push((None, Some(r)));
                }
            }
            pairs = by_right;
        }
        other => return Err(Exception::value_error(format!("Invalid merge type: {other}"))),
    }

    let same_keys = left_on == right_on;
    let cell = |t: &Table, name: &str, row: Option<usize>| -> Res<Cell> {
        Ok(match row {
            Some(r) => t.column_ref(name)?.values[r].clone(),
            None => Cell::Float(f64::NAN),
        })
    };
    let mut columns: Vec<(String, Vec<Cell>)> = Vec::new();
    for col in &left.columns {
        let is_key = same_keys && left_on.contains(&col.name);
        let clash = !is_key && right.has_column(&col.name) && !(same_keys && right_on.contains(&col.name));
        let name = if clash { format!("{}{}", col.name, suffixes.0) } else { col.name.clone() };
        let mut values = Vec::with_capacity(pairs.len());
        for (l, r) in &pairs {
            values.push(match (l, is_key) {
                (None, true) => {
                    let pos = left_on.iter().position(|k| *k == col.name).unwrap_or(0);
                    cell(right, &right_on[pos], *r)?
                }
                _ => cell(left, &col.name, *l)?,
            });
        }
        columns.push((name, values));
    }
    for col in &right.columns {
        if same_keys && right_on.contains(&col.name) {
            continue;
        }
        let clash = left.has_column(&col.name);
        let name = if clash { format!("{}{}", col.name, suffixes.1) } else { col.name.clone() };
        let mut values = Vec::with_capacity(pairs.len());
        for (_, r) in &pairs {
            values.push(cell(right, &col.name, *r)?);
        }
        columns.push((name, values));
    }
    Ok(Table::new(columns)?)
}
