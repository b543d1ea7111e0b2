// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// Small standard-library modules: math, statistics, json, copy, warnings
// and datetime, plus attributes and methods on timestamp values.

use std::collections::HashMap;

use chrono::format::{Item, StrftimeItems};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde_json::{Map, Value as Json};

use crate::frame::{iso_datetime, parse_datetime, parse_datetime_with, Cell};
use crate::lang::ast::BinOp;

use super::interp::Interpreter;
use super::value::{
    check_len, check_str_len, range_item, range_len, shared, Args, Dict, Exception, Res, Value,
    MAX_NESTING_DEPTH,
};

pub(crate) fn call(interp: &mut Interpreter, module: &str, func: &str, args: Args) -> Res<Value> {
    match module {
        "math" => math(interp, func, &args),
        "statistics" => statistics(interp, func, &args),
        "json" => json(interp, func, &args),
        "copy" => {
            let target = args.require(0, "x", func)?;
            Ok(if func == "deepcopy" {
                deep_copy(target, &mut HashMap::new(), 0)?
            } else {
                shallow_copy(target)
            })
        }
        // Warnings are never surfaced, so every filter call is accepted.
        "warnings" => Ok(Value::None),
        "datetime" => datetime(func, &args),
        other => Err(Exception::new(
            "AttributeError",
            format!("module '{other}' has no attribute '{func}'"),
        )),
    }
}

// ---------------------------------------------------------------------------
// math
// ---------------------------------------------------------------------------

fn number(v: &Value, func: &str) -> Res<f64> {
    v.as_f64().ok_or_else(|| {
        Exception::type_error(format!(
            "{func}() must be a real number, not {}",
            v.type_name()
        ))
    })
}

fn numbers(interp: &mut Interpreter, v: &Value, func: &str) -> Res<Vec<f64>> {
    let items = match v {
        Value::Series(s) => s
            .borrow()
            .values
            .iter()
            .map(Value::from_cell)
            .collect(),
        Value::Array(cells) => cells.borrow().iter().map(Value::from_cell).collect(),
        other => interp.iterate(other)?,
    };
    items.iter().map(|item| number(item, func)).collect()
}

fn to_int(x: f64, func: &str) -> Res<Value> {
    if x.is_finite() {
        Ok(Value::Int(x as i64))
    } else if x.is_nan() {
        Err(Exception::value_error(format!("cannot convert float NaN to integer in {func}()")))
    } else {
        Err(Exception::new("OverflowError", "cannot convert float infinity to integer"))
    }
}

fn domain(ok: bool) -> Res<()> {
    if ok {
        Ok(())
    } else {
        Err(Exception::value_error("math domain error"))
    }
}

fn math(interp: &mut Interpreter, func: &str, args: &Args) -> Res<Value> {
    let x = || -> Res<f64> { number(args.require(0, "x", func)?, func) };
    let float = |v: f64| -> Res<Value> { Ok(Value::Float(v)) };
    match func {
        "sqrt" => {
            let v = x()?;
            domain(v >= 0.0 || v.is_nan())?;
            float(v.sqrt())
        }
        "log" => {
            let v = x()?;
            domain(v > 0.0)?;
            match args.opt(1, "base") {
                Some(base) => float(v.ln() / number(base, func)?.ln()),
                None => float(v.ln()),
            }
        }
        "log10" | "log2" => {
            let v = x()?;
            domain(v > 0.0)?;
            float(if func == "log10" { v.log10() } else { v.log2() })
        }
        "exp" => float(x()?.exp()),
        "pow" => {
            let base = x()?;
            let exp = number(args.require(1, "y", func)?, func)?;
            float(base.powf(exp))
        }
        "fabs" => float(x()?.abs()),
        "sin" => float(x()?.sin()),
        "cos" => float(x()?.cos()),
        "tan" => float(x()?.tan()),
        "floor" => to_int(x()?.floor(), func),
        "ceil" => to_int(x()?.ceil(), func),
        "trunc" => to_int(x()?.trunc(), func),
        "isnan" => Ok(Value::Bool(x()?.is_nan())),
        "isinf" => Ok(Value::Bool(x()?.is_infinite())),
        "isfinite" => Ok(Value::Bool(x()?.is_finite())),
        "factorial" => {
            let n = args
                .require(0, "x", func)?
                .as_int()
                .ok_or_else(|| Exception::type_error("factorial() only accepts integral values"))?;
            if n < 0 {
                return Err(Exception::value_error(
                    "factorial() not defined for negative values",
                ));
            }
            (1..=n)
                .try_fold(1i64, |acc, k| acc.checked_mul(k))
                .map(Value::Int)
                .ok_or_else(|| Exception::new("OverflowError", "integer too large"))
        }
        "gcd" => {
            let mut acc = 0i64;
            for v in &args.pos {
                let mut b = v
                    .as_int()
                    .ok_or_else(|| {
                        Exception::type_error(format!(
                            "'{}' object cannot be interpreted as an integer",
                            v.type_name()
                        ))
                    })?
                    .abs();
                let mut a = acc;
                while b != 0 {
                    (a, b) = (b, a % b);
                }
                acc = a;
            }
            Ok(Value::Int(acc))
        }
        "fsum" => {
            let values = numbers(interp, args.require(0, "seq", func)?, func)?;
            float(values.iter().sum())
        }
        "prod" => {
            let items = interp.iterate(args.require(0, "iterable", func)?)?;
            let mut acc = args.kw("start").cloned().unwrap_or(Value::Int(1));
            for item in &items {
                acc = interp.binary_op(BinOp::Mul, &acc, item)?;
            }
            Ok(acc)
        }
        other => Err(Exception::new(
            "AttributeError",
            format!("module 'math' has no attribute '{other}'"),
        )),
    }
}

// ---------------------------------------------------------------------------
// statistics
// ---------------------------------------------------------------------------

fn statistics_error(message: &str) -> Exception {
    // StatisticsError subclasses ValueError.
    Exception::value_error(message)
}

fn variance_of(values: &[f64], sample: bool) -> Res<f64> {
    let n = values.len();
    let needed = if sample { 2 } else { 1 };
    if n < needed {
        return Err(statistics_error(if sample {
            "variance requires at least two data points"
        } else {
            "pvariance requires at least one data point"
        }));
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    Ok(ss / (n - if sample { 1 } else { 0 }) as f64)
}

fn statistics(interp: &mut Interpreter, func: &str, args: &Args) -> Res<Value> {
    let data = args.require(0, "data", func)?.clone();
    if func == "mode" {
        let items = interp.iterate(&data)?;
        let mut best: Option<(usize, &Value)> = None;
        for (i, item) in items.iter().enumerate() {
            let count = items[i..]
                .iter()
                .filter(|other| super::interp::py_eq(item, other))
                .count();
            let seen_before = items[..i].iter().any(|other| super::interp::py_eq(item, other));
            if !seen_before && best.map_or(true, |(c, _)| count > c) {
                best = Some((count, item));
            }
        }
        return best
            .map(|(_, v)| v.clone())
            .ok_or_else(|| statistics_error("no mode for empty data"));
    }
    let values = numbers(interp, &data, func)?;
    let result = match func {
        "mean" => {
            if values.is_empty() {
                return Err(statistics_error("mean requires at least one data point"));
            }
            values.iter().sum::<f64>() / values.len() as f64
        }
        "median" => {
            if values.is_empty() {
                return Err(statistics_error("no median for empty data"));
            }
            let mut sorted = values;
            sorted.sort_by(f64::total_cmp);
            let mid = sorted.len() / 2;
            if sorted.len() % 2 == 1 {
                sorted[mid]
            } else {
                (sorted[mid - 1] + sorted[mid]) / 2.0
            }
        }
        "variance" => variance_of(&values, true)?,
        "pvariance" => variance_of(&values, false)?,
        "stdev" => variance_of(&values, true)?.sqrt(),
        "pstdev" => variance_of(&values, false)?.sqrt(),
        other => {
            return Err(Exception::new(
                "AttributeError",
                format!("module 'statistics' has no attribute '{other}'"),
            ))
        }
    };
    Ok(Value::Float(result))
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

/// Convert a value into JSON for chart properties. Vectors become arrays,
/// frames become lists of records and timestamps become ISO strings.
pub(crate) fn to_json(v: &Value) -> Res<Json> {
    to_json_within(v, &mut Vec::new())
}

/// Identities of the containers being converted, outermost first.
fn enter(v: &Value, markers: &mut Vec<usize>) -> Res<Option<usize>> {
    if markers.len() > MAX_NESTING_DEPTH {
        return Err(Exception::recursion_error());
    }
    let id = match v {
        Value::List(_) | Value::Tuple(_) | Value::Dict(_) | Value::Set(_) => v.identity(),
        _ => None,
    };
    if let Some(id) = id {
        if markers.contains(&id) {
            return Err(Exception::value_error("Circular reference detected"));
        }
        markers.push(id);
    }
    Ok(id)
}

fn to_json_within(v: &Value, markers: &mut Vec<usize>) -> Res<Json> {
    let id = enter(v, markers)?;
    let out = to_json_once(v, markers);
    if id.is_some() {
        markers.pop();
    }
    out
}

fn to_json_once(v: &Value, markers: &mut Vec<usize>) -> Res<Json> {
    let mut array = |items: &[Value]| -> Res<Json> {
        Ok(Json::Array(items.iter().map(|x| to_json_within(x, markers)).collect::<Res<_>>()?))
    };
    Ok(match v {
        Value::None | Value::NaT => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::from(*i),
        Value::Float(f) => Cell::Float(*f).to_json(),
        Value::Str(s) => Json::String(s.to_string()),
        Value::DateTime(dt) => Json::String(iso_datetime(dt)),
        Value::Timedelta(d) => Cell::Timedelta(*d).to_json(),
        Value::List(items) => {
            let items = items.borrow().clone();
            array(&items)?
        }
        Value::Tuple(items) => array(&items[..])?,
        Value::Set(d) => {
            let keys = d.borrow().keys();
            array(&keys)?
        }
        Value::Range(start, stop, step) => {
            let n = range_len(*start, *stop, *step);
            check_len(n)?;
            Json::Array((0..n).map(|i| Json::from(range_item(*start, *step, i))).collect())
        }
        Value::Dict(d) => {
            let entries = d.borrow().entries.clone();
            let mut map = Map::new();
            for (k, val) in entries.iter() {
                map.insert(k.to_str(), to_json_within(val, markers)?);
            }
            Json::Object(map)
        }
        Value::Series(s) => Json::Array(s.borrow().values.iter().map(Cell::to_json).collect()),
        Value::Array(cells) => Json::Array(cells.borrow().iter().map(Cell::to_json).collect()),
        Value::Frame(t) => {
            let t = t.borrow();
            Json::Array(
                (0..t.nrows())
                    .map(|i| {
                        Json::Object(
                            t.row(i)
                                .into_iter()
                                .map(|(name, cell)| (name, cell.to_json()))
                                .collect(),
                        )
                    })
                    .collect(),
            )
        }
        Value::Figure(f) => f.borrow().to_value(),
        other => {
            return Err(Exception::type_error(format!(
                "Object of type {} is not JSON serializable",
                other.type_name()
            )))
        }
    })
}

pub(crate) fn from_json(j: &Json) -> Res<Value> {
    Ok(match j {
        Json::Null => Value::None,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(s) => Value::str(s),
        Json::Array(items) => Value::list(items.iter().map(from_json).collect::<Res<_>>()?),
        Json::Object(map) => {
            let mut dict = Dict::new();
            for (k, v) in map {
                dict.insert(Value::str(k), from_json(v)?)?;
            }
            Value::Dict(shared(dict))
        }
    })
}

struct DumpOptions<'a> {
    indent: Option<String>,
    sort_keys: bool,
    ensure_ascii: bool,
    default: Option<&'a Value>,
}

fn json(interp: &mut Interpreter, func: &str, args: &Args) -> Res<Value> {
    match func {
        "dumps" => {
            let indent = match args.opt(usize::MAX, "indent") {
                Some(Value::Str(s)) => Some(s.to_string()),
                Some(v) => match v.as_int() {
                    Some(n) => {
                        let width = usize::try_from(n.max(0)).unwrap_or(usize::MAX);
                        check_str_len(width)?;
                        Some(" ".repeat(width))
                    }
                    None => None,
                },
                None => None,
            };
            let options = DumpOptions {
                indent,
                sort_keys: args.bool_or(usize::MAX, "sort_keys", false)?,
                ensure_ascii: args.bool_or(usize::MAX, "ensure_ascii", true)?,
                default: args.opt(usize::MAX, "default"),
            };
            let mut out = String::new();
            let obj = args.require(0, "obj", func)?;
            dump(interp, obj, &options, 0, &mut Vec::new(), &mut out)?;
            Ok(Value::str(out))
        }
        "loads" => {
            let text = args
                .require(0, "s", func)?
                .as_str()
                .ok_or_else(|| Exception::type_error("the JSON object must be str"))?
                .to_string();
            let parsed: Json = serde_json::from_str(&text).map_err(|e| {
                Exception::new("JSONDecodeError", format!("Expecting value: {e}"))
            })?;
            from_json(&parsed)
        }
        other => Err(Exception::new(
            "AttributeError",
            format!("module 'json' has no attribute '{other}'"),
        )),
    }
}

fn dump_str(s: &str, ensure_ascii: bool, out: &mut String) {
    let quoted = Json::String(s.to_string()).to_string();
    if !ensure_ascii {
        out.push_str(&quoted);
        return;
    }
    for ch in quoted.chars() {
        if ch.is_ascii() {
            out.push(ch);
        } else {
            let mut units = [0u16; 2];
            for unit in ch.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{unit:04x}"));
            }
        }
    }
}

fn dump_float(f: f64) -> String {
    if f.is_nan() {
        "NaN".into()
    } else if f.is_infinite() {
        if f > 0.0 { "Infinity" } else { "-Infinity" }.into()
    } else {
        crate::frame::format_float(f)
    }
}

fn dump_key(k: &Value) -> Res<String> {
    Ok(match k {
        Value::Str(s) => s.to_string(),
        Value::Bool(true) => "true".into(),
        Value::Bool(false) => "false".into(),
        Value::None => "null".into(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => dump_float(*f),
        other => {
            return Err(Exception::type_error(format!(
                "keys must be str, int, float, bool or None, not {}",
                other.type_name()
            )))
        }
    })
}

fn newline(options: &DumpOptions, level: usize, out: &mut String) -> Res<()> {
    if let Some(indent) = &options.indent {
        check_str_len(out.len().saturating_add(indent.len().saturating_mul(level)))?;
        out.push('\n');
        for _ in 0..level {
            out.push_str(indent);
        }
    }
    Ok(())
}

/// Append `v` as JSON. `markers` holds the containers being written, so a
/// container that holds itself fails instead of recursing.
fn dump(
    interp: &mut Interpreter,
    v: &Value,
    options: &DumpOptions,
    level: usize,
    markers: &mut Vec<usize>,
    out: &mut String,
) -> Res<()> {
    check_str_len(out.len())?;
    let id = enter(v, markers)?;
    dump_once(interp, v, options, level, markers, out)?;
    if id.is_some() {
        markers.pop();
    }
    Ok(())
}

fn dump_once(
    interp: &mut Interpreter,
    v: &Value,
    options: &DumpOptions,
    level: usize,
    markers: &mut Vec<usize>,
    out: &mut String,
) -> Res<()> {
    let item_sep = if options.indent.is_some() { "," } else { ", " };
    match v {
        Value::None => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Int(i) => out.push_str(&i.to_string()),
        Value::Float(f) => out.push_str(&dump_float(*f)),
        Value::Str(s) => dump_str(s, options.ensure_ascii, out),
        Value::List(_) | Value::Tuple(_) => {
            let items = interp.iterate(v)?;
            if items.is_empty() {
                out.push_str("[]");
                return Ok(());
            }
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(item_sep);
                }
                newline(options, level + 1, out)?;
                dump(interp, item, options, level + 1, markers, out)?;
            }
            newline(options, level, out)?;
            out.push(']');
        }
        Value::Dict(d) => {
            let mut entries: Vec<(String, Value)> = d
                .borrow()
                .entries
                .iter()
                .map(|(k, val)| Ok((dump_key(k)?, val.clone())))
                .collect::<Res<_>>()?;
            if entries.is_empty() {
                out.push_str("{}");
                return Ok(());
            }
            if options.sort_keys {
                entries.sort_by(|a, b| a.0.cmp(&b.0));
            }
            out.push('{');
            for (i, (key, val)) in entries.iter().enumerate() {
                if i > 0 {
                    out.push_str(item_sep);
                }
                newline(options, level + 1, out)?;
                dump_str(key, options.ensure_ascii, out);
                out.push_str(": ");
                dump(interp, val, options, level + 1, markers, out)?;
            }
            newline(options, level, out)?;
            out.push('}');
        }
        other => match options.default {
            Some(default) => {
                let converted = interp.call1(default, vec![other.clone()])?;
                let once = DumpOptions {
                    indent: options.indent.clone(),
                    sort_keys: options.sort_keys,
                    ensure_ascii: options.ensure_ascii,
                    default: None,
                };
                dump(interp, &converted, &once, level, markers, out)?;
            }
            None => {
                return Err(Exception::type_error(format!(
                    "Object of type {} is not JSON serializable",
                    other.type_name()
                )))
            }
        },
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// copy
// ---------------------------------------------------------------------------

fn shallow_copy(v: &Value) -> Value {
    match v {
        Value::List(items) => Value::list(items.borrow().clone()),
        Value::Dict(d) => Value::Dict(shared(d.borrow().clone())),
        Value::Set(d) => Value::Set(shared(d.borrow().clone())),
        Value::Frame(t) => Value::frame(t.borrow().clone()),
        Value::Series(s) => Value::series(s.borrow().clone()),
        Value::Array(cells) => Value::array(cells.borrow().clone()),
        Value::Figure(f) => Value::figure(f.borrow().clone()),
        other => other.clone(),
    }
}

/// `copy.deepcopy`. `memo` maps each copied container to its copy, so
/// shared and self-referencing containers keep their shape.
fn deep_copy(v: &Value, memo: &mut HashMap<usize, Value>, depth: usize) -> Res<Value> {
    if depth > MAX_NESTING_DEPTH {
        return Err(Exception::recursion_error());
    }
    if let Some(copy) = v.identity().and_then(|id| memo.get(&id)) {
        return Ok(copy.clone());
    }
    Ok(match v {
        Value::List(items) => {
            let copy = shared(Vec::new());
            if let Some(id) = v.identity() {
                memo.insert(id, Value::List(copy.clone()));
            }
            let originals = items.borrow().clone();
            for item in &originals {
                let item = deep_copy(item, memo, depth + 1)?;
                copy.borrow_mut().push(item);
            }
            Value::List(copy)
        }
        Value::Tuple(items) => Value::tuple(
            items.iter().map(|item| deep_copy(item, memo, depth + 1)).collect::<Res<_>>()?,
        ),
        Value::Dict(d) => {
            let copy = shared(d.borrow().clone());
            if let Some(id) = v.identity() {
                memo.insert(id, Value::Dict(copy.clone()));
            }
            let originals = d.borrow().entries.clone();
            for (i, (_, val)) in originals.iter().enumerate() {
                let val = deep_copy(val, memo, depth + 1)?;
                copy.borrow_mut().entries[i].1 = val;
            }
            Value::Dict(copy)
        }
        other => shallow_copy(other),
    })
}

// ---------------------------------------------------------------------------
// datetime
// ---------------------------------------------------------------------------

/// Wall-clock time of the host.
pub(crate) fn now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// `timedelta(days, seconds, microseconds, milliseconds, minutes, hours, weeks)`.
pub(crate) fn timedelta_from_args(args: &Args) -> Res<Duration> {
    const PARTS: [(&str, f64); 7] = [
        ("days", 86_400e6),
        ("seconds", 1e6),
        ("microseconds", 1.0),
        ("milliseconds", 1e3),
        ("minutes", 60e6),
        ("hours", 3_600e6),
        ("weeks", 604_800e6),
    ];
    let mut micros = 0.0;
    for (i, (name, scale)) in PARTS.iter().enumerate() {
        if let Some(v) = args.opt(i, name) {
            micros += number(v, "timedelta")? * scale;
        }
    }
    if !micros.is_finite() || micros.abs() > i64::MAX as f64 {
        return Err(Exception::new("OverflowError", "timedelta value out of range"));
    }
    Ok(Duration::microseconds(micros.round() as i64))
}

/// strftime that reports a bad directive instead of panicking.
pub(crate) fn strftime(dt: &NaiveDateTime, fmt: &str) -> Res<String> {
    let items: Vec<Item<'_>> = StrftimeItems::new(fmt).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(Exception::value_error(format!("Invalid format string '{fmt}'")));
    }
    Ok(dt.format_with_items(items.into_iter()).to_string())
}

fn component(args: &Args, i: usize, name: &str, default: i64) -> Res<i64> {
    args.int_or(i, name, default)
}

fn build_datetime(args: &Args, date_only: bool) -> Res<NaiveDateTime> {
    let year = component(args, 0, "year", i64::MIN)?;
    let month = component(args, 1, "month", i64::MIN)?;
    let day = component(args, 2, "day", i64::MIN)?;
    if year == i64::MIN || month == i64::MIN || day == i64::MIN {
        return Err(Exception::type_error(
            "function missing required argument 'year', 'month' or 'day'",
        ));
    }
    let date = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32).ok_or_else(|| {
        Exception::value_error(if (1..=12).contains(&month) {
            "day is out of range for month"
        } else {
            "month must be in 1..12"
        })
    })?;
    if date_only {
        return Ok(date.and_time(NaiveTime::MIN));
    }
    let hour = component(args, 3, "hour", 0)?;
    let minute = component(args, 4, "minute", 0)?;
    let second = component(args, 5, "second", 0)?;
    let micro = component(args, 6, "microsecond", 0)?;
    let time = NaiveTime::from_hms_micro_opt(hour as u32, minute as u32, second as u32, micro as u32)
        .ok_or_else(|| Exception::value_error("time component out of range"))?;
    Ok(date.and_time(time))
}

fn text_arg<'a>(args: &'a Args, i: usize, name: &str, func: &str) -> Res<&'a str> {
    args.require(i, name, func)?.as_str().ok_or_else(|| {
        Exception::type_error(format!("{func}() argument {} must be str", i + 1))
    })
}

fn datetime(func: &str, args: &Args) -> Res<Value> {
    match func {
        "datetime" => Ok(Value::DateTime(build_datetime(args, false)?)),
        "date" => Ok(Value::DateTime(build_datetime(args, true)?)),
        "timedelta" => Ok(Value::Timedelta(timedelta_from_args(args)?)),
        "datetime.now" | "datetime.today" => Ok(Value::DateTime(now())),
        "date.today" => Ok(Value::DateTime(now().date().and_time(NaiveTime::MIN))),
        "datetime.strptime" => {
            let text = text_arg(args, 0, "date_string", "strptime")?;
            let fmt = text_arg(args, 1, "format", "strptime")?;
            parse_datetime_with(text, fmt).map(Value::DateTime).ok_or_else(|| {
                Exception::value_error(format!(
                    "time data '{text}' does not match format '{fmt}'"
                ))
            })
        }
        "datetime.fromisoformat" => {
            let text = text_arg(args, 0, "date_string", "fromisoformat")?;
            parse_datetime(text).map(Value::DateTime).ok_or_else(|| {
                Exception::value_error(format!("Invalid isoformat string: '{text}'"))
            })
        }
        other => Err(Exception::new(
            "AttributeError",
            format!("module 'datetime' has no attribute '{other}'"),
        )),
    }
}

// ---------------------------------------------------------------------------
// Timestamp and Timedelta values
// ---------------------------------------------------------------------------

const DATETIME_METHODS: &[&str] = &[
    "strftime", "date", "time", "isoformat", "weekday", "isoweekday", "replace", "timestamp",
    "to_pydatetime", "normalize", "day_name", "month_name",
];

const TIMEDELTA_METHODS: &[&str] = &["total_seconds"];

pub(crate) fn temporal_attr(obj: &Value, attr: &str) -> Res<Value> {
    match obj {
        Value::DateTime(dt) => {
            let int = |v: u32| Ok(Value::Int(v as i64));
            match attr {
                "year" => Ok(Value::Int(dt.year() as i64)),
                "month" => int(dt.month()),
                "day" => int(dt.day()),
                "hour" => int(dt.hour()),
                "minute" => int(dt.minute()),
                "second" => int(dt.second()),
                "microsecond" => int(dt.nanosecond() / 1_000),
                "dayofweek" | "day_of_week" => int(dt.weekday().num_days_from_monday()),
                "dayofyear" | "day_of_year" => int(dt.ordinal()),
                "quarter" => int((dt.month() - 1) / 3 + 1),
                name if DATETIME_METHODS.contains(&name) => Ok(Value::method(obj.clone(), name)),
                name => Err(Exception::attribute_error("Timestamp", name)),
            }
        }
        Value::Timedelta(d) => {
            let days = d.num_days();
            let rest = *d - Duration::days(days);
            match attr {
                "days" => Ok(Value::Int(days)),
                "seconds" => Ok(Value::Int(rest.num_seconds())),
                "microseconds" => Ok(Value::Int(
                    (rest - Duration::seconds(rest.num_seconds()))
                        .num_microseconds()
                        .unwrap_or(0),
                )),
                name if TIMEDELTA_METHODS.contains(&name) => Ok(Value::method(obj.clone(), name)),
                name => Err(Exception::attribute_error("Timedelta", name)),
            }
        }
        _ => match attr {
            "isoformat" | "strftime" | "date" | "total_seconds" => {
                Ok(Value::method(obj.clone(), attr))
            }
            _ => Ok(Value::Float(f64::NAN)),
        },
    }
}

fn isoformat(dt: &NaiveDateTime, sep: &str) -> String {
    let fmt = if dt.nanosecond() == 0 {
        format!("%Y-%m-%d{sep}%H:%M:%S")
    } else {
        format!("%Y-%m-%d{sep}%H:%M:%S%.6f")
    };
    dt.format(&fmt).to_string()
}

fn replace(dt: &NaiveDateTime, args: &Args) -> Res<NaiveDateTime> {
    let current = [
        ("year", dt.year() as i64),
        ("month", dt.month() as i64),
        ("day", dt.day() as i64),
        ("hour", dt.hour() as i64),
        ("minute", dt.minute() as i64),
        ("second", dt.second() as i64),
        ("microsecond", (dt.nanosecond() / 1_000) as i64),
    ];
    let mut pos = Vec::with_capacity(current.len());
    for (name, value) in current {
        pos.push(Value::Int(args.int_or(usize::MAX, name, value)?));
    }
    build_datetime(&Args::new(pos), false)
}

pub(crate) fn temporal_method(receiver: &Value, name: &str, args: Args) -> Res<Value> {
    match receiver {
        Value::DateTime(dt) => match name {
            "strftime" => {
                let fmt = text_arg(&args, 0, "format", "strftime")?;
                Ok(Value::str(strftime(dt, fmt)?))
            }
            "date" | "normalize" => Ok(Value::DateTime(dt.date().and_time(NaiveTime::MIN))),
            "time" => Ok(Value::str(dt.format("%H:%M:%S").to_string())),
            "isoformat" => {
                let sep = args.str_opt(0, "sep")?.unwrap_or_else(|| "T".into());
                Ok(Value::str(isoformat(dt, &sep)))
            }
            "weekday" => Ok(Value::Int(dt.weekday().num_days_from_monday() as i64)),
            "isoweekday" => Ok(Value::Int(dt.weekday().number_from_monday() as i64)),
            "replace" => Ok(Value::DateTime(replace(dt, &args)?)),
            "timestamp" => Ok(Value::Float(
                dt.and_utc().timestamp_micros() as f64 / 1e6,
            )),
            "to_pydatetime" => Ok(receiver.clone()),
            "day_name" => Ok(Value::str(dt.format("%A").to_string())),
            "month_name" => Ok(Value::str(dt.format("%B").to_string())),
            other => Err(Exception::attribute_error("Timestamp", other)),
        },
        Value::Timedelta(d) => match name {
            "total_seconds" => Ok(Value::Float(
                d.num_microseconds()
                    .map(|us| us as f64 / 1e6)
                    .unwrap_or(d.num_seconds() as f64),
            )),
            other => Err(Exception::attribute_error("Timedelta", other)),
        },
        _ => match name {
            "isoformat" => Ok(Value::str("NaT")),
            "total_seconds" => Ok(Value::Float(f64::NAN)),
            "date" => Ok(Value::NaT),
            other => Err(Exception::value_error(format!(
                "NaTType does not support {other}"
            ))),
        },
    }
}
