// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// `.str` and `.dt` accessors on a series.

use std::rc::Rc;

use chrono::{Datelike, NaiveDateTime, NaiveTime, Timelike};
use regex::{Regex, RegexBuilder};

use crate::frame::{Cell, Series, Table};

use super::super::interp::Interpreter;
use super::super::stdlib::strftime;
use super::super::value::{check_str_len, Accessor, AccessorKind, Args, Exception, Res, Value};
use super::scalar_cell;

const STR_METHODS: &[&str] = &[
    "contains", "startswith", "endswith", "lower", "upper", "title", "capitalize", "swapcase",
    "strip", "lstrip", "rstrip", "len", "replace", "split", "slice", "get", "zfill", "count",
    "find", "match", "fullmatch", "extract", "isdigit", "isalpha", "isnumeric", "isalnum",
    "isspace", "islower", "isupper", "istitle", "isdecimal", "cat", "pad", "center", "ljust",
    "rjust", "casefold",
];

const DT_METHODS: &[&str] = &[
    "day_name", "month_name", "strftime", "normalize", "to_period", "total_seconds", "floor",
];

pub(super) fn get_attr(obj: &Value, a: &Rc<Accessor>, attr: &str) -> Res<Value> {
    match a.kind {
        AccessorKind::Str if STR_METHODS.contains(&attr) => Ok(Value::method(obj.clone(), attr)),
        AccessorKind::Dt if DT_METHODS.contains(&attr) => Ok(Value::method(obj.clone(), attr)),
        AccessorKind::Dt => {
            let Value::Series(s) = &a.target else {
                return Err(Exception::attribute_error(a.kind.name(), attr));
            };
            let s = s.borrow();
            let values = s
                .values
                .iter()
                .map(|c| dt_property(c, attr))
                .collect::<Res<Vec<_>>>()?;
            Ok(Value::series(s.derive(values)))
        }
        _ => Err(Exception::attribute_error(a.kind.name(), attr)),
    }
}

pub(super) fn call(_interp: &mut Interpreter, a: &Rc<Accessor>, name: &str, args: Args) -> Res<Value> {
    let Value::Series(s) = &a.target else {
        return Err(Exception::attribute_error(a.kind.name(), name));
    };
    let s = s.borrow();
    match a.kind {
        AccessorKind::Str => str_method(&s, name, &args),
        AccessorKind::Dt => dt_method(&s, name, &args),
        _ => Err(Exception::attribute_error(a.kind.name(), name)),
    }
}

// ---------------------------------------------------------------------------
// .dt
// ---------------------------------------------------------------------------

fn dt_property(cell: &Cell, attr: &str) -> Res<Cell> {
    let int = |v: u32| Cell::Int(i64::from(v));
    Ok(match cell {
        Cell::DateTime(dt) => match attr {
            "year" => Cell::Int(i64::from(dt.year())),
            "month" => int(dt.month()),
            "day" => int(dt.day()),
            "hour" => int(dt.hour()),
            "minute" => int(dt.minute()),
            "second" => int(dt.second()),
            "microsecond" => int(dt.nanosecond() / 1_000),
            "dayofweek" | "weekday" | "day_of_week" => int(dt.weekday().num_days_from_monday()),
            "dayofyear" | "day_of_year" => int(dt.ordinal()),
            "quarter" => int((dt.month() - 1) / 3 + 1),
            "week" | "weekofyear" => int(dt.iso_week().week()),
            "days_in_month" | "daysinmonth" => int(days_in_month(dt)),
            "is_month_start" => Cell::Bool(dt.day() == 1),
            "is_month_end" => Cell::Bool(dt.day() == days_in_month(dt)),
            "date" => Cell::DateTime(dt.date().and_time(NaiveTime::MIN)),
            "time" => Cell::Str(dt.time().format("%H:%M:%S").to_string()),
            other => return Err(Exception::attribute_error("DatetimeProperties", other)),
        },
        Cell::Timedelta(d) => match attr {
            "days" => Cell::Int(d.num_days()),
            "seconds" => Cell::Int(d.num_seconds() - d.num_days() * 86_400),
            "microseconds" => Cell::Int(d.subsec_nanos() as i64 / 1_000),
            other => return Err(Exception::attribute_error("TimedeltaProperties", other)),
        },
        _ => Cell::Float(f64::NAN),
    })
}

fn days_in_month(dt: &NaiveDateTime) -> u32 {
    let (y, m) = if dt.month() == 12 {
        (dt.year() + 1, 1)
    } else {
        (dt.year(), dt.month() + 1)
    };
    chrono::NaiveDate::from_ymd_opt(y, m, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(31)
}

fn dt_method(s: &Series, name: &str, args: &Args) -> Res<Value> {
    let map = |f: &dyn Fn(&NaiveDateTime) -> Res<Cell>| -> Res<Value> {
        let values = s
            .values
            .iter()
            .map(|c| match c {
                Cell::DateTime(dt) => f(dt),
                other => Ok(if other.is_missing() { Cell::Float(f64::NAN) } else { other.clone() }),
            })
            .collect::<Res<Vec<_>>>()?;
        Ok(Value::series(s.derive(values)))
    };
    match name {
        "day_name" => map(&|dt| Ok(Cell::Str(dt.format("%A").to_string()))),
        "month_name" => map(&|dt| Ok(Cell::Str(dt.format("%B").to_string()))),
        "strftime" => {
            let fmt = args.str_opt(0, "date_format")?.unwrap_or_default();
            map(&|dt| Ok(Cell::Str(strftime(dt, &fmt)?)))
        }
        "normalize" => {
            let values = s
                .values
                .iter()
                .map(|c| match c {
                    Cell::DateTime(dt) => Cell::DateTime(dt.date().and_time(NaiveTime::MIN)),
                    other => other.clone(),
                })
                .collect();
            Ok(Value::series(s.derive(values)))
        }
        "floor" => {
            let freq = args.str_opt(0, "freq")?.unwrap_or_else(|| "D".into());
            let values = s
                .values
                .iter()
                .map(|c| match c {
                    Cell::DateTime(dt) => Ok(Cell::DateTime(floor(dt, &freq)?)),
                    other => Ok(other.clone()),
                })
                .collect::<Res<Vec<_>>>()?;
            Ok(Value::series(s.derive(values)))
        }
        "to_period" => {
            let freq = args.str_opt(0, "freq")?.unwrap_or_else(|| "D".into());
            map(&|dt| Ok(Cell::Str(period(dt, &freq)?)))
        }
        "total_seconds" => {
            let values = s
                .values
                .iter()
                .map(|c| match c {
                    Cell::Timedelta(d) => Cell::Float(d.num_milliseconds() as f64 / 1_000.0),
                    _ => Cell::Float(f64::NAN),
                })
                .collect();
            Ok(Value::series(s.derive(values)))
        }
        other => Err(Exception::attribute_error("DatetimeProperties", other)),
    }
}

fn floor(dt: &NaiveDateTime, freq: &str) -> Res<NaiveDateTime> {
    let date = dt.date();
    let at = |h: u32, m: u32| {
        NaiveTime::from_hms_opt(h, m, 0)
            .map(|t| date.and_time(t))
            .ok_or_else(|| Exception::value_error("invalid time"))
    };
    match freq {
        "D" => at(0, 0),
        "h" | "H" => at(dt.hour(), 0),
        "min" | "T" => at(dt.hour(), dt.minute()),
        other => Err(Exception::value_error(format!("Invalid frequency: {other}"))),
    }
}

fn period(dt: &NaiveDateTime, freq: &str) -> Res<String> {
    Ok(match freq {
        "Y" | "A" | "YE" => format!("{}", dt.year()),
        "Q" | "QE" => format!("{}Q{}", dt.year(), (dt.month() - 1) / 3 + 1),
        "M" | "ME" => format!("{}-{:02}", dt.year(), dt.month()),
        "W" => {
            let start = dt.date() - chrono::Duration::days(i64::from(dt.weekday().num_days_from_monday()));
            let end = start + chrono::Duration::days(6);
            format!("{start}/{end}")
        }
        "D" => dt.date().to_string(),
        "h" | "H" => dt.format("%Y-%m-%d %H:00").to_string(),
        other => return Err(Exception::value_error(format!("Invalid frequency: {other}"))),
    })
}

// ---------------------------------------------------------------------------
// .str
// ---------------------------------------------------------------------------

/// Apply `f` to every string; other cells become missing.
fn map_strings(s: &Series, f: impl Fn(&str) -> Res<Cell>) -> Res<Value> {
    let values = s
        .values
        .iter()
        .map(|c| match c {
            Cell::Str(text) => f(text),
            _ => Ok(Cell::Float(f64::NAN)),
        })
        .collect::<Res<Vec<_>>>()?;
    Ok(Value::series(s.derive(values)))
}

fn compile(pattern: &str, case: bool) -> Res<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(!case)
        .build()
        .map_err(|e| Exception::new("re.error", e.to_string()))
}

fn text_arg(args: &Args, i: usize, name: &str, func: &str) -> Res<String> {
    match args.require(i, name, func)? {
        Value::Str(s) => Ok(s.to_string()),
        other => Err(Exception::type_error(format!(
            "first argument must be string, not {}",
            other.type_name()
        ))),
    }
}

fn predicate(s: &Series, f: impl Fn(&str) -> bool) -> Res<Value> {
    map_strings(s, |t| Ok(Cell::Bool(f(t))))
}

fn str_method(s: &Series, name: &str, args: &Args) -> Res<Value> {
    match name {
        "contains" => {
            let pat = text_arg(args, 0, "pat", name)?;
            let case = args.bool_or(1, "case", true)?;
            let use_regex = args.bool_or(usize::MAX, "regex", true)?;
            let na = match args.kw("na") {
                Some(v) if !v.is_none() => scalar_cell(v)?,
                _ => Cell::Float(f64::NAN),
            };
            let matcher: Box<dyn Fn(&str) -> bool> = if use_regex {
                let re = compile(&pat, case)?;
                Box::new(move |t| re.is_match(t))
            } else if case {
                Box::new(move |t| t.contains(pat.as_str()))
            } else {
                let needle = pat.to_lowercase();
                Box::new(move |t| t.to_lowercase().contains(&needle))
            };
            let values = s
                .values
                .iter()
                .map(|c| match c {
                    Cell::Str(t) => Cell::Bool(matcher(t)),
                    _ => na.clone(),
                })
                .collect();
            Ok(Value::series(s.derive(values)))
        }
        "startswith" | "endswith" => {
            let prefixes: Vec<String> = match args.require(0, "pat", name)? {
                Value::Tuple(items) => items.iter().map(Value::to_str).collect(),
                Value::Str(p) => vec![p.to_string()],
                other => {
                    return Err(Exception::type_error(format!(
                        "expected a string or tuple, not {}",
                        other.type_name()
                    )))
                }
            };
            let start = name == "startswith";
            predicate(s, |t| {
                prefixes
                    .iter()
                    .any(|p| if start { t.starts_with(p.as_str()) } else { t.ends_with(p.as_str()) })
            })
        }
        "lower" | "casefold" => map_strings(s, |t| Ok(Cell::Str(t.to_lowercase()))),
        "upper" => map_strings(s, |t| Ok(Cell::Str(t.to_uppercase()))),
        "title" => map_strings(s, |t| Ok(Cell::Str(title_case(t)))),
        "capitalize" => map_strings(s, |t| {
            let mut chars = t.chars();
            Ok(Cell::Str(match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
                None => String::new(),
            }))
        }),
        "swapcase" => map_strings(s, |t| {
            Ok(Cell::Str(
                t.chars()
                    .flat_map(|c| {
                        if c.is_uppercase() {
                            c.to_lowercase().collect::<Vec<_>>()
                        } else {
                            c.to_uppercase().collect::<Vec<_>>()
                        }
                    })
                    .collect(),
            ))
        }),
        "strip" | "lstrip" | "rstrip" => {
            let chars: Option<Vec<char>> = args.str_opt(0, "to_strip")?.map(|c| c.chars().collect());
            map_strings(s, |t| {
                let strip = |c: char| match &chars {
                    Some(set) => set.contains(&c),
                    None => c.is_whitespace(),
                };
                Ok(Cell::Str(
                    match name {
                        "lstrip" => t.trim_start_matches(strip),
                        "rstrip" => t.trim_end_matches(strip),
                        _ => t.trim_matches(strip),
                    }
                    .to_string(),
                ))
            })
        }
        "len" => map_strings(s, |t| Ok(Cell::Int(t.chars().count() as i64))),
        "replace" => {
            let pat = text_arg(args, 0, "pat", name)?;
            let repl = text_arg(args, 1, "repl", name)?;
            let n = args.int_or(2, "n", -1)?;
            let case = args.bool_or(3, "case", true)?;
            if args.bool_or(usize::MAX, "regex", false)? || !case {
                let re = compile(&pat, case)?;
                let repl = python_replacement(&repl);
                let limit = if n < 0 { 0 } else { n as usize };
                map_strings(s, |t| Ok(Cell::Str(re.replacen(t, limit, repl.as_str()).into_owned())))
            } else if n < 0 {
                map_strings(s, |t| Ok(Cell::Str(t.replace(pat.as_str(), &repl))))
            } else {
                map_strings(s, |t| Ok(Cell::Str(t.replacen(pat.as_str(), &repl, n as usize))))
            }
        }
        "split" => split(s, args),
        "slice" => {
            let start = args.opt(0, "start").and_then(Value::as_int);
            let stop = args.opt(1, "stop").and_then(Value::as_int);
            let step = args.opt(2, "step").and_then(Value::as_int).unwrap_or(1);
            if step == 0 {
                return Err(Exception::value_error("slice step cannot be zero"));
            }
            let bounds = [
                start.map(Value::Int).unwrap_or(Value::None),
                stop.map(Value::Int).unwrap_or(Value::None),
                Value::Int(step),
            ];
            map_strings(s, |t| {
                let chars: Vec<char> = t.chars().collect();
                let positions = super::super::interp::slice_positions(chars.len(), &bounds)?;
                Ok(Cell::Str(positions.into_iter().map(|p| chars[p]).collect()))
            })
        }
        "get" => {
            let i = args.int_or(0, "i", 0)?;
            map_strings(s, |t| {
                let chars: Vec<char> = t.chars().collect();
                let len = chars.len() as i64;
                let p = if i < 0 { len + i } else { i };
                Ok(if (0..len).contains(&p) {
                    Cell::Str(chars[p as usize].to_string())
                } else {
                    Cell::Float(f64::NAN)
                })
            })
        }
        "zfill" => {
            let width = args.int_or(0, "width", 0)?.max(0) as usize;
            check_str_len(width)?;
            map_strings(s, |t| {
                let len = t.chars().count();
                if len >= width {
                    return Ok(Cell::Str(t.to_string()));
                }
                let pad = "0".repeat(width - len);
                Ok(Cell::Str(match t.strip_prefix(['-', '+']) {
                    Some(rest) => format!("{}{pad}{rest}", &t[..1]),
                    None => format!("{pad}{t}"),
                }))
            })
        }
        "pad" | "center" | "ljust" | "rjust" => {
            let width = args.int_or(0, "width", 0)?.max(0) as usize;
            check_str_len(width)?;
            let side = match name {
                "pad" => args.str_opt(1, "side")?.unwrap_or_else(|| "left".into()),
                "center" => "both".into(),
                "ljust" => "right".into(),
                _ => "left".into(),
            };
            let fill_pos = if name == "pad" { 2 } else { 1 };
            let fill = args
                .str_opt(fill_pos, "fillchar")?
                .and_then(|f| f.chars().next())
                .unwrap_or(' ');
            map_strings(s, |t| {
                let len = t.chars().count();
                let missing = width.saturating_sub(len);
                let fill_n = |n: usize| std::iter::repeat(fill).take(n).collect::<String>();
                Ok(Cell::Str(match side.as_str() {
                    "right" => format!("{t}{}", fill_n(missing)),
                    "both" => {
                        let left = missing / 2;
                        format!("{}{t}{}", fill_n(left), fill_n(missing - left))
                    }
                    _ => format!("{}{t}", fill_n(missing)),
                }))
            })
        }
        "count" => {
            let re = compile(&text_arg(args, 0, "pat", name)?, true)?;
            map_strings(s, |t| Ok(Cell::Int(re.find_iter(t).count() as i64)))
        }
        "find" => {
            let sub = text_arg(args, 0, "sub", name)?;
            map_strings(s, |t| {
                Ok(Cell::Int(match t.find(sub.as_str()) {
                    Some(byte) => t[..byte].chars().count() as i64,
                    None => -1,
                }))
            })
        }
        "match" | "fullmatch" => {
            let pat = text_arg(args, 0, "pat", name)?;
            let case = args.bool_or(1, "case", true)?;
            let anchored = if name == "match" {
                format!("^(?:{pat})")
            } else {
                format!("^(?:{pat})$")
            };
            let re = compile(&anchored, case)?;
            predicate(s, |t| re.is_match(t))
        }
        "extract" => extract(s, &text_arg(args, 0, "pat", name)?, args),
        "isdigit" | "isdecimal" => predicate(s, |t| !t.is_empty() && t.chars().all(|c| c.is_ascii_digit())),
        "isnumeric" => predicate(s, |t| !t.is_empty() && t.chars().all(char::is_numeric)),
        "isalpha" => predicate(s, |t| !t.is_empty() && t.chars().all(char::is_alphabetic)),
        "isalnum" => predicate(s, |t| !t.is_empty() && t.chars().all(char::is_alphanumeric)),
        "isspace" => predicate(s, |t| !t.is_empty() && t.chars().all(char::is_whitespace)),
        "islower" => predicate(s, |t| {
            t.chars().any(char::is_lowercase) && !t.chars().any(char::is_uppercase)
        }),
        "isupper" => predicate(s, |t| {
            t.chars().any(char::is_uppercase) && !t.chars().any(char::is_lowercase)
        }),
        "istitle" => predicate(s, |t| !t.is_empty() && title_case(t) == t),
        "cat" => {
            let sep = args.str_opt(usize::MAX, "sep")?.unwrap_or_default();
            let parts: Vec<&str> = s.values.iter().filter_map(Cell::as_str).collect();
            Ok(Value::str(parts.join(&sep)))
        }
        other => Err(Exception::attribute_error("StringMethods", other)),
    }
}

fn title_case(t: &str) -> String {
    let mut out = String::with_capacity(t.len());
    let mut prev_alpha = false;
    for c in t.chars() {
        if prev_alpha {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        prev_alpha = c.is_alphabetic();
    }
    out
}

/// `\1` and `\g<name>` group references in regex-crate syntax.
fn python_replacement(repl: &str) -> String {
    let backref = Regex::new(r"\\(\d+)|\\g<(\w+)>").ok();
    match backref {
        Some(re) => re
            .replace_all(&repl.replace('$', "$$"), |caps: &regex::Captures<'_>| {
                let group = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str()).unwrap_or("");
                format!("${{{group}}}")
            })
            .into_owned(),
        None => repl.to_string(),
    }
}

fn split(s: &Series, args: &Args) -> Res<Value> {
    let pat = args.str_opt(0, "pat")?;
    let n = args.int_or(1, "n", -1)?;
    let expand = args.bool_or(usize::MAX, "expand", false)?;
    let pieces = |t: &str| -> Vec<String> {
        let limit = if n < 0 { usize::MAX } else { n as usize + 1 };
        match &pat {
            Some(p) => t.splitn(limit, p.as_str()).map(str::to_string).collect(),
            None if limit == usize::MAX => t.split_whitespace().map(str::to_string).collect(),
            None => {
                let mut out: Vec<String> = Vec::new();
                let mut rest = t.trim_start();
                while !rest.is_empty() {
                    if out.len() + 1 == limit {
                        out.push(rest.to_string());
                        break;
                    }
                    let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
                    out.push(rest[..end].to_string());
                    rest = rest[end..].trim_start();
                }
                out
            }
        }
    };
    let split_rows: Vec<Option<Vec<String>>> = s
        .values
        .iter()
        .map(|c| c.as_str().map(|t| pieces(t)))
        .collect();
    if !expand {
        return Ok(Value::list(
            split_rows
                .into_iter()
                .map(|row| match row {
                    Some(parts) => Value::list(parts.into_iter().map(Value::str).collect()),
                    None => Value::Float(f64::NAN),
                })
                .collect(),
        ));
    }
    let width = split_rows.iter().flatten().map(Vec::len).max().unwrap_or(0);
    let columns = (0..width)
        .map(|i| {
            let cells = split_rows
                .iter()
                .map(|row| match row.as_ref().and_then(|parts| parts.get(i)) {
                    Some(part) => Cell::Str(part.clone()),
                    None => Cell::Null,
                })
                .collect();
            (i.to_string(), cells)
        })
        .collect();
    Ok(Value::frame(Table::with_index(columns, s.index.clone())?))
}

fn extract(s: &Series, pat: &str, args: &Args) -> Res<Value> {
    let re = compile(pat, true)?;
    let groups = re.captures_len() - 1;
    if groups == 0 {
        return Err(Exception::value_error("pattern contains no capture groups"));
    }
    let expand = args.bool_or(usize::MAX, "expand", true)?;
    let names: Vec<String> = re
        .capture_names()
        .skip(1)
        .enumerate()
        .map(|(i, n)| n.map(str::to_string).unwrap_or_else(|| i.to_string()))
        .collect();
    let mut columns: Vec<Vec<Cell>> = vec![Vec::with_capacity(s.len()); groups];
    for cell in &s.values {
        let caps = cell.as_str().and_then(|t| re.captures(t));
        for (g, column) in columns.iter_mut().enumerate() {
            column.push(
                caps.as_ref()
                    .and_then(|c| c.get(g + 1))
                    .map(|m| Cell::Str(m.as_str().to_string()))
                    .unwrap_or(Cell::Float(f64::NAN)),
            );
        }
    }
    if groups == 1 && !expand {
        let values = columns.into_iter().next().unwrap_or_default();
        return Ok(Value::series(s.derive(values)));
    }
    let table = Table::with_index(names.into_iter().zip(columns).collect(), s.index.clone())?;
    Ok(Value::frame(table))
}
