// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// Methods of the builtin container and string types.

use super::format::str_format;
use super::interp::{py_eq, seq_index, sort_values, Interpreter};
use super::value::{check_len, check_str_len, shared, Args, Dict, Exception, Res, Value};

const STR_METHODS: &[&str] = &[
    "upper", "lower", "title", "capitalize", "casefold", "swapcase", "strip", "lstrip", "rstrip",
    "split", "rsplit", "splitlines", "join", "replace", "startswith", "endswith", "find", "rfind",
    "index", "count", "format", "isdigit", "isnumeric", "isdecimal", "isalpha", "isalnum",
    "isspace", "isupper", "islower", "zfill", "center", "ljust", "rjust", "partition",
    "removeprefix", "removesuffix",
];

const LIST_METHODS: &[&str] = &[
    "append", "extend", "insert", "pop", "remove", "index", "count", "sort", "reverse", "copy",
    "clear",
];

const DICT_METHODS: &[&str] = &[
    "get", "keys", "values", "items", "pop", "setdefault", "update", "copy", "clear", "popitem",
];

const SET_METHODS: &[&str] = &[
    "add", "remove", "discard", "update", "union", "intersection", "difference", "issubset",
    "issuperset", "copy", "clear", "pop",
];

pub(crate) fn method_names(type_name: &str) -> &'static [&'static str] {
    match type_name {
        "str" => STR_METHODS,
        "list" => LIST_METHODS,
        "dict" => DICT_METHODS,
        "set" => SET_METHODS,
        "tuple" => &["count", "index"],
        _ => &[],
    }
}

fn no_method(receiver: &Value, name: &str) -> Exception {
    Exception::attribute_error(&receiver.type_name(), name)
}

pub(crate) fn call(interp: &mut Interpreter, receiver: &Value, name: &str, args: Args) -> Res<Value> {
    match receiver {
        Value::Str(s) => str_method(interp, s, name, args),
        Value::List(_) => list_method(interp, receiver, name, args),
        Value::Tuple(items) => match name {
            "count" => {
                let x = args.require(0, "value", "count")?;
                Ok(Value::Int(items.iter().filter(|v| py_eq(v, x)).count() as i64))
            }
            "index" => {
                let x = args.require(0, "value", "index")?;
                items
                    .iter()
                    .position(|v| py_eq(v, x))
                    .map(|i| Value::Int(i as i64))
                    .ok_or_else(|| Exception::value_error("tuple.index(x): x not in tuple"))
            }
            _ => Err(no_method(receiver, name)),
        },
        Value::Dict(_) => dict_method(interp, receiver, name, args),
        Value::Set(_) => set_method(interp, receiver, name, args),
        _ => Err(no_method(receiver, name)),
    }
}

// ---------------------------------------------------------------------------
// str
// ---------------------------------------------------------------------------

fn str_arg(args: &Args, i: usize, name: &str, method: &str) -> Res<String> {
    match args.require(i, name, method)? {
        Value::Str(s) => Ok(s.to_string()),
        other => Err(Exception::type_error(format!(
            "{method}() argument must be str, not {}",
            other.type_name()
        ))),
    }
}

fn strip_chars<'a>(s: &'a str, chars: Option<&str>, left: bool, right: bool) -> &'a str {
    let pred = |c: char| match chars {
        Some(set) => set.contains(c),
        None => c.is_whitespace(),
    };
    let s = if left { s.trim_start_matches(pred) } else { s };
    if right {
        s.trim_end_matches(pred)
    } else {
        s
    }
}

fn str_method(interp: &mut Interpreter, s: &str, name: &str, args: Args) -> Res<Value> {
    let text = |v: String| Ok(Value::str(v));
    match name {
        "upper" => text(s.to_uppercase()),
        "lower" | "casefold" => text(s.to_lowercase()),
        "swapcase" => text(
            s.chars()
                .map(|c| {
                    if c.is_uppercase() {
                        c.to_lowercase().collect::<String>()
                    } else {
                        c.to_uppercase().collect::<String>()
                    }
                })
                .collect(),
        ),
        "title" => {
            let mut out = String::with_capacity(s.len());
            let mut start = true;
            for c in s.chars() {
                if c.is_alphabetic() {
                    if start {
                        out.extend(c.to_uppercase());
                    } else {
                        out.extend(c.to_lowercase());
                    }
                    start = false;
                } else {
                    out.push(c);
                    start = true;
                }
            }
            text(out)
        }
        "capitalize" => {
            let mut chars = s.chars();
            text(match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            })
        }
        "strip" | "lstrip" | "rstrip" => {
            let chars = args.str_opt(0, "chars")?;
            let (left, right) = match name {
                "lstrip" => (true, false),
                "rstrip" => (false, true),
                _ => (true, true),
            };
            text(strip_chars(s, chars.as_deref(), left, right).to_string())
        }
        "split" | "rsplit" => {
            let sep = args.str_opt(0, "sep")?;
            let maxsplit = args.int_or(1, "maxsplit", -1)?;
            let parts: Vec<String> = match (sep.as_deref(), maxsplit) {
                (Some(""), _) => return Err(Exception::value_error("empty separator")),
                (None, m) if m < 0 => s.split_whitespace().map(str::to_string).collect(),
                (None, m) => {
                    let words: Vec<&str> = s.split_whitespace().collect();
                    let m = m as usize;
                    if words.len() <= m + 1 {
                        words.iter().map(|w| w.to_string()).collect()
                    } else if name == "split" {
                        let mut out: Vec<String> = words[..m].iter().map(|w| w.to_string()).collect();
                        let consumed: usize = {
                            let mut rest = s.trim_start();
                            for w in &words[..m] {
                                rest = rest[w.len()..].trim_start();
                            }
                            s.len() - rest.len()
                        };
                        out.push(s[consumed..].to_string());
                        out
                    } else {
                        let mut out = vec![words[..words.len() - m].join(" ")];
                        out.extend(words[words.len() - m..].iter().map(|w| w.to_string()));
                        out
                    }
                }
                (Some(sep), m) if m < 0 => s.split(sep).map(str::to_string).collect(),
                (Some(sep), m) if name == "split" => {
                    s.splitn(m as usize + 1, sep).map(str::to_string).collect()
                }
                (Some(sep), m) => {
                    let mut out: Vec<String> =
                        s.rsplitn(m as usize + 1, sep).map(str::to_string).collect();
                    out.reverse();
                    out
                }
            };
            Ok(Value::list(parts.into_iter().map(Value::str).collect()))
        }
        "splitlines" => Ok(Value::list(s.lines().map(Value::str).collect())),
        "join" => {
            let items = interp.iterate(args.require(0, "iterable", "join")?)?;
            let mut parts = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                match item {
                    Value::Str(p) => parts.push(p.to_string()),
                    other => {
                        return Err(Exception::type_error(format!(
                            "sequence item {i}: expected str instance, {} found",
                            other.type_name()
                        )))
                    }
                }
            }
            text(parts.join(s))
        }
        "replace" => {
            let old = str_arg(&args, 0, "old", "replace")?;
            let new = str_arg(&args, 1, "new", "replace")?;
            let count = args.int_or(2, "count", -1)?;
            if new.len() > old.len() {
                let mut hits =
                    if old.is_empty() { s.chars().count() + 1 } else { s.matches(&old).count() };
                if count >= 0 {
                    hits = hits.min(count as usize);
                }
                check_str_len(s.len().saturating_add(hits.saturating_mul(new.len() - old.len())))?;
            }
            text(if count < 0 {
                s.replace(&old, &new)
            } else {
                s.replacen(&old, &new, count as usize)
            })
        }
        "startswith" | "endswith" => {
            let candidates = match args.require(0, "prefix", name)? {
                Value::Tuple(items) => items.iter().map(Value::to_str).collect(),
                Value::Str(p) => vec![p.to_string()],
                other => {
                    return Err(Exception::type_error(format!(
                        "{name} first arg must be str or a tuple of str, not {}",
                        other.type_name()
                    )))
                }
            };
            let hit = candidates.iter().any(|p| {
                if name == "startswith" {
                    s.starts_with(p.as_str())
                } else {
                    s.ends_with(p.as_str())
                }
            });
            Ok(Value::Bool(hit))
        }
        "find" | "rfind" | "index" => {
            let sub = str_arg(&args, 0, "sub", name)?;
            let found = if name == "rfind" { s.rfind(&sub) } else { s.find(&sub) };
            match found {
                Some(byte) => Ok(Value::Int(s[..byte].chars().count() as i64)),
                None if name == "index" => Err(Exception::value_error("substring not found")),
                None => Ok(Value::Int(-1)),
            }
        }
        "count" => {
            let sub = str_arg(&args, 0, "sub", "count")?;
            Ok(Value::Int(if sub.is_empty() {
                s.chars().count() as i64 + 1
            } else {
                s.matches(&sub).count() as i64
            }))
        }
        "format" => text(str_format(s, &args)?),
        "isdigit" | "isnumeric" | "isdecimal" => Ok(Value::Bool(
            !s.is_empty() && s.chars().all(|c| c.is_numeric()),
        )),
        "isalpha" => Ok(Value::Bool(!s.is_empty() && s.chars().all(char::is_alphabetic))),
        "isalnum" => Ok(Value::Bool(!s.is_empty() && s.chars().all(char::is_alphanumeric))),
        "isspace" => Ok(Value::Bool(!s.is_empty() && s.chars().all(char::is_whitespace))),
        "isupper" => Ok(Value::Bool(
            s.chars().any(char::is_alphabetic) && !s.chars().any(char::is_lowercase),
        )),
        "islower" => Ok(Value::Bool(
            s.chars().any(char::is_alphabetic) && !s.chars().any(char::is_uppercase),
        )),
        "zfill" => {
            let width = args.int_or(0, "width", 0)?.max(0) as usize;
            let len = s.chars().count();
            if len >= width {
                return text(s.to_string());
            }
            check_str_len(s.len() + (width - len))?;
            let (sign, digits) = match s.chars().next() {
                Some(c @ ('+' | '-')) => (c.to_string(), &s[1..]),
                _ => (String::new(), s),
            };
            text(format!("{sign}{}{digits}", "0".repeat(width - len)))
        }
        "center" | "ljust" | "rjust" => {
            let width = args.int_or(0, "width", 0)?.max(0) as usize;
            let fill = args
                .str_opt(1, "fillchar")?
                .and_then(|f| f.chars().next())
                .unwrap_or(' ');
            let len = s.chars().count();
            if len >= width {
                return text(s.to_string());
            }
            let missing = width - len;
            check_str_len(s.len().saturating_add(missing.saturating_mul(fill.len_utf8())))?;
            let pad = |n: usize| std::iter::repeat(fill).take(n).collect::<String>();
            text(match name {
                "ljust" => format!("{s}{}", pad(missing)),
                "rjust" => format!("{}{s}", pad(missing)),
                _ => {
                    let left = missing / 2 + (missing & width & 1);
                    format!("{}{s}{}", pad(left), pad(missing - left))
                }
            })
        }
        "partition" => {
            let sep = str_arg(&args, 0, "sep", "partition")?;
            let parts = match s.split_once(&sep) {
                Some((a, b)) => vec![Value::str(a), Value::str(&sep), Value::str(b)],
                None => vec![Value::str(s), Value::str(""), Value::str("")],
            };
            Ok(Value::tuple(parts))
        }
        "removeprefix" => {
            let p = str_arg(&args, 0, "prefix", name)?;
            text(s.strip_prefix(p.as_str()).unwrap_or(s).to_string())
        }
        "removesuffix" => {
            let p = str_arg(&args, 0, "suffix", name)?;
            text(s.strip_suffix(p.as_str()).unwrap_or(s).to_string())
        }
        _ => Err(no_method(&Value::str(s), name)),
    }
}

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

fn list_method(interp: &mut Interpreter, receiver: &Value, name: &str, args: Args) -> Res<Value> {
    let Value::List(list) = receiver else {
        return Err(no_method(receiver, name));
    };
    match name {
        "append" => {
            let v = args.require(0, "object", "append")?.clone();
            list.borrow_mut().push(v);
            Ok(Value::None)
        }
        "extend" => {
            let items = interp.iterate(args.require(0, "iterable", "extend")?)?;
            check_len(list.borrow().len().saturating_add(items.len()))?;
            list.borrow_mut().extend(items);
            Ok(Value::None)
        }
        "insert" => {
            let at = args.int_or(0, "index", 0)?;
            let v = args.require(1, "object", "insert")?.clone();
            let mut items = list.borrow_mut();
            let n = items.len() as i64;
            let pos = if at < 0 { (at + n).max(0) } else { at.min(n) };
            items.insert(pos as usize, v);
            Ok(Value::None)
        }
        "pop" => {
            let mut items = list.borrow_mut();
            if items.is_empty() {
                return Err(Exception::index_error("pop from empty list"));
            }
            let at = args.int_or(0, "index", -1)?;
            let i = seq_index(&Value::Int(at), items.len(), "pop")
                .map_err(|_| Exception::index_error("pop index out of range"))?;
            Ok(items.remove(i))
        }
        "remove" => {
            let x = args.require(0, "value", "remove")?;
            let mut items = list.borrow_mut();
            match items.iter().position(|v| py_eq(v, x)) {
                Some(i) => {
                    items.remove(i);
                    Ok(Value::None)
                }
                None => Err(Exception::value_error("list.remove(x): x not in list")),
            }
        }
        "index" => {
            let x = args.require(0, "value", "index")?;
            let found = list.borrow().iter().position(|v| py_eq(v, x));
            found
                .map(|i| Value::Int(i as i64))
                .ok_or_else(|| Exception::value_error(format!("{} is not in list", x.repr())))
        }
        "count" => {
            let x = args.require(0, "value", "count")?;
            let n = list.borrow().iter().filter(|v| py_eq(v, x)).count();
            Ok(Value::Int(n as i64))
        }
        "sort" => {
            let items = list.borrow().clone();
            let key = args.kw("key").cloned();
            let reverse = args.kw("reverse").map(Value::truthy).transpose()?.unwrap_or(false);
            let sorted = sort_values(interp, items, key.as_ref(), reverse)?;
            *list.borrow_mut() = sorted;
            Ok(Value::None)
        }
        "reverse" => {
            list.borrow_mut().reverse();
            Ok(Value::None)
        }
        "copy" => Ok(Value::list(list.borrow().clone())),
        "clear" => {
            list.borrow_mut().clear();
            Ok(Value::None)
        }
        _ => Err(no_method(receiver, name)),
    }
}

// ---------------------------------------------------------------------------
// dict
// ---------------------------------------------------------------------------

fn dict_method(interp: &mut Interpreter, receiver: &Value, name: &str, args: Args) -> Res<Value> {
    let Value::Dict(dict) = receiver else {
        return Err(no_method(receiver, name));
    };
    match name {
        "get" => {
            let key = args.require(0, "key", "get")?;
            let default = args.get(1, "default").cloned().unwrap_or(Value::None);
            let found = dict.borrow().get(key)?.cloned();
            Ok(found.unwrap_or(default))
        }
        "keys" => Ok(Value::list(dict.borrow().keys())),
        "values" => Ok(Value::list(dict.borrow().values())),
        "items" => Ok(Value::list(
            dict.borrow()
                .entries
                .iter()
                .map(|(k, v)| Value::tuple(vec![k.clone(), v.clone()]))
                .collect(),
        )),
        "pop" => {
            let key = args.require(0, "key", "pop")?;
            let removed = dict.borrow_mut().remove(key)?;
            match (removed, args.get(1, "default")) {
                (Some(v), _) => Ok(v),
                (None, Some(default)) => Ok(default.clone()),
                (None, None) => Err(Exception::key_error(key.repr())),
            }
        }
        "setdefault" => {
            let key = args.require(0, "key", "setdefault")?.clone();
            let default = args.get(1, "default").cloned().unwrap_or(Value::None);
            let existing = dict.borrow().get(&key)?.cloned();
            match existing {
                Some(v) => Ok(v),
                None => {
                    dict.borrow_mut().insert(key, default.clone())?;
                    Ok(default)
                }
            }
        }
        "update" => {
            let mut pairs = Vec::new();
            if let Some(source) = args.pos.first() {
                match source {
                    Value::Dict(other) => pairs.extend(other.borrow().entries.iter().cloned()),
                    other => {
                        for pair in interp.iterate(other)? {
                            let kv = interp.iterate(&pair)?;
                            if let [k, v] = kv.as_slice() {
                                pairs.push((k.clone(), v.clone()));
                            } else {
                                return Err(Exception::value_error(
                                    "dictionary update sequence element has wrong length",
                                ));
                            }
                        }
                    }
                }
            }
            for (k, v) in &args.kw {
                pairs.push((Value::str(k), v.clone()));
            }
            let mut d = dict.borrow_mut();
            for (k, v) in pairs {
                d.insert(k, v)?;
            }
            Ok(Value::None)
        }
        "copy" => Ok(Value::Dict(shared(dict.borrow().clone()))),
        "clear" => {
            dict.borrow_mut().clear();
            Ok(Value::None)
        }
        "popitem" => {
            let last = dict.borrow().entries.last().cloned();
            match last {
                Some((k, v)) => {
                    dict.borrow_mut().remove(&k)?;
                    Ok(Value::tuple(vec![k, v]))
                }
                None => Err(Exception::key_error("'popitem(): dictionary is empty'")),
            }
        }
        _ => Err(no_method(receiver, name)),
    }
}

// ---------------------------------------------------------------------------
// set
// ---------------------------------------------------------------------------

fn set_method(interp: &mut Interpreter, receiver: &Value, name: &str, args: Args) -> Res<Value> {
    let Value::Set(set) = receiver else {
        return Err(no_method(receiver, name));
    };
    let other_items = |interp: &mut Interpreter, args: &Args| -> Res<Vec<Value>> {
        let mut out = Vec::new();
        for v in &args.pos {
            out.extend(interp.iterate(v)?);
        }
        Ok(out)
    };
    match name {
        "add" => {
            let v = args.require(0, "elem", "add")?.clone();
            set.borrow_mut().insert(v, Value::None)?;
            Ok(Value::None)
        }
        "remove" => {
            let v = args.require(0, "elem", "remove")?;
            match set.borrow_mut().remove(v)? {
                Some(_) => Ok(Value::None),
                None => Err(Exception::key_error(v.repr())),
            }
        }
        "discard" => {
            let v = args.require(0, "elem", "discard")?;
            set.borrow_mut().remove(v)?;
            Ok(Value::None)
        }
        "update" => {
            let items = other_items(interp, &args)?;
            let mut s = set.borrow_mut();
            for item in items {
                s.insert(item, Value::None)?;
            }
            Ok(Value::None)
        }
        "union" => {
            let mut out = set.borrow().clone();
            for item in other_items(interp, &args)? {
                out.insert(item, Value::None)?;
            }
            Ok(Value::Set(shared(out)))
        }
        "intersection" | "difference" => {
            let mut others = Dict::new();
            for item in other_items(interp, &args)? {
                others.insert(item, Value::None)?;
            }
            let keep_common = name == "intersection";
            let mut out = Dict::new();
            for k in set.borrow().keys() {
                if others.contains(&k)? == keep_common {
                    out.insert(k, Value::None)?;
                }
            }
            Ok(Value::Set(shared(out)))
        }
        "issubset" | "issuperset" => {
            let mut others = Dict::new();
            for item in other_items(interp, &args)? {
                others.insert(item, Value::None)?;
            }
            let mine = set.borrow();
            let result = if name == "issubset" {
                mine.keys().iter().all(|k| others.contains(k).unwrap_or(false))
            } else {
                others.keys().iter().all(|k| mine.contains(k).unwrap_or(false))
            };
            Ok(Value::Bool(result))
        }
        "copy" => Ok(Value::Set(shared(set.borrow().clone()))),
        "clear" => {
            set.borrow_mut().clear();
            Ok(Value::None)
        }
        "pop" => {
            let first = set.borrow().entries.first().map(|(k, _)| k.clone());
            match first {
                Some(k) => {
                    set.borrow_mut().remove(&k)?;
                    Ok(k)
                }
                None => Err(Exception::key_error("'pop from an empty set'")),
            }
        }
        _ => Err(no_method(receiver, name)),
    }
}

// ---------------------------------------------------------------------------
// numbers
// ---------------------------------------------------------------------------

pub(crate) fn number_method(receiver: &Value, name: &str, _args: Args) -> Res<Value> {
    match (receiver, name) {
        (Value::Float(f), "is_integer") => Ok(Value::Bool(f.is_finite() && f.fract() == 0.0)),
        (Value::Int(i), "bit_length") => Ok(Value::Int(64 - i.unsigned_abs().leading_zeros() as i64)),
        (Value::Int(_) | Value::Float(_) | Value::Bool(_), "item") => Ok(receiver.clone()),
        _ => Err(no_method(receiver, name)),
    }
}
