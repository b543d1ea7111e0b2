// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// Builtin namespace and native module tables.
//
// Only names listed here resolve; `open`, `exec`, `eval`, `__import__`,
// `getattr` and the other escape hatches are simply undefined.

use std::rc::Rc;

use crate::lang::ast::BinOp;

use super::interp::{py_cmp, sort_values, Interpreter};
use super::value::{range_len, shared, Args, Dict, Exception, Res, Value, TYPE_NAMES};

const BUILTIN_FUNCTIONS: &[&str] = &[
    "print", "len", "range", "enumerate", "zip", "map", "filter", "sorted", "reversed", "sum",
    "min", "max", "abs", "round", "int", "float", "str", "bool", "list", "dict", "tuple", "set",
    "type", "isinstance", "any", "all", "format", "repr", "divmod", "pow", "chr", "ord",
    "callable",
];

const EXCEPTION_TYPES: &[&str] = &[
    "BaseException", "Exception", "ValueError", "TypeError", "KeyError", "IndexError",
    "ZeroDivisionError", "AttributeError", "NameError", "RuntimeError", "AssertionError",
    "StopIteration", "NotImplementedError", "ImportError", "ModuleNotFoundError", "LookupError",
    "ArithmeticError", "OverflowError", "RecursionError", "OSError", "PermissionError",
    "FileNotFoundError", "TimeoutError", "Warning", "UserWarning", "FutureWarning",
    "DeprecationWarning",
];

/// Modules the interpreter can provide, subject to the allow-list.
const KNOWN_MODULES: &[&str] = &[
    "pandas", "numpy", "plotly", "plotly.express", "plotly.graph_objects", "plotly.subplots",
    "math", "statistics", "json", "copy", "warnings", "datetime",
];

/// Longest prefixes first so `plotly.express.bar` is not read as `plotly`.
const NATIVE_PREFIXES: &[&str] = &[
    "plotly.graph_objects", "plotly.express", "plotly.subplots", "pandas", "numpy", "math",
    "statistics", "json", "copy", "warnings", "datetime",
];

fn module_functions(module: &str) -> &'static [&'static str] {
    match module {
        "pandas" => &[
            "DataFrame", "Series", "to_datetime", "to_numeric", "concat", "isna", "isnull",
            "notna", "notnull", "Timestamp", "Timedelta", "date_range", "unique", "set_option",
            "cut", "merge",
        ],
        "numpy" => &[
            "array", "asarray", "mean", "median", "sum", "std", "var", "min", "max", "sqrt", "log",
            "log10", "log2", "exp", "abs", "round", "arange", "linspace", "zeros", "ones", "where",
            "unique", "percentile", "isnan", "cumsum", "float64", "int64", "ndarray", "clip",
            "floor", "ceil", "argmax", "argmin", "prod", "nanmean", "nansum", "maximum", "minimum",
            "corrcoef",
        ],
        "plotly.express" => &["bar", "line", "scatter", "pie", "histogram", "box", "area"],
        "plotly.graph_objects" => &[
            "Figure", "Bar", "Scatter", "Pie", "Histogram", "Box", "Heatmap", "Table",
        ],
        "plotly.subplots" => &["make_subplots"],
        "math" => &[
            "sqrt", "floor", "ceil", "log", "log10", "log2", "exp", "pow", "fabs", "isnan", "isinf",
            "isfinite", "sin", "cos", "tan", "factorial", "gcd", "fsum", "prod", "trunc",
        ],
        "statistics" => &[
            "mean", "median", "mode", "stdev", "pstdev", "variance", "pvariance",
        ],
        "json" => &["dumps", "loads"],
        "copy" => &["copy", "deepcopy"],
        "warnings" => &["filterwarnings", "simplefilter", "warn", "catch_warnings"],
        "datetime" => &["datetime", "timedelta", "date"],
        _ => &[],
    }
}

pub(crate) fn is_known_module(name: &str) -> bool {
    KNOWN_MODULES.contains(&name)
}

/// Resolve a name that is not bound in any scope.
pub(crate) fn builtin_value(name: &str) -> Option<Value> {
    if BUILTIN_FUNCTIONS.contains(&name) {
        Some(Value::builtin(name))
    } else if EXCEPTION_TYPES.contains(&name) {
        Some(Value::ExcType(Rc::from(name)))
    } else {
        None
    }
}

/// `module.attr`.
pub(crate) fn module_attr(module: &str, attr: &str) -> Res<Value> {
    let qualified = format!("{module}.{attr}");
    let constant = match (module, attr) {
        ("pandas", "NaT") => Some(Value::NaT),
        ("pandas", "NA") | ("numpy", "nan") | ("numpy", "NaN") | ("math", "nan") => {
            Some(Value::Float(f64::NAN))
        }
        ("numpy", "inf") | ("math", "inf") => Some(Value::Float(f64::INFINITY)),
        ("numpy", "pi") | ("math", "pi") => Some(Value::Float(std::f64::consts::PI)),
        ("numpy", "e") | ("math", "e") => Some(Value::Float(std::f64::consts::E)),
        ("plotly", "express" | "graph_objects" | "subplots") => {
            Some(Value::Module(Rc::from(qualified.as_str())))
        }
        _ => None,
    };
    if let Some(value) = constant {
        return Ok(value);
    }
    if module_functions(module).contains(&attr) {
        return Ok(Value::builtin(&qualified));
    }
    Err(Exception::new(
        "AttributeError",
        format!("module '{module}' has no attribute '{attr}'"),
    ))
}

/// `type.attr`: class methods and unbound methods.
pub(crate) fn type_attr(type_name: &str, attr: &str) -> Res<Value> {
    let known = match type_name {
        "datetime.datetime" => matches!(attr, "now" | "today" | "strptime" | "fromisoformat"),
        "datetime.date" => matches!(attr, "today"),
        "pandas.Timestamp" => matches!(attr, "now" | "today"),
        "dict" => matches!(attr, "fromkeys") || is_unbound_method(type_name, attr),
        "str" | "list" | "set" | "tuple" => is_unbound_method(type_name, attr),
        _ => false,
    };
    if known && !attr.starts_with('_') {
        return Ok(Value::builtin(&format!("{type_name}.{attr}")));
    }
    Err(Exception::new(
        "AttributeError",
        format!(
            "type object '{}' has no attribute '{attr}'",
            super::value::short_name(type_name)
        ),
    ))
}

fn is_unbound_method(type_name: &str, attr: &str) -> bool {
    super::methods::method_names(type_name).contains(&attr)
}

impl Interpreter {
    /// Call a native function by qualified name.
    pub(crate) fn call_native(&mut self, name: &str, mut args: Args) -> Res<Value> {
        for prefix in NATIVE_PREFIXES {
            let Some(func) = name.strip_prefix(prefix).and_then(|r| r.strip_prefix('.')) else {
                continue;
            };
            return match *prefix {
                "pandas" => super::pandas::call_function(self, func, args),
                "numpy" => super::numpy::call_function(self, func, args),
                "plotly.express" => super::plotly::express_call(self, func, args),
                "plotly.graph_objects" => super::plotly::graph_objects_call(self, func, args),
                "plotly.subplots" => super::plotly::subplots_call(func, args),
                module => super::stdlib::call(self, module, func, args),
            };
        }
        if let Some((type_name, method)) = name.split_once('.') {
            if type_name == "dict" && method == "fromkeys" {
                let keys = args.require(0, "iterable", "fromkeys")?.clone();
                let fill = args.get(1, "value").cloned().unwrap_or(Value::None);
                let mut dict = Dict::new();
                for key in self.iterate(&keys)? {
                    dict.insert(key, fill.clone())?;
                }
                return Ok(Value::Dict(shared(dict)));
            }
            if args.pos.is_empty() {
                return Err(Exception::type_error(format!(
                    "unbound method {type_name}.{method}() needs an argument"
                )));
            }
            let receiver = args.pos.remove(0);
            return self.call_method(&receiver, method, args);
        }
        self.call_builtin(name, args)
    }

    fn call_builtin(&mut self, name: &str, args: Args) -> Res<Value> {
        match name {
            "print" => {
                let sep = match args.kw("sep") {
                    Some(Value::None) | None => " ".to_string(),
                    Some(v) => v.to_str(),
                };
                let end = match args.kw("end") {
                    Some(Value::None) | None => "\n".to_string(),
                    Some(v) => v.to_str(),
                };
                let parts: Vec<String> = args.pos.iter().map(Value::to_str).collect();
                let line = format!("{}{end}", parts.join(&sep));
                self.write_stdout(&line);
                Ok(Value::None)
            }
            "len" => {
                let v = args.require(0, "obj", "len")?;
                Ok(Value::Int(length(v)? as i64))
            }
            "range" => {
                let ints: Vec<i64> = args
                    .pos
                    .iter()
                    .map(|v| {
                        v.as_int().ok_or_else(|| {
                            Exception::type_error(format!(
                                "'{}' object cannot be interpreted as an integer",
                                v.type_name()
                            ))
                        })
                    })
                    .collect::<Res<_>>()?;
                let (start, stop, step) = match ints.as_slice() {
                    [stop] => (0, *stop, 1),
                    [start, stop] => (*start, *stop, 1),
                    [start, stop, step] => (*start, *stop, *step),
                    _ => {
                        return Err(Exception::type_error(format!(
                            "range expected at most 3 arguments, got {}",
                            ints.len()
                        )))
                    }
                };
                if step == 0 {
                    return Err(Exception::value_error("range() arg 3 must not be zero"));
                }
                Ok(Value::Range(start, stop, step))
            }
            "enumerate" => {
                let items = self.iterate(args.require(0, "iterable", "enumerate")?)?;
                let start = args.int_or(1, "start", 0)?;
                Ok(Value::list(
                    items
                        .into_iter()
                        .enumerate()
                        .map(|(i, v)| Value::tuple(vec![Value::Int(start + i as i64), v]))
                        .collect(),
                ))
            }
            "zip" => {
                let mut columns = Vec::with_capacity(args.pos.len());
                for v in &args.pos {
                    columns.push(self.iterate(v)?);
                }
                let n = columns.iter().map(Vec::len).min().unwrap_or(0);
                Ok(Value::list(
                    (0..n)
                        .map(|i| Value::tuple(columns.iter().map(|c| c[i].clone()).collect()))
                        .collect(),
                ))
            }
            "map" => {
                let f = args.require(0, "func", "map")?.clone();
                let mut columns = Vec::new();
                for v in &args.pos[1..] {
                    columns.push(self.iterate(v)?);
                }
                let n = columns.iter().map(Vec::len).min().unwrap_or(0);
                let mut out = Vec::with_capacity(n);
                for i in 0..n {
                    let call_args = columns.iter().map(|c| c[i].clone()).collect();
                    out.push(self.call1(&f, call_args)?);
                }
                Ok(Value::list(out))
            }
            "filter" => {
                let f = args.require(0, "function", "filter")?.clone();
                let items = self.iterate(args.require(1, "iterable", "filter")?)?;
                let mut out = Vec::new();
                for item in items {
                    let keep = if f.is_none() {
                        item.truthy()?
                    } else {
                        self.call1(&f, vec![item.clone()])?.truthy()?
                    };
                    if keep {
                        out.push(item);
                    }
                }
                Ok(Value::list(out))
            }
            "sorted" => {
                let items = self.iterate(args.require(0, "iterable", "sorted")?)?;
                let key = args.kw("key").cloned();
                let reverse = args.kw("reverse").map(Value::truthy).transpose()?.unwrap_or(false);
                Ok(Value::list(sort_values(self, items, key.as_ref(), reverse)?))
            }
            "reversed" => {
                let mut items = self.iterate(args.require(0, "sequence", "reversed")?)?;
                items.reverse();
                Ok(Value::list(items))
            }
            "sum" => {
                let items = self.iterate(args.require(0, "iterable", "sum")?)?;
                let mut total = args.get(1, "start").cloned().unwrap_or(Value::Int(0));
                for item in items {
                    total = self.binary_op(BinOp::Add, &total, &item)?;
                }
                Ok(total)
            }
            "min" | "max" => self.extreme(name, args),
            "abs" => {
                let v = args.require(0, "x", "abs")?;
                match v {
                    Value::Int(i) => Ok(Value::Int(i.abs())),
                    Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
                    Value::Float(f) => Ok(Value::Float(f.abs())),
                    Value::Timedelta(d) => Ok(Value::Timedelta(d.abs())),
                    Value::Series(_) | Value::Array(_) | Value::Frame(_) => {
                        self.call_method(v, "abs", Args::default())
                    }
                    other => Err(Exception::type_error(format!(
                        "bad operand type for abs(): '{}'",
                        other.type_name()
                    ))),
                }
            }
            "round" => {
                let v = args.require(0, "number", "round")?.clone();
                let digits = args.opt(1, "ndigits").and_then(Value::as_int);
                round_value(self, &v, digits)
            }
            "int" => to_int(&args),
            "float" => to_float(args.get(0, "x").unwrap_or(&Value::Float(0.0))),
            "str" => Ok(Value::str(
                args.get(0, "object").map(Value::to_str).unwrap_or_default(),
            )),
            "bool" => Ok(Value::Bool(match args.get(0, "x") {
                Some(v) => v.truthy()?,
                None => false,
            })),
            "list" => Ok(Value::list(match args.get(0, "iterable") {
                Some(v) => self.iterate(v)?,
                None => Vec::new(),
            })),
            "tuple" => Ok(Value::tuple(match args.get(0, "iterable") {
                Some(v) => self.iterate(v)?,
                None => Vec::new(),
            })),
            "set" => {
                let mut set = Dict::new();
                if let Some(v) = args.get(0, "iterable") {
                    for item in self.iterate(v)? {
                        set.insert(item, Value::None)?;
                    }
                }
                Ok(Value::Set(shared(set)))
            }
            "dict" => self.make_dict(&args),
            "type" => Ok(type_of(args.require(0, "object", "type")?)),
            "isinstance" => {
                let v = args.require(0, "obj", "isinstance")?;
                let t = args.require(1, "class_or_tuple", "isinstance")?;
                Ok(Value::Bool(isinstance(v, t)?))
            }
            "any" | "all" => {
                let items = self.iterate(args.require(0, "iterable", name)?)?;
                let want_any = name == "any";
                for item in items {
                    if item.truthy()? == want_any {
                        return Ok(Value::Bool(want_any));
                    }
                }
                Ok(Value::Bool(!want_any))
            }
            "format" => {
                let v = args.require(0, "value", "format")?;
                let spec = args.str_opt(1, "format_spec")?.unwrap_or_default();
                Ok(Value::str(super::format::format_with_spec(v, &spec)?))
            }
            "repr" => Ok(Value::str(args.require(0, "obj", "repr")?.repr())),
            "divmod" => {
                let a = args.require(0, "x", "divmod")?.clone();
                let b = args.require(1, "y", "divmod")?.clone();
                let q = self.binary_op(BinOp::FloorDiv, &a, &b)?;
                let r = self.binary_op(BinOp::Mod, &a, &b)?;
                Ok(Value::tuple(vec![q, r]))
            }
            "pow" => {
                let a = args.require(0, "base", "pow")?.clone();
                let b = args.require(1, "exp", "pow")?.clone();
                let p = self.binary_op(BinOp::Pow, &a, &b)?;
                match args.opt(2, "mod") {
                    Some(m) => self.binary_op(BinOp::Mod, &p, &m.clone()),
                    None => Ok(p),
                }
            }
            "chr" => {
                let i = args.int_or(0, "i", 0)?;
                u32::try_from(i)
                    .ok()
                    .and_then(char::from_u32)
                    .map(|c| Value::str(c.to_string()))
                    .ok_or_else(|| Exception::value_error("chr() arg not in range(0x110000)"))
            }
            "ord" => match args.require(0, "c", "ord")? {
                Value::Str(s) if s.chars().count() == 1 => {
                    Ok(Value::Int(s.chars().next().map(|c| c as i64).unwrap_or(0)))
                }
                other => Err(Exception::type_error(format!(
                    "ord() expected a character, but string of length {} found",
                    length(other).unwrap_or(0)
                ))),
            },
            "callable" => Ok(Value::Bool(matches!(
                args.require(0, "obj", "callable")?,
                Value::Function(_) | Value::Builtin(_) | Value::ExcType(_)
            ))),
            other => Err(Exception::new(
                "NameError",
                format!("name '{other}' is not defined"),
            )),
        }
    }

    fn extreme(&mut self, name: &str, args: Args) -> Res<Value> {
        let items = if args.pos.len() == 1 {
            self.iterate(&args.pos[0])?
        } else {
            args.pos.clone()
        };
        let key = args.kw("key").cloned().filter(|k| !k.is_none());
        if items.is_empty() {
            return args.kw("default").cloned().ok_or_else(|| {
                Exception::value_error(format!("{name}() arg is an empty sequence"))
            });
        }
        let want_max = name == "max";
        let mut best: Option<(Value, Value)> = None;
        for item in items {
            let k = match &key {
                Some(f) => self.call1(f, vec![item.clone()])?,
                None => item.clone(),
            };
            let replace = match &best {
                None => true,
                Some((best_key, _)) => match py_cmp(&k, best_key)? {
                    Some(std::cmp::Ordering::Greater) => want_max,
                    Some(std::cmp::Ordering::Less) => !want_max,
                    _ => false,
                },
            };
            if replace {
                best = Some((k, item));
            }
        }
        Ok(best.map(|(_, v)| v).unwrap_or(Value::None))
    }

    fn make_dict(&mut self, args: &Args) -> Res<Value> {
        let mut dict = Dict::new();
        if let Some(source) = args.pos.first() {
            match source {
                Value::Dict(d) => {
                    for (k, v) in d.borrow().entries.iter() {
                        dict.insert(k.clone(), v.clone())?;
                    }
                }
                other => {
                    for pair in self.iterate(other)? {
                        let kv = self.iterate(&pair)?;
                        if kv.len() != 2 {
                            return Err(Exception::value_error(format!(
                                "dictionary update sequence element has length {}; 2 is required",
                                kv.len()
                            )));
                        }
                        let mut kv = kv.into_iter();
                        if let (Some(k), Some(v)) = (kv.next(), kv.next()) {
                            dict.insert(k, v)?;
                        }
                    }
                }
            }
        }
        for (k, v) in &args.kw {
            dict.insert(Value::str(k), v.clone())?;
        }
        Ok(Value::Dict(shared(dict)))
    }
}

pub(crate) fn length(v: &Value) -> Res<usize> {
    Ok(match v {
        Value::Str(s) => s.chars().count(),
        Value::List(items) => items.borrow().len(),
        Value::Tuple(items) => items.len(),
        Value::Dict(d) | Value::Set(d) => d.borrow().len(),
        Value::Range(start, stop, step) => {
            let n = range_len(*start, *stop, *step);
            if n > i64::MAX as usize {
                return Err(Exception::overflow_error(
                    "Python int too large to convert to C ssize_t",
                ));
            }
            n
        }
        Value::Frame(t) => t.borrow().nrows(),
        Value::Series(s) => s.borrow().len(),
        Value::Array(cells) => cells.borrow().len(),
        Value::GroupBy(g) => g.groups.len(),
        other => {
            return Err(Exception::type_error(format!(
                "object of type '{}' has no len()",
                other.type_name()
            )))
        }
    })
}

fn round_value(interp: &mut Interpreter, v: &Value, digits: Option<i64>) -> Res<Value> {
    match (v, digits) {
        (Value::Int(_) | Value::Bool(_), _) => Ok(Value::Int(v.as_int().unwrap_or(0))),
        (Value::Float(f), None) => {
            if !f.is_finite() {
                return Err(Exception::value_error(format!(
                    "cannot convert float {} to integer",
                    crate::frame::format_float(*f)
                )));
            }
            Ok(Value::Int(f.round_ties_even() as i64))
        }
        (Value::Float(f), Some(d)) => {
            let factor = 10f64.powi(d as i32);
            Ok(Value::Float((f * factor).round_ties_even() / factor))
        }
        (Value::Series(_) | Value::Array(_) | Value::Frame(_), d) => interp.call_method(
            v,
            "round",
            Args::new(vec![Value::Int(d.unwrap_or(0))]),
        ),
        (other, _) => Err(Exception::type_error(format!(
            "type {} doesn't define __round__ method",
            other.type_name()
        ))),
    }
}

fn to_int(args: &Args) -> Res<Value> {
    let Some(v) = args.get(0, "x") else {
        return Ok(Value::Int(0));
    };
    let base = args.int_or(1, "base", 10)?;
    match v {
        Value::Int(i) => Ok(Value::Int(*i)),
        Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
        Value::Float(f) => {
            if f.is_nan() {
                Err(Exception::value_error("cannot convert float NaN to integer"))
            } else if f.is_infinite() {
                Err(Exception::new(
                    "OverflowError",
                    "cannot convert float infinity to integer",
                ))
            } else {
                Ok(Value::Int(f.trunc() as i64))
            }
        }
        Value::Str(s) => {
            let cleaned = s.trim().replace('_', "");
            i64::from_str_radix(&cleaned, base as u32)
                .map(Value::Int)
                .map_err(|_| {
                    Exception::value_error(format!(
                        "invalid literal for int() with base {base}: {}",
                        super::value::quote(s)
                    ))
                })
        }
        other => Err(Exception::type_error(format!(
            "int() argument must be a string, a bytes-like object or a real number, not '{}'",
            other.type_name()
        ))),
    }
}

pub(crate) fn to_float(v: &Value) -> Res<Value> {
    match v {
        Value::Float(f) => Ok(Value::Float(*f)),
        Value::Int(_) | Value::Bool(_) => Ok(Value::Float(v.as_f64().unwrap_or(0.0))),
        Value::Str(s) => {
            let t = s.trim().to_ascii_lowercase().replace('_', "");
            let parsed = match t.as_str() {
                "nan" | "+nan" | "-nan" => Some(f64::NAN),
                "inf" | "+inf" | "infinity" | "+infinity" => Some(f64::INFINITY),
                "-inf" | "-infinity" => Some(f64::NEG_INFINITY),
                other => other.parse::<f64>().ok(),
            };
            parsed.map(Value::Float).ok_or_else(|| {
                Exception::value_error(format!(
                    "could not convert string to float: {}",
                    super::value::quote(s)
                ))
            })
        }
        other => Err(Exception::type_error(format!(
            "float() argument must be a string or a real number, not '{}'",
            other.type_name()
        ))),
    }
}

fn type_of(v: &Value) -> Value {
    let name = match v {
        Value::None => "NoneType",
        Value::Bool(_) => "bool",
        Value::Int(_) => "int",
        Value::Float(_) => "float",
        Value::Str(_) => "str",
        Value::List(_) => "list",
        Value::Tuple(_) => "tuple",
        Value::Dict(_) => "dict",
        Value::Set(_) => "set",
        Value::Range(..) => "range",
        Value::Frame(_) => "pandas.DataFrame",
        Value::Series(_) => "pandas.Series",
        Value::Array(_) => "numpy.ndarray",
        Value::DateTime(_) => "pandas.Timestamp",
        Value::Timedelta(_) => "pandas.Timedelta",
        Value::Function(_) => "function",
        Value::Exception(e) => return Value::ExcType(Rc::from(e.kind.as_str())),
        other => return Value::str(format!("<class '{}'>", other.type_name())),
    };
    Value::builtin(name)
}

fn isinstance(v: &Value, t: &Value) -> Res<bool> {
    match t {
        Value::Tuple(types) => {
            for ty in types.iter() {
                if isinstance(v, ty)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Value::ExcType(kind) => Ok(matches!(v, Value::Exception(e) if e.kind == **kind || Exception::new(&e.kind, "").matches(kind))),
        Value::Builtin(b) if b.receiver.is_none() && TYPE_NAMES.contains(&&*b.name) => {
            Ok(match &*b.name {
                "object" => true,
                "int" | "numpy.int64" => matches!(v, Value::Int(_) | Value::Bool(_)),
                "float" | "numpy.float64" => matches!(v, Value::Float(_)),
                "str" => matches!(v, Value::Str(_)),
                "bool" => matches!(v, Value::Bool(_)),
                "list" => matches!(v, Value::List(_)),
                "dict" => matches!(v, Value::Dict(_)),
                "tuple" => matches!(v, Value::Tuple(_)),
                "set" => matches!(v, Value::Set(_)),
                "range" => matches!(v, Value::Range(..)),
                "pandas.DataFrame" => matches!(v, Value::Frame(_)),
                "pandas.Series" => matches!(v, Value::Series(_)),
                "numpy.ndarray" => matches!(v, Value::Array(_)),
                "pandas.Timestamp" | "datetime.datetime" | "datetime.date" => {
                    matches!(v, Value::DateTime(_))
                }
                "pandas.Timedelta" | "datetime.timedelta" => matches!(v, Value::Timedelta(_)),
                "NoneType" => v.is_none(),
                "function" => matches!(v, Value::Function(_)),
                _ => false,
            })
        }
        other => Err(Exception::type_error(format!(
            "isinstance() arg 2 must be a type, a tuple of types, or a union, not {}",
            other.type_name()
        ))),
    }
}
