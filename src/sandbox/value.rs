// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// Runtime values of the analysis interpreter.
//
// Mutable containers are shared through `Rc<RefCell<_>>` so that
// aliasing behaves as it does in the language being interpreted:
// `b = a; b.append(1)` mutates `a`, and result extraction can tell two
// names bound to one object from two equal objects.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use chrono::{Duration, NaiveDateTime};

use crate::figure::Figure;
use crate::frame::{
    check_str_bytes, format_float, format_timedelta, Cell, FrameError, Groups, Series, Table,
};
use crate::lang::ast::{Param, Stmt};
use crate::figure::FigureError;

pub(crate) type Shared<T> = Rc<RefCell<T>>;

pub(crate) fn shared<T>(value: T) -> Shared<T> {
    Rc::new(RefCell::new(value))
}

/// Largest list, array or range a script may materialize.
pub const MAX_SEQUENCE_LEN: usize = 10_000_000;

/// Deepest container nesting that repr, comparison, hashing and copying
/// walk before giving up.
pub const MAX_NESTING_DEPTH: usize = 1_000;

/// Fail with `MemoryError` when a sequence of `len` items would pass the
/// cap.
pub(crate) fn check_len(len: usize) -> Res<()> {
    if len > MAX_SEQUENCE_LEN {
        return Err(Exception::memory_error(format!(
            "cannot build a sequence of {len} items (limit {MAX_SEQUENCE_LEN})"
        )));
    }
    Ok(())
}

/// Fail with `MemoryError` when a string of `bytes` would pass the cap.
pub(crate) fn check_str_len(bytes: usize) -> Res<()> {
    Ok(check_str_bytes(bytes)?)
}

// ---------------------------------------------------------------------------
// Exceptions
// ---------------------------------------------------------------------------

/// A raised exception. `fatal` exceptions (step budget, cancellation)
/// cannot be caught by `try`.
#[derive(Debug, Clone, PartialEq)]
pub struct Exception {
    pub kind: String,
    pub message: String,
    pub line: usize,
    pub fatal: bool,
}

impl Exception {
    pub fn new(kind: &str, message: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            message: message.into(),
            line: 0,
            fatal: false,
        }
    }

    pub fn fatal(kind: &str, message: impl Into<String>) -> Self {
        Self {
            fatal: true,
            ..Self::new(kind, message)
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new("TypeError", message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new("ValueError", message)
    }

    pub fn key_error(key: impl fmt::Display) -> Self {
        Self::new("KeyError", key.to_string())
    }

    pub fn attribute_error(type_name: &str, attr: &str) -> Self {
        Self::new(
            "AttributeError",
            format!("'{type_name}' object has no attribute '{attr}'"),
        )
    }

    pub fn index_error(message: impl Into<String>) -> Self {
        Self::new("IndexError", message)
    }

    pub fn memory_error(message: impl Into<String>) -> Self {
        Self::new("MemoryError", message)
    }

    pub fn overflow_error(message: impl Into<String>) -> Self {
        Self::new("OverflowError", message)
    }

    pub fn recursion_error() -> Self {
        Self::new("RecursionError", "maximum recursion depth exceeded")
    }

    pub fn with_line(mut self, line: usize) -> Self {
        if self.line == 0 {
            self.line = line;
        }
        self
    }

    /// Whether an `except <kind>` clause catches this exception.
    pub fn matches(&self, handler_kind: &str) -> bool {
        if self.fatal {
            return false;
        }
        if handler_kind == "Exception" || handler_kind == "BaseException" {
            return true;
        }
        if handler_kind == self.kind {
            return true;
        }
        matches!(
            (handler_kind, self.kind.as_str()),
            ("LookupError", "KeyError" | "IndexError")
                | ("ArithmeticError", "ZeroDivisionError" | "OverflowError")
                | ("OSError", "PermissionError" | "FileNotFoundError")
        )
    }
}

impl From<FrameError> for Exception {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::KeyError(key) => Exception::key_error(format!("'{key}'")),
            FrameError::TypeError(msg) => Exception::type_error(msg),
            FrameError::ValueError(msg) => Exception::value_error(msg),
            FrameError::MemoryError(msg) => Exception::memory_error(msg),
            other @ FrameError::LengthMismatch { .. } => Exception::value_error(other.to_string()),
        }
    }
}

impl From<FigureError> for Exception {
    fn from(e: FigureError) -> Self {
        Exception::value_error(e.to_string())
    }
}

pub(crate) type Res<T> = Result<T, Exception>;

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(Shared<Vec<Value>>),
    Tuple(Rc<Vec<Value>>),
    Dict(Shared<Dict>),
    /// Sets reuse the dict representation with `None` values.
    Set(Shared<Dict>),
    Range(i64, i64, i64),
    Slice(Rc<[Value; 3]>),
    DateTime(NaiveDateTime),
    Timedelta(Duration),
    NaT,
    Frame(Shared<Table>),
    Series(Shared<Series>),
    /// One-dimensional numeric array.
    Array(Shared<Vec<Cell>>),
    GroupBy(Rc<GroupBy>),
    Figure(Shared<Figure>),
    Accessor(Rc<Accessor>),
    Module(Rc<str>),
    Builtin(Rc<Builtin>),
    Function(Rc<Function>),
    ExcType(Rc<str>),
    Exception(Rc<Exception>),
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

/// A group-by with an optional column selection.
#[derive(Debug, Clone)]
pub struct GroupBy {
    pub groups: Groups,
    /// `gb['col']` selects one column (series results); `gb[['a', 'b']]`
    /// several (table results).
    pub selection: Option<Selection>,
    pub as_index: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    One(String),
    Many(Vec<String>),
}

/// Indexer objects returned by attribute access (`df.loc`, `s.str`, ...).
#[derive(Clone)]
pub struct Accessor {
    pub kind: AccessorKind,
    pub target: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessorKind {
    Loc,
    Iloc,
    At,
    Iat,
    Str,
    Dt,
}

impl AccessorKind {
    pub fn name(&self) -> &'static str {
        match self {
            AccessorKind::Loc => "_LocIndexer",
            AccessorKind::Iloc => "_iLocIndexer",
            AccessorKind::At => "_AtIndexer",
            AccessorKind::Iat => "_iAtIndexer",
            AccessorKind::Str => "StringMethods",
            AccessorKind::Dt => "DatetimeProperties",
        }
    }
}

/// A native function, optionally bound to a receiver (a method).
#[derive(Clone)]
pub struct Builtin {
    pub name: Rc<str>,
    pub receiver: Option<Value>,
}

/// A user-defined function or lambda.
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    pub defaults: Vec<Option<Value>>,
    pub body: FunctionBody,
    /// Enclosing local scopes at definition time, innermost last.
    pub closure: Vec<Shared<HashMap<String, Value>>>,
}

pub enum FunctionBody {
    Block(Rc<Vec<Stmt>>),
    Expr(Rc<crate::lang::ast::Expr>),
}

/// Names treated as type objects: calling them converts, `isinstance`
/// checks against them.
pub const TYPE_NAMES: &[&str] = &[
    "int", "float", "str", "bool", "list", "dict", "tuple", "set", "range", "object",
    "NoneType", "function",
    "pandas.DataFrame", "pandas.Series", "pandas.Timestamp", "pandas.Timedelta",
    "numpy.ndarray", "numpy.int64", "numpy.float64", "datetime.datetime",
    "datetime.timedelta", "datetime.date",
];

impl Value {
    pub fn str(s: impl AsRef<str>) -> Value {
        Value::Str(Rc::from(s.as_ref()))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(shared(items))
    }

    pub fn tuple(items: Vec<Value>) -> Value {
        Value::Tuple(Rc::new(items))
    }

    pub fn frame(table: Table) -> Value {
        Value::Frame(shared(table))
    }

    pub fn series(series: Series) -> Value {
        Value::Series(shared(series))
    }

    pub fn array(cells: Vec<Cell>) -> Value {
        Value::Array(shared(cells))
    }

    pub fn figure(figure: Figure) -> Value {
        Value::Figure(shared(figure))
    }

    pub fn builtin(name: &str) -> Value {
        Value::Builtin(Rc::new(Builtin {
            name: Rc::from(name),
            receiver: None,
        }))
    }

    pub fn method(receiver: Value, name: &str) -> Value {
        Value::Builtin(Rc::new(Builtin {
            name: Rc::from(name),
            receiver: Some(receiver),
        }))
    }

    pub fn type_name(&self) -> String {
        match self {
            Value::None => "NoneType".into(),
            Value::Bool(_) => "bool".into(),
            Value::Int(_) => "int".into(),
            Value::Float(_) => "float".into(),
            Value::Str(_) => "str".into(),
            Value::List(_) => "list".into(),
            Value::Tuple(_) => "tuple".into(),
            Value::Dict(_) => "dict".into(),
            Value::Set(_) => "set".into(),
            Value::Range(..) => "range".into(),
            Value::Slice(_) => "slice".into(),
            Value::DateTime(_) => "Timestamp".into(),
            Value::Timedelta(_) => "Timedelta".into(),
            Value::NaT => "NaTType".into(),
            Value::Frame(_) => "DataFrame".into(),
            Value::Series(_) => "Series".into(),
            Value::Array(_) => "ndarray".into(),
            Value::GroupBy(g) => match g.selection {
                Some(Selection::One(_)) => "SeriesGroupBy".into(),
                _ => "DataFrameGroupBy".into(),
            },
            Value::Figure(_) => "Figure".into(),
            Value::Accessor(a) => a.kind.name().into(),
            Value::Module(_) => "module".into(),
            Value::Builtin(b) if TYPE_NAMES.contains(&&*b.name) => "type".into(),
            Value::Builtin(b) if b.receiver.is_some() => "method".into(),
            Value::Builtin(_) => "builtin_function_or_method".into(),
            Value::Function(_) => "function".into(),
            Value::ExcType(_) => "type".into(),
            Value::Exception(e) => e.kind.clone(),
        }
    }

    /// Python truthiness. Tables and series have none.
    pub fn truthy(&self) -> Res<bool> {
        Ok(match self {
            Value::None | Value::NaT => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(l) => !l.borrow().is_empty(),
            Value::Tuple(t) => !t.is_empty(),
            Value::Dict(d) | Value::Set(d) => !d.borrow().is_empty(),
            Value::Range(start, stop, step) => range_len(*start, *stop, *step) > 0,
            Value::Timedelta(d) => !d.is_zero(),
            Value::Frame(_) | Value::Series(_) | Value::Array(_) => {
                return Err(Exception::value_error(format!(
                    "The truth value of a {} is ambiguous. Use a.empty, a.bool(), \
                     a.item(), a.any() or a.all().",
                    self.type_name()
                )))
            }
            _ => true,
        })
    }

    /// Identity, for `is` and for result deduplication.
    pub fn same_object(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::NaT, Value::NaT) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Tuple(a), Value::Tuple(b)) => Rc::ptr_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) | (Value::Set(a), Value::Set(b)) => Rc::ptr_eq(a, b),
            (Value::Frame(a), Value::Frame(b)) => Rc::ptr_eq(a, b),
            (Value::Series(a), Value::Series(b)) => Rc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Figure(a), Value::Figure(b)) => Rc::ptr_eq(a, b),
            (Value::GroupBy(a), Value::GroupBy(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b),
            (Value::Module(a), Value::Module(b)) => a == b,
            (Value::Builtin(a), Value::Builtin(b)) => {
                Rc::ptr_eq(a, b)
                    || (a.receiver.is_none() && b.receiver.is_none() && a.name == b.name)
            }
            (Value::ExcType(a), Value::ExcType(b)) => a == b,
            _ => false,
        }
    }

    /// A stable address for objects with identity.
    pub fn identity(&self) -> Option<usize> {
        match self {
            Value::List(a) => Some(Rc::as_ptr(a) as *const u8 as usize),
            Value::Dict(a) | Value::Set(a) => Some(Rc::as_ptr(a) as *const u8 as usize),
            Value::Frame(a) => Some(Rc::as_ptr(a) as *const u8 as usize),
            Value::Series(a) => Some(Rc::as_ptr(a) as *const u8 as usize),
            Value::Array(a) => Some(Rc::as_ptr(a) as *const u8 as usize),
            Value::Figure(a) => Some(Rc::as_ptr(a) as *const u8 as usize),
            Value::Tuple(a) => Some(Rc::as_ptr(a) as *const u8 as usize),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Numeric view of a scalar, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Scalars as table cells; `None` for containers and objects.
    pub fn to_cell(&self) -> Option<Cell> {
        Some(match self {
            Value::None => Cell::Null,
            Value::Bool(b) => Cell::Bool(*b),
            Value::Int(i) => Cell::Int(*i),
            Value::Float(f) => Cell::Float(*f),
            Value::Str(s) => Cell::Str(s.to_string()),
            Value::DateTime(dt) => Cell::DateTime(*dt),
            Value::Timedelta(d) => Cell::Timedelta(*d),
            Value::NaT => Cell::NaT,
            _ => return None,
        })
    }

    pub fn from_cell(cell: &Cell) -> Value {
        match cell {
            Cell::Null => Value::None,
            Cell::Bool(b) => Value::Bool(*b),
            Cell::Int(i) => Value::Int(*i),
            Cell::Float(f) => Value::Float(*f),
            Cell::Str(s) => Value::str(s),
            Cell::DateTime(dt) => Value::DateTime(*dt),
            Cell::Timedelta(d) => Value::Timedelta(*d),
            Cell::NaT => Value::NaT,
        }
    }

    /// `str(value)`.
    pub fn to_str(&self) -> String {
        match self {
            Value::Str(s) => s.to_string(),
            Value::DateTime(_) | Value::Timedelta(_) | Value::NaT => {
                self.to_cell().map(|c| c.to_string()).unwrap_or_default()
            }
            Value::Frame(t) => crate::frame::render_table(&t.borrow()),
            Value::Series(s) => crate::frame::render_series(&s.borrow()),
            Value::Exception(e) => e.message.clone(),
            _ => self.repr(),
        }
    }

    /// `repr(value)`.
    pub fn repr(&self) -> String {
        self.repr_within(&mut Vec::new())
    }

    /// `repr` with the containers currently being rendered in `active`,
    /// so a container that holds itself renders as `[...]`. Nesting past
    /// `MAX_NESTING_DEPTH` renders as `...`.
    fn repr_within(&self, active: &mut Vec<usize>) -> String {
        if active.len() >= MAX_NESTING_DEPTH {
            return "...".into();
        }
        let id = match self {
            Value::List(_) | Value::Tuple(_) | Value::Dict(_) | Value::Set(_) => self.identity(),
            _ => None,
        };
        if let Some(id) = id {
            if active.contains(&id) {
                return match self {
                    Value::List(_) => "[...]",
                    Value::Tuple(_) => "(...)",
                    _ => "{...}",
                }
                .into();
            }
            active.push(id);
        }
        let out = self.repr_once(active);
        if id.is_some() {
            active.pop();
        }
        out
    }

    fn repr_once(&self, active: &mut Vec<usize>) -> String {
        match self {
            Value::None => "None".into(),
            Value::Bool(true) => "True".into(),
            Value::Bool(false) => "False".into(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Str(s) => quote(s),
            Value::List(items) => {
                let parts: Vec<String> =
                    items.borrow().iter().map(|v| v.repr_within(active)).collect();
                format!("[{}]", parts.join(", "))
            }
            Value::Tuple(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.repr_within(active)).collect();
                if parts.len() == 1 {
                    format!("({},)", parts[0])
                } else {
                    format!("({})", parts.join(", "))
                }
            }
            Value::Dict(d) => {
                let d = d.borrow();
                let parts: Vec<String> = d
                    .entries
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.repr(), v.repr_within(active)))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            Value::Set(d) => {
                let d = d.borrow();
                if d.is_empty() {
                    return "set()".into();
                }
                let parts: Vec<String> = d.entries.iter().map(|(k, _)| k.repr()).collect();
                format!("{{{}}}", parts.join(", "))
            }
            Value::Range(start, stop, step) => {
                if *step == 1 {
                    format!("range({start}, {stop})")
                } else {
                    format!("range({start}, {stop}, {step})")
                }
            }
            Value::Slice(parts) => format!(
                "slice({}, {}, {})",
                parts[0].repr(),
                parts[1].repr(),
                parts[2].repr()
            ),
            Value::DateTime(dt) => format!("Timestamp('{}')", Cell::DateTime(*dt)),
            Value::Timedelta(d) => format!("Timedelta('{}')", format_timedelta(d)),
            Value::NaT => "NaT".into(),
            Value::Frame(_) | Value::Series(_) => self.to_str(),
            Value::Array(cells) => {
                let parts: Vec<String> = cells.borrow().iter().map(cell_repr).collect();
                format!("array([{}])", parts.join(", "))
            }
            Value::GroupBy(_) => format!("<pandas.core.groupby.{} object>", self.type_name()),
            Value::Figure(fig) => {
                let fig = fig.borrow();
                format!("Figure({{'data': {} trace(s)}})", fig.data.len())
            }
            Value::Accessor(a) => format!("<pandas.core.indexing.{} object>", a.kind.name()),
            Value::Module(name) => format!("<module '{name}'>"),
            Value::Builtin(b) if TYPE_NAMES.contains(&&*b.name) => {
                format!("<class '{}'>", short_name(&b.name))
            }
            Value::Builtin(b) => match &b.receiver {
                Some(recv) => format!(
                    "<bound method {}.{} of {}>",
                    recv.type_name(),
                    short_name(&b.name),
                    recv.type_name()
                ),
                None => format!("<built-in function {}>", short_name(&b.name)),
            },
            Value::Function(f) => format!("<function {}>", f.name),
            Value::ExcType(name) => format!("<class '{name}'>"),
            Value::Exception(e) => format!("{}({})", e.kind, quote(&e.message)),
        }
    }
}

/// The unqualified part of a dotted builtin name.
pub fn short_name(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

/// Python string repr: single quotes unless the text contains one and
/// no double quote.
pub fn quote(s: &str) -> String {
    let q = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(q);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == q => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(q);
    out
}

fn cell_repr(cell: &Cell) -> String {
    match cell {
        Cell::Str(s) => quote(s),
        Cell::Null => "None".into(),
        Cell::Float(f) if f.is_nan() => "nan".into(),
        other => other.to_string(),
    }
}

/// Number of values in `range(start, stop, step)`. Saturates at
/// `usize::MAX`; the span of two i64 bounds always fits in i128.
pub fn range_len(start: i64, stop: i64, step: i64) -> usize {
    let (start, stop, step) = (i128::from(start), i128::from(stop), i128::from(step));
    let n = if step > 0 && stop > start {
        (stop - start - 1) / step + 1
    } else if step < 0 && stop < start {
        (start - stop - 1) / (-step) + 1
    } else {
        0
    };
    usize::try_from(n).unwrap_or(usize::MAX)
}

/// The `i`-th value of a range. Callers keep `i` below `range_len`, so the
/// result lies between the bounds.
pub fn range_item(start: i64, step: i64, i: usize) -> i64 {
    let value = i128::from(start) + i as i128 * i128::from(step);
    i64::try_from(value).unwrap_or(if step > 0 { i64::MAX } else { i64::MIN })
}

/// Whether `value` is one of the values of a range.
pub fn range_contains(start: i64, stop: i64, step: i64, value: i64) -> bool {
    let offset = i128::from(value) - i128::from(start);
    let step = i128::from(step);
    if offset % step != 0 {
        return false;
    }
    let position = offset / step;
    position >= 0 && (position as u128) < range_len(start, stop, step as i64) as u128
}

// ---------------------------------------------------------------------------
// Dict
// ---------------------------------------------------------------------------

/// Hashable projection of a key value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    None,
    /// Integers, bools and integral floats share one key space.
    Int(i64),
    Float(u64),
    Str(String),
    Tuple(Vec<HashKey>),
    DateTime(i64),
    Timedelta(i64),
    NaT,
    Object(usize),
}

impl HashKey {
    pub fn of(value: &Value) -> Res<HashKey> {
        Self::nested(value, 0)
    }

    fn nested(value: &Value, depth: usize) -> Res<HashKey> {
        if depth > MAX_NESTING_DEPTH {
            return Err(Exception::recursion_error());
        }
        Ok(match value {
            Value::None => HashKey::None,
            Value::Bool(b) => HashKey::Int(i64::from(*b)),
            Value::Int(i) => HashKey::Int(*i),
            Value::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => HashKey::Int(*f as i64),
            Value::Float(f) => HashKey::Float(f.to_bits()),
            Value::Str(s) => HashKey::Str(s.to_string()),
            Value::Tuple(items) => {
                let keys = items.iter().map(|v| Self::nested(v, depth + 1));
                HashKey::Tuple(keys.collect::<Res<Vec<_>>>()?)
            }
            Value::DateTime(dt) => HashKey::DateTime(dt.and_utc().timestamp_micros()),
            Value::Timedelta(d) => HashKey::Timedelta(d.num_microseconds().unwrap_or(i64::MAX)),
            Value::NaT => HashKey::NaT,
            Value::Function(f) => HashKey::Object(Rc::as_ptr(f) as *const u8 as usize),
            Value::Module(name) => HashKey::Str(format!("<module {name}>")),
            Value::Builtin(b) => HashKey::Str(format!("<builtin {}>", b.name)),
            Value::ExcType(name) => HashKey::Str(format!("<type {name}>")),
            other => {
                return Err(Exception::type_error(format!(
                    "unhashable type: '{}'",
                    other.type_name()
                )))
            }
        })
    }
}

/// Insertion-ordered mapping.
#[derive(Debug, Clone, Default)]
pub struct Dict {
    pub entries: Vec<(Value, Value)>,
    index: HashMap<HashKey, usize>,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &Value) -> Res<Option<&Value>> {
        let hk = HashKey::of(key)?;
        Ok(self.index.get(&hk).map(|&i| &self.entries[i].1))
    }

    pub fn contains(&self, key: &Value) -> Res<bool> {
        Ok(self.index.contains_key(&HashKey::of(key)?))
    }

    pub fn insert(&mut self, key: Value, value: Value) -> Res<()> {
        let hk = HashKey::of(&key)?;
        match self.index.get(&hk) {
            Some(&i) => self.entries[i].1 = value,
            None => {
                self.index.insert(hk, self.entries.len());
                self.entries.push((key, value));
            }
        }
        Ok(())
    }

    pub fn remove(&mut self, key: &Value) -> Res<Option<Value>> {
        let hk = HashKey::of(key)?;
        let Some(pos) = self.index.remove(&hk) else {
            return Ok(None);
        };
        let (_, value) = self.entries.remove(pos);
        for slot in self.index.values_mut() {
            if *slot > pos {
                *slot -= 1;
            }
        }
        Ok(Some(value))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    pub fn keys(&self) -> Vec<Value> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.entries.iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn from_pairs(pairs: Vec<(Value, Value)>) -> Res<Self> {
        let mut dict = Dict::new();
        for (k, v) in pairs {
            dict.insert(k, v)?;
        }
        Ok(dict)
    }
}

// ---------------------------------------------------------------------------
// Call arguments
// ---------------------------------------------------------------------------

/// Evaluated call arguments.
#[derive(Debug, Clone, Default)]
pub struct Args {
    pub pos: Vec<Value>,
    pub kw: Vec<(String, Value)>,
}

impl Args {
    pub fn new(pos: Vec<Value>) -> Self {
        Self {
            pos,
            kw: Vec::new(),
        }
    }

    pub fn kw(&self, name: &str) -> Option<&Value> {
        self.kw.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    /// Positional argument `i`, or the keyword `name`.
    pub fn get(&self, i: usize, name: &str) -> Option<&Value> {
        self.pos.get(i).or_else(|| self.kw(name))
    }

    /// Like `get`, treating an explicit `None` as absent.
    pub fn opt(&self, i: usize, name: &str) -> Option<&Value> {
        self.get(i, name).filter(|v| !v.is_none())
    }

    pub fn require(&self, i: usize, name: &str, func: &str) -> Res<&Value> {
        self.get(i, name).ok_or_else(|| {
            Exception::type_error(format!(
                "{func}() missing required argument: '{name}'"
            ))
        })
    }

    pub fn bool_or(&self, i: usize, name: &str, default: bool) -> Res<bool> {
        match self.get(i, name) {
            Some(v) => v.truthy(),
            None => Ok(default),
        }
    }

    pub fn int_or(&self, i: usize, name: &str, default: i64) -> Res<i64> {
        match self.opt(i, name) {
            Some(Value::Float(f)) if f.fract() == 0.0 => Ok(*f as i64),
            Some(v) => v.as_int().ok_or_else(|| {
                Exception::type_error(format!(
                    "'{}' object cannot be interpreted as an integer",
                    v.type_name()
                ))
            }),
            None => Ok(default),
        }
    }

    pub fn str_opt(&self, i: usize, name: &str) -> Res<Option<String>> {
        match self.opt(i, name) {
            Some(Value::Str(s)) => Ok(Some(s.to_string())),
            Some(other) => Err(Exception::type_error(format!(
                "argument '{name}' must be str, not {}",
                other.type_name()
            ))),
            None => Ok(None),
        }
    }

    pub fn len(&self) -> usize {
        self.pos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pos.is_empty() && self.kw.is_empty()
    }
}
