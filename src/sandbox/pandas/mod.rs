// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// pandas stand-in for the analysis interpreter.
//
// Responsibilities:
// - Element-wise operators over tables, series and arrays
// - Attribute and subscript access (`df['col']`, `df.loc[...]`, `s.str`)
// - Method dispatch for DataFrame, Series, GroupBy and accessors
// - Module-level constructors (`pd.DataFrame`, `pd.to_datetime`, ...)

mod accessor;
mod construct;
mod groupby;
mod indexing;
mod methods_frame;
mod methods_series;

use std::rc::Rc;

use crate::frame::{arith, compare, Agg, Cell, DType, FrameError, Index, Series, Table};
use crate::lang::ast::{self, BinOp, UnaryOp};

use super::interp::{arith_op, Interpreter};
use super::value::{Accessor, AccessorKind, Args, Exception, GroupBy, Res, Selection, Value};

pub(crate) use construct::call_function;
pub(crate) use indexing::{get_item, set_item};

const FRAME_METHODS: &[&str] = &[
    "head", "tail", "copy", "describe", "info", "sum", "mean", "median", "min", "max", "std",
    "var", "count", "nunique", "groupby", "sort_values", "sort_index", "reset_index",
    "set_index", "dropna", "fillna", "isnull", "isna", "notnull", "notna", "drop", "rename",
    "select_dtypes", "corr", "drop_duplicates", "duplicated", "nlargest", "nsmallest", "astype",
    "to_dict", "iterrows", "itertuples", "items", "keys", "apply", "assign", "agg", "aggregate",
    "round", "abs", "pivot_table", "value_counts", "to_string", "equals", "idxmax", "idxmin",
    "quantile", "insert", "pop", "replace", "get", "any", "all", "merge",
];

const SERIES_METHODS: &[&str] = &[
    "head", "tail", "copy", "sum", "mean", "median", "min", "max", "count", "std", "var",
    "nunique", "unique", "value_counts", "sort_values", "sort_index", "reset_index", "isnull",
    "isna", "notnull", "notna", "fillna", "dropna", "cumsum", "round", "abs", "isin", "between",
    "astype", "tolist", "to_list", "to_dict", "to_frame", "idxmax", "idxmin", "argmax", "argmin",
    "nlargest", "nsmallest", "apply", "map", "quantile", "describe", "mode", "any", "all",
    "rename", "items", "drop_duplicates", "clip", "diff", "shift", "pct_change", "agg",
    "aggregate", "to_string", "get", "replace", "prod", "keys", "equals", "duplicated",
    "ffill", "bfill",
];

const GROUPBY_METHODS: &[&str] = &[
    "sum", "mean", "median", "min", "max", "count", "std", "var", "nunique", "first", "last",
    "size", "agg", "aggregate", "apply", "transform", "get_group", "head", "value_counts",
];

const MAX_RANGE_CELLS: usize = super::value::MAX_SEQUENCE_LEN;

pub(crate) fn is_frame_method(attr: &str) -> bool {
    FRAME_METHODS.contains(&attr)
}

pub(crate) fn is_vector(v: &Value) -> bool {
    matches!(v, Value::Frame(_) | Value::Series(_) | Value::Array(_))
}

// ---------------------------------------------------------------------------
// Conversions shared by the submodules
// ---------------------------------------------------------------------------

/// A scalar argument as a cell.
pub(super) fn scalar_cell(v: &Value) -> Res<Cell> {
    v.to_cell().ok_or_else(|| {
        Exception::type_error(format!(
            "expected a scalar value, got '{}'",
            v.type_name()
        ))
    })
}

/// Cells of any one-dimensional value.
pub(super) fn cells_of(v: &Value) -> Res<Vec<Cell>> {
    match v {
        Value::Series(s) => Ok(s.borrow().values.clone()),
        Value::Array(a) => Ok(a.borrow().clone()),
        Value::List(items) => items.borrow().iter().map(scalar_cell).collect(),
        Value::Tuple(items) => items.iter().map(scalar_cell).collect(),
        Value::Dict(d) | Value::Set(d) => d.borrow().keys().iter().map(scalar_cell).collect(),
        Value::Range(start, stop, step) => {
            let n = super::value::range_len(*start, *stop, *step);
            if n > MAX_RANGE_CELLS {
                return Err(Exception::value_error(format!(
                    "range of {n} values is too large to convert"
                )));
            }
            Ok((0..n).map(|i| Cell::Int(super::value::range_item(*start, *step, i))).collect())
        }
        other => Err(Exception::type_error(format!(
            "expected a one-dimensional value, got '{}'",
            other.type_name()
        ))),
    }
}

/// A column name or a list of column names.
fn names_of(v: &Value) -> Res<Vec<String>> {
    match v {
        Value::Str(s) => Ok(vec![s.to_string()]),
        other => Ok(cells_of(other)?.iter().map(|c| c.to_string()).collect()),
    }
}

/// Index label cells; a tuple addresses a multi-level label.
fn label_of(v: &Value) -> Res<Vec<Cell>> {
    match v {
        Value::Tuple(items) => items.iter().map(scalar_cell).collect(),
        other => Ok(vec![scalar_cell(other)?]),
    }
}

/// The value for a label, scalar for single-level labels.
fn label_value(label: &[Cell]) -> Value {
    match label {
        [one] => Value::from_cell(one),
        many => Value::tuple(many.iter().map(Value::from_cell).collect()),
    }
}

/// A boolean vector usable as a row mask, if `v` is one.
fn mask_of(v: &Value) -> Res<Option<Vec<bool>>> {
    let cells: Vec<Cell> = match v {
        Value::Series(s) => {
            let s = s.borrow();
            if s.dtype != DType::Bool && !s.values.iter().all(|c| matches!(c, Cell::Bool(_) | Cell::Null)) {
                return Ok(None);
            }
            s.values.clone()
        }
        Value::Array(a) => a.borrow().clone(),
        Value::List(items) => {
            let items = items.borrow();
            if items.is_empty() || !items.iter().all(|i| matches!(i, Value::Bool(_))) {
                return Ok(None);
            }
            items.iter().filter_map(Value::to_cell).collect()
        }
        _ => return Ok(None),
    };
    if cells.is_empty() || !cells.iter().all(|c| matches!(c, Cell::Bool(_))) {
        if cells.iter().any(|c| matches!(c, Cell::Bool(_))) {
            return Err(Exception::value_error(
                "Cannot mask with non-boolean array containing NA / NaN values",
            ));
        }
        return Ok(None);
    }
    Ok(Some(cells.iter().map(Cell::truthy).collect()))
}

/// A dtype name from `astype` arguments: strings or type objects.
pub(super) fn dtype_name(v: &Value) -> Res<String> {
    match v {
        Value::Str(s) => Ok(s.to_string()),
        Value::Builtin(b) if b.receiver.is_none() => {
            Ok(super::value::short_name(&b.name).to_string())
        }
        other => Err(Exception::type_error(format!(
            "data type '{}' not understood",
            other.repr()
        ))),
    }
}

fn reduction(series: &Series, name: &str) -> Res<Value> {
    let agg = parse_agg(&Value::str(name))?;
    Ok(Value::from_cell(&series.aggregate(agg)?))
}

/// An aggregation named by string, builtin (`sum`, `len`) or numpy
/// function (`np.mean`).
fn parse_agg(v: &Value) -> Res<Agg> {
    let name = match v {
        Value::Str(s) => s.to_string(),
        Value::Builtin(b) => match super::value::short_name(&b.name) {
            "len" => "size".to_string(),
            other => other.to_string(),
        },
        other => {
            return Err(Exception::type_error(format!(
                "aggregation must be a function name, not '{}'",
                other.type_name()
            )))
        }
    };
    Agg::parse(&name).ok_or_else(|| {
        Exception::new(
            "AttributeError",
            format!("'{name}' is not a valid function for 'Series' object"),
        )
    })
}

/// `ascending=` as one flag per sort key (or a single shared flag).
fn ascending_flags(args: &Args, pos: usize) -> Res<Vec<bool>> {
    match args.get(pos, "ascending") {
        None => Ok(vec![true]),
        Some(Value::List(items)) => items.borrow().iter().map(Value::truthy).collect(),
        Some(v) => Ok(vec![v.truthy()?]),
    }
}

fn axis_is_columns(args: &Args, pos: usize) -> bool {
    match args.get(pos, "axis") {
        Some(Value::Int(1)) => true,
        Some(Value::Str(s)) => &**s == "columns",
        _ => false,
    }
}

fn is_callable(v: &Value) -> bool {
    matches!(v, Value::Function(_) | Value::Builtin(_))
}

fn accessor(kind: AccessorKind, target: &Value) -> Value {
    Value::Accessor(Rc::new(Accessor {
        kind,
        target: target.clone(),
    }))
}

fn groupby_value(groups: crate::frame::Groups, selection: Option<Selection>, as_index: bool) -> Value {
    Value::GroupBy(Rc::new(GroupBy {
        groups,
        selection,
        as_index,
    }))
}

/// Apply `f` to every cell, keeping the shape of the vector.
pub(super) fn map_cells(v: &Value, f: impl Fn(&Cell) -> Result<Cell, FrameError>) -> Res<Value> {
    match v {
        Value::Series(s) => {
            let s = s.borrow();
            let values = s.values.iter().map(&f).collect::<Result<Vec<_>, _>>()?;
            Ok(Value::series(s.derive(values)))
        }
        Value::Array(a) => {
            let values = a.borrow().iter().map(&f).collect::<Result<Vec<_>, _>>()?;
            Ok(Value::array(values))
        }
        Value::Frame(t) => {
            let t = t.borrow();
            let mut columns = Vec::with_capacity(t.ncols());
            for col in &t.columns {
                let values = col.values.iter().map(&f).collect::<Result<Vec<_>, _>>()?;
                columns.push((col.name.clone(), values));
            }
            Ok(Value::frame(Table::with_index(columns, t.index.clone())?))
        }
        other => Ok(Value::from_cell(&f(&scalar_cell(other)?)?)),
    }
}

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

enum Operand {
    Vector(Vec<Cell>),
    Scalar(Cell),
}

impl Operand {
    fn of(v: &Value) -> Res<Operand> {
        match v {
            Value::Series(_) | Value::Array(_) | Value::List(_) | Value::Tuple(_) | Value::Range(..) => {
                Ok(Operand::Vector(cells_of(v)?))
            }
            other => Ok(Operand::Scalar(scalar_cell(other).map_err(|_| {
                Exception::type_error(format!(
                    "unsupported operand type '{}' for element-wise operation",
                    other.type_name()
                ))
            })?)),
        }
    }

    fn len(&self) -> Option<usize> {
        match self {
            Operand::Vector(v) => Some(v.len()),
            Operand::Scalar(_) => None,
        }
    }

    fn at(&self, i: usize) -> &Cell {
        match self {
            Operand::Vector(v) => &v[i],
            Operand::Scalar(c) => c,
        }
    }
}

fn zip_cells(
    a: &Operand,
    b: &Operand,
    f: impl Fn(&Cell, &Cell) -> Result<Cell, FrameError>,
) -> Res<Vec<Cell>> {
    let n = match (a.len(), b.len()) {
        (Some(x), Some(y)) if x != y => {
            return Err(Exception::value_error(format!(
                "operands could not be broadcast together with shapes ({x},) ({y},)"
            )))
        }
        (Some(x), _) | (None, Some(x)) => x,
        (None, None) => 1,
    };
    (0..n)
        .map(|i| f(a.at(i), b.at(i)).map_err(Exception::from))
        .collect()
}

/// Combine two values cell by cell, shaping the result after the richest
/// operand: table, then series, then array.
pub(super) fn combine(
    a: &Value,
    b: &Value,
    f: impl Fn(&Cell, &Cell) -> Result<Cell, FrameError> + Copy,
) -> Res<Value> {
    match (a, b) {
        (Value::Frame(x), Value::Frame(y)) => {
            let (x, y) = (x.borrow().clone(), y.borrow().clone());
            let mut columns = Vec::with_capacity(x.ncols());
            for col in &x.columns {
                let other = y.column_ref(&col.name)?;
                let values = zip_cells(
                    &Operand::Vector(col.values.clone()),
                    &Operand::Vector(other.values.clone()),
                    f,
                )?;
                columns.push((col.name.clone(), values));
            }
            Ok(Value::frame(Table::with_index(columns, x.index.clone())?))
        }
        (Value::Frame(t), other) | (other, Value::Frame(t)) => {
            let reflected = matches!(b, Value::Frame(_)) && !matches!(a, Value::Frame(_));
            let scalar = Operand::of(other)?;
            let t = t.borrow().clone();
            let mut columns = Vec::with_capacity(t.ncols());
            for col in &t.columns {
                let own = Operand::Vector(col.values.clone());
                let values = if reflected {
                    zip_cells(&scalar, &own, f)?
                } else {
                    zip_cells(&own, &scalar, f)?
                };
                columns.push((col.name.clone(), values));
            }
            Ok(Value::frame(Table::with_index(columns, t.index.clone())?))
        }
        _ => {
            let (x, y) = (Operand::of(a)?, Operand::of(b)?);
            let values = zip_cells(&x, &y, f)?;
            let base = match (a, b) {
                (Value::Series(s), _) | (_, Value::Series(s)) => Some(s.borrow().clone()),
                _ => None,
            };
            Ok(match base {
                Some(base) => {
                    let mut out = base.derive(values);
                    if let (Value::Series(l), Value::Series(r)) = (a, b) {
                        if l.borrow().name != r.borrow().name {
                            out.name = None;
                        }
                    }
                    Value::series(out)
                }
                None => Value::array(values),
            })
        }
    }
}

fn logical_cell(op: BinOp) -> impl Fn(&Cell, &Cell) -> Result<Cell, FrameError> + Copy {
    move |x: &Cell, y: &Cell| {
        if let (Cell::Int(p), Cell::Int(q)) = (x, y) {
            return Ok(Cell::Int(match op {
                BinOp::BitAnd => p & q,
                BinOp::BitOr => p | q,
                _ => p ^ q,
            }));
        }
        let (p, q) = (!x.is_missing() && x.truthy(), !y.is_missing() && y.truthy());
        Ok(Cell::Bool(match op {
            BinOp::BitAnd => p && q,
            BinOp::BitOr => p || q,
            _ => p ^ q,
        }))
    }
}

pub(crate) fn vector_binop(_interp: &mut Interpreter, op: BinOp, a: &Value, b: &Value) -> Res<Value> {
    if matches!(op, BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor) {
        return combine(a, b, logical_cell(op));
    }
    let Some(arith_kind) = arith_op(op) else {
        return Err(Exception::type_error(format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op.symbol(),
            a.type_name(),
            b.type_name()
        )));
    };
    combine(a, b, move |x: &Cell, y: &Cell| arith(arith_kind, x, y))
}

pub(crate) fn vector_unary(op: UnaryOp, v: &Value) -> Res<Value> {
    match op {
        UnaryOp::Pos => Ok(v.clone()),
        UnaryOp::Not => Ok(Value::Bool(!v.truthy()?)),
        UnaryOp::Neg => map_cells(v, |c| match c {
            Cell::Int(i) => Ok(Cell::Int(-i)),
            Cell::Float(f) => Ok(Cell::Float(-f)),
            Cell::Timedelta(d) => Ok(Cell::Timedelta(-*d)),
            Cell::Null | Cell::NaT => Ok(c.clone()),
            other => Err(FrameError::TypeError(format!(
                "bad operand type for unary -: '{}'",
                other.type_name()
            ))),
        }),
        UnaryOp::Invert => map_cells(v, |c| match c {
            Cell::Bool(b) => Ok(Cell::Bool(!b)),
            Cell::Int(i) => Ok(Cell::Int(!i)),
            other => Err(FrameError::TypeError(format!(
                "bad operand type for unary ~: '{}'",
                other.type_name()
            ))),
        }),
    }
}

pub(crate) fn vector_compare(op: ast::CmpOp, a: &Value, b: &Value) -> Res<Value> {
    let kind = match op {
        ast::CmpOp::Eq => crate::frame::CmpOp::Eq,
        ast::CmpOp::Ne => crate::frame::CmpOp::Ne,
        ast::CmpOp::Lt => crate::frame::CmpOp::Lt,
        ast::CmpOp::Le => crate::frame::CmpOp::Le,
        ast::CmpOp::Gt => crate::frame::CmpOp::Gt,
        ast::CmpOp::Ge => crate::frame::CmpOp::Ge,
        _ => {
            return Err(Exception::type_error(format!(
                "unsupported comparison between '{}' and '{}'",
                a.type_name(),
                b.type_name()
            )))
        }
    };
    combine(a, b, move |x: &Cell, y: &Cell| compare(kind, x, y).map(Cell::Bool))
}

// ---------------------------------------------------------------------------
// Iteration
// ---------------------------------------------------------------------------

/// `for key, group in df.groupby(...)`.
pub(crate) fn groupby_items(g: &Rc<GroupBy>) -> Res<Vec<Value>> {
    let mut out = Vec::with_capacity(g.groups.len());
    for (label, rows) in &g.groups.groups {
        let part = g.groups.table.take(rows);
        let value = match &g.selection {
            Some(Selection::One(col)) => Value::series(part.column(col)?),
            Some(Selection::Many(cols)) => Value::frame(part.select(cols)?),
            None => Value::frame(part),
        };
        out.push(Value::tuple(vec![label_value(label), value]));
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

fn index_value(index: &Index) -> Value {
    if index.levels() == 1 {
        Value::array(index.level_values(0))
    } else {
        Value::list(
            (0..index.len())
                .map(|p| label_value(index.label(p)))
                .collect(),
        )
    }
}

pub(crate) fn get_attr(obj: &Value, attr: &str) -> Res<Value> {
    match obj {
        Value::Frame(t) => {
            let t = t.borrow();
            Ok(match attr {
                "columns" => Value::array(t.column_names().into_iter().map(Cell::Str).collect()),
                "index" => index_value(&t.index),
                "shape" => Value::tuple(vec![
                    Value::Int(t.nrows() as i64),
                    Value::Int(t.ncols() as i64),
                ]),
                "size" => Value::Int((t.nrows() * t.ncols()) as i64),
                "ndim" => Value::Int(2),
                "empty" => Value::Bool(t.nrows() == 0 || t.ncols() == 0),
                "dtypes" => {
                    let (names, kinds): (Vec<Cell>, Vec<Cell>) = t
                        .dtypes()
                        .into_iter()
                        .map(|(n, d)| (Cell::Str(n), Cell::Str(d.as_str().to_string())))
                        .unzip();
                    Value::series(Series::with_index(None, kinds, Index::from_cells(None, names)))
                }
                "values" => Value::list(
                    (0..t.nrows())
                        .map(|r| {
                            Value::list(t.row(r).iter().map(|(_, c)| Value::from_cell(c)).collect())
                        })
                        .collect(),
                ),
                "loc" => accessor(AccessorKind::Loc, obj),
                "iloc" => accessor(AccessorKind::Iloc, obj),
                "at" => accessor(AccessorKind::At, obj),
                "iat" => accessor(AccessorKind::Iat, obj),
                name if FRAME_METHODS.contains(&name) => Value::method(obj.clone(), name),
                name if t.has_column(name) => Value::series(t.column(name)?),
                name => return Err(Exception::attribute_error("DataFrame", name)),
            })
        }
        Value::Series(s) => {
            let s = s.borrow();
            Ok(match attr {
                "name" => s.name.as_deref().map(Value::str).unwrap_or(Value::None),
                "index" => index_value(&s.index),
                "values" | "array" => Value::array(s.values.clone()),
                "dtype" => Value::str(s.dtype.as_str()),
                "shape" => Value::tuple(vec![Value::Int(s.len() as i64)]),
                "size" => Value::Int(s.len() as i64),
                "ndim" => Value::Int(1),
                "empty" => Value::Bool(s.is_empty()),
                "is_unique" => Value::Bool(s.unique().len() == s.len()),
                "hasnans" => Value::Bool(s.values.iter().any(Cell::is_missing)),
                "str" => {
                    if s.dtype != DType::Object {
                        return Err(Exception::new(
                            "AttributeError",
                            "Can only use .str accessor with string values!",
                        ));
                    }
                    accessor(AccessorKind::Str, obj)
                }
                "dt" => {
                    if !matches!(s.dtype, DType::DateTime | DType::Timedelta) {
                        return Err(Exception::new(
                            "AttributeError",
                            "Can only use .dt accessor with datetimelike values",
                        ));
                    }
                    accessor(AccessorKind::Dt, obj)
                }
                "loc" => accessor(AccessorKind::Loc, obj),
                "iloc" => accessor(AccessorKind::Iloc, obj),
                "at" => accessor(AccessorKind::At, obj),
                "iat" => accessor(AccessorKind::Iat, obj),
                name if SERIES_METHODS.contains(&name) => Value::method(obj.clone(), name),
                name => return Err(Exception::attribute_error("Series", name)),
            })
        }
        Value::Array(_) => super::numpy::array_attr(obj, attr),
        Value::GroupBy(g) => match attr {
            "ngroups" => Ok(Value::Int(g.groups.len() as i64)),
            name if GROUPBY_METHODS.contains(&name) => Ok(Value::method(obj.clone(), name)),
            name if g.groups.table.has_column(name) => Ok(groupby_value(
                g.groups.clone(),
                Some(Selection::One(name.to_string())),
                g.as_index,
            )),
            name => Err(Exception::attribute_error(&obj.type_name(), name)),
        },
        Value::Accessor(a) => accessor::get_attr(obj, a, attr),
        other => Err(Exception::attribute_error(&other.type_name(), attr)),
    }
}

pub(crate) fn set_attr(interp: &mut Interpreter, obj: &Value, attr: &str, value: Value) -> Res<()> {
    match obj {
        Value::Frame(t) => match attr {
            "columns" => {
                let names = names_of(&value)?;
                let mut t = t.borrow_mut();
                if names.len() != t.ncols() {
                    return Err(Exception::value_error(format!(
                        "Length mismatch: Expected axis has {} elements, new values have {} elements",
                        t.ncols(),
                        names.len()
                    )));
                }
                for (col, name) in t.columns.iter_mut().zip(names) {
                    col.name = name;
                }
                Ok(())
            }
            "index" => {
                let cells = cells_of(&value)?;
                let mut t = t.borrow_mut();
                if cells.len() != t.nrows() {
                    return Err(FrameError::LengthMismatch {
                        expected: t.nrows(),
                        got: cells.len(),
                    }
                    .into());
                }
                t.index = Index::from_cells(None, cells);
                Ok(())
            }
            name if t.borrow().has_column(name) => {
                set_item(interp, obj, Value::str(name), value)
            }
            name => Err(Exception::attribute_error("DataFrame", name)),
        },
        Value::Series(s) => match attr {
            "name" => {
                s.borrow_mut().name = match &value {
                    Value::None => None,
                    other => Some(other.to_str()),
                };
                Ok(())
            }
            "index" => {
                let cells = cells_of(&value)?;
                let mut s = s.borrow_mut();
                if cells.len() != s.len() {
                    return Err(FrameError::LengthMismatch {
                        expected: s.len(),
                        got: cells.len(),
                    }
                    .into());
                }
                s.index = Index::from_cells(None, cells);
                Ok(())
            }
            name => Err(Exception::attribute_error("Series", name)),
        },
        other => Err(Exception::attribute_error(&other.type_name(), attr)),
    }
}

// ---------------------------------------------------------------------------
// Methods
// ---------------------------------------------------------------------------

pub(crate) fn call_method(interp: &mut Interpreter, receiver: &Value, name: &str, args: Args) -> Res<Value> {
    match receiver {
        Value::Frame(t) => methods_frame::call(interp, t, name, args),
        Value::Series(s) => methods_series::call(interp, s, name, args),
        Value::Array(_) => super::numpy::array_method(interp, receiver, name, args),
        Value::GroupBy(g) => groupby::call(interp, g, name, args),
        Value::Accessor(a) => accessor::call(interp, a, name, args),
        other => Err(Exception::attribute_error(&other.type_name(), name)),
    }
}
