// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// Subscript reads and writes on tables, series, arrays, group-bys and the
// label/position indexers.

use std::rc::Rc;

use crate::frame::{Cell, Index, Series, Table};

use super::super::interp::{seq_index, slice_positions, Interpreter};
use super::super::value::{Accessor, AccessorKind, Exception, GroupBy, Res, Selection, Shared, Value};
use super::{cells_of, groupby_value, label_of, mask_of, names_of, scalar_cell};

/// Rows picked by an indexer: one row collapses the result dimension.
enum Rows {
    One(usize),
    Many(Vec<usize>),
}

impl Rows {
    fn positions(&self) -> Vec<usize> {
        match self {
            Rows::One(p) => vec![*p],
            Rows::Many(ps) => ps.clone(),
        }
    }
}

enum Cols {
    One(String),
    Many(Vec<String>),
}

impl Cols {
    fn names(&self) -> Vec<String> {
        match self {
            Cols::One(n) => vec![n.clone()],
            Cols::Many(ns) => ns.clone(),
        }
    }
}

fn not_subscriptable(v: &Value) -> Exception {
    Exception::type_error(format!("'{}' object is not subscriptable", v.type_name()))
}

fn out_of_bounds() -> Exception {
    Exception::index_error("single positional indexer is out-of-bounds")
}

fn mask_positions(mask: &[bool], len: usize) -> Res<Vec<usize>> {
    if mask.len() != len {
        return Err(Exception::index_error(format!(
            "Boolean index has wrong length: {} instead of {len}",
            mask.len()
        )));
    }
    Ok(mask
        .iter()
        .enumerate()
        .filter_map(|(i, keep)| keep.then_some(i))
        .collect())
}

fn label_position(index: &Index, v: &Value) -> Res<usize> {
    let label = label_of(v)?;
    index
        .position_of(&label)
        .ok_or_else(|| Exception::key_error(v.repr()))
}

fn int_labels(index: &Index) -> bool {
    index.levels() == 1 && index.labels.iter().all(|l| matches!(l[0], Cell::Int(_)))
}

fn rows_by_label(index: &Index, spec: &Value) -> Res<Rows> {
    if let Some(mask) = mask_of(spec)? {
        return Ok(Rows::Many(mask_positions(&mask, index.len())?));
    }
    match spec {
        Value::Slice(parts) => {
            if index.is_empty() {
                return Ok(Rows::Many(Vec::new()));
            }
            let start = match &parts[0] {
                Value::None => 0,
                v => label_position(index, v)?,
            };
            let stop = match &parts[1] {
                Value::None => index.len() - 1,
                v => label_position(index, v)?,
            };
            Ok(Rows::Many(if start <= stop { (start..=stop).collect() } else { Vec::new() }))
        }
        Value::List(_) | Value::Array(_) | Value::Series(_) => {
            let mut positions = Vec::new();
            for cell in cells_of(spec)? {
                let p = index
                    .position_of(std::slice::from_ref(&cell))
                    .ok_or_else(|| Exception::key_error(format!("'[{cell}] not in index'")))?;
                positions.push(p);
            }
            Ok(Rows::Many(positions))
        }
        other => Ok(Rows::One(label_position(index, other)?)),
    }
}

fn rows_by_position(len: usize, spec: &Value) -> Res<Rows> {
    if let Some(mask) = mask_of(spec)? {
        return Ok(Rows::Many(mask_positions(&mask, len)?));
    }
    match spec {
        Value::Slice(parts) => Ok(Rows::Many(slice_positions(len, parts)?)),
        Value::List(_) | Value::Array(_) | Value::Series(_) | Value::Range(..) => {
            let mut positions = Vec::new();
            for cell in cells_of(spec)? {
                let Cell::Int(i) = cell else {
                    return Err(Exception::index_error(
                        ".iloc requires numeric indexers, got non-integer values",
                    ));
                };
                positions.push(seq_index(&Value::Int(i), len, "positional").map_err(|_| {
                    Exception::index_error("positional indexers are out-of-bounds")
                })?);
            }
            Ok(Rows::Many(positions))
        }
        other => Ok(Rows::One(
            seq_index(other, len, "positional").map_err(|_| out_of_bounds())?,
        )),
    }
}

fn cols_by_label(table: &Table, spec: &Value) -> Res<Cols> {
    if let Some(mask) = mask_of(spec)? {
        let names = table.column_names();
        let keep = mask_positions(&mask, names.len())?;
        return Ok(Cols::Many(keep.into_iter().map(|p| names[p].clone()).collect()));
    }
    match spec {
        Value::Str(name) => Ok(Cols::One(name.to_string())),
        Value::Slice(parts) => {
            let names = table.column_names();
            let find = |v: &Value| {
                let wanted = v.to_str();
                names
                    .iter()
                    .position(|n| *n == wanted)
                    .ok_or_else(|| Exception::key_error(v.repr()))
            };
            let start = match &parts[0] {
                Value::None => 0,
                v => find(v)?,
            };
            let stop = match &parts[1] {
                Value::None => names.len().saturating_sub(1),
                v => find(v)?,
            };
            if names.is_empty() || start > stop {
                return Ok(Cols::Many(Vec::new()));
            }
            Ok(Cols::Many(names[start..=stop].to_vec()))
        }
        other => Ok(Cols::Many(names_of(other)?)),
    }
}

fn cols_by_position(table: &Table, spec: &Value) -> Res<Cols> {
    let names = table.column_names();
    match rows_by_position(names.len(), spec)? {
        Rows::One(p) => Ok(Cols::One(names[p].clone())),
        Rows::Many(ps) => Ok(Cols::Many(ps.into_iter().map(|p| names[p].clone()).collect())),
    }
}

/// A row as a series indexed by column name.
pub(super) fn row_series(table: &Table, row: usize) -> Series {
    let (names, values): (Vec<Cell>, Vec<Cell>) = table
        .row(row)
        .into_iter()
        .map(|(n, c)| (Cell::Str(n), c))
        .unzip();
    Series::with_index(
        Some(table.index.label_key(row)),
        values,
        Index::from_cells(None, names),
    )
}

fn pick(table: &Table, rows: Rows, cols: Cols) -> Res<Value> {
    match (rows, cols) {
        (Rows::One(r), Cols::One(c)) => Ok(Value::from_cell(&table.column_ref(&c)?.values[r])),
        (Rows::One(r), Cols::Many(cs)) => Ok(Value::series(row_series(&table.select(&cs)?, r))),
        (Rows::Many(rs), Cols::One(c)) => Ok(Value::series(table.column(&c)?.take(&rs))),
        (Rows::Many(rs), Cols::Many(cs)) => Ok(Value::frame(table.select(&cs)?.take(&rs))),
    }
}

fn pick_series(series: &Series, rows: Rows) -> Value {
    match rows {
        Rows::One(p) => Value::from_cell(&series.values[p]),
        Rows::Many(ps) => Value::series(series.take(&ps)),
    }
}

/// `df.loc[rows, cols]` arrives as a two-tuple.
fn split_pair(index: &Value) -> (&Value, Option<&Value>) {
    match index {
        Value::Tuple(items) if items.len() == 2 => (&items[0], Some(&items[1])),
        other => (other, None),
    }
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

pub(crate) fn get_item(_interp: &mut Interpreter, obj: &Value, index: &Value) -> Res<Value> {
    match obj {
        Value::Frame(t) => frame_item(&t.borrow(), index),
        Value::Series(s) => series_item(&s.borrow(), index),
        Value::Array(a) => array_item(&a.borrow(), index),
        Value::GroupBy(g) => groupby_item(g, index),
        Value::Accessor(a) => accessor_item(a, index),
        other => Err(not_subscriptable(other)),
    }
}

fn frame_item(t: &Table, index: &Value) -> Res<Value> {
    if let Value::Str(name) = index {
        return Ok(Value::series(t.column(name)?));
    }
    if let Value::Slice(parts) = index {
        return Ok(Value::frame(t.take(&slice_positions(t.nrows(), parts)?)));
    }
    if let Some(mask) = mask_of(index)? {
        return Ok(Value::frame(t.filter(&mask)?));
    }
    match index {
        Value::List(_) | Value::Array(_) | Value::Series(_) => {
            Ok(Value::frame(t.select(&names_of(index)?)?))
        }
        other => Err(Exception::key_error(other.repr())),
    }
}

fn series_item(s: &Series, index: &Value) -> Res<Value> {
    if let Some(mask) = mask_of(index)? {
        return Ok(Value::series(s.filter(&mask)?));
    }
    match index {
        Value::Slice(parts) if parts[..2].iter().any(|p| matches!(p, Value::Str(_))) => {
            Ok(pick_series(s, rows_by_label(&s.index, index)?))
        }
        Value::Slice(parts) => Ok(Value::series(s.take(&slice_positions(s.len(), parts)?))),
        Value::List(_) | Value::Array(_) => {
            let cells = cells_of(index)?;
            let positional = !int_labels(&s.index) && cells.iter().all(|c| matches!(c, Cell::Int(_)));
            let rows = if positional {
                rows_by_position(s.len(), index)?
            } else {
                rows_by_label(&s.index, index)?
            };
            Ok(pick_series(s, rows))
        }
        other => {
            let label = label_of(other)?;
            if let Some(p) = s.index.position_of(&label) {
                return Ok(Value::from_cell(&s.values[p]));
            }
            if matches!(other, Value::Int(_)) && !int_labels(&s.index) {
                let p = seq_index(other, s.len(), "index").map_err(|_| out_of_bounds())?;
                return Ok(Value::from_cell(&s.values[p]));
            }
            Err(Exception::key_error(other.repr()))
        }
    }
}

fn array_item(cells: &[Cell], index: &Value) -> Res<Value> {
    if let Some(mask) = mask_of(index)? {
        let positions = mask_positions(&mask, cells.len())?;
        return Ok(Value::array(positions.iter().map(|&p| cells[p].clone()).collect()));
    }
    match index {
        Value::Slice(parts) => Ok(Value::array(
            slice_positions(cells.len(), parts)?
                .into_iter()
                .map(|p| cells[p].clone())
                .collect(),
        )),
        Value::List(_) | Value::Array(_) => match rows_by_position(cells.len(), index)? {
            Rows::One(p) => Ok(Value::from_cell(&cells[p])),
            Rows::Many(ps) => Ok(Value::array(ps.iter().map(|&p| cells[p].clone()).collect())),
        },
        other => {
            let p = seq_index(other, cells.len(), "index").map_err(|_| {
                Exception::index_error(format!(
                    "index {} is out of bounds for axis 0 with size {}",
                    other.repr(),
                    cells.len()
                ))
            })?;
            Ok(Value::from_cell(&cells[p]))
        }
    }
}

fn groupby_item(g: &Rc<GroupBy>, index: &Value) -> Res<Value> {
    let selection = match index {
        Value::Str(name) => {
            g.groups.table.column_ref(name)?;
            Selection::One(name.to_string())
        }
        other => {
            let names = names_of(other)?;
            for name in &names {
                g.groups.table.column_ref(name)?;
            }
            Selection::Many(names)
        }
    };
    Ok(groupby_value(g.groups.clone(), Some(selection), g.as_index))
}

fn accessor_item(a: &Accessor, index: &Value) -> Res<Value> {
    match (&a.kind, &a.target) {
        (AccessorKind::Loc | AccessorKind::At, Value::Frame(t)) => {
            let t = t.borrow();
            let (rows_spec, cols_spec) = split_pair(index);
            let rows = rows_by_label(&t.index, rows_spec)?;
            let cols = match cols_spec {
                Some(spec) => cols_by_label(&t, spec)?,
                None => Cols::Many(t.column_names()),
            };
            if a.kind == AccessorKind::At && !matches!((&rows, &cols), (Rows::One(_), Cols::One(_))) {
                return Err(Exception::value_error("Invalid call for scalar access (getting)!"));
            }
            pick(&t, rows, cols)
        }
        (AccessorKind::Iloc | AccessorKind::Iat, Value::Frame(t)) => {
            let t = t.borrow();
            let (rows_spec, cols_spec) = split_pair(index);
            let rows = rows_by_position(t.nrows(), rows_spec)?;
            let cols = match cols_spec {
                Some(spec) => cols_by_position(&t, spec)?,
                None => Cols::Many(t.column_names()),
            };
            if a.kind == AccessorKind::Iat && !matches!((&rows, &cols), (Rows::One(_), Cols::One(_))) {
                return Err(Exception::value_error("iAt based indexing can only have integer indexers"));
            }
            pick(&t, rows, cols)
        }
        (AccessorKind::Loc | AccessorKind::At, Value::Series(s)) => {
            let s = s.borrow();
            Ok(pick_series(&s, rows_by_label(&s.index, index)?))
        }
        (AccessorKind::Iloc | AccessorKind::Iat, Value::Series(s)) => {
            let s = s.borrow();
            Ok(pick_series(&s, rows_by_position(s.len(), index)?))
        }
        (AccessorKind::Str, Value::Series(s)) => {
            let s = s.borrow();
            let mut out = Vec::with_capacity(s.len());
            for cell in &s.values {
                let Cell::Str(text) = cell else {
                    out.push(Cell::Float(f64::NAN));
                    continue;
                };
                let chars: Vec<char> = text.chars().collect();
                out.push(match index {
                    Value::Slice(parts) => Cell::Str(
                        slice_positions(chars.len(), parts)?
                            .into_iter()
                            .map(|p| chars[p])
                            .collect(),
                    ),
                    other => match seq_index(other, chars.len(), "string") {
                        Ok(p) => Cell::Str(chars[p].to_string()),
                        Err(_) => Cell::Float(f64::NAN),
                    },
                });
            }
            Ok(Value::series(s.derive(out)))
        }
        _ => Err(Exception::type_error(format!(
            "'{}' object is not subscriptable",
            a.kind.name()
        ))),
    }
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Values of a series re-ordered to `index`; unmatched labels are missing.
fn aligned(series: &Series, index: &Index) -> Vec<Cell> {
    if series.index == *index {
        return series.values.clone();
    }
    index
        .labels
        .iter()
        .map(|label| {
            series
                .index
                .position_of(label)
                .map(|p| series.values[p].clone())
                .unwrap_or(Cell::Float(f64::NAN))
        })
        .collect()
}

/// `value` stretched or checked to exactly `n` cells.
fn broadcast(value: &Value, n: usize) -> Res<Vec<Cell>> {
    match value {
        Value::Series(_) | Value::Array(_) | Value::List(_) | Value::Tuple(_) | Value::Range(..) => {
            let cells = cells_of(value)?;
            if cells.len() != n {
                return Err(Exception::value_error(format!(
                    "Length of values ({}) does not match length of index ({n})",
                    cells.len()
                )));
            }
            Ok(cells)
        }
        Value::Frame(_) => Err(Exception::value_error(
            "Cannot set a DataFrame with multiple columns to a single column",
        )),
        other => Ok(vec![scalar_cell(other)?; n]),
    }
}

fn column_values(t: &Table, value: &Value) -> Res<Vec<Cell>> {
    match value {
        Value::Series(s) if !t.columns.is_empty() => Ok(aligned(&s.borrow(), &t.index)),
        Value::Series(_) | Value::Array(_) | Value::List(_) | Value::Tuple(_) | Value::Range(..)
            if t.columns.is_empty() =>
        {
            cells_of(value)
        }
        other => broadcast(other, t.nrows()),
    }
}

pub(crate) fn set_item(_interp: &mut Interpreter, obj: &Value, index: Value, value: Value) -> Res<()> {
    match obj {
        Value::Frame(t) => set_frame_item(t, &index, &value),
        Value::Series(s) => set_series_item(s, &index, &value),
        Value::Array(a) => {
            let len = a.borrow().len();
            let positions = match rows_by_position(len, &index)? {
                Rows::One(p) => vec![p],
                Rows::Many(ps) => ps,
            };
            let cells = broadcast(&value, positions.len())?;
            let mut a = a.borrow_mut();
            for (p, cell) in positions.into_iter().zip(cells) {
                a[p] = cell;
            }
            Ok(())
        }
        Value::Accessor(a) => set_accessor_item(a, &index, &value),
        other => Err(Exception::type_error(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

fn set_frame_item(t: &Shared<Table>, index: &Value, value: &Value) -> Res<()> {
    match index {
        Value::Str(name) => {
            let values = column_values(&t.borrow(), value)?;
            t.borrow_mut().set_column(name, values)?;
            Ok(())
        }
        Value::List(_) if mask_of(index)?.is_none() => {
            let names = names_of(index)?;
            let sources: Vec<Vec<Cell>> = match value {
                Value::Frame(other) => {
                    let other = other.borrow();
                    if other.ncols() != names.len() {
                        return Err(Exception::value_error("Columns must be same length as key"));
                    }
                    other.columns.iter().map(|c| c.values.clone()).collect()
                }
                other => {
                    let n = t.borrow().nrows();
                    vec![broadcast(other, n)?; names.len()]
                }
            };
            let mut t = t.borrow_mut();
            for (name, values) in names.iter().zip(sources) {
                t.set_column(name, values)?;
            }
            Ok(())
        }
        other => {
            let Some(mask) = mask_of(other)? else {
                return Err(Exception::type_error(format!(
                    "unsupported key for DataFrame assignment: {}",
                    other.repr()
                )));
            };
            let (rows, cols) = {
                let t = t.borrow();
                (
                    Rows::Many(mask_positions(&mask, t.nrows())?),
                    Cols::Many(t.column_names()),
                )
            };
            assign_cells(t, &rows, &cols, value)
        }
    }
}

/// Write `value` into the cells at `rows` x `cols`, creating missing
/// columns.
fn assign_cells(t: &Shared<Table>, rows: &Rows, cols: &Cols, value: &Value) -> Res<()> {
    let positions = rows.positions();
    let cells = broadcast(value, positions.len())?;
    let mut t = t.borrow_mut();
    for name in cols.names() {
        let mut values = match t.column_ref(&name) {
            Ok(col) => col.values.clone(),
            Err(_) => vec![Cell::Float(f64::NAN); t.nrows()],
        };
        for (p, cell) in positions.iter().zip(&cells) {
            values[*p] = cell.clone();
        }
        t.set_column(&name, values)?;
    }
    Ok(())
}

fn set_series_item(s: &Shared<Series>, index: &Value, value: &Value) -> Res<()> {
    let rows = {
        let s = s.borrow();
        if let Some(mask) = mask_of(index)? {
            Some(Rows::Many(mask_positions(&mask, s.len())?))
        } else {
            match index {
                Value::Slice(_) => Some(rows_by_position(s.len(), index)?),
                other => {
                    let label = label_of(other)?;
                    match s.index.position_of(&label) {
                        Some(p) => Some(Rows::One(p)),
                        None if matches!(other, Value::Int(_)) && !int_labels(&s.index) => {
                            Some(rows_by_position(s.len(), other)?)
                        }
                        None => None,
                    }
                }
            }
        }
    };
    let mut s = s.borrow_mut();
    match rows {
        Some(rows) => {
            let positions = rows.positions();
            let cells = broadcast(value, positions.len())?;
            let mut values = s.values.clone();
            for (p, cell) in positions.into_iter().zip(cells) {
                values[p] = cell;
            }
            *s = s.derive(values);
        }
        None => {
            // a new label appends, as pandas does
            let mut values = s.values.clone();
            values.push(scalar_cell(value)?);
            let mut index_labels = s.index.clone();
            index_labels.labels.push(label_of(index)?);
            *s = Series::with_index(s.name.clone(), values, index_labels);
        }
    }
    Ok(())
}

fn set_accessor_item(a: &Accessor, index: &Value, value: &Value) -> Res<()> {
    match (&a.kind, &a.target) {
        (kind, Value::Frame(t)) if *kind != AccessorKind::Str && *kind != AccessorKind::Dt => {
            let (rows, cols) = {
                let table = t.borrow();
                let (rows_spec, cols_spec) = split_pair(index);
                let by_label = matches!(kind, AccessorKind::Loc | AccessorKind::At);
                let rows = if by_label {
                    rows_by_label(&table.index, rows_spec)?
                } else {
                    rows_by_position(table.nrows(), rows_spec)?
                };
                let cols = match (cols_spec, by_label) {
                    (Some(spec), true) => cols_by_label(&table, spec)?,
                    (Some(spec), false) => cols_by_position(&table, spec)?,
                    (None, _) => Cols::Many(table.column_names()),
                };
                (rows, cols)
            };
            assign_cells(t, &rows, &cols, value)
        }
        (kind, Value::Series(s)) if *kind != AccessorKind::Str && *kind != AccessorKind::Dt => {
            let rows = {
                let series = s.borrow();
                if matches!(kind, AccessorKind::Loc | AccessorKind::At) {
                    rows_by_label(&series.index, index)?
                } else {
                    rows_by_position(series.len(), index)?
                }
            };
            let positions = rows.positions();
            let cells = broadcast(value, positions.len())?;
            let mut series = s.borrow_mut();
            let mut values = series.values.clone();
            for (p, cell) in positions.into_iter().zip(cells) {
                values[p] = cell;
            }
            *series = series.derive(values);
            Ok(())
        }
        _ => Err(Exception::type_error(format!(
            "'{}' object does not support item assignment",
            a.kind.name()
        ))),
    }
}
