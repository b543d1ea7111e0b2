// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// Element-wise arithmetic and comparison with pandas semantics: missing
// values propagate, division by zero yields inf/NaN rather than an error.

use chrono::Duration;

use super::cell::{parse_datetime, Cell};
use super::error::FrameError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

impl ArithOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
            ArithOp::FloorDiv => "//",
            ArithOp::Mod => "%",
            ArithOp::Pow => "**",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

fn unsupported(op: ArithOp, a: &Cell, b: &Cell) -> FrameError {
    FrameError::TypeError(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op.symbol(),
        a.type_name(),
        b.type_name()
    ))
}

/// Largest string, in bytes, that concatenation or repetition may build.
pub const MAX_STR_BYTES: usize = 64 * 1024 * 1024;

/// Fail with a memory error when a string of `bytes` would pass the cap.
pub fn check_str_bytes(bytes: usize) -> Result<(), FrameError> {
    if bytes > MAX_STR_BYTES {
        return Err(FrameError::MemoryError(format!(
            "cannot build a string of {bytes} bytes (limit {MAX_STR_BYTES})"
        )));
    }
    Ok(())
}

/// Apply `op` to two cells.
pub fn arith(op: ArithOp, a: &Cell, b: &Cell) -> Result<Cell, FrameError> {
    match (a, b) {
        (Cell::Str(x), Cell::Str(y)) if op == ArithOp::Add => {
            check_str_bytes(x.len().saturating_add(y.len()))?;
            return Ok(Cell::Str(format!("{x}{y}")));
        }
        (Cell::Str(x), Cell::Int(n)) | (Cell::Int(n), Cell::Str(x)) if op == ArithOp::Mul => {
            let times = usize::try_from((*n).max(0)).unwrap_or(usize::MAX);
            check_str_bytes(x.len().saturating_mul(times))?;
            return Ok(Cell::Str(x.repeat(times)));
        }
        _ => {}
    }

    if let Some(cell) = temporal(op, a, b)? {
        return Ok(cell);
    }

    if a.is_missing() || b.is_missing() {
        if matches!(a, Cell::Str(_)) || matches!(b, Cell::Str(_)) {
            return Ok(Cell::Null);
        }
        return Ok(Cell::Float(f64::NAN));
    }

    match (a, b) {
        (Cell::Int(_) | Cell::Bool(_), Cell::Int(_) | Cell::Bool(_)) => {
            let x = int_of(a);
            let y = int_of(b);
            Ok(int_arith(op, x, y))
        }
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => Ok(Cell::Float(float_arith(op, x, y))),
            _ => Err(unsupported(op, a, b)),
        },
    }
}

fn int_of(cell: &Cell) -> i64 {
    match cell {
        Cell::Int(i) => *i,
        Cell::Bool(b) => i64::from(*b),
        _ => 0,
    }
}

fn int_arith(op: ArithOp, x: i64, y: i64) -> Cell {
    let float = || Cell::Float(float_arith(op, x as f64, y as f64));
    match op {
        ArithOp::Add => x.checked_add(y).map(Cell::Int).unwrap_or_else(float),
        ArithOp::Sub => x.checked_sub(y).map(Cell::Int).unwrap_or_else(float),
        ArithOp::Mul => x.checked_mul(y).map(Cell::Int).unwrap_or_else(float),
        ArithOp::Div => float(),
        ArithOp::FloorDiv | ArithOp::Mod if y == 0 => float(),
        // The one quotient that leaves i64.
        ArithOp::FloorDiv if x == i64::MIN && y == -1 => float(),
        ArithOp::Mod if y == -1 => Cell::Int(0),
        ArithOp::FloorDiv => Cell::Int(floor_div(x, y)),
        ArithOp::Mod => Cell::Int(x - floor_div(x, y) * y),
        ArithOp::Pow if y >= 0 => u32::try_from(y)
            .ok()
            .and_then(|e| x.checked_pow(e))
            .map(Cell::Int)
            .unwrap_or_else(float),
        ArithOp::Pow => float(),
    }
}

fn floor_div(x: i64, y: i64) -> i64 {
    let q = x / y;
    if (x % y != 0) && ((x < 0) != (y < 0)) {
        q - 1
    } else {
        q
    }
}

pub fn float_arith(op: ArithOp, x: f64, y: f64) -> f64 {
    match op {
        ArithOp::Add => x + y,
        ArithOp::Sub => x - y,
        ArithOp::Mul => x * y,
        ArithOp::Div => x / y,
        ArithOp::FloorDiv => (x / y).floor(),
        ArithOp::Mod => {
            if y == 0.0 {
                f64::NAN
            } else {
                x - (x / y).floor() * y
            }
        }
        ArithOp::Pow => x.powf(y),
    }
}

fn temporal(op: ArithOp, a: &Cell, b: &Cell) -> Result<Option<Cell>, FrameError> {
    let is_temporal = |c: &Cell| matches!(c, Cell::DateTime(_) | Cell::Timedelta(_) | Cell::NaT);
    if !is_temporal(a) && !is_temporal(b) {
        return Ok(None);
    }
    let cell = match (op, a, b) {
        (ArithOp::Sub, Cell::DateTime(x), Cell::DateTime(y)) => Cell::Timedelta(*x - *y),
        (ArithOp::Add, Cell::DateTime(x), Cell::Timedelta(d))
        | (ArithOp::Add, Cell::Timedelta(d), Cell::DateTime(x)) => Cell::DateTime(*x + *d),
        (ArithOp::Sub, Cell::DateTime(x), Cell::Timedelta(d)) => Cell::DateTime(*x - *d),
        (ArithOp::Add, Cell::Timedelta(x), Cell::Timedelta(y)) => Cell::Timedelta(*x + *y),
        (ArithOp::Sub, Cell::Timedelta(x), Cell::Timedelta(y)) => Cell::Timedelta(*x - *y),
        (ArithOp::Div, Cell::Timedelta(x), Cell::Timedelta(y)) => {
            let denom = y.num_milliseconds() as f64;
            Cell::Float(x.num_milliseconds() as f64 / denom)
        }
        (ArithOp::Mul, Cell::Timedelta(d), n) | (ArithOp::Mul, n, Cell::Timedelta(d))
            if n.is_numeric() =>
        {
            let factor = n.as_f64().unwrap_or(0.0);
            Cell::Timedelta(Duration::milliseconds(
                (d.num_milliseconds() as f64 * factor) as i64,
            ))
        }
        (ArithOp::Add | ArithOp::Sub, Cell::NaT, _) | (ArithOp::Add | ArithOp::Sub, _, Cell::NaT) => {
            Cell::NaT
        }
        _ => return Err(unsupported(op, a, b)),
    };
    Ok(Some(cell))
}

/// Compare two cells. Missing values compare unequal to everything.
pub fn compare(op: CmpOp, a: &Cell, b: &Cell) -> Result<bool, FrameError> {
    if a.is_missing() || b.is_missing() {
        return Ok(op == CmpOp::Ne);
    }

    let ordering = match (a, b) {
        (Cell::Str(x), Cell::Str(y)) => x.cmp(y),
        (Cell::DateTime(x), Cell::DateTime(y)) => x.cmp(y),
        (Cell::DateTime(x), Cell::Str(s)) => match parse_datetime(s) {
            Some(y) => x.cmp(&y),
            None => return mismatched(op, a, b),
        },
        (Cell::Str(s), Cell::DateTime(y)) => match parse_datetime(s) {
            Some(x) => x.cmp(y),
            None => return mismatched(op, a, b),
        },
        (Cell::Timedelta(x), Cell::Timedelta(y)) => x.cmp(y),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => match x.partial_cmp(&y) {
                Some(o) => o,
                None => return Ok(op == CmpOp::Ne),
            },
            _ => return mismatched(op, a, b),
        },
    };

    Ok(match op {
        CmpOp::Eq => ordering.is_eq(),
        CmpOp::Ne => ordering.is_ne(),
        CmpOp::Lt => ordering.is_lt(),
        CmpOp::Le => ordering.is_le(),
        CmpOp::Gt => ordering.is_gt(),
        CmpOp::Ge => ordering.is_ge(),
    })
}

fn mismatched(op: CmpOp, a: &Cell, b: &Cell) -> Result<bool, FrameError> {
    match op {
        CmpOp::Eq => Ok(false),
        CmpOp::Ne => Ok(true),
        _ => Err(FrameError::TypeError(format!(
            "'{}' not supported between instances of '{}' and '{}'",
            op.symbol(),
            a.type_name(),
            b.type_name()
        ))),
    }
}
