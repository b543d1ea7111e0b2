// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

use super::cell::{parse_datetime, parse_datetime_with, Cell};
use super::error::FrameError;

/// How unparseable values are handled by the converters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Errors {
    #[default]
    Raise,
    Coerce,
    Ignore,
}

impl Errors {
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        match text {
            "raise" => Ok(Errors::Raise),
            "coerce" => Ok(Errors::Coerce),
            "ignore" => Ok(Errors::Ignore),
            other => Err(FrameError::ValueError(format!(
                "errors must be one of 'ignore', 'raise', or 'coerce', got '{other}'"
            ))),
        }
    }
}

/// Convert one cell to a timestamp.
pub fn to_datetime(cell: &Cell, format: Option<&str>, errors: Errors) -> Result<Cell, FrameError> {
    let parsed = match cell {
        Cell::DateTime(_) | Cell::NaT => return Ok(cell.clone()),
        c if c.is_missing() => return Ok(Cell::NaT),
        Cell::Str(s) => match format {
            Some(fmt) => parse_datetime_with(s, fmt),
            None => parse_datetime(s),
        },
        // four-digit integers are read as years
        Cell::Int(year) if (1000..=9999).contains(year) => {
            chrono::NaiveDate::from_ymd_opt(*year as i32, 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0))
        }
        _ => None,
    };
    match (parsed, errors) {
        (Some(dt), _) => Ok(Cell::DateTime(dt)),
        (None, Errors::Coerce) => Ok(Cell::NaT),
        (None, Errors::Ignore) => Ok(cell.clone()),
        (None, Errors::Raise) => Err(FrameError::ValueError(format!(
            "Unknown datetime string format, unable to parse: {cell}"
        ))),
    }
}

/// Convert one cell to a number.
pub fn to_numeric(cell: &Cell, errors: Errors) -> Result<Cell, FrameError> {
    let parsed = match cell {
        Cell::Int(_) | Cell::Float(_) => return Ok(cell.clone()),
        Cell::Bool(b) => Some(Cell::Int(i64::from(*b))),
        c if c.is_missing() => return Ok(Cell::Float(f64::NAN)),
        Cell::Str(s) => {
            let t = s.trim().replace(',', "");
            t.parse::<i64>()
                .map(Cell::Int)
                .ok()
                .or_else(|| t.parse::<f64>().ok().map(Cell::Float))
        }
        _ => None,
    };
    match (parsed, errors) {
        (Some(v), _) => Ok(v),
        (None, Errors::Coerce) => Ok(Cell::Float(f64::NAN)),
        (None, Errors::Ignore) => Ok(cell.clone()),
        (None, Errors::Raise) => Err(FrameError::ValueError(format!(
            "Unable to parse string \"{cell}\""
        ))),
    }
}

/// Apply a cell converter to every value.
pub fn convert_all(
    cells: &[Cell],
    f: impl Fn(&Cell) -> Result<Cell, FrameError>,
) -> Result<Vec<Cell>, FrameError> {
    cells.iter().map(f).collect()
}
