// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

use std::cmp::Ordering;
use std::fmt;

use chrono::{Duration, NaiveDate, NaiveDateTime};

/// One value in a table column or series.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// Missing value in an object or bool column.
    Null,
    Bool(bool),
    Int(i64),
    /// NaN marks a missing numeric value.
    Float(f64),
    Str(String),
    DateTime(NaiveDateTime),
    Timedelta(Duration),
    /// Missing datetime.
    NaT,
}

impl Cell {
    /// True for every flavour of missing value.
    pub fn is_missing(&self) -> bool {
        match self {
            Cell::Null | Cell::NaT => true,
            Cell::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(i) => Some(*i as f64),
            Cell::Float(f) => Some(*f),
            Cell::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Cell::Int(_) | Cell::Float(_) | Cell::Bool(_))
    }

    /// Truthiness in the Python sense.
    pub fn truthy(&self) -> bool {
        match self {
            Cell::Null | Cell::NaT => false,
            Cell::Bool(b) => *b,
            Cell::Int(i) => *i != 0,
            Cell::Float(f) => *f != 0.0,
            Cell::Str(s) => !s.is_empty(),
            Cell::DateTime(_) => true,
            Cell::Timedelta(d) => !d.is_zero(),
        }
    }

    /// Total order used for sorting and grouping. Missing values sort last.
    pub fn total_cmp(&self, other: &Cell) -> Ordering {
        match (self.is_missing(), other.is_missing()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Greater,
            (false, true) => return Ordering::Less,
            _ => {}
        }
        match (self, other) {
            (Cell::Str(a), Cell::Str(b)) => a.cmp(b),
            (Cell::DateTime(a), Cell::DateTime(b)) => a.cmp(b),
            (Cell::Timedelta(a), Cell::Timedelta(b)) => a.cmp(b),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                _ => a.rank().cmp(&b.rank()),
            },
        }
    }

    /// Equality used for grouping: numeric values compare by value, all
    /// missing values form one group.
    pub fn group_eq(&self, other: &Cell) -> bool {
        self.total_cmp(other) == Ordering::Equal
            && self.is_missing() == other.is_missing()
    }

    fn rank(&self) -> u8 {
        match self {
            Cell::Bool(_) | Cell::Int(_) | Cell::Float(_) => 0,
            Cell::DateTime(_) => 1,
            Cell::Timedelta(_) => 2,
            Cell::Str(_) => 3,
            Cell::Null | Cell::NaT => 4,
        }
    }

    /// Plain JSON rendering: missing and non-finite values become null,
    /// timestamps become ISO strings.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Cell::Null | Cell::NaT => serde_json::Value::Null,
            Cell::Bool(b) => serde_json::Value::Bool(*b),
            Cell::Int(i) => serde_json::Value::from(*i),
            Cell::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Cell::Str(s) => serde_json::Value::String(s.clone()),
            Cell::DateTime(dt) => serde_json::Value::String(iso_datetime(dt)),
            Cell::Timedelta(d) => serde_json::Value::String(format_timedelta(d)),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Cell::Null => "NoneType",
            Cell::Bool(_) => "bool",
            Cell::Int(_) => "int",
            Cell::Float(_) => "float",
            Cell::Str(_) => "str",
            Cell::DateTime(_) => "Timestamp",
            Cell::Timedelta(_) => "Timedelta",
            Cell::NaT => "NaTType",
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => f.write_str("None"),
            Cell::NaT => f.write_str("NaT"),
            Cell::Bool(true) => f.write_str("True"),
            Cell::Bool(false) => f.write_str("False"),
            Cell::Int(i) => write!(f, "{i}"),
            Cell::Float(x) => f.write_str(&format_float(*x)),
            Cell::Str(s) => f.write_str(s),
            Cell::DateTime(dt) => f.write_str(&format_datetime(dt)),
            Cell::Timedelta(d) => f.write_str(&format_timedelta(d)),
        }
    }
}

/// Python-style float rendering: `3.0`, `0.1`, `nan`, `inf`.
pub fn format_float(x: f64) -> String {
    if x.is_nan() {
        "nan".to_string()
    } else if x.is_infinite() {
        if x > 0.0 { "inf" } else { "-inf" }.to_string()
    } else if x == x.trunc() && x.abs() < 1e16 {
        format!("{x:.1}")
    } else {
        format!("{x}")
    }
}

/// Timestamp rendering used for display: date only at midnight.
pub fn format_datetime(dt: &NaiveDateTime) -> String {
    if dt.time() == chrono::NaiveTime::MIN {
        dt.format("%Y-%m-%d").to_string()
    } else {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

/// `3 days 04:05:06`, the way pandas prints a Timedelta.
pub fn format_timedelta(d: &Duration) -> String {
    let days = d.num_days();
    let rest = *d - Duration::days(days);
    let secs = rest.num_seconds();
    format!(
        "{days} days {:02}:{:02}:{:02}",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60
    )
}

/// ISO-8601 rendering used on the wire.
pub fn iso_datetime(dt: &NaiveDateTime) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S").to_string()
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y%m%d"];

/// Parse the date and datetime spellings commonly found in uploaded data.
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let text = text.strip_suffix('Z').unwrap_or(text);
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(text, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Parse with an explicit strftime format.
pub fn parse_datetime_with(text: &str, fmt: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, fmt).ok().or_else(|| {
        NaiveDate::parse_from_str(text, fmt)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    })
}

/// Column dtype, named the way pandas names them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DType {
    Int64,
    Float64,
    Bool,
    DateTime,
    Timedelta,
    Object,
}

impl DType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DType::Int64 => "int64",
            DType::Float64 => "float64",
            DType::Bool => "bool",
            DType::DateTime => "datetime64[ns]",
            DType::Timedelta => "timedelta64[ns]",
            DType::Object => "object",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, DType::Int64 | DType::Float64)
    }

    /// Infer the narrowest dtype able to hold `cells`.
    pub fn infer(cells: &[Cell]) -> DType {
        let mut saw_int = false;
        let mut saw_float = false;
        let mut saw_bool = false;
        let mut saw_dt = false;
        let mut saw_td = false;
        let mut saw_other = false;
        let mut saw_null = false;
        for cell in cells {
            match cell {
                Cell::Int(_) => saw_int = true,
                Cell::Float(_) => saw_float = true,
                Cell::Bool(_) => saw_bool = true,
                Cell::DateTime(_) | Cell::NaT => saw_dt = true,
                Cell::Timedelta(_) => saw_td = true,
                Cell::Null => saw_null = true,
                Cell::Str(_) => saw_other = true,
            }
        }
        let kinds = [saw_int || saw_float, saw_bool, saw_dt, saw_td, saw_other]
            .iter()
            .filter(|k| **k)
            .count();
        if kinds != 1 {
            return DType::Object;
        }
        if saw_dt {
            DType::DateTime
        } else if saw_td {
            DType::Timedelta
        } else if saw_float || (saw_int && saw_null) {
            DType::Float64
        } else if saw_int {
            DType::Int64
        } else if saw_bool && !saw_null {
            DType::Bool
        } else {
            DType::Object
        }
    }

    /// Coerce `cells` in place to the representation this dtype uses.
    pub fn normalize(&self, cells: &mut [Cell]) {
        match self {
            DType::Float64 => {
                for cell in cells.iter_mut() {
                    *cell = match &*cell {
                        Cell::Int(i) => Cell::Float(*i as f64),
                        Cell::Null => Cell::Float(f64::NAN),
                        other => other.clone(),
                    };
                }
            }
            DType::DateTime | DType::Timedelta => {
                for cell in cells.iter_mut() {
                    if matches!(cell, Cell::Null) {
                        *cell = Cell::NaT;
                    }
                }
            }
            _ => {}
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hashable identity of a cell for grouping and de-duplication. Integral
/// floats share a key with the equal integer; all missing values share one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CellKey {
    Missing,
    Int(i64),
    Float(u64),
    Str(String),
    DateTime(NaiveDateTime),
    Timedelta(i64),
}

impl Cell {
    pub fn key(&self) -> CellKey {
        if self.is_missing() {
            return CellKey::Missing;
        }
        match self {
            Cell::Bool(b) => CellKey::Int(i64::from(*b)),
            Cell::Int(i) => CellKey::Int(*i),
            Cell::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => CellKey::Int(*f as i64),
            Cell::Float(f) => CellKey::Float(if *f == 0.0 { 0 } else { f.to_bits() }),
            Cell::Str(s) => CellKey::Str(s.clone()),
            Cell::DateTime(dt) => CellKey::DateTime(*dt),
            Cell::Timedelta(d) => CellKey::Timedelta(d.num_milliseconds()),
            Cell::Null | Cell::NaT => CellKey::Missing,
        }
    }
}

/// Distinct cells in order of first appearance, each with the positions
/// holding it.
pub fn distinct(cells: &[Cell]) -> Vec<(Cell, Vec<usize>)> {
    let mut slots: std::collections::HashMap<CellKey, usize> = std::collections::HashMap::new();
    let mut out: Vec<(Cell, Vec<usize>)> = Vec::new();
    for (pos, cell) in cells.iter().enumerate() {
        let slot = *slots.entry(cell.key()).or_insert_with(|| {
            out.push((cell.clone(), Vec::new()));
            out.len() - 1
        });
        out[slot].1.push(pos);
    }
    out
}
