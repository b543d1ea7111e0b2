// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// Value serializer
//
// Responsibilities:
// - Convert any runtime value into JSON that a browser can parse
// - NaN becomes null, infinities become "Infinity"/"-Infinity"
// - Tables, series and figures become tagged summary objects
// - Never fail: values that cannot be converted become a placeholder
//   string naming their type
// - Count the special cases it handled for the stats endpoint

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::figure::Figure;
use crate::frame::{iso_datetime, Cell, Series, Table};

/// Rows included in table and series previews.
pub const DEFAULT_HEAD_ROWS: usize = 10;

/// Nesting beyond this depth is replaced with a placeholder.
const MAX_DEPTH: usize = 64;

/// A runtime value classified by capability, decided once per value.
#[derive(Debug, Clone, PartialEq)]
pub enum Serializable {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Timestamp(NaiveDateTime),
    Timedelta(Duration),
    NaT,
    Sequence(Vec<Serializable>),
    Mapping(Vec<(String, Serializable)>),
    /// Array-like values, serialized element-wise.
    Vector(Vec<Cell>),
    Table(Table),
    Series(Series),
    Figure(Figure),
    /// Anything else, rendered through its string form.
    Opaque { type_name: String, repr: String },
    /// A value whose conversion failed while it was being captured.
    Unserializable { type_name: String },
}

impl Serializable {
    pub fn type_name(&self) -> &str {
        match self {
            Serializable::Null => "NoneType",
            Serializable::Bool(_) => "bool",
            Serializable::Int(_) => "int",
            Serializable::Float(_) => "float",
            Serializable::Str(_) => "str",
            Serializable::Timestamp(_) => "Timestamp",
            Serializable::Timedelta(_) => "Timedelta",
            Serializable::NaT => "NaTType",
            Serializable::Sequence(_) => "list",
            Serializable::Mapping(_) => "dict",
            Serializable::Vector(_) => "ndarray",
            Serializable::Table(_) => "DataFrame",
            Serializable::Series(_) => "Series",
            Serializable::Figure(_) => "Figure",
            Serializable::Opaque { type_name, .. } | Serializable::Unserializable { type_name } => {
                type_name
            }
        }
    }
}

impl From<&Cell> for Serializable {
    fn from(cell: &Cell) -> Self {
        match cell {
            Cell::Null => Serializable::Null,
            Cell::Bool(b) => Serializable::Bool(*b),
            Cell::Int(i) => Serializable::Int(*i),
            Cell::Float(f) => Serializable::Float(*f),
            Cell::Str(s) => Serializable::Str(s.clone()),
            Cell::DateTime(dt) => Serializable::Timestamp(*dt),
            Cell::Timedelta(d) => Serializable::Timedelta(*d),
            Cell::NaT => Serializable::NaT,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum SerializationError {
    #[error("maximum nesting depth exceeded")]
    TooDeep,
    #[error("value could not be captured")]
    Uncapturable,
}

/// Snapshot of the serializer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SerializationStats {
    pub total_serialized: u64,
    pub nan_values_handled: u64,
    pub nat_values_handled: u64,
    pub timestamp_values_handled: u64,
    pub errors_handled: u64,
}

#[derive(Debug, Default)]
struct Counters {
    total: AtomicU64,
    nan: AtomicU64,
    nat: AtomicU64,
    timestamps: AtomicU64,
    errors: AtomicU64,
}

/// Result of serializing one value.
#[derive(Debug, Clone, PartialEq)]
pub struct Serialized {
    pub value: Value,
    /// Number of placeholders emitted in place of values that failed.
    pub placeholders: usize,
}

/// Converts runtime values into JSON-safe output.
#[derive(Debug)]
pub struct ValueSerializer {
    head_rows: usize,
    counters: Counters,
}

impl Default for ValueSerializer {
    fn default() -> Self {
        Self::new(DEFAULT_HEAD_ROWS)
    }
}

impl ValueSerializer {
    pub fn new(head_rows: usize) -> Self {
        Self {
            head_rows,
            counters: Counters::default(),
        }
    }

    pub fn head_rows(&self) -> usize {
        self.head_rows
    }

    /// Serialize one value. Total: never fails.
    pub fn serialize(&self, value: &Serializable) -> Value {
        self.serialize_report(value).value
    }

    /// Serialize one value and report how many placeholders were needed.
    pub fn serialize_report(&self, value: &Serializable) -> Serialized {
        let mut placeholders = 0;
        let value = self.value(value, 0, &mut placeholders);
        Serialized {
            value,
            placeholders,
        }
    }

    /// Serialize a named result map into a JSON object.
    pub fn serialize_results(&self, results: &[(String, Serializable)]) -> Serialized {
        let mut placeholders = 0;
        let mut map = Map::new();
        for (name, value) in results {
            map.insert(name.clone(), self.value(value, 0, &mut placeholders));
        }
        Serialized {
            value: Value::Object(map),
            placeholders,
        }
    }

    /// Serialize a float on its own.
    pub fn serialize_float(&self, x: f64) -> Value {
        self.counters.total.fetch_add(1, Ordering::Relaxed);
        self.float(x)
    }

    pub fn stats(&self) -> SerializationStats {
        SerializationStats {
            total_serialized: self.counters.total.load(Ordering::Relaxed),
            nan_values_handled: self.counters.nan.load(Ordering::Relaxed),
            nat_values_handled: self.counters.nat.load(Ordering::Relaxed),
            timestamp_values_handled: self.counters.timestamps.load(Ordering::Relaxed),
            errors_handled: self.counters.errors.load(Ordering::Relaxed),
        }
    }

    pub fn reset_stats(&self) {
        for counter in [
            &self.counters.total,
            &self.counters.nan,
            &self.counters.nat,
            &self.counters.timestamps,
            &self.counters.errors,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    fn value(&self, value: &Serializable, depth: usize, placeholders: &mut usize) -> Value {
        self.counters.total.fetch_add(1, Ordering::Relaxed);
        match self.try_value(value, depth, placeholders) {
            Ok(v) => v,
            Err(e) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                *placeholders += 1;
                tracing::warn!(value_type = value.type_name(), error = %e, "serialization fallback");
                Value::String(format!("<Serialization Error: {}>", value.type_name()))
            }
        }
    }

    fn try_value(
        &self,
        value: &Serializable,
        depth: usize,
        placeholders: &mut usize,
    ) -> Result<Value, SerializationError> {
        if depth > MAX_DEPTH {
            return Err(SerializationError::TooDeep);
        }
        Ok(match value {
            Serializable::Null => Value::Null,
            Serializable::Bool(b) => Value::Bool(*b),
            Serializable::Int(i) => json!(i),
            Serializable::Str(s) => Value::String(s.clone()),
            Serializable::Float(f) => self.float(*f),
            Serializable::NaT => {
                self.counters.nat.fetch_add(1, Ordering::Relaxed);
                Value::Null
            }
            Serializable::Timestamp(dt) => {
                self.counters.timestamps.fetch_add(1, Ordering::Relaxed);
                Value::String(iso_datetime(dt))
            }
            Serializable::Timedelta(d) => Value::String(iso_duration(d)),
            Serializable::Sequence(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.value(item, depth + 1, placeholders))
                    .collect(),
            ),
            Serializable::Mapping(entries) => {
                let mut map = Map::new();
                for (key, item) in entries {
                    map.insert(key.clone(), self.value(item, depth + 1, placeholders));
                }
                Value::Object(map)
            }
            Serializable::Vector(cells) => {
                Value::Array(cells.iter().map(|c| self.cell(c)).collect())
            }
            Serializable::Table(table) => self.table(table),
            Serializable::Series(series) => self.series(series),
            Serializable::Figure(figure) => json!({
                "type": "plotly_figure",
                "json": figure.to_json(),
            }),
            Serializable::Opaque { repr, .. } => Value::String(repr.clone()),
            Serializable::Unserializable { .. } => return Err(SerializationError::Uncapturable),
        })
    }

    fn float(&self, x: f64) -> Value {
        if x.is_nan() {
            self.counters.nan.fetch_add(1, Ordering::Relaxed);
            Value::Null
        } else if x.is_infinite() {
            Value::String(if x > 0.0 { "Infinity" } else { "-Infinity" }.to_string())
        } else {
            serde_json::Number::from_f64(x)
                .map(Value::Number)
                .unwrap_or(Value::Null)
        }
    }

    /// One table or series cell.
    pub fn cell(&self, cell: &Cell) -> Value {
        self.counters.total.fetch_add(1, Ordering::Relaxed);
        match cell {
            Cell::Float(f) => self.float(*f),
            Cell::Null | Cell::NaT => {
                self.counters.nat.fetch_add(1, Ordering::Relaxed);
                Value::Null
            }
            Cell::DateTime(dt) => {
                self.counters.timestamps.fetch_add(1, Ordering::Relaxed);
                Value::String(iso_datetime(dt))
            }
            Cell::Timedelta(d) => Value::String(iso_duration(d)),
            Cell::Bool(b) => Value::Bool(*b),
            Cell::Int(i) => json!(i),
            Cell::Str(s) => Value::String(s.clone()),
        }
    }

    fn table(&self, table: &Table) -> Value {
        let rows = table.nrows().min(self.head_rows);
        let head: Vec<Value> = (0..rows)
            .map(|r| {
                let mut record = Map::new();
                for col in &table.columns {
                    record.insert(col.name.clone(), self.cell(&col.values[r]));
                }
                Value::Object(record)
            })
            .collect();
        let dtypes: Map<String, Value> = table
            .columns
            .iter()
            .map(|c| (c.name.clone(), Value::String(c.dtype.as_str().to_string())))
            .collect();
        json!({
            "type": "dataframe",
            "shape": [table.nrows(), table.ncols()],
            "columns": table.column_names(),
            "head": head,
            "dtypes": dtypes,
        })
    }

    fn series(&self, series: &Series) -> Value {
        let head: Vec<Value> = series
            .values
            .iter()
            .take(self.head_rows)
            .map(|c| self.cell(c))
            .collect();
        json!({
            "type": "series",
            "name": series.name,
            "length": series.len(),
            "dtype": series.dtype.as_str(),
            "head": head,
        })
    }
}

/// ISO-8601 duration, the form `Timedelta.isoformat()` produces.
fn iso_duration(d: &Duration) -> String {
    let negative = *d < Duration::zero();
    let d = if negative { -*d } else { *d };
    let days = d.num_days();
    let rest = d - Duration::days(days);
    let hours = rest.num_hours();
    let minutes = rest.num_minutes() % 60;
    let seconds = rest.num_seconds() % 60;
    format!(
        "{}P{days}DT{hours}H{minutes}M{seconds}S",
        if negative { "-" } else { "" }
    )
}

#[cfg(test)]
mod tests;
