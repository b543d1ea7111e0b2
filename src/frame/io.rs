// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// Table ingestion
//
// Uploaded data arrives as CSV text or as a JSON array of records. Text
// cells are typed column by column: a column becomes integer, float, bool
// or datetime only when every present cell parses as that type.

use super::cell::{parse_datetime, Cell};
use super::error::TableError;
use super::table::Table;

/// Cell spellings read as missing.
const NA_VALUES: &[&str] = &["", "NaN", "nan", "NA", "N/A", "null", "NULL", "None"];

/// Upload formats the table store accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Json,
}

impl TableFormat {
    /// Pick a format from a file name or content type.
    pub fn detect(hint: &str) -> Result<Self, TableError> {
        let hint = hint.to_ascii_lowercase();
        if hint.ends_with(".csv") || hint.contains("text/csv") || hint == "csv" {
            Ok(TableFormat::Csv)
        } else if hint.ends_with(".json") || hint.contains("application/json") || hint == "json" {
            Ok(TableFormat::Json)
        } else {
            Err(TableError::UnsupportedFormat(hint))
        }
    }
}

pub fn read_table(data: &[u8], format: TableFormat) -> Result<Table, TableError> {
    match format {
        TableFormat::Csv => read_csv(data),
        TableFormat::Json => read_json_records(data),
    }
}

pub fn read_csv(data: &[u8]) -> Result<Table, TableError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .trim(csv::Trim::Headers)
        .from_reader(data);
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if headers.is_empty() || headers.iter().all(String::is_empty) {
        return Err(TableError::Invalid("CSV has no header row".into()));
    }
    let mut raw: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    for record in reader.records() {
        let record = record?;
        for (i, field) in record.iter().enumerate() {
            raw[i].push(field.to_string());
        }
    }
    let columns = dedupe_names(headers)
        .into_iter()
        .zip(raw)
        .map(|(name, texts)| (name, type_column(&texts)))
        .collect();
    Table::new(columns).map_err(|e| TableError::Invalid(e.to_string()))
}

pub fn read_json_records(data: &[u8]) -> Result<Table, TableError> {
    let value: serde_json::Value = serde_json::from_slice(data)?;
    let records = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => match map.remove("data") {
            Some(serde_json::Value::Array(items)) => items,
            _ => {
                return Err(TableError::Invalid(
                    "expected an array of records or {\"data\": [...]}".into(),
                ))
            }
        },
        _ => return Err(TableError::Invalid("expected an array of records".into())),
    };

    let mut names: Vec<String> = Vec::new();
    for record in &records {
        let obj = record
            .as_object()
            .ok_or_else(|| TableError::Invalid("every record must be an object".into()))?;
        for key in obj.keys() {
            if !names.contains(key) {
                names.push(key.clone());
            }
        }
    }
    let columns = names
        .iter()
        .map(|name| {
            let cells: Vec<Cell> = records
                .iter()
                .map(|r| r.get(name).map(json_cell).unwrap_or(Cell::Null))
                .collect();
            (name.clone(), retype_strings(cells))
        })
        .collect();
    Table::new(columns).map_err(|e| TableError::Invalid(e.to_string()))
}

fn json_cell(value: &serde_json::Value) -> Cell {
    match value {
        serde_json::Value::Null => Cell::Null,
        serde_json::Value::Bool(b) => Cell::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Cell::Int(i),
            None => Cell::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Cell::Str(s.clone()),
        other => Cell::Str(other.to_string()),
    }
}

/// String-only JSON columns get the same typing as CSV text.
fn retype_strings(cells: Vec<Cell>) -> Vec<Cell> {
    let all_text = cells.iter().all(|c| matches!(c, Cell::Str(_) | Cell::Null));
    if !all_text {
        return cells;
    }
    let texts: Vec<String> = cells
        .iter()
        .map(|c| match c {
            Cell::Str(s) => s.clone(),
            _ => String::new(),
        })
        .collect();
    type_column(&texts)
}

fn dedupe_names(headers: Vec<String>) -> Vec<String> {
    let mut seen: Vec<String> = Vec::with_capacity(headers.len());
    for (i, name) in headers.into_iter().enumerate() {
        let base = if name.is_empty() {
            format!("Unnamed: {i}")
        } else {
            name
        };
        let mut candidate = base.clone();
        let mut n = 1;
        while seen.contains(&candidate) {
            candidate = format!("{base}.{n}");
            n += 1;
        }
        seen.push(candidate);
    }
    seen
}

fn is_na(text: &str) -> bool {
    NA_VALUES.contains(&text.trim())
}

/// Type a column of raw text cells.
pub fn type_column(texts: &[String]) -> Vec<Cell> {
    let present: Vec<&str> = texts
        .iter()
        .map(String::as_str)
        .filter(|t| !is_na(t))
        .collect();
    let convert = |f: &dyn Fn(&str) -> Cell| -> Vec<Cell> {
        texts
            .iter()
            .map(|t| if is_na(t) { Cell::Null } else { f(t.trim()) })
            .collect()
    };

    if present.is_empty() {
        return convert(&|t: &str| Cell::Str(t.to_string()));
    }
    if present.iter().all(|t| t.trim().parse::<i64>().is_ok()) {
        return convert(&|t: &str| t.parse::<i64>().map(Cell::Int).unwrap_or(Cell::Null));
    }
    if present.iter().all(|t| parse_float(t).is_some()) {
        return convert(&|t: &str| Cell::Float(parse_float(t).unwrap_or(f64::NAN)));
    }
    if present.iter().all(|t| parse_bool(t).is_some()) {
        return convert(&|t: &str| parse_bool(t).map(Cell::Bool).unwrap_or(Cell::Null));
    }
    // plain text stays object; only ISO-looking dates are promoted
    if present.iter().all(|t| looks_like_date(t) && parse_datetime(t).is_some()) {
        return convert(&|t: &str| parse_datetime(t).map(Cell::DateTime).unwrap_or(Cell::NaT));
    }
    convert(&|t: &str| Cell::Str(t.to_string()))
}

fn parse_float(text: &str) -> Option<f64> {
    let t = text.trim();
    match t.to_ascii_lowercase().as_str() {
        "inf" | "+inf" | "infinity" => return Some(f64::INFINITY),
        "-inf" | "-infinity" => return Some(f64::NEG_INFINITY),
        _ => {}
    }
    if t.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
        return None;
    }
    t.parse::<f64>().ok()
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim() {
        "True" | "true" | "TRUE" => Some(true),
        "False" | "false" | "FALSE" => Some(false),
        _ => None,
    }
}

fn looks_like_date(text: &str) -> bool {
    let t = text.trim();
    t.len() >= 8 && t.as_bytes()[0].is_ascii_digit() && (t.contains('-') || t.contains('/'))
}
