// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// Table metadata and the uploaded-table store
//
// Responsibilities:
// - Summarize an ingested table: shape, per-column null/unique counts,
//   numeric ranges, datetime bounds, top values, data quality, sample rows
// - Hold the single current table and its metadata for the pipeline and
//   the HTTP surface

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::frame::{iso_datetime, read_table, Cell, CellKey, DType, Series, Table, TableError, TableFormat};

const TOP_VALUES: usize = 10;
const SAMPLE_ROWS: usize = 5;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Datetime,
    Categorical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    pub rows: usize,
    pub columns: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicInfo {
    pub filename: String,
    pub shape: Shape,
    pub column_names: Vec<String>,
    /// Column name to pandas dtype name, in column order.
    pub dtypes: Map<String, Json>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueCount {
    pub value: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    pub dtype: String,
    pub column_type: ColumnKind,
    pub non_null_count: usize,
    pub null_count: usize,
    pub null_percentage: f64,
    pub unique_count: usize,
    pub unique_percentage: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub median: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub std: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_date: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub top_values: Vec<ValueCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQuality {
    pub total_cells: usize,
    pub missing_cells: usize,
    pub missing_percentage: f64,
    pub duplicate_rows: usize,
    /// 100 minus the missing-cell percentage minus a duplicate penalty.
    pub data_quality_score: f64,
    pub potential_issues: Vec<String>,
}

/// Everything the prompt and the metadata endpoint need to know about a
/// table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub basic_info: BasicInfo,
    pub columns: Vec<ColumnMetadata>,
    pub data_quality: DataQuality,
    pub sample_rows: Vec<Map<String, Json>>,
}

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round2(part as f64 * 100.0 / whole as f64)
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn finite(x: Result<f64, crate::frame::FrameError>) -> Option<f64> {
    x.ok().filter(|v| v.is_finite())
}

fn kind_of(dtype: DType) -> ColumnKind {
    match dtype {
        DType::Int64 | DType::Float64 => ColumnKind::Numeric,
        DType::DateTime => ColumnKind::Datetime,
        _ => ColumnKind::Categorical,
    }
}

fn column_metadata(series: &Series, rows: usize) -> ColumnMetadata {
    let non_null = series.count();
    let unique = series.nunique();
    let column_type = kind_of(series.dtype);
    let mut meta = ColumnMetadata {
        name: series.name.clone().unwrap_or_default(),
        dtype: series.dtype.as_str().to_string(),
        column_type,
        non_null_count: non_null,
        null_count: rows - non_null,
        null_percentage: percentage(rows - non_null, rows),
        unique_count: unique,
        unique_percentage: percentage(unique, rows),
        min: None,
        max: None,
        mean: None,
        median: None,
        std: None,
        min_date: None,
        max_date: None,
        top_values: Vec::new(),
    };

    match column_type {
        ColumnKind::Numeric => {
            meta.min = series.min().as_f64().filter(|v| v.is_finite());
            meta.max = series.max().as_f64().filter(|v| v.is_finite());
            meta.mean = finite(series.mean());
            meta.median = finite(series.median());
            meta.std = finite(series.std());
        }
        ColumnKind::Datetime => {
            let date = |cell: Cell| match cell {
                Cell::DateTime(dt) => Some(iso_datetime(&dt)),
                _ => None,
            };
            meta.min_date = date(series.min());
            meta.max_date = date(series.max());
        }
        ColumnKind::Categorical => {
            let counts = series.value_counts(false, false, true);
            meta.top_values = counts
                .index
                .level_values(0)
                .into_iter()
                .zip(counts.values.iter())
                .take(TOP_VALUES)
                .map(|(label, count)| ValueCount {
                    value: label.to_string(),
                    count: count.as_f64().unwrap_or(0.0) as usize,
                })
                .collect();
        }
    }
    meta
}

fn duplicate_rows(table: &Table) -> usize {
    let mut seen: HashSet<Vec<CellKey>> = HashSet::new();
    (0..table.nrows())
        .filter(|&row| {
            let key: Vec<CellKey> = table.columns.iter().map(|c| c.values[row].key()).collect();
            !seen.insert(key)
        })
        .count()
}

fn data_quality(table: &Table, columns: &[ColumnMetadata]) -> DataQuality {
    let (rows, cols) = table.shape();
    let total_cells = rows * cols;
    let missing_cells: usize = columns.iter().map(|c| c.null_count).sum();
    let duplicates = duplicate_rows(table);
    let high_missing = columns.iter().filter(|c| c.null_percentage > 50.0).count();

    let missing_fraction = if total_cells == 0 {
        0.0
    } else {
        missing_cells as f64 / total_cells as f64
    };
    let duplicate_fraction = if rows == 0 {
        0.0
    } else {
        duplicates as f64 / rows as f64
    };

    let mut issues = Vec::new();
    if missing_fraction > 0.1 {
        issues.push("High missing data percentage (>10%)".to_string());
    }
    if duplicates > 0 {
        issues.push(format!("{duplicates} duplicate rows found"));
    }
    if high_missing > 0 {
        issues.push(format!("{high_missing} columns with >50% missing data"));
    }

    DataQuality {
        total_cells,
        missing_cells,
        missing_percentage: percentage(missing_cells, total_cells),
        duplicate_rows: duplicates,
        data_quality_score: round2((100.0 - missing_fraction * 100.0 - duplicate_fraction * 10.0).max(0.0)),
        potential_issues: issues,
    }
}

/// Summarize `table` for the prompt and the metadata endpoint.
pub fn extract_metadata(table: &Table, filename: &str) -> TableMetadata {
    let (rows, cols) = table.shape();
    let mut dtypes = Map::new();
    for (name, dtype) in table.dtypes() {
        dtypes.insert(name, Json::String(dtype.as_str().to_string()));
    }

    let columns: Vec<ColumnMetadata> = table
        .columns
        .iter()
        .map(|c| {
            let series = Series::with_index(Some(c.name.clone()), c.values.clone(), table.index.clone());
            column_metadata(&series, rows)
        })
        .collect();

    let sample_rows = (0..rows.min(SAMPLE_ROWS))
        .map(|row| {
            table
                .row(row)
                .into_iter()
                .map(|(name, cell)| (name, cell.to_json()))
                .collect()
        })
        .collect();

    TableMetadata {
        basic_info: BasicInfo {
            filename: filename.to_string(),
            shape: Shape { rows, columns: cols },
            column_names: table.column_names(),
            dtypes,
        },
        data_quality: data_quality(table, &columns),
        columns,
        sample_rows,
    }
}

// ---------------------------------------------------------------------------
// Table store
// ---------------------------------------------------------------------------

/// The currently loaded table. Cheap to clone; the table itself is never
/// mutated after loading.
#[derive(Debug, Clone)]
pub struct LoadedTable {
    pub table: Arc<Table>,
    pub metadata: Arc<TableMetadata>,
    pub loaded_at: DateTime<Utc>,
}

/// Holds at most one uploaded table. Every sandbox run receives its own
/// copy, so readers never observe each other's edits.
#[derive(Debug, Default)]
pub struct TableStore {
    current: RwLock<Option<LoadedTable>>,
}

impl TableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `data` and make it the current table.
    pub fn load(&self, filename: &str, data: &[u8], format: TableFormat) -> Result<LoadedTable, TableError> {
        let table = read_table(data, format)?;
        if table.ncols() == 0 {
            return Err(TableError::Invalid("table has no columns".into()));
        }
        let metadata = extract_metadata(&table, filename);
        let loaded = LoadedTable {
            table: Arc::new(table),
            metadata: Arc::new(metadata),
            loaded_at: Utc::now(),
        };
        tracing::info!(
            filename,
            rows = loaded.metadata.basic_info.shape.rows,
            columns = loaded.metadata.basic_info.shape.columns,
            "table loaded"
        );
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Some(loaded.clone());
        Ok(loaded)
    }

    pub fn current(&self) -> Option<LoadedTable> {
        self.current.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Drop the current table. Returns false when none was loaded.
    pub fn clear(&self) -> bool {
        self.current
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::new(vec![
            (
                "country".to_string(),
                ["Saudi Arabia", "Jordan", "Saudi Arabia", "Egypt", "Saudi Arabia"]
                    .iter()
                    .map(|s| Cell::Str(s.to_string()))
                    .collect(),
            ),
            (
                "amount".to_string(),
                vec![Cell::Float(10.0), Cell::Float(20.0), Cell::Float(f64::NAN), Cell::Float(40.0), Cell::Float(10.0)],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn basic_info_lists_shape_and_dtypes() {
        let meta = extract_metadata(&sample(), "sales.csv");
        assert_eq!(meta.basic_info.filename, "sales.csv");
        assert_eq!(meta.basic_info.shape, Shape { rows: 5, columns: 2 });
        assert_eq!(meta.basic_info.column_names, vec!["country", "amount"]);
        assert_eq!(meta.basic_info.dtypes["amount"], "float64");
        assert_eq!(meta.basic_info.dtypes["country"], "object");
    }

    #[test]
    fn numeric_column_summary_skips_missing() {
        let meta = extract_metadata(&sample(), "sales.csv");
        let amount = &meta.columns[1];
        assert_eq!(amount.column_type, ColumnKind::Numeric);
        assert_eq!(amount.null_count, 1);
        assert_eq!(amount.null_percentage, 20.0);
        assert_eq!(amount.min, Some(10.0));
        assert_eq!(amount.max, Some(40.0));
        assert_eq!(amount.mean, Some(20.0));
        assert!(amount.top_values.is_empty());
    }

    #[test]
    fn categorical_column_reports_top_values() {
        let meta = extract_metadata(&sample(), "sales.csv");
        let country = &meta.columns[0];
        assert_eq!(country.column_type, ColumnKind::Categorical);
        assert_eq!(country.unique_count, 3);
        assert_eq!(
            country.top_values[0],
            ValueCount {
                value: "Saudi Arabia".into(),
                count: 3
            }
        );
        assert!(country.min.is_none());
    }

    #[test]
    fn data_quality_counts_missing_cells() {
        let meta = extract_metadata(&sample(), "sales.csv");
        assert_eq!(meta.data_quality.total_cells, 10);
        assert_eq!(meta.data_quality.missing_cells, 1);
        assert_eq!(meta.data_quality.duplicate_rows, 0);
        assert_eq!(meta.data_quality.data_quality_score, 90.0);
    }

    #[test]
    fn duplicate_rows_are_detected() {
        let table = Table::new(vec![(
            "a".to_string(),
            vec![Cell::Int(1), Cell::Int(1), Cell::Int(2)],
        )])
        .unwrap();
        let meta = extract_metadata(&table, "dup.csv");
        assert_eq!(meta.data_quality.duplicate_rows, 1);
        assert!(meta.data_quality.potential_issues[0].contains("1 duplicate rows"));
    }

    #[test]
    fn sample_rows_are_json_safe() {
        let meta = extract_metadata(&sample(), "sales.csv");
        assert_eq!(meta.sample_rows.len(), 5);
        assert_eq!(meta.sample_rows[2]["amount"], Json::Null);
    }

    #[test]
    fn store_load_current_and_clear() {
        let store = TableStore::new();
        assert!(store.current().is_none());
        let csv = b"name,score\nann,3\nbob,4\n";
        let loaded = store.load("scores.csv", csv, TableFormat::Csv).unwrap();
        assert_eq!(loaded.table.shape(), (2, 2));
        assert_eq!(store.current().unwrap().metadata.basic_info.filename, "scores.csv");
        assert!(store.clear());
        assert!(!store.clear());
    }

    #[test]
    fn store_rejects_malformed_upload_and_keeps_previous() {
        let store = TableStore::new();
        store.load("a.csv", b"x\n1\n", TableFormat::Csv).unwrap();
        let err = store.load("b.json", b"{not json", TableFormat::Json).unwrap_err();
        assert!(matches!(err, TableError::Json(_)));
        assert_eq!(store.current().unwrap().metadata.basic_info.filename, "a.csv");
    }
}
