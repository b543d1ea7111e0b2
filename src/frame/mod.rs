// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// Tabular data model
//
// Responsibilities:
// - Cell values with pandas-compatible missing-value semantics
// - Series and Table with a (possibly multi-level) row index
// - Reductions, sorting, filtering, group-by aggregation
// - CSV and JSON-records ingestion with per-column type inference
// - Text rendering for print()

mod cell;
mod convert;
mod display;
mod error;
mod index;
mod io;
mod ops;
mod series;
mod table;

pub use cell::{
    distinct, format_datetime, format_float, format_timedelta, iso_datetime, parse_datetime,
    parse_datetime_with, Cell, CellKey, DType,
};
pub use convert::{convert_all, to_datetime, to_numeric, Errors};
pub use display::{render_series, render_table};
pub use error::{FrameError, TableError};
pub use index::Index;
pub use io::{read_csv, read_json_records, read_table, type_column, TableFormat};
pub use ops::{arith, check_str_bytes, compare, float_arith, ArithOp, CmpOp, MAX_STR_BYTES};
pub use series::{cast_cell, Agg, Series};
pub(crate) use series::cmp_labels;
pub use table::{AggSpec, Column, Groups, Table};

#[cfg(test)]
mod tests;
