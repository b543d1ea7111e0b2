// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// Text rendering of tables and series for `print()` inside the sandbox.

use super::cell::Cell;
use super::series::Series;
use super::table::Table;

/// Longer tables show only their first and last rows.
const MAX_ROWS: usize = 60;
const EDGE_ROWS: usize = 5;

fn visible_rows(n: usize) -> (Vec<usize>, bool) {
    if n <= MAX_ROWS {
        ((0..n).collect(), false)
    } else {
        let mut rows: Vec<usize> = (0..EDGE_ROWS).collect();
        rows.extend(n - EDGE_ROWS..n);
        (rows, true)
    }
}

fn cell_text(cell: &Cell) -> String {
    match cell {
        Cell::Float(f) if f.is_nan() => "NaN".to_string(),
        Cell::Float(f) => {
            let s = format!("{f:.6}");
            let trimmed = s.trim_end_matches('0');
            if trimmed.ends_with('.') {
                format!("{trimmed}0")
            } else {
                trimmed.to_string()
            }
        }
        other => other.to_string(),
    }
}

pub fn render_table(table: &Table) -> String {
    if table.ncols() == 0 {
        return format!("Empty DataFrame\nColumns: []\nIndex: [{} rows]", table.nrows());
    }
    let (rows, truncated) = visible_rows(table.nrows());
    let index_text: Vec<String> = rows.iter().map(|&r| table.index.label_key(r)).collect();
    let index_width = index_text.iter().map(|s| s.chars().count()).max().unwrap_or(0);

    let mut cols: Vec<(usize, Vec<String>)> = Vec::with_capacity(table.ncols());
    for col in &table.columns {
        let cells: Vec<String> = rows.iter().map(|&r| cell_text(&col.values[r])).collect();
        let width = cells
            .iter()
            .map(|s| s.chars().count())
            .chain(std::iter::once(col.name.chars().count()))
            .max()
            .unwrap_or(0);
        cols.push((width, cells));
    }

    let mut out = String::new();
    out.push_str(&" ".repeat(index_width));
    for (col, (width, _)) in table.columns.iter().zip(&cols) {
        out.push_str(&format!("  {:>width$}", col.name, width = *width));
    }
    for (i, idx) in index_text.iter().enumerate() {
        if truncated && i == EDGE_ROWS {
            out.push('\n');
            out.push_str(&format!("{:<index_width$}", "..."));
            for (width, _) in &cols {
                out.push_str(&format!("  {:>width$}", "...", width = *width));
            }
        }
        out.push('\n');
        out.push_str(&format!("{idx:<index_width$}"));
        for (width, cells) in &cols {
            out.push_str(&format!("  {:>width$}", cells[i], width = *width));
        }
    }
    if truncated {
        out.push_str(&format!(
            "\n\n[{} rows x {} columns]",
            table.nrows(),
            table.ncols()
        ));
    }
    out
}

pub fn render_series(series: &Series) -> String {
    let (rows, truncated) = visible_rows(series.len());
    let index_text: Vec<String> = rows.iter().map(|&r| series.index.label_key(r)).collect();
    let index_width = index_text.iter().map(|s| s.chars().count()).max().unwrap_or(0);
    let cells: Vec<String> = rows.iter().map(|&r| cell_text(&series.values[r])).collect();
    let width = cells.iter().map(|s| s.chars().count()).max().unwrap_or(0);

    let mut lines = Vec::with_capacity(rows.len() + 2);
    if let Some(name) = series.index.names.first().cloned().flatten() {
        lines.push(name);
    }
    for (i, idx) in index_text.iter().enumerate() {
        if truncated && i == EDGE_ROWS {
            lines.push("..".to_string());
        }
        lines.push(format!("{idx:<index_width$}    {:>width$}", cells[i]));
    }
    let mut footer = Vec::new();
    if let Some(name) = &series.name {
        footer.push(format!("Name: {name}"));
    }
    if truncated {
        footer.push(format!("Length: {}", series.len()));
    }
    footer.push(format!("dtype: {}", series.dtype));
    lines.push(footer.join(", "));
    lines.join("\n")
}
