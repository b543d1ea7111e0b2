// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// System prompt for the three-field analysis contract.

use std::fmt::Write;

use crate::metadata::{ColumnKind, TableMetadata};

const ROLE: &str = "You are an expert data analyst. Answer the user's request in three parts:

1. initial_response: your understanding of the request and how you will approach it
2. generated_code: Python code run against the pre-loaded table `df`
3. result_commentary: a concise, factual interpretation of the results

Code rules:
- The uploaded table is already loaded as the pandas DataFrame `df`; never read files
- No file, network, process or system access
- Assign the main answer to `result` and any chart to `fig` (plotly express or graph_objects)
- print() anything the reader should see";

const COMMENTARY_RULES: &str = "Guidelines for result_commentary:
- Start with the direct answer to the question
- State exact numbers and percentages
- Name the method used (e.g. \"filtered the country column for 'Saudi Arabia'\")
- Keep further observations brief; do not speculate";

const CONTRACT: &str = "Respond ONLY with a JSON object with exactly these string fields:
{
  \"initial_response\": \"...\",
  \"generated_code\": \"...\",
  \"result_commentary\": \"...\"
}
Use an empty string for generated_code when no code is needed.";

fn describe_table(out: &mut String, meta: &TableMetadata) {
    let info = &meta.basic_info;
    let _ = writeln!(out, "CURRENT TABLE (available as `df`):");
    let _ = writeln!(out, "- File: {}", info.filename);
    let _ = writeln!(
        out,
        "- Shape: {} rows x {} columns",
        info.shape.rows, info.shape.columns
    );
    let _ = writeln!(out, "- Columns: {}", info.column_names.join(", "));
    let _ = writeln!(
        out,
        "- Data quality score: {:.0}/100",
        meta.data_quality.data_quality_score
    );
    let _ = writeln!(out, "\nCOLUMN DETAILS:");
    for col in &meta.columns {
        let _ = write!(
            out,
            "- {}: {} ({}), {} non-null",
            col.name,
            match col.column_type {
                ColumnKind::Numeric => "numeric",
                ColumnKind::Datetime => "datetime",
                ColumnKind::Categorical => "categorical",
            },
            col.dtype,
            col.non_null_count
        );
        match col.column_type {
            ColumnKind::Numeric => {
                if let (Some(min), Some(max)) = (col.min, col.max) {
                    let _ = write!(out, ", range {min}-{max}");
                }
                if let Some(mean) = col.mean {
                    let _ = write!(out, ", mean {mean:.2}");
                }
            }
            ColumnKind::Datetime => {
                if let (Some(min), Some(max)) = (&col.min_date, &col.max_date) {
                    let _ = write!(out, ", from {min} to {max}");
                }
            }
            ColumnKind::Categorical => {
                if let Some(top) = col.top_values.first() {
                    let _ = write!(out, ", most common '{}'", top.value);
                }
            }
        }
        out.push('\n');
    }
}

/// Assemble the system message: role and code rules, the current table,
/// user rules, then the JSON contract.
pub fn build_system_prompt(metadata: Option<&TableMetadata>, rules: &[String]) -> String {
    let mut out = String::with_capacity(2048);
    out.push_str(ROLE);
    out.push_str("\n\n");

    match metadata {
        Some(meta) => describe_table(&mut out, meta),
        None => out.push_str("No table is loaded; `df` is not defined.\n"),
    }

    if !rules.is_empty() {
        out.push_str("\nUSER RULES:\n");
        for rule in rules {
            let _ = writeln!(out, "- {rule}");
        }
    }

    out.push('\n');
    out.push_str(COMMENTARY_RULES);
    out.push_str("\n\n");
    out.push_str(CONTRACT);
    out
}
