// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

/// Errors raised by table and series operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrameError {
    #[error("'{0}'")]
    KeyError(String),

    #[error("length of values ({got}) does not match length of index ({expected})")]
    LengthMismatch { expected: usize, got: usize },

    #[error("{0}")]
    TypeError(String),

    #[error("{0}")]
    ValueError(String),

    #[error("{0}")]
    MemoryError(String),
}

/// Errors raised while ingesting uploaded data.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("failed to parse CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported table format: {0}")]
    UnsupportedFormat(String),

    #[error("{0}")]
    Invalid(String),
}
