// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

use super::cell::Cell;

/// Row labels for a table or series. Each label holds one value per level;
/// ordinary indexes have a single level, group-by results on several keys
/// have one level per key.
#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    pub names: Vec<Option<String>>,
    pub labels: Vec<Vec<Cell>>,
}

impl Index {
    /// The default `0..n` index.
    pub fn range(n: usize) -> Self {
        Self {
            names: vec![None],
            labels: (0..n).map(|i| vec![Cell::Int(i as i64)]).collect(),
        }
    }

    pub fn from_cells(name: Option<String>, cells: Vec<Cell>) -> Self {
        Self {
            names: vec![name],
            labels: cells.into_iter().map(|c| vec![c]).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn levels(&self) -> usize {
        self.names.len()
    }

    pub fn label(&self, position: usize) -> &[Cell] {
        &self.labels[position]
    }

    /// Values of one level, in row order.
    pub fn level_values(&self, level: usize) -> Vec<Cell> {
        self.labels
            .iter()
            .map(|l| l.get(level).cloned().unwrap_or(Cell::Null))
            .collect()
    }

    pub fn take(&self, positions: &[usize]) -> Index {
        Index {
            names: self.names.clone(),
            labels: positions.iter().map(|&p| self.labels[p].clone()).collect(),
        }
    }

    pub fn position_of(&self, key: &[Cell]) -> Option<usize> {
        self.labels.iter().position(|label| {
            label.len() == key.len() && label.iter().zip(key).all(|(a, b)| a.group_eq(b))
        })
    }

    /// True for an unnamed single-level `0..n` index.
    pub fn is_default_range(&self) -> bool {
        self.levels() == 1
            && self.names[0].is_none()
            && self
                .labels
                .iter()
                .enumerate()
                .all(|(i, l)| l.len() == 1 && l[0] == Cell::Int(i as i64))
    }

    /// Label rendered as a display key; multi-level labels are joined.
    pub fn label_key(&self, position: usize) -> String {
        let label = &self.labels[position];
        if label.len() == 1 {
            label[0].to_string()
        } else {
            let parts: Vec<String> = label.iter().map(|c| c.to_string()).collect();
            format!("({})", parts.join(", "))
        }
    }
}
