// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;

use super::cell::{distinct, Cell, DType};
use super::error::FrameError;
use super::index::Index;
use super::series::{cmp_labels, Agg, Series};

/// A named column with a uniform dtype.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub dtype: DType,
    pub values: Vec<Cell>,
}

impl Column {
    pub fn new(name: impl Into<String>, mut values: Vec<Cell>) -> Self {
        let dtype = DType::infer(&values);
        dtype.normalize(&mut values);
        Self {
            name: name.into(),
            dtype,
            values,
        }
    }
}

/// A two-dimensional table of named columns sharing one row index.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub columns: Vec<Column>,
    pub index: Index,
}

impl Table {
    /// Build a table from `(name, values)` pairs; every column must have
    /// the same length.
    pub fn new(columns: Vec<(String, Vec<Cell>)>) -> Result<Self, FrameError> {
        let rows = columns.first().map(|(_, v)| v.len()).unwrap_or(0);
        Self::with_index(columns, Index::range(rows))
    }

    pub fn with_index(columns: Vec<(String, Vec<Cell>)>, index: Index) -> Result<Self, FrameError> {
        for (_, values) in &columns {
            if values.len() != index.len() {
                return Err(FrameError::LengthMismatch {
                    expected: index.len(),
                    got: values.len(),
                });
            }
        }
        let mut table = Table {
            columns: Vec::with_capacity(columns.len()),
            index,
        };
        for (name, values) in columns {
            // later duplicates replace earlier ones, as dict construction does
            table.put_column(Column::new(name, values));
        }
        Ok(table)
    }

    pub fn empty() -> Self {
        Table {
            columns: Vec::new(),
            index: Index::range(0),
        }
    }

    pub fn nrows(&self) -> usize {
        self.index.len()
    }

    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.nrows(), self.ncols())
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column_ref(&self, name: &str) -> Result<&Column, FrameError> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| FrameError::KeyError(name.to_string()))
    }

    /// One column as a series sharing the table's index.
    pub fn column(&self, name: &str) -> Result<Series, FrameError> {
        let col = self.column_ref(name)?;
        Ok(Series {
            name: Some(col.name.clone()),
            values: col.values.clone(),
            index: self.index.clone(),
            dtype: col.dtype,
        })
    }

    fn put_column(&mut self, column: Column) {
        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(slot) => *slot = column,
            None => self.columns.push(column),
        }
    }

    /// Insert or replace a column.
    pub fn set_column(&mut self, name: &str, values: Vec<Cell>) -> Result<(), FrameError> {
        if !self.columns.is_empty() && values.len() != self.nrows() {
            return Err(FrameError::LengthMismatch {
                expected: self.nrows(),
                got: values.len(),
            });
        }
        if self.columns.is_empty() && self.index.len() != values.len() {
            self.index = Index::range(values.len());
        }
        self.put_column(Column::new(name, values));
        Ok(())
    }

    /// Broadcast one value down a new or existing column.
    pub fn set_scalar(&mut self, name: &str, value: Cell) {
        let values = vec![value; self.nrows()];
        self.put_column(Column::new(name, values));
    }

    pub fn select(&self, names: &[String]) -> Result<Table, FrameError> {
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            columns.push(self.column_ref(name)?.clone());
        }
        Ok(Table {
            columns,
            index: self.index.clone(),
        })
    }

    pub fn take(&self, positions: &[usize]) -> Table {
        Table {
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    dtype: c.dtype,
                    values: positions.iter().map(|&p| c.values[p].clone()).collect(),
                })
                .collect(),
            index: self.index.take(positions),
        }
    }

    pub fn head(&self, n: usize) -> Table {
        let positions: Vec<usize> = (0..n.min(self.nrows())).collect();
        self.take(&positions)
    }

    pub fn tail(&self, n: usize) -> Table {
        let start = self.nrows().saturating_sub(n);
        let positions: Vec<usize> = (start..self.nrows()).collect();
        self.take(&positions)
    }

    pub fn filter(&self, mask: &[bool]) -> Result<Table, FrameError> {
        if mask.len() != self.nrows() {
            return Err(FrameError::LengthMismatch {
                expected: self.nrows(),
                got: mask.len(),
            });
        }
        let positions: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, keep)| keep.then_some(i))
            .collect();
        Ok(self.take(&positions))
    }

    /// Values of one row, paired with column names.
    pub fn row(&self, position: usize) -> Vec<(String, Cell)> {
        self.columns
            .iter()
            .map(|c| (c.name.clone(), c.values[position].clone()))
            .collect()
    }

    pub fn drop_columns(&self, names: &[String]) -> Result<Table, FrameError> {
        for name in names {
            self.column_ref(name)?;
        }
        Ok(Table {
            columns: self
                .columns
                .iter()
                .filter(|c| !names.contains(&c.name))
                .cloned()
                .collect(),
            index: self.index.clone(),
        })
    }

    /// Rename columns; names missing from `mapping` are left alone.
    pub fn rename(&self, mapping: &HashMap<String, String>) -> Table {
        let mut out = self.clone();
        for col in &mut out.columns {
            if let Some(new_name) = mapping.get(&col.name) {
                col.name = new_name.clone();
            }
        }
        out
    }

    /// Drop rows holding a missing value in any of `subset` (all columns
    /// when `None`).
    pub fn dropna(&self, subset: Option<&[String]>) -> Result<Table, FrameError> {
        let checked: Vec<&Column> = match subset {
            Some(names) => names
                .iter()
                .map(|n| self.column_ref(n))
                .collect::<Result<_, _>>()?,
            None => self.columns.iter().collect(),
        };
        let positions: Vec<usize> = (0..self.nrows())
            .filter(|&row| checked.iter().all(|c| !c.values[row].is_missing()))
            .collect();
        Ok(self.take(&positions))
    }

    pub fn fillna(&self, fill: &Cell) -> Table {
        let mut out = self.clone();
        for col in &mut out.columns {
            let values = col
                .values
                .iter()
                .map(|c| if c.is_missing() { fill.clone() } else { c.clone() })
                .collect();
            *col = Column::new(col.name.clone(), values);
        }
        out
    }

    pub fn isnull(&self) -> Table {
        Table {
            columns: self
                .columns
                .iter()
                .map(|c| {
                    Column::new(
                        c.name.clone(),
                        c.values.iter().map(|v| Cell::Bool(v.is_missing())).collect(),
                    )
                })
                .collect(),
            index: self.index.clone(),
        }
    }

    /// Stable multi-key sort. `ascending` holds one flag per key, or a
    /// single flag applied to every key.
    pub fn sort_by(&self, keys: &[String], ascending: &[bool]) -> Result<Table, FrameError> {
        let cols: Vec<&Column> = keys
            .iter()
            .map(|k| self.column_ref(k))
            .collect::<Result<_, _>>()?;
        if ascending.len() != 1 && ascending.len() != keys.len() {
            return Err(FrameError::ValueError(format!(
                "Length of ascending ({}) != length of by ({})",
                ascending.len(),
                keys.len()
            )));
        }
        let mut positions: Vec<usize> = (0..self.nrows()).collect();
        positions.sort_by(|&a, &b| {
            for (i, col) in cols.iter().enumerate() {
                let asc = ascending.get(i).copied().unwrap_or(ascending[0]);
                let (x, y) = (&col.values[a], &col.values[b]);
                let ord = match (x.is_missing(), y.is_missing()) {
                    (false, false) if !asc => y.total_cmp(x),
                    _ => x.total_cmp(y),
                };
                if ord.is_ne() {
                    return ord;
                }
            }
            std::cmp::Ordering::Equal
        });
        Ok(self.take(&positions))
    }

    pub fn sort_index(&self, ascending: bool) -> Table {
        let mut positions: Vec<usize> = (0..self.nrows()).collect();
        positions.sort_by(|&a, &b| {
            let ord = cmp_labels(self.index.label(a), self.index.label(b));
            if ascending {
                ord
            } else {
                ord.reverse()
            }
        });
        self.take(&positions)
    }

    /// Move the index into columns (unless `drop`) and restore a default
    /// range index.
    pub fn reset_index(&self, drop: bool) -> Table {
        let mut columns = Vec::new();
        if !drop {
            let levels = self.index.levels();
            for level in 0..levels {
                let name = match &self.index.names[level] {
                    Some(n) => n.clone(),
                    None if levels == 1 => "index".to_string(),
                    None => format!("level_{level}"),
                };
                if !self.has_column(&name) {
                    columns.push(Column::new(name, self.index.level_values(level)));
                }
            }
        }
        columns.extend(self.columns.iter().cloned());
        Table {
            columns,
            index: Index::range(self.nrows()),
        }
    }

    pub fn set_index(&self, name: &str) -> Result<Table, FrameError> {
        let col = self.column_ref(name)?;
        Ok(Table {
            index: Index::from_cells(Some(name.to_string()), col.values.clone()),
            columns: self
                .columns
                .iter()
                .filter(|c| c.name != name)
                .cloned()
                .collect(),
        })
    }

    /// Columns whose dtype falls in one of the named kinds: `number`,
    /// `object`, `datetime`, `bool`, or an exact dtype name.
    pub fn select_dtypes(&self, include: &[String]) -> Table {
        let wanted = |dtype: DType| {
            include.iter().any(|kind| match kind.as_str() {
                "number" | "numeric" => dtype.is_numeric(),
                "object" | "category" | "str" | "string" => dtype == DType::Object,
                "datetime" | "datetime64" => dtype == DType::DateTime,
                other => dtype.as_str() == other,
            })
        };
        Table {
            columns: self
                .columns
                .iter()
                .filter(|c| wanted(c.dtype))
                .cloned()
                .collect(),
            index: self.index.clone(),
        }
    }

    /// Column-wise reduction, one entry per column. With `numeric_only`
    /// non-numeric columns are skipped; otherwise they are skipped only when
    /// the reduction cannot apply to them.
    pub fn reduce(&self, agg: Agg, numeric_only: bool) -> Result<Series, FrameError> {
        let mut labels = Vec::new();
        let mut values = Vec::new();
        for col in &self.columns {
            if numeric_only && !(col.dtype.is_numeric() || col.dtype == DType::Bool) {
                continue;
            }
            let series = self.column(&col.name)?;
            match series.aggregate(agg) {
                Ok(v) => {
                    labels.push(Cell::Str(col.name.clone()));
                    values.push(v);
                }
                Err(_) if !numeric_only => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(Series::with_index(None, values, Index::from_cells(None, labels)))
    }

    /// Summary statistics of the numeric columns.
    pub fn describe(&self) -> Result<Table, FrameError> {
        const STATS: [&str; 8] = ["count", "mean", "std", "min", "25%", "50%", "75%", "max"];
        let numeric: Vec<&Column> = self
            .columns
            .iter()
            .filter(|c| c.dtype.is_numeric())
            .collect();
        let mut columns = Vec::with_capacity(numeric.len());
        for col in numeric {
            let s = self.column(&col.name)?;
            let float = |c: Cell| Cell::Float(c.as_f64().unwrap_or(f64::NAN));
            columns.push((
                col.name.clone(),
                vec![
                    Cell::Float(s.count() as f64),
                    Cell::Float(s.mean()?),
                    Cell::Float(s.std()?),
                    float(s.min()),
                    Cell::Float(s.quantile(0.25)?),
                    Cell::Float(s.quantile(0.5)?),
                    Cell::Float(s.quantile(0.75)?),
                    float(s.max()),
                ],
            ));
        }
        let index = Index::from_cells(None, STATS.iter().map(|s| Cell::Str(s.to_string())).collect());
        Table::with_index(columns, index)
    }

    /// Pairwise Pearson correlation of the numeric columns.
    pub fn corr(&self) -> Result<Table, FrameError> {
        let numeric: Vec<(String, Vec<f64>)> = self
            .columns
            .iter()
            .filter(|c| c.dtype.is_numeric() || c.dtype == DType::Bool)
            .map(|c| {
                (
                    c.name.clone(),
                    c.values.iter().map(|v| v.as_f64().unwrap_or(f64::NAN)).collect(),
                )
            })
            .collect();
        let names: Vec<Cell> = numeric.iter().map(|(n, _)| Cell::Str(n.clone())).collect();
        let columns = numeric
            .iter()
            .map(|(name, xs)| {
                let values = numeric.iter().map(|(_, ys)| Cell::Float(pearson(xs, ys))).collect();
                (name.clone(), values)
            })
            .collect();
        Table::with_index(columns, Index::from_cells(None, names))
    }

    pub fn nunique(&self) -> Series {
        let labels = self.columns.iter().map(|c| Cell::Str(c.name.clone())).collect();
        let values = self
            .columns
            .iter()
            .map(|c| {
                Cell::Int(
                    distinct(&c.values)
                        .iter()
                        .filter(|(v, _)| !v.is_missing())
                        .count() as i64,
                )
            })
            .collect();
        Series::with_index(None, values, Index::from_cells(None, labels))
    }

    pub fn dtypes(&self) -> Vec<(String, DType)> {
        self.columns.iter().map(|c| (c.name.clone(), c.dtype)).collect()
    }

    /// Text summary in the shape of `DataFrame.info()`.
    pub fn info(&self) -> String {
        let mut out = format!(
            "<class 'pandas.core.frame.DataFrame'>\nRangeIndex: {} entries\nData columns (total {} columns):\n",
            self.nrows(),
            self.ncols()
        );
        for (i, col) in self.columns.iter().enumerate() {
            let non_null = col.values.iter().filter(|v| !v.is_missing()).count();
            out.push_str(&format!(
                " {i:<3} {:<20} {non_null} non-null  {}\n",
                col.name, col.dtype
            ));
        }
        out
    }

    /// Group rows by the values of `keys`. Groups are sorted by key and rows
    /// with a missing key are dropped.
    pub fn group_by(&self, keys: &[String]) -> Result<Groups, FrameError> {
        let key_cols: Vec<&Column> = keys
            .iter()
            .map(|k| self.column_ref(k))
            .collect::<Result<_, _>>()?;
        let mut slots: HashMap<Vec<super::cell::CellKey>, usize> = HashMap::new();
        let mut groups: Vec<(Vec<Cell>, Vec<usize>)> = Vec::new();
        for row in 0..self.nrows() {
            let label: Vec<Cell> = key_cols.iter().map(|c| c.values[row].clone()).collect();
            if label.iter().any(Cell::is_missing) {
                continue;
            }
            let key: Vec<_> = label.iter().map(Cell::key).collect();
            let slot = *slots.entry(key).or_insert_with(|| {
                groups.push((label, Vec::new()));
                groups.len() - 1
            });
            groups[slot].1.push(row);
        }
        groups.sort_by(|a, b| cmp_labels(&a.0, &b.0));
        Ok(Groups {
            table: self.clone(),
            keys: keys.to_vec(),
            groups,
        })
    }

    /// Stack tables vertically. Columns are unioned; absent cells are
    /// missing. The index is renumbered when `ignore_index` is set.
    pub fn concat(tables: &[Table], ignore_index: bool) -> Result<Table, FrameError> {
        let mut names: Vec<String> = Vec::new();
        for t in tables {
            for c in &t.columns {
                if !names.contains(&c.name) {
                    names.push(c.name.clone());
                }
            }
        }
        let total: usize = tables.iter().map(Table::nrows).sum();
        let mut columns: Vec<(String, Vec<Cell>)> = names
            .iter()
            .map(|n| (n.clone(), Vec::with_capacity(total)))
            .collect();
        let mut labels = Vec::with_capacity(total);
        for t in tables {
            for (name, values) in columns.iter_mut() {
                match t.column_ref(name) {
                    Ok(col) => values.extend(col.values.iter().cloned()),
                    Err(_) => values.extend(std::iter::repeat(Cell::Null).take(t.nrows())),
                }
            }
            labels.extend(t.index.labels.iter().cloned());
        }
        let index = if ignore_index {
            Index::range(total)
        } else {
            Index {
                names: vec![None],
                labels,
            }
        };
        Table::with_index(columns, index)
    }
}

fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let pairs: Vec<(f64, f64)> = xs
        .iter()
        .zip(ys)
        .filter(|(x, y)| !x.is_nan() && !y.is_nan())
        .map(|(x, y)| (*x, *y))
        .collect();
    let n = pairs.len() as f64;
    if pairs.len() < 2 {
        return f64::NAN;
    }
    let mx = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let my = pairs.iter().map(|p| p.1).sum::<f64>() / n;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in &pairs {
        sxy += (x - mx) * (y - my);
        sxx += (x - mx).powi(2);
        syy += (y - my).powi(2);
    }
    sxy / (sxx * syy).sqrt()
}

// ---------------------------------------------------------------------------
// Group-by
// ---------------------------------------------------------------------------

/// One aggregation in a group-by `agg` call.
#[derive(Debug, Clone, PartialEq)]
pub struct AggSpec {
    pub column: String,
    pub agg: Agg,
    pub output: String,
}

/// Rows of a table partitioned by key.
#[derive(Debug, Clone, PartialEq)]
pub struct Groups {
    pub table: Table,
    pub keys: Vec<String>,
    pub groups: Vec<(Vec<Cell>, Vec<usize>)>,
}

impl Groups {
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    fn key_index(&self) -> Index {
        Index {
            names: self.keys.iter().cloned().map(Some).collect(),
            labels: self.groups.iter().map(|(label, _)| label.clone()).collect(),
        }
    }

    /// Reduce one column per group.
    pub fn aggregate_column(&self, column: &str, agg: Agg) -> Result<Series, FrameError> {
        let series = self.table.column(column)?;
        let values = self
            .groups
            .iter()
            .map(|(_, rows)| series.take(rows).aggregate(agg))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Series::with_index(Some(column.to_string()), values, self.key_index()))
    }

    /// Several reductions at once, one output column each.
    pub fn aggregate(&self, specs: &[AggSpec]) -> Result<Table, FrameError> {
        let mut columns = Vec::with_capacity(specs.len());
        for spec in specs {
            let series = self.aggregate_column(&spec.column, spec.agg)?;
            columns.push((spec.output.clone(), series.values));
        }
        Table::with_index(columns, self.key_index())
    }

    /// Apply `agg` to every non-key column that supports it.
    pub fn aggregate_all(&self, agg: Agg) -> Result<Table, FrameError> {
        let mut columns = Vec::new();
        for col in &self.table.columns {
            if self.keys.contains(&col.name) {
                continue;
            }
            match self.aggregate_column(&col.name, agg) {
                Ok(series) => columns.push((col.name.clone(), series.values)),
                Err(FrameError::TypeError(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Table::with_index(columns, self.key_index())
    }

    pub fn size(&self) -> Series {
        let values = self
            .groups
            .iter()
            .map(|(_, rows)| Cell::Int(rows.len() as i64))
            .collect();
        Series::with_index(None, values, self.key_index())
    }

    /// Rows belonging to the group labelled `label`.
    pub fn get_group(&self, label: &[Cell]) -> Result<Table, FrameError> {
        self.groups
            .iter()
            .find(|(l, _)| l.len() == label.len() && l.iter().zip(label).all(|(a, b)| a.group_eq(b)))
            .map(|(_, rows)| self.table.take(rows))
            .ok_or_else(|| {
                let parts: Vec<String> = label.iter().map(|c| c.to_string()).collect();
                FrameError::KeyError(parts.join(", "))
            })
    }

    /// Restrict the aggregated columns to `columns`.
    pub fn select(&self, columns: &[String]) -> Result<Groups, FrameError> {
        let mut names = self.keys.clone();
        for c in columns {
            if !names.contains(c) {
                names.push(c.clone());
            }
        }
        Ok(Groups {
            table: self.table.select(&names)?,
            keys: self.keys.clone(),
            groups: self.groups.clone(),
        })
    }
}
