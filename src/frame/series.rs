// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

use super::cell::{distinct, Cell, DType};
use super::error::FrameError;
use super::index::Index;
use super::ops::{arith, compare, ArithOp, CmpOp};

/// A labelled one-dimensional column of cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub name: Option<String>,
    pub values: Vec<Cell>,
    pub index: Index,
    pub dtype: DType,
}

/// Reductions shared by series and group-by aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Agg {
    Sum,
    Mean,
    Median,
    Min,
    Max,
    Count,
    Size,
    Std,
    Var,
    Nunique,
    First,
    Last,
}

impl Agg {
    pub fn parse(name: &str) -> Option<Agg> {
        Some(match name {
            "sum" => Agg::Sum,
            "mean" | "average" => Agg::Mean,
            "median" => Agg::Median,
            "min" => Agg::Min,
            "max" => Agg::Max,
            "count" => Agg::Count,
            "size" => Agg::Size,
            "std" => Agg::Std,
            "var" => Agg::Var,
            "nunique" => Agg::Nunique,
            "first" => Agg::First,
            "last" => Agg::Last,
            _ => return None,
        })
    }
}

impl Series {
    /// Build a series with the default index, inferring its dtype.
    pub fn new(name: Option<String>, values: Vec<Cell>) -> Self {
        let index = Index::range(values.len());
        Self::with_index(name, values, index)
    }

    pub fn with_index(name: Option<String>, mut values: Vec<Cell>, index: Index) -> Self {
        let dtype = DType::infer(&values);
        dtype.normalize(&mut values);
        Self {
            name,
            values,
            index,
            dtype,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// A new series holding `values` under this series' name and index.
    pub fn derive(&self, values: Vec<Cell>) -> Series {
        Series::with_index(self.name.clone(), values, self.index.clone())
    }

    pub fn take(&self, positions: &[usize]) -> Series {
        Series {
            name: self.name.clone(),
            values: positions.iter().map(|&p| self.values[p].clone()).collect(),
            index: self.index.take(positions),
            dtype: self.dtype,
        }
    }

    pub fn head(&self, n: usize) -> Series {
        let positions: Vec<usize> = (0..n.min(self.len())).collect();
        self.take(&positions)
    }

    pub fn tail(&self, n: usize) -> Series {
        let start = self.len().saturating_sub(n);
        let positions: Vec<usize> = (start..self.len()).collect();
        self.take(&positions)
    }

    pub fn filter(&self, mask: &[bool]) -> Result<Series, FrameError> {
        if mask.len() != self.len() {
            return Err(FrameError::LengthMismatch {
                expected: self.len(),
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

    /// Value at the position holding `label` in a single-level index.
    pub fn get_label(&self, label: &Cell) -> Option<&Cell> {
        self.index
            .position_of(std::slice::from_ref(label))
            .map(|p| &self.values[p])
    }

    fn present(&self) -> impl Iterator<Item = &Cell> {
        self.values.iter().filter(|c| !c.is_missing())
    }

    fn numbers(&self, op: &str) -> Result<Vec<f64>, FrameError> {
        self.present()
            .map(|c| {
                c.as_f64().ok_or_else(|| {
                    FrameError::TypeError(format!(
                        "cannot compute {op} of non-numeric column {}",
                        self.name.as_deref().unwrap_or("<unnamed>")
                    ))
                })
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Reductions
    // ------------------------------------------------------------------

    pub fn sum(&self) -> Result<Cell, FrameError> {
        match self.dtype {
            DType::Int64 | DType::Bool => {
                let mut total: i64 = 0;
                for cell in self.present() {
                    total = total.saturating_add(match cell {
                        Cell::Int(i) => *i,
                        Cell::Bool(b) => i64::from(*b),
                        _ => 0,
                    });
                }
                Ok(Cell::Int(total))
            }
            DType::Object if self.present().all(|c| matches!(c, Cell::Str(_))) => {
                if self.present().next().is_none() {
                    return Ok(Cell::Int(0));
                }
                Ok(Cell::Str(self.present().map(|c| c.to_string()).collect()))
            }
            DType::Timedelta => {
                let mut total = chrono::Duration::zero();
                for cell in self.present() {
                    if let Cell::Timedelta(d) = cell {
                        total += *d;
                    }
                }
                Ok(Cell::Timedelta(total))
            }
            _ => Ok(Cell::Float(self.numbers("sum")?.iter().sum())),
        }
    }

    pub fn mean(&self) -> Result<f64, FrameError> {
        let nums = self.numbers("mean")?;
        if nums.is_empty() {
            return Ok(f64::NAN);
        }
        Ok(nums.iter().sum::<f64>() / nums.len() as f64)
    }

    pub fn median(&self) -> Result<f64, FrameError> {
        self.quantile(0.5)
    }

    /// Linear-interpolated quantile, `q` in [0, 1].
    pub fn quantile(&self, q: f64) -> Result<f64, FrameError> {
        if !(0.0..=1.0).contains(&q) {
            return Err(FrameError::ValueError(
                "percentiles should all be in the interval [0, 1]".into(),
            ));
        }
        let mut nums = self.numbers("quantile")?;
        if nums.is_empty() {
            return Ok(f64::NAN);
        }
        nums.sort_by(|a, b| a.total_cmp(b));
        let pos = q * (nums.len() - 1) as f64;
        let lo = pos.floor() as usize;
        let hi = pos.ceil() as usize;
        Ok(nums[lo] + (nums[hi] - nums[lo]) * (pos - lo as f64))
    }

    pub fn var(&self) -> Result<f64, FrameError> {
        let nums = self.numbers("var")?;
        if nums.len() < 2 {
            return Ok(f64::NAN);
        }
        let mean = nums.iter().sum::<f64>() / nums.len() as f64;
        let ss: f64 = nums.iter().map(|x| (x - mean).powi(2)).sum();
        Ok(ss / (nums.len() - 1) as f64)
    }

    pub fn std(&self) -> Result<f64, FrameError> {
        Ok(self.var()?.sqrt())
    }

    fn extreme(&self, want_max: bool) -> Cell {
        let mut best: Option<&Cell> = None;
        for cell in self.present() {
            best = match best {
                None => Some(cell),
                Some(current) => {
                    let ord = cell.total_cmp(current);
                    if (want_max && ord.is_gt()) || (!want_max && ord.is_lt()) {
                        Some(cell)
                    } else {
                        Some(current)
                    }
                }
            };
        }
        match best {
            Some(cell) => cell.clone(),
            None if self.dtype == DType::DateTime => Cell::NaT,
            None => Cell::Float(f64::NAN),
        }
    }

    pub fn min(&self) -> Cell {
        self.extreme(false)
    }

    pub fn max(&self) -> Cell {
        self.extreme(true)
    }

    pub fn count(&self) -> usize {
        self.present().count()
    }

    pub fn nunique(&self) -> usize {
        distinct(&self.values)
            .iter()
            .filter(|(c, _)| !c.is_missing())
            .count()
    }

    pub fn unique(&self) -> Vec<Cell> {
        distinct(&self.values).into_iter().map(|(c, _)| c).collect()
    }

    /// Reduce with `agg` to a single cell.
    pub fn aggregate(&self, agg: Agg) -> Result<Cell, FrameError> {
        Ok(match agg {
            Agg::Sum => self.sum()?,
            Agg::Mean => Cell::Float(self.mean()?),
            Agg::Median => Cell::Float(self.median()?),
            Agg::Min => self.min(),
            Agg::Max => self.max(),
            Agg::Count => Cell::Int(self.count() as i64),
            Agg::Size => Cell::Int(self.len() as i64),
            Agg::Std => Cell::Float(self.std()?),
            Agg::Var => Cell::Float(self.var()?),
            Agg::Nunique => Cell::Int(self.nunique() as i64),
            Agg::First => self.present().next().cloned().unwrap_or(Cell::Null),
            Agg::Last => self.present().last().cloned().unwrap_or(Cell::Null),
        })
    }

    /// Position of the largest (or smallest) present value.
    pub fn arg_extreme(&self, want_max: bool) -> Option<usize> {
        let target = self.extreme(want_max);
        if target.is_missing() {
            return None;
        }
        self.values.iter().position(|c| c.group_eq(&target))
    }

    // ------------------------------------------------------------------
    // Transformations
    // ------------------------------------------------------------------

    /// Counts of each distinct value, most frequent first.
    pub fn value_counts(&self, normalize: bool, ascending: bool, dropna: bool) -> Series {
        let mut groups: Vec<(Cell, usize)> = distinct(&self.values)
            .into_iter()
            .filter(|(c, _)| !(dropna && c.is_missing()))
            .map(|(c, positions)| (c, positions.len()))
            .collect();
        // stable: ties keep first-appearance order
        if ascending {
            groups.sort_by(|a, b| a.1.cmp(&b.1));
        } else {
            groups.sort_by(|a, b| b.1.cmp(&a.1));
        }
        let total: usize = groups.iter().map(|(_, n)| n).sum();
        let (labels, counts): (Vec<Cell>, Vec<usize>) = groups.into_iter().unzip();
        let values = if normalize {
            counts
                .iter()
                .map(|&n| Cell::Float(n as f64 / total.max(1) as f64))
                .collect()
        } else {
            counts.iter().map(|&n| Cell::Int(n as i64)).collect()
        };
        Series::with_index(
            Some(if normalize { "proportion" } else { "count" }.to_string()),
            values,
            Index::from_cells(self.name.clone(), labels),
        )
    }

    pub fn sort_values(&self, ascending: bool) -> Series {
        let mut positions: Vec<usize> = (0..self.len()).collect();
        positions.sort_by(|&a, &b| {
            let (x, y) = (&self.values[a], &self.values[b]);
            match (x.is_missing(), y.is_missing()) {
                (false, false) if !ascending => y.total_cmp(x),
                _ => x.total_cmp(y),
            }
        });
        self.take(&positions)
    }

    pub fn sort_index(&self, ascending: bool) -> Series {
        let mut positions: Vec<usize> = (0..self.len()).collect();
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

    pub fn nlargest(&self, n: usize) -> Series {
        let sorted = self.sort_values(false);
        let keep: Vec<usize> = (0..sorted.len())
            .filter(|&i| !sorted.values[i].is_missing())
            .take(n)
            .collect();
        sorted.take(&keep)
    }

    pub fn nsmallest(&self, n: usize) -> Series {
        let sorted = self.sort_values(true);
        let keep: Vec<usize> = (0..sorted.len())
            .filter(|&i| !sorted.values[i].is_missing())
            .take(n)
            .collect();
        sorted.take(&keep)
    }

    pub fn isnull(&self) -> Series {
        self.derive(self.values.iter().map(|c| Cell::Bool(c.is_missing())).collect())
    }

    pub fn notnull(&self) -> Series {
        self.derive(self.values.iter().map(|c| Cell::Bool(!c.is_missing())).collect())
    }

    pub fn fillna(&self, fill: &Cell) -> Series {
        self.derive(
            self.values
                .iter()
                .map(|c| if c.is_missing() { fill.clone() } else { c.clone() })
                .collect(),
        )
    }

    pub fn dropna(&self) -> Series {
        let positions: Vec<usize> = (0..self.len())
            .filter(|&i| !self.values[i].is_missing())
            .collect();
        self.take(&positions)
    }

    pub fn cumsum(&self) -> Result<Series, FrameError> {
        let mut acc = Cell::Int(0);
        let mut out = Vec::with_capacity(self.len());
        for cell in &self.values {
            if cell.is_missing() {
                out.push(Cell::Float(f64::NAN));
                continue;
            }
            acc = arith(ArithOp::Add, &acc, cell)?;
            out.push(acc.clone());
        }
        Ok(self.derive(out))
    }

    pub fn round(&self, decimals: i32) -> Series {
        let factor = 10f64.powi(decimals);
        self.derive(
            self.values
                .iter()
                .map(|c| match c {
                    Cell::Float(f) => Cell::Float((f * factor).round() / factor),
                    other => other.clone(),
                })
                .collect(),
        )
    }

    pub fn abs(&self) -> Result<Series, FrameError> {
        let out = self
            .values
            .iter()
            .map(|c| match c {
                Cell::Int(i) => Ok(Cell::Int(i.abs())),
                Cell::Float(f) => Ok(Cell::Float(f.abs())),
                Cell::Null => Ok(Cell::Null),
                other => Err(FrameError::TypeError(format!(
                    "bad operand type for abs(): '{}'",
                    other.type_name()
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.derive(out))
    }

    pub fn isin(&self, candidates: &[Cell]) -> Series {
        let keys: std::collections::HashSet<_> = candidates.iter().map(|c| c.key()).collect();
        self.derive(
            self.values
                .iter()
                .map(|c| Cell::Bool(!c.is_missing() && keys.contains(&c.key())))
                .collect(),
        )
    }

    pub fn between(&self, low: &Cell, high: &Cell) -> Result<Series, FrameError> {
        let out = self
            .values
            .iter()
            .map(|c| {
                Ok(Cell::Bool(
                    compare(CmpOp::Ge, c, low)? && compare(CmpOp::Le, c, high)?,
                ))
            })
            .collect::<Result<Vec<_>, FrameError>>()?;
        Ok(self.derive(out))
    }

    /// Cast every value to the named dtype (`"int"`, `"float"`, `"str"`, ...).
    pub fn astype(&self, target: &str) -> Result<Series, FrameError> {
        let out = self
            .values
            .iter()
            .map(|c| cast_cell(c, target))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.derive(out))
    }

    /// Element-wise arithmetic against another series (by position) or a
    /// scalar broadcast.
    pub fn arith_series(&self, op: ArithOp, other: &Series) -> Result<Series, FrameError> {
        self.check_len(other)?;
        let out = self
            .values
            .iter()
            .zip(&other.values)
            .map(|(a, b)| arith(op, a, b))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.derive(out))
    }

    pub fn arith_scalar(&self, op: ArithOp, scalar: &Cell, reflected: bool) -> Result<Series, FrameError> {
        let out = self
            .values
            .iter()
            .map(|a| if reflected { arith(op, scalar, a) } else { arith(op, a, scalar) })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.derive(out))
    }

    pub fn compare_series(&self, op: CmpOp, other: &Series) -> Result<Series, FrameError> {
        self.check_len(other)?;
        let out = self
            .values
            .iter()
            .zip(&other.values)
            .map(|(a, b)| compare(op, a, b).map(Cell::Bool))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.derive(out))
    }

    pub fn compare_scalar(&self, op: CmpOp, scalar: &Cell, reflected: bool) -> Result<Series, FrameError> {
        let out = self
            .values
            .iter()
            .map(|a| {
                let r = if reflected { compare(op, scalar, a) } else { compare(op, a, scalar) };
                r.map(Cell::Bool)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.derive(out))
    }

    /// Boolean combination for masks (`&`, `|`, `^`).
    pub fn logical(&self, other: &Series, op: char) -> Result<Series, FrameError> {
        self.check_len(other)?;
        let out = self
            .values
            .iter()
            .zip(&other.values)
            .map(|(a, b)| {
                let (x, y) = (a.truthy(), b.truthy());
                Cell::Bool(match op {
                    '&' => x && y,
                    '|' => x || y,
                    _ => x ^ y,
                })
            })
            .collect();
        Ok(self.derive(out))
    }

    pub fn invert(&self) -> Result<Series, FrameError> {
        let out = self
            .values
            .iter()
            .map(|c| match c {
                Cell::Bool(b) => Ok(Cell::Bool(!b)),
                Cell::Int(i) => Ok(Cell::Int(!i)),
                other => Err(FrameError::TypeError(format!(
                    "bad operand type for unary ~: '{}'",
                    other.type_name()
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.derive(out))
    }

    pub fn negate(&self) -> Result<Series, FrameError> {
        self.arith_scalar(ArithOp::Mul, &Cell::Int(-1), false)
    }

    /// The series as a boolean mask.
    pub fn as_mask(&self) -> Result<Vec<bool>, FrameError> {
        self.values
            .iter()
            .map(|c| match c {
                Cell::Bool(b) => Ok(*b),
                Cell::Null => Ok(false),
                other => Err(FrameError::ValueError(format!(
                    "cannot mask with non-boolean value of type '{}'",
                    other.type_name()
                ))),
            })
            .collect()
    }

    fn check_len(&self, other: &Series) -> Result<(), FrameError> {
        if self.len() != other.len() {
            return Err(FrameError::LengthMismatch {
                expected: self.len(),
                got: other.len(),
            });
        }
        Ok(())
    }
}

pub(crate) fn cmp_labels(a: &[Cell], b: &[Cell]) -> std::cmp::Ordering {
    for (x, y) in a.iter().zip(b) {
        let ord = x.total_cmp(y);
        if ord.is_ne() {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}

/// Cast one cell the way `astype` does.
pub fn cast_cell(cell: &Cell, target: &str) -> Result<Cell, FrameError> {
    if cell.is_missing() && target != "str" {
        return Ok(match target {
            "datetime64[ns]" | "datetime64" => Cell::NaT,
            "float" | "float64" => Cell::Float(f64::NAN),
            _ => cell.clone(),
        });
    }
    let fail = || {
        FrameError::ValueError(format!(
            "could not convert {} '{}' to {target}",
            cell.type_name(),
            cell
        ))
    };
    Ok(match target {
        "str" | "string" | "object" => match cell {
            Cell::Str(_) => cell.clone(),
            Cell::Null if target == "object" => Cell::Null,
            other => Cell::Str(other.to_string()),
        },
        "int" | "int64" | "int32" => match cell {
            Cell::Int(_) => cell.clone(),
            Cell::Bool(b) => Cell::Int(i64::from(*b)),
            Cell::Float(f) => Cell::Int(f.trunc() as i64),
            Cell::Str(s) => Cell::Int(s.trim().parse::<i64>().map_err(|_| fail())?),
            _ => return Err(fail()),
        },
        "float" | "float64" | "float32" => match cell {
            Cell::Str(s) => Cell::Float(s.trim().parse::<f64>().map_err(|_| fail())?),
            other => Cell::Float(other.as_f64().ok_or_else(fail)?),
        },
        "bool" => Cell::Bool(cell.truthy()),
        "datetime64[ns]" | "datetime64" => match cell {
            Cell::DateTime(_) => cell.clone(),
            Cell::Str(s) => Cell::DateTime(super::cell::parse_datetime(s).ok_or_else(fail)?),
            _ => return Err(fail()),
        },
        "category" => cell.clone(),
        other => {
            return Err(FrameError::TypeError(format!(
                "data type '{other}' not understood"
            )))
        }
    })
}
