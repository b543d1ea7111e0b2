// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// numpy stand-in: one-dimensional arrays of cells plus the common
// element-wise and reduction functions.

use crate::frame::{distinct, Cell, DType, FrameError, Series};

use super::interp::Interpreter;
use super::pandas::{cells_of, combine, map_cells, scalar_cell};
use super::value::{Args, Exception, Res, Value, MAX_SEQUENCE_LEN};

const ARRAY_METHODS: &[&str] = &[
    "tolist", "mean", "sum", "min", "max", "std", "var", "round", "astype", "argmax", "argmin",
    "cumsum", "copy", "flatten", "any", "all", "item", "prod", "clip", "sort",
];

/// Upper bound on arrays built from `arange`, `linspace` and `zeros`.
const MAX_ARRAY_LEN: usize = MAX_SEQUENCE_LEN;

pub(crate) fn call_function(interp: &mut Interpreter, func: &str, args: Args) -> Res<Value> {
    match func {
        "array" | "asarray" => {
            let data = args.require(0, "object", func)?;
            if let Value::List(items) = data {
                if items.borrow().iter().any(|i| matches!(i, Value::List(_) | Value::Tuple(_))) {
                    return Err(Exception::value_error(
                        "only one-dimensional arrays are supported",
                    ));
                }
            }
            let cells = match data {
                Value::Frame(_) => {
                    return Err(Exception::value_error(
                        "only one-dimensional arrays are supported",
                    ))
                }
                other => cells_of(other)?,
            };
            let cells = match args.kw("dtype") {
                Some(dtype) => cast_all(&cells, &super::pandas::dtype_name(dtype)?)?,
                None => cells,
            };
            Ok(Value::array(cells))
        }
        "float64" | "int64" => {
            let v = args.require(0, "x", func)?;
            let target = if func == "float64" { "float64" } else { "int64" };
            match v {
                Value::Series(_) | Value::Array(_) | Value::List(_) => {
                    Ok(Value::array(cast_all(&cells_of(v)?, target)?))
                }
                scalar => Ok(Value::from_cell(&crate::frame::cast_cell(&scalar_cell(scalar)?, target)?)),
            }
        }
        "ndarray" => Err(Exception::type_error("cannot construct ndarray directly; use np.array")),
        "mean" | "median" | "sum" | "std" | "var" | "min" | "max" | "prod" | "nanmean" | "nansum"
        | "argmax" | "argmin" => {
            let v = args.require(0, "a", func)?;
            let ddof = args.int_or(usize::MAX, "ddof", 0)?;
            reduce(func, v, ddof)
        }
        "percentile" => {
            let v = args.require(0, "a", func)?;
            let q = args.require(1, "q", func)?;
            let series = Series::new(None, cells_of(v)?);
            match q {
                Value::List(_) | Value::Tuple(_) | Value::Array(_) => {
                    let qs = cells_of(q)?;
                    let mut out = Vec::with_capacity(qs.len());
                    for q in qs {
                        out.push(Cell::Float(series.quantile(q.as_f64().unwrap_or(50.0) / 100.0)?));
                    }
                    Ok(Value::array(out))
                }
                q => Ok(Value::Float(series.quantile(q.as_f64().unwrap_or(50.0) / 100.0)?)),
            }
        }
        "sqrt" => unary(&args, func, f64::sqrt),
        "log" => unary(&args, func, f64::ln),
        "log10" => unary(&args, func, f64::log10),
        "log2" => unary(&args, func, f64::log2),
        "exp" => unary(&args, func, f64::exp),
        "floor" => unary(&args, func, f64::floor),
        "ceil" => unary(&args, func, f64::ceil),
        "abs" => {
            let v = args.require(0, "x", func)?;
            map_cells(v, |c| match c {
                Cell::Int(i) => Ok(Cell::Int(i.abs())),
                other => float_cell(other, f64::abs),
            })
        }
        "round" => {
            let decimals = args.int_or(1, "decimals", 0)? as i32;
            let factor = 10f64.powi(decimals);
            map_cells(args.require(0, "a", func)?, move |c| match c {
                Cell::Int(i) if decimals >= 0 => Ok(Cell::Int(*i)),
                other => float_cell(other, |x| (x * factor).round_ties_even() / factor),
            })
        }
        "isnan" => map_cells(args.require(0, "x", func)?, |c| Ok(Cell::Bool(c.is_missing()))),
        "cumsum" => {
            let series = Series::new(None, cells_of(args.require(0, "a", func)?)?);
            Ok(Value::array(series.cumsum()?.values))
        }
        "clip" => {
            let lo = args.opt(1, "a_min").and_then(Value::as_f64);
            let hi = args.opt(2, "a_max").and_then(Value::as_f64);
            map_cells(args.require(0, "a", func)?, move |c| clip(c, lo, hi))
        }
        "arange" => arange(&args),
        "linspace" => {
            let start = number_arg(&args, 0, "start")?;
            let stop = number_arg(&args, 1, "stop")?;
            let n = args.int_or(2, "num", 50)?.max(0) as usize;
            if n > MAX_ARRAY_LEN {
                return Err(Exception::value_error("array is too big"));
            }
            let step = if n > 1 { (stop - start) / (n - 1) as f64 } else { 0.0 };
            Ok(Value::array((0..n).map(|i| Cell::Float(start + step * i as f64)).collect()))
        }
        "zeros" | "ones" => {
            let n = args.int_or(0, "shape", 0)?.max(0) as usize;
            if n > MAX_ARRAY_LEN {
                return Err(Exception::value_error("array is too big"));
            }
            let fill = if func == "zeros" { 0.0 } else { 1.0 };
            Ok(Value::array(vec![Cell::Float(fill); n]))
        }
        "where" => where_(interp, &args),
        "unique" => {
            let mut cells: Vec<Cell> = distinct(&cells_of(args.require(0, "ar", func)?)?)
                .into_iter()
                .map(|(c, _)| c)
                .collect();
            cells.sort_by(|a, b| a.total_cmp(b));
            Ok(Value::array(cells))
        }
        "maximum" | "minimum" => {
            let want_max = func == "maximum";
            combine(
                args.require(0, "x1", func)?,
                args.require(1, "x2", func)?,
                move |x: &Cell, y: &Cell| {
                    if x.is_missing() || y.is_missing() {
                        return Ok(Cell::Float(f64::NAN));
                    }
                    let x_wins = x.total_cmp(y).is_ge() == want_max;
                    Ok(if x_wins { x.clone() } else { y.clone() })
                },
            )
        }
        "corrcoef" => {
            let x = numbers(&cells_of(args.require(0, "x", func)?)?)?;
            let y = numbers(&cells_of(args.require(1, "y", func)?)?)?;
            if x.len() != y.len() {
                return Err(Exception::value_error("all the input array dimensions must match"));
            }
            let r = pearson(&x, &y);
            let row = |a: f64, b: f64| Value::array(vec![Cell::Float(a), Cell::Float(b)]);
            Ok(Value::list(vec![row(1.0, r), row(r, 1.0)]))
        }
        other => Err(Exception::new(
            "AttributeError",
            format!("module 'numpy' has no attribute '{other}'"),
        )),
    }
}

fn number_arg(args: &Args, i: usize, name: &str) -> Res<f64> {
    args.require(i, name, "numpy")?
        .as_f64()
        .ok_or_else(|| Exception::type_error(format!("'{name}' must be a number")))
}

fn float_cell(c: &Cell, f: impl Fn(f64) -> f64) -> Result<Cell, FrameError> {
    match c.as_f64() {
        Some(x) => Ok(Cell::Float(f(x))),
        None if c.is_missing() => Ok(Cell::Float(f64::NAN)),
        None => Err(FrameError::TypeError(format!(
            "ufunc not supported for the input type '{}'",
            c.type_name()
        ))),
    }
}

fn unary(args: &Args, func: &str, f: fn(f64) -> f64) -> Res<Value> {
    map_cells(args.require(0, "x", func)?, move |c| float_cell(c, f))
}

fn clip(c: &Cell, lo: Option<f64>, hi: Option<f64>) -> Result<Cell, FrameError> {
    let Some(x) = c.as_f64().filter(|_| !c.is_missing()) else {
        return Ok(c.clone());
    };
    let clipped = hi.map_or(x, |h| x.min(h));
    let clipped = lo.map_or(clipped, |l| clipped.max(l));
    Ok(match c {
        Cell::Int(_) if clipped.fract() == 0.0 => Cell::Int(clipped as i64),
        _ => Cell::Float(clipped),
    })
}

fn cast_all(cells: &[Cell], target: &str) -> Res<Vec<Cell>> {
    Ok(cells
        .iter()
        .map(|c| crate::frame::cast_cell(c, target))
        .collect::<Result<Vec<_>, _>>()?)
}

/// Present values as floats; NaN stands in for missing.
fn numbers(cells: &[Cell]) -> Res<Vec<f64>> {
    cells
        .iter()
        .map(|c| {
            if c.is_missing() {
                return Ok(f64::NAN);
            }
            c.as_f64().ok_or_else(|| {
                Exception::type_error(format!(
                    "unsupported operand type for numeric reduction: '{}'",
                    c.type_name()
                ))
            })
        })
        .collect()
}

fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len() as f64;
    if xs.len() < 2 {
        return f64::NAN;
    }
    let mx = xs.iter().sum::<f64>() / n;
    let my = ys.iter().sum::<f64>() / n;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        sxy += (x - mx) * (y - my);
        sxx += (x - mx).powi(2);
        syy += (y - my).powi(2);
    }
    sxy / (sxx * syy).sqrt()
}

/// Reductions. Series arguments skip missing values the way pandas does;
/// arrays and lists propagate NaN unless the `nan*` variant is used.
fn reduce(func: &str, v: &Value, ddof: i64) -> Res<Value> {
    if let Value::Series(s) = v {
        let s = s.borrow();
        return Ok(match func {
            "mean" | "nanmean" => Value::Float(s.mean()?),
            "median" => Value::Float(s.median()?),
            "sum" | "nansum" => Value::from_cell(&s.sum()?),
            "min" => Value::from_cell(&s.min()),
            "max" => Value::from_cell(&s.max()),
            "std" | "var" => {
                let xs: Vec<f64> = numbers(&s.values)?.into_iter().filter(|x| !x.is_nan()).collect();
                Value::Float(spread(&xs, ddof, func == "std"))
            }
            _ => reduce_cells(func, &s.values, ddof)?,
        });
    }
    reduce_cells(func, &cells_of(v)?, ddof)
}

fn spread(xs: &[f64], ddof: i64, root: bool) -> f64 {
    let n = xs.len() as f64 - ddof as f64;
    if n <= 0.0 {
        return f64::NAN;
    }
    let mean = xs.iter().sum::<f64>() / xs.len() as f64;
    let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    if root {
        var.sqrt()
    } else {
        var
    }
}

fn reduce_cells(func: &str, cells: &[Cell], ddof: i64) -> Res<Value> {
    let all_int = !cells.is_empty() && cells.iter().all(|c| matches!(c, Cell::Int(_) | Cell::Bool(_)));
    match func {
        "argmax" | "argmin" => {
            let series = Series::new(None, cells.to_vec());
            return Ok(match series.arg_extreme(func == "argmax") {
                Some(p) => Value::Int(p as i64),
                None => Value::Int(0),
            });
        }
        "min" | "max" if cells.iter().any(|c| !c.is_numeric() && !c.is_missing()) => {
            let present = cells.iter().filter(|c| !c.is_missing());
            let best = if func == "max" {
                present.max_by(|a, b| a.total_cmp(b))
            } else {
                present.min_by(|a, b| a.total_cmp(b))
            };
            return best
                .map(Value::from_cell)
                .ok_or_else(|| Exception::value_error("zero-size array to reduction operation"));
        }
        _ => {}
    }
    let xs = numbers(cells)?;
    let skip_nan = func.starts_with("nan");
    let xs: Vec<f64> = if skip_nan {
        xs.into_iter().filter(|x| !x.is_nan()).collect()
    } else {
        xs
    };
    Ok(match func {
        "sum" | "nansum" if all_int => Value::Int(cells.iter().filter_map(Cell::as_f64).map(|x| x as i64).sum()),
        "sum" | "nansum" => Value::Float(xs.iter().sum()),
        "prod" if all_int => Value::Int(
            cells
                .iter()
                .filter_map(Cell::as_f64)
                .fold(1i64, |acc, x| acc.wrapping_mul(x as i64)),
        ),
        "prod" => Value::Float(xs.iter().product()),
        "mean" | "nanmean" => {
            if xs.is_empty() {
                Value::Float(f64::NAN)
            } else {
                Value::Float(xs.iter().sum::<f64>() / xs.len() as f64)
            }
        }
        "median" => {
            if xs.iter().any(|x| x.is_nan()) || xs.is_empty() {
                Value::Float(f64::NAN)
            } else {
                Value::Float(Series::new(None, xs.iter().map(|x| Cell::Float(*x)).collect()).median()?)
            }
        }
        "std" | "var" => Value::Float(spread(&xs, ddof, func == "std")),
        "min" | "max" => {
            if xs.is_empty() {
                return Err(Exception::value_error(format!(
                    "zero-size array to reduction operation {func} which has no identity"
                )));
            }
            let best = if xs.iter().any(|x| x.is_nan()) {
                f64::NAN
            } else if func == "max" {
                xs.iter().copied().fold(f64::NEG_INFINITY, f64::max)
            } else {
                xs.iter().copied().fold(f64::INFINITY, f64::min)
            };
            if all_int {
                Value::Int(best as i64)
            } else {
                Value::Float(best)
            }
        }
        other => return Err(Exception::attribute_error("ndarray", other)),
    })
}

fn arange(args: &Args) -> Res<Value> {
    let nums: Vec<&Value> = args.pos.iter().collect();
    let all_int = nums.iter().all(|v| matches!(v, Value::Int(_)));
    let as_f = |v: &Value| v.as_f64().ok_or_else(|| Exception::type_error("arange() arguments must be numbers"));
    let (start, stop, step) = match nums.as_slice() {
        [stop] => (0.0, as_f(stop)?, 1.0),
        [start, stop] => (as_f(start)?, as_f(stop)?, 1.0),
        [start, stop, step] => (as_f(start)?, as_f(stop)?, as_f(step)?),
        _ => return Err(Exception::type_error("arange() requires 1 to 3 positional arguments")),
    };
    if step == 0.0 {
        return Err(Exception::new("ZeroDivisionError", "division by zero"));
    }
    let n = ((stop - start) / step).ceil().max(0.0) as usize;
    if n > MAX_ARRAY_LEN {
        return Err(Exception::value_error("array is too big"));
    }
    Ok(Value::array(
        (0..n)
            .map(|i| {
                let x = start + step * i as f64;
                if all_int {
                    Cell::Int(x as i64)
                } else {
                    Cell::Float(x)
                }
            })
            .collect(),
    ))
}

fn where_(_interp: &mut Interpreter, args: &Args) -> Res<Value> {
    let cond = cells_of(args.require(0, "condition", "where")?)?;
    let (Some(x), Some(y)) = (args.pos.get(1), args.pos.get(2)) else {
        let positions = cond
            .iter()
            .enumerate()
            .filter(|(_, c)| c.truthy())
            .map(|(i, _)| Cell::Int(i as i64))
            .collect();
        return Ok(Value::tuple(vec![Value::array(positions)]));
    };
    let pick = |v: &Value, i: usize| -> Res<Cell> {
        match v {
            Value::Series(_) | Value::Array(_) | Value::List(_) | Value::Tuple(_) => cells_of(v)?
                .get(i)
                .cloned()
                .ok_or_else(|| Exception::value_error("operands could not be broadcast together")),
            scalar => scalar_cell(scalar),
        }
    };
    let xs = match x {
        Value::Series(_) | Value::Array(_) | Value::List(_) | Value::Tuple(_) => Some(cells_of(x)?),
        _ => None,
    };
    let ys = match y {
        Value::Series(_) | Value::Array(_) | Value::List(_) | Value::Tuple(_) => Some(cells_of(y)?),
        _ => None,
    };
    let mut out = Vec::with_capacity(cond.len());
    for (i, c) in cond.iter().enumerate() {
        let chosen = if c.truthy() { (&xs, x) } else { (&ys, y) };
        out.push(match chosen {
            (Some(cells), _) => cells
                .get(i)
                .cloned()
                .ok_or_else(|| Exception::value_error("operands could not be broadcast together"))?,
            (None, v) => pick(v, i)?,
        });
    }
    Ok(Value::array(out))
}

// ---------------------------------------------------------------------------
// ndarray attributes and methods
// ---------------------------------------------------------------------------

pub(crate) fn array_attr(obj: &Value, attr: &str) -> Res<Value> {
    let Value::Array(cells) = obj else {
        return Err(Exception::attribute_error(&obj.type_name(), attr));
    };
    let cells = cells.borrow();
    Ok(match attr {
        "shape" => Value::tuple(vec![Value::Int(cells.len() as i64)]),
        "size" => Value::Int(cells.len() as i64),
        "ndim" => Value::Int(1),
        "dtype" => Value::str(DType::infer(&cells).as_str()),
        "T" => Value::array(cells.clone()),
        name if ARRAY_METHODS.contains(&name) => Value::method(obj.clone(), name),
        name => return Err(Exception::attribute_error("numpy.ndarray", name)),
    })
}

pub(crate) fn array_method(_interp: &mut Interpreter, receiver: &Value, name: &str, args: Args) -> Res<Value> {
    let Value::Array(shared) = receiver else {
        return Err(Exception::attribute_error(&receiver.type_name(), name));
    };
    let cells = shared.borrow().clone();
    match name {
        "tolist" => Ok(Value::list(cells.iter().map(Value::from_cell).collect())),
        "copy" | "flatten" => Ok(Value::array(cells)),
        "mean" | "sum" | "min" | "max" | "std" | "var" | "argmax" | "argmin" | "prod" => {
            reduce_cells(name, &cells, args.int_or(usize::MAX, "ddof", 0)?)
        }
        "round" => {
            let decimals = args.int_or(0, "decimals", 0)? as i32;
            let factor = 10f64.powi(decimals);
            map_cells(receiver, move |c| match c {
                Cell::Int(i) => Ok(Cell::Int(*i)),
                other => float_cell(other, |x| (x * factor).round_ties_even() / factor),
            })
        }
        "astype" => {
            let target = super::pandas::dtype_name(args.require(0, "dtype", "astype")?)?;
            Ok(Value::array(cast_all(&cells, &target)?))
        }
        "cumsum" => Ok(Value::array(Series::new(None, cells).cumsum()?.values)),
        "any" => Ok(Value::Bool(cells.iter().any(Cell::truthy))),
        "all" => Ok(Value::Bool(cells.iter().all(Cell::truthy))),
        "item" => match cells.as_slice() {
            [one] => Ok(Value::from_cell(one)),
            _ => Err(Exception::value_error(
                "can only convert an array of size 1 to a Python scalar",
            )),
        },
        "clip" => {
            let lo = args.opt(0, "min").and_then(Value::as_f64);
            let hi = args.opt(1, "max").and_then(Value::as_f64);
            map_cells(receiver, move |c| clip(c, lo, hi))
        }
        "sort" => {
            let mut sorted = cells;
            sorted.sort_by(|a, b| a.total_cmp(b));
            *shared.borrow_mut() = sorted;
            Ok(Value::None)
        }
        other => Err(Exception::attribute_error("numpy.ndarray", other)),
    }
}
