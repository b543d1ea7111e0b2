// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// plotly stand-in: express builders, graph-objects traces, subplots and
// figure methods, all backed by `crate::figure`.

use serde_json::{Map, Value as Json};

use crate::figure::{express, make_subplots, trace, ChartKind, Dim, ExpressArgs, Figure};

use super::interp::Interpreter;
use super::pandas::cells_of;
use super::stdlib::{from_json, to_json};
use super::value::{Args, Exception, Res, Value};

const FIGURE_METHODS: &[&str] = &[
    "update_layout", "update_traces", "update_xaxes", "update_yaxes", "add_trace", "add_traces",
    "to_json", "to_html", "to_dict", "show", "add_hline", "add_vline",
];

/// Keyword arguments as JSON properties.
fn props(kw: &[(String, Value)]) -> Res<Vec<(String, Json)>> {
    kw.iter()
        .map(|(k, v)| Ok((k.clone(), to_json(v)?)))
        .collect()
}

/// `update_layout(dict(...), key=...)`: a leading dict merges with keywords.
fn merged_props(args: &Args) -> Res<Vec<(String, Json)>> {
    let mut out = Vec::new();
    if let Some(Value::Dict(d)) = args.pos.first() {
        for (k, v) in d.borrow().entries.iter() {
            out.push((k.to_str(), to_json(v)?));
        }
    }
    out.extend(props(&args.kw)?);
    Ok(out)
}

fn trace_map(v: &Value) -> Res<Map<String, Json>> {
    match to_json(v)? {
        Json::Object(map) => Ok(map),
        _ => Err(Exception::value_error(format!(
            "Invalid element(s) received for the 'data' property: {}",
            v.type_name()
        ))),
    }
}

// ---------------------------------------------------------------------------
// plotly.express
// ---------------------------------------------------------------------------

fn dim(v: Option<&Value>) -> Res<Option<Dim>> {
    Ok(match v {
        None | Some(Value::None) => None,
        Some(Value::Str(name)) => Some(Dim::Column(name.to_string())),
        Some(other) => Some(Dim::Values(cells_of(other)?)),
    })
}

pub(crate) fn express_call(_interp: &mut Interpreter, func: &str, args: Args) -> Res<Value> {
    let kind = ChartKind::parse(func).ok_or_else(|| {
        Exception::new(
            "AttributeError",
            format!("module 'plotly.express' has no attribute '{func}'"),
        )
    })?;
    let table = match args.get(0, "data_frame") {
        Some(Value::Frame(t)) => Some(t.borrow().clone()),
        Some(Value::Dict(_)) => {
            return Err(Exception::value_error(
                "data_frame must be a DataFrame; wrap dicts with pd.DataFrame(...)",
            ))
        }
        _ => None,
    };
    // px.bar(df, 'x', 'y') positional shorthand
    let positional = |i: usize, name: &str| args.pos.get(i).or_else(|| args.kw(name));
    let labels = match args.kw("labels") {
        Some(Value::Dict(d)) => d
            .borrow()
            .entries
            .iter()
            .map(|(k, v)| (k.to_str(), v.to_str()))
            .collect(),
        _ => Vec::new(),
    };
    let express_args = ExpressArgs {
        x: dim(positional(1, "x"))?,
        y: dim(positional(2, "y"))?,
        color: dim(args.kw("color"))?,
        names: dim(args.kw("names"))?,
        values: dim(args.kw("values"))?,
        title: args.str_opt(usize::MAX, "title")?,
        labels,
        orientation: args.str_opt(usize::MAX, "orientation")?,
        nbins: args.kw("nbins").and_then(Value::as_int).map(|n| n.max(0) as u32),
        barmode: args.str_opt(usize::MAX, "barmode")?,
        hole: args.kw("hole").and_then(Value::as_f64),
    };
    let mut figure = express(kind, table.as_ref(), &express_args)?;
    let mut extra: Vec<(String, Json)> = Vec::new();
    for key in ["template", "height", "width"] {
        if let Some(v) = args.kw(key) {
            extra.push((key.to_string(), to_json(v)?));
        }
    }
    figure.update_layout(extra);
    if let Some(v) = args.kw("color_discrete_sequence") {
        figure.update_layout(vec![("colorway".into(), to_json(v)?)]);
    }
    Ok(Value::figure(figure))
}

// ---------------------------------------------------------------------------
// plotly.graph_objects and plotly.subplots
// ---------------------------------------------------------------------------

pub(crate) fn graph_objects_call(_interp: &mut Interpreter, func: &str, args: Args) -> Res<Value> {
    match func {
        "Figure" => {
            let data = match args.get(0, "data") {
                None | Some(Value::None) => Vec::new(),
                Some(Value::List(items)) => items
                    .borrow()
                    .iter()
                    .map(trace_map)
                    .collect::<Res<Vec<_>>>()?,
                Some(Value::Tuple(items)) => items.iter().map(trace_map).collect::<Res<Vec<_>>>()?,
                Some(single) => vec![trace_map(single)?],
            };
            let mut figure = Figure::with_traces(data);
            if let Some(layout) = args.get(1, "layout") {
                if let Json::Object(map) = to_json(layout)? {
                    figure.update_layout(map.into_iter().collect());
                }
            }
            Ok(Value::figure(figure))
        }
        "Bar" | "Scatter" | "Pie" | "Histogram" | "Box" | "Heatmap" | "Table" => {
            let map = trace(func, merged_props(&args)?);
            from_json(&Json::Object(map))
        }
        other => Err(Exception::new(
            "AttributeError",
            format!("module 'plotly.graph_objects' has no attribute '{other}'"),
        )),
    }
}

pub(crate) fn subplots_call(func: &str, args: Args) -> Res<Value> {
    if func != "make_subplots" {
        return Err(Exception::new(
            "AttributeError",
            format!("module 'plotly.subplots' has no attribute '{func}'"),
        ));
    }
    let rows = args.int_or(0, "rows", 1)?.max(0) as usize;
    let cols = args.int_or(1, "cols", 1)?.max(0) as usize;
    let titles: Vec<String> = match args.kw("subplot_titles") {
        Some(v @ (Value::List(_) | Value::Tuple(_))) => cells_of(v)?.iter().map(|c| c.to_string()).collect(),
        _ => Vec::new(),
    };
    Ok(Value::figure(make_subplots(rows, cols, &titles)?))
}

// ---------------------------------------------------------------------------
// Figure attributes and methods
// ---------------------------------------------------------------------------

pub(crate) fn figure_attr(obj: &Value, attr: &str) -> Res<Value> {
    let Value::Figure(fig) = obj else {
        return Err(Exception::attribute_error(&obj.type_name(), attr));
    };
    match attr {
        "data" => {
            let data = fig.borrow().data.clone();
            Ok(Value::tuple(
                data.into_iter()
                    .map(|t| from_json(&Json::Object(t)))
                    .collect::<Res<Vec<_>>>()?,
            ))
        }
        "layout" => from_json(&Json::Object(fig.borrow().layout.clone())),
        name if FIGURE_METHODS.contains(&name) => Ok(Value::method(obj.clone(), name)),
        name => Err(Exception::attribute_error("Figure", name)),
    }
}

pub(crate) fn figure_method(_interp: &mut Interpreter, receiver: &Value, name: &str, args: Args) -> Res<Value> {
    let Value::Figure(fig) = receiver else {
        return Err(Exception::attribute_error(&receiver.type_name(), name));
    };
    match name {
        "update_layout" => fig.borrow_mut().update_layout(merged_props(&args)?),
        "update_traces" => fig.borrow_mut().update_traces(merged_props(&args)?),
        "update_xaxes" => fig.borrow_mut().update_axes('x', merged_props(&args)?),
        "update_yaxes" => fig.borrow_mut().update_axes('y', merged_props(&args)?),
        "add_trace" => {
            let trace = trace_map(args.require(0, "trace", "add_trace")?)?;
            let row = args.opt(1, "row").and_then(Value::as_int).map(|r| r.max(0) as usize);
            let col = args.opt(2, "col").and_then(Value::as_int).map(|c| c.max(0) as usize);
            fig.borrow_mut().add_trace(trace, row, col)?;
        }
        "add_traces" => {
            let traces = match args.require(0, "data", "add_traces")? {
                Value::List(items) => items.borrow().clone(),
                Value::Tuple(items) => items.to_vec(),
                single => vec![single.clone()],
            };
            for t in &traces {
                fig.borrow_mut().add_trace(trace_map(t)?, None, None)?;
            }
        }
        "add_hline" | "add_vline" => {
            let horizontal = name == "add_hline";
            let at = args
                .get(0, if horizontal { "y" } else { "x" })
                .map(to_json)
                .transpose()?
                .unwrap_or(Json::Null);
            let mut shape = Map::new();
            shape.insert("type".into(), Json::from("line"));
            let (fixed, free) = if horizontal { ("y", "x") } else { ("x", "y") };
            shape.insert(format!("{fixed}0"), at.clone());
            shape.insert(format!("{fixed}1"), at);
            shape.insert(format!("{free}0"), Json::from(0));
            shape.insert(format!("{free}1"), Json::from(1));
            shape.insert(format!("{free}ref"), Json::from(format!("{free} domain")));
            for (key, value) in props(&args.kw)? {
                if key != fixed {
                    crate::figure::set_path(&mut shape, &key, value);
                }
            }
            let mut fig = fig.borrow_mut();
            let shapes = fig
                .layout
                .entry("shapes")
                .or_insert_with(|| Json::Array(Vec::new()));
            if let Json::Array(list) = shapes {
                list.push(Json::Object(shape));
            }
        }
        "to_json" => return Ok(Value::str(fig.borrow().to_json())),
        "to_html" => return Ok(Value::str(fig.borrow().to_html())),
        "to_dict" => return from_json(&fig.borrow().to_value()),
        "show" => {}
        other => return Err(Exception::attribute_error("Figure", other)),
    }
    Ok(Value::None)
}
