// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// Plotly-compatible figures
//
// Responsibilities:
// - Figure model: trace list plus layout, serialized as Plotly JSON
// - Express-style builders (bar, line, scatter, pie, histogram, box, area)
//   reading columns from a Table
// - Layout and trace updates with Plotly's underscore path syntax
// - Subplot grids and standalone HTML export

use serde_json::{json, Map, Value};

use crate::frame::{distinct, Cell, Table};

const PLOTLY_CDN: &str = "https://cdn.plot.ly/plotly-2.35.2.min.js";

/// Property names that contain an underscore but are not paths.
const FLAT_PROPERTIES: &[&str] = &[
    "paper_bgcolor",
    "plot_bgcolor",
    "error_x",
    "error_y",
    "hover_data",
    "hover_name",
    "text_auto",
];

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FigureError {
    #[error("{0}")]
    Value(String),
}

/// A figure: an ordered list of traces and a layout object.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Figure {
    pub data: Vec<Map<String, Value>>,
    pub layout: Map<String, Value>,
    grid: Option<(usize, usize)>,
}

impl Figure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_traces(data: Vec<Map<String, Value>>) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    /// Append a trace, placing it on a subplot cell when `row`/`col` are
    /// given.
    pub fn add_trace(
        &mut self,
        mut trace: Map<String, Value>,
        row: Option<usize>,
        col: Option<usize>,
    ) -> Result<(), FigureError> {
        if row.is_some() || col.is_some() {
            let (rows, cols) = self.grid.ok_or_else(|| {
                FigureError::Value(
                    "In order to reference traces by row and column, you must first use \
                     plotly.tools.make_subplots to create the figure with a subplot grid."
                        .into(),
                )
            })?;
            let (r, c) = (row.unwrap_or(1), col.unwrap_or(1));
            if r == 0 || c == 0 || r > rows || c > cols {
                return Err(FigureError::Value(format!(
                    "row/col ({r}, {c}) is outside the {rows}x{cols} subplot grid"
                )));
            }
            let k = (r - 1) * cols + c;
            trace.insert("xaxis".into(), Value::String(axis_ref('x', k)));
            trace.insert("yaxis".into(), Value::String(axis_ref('y', k)));
        }
        self.data.push(trace);
        Ok(())
    }

    pub fn update_layout(&mut self, props: Vec<(String, Value)>) {
        for (key, value) in props {
            set_path(&mut self.layout, &key, value);
        }
    }

    pub fn update_traces(&mut self, props: Vec<(String, Value)>) {
        for trace in &mut self.data {
            for (key, value) in &props {
                set_path(trace, key, value.clone());
            }
        }
    }

    /// Update every x (or y) axis in the layout.
    pub fn update_axes(&mut self, axis: char, props: Vec<(String, Value)>) {
        let prefix = format!("{axis}axis");
        let mut names: Vec<String> = self
            .layout
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect();
        if names.is_empty() {
            names.push(prefix);
        }
        for name in names {
            let entry = self
                .layout
                .entry(name)
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(obj) = entry {
                for (key, value) in &props {
                    set_path(obj, key, value.clone());
                }
            }
        }
    }

    pub fn to_value(&self) -> Value {
        json!({
            "data": self.data,
            "layout": self.layout,
        })
    }

    /// Plotly JSON, as `fig.to_json()` returns it.
    pub fn to_json(&self) -> String {
        self.to_value().to_string()
    }

    /// Standalone HTML page loading plotly.js from the CDN.
    pub fn to_html(&self) -> String {
        let id = uuid::Uuid::new_v4();
        let data = Value::from(self.data.clone()).to_string().replace("</", "<\\/");
        let layout = Value::Object(self.layout.clone())
            .to_string()
            .replace("</", "<\\/");
        format!(
            "<html>\n<head><meta charset=\"utf-8\" /></head>\n<body>\n    <div>\
             <script type=\"text/javascript\">window.PlotlyConfig = {{MathJaxConfig: 'local'}};</script>\n\
             <script charset=\"utf-8\" src=\"{PLOTLY_CDN}\"></script>\
             <div id=\"{id}\" class=\"plotly-graph-div\" style=\"height:100%; width:100%;\"></div>\
             <script type=\"text/javascript\">window.PLOTLYENV=window.PLOTLYENV || {{}};\
             if (document.getElementById(\"{id}\")) {{Plotly.newPlot(\"{id}\", {data}, {layout}, {{\"responsive\": true}})}};\
             </script></div>\n</body>\n</html>"
        )
    }
}

fn axis_ref(axis: char, k: usize) -> String {
    if k == 1 {
        axis.to_string()
    } else {
        format!("{axis}{k}")
    }
}

fn axis_key(axis: char, k: usize) -> String {
    if k == 1 {
        format!("{axis}axis")
    } else {
        format!("{axis}axis{k}")
    }
}

/// Set `key` on `target`, expanding `a_b_c` into nested objects and
/// promoting a bare `title` string to `{"text": ...}`.
pub fn set_path(target: &mut Map<String, Value>, key: &str, value: Value) {
    let parts: Vec<&str> = if FLAT_PROPERTIES.contains(&key) {
        vec![key]
    } else {
        key.split('_').filter(|p| !p.is_empty()).collect()
    };
    let Some((last, parents)) = parts.split_last() else {
        return;
    };
    let mut node = target;
    for part in parents {
        let slot = node
            .entry(part.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            // `title="x"` followed by `title_font_size=...`
            let previous = slot.take();
            let mut obj = Map::new();
            if previous.is_string() {
                obj.insert("text".into(), previous);
            }
            *slot = Value::Object(obj);
        }
        let Value::Object(next) = slot else {
            return;
        };
        node = next;
    }
    let value = match (*last, value) {
        ("title", Value::String(text)) => json!({ "text": text }),
        (_, v) => v,
    };
    match (node.get_mut(*last), value) {
        (Some(Value::Object(existing)), Value::Object(update)) => {
            for (k, v) in update {
                existing.insert(k, v);
            }
        }
        (_, value) => {
            node.insert(last.to_string(), value);
        }
    }
}

/// A graph-objects trace such as `go.Bar(x=..., y=...)`.
pub fn trace(kind: &str, props: Vec<(String, Value)>) -> Map<String, Value> {
    let mut out = Map::new();
    out.insert("type".into(), Value::String(kind.to_ascii_lowercase()));
    for (key, value) in props {
        set_path(&mut out, &key, value);
    }
    out
}

/// A grid of `rows` x `cols` subplots with optional titles.
pub fn make_subplots(rows: usize, cols: usize, titles: &[String]) -> Result<Figure, FigureError> {
    if rows == 0 || cols == 0 {
        return Err(FigureError::Value(
            "The 'rows' and 'cols' arguments must be positive integers".into(),
        ));
    }
    let h_gap = 0.2 / cols as f64;
    let v_gap = 0.3 / rows as f64;
    let width = (1.0 - h_gap * (cols - 1) as f64) / cols as f64;
    let height = (1.0 - v_gap * (rows - 1) as f64) / rows as f64;

    let mut fig = Figure::new();
    fig.grid = Some((rows, cols));
    let mut annotations = Vec::new();
    for r in 1..=rows {
        for c in 1..=cols {
            let k = (r - 1) * cols + c;
            let x0 = (c - 1) as f64 * (width + h_gap);
            let y1 = 1.0 - (r - 1) as f64 * (height + v_gap);
            let x_domain = [round4(x0), round4(x0 + width)];
            let y_domain = [round4(y1 - height), round4(y1)];
            fig.layout.insert(
                axis_key('x', k),
                json!({ "anchor": axis_ref('y', k), "domain": x_domain }),
            );
            fig.layout.insert(
                axis_key('y', k),
                json!({ "anchor": axis_ref('x', k), "domain": y_domain }),
            );
            if let Some(title) = titles.get(k - 1) {
                annotations.push(json!({
                    "font": {"size": 16},
                    "showarrow": false,
                    "text": title,
                    "x": round4(x0 + width / 2.0),
                    "xanchor": "center",
                    "xref": "paper",
                    "y": round4(y1),
                    "yanchor": "bottom",
                    "yref": "paper",
                }));
            }
        }
    }
    if !annotations.is_empty() {
        fig.layout.insert("annotations".into(), Value::Array(annotations));
    }
    Ok(fig)
}

fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

// ---------------------------------------------------------------------------
// Express builders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Bar,
    Line,
    Scatter,
    Pie,
    Histogram,
    Box,
    Area,
}

impl ChartKind {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "bar" => ChartKind::Bar,
            "line" => ChartKind::Line,
            "scatter" => ChartKind::Scatter,
            "pie" => ChartKind::Pie,
            "histogram" => ChartKind::Histogram,
            "box" => ChartKind::Box,
            "area" => ChartKind::Area,
            _ => return None,
        })
    }
}

/// A chart dimension: a column of the data frame or literal values.
#[derive(Debug, Clone, PartialEq)]
pub enum Dim {
    Column(String),
    Values(Vec<Cell>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpressArgs {
    pub x: Option<Dim>,
    pub y: Option<Dim>,
    pub color: Option<Dim>,
    pub names: Option<Dim>,
    pub values: Option<Dim>,
    pub title: Option<String>,
    pub labels: Vec<(String, String)>,
    pub orientation: Option<String>,
    pub nbins: Option<u32>,
    pub barmode: Option<String>,
    pub hole: Option<f64>,
}

struct Resolved {
    label: Option<String>,
    values: Vec<Cell>,
}

fn resolve(dim: &Dim, table: Option<&Table>, arg: &str) -> Result<Resolved, FigureError> {
    match dim {
        Dim::Values(values) => Ok(Resolved {
            label: None,
            values: values.clone(),
        }),
        Dim::Column(name) => {
            let Some(table) = table else {
                return Err(FigureError::Value(format!(
                    "String or int arguments are only possible when a DataFrame or array is \
                     provided in the `data_frame` argument. No DataFrame was provided, but \
                     argument '{arg}' is of type str or int."
                )));
            };
            let col = table.column_ref(name).map_err(|_| {
                FigureError::Value(format!(
                    "Value of '{arg}' is not the name of a column in 'data_frame'. Expected one \
                     of {:?} but received: {name}",
                    table.column_names()
                ))
            })?;
            Ok(Resolved {
                label: Some(name.clone()),
                values: col.values.clone(),
            })
        }
    }
}

fn cells_json(cells: &[Cell]) -> Value {
    Value::Array(cells.iter().map(Cell::to_json).collect())
}

fn pick(values: &[Cell], rows: &[usize]) -> Vec<Cell> {
    rows.iter().map(|&r| values[r].clone()).collect()
}

/// Build an express-style chart.
pub fn express(kind: ChartKind, table: Option<&Table>, args: &ExpressArgs) -> Result<Figure, FigureError> {
    let get = |dim: &Option<Dim>, arg: &str| -> Result<Option<Resolved>, FigureError> {
        dim.as_ref().map(|d| resolve(d, table, arg)).transpose()
    };
    let display = |label: &Option<String>| -> Option<String> {
        label.as_ref().map(|l| {
            args.labels
                .iter()
                .find(|(k, _)| k == l)
                .map(|(_, v)| v.clone())
                .unwrap_or_else(|| l.clone())
        })
    };

    let mut fig = Figure::new();
    if kind == ChartKind::Pie {
        let names = get(&args.names, "names")?;
        let values = get(&args.values, "values")?;
        let mut t = Map::new();
        t.insert("type".into(), json!("pie"));
        if let Some(n) = &names {
            t.insert("labels".into(), cells_json(&n.values));
        }
        if let Some(v) = &values {
            t.insert("values".into(), cells_json(&v.values));
        }
        if let Some(hole) = args.hole {
            t.insert("hole".into(), json!(hole));
        }
        fig.data.push(t);
    } else {
        let mut x = get(&args.x, "x")?;
        let mut y = get(&args.y, "y")?;
        let color = get(&args.color, "color")?;
        if x.is_none() && y.is_none() {
            return Err(FigureError::Value(
                "At least one of x or y must be provided".into(),
            ));
        }
        // bar and line charts fall back to the row index for the missing axis
        if matches!(kind, ChartKind::Bar | ChartKind::Line | ChartKind::Scatter | ChartKind::Area) {
            let index = |len: usize| Resolved {
                label: Some("index".into()),
                values: match table {
                    Some(t) => t.index.level_values(0),
                    None => (0..len).map(|i| Cell::Int(i as i64)).collect(),
                },
            };
            if x.is_none() {
                x = y.as_ref().map(|r| index(r.values.len()));
            } else if y.is_none() && kind != ChartKind::Bar {
                y = x.as_ref().map(|r| index(r.values.len()));
            }
        }
        let rows = x
            .as_ref()
            .or(y.as_ref())
            .map(|r| r.values.len())
            .unwrap_or(0);
        for dim in [&x, &y, &color].into_iter().flatten() {
            if dim.values.len() != rows {
                return Err(FigureError::Value(format!(
                    "All arguments should have the same length. The length of argument 'x' is \
                     {rows}, whereas the length of another argument is {}",
                    dim.values.len()
                )));
            }
        }

        let groups: Vec<(Option<Cell>, Vec<usize>)> = match &color {
            Some(c) => distinct(&c.values)
                .into_iter()
                .map(|(label, rows)| (Some(label), rows))
                .collect(),
            None => vec![(None, (0..rows).collect())],
        };
        for (label, positions) in &groups {
            let mut t = Map::new();
            t.insert("type".into(), json!(base_type(kind)));
            match kind {
                ChartKind::Line => {
                    t.insert("mode".into(), json!("lines"));
                }
                ChartKind::Scatter => {
                    t.insert("mode".into(), json!("markers"));
                }
                ChartKind::Area => {
                    t.insert("mode".into(), json!("lines"));
                    t.insert("stackgroup".into(), json!("1"));
                }
                _ => {}
            }
            if let Some(x) = &x {
                t.insert("x".into(), cells_json(&pick(&x.values, positions)));
            }
            if let Some(y) = &y {
                t.insert("y".into(), cells_json(&pick(&y.values, positions)));
            }
            if let Some(o) = &args.orientation {
                t.insert("orientation".into(), json!(o));
            }
            if let (ChartKind::Histogram, Some(n)) = (kind, args.nbins) {
                t.insert("nbinsx".into(), json!(n));
            }
            match label {
                Some(l) => {
                    let name = l.to_string();
                    t.insert("name".into(), json!(name));
                    t.insert("legendgroup".into(), json!(name));
                    t.insert("showlegend".into(), json!(true));
                }
                None => {
                    t.insert("name".into(), json!(""));
                    t.insert("showlegend".into(), json!(false));
                }
            }
            fig.data.push(t);
        }

        if let Some(label) = display(&x.as_ref().and_then(|r| r.label.clone())) {
            set_path(&mut fig.layout, "xaxis_title_text", json!(label));
        }
        let y_label = match (&y, kind) {
            (Some(r), _) => display(&r.label.clone()),
            (None, ChartKind::Histogram) => Some("count".to_string()),
            (None, _) => None,
        };
        if let Some(label) = y_label {
            set_path(&mut fig.layout, "yaxis_title_text", json!(label));
        }
        if let Some(label) = display(&color.as_ref().and_then(|r| r.label.clone())) {
            set_path(&mut fig.layout, "legend_title_text", json!(label));
        }
        if matches!(kind, ChartKind::Bar | ChartKind::Histogram) {
            let mode = args.barmode.clone().unwrap_or_else(|| "relative".into());
            fig.layout.insert("barmode".into(), json!(mode));
        }
    }
    if let Some(title) = &args.title {
        set_path(&mut fig.layout, "title", json!(title));
    }
    Ok(fig)
}

fn base_type(kind: ChartKind) -> &'static str {
    match kind {
        ChartKind::Bar => "bar",
        ChartKind::Line | ChartKind::Scatter | ChartKind::Area => "scatter",
        ChartKind::Pie => "pie",
        ChartKind::Histogram => "histogram",
        ChartKind::Box => "box",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        Table::new(vec![
            (
                "city".to_string(),
                vec![Cell::Str("a".into()), Cell::Str("b".into()), Cell::Str("a".into())],
            ),
            (
                "sales".to_string(),
                vec![Cell::Int(1), Cell::Float(f64::NAN), Cell::Int(3)],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn bar_reads_columns_and_nulls_nan() {
        let args = ExpressArgs {
            x: Some(Dim::Column("city".into())),
            y: Some(Dim::Column("sales".into())),
            title: Some("Sales".into()),
            ..Default::default()
        };
        let fig = express(ChartKind::Bar, Some(&table()), &args).unwrap();
        let v = fig.to_value();
        assert_eq!(v["data"][0]["type"], "bar");
        assert_eq!(v["data"][0]["y"], json!([1.0, null, 3.0]));
        assert_eq!(v["layout"]["title"]["text"], "Sales");
        assert_eq!(v["layout"]["xaxis"]["title"]["text"], "city");
    }

    #[test]
    fn color_splits_traces() {
        let args = ExpressArgs {
            x: Some(Dim::Column("sales".into())),
            y: Some(Dim::Column("sales".into())),
            color: Some(Dim::Column("city".into())),
            ..Default::default()
        };
        let fig = express(ChartKind::Scatter, Some(&table()), &args).unwrap();
        assert_eq!(fig.data.len(), 2);
        assert_eq!(fig.data[0]["name"], "a");
        assert_eq!(fig.data[0]["x"], json!([1.0, 3.0]));
    }

    #[test]
    fn unknown_column_is_value_error() {
        let args = ExpressArgs {
            x: Some(Dim::Column("nope".into())),
            ..Default::default()
        };
        let err = express(ChartKind::Histogram, Some(&table()), &args).unwrap_err();
        assert!(err.to_string().contains("not the name of a column"));
    }

    #[test]
    fn magic_underscores_nest_layout() {
        let mut fig = Figure::new();
        fig.update_layout(vec![
            ("title".into(), json!("T")),
            ("title_font_size".into(), json!(20)),
            ("paper_bgcolor".into(), json!("white")),
        ]);
        assert_eq!(fig.layout["title"], json!({"text": "T", "font": {"size": 20}}));
        assert_eq!(fig.layout["paper_bgcolor"], "white");
    }

    #[test]
    fn subplot_traces_target_their_axes() {
        let mut fig = make_subplots(1, 2, &["left".into(), "right".into()]).unwrap();
        fig.add_trace(trace("Bar", vec![]), Some(1), Some(2)).unwrap();
        assert_eq!(fig.data[0]["xaxis"], "x2");
        assert!(fig.layout.contains_key("xaxis2"));
        assert_eq!(fig.layout["annotations"][1]["text"], "right");
        assert!(fig.add_trace(trace("bar", vec![]), Some(2), Some(1)).is_err());
        assert!(Figure::new().add_trace(Map::new(), Some(1), Some(1)).is_err());
    }

    #[test]
    fn html_embeds_cdn_and_escapes_scripts() {
        let fig = Figure::with_traces(vec![trace("scatter", vec![("name".into(), json!("</script>"))])]);
        let html = fig.to_html();
        assert!(html.contains(PLOTLY_CDN));
        assert!(!html.contains("</script>\"") && html.contains("<\\/script>"));
    }
}
