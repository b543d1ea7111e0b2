// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use super::*;
use crate::config::default_security_policy;
use crate::frame::{parse_datetime, Cell};

fn executor_with(config: SandboxConfig) -> CodeExecutor {
    CodeExecutor::new(
        config,
        Arc::new(ContentValidator::new(Arc::new(default_security_policy()))),
        Arc::new(ValueSerializer::default()),
    )
}

fn executor() -> CodeExecutor {
    executor_with(SandboxConfig::default())
}

/// Twenty customers, twelve of them in Saudi Arabia.
fn customers() -> Table {
    let countries = [
        "Saudi Arabia", "UAE", "Saudi Arabia", "Saudi Arabia", "Qatar", "Saudi Arabia", "Kuwait",
        "Saudi Arabia", "Saudi Arabia", "Oman", "Saudi Arabia", "Bahrain", "Saudi Arabia",
        "Saudi Arabia", "UAE", "Saudi Arabia", "Qatar", "Saudi Arabia", "Egypt", "Saudi Arabia",
    ];
    Table::new(vec![
        (
            "customer_id".to_string(),
            (1..=20).map(Cell::Int).collect(),
        ),
        (
            "country".to_string(),
            countries.iter().map(|c| Cell::Str(c.to_string())).collect(),
        ),
        (
            "amount".to_string(),
            (1..=20).map(|i| Cell::Float(i as f64 * 10.0)).collect(),
        ),
    ])
    .unwrap()
}

async fn run_ok(code: &str, table: Option<&Table>) -> ExecutionResult {
    let result = executor().execute(code, table).await.unwrap();
    assert!(result.success, "run failed: {}", result.output);
    result
}

fn results(r: &ExecutionResult) -> &Map<String, Json> {
    r.results.as_ref().expect("results present on success")
}

// ---------------------------------------------------------------------------
// Core behaviour
// ---------------------------------------------------------------------------

#[tokio::test]
async fn saudi_filter_counts_twelve_rows() {
    let table = customers();
    let r = run_ok(
        "saudi = df[df['country'] == 'Saudi Arabia']\nresult = len(saudi)\nprint(result)",
        Some(&table),
    )
    .await;
    assert_eq!(results(&r)["result"], json!(12));
    assert_eq!(r.output, "12\n");
    // `saudi` is a derived table and is returned under its own name.
    assert_eq!(results(&r)["saudi"]["shape"], json!([12, 3]));
}

#[tokio::test]
async fn import_os_is_rejected_without_running() {
    let r = executor()
        .execute("import os\nprint('ran')\nresult = 1", None)
        .await
        .unwrap();
    assert!(!r.success);
    assert!(r.output.starts_with("Code validation failed"), "{}", r.output);
    assert!(r.output.contains("import os"));
    assert!(!r.output.contains("ran"));
    assert_eq!(r.results, None);
}

#[tokio::test]
async fn input_table_is_a_private_copy() {
    let table = customers();
    run_ok("df['amount'] = 0\ndf.drop(columns=['country'], inplace=True)", Some(&table)).await;
    assert_eq!(table.ncols(), 3);
    assert_eq!(table.column("amount").unwrap().values[0], Cell::Float(10.0));
}

#[tokio::test]
async fn untouched_input_table_is_not_returned() {
    let table = customers();
    let r = run_ok("total = df['amount'].sum()", Some(&table)).await;
    assert!(!results(&r).contains_key("df"));
    assert!(results(&r).is_empty());
}

#[tokio::test]
async fn reassigned_input_table_is_returned() {
    let table = customers();
    let r = run_ok("df = df.head(3)", Some(&table)).await;
    assert_eq!(results(&r)["df"]["shape"], json!([3, 3]));
}

#[tokio::test]
async fn uncaught_exception_yields_traceback_and_no_results() {
    let table = customers();
    let r = executor()
        .execute("x = 1\ny = df['missing']", Some(&table))
        .await
        .unwrap();
    assert!(!r.success);
    assert!(r.output.starts_with("Execution Error: "), "{}", r.output);
    assert!(r.output.contains("Traceback (most recent call last):"));
    assert!(r.output.contains("line 2"));
    assert!(r.output.contains("KeyError"));
    assert_eq!(r.results, None);
}

#[tokio::test]
async fn handled_exception_does_not_fail_the_run() {
    let r = run_ok(
        "try:\n    x = 1 / 0\nexcept ZeroDivisionError as e:\n    result = 'div'\n",
        None,
    )
    .await;
    assert_eq!(results(&r)["result"], json!("div"));
}

#[tokio::test]
async fn disallowed_module_import_fails_at_runtime() {
    let config = SandboxConfig {
        allowed_modules: vec!["pandas".to_string()],
        ..SandboxConfig::default()
    };
    let r = executor_with(config)
        .execute("import math\nresult = math.sqrt(4)", None)
        .await
        .unwrap();
    assert!(!r.success);
    assert!(r.output.contains("ImportError"), "{}", r.output);
    assert!(r.output.contains("Import of 'math' is not allowed"));
}

#[tokio::test]
async fn escape_hatches_are_undefined() {
    let r = executor()
        .execute("f = breakpoint\n", None)
        .await
        .unwrap();
    assert!(!r.success);
    assert!(r.output.contains("NameError"), "{}", r.output);
}

#[tokio::test]
async fn step_budget_stops_runaway_loops() {
    let config = SandboxConfig {
        max_steps: 10_000,
        ..SandboxConfig::default()
    };
    let err = executor_with(config)
        .execute("i = 0\nwhile True:\n    i += 1\n", None)
        .await
        .unwrap_err();
    assert!(matches!(err, SandboxError::StepBudget { max_steps: 10_000 }));
}

#[tokio::test]
async fn wall_clock_timeout_cancels_the_run() {
    let config = SandboxConfig {
        timeout: Duration::from_millis(50),
        max_steps: u64::MAX,
        ..SandboxConfig::default()
    };
    let err = executor_with(config)
        .execute("i = 0\nwhile True:\n    i += 1\n", None)
        .await
        .unwrap_err();
    assert!(matches!(err, SandboxError::Timeout { timeout_ms: 50 }));
}

#[tokio::test]
async fn repaired_code_is_what_runs() {
    let r = run_ok("result = (1 + 2) \\", None).await;
    assert_eq!(r.code, "result = (1 + 2)");
    assert_eq!(results(&r)["result"], json!(3));
}

#[tokio::test]
async fn output_is_captured_in_order() {
    let r = run_ok(
        "for i in range(3):\n    print(f'row {i}', end=';')\nprint()\nprint('a', 'b', sep='-')",
        None,
    )
    .await;
    assert_eq!(r.output, "row 0;row 1;row 2;\na-b\n");
}

// ---------------------------------------------------------------------------
// Result extraction and serialization
// ---------------------------------------------------------------------------

#[tokio::test]
async fn one_figure_bound_twice_is_returned_once() {
    let table = customers();
    let r = run_ok(
        "fig = px.bar(df, x='country', y='amount')\nresult = fig\nchart = fig",
        Some(&table),
    )
    .await;
    let map = results(&r);
    assert_eq!(map.len(), 1, "{:?}", map.keys().collect::<Vec<_>>());
    assert_eq!(map["fig"]["type"], "plotly_figure");
    assert!(map["fig"]["json"].as_str().unwrap().contains("\"bar\""));
    assert!(map["fig"]["html"].as_str().unwrap().contains("<div"));
}

#[tokio::test]
async fn distinct_figures_are_never_merged() {
    let r = run_ok(
        "import copy\nfig = go.Figure(data=[go.Bar(x=[1, 2], y=[3, 4])])\nresult = copy.deepcopy(fig)",
        None,
    )
    .await;
    let map = results(&r);
    assert_eq!(map["fig"]["type"], "plotly_figure");
    assert_eq!(map["result"]["type"], "plotly_figure");
    assert_eq!(map.len(), 2);
}

#[tokio::test]
async fn unnamed_figures_and_tables_are_picked_up() {
    let table = customers();
    let r = run_ok(
        "by_country = df.groupby('country')['amount'].sum().reset_index()\n\
         pie = px.pie(by_country, names='country', values='amount')\n\
         n = 3",
        Some(&table),
    )
    .await;
    let map = results(&r);
    assert_eq!(map["by_country"]["type"], "dataframe");
    assert_eq!(map["pie"]["type"], "plotly_figure");
    assert!(!map.contains_key("n"));
}

#[tokio::test]
async fn nat_cell_serializes_to_null() {
    let table = Table::new(vec![(
        "when".to_string(),
        vec![
            Cell::DateTime(parse_datetime("2024-03-01").unwrap()),
            Cell::NaT,
        ],
    )])
    .unwrap();
    let r = run_ok("result = df.copy()", Some(&table)).await;
    let head = &results(&r)["result"]["head"];
    assert_eq!(head[0]["when"], "2024-03-01T00:00:00");
    assert_eq!(head[1]["when"], Json::Null);
}

#[tokio::test]
async fn non_finite_floats_never_reach_the_output() {
    let r = run_ok(
        "import math\nresult = {'nan': math.nan, 'inf': math.inf, 'neg': -math.inf, 'ok': 1.5}",
        None,
    )
    .await;
    assert_eq!(
        results(&r)["result"],
        json!({"nan": null, "inf": "Infinity", "neg": "-Infinity", "ok": 1.5})
    );
}

#[tokio::test]
async fn timestamps_serialize_as_iso_strings() {
    let r = run_ok(
        "from datetime import datetime, timedelta\nresult = datetime(2024, 5, 1, 9, 30) + timedelta(days=1)",
        None,
    )
    .await;
    assert_eq!(results(&r)["result"], json!("2024-05-02T09:30:00"));
}

// ---------------------------------------------------------------------------
// Library stand-ins
// ---------------------------------------------------------------------------

#[tokio::test]
async fn groupby_aggregation_matches_pandas() {
    let table = customers();
    let r = run_ok(
        "summary = df.groupby('country')['amount'].sum().sort_values(ascending=False)\n\
         result = summary.index[0]\n\
         output = float(summary.iloc[0])",
        Some(&table),
    )
    .await;
    let map = results(&r);
    assert_eq!(map["result"], json!("Saudi Arabia"));
    // customer ids 1,3,4,6,8,9,11,13,14,16,18,20 at 10.0 each
    assert_eq!(map["output"], json!(1230.0));
    assert_eq!(map["summary"]["type"], "series");
}

#[tokio::test]
async fn merge_joins_on_a_shared_key() {
    let r = run_ok(
        "left = pd.DataFrame({'id': [1, 2, 3], 'name': ['a', 'b', 'c']})\n\
         right = pd.DataFrame({'id': [2, 3, 4], 'score': [20, 30, 40]})\n\
         result = pd.merge(left, right, on='id', how='inner')",
        None,
    )
    .await;
    let v = &results(&r)["result"];
    assert_eq!(v["shape"], json!([2, 3]));
    assert_eq!(v["columns"], json!(["id", "name", "score"]));
    assert_eq!(v["head"][0], json!({"id": 2, "name": "b", "score": 20}));
}

#[tokio::test]
async fn numpy_and_statistics_reductions() {
    let r = run_ok(
        "import statistics\n\
         values = [2, 4, 4, 4, 5, 5, 7, 9]\n\
         result = {'np_std': float(np.std(values)), 'median': statistics.median(values), 'mean': np.mean(values)}",
        None,
    )
    .await;
    assert_eq!(
        results(&r)["result"],
        json!({"np_std": 2.0, "median": 4.5, "mean": 5.0})
    );
}

#[tokio::test]
async fn json_round_trip_inside_the_sandbox() {
    let r = run_ok(
        "text = json.dumps({'a': [1, 2], 'b': None})\nresult = json.loads(text)['a'][1]\nprint(text)",
        None,
    )
    .await;
    assert_eq!(r.output, "{\"a\": [1, 2], \"b\": null}\n");
    assert_eq!(results(&r)["result"], json!(2));
}

#[tokio::test]
async fn subplots_place_traces_on_the_grid() {
    let r = run_ok(
        "fig = make_subplots(rows=1, cols=2, subplot_titles=['a', 'b'])\n\
         fig.add_trace(go.Scatter(x=[1, 2], y=[3, 4]), row=1, col=2)\n\
         fig.update_layout(title_text='two panels')",
        None,
    )
    .await;
    let figure: Json = serde_json::from_str(results(&r)["fig"]["json"].as_str().unwrap()).unwrap();
    assert_eq!(figure["data"][0]["type"], "scatter");
    assert_eq!(figure["data"][0]["xaxis"], "x2");
    assert_eq!(figure["layout"]["title"]["text"], "two panels");
}

#[tokio::test]
async fn datetime_accessor_and_strftime() {
    let table = Table::new(vec![(
        "day".to_string(),
        vec![
            Cell::DateTime(parse_datetime("2024-01-15").unwrap()),
            Cell::DateTime(parse_datetime("2024-02-20").unwrap()),
        ],
    )])
    .unwrap();
    let r = run_ok(
        "result = list(df['day'].dt.month)\noutput = df['day'].iloc[1].strftime('%d/%m/%Y')",
        Some(&table),
    )
    .await;
    assert_eq!(results(&r)["result"], json!([1, 2]));
    assert_eq!(results(&r)["output"], json!("20/02/2024"));
}

#[tokio::test]
async fn bad_strftime_directive_raises_value_error() {
    let r = executor()
        .execute(
            "from datetime import datetime\nresult = datetime(2024, 1, 1).strftime('%Q')",
            None,
        )
        .await
        .unwrap();
    assert!(!r.success);
    assert!(r.output.contains("ValueError"), "{}", r.output);
}

// ---------------------------------------------------------------------------
// Resource limits
// ---------------------------------------------------------------------------

async fn run_err(code: &str) -> ExecutionResult {
    let r = executor().execute(code, None).await.unwrap();
    assert!(!r.success, "run unexpectedly succeeded: {}", r.output);
    assert!(r.results.is_none());
    r
}

#[tokio::test]
async fn huge_list_repetition_is_memory_error() {
    let r = run_err("result = [0] * (10 ** 12)").await;
    assert!(r.output.contains("MemoryError"), "{}", r.output);
}

#[tokio::test]
async fn huge_string_repetition_is_memory_error() {
    let r = run_err("result = 'a' * (10 ** 12)").await;
    assert!(r.output.contains("MemoryError"), "{}", r.output);
}

#[tokio::test]
async fn huge_json_indent_is_memory_error() {
    let r = run_err("import json\nresult = json.dumps([1], indent=10 ** 12)").await;
    assert!(r.output.contains("MemoryError"), "{}", r.output);
}

#[tokio::test]
async fn huge_padding_widths_are_memory_errors() {
    for code in [
        "result = 'x'.zfill(10 ** 9)",
        "result = 'x'.center(10 ** 9)",
        "result = '{:>1000000000}'.format(1)",
        "result = f'{1:.1000000000f}'",
    ] {
        let r = run_err(code).await;
        assert!(r.output.contains("MemoryError"), "{code}: {}", r.output);
    }
}

#[tokio::test]
async fn huge_range_result_is_returned_as_its_repr() {
    let r = run_ok("result = range(10 ** 13)", None).await;
    assert_eq!(results(&r)["result"], json!("range(0, 10000000000000)"));
}

#[tokio::test]
async fn range_spanning_all_of_i64_has_no_len() {
    let r = run_err("result = len(range(-9223372036854775807, 9223372036854775807))").await;
    assert!(r.output.contains("OverflowError"), "{}", r.output);
}

#[tokio::test]
async fn range_spanning_all_of_i64_supports_membership_and_indexing() {
    let r = run_ok(
        "r = range(-9223372036854775807, 9223372036854775807, 3)\n\
         result = [9223372036854775806 in r, -9223372036854775807 in r, bool(r)]\n\
         output = range(-9223372036854775807, 9223372036854775807)[-1]",
        None,
    )
    .await;
    assert_eq!(results(&r)["result"], json!([false, true, true]));
    assert_eq!(results(&r)["output"], json!(9223372036854775806_i64));
}

#[tokio::test]
async fn self_referencing_containers_print_with_ellipsis() {
    let r = run_ok(
        "a = []\na.append(a)\nd = {}\nd['self'] = d\nresult = str(a)\noutput = repr(d)\nprint(a == a)",
        None,
    )
    .await;
    assert_eq!(results(&r)["result"], json!("[[...]]"));
    assert_eq!(results(&r)["output"], json!("{'self': {...}}"));
    assert_eq!(r.output, "True\n");
}

#[tokio::test]
async fn json_dumps_of_a_cycle_is_value_error() {
    let r = run_err("import json\na = [1]\na.append(a)\nresult = json.dumps(a)").await;
    assert!(r.output.contains("ValueError"), "{}", r.output);
    assert!(r.output.contains("Circular reference detected"), "{}", r.output);
}

#[tokio::test]
async fn deepcopy_keeps_the_shape_of_a_cycle() {
    let r = run_ok(
        "import copy\na = [1]\na.append(a)\nb = copy.deepcopy(a)\n\
         result = [b[1] is b, b[1] is a, str(b)]",
        None,
    )
    .await;
    assert_eq!(results(&r)["result"], json!([true, false, "[1, [...]]"]));
}

#[tokio::test]
async fn deeply_nested_list_is_rendered_and_dropped() {
    let r = run_ok(
        "x = []\nfor _ in range(100000):\n    x = [x]\ns = str(x)\n\
         result = [s.startswith('[[[['), s.endswith(']]]]'), '...' in s]",
        None,
    )
    .await;
    assert_eq!(results(&r)["result"], json!([true, true, true]));
}
