// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// Frame tests

use super::*;
use std::collections::HashMap;

fn s(text: &str) -> Cell {
    Cell::Str(text.to_string())
}

fn sales() -> Table {
    Table::new(vec![
        (
            "region".to_string(),
            vec![s("north"), s("south"), s("north"), s("east"), s("south")],
        ),
        (
            "units".to_string(),
            vec![Cell::Int(10), Cell::Int(4), Cell::Int(6), Cell::Int(8), Cell::Int(2)],
        ),
        (
            "price".to_string(),
            vec![
                Cell::Float(2.5),
                Cell::Float(3.0),
                Cell::Null,
                Cell::Float(1.5),
                Cell::Float(4.0),
            ],
        ),
    ])
    .unwrap()
}

// ---------------------------------------------------------------------------
// Cells and dtypes
// ---------------------------------------------------------------------------

#[test]
fn int_column_with_missing_becomes_float() {
    let col = Column::new("x", vec![Cell::Int(1), Cell::Null, Cell::Int(3)]);
    assert_eq!(col.dtype, DType::Float64);
    assert!(col.values[1].is_missing());
    assert_eq!(col.values[0], Cell::Float(1.0));
}

#[test]
fn mixed_int_and_float_series_normalizes_in_place() {
    let series = Series::new(None, vec![Cell::Int(2), Cell::Float(0.5), Cell::Null]);
    assert_eq!(series.dtype, DType::Float64);
    assert_eq!(series.values[0], Cell::Float(2.0));
    assert_eq!(series.values[1], Cell::Float(0.5));
    assert!(series.values[2].is_missing());
}

#[test]
fn datetime_column_with_missing_uses_nat() {
    let dt = parse_datetime("2024-01-15").unwrap();
    let col = Column::new("d", vec![Cell::DateTime(dt), Cell::Null]);
    assert_eq!(col.dtype, DType::DateTime);
    assert_eq!(col.values[1], Cell::NaT);
}

#[test]
fn mixed_column_is_object() {
    let col = Column::new("m", vec![Cell::Int(1), s("a")]);
    assert_eq!(col.dtype, DType::Object);
}

#[test]
fn float_display_is_python_like() {
    assert_eq!(Cell::Float(3.0).to_string(), "3.0");
    assert_eq!(Cell::Float(0.25).to_string(), "0.25");
    assert_eq!(Cell::Float(f64::NAN).to_string(), "nan");
    assert_eq!(Cell::Bool(true).to_string(), "True");
}

#[test]
fn integral_float_groups_with_int() {
    assert_eq!(Cell::Float(2.0).key(), Cell::Int(2).key());
    assert_eq!(Cell::Null.key(), Cell::Float(f64::NAN).key());
}

// ---------------------------------------------------------------------------
// Arithmetic and comparison
// ---------------------------------------------------------------------------

#[test]
fn integer_division_follows_floor_semantics() {
    assert_eq!(arith(ArithOp::FloorDiv, &Cell::Int(-7), &Cell::Int(2)).unwrap(), Cell::Int(-4));
    assert_eq!(arith(ArithOp::Mod, &Cell::Int(-7), &Cell::Int(2)).unwrap(), Cell::Int(1));
    assert_eq!(arith(ArithOp::Div, &Cell::Int(7), &Cell::Int(2)).unwrap(), Cell::Float(3.5));
}

#[test]
fn division_by_zero_yields_infinity() {
    let out = arith(ArithOp::Div, &Cell::Int(1), &Cell::Int(0)).unwrap();
    assert_eq!(out, Cell::Float(f64::INFINITY));
}

#[test]
fn missing_propagates_through_arithmetic() {
    let out = arith(ArithOp::Add, &Cell::Float(f64::NAN), &Cell::Int(1)).unwrap();
    assert!(out.is_missing());
}

#[test]
fn string_plus_int_is_type_error() {
    let err = arith(ArithOp::Add, &s("a"), &Cell::Int(1)).unwrap_err();
    assert!(matches!(err, FrameError::TypeError(_)));
}

#[test]
fn floor_division_of_the_smallest_int_does_not_overflow() {
    let out = arith(ArithOp::FloorDiv, &Cell::Int(i64::MIN), &Cell::Int(-1)).unwrap();
    assert_eq!(out, Cell::Float(9.223372036854776e18));
    let out = arith(ArithOp::Mod, &Cell::Int(i64::MIN), &Cell::Int(-1)).unwrap();
    assert_eq!(out, Cell::Int(0));
}

#[test]
fn string_repetition_past_the_cap_is_memory_error() {
    let err = arith(ArithOp::Mul, &s("a"), &Cell::Int(1_000_000_000_000)).unwrap_err();
    assert!(matches!(err, FrameError::MemoryError(_)));
    assert_eq!(arith(ArithOp::Mul, &s("ab"), &Cell::Int(3)).unwrap(), s("ababab"));
    assert_eq!(arith(ArithOp::Mul, &s("ab"), &Cell::Int(-2)).unwrap(), s(""));
}

#[test]
fn datetime_compares_with_date_string() {
    let dt = Cell::DateTime(parse_datetime("2024-03-01").unwrap());
    assert!(compare(CmpOp::Gt, &dt, &s("2024-02-01")).unwrap());
    assert!(!compare(CmpOp::Eq, &Cell::Null, &Cell::Null).unwrap());
}

// ---------------------------------------------------------------------------
// Series
// ---------------------------------------------------------------------------

#[test]
fn reductions_skip_missing_values() {
    let price = sales().column("price").unwrap();
    assert_eq!(price.count(), 4);
    assert!((price.mean().unwrap() - 2.75).abs() < 1e-9);
    assert_eq!(price.max(), Cell::Float(4.0));
    assert!((price.median().unwrap() - 2.75).abs() < 1e-9);
}

#[test]
fn integer_sum_stays_integer() {
    assert_eq!(sales().column("units").unwrap().sum().unwrap(), Cell::Int(30));
}

#[test]
fn mean_of_text_is_type_error() {
    let err = sales().column("region").unwrap().mean().unwrap_err();
    assert!(matches!(err, FrameError::TypeError(_)));
}

#[test]
fn value_counts_orders_by_frequency() {
    let counts = sales().column("region").unwrap().value_counts(false, false, true);
    assert_eq!(counts.name.as_deref(), Some("count"));
    assert_eq!(counts.index.label(0), &[s("north")]);
    assert_eq!(counts.values[0], Cell::Int(2));
    assert_eq!(counts.index.label(2), &[s("east")]);

    let shares = sales().column("region").unwrap().value_counts(true, false, true);
    assert_eq!(shares.name.as_deref(), Some("proportion"));
    assert_eq!(shares.values[2], Cell::Float(0.2));
}

#[test]
fn sort_values_puts_missing_last_both_ways() {
    let price = sales().column("price").unwrap();
    let desc = price.sort_values(false);
    assert_eq!(desc.values[0], Cell::Float(4.0));
    assert!(desc.values[4].is_missing());
    let asc = price.sort_values(true);
    assert_eq!(asc.values[0], Cell::Float(1.5));
    assert!(asc.values[4].is_missing());
}

#[test]
fn nlargest_keeps_original_labels() {
    let top = sales().column("units").unwrap().nlargest(2);
    assert_eq!(top.values, vec![Cell::Int(10), Cell::Int(8)]);
    assert_eq!(top.index.label(1), &[Cell::Int(3)]);
}

#[test]
fn quantile_interpolates_linearly() {
    let x = Series::new(None, vec![Cell::Int(1), Cell::Int(2), Cell::Int(3), Cell::Int(4)]);
    assert!((x.quantile(0.25).unwrap() - 1.75).abs() < 1e-9);
    assert!(x.quantile(1.5).is_err());
}

#[test]
fn astype_converts_text_to_numbers() {
    let x = Series::new(None, vec![s("1"), s("22")]);
    let ints = x.astype("int").unwrap();
    assert_eq!(ints.dtype, DType::Int64);
    assert!(x.astype("datetime64").is_err());
    assert!(Series::new(None, vec![s("x")]).astype("float").is_err());
}

#[test]
fn comparison_builds_boolean_mask() {
    let t = sales();
    let mask = t
        .column("units")
        .unwrap()
        .compare_scalar(CmpOp::Gt, &Cell::Int(5), false)
        .unwrap()
        .as_mask()
        .unwrap();
    let filtered = t.filter(&mask).unwrap();
    assert_eq!(filtered.nrows(), 3);
    assert_eq!(filtered.index.label(2), &[Cell::Int(3)]);
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

#[test]
fn mismatched_column_lengths_are_rejected() {
    let err = Table::new(vec![
        ("a".to_string(), vec![Cell::Int(1)]),
        ("b".to_string(), vec![Cell::Int(1), Cell::Int(2)]),
    ])
    .unwrap_err();
    assert_eq!(err, FrameError::LengthMismatch { expected: 1, got: 2 });
}

#[test]
fn missing_column_is_key_error() {
    assert_eq!(
        sales().column("nope").unwrap_err(),
        FrameError::KeyError("nope".into())
    );
}

#[test]
fn set_column_replaces_in_place() {
    let mut t = sales();
    t.set_scalar("units", Cell::Int(0));
    assert_eq!(t.column_names(), vec!["region", "units", "price"]);
    assert!(t.set_column("extra", vec![Cell::Int(1)]).is_err());
}

#[test]
fn multi_key_sort_is_stable() {
    let t = sales()
        .sort_by(&["region".to_string(), "units".to_string()], &[true, false])
        .unwrap();
    let regions: Vec<String> = t.column("region").unwrap().values.iter().map(|c| c.to_string()).collect();
    assert_eq!(regions, vec!["east", "north", "north", "south", "south"]);
    assert_eq!(t.column("units").unwrap().values[1], Cell::Int(10));
}

#[test]
fn dropna_subset_only_checks_named_columns() {
    let t = sales();
    assert_eq!(t.dropna(None).unwrap().nrows(), 4);
    assert_eq!(t.dropna(Some(&["units".to_string()])).unwrap().nrows(), 5);
}

#[test]
fn describe_reports_numeric_columns() {
    let d = sales().describe().unwrap();
    assert_eq!(d.column_names(), vec!["units", "price"]);
    assert_eq!(d.index.label(0), &[s("count")]);
    assert_eq!(d.column("price").unwrap().values[0], Cell::Float(4.0));
}

#[test]
fn reset_index_restores_group_keys() {
    let g = sales().group_by(&["region".to_string()]).unwrap();
    let t = g.aggregate_all(Agg::Sum).unwrap().reset_index(false);
    assert_eq!(t.column_names(), vec!["region", "units", "price"]);
    assert!(t.index.is_default_range());
}

#[test]
fn rename_leaves_unmapped_columns() {
    let mut mapping = HashMap::new();
    mapping.insert("units".to_string(), "qty".to_string());
    assert_eq!(sales().rename(&mapping).column_names(), vec!["region", "qty", "price"]);
}

#[test]
fn concat_unions_columns() {
    let a = Table::new(vec![("x".to_string(), vec![Cell::Int(1)])]).unwrap();
    let b = Table::new(vec![("y".to_string(), vec![Cell::Int(2)])]).unwrap();
    let c = Table::concat(&[a, b], true).unwrap();
    assert_eq!(c.shape(), (2, 2));
    assert!(c.column("y").unwrap().values[0].is_missing());
}

// ---------------------------------------------------------------------------
// Group-by
// ---------------------------------------------------------------------------

#[test]
fn groups_are_sorted_by_key() {
    let g = sales().group_by(&["region".to_string()]).unwrap();
    let sums = g.aggregate_column("units", Agg::Sum).unwrap();
    assert_eq!(sums.index.label(0), &[s("east")]);
    assert_eq!(sums.values, vec![Cell::Int(8), Cell::Int(16), Cell::Int(6)]);
}

#[test]
fn mean_aggregate_skips_text_columns() {
    let g = sales().group_by(&["region".to_string()]).unwrap();
    let means = g.aggregate_all(Agg::Mean).unwrap();
    assert_eq!(means.column_names(), vec!["units", "price"]);
    assert_eq!(means.column("price").unwrap().values[1], Cell::Float(2.5));
}

#[test]
fn named_aggregation_uses_output_names() {
    let g = sales().group_by(&["region".to_string()]).unwrap();
    let t = g
        .aggregate(&[
            AggSpec {
                column: "units".into(),
                agg: Agg::Max,
                output: "peak".into(),
            },
            AggSpec {
                column: "units".into(),
                agg: Agg::Count,
                output: "orders".into(),
            },
        ])
        .unwrap();
    assert_eq!(t.column_names(), vec!["peak", "orders"]);
    assert_eq!(t.column("orders").unwrap().values[1], Cell::Int(2));
}

#[test]
fn group_size_and_get_group() {
    let g = sales().group_by(&["region".to_string()]).unwrap();
    assert_eq!(g.size().values, vec![Cell::Int(1), Cell::Int(2), Cell::Int(2)]);
    assert_eq!(g.get_group(&[s("south")]).unwrap().nrows(), 2);
    assert!(g.get_group(&[s("west")]).is_err());
}

// ---------------------------------------------------------------------------
// Ingestion and conversion
// ---------------------------------------------------------------------------

#[test]
fn csv_columns_are_typed() {
    let csv = b"date,amount,name,flag\n2024-01-01,10,a,true\n2024-01-02,,b,false\n2024-01-03,3.5,c,true\n";
    let t = read_csv(csv).unwrap();
    let dtypes: Vec<&str> = t.dtypes().iter().map(|(_, d)| d.as_str()).collect();
    assert_eq!(dtypes, vec!["datetime64[ns]", "float64", "object", "bool"]);
    assert!(t.column("amount").unwrap().values[1].is_missing());
}

#[test]
fn csv_ragged_rows_are_rejected() {
    let err = read_csv(b"a,b\n1,2\n3\n").unwrap_err();
    assert!(matches!(err, TableError::Csv(_)));
}

#[test]
fn duplicate_csv_headers_are_suffixed() {
    let t = read_csv(b"a,a,\n1,2,3\n").unwrap();
    assert_eq!(t.column_names(), vec!["a", "a.1", "Unnamed: 2"]);
}

#[test]
fn json_records_union_keys() {
    let t = read_json_records(br#"[{"a": 1, "b": "x"}, {"a": 2, "c": true}]"#).unwrap();
    assert_eq!(t.column_names(), vec!["a", "b", "c"]);
    assert!(t.column("b").unwrap().values[1].is_missing());
}

#[test]
fn json_must_be_records() {
    assert!(matches!(
        read_json_records(br#"{"a": 1}"#).unwrap_err(),
        TableError::Invalid(_)
    ));
    assert!(matches!(TableFormat::detect("data.xlsx"), Err(TableError::UnsupportedFormat(_))));
}

#[test]
fn coerce_turns_bad_dates_into_nat() {
    assert_eq!(to_datetime(&s("garbage"), None, Errors::Coerce).unwrap(), Cell::NaT);
    assert!(to_datetime(&s("garbage"), None, Errors::Raise).is_err());
    assert_eq!(to_numeric(&s("1,200"), Errors::Raise).unwrap(), Cell::Int(1200));
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

#[test]
fn table_renders_with_aligned_columns() {
    let t = Table::new(vec![
        ("a".to_string(), vec![Cell::Int(1), Cell::Int(20)]),
        ("b".to_string(), vec![s("x"), s("yy")]),
    ])
    .unwrap();
    assert_eq!(render_table(&t), "    a   b\n0   1   x\n1  20  yy");
}

#[test]
fn series_renders_footer() {
    let x = Series::new(Some("v".into()), vec![Cell::Int(1), Cell::Int(2)]);
    assert_eq!(render_series(&x), "0    1\n1    2\nName: v, dtype: int64");
}
