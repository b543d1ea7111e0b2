// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

use super::*;
use crate::frame::parse_datetime;

fn admissions() -> Table {
    Table::new(vec![
        (
            "patient".to_string(),
            vec![Cell::Str("a".into()), Cell::Str("b".into()), Cell::Str("c".into())],
        ),
        (
            "admitted".to_string(),
            vec![
                Cell::DateTime(parse_datetime("2024-01-05").unwrap()),
                Cell::NaT,
                Cell::DateTime(parse_datetime("2024-02-10 08:30:00").unwrap()),
            ],
        ),
        (
            "score".to_string(),
            vec![Cell::Float(1.5), Cell::Float(f64::NAN), Cell::Float(f64::INFINITY)],
        ),
    ])
    .unwrap()
}

#[test]
fn floats_map_to_json_safe_values() {
    let s = ValueSerializer::default();
    assert_eq!(s.serialize(&Serializable::Float(f64::NAN)), Value::Null);
    assert_eq!(s.serialize(&Serializable::Float(f64::INFINITY)), json!("Infinity"));
    assert_eq!(s.serialize(&Serializable::Float(f64::NEG_INFINITY)), json!("-Infinity"));
    assert_eq!(s.serialize(&Serializable::Float(2.5)), json!(2.5));
    assert_eq!(s.serialize(&Serializable::Float(-0.0)), json!(-0.0));
}

#[test]
fn scalars_pass_through() {
    let s = ValueSerializer::default();
    assert_eq!(s.serialize(&Serializable::Null), Value::Null);
    assert_eq!(s.serialize(&Serializable::Int(12)), json!(12));
    assert_eq!(s.serialize(&Serializable::Str("x".into())), json!("x"));
    assert_eq!(s.serialize(&Serializable::Bool(true)), json!(true));
}

#[test]
fn nat_cell_in_table_becomes_null() {
    let s = ValueSerializer::default();
    let v = s.serialize(&Serializable::Table(admissions()));
    assert_eq!(v["type"], "dataframe");
    assert_eq!(v["shape"], json!([3, 3]));
    assert_eq!(v["head"][1]["admitted"], Value::Null);
    assert_eq!(v["head"][0]["admitted"], "2024-01-05T00:00:00");
    assert_eq!(v["head"][2]["score"], "Infinity");
    assert_eq!(v["dtypes"]["admitted"], "datetime64[ns]");
    assert_eq!(s.stats().nat_values_handled, 1);
    assert_eq!(s.stats().nan_values_handled, 1);
}

#[test]
fn empty_table_keeps_shape_and_columns() {
    let s = ValueSerializer::default();
    let empty = admissions().head(0);
    let v = s.serialize(&Serializable::Table(empty));
    assert_eq!(v["shape"], json!([0, 3]));
    assert_eq!(v["columns"], json!(["patient", "admitted", "score"]));
    assert_eq!(v["head"], json!([]));
}

#[test]
fn table_head_is_capped() {
    let s = ValueSerializer::new(2);
    let v = s.serialize(&Serializable::Table(admissions()));
    assert_eq!(v["head"].as_array().unwrap().len(), 2);
    assert_eq!(v["shape"], json!([3, 3]));
}

#[test]
fn series_summary() {
    let s = ValueSerializer::default();
    let series = admissions().column("score").unwrap();
    let v = s.serialize(&Serializable::Series(series));
    assert_eq!(v["type"], "series");
    assert_eq!(v["name"], "score");
    assert_eq!(v["length"], 3);
    assert_eq!(v["dtype"], "float64");
    assert_eq!(v["head"], json!([1.5, null, "Infinity"]));
}

#[test]
fn figure_carries_plotly_json_without_html() {
    let s = ValueSerializer::default();
    let v = s.serialize(&Serializable::Figure(Figure::new()));
    assert_eq!(v["type"], "plotly_figure");
    assert!(v["json"].as_str().unwrap().contains("\"data\""));
    assert!(v.get("html").is_none());
}

#[test]
fn nested_collections_recurse() {
    let s = ValueSerializer::default();
    let value = Serializable::Mapping(vec![
        (
            "xs".into(),
            Serializable::Sequence(vec![Serializable::Float(f64::NAN), Serializable::Int(1)]),
        ),
        ("arr".into(), Serializable::Vector(vec![Cell::Int(1), Cell::Float(f64::NAN)])),
        (
            "when".into(),
            Serializable::Timestamp(parse_datetime("2024-03-01 12:00:00").unwrap()),
        ),
        ("gone".into(), Serializable::NaT),
    ]);
    assert_eq!(
        s.serialize(&value),
        json!({"xs": [null, 1], "arr": [1, null], "when": "2024-03-01T12:00:00", "gone": null})
    );
}

#[test]
fn failures_become_placeholders_not_errors() {
    let s = ValueSerializer::default();
    let report = s.serialize_report(&Serializable::Sequence(vec![
        Serializable::Int(1),
        Serializable::Unserializable {
            type_name: "generator".into(),
        },
    ]));
    assert_eq!(report.value, json!([1, "<Serialization Error: generator>"]));
    assert_eq!(report.placeholders, 1);
    assert_eq!(s.stats().errors_handled, 1);
}

#[test]
fn excessive_nesting_is_cut_off() {
    let s = ValueSerializer::default();
    let mut value = Serializable::Int(0);
    for _ in 0..100 {
        value = Serializable::Sequence(vec![value]);
    }
    let report = s.serialize_report(&value);
    assert_eq!(report.placeholders, 1);
}

#[test]
fn opaque_values_are_stringified() {
    let s = ValueSerializer::default();
    let v = s.serialize(&Serializable::Opaque {
        type_name: "function".into(),
        repr: "<function f>".into(),
    });
    assert_eq!(v, json!("<function f>"));
}

#[test]
fn timedelta_uses_iso_duration() {
    let s = ValueSerializer::default();
    let v = s.serialize(&Serializable::Timedelta(Duration::days(2) + Duration::hours(3)));
    assert_eq!(v, json!("P2DT3H0M0S"));
}

#[test]
fn stats_reset() {
    let s = ValueSerializer::default();
    s.serialize(&Serializable::Float(f64::NAN));
    assert!(s.stats().total_serialized > 0);
    s.reset_stats();
    assert_eq!(s.stats(), SerializationStats::default());
}
