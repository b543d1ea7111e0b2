// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// Result extraction: pick the named variables worth returning from a
// finished run and classify each for the serializer.

use std::collections::HashSet;

use crate::serialize::Serializable;

use super::interp::Interpreter;
use super::value::{range_item, range_len, Value, MAX_SEQUENCE_LEN};

/// Names checked first, highest priority first.
pub(crate) const PRIORITY_NAMES: &[&str] = &[
    "fig", "figure", "result", "output", "plot", "chart", "summary", "analysis",
];

/// Binding that holds the caller's table.
pub(crate) const INPUT_TABLE: &str = "df";

const MAX_NESTING: usize = 64;

/// One extracted variable.
pub(crate) struct Extracted {
    pub name: String,
    pub value: Serializable,
    /// Standalone HTML for figures.
    pub html: Option<String>,
}

/// Collect priority names, then every other figure or table, keeping one
/// entry per object.
pub(crate) fn extract_results(interp: &Interpreter, input: Option<&Value>) -> Vec<Extracted> {
    let mut seen: HashSet<usize> = HashSet::new();
    let mut out = Vec::new();
    let mut take = |name: &str, value: &Value, out: &mut Vec<Extracted>| {
        if let Some(id) = value.identity() {
            if !seen.insert(id) {
                return;
            }
        }
        let html = match value {
            Value::Figure(f) => Some(f.borrow().to_html()),
            _ => None,
        };
        out.push(Extracted {
            name: name.to_string(),
            value: to_serializable(value),
            html,
        });
    };

    for name in PRIORITY_NAMES {
        if let Some(value) = interp.global(name) {
            take(name, &value, &mut out);
        }
    }
    for name in interp.global_names() {
        if PRIORITY_NAMES.contains(&name.as_str()) {
            continue;
        }
        let Some(value) = interp.global(&name) else {
            continue;
        };
        if !matches!(value, Value::Figure(_) | Value::Frame(_)) {
            continue;
        }
        let untouched_input =
            name == INPUT_TABLE && input.is_some_and(|original| original.same_object(&value));
        if untouched_input {
            continue;
        }
        take(&name, &value, &mut out);
    }
    out
}

/// Classify a runtime value. A container holding itself and very deep
/// nesting become an unserializable marker rather than recursing forever.
pub(crate) fn to_serializable(value: &Value) -> Serializable {
    classify(value, &mut Vec::new())
}

/// `active` holds the identities of the containers being classified.
fn classify(value: &Value, active: &mut Vec<usize>) -> Serializable {
    let unserializable = || Serializable::Unserializable {
        type_name: value.type_name(),
    };
    if active.len() > MAX_NESTING {
        return unserializable();
    }
    let id = match value {
        Value::List(_) | Value::Tuple(_) | Value::Dict(_) | Value::Set(_) => value.identity(),
        _ => None,
    };
    if let Some(id) = id {
        if active.contains(&id) {
            return unserializable();
        }
        active.push(id);
    }
    let out = classify_once(value, active);
    if id.is_some() {
        active.pop();
    }
    out
}

fn classify_once(value: &Value, active: &mut Vec<usize>) -> Serializable {
    let mut items = |values: &[Value]| {
        Serializable::Sequence(values.iter().map(|v| classify(v, active)).collect())
    };
    match value {
        Value::None => Serializable::Null,
        Value::Bool(b) => Serializable::Bool(*b),
        Value::Int(i) => Serializable::Int(*i),
        Value::Float(f) => Serializable::Float(*f),
        Value::Str(s) => Serializable::Str(s.to_string()),
        Value::DateTime(dt) => Serializable::Timestamp(*dt),
        Value::Timedelta(d) => Serializable::Timedelta(*d),
        Value::NaT => Serializable::NaT,
        Value::List(list) => match list.try_borrow() {
            Ok(list) => items(&list[..]),
            Err(_) => Serializable::Unserializable {
                type_name: "list".into(),
            },
        },
        Value::Tuple(values) => items(&values[..]),
        Value::Set(set) => {
            let keys = set.borrow().keys();
            items(&keys)
        }
        // Too long to list out; the result carries its repr instead.
        Value::Range(start, stop, step) if range_len(*start, *stop, *step) > MAX_SEQUENCE_LEN => {
            Serializable::Opaque {
                type_name: value.type_name(),
                repr: value.repr(),
            }
        }
        Value::Range(start, stop, step) => Serializable::Sequence(
            (0..range_len(*start, *stop, *step))
                .map(|i| Serializable::Int(range_item(*start, *step, i)))
                .collect(),
        ),
        Value::Dict(dict) => {
            let entries = dict.borrow().entries.clone();
            Serializable::Mapping(
                entries.iter().map(|(k, v)| (k.to_str(), classify(v, active))).collect(),
            )
        }
        Value::Frame(t) => Serializable::Table(t.borrow().clone()),
        Value::Series(s) => Serializable::Series(s.borrow().clone()),
        Value::Array(cells) => Serializable::Vector(cells.borrow().clone()),
        Value::Figure(f) => Serializable::Figure(f.borrow().clone()),
        other => Serializable::Opaque {
            type_name: other.type_name(),
            repr: other.to_str(),
        },
    }
}
