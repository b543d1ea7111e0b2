// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// Format-spec mini-language shared by f-strings, `format()`,
// `str.format` and `%` interpolation.

use crate::frame::format_float;

use super::value::{check_str_len, Args, Exception, Res, Value};

#[derive(Debug, Clone, Default, PartialEq)]
struct Spec {
    fill: Option<char>,
    align: Option<char>,
    sign: Option<char>,
    alternate: bool,
    zero: bool,
    width: usize,
    grouping: Option<char>,
    precision: Option<usize>,
    kind: Option<char>,
}

fn parse_spec(spec: &str) -> Res<Spec> {
    let chars: Vec<char> = spec.chars().collect();
    let mut out = Spec::default();
    let mut i = 0;
    let is_align = |c: char| matches!(c, '<' | '>' | '^' | '=');

    if chars.len() >= 2 && is_align(chars[1]) {
        out.fill = Some(chars[0]);
        out.align = Some(chars[1]);
        i = 2;
    } else if !chars.is_empty() && is_align(chars[0]) {
        out.align = Some(chars[0]);
        i = 1;
    }
    if let Some(&c) = chars.get(i) {
        if matches!(c, '+' | '-' | ' ') {
            out.sign = Some(c);
            i += 1;
        }
    }
    if chars.get(i) == Some(&'#') {
        out.alternate = true;
        i += 1;
    }
    if chars.get(i) == Some(&'0') {
        out.zero = true;
        i += 1;
    }
    let start = i;
    while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
        i += 1;
    }
    if i > start {
        out.width = chars[start..i].iter().collect::<String>().parse().unwrap_or(0);
    }
    if let Some(&c) = chars.get(i) {
        if c == ',' || c == '_' {
            out.grouping = Some(c);
            i += 1;
        }
    }
    if chars.get(i) == Some(&'.') {
        i += 1;
        let start = i;
        while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
            i += 1;
        }
        if i == start {
            return Err(Exception::value_error("Format specifier missing precision"));
        }
        out.precision = chars[start..i].iter().collect::<String>().parse().ok();
    }
    if let Some(&c) = chars.get(i) {
        out.kind = Some(c);
        i += 1;
    }
    if i != chars.len() {
        return Err(Exception::value_error(format!(
            "Invalid format specifier '{spec}'"
        )));
    }
    out.check_size()?;
    Ok(out)
}

impl Spec {
    /// Width and precision both size the rendered text.
    fn check_size(&self) -> Res<()> {
        check_str_len(self.width)?;
        check_str_len(self.precision.unwrap_or(0))
    }
}

/// `format(value, spec)`.
pub(crate) fn format_with_spec(value: &Value, spec: &str) -> Res<String> {
    if spec.is_empty() {
        return Ok(value.to_str());
    }
    if let Value::DateTime(dt) = value {
        return Ok(dt.format(spec).to_string());
    }
    let parsed = parse_spec(spec)?;
    apply(value, &parsed)
}

fn apply(value: &Value, spec: &Spec) -> Res<String> {
    let (body, numeric) = match value {
        Value::Bool(b) if spec.kind.is_none() => (if *b { "True" } else { "False" }.to_string(), false),
        Value::Int(_) | Value::Bool(_) => {
            let i = value.as_int().unwrap_or(0);
            (format_int(i, spec)?, true)
        }
        Value::Float(f) => (format_number(*f, spec)?, true),
        Value::Str(s) => {
            if let Some(k) = spec.kind.filter(|k| *k != 's') {
                return Err(Exception::value_error(format!(
                    "Unknown format code '{k}' for object of type 'str'"
                )));
            }
            let text: String = match spec.precision {
                Some(p) => s.chars().take(p).collect(),
                None => s.to_string(),
            };
            (text, false)
        }
        other => (other.to_str(), false),
    };
    Ok(pad(body, spec, numeric))
}

fn format_int(i: i64, spec: &Spec) -> Res<String> {
    let digits = match spec.kind {
        None | Some('d') | Some('n') => i.unsigned_abs().to_string(),
        Some('x') => format!("{:x}", i.unsigned_abs()),
        Some('X') => format!("{:X}", i.unsigned_abs()),
        Some('o') => format!("{:o}", i.unsigned_abs()),
        Some('b') => format!("{:b}", i.unsigned_abs()),
        Some('c') => {
            return char::from_u32(i as u32)
                .map(|c| c.to_string())
                .ok_or_else(|| Exception::new("OverflowError", "%c arg not in range(0x110000)"))
        }
        Some('e' | 'E' | 'f' | 'F' | 'g' | 'G' | '%') => return format_number(i as f64, spec),
        Some(k) => {
            return Err(Exception::value_error(format!(
                "Unknown format code '{k}' for object of type 'int'"
            )))
        }
    };
    let digits = group(&digits, spec.grouping);
    let prefix = match (spec.alternate, spec.kind) {
        (true, Some('x')) => "0x",
        (true, Some('X')) => "0X",
        (true, Some('o')) => "0o",
        (true, Some('b')) => "0b",
        _ => "",
    };
    Ok(format!("{}{prefix}{digits}", sign_of(i < 0, spec)))
}

fn format_number(x: f64, spec: &Spec) -> Res<String> {
    let negative = x.is_sign_negative() && !x.is_nan() && x != 0.0;
    let a = x.abs();
    let body = if x.is_nan() {
        "nan".to_string()
    } else if a.is_infinite() {
        "inf".to_string()
    } else {
        match spec.kind {
            Some('f' | 'F') => group_fixed(&format!("{a:.*}", spec.precision.unwrap_or(6)), spec.grouping),
            Some('%') => format!("{:.*}%", spec.precision.unwrap_or(6), a * 100.0),
            Some('e') => sci(a, spec.precision.unwrap_or(6)),
            Some('E') => sci(a, spec.precision.unwrap_or(6)).to_uppercase(),
            Some('g' | 'G' | 'n') => general(a, spec.precision.unwrap_or(6), spec.alternate),
            None => match spec.precision {
                Some(p) => general(a, p, spec.alternate),
                None => group_fixed(&format_float(a), spec.grouping),
            },
            Some(k) => {
                return Err(Exception::value_error(format!(
                    "Unknown format code '{k}' for object of type 'float'"
                )))
            }
        }
    };
    Ok(format!("{}{body}", sign_of(negative, spec)))
}

fn sign_of(negative: bool, spec: &Spec) -> &'static str {
    match (negative, spec.sign) {
        (true, _) => "-",
        (false, Some('+')) => "+",
        (false, Some(' ')) => " ",
        _ => "",
    }
}

/// `1.500000e+03`
fn sci(a: f64, precision: usize) -> String {
    let raw = format!("{a:.precision$e}");
    let (mantissa, exp) = raw.split_once('e').unwrap_or((&raw, "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    format!("{mantissa}e{}{:02}", if exp < 0 { '-' } else { '+' }, exp.abs())
}

fn general(a: f64, precision: usize, keep_zeros: bool) -> String {
    let p = precision.max(1);
    if a == 0.0 {
        return "0".to_string();
    }
    let exp = a.log10().floor() as i32;
    let text = if exp < -4 || exp >= p as i32 {
        let s = sci(a, p - 1);
        match s.split_once('e') {
            Some((m, e)) if !keep_zeros => format!("{}e{e}", strip_zeros(m)),
            _ => s,
        }
    } else {
        let decimals = (p as i32 - 1 - exp).max(0) as usize;
        let s = format!("{a:.decimals$}");
        if keep_zeros {
            s
        } else {
            strip_zeros(&s)
        }
    };
    text
}

fn strip_zeros(s: &str) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s.to_string()
    }
}

fn group(digits: &str, sep: Option<char>) -> String {
    let Some(sep) = sep else {
        return digits.to_string();
    };
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(sep);
        }
        out.push(c);
    }
    out
}

fn group_fixed(text: &str, sep: Option<char>) -> String {
    match text.split_once('.') {
        Some((int, frac)) => format!("{}.{frac}", group(int, sep)),
        None => group(text, sep),
    }
}

fn pad(body: String, spec: &Spec, numeric: bool) -> String {
    let len = body.chars().count();
    if len >= spec.width {
        return body;
    }
    let missing = spec.width - len;
    let (fill, align) = if spec.zero && spec.align.is_none() && numeric {
        ('0', '=')
    } else {
        (
            spec.fill.unwrap_or(' '),
            spec.align.unwrap_or(if numeric { '>' } else { '<' }),
        )
    };
    let filler = |n: usize| std::iter::repeat(fill).take(n).collect::<String>();
    match align {
        '<' => format!("{body}{}", filler(missing)),
        '^' => format!("{}{body}{}", filler(missing / 2), filler(missing - missing / 2)),
        '=' => {
            let split = body
                .char_indices()
                .find(|(_, c)| !matches!(c, '+' | '-' | ' '))
                .map(|(i, _)| i)
                .unwrap_or(0);
            format!("{}{}{}", &body[..split], filler(missing), &body[split..])
        }
        _ => format!("{}{body}", filler(missing)),
    }
}

// ---------------------------------------------------------------------------
// printf-style
// ---------------------------------------------------------------------------

/// `fmt % args`.
pub(crate) fn percent_format(fmt: &str, args: &Value) -> Res<String> {
    let positional: Vec<Value> = match args {
        Value::Tuple(items) => (**items).clone(),
        Value::Dict(_) => Vec::new(),
        other => vec![other.clone()],
    };
    let mut next = positional.into_iter();
    let mut out = String::with_capacity(fmt.len());
    let chars: Vec<char> = fmt.chars().collect();
    let mut i = 0;
    let incomplete = || Exception::value_error("incomplete format");

    while i < chars.len() {
        let c = chars[i];
        i += 1;
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut key = None;
        if chars.get(i) == Some(&'(') {
            let close = chars[i..].iter().position(|&c| c == ')').ok_or_else(incomplete)?;
            key = Some(chars[i + 1..i + close].iter().collect::<String>());
            i += close + 1;
        }
        let mut spec = Spec::default();
        while let Some(&flag) = chars.get(i) {
            match flag {
                '-' => spec.align = Some('<'),
                '0' => spec.zero = true,
                '+' | ' ' => spec.sign = Some(flag),
                '#' => spec.alternate = true,
                _ => break,
            }
            i += 1;
        }
        let start = i;
        while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
            i += 1;
        }
        spec.width = chars[start..i].iter().collect::<String>().parse().unwrap_or(0);
        if chars.get(i) == Some(&'.') {
            i += 1;
            let start = i;
            while chars.get(i).is_some_and(|c| c.is_ascii_digit()) {
                i += 1;
            }
            spec.precision = Some(chars[start..i].iter().collect::<String>().parse().unwrap_or(0));
        }
        let kind = *chars.get(i).ok_or_else(incomplete)?;
        i += 1;
        if kind == '%' {
            out.push('%');
            continue;
        }
        if spec.align == Some('<') {
            spec.zero = false;
        }
        spec.check_size()?;

        let value = match &key {
            Some(k) => match args {
                Value::Dict(d) => d
                    .borrow()
                    .get(&Value::str(k))?
                    .cloned()
                    .ok_or_else(|| Exception::key_error(super::value::quote(k)))?,
                _ => return Err(Exception::type_error("format requires a mapping")),
            },
            None => next.next().ok_or_else(|| {
                Exception::type_error("not enough arguments for format string")
            })?,
        };
        let text = match kind {
            's' => pad(value.to_str(), &Spec { kind: None, ..spec.clone() }, false),
            'r' | 'a' => pad(value.repr(), &Spec { kind: None, ..spec.clone() }, false),
            'd' | 'i' | 'u' => {
                let int = match &value {
                    Value::Float(f) => Value::Int(f.trunc() as i64),
                    other if other.as_int().is_some() => Value::Int(other.as_int().unwrap_or(0)),
                    other => {
                        return Err(Exception::type_error(format!(
                            "%{kind} format: a real number is required, not {}",
                            other.type_name()
                        )))
                    }
                };
                apply(&int, &Spec { kind: Some('d'), ..spec })?
            }
            'f' | 'F' | 'e' | 'E' | 'g' | 'G' => {
                let x = value.as_f64().ok_or_else(|| {
                    Exception::type_error(format!(
                        "must be real number, not {}",
                        value.type_name()
                    ))
                })?;
                apply(&Value::Float(x), &Spec { kind: Some(kind), ..spec })?
            }
            'x' | 'X' | 'o' | 'c' => apply(&value, &Spec { kind: Some(kind), ..spec })?,
            other => {
                return Err(Exception::value_error(format!(
                    "unsupported format character '{other}'"
                )))
            }
        };
        out.push_str(&text);
    }
    if next.next().is_some() {
        return Err(Exception::type_error(
            "not all arguments converted during string formatting",
        ));
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// str.format
// ---------------------------------------------------------------------------

/// `template.format(*args, **kwargs)`.
pub(crate) fn str_format(template: &str, args: &Args) -> Res<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut auto = 0usize;

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => {
                return Err(Exception::value_error(
                    "Single '}' encountered in format string",
                ))
            }
            '{' => {
                let mut field = String::new();
                let mut depth = 1;
                for c in chars.by_ref() {
                    match c {
                        '{' => depth += 1,
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    field.push(c);
                }
                if depth != 0 {
                    return Err(Exception::value_error(
                        "expected '}' before end of string",
                    ));
                }
                let (head, spec) = match field.split_once(':') {
                    Some((h, s)) => (h.to_string(), s.to_string()),
                    None => (field.clone(), String::new()),
                };
                let (name, conversion) = match head.split_once('!') {
                    Some((n, c)) => (n.to_string(), c.chars().next()),
                    None => (head, None),
                };
                let value = lookup_field(&name, args, &mut auto)?;
                let value = match conversion {
                    Some('r') | Some('a') => Value::str(value.repr()),
                    Some('s') => Value::str(value.to_str()),
                    _ => value,
                };
                out.push_str(&format_with_spec(&value, &spec)?);
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

fn lookup_field(name: &str, args: &Args, auto: &mut usize) -> Res<Value> {
    let (base, key) = match name.split_once('[') {
        Some((b, rest)) => (b, Some(rest.trim_end_matches(']'))),
        None => (name, None),
    };
    let value = if base.is_empty() {
        let v = args.pos.get(*auto).cloned();
        *auto += 1;
        v.ok_or_else(|| {
            Exception::index_error(format!(
                "Replacement index {} out of range for positional args tuple",
                *auto - 1
            ))
        })?
    } else if let Ok(i) = base.parse::<usize>() {
        args.pos.get(i).cloned().ok_or_else(|| {
            Exception::index_error(format!(
                "Replacement index {i} out of range for positional args tuple"
            ))
        })?
    } else {
        args.kw(base)
            .cloned()
            .ok_or_else(|| Exception::key_error(super::value::quote(base)))?
    };
    match key {
        None => Ok(value),
        Some(k) => match &value {
            Value::Dict(d) => d
                .borrow()
                .get(&Value::str(k))?
                .cloned()
                .ok_or_else(|| Exception::key_error(super::value::quote(k))),
            Value::List(items) => {
                let i: usize = k.parse().map_err(|_| Exception::type_error("list indices must be integers"))?;
                items
                    .borrow()
                    .get(i)
                    .cloned()
                    .ok_or_else(|| Exception::index_error("list index out of range"))
            }
            other => Err(Exception::type_error(format!(
                "'{}' object is not subscriptable",
                other.type_name()
            ))),
        },
    }
}
