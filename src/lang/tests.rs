// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

use super::ast::*;
use super::*;

fn parse_ok(src: &str) -> Vec<Stmt> {
    match parse_module(src) {
        Ok(body) => body,
        Err(e) => panic!("expected {src:?} to parse, got {e}"),
    }
}

fn parse_err(src: &str) -> ParseError {
    match parse_module(src) {
        Ok(body) => panic!("expected {src:?} to fail, got {body:?}"),
        Err(e) => e,
    }
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[test]
fn indentation_produces_block_tokens() {
    let tokens = tokenize("if x:\n    y = 1\nz = 2\n").unwrap();
    let kinds: Vec<&Tok> = tokens.iter().map(|t| &t.tok).collect();
    assert!(kinds.contains(&&Tok::Indent));
    assert!(kinds.contains(&&Tok::Dedent));
    assert_eq!(tokens.last().unwrap().tok, Tok::Eof);
}

#[test]
fn newlines_inside_brackets_are_joined() {
    let body = parse_ok("x = [\n    1,\n    2,\n]\ny = 3\n");
    assert_eq!(body.len(), 2);
    assert_eq!(body[1].line, 5);
}

#[test]
fn string_escapes_are_resolved() {
    let body = parse_ok("s = 'a\\nb'\nr = r'a\\nb'\n");
    match &body[0].kind {
        StmtKind::Assign { value, .. } => assert_eq!(value, &Expr::Str("a\nb".into())),
        other => panic!("unexpected {other:?}"),
    }
    match &body[1].kind {
        StmtKind::Assign { value, .. } => assert_eq!(value, &Expr::Str("a\\nb".into())),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn trailing_backslash_is_eof_error() {
    let err = parse_err("result = df.sum()\\");
    assert!(err.message.contains("unexpected EOF"));
}

#[test]
fn unclosed_bracket_reports_opening_line() {
    let err = parse_err("x = (1,\n2\n");
    assert_eq!(err.line, 1);
    assert_eq!(err.message, "'(' was never closed");
}

#[test]
fn unterminated_string_is_reported() {
    let err = parse_err("x = 'abc\n");
    assert!(err.message.starts_with("unterminated string literal"));
}

#[test]
fn stray_characters_are_rejected() {
    let err = parse_err("x = 1 $ 2\n");
    assert!(err.message.starts_with("invalid character"));
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

#[test]
fn if_elif_else_nests() {
    let body = parse_ok("if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3\n");
    match &body[0].kind {
        StmtKind::If { orelse, .. } => match &orelse[0].kind {
            StmtKind::If { orelse, .. } => assert_eq!(orelse.len(), 1),
            other => panic!("unexpected {other:?}"),
        },
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn missing_block_names_the_header() {
    let err = parse_err("for x in y:\nz = 1\n");
    assert_eq!(err.message, "expected an indented block after 'for' statement on line 1");
}

#[test]
fn unexpected_indent_is_reported() {
    let err = parse_err("x = 1\n    y = 2\n");
    assert_eq!(err.message, "unexpected indent");
}

#[test]
fn tuple_unpacking_targets() {
    let body = parse_ok("for k, v in d.items():\n    pass\na, b = 1, 2\n");
    assert!(matches!(&body[0].kind, StmtKind::For { target: Expr::Tuple(t), .. } if t.len() == 2));
    assert!(matches!(&body[1].kind, StmtKind::Assign { value: Expr::Tuple(_), .. }));
}

#[test]
fn cannot_assign_to_call() {
    let err = parse_err("f() = 1\n");
    assert!(err.message.starts_with("cannot assign to function call"));
}

#[test]
fn imports_with_aliases() {
    let body = parse_ok("import pandas as pd, numpy as np\nfrom plotly.subplots import make_subplots\n");
    match &body[0].kind {
        StmtKind::Import(names) => {
            assert_eq!(names[0].name, "pandas");
            assert_eq!(names[1].asname.as_deref(), Some("np"));
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(&body[1].kind, StmtKind::ImportFrom { module, .. } if module == "plotly.subplots"));
}

#[test]
fn try_requires_handler_or_finally() {
    parse_ok("try:\n    x = 1\nexcept KeyError as e:\n    pass\nelse:\n    pass\nfinally:\n    pass\n");
    let err = parse_err("try:\n    x = 1\ny = 2\n");
    assert_eq!(err.message, "expected 'except' or 'finally' block");
}

#[test]
fn function_definitions_with_defaults() {
    let body = parse_ok("def f(a, b=2, *args, **kw):\n    return a + b\n");
    match &body[0].kind {
        StmtKind::FunctionDef { params, .. } => {
            assert_eq!(params.len(), 4);
            assert_eq!(params[2].kind, ParamKind::VarArgs);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(parse_module("def f(a=1, b):\n    pass\n").is_err());
}

#[test]
fn semicolons_separate_simple_statements() {
    let body = parse_ok("df_filtered = df[df['Nationality']=='Saudi']; result = len(df_filtered)");
    assert_eq!(body.len(), 2);
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

#[test]
fn precedence_binds_power_tighter_than_unary() {
    let body = parse_ok("x = -2 ** 2\n");
    match &body[0].kind {
        StmtKind::Assign { value, .. } => assert!(matches!(
            value,
            Expr::Unary { op: UnaryOp::Neg, operand } if matches!(**operand, Expr::BinOp { op: BinOp::Pow, .. })
        )),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn mask_expressions_parse() {
    parse_ok("m = df[(df['a'] > 1) & (df['b'] != 'x') | ~df['c'].isnull()]\n");
}

#[test]
fn chained_comparison_and_membership() {
    let body = parse_ok("ok = 0 < x <= 10 and y not in z\n");
    match &body[0].kind {
        StmtKind::Assign { value: Expr::BoolOp { values, .. }, .. } => {
            assert!(matches!(&values[0], Expr::Compare { ops, .. } if ops.len() == 2));
            assert!(matches!(&values[1], Expr::Compare { ops, .. } if ops[0].0 == CmpOp::NotIn));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn comprehensions_and_lambdas() {
    parse_ok("a = [x * 2 for x in xs if x > 0]\nb = {k: v for k, v in d.items()}\nc = sorted(xs, key=lambda t: t[1])\nd = sum(x for x in xs)\n");
}

#[test]
fn slices_and_multi_index() {
    let body = parse_ok("a = xs[1:-1:2]\nb = df.loc[df['a'] > 1, ['b', 'c']]\n");
    match &body[0].kind {
        StmtKind::Assign { value: Expr::Subscript { index, .. }, .. } => {
            assert!(matches!(**index, Expr::Slice { .. }))
        }
        other => panic!("unexpected {other:?}"),
    }
    match &body[1].kind {
        StmtKind::Assign { value: Expr::Subscript { index, .. }, .. } => {
            assert!(matches!(&**index, Expr::Tuple(items) if items.len() == 2))
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn fstring_parts_with_spec_and_conversion() {
    let body = parse_ok("s = f'{name!r}: {value:.2f} {{lit}}'\n");
    match &body[0].kind {
        StmtKind::Assign { value: Expr::FString(parts), .. } => {
            assert!(matches!(&parts[0], FPart::Expr { conversion: Some('r'), .. }));
            assert!(matches!(&parts[2], FPart::Expr { spec: Some(_), .. }));
            assert_eq!(parts[3], FPart::Lit(" {lit}".into()));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn fstring_errors_are_syntax_errors() {
    assert!(parse_module("s = f'{'\n").is_err());
    assert!(parse_module("s = f'{}'\n").is_err());
}

#[test]
fn keyword_arguments_must_follow_positionals() {
    assert!(parse_module("f(a=1, 2)\n").is_err());
    parse_ok("px.bar(df, x='a', y='b', **opts)\n");
}
