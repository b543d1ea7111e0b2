// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// Recursive-descent parser over the token stream
//
// Grammar follows the Python expression precedence ladder. Statements
// carry their first line for tracebacks; expressions do not.

use super::ast::*;
use super::error::ParseError;
use super::lexer::tokenize;
use super::token::{Tok, Token, KEYWORDS};

/// Parse a whole program.
pub fn parse_module(source: &str) -> Result<Vec<Stmt>, ParseError> {
    let tokens = tokenize(source)?;
    Parser::new(tokens).module()
}

/// Parse a single expression, as used inside f-string replacement fields.
pub fn parse_expression(source: &str, line: usize) -> Result<Expr, ParseError> {
    let mut tokens = tokenize(source.trim()).map_err(|e| ParseError::new(line, e.message))?;
    for t in &mut tokens {
        t.line = line;
    }
    let mut p = Parser::new(tokens);
    let expr = p.star_expressions()?;
    while matches!(p.peek(), Tok::Newline) {
        p.advance();
    }
    if !matches!(p.peek(), Tok::Eof) {
        return Err(p.err("f-string: invalid syntax"));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

fn is_keyword(name: &str) -> bool {
    KEYWORDS.contains(&name)
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    // ------------------------------------------------------------------
    // Token helpers
    // ------------------------------------------------------------------

    fn peek(&self) -> &Tok {
        self.tokens
            .get(self.pos)
            .map(|t| &t.tok)
            .unwrap_or(&Tok::Eof)
    }

    fn peek_next(&self) -> &Tok {
        self.tokens
            .get(self.pos + 1)
            .map(|t| &t.tok)
            .unwrap_or(&Tok::Eof)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    fn advance(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn err(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.line(), message)
    }

    fn is_op(&self, op: &str) -> bool {
        matches!(self.peek(), Tok::Op(o) if *o == op)
    }

    fn is_kw(&self, kw: &str) -> bool {
        matches!(self.peek(), Tok::Name(n) if n == kw)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.is_op(op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_kw(&mut self, kw: &str) -> bool {
        if self.is_kw(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: &str) -> Result<(), ParseError> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.err(format!("expected '{op}'")))
        }
    }

    fn expect_kw(&mut self, kw: &str) -> Result<(), ParseError> {
        if self.eat_kw(kw) {
            Ok(())
        } else {
            Err(self.err("invalid syntax"))
        }
    }

    fn identifier(&mut self) -> Result<String, ParseError> {
        match self.peek().clone() {
            Tok::Name(n) if !is_keyword(&n) => {
                self.pos += 1;
                Ok(n)
            }
            _ => Err(self.err("invalid syntax")),
        }
    }

    fn at_line_end(&self) -> bool {
        matches!(self.peek(), Tok::Newline | Tok::Eof)
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn module(mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut body = Vec::new();
        loop {
            match self.peek() {
                Tok::Eof => break,
                Tok::Newline => {
                    self.advance();
                }
                _ => body.extend(self.statement()?),
            }
        }
        Ok(body)
    }

    fn statement(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let line = self.line();
        let kind = match self.peek().clone() {
            Tok::Indent => return Err(self.err("unexpected indent")),
            Tok::Dedent => return Err(self.err("unindent does not match any outer indentation level")),
            Tok::Op("@") => self.decorated()?,
            Tok::Name(n) => match n.as_str() {
                "if" => self.if_stmt()?,
                "for" => self.for_stmt()?,
                "while" => self.while_stmt()?,
                "def" => self.def_stmt(Vec::new())?,
                "class" => self.class_stmt()?,
                "try" => self.try_stmt()?,
                "with" => self.with_stmt()?,
                _ => return self.simple_statements(),
            },
            _ => return self.simple_statements(),
        };
        Ok(vec![Stmt { line, kind }])
    }

    fn simple_statements(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut out = Vec::new();
        loop {
            let line = self.line();
            let kind = self.simple_stmt()?;
            out.push(Stmt { line, kind });
            if self.eat_op(";") {
                if self.at_line_end() {
                    break;
                }
                continue;
            }
            break;
        }
        match self.peek() {
            Tok::Newline => {
                self.advance();
            }
            Tok::Eof => {}
            _ => return Err(self.err("invalid syntax")),
        }
        Ok(out)
    }

    fn simple_stmt(&mut self) -> Result<StmtKind, ParseError> {
        if let Tok::Name(n) = self.peek().clone() {
            match n.as_str() {
                "pass" => {
                    self.advance();
                    return Ok(StmtKind::Pass);
                }
                "break" => {
                    self.advance();
                    return Ok(StmtKind::Break);
                }
                "continue" => {
                    self.advance();
                    return Ok(StmtKind::Continue);
                }
                "return" => {
                    self.advance();
                    if self.at_line_end() || self.is_op(";") {
                        return Ok(StmtKind::Return(None));
                    }
                    return Ok(StmtKind::Return(Some(self.star_expressions()?)));
                }
                "raise" => {
                    self.advance();
                    if self.at_line_end() || self.is_op(";") {
                        return Ok(StmtKind::Raise(None));
                    }
                    let exc = self.expression()?;
                    if self.eat_kw("from") {
                        self.expression()?;
                    }
                    return Ok(StmtKind::Raise(Some(exc)));
                }
                "import" => {
                    self.advance();
                    return self.import_names().map(StmtKind::Import);
                }
                "from" => {
                    self.advance();
                    return self.from_import();
                }
                "del" => {
                    self.advance();
                    let mut targets = vec![self.bitor()?];
                    while self.eat_op(",") {
                        if self.at_line_end() {
                            break;
                        }
                        targets.push(self.bitor()?);
                    }
                    if let Some(bad) = targets.iter().find(|t| !t.is_assignable()) {
                        return Err(self.err(format!("cannot delete {}", bad.describe())));
                    }
                    return Ok(StmtKind::Del(targets));
                }
                "assert" => {
                    self.advance();
                    let test = self.expression()?;
                    let msg = if self.eat_op(",") {
                        Some(self.expression()?)
                    } else {
                        None
                    };
                    return Ok(StmtKind::Assert { test, msg });
                }
                "global" | "nonlocal" => {
                    self.advance();
                    let mut names = vec![self.identifier()?];
                    while self.eat_op(",") {
                        names.push(self.identifier()?);
                    }
                    return Ok(StmtKind::Global(names));
                }
                _ => {}
            }
        }

        let first = if self.is_kw("yield") {
            self.yield_expr()?
        } else {
            self.star_expressions()?
        };

        if self.is_op("=") {
            let mut targets = vec![first];
            let mut value;
            loop {
                self.expect_op("=")?;
                value = if self.is_kw("yield") {
                    self.yield_expr()?
                } else {
                    self.star_expressions()?
                };
                if self.is_op("=") {
                    targets.push(value);
                } else {
                    break;
                }
            }
            for target in &targets {
                self.check_target(target)?;
            }
            return Ok(StmtKind::Assign { targets, value });
        }

        if let Tok::Op(op) = self.peek() {
            if let Some(bin) = BinOp::from_augmented(op) {
                if !matches!(first, Expr::Name(_) | Expr::Attribute { .. } | Expr::Subscript { .. }) {
                    return Err(self.err(format!(
                        "'{}' is an illegal expression for augmented assignment",
                        first.describe()
                    )));
                }
                self.advance();
                let value = if self.is_kw("yield") {
                    self.yield_expr()?
                } else {
                    self.star_expressions()?
                };
                return Ok(StmtKind::AugAssign {
                    target: first,
                    op: bin,
                    value,
                });
            }
        }

        if self.is_op(":") {
            self.check_target(&first)?;
            self.advance();
            self.expression()?;
            let value = if self.eat_op("=") {
                Some(self.star_expressions()?)
            } else {
                None
            };
            return Ok(StmtKind::AnnAssign {
                target: first,
                value,
            });
        }

        Ok(StmtKind::Expr(first))
    }

    fn check_target(&self, target: &Expr) -> Result<(), ParseError> {
        if target.is_assignable() {
            return Ok(());
        }
        let hint = if matches!(target, Expr::Call { .. } | Expr::Compare { .. }) {
            " here. Maybe you meant '==' instead of '='?"
        } else {
            ""
        };
        Err(self.err(format!("cannot assign to {}{hint}", target.describe())))
    }

    fn dotted_name(&mut self) -> Result<String, ParseError> {
        let mut name = self.identifier()?;
        while self.eat_op(".") {
            name.push('.');
            name.push_str(&self.identifier()?);
        }
        Ok(name)
    }

    fn import_names(&mut self) -> Result<Vec<Alias>, ParseError> {
        let mut out = Vec::new();
        loop {
            let name = self.dotted_name()?;
            let asname = if self.eat_kw("as") {
                Some(self.identifier()?)
            } else {
                None
            };
            out.push(Alias { name, asname });
            if !self.eat_op(",") {
                break;
            }
        }
        Ok(out)
    }

    fn from_import(&mut self) -> Result<StmtKind, ParseError> {
        let mut module = String::new();
        while self.is_op(".") || self.is_op("...") {
            if let Tok::Op(op) = self.advance() {
                module.push_str(op);
            }
        }
        if !self.is_kw("import") {
            module.push_str(&self.dotted_name()?);
        }
        self.expect_kw("import")?;
        if self.eat_op("*") {
            return Ok(StmtKind::ImportFrom {
                module,
                names: vec![Alias {
                    name: "*".into(),
                    asname: None,
                }],
            });
        }
        let parenthesized = self.eat_op("(");
        let mut names = Vec::new();
        loop {
            if parenthesized && self.is_op(")") {
                break;
            }
            let name = self.identifier()?;
            let asname = if self.eat_kw("as") {
                Some(self.identifier()?)
            } else {
                None
            };
            names.push(Alias { name, asname });
            if !self.eat_op(",") {
                break;
            }
        }
        if parenthesized {
            self.expect_op(")")?;
        }
        if names.is_empty() {
            return Err(self.err("invalid syntax"));
        }
        Ok(StmtKind::ImportFrom { module, names })
    }

    fn block(&mut self, what: &str, header_line: usize) -> Result<Vec<Stmt>, ParseError> {
        if !self.eat_op(":") {
            return Err(self.err("expected ':'"));
        }
        if !matches!(self.peek(), Tok::Newline) {
            return self.simple_statements();
        }
        self.advance();
        if !matches!(self.peek(), Tok::Indent) {
            return Err(self.err(format!(
                "expected an indented block after {what} on line {header_line}"
            )));
        }
        self.advance();
        let mut body = Vec::new();
        loop {
            match self.peek() {
                Tok::Dedent => {
                    self.advance();
                    break;
                }
                Tok::Eof => break,
                Tok::Newline => {
                    self.advance();
                }
                _ => body.extend(self.statement()?),
            }
        }
        Ok(body)
    }

    fn if_stmt(&mut self) -> Result<StmtKind, ParseError> {
        let line = self.line();
        self.advance();
        let test = self.named_expression()?;
        let body = self.block("'if' statement", line)?;
        let orelse = self.else_chain()?;
        Ok(StmtKind::If { test, body, orelse })
    }

    fn else_chain(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let line = self.line();
        if self.eat_kw("elif") {
            let test = self.named_expression()?;
            let body = self.block("'elif' statement", line)?;
            let orelse = self.else_chain()?;
            return Ok(vec![Stmt {
                line,
                kind: StmtKind::If { test, body, orelse },
            }]);
        }
        if self.eat_kw("else") {
            return self.block("'else' statement", line);
        }
        Ok(Vec::new())
    }

    fn for_stmt(&mut self) -> Result<StmtKind, ParseError> {
        let line = self.line();
        self.advance();
        let target = self.target_list()?;
        self.check_target(&target)?;
        self.expect_kw("in")?;
        let iter = self.star_expressions()?;
        let body = self.block("'for' statement", line)?;
        let else_line = self.line();
        let orelse = if self.eat_kw("else") {
            self.block("'else' statement", else_line)?
        } else {
            Vec::new()
        };
        Ok(StmtKind::For {
            target,
            iter,
            body,
            orelse,
        })
    }

    fn while_stmt(&mut self) -> Result<StmtKind, ParseError> {
        let line = self.line();
        self.advance();
        let test = self.named_expression()?;
        let body = self.block("'while' statement", line)?;
        let else_line = self.line();
        let orelse = if self.eat_kw("else") {
            self.block("'else' statement", else_line)?
        } else {
            Vec::new()
        };
        Ok(StmtKind::While { test, body, orelse })
    }

    fn decorated(&mut self) -> Result<StmtKind, ParseError> {
        let mut decorators = Vec::new();
        while self.eat_op("@") {
            decorators.push(self.named_expression()?);
            if !matches!(self.advance(), Tok::Newline) {
                return Err(self.err("invalid syntax"));
            }
        }
        if self.is_kw("def") {
            self.def_stmt(decorators)
        } else if self.is_kw("class") {
            self.class_stmt()
        } else {
            Err(self.err("invalid syntax"))
        }
    }

    fn def_stmt(&mut self, decorators: Vec<Expr>) -> Result<StmtKind, ParseError> {
        let line = self.line();
        self.advance();
        let name = self.identifier()?;
        self.expect_op("(")?;
        let params = self.params(")", true)?;
        self.expect_op(")")?;
        if self.eat_op("->") {
            self.expression()?;
        }
        let body = self.block("function definition", line)?;
        Ok(StmtKind::FunctionDef {
            name,
            params,
            body,
            decorators,
        })
    }

    fn params(&mut self, closing: &str, annotations: bool) -> Result<Vec<Param>, ParseError> {
        let mut params: Vec<Param> = Vec::new();
        while !self.is_op(closing) {
            if self.eat_op("/") {
            } else if self.eat_op("**") {
                let name = self.identifier()?;
                if annotations && self.eat_op(":") {
                    self.expression()?;
                }
                params.push(Param {
                    name,
                    default: None,
                    kind: ParamKind::KwArgs,
                });
            } else if self.eat_op("*") {
                if !(self.is_op(",") || self.is_op(closing)) {
                    let name = self.identifier()?;
                    if annotations && self.eat_op(":") {
                        self.expression()?;
                    }
                    params.push(Param {
                        name,
                        default: None,
                        kind: ParamKind::VarArgs,
                    });
                }
            } else {
                let name = self.identifier()?;
                if annotations && self.eat_op(":") {
                    self.expression()?;
                }
                let default = if self.eat_op("=") {
                    Some(self.expression()?)
                } else {
                    None
                };
                if default.is_none()
                    && params
                        .iter()
                        .any(|p| p.default.is_some() && p.kind == ParamKind::Normal)
                    && !params.iter().any(|p| p.kind == ParamKind::VarArgs)
                {
                    return Err(self.err("non-default argument follows default argument"));
                }
                if params.iter().any(|p| p.name == name) {
                    return Err(self.err(format!(
                        "duplicate argument '{name}' in function definition"
                    )));
                }
                params.push(Param {
                    name,
                    default,
                    kind: ParamKind::Normal,
                });
            }
            if !self.eat_op(",") {
                break;
            }
        }
        Ok(params)
    }

    fn class_stmt(&mut self) -> Result<StmtKind, ParseError> {
        let line = self.line();
        self.advance();
        let name = self.identifier()?;
        if self.eat_op("(") {
            self.call_args()?;
        }
        self.block("class definition", line)?;
        Ok(StmtKind::ClassDef { name })
    }

    fn try_stmt(&mut self) -> Result<StmtKind, ParseError> {
        let line = self.line();
        self.advance();
        let body = self.block("'try' statement", line)?;
        let mut handlers = Vec::new();
        while self.is_kw("except") {
            let hline = self.line();
            self.advance();
            let (kind, name) = if self.is_op(":") {
                (None, None)
            } else {
                let kind = self.expression()?;
                let name = if self.eat_kw("as") {
                    Some(self.identifier()?)
                } else {
                    None
                };
                (Some(kind), name)
            };
            let body = self.block("'except' statement", hline)?;
            handlers.push(Handler {
                line: hline,
                kind,
                name,
                body,
            });
        }
        let else_line = self.line();
        let orelse = if !handlers.is_empty() && self.eat_kw("else") {
            self.block("'else' statement", else_line)?
        } else {
            Vec::new()
        };
        let fin_line = self.line();
        let finalbody = if self.eat_kw("finally") {
            self.block("'finally' statement", fin_line)?
        } else {
            Vec::new()
        };
        if handlers.is_empty() && finalbody.is_empty() {
            return Err(self.err("expected 'except' or 'finally' block"));
        }
        Ok(StmtKind::Try {
            body,
            handlers,
            orelse,
            finalbody,
        })
    }

    fn with_stmt(&mut self) -> Result<StmtKind, ParseError> {
        let line = self.line();
        self.advance();
        let mut items = Vec::new();
        loop {
            let ctx = self.expression()?;
            let target = if self.eat_kw("as") {
                let t = self.target_list()?;
                self.check_target(&t)?;
                Some(t)
            } else {
                None
            };
            items.push((ctx, target));
            if !self.eat_op(",") {
                break;
            }
        }
        let body = self.block("'with' statement", line)?;
        Ok(StmtKind::With { items, body })
    }

    /// Comma-separated assignment targets, stopping before `in` or `=`.
    fn target_list(&mut self) -> Result<Expr, ParseError> {
        let mut items = vec![self.star_target()?];
        let mut trailing = false;
        while self.eat_op(",") {
            trailing = true;
            if self.is_kw("in") || self.is_op("=") || self.is_op(":") {
                break;
            }
            items.push(self.star_target()?);
            trailing = false;
        }
        if items.len() == 1 && !trailing {
            return Ok(items.remove(0));
        }
        Ok(Expr::Tuple(items))
    }

    fn star_target(&mut self) -> Result<Expr, ParseError> {
        if self.eat_op("*") {
            return Ok(Expr::Starred(Box::new(self.bitor()?)));
        }
        self.bitor()
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn can_start_expression(&self) -> bool {
        match self.peek() {
            Tok::Name(n) => {
                !is_keyword(n)
                    || matches!(
                        n.as_str(),
                        "True" | "False" | "None" | "not" | "lambda" | "await"
                    )
            }
            Tok::Int(_) | Tok::Float(_) | Tok::Str(_) | Tok::FStr(_) => true,
            Tok::Op(op) => matches!(*op, "(" | "[" | "{" | "-" | "+" | "~" | "*" | "..."),
            _ => false,
        }
    }

    fn star_expressions(&mut self) -> Result<Expr, ParseError> {
        let first = self.star_expression()?;
        if !self.is_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if !self.can_start_expression() {
                break;
            }
            items.push(self.star_expression()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn star_expression(&mut self) -> Result<Expr, ParseError> {
        if self.eat_op("*") {
            return Ok(Expr::Starred(Box::new(self.bitor()?)));
        }
        self.named_expression()
    }

    fn named_expression(&mut self) -> Result<Expr, ParseError> {
        if let (Tok::Name(n), Tok::Op(":=")) = (self.peek().clone(), self.peek_next().clone()) {
            if !is_keyword(&n) {
                self.pos += 2;
                let value = self.expression()?;
                return Ok(Expr::NamedExpr {
                    name: n,
                    value: Box::new(value),
                });
            }
        }
        self.expression()
    }

    fn yield_expr(&mut self) -> Result<Expr, ParseError> {
        self.expect_kw("yield")?;
        if self.eat_kw("from") {
            return Ok(Expr::Yield(Some(Box::new(self.expression()?))));
        }
        if self.at_line_end() || self.is_op(")") || self.is_op("=") {
            return Ok(Expr::Yield(None));
        }
        Ok(Expr::Yield(Some(Box::new(self.star_expressions()?))))
    }

    pub(crate) fn expression(&mut self) -> Result<Expr, ParseError> {
        if self.is_kw("lambda") {
            return self.lambda();
        }
        let body = self.disjunction()?;
        if self.is_kw("if") {
            self.advance();
            let test = self.disjunction()?;
            if !self.eat_kw("else") {
                return Err(self.err("expected 'else' after 'if' expression"));
            }
            let orelse = self.expression()?;
            return Ok(Expr::IfExp {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            });
        }
        Ok(body)
    }

    fn lambda(&mut self) -> Result<Expr, ParseError> {
        self.advance();
        let params = self.params(":", false)?;
        self.expect_op(":")?;
        let body = self.expression()?;
        Ok(Expr::Lambda {
            params,
            body: Box::new(body),
        })
    }

    fn disjunction(&mut self) -> Result<Expr, ParseError> {
        let first = self.conjunction()?;
        if !self.is_kw("or") {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat_kw("or") {
            values.push(self.conjunction()?);
        }
        Ok(Expr::BoolOp {
            op: BoolOp::Or,
            values,
        })
    }

    fn conjunction(&mut self) -> Result<Expr, ParseError> {
        let first = self.inversion()?;
        if !self.is_kw("and") {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.eat_kw("and") {
            values.push(self.inversion()?);
        }
        Ok(Expr::BoolOp {
            op: BoolOp::And,
            values,
        })
    }

    fn inversion(&mut self) -> Result<Expr, ParseError> {
        if self.eat_kw("not") {
            let operand = self.inversion()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.bitor()?;
        let mut ops = Vec::new();
        loop {
            let op = match self.peek().clone() {
                Tok::Op("==") => CmpOp::Eq,
                Tok::Op("!=") => CmpOp::Ne,
                Tok::Op("<") => CmpOp::Lt,
                Tok::Op("<=") => CmpOp::Le,
                Tok::Op(">") => CmpOp::Gt,
                Tok::Op(">=") => CmpOp::Ge,
                Tok::Name(n) if n == "in" => CmpOp::In,
                Tok::Name(n) if n == "not" && matches!(self.peek_next(), Tok::Name(m) if m == "in") => {
                    self.pos += 1;
                    CmpOp::NotIn
                }
                Tok::Name(n) if n == "is" => {
                    if matches!(self.peek_next(), Tok::Name(m) if m == "not") {
                        self.pos += 1;
                        CmpOp::IsNot
                    } else {
                        CmpOp::Is
                    }
                }
                _ => break,
            };
            self.advance();
            ops.push((op, self.bitor()?));
        }
        if ops.is_empty() {
            return Ok(left);
        }
        Ok(Expr::Compare {
            left: Box::new(left),
            ops,
        })
    }

    fn binary_level(
        &mut self,
        table: &[(&str, BinOp)],
        next: fn(&mut Parser) -> Result<Expr, ParseError>,
    ) -> Result<Expr, ParseError> {
        let mut left = next(self)?;
        'outer: loop {
            for (sym, op) in table {
                if self.is_op(sym) {
                    self.advance();
                    let right = next(self)?;
                    left = Expr::BinOp {
                        left: Box::new(left),
                        op: *op,
                        right: Box::new(right),
                    };
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn bitor(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&[("|", BinOp::BitOr)], Parser::bitxor)
    }

    fn bitxor(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&[("^", BinOp::BitXor)], Parser::bitand)
    }

    fn bitand(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&[("&", BinOp::BitAnd)], Parser::shift)
    }

    fn shift(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&[("<<", BinOp::LShift), (">>", BinOp::RShift)], Parser::sum)
    }

    fn sum(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(&[("+", BinOp::Add), ("-", BinOp::Sub)], Parser::term)
    }

    fn term(&mut self) -> Result<Expr, ParseError> {
        self.binary_level(
            &[
                ("*", BinOp::Mul),
                ("/", BinOp::Div),
                ("//", BinOp::FloorDiv),
                ("%", BinOp::Mod),
                ("@", BinOp::MatMul),
            ],
            Parser::factor,
        )
    }

    fn factor(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek() {
            Tok::Op("-") => UnaryOp::Neg,
            Tok::Op("+") => UnaryOp::Pos,
            Tok::Op("~") => UnaryOp::Invert,
            _ => return self.power(),
        };
        self.advance();
        let operand = self.factor()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn power(&mut self) -> Result<Expr, ParseError> {
        let base = if self.eat_kw("await") {
            Expr::Await(Box::new(self.primary()?))
        } else {
            self.primary()?
        };
        if self.eat_op("**") {
            let exp = self.factor()?;
            return Ok(Expr::BinOp {
                left: Box::new(base),
                op: BinOp::Pow,
                right: Box::new(exp),
            });
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.atom()?;
        loop {
            if self.eat_op(".") {
                let attr = match self.advance() {
                    Tok::Name(n) => n,
                    _ => return Err(self.err("invalid syntax")),
                };
                expr = Expr::Attribute {
                    value: Box::new(expr),
                    attr,
                };
            } else if self.eat_op("(") {
                let args = self.call_args()?;
                expr = Expr::Call {
                    func: Box::new(expr),
                    args,
                };
            } else if self.eat_op("[") {
                let index = self.slices()?;
                self.expect_op("]")?;
                expr = Expr::Subscript {
                    value: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                return Ok(expr);
            }
        }
    }

    /// Arguments after an opening `(`; consumes the closing `)`.
    fn call_args(&mut self) -> Result<Vec<Arg>, ParseError> {
        let mut args = Vec::new();
        let mut seen_keyword = false;
        while !self.is_op(")") {
            if self.eat_op("**") {
                args.push(Arg::DoubleStar(self.expression()?));
                seen_keyword = true;
            } else if self.eat_op("*") {
                args.push(Arg::Star(self.expression()?));
            } else if let (Tok::Name(n), Tok::Op("=")) = (self.peek().clone(), self.peek_next().clone()) {
                if is_keyword(&n) {
                    return Err(self.err("invalid syntax"));
                }
                self.pos += 2;
                args.push(Arg::Kw(n, self.expression()?));
                seen_keyword = true;
            } else {
                let value = self.named_expression()?;
                if self.is_kw("for") {
                    let generators = self.comprehension_clauses()?;
                    args.push(Arg::Pos(Expr::GeneratorExp {
                        elt: Box::new(value),
                        generators,
                    }));
                } else {
                    if seen_keyword {
                        return Err(self.err("positional argument follows keyword argument"));
                    }
                    args.push(Arg::Pos(value));
                }
            }
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(")")?;
        Ok(args)
    }

    fn slices(&mut self) -> Result<Expr, ParseError> {
        if self.is_op("]") {
            return Err(self.err("invalid syntax"));
        }
        let first = self.slice_item()?;
        if !self.is_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.is_op("]") {
                break;
            }
            items.push(self.slice_item()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn slice_item(&mut self) -> Result<Expr, ParseError> {
        let lower = if self.is_op(":") {
            None
        } else {
            Some(self.star_expression()?)
        };
        if !self.eat_op(":") {
            return lower.ok_or_else(|| self.err("invalid syntax"));
        }
        let bound = |p: &mut Parser| -> Result<Option<Box<Expr>>, ParseError> {
            if p.is_op(":") || p.is_op("]") || p.is_op(",") {
                Ok(None)
            } else {
                Ok(Some(Box::new(p.expression()?)))
            }
        };
        let upper = bound(self)?;
        let step = if self.eat_op(":") { bound(self)? } else { None };
        Ok(Expr::Slice {
            lower: lower.map(Box::new),
            upper,
            step,
        })
    }

    fn comprehension_clauses(&mut self) -> Result<Vec<Comprehension>, ParseError> {
        let mut generators = Vec::new();
        while self.eat_kw("for") {
            let target = self.target_list()?;
            self.check_target(&target)?;
            self.expect_kw("in")?;
            let iter = self.disjunction()?;
            let mut conditions = Vec::new();
            while self.eat_kw("if") {
                conditions.push(self.disjunction()?);
            }
            generators.push(Comprehension {
                target,
                iter,
                conditions,
            });
        }
        Ok(generators)
    }

    fn atom(&mut self) -> Result<Expr, ParseError> {
        let line = self.line();
        match self.peek().clone() {
            Tok::Name(n) => {
                self.advance();
                match n.as_str() {
                    "True" => Ok(Expr::Bool(true)),
                    "False" => Ok(Expr::Bool(false)),
                    "None" => Ok(Expr::NoneLit),
                    kw if is_keyword(kw) => Err(ParseError::new(line, "invalid syntax")),
                    _ => Ok(Expr::Name(n)),
                }
            }
            Tok::Int(i) => {
                self.advance();
                Ok(Expr::Int(i))
            }
            Tok::Float(f) => {
                self.advance();
                Ok(Expr::Float(f))
            }
            Tok::Str(_) | Tok::FStr(_) => self.strings(),
            Tok::Op("...") => {
                self.advance();
                Ok(Expr::Ellipsis)
            }
            Tok::Op("(") => {
                self.advance();
                if self.eat_op(")") {
                    return Ok(Expr::Tuple(Vec::new()));
                }
                if self.is_kw("yield") {
                    let y = self.yield_expr()?;
                    self.expect_op(")")?;
                    return Ok(y);
                }
                let first = self.star_expression()?;
                if self.is_kw("for") {
                    let generators = self.comprehension_clauses()?;
                    self.expect_op(")")?;
                    return Ok(Expr::GeneratorExp {
                        elt: Box::new(first),
                        generators,
                    });
                }
                if self.eat_op(")") {
                    return Ok(first);
                }
                let mut items = vec![first];
                while self.eat_op(",") {
                    if self.is_op(")") {
                        break;
                    }
                    items.push(self.star_expression()?);
                }
                self.expect_op(")")?;
                Ok(Expr::Tuple(items))
            }
            Tok::Op("[") => {
                self.advance();
                if self.eat_op("]") {
                    return Ok(Expr::List(Vec::new()));
                }
                let first = self.star_expression()?;
                if self.is_kw("for") {
                    let generators = self.comprehension_clauses()?;
                    self.expect_op("]")?;
                    return Ok(Expr::ListComp {
                        elt: Box::new(first),
                        generators,
                    });
                }
                let mut items = vec![first];
                while self.eat_op(",") {
                    if self.is_op("]") {
                        break;
                    }
                    items.push(self.star_expression()?);
                }
                self.expect_op("]")?;
                Ok(Expr::List(items))
            }
            Tok::Op("{") => {
                self.advance();
                self.brace_display()
            }
            Tok::Op(op) => Err(ParseError::new(line, format!("invalid syntax near '{op}'"))),
            Tok::Newline | Tok::Eof => Err(ParseError::new(line, "invalid syntax")),
            Tok::Indent => Err(ParseError::new(line, "unexpected indent")),
            Tok::Dedent => Err(ParseError::new(line, "invalid syntax")),
        }
    }

    fn brace_display(&mut self) -> Result<Expr, ParseError> {
        if self.eat_op("}") {
            return Ok(Expr::Dict(Vec::new()));
        }
        if self.eat_op("**") {
            let spread = self.bitor()?;
            return self.dict_rest(vec![(None, spread)]);
        }
        let first = self.star_expression()?;
        if self.eat_op(":") {
            let value = self.expression()?;
            if self.is_kw("for") {
                let generators = self.comprehension_clauses()?;
                self.expect_op("}")?;
                return Ok(Expr::DictComp {
                    key: Box::new(first),
                    value: Box::new(value),
                    generators,
                });
            }
            return self.dict_rest(vec![(Some(first), value)]);
        }
        if self.is_kw("for") {
            let generators = self.comprehension_clauses()?;
            self.expect_op("}")?;
            return Ok(Expr::SetComp {
                elt: Box::new(first),
                generators,
            });
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.is_op("}") {
                break;
            }
            items.push(self.star_expression()?);
        }
        self.expect_op("}")?;
        Ok(Expr::Set(items))
    }

    fn dict_rest(&mut self, mut entries: Vec<(Option<Expr>, Expr)>) -> Result<Expr, ParseError> {
        while self.eat_op(",") {
            if self.is_op("}") {
                break;
            }
            if self.eat_op("**") {
                entries.push((None, self.bitor()?));
                continue;
            }
            let key = self.expression()?;
            if !self.eat_op(":") {
                return Err(self.err("':' expected after dictionary key"));
            }
            entries.push((Some(key), self.expression()?));
        }
        self.expect_op("}")?;
        Ok(Expr::Dict(entries))
    }

    /// Adjacent string literals concatenate; any f-string makes the whole
    /// run an f-string.
    fn strings(&mut self) -> Result<Expr, ParseError> {
        let mut parts: Vec<FPart> = Vec::new();
        let mut any_f = false;
        loop {
            let line = self.line();
            match self.peek().clone() {
                Tok::Str(s) => {
                    self.advance();
                    parts.push(FPart::Lit(s));
                }
                Tok::FStr(body) => {
                    self.advance();
                    any_f = true;
                    parts.extend(parse_fstring(&body, line)?);
                }
                _ => break,
            }
        }
        if !any_f {
            let text = parts
                .into_iter()
                .map(|p| match p {
                    FPart::Lit(s) => s,
                    FPart::Expr { .. } => String::new(),
                })
                .collect();
            return Ok(Expr::Str(text));
        }
        Ok(Expr::FString(merge_literals(parts)))
    }
}

fn merge_literals(parts: Vec<FPart>) -> Vec<FPart> {
    let mut out: Vec<FPart> = Vec::with_capacity(parts.len());
    for part in parts {
        match (out.last_mut(), part) {
            (Some(FPart::Lit(prev)), FPart::Lit(next)) => prev.push_str(&next),
            (_, part) => out.push(part),
        }
    }
    out
}

/// Resolve backslash escapes in an f-string literal segment.
fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('\n') => {}
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Split an f-string body into literal and replacement-field parts.
pub fn parse_fstring(body: &str, line: usize) -> Result<Vec<FPart>, ParseError> {
    let chars: Vec<char> = body.chars().collect();
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '{' && chars.get(i + 1) == Some(&'{') {
            literal.push('{');
            i += 2;
            continue;
        }
        if c == '}' && chars.get(i + 1) == Some(&'}') {
            literal.push('}');
            i += 2;
            continue;
        }
        if c == '}' {
            return Err(ParseError::new(line, "f-string: single '}' is not allowed"));
        }
        if c != '{' {
            literal.push(c);
            i += 1;
            continue;
        }
        if !literal.is_empty() {
            parts.push(FPart::Lit(unescape(&std::mem::take(&mut literal))));
        }
        // find the end of the expression: a top-level '}', '!' or ':'
        let start = i + 1;
        let mut j = start;
        let mut depth = 0usize;
        let mut quote: Option<char> = None;
        while j < chars.len() {
            let ch = chars[j];
            if let Some(q) = quote {
                if ch == q {
                    quote = None;
                }
            } else {
                match ch {
                    '\'' | '"' => quote = Some(ch),
                    '(' | '[' | '{' => depth += 1,
                    ')' | ']' => depth = depth.saturating_sub(1),
                    '}' if depth > 0 => depth -= 1,
                    '}' => break,
                    '!' if depth == 0 && chars.get(j + 1) != Some(&'=') => break,
                    ':' if depth == 0 => break,
                    _ => {}
                }
            }
            j += 1;
        }
        if j >= chars.len() {
            return Err(ParseError::new(line, "f-string: expecting '}'"));
        }
        let mut expr_text: String = chars[start..j].iter().collect();
        let mut echo = None;
        let trimmed = expr_text.trim_end();
        if trimmed.ends_with('=')
            && !["==", "!=", "<=", ">="].iter().any(|op| trimmed.ends_with(op))
        {
            echo = Some(expr_text.clone());
            expr_text = trimmed[..trimmed.len() - 1].to_string();
        }
        if expr_text.trim().is_empty() {
            return Err(ParseError::new(line, "f-string: valid expression required before '}'"));
        }
        let expr = parse_expression(&expr_text, line)?;

        let mut conversion = None;
        if chars[j] == '!' {
            conversion = chars.get(j + 1).copied();
            if !matches!(conversion, Some('r' | 's' | 'a')) {
                return Err(ParseError::new(line, "f-string: invalid conversion character"));
            }
            j += 2;
        }
        let mut spec = None;
        if chars.get(j) == Some(&':') {
            let spec_start = j + 1;
            let mut k = spec_start;
            let mut depth = 0usize;
            while k < chars.len() {
                match chars[k] {
                    '{' => depth += 1,
                    '}' if depth > 0 => depth -= 1,
                    '}' => break,
                    _ => {}
                }
                k += 1;
            }
            let spec_text: String = chars[spec_start..k.min(chars.len())].iter().collect();
            spec = Some(parse_fstring(&spec_text, line)?);
            j = k;
        }
        if chars.get(j) != Some(&'}') {
            return Err(ParseError::new(line, "f-string: expecting '}'"));
        }
        parts.push(FPart::Expr {
            expr,
            conversion,
            spec,
            echo,
        });
        i = j + 1;
    }
    if !literal.is_empty() {
        parts.push(FPart::Lit(unescape(&literal)));
    }
    Ok(parts)
}
