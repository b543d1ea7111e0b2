// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// Tokenizer with INDENT/DEDENT synthesis
//
// Newlines inside brackets are ignored and a backslash joins physical
// lines. Indentation is measured in columns with tabs advancing to the
// next multiple of eight.

use super::error::ParseError;
use super::token::{Tok, Token, OPERATORS};

pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    Lexer::new(source).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    tokens: Vec<Token>,
    indents: Vec<usize>,
    brackets: Vec<(char, usize)>,
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            tokens: Vec::new(),
            indents: vec![0],
            brackets: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn push(&mut self, tok: Tok) {
        self.tokens.push(Token {
            tok,
            line: self.line,
        });
    }

    fn err(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.line, message)
    }

    fn run(mut self) -> Result<Vec<Token>, ParseError> {
        let mut at_line_start = true;
        while self.pos < self.chars.len() {
            if at_line_start && self.brackets.is_empty() {
                at_line_start = false;
                if self.handle_indentation()? {
                    continue;
                }
            }
            let Some(c) = self.peek() else { break };
            match c {
                '\n' => {
                    self.pos += 1;
                    if self.brackets.is_empty() {
                        if !matches!(
                            self.tokens.last().map(|t| &t.tok),
                            None | Some(Tok::Newline) | Some(Tok::Indent) | Some(Tok::Dedent)
                        ) {
                            self.push(Tok::Newline);
                        }
                        at_line_start = true;
                    }
                    self.line += 1;
                }
                ' ' | '\t' | '\r' | '\x0c' => self.pos += 1,
                '#' => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                '\\' => {
                    self.pos += 1;
                    while matches!(self.peek(), Some(' ' | '\t' | '\r')) {
                        self.pos += 1;
                    }
                    match self.peek() {
                        Some('\n') => {
                            self.pos += 1;
                            self.line += 1;
                        }
                        None => return Err(self.err("unexpected EOF while parsing")),
                        Some(_) => {
                            return Err(self.err("unexpected character after line continuation character"))
                        }
                    }
                }
                c if c.is_ascii_digit() || (c == '.' && self.peek_at(1).is_some_and(|d| d.is_ascii_digit())) => {
                    self.number()?
                }
                c if c == '_' || c.is_alphabetic() => {
                    if !self.string_with_prefix()? {
                        self.name();
                    }
                }
                '\'' | '"' => self.string(false, false)?,
                _ => self.operator()?,
            }
        }

        if let Some((open, line)) = self.brackets.last() {
            return Err(ParseError::new(*line, format!("'{open}' was never closed")));
        }
        if !matches!(
            self.tokens.last().map(|t| &t.tok),
            None | Some(Tok::Newline) | Some(Tok::Dedent)
        ) {
            self.push(Tok::Newline);
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(Tok::Dedent);
        }
        self.push(Tok::Eof);
        Ok(self.tokens)
    }

    /// Measure leading whitespace. Returns true when the line is blank or a
    /// comment and has been consumed.
    fn handle_indentation(&mut self) -> Result<bool, ParseError> {
        let mut width = 0;
        while let Some(c) = self.peek() {
            match c {
                ' ' => width += 1,
                '\t' => width = (width / 8 + 1) * 8,
                '\x0c' | '\r' => {}
                _ => break,
            }
            self.pos += 1;
        }
        match self.peek() {
            None => return Ok(true),
            Some('\n') => {
                self.pos += 1;
                self.line += 1;
                return Ok(true);
            }
            Some('#') => {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.pos += 1;
                }
                if self.peek().is_some() {
                    self.pos += 1;
                    self.line += 1;
                }
                return Ok(true);
            }
            _ => {}
        }
        let current = *self.indents.last().unwrap_or(&0);
        if width > current {
            if self.tokens.is_empty() {
                return Err(self.err("unexpected indent"));
            }
            self.indents.push(width);
            self.push(Tok::Indent);
        } else if width < current {
            while *self.indents.last().unwrap_or(&0) > width {
                self.indents.pop();
                self.push(Tok::Dedent);
            }
            if *self.indents.last().unwrap_or(&0) != width {
                return Err(self.err("unindent does not match any outer indentation level"));
            }
        }
        Ok(false)
    }

    fn name(&mut self) {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == '_' || c.is_alphanumeric() {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        self.push(Tok::Name(text));
    }

    /// Strings with `r`, `f`, `b`, `rf`, `fr` prefixes.
    fn string_with_prefix(&mut self) -> Result<bool, ParseError> {
        let mut len = 0;
        while len < 2 && self.peek_at(len).is_some_and(|c| "rRfFbBuU".contains(c)) {
            len += 1;
        }
        if len == 0 || !matches!(self.peek_at(len), Some('\'' | '"')) {
            return Ok(false);
        }
        let prefix: String = self.chars[self.pos..self.pos + len]
            .iter()
            .collect::<String>()
            .to_ascii_lowercase();
        if !matches!(prefix.as_str(), "r" | "f" | "b" | "u" | "rf" | "fr" | "rb" | "br") {
            return Ok(false);
        }
        self.pos += len;
        self.string(prefix.contains('r'), prefix.contains('f'))?;
        Ok(true)
    }

    fn string(&mut self, raw: bool, fstring: bool) -> Result<(), ParseError> {
        let quote = self.peek().unwrap_or('"');
        let start_line = self.line;
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };
        let mut out = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(ParseError::new(
                    start_line,
                    if triple {
                        format!("unterminated triple-quoted string literal (detected at line {})", self.line)
                    } else {
                        format!("unterminated string literal (detected at line {})", self.line)
                    },
                ));
            };
            if c == quote {
                if !triple {
                    self.pos += 1;
                    break;
                }
                if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                    self.pos += 3;
                    break;
                }
            }
            if c == '\n' {
                if !triple {
                    return Err(ParseError::new(
                        start_line,
                        format!("unterminated string literal (detected at line {})", self.line),
                    ));
                }
                self.line += 1;
            }
            if c == '\\' {
                let next = self.peek_at(1);
                if raw || fstring {
                    // escapes in f-strings are resolved after the parts are split
                    out.push('\\');
                    if let Some(n) = next {
                        out.push(n);
                        if n == '\n' {
                            self.line += 1;
                        }
                        self.pos += 2;
                    } else {
                        self.pos += 1;
                    }
                    continue;
                }
                self.pos += 2;
                match next {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some('0') => out.push('\0'),
                    Some('\\') => out.push('\\'),
                    Some('\'') => out.push('\''),
                    Some('"') => out.push('"'),
                    Some('\n') => self.line += 1,
                    Some('x') => out.push(self.hex_escape(2)?),
                    Some('u') => out.push(self.hex_escape(4)?),
                    Some(other) => {
                        out.push('\\');
                        out.push(other);
                    }
                    None => {}
                }
                continue;
            }
            out.push(c);
            self.pos += 1;
        }
        let tok = if fstring { Tok::FStr(out) } else { Tok::Str(out) };
        self.tokens.push(Token {
            tok,
            line: start_line,
        });
        Ok(())
    }

    fn hex_escape(&mut self, digits: usize) -> Result<char, ParseError> {
        let text: String = self
            .chars
            .get(self.pos..self.pos + digits)
            .map(|s| s.iter().collect())
            .unwrap_or_default();
        let code = u32::from_str_radix(&text, 16)
            .ok()
            .filter(|_| text.len() == digits)
            .and_then(char::from_u32)
            .ok_or_else(|| self.err("(unicode error) truncated escape sequence"))?;
        self.pos += digits;
        Ok(code)
    }

    fn number(&mut self) -> Result<(), ParseError> {
        let start = self.pos;
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x' | 'X')) {
            self.pos += 2;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit() || c == '_') {
                self.pos += 1;
            }
            let text: String = self.chars[start + 2..self.pos].iter().filter(|c| **c != '_').collect();
            let value = i64::from_str_radix(&text, 16).map_err(|_| self.err("invalid hexadecimal literal"))?;
            self.push(Tok::Int(value));
            return Ok(());
        }
        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '_' {
                self.pos += 1;
            } else if c == '.' && !is_float {
                is_float = true;
                self.pos += 1;
            } else if matches!(c, 'e' | 'E')
                && (self.peek_at(1).is_some_and(|d| d.is_ascii_digit())
                    || (matches!(self.peek_at(1), Some('+' | '-'))
                        && self.peek_at(2).is_some_and(|d| d.is_ascii_digit())))
            {
                is_float = true;
                self.pos += 2;
            } else {
                break;
            }
        }
        if self.peek().is_some_and(|c| c.is_alphabetic() || c == '_') {
            return Err(self.err("invalid decimal literal"));
        }
        let text: String = self.chars[start..self.pos].iter().filter(|c| **c != '_').collect();
        if is_float {
            let value = text.parse::<f64>().map_err(|_| self.err("invalid decimal literal"))?;
            self.push(Tok::Float(value));
        } else {
            match text.parse::<i64>() {
                Ok(value) => self.push(Tok::Int(value)),
                Err(_) => {
                    let value = text.parse::<f64>().map_err(|_| self.err("invalid decimal literal"))?;
                    self.push(Tok::Float(value));
                }
            }
        }
        Ok(())
    }

    fn operator(&mut self) -> Result<(), ParseError> {
        for op in OPERATORS {
            let len = op.chars().count();
            let matches = op
                .chars()
                .enumerate()
                .all(|(i, ch)| self.peek_at(i) == Some(ch));
            if !matches {
                continue;
            }
            match *op {
                "(" | "[" | "{" => {
                    let ch = op.chars().next().unwrap_or('(');
                    self.brackets.push((ch, self.line));
                }
                ")" | "]" | "}" => {
                    let close = op.chars().next().unwrap_or(')');
                    let expected = match close {
                        ')' => '(',
                        ']' => '[',
                        _ => '{',
                    };
                    match self.brackets.pop() {
                        Some((open, _)) if open == expected => {}
                        Some((open, _)) => {
                            return Err(self.err(format!(
                                "closing parenthesis '{close}' does not match opening parenthesis '{open}'"
                            )))
                        }
                        None => return Err(self.err(format!("unmatched '{close}'"))),
                    }
                }
                _ => {}
            }
            self.pos += len;
            self.push(Tok::Op(op));
            return Ok(());
        }
        let c = self.peek().unwrap_or(' ');
        Err(self.err(format!(
            "invalid character '{c}' (U+{:04X})",
            c as u32
        )))
    }
}
