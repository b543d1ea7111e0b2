// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// Lexical helpers over analysis code: string/comment classification,
// corruption indicators and the deterministic text repairs.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Span {
    Code,
    Str,
    Comment,
}

/// Classify every byte of `code` as code, string literal or comment.
///
/// Unterminated single-quoted strings end at the line break; unterminated
/// triple-quoted strings run to the end of input.
pub(crate) fn classify(code: &str) -> Vec<Span> {
    let bytes = code.as_bytes();
    let len = bytes.len();
    let mut spans = vec![Span::Code; len];
    let mut i = 0;
    while i < len {
        match bytes[i] {
            b'#' => {
                let end = memchr_newline(bytes, i);
                spans[i..end].fill(Span::Comment);
                i = end;
            }
            q @ (b'"' | b'\'') => {
                let triple = bytes[i..].starts_with(&[q, q, q]);
                let mut j = i + if triple { 3 } else { 1 };
                while j < len {
                    if bytes[j] == b'\\' {
                        j += 2;
                        continue;
                    }
                    if triple {
                        if bytes[j..].starts_with(&[q, q, q]) {
                            j += 3;
                            break;
                        }
                    } else if bytes[j] == q {
                        j += 1;
                        break;
                    } else if bytes[j] == b'\n' {
                        break;
                    }
                    j += 1;
                }
                let end = j.min(len);
                spans[i..end].fill(Span::Str);
                i = end;
            }
            _ => i += 1,
        }
    }
    spans
}

fn memchr_newline(bytes: &[u8], from: usize) -> usize {
    bytes[from..]
        .iter()
        .position(|b| *b == b'\n')
        .map(|p| from + p)
        .unwrap_or(bytes.len())
}

/// Literal `\n` / `\t` escapes that should have been real whitespace.
fn is_escape_at(bytes: &[u8], i: usize) -> bool {
    bytes[i] == b'\\'
        && matches!(bytes.get(i + 1), Some(b'n' | b't'))
        && !matches!(bytes.get(i + 2), Some(b'"' | b'\''))
}

/// A closing bracket followed, on the same line, by whitespace and the
/// same closing bracket. Returns the byte range of the whitespace and
/// the second bracket.
fn duplicate_close_at(bytes: &[u8], i: usize) -> Option<std::ops::Range<usize>> {
    let close = bytes[i];
    if close != b']' && close != b')' {
        return None;
    }
    let mut j = i + 1;
    while j < bytes.len() && (bytes[j] == b' ' || bytes[j] == b'\t') {
        j += 1;
    }
    if j > i + 1 && j < bytes.len() && bytes[j] == close {
        Some(i + 1..j + 1)
    } else {
        None
    }
}

/// Corruption indicators in free text: literal escape sequences and
/// duplicated closing brackets separated by whitespace.
pub(crate) fn text_has_corruption(text: &str) -> bool {
    let bytes = text.as_bytes();
    (0..bytes.len()).any(|i| is_escape_at(bytes, i) || duplicate_close_at(bytes, i).is_some())
}

/// Corruption indicators in code, ignoring anything inside string literals.
/// An escaped quote outside a string also counts: it means the whole
/// snippet arrived JSON-escaped.
pub(crate) fn code_has_corruption(code: &str) -> bool {
    let bytes = code.as_bytes();
    let spans = classify(code);
    (0..bytes.len()).any(|i| match spans[i] {
        Span::Str => false,
        Span::Comment => is_escape_at(bytes, i),
        Span::Code => {
            is_escape_at(bytes, i)
                || escaped_quote_at(bytes, i)
                || duplicate_close_at(bytes, i).is_some()
        }
    })
}

fn escaped_quote_at(bytes: &[u8], i: usize) -> bool {
    bytes[i] == b'\\' && matches!(bytes.get(i + 1), Some(b'"' | b'\''))
}

/// Turn literal escape sequences back into the characters they stand for.
///
/// Code that arrived entirely JSON-escaped (escaped quotes in code
/// position, or no real line breaks at all) is unescaped as a whole.
/// Otherwise only escapes outside string literals are rewritten.
pub(crate) fn clean_escape_sequences(code: &str) -> String {
    let bytes = code.as_bytes();
    let spans = classify(code);
    let fully_escaped = (0..bytes.len()).any(|i| spans[i] == Span::Code && escaped_quote_at(bytes, i))
        || (!code.contains('\n') && code.contains("\\n"));
    if fully_escaped {
        return unescape_all(code);
    }

    let mut out = String::with_capacity(code.len());
    let mut i = 0;
    while i < bytes.len() {
        if spans[i] != Span::Str && is_escape_at(bytes, i) {
            out.push(if bytes[i + 1] == b'n' { '\n' } else { '\t' });
            i += 2;
            continue;
        }
        let ch = next_char(code, i);
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

fn next_char(text: &str, at: usize) -> char {
    text[at..].chars().next().unwrap_or('\u{FFFD}')
}

fn unescape_all(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    let mut chars = code.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => {}
            Some(q @ ('"' | '\'' | '\\')) => out.push(q),
            _ => {
                out.push('\\');
                continue;
            }
        }
        chars.next();
    }
    out
}

/// Remove a leading ```lang fence line and a trailing ``` fence line.
pub(crate) fn strip_code_fences(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return None;
    }
    let body = match trimmed.find('\n') {
        Some(pos) => &trimmed[pos + 1..],
        None => "",
    };
    let body = body.trim_end();
    let body = body.strip_suffix("```").unwrap_or(body);
    Some(body.trim_end().to_string())
}

/// Remove the common leading indentation of all non-blank lines.
pub(crate) fn dedent(code: &str) -> String {
    let margin = code
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);
    if margin == 0 {
        return code.to_string();
    }
    code.lines()
        .map(|l| l.get(margin..).unwrap_or_else(|| l.trim_start()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Strip a continuation backslash from any line followed by a blank line
/// or the end of input, where it can only be a stray.
pub(crate) fn strip_trailing_continuation(code: &str) -> String {
    let lines: Vec<&str> = code.lines().collect();
    let mut out = Vec::with_capacity(lines.len());
    for (idx, line) in lines.iter().enumerate() {
        let next_blank = lines[idx + 1..]
            .first()
            .map(|l| l.trim().is_empty())
            .unwrap_or(true);
        let trimmed = line.trim_end();
        match trimmed.strip_suffix('\\') {
            Some(rest) if next_blank => out.push(rest.trim_end().to_string()),
            _ => out.push(line.to_string()),
        }
    }
    out.join("\n")
}

/// Collapse closing brackets duplicated on the same line (`] ]`, `) )`).
pub(crate) fn collapse_duplicate_brackets(code: &str) -> String {
    let bytes = code.as_bytes();
    let spans = classify(code);
    let mut out = String::with_capacity(code.len());
    let mut i = 0;
    while i < bytes.len() {
        if spans[i] == Span::Code {
            if let Some(dup) = duplicate_close_at(bytes, i) {
                out.push(bytes[i] as char);
                i = dup.end;
                continue;
            }
        }
        let ch = next_char(code, i);
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

/// Drop lines carrying control characters or replacement characters,
/// which no well-formed analysis code contains.
pub(crate) fn drop_junk_lines(code: &str) -> String {
    code.lines()
        .filter(|line| {
            !line
                .chars()
                .any(|c| c == '\u{FFFD}' || (c.is_control() && c != '\t' && c != '\r'))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Drop the 1-based line `line`.
pub(crate) fn drop_line(code: &str, line: usize) -> String {
    code.lines()
        .enumerate()
        .filter(|(idx, _)| idx + 1 != line)
        .map(|(_, l)| l)
        .collect::<Vec<_>>()
        .join("\n")
}

/// 1-based number of the last non-blank line.
pub(crate) fn last_code_line(code: &str) -> usize {
    code.lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(idx, _)| idx + 1)
        .last()
        .unwrap_or(0)
}

/// Replace comment bytes with spaces so offsets still line up with `code`.
pub(crate) fn mask_comments(code: &str) -> String {
    let spans = classify(code);
    let mut out = String::with_capacity(code.len());
    for (i, c) in code.char_indices() {
        if spans[i] == Span::Comment {
            out.extend(std::iter::repeat(' ').take(c.len_utf8()));
        } else {
            out.push(c);
        }
    }
    out
}

/// The full line of `text` containing byte offset `at`.
pub(crate) fn line_at(text: &str, at: usize) -> &str {
    let start = text[..at].rfind('\n').map(|p| p + 1).unwrap_or(0);
    let end = text[at..].find('\n').map(|p| at + p).unwrap_or(text.len());
    text[start..end].trim_end_matches('\r')
}
