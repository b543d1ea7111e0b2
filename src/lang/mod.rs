// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// Analysis-language front end
//
// Responsibilities:
// - Tokenize source with indentation tracking
// - Parse the Python-flavoured analysis subset into an AST
// - Report syntax errors with line numbers and Python-style messages
//
// The validator uses this for syntax checks and the sandbox interprets
// the resulting tree.

pub mod ast;
mod error;
mod lexer;
mod parser;
mod token;

pub use error::ParseError;
pub use lexer::tokenize;
pub use parser::{parse_expression, parse_fstring, parse_module};
pub use token::{Tok, Token};

#[cfg(test)]
mod tests;
