// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

// The three-field structured response shared by generation, validation,
// buffering and streaming.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the three fields of a structured analysis response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    InitialResponse,
    GeneratedCode,
    ResultCommentary,
}

impl Field {
    /// Streaming order.
    pub const ALL: [Field; 3] = [
        Field::InitialResponse,
        Field::GeneratedCode,
        Field::ResultCommentary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::InitialResponse => "initial_response",
            Field::GeneratedCode => "generated_code",
            Field::ResultCommentary => "result_commentary",
        }
    }

    /// Position in [`Field::ALL`].
    pub fn index(self) -> usize {
        match self {
            Field::InitialResponse => 0,
            Field::GeneratedCode => 1,
            Field::ResultCommentary => 2,
        }
    }

    pub fn parse(name: &str) -> Option<Field> {
        Field::ALL.into_iter().find(|f| f.as_str() == name)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One cumulative update from the generator: the field's whole value so
/// far, not an increment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChunk {
    pub field: Field,
    pub content: String,
}

impl FieldChunk {
    pub fn new(field: Field, content: impl Into<String>) -> Self {
        Self {
            field,
            content: content.into(),
        }
    }
}

/// Field values of one response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseFields {
    #[serde(default)]
    pub initial_response: String,
    #[serde(default)]
    pub generated_code: String,
    #[serde(default)]
    pub result_commentary: String,
}

impl ResponseFields {
    pub fn new(
        initial_response: impl Into<String>,
        generated_code: impl Into<String>,
        result_commentary: impl Into<String>,
    ) -> Self {
        Self {
            initial_response: initial_response.into(),
            generated_code: generated_code.into(),
            result_commentary: result_commentary.into(),
        }
    }

    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::InitialResponse => &self.initial_response,
            Field::GeneratedCode => &self.generated_code,
            Field::ResultCommentary => &self.result_commentary,
        }
    }

    /// Replace the field's whole value.
    pub fn set(&mut self, field: Field, content: impl Into<String>) {
        let slot = match field {
            Field::InitialResponse => &mut self.initial_response,
            Field::GeneratedCode => &mut self.generated_code,
            Field::ResultCommentary => &mut self.result_commentary,
        };
        *slot = content.into();
    }

    pub fn clear(&mut self) {
        for field in Field::ALL {
            self.set(field, String::new());
        }
    }

    pub fn is_empty(&self) -> bool {
        Field::ALL.iter().all(|f| self.get(*f).is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, &str)> {
        Field::ALL.into_iter().map(move |f| (f, self.get(f)))
    }

    /// The clearly marked placeholder sent when the generator or the
    /// pipeline is unavailable.
    pub fn fallback(user_message: &str, reason: &str) -> Self {
        Self::new(
            format!("I received your message: '{user_message}'. {reason}")
                .trim_end()
                .to_string(),
            "# Fallback response - system temporarily unavailable\n\
             # Please try again or check system status\n\
             print('System is in fallback mode')\n",
            "This is a fallback response. The system encountered an issue and is \
             operating in safe mode.",
        )
    }
}
