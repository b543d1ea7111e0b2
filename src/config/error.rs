// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

/// Reasons a sluice config file cannot become a `Config`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file named on the command line could not be read.
    #[error("cannot read sluice config: {0}")]
    Read(#[from] std::io::Error),

    #[error("sluice config is not valid YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// A setting parsed but is out of range, e.g. a generation temperature
    /// above 2.0 or a zero step budget.
    #[error("invalid setting: {0}")]
    Invalid(String),

    /// A security pattern in the policy does not compile.
    #[error("security pattern \"{pattern}\" does not compile: {source}")]
    SecurityPattern {
        pattern: String,
        source: regex::Error,
    },

    /// `${NAME}` appears in the file but `NAME` is unset.
    #[error("config references ${{{name}}} but it is not set in the environment")]
    UnsetEnvVar { name: String },
}
