// Copyright 2026 The Sluice Project
// SPDX-License-Identifier: Apache-2.0

use super::error::ConfigError;

/// Expands `${VAR}` references from the process environment.
///
/// An unset variable is an error. A reference with no closing brace or an
/// empty name is copied through literally.
pub fn resolve_variables(input: &str) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(0) | None => {
                out.push_str("${");
                rest = after;
            }
            Some(end) => {
                let name = &after[..end];
                let value = std::env::var(name).map_err(|_| ConfigError::UnsetEnvVar {
                    name: name.to_string(),
                })?;
                out.push_str(&value);
                rest = &after[end + 1..];
            }
        }
    }
    out.push_str(rest);

    Ok(out)
}

/// Like [`resolve_variables`], but an unset variable resolves to `None`
/// instead of failing. Used for optional secrets such as API keys.
pub fn resolve_optional(input: &str) -> Result<Option<String>, ConfigError> {
    match resolve_variables(input) {
        Ok(v) if v.is_empty() => Ok(None),
        Ok(v) => Ok(Some(v)),
        Err(ConfigError::UnsetEnvVar { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}
