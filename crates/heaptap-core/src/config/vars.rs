//! Environment variable interpolation for config files.
//!
//! Supported forms:
//! - `$VAR` or `${VAR}`: substitute, error if unset
//! - `${VAR:-default}`: default when VAR is unset or empty
//! - `${VAR-default}`: default only when VAR is unset
//! - `$$`: literal `$`

use regex::{Captures, Regex};
use std::env;
use std::sync::LazyLock;

use crate::error::{ConfigError, EnvInterpolationSnafu};

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \$\$
        |
        \$\{ ([A-Za-z_][A-Za-z0-9_]*) (?: (:?-) ([^}]*) )? \}
        |
        \$([A-Za-z_][A-Za-z0-9_]*)
        ",
    )
    .expect("Invalid regex pattern")
});

/// Interpolate environment variables in `input`.
///
/// Every unresolved variable is reported in one error so a misconfigured
/// deployment sees all of them at once.
pub fn interpolate(input: &str) -> Result<String, ConfigError> {
    interpolate_with(input, |name| env::var(name).ok())
}

/// Interpolate using `lookup` to resolve variable names.
pub fn interpolate_with<F>(input: &str, lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut errors = Vec::new();

    let text = ENV_VAR_PATTERN.replace_all(input, |caps: &Captures<'_>| {
        let full_match = &caps[0];
        if full_match == "$$" {
            return "$".to_string();
        }

        let Some(name) = caps.get(1).or_else(|| caps.get(4)).map(|m| m.as_str()) else {
            return full_match.to_string();
        };
        let default_syntax = caps.get(2).map(|m| m.as_str());
        let default_value = caps.get(3).map(|m| m.as_str());

        match (lookup(name), default_value) {
            (Some(value), _) if value.contains('\n') || value.contains('\r') => {
                errors.push(format!(
                    "environment variable '{name}' contains newlines, which is not allowed"
                ));
                full_match.to_string()
            }
            (Some(value), Some(default)) if value.is_empty() && default_syntax == Some(":-") => {
                default.to_string()
            }
            (Some(value), _) => value,
            (None, Some(default)) => default.to_string(),
            (None, None) => {
                errors.push(format!("environment variable '{name}' is not set"));
                full_match.to_string()
            }
        }
    });

    if errors.is_empty() {
        Ok(text.into_owned())
    } else {
        EnvInterpolationSnafu {
            message: errors.join("\n"),
        }
        .fail()
    }
}
