//! Configuration helpers shared by heaptap binaries.

mod vars;

pub use vars::{interpolate, interpolate_with};

use serde::de::DeserializeOwned;
use snafu::prelude::*;
use std::path::Path;

use crate::error::{ConfigError, ReadFileSnafu, YamlParseSnafu};

/// Read a YAML file, interpolate environment variables and deserialize it.
pub fn load_yaml<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, ConfigError> {
    let contents = std::fs::read_to_string(path).context(ReadFileSnafu)?;
    parse_yaml(&contents)
}

/// Interpolate environment variables in `contents` and deserialize it.
pub fn parse_yaml<T: DeserializeOwned>(contents: &str) -> Result<T, ConfigError> {
    let text = interpolate(contents)?;
    serde_yaml::from_str(&text).context(YamlParseSnafu)
}
