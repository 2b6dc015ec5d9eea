//! Single-file configuration reader.

use std::path::Path;

use serde_json::{Map, Value};
use tracing::trace;

use super::ConfigError;

/// A configuration document format, selected by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Format {
    Json,
    /// TOML documents are converted to the same JSON tree before merging.
    Toml,
}

impl Format {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Toml => "toml",
        }
    }

    /// Picks the format whose extension matches `path`, if any is enabled.
    pub fn for_path(path: &Path, enabled: &[Format]) -> Option<Format> {
        let ext = path.extension()?.to_str()?;
        enabled
            .iter()
            .copied()
            .find(|format| format.extension().eq_ignore_ascii_case(ext))
    }
}

/// Reads and parses one JSON configuration file.
///
/// Missing, unreadable, non-UTF-8 and syntactically invalid files all fail
/// with [`ConfigError::FileReadError`].
pub fn read_config_file(path: impl AsRef<Path>) -> Result<Map<String, Value>, ConfigError> {
    read_config_file_as(path, Format::Json)
}

/// Reads and parses one configuration file in the given format.
pub fn read_config_file_as(
    path: impl AsRef<Path>,
    format: Format,
) -> Result<Map<String, Value>, ConfigError> {
    let path = path.as_ref();
    trace!(path = %path.display(), ?format, "reading config file");

    let bytes = std::fs::read(path).map_err(|e| ConfigError::file_read(path, e))?;
    let text = String::from_utf8(bytes).map_err(|e| ConfigError::file_read(path, e))?;

    let value = match format {
        Format::Json => {
            serde_json::from_str::<Value>(&text).map_err(|e| ConfigError::file_read(path, e))?
        }
        Format::Toml => {
            let table: toml::Table =
                toml::from_str(&text).map_err(|e| ConfigError::file_read(path, e))?;
            toml_to_json(toml::Value::Table(table))
        }
    };

    match value {
        Value::Object(map) => Ok(map),
        other => Err(ConfigError::MergeError {
            path: path.to_path_buf(),
            message: format!("document root must be an object, found {}", kind(&other)),
        }),
    }
}

fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => Value::from(f),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(key, value)| (key, toml_to_json(value)))
                .collect(),
        ),
    }
}

pub(crate) fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
