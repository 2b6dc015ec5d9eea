use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Flat tag identifying which stage of the pipeline failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorCode {
    InvalidSchema,
    FileNotFound,
    ParseError,
    ValidationError,
    MergeError,
    LoadError,
    FileReadError,
    DirReadError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidSchema => "INVALID_SCHEMA",
            Self::FileNotFound => "FILE_NOT_FOUND",
            Self::ParseError => "PARSE_ERROR",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::MergeError => "MERGE_ERROR",
            Self::LoadError => "LOAD_ERROR",
            Self::FileReadError => "FILE_READ_ERROR",
            Self::DirReadError => "DIR_READ_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single schema violation found in the merged configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    /// JSON Pointer to the offending value, such as `/db/port` or
    /// `/hosts/0` (empty for the document root).
    pub path: String,
    /// The schema keyword that failed, e.g. `required` or `type`.
    pub keyword: String,
    pub message: String,
    /// The actual value found, if there was one.
    pub value: Option<Value>,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() {
            "<root>"
        } else {
            &self.path
        };
        write!(f, "{path}: {} ({})", self.message, self.keyword)?;
        if let Some(value) = &self.value {
            write!(f, ", got {value}")?;
        }
        Ok(())
    }
}

/// The underlying reason a single configuration file could not be read.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum FileReadCause {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("file is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid schema at '{pointer}': {message}")]
    InvalidSchema { pointer: String, message: String },

    #[error("schema file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("failed to parse '{path}': {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error(
        "configuration failed validation with {} violation(s):{}",
        .0.len(),
        list_violations(.0)
    )]
    ValidationError(Vec<Violation>),

    #[error("cannot merge '{path}': {message}")]
    MergeError { path: PathBuf, message: String },

    #[error("failed to load configuration: {message}")]
    LoadError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("failed to read config file '{path}': {source}")]
    FileReadError {
        path: PathBuf,
        source: FileReadCause,
    },

    #[error("failed to read config directory '{path}': {source}")]
    DirReadError {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ConfigError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidSchema { .. } => ErrorCode::InvalidSchema,
            Self::FileNotFound(_) => ErrorCode::FileNotFound,
            Self::ParseError { .. } => ErrorCode::ParseError,
            Self::ValidationError(_) => ErrorCode::ValidationError,
            Self::MergeError { .. } => ErrorCode::MergeError,
            Self::LoadError { .. } => ErrorCode::LoadError,
            Self::FileReadError { .. } => ErrorCode::FileReadError,
            Self::DirReadError { .. } => ErrorCode::DirReadError,
        }
    }

    /// Returns every schema violation when this is a validation failure.
    pub fn violations(&self) -> Option<&[Violation]> {
        match self {
            Self::ValidationError(violations) => Some(violations),
            _ => None,
        }
    }

    pub(crate) fn invalid_schema(pointer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSchema {
            pointer: pointer.into(),
            message: message.into(),
        }
    }

    pub(crate) fn file_read(path: impl Into<PathBuf>, source: impl Into<FileReadCause>) -> Self {
        Self::FileReadError {
            path: path.into(),
            source: source.into(),
        }
    }

    pub(crate) fn load(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::LoadError {
            message: message.into(),
            source,
        }
    }
}

fn list_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|violation| format!("\n  - {violation}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violation(path: &str, keyword: &str) -> Violation {
        Violation {
            path: path.to_string(),
            keyword: keyword.to_string(),
            message: format!("{keyword} failed"),
            value: None,
        }
    }

    #[test]
    fn test_codes_match_tags() {
        let err = ConfigError::invalid_schema("/type", "unknown type 'text'");
        assert_eq!(err.code(), ErrorCode::InvalidSchema);
        assert_eq!(err.code().as_str(), "INVALID_SCHEMA");

        let err = ConfigError::load("worker panicked", None);
        assert_eq!(err.code().to_string(), "LOAD_ERROR");
    }

    #[test]
    fn test_validation_error_lists_every_violation() {
        let err = ConfigError::ValidationError(vec![
            violation("/port", "type"),
            violation("/db/host", "required"),
        ]);

        let message = err.to_string();
        assert!(message.contains("2 violation(s)"));
        assert!(message.contains("/port: type failed"));
        assert!(message.contains("/db/host: required failed"));
        assert_eq!(err.violations().map(<[Violation]>::len), Some(2));
    }

    #[test]
    fn test_violation_display_includes_value() {
        let mut v = violation("", "type");
        v.value = Some(Value::String("65536".into()));
        assert_eq!(v.to_string(), "<root>: type failed (type), got \"65536\"");
    }

    #[test]
    fn test_file_read_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = ConfigError::file_read("config/default/app.json", io);

        assert_eq!(err.code(), ErrorCode::FileReadError);
        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("config/default/app.json"));
    }
}
