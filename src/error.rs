//! Error types for mapping validation, id expressions, sessions and runs

use std::path::PathBuf;
use thiserror::Error;

/// Failure evaluating an id expression against one document
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExprError {
    #[error("Invalid id expression: missing closing '}}' in '{expr}'")]
    Malformed { expr: String },

    #[error("Key '{field}' not found in JSON data for id expression '{expr}'")]
    FieldNotFound { field: String, expr: String },

    #[error(
        "Invalid value type for key '{field}' in id expression '{expr}': expected string or integer, got {found}"
    )]
    TypeMismatch {
        field: String,
        expr: String,
        found: &'static str,
    },
}

/// Failure opening a session or executing against it
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Unsupported connection string '{0}': expected a postgres:// or sqlite: URL")]
    UnsupportedConnection(String),

    #[error("Failed to connect to '{connection}': {source}")]
    Connection {
        connection: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Query failed: {0}")]
    Query(#[source] sqlx::Error),

    #[error("Query failed on statement {index}: {source}")]
    QueryAt {
        index: usize,
        #[source]
        source: sqlx::Error,
    },

    #[error("{operation} timed out after {secs} seconds")]
    Timeout { operation: &'static str, secs: u64 },

    #[error("Invalid identifier '{0}'")]
    InvalidIdentifier(String),
}

impl SessionError {
    /// Zero-based position of the failing statement inside a batch, if known
    pub fn failed_index(&self) -> Option<usize> {
        match self {
            SessionError::QueryAt { index, .. } => Some(*index),
            _ => None,
        }
    }
}

/// Fatal error that aborts a load run
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Invalid mapping configuration: {0}")]
    Config(String),

    #[error("Source path does not exist: {} (mapping '{mapping}')", .path.display())]
    SourceNotFound { mapping: String, path: PathBuf },

    #[error("Unsupported source type at {} (mapping '{mapping}'): {reason}", .path.display())]
    UnsupportedSourceType {
        mapping: String,
        path: PathBuf,
        reason: String,
    },

    #[error("Unable to read mapping file {}: {source}", .path.display())]
    ReadMappingFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse mapping file {}: {source}", .path.display())]
    ParseMappingFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Mapping '{mapping}': unable to read {}: {source}", .path.display())]
    Io {
        mapping: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Mapping '{mapping}': failed to parse JSON in {}: {source}", .path.display())]
    Parse {
        mapping: String,
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(
        "Mapping '{mapping}': invalid JSON data, expected object or array in {}, found {found}",
        .path.display()
    )]
    InvalidDocumentShape {
        mapping: String,
        path: PathBuf,
        found: &'static str,
    },

    #[error("Mapping '{mapping}', file {}, element {index}: {source}", .path.display())]
    Expression {
        mapping: String,
        path: PathBuf,
        index: usize,
        #[source]
        source: ExprError,
    },

    #[error("Mapping '{mapping}': {source}")]
    Connection {
        mapping: String,
        #[source]
        source: SessionError,
    },

    #[error(
        "Mapping '{mapping}', file {}, element {index}: write to '{table}' failed: {source}",
        .path.display()
    )]
    Write {
        mapping: String,
        path: PathBuf,
        index: usize,
        table: String,
        #[source]
        source: SessionError,
    },

    #[error("Mapping '{mapping}', file {}: transaction on '{table}' failed: {source}", .path.display())]
    Transaction {
        mapping: String,
        path: PathBuf,
        table: String,
        #[source]
        source: SessionError,
    },
}

/// Short name of a JSON value's type for diagnostics
pub(crate) fn json_type_name(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_type_names() {
        assert_eq!(json_type_name(&json!(null)), "null");
        assert_eq!(json_type_name(&json!(true)), "boolean");
        assert_eq!(json_type_name(&json!(1)), "integer");
        assert_eq!(json_type_name(&json!(-7)), "integer");
        assert_eq!(json_type_name(&json!(1.5)), "float");
        assert_eq!(json_type_name(&json!("x")), "string");
        assert_eq!(json_type_name(&json!([1])), "array");
        assert_eq!(json_type_name(&json!({})), "object");
    }

    #[test]
    fn test_expr_error_messages_name_field_and_expression() {
        let err = ExprError::FieldNotFound {
            field: "missing".to_string(),
            expr: "${missing}".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("'missing'"));
        assert!(msg.contains("${missing}"));
    }

    #[test]
    fn test_file_errors_name_the_mapping() {
        let err = LoadError::InvalidDocumentShape {
            mapping: "orders".to_string(),
            path: PathBuf::from("in/scalar.json"),
            found: "integer",
        };
        let msg = err.to_string();
        assert!(msg.contains("Mapping 'orders'"));
        assert!(msg.contains("in/scalar.json"));
        assert!(msg.contains("integer"));

        let parse = serde_json::from_str::<serde_json::Value>("{ nope").unwrap_err();
        let err = LoadError::Parse {
            mapping: "orders".to_string(),
            path: PathBuf::from("in/bad.json"),
            source: parse,
        };
        assert!(err.to_string().starts_with("Mapping 'orders': failed to parse JSON"));
    }
}
