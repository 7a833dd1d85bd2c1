//! Mapping definitions: which source goes to which table, over which connection

use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, info};

use crate::error::LoadError;

/// One declarative rule binding a source location to a destination table
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Mapping {
    #[serde(default)]
    pub description: String,
    pub source: String,
    pub destination_table: String,
    pub id_expr: String,
    pub connection: String,
}

impl Mapping {
    /// Name used for this mapping in logs and errors
    pub fn label(&self) -> &str {
        if self.description.is_empty() {
            &self.source
        } else {
            &self.description
        }
    }

    fn validate(&self, position: usize) -> Result<(), LoadError> {
        if self.source.is_empty() || self.destination_table.is_empty() {
            return Err(LoadError::Config(format!(
                "mapping {}: source or destination_table is empty",
                position
            )));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct MappingDocument {
    mappings: Option<Vec<Value>>,
}

/// Build the ordered mapping list from a parsed configuration document
///
/// Fails without returning any mappings if `mappings` is absent or null, if
/// an entry lacks a required string field, or if an entry's `source` or
/// `destination_table` is empty.
pub fn mappings_from_document(document: &Value) -> Result<Vec<Mapping>, LoadError> {
    let parsed = MappingDocument::deserialize(document)
        .map_err(|e| LoadError::Config(format!("invalid mapping document: {}", e)))?;

    let entries = parsed
        .mappings
        .ok_or_else(|| LoadError::Config("missing 'mappings' key".to_string()))?;

    entries
        .iter()
        .enumerate()
        .map(|(idx, entry)| {
            let position = idx + 1;
            debug!(position, mapping = %entry, "parsing mapping");
            let mapping = Mapping::deserialize(entry)
                .map_err(|e| LoadError::Config(format!("mapping {}: {}", position, e)))?;
            mapping.validate(position)?;
            Ok(mapping)
        })
        .collect()
}

/// Read a mapping file from disk and validate it
pub async fn load_mapping_file(path: &Path) -> Result<Vec<Mapping>, LoadError> {
    info!(path = %path.display(), "parsing mapping file");

    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| LoadError::ReadMappingFile {
            path: path.to_path_buf(),
            source,
        })?;

    let document: Value =
        serde_json::from_str(&text).map_err(|source| LoadError::ParseMappingFile {
            path: path.to_path_buf(),
            source,
        })?;

    let mappings = mappings_from_document(&document)?;
    info!(count = mappings.len(), "parsed mapping data");
    Ok(mappings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(source: &str, table: &str) -> Value {
        json!({
            "source": source,
            "destination_table": table,
            "id_expr": "${id}",
            "connection": "sqlite://db.sqlite",
        })
    }

    #[test]
    fn test_preserves_fields_and_order() {
        let doc = json!({
            "mappings": [
                {
                    "description": "users",
                    "source": "data/users",
                    "destination_table": "users",
                    "id_expr": "${id}-${region}",
                    "connection": "postgres://u@h/db",
                },
                entry("data/orders.json", "orders"),
            ]
        });

        let mappings = mappings_from_document(&doc).unwrap();
        assert_eq!(mappings.len(), 2);
        assert_eq!(mappings[0].description, "users");
        assert_eq!(mappings[0].source, "data/users");
        assert_eq!(mappings[0].destination_table, "users");
        assert_eq!(mappings[0].id_expr, "${id}-${region}");
        assert_eq!(mappings[0].connection, "postgres://u@h/db");
        assert_eq!(mappings[1].description, "");
        assert_eq!(mappings[1].source, "data/orders.json");
        assert_eq!(mappings[1].label(), "data/orders.json");
    }

    #[test]
    fn test_empty_mapping_list_is_valid() {
        let mappings = mappings_from_document(&json!({"mappings": []})).unwrap();
        assert!(mappings.is_empty());
    }

    #[test]
    fn test_missing_or_null_mappings_key() {
        for doc in [json!({}), json!({"mappings": null}), json!({"other": []})] {
            let err = mappings_from_document(&doc).unwrap_err();
            assert!(matches!(err, LoadError::Config(_)), "doc: {}", doc);
        }
    }

    #[test]
    fn test_non_object_document() {
        assert!(matches!(
            mappings_from_document(&json!([1, 2])),
            Err(LoadError::Config(_))
        ));
        assert!(matches!(
            mappings_from_document(&json!(null)),
            Err(LoadError::Config(_))
        ));
    }

    #[test]
    fn test_empty_source_or_table_rejects_whole_document() {
        let doc = json!({"mappings": [entry("ok", "ok"), entry("", "t")]});
        let err = mappings_from_document(&doc).unwrap_err();
        match err {
            LoadError::Config(msg) => assert!(msg.contains("mapping 2")),
            other => panic!("expected config error, got {other:?}"),
        }

        let doc = json!({"mappings": [entry("src", "")]});
        assert!(matches!(
            mappings_from_document(&doc),
            Err(LoadError::Config(_))
        ));
    }

    #[test]
    fn test_required_fields_must_be_strings() {
        let doc = json!({"mappings": [{
            "source": "s",
            "destination_table": "t",
            "id_expr": 5,
            "connection": "sqlite://x",
        }]});
        assert!(matches!(
            mappings_from_document(&doc),
            Err(LoadError::Config(_))
        ));

        let doc = json!({"mappings": [{
            "source": "s",
            "destination_table": "t",
            "id_expr": "${id}",
        }]});
        assert!(matches!(
            mappings_from_document(&doc),
            Err(LoadError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_load_mapping_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("mapping.json");
        let doc = json!({"mappings": [entry("in", "out")]});
        tokio::fs::write(&path, doc.to_string()).await.unwrap();

        let mappings = load_mapping_file(&path).await.unwrap();
        assert_eq!(mappings, vec![mappings_from_document(&doc).unwrap()[0].clone()]);
    }

    #[tokio::test]
    async fn test_load_mapping_file_errors() {
        let dir = tempfile::TempDir::new().unwrap();

        let missing = dir.path().join("absent.json");
        assert!(matches!(
            load_mapping_file(&missing).await,
            Err(LoadError::ReadMappingFile { .. })
        ));

        let broken = dir.path().join("broken.json");
        tokio::fs::write(&broken, "{ not json").await.unwrap();
        assert!(matches!(
            load_mapping_file(&broken).await,
            Err(LoadError::ParseMappingFile { .. })
        ));
    }
}
