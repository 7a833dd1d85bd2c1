//! Source traversal and per-document writes.
//!
//! A run walks mappings in declaration order, the files of each mapping in
//! directory order, and the elements of each file in array order. Every
//! step is awaited before the next one starts, and the first error ends
//! the run.

use serde_json::Value;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{JSON_EXTENSION, LoadOptions};
use crate::db::ConnectionFactory;
use crate::error::{ExprError, LoadError, json_type_name};
use crate::expr::IdExpression;
use crate::mapping::Mapping;
use crate::record::Record;
use crate::telemetry::{ProgressStats, TelemetryEvent};

/// Outcome of a completed run
#[derive(Debug, Clone)]
pub struct LoadReport {
    /// Directory entry counts plus single-file sources
    pub files_processed: usize,
    pub documents_written: u64,
    pub sessions_opened: usize,
    pub stats: ProgressStats,
}

/// State owned by a single run. Dropped (and its sessions closed) when the
/// run ends.
struct Run<'a> {
    load_id: &'a str,
    factory: ConnectionFactory,
    stats: ProgressStats,
}

/// Loads mapped sources into their destination tables.
///
/// Holds no per-run state, so one instance can serve any number of runs.
#[derive(Debug, Clone, Default)]
pub struct Loader {
    options: LoadOptions,
}

impl Loader {
    pub fn new(options: LoadOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    /// Run every mapping, tagging each written record with `load_id`.
    ///
    /// Sessions opened during the run are closed before this returns,
    /// whether the run succeeded or not.
    pub async fn load(&self, mappings: &[Mapping], load_id: &str) -> Result<LoadReport, LoadError> {
        info!(
            mappings = mappings.len(),
            load_id, "starting data loading process"
        );

        let mut run = Run {
            load_id,
            factory: ConnectionFactory::new(),
            stats: ProgressStats::new(),
        };

        let result = self.load_mappings(mappings, &mut run).await;

        let Run { factory, stats, .. } = run;
        let sessions_opened = factory.len();
        factory.close().await;

        let files_processed = result?;
        info!(
            files_processed,
            documents_written = stats.documents_written,
            "data loading finished"
        );

        Ok(LoadReport {
            files_processed,
            documents_written: stats.documents_written,
            sessions_opened,
            stats,
        })
    }

    async fn load_mappings(&self, mappings: &[Mapping], run: &mut Run<'_>) -> Result<usize, LoadError> {
        let mut files_processed = 0;
        for (idx, mapping) in mappings.iter().enumerate() {
            info!(
                mapping = idx + 1,
                of = mappings.len(),
                source = %mapping.source,
                table = %mapping.destination_table,
                id_expr = %mapping.id_expr,
                "processing mapping"
            );
            files_processed += self.load_mapping(mapping, run).await?;
        }
        Ok(files_processed)
    }

    /// Resolve a mapping's source and process it; returns the entries counted
    async fn load_mapping(&self, mapping: &Mapping, run: &mut Run<'_>) -> Result<usize, LoadError> {
        let source = Path::new(&mapping.source);
        // An unterminated placeholder is reported against the first document,
        // so sources without documents do not fail on it.
        let expr = IdExpression::parse(&mapping.id_expr);

        let metadata = match tokio::fs::metadata(source).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LoadError::SourceNotFound {
                    mapping: mapping.label().to_string(),
                    path: source.to_path_buf(),
                });
            }
            Err(e) => {
                return Err(LoadError::UnsupportedSourceType {
                    mapping: mapping.label().to_string(),
                    path: source.to_path_buf(),
                    reason: e.to_string(),
                });
            }
        };

        if metadata.is_dir() {
            self.load_directory(source, mapping, &expr, run).await
        } else if metadata.is_file() {
            self.load_file(source, mapping, &expr, run).await?;
            Ok(1)
        } else {
            Err(LoadError::UnsupportedSourceType {
                mapping: mapping.label().to_string(),
                path: source.to_path_buf(),
                reason: "not a regular file or directory".to_string(),
            })
        }
    }

    async fn load_directory(
        &self,
        dir: &Path,
        mapping: &Mapping,
        expr: &Result<IdExpression, ExprError>,
        run: &mut Run<'_>,
    ) -> Result<usize, LoadError> {
        // Best-effort count, taken before traversal; it is also what the
        // run reports as processed for this directory
        let entry_count = count_entries(dir, mapping).await?;
        info!(directory = %dir.display(), entry_count, "processing directory");

        let io_err = |source| LoadError::Io {
            mapping: mapping.label().to_string(),
            path: dir.to_path_buf(),
            source,
        };
        let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err)?;

        let mut files = 0;
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let path = entry.path();
            match tokio::fs::metadata(&path).await {
                Ok(metadata) if metadata.is_file() => {}
                Ok(_) => {
                    debug!(entry = %path.display(), "skipping non-file entry");
                    continue;
                }
                Err(e) => {
                    warn!(entry = %path.display(), error = %e, "skipping unreadable entry");
                    continue;
                }
            }

            files += 1;
            info!(
                file = files,
                of = entry_count,
                name = %entry.file_name().to_string_lossy(),
                "processing file"
            );
            self.load_file(&path, mapping, expr, run).await?;
        }

        Ok(entry_count)
    }

    async fn load_file(
        &self,
        path: &Path,
        mapping: &Mapping,
        expr: &Result<IdExpression, ExprError>,
        run: &mut Run<'_>,
    ) -> Result<(), LoadError> {
        run.stats.update(&TelemetryEvent::FileStarted);
        info!(file = %path.display(), table = %mapping.destination_table, "loading file");

        if !has_json_extension(path) {
            if self.options.strict_extension_check {
                warn!(
                    file = %path.display(),
                    "file does not have a .json extension, skipping it"
                );
                run.stats.update(&TelemetryEvent::FileSkipped);
                return Ok(());
            }
            warn!(
                file = %path.display(),
                "file does not have a .json extension, parsing it anyway"
            );
        }

        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| LoadError::Io {
                mapping: mapping.label().to_string(),
                path: path.to_path_buf(),
                source,
            })?;
        let document: Value = serde_json::from_str(&text).map_err(|source| LoadError::Parse {
            mapping: mapping.label().to_string(),
            path: path.to_path_buf(),
            source,
        })?;

        match &document {
            Value::Object(_) => {
                self.write_documents(path, mapping, expr, std::slice::from_ref(&document), run)
                    .await
            }
            Value::Array(elements) => {
                info!(elements = elements.len(), "parsed JSON array");
                self.write_documents(path, mapping, expr, elements, run).await
            }
            other => Err(LoadError::InvalidDocumentShape {
                mapping: mapping.label().to_string(),
                path: path.to_path_buf(),
                found: json_type_name(other),
            }),
        }
    }

    async fn write_documents(
        &self,
        path: &Path,
        mapping: &Mapping,
        expr: &Result<IdExpression, ExprError>,
        documents: &[Value],
        run: &mut Run<'_>,
    ) -> Result<(), LoadError> {
        if self.options.transaction_per_file {
            return self
                .write_documents_in_transaction(path, mapping, expr, documents, run)
                .await;
        }

        for (idx, document) in documents.iter().enumerate() {
            let index = idx + 1;
            debug!(element = index, of = documents.len(), "processing element");

            let record = build_record(path, mapping, expr, document, index, run.load_id)?;
            let session = run
                .factory
                .get_session(&mapping.connection)
                .await
                .map_err(|source| LoadError::Connection {
                    mapping: mapping.label().to_string(),
                    source,
                })?;

            let start = Instant::now();
            session
                .execute(&record.to_insert(&mapping.destination_table))
                .await
                .map_err(|source| LoadError::Write {
                    mapping: mapping.label().to_string(),
                    path: path.to_path_buf(),
                    index,
                    table: mapping.destination_table.clone(),
                    source,
                })?;

            run.stats.update(&TelemetryEvent::DocumentWritten {
                duration_ms: start.elapsed().as_millis() as u64,
            });
        }

        Ok(())
    }

    /// Evaluate every document first, then write them in one transaction
    async fn write_documents_in_transaction(
        &self,
        path: &Path,
        mapping: &Mapping,
        expr: &Result<IdExpression, ExprError>,
        documents: &[Value],
        run: &mut Run<'_>,
    ) -> Result<(), LoadError> {
        if documents.is_empty() {
            return Ok(());
        }

        let inserts = documents
            .iter()
            .enumerate()
            .map(|(idx, document)| {
                build_record(path, mapping, expr, document, idx + 1, run.load_id)
                    .map(|record| record.to_insert(&mapping.destination_table))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let session = run
            .factory
            .get_session(&mapping.connection)
            .await
            .map_err(|source| LoadError::Connection {
                mapping: mapping.label().to_string(),
                source,
            })?;

        let start = Instant::now();
        session.execute_all(&inserts).await.map_err(|source| {
            match source.failed_index() {
                Some(idx) => LoadError::Write {
                    mapping: mapping.label().to_string(),
                    path: path.to_path_buf(),
                    index: idx + 1,
                    table: mapping.destination_table.clone(),
                    source,
                },
                None => LoadError::Transaction {
                    mapping: mapping.label().to_string(),
                    path: path.to_path_buf(),
                    table: mapping.destination_table.clone(),
                    source,
                },
            }
        })?;

        let per_document_ms = start.elapsed().as_millis() as u64 / inserts.len() as u64;
        for _ in &inserts {
            run.stats.update(&TelemetryEvent::DocumentWritten {
                duration_ms: per_document_ms,
            });
        }

        Ok(())
    }
}

fn build_record(
    path: &Path,
    mapping: &Mapping,
    expr: &Result<IdExpression, ExprError>,
    document: &Value,
    index: usize,
    load_id: &str,
) -> Result<Record, LoadError> {
    let id = expr
        .as_ref()
        .map_err(Clone::clone)
        .and_then(|expr| expr.render(document))
        .map_err(|source| LoadError::Expression {
            mapping: mapping.label().to_string(),
            path: path.to_path_buf(),
            index,
            source,
        })?;
    debug!(%id, "generated id");
    Ok(Record::new(id, document, load_id))
}

fn has_json_extension(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == JSON_EXTENSION)
}

async fn count_entries(dir: &Path, mapping: &Mapping) -> Result<usize, LoadError> {
    let io_err = |source| LoadError::Io {
        mapping: mapping.label().to_string(),
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err)?;
    let mut count = 0;
    while entries.next_entry().await.map_err(io_err)?.is_some() {
        count += 1;
    }
    Ok(count)
}
