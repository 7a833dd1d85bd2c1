//! A single live connection to a destination store.
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgConnectOptions, PgConnection};
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection as _};
use std::str::FromStr;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::config::{CONNECT_TIMEOUT, QUERY_TIMEOUT};
use crate::error::SessionError;

/// A value bound to one column of an insert
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Text(String),
    Timestamp(DateTime<Utc>),
}

/// Structured insert: target table plus ordered column/value pairs.
///
/// Values are always sent as bound parameters, never spliced into SQL text.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertSpec {
    pub table: String,
    pub columns: Vec<(String, ColumnValue)>,
}

/// Store flavor selected from the connection string scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Postgres,
    Sqlite,
}

impl Backend {
    pub fn from_connection_string(connection: &str) -> Option<Self> {
        let lower = connection.trim_start().to_ascii_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Backend::Postgres)
        } else if lower.starts_with("sqlite:") {
            Some(Backend::Sqlite)
        } else {
            None
        }
    }

    fn placeholder(self, position: usize) -> String {
        match self {
            Backend::Postgres => format!("${}", position),
            Backend::Sqlite => "?".to_string(),
        }
    }
}

enum DbConnection {
    Postgres(PgConnection),
    Sqlite(SqliteConnection),
}

/// Owns one connection for the lifetime of a run
pub struct Session {
    session_id: Uuid,
    connection: String,
    backend: Backend,
    conn: DbConnection,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &self.session_id)
            .field("connection", &self.connection)
            .field("backend", &self.backend)
            .finish()
    }
}

impl Session {
    /// Open a connection for the given connection string
    pub async fn connect(connection: &str) -> Result<Self, SessionError> {
        let redacted = redact_connection_string(connection);
        let backend = Backend::from_connection_string(connection)
            .ok_or_else(|| SessionError::UnsupportedConnection(redacted.clone()))?;

        let conn = match backend {
            Backend::Postgres => {
                let options = PgConnectOptions::from_str(connection).map_err(|source| {
                    SessionError::Connection {
                        connection: redacted.clone(),
                        source,
                    }
                })?;
                DbConnection::Postgres(connect_with_timeout(&options, &redacted).await?)
            }
            Backend::Sqlite => {
                let options = SqliteConnectOptions::from_str(connection).map_err(|source| {
                    SessionError::Connection {
                        connection: redacted.clone(),
                        source,
                    }
                })?;
                DbConnection::Sqlite(connect_with_timeout(&options, &redacted).await?)
            }
        };

        Ok(Self {
            session_id: Uuid::new_v4(),
            connection: redacted,
            backend,
            conn,
        })
    }

    /// Identity of this session, stable for its lifetime
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Connection string with any password masked
    pub fn connection(&self) -> &str {
        &self.connection
    }

    /// Execute one insert as a single auto-committed statement
    pub async fn execute(&mut self, spec: &InsertSpec) -> Result<(), SessionError> {
        let sql = render_insert(self.backend, spec)?;
        debug!(table = %spec.table, %sql, "executing insert");

        let result = match &mut self.conn {
            DbConnection::Postgres(conn) => {
                let query = bind_pg(sqlx::query(&sql), &spec.columns);
                tokio::time::timeout(QUERY_TIMEOUT, query.execute(conn))
                    .await
                    .map(|r| r.map(|_| ()))
            }
            DbConnection::Sqlite(conn) => {
                let query = bind_sqlite(sqlx::query(&sql), &spec.columns);
                tokio::time::timeout(QUERY_TIMEOUT, query.execute(conn))
                    .await
                    .map(|r| r.map(|_| ()))
            }
        };

        result
            .map_err(|_| query_timeout())?
            .map_err(SessionError::Query)
    }

    /// Execute all inserts inside one transaction.
    ///
    /// Nothing is committed unless every insert succeeds; a failing insert is
    /// reported through [`SessionError::QueryAt`] with its position in `specs`.
    pub async fn execute_all(&mut self, specs: &[InsertSpec]) -> Result<(), SessionError> {
        let statements = specs
            .iter()
            .map(|spec| render_insert(self.backend, spec))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(statements = statements.len(), "executing insert batch");

        tokio::time::timeout(QUERY_TIMEOUT, run_batch(&mut self.conn, &statements, specs))
            .await
            .map_err(|_| query_timeout())?
    }

    /// Close the connection gracefully
    pub async fn close(self) -> Result<(), SessionError> {
        match self.conn {
            DbConnection::Postgres(conn) => conn.close().await,
            DbConnection::Sqlite(conn) => conn.close().await,
        }
        .map_err(SessionError::Query)
    }
}

async fn connect_with_timeout<O: ConnectOptions>(
    options: &O,
    redacted: &str,
) -> Result<O::Connection, SessionError>
where
    O::Connection: Sized,
{
    tokio::time::timeout(CONNECT_TIMEOUT, options.connect())
        .await
        // Surface timeouts the same way a refused connection is surfaced
        .map_err(|_| sqlx::Error::PoolTimedOut)
        .and_then(|result| result)
        .map_err(|source| SessionError::Connection {
            connection: redacted.to_string(),
            source,
        })
}

async fn run_batch(
    conn: &mut DbConnection,
    statements: &[String],
    specs: &[InsertSpec],
) -> Result<(), SessionError> {
    match conn {
        DbConnection::Postgres(conn) => {
            let mut tx = conn.begin().await.map_err(SessionError::Query)?;
            for (index, (sql, spec)) in statements.iter().zip(specs).enumerate() {
                bind_pg(sqlx::query(sql), &spec.columns)
                    .execute(&mut *tx)
                    .await
                    .map_err(|source| SessionError::QueryAt { index, source })?;
            }
            tx.commit().await.map_err(SessionError::Query)
        }
        DbConnection::Sqlite(conn) => {
            let mut tx = conn.begin().await.map_err(SessionError::Query)?;
            for (index, (sql, spec)) in statements.iter().zip(specs).enumerate() {
                bind_sqlite(sqlx::query(sql), &spec.columns)
                    .execute(&mut *tx)
                    .await
                    .map_err(|source| SessionError::QueryAt { index, source })?;
            }
            tx.commit().await.map_err(SessionError::Query)
        }
    }
}

fn query_timeout() -> SessionError {
    SessionError::Timeout {
        operation: "Query",
        secs: QUERY_TIMEOUT.as_secs(),
    }
}

fn bind_pg<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Postgres, PgArguments>,
    columns: &'q [(String, ColumnValue)],
) -> sqlx::query::Query<'q, sqlx::Postgres, PgArguments> {
    for (_, value) in columns {
        query = match value {
            ColumnValue::Text(text) => query.bind(text.as_str()),
            ColumnValue::Timestamp(ts) => query.bind(*ts),
        };
    }
    query
}

fn bind_sqlite<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>>,
    columns: &'q [(String, ColumnValue)],
) -> sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>> {
    for (_, value) in columns {
        query = match value {
            ColumnValue::Text(text) => query.bind(text.as_str()),
            ColumnValue::Timestamp(ts) => query.bind(*ts),
        };
    }
    query
}

/// Render `INSERT INTO "table" ("c1", ...) VALUES (<placeholders>)`
pub(crate) fn render_insert(backend: Backend, spec: &InsertSpec) -> Result<String, SessionError> {
    if spec.columns.is_empty() {
        return Err(SessionError::InvalidIdentifier(format!(
            "{} (insert has no columns)",
            spec.table
        )));
    }

    let table = quote_table_name(&spec.table)?;
    let columns = spec
        .columns
        .iter()
        .map(|(name, _)| quote_identifier(name))
        .collect::<Result<Vec<_>, _>>()?;
    let placeholders: Vec<String> = (1..=columns.len())
        .map(|position| backend.placeholder(position))
        .collect();

    Ok(format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        placeholders.join(", ")
    ))
}

/// Quote a possibly schema-qualified table name (`schema.table`)
fn quote_table_name(table: &str) -> Result<String, SessionError> {
    let parts = table
        .split('.')
        .map(quote_identifier)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(parts.join("."))
}

fn quote_identifier(name: &str) -> Result<String, SessionError> {
    if name.is_empty() || name.contains('\0') {
        return Err(SessionError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Mask the password of a URL-style connection string
pub fn redact_connection_string(connection: &str) -> String {
    match Url::parse(connection) {
        Ok(mut url) if url.password().is_some() => {
            if url.set_password(Some("****")).is_ok() {
                url.to_string()
            } else {
                "<redacted>".to_string()
            }
        }
        _ => connection.to_string(),
    }
}
