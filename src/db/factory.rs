//! Run-scoped cache of sessions keyed by connection string.
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use tracing::{info, warn};

use super::session::Session;
use crate::error::SessionError;

/// Lazily opens one [`Session`] per distinct connection string and owns
/// every session it opened until [`ConnectionFactory::close`] or drop.
///
/// Get-or-create takes `&mut self`, so the cache cannot be raced while a
/// connection is being opened.
#[derive(Debug, Default)]
pub struct ConnectionFactory {
    sessions: HashMap<String, Session>,
}

impl ConnectionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the session for `connection`, opening it on first use.
    ///
    /// A failed open is not cached; the next call tries again.
    pub async fn get_session(&mut self, connection: &str) -> Result<&mut Session, SessionError> {
        match self.sessions.entry(connection.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let session = Session::connect(connection).await?;
                info!(
                    connection = session.connection(),
                    session_id = %session.session_id(),
                    "opened session"
                );
                Ok(entry.insert(session))
            }
        }
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Close every session. Failures are logged, not returned, so that one
    /// bad connection does not keep the others open.
    pub async fn close(self) {
        for (_, session) in self.sessions {
            let connection = session.connection().to_string();
            if let Err(e) = session.close().await {
                warn!(connection, error = %e, "failed to close session");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sqlite_url(dir: &TempDir, name: &str) -> String {
        format!("sqlite://{}?mode=rwc", dir.path().join(name).display())
    }

    #[tokio::test]
    async fn test_same_connection_string_reuses_session() {
        let dir = TempDir::new().unwrap();
        let url = sqlite_url(&dir, "a.db");
        let mut factory = ConnectionFactory::new();

        let first = factory.get_session(&url).await.unwrap().session_id();
        let second = factory.get_session(&url).await.unwrap().session_id();

        assert_eq!(first, second);
        assert_eq!(factory.len(), 1);
        factory.close().await;
    }

    #[tokio::test]
    async fn test_distinct_connection_strings_get_distinct_sessions() {
        let dir = TempDir::new().unwrap();
        let mut factory = ConnectionFactory::new();

        let a = factory
            .get_session(&sqlite_url(&dir, "a.db"))
            .await
            .unwrap()
            .session_id();
        let b = factory
            .get_session(&sqlite_url(&dir, "b.db"))
            .await
            .unwrap()
            .session_id();

        assert_ne!(a, b);
        assert_eq!(factory.len(), 2);
        factory.close().await;
    }

    #[tokio::test]
    async fn test_failed_connection_is_not_cached() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing").join("x.db");
        let url = format!("sqlite://{}", missing.display());
        let mut factory = ConnectionFactory::new();

        let err = factory.get_session(&url).await.unwrap_err();
        assert!(matches!(err, SessionError::Connection { .. }));
        assert!(factory.is_empty());

        let err = factory.get_session("redis://localhost").await.unwrap_err();
        assert!(matches!(err, SessionError::UnsupportedConnection(_)));
        assert!(factory.is_empty());

        // once the database file exists the same string connects
        std::fs::create_dir_all(missing.parent().unwrap()).unwrap();
        std::fs::File::create(&missing).unwrap();
        factory.get_session(&url).await.unwrap();
        assert_eq!(factory.len(), 1);
        factory.close().await;
    }
}
