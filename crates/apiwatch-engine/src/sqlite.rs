//! SQLite document repository.
//!
//! Each endpoint is stored as one JSON document keyed by id, with the kind
//! duplicated into an indexed column for `find_by_kind`.

use std::path::Path;

use async_trait::async_trait;
use rusqlite::{OptionalExtension, params};
use tokio_rusqlite::Connection;
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::model::{EndpointKind, MonitoredEndpoint};
use crate::repository::EndpointRepository;

fn init_schema(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS endpoints (
             id TEXT PRIMARY KEY,
             kind TEXT NOT NULL,
             document TEXT NOT NULL,
             created_at TEXT NOT NULL,
             updated_at TEXT NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_endpoints_kind ON endpoints(kind);",
    )
}

/// SQLite-backed [`EndpointRepository`].
pub struct SqliteEndpointRepository {
    conn: Connection,
}

impl SqliteEndpointRepository {
    /// Create a new in-memory database.
    pub async fn in_memory() -> Result<Self, EngineError> {
        let conn = Connection::open_in_memory().await?;
        conn.call(|conn| Ok(init_schema(conn)?)).await?;
        Ok(Self { conn })
    }

    /// Open or create a file-backed database.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| EngineError::Repository(format!("{}: {}", parent.display(), e)))?;
            }
        }
        debug!(path = %path.display(), "Opening endpoint store");
        let conn = Connection::open(path).await?;
        conn.call(|conn| Ok(init_schema(conn)?)).await?;
        Ok(Self { conn })
    }

    /// Load documents, optionally of one kind. Rows that no longer decode
    /// are logged and skipped so the rest can still be evaluated.
    async fn query_documents(&self, kind: Option<EndpointKind>) -> Result<Vec<MonitoredEndpoint>, EngineError> {
        let kind = kind.map(|k| k.as_str().to_string());
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, document FROM endpoints
                     WHERE ?1 IS NULL OR kind = ?1
                     ORDER BY created_at, id",
                )?;
                let rows = stmt
                    .query_map(params![kind], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(id, doc)| match serde_json::from_str(&doc) {
                Ok(endpoint) => Some(endpoint),
                Err(e) => {
                    warn!(id = %id, "Skipping undecodable endpoint document: {}", e);
                    None
                }
            })
            .collect())
    }
}

#[async_trait]
impl EndpointRepository for SqliteEndpointRepository {
    async fn find_all(&self) -> Result<Vec<MonitoredEndpoint>, EngineError> {
        self.query_documents(None).await
    }

    async fn find_by_kind(&self, kind: EndpointKind) -> Result<Vec<MonitoredEndpoint>, EngineError> {
        self.query_documents(Some(kind)).await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<MonitoredEndpoint>, EngineError> {
        let id = id.to_string();
        let document = self
            .conn
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT document FROM endpoints WHERE id = ?1",
                        [&id],
                        |row| row.get::<_, String>(0),
                    )
                    .optional()?)
            })
            .await?;

        document
            .map(|doc| serde_json::from_str(&doc).map_err(EngineError::from))
            .transpose()
    }

    async fn save(&self, endpoint: &MonitoredEndpoint) -> Result<(), EngineError> {
        let document = serde_json::to_string(endpoint)?;
        let id = endpoint.id.clone();
        let kind = endpoint.kind.as_str();
        let created_at = endpoint.created_at.to_rfc3339();
        let updated_at = endpoint.updated_at.to_rfc3339();

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO endpoints (id, kind, document, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(id) DO UPDATE SET
                         kind = excluded.kind,
                         document = excluded.document,
                         updated_at = excluded.updated_at",
                    params![id, kind, document, created_at, updated_at],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EndpointStatus;
    use num_bigint::BigUint;
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_and_find() {
        let repo = SqliteEndpointRepository::in_memory().await.unwrap();
        let idx = MonitoredEndpoint::new("Idx", "https://idx.example.com", EndpointKind::RpcChain)
            .with_rpc_address("https://rpc.example.com");
        let cdn = MonitoredEndpoint::new("Cdn", "https://cdn.example.com", EndpointKind::Cloudflare);
        repo.save(&idx).await.unwrap();
        repo.save(&cdn).await.unwrap();

        assert_eq!(repo.find_all().await.unwrap().len(), 2);
        assert_eq!(repo.find_by_kind(EndpointKind::RpcChain).await.unwrap(), vec![idx.clone()]);
        assert!(repo.find_by_kind(EndpointKind::TokenBalance).await.unwrap().is_empty());
        assert_eq!(repo.find_by_id(&cdn.id).await.unwrap(), Some(cdn));
        assert!(repo.find_by_id("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_replaces_document() {
        let repo = SqliteEndpointRepository::in_memory().await.unwrap();
        let mut wallet = MonitoredEndpoint::new("W", "https://api.example.com", EndpointKind::TokenBalance);
        repo.save(&wallet).await.unwrap();

        wallet.status = EndpointStatus::Inactive;
        wallet.downtime_count = 3;
        wallet.is_alert_sent_for_1m = true;
        let big = BigUint::from(123_456_789u64) * BigUint::from(10u32).pow(12);
        wallet.token_balance = crate::ladder::whole_tokens(&big, 6);
        repo.save(&wallet).await.unwrap();

        let stored = repo.find_by_id(&wallet.id).await.unwrap().unwrap();
        assert_eq!(stored.status, EndpointStatus::Inactive);
        assert_eq!(stored.downtime_count, 3);
        assert!(stored.is_alert_sent_for_1m);
        assert_eq!(stored.token_balance, Some(Decimal::new(123_456_789, 6)));
        assert_eq!(repo.find_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_document_is_skipped() {
        let repo = SqliteEndpointRepository::in_memory().await.unwrap();
        let svc = MonitoredEndpoint::new("svc", "https://svc.example.com", EndpointKind::Http);
        repo.save(&svc).await.unwrap();
        repo.conn
            .call(|conn| {
                conn.execute(
                    "INSERT INTO endpoints (id, kind, document, created_at, updated_at)
                     VALUES ('legacy', 'http', ?1, '2020-01-01T00:00:00Z', '2020-01-01T00:00:00Z')",
                    [r#"{"id":"legacy","name":"old","link":"ftp://old","kind":"ftp"}"#],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(repo.find_all().await.unwrap(), vec![svc.clone()]);
        assert_eq!(repo.find_by_kind(EndpointKind::Http).await.unwrap(), vec![svc]);
        assert!(repo.find_by_id("legacy").await.is_err());
    }

    #[tokio::test]
    async fn test_file_database_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("apiwatch.db");
        let endpoint = MonitoredEndpoint::new("svc", "https://svc.example.com", EndpointKind::Http);

        {
            let repo = SqliteEndpointRepository::open(&path).await.unwrap();
            repo.save(&endpoint).await.unwrap();
        }

        let reopened = SqliteEndpointRepository::open(&path).await.unwrap();
        assert_eq!(reopened.find_all().await.unwrap(), vec![endpoint]);
    }
}
