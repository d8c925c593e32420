//! Endpoint storage.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::EngineError;
use crate::model::{EndpointKind, MonitoredEndpoint};

/// Document store of monitored endpoints.
///
/// Only single-document atomicity is expected; concurrent writers to the
/// same record resolve as last write wins.
#[async_trait]
pub trait EndpointRepository: Send + Sync {
    async fn find_all(&self) -> Result<Vec<MonitoredEndpoint>, EngineError>;

    async fn find_by_kind(&self, kind: EndpointKind) -> Result<Vec<MonitoredEndpoint>, EngineError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<MonitoredEndpoint>, EngineError>;

    /// Insert or replace by id.
    async fn save(&self, endpoint: &MonitoredEndpoint) -> Result<(), EngineError>;
}

/// In-memory repository for tests and dry runs.
pub struct MemoryEndpointRepository {
    endpoints: RwLock<HashMap<String, MonitoredEndpoint>>,
}

impl MemoryEndpointRepository {
    pub fn new() -> Self {
        Self {
            endpoints: RwLock::new(HashMap::new()),
        }
    }

    /// Create a repository holding `endpoints`.
    pub fn with_endpoints(endpoints: impl IntoIterator<Item = MonitoredEndpoint>) -> Self {
        Self {
            endpoints: RwLock::new(endpoints.into_iter().map(|e| (e.id.clone(), e)).collect()),
        }
    }
}

impl Default for MemoryEndpointRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EndpointRepository for MemoryEndpointRepository {
    async fn find_all(&self) -> Result<Vec<MonitoredEndpoint>, EngineError> {
        let store = self.endpoints.read().await;
        let mut endpoints: Vec<_> = store.values().cloned().collect();
        endpoints.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(endpoints)
    }

    async fn find_by_kind(&self, kind: EndpointKind) -> Result<Vec<MonitoredEndpoint>, EngineError> {
        Ok(self
            .find_all()
            .await?
            .into_iter()
            .filter(|e| e.kind == kind)
            .collect())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<MonitoredEndpoint>, EngineError> {
        Ok(self.endpoints.read().await.get(id).cloned())
    }

    async fn save(&self, endpoint: &MonitoredEndpoint) -> Result<(), EngineError> {
        self.endpoints
            .write()
            .await
            .insert(endpoint.id.clone(), endpoint.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_repository() {
        let http = MonitoredEndpoint::new("svc", "https://svc.example.com", EndpointKind::Http);
        let cdn = MonitoredEndpoint::new("cdn", "https://cdn.example.com", EndpointKind::Cloudflare);
        let repo = MemoryEndpointRepository::with_endpoints([http.clone(), cdn.clone()]);

        assert_eq!(repo.find_all().await.unwrap().len(), 2);
        let only_cdn = repo.find_by_kind(EndpointKind::Cloudflare).await.unwrap();
        assert_eq!(only_cdn, vec![cdn.clone()]);

        let mut updated = http.clone();
        updated.downtime_count = 4;
        repo.save(&updated).await.unwrap();
        assert_eq!(repo.find_by_id(&http.id).await.unwrap().unwrap().downtime_count, 4);
        assert!(repo.find_by_id("missing").await.unwrap().is_none());
    }
}
