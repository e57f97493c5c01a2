use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::Config;
use crate::evaluation::client::EvaluationClient;
use crate::gateway::PipelineGateway;
use crate::pipeline::RoundSession;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Recruiting API behind the round views. Trait object so tests swap in a mock.
    pub gateway: Arc<dyn PipelineGateway>,
    /// Opaque AI evaluation service.
    pub evaluator: Arc<dyn EvaluationClient>,
    pub sessions: SessionRegistry,
    pub config: Config,
}

/// One `RoundSession` per open round-detail view. Sessions never share a
/// ledger: each holds its own coordinator state for exactly one job opening.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<Uuid, Arc<RoundSession>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: RoundSession) -> Uuid {
        let id = Uuid::new_v4();
        self.inner.write().await.insert(id, Arc::new(session));
        id
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<RoundSession>> {
        self.inner.read().await.get(&id).cloned()
    }

    pub async fn remove(&self, id: Uuid) -> bool {
        self.inner.write().await.remove(&id).is_some()
    }
}
