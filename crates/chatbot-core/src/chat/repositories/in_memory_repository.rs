use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::error::RepositoryResult;
use super::session_repository::{BoxFuture, SessionRepository};

/// In-memory repository for sessions
/// Useful for testing and for running without a writable config directory
#[derive(Clone, Default)]
pub struct InMemorySessionRepository {
    records: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current content of a record, bypassing the async interface
    pub fn record(&self, id: &str) -> Option<String> {
        self.records.lock().get(id).cloned()
    }
}

impl SessionRepository for InMemorySessionRepository {
    fn list_ids(&self) -> BoxFuture<'static, RepositoryResult<Vec<String>>> {
        let records = self.records.clone();

        Box::pin(async move { Ok(records.lock().keys().cloned().collect()) })
    }

    fn load(&self, id: &str) -> BoxFuture<'static, RepositoryResult<Option<String>>> {
        let records = self.records.clone();
        let id = id.to_string();

        Box::pin(async move { Ok(records.lock().get(&id).cloned()) })
    }

    fn save(&self, id: &str, transcript: String) -> BoxFuture<'static, RepositoryResult<()>> {
        let records = self.records.clone();
        let id = id.to_string();

        Box::pin(async move {
            records.lock().insert(id, transcript);
            Ok(())
        })
    }

    fn delete(&self, id: &str) -> BoxFuture<'static, RepositoryResult<()>> {
        let records = self.records.clone();
        let id = id.to_string();

        Box::pin(async move {
            records.lock().remove(&id);
            Ok(())
        })
    }
}
