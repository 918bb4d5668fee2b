use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use super::session::{Role, Session};
use crate::chat::repositories::{RepositoryResult, SessionRepository, TranscriptBackup};

/// Source of timestamps for new session ids
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Local>;
}

pub struct LocalClock;

impl Clock for LocalClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Sessions known to the application.
///
/// Holds the turns of every session touched during this process, the index of
/// persisted session ids (newest first) and the active session. Memory is the
/// source of truth; the repository receives a full rewrite after every
/// completed assistant turn.
pub struct SessionStore {
    sessions: HashMap<String, Session>,
    index: Vec<String>,
    active_id: Option<String>,
    repo: Arc<dyn SessionRepository>,
    backup: Arc<dyn TranscriptBackup>,
    clock: Box<dyn Clock>,
}

impl SessionStore {
    pub fn new(
        repo: Arc<dyn SessionRepository>,
        backup: Arc<dyn TranscriptBackup>,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            sessions: HashMap::new(),
            index: Vec::new(),
            active_id: None,
            repo,
            backup,
            clock,
        }
    }

    /// Rebuild the index by enumerating storage.
    pub async fn load_index(&mut self) -> RepositoryResult<()> {
        let mut ids = self.repo.list_ids().await?;
        // The id layout sorts chronologically as plain text
        ids.sort_by(|a, b| b.cmp(a));
        info!(count = ids.len(), "Loaded session index");
        self.index = ids;
        Ok(())
    }

    /// Mint a new session from the current time and write its empty record.
    ///
    /// Two sessions created within the same second share an id; the later one
    /// replaces the earlier.
    pub async fn create(&mut self) -> String {
        let session = Session::created_at(self.clock.now());
        let id = session.id().to_string();

        if self.sessions.insert(id.clone(), session).is_some() {
            debug!(session_id = %id, "Session id collision, replacing existing session");
        }
        self.index.retain(|existing| existing != &id);
        self.index.insert(0, id.clone());

        if let Err(e) = self.repo.save(&id, String::new()).await {
            warn!(error = ?e, session_id = %id, "Failed to create session record");
        }

        debug!(session_id = %id, "Created session");
        id
    }

    /// Session ids, newest first
    pub fn list(&self) -> &[String] {
        &self.index
    }

    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    /// Get a session, reading its record from storage if it is not in memory yet.
    pub async fn load(&mut self, id: &str) -> RepositoryResult<Option<&Session>> {
        if !self.sessions.contains_key(id) {
            let Some(transcript) = self.repo.load(id).await? else {
                return Ok(None);
            };
            let session = Session::from_transcript(id.to_string(), &transcript);
            debug!(session_id = %id, turns = session.turns().len(), "Loaded session from storage");
            self.sessions.insert(id.to_string(), session);
        }
        Ok(self.sessions.get(id))
    }

    /// Append a turn to a session.
    ///
    /// An assistant turn completes an exchange, so the whole transcript is
    /// rewritten to storage and mirrored to the backup. User turns stay in
    /// memory until then. Returns `false` if the session is unknown (e.g. it
    /// was deleted while its response was still generating).
    pub async fn append_turn(&mut self, id: &str, role: Role, text: &str) -> bool {
        let Some(session) = self.sessions.get_mut(id) else {
            warn!(session_id = %id, role = %role, "Dropping turn for unknown session");
            return false;
        };
        session.push_turn(role, text);

        if role == Role::Assistant {
            let transcript = session.transcript();
            self.persist(id, transcript).await;
        }
        true
    }

    /// Delete a session from memory, the index and storage. Deleting an
    /// unknown id succeeds.
    pub async fn delete(&mut self, id: &str) -> RepositoryResult<()> {
        self.sessions.remove(id);
        self.index.retain(|existing| existing != id);
        if self.active_id.as_deref() == Some(id) {
            self.active_id = None;
        }
        self.repo.delete(id).await?;
        info!(session_id = %id, "Deleted session");
        Ok(())
    }

    /// Set the active session. Returns `false` if the session is not loaded.
    pub fn set_active(&mut self, id: &str) -> bool {
        if self.sessions.contains_key(id) {
            self.active_id = Some(id.to_string());
            true
        } else {
            false
        }
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active_id.as_deref()
    }

    async fn persist(&self, id: &str, transcript: String) {
        if let Err(e) = self.repo.save(id, transcript.clone()).await {
            warn!(error = ?e, session_id = %id, "Failed to persist session");
        }

        let backup = self.backup.clone();
        let session_id = id.to_string();
        let stored = tokio::task::spawn_blocking(move || backup.store(&session_id, &transcript)).await;
        match stored {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, session_id = %id, "Transcript backup failed"),
            Err(e) => debug!(error = %e, session_id = %id, "Transcript backup task failed"),
        }
    }
}
