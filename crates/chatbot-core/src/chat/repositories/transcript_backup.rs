use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

/// Keyring service under which transcripts are filed, one entry per session id.
pub const KEYRING_SERVICE: &str = "com.example.Chatbot.Chat";

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

/// Write-only secondary copy of session transcripts.
///
/// Nothing in the application reads these entries back. Callers ignore
/// failures; the primary record is the session repository.
pub trait TranscriptBackup: Send + Sync + 'static {
    fn store(&self, session_id: &str, transcript: &str) -> Result<(), BackupError>;
}

/// Stores transcripts in the platform credential store.
pub struct KeyringTranscriptBackup {
    service: String,
}

impl KeyringTranscriptBackup {
    pub fn new() -> Self {
        Self {
            service: KEYRING_SERVICE.to_string(),
        }
    }
}

impl Default for KeyringTranscriptBackup {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscriptBackup for KeyringTranscriptBackup {
    fn store(&self, session_id: &str, transcript: &str) -> Result<(), BackupError> {
        let entry = keyring::Entry::new(&self.service, session_id)?;
        entry.set_password(transcript)?;
        Ok(())
    }
}

/// Backup that remembers the last transcript per session, for inspection.
#[derive(Clone, Default)]
pub struct MemoryBackup {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryBackup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&self, session_id: &str) -> Option<String> {
        self.entries.lock().get(session_id).cloned()
    }
}

impl TranscriptBackup for MemoryBackup {
    fn store(&self, session_id: &str, transcript: &str) -> Result<(), BackupError> {
        self.entries
            .lock()
            .insert(session_id.to_string(), transcript.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_backup_keeps_latest_transcript() {
        let backup = MemoryBackup::new();
        backup.store("s1", "User: a\n").unwrap();
        backup.store("s1", "User: a\nAssistant: b\n").unwrap();

        assert_eq!(backup.entry("s1").as_deref(), Some("User: a\nAssistant: b\n"));
        assert!(backup.entry("s2").is_none());
    }
}
