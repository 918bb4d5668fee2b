use std::path::{Path, PathBuf};

use super::error::{RepositoryError, RepositoryResult};
use super::session_repository::{BoxFuture, SessionRepository};

const RECORD_EXTENSION: &str = "txt";

/// Plain-text repository for sessions.
/// Stores each session as `<id>.txt` in ~/.config/chatbots/chats/
pub struct SessionFileRepository {
    chats_dir: PathBuf,
}

impl SessionFileRepository {
    pub fn new() -> RepositoryResult<Self> {
        let chats_dir = dirs::config_dir()
            .ok_or_else(|| RepositoryError::InitializationError {
                message: "Could not determine config directory".to_string(),
            })?
            .join("chatbots")
            .join("chats");

        Ok(Self { chats_dir })
    }

    pub fn with_dir(chats_dir: impl Into<PathBuf>) -> Self {
        Self {
            chats_dir: chats_dir.into(),
        }
    }

    pub fn chats_dir(&self) -> &Path {
        &self.chats_dir
    }

    fn record_path(&self, id: &str) -> RepositoryResult<PathBuf> {
        // Ids become file names; anything that could escape the directory is rejected.
        if id.is_empty()
            || id.starts_with('.')
            || id.contains(['/', '\\'])
            || id.contains("..")
        {
            return Err(RepositoryError::InvalidId { id: id.to_string() });
        }
        Ok(self
            .chats_dir
            .join(format!("{}.{}", id, RECORD_EXTENSION)))
    }
}

impl SessionRepository for SessionFileRepository {
    fn list_ids(&self) -> BoxFuture<'static, RepositoryResult<Vec<String>>> {
        let chats_dir = self.chats_dir.clone();

        Box::pin(async move {
            tokio::task::spawn_blocking(move || -> RepositoryResult<Vec<String>> {
                std::fs::create_dir_all(&chats_dir)?;

                let mut ids = Vec::new();
                for entry in std::fs::read_dir(&chats_dir)? {
                    let path = entry?.path();
                    if path.extension().and_then(|s| s.to_str()) != Some(RECORD_EXTENSION) {
                        continue;
                    }
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str())
                        && !stem.starts_with('.')
                    {
                        ids.push(stem.to_string());
                    }
                }

                Ok(ids)
            })
            .await?
        })
    }

    fn load(&self, id: &str) -> BoxFuture<'static, RepositoryResult<Option<String>>> {
        let path = self.record_path(id);

        Box::pin(async move {
            let path = path?;
            tokio::task::spawn_blocking(move || -> RepositoryResult<Option<String>> {
                match std::fs::read_to_string(&path) {
                    Ok(content) => Ok(Some(content)),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await?
        })
    }

    fn save(&self, id: &str, transcript: String) -> BoxFuture<'static, RepositoryResult<()>> {
        let path = self.record_path(id);
        let chats_dir = self.chats_dir.clone();

        Box::pin(async move {
            let path = path?;
            tokio::task::spawn_blocking(move || -> RepositoryResult<()> {
                std::fs::create_dir_all(&chats_dir)?;

                // Write to file atomically (write to temp, then rename)
                let temp_path = path.with_extension(format!("{}.tmp", RECORD_EXTENSION));
                std::fs::write(&temp_path, transcript)?;
                std::fs::rename(&temp_path, &path)?;

                Ok(())
            })
            .await?
        })
    }

    fn delete(&self, id: &str) -> BoxFuture<'static, RepositoryResult<()>> {
        let path = self.record_path(id);

        Box::pin(async move {
            // An id that cannot name a record has nothing to delete
            let path = match path {
                Ok(path) => path,
                Err(RepositoryError::InvalidId { .. }) => return Ok(()),
                Err(e) => return Err(e),
            };
            tokio::task::spawn_blocking(move || -> RepositoryResult<()> {
                match std::fs::remove_file(&path) {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                    Err(e) => Err(e.into()),
                }
            })
            .await?
        })
    }
}
