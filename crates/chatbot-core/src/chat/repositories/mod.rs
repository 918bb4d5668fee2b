pub mod error;
pub mod in_memory_repository;
pub mod session_file_repository;
pub mod session_repository;
pub mod transcript_backup;

pub use error::{RepositoryError, RepositoryResult};
pub use in_memory_repository::InMemorySessionRepository;
pub use session_file_repository::SessionFileRepository;
pub use session_repository::{BoxFuture, SessionRepository};
pub use transcript_backup::{BackupError, KeyringTranscriptBackup, MemoryBackup, TranscriptBackup};
