use std::future::Future;
use std::pin::Pin;

use super::error::RepositoryResult;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Repository trait for session transcripts.
///
/// A record is the full transcript text of one session. Records are always
/// replaced whole; there is no append path.
pub trait SessionRepository: Send + Sync + 'static {
    /// Enumerate the ids of all persisted sessions (unordered)
    fn list_ids(&self) -> BoxFuture<'static, RepositoryResult<Vec<String>>>;

    /// Load the transcript of one session, `None` if it has no record
    fn load(&self, id: &str) -> BoxFuture<'static, RepositoryResult<Option<String>>>;

    /// Replace the record of a session with `transcript`
    fn save(&self, id: &str, transcript: String) -> BoxFuture<'static, RepositoryResult<()>>;

    /// Delete a session record. Deleting a missing record succeeds.
    fn delete(&self, id: &str) -> BoxFuture<'static, RepositoryResult<()>>;
}
