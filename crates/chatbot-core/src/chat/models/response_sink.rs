use std::sync::Arc;

use parking_lot::Mutex;

/// Accumulates the text of the assistant turn currently being generated.
///
/// Cloning yields another handle to the same buffer. The worker appends to it
/// while the presentation side only ever sees owned snapshots, so a snapshot
/// taken earlier is never affected by later appends.
#[derive(Clone, Default)]
pub struct ResponseSink {
    text: Arc<Mutex<String>>,
}

impl ResponseSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear accumulated text. Only the generating worker calls this, before
    /// its first append.
    pub fn reset(&self) {
        self.text.lock().clear();
    }

    /// Append one token. The whole delta lands under a single lock acquisition.
    pub fn append(&self, delta: &str) {
        self.text.lock().push_str(delta);
    }

    /// Copy of the text accumulated so far.
    pub fn snapshot(&self) -> String {
        self.text.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.text.lock().is_empty()
    }
}
