use tokio::sync::mpsc;
use tracing::debug;

use crate::chat::services::GenerationOutcome;
use crate::chat::views::MessageHandle;

/// Identifies one generation so its finalize task can be matched against the
/// controller's state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GenerationId(pub u64);

/// Everything the worker hands back when a generation ends.
#[derive(Clone, Debug)]
pub struct FinishedGeneration {
    pub generation_id: GenerationId,
    pub session_id: String,
    pub target: MessageHandle,
    /// Final snapshot of the response sink.
    pub text: String,
    pub outcome: GenerationOutcome,
}

/// Unit of work executed on the presentation loop.
#[derive(Clone, Debug)]
pub enum DispatchTask {
    /// Show `text` in the message behind `handle`. Carries a full snapshot, not a delta.
    Render { handle: MessageHandle, text: String },
    /// The worker is done; complete the turn.
    Finalize(FinishedGeneration),
}

/// Sending half of the dispatch queue. Cheap to clone and `Send`, handed to workers.
#[derive(Clone)]
pub struct DispatchSender {
    tx: mpsc::UnboundedSender<DispatchTask>,
}

impl DispatchSender {
    pub fn render(&self, handle: MessageHandle, text: String) {
        self.send(DispatchTask::Render { handle, text });
    }

    pub fn finalize(&self, finished: FinishedGeneration) {
        self.send(DispatchTask::Finalize(finished));
    }

    fn send(&self, task: DispatchTask) {
        // The queue only closes once the presentation loop is gone; nothing is left to render.
        if self.tx.send(task).is_err() {
            debug!("Dispatch queue closed, dropping task");
        }
    }
}

/// Receiving half, owned by the presentation loop.
///
/// Tasks come out in the order they were enqueued; the single owner guarantees
/// they are never applied concurrently.
pub struct DispatchQueue {
    rx: mpsc::UnboundedReceiver<DispatchTask>,
}

impl DispatchQueue {
    pub fn channel() -> (DispatchSender, DispatchQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        (DispatchSender { tx }, DispatchQueue { rx })
    }

    /// Wait for the next task. Returns `None` once every sender is dropped.
    pub async fn next(&mut self) -> Option<DispatchTask> {
        self.rx.recv().await
    }

    /// Take the next task if one is already queued.
    pub fn try_next(&mut self) -> Option<DispatchTask> {
        self.rx.try_recv().ok()
    }
}
