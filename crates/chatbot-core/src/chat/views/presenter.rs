/// Opaque reference to one on-screen message (a user or assistant bubble).
///
/// Handles stay meaningful until the transcript they belong to is cleared.
/// After that the presenter must treat them as unknown and ignore updates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageHandle(pub u64);

/// The presentation boundary.
///
/// All methods are called from the single presentation loop. The controller
/// and the workers never touch layout or styling; they only go through here.
pub trait Presenter {
    /// Append a new, empty message to the transcript.
    fn begin_message(&mut self, is_user: bool) -> MessageHandle;

    /// Replace the full text of a message. Unknown or stale handles are ignored.
    fn update_message(&mut self, handle: MessageHandle, text: &str);

    /// Keep the newest message in view. Idempotent; a no-op without a transcript view.
    fn scroll_to_bottom(&mut self);

    /// Remove every message. Handles issued so far become stale.
    fn clear_transcript(&mut self);

    /// Enable or disable the submit control.
    fn set_submit_enabled(&mut self, enabled: bool);

    /// Refresh the session list (sidebar), newest first.
    fn show_sessions(&mut self, session_ids: &[String], active: Option<&str>);
}
