use std::collections::HashMap;
use std::io::Write;

use chatbot_core::{MessageHandle, Presenter};
use tracing::debug;

struct PrintedMessage {
    is_user: bool,
    printed: String,
}

/// Line-oriented presenter.
///
/// Only the newest message can grow on screen, so updates to older handles are
/// dropped. Streamed snapshots are printed as the delta past what is already
/// on the terminal.
pub struct TerminalPresenter<W: Write> {
    out: W,
    next_handle: u64,
    messages: HashMap<MessageHandle, PrintedMessage>,
    live: Option<MessageHandle>,
    line_open: bool,
    submit_enabled: bool,
    sessions: Vec<String>,
    active_session: Option<String>,
}

impl<W: Write> TerminalPresenter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            next_handle: 0,
            messages: HashMap::new(),
            live: None,
            line_open: false,
            submit_enabled: false,
            sessions: Vec::new(),
            active_session: None,
        }
    }

    pub fn submit_enabled(&self) -> bool {
        self.submit_enabled
    }

    /// Print an informational line outside the transcript.
    pub fn notice(&mut self, text: &str) {
        self.end_line();
        self.write(&format!("* {text}\n"));
    }

    /// Print the session list, marking the active one.
    pub fn print_sessions(&mut self) {
        self.end_line();
        if self.sessions.is_empty() {
            self.write("* no saved chats\n");
            return;
        }
        let listing: String = self
            .sessions
            .iter()
            .map(|id| {
                let marker = if Some(id) == self.active_session.as_ref() {
                    '*'
                } else {
                    ' '
                };
                format!("{marker} {id}\n")
            })
            .collect();
        self.write(&listing);
    }

    /// Ask for input. The user's Enter ends the line.
    pub fn prompt(&mut self) {
        self.end_line();
        self.write("> ");
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn end_line(&mut self) {
        if self.line_open {
            self.write("\n");
            self.line_open = false;
        }
    }

    fn write(&mut self, text: &str) {
        if let Err(e) = self.out.write_all(text.as_bytes()).and_then(|_| self.out.flush()) {
            debug!(error = %e, "Failed to write to terminal");
        }
    }
}

impl<W: Write> Presenter for TerminalPresenter<W> {
    fn begin_message(&mut self, is_user: bool) -> MessageHandle {
        self.next_handle += 1;
        let handle = MessageHandle(self.next_handle);
        self.messages.insert(
            handle,
            PrintedMessage {
                is_user,
                printed: String::new(),
            },
        );

        self.end_line();
        self.write(if is_user { "You: " } else { "Assistant: " });
        self.line_open = true;
        self.live = Some(handle);
        handle
    }

    fn update_message(&mut self, handle: MessageHandle, text: &str) {
        if self.live != Some(handle) {
            return;
        }
        let Some(message) = self.messages.get_mut(&handle) else {
            return;
        };

        let delta = match text.strip_prefix(message.printed.as_str()) {
            Some(delta) => delta.to_string(),
            None => {
                // Not an extension of what is shown; reprint in full
                let label = if message.is_user { "You: " } else { "Assistant: " };
                format!("\n{label}{text}")
            }
        };
        message.printed = text.to_string();

        if !delta.is_empty() {
            self.write(&delta);
        }
    }

    fn scroll_to_bottom(&mut self) {}

    fn clear_transcript(&mut self) {
        self.messages.clear();
        self.live = None;
        self.end_line();
        self.write("---\n");
    }

    fn set_submit_enabled(&mut self, enabled: bool) {
        self.submit_enabled = enabled;
    }

    fn show_sessions(&mut self, session_ids: &[String], active: Option<&str>) {
        self.sessions = session_ids.to_vec();
        self.active_session = active.map(str::to_string);
        if let Some(active) = active {
            self.notice(&format!("chat {active}"));
        }
    }
}
