use std::fmt;

use chrono::{DateTime, Local};

/// Timestamp layout used for session ids, e.g. `2024-05-01_13-45-09`.
pub const SESSION_ID_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }

    pub fn is_user(self) -> bool {
        matches!(self, Role::User)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

/// A single chat conversation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    id: String,
    turns: Vec<Turn>,
}

impl Session {
    pub fn new(id: String) -> Self {
        Self {
            id,
            turns: Vec::new(),
        }
    }

    /// Mint a session whose id is derived from `created_at`.
    pub fn created_at(created_at: DateTime<Local>) -> Self {
        Self::new(created_at.format(SESSION_ID_FORMAT).to_string())
    }

    /// Restore a session from a persisted transcript
    pub fn from_transcript(id: String, transcript: &str) -> Self {
        Self {
            id,
            turns: parse_transcript(transcript),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn push_turn(&mut self, role: Role, text: impl Into<String>) {
        self.turns.push(Turn::new(role, text));
    }

    /// Render the transcript as persisted: one `"<Role>: <text>"` line per turn.
    pub fn transcript(&self) -> String {
        let mut out = String::new();
        for turn in &self.turns {
            out.push_str(turn.role.label());
            out.push_str(": ");
            out.push_str(&turn.text);
            out.push('\n');
        }
        out
    }
}

/// Parse a persisted transcript back into turns.
///
/// A line starting with a role prefix opens a new turn; any other line belongs
/// to the text of the previous turn (responses may span several lines). Lines
/// before the first role prefix are ignored.
///
/// The format has no escaping, so a response containing a line that itself
/// starts with `User: ` or `Assistant: ` comes back as more than one turn.
pub fn parse_transcript(transcript: &str) -> Vec<Turn> {
    let mut turns: Vec<Turn> = Vec::new();

    for line in transcript.lines() {
        if let Some(text) = line.strip_prefix("User: ") {
            turns.push(Turn::new(Role::User, text));
        } else if let Some(text) = line.strip_prefix("Assistant: ") {
            turns.push(Turn::new(Role::Assistant, text));
        } else if line == "User:" {
            turns.push(Turn::new(Role::User, ""));
        } else if line == "Assistant:" {
            turns.push(Turn::new(Role::Assistant, ""));
        } else if let Some(last) = turns.last_mut() {
            last.text.push('\n');
            last.text.push_str(line);
        }
    }

    turns
}
