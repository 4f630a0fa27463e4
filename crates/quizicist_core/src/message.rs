//! crates/quizicist_core/src/message.rs
//!
//! Free-form feedback a user sends to the quizicist maintainers.

use std::fmt;

use crate::ports::{ApiError, ApiResult};

pub const MAX_MESSAGE_CHARS: usize = 2500;

/// The category a message is filed under. The backend stores the integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageKind {
    #[default]
    Error,
    Suggestion,
    Other,
}

impl MessageKind {
    pub fn code(self) -> i64 {
        match self {
            MessageKind::Error => 0,
            MessageKind::Suggestion => 1,
            MessageKind::Other => 2,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MessageKind::Error => "error",
            MessageKind::Suggestion => "suggestion",
            MessageKind::Other => "other",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserMessage {
    pub kind: MessageKind,
    pub text: String,
}

impl UserMessage {
    pub fn new(kind: MessageKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    /// Rejects messages the backend form would refuse.
    pub fn validate(&self) -> ApiResult<()> {
        if self.text.trim().is_empty() {
            return Err(ApiError::invalid("Message is a required field"));
        }
        if self.text.chars().count() > MAX_MESSAGE_CHARS {
            return Err(ApiError::invalid(format!(
                "Message must be at most {} characters",
                MAX_MESSAGE_CHARS
            )));
        }
        Ok(())
    }
}
