//! Core data models shared by the chatbot pipeline and the HTTP layer.
//!
//! These types describe a single conversational exchange and the reply
//! produced by the orchestrator. Knowledge-base records live in
//! [`crate::knowledge`], fertilizer schedules in [`crate::fertilizer`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One user message and the bot response it produced.
///
/// Turns are created once per exchange and appended to a session; they are
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub user_message: String,
    pub bot_response: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(user_message: impl Into<String>, bot_response: impl Into<String>) -> Self {
        Self {
            user_message: user_message.into(),
            bot_response: bot_response.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Result of [`ChatbotService::get_response`](crate::chatbot::ChatbotService::get_response).
///
/// `success` is always `true`: internal failures degrade to a fallback
/// answer with lower confidence instead of surfacing as errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    pub success: bool,
    pub user_message: String,
    pub bot_response: String,
    pub confidence: f64,
}

/// Confidence reported for answers produced by a generative backend.
pub const GENERATED_CONFIDENCE: f64 = 0.85;

/// Confidence reported for knowledge-base fallback answers.
pub const FALLBACK_CONFIDENCE: f64 = 0.7;

/// Which generative backend answers requests first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Remote,
    Local,
    None,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Remote => "remote",
            BackendKind::Local => "local",
            BackendKind::None => "none",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_deserializes_without_timestamp() {
        let turn: ConversationTurn =
            serde_json::from_str(r#"{"user_message":"hi","bot_response":"hello"}"#).unwrap();
        assert_eq!(turn.user_message, "hi");
        assert_eq!(turn.bot_response, "hello");
    }

    #[test]
    fn test_backend_kind_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(BackendKind::Remote).unwrap(),
            serde_json::json!("remote")
        );
        assert_eq!(BackendKind::None.as_str(), "none");
    }
}
