//! Generative backend abstraction and prompt construction.
//!
//! Two backend shapes are supported:
//!
//! - **[`ChatBackend`]**: a chat-completions API that takes role-tagged
//!   messages ([`remote::RemoteChatBackend`], OpenAI-compatible).
//! - **[`TextGenerator`]**: a text-generation model that takes a single
//!   concatenated prompt and returns decoded text
//!   ([`local::LocalModelBackend`], Hugging Face text-generation format).
//!
//! This module also owns the pure prompt builders used by both shapes and
//! the cleanup/acceptance rules applied to local-model output. Only the
//! last [`HISTORY_WINDOW`] conversation turns ever reach a prompt.

pub mod local;
pub mod remote;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::models::ConversationTurn;

/// Number of most recent turns included as generation context.
pub const HISTORY_WINDOW: usize = 5;

/// Longest local-model answer kept before truncation.
pub const MAX_LOCAL_RESPONSE_CHARS: usize = 500;

/// Local-model answers shorter than this are rejected.
pub const MIN_LOCAL_RESPONSE_CHARS: usize = 10;

pub const SYSTEM_INSTRUCTION: &str = "You are an expert agricultural assistant helping farmers with crop management, disease control, irrigation, fertilization, and farming best practices. Provide practical, actionable advice based on the agriculture knowledge provided.";

const LOCAL_GENERIC_PREAMBLE: &str =
    "You are a helpful agricultural assistant. Provide practical farming advice.";

/// Failure of a single generation attempt. Never surfaced to API callers;
/// the strategy selector logs it and moves on.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("{backend} request failed: {source}")]
    Request {
        backend: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{backend} API error {status}: {body}")]
    Status {
        backend: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("invalid {backend} response: {reason}")]
    Malformed {
        backend: &'static str,
        reason: String,
    },
    #[error("generated text rejected: {0}")]
    Rejected(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Decoding settings sent with every local-model request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodingParams {
    pub max_new_tokens: u32,
    pub num_beams: u32,
    pub no_repeat_ngram_size: u32,
    pub top_p: f32,
    pub temperature: f32,
    pub do_sample: bool,
}

impl Default for DecodingParams {
    fn default() -> Self {
        Self {
            max_new_tokens: 100,
            num_beams: 5,
            no_repeat_ngram_size: 3,
            top_p: 0.9,
            temperature: 0.8,
            do_sample: true,
        }
    }
}

/// A chat-completions style backend.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Model identifier reported by the health surface.
    fn model_name(&self) -> &str;

    /// Returns the completion text for `messages`.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, GenerationError>;
}

/// A single-prompt text-generation backend.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn model_name(&self) -> &str;

    /// Returns the decoded output for `prompt`. The output may or may not
    /// repeat the prompt; [`clean_local_response`] handles both.
    async fn generate(
        &self,
        prompt: &str,
        params: &DecodingParams,
    ) -> Result<String, GenerationError>;
}

/// The last [`HISTORY_WINDOW`] turns of `history`, oldest first.
pub fn recent_turns(history: &[ConversationTurn]) -> &[ConversationTurn] {
    &history[history.len().saturating_sub(HISTORY_WINDOW)..]
}

/// Message list for a chat backend: system instruction, optional context
/// system message, recent turns as user/assistant pairs, current message.
pub fn build_chat_messages(
    message: &str,
    history: &[ConversationTurn],
    context: &str,
) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::new(ChatRole::System, SYSTEM_INSTRUCTION)];

    if !context.is_empty() {
        messages.push(ChatMessage::new(
            ChatRole::System,
            format!(
                "Relevant agriculture information:\n{}\n\nUse this information to provide accurate, helpful responses.",
                context
            ),
        ));
    }

    for turn in recent_turns(history) {
        messages.push(ChatMessage::new(ChatRole::User, turn.user_message.clone()));
        messages.push(ChatMessage::new(
            ChatRole::Assistant,
            turn.bot_response.clone(),
        ));
    }

    messages.push(ChatMessage::new(ChatRole::User, message));
    messages
}

/// Single prompt string for a text-generation model, ending in a `Bot:` cue.
pub fn build_local_prompt(message: &str, history: &[ConversationTurn], context: &str) -> String {
    let preamble = if context.is_empty() {
        LOCAL_GENERIC_PREAMBLE.to_string()
    } else {
        format!(
            "You are an expert agricultural assistant. Use the following agriculture knowledge to answer accurately:\n\n{}\n\nBased on this information, provide helpful, practical advice to the farmer.",
            context
        )
    };

    let mut conversation = String::new();
    for turn in recent_turns(history) {
        conversation.push_str(&format!("User: {}\n", turn.user_message));
        conversation.push_str(&format!("Bot: {}\n", turn.bot_response));
    }

    format!("{}\n\n{}User: {}\nBot:", preamble, conversation, message)
}

/// Extracts the answer from raw local-model output and applies the
/// acceptance rules.
///
/// The answer is the text after the last `Bot:` marker (or the output with
/// the prompt removed when no marker is present), with stray `User:` and
/// `Bot:` labels dropped. If it still echoes the user's message, only the
/// part after the echo is kept. Answers that are empty, shorter than
/// [`MIN_LOCAL_RESPONSE_CHARS`] or equal to the message (ignoring case) are
/// rejected; long answers are cut to [`MAX_LOCAL_RESPONSE_CHARS`] plus `...`.
pub fn clean_local_response(
    raw: &str,
    prompt: &str,
    message: &str,
) -> Result<String, GenerationError> {
    let extracted = if raw.contains("Bot:") {
        raw.rsplit("Bot:").next().unwrap_or_default().trim().to_string()
    } else {
        raw.replace(prompt, "").trim().to_string()
    };

    let mut response = extracted
        .replace("User:", "")
        .replace("Bot:", "")
        .trim()
        .to_string();

    // Only an exact-case echo can be split off.
    if !message.is_empty() && response.contains(message) {
        response = response
            .rsplit(message)
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();
    }

    if response.is_empty() {
        return Err(GenerationError::Rejected("empty response"));
    }
    if response.chars().count() < MIN_LOCAL_RESPONSE_CHARS {
        return Err(GenerationError::Rejected("response too short"));
    }
    if response.to_lowercase() == message.to_lowercase() {
        return Err(GenerationError::Rejected("response echoes the message"));
    }

    if response.chars().count() > MAX_LOCAL_RESPONSE_CHARS {
        let mut truncated: String = response.chars().take(MAX_LOCAL_RESPONSE_CHARS).collect();
        truncated.push_str("...");
        response = truncated;
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turns(n: usize) -> Vec<ConversationTurn> {
        (0..n)
            .map(|i| ConversationTurn::new(format!("question {}", i), format!("answer {}", i)))
            .collect()
    }

    #[test]
    fn test_recent_turns_keeps_last_five() {
        let history = turns(6);
        let recent = recent_turns(&history);
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].user_message, "question 1");
        assert_eq!(recent[4].user_message, "question 5");
        assert_eq!(recent_turns(&turns(2)).len(), 2);
        assert!(recent_turns(&[]).is_empty());
    }

    #[test]
    fn test_chat_messages_layout() {
        let history = turns(6);
        let msgs = build_chat_messages("How do I grow rice?", &history, "Crop: Rice");
        // system + context + 5 * 2 history + current
        assert_eq!(msgs.len(), 13);
        assert_eq!(msgs[0].role, ChatRole::System);
        assert_eq!(msgs[0].content, SYSTEM_INSTRUCTION);
        assert_eq!(msgs[1].role, ChatRole::System);
        assert!(msgs[1].content.contains("Crop: Rice"));
        assert_eq!(msgs[2].role, ChatRole::User);
        assert_eq!(msgs[2].content, "question 1");
        assert_eq!(msgs[3].role, ChatRole::Assistant);
        assert_eq!(msgs[3].content, "answer 1");
        assert!(!msgs.iter().any(|m| m.content == "question 0"));
        let last = msgs.last().unwrap();
        assert_eq!(last.role, ChatRole::User);
        assert_eq!(last.content, "How do I grow rice?");
    }

    #[test]
    fn test_chat_messages_without_context() {
        let msgs = build_chat_messages("hello", &[], "");
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[1].role, ChatRole::User);
    }

    #[test]
    fn test_chat_message_serializes_role_lowercase() {
        let v = serde_json::to_value(ChatMessage::new(ChatRole::Assistant, "x")).unwrap();
        assert_eq!(v["role"], "assistant");
    }

    #[test]
    fn test_local_prompt_drops_oldest_turn() {
        let history = turns(6);
        let prompt = build_local_prompt("What now?", &history, "");
        assert!(prompt.starts_with(LOCAL_GENERIC_PREAMBLE));
        assert!(!prompt.contains("question 0"));
        assert!(prompt.contains("User: question 1\nBot: answer 1\n"));
        assert!(prompt.ends_with("User: What now?\nBot:"));
    }

    #[test]
    fn test_local_prompt_embeds_context() {
        let prompt = build_local_prompt("tomato?", &[], "Crop: Tomato");
        assert!(prompt.contains("Use the following agriculture knowledge"));
        assert!(prompt.contains("Crop: Tomato"));
    }

    #[test]
    fn test_clean_takes_text_after_last_bot_marker() {
        let prompt = "preamble\n\nUser: hi\nBot:";
        let raw = format!("{} Water your plants every morning.", prompt);
        let cleaned = clean_local_response(&raw, prompt, "hi").unwrap();
        assert_eq!(cleaned, "Water your plants every morning.");
    }

    #[test]
    fn test_clean_strips_prompt_without_marker() {
        let cleaned =
            clean_local_response("PROMPT Apply compost before planting.", "PROMPT", "q").unwrap();
        assert_eq!(cleaned, "Apply compost before planting.");
    }

    #[test]
    fn test_clean_strips_labels() {
        let cleaned = clean_local_response(
            "Bot: Use drip irrigation. User: thanks",
            "",
            "irrigation?",
        )
        .unwrap();
        assert_eq!(cleaned, "Use drip irrigation.  thanks");
    }

    #[test]
    fn test_clean_keeps_part_after_echoed_message() {
        let cleaned = clean_local_response(
            "Bot: how to grow wheat Sow wheat in early winter.",
            "",
            "how to grow wheat",
        )
        .unwrap();
        assert_eq!(cleaned, "Sow wheat in early winter.");
    }

    #[test]
    fn test_clean_rejects_short_empty_and_echo() {
        assert!(matches!(
            clean_local_response("Bot:", "", "hello"),
            Err(GenerationError::Rejected(_))
        ));
        assert!(matches!(
            clean_local_response("Bot: Yes.", "", "hello"),
            Err(GenerationError::Rejected(_))
        ));
        assert!(matches!(
            clean_local_response("Bot: WHAT IS SOIL PH", "", "what is soil ph"),
            Err(GenerationError::Rejected(_))
        ));
    }

    #[test]
    fn test_clean_truncates_long_output() {
        let long = "a".repeat(600);
        let cleaned = clean_local_response(&format!("Bot: {}", long), "", "q").unwrap();
        assert_eq!(cleaned.chars().count(), MAX_LOCAL_RESPONSE_CHARS + 3);
        assert!(cleaned.ends_with("..."));
    }
}
