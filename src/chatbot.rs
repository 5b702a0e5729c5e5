//! Chatbot orchestrator.
//!
//! [`ChatbotService`] is the public entry point of the answer pipeline. It
//! owns the knowledge base and the [`ResponseSelector`], decides at startup
//! which generative backends are available, and guarantees that
//! [`get_response`](ChatbotService::get_response) always succeeds:
//!
//! | Situation | Answer | Confidence |
//! |-----------|--------|------------|
//! | no backend could be initialized | fallback formatter | 0.7 |
//! | a strategy produced an accepted answer | generated text | 0.85 |
//! | every strategy failed or was rejected | fallback formatter | 0.7 |
//! | the pipeline panicked | fallback formatter | 0.7 |

use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use crate::config::Config;
use crate::generation::local::LocalModelBackend;
use crate::generation::remote::RemoteChatBackend;
use crate::generation::DecodingParams;
use crate::knowledge::KnowledgeBase;
use crate::models::{
    BackendKind, ChatReply, ConversationTurn, FALLBACK_CONFIDENCE, GENERATED_CONFIDENCE,
};
use crate::strategy::{GenerationStrategy, LocalStrategy, RemoteStrategy, ResponseSelector};

/// Topic names of the legacy keyword table. Reported by the topics
/// endpoint only; answers come from the knowledge base.
pub const LEGACY_TOPICS: [&str; 5] = ["fertilizer", "disease", "crop", "irrigation", "weather"];

/// Introspection data for the chatbot health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ChatbotHealth {
    pub status: &'static str,
    pub service: &'static str,
    pub model: Option<String>,
    pub backend: BackendKind,
    pub model_loaded: bool,
    pub rag_enabled: bool,
    pub remote_enabled: bool,
}

pub struct ChatbotService {
    kb: Arc<KnowledgeBase>,
    selector: ResponseSelector,
}

impl ChatbotService {
    /// Builds the service from explicit strategies, tried in the given order.
    pub fn new(kb: Arc<KnowledgeBase>, strategies: Vec<Box<dyn GenerationStrategy>>) -> Self {
        let selector = ResponseSelector::new(kb.clone(), strategies);
        Self { kb, selector }
    }

    /// Knowledge-base-only service.
    pub fn fallback_only(kb: Arc<KnowledgeBase>) -> Self {
        Self::new(kb, Vec::new())
    }

    /// Sets up every backend the configuration and environment allow.
    ///
    /// Backend failures are logged and leave that backend out; when none
    /// remains the service runs in knowledge-base-only mode. This never
    /// fails.
    pub async fn initialize(config: &Config, kb: Arc<KnowledgeBase>) -> Self {
        let mut strategies: Vec<Box<dyn GenerationStrategy>> = Vec::new();

        match RemoteChatBackend::from_env(&config.chatbot.remote) {
            Ok(Some(backend)) => {
                tracing::info!(model = %config.chatbot.remote.model, "remote chat backend configured");
                strategies.push(Box::new(RemoteStrategy::new(Box::new(backend))));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "could not create remote chat backend"),
        }

        let local = &config.chatbot.local;
        if local.is_enabled() {
            match LocalModelBackend::connect(local).await {
                Ok(backend) => {
                    tracing::info!(model = %local.model, "local model backend loaded");
                    let params = DecodingParams {
                        max_new_tokens: local.max_new_tokens,
                        num_beams: local.num_beams,
                        no_repeat_ngram_size: local.no_repeat_ngram_size,
                        top_p: local.top_p,
                        temperature: local.temperature,
                        do_sample: true,
                    };
                    strategies.push(Box::new(LocalStrategy::new(Box::new(backend), params)));
                }
                Err(e) => tracing::warn!(error = %e, "could not load local model"),
            }
        }

        if strategies.is_empty() {
            tracing::warn!("no generative backend available, falling back to knowledge base only mode");
        }

        Self::new(kb, strategies)
    }

    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.kb
    }

    /// Whether at least one generative backend is available.
    pub fn model_loaded(&self) -> bool {
        !self.selector.strategies().is_empty()
    }

    pub fn active_backend(&self) -> BackendKind {
        self.selector
            .strategies()
            .first()
            .map(|s| s.kind())
            .unwrap_or(BackendKind::None)
    }

    /// Answers `message` given prior turns (most recent last). Never fails.
    pub async fn get_response(&self, message: &str, history: &[ConversationTurn]) -> ChatReply {
        if !self.model_loaded() {
            return self.fallback_reply(message);
        }

        let outcome = AssertUnwindSafe(self.selector.generate(message, history))
            .catch_unwind()
            .await;

        match outcome {
            Ok((text, generated)) => ChatReply {
                success: true,
                user_message: message.to_string(),
                bot_response: text,
                confidence: if generated {
                    GENERATED_CONFIDENCE
                } else {
                    FALLBACK_CONFIDENCE
                },
            },
            Err(_) => {
                tracing::error!("response pipeline panicked, using fallback answer");
                self.fallback_reply(message)
            }
        }
    }

    fn fallback_reply(&self, message: &str) -> ChatReply {
        ChatReply {
            success: true,
            user_message: message.to_string(),
            bot_response: self.selector.fallback().format(message),
            confidence: FALLBACK_CONFIDENCE,
        }
    }

    pub fn health(&self) -> ChatbotHealth {
        let loaded = self.model_loaded();
        ChatbotHealth {
            status: if loaded { "healthy" } else { "model_not_loaded" },
            service: "chatbot-ai",
            model: self
                .selector
                .strategies()
                .first()
                .map(|s| s.model_name().to_string()),
            backend: self.active_backend(),
            model_loaded: loaded,
            rag_enabled: true,
            remote_enabled: self
                .selector
                .strategies()
                .iter()
                .any(|s| s.kind() == BackendKind::Remote),
        }
    }

    pub fn topics(&self) -> Vec<&'static str> {
        LEGACY_TOPICS.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::GENERIC_PROMPTS;
    use crate::generation::{ChatBackend, ChatMessage, GenerationError};
    use crate::strategy::tests::{MockChat, MockGenerator};
    use async_trait::async_trait;

    fn kb() -> Arc<KnowledgeBase> {
        Arc::new(KnowledgeBase::bundled().unwrap())
    }

    struct PanickingChat;

    #[async_trait]
    impl ChatBackend for PanickingChat {
        fn model_name(&self) -> &str {
            "panics"
        }

        async fn complete(&self, _messages: &[ChatMessage]) -> Result<String, GenerationError> {
            panic!("backend exploded");
        }
    }

    #[tokio::test]
    async fn test_fallback_only_confidence() {
        let bot = ChatbotService::fallback_only(kb());
        for msg in ["How do I grow tomato?", "My tomato has blight", "xyz123 random gibberish"] {
            let reply = bot.get_response(msg, &[]).await;
            assert!(reply.success);
            assert_eq!(reply.confidence, 0.7);
            assert_eq!(reply.user_message, msg);
        }
    }

    #[tokio::test]
    async fn test_tomato_scenario_without_backend() {
        let bot = ChatbotService::fallback_only(kb());
        let reply = bot.get_response("How do I grow tomato?", &[]).await;
        assert!(reply.bot_response.contains("Tomato"));
        assert!(reply.bot_response.contains("6.0-7.0"));
        assert!(reply.bot_response.contains("• "));
        assert_eq!(reply.confidence, 0.7);
    }

    #[tokio::test]
    async fn test_blight_scenario_without_backend() {
        let bot = ChatbotService::fallback_only(kb());
        let reply = bot.get_response("My tomato has blight", &[]).await;
        assert!(reply.bot_response.contains("Tomato Late Blight"));
        assert!(reply.bot_response.contains("**Treatment:**\n• "));
        assert_eq!(reply.confidence, 0.7);
        let context = bot.knowledge_base().retrieve("My tomato has blight", 3);
        assert!(context.contains("Disease: Tomato Late Blight"));
        assert!(context.contains("Treatment: "));
    }

    #[tokio::test]
    async fn test_gibberish_scenario_without_backend() {
        let bot = ChatbotService::fallback_only(kb());
        let reply = bot.get_response("xyz123 random gibberish", &[]).await;
        assert!(GENERIC_PROMPTS.contains(&reply.bot_response.as_str()));
    }

    #[tokio::test]
    async fn test_generated_confidence() {
        let bot = ChatbotService::new(
            kb(),
            vec![Box::new(RemoteStrategy::new(Box::new(MockChat::ok(
                "Rotate your crops every season.",
            ))))],
        );
        let reply = bot.get_response("crop rotation?", &[]).await;
        assert_eq!(reply.confidence, 0.85);
        assert_eq!(reply.bot_response, "Rotate your crops every season.");
    }

    #[tokio::test]
    async fn test_failed_generation_confidence() {
        let bot = ChatbotService::new(
            kb(),
            vec![Box::new(RemoteStrategy::new(Box::new(MockChat::failing())))],
        );
        let reply = bot.get_response("How do I grow tomato?", &[]).await;
        assert!(reply.success);
        assert_eq!(reply.confidence, 0.7);
        assert!(reply.bot_response.contains("Tomato"));
    }

    #[tokio::test]
    async fn test_panicking_backend_is_contained() {
        let bot = ChatbotService::new(
            kb(),
            vec![Box::new(RemoteStrategy::new(Box::new(PanickingChat)))],
        );
        let reply = bot.get_response("wheat", &[]).await;
        assert!(reply.success);
        assert_eq!(reply.confidence, 0.7);
        assert!(reply.bot_response.contains("Wheat"));
    }

    #[tokio::test]
    async fn test_health_reports_backends() {
        let bot = ChatbotService::fallback_only(kb());
        let health = bot.health();
        assert_eq!(health.status, "model_not_loaded");
        assert_eq!(health.backend, BackendKind::None);
        assert!(health.model.is_none());
        assert!(!health.model_loaded);
        assert!(health.rag_enabled);

        let bot = ChatbotService::new(
            kb(),
            vec![Box::new(LocalStrategy::new(
                Box::new(MockGenerator::new("ok")),
                DecodingParams::default(),
            ))],
        );
        let health = bot.health();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.backend, BackendKind::Local);
        assert_eq!(health.model.as_deref(), Some("mock-local"));
        assert!(!health.remote_enabled);
    }

    #[tokio::test]
    async fn test_initialize_without_backends_is_fallback_only() {
        // No local url configured; the remote path depends on the
        // environment, so only the local side is asserted here.
        let bot = ChatbotService::initialize(&Config::minimal(), kb()).await;
        assert_ne!(bot.active_backend(), BackendKind::Local);
    }

    #[tokio::test]
    async fn test_initialize_skips_unreachable_local_model() {
        let mut cfg = Config::minimal();
        cfg.chatbot.local.url = Some("http://127.0.0.1:1/generate".to_string());
        cfg.chatbot.local.health_url = Some("http://127.0.0.1:1/health".to_string());
        cfg.chatbot.local.timeout_secs = 2;
        let bot = ChatbotService::initialize(&cfg, kb()).await;
        assert_ne!(bot.health().backend, BackendKind::Local);
    }

    #[test]
    fn test_topics_are_legacy_table() {
        let bot = ChatbotService::fallback_only(kb());
        assert_eq!(
            bot.topics(),
            vec!["fertilizer", "disease", "crop", "irrigation", "weather"]
        );
    }
}
