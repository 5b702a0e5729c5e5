//! Response strategy selection.
//!
//! [`ResponseSelector`] holds an ordered list of [`GenerationStrategy`]s
//! (remote chat first, then the local model) and tries each in turn for
//! every message. The first strategy that returns an accepted answer wins;
//! a failed or rejected attempt is logged and the next one is tried. When
//! every strategy fails (or none is configured) the answer comes from the
//! [`FallbackFormatter`].
//!
//! ```text
//! message ──▶ retrieve(context, 3) ──▶ remote ──▶ local ──▶ fallback
//!                                        │          │          │
//!                                        ▼          ▼          ▼
//!                                   (text, true) (text, true) (text, false)
//! ```

use async_trait::async_trait;
use std::sync::Arc;

use crate::fallback::FallbackFormatter;
use crate::generation::{
    build_chat_messages, build_local_prompt, clean_local_response, ChatBackend, DecodingParams,
    GenerationError, TextGenerator,
};
use crate::knowledge::KnowledgeBase;
use crate::models::{BackendKind, ConversationTurn};

/// Number of knowledge-base blocks retrieved as generation context.
pub const CONTEXT_RESULTS: usize = 3;

/// One way of producing a generated answer.
#[async_trait]
pub trait GenerationStrategy: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn model_name(&self) -> &str;

    /// Produces an accepted answer or explains why it could not.
    async fn attempt(
        &self,
        message: &str,
        history: &[ConversationTurn],
        context: &str,
    ) -> Result<String, GenerationError>;
}

/// Chat-completions strategy: role-tagged messages, trimmed completion.
pub struct RemoteStrategy {
    backend: Box<dyn ChatBackend>,
}

impl RemoteStrategy {
    pub fn new(backend: Box<dyn ChatBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl GenerationStrategy for RemoteStrategy {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    async fn attempt(
        &self,
        message: &str,
        history: &[ConversationTurn],
        context: &str,
    ) -> Result<String, GenerationError> {
        let messages = build_chat_messages(message, history, context);
        let text = self.backend.complete(&messages).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(GenerationError::Rejected("empty completion"));
        }
        Ok(text.to_string())
    }
}

/// Local-model strategy: single prompt, cleaned and length-checked output.
pub struct LocalStrategy {
    generator: Box<dyn TextGenerator>,
    params: DecodingParams,
}

impl LocalStrategy {
    pub fn new(generator: Box<dyn TextGenerator>, params: DecodingParams) -> Self {
        Self { generator, params }
    }
}

#[async_trait]
impl GenerationStrategy for LocalStrategy {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn model_name(&self) -> &str {
        self.generator.model_name()
    }

    async fn attempt(
        &self,
        message: &str,
        history: &[ConversationTurn],
        context: &str,
    ) -> Result<String, GenerationError> {
        let prompt = build_local_prompt(message, history, context);
        let raw = self.generator.generate(&prompt, &self.params).await?;
        clean_local_response(&raw, &prompt, message)
    }
}

/// Ordered strategy chain with a knowledge-base fallback.
pub struct ResponseSelector {
    kb: Arc<KnowledgeBase>,
    strategies: Vec<Box<dyn GenerationStrategy>>,
    fallback: FallbackFormatter,
}

impl ResponseSelector {
    pub fn new(kb: Arc<KnowledgeBase>, strategies: Vec<Box<dyn GenerationStrategy>>) -> Self {
        let fallback = FallbackFormatter::new(kb.clone());
        Self {
            kb,
            strategies,
            fallback,
        }
    }

    pub fn strategies(&self) -> &[Box<dyn GenerationStrategy>] {
        &self.strategies
    }

    pub fn fallback(&self) -> &FallbackFormatter {
        &self.fallback
    }

    /// Returns the answer and whether a generative backend produced it.
    pub async fn generate(&self, message: &str, history: &[ConversationTurn]) -> (String, bool) {
        let context = self.kb.retrieve(message, CONTEXT_RESULTS);

        for strategy in &self.strategies {
            match strategy.attempt(message, history, &context).await {
                Ok(text) => {
                    tracing::debug!(backend = strategy.kind().as_str(), "generated response");
                    return (text, true);
                }
                Err(GenerationError::Rejected(reason)) => {
                    tracing::info!(
                        backend = strategy.kind().as_str(),
                        reason,
                        "generated response rejected, trying next strategy"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        backend = strategy.kind().as_str(),
                        error = %e,
                        "generation failed, trying next strategy"
                    );
                }
            }
        }

        (self.fallback.format(message), false)
    }
}
