//! # Agri Assist
//!
//! Backend for an agriculture assistant: a retrieval-augmented chatbot that
//! answers farming questions from a structured knowledge base, plus
//! fertilizer schedule management and plant disease image classification.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌────────────────────────┐
//! │  Session   │──▶│ ChatbotService│──▶│ ResponseSelector       │
//! │  Store     │   │ (orchestrator)│   │ remote ▶ local ▶ fallback
//! └────────────┘   └──────┬───────┘   └──────────┬─────────────┘
//!                         │                      │
//!                         ▼                      ▼
//!                  ┌──────────────┐      ┌──────────────┐
//!                  │ KnowledgeBase│◀─────│  Fallback    │
//!                  │  (retrieve)  │      │  Formatter   │
//!                  └──────────────┘      └──────────────┘
//! ```
//!
//! Answers never fail: when no generative backend is configured, or every
//! backend fails, the reply is built from knowledge-base records with a
//! lower confidence.
//!
//! ## Quick Start
//!
//! ```bash
//! agri serve                                   # start the HTTP API
//! agri ask "How do I grow tomato?"             # one-off answer
//! agri retrieve "tomato blight" --max-results 3
//! agri topics
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Conversation and reply types |
//! | [`knowledge`] | Knowledge base and keyword retrieval |
//! | [`generation`] | Remote and local generation backends |
//! | [`strategy`] | Ordered strategy selection |
//! | [`fallback`] | Template answers from knowledge-base records |
//! | [`session`] | Per-user conversation history |
//! | [`chatbot`] | Orchestrator |
//! | [`fertilizer`] | Fertilizer schedule store |
//! | [`classifier`] | Disease image classification client |
//! | [`server`] | HTTP API |

pub mod chatbot;
pub mod classifier;
pub mod config;
pub mod fallback;
pub mod fertilizer;
pub mod generation;
pub mod knowledge;
pub mod models;
pub mod server;
pub mod session;
pub mod strategy;
