//! HTTP API server.
//!
//! Exposes the chatbot, fertilizer schedules and disease classifier as a
//! JSON API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Service index |
//! | `GET`  | `/health` | Liveness check |
//! | `POST` | `/api/chatbot/message` | Ask the chatbot; the turn is stored in the user's session |
//! | `GET`  | `/api/chatbot/conversation/{user_id}` | Session history |
//! | `DELETE` | `/api/chatbot/conversation/{user_id}` | Clear a session |
//! | `GET`  | `/api/chatbot/health` | Backend introspection |
//! | `GET`  | `/api/chatbot/topics` | Topic list |
//! | `GET`/`POST` | `/api/fertilizer/schedules` | List (`?status=`) / create |
//! | `GET`/`PUT`/`DELETE` | `/api/fertilizer/schedules/{id}` | Read / partial update / delete |
//! | `PATCH` | `/api/fertilizer/schedules/{id}/status?status=` | Change status |
//! | `POST` | `/api/fertilizer/schedules/{id}/apply` | Mark completed |
//! | `GET`  | `/api/fertilizer/health` | Schedule count |
//! | `POST` | `/api/disease-detection/upload` | Classify a multipart image upload |
//! | `GET`  | `/api/disease-detection/health` | Classifier status |
//! | `GET`  | `/api/disease-detection/labels` | Label map |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "Message cannot be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser frontends can
//! call the API directly.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::chatbot::ChatbotService;
use crate::classifier::{self, DiseaseClassifier};
use crate::config::Config;
use crate::fertilizer::{
    FertilizerSchedule, NewSchedule, ScheduleError, ScheduleStatus, ScheduleStore, ScheduleUpdate,
};
use crate::knowledge::KnowledgeBase;
use crate::models::ConversationTurn;
use crate::session::{SessionStore, DEFAULT_USER_ID};

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    chatbot: Arc<ChatbotService>,
    sessions: Arc<SessionStore>,
    schedules: Arc<ScheduleStore>,
    classifier: Option<Arc<DiseaseClassifier>>,
}

impl AppState {
    /// Fresh sessions and the seeded fertilizer schedules.
    pub fn new(chatbot: ChatbotService, classifier: Option<DiseaseClassifier>) -> Self {
        Self {
            chatbot: Arc::new(chatbot),
            sessions: Arc::new(SessionStore::new()),
            schedules: Arc::new(ScheduleStore::seeded()),
            classifier: classifier.map(Arc::new),
        }
    }

    /// Loads the knowledge base and initializes every configured backend.
    ///
    /// Only a broken knowledge base file is fatal; unavailable generative
    /// or classification backends are logged and left disabled.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let kb = Arc::new(KnowledgeBase::load(config.knowledge_base.path.as_deref())?);
        tracing::info!(
            crops = kb.crops().len(),
            pests = kb.pests().len(),
            topics = kb.topics().len(),
            "knowledge base loaded"
        );

        let chatbot = ChatbotService::initialize(config, kb).await;

        let classifier = match DiseaseClassifier::from_config(&config.classifier) {
            Ok(Some(c)) => {
                tracing::info!("disease classifier configured");
                Some(c)
            }
            Ok(None) => {
                tracing::warn!("no disease classifier configured, uploads will be refused");
                None
            }
            Err(e) => {
                tracing::error!(error = %e, "could not create disease classifier");
                None
            }
        };

        Ok(Self::new(chatbot, classifier))
    }
}

/// Builds the API router with CORS applied.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/api/chatbot/message", post(handle_chat_message))
        .route(
            "/api/chatbot/conversation/{user_id}",
            get(handle_get_conversation).delete(handle_clear_conversation),
        )
        .route("/api/chatbot/health", get(handle_chatbot_health))
        .route("/api/chatbot/topics", get(handle_topics))
        .route(
            "/api/fertilizer/schedules",
            get(handle_list_schedules).post(handle_create_schedule),
        )
        .route(
            "/api/fertilizer/schedules/{id}",
            get(handle_get_schedule)
                .put(handle_update_schedule)
                .delete(handle_delete_schedule),
        )
        .route(
            "/api/fertilizer/schedules/{id}/status",
            patch(handle_schedule_status),
        )
        .route(
            "/api/fertilizer/schedules/{id}/apply",
            post(handle_apply_schedule),
        )
        .route("/api/fertilizer/health", get(handle_fertilizer_health))
        .route("/api/disease-detection/upload", post(handle_upload))
        .route("/api/disease-detection/health", get(handle_detection_health))
        .route("/api/disease-detection/labels", get(handle_labels))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until the process is
/// terminated.
///
/// This is the entry point used by the `agri serve` command.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config).await?;
    serve(state, &config.server.bind).await
}

/// Serves an already-built [`AppState`] on `bind_addr`.
pub async fn serve(state: AppState, bind_addr: &str) -> anyhow::Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("API server listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

impl From<ScheduleError> for AppError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::NotFound(_) => not_found(err.to_string()),
            ScheduleError::InvalidStatus(_) => bad_request(err.to_string()),
        }
    }
}

// ============ Index and health ============

async fn handle_root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "AgriConnect Agriculture API",
        "version": env!("CARGO_PKG_VERSION"),
        "services": {
            "disease_detection": "/api/disease-detection/health",
            "fertilizer": "/api/fertilizer/health",
            "chatbot": "/api/chatbot/health",
        }
    }))
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "running" }))
}

// ============ Chatbot ============

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    user_id: Option<String>,
    /// Replaces the stored session history for this request when present.
    #[serde(default)]
    conversation_history: Option<Vec<ConversationTurn>>,
}

#[derive(Serialize)]
struct ChatResponse {
    user_message: String,
    bot_response: String,
    timestamp: DateTime<Utc>,
    confidence: f64,
}

/// Handler for `POST /api/chatbot/message`.
///
/// The user's session stays locked from history read to turn append, so
/// concurrent messages from one user are answered in order.
async fn handle_chat_message(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    if req.message.trim().is_empty() {
        return Err(bad_request("Message cannot be empty"));
    }

    let user_id = req
        .user_id
        .filter(|u| !u.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_USER_ID.to_string());

    let mut session = state.sessions.lock(&user_id).await;
    let history = match req.conversation_history {
        Some(history) => history,
        None => session.history().to_vec(),
    };

    let reply = state.chatbot.get_response(&req.message, &history).await;

    let turn = ConversationTurn::new(req.message, reply.bot_response.clone());
    let timestamp = turn.timestamp;
    session.append(turn);
    tracing::debug!(user_id = %user_id, confidence = reply.confidence, "answered chat message");

    Ok(Json(ChatResponse {
        user_message: reply.user_message,
        bot_response: reply.bot_response,
        timestamp,
        confidence: reply.confidence,
    }))
}

#[derive(Serialize)]
struct ConversationResponse {
    user_id: String,
    message_count: usize,
    messages: Vec<ConversationTurn>,
}

async fn handle_get_conversation(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<ConversationResponse> {
    let messages = state.sessions.history(&user_id).await;
    Json(ConversationResponse {
        message_count: messages.len(),
        user_id,
        messages,
    })
}

async fn handle_clear_conversation(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    if state.sessions.clear(&user_id) {
        Ok(Json(serde_json::json!({
            "message": "Conversation cleared",
            "user_id": user_id,
        })))
    } else {
        Err(not_found("Conversation not found"))
    }
}

async fn handle_chatbot_health(
    State(state): State<AppState>,
) -> Json<crate::chatbot::ChatbotHealth> {
    Json(state.chatbot.health())
}

async fn handle_topics(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "topics": state.chatbot.topics(),
        "description": "Ask about: fertilizer, disease, crop, irrigation, weather",
    }))
}

// ============ Fertilizer schedules ============

#[derive(Deserialize)]
struct ListParams {
    status: Option<String>,
}

/// Handler for `GET /api/fertilizer/schedules`.
///
/// An unknown status filter matches nothing.
async fn handle_list_schedules(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Json<Vec<FertilizerSchedule>> {
    let filter = params.status.filter(|s| !s.trim().is_empty());
    let schedules = match filter {
        None => state.schedules.list(None),
        Some(raw) => match raw.parse::<ScheduleStatus>() {
            Ok(status) => state.schedules.list(Some(status)),
            Err(_) => Vec::new(),
        },
    };
    Json(schedules)
}

async fn handle_get_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FertilizerSchedule>, AppError> {
    Ok(Json(state.schedules.get(&id)?))
}

async fn handle_create_schedule(
    State(state): State<AppState>,
    Json(new): Json<NewSchedule>,
) -> Json<FertilizerSchedule> {
    let created = state.schedules.create(new);
    tracing::info!(id = %created.id, "fertilizer schedule created");
    Json(created)
}

async fn handle_update_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<ScheduleUpdate>,
) -> Result<Json<FertilizerSchedule>, AppError> {
    Ok(Json(state.schedules.update(&id, update)?))
}

async fn handle_delete_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.schedules.delete(&id)?;
    Ok(Json(serde_json::json!({
        "message": "Schedule deleted successfully",
        "id": id,
    })))
}

#[derive(Deserialize)]
struct StatusParams {
    status: String,
}

async fn handle_schedule_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<StatusParams>,
) -> Result<Json<FertilizerSchedule>, AppError> {
    // Existence is checked before the status value.
    state.schedules.get(&id)?;
    let status: ScheduleStatus = params.status.parse()?;
    Ok(Json(state.schedules.set_status(&id, status)?))
}

async fn handle_apply_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let schedule = state.schedules.apply(&id)?;
    Ok(Json(serde_json::json!({
        "message": "Schedule marked as completed",
        "schedule": schedule,
    })))
}

async fn handle_fertilizer_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "fertilizer-management",
        "total_schedules": state.schedules.len(),
    }))
}

// ============ Disease detection ============

/// Handler for `POST /api/disease-detection/upload`.
///
/// Expects a multipart form with a `file` part carrying a JPEG or PNG image.
async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<classifier::Diagnosis>, AppError> {
    let classifier = state
        .classifier
        .clone()
        .ok_or_else(|| internal("Model not loaded. Please restart the server."))?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Error processing image: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field.content_type().unwrap_or_default().to_string();
        if !classifier::is_accepted_content_type(&content_type) {
            return Err(bad_request("File must be JPEG or PNG image"));
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("Error processing image: {}", e)))?;
        upload = Some((bytes.to_vec(), content_type));
        break;
    }

    let (image, content_type) = upload.ok_or_else(|| bad_request("Missing file field"))?;

    let diagnosis = classifier
        .classify(image, &content_type)
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "disease classification failed");
            bad_request(format!("Error processing image: {}", e))
        })?;

    Ok(Json(diagnosis))
}

async fn handle_detection_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "model": classifier::MODEL_NAME,
        "model_loaded": state.classifier.is_some(),
    }))
}

async fn handle_labels() -> Json<serde_json::Value> {
    let labels: serde_json::Map<String, serde_json::Value> = classifier::LABEL_MAP
        .iter()
        .map(|(label, name)| (label.to_string(), serde_json::Value::from(*name)))
        .collect();
    Json(serde_json::json!({ "labels": labels }))
}
