//! HTTP API gateway for Delve.
//!
//! - `POST /chat`   — streamed reply as server-sent events, research loop or
//!   single-shot depending on `deep_research_mode`
//! - `POST /upload` — streamed explanation of an uploaded text file
//! - `GET  /health` — liveness and version
//! - `GET  /tools`  — registered tools and their calling conventions
//!
//! Built on Axum for high performance async HTTP.

use axum::{
    Router,
    extract::{Multipart, State},
    http::{HeaderValue, Method, StatusCode, header},
    response::{
        IntoResponse, Json, Response,
        sse::{Event as SseEvent, KeepAlive, Sse},
    },
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{error, info, warn};

use delve_agent::{DirectResponder, EventStreamEncoder, LoopSettings, ResearchLoop, StreamRecord};
use delve_config::AppConfig;
use delve_core::message::{Message, Role};
use delve_core::provider::Provider;
use delve_core::tool::ToolRegistry;

/// Sent instead of a reply when moderation flags the latest user message.
pub const FLAGGED_MESSAGE: &str =
    "Your message has been flagged as inappropriate and cannot be processed.";

/// Shared application state for the gateway.
pub struct GatewayState {
    pub provider: Arc<dyn Provider>,
    pub research: Arc<ResearchLoop>,
    pub direct: Arc<DirectResponder>,
    pub encoder: EventStreamEncoder,
    /// Tools enabled when a request does not name any.
    pub default_tools: Vec<String>,
}

impl GatewayState {
    pub fn new(provider: Arc<dyn Provider>, tools: Arc<ToolRegistry>, config: &AppConfig) -> Self {
        let settings = LoopSettings::from_config(config);
        Self {
            direct: Arc::new(DirectResponder::from_settings(provider.clone(), &settings)),
            research: Arc::new(ResearchLoop::new(provider.clone(), tools).with_settings(settings)),
            provider,
            encoder: EventStreamEncoder::from_config(&config.agent),
            default_tools: config.agent.default_tools.clone(),
        }
    }
}

type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState, allowed_origin: &str) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/upload", post(upload_handler))
        .route("/health", get(health_handler))
        .route("/tools", get(tools_handler))
        .layer(cors_layer(allowed_origin))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(allowed_origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(3600));

    match HeaderValue::from_str(allowed_origin) {
        Ok(origin) => cors.allow_origin(AllowOrigin::list([origin])),
        Err(e) => {
            warn!(origin = %allowed_origin, error = %e, "Invalid CORS origin; cross-origin requests disabled");
            cors
        }
    }
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let router = delve_providers::build_from_config(&config);
    let provider = router
        .default()
        .ok_or_else(|| format!("Provider '{}' is not configured", config.default_provider))?;
    let tools = Arc::new(delve_tools::registry_from_config(&config.tools));

    let state = Arc::new(GatewayState::new(provider, tools, &config));
    let app = build_router(state, &config.gateway.allowed_origin);

    info!(
        addr = %addr,
        provider = %config.default_provider,
        model = %config.default_model,
        "Gateway starting"
    );
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// --- Handlers ---

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    /// Tools to enable for research mode. Absent means the configured
    /// defaults; an empty list enables none.
    #[serde(default)]
    pub tools: Option<Vec<String>>,
    #[serde(default)]
    pub deep_research_mode: bool,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

async fn chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    if payload.messages.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "messages must not be empty",
        ));
    }

    if let Some(latest) = payload.messages.iter().rev().find(|m| m.role == Role::User) {
        let flagged = state.provider.moderate(&latest.content).await.map_err(|e| {
            error!(provider = state.provider.name(), error = %e, "Moderation failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;
        if flagged {
            warn!("Latest user message flagged by moderation");
            return Ok(event_stream(flagged_records()));
        }
    }

    let records = if payload.deep_research_mode {
        let tools = payload
            .tools
            .unwrap_or_else(|| state.default_tools.clone());
        info!(
            messages = payload.messages.len(),
            tools = ?tools,
            "Research request"
        );
        let events = state.research.clone().run_stream(payload.messages, tools);
        state.encoder.spawn_events(events)
    } else {
        info!(messages = payload.messages.len(), "Single-shot request");
        let records = state.direct.clone().respond_stream(payload.messages);
        state.encoder.spawn_records(records)
    };

    Ok(event_stream(records))
}

async fn upload_handler(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("upload").to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.body_text()))?;
        upload = Some((filename, bytes));
        break;
    }

    let Some((filename, bytes)) = upload else {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "multipart field `file` is required",
        ));
    };

    let content = String::from_utf8(bytes.to_vec()).map_err(|_| {
        api_error(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            format!("Could not decode file '{filename}'. It may be a binary file or have an unsupported encoding."),
        )
    })?;

    info!(file = %filename, size = content.len(), "File explanation request");
    let records = state.direct.clone().explain_stream(filename, content);
    Ok(event_stream(state.encoder.spawn_records(records)))
}

/// `error` then `done`, for a flagged request.
fn flagged_records() -> mpsc::Receiver<StreamRecord> {
    let (tx, rx) = mpsc::channel(2);
    let _ = tx.try_send(StreamRecord::Error {
        content: FLAGGED_MESSAGE.into(),
    });
    let _ = tx.try_send(StreamRecord::Done);
    rx
}

/// One SSE `data:` frame per record, JSON encoded.
fn event_stream(records: mpsc::Receiver<StreamRecord>) -> Response {
    let stream = ReceiverStream::new(records).map(|record| {
        let data = serde_json::to_string(&record).unwrap_or_default();
        Ok::<_, Infallible>(SseEvent::default().data(data))
    });
    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
struct ToolDto {
    name: String,
    description: String,
}

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolDto>,
    count: usize,
}

async fn tools_handler(State(state): State<SharedState>) -> Json<ToolListResponse> {
    let registry = state.research.tools();
    let tools: Vec<ToolDto> = registry
        .names()
        .into_iter()
        .map(|name| ToolDto {
            name: name.to_string(),
            description: registry.describe(name),
        })
        .collect();

    Json(ToolListResponse {
        count: tools.len(),
        tools,
    })
}
