use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use fitcoach_agents::ChatMessage;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::sse::SseResponse;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

/// POST /chat: one model call, JSON answer.
pub async fn chat(State(state): State<SharedState>, Json(request): Json<ChatRequest>) -> Response {
    info!(history = request.history.len(), "chat request");

    match state
        .runtime
        .process_message(&request.history, &request.message)
        .await
    {
        Ok(response) => Json(ChatResponse { response }).into_response(),
        Err(e) => {
            warn!("chat request failed: {e}");
            (StatusCode::BAD_GATEWAY, Json(json!({ "error": e.to_string() }))).into_response()
        }
    }
}

/// POST /chat/stream: the tool-calling loop as server-sent events.
pub async fn chat_stream(
    State(state): State<SharedState>,
    Json(request): Json<ChatRequest>,
) -> SseResponse {
    info!(history = request.history.len(), "streaming chat request");

    let events = state
        .runtime
        .stream_message(request.history, request.message);
    SseResponse::new(events)
}

/// GET /api/tools: the merged tool catalog with each tool's owning provider.
pub async fn list_tools(State(state): State<SharedState>) -> Json<serde_json::Value> {
    let catalog = state.runtime.tools().catalog().await;

    let tools = catalog
        .definitions()
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "provider": catalog.owner(&tool.name),
                "input_schema": tool.input_schema,
            })
        })
        .collect::<Vec<_>>();

    Json(json!({
        "model": state.runtime.model(),
        "providers": state.runtime.tools().provider_names(),
        "tools": tools,
    }))
}
