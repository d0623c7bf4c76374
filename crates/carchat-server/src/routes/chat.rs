use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use carchat::models::message::Message;
use carchat::providers::utils::message_from_anthropic_spec;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

/// The whole conversation so far; the browser keeps it between requests
#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    messages: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    response: String,
}

fn convert_messages(messages: &[Value]) -> Result<Vec<Message>, ApiError> {
    messages
        .iter()
        .map(|value| {
            message_from_anthropic_spec(value)
                .map_err(|e| ApiError::BadRequest(format!("Nieprawidłowa wiadomość: {}", e)))
        })
        .collect()
}

async fn handler(
    State(state): State<AppState>,
    request: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(request) = request.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    if request.messages.is_empty() {
        return Err(ApiError::BadRequest("Brak wiadomości".to_string()));
    }

    let agent = state.agent.clone().ok_or_else(ApiError::missing_credential)?;
    let messages = convert_messages(&request.messages)?;

    info!(messages = messages.len(), "chat request");
    let response = agent.reply(messages).await.map_err(|e| {
        error!("chat failed: {:#}", e);
        ApiError::Internal(e.to_string())
    })?;

    Ok(Json(ChatResponse { response }))
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(handler))
        .with_state(state)
}
