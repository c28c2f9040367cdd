//! `/test` routes over the in-process [`TestGateway`].

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::gateway::{RecordedMessage, TestGateway};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub conversation_id: String,
    pub message: String,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SendMessageResponse {
    pub message_id: String,
    pub conversation_id: String,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub conversation_id: String,
    pub messages: Vec<RecordedMessage>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

fn gateway(state: &AppState) -> Result<&TestGateway, Response> {
    state
        .test_gateway
        .as_ref()
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "test gateway is disabled"))
}

/// `POST /test/message`: queue a message as if a user sent it.
pub async fn send_message(
    State(state): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> Response {
    let gateway = match gateway(&state) {
        Ok(g) => g,
        Err(resp) => return resp,
    };
    if req.conversation_id.trim().is_empty() {
        return error(StatusCode::BAD_REQUEST, "conversation_id must not be empty");
    }

    match gateway
        .inject(&req.conversation_id, &req.message, req.context)
        .await
    {
        Ok(message_id) => (
            StatusCode::ACCEPTED,
            Json(SendMessageResponse {
                message_id,
                conversation_id: req.conversation_id,
            }),
        )
            .into_response(),
        Err(e) => {
            warn!(conversation_id = %req.conversation_id, error = %e, "Failed to inject test message");
            error(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
    }
}

/// `GET /test/messages/{conversation_id}`: messages sent to the conversation.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Response {
    match gateway(&state) {
        Ok(gateway) => {
            let messages = gateway.messages(&conversation_id);
            Json(MessagesResponse {
                conversation_id,
                messages,
            })
            .into_response()
        }
        Err(resp) => resp,
    }
}

/// `DELETE /test/messages/{conversation_id}`.
pub async fn clear_messages(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Response {
    match gateway(&state) {
        Ok(gateway) => {
            gateway.clear(&conversation_id);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(resp) => resp,
    }
}
