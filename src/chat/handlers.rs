// HTTP handler for the chat fulfilment webhook

use axum::{extract::State, http::HeaderMap, Json};
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::auth::bearer_token;
use crate::chat::models::{ChatIntent, WebhookRequest, WebhookResponse};
use crate::error::{ApiError, ErrorResponse};

const FALLBACK_REPLY: &str = "Sorry, I didn't get that.";

/// Handler for POST /api/dialogflow/webhook
/// Authenticated with the shared webhook secret instead of a user token
#[utoipa::path(
    post,
    path = "/api/dialogflow/webhook",
    request_body = WebhookRequest,
    responses(
        (status = 200, description = "Reply for the classifier", body = WebhookResponse),
        (status = 401, description = "Missing or wrong webhook secret", body = ErrorResponse)
    ),
    tag = "chat"
)]
pub async fn webhook_handler(
    State(state): State<crate::AppState>,
    headers: HeaderMap,
    Json(request): Json<WebhookRequest>,
) -> Result<Json<WebhookResponse>, ApiError> {
    let expected = state
        .webhook_secret
        .as_deref()
        .ok_or_else(|| ApiError::Unauthorized("Unauthorized".to_string()))?;
    let presented =
        bearer_token(&headers).map_err(|_| ApiError::Unauthorized("Unauthorized".to_string()))?;
    if !bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) {
        return Err(ApiError::Unauthorized("Unauthorized".to_string()));
    }

    let result = request.query_result;
    debug!("Webhook intent {}", result.intent.display_name);

    let fulfillment_text = match ChatIntent::from_display_name(&result.intent.display_name) {
        Some(ChatIntent::CheckAvailability) => {
            state
                .availability
                .reply_for_chat_params(&result.parameters.to_query())
                .await
        }
        None => result
            .fulfillment_text
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| FALLBACK_REPLY.to_string()),
    };

    Ok(Json(WebhookResponse { fulfillment_text }))
}
