use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use a2a_tokens::types::ValidationFailure;

/// Request-scoped identity needed to turn a [`GatewayError`] into a full
/// HTTP response without threading trace/request ids through every `?`.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub trace_id: String,
    pub request_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("message cannot be empty")]
    MissingMessage,
    #[error("conversation_id is required")]
    MissingConversationId,
    #[error("{0}")]
    TokenInvalid(ValidationFailure),
    #[error("{0}")]
    PermissionDenied(String),
    #[error("{0}")]
    Internal(String),
}

impl GatewayError {
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::MissingToken => "missing_token",
            GatewayError::MissingMessage => "missing_message",
            GatewayError::MissingConversationId => "missing_conversation_id",
            GatewayError::TokenInvalid(f) => f.code(),
            GatewayError::PermissionDenied(_) => "permission_denied",
            GatewayError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            GatewayError::MissingToken => StatusCode::UNAUTHORIZED,
            GatewayError::MissingMessage | GatewayError::MissingConversationId => StatusCode::BAD_REQUEST,
            GatewayError::TokenInvalid(f) => match f {
                ValidationFailure::NotFound | ValidationFailure::Expired | ValidationFailure::Revoked => {
                    StatusCode::UNAUTHORIZED
                }
                ValidationFailure::CallBudgetExceeded => StatusCode::FORBIDDEN,
                ValidationFailure::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            },
            GatewayError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn hint(&self) -> Option<String> {
        match self {
            GatewayError::MissingToken => {
                Some("set 'Authorization: Bearer <wire token>'".to_string())
            }
            GatewayError::TokenInvalid(f) => Some(f.hint().to_string()),
            GatewayError::PermissionDenied(h) => Some(h.clone()),
            _ => None,
        }
    }

    pub fn into_response(self, ctx: &ErrorContext) -> Response {
        let status = self.status();
        let body = ErrorBody {
            success: false,
            error: self.code(),
            message: self.to_string(),
            trace_id: ctx.trace_id.clone(),
            request_id: ctx.request_id.clone(),
            hint: self.hint(),
        };
        let mut response = (status, Json(body)).into_response();
        if let Ok(value) = axum::http::HeaderValue::from_str(&ctx.trace_id) {
            response.headers_mut().insert("x-trace-id", value);
        }
        response
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: &'static str,
    message: String,
    trace_id: String,
    request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}
