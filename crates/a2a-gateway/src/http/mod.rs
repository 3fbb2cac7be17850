pub mod end;
pub mod invoke;
pub mod ping;
pub mod status;

use axum::http::HeaderMap;

use a2a_core::types::TraceId;

/// Read `x-trace-id` from the request, or mint a fresh one.
pub(crate) fn trace_id_from_headers(headers: &HeaderMap) -> String {
    headers
        .get("x-trace-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| TraceId::new().to_string())
}

/// Extract the bearer token from `Authorization: Bearer <token>`.
pub(crate) fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}
