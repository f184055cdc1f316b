// src/logging_middleware.rs
//! Middleware for logging request and response bodies in debug mode

use axum::body::to_bytes;
use axum::{body::Body, extract::Request, http::StatusCode, middleware::Next, response::Response};
use serde_json::Value;
use tracing::{debug, enabled, Level};

/// JSON keys whose values never reach the logs.
const REDACTED_KEYS: &[&str] = &[
    "password",
    "current_password",
    "new_password",
    "token",
    "ticket",
    "link_ticket",
];

/// Replace secret values anywhere in `value` with a placeholder.
pub fn redact(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, field) in map.iter_mut() {
                if REDACTED_KEYS.contains(&key.as_str()) {
                    *field = Value::String("[redacted]".to_string());
                } else {
                    redact(field);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact),
        _ => {}
    }
}

fn describe(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    match serde_json::from_slice::<Value>(bytes) {
        Ok(mut json) => {
            redact(&mut json);
            serde_json::to_string_pretty(&json).ok()
        }
        // Non-JSON bodies are logged by size only.
        Err(_) => Some(format!("<{} bytes>", bytes.len())),
    }
}

/// Middleware to log request and response bodies in debug mode
pub async fn log_request_response(request: Request, next: Next) -> Result<Response, StatusCode> {
    if !enabled!(Level::DEBUG) {
        return Ok(next.run(request).await);
    }

    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, usize::MAX)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    if let Some(request_body) = describe(&bytes) {
        debug!(method = %parts.method, uri = %parts.uri.path(), request_body = %request_body, "Request");
    }

    let request = Request::from_parts(parts, Body::from(bytes));
    let response = next.run(request).await;

    let (parts, body) = response.into_parts();
    let bytes = to_bytes(body, usize::MAX)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    if let Some(response_body) = describe(&bytes) {
        debug!(status = %parts.status, response_body = %response_body, "Response");
    }

    Ok(Response::from_parts(parts, Body::from(bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_secrets_are_redacted_at_any_depth() {
        let mut body = json!({
            "email": "bob@example.com",
            "password": "hunter2",
            "user": { "id": "U_1", "token": "abc" },
            "items": [{ "ticket": "t" }]
        });
        redact(&mut body);

        assert_eq!(body["email"], "bob@example.com");
        assert_eq!(body["password"], "[redacted]");
        assert_eq!(body["user"]["id"], "U_1");
        assert_eq!(body["user"]["token"], "[redacted]");
        assert_eq!(body["items"][0]["ticket"], "[redacted]");
    }

    #[test]
    fn test_non_json_body_is_summarized() {
        assert_eq!(describe(b"code=abc").as_deref(), Some("<8 bytes>"));
        assert_eq!(describe(b""), None);
    }
}
