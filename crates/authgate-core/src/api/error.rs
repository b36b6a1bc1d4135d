use thiserror::Error;
use tracing::debug;

use crate::forms::ValidationError;
use crate::models::ErrorBody;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Unauthorized: {}", .message.as_deref().unwrap_or("token may be expired"))]
    Unauthorized { message: Option<String> },

    #[error("Request failed with status {status}: {}", .message.as_deref().unwrap_or("no details"))]
    Application { status: u16, message: Option<String> },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Failed to persist session: {0}")]
    Storage(String),
}

/// Maximum length for error response bodies in log messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

const SESSION_EXPIRED_MESSAGE: &str = "Your session has expired, please sign in again";
const NETWORK_MESSAGE: &str = "Could not reach the server, please try again later";
const INVALID_RESPONSE_MESSAGE: &str = "The server sent an unexpected response";
const STORAGE_MESSAGE: &str = "Could not save your session on this device";
const GENERIC_MESSAGE: &str = "Something went wrong, please try again";

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Map a non-success response. The server's `{"error": "..."}` message is
    /// kept verbatim; anything else in the body is only logged.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.error)
            .filter(|m| !m.trim().is_empty());
        if message.is_none() && !body.is_empty() {
            debug!(status = status.as_u16(), body = %Self::truncate_body(body), "Error response without message");
        }

        match status.as_u16() {
            401 => ApiError::Unauthorized { message },
            code => ApiError::Application {
                status: code,
                message,
            },
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized { .. } => Some(401),
            ApiError::Application { status, .. } => Some(*status),
            ApiError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Text a page shows inline for this error
    pub fn user_message(&self) -> String {
        self.user_message_or(GENERIC_MESSAGE)
    }

    /// Like `user_message`, with a page-specific fallback for server errors
    /// that carried no message of their own
    pub fn user_message_or(&self, fallback: &str) -> String {
        match self {
            ApiError::Validation(e) => e.to_string(),
            ApiError::Unauthorized { message } => message
                .clone()
                .unwrap_or_else(|| SESSION_EXPIRED_MESSAGE.to_string()),
            ApiError::Application { message, .. } => {
                message.clone().unwrap_or_else(|| fallback.to_string())
            }
            ApiError::Network(_) => NETWORK_MESSAGE.to_string(),
            ApiError::InvalidResponse(_) => INVALID_RESPONSE_MESSAGE.to_string(),
            ApiError::Storage(_) => STORAGE_MESSAGE.to_string(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Storage(format!("{:#}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_keeps_server_message() {
        let err = ApiError::from_status(StatusCode::CONFLICT, r#"{"error": "Email already registered"}"#);
        assert!(matches!(err, ApiError::Application { status: 409, .. }));
        assert_eq!(err.user_message(), "Email already registered");
    }

    #[test]
    fn test_from_status_401_is_unauthorized() {
        let err = ApiError::from_status(StatusCode::UNAUTHORIZED, r#"{"msg": "Token has expired"}"#);
        assert!(err.is_unauthorized());
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.user_message(), "Token has expired");
    }

    #[test]
    fn test_missing_message_uses_fallback() {
        let err = ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, "<html>Internal Server Error</html>");
        assert_eq!(err.user_message_or("Login failed, please try again"), "Login failed, please try again");
        assert_eq!(err.user_message(), GENERIC_MESSAGE);

        let err = ApiError::from_status(StatusCode::BAD_REQUEST, r#"{"error": "  "}"#);
        assert_eq!(err.user_message_or("fallback"), "fallback");
    }

    #[test]
    fn test_validation_message_passes_through() {
        let err = ApiError::from(ValidationError::PasswordUnchanged);
        assert_eq!(err.user_message(), ValidationError::PasswordUnchanged.to_string());
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_truncate_body() {
        let long = "x".repeat(MAX_ERROR_BODY_LENGTH + 20);
        let truncated = ApiError::truncate_body(&long);
        assert!(truncated.starts_with(&"x".repeat(MAX_ERROR_BODY_LENGTH)));
        assert!(truncated.contains("truncated, 520 total bytes"));
        assert_eq!(ApiError::truncate_body("short"), "short");
    }
}
