use axum::http::StatusCode;
use thiserror::Error;

/// Failure taxonomy for a model invocation. Each variant carries a stable
/// code and a user-safe message; provider internals stay in the logs.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat provider API key not configured")]
    MissingCredentials,

    #[error("invalid conversation history: {0}")]
    InvalidInput(String),

    #[error("model call timed out")]
    Timeout,

    #[error("provider authentication failed")]
    Auth,

    #[error("provider rate limit exceeded")]
    RateLimited,

    #[error("provider fault: {0}")]
    Upstream(String),

    #[error("unexpected chat failure: {0}")]
    Unknown(String),
}

impl ChatError {
    pub fn code(&self) -> &'static str {
        match self {
            ChatError::MissingCredentials => "MISSING_API_KEY",
            ChatError::InvalidInput(_) => "INVALID_INPUT",
            ChatError::Timeout => "TIMEOUT",
            ChatError::Auth => "AUTH_ERROR",
            ChatError::RateLimited => "RATE_LIMIT",
            ChatError::Upstream(_) => "PROVIDER_ERROR",
            ChatError::Unknown(_) => "UNKNOWN_ERROR",
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            ChatError::MissingCredentials =>
                "The chat service is not properly configured. Please contact support.",
            ChatError::InvalidInput(_) => "Unable to process your message. Please try again.",
            ChatError::Timeout => "The response took too long. Please try again.",
            ChatError::Auth => "Authentication failed. Please contact support.",
            ChatError::RateLimited => "Our service is busy right now. Please try again in a moment.",
            ChatError::Upstream(_) =>
                "Our AI service is temporarily unavailable. Please try again later.",
            ChatError::Unknown(_) =>
                "Something went wrong. Please try again or contact support if the issue persists.",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ChatError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ChatError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Classify a non-success provider HTTP status.
    pub fn from_provider_status(status: u16) -> Self {
        match status {
            401 | 403 => ChatError::Auth,
            429 => ChatError::RateLimited,
            500..=599 => ChatError::Upstream(format!("provider returned HTTP {}", status)),
            other => ChatError::Unknown(format!("provider returned HTTP {}", other)),
        }
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ChatError::Timeout
        } else {
            ChatError::Unknown(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_maps_to_429_and_everything_else_to_500_or_400() {
        assert_eq!(ChatError::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            ChatError::InvalidInput("empty".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ChatError::Timeout.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            ChatError::MissingCredentials.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn provider_status_classification() {
        assert!(matches!(ChatError::from_provider_status(401), ChatError::Auth));
        assert!(matches!(ChatError::from_provider_status(429), ChatError::RateLimited));
        assert!(matches!(ChatError::from_provider_status(503), ChatError::Upstream(_)));
        assert!(matches!(ChatError::from_provider_status(418), ChatError::Unknown(_)));
    }

    #[test]
    fn user_messages_do_not_leak_detail() {
        let err = ChatError::Upstream("secret internal detail".into());
        assert!(!err.user_message().contains("secret"));
        assert_eq!(err.code(), "PROVIDER_ERROR");
    }
}
