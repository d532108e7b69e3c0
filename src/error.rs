use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Gateway returned status {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Classifies a transport error coming out of reqwest.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::Timeout(err.to_string())
        } else if err.is_connect() {
            AppError::Network(err.to_string())
        } else {
            AppError::HttpClient(err)
        }
    }

    /// Upstream HTTP status carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            AppError::Unauthorized(_) => Some(401),
            AppError::NotFound(_) => Some(404),
            AppError::Upstream { status, .. } => Some(*status),
            AppError::HttpClient(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// True when no response was obtained from the gateway at all
    pub fn is_network(&self) -> bool {
        match self {
            AppError::Network(_) | AppError::Timeout(_) => true,
            AppError::HttpClient(e) => e.status().is_none(),
            _ => false,
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.status().is_some_and(|s| s >= 500)
    }

    pub fn is_client_error(&self) -> bool {
        self.status().is_some_and(|s| (400..500).contains(&s))
    }

    /// Human-readable hint suitable for a toast in the front-end
    pub fn user_message(&self) -> String {
        match self {
            AppError::Timeout(_) => return "Request timed out. Please try again.".to_string(),
            AppError::Network(_) => {
                return "Connection error. Check your internet connection and try again."
                    .to_string()
            }
            AppError::InvalidInput(msg) | AppError::Conflict(msg) => return msg.clone(),
            AppError::Cancelled => return "The request was cancelled.".to_string(),
            AppError::Upstream { message, .. } if !message.is_empty() => return message.clone(),
            _ => {}
        }

        if self.is_network() {
            return "Connection error. Check your internet connection and try again.".to_string();
        }

        match self.status() {
            Some(400) => "Invalid data. Check the information sent.",
            Some(401) => "Not authorized. Please sign in again.",
            Some(403) => "Access denied. You do not have permission for this action.",
            Some(404) => "Resource not found.",
            Some(409) => "Conflict. The resource already exists.",
            Some(422) => "Invalid data. Check the required fields.",
            Some(429) => "Too many attempts. Wait a few minutes and try again.",
            Some(500) => "Internal server error. Try again later.",
            Some(503) => "Service temporarily unavailable. Try again later.",
            _ => "Unexpected error. Please try again.",
        }
        .to_string()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Network(_) | AppError::HttpClient(_) | AppError::Upstream { .. } => {
                StatusCode::BAD_GATEWAY
            }
            AppError::Cancelled => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
        }

        let body = Json(json!({
            "error": self.to_string(),
            "hint": self.user_message(),
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_of_mapped_variants() {
        assert_eq!(AppError::Unauthorized("x".into()).status(), Some(401));
        assert_eq!(AppError::NotFound("x".into()).status(), Some(404));
        assert_eq!(
            AppError::Upstream {
                status: 503,
                message: String::new()
            }
            .status(),
            Some(503)
        );
        assert_eq!(AppError::Cancelled.status(), None);
    }

    #[test]
    fn test_classification() {
        assert!(AppError::Timeout("slow".into()).is_network());
        assert!(AppError::Network("refused".into()).is_network());
        assert!(!AppError::NotFound("movie".into()).is_network());

        let server = AppError::Upstream {
            status: 502,
            message: String::new(),
        };
        assert!(server.is_server_error());
        assert!(!server.is_client_error());
        assert!(AppError::NotFound("movie".into()).is_client_error());
    }

    #[test]
    fn test_user_message_prefers_upstream_message() {
        let err = AppError::Upstream {
            status: 400,
            message: "Rating must be at least 0.5".to_string(),
        };
        assert_eq!(err.user_message(), "Rating must be at least 0.5");
    }

    #[test]
    fn test_user_message_by_status() {
        let err = AppError::Upstream {
            status: 429,
            message: String::new(),
        };
        assert_eq!(
            err.user_message(),
            "Too many attempts. Wait a few minutes and try again."
        );
        assert_eq!(
            AppError::NotFound("movie 42".into()).user_message(),
            "Resource not found."
        );
        assert_eq!(
            AppError::Timeout("10s".into()).user_message(),
            "Request timed out. Please try again."
        );
    }

    #[test]
    fn test_into_response_status_codes() {
        assert_eq!(
            AppError::Conflict("busy".into()).into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Unauthorized("no token".into())
                .into_response()
                .status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Network("down".into()).into_response().status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_cancelled_request_is_not_a_server_error() {
        let response = AppError::Cancelled.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert!(!response.status().is_server_error());
        assert_eq!(
            AppError::Cancelled.user_message(),
            "The request was cancelled."
        );
    }
}
