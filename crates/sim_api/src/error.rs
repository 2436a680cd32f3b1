use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimApiError {
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("invalid header {0}")]
    InvalidHeader(String),

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {0} {1}")]
    Status(StatusCode, String),

    #[error("{0}")]
    Rejected(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("event stream failed: {0}")]
    StreamFailed(String),

    #[error("request was cancelled")]
    Cancelled,
}

impl SimApiError {
    /// HTTP status the backend answered with, when the failure was one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status(status, _) => Some(*status),
            _ => None,
        }
    }

    /// Operator-facing reason without transport prefixes where one exists.
    pub fn reason(&self) -> String {
        match self {
            Self::Rejected(message) | Self::Status(_, message) => message.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    error: Option<ErrorField>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorField {
    Text(String),
    Detailed { message: Option<String> },
}

impl ErrorField {
    fn message(&self) -> Option<&str> {
        let message = match self {
            Self::Text(text) => text.as_str(),
            Self::Detailed { message } => message.as_deref()?,
        };
        non_empty_string(message)
    }
}

/// Extracts a human-readable message from a failed response body.
///
/// Prefers a JSON `error` field (string or `{message}` object), then the raw
/// body, then the status' canonical reason.
pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ErrorPayload>(body) {
        if let Some(message) = payload.error.as_ref().and_then(ErrorField::message) {
            return message.to_string();
        }
    }

    if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.trim().to_string()
    }
}

fn non_empty_string(value: &str) -> Option<&str> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}
