//! Normalized API error type and the failure taxonomy used by the pipeline.
//!
//! Every error surfaced to callers carries `{ message, code?, http_status? }`.
//! Network-level failures (no response at all) surface with a generic
//! connectivity message and no code.

use serde::Deserialize;
use thiserror::Error;

/// Stable error codes recognized by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCode {
    /// Access token expired; the pipeline attempts a refresh.
    TokenExpired,
    /// Access token rejected outright; no refresh is attempted.
    TokenInvalid,
    /// Request rejected as unauthorized with no expiry signal.
    Unauthorized,
    /// The refresh credential itself was rejected; the session is over.
    SessionInvalid,
    /// Any other code the API returned, preserved verbatim.
    Other(String),
}

impl ErrorCode {
    /// Parse a wire error code string.
    #[must_use]
    pub fn from_wire(code: &str) -> Self {
        match code {
            "TOKEN_EXPIRED" => Self::TokenExpired,
            "TOKEN_INVALID" => Self::TokenInvalid,
            "UNAUTHORIZED" => Self::Unauthorized,
            "SESSION_INVALID" => Self::SessionInvalid,
            other => Self::Other(other.to_string()),
        }
    }

    /// The stable string form of this code.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::TokenInvalid => "TOKEN_INVALID",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::SessionInvalid => "SESSION_INVALID",
            Self::Other(code) => code,
        }
    }
}

impl core::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A failure surfaced by the request pipeline.
///
/// `Clone` so a single refresh failure can be fanned out to every waiter
/// queued behind the in-flight refresh.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ApiError {
    /// Human-readable message, normalized from the wire payload.
    pub message: String,
    /// Stable error code, if the API supplied one.
    pub code: Option<ErrorCode>,
    /// HTTP status of the response, absent for network-level failures.
    pub http_status: Option<u16>,
}

impl ApiError {
    /// A network-level failure with no response.
    #[must_use]
    pub fn network(err: &reqwest::Error) -> Self {
        tracing::debug!(error = %err, "network-level request failure");
        Self {
            message: "Unable to reach the server. Check your connection and try again."
                .to_string(),
            code: None,
            http_status: None,
        }
    }

    /// The response body could not be decoded as the expected shape.
    #[must_use]
    pub fn decode(err: &serde_json::Error, http_status: u16) -> Self {
        Self {
            message: format!("Unexpected response from the server: {err}"),
            code: None,
            http_status: Some(http_status),
        }
    }

    /// The terminal error raised when the refresh credential is rejected or
    /// missing.
    #[must_use]
    pub fn session_invalid() -> Self {
        Self {
            message: "Your session has expired. Please log in again.".to_string(),
            code: Some(ErrorCode::SessionInvalid),
            http_status: Some(401),
        }
    }

    /// Build an error from a non-success HTTP response body.
    ///
    /// The body is expected to match the API's error payload convention
    /// (`{ message: string | string[], errorCode?, statusCode? }`); anything
    /// else degrades to the raw status line.
    #[must_use]
    pub fn from_response(http_status: u16, body: &str) -> Self {
        let payload: Option<ErrorPayload> = serde_json::from_str(body).ok();
        match payload {
            Some(payload) => Self {
                message: payload
                    .message
                    .map_or_else(|| format!("Request failed with status {http_status}"), |m| m.normalize()),
                code: payload.error_code.as_deref().map(ErrorCode::from_wire),
                http_status: Some(http_status),
            },
            None => Self {
                message: format!("Request failed with status {http_status}"),
                code: None,
                http_status: Some(http_status),
            },
        }
    }

    /// Whether this failure may be cured by refreshing the access token.
    ///
    /// Eligible: an explicit `TOKEN_EXPIRED` code, a message matching the
    /// expiry heuristic, or a 401 with no code at all (conservatively treated
    /// as "might be expired"). An explicit `TOKEN_INVALID`/`UNAUTHORIZED`
    /// with no expiry signal is not eligible.
    #[must_use]
    pub fn is_refresh_eligible(&self) -> bool {
        if self.http_status != Some(401) {
            return false;
        }
        match &self.code {
            Some(ErrorCode::TokenExpired) => true,
            None => true,
            Some(_) => message_signals_expiry(&self.message),
        }
    }
}

/// Expiry heuristic applied to error messages when the code is inconclusive.
fn message_signals_expiry(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("expired") || lower.contains("expiry")
}

// =============================================================================
// Wire payload
// =============================================================================

/// Error payload shape produced by the commerce API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorPayload {
    message: Option<MessageField>,
    error_code: Option<String>,
    #[allow(dead_code)]
    status_code: Option<u16>,
}

/// `message` arrives either as a single string or an array of strings
/// (validation errors); normalized to the first element.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MessageField {
    One(String),
    Many(Vec<String>),
}

impl MessageField {
    fn normalize(self) -> String {
        match self {
            Self::One(message) => message,
            Self::Many(messages) => messages
                .into_iter()
                .next()
                .unwrap_or_else(|| "Request failed".to_string()),
        }
    }
}
