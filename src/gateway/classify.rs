use serde::Serialize;
use serde_json::Value;

use super::GatewayError;

/// Closed set of failure categories shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Timeout,
    BadRequest,
    AuthRequired,
    NotFound,
    ServerError,
    NetworkUnreachable,
    /// Kept for callers that persist categories. `classify` reports
    /// response-shape failures as `Unknown`.
    ParseFailure,
    Unknown,
}

/// A failure with a precomposed, patient-facing remediation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("{user_message}")]
pub struct ClassifiedError {
    pub category: ErrorCategory,
    pub user_message: String,
    pub http_status: Option<u16>,
}

impl ClassifiedError {
    fn new(category: ErrorCategory, user_message: impl Into<String>, http_status: Option<u16>) -> Self {
        Self {
            category,
            user_message: user_message.into(),
            http_status,
        }
    }
}

pub const TIMEOUT_MESSAGE: &str =
    "Request timeout. The analysis is taking too long. Please try again.";

pub const AUTH_REQUIRED_MESSAGE: &str = "Authentication required: LangFlow needs an API key or auth bypass.

To fix:
1. Start LangFlow with: langflow run --port 7860 --env-file .env.langflow
2. Add to .env.langflow: LANGFLOW_SKIP_AUTH_AUTO_LOGIN=true

Or set LANGFLOW_API_KEY in the gateway environment.";

pub const NOT_FOUND_MESSAGE: &str =
    "LangFlow service not found. Is the server running on port 7860?";

pub const UNREACHABLE_MESSAGE: &str = "Cannot connect to LangFlow. Please ensure:
1. LangFlow is running (port 7860)
2. The flow is loaded
3. No firewall is blocking the connection";

pub const UNEXPECTED_MESSAGE: &str = "An unexpected error occurred";

/// Map a gateway failure to a user-facing category and message.
///
/// Pure: no I/O, and the same error always classifies the same way.
pub fn classify(error: &GatewayError) -> ClassifiedError {
    match error {
        GatewayError::Timeout(_) => ClassifiedError::new(ErrorCategory::Timeout, TIMEOUT_MESSAGE, None),
        GatewayError::Http { status, body } => classify_status(*status, server_message(body)),
        GatewayError::Connection(_) | GatewayError::Network(_) => {
            ClassifiedError::new(ErrorCategory::NetworkUnreachable, UNREACHABLE_MESSAGE, None)
        }
        other => {
            let message = other.to_string();
            let message = if message.trim().is_empty() {
                UNEXPECTED_MESSAGE.to_string()
            } else {
                message
            };
            ClassifiedError::new(ErrorCategory::Unknown, message, None)
        }
    }
}

fn classify_status(status: u16, message: Option<&str>) -> ClassifiedError {
    let (category, user_message) = match status {
        400 => (
            ErrorCategory::BadRequest,
            format!("Invalid request: {}", message.unwrap_or("Please check your input data")),
        ),
        403 => (ErrorCategory::AuthRequired, AUTH_REQUIRED_MESSAGE.to_string()),
        404 => (ErrorCategory::NotFound, NOT_FOUND_MESSAGE.to_string()),
        500 => (
            ErrorCategory::ServerError,
            format!(
                "Server error: {}",
                message.unwrap_or("LangFlow encountered an internal error")
            ),
        ),
        other => (
            ErrorCategory::Unknown,
            format!("Error {other}: {}", message.unwrap_or("Unknown error occurred")),
        ),
    };
    ClassifiedError::new(category, user_message, Some(status))
}

/// Server-provided explanation: `message`, then `detail`. Strings only.
fn server_message(body: &Value) -> Option<&str> {
    ["message", "detail"]
        .iter()
        .filter_map(|key| body.get(key).and_then(Value::as_str))
        .find(|m| !m.trim().is_empty())
}
