pub mod types;
pub mod encoder;
pub mod prompt;
pub mod transport;
pub mod normalizer;
pub mod classify;
pub mod service;

pub use types::*;
pub use encoder::*;
pub use prompt::*;
pub use transport::*;
pub use normalizer::*;
pub use classify::*;
pub use service::*;

use thiserror::Error;

/// Raw failures of the diagnosis gateway.
///
/// These carry technical detail for logs. Callers that show something to a
/// patient go through [`classify`] and use [`ClassifiedError::user_message`].
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Failed to read image '{filename}': {reason}")]
    Encoding { filename: String, reason: String },

    #[error("Invalid intake: {0}")]
    InvalidIntake(String),

    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    #[error("Diagnosis service returned error (status {status})")]
    Http { status: u16, body: serde_json::Value },

    #[error("Diagnosis service is not reachable at {0}")]
    Connection(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to parse medical analysis results: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    /// HTTP status of the failed call, when the server answered at all.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}
