use std::fmt;
use std::time::Duration;

use crate::gateway::{GatewayError, DEFAULT_CHAT_INPUT_COMPONENT};

/// Application-level constants
pub const APP_NAME: &str = "MedVet";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_BASE_URL: &str = "http://localhost:7860";
pub const DEFAULT_FLOW_ID: &str = "f7df69e1-2eaf-4b76-b3f9-729fe696f6ed";
pub const DEFAULT_TIMEOUT_MS: u64 = 120_000;

/// Health probes use a much shorter budget than diagnosis calls.
pub const HEALTH_TIMEOUT_MS: u64 = 5_000;
pub const HEALTH_INTERVAL_SECS: u64 = 30;

pub const ENV_BASE_URL: &str = "LANGFLOW_URL";
pub const ENV_FLOW_ID: &str = "LANGFLOW_FLOW_ID";
pub const ENV_TIMEOUT_MS: &str = "LANGFLOW_API_TIMEOUT_MS";
pub const ENV_API_KEY: &str = "LANGFLOW_API_KEY";
pub const ENV_CHAT_INPUT_ID: &str = "LANGFLOW_CHAT_INPUT_ID";

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "medvet=info,medvet_lib=info"
}

/// Remote service settings, read once at startup.
#[derive(Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub base_url: String,
    pub flow_id: String,
    pub timeout_ms: u64,
    /// Bearer credential. `None` means anonymous access.
    pub api_key: Option<String>,
    pub chat_input_component: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            flow_id: DEFAULT_FLOW_ID.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            api_key: None,
            chat_input_component: DEFAULT_CHAT_INPUT_COMPONENT.to_string(),
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, GatewayError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, GatewayError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let timeout_ms = match get(ENV_TIMEOUT_MS) {
            Some(raw) => match raw.parse::<u64>() {
                Ok(ms) if ms > 0 => ms,
                _ => {
                    return Err(GatewayError::Config(format!(
                        "{ENV_TIMEOUT_MS} must be a positive number of milliseconds, got '{raw}'"
                    )))
                }
            },
            None => defaults.timeout_ms,
        };

        let base_url = get(ENV_BASE_URL).unwrap_or(defaults.base_url);
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(GatewayError::Config(format!(
                "{ENV_BASE_URL} must start with http:// or https://, got '{base_url}'"
            )));
        }

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            flow_id: get(ENV_FLOW_ID).unwrap_or(defaults.flow_id),
            timeout_ms,
            api_key: get(ENV_API_KEY),
            chat_input_component: get(ENV_CHAT_INPUT_ID).unwrap_or(defaults.chat_input_component),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("base_url", &self.base_url)
            .field("flow_id", &self.flow_id)
            .field("timeout_ms", &self.timeout_ms)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("chat_input_component", &self.chat_input_component)
            .finish()
    }
}
