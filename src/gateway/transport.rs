use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::types::{DiagnosisRequest, DiagnosisTransport, RawResponse, StatusProbe};
use super::GatewayError;
use crate::config::{GatewayConfig, HEALTH_TIMEOUT_MS};

/// LangFlow HTTP client for the diagnosis flow.
///
/// Every call is bounded by an explicit timeout and sent exactly once.
/// Retrying is the caller's decision.
pub struct LangflowClient {
    base_url: String,
    flow_id: String,
    api_key: Option<String>,
    health_timeout: Duration,
    client: reqwest::Client,
}

impl LangflowClient {
    pub fn new(base_url: &str, flow_id: &str, api_key: Option<String>) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| GatewayError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            flow_id: flow_id.to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            health_timeout: Duration::from_millis(HEALTH_TIMEOUT_MS),
            client,
        })
    }

    pub fn from_config(config: &GatewayConfig) -> Result<Self, GatewayError> {
        Self::new(&config.base_url, &config.flow_id, config.api_key.clone())
    }

    /// Override the health probe timeout (defaults to 5 s).
    pub fn with_health_timeout(mut self, timeout: Duration) -> Self {
        self.health_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    fn run_url(&self) -> String {
        format!("{}/api/v1/run/{}?stream=false", self.base_url, self.flow_id)
    }

    fn version_url(&self) -> String {
        format!("{}/api/v1/version", self.base_url)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Map a reqwest failure. Timeouts win over connect errors so a slow
    /// handshake still reads as a timeout.
    fn map_request_error(&self, e: reqwest::Error, timeout: Duration) -> GatewayError {
        if e.is_timeout() {
            GatewayError::Timeout(timeout.as_millis() as u64)
        } else if e.is_connect() {
            GatewayError::Connection(self.base_url.clone())
        } else {
            GatewayError::Network(e.to_string())
        }
    }

    /// Issue a request and decode a JSON body from a successful response.
    async fn execute(
        &self,
        builder: reqwest::RequestBuilder,
        timeout: Duration,
        accept: impl Fn(StatusCode) -> bool,
    ) -> Result<RawResponse, GatewayError> {
        let response = self
            .authorize(builder)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| self.map_request_error(e, timeout))?;

        let status = response.status();
        if !accept(status) {
            return Err(GatewayError::Http {
                status: status.as_u16(),
                body: error_body(response).await,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.map_request_error(e, timeout))?;

        serde_json::from_slice(&bytes).map_err(|e| GatewayError::Parse(e.to_string()))
    }
}

/// Best-effort decode of an error body. Anything that is not JSON becomes `{}`.
async fn error_body(response: reqwest::Response) -> Value {
    match response.bytes().await {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::Object(Map::new())),
        Err(_) => Value::Object(Map::new()),
    }
}

#[async_trait]
impl DiagnosisTransport for LangflowClient {
    async fn send(
        &self,
        request: &DiagnosisRequest,
        timeout: Duration,
    ) -> Result<RawResponse, GatewayError> {
        let request_id = Uuid::new_v4();
        let start = Instant::now();

        tracing::info!(
            %request_id,
            flow_id = %self.flow_id,
            attachments = request.attachments.len(),
            prompt_len = request.prompt_text.len(),
            timeout_ms = timeout.as_millis() as u64,
            authenticated = self.has_credential(),
            "Sending diagnosis request"
        );

        let builder = self.client.post(self.run_url()).json(&request.wire_body());
        let result = self.execute(builder, timeout, |s| s.is_success()).await;

        match &result {
            Ok(_) => tracing::info!(
                %request_id,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Diagnosis response received"
            ),
            Err(e) => tracing::warn!(
                %request_id,
                status = e.http_status(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                error = %e,
                "Diagnosis request failed"
            ),
        }

        result
    }
}

#[async_trait]
impl StatusProbe for LangflowClient {
    /// `GET /api/v1/version`: healthy only on HTTP 200 with a JSON body.
    async fn probe(&self) -> Result<(), GatewayError> {
        let builder = self.client.get(self.version_url());
        let version = self
            .execute(builder, self.health_timeout, |s| s == StatusCode::OK)
            .await?;

        tracing::debug!(
            version = version.get("version").and_then(serde_json::Value::as_str),
            "LangFlow reachable"
        );
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════
// Test double
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
pub(crate) use mock::MockTransport;

#[cfg(test)]
mod mock {
    use std::sync::Mutex;

    use super::*;

    type Responder = Box<dyn Fn() -> Result<RawResponse, GatewayError> + Send + Sync>;

    /// Transport that answers every call with a configured outcome and records requests.
    pub(crate) struct MockTransport {
        responder: Responder,
        pub(crate) requests: Mutex<Vec<DiagnosisRequest>>,
    }

    impl MockTransport {
        pub(crate) fn responding(response: Value) -> Self {
            Self::with(move || Ok(response.clone()))
        }

        pub(crate) fn with(
            responder: impl Fn() -> Result<RawResponse, GatewayError> + Send + Sync + 'static,
        ) -> Self {
            Self {
                responder: Box::new(responder),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn call_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl DiagnosisTransport for MockTransport {
        async fn send(
            &self,
            request: &DiagnosisRequest,
            _timeout: Duration,
        ) -> Result<RawResponse, GatewayError> {
            self.requests.lock().unwrap().push(request.clone());
            (self.responder)()
        }
    }
}
