use std::sync::Arc;
use std::time::{Duration, Instant};

use super::classify::{classify, ClassifiedError};
use super::normalizer::normalize;
use super::prompt::{build, validate_intake};
use super::types::{DiagnosisResult, DiagnosisTransport, Intake, SessionConfig};
use super::GatewayError;
use crate::config::GatewayConfig;

/// Runs one diagnosis end to end:
/// validate → build (+ encode) → send → normalize
///
/// Holds no per-request state; each call builds a fresh request. The caller
/// keeps at most one diagnosis in flight.
pub struct DiagnosisService {
    transport: Arc<dyn DiagnosisTransport>,
    session: SessionConfig,
    timeout: Duration,
}

impl DiagnosisService {
    pub fn new(transport: Arc<dyn DiagnosisTransport>, session: SessionConfig, timeout: Duration) -> Self {
        Self {
            transport,
            session,
            timeout,
        }
    }

    pub fn from_config(transport: Arc<dyn DiagnosisTransport>, config: &GatewayConfig) -> Self {
        Self::new(
            transport,
            SessionConfig::for_chat_input(&config.chat_input_component),
            config.request_timeout(),
        )
    }

    /// Diagnose and classify any failure for display.
    pub async fn diagnose(&self, intake: &Intake) -> Result<DiagnosisResult, ClassifiedError> {
        self.run(intake).await.map_err(|e| {
            let classified = classify(&e);
            tracing::warn!(
                category = ?classified.category,
                status = classified.http_status,
                error = %e,
                "Diagnosis failed"
            );
            classified
        })
    }

    /// Diagnose and return the raw gateway error on failure.
    pub async fn run(&self, intake: &Intake) -> Result<DiagnosisResult, GatewayError> {
        let start = Instant::now();
        tracing::info!(
            species = %intake.species,
            mode = ?intake.mode,
            has_image = intake.image.is_some(),
            "Diagnosis started"
        );

        validate_intake(intake)?;
        let request = build(intake, &self.session)?;
        let raw = self.transport.send(&request, self.timeout).await?;
        let result = normalize(raw)?;

        tracing::info!(
            triage_level = %result.urgency.triage_level,
            urgency_score = result.urgency.urgency_score,
            report_len = result.report_text.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Diagnosis complete"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::classify::ErrorCategory;
    use crate::gateway::normalizer::NO_REPORT;
    use crate::gateway::transport::MockTransport;
    use crate::gateway::types::{AnalysisMode, ImageBlob, Onset, Species, TriageLevel, UrgencyRecord};
    use serde_json::json;

    fn intake() -> Intake {
        Intake {
            species: Species::Cat,
            age: "4".into(),
            severity: 5,
            onset: Onset::OneToThreeDays,
            medical_history: Some("Neutered".into()),
            symptoms: "hair loss around the ears".into(),
            image: Some(ImageBlob::from_bytes("ears.png", "image/png", vec![1, 2, 3])),
            mode: AnalysisMode::Both,
        }
    }

    fn service(transport: Arc<MockTransport>) -> DiagnosisService {
        DiagnosisService::new(transport, SessionConfig::default(), Duration::from_secs(120))
    }

    #[tokio::test]
    async fn successful_diagnosis_normalizes_response() {
        let transport = Arc::new(MockTransport::responding(json!({"outputs": [
            {"outputs": [{"results": {
                "message": {"data": {"text": "Possible ringworm"}},
                "urgency": {"triage_level": "GREEN", "recommended_timeframe": "within a week", "urgency_score": 20}
            }}]}
        ]})));

        let result = service(transport.clone()).diagnose(&intake()).await.unwrap();
        assert_eq!(result.report_text, "Possible ringworm");
        assert_eq!(result.urgency.triage_level, TriageLevel::Green);
        assert_eq!(result.urgency.urgency_score, 20);

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].attachments.len(), 1);
        assert!(requests[0].prompt_text.contains("Species: Cat"));
        assert!(requests[0].prompt_text.contains("Onset: 1-3days"));
        assert!(requests[0].prompt_text.contains("Medical History: Neutered"));
    }

    #[tokio::test]
    async fn shape_drift_degrades_to_defaults() {
        let transport = Arc::new(MockTransport::responding(json!({"outputs": [{"outputs": [{}]}]})));
        let result = service(transport).diagnose(&intake()).await.unwrap();
        assert_eq!(result.report_text, NO_REPORT);
        assert_eq!(result.urgency, UrgencyRecord::default());
    }

    #[tokio::test]
    async fn missing_outputs_is_classified() {
        let transport = Arc::new(MockTransport::responding(json!({"detail": "ok"})));
        let err = service(transport).diagnose(&intake()).await.unwrap_err();
        assert_eq!(err.category, ErrorCategory::Unknown);
        assert!(err.user_message.contains("Failed to parse medical analysis results"));
    }

    #[tokio::test]
    async fn forbidden_is_classified_as_auth_required() {
        let transport = Arc::new(MockTransport::with(|| {
            Err(GatewayError::Http {
                status: 403,
                body: json!({"detail": "Forbidden"}),
            })
        }));
        let err = service(transport).diagnose(&intake()).await.unwrap_err();
        assert_eq!(err.category, ErrorCategory::AuthRequired);
        assert_eq!(err.http_status, Some(403));
        assert!(err.user_message.contains("auth bypass"));
    }

    #[tokio::test]
    async fn timeout_is_classified() {
        let transport = Arc::new(MockTransport::with(|| Err(GatewayError::Timeout(120_000))));
        let err = service(transport).diagnose(&intake()).await.unwrap_err();
        assert_eq!(err.category, ErrorCategory::Timeout);
    }

    #[tokio::test]
    async fn invalid_intake_never_reaches_transport() {
        let transport = Arc::new(MockTransport::responding(json!({"outputs": [{}]})));
        let mut bad = intake();
        bad.severity = 0;

        let err = service(transport.clone()).run(&bad).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidIntake(_)));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn non_image_attachment_never_reaches_transport() {
        let transport = Arc::new(MockTransport::responding(json!({"outputs": [{}]})));
        let mut bad = intake();
        bad.image = Some(ImageBlob::from_bytes("notes.txt", "text/plain", b"not a photo".to_vec()));

        let err = service(transport.clone()).run(&bad).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidIntake(_)));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn encoding_failure_propagates_unchanged_from_run() {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(MockTransport::responding(json!({"outputs": [{}]})));
        let mut unreadable = intake();
        unreadable.image = Some(ImageBlob::from_path(dir.path().join("gone.png")));

        let err = service(transport.clone()).run(&unreadable).await.unwrap_err();
        assert!(matches!(err, GatewayError::Encoding { .. }));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn each_call_sends_exactly_once() {
        let transport = Arc::new(MockTransport::with(|| Err(GatewayError::Connection("x".into()))));
        let svc = service(transport.clone());
        let _ = svc.diagnose(&intake()).await;
        let _ = svc.diagnose(&intake()).await;
        assert_eq!(transport.call_count(), 2);
    }

    #[test]
    fn from_config_uses_configured_component_and_timeout() {
        let config = GatewayConfig {
            timeout_ms: 9_000,
            chat_input_component: "ChatInput-abc".into(),
            ..GatewayConfig::default()
        };
        let svc = DiagnosisService::from_config(Arc::new(MockTransport::responding(json!({}))), &config);
        assert_eq!(svc.timeout, Duration::from_secs(9));
        assert_eq!(svc.session.attach_to, "ChatInput-abc");
        assert!(svc.session.tweaks.contains_key("ChatInput-abc"));
    }
}
