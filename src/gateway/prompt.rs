use super::encoder::encode;
use super::types::{DiagnosisRequest, Intake, SessionConfig};
use super::GatewayError;

/// Substituted when the intake has no medical history.
pub const NO_HISTORY: &str = "None provided";

/// Longest symptom description accepted (characters).
pub const MAX_SYMPTOMS_CHARS: usize = 2000;

/// Render the patient prompt sent as the flow's `input_value`.
pub fn render_prompt(intake: &Intake) -> String {
    let history = intake
        .medical_history
        .as_deref()
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .unwrap_or(NO_HISTORY);

    format!(
        "Patient Information:
Species: {species}
Age: {age}
Severity: {severity}/10
Onset: {onset}
Medical History: {history}

Symptoms:
{symptoms}",
        species = intake.species,
        age = intake.age,
        severity = intake.severity,
        onset = intake.onset,
        symptoms = intake.symptoms,
    )
}

/// Build a diagnosis request from an intake.
///
/// An image is encoded and attached only when the analysis mode includes
/// images; a populated image field is ignored in text-only mode.
pub fn build(intake: &Intake, session: &SessionConfig) -> Result<DiagnosisRequest, GatewayError> {
    let attachments = match (&intake.image, intake.mode.includes_image()) {
        (Some(image), true) => vec![encode(image)?],
        (Some(image), false) => {
            tracing::debug!(
                filename = %image.filename,
                "Ignoring image for text-only analysis"
            );
            vec![]
        }
        (None, _) => vec![],
    };

    Ok(DiagnosisRequest {
        prompt_text: render_prompt(intake),
        attachments,
        session_config: session.clone(),
    })
}

/// Check an intake against the submission rules of the intake form.
pub fn validate_intake(intake: &Intake) -> Result<(), GatewayError> {
    if intake.age.trim().is_empty() {
        return Err(GatewayError::InvalidIntake("age is required".into()));
    }
    if !(1..=10).contains(&intake.severity) {
        return Err(GatewayError::InvalidIntake(format!(
            "severity must be between 1 and 10, got {}",
            intake.severity
        )));
    }
    if intake.mode.includes_image() {
        match &intake.image {
            None => {
                return Err(GatewayError::InvalidIntake(
                    "an image is required for image analysis".into(),
                ))
            }
            Some(image) if !image.mime_type.starts_with("image/") => {
                return Err(GatewayError::InvalidIntake(format!(
                    "'{}' is not an image ({})",
                    image.filename, image.mime_type
                )))
            }
            Some(_) => {}
        }
    }
    if intake.mode.includes_text() {
        if intake.symptoms.trim().is_empty() {
            return Err(GatewayError::InvalidIntake(
                "symptoms are required for text analysis".into(),
            ));
        }
        if intake.onset.is_blank() {
            return Err(GatewayError::InvalidIntake(
                "symptom onset is required for text analysis".into(),
            ));
        }
    }
    let symptom_chars = intake.symptoms.chars().count();
    if symptom_chars > MAX_SYMPTOMS_CHARS {
        return Err(GatewayError::InvalidIntake(format!(
            "symptoms are limited to {MAX_SYMPTOMS_CHARS} characters, got {symptom_chars}"
        )));
    }
    Ok(())
}
