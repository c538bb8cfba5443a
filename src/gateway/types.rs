use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::GatewayError;

/// Untyped response tree from the remote flow. No schema is guaranteed.
pub type RawResponse = Value;

// ═══════════════════════════════════════════════════════════
// Intake
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Species {
    Human,
    Dog,
    Cat,
    /// Any non-human patient when the caller does not distinguish further.
    Animal,
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Human => write!(f, "Human"),
            Self::Dog => write!(f, "Dog"),
            Self::Cat => write!(f, "Cat"),
            Self::Animal => write!(f, "Animal"),
        }
    }
}

impl FromStr for Species {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "human" => Ok(Self::Human),
            "dog" => Ok(Self::Dog),
            "cat" => Ok(Self::Cat),
            "animal" => Ok(Self::Animal),
            other => Err(GatewayError::InvalidIntake(format!("unknown species '{other}'"))),
        }
    }
}

/// When the symptoms started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Onset {
    Sudden,
    OneToThreeDays,
    OneWeek,
    Weeks,
    Chronic,
    /// Free-text onset from intake forms that do not use the fixed choices.
    Other(String),
}

impl Onset {
    /// Human-readable label for the fixed choices.
    pub fn label(&self) -> &str {
        match self {
            Self::Sudden => "Sudden (within hours)",
            Self::OneToThreeDays => "1-3 days ago",
            Self::OneWeek => "About a week ago",
            Self::Weeks => "Several weeks",
            Self::Chronic => "Chronic (months/years)",
            Self::Other(text) => text,
        }
    }

    pub fn is_blank(&self) -> bool {
        matches!(self, Self::Other(text) if text.trim().is_empty())
    }
}

impl fmt::Display for Onset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sudden => write!(f, "sudden"),
            Self::OneToThreeDays => write!(f, "1-3days"),
            Self::OneWeek => write!(f, "1week"),
            Self::Weeks => write!(f, "weeks"),
            Self::Chronic => write!(f, "chronic"),
            Self::Other(text) => write!(f, "{text}"),
        }
    }
}

impl FromStr for Onset {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "sudden" => Self::Sudden,
            "1-3days" => Self::OneToThreeDays,
            "1week" => Self::OneWeek,
            "weeks" => Self::Weeks,
            "chronic" => Self::Chronic,
            other => Self::Other(other.to_string()),
        })
    }
}

/// Which inputs the caller wants analysed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    Image,
    Text,
    Both,
}

impl AnalysisMode {
    pub fn includes_image(self) -> bool {
        matches!(self, Self::Image | Self::Both)
    }

    pub fn includes_text(self) -> bool {
        matches!(self, Self::Text | Self::Both)
    }
}

impl FromStr for AnalysisMode {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "image" => Ok(Self::Image),
            "text" => Ok(Self::Text),
            "both" => Ok(Self::Both),
            other => Err(GatewayError::InvalidIntake(format!("unknown analysis mode '{other}'"))),
        }
    }
}

/// Patient intake collected by the caller. Treated as immutable once submitted.
#[derive(Debug, Clone)]
pub struct Intake {
    pub species: Species,
    pub age: String,
    /// 1 to 10.
    pub severity: u8,
    pub onset: Onset,
    pub medical_history: Option<String>,
    pub symptoms: String,
    pub image: Option<ImageBlob>,
    pub mode: AnalysisMode,
}

// ═══════════════════════════════════════════════════════════
// Images
// ═══════════════════════════════════════════════════════════

#[derive(Clone)]
enum BlobSource {
    Memory(Vec<u8>),
    File(PathBuf),
}

/// An image supplied with the intake. File-backed blobs are read at encode time.
#[derive(Clone)]
pub struct ImageBlob {
    pub filename: String,
    pub mime_type: String,
    source: BlobSource,
}

impl ImageBlob {
    pub fn from_bytes(filename: &str, mime_type: &str, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.to_string(),
            mime_type: mime_type.to_string(),
            source: BlobSource::Memory(bytes),
        }
    }

    /// Reference an image on disk. MIME type is guessed from the extension.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Self {
            filename,
            mime_type,
            source: BlobSource::File(path.to_path_buf()),
        }
    }

    pub(crate) fn read(&self) -> std::io::Result<Cow<'_, [u8]>> {
        match &self.source {
            BlobSource::Memory(bytes) => Ok(Cow::Borrowed(bytes)),
            BlobSource::File(path) => std::fs::read(path).map(Cow::Owned),
        }
    }
}

impl fmt::Debug for ImageBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match &self.source {
            BlobSource::Memory(bytes) => format!("{} bytes in memory", bytes.len()),
            BlobSource::File(path) => path.display().to_string(),
        };
        f.debug_struct("ImageBlob")
            .field("filename", &self.filename)
            .field("mime_type", &self.mime_type)
            .field("source", &source)
            .finish()
    }
}

/// Base64 image ready for the wire. Lives for the duration of one request.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub data: String,
    pub mime_type: String,
    pub filename: String,
}

impl fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedImage")
            .field("data_len", &self.data.len())
            .field("mime_type", &self.mime_type)
            .field("filename", &self.filename)
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════
// Request
// ═══════════════════════════════════════════════════════════

/// Component key in the default diagnosis flow that receives chat input.
pub const DEFAULT_CHAT_INPUT_COMPONENT: &str = "ChatInput-memce";

/// Provider routing metadata ("tweaks"). Passed through untouched, except
/// that file attachments are added under `attach_to`.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub attach_to: String,
    pub tweaks: Map<String, Value>,
}

impl SessionConfig {
    /// Tweaks for a chat input component: user sender, empty session, stored messages.
    pub fn for_chat_input(component: &str) -> Self {
        let mut tweaks = Map::new();
        tweaks.insert(
            component.to_string(),
            serde_json::json!({
                "sender": "User",
                "sender_name": "User",
                "session_id": "",
                "should_store_message": true,
            }),
        );
        Self {
            attach_to: component.to_string(),
            tweaks,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::for_chat_input(DEFAULT_CHAT_INPUT_COMPONENT)
    }
}

/// One diagnosis submission. Built fresh per call, never reused.
#[derive(Debug, Clone)]
pub struct DiagnosisRequest {
    pub prompt_text: String,
    pub attachments: Vec<EncodedImage>,
    pub session_config: SessionConfig,
}

#[derive(Serialize)]
struct WireFile<'a> {
    data: &'a str,
    #[serde(rename = "type")]
    mime_type: &'a str,
    name: &'a str,
}

/// Request body for `POST /api/v1/run/{flow_id}`.
#[derive(Serialize)]
pub struct WirePayload<'a> {
    input_value: &'a str,
    tweaks: Map<String, Value>,
}

impl DiagnosisRequest {
    /// Render the run-flow body. Attachments land in `tweaks[attach_to].files`.
    pub fn wire_body(&self) -> WirePayload<'_> {
        let mut tweaks = self.session_config.tweaks.clone();

        if !self.attachments.is_empty() {
            let files: Vec<Value> = self
                .attachments
                .iter()
                .filter_map(|a| {
                    serde_json::to_value(WireFile {
                        data: &a.data,
                        mime_type: &a.mime_type,
                        name: &a.filename,
                    })
                    .ok()
                })
                .collect();

            let entry = tweaks
                .entry(self.session_config.attach_to.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            match entry {
                Value::Object(component) => {
                    component.insert("files".to_string(), Value::Array(files));
                }
                other => {
                    tracing::warn!(
                        component = %self.session_config.attach_to,
                        "Attach component tweak is not an object, replacing it"
                    );
                    *other = serde_json::json!({ "files": files });
                }
            }
        }

        WirePayload {
            input_value: &self.prompt_text,
            tweaks,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Result
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TriageLevel {
    Red,
    Yellow,
    Green,
}

impl fmt::Display for TriageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Red => write!(f, "RED"),
            Self::Yellow => write!(f, "YELLOW"),
            Self::Green => write!(f, "GREEN"),
        }
    }
}

impl FromStr for TriageLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "RED" => Ok(Self::Red),
            "YELLOW" => Ok(Self::Yellow),
            "GREEN" => Ok(Self::Green),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrgencyRecord {
    pub triage_level: TriageLevel,
    pub recommended_timeframe: String,
    /// 0 to 100.
    pub urgency_score: u8,
}

impl Default for UrgencyRecord {
    /// Used when the flow reports no urgency. Errs toward caution.
    fn default() -> Self {
        Self {
            triage_level: TriageLevel::Yellow,
            recommended_timeframe: "within 24-48 hours".to_string(),
            urgency_score: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosisResult {
    pub report_text: String,
    pub urgency: UrgencyRecord,
    /// Untouched response tree, kept for troubleshooting.
    pub raw_response: RawResponse,
}

// ═══════════════════════════════════════════════════════════
// Seams
// ═══════════════════════════════════════════════════════════

/// Sends a diagnosis request to the remote flow (allows mocking).
#[async_trait]
pub trait DiagnosisTransport: Send + Sync {
    async fn send(
        &self,
        request: &DiagnosisRequest,
        timeout: Duration,
    ) -> Result<RawResponse, GatewayError>;
}

/// Lightweight reachability check used by the health monitor.
#[async_trait]
pub trait StatusProbe: Send + Sync {
    async fn probe(&self) -> Result<(), GatewayError>;
}
