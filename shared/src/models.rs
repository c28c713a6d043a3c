//! Shared request and response envelopes.

use serde::{Deserialize, Serialize};

/// Request payload for the orchestrator endpoint.
///
/// The mobile clients never converged on one field name for the utterance,
/// so `content` also accepts the legacy aliases.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentRequest {
    #[serde(alias = "inputText", alias = "input", alias = "user_input")]
    pub content: Option<String>,
    pub user_id: Option<String>,
    pub current_date: Option<String>,
    /// Older clients send the reference date under `record_date`.
    pub record_date: Option<String>,
}

impl AgentRequest {
    /// Reference date for resolving relative temporal phrases.
    /// `record_date` wins over `current_date` when both are present.
    pub fn reference_date(&self) -> Option<&str> {
        self.record_date.as_deref().or(self.current_date.as_deref())
    }
}

/// Request payload for the image endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageRequest {
    #[serde(alias = "request")]
    pub content: Option<String>,
    pub user_id: Option<String>,
    pub text: Option<String>,
    pub image_base64: Option<String>,
    pub record_date: Option<String>,
}

/// Request payload for the report endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportRequest {
    #[serde(alias = "request")]
    pub content: Option<String>,
    pub user_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub report_id: Option<i64>,
}

/// Request payload for the summarize endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct SummarizeRequest {
    pub content: Option<String>,
    pub temperature: Option<f32>,
}

/// Discriminator for the orchestrator envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeType {
    Answer,
    Data,
    Error,
}

/// Response envelope for the orchestrator endpoint.
///
/// Exactly one of answer / data / error is produced per call; `content` is
/// empty on the data and error branches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEnvelope {
    #[serde(rename = "type")]
    pub envelope_type: EnvelopeType,
    pub content: String,
    pub message: String,
}

impl AgentEnvelope {
    pub fn answer(content: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            envelope_type: EnvelopeType::Answer,
            content: content.into(),
            message: message.into(),
        }
    }

    pub fn data(message: impl Into<String>) -> Self {
        Self {
            envelope_type: EnvelopeType::Data,
            content: String::new(),
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            envelope_type: EnvelopeType::Error,
            content: String::new(),
            message: message.into(),
        }
    }
}

/// Response envelope for the capability endpoints (image, report, summarize).
///
/// `response` is free-form: a plain string for text results, an object for
/// payloads that embed base64 images or reference URLs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CapabilityResponse {
    pub fn success(response: serde_json::Value) -> Self {
        Self {
            success: true,
            response: Some(response),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            response: None,
            error: Some(message.into()),
        }
    }
}
