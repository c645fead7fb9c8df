//! The JSON payload shapes a transport layer serves to clients.
//!
//! The service itself returns domain types; this module maps them onto the
//! wire shapes clients expect, and every error onto `{"error", "code"}`
//! plus an HTTP status (`ServiceError::http_status`).

use crate::service::{Identification, RetrainSummary, ServiceError};
use rollcall_core::artifact::ModelArtifact;
use serde::Serialize;

/// Positive identification: `{"studentId": ..., "confidence": ...}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedStudent {
    pub student_id: String,
    pub confidence: f32,
}

impl From<&Identification> for MatchedStudent {
    fn from(id: &Identification) -> Self {
        Self {
            student_id: id.student_id.clone(),
            confidence: id.confidence,
        }
    }
}

/// Error payload: `{"error": <human message>, "code": <stable code>}`.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
}

impl From<&ServiceError> for ErrorBody {
    fn from(err: &ServiceError) -> Self {
        Self {
            error: err.to_string(),
            code: err.code(),
        }
    }
}

/// Completed retrain: `{"success": true}`.
///
/// The per-run counts stay in [`RetrainSummary`] and the logs; the wire
/// shape is just the success flag.
#[derive(Debug, Clone, Serialize)]
pub struct RetrainBody {
    pub success: bool,
}

impl From<&RetrainSummary> for RetrainBody {
    fn from(_: &RetrainSummary) -> Self {
        Self { success: true }
    }
}

/// Published-model metadata for the status surface.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBody {
    pub model_loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trained_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub students: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_len: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format_version: Option<u16>,
}

impl StatusBody {
    pub fn from_artifact(artifact: Option<&ModelArtifact>) -> Self {
        match artifact {
            Some(artifact) => Self {
                model_loaded: true,
                trained_at: Some(artifact.trained_at.to_rfc3339()),
                students: Some(artifact.registry.len()),
                feature_len: Some(artifact.model.feature_len()),
                format_version: Some(artifact.format_version),
            },
            None => Self {
                model_loaded: false,
                trained_at: None,
                students: None,
                feature_len: None,
                format_version: None,
            },
        }
    }
}
