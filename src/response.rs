// VecUpload — response.rs
// Response shapes returned by the index service and the classifier that tells
// a service-level error apart from a success payload.
// Author: d65v <https://github.com/d65v>

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{Result, UploadError};

// ── Service Error Shape ───────────────────────────────────────────────────────

/// Error payload the service returns instead of a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceError {
    pub code: i64,
    pub message: String,
    pub details: Vec<ErrorDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetail {
    pub type_url: String,
    pub value: String,
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "code {}: {}", self.code, self.message)?;
        for d in &self.details {
            write!(f, " [{}: {}]", d.type_url, d.value)?;
        }
        Ok(())
    }
}

// ── Success Shapes ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertResponse {
    pub upserted_count: u64,
}

/// A single nearest-neighbour hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub values: Option<Vec<f32>>,
    #[serde(default)]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub namespace: String,
    pub matches: Vec<Match>,
}

// ── Classification ────────────────────────────────────────────────────────────

/// What a well-formed response turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Success(T),
    Failed(ServiceError),
}

pub type UpsertOutcome = Outcome<UpsertResponse>;
pub type QueryOutcome = Outcome<QueryResponse>;

impl<T> Outcome<T> {
    /// Collapse into the crate result, turning a service error into `UploadError::Service`.
    pub fn into_result(self) -> Result<T> {
        match self {
            Outcome::Success(v) => Ok(v),
            Outcome::Failed(e) => Err(UploadError::Service(e)),
        }
    }
}

/// Classify raw response bytes.
///
/// The two shapes carry no discriminator, so the error shape is always tried
/// first; a body that satisfies both is an error. Bytes matching neither
/// (including non-JSON) become `UploadError::ResponseFormat` with the raw text.
pub fn classify<T: DeserializeOwned>(raw: &[u8]) -> Result<Outcome<T>> {
    let value: serde_json::Value = match serde_json::from_slice(raw) {
        Ok(v) => v,
        Err(e) => {
            log::debug!("response is not JSON: {}", e);
            return Err(format_error(raw));
        }
    };

    if let Ok(err) = ServiceError::deserialize(&value) {
        return Ok(Outcome::Failed(err));
    }

    match T::deserialize(&value) {
        Ok(v) => Ok(Outcome::Success(v)),
        Err(e) => {
            log::debug!("response matches neither shape: {}", e);
            Err(format_error(raw))
        }
    }
}

fn format_error(raw: &[u8]) -> UploadError {
    UploadError::ResponseFormat {
        raw: String::from_utf8_lossy(raw).into_owned(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
