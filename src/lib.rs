// VecUpload — lib.rs
// Public API, error types, connection config, re-exports.
// Author: d65v <https://github.com/d65v>

pub mod client;
pub mod processing;
pub mod record;
pub mod response;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::client::{HttpTransport, PineconeClient, Query, Transport, VectorRecord};
pub use crate::processing::{
    BatchAccumulator, BatchReport, IdSource, Partition, Projector, UploadSummary, Uploader,
    BATCH_SIZE,
};
pub use crate::record::{Record, RecordReader};
pub use crate::response::{
    classify, ErrorDetail, Match, Outcome, QueryResponse, ServiceError, UpsertOutcome,
    UpsertResponse,
};

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Decode error on input line {line}: {source}")]
    Decode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Input error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Service error: {0}")]
    Service(ServiceError),

    #[error("Unrecognised response from service: {raw}")]
    ResponseFormat { raw: String },
}

pub type Result<T> = std::result::Result<T, UploadError>;

// ── Config ────────────────────────────────────────────────────────────────────

pub const ENV_API_KEY: &str = "PINECONE_API_KEY";
pub const ENV_PROJECT: &str = "PINECONE_PROJECT";
pub const ENV_INDEX: &str = "PINECONE_INDEX";
pub const ENV_ENVIRONMENT: &str = "PINECONE_ENVIRONMENT";
pub const ENV_HOST: &str = "PINECONE_HOST";

/// Everything needed to address one Pinecone index.
/// Read-only for the lifetime of the process.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub api_key: String,
    pub project: String,
    pub index: String,
    pub environment: String,
    /// Full base URL, replaces the derived `{index}-{project}.svc.{environment}` host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

// Keep the key out of logs.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"<redacted>")
            .field("project", &self.project)
            .field("index", &self.index)
            .field("environment", &self.environment)
            .field("host", &self.host)
            .finish()
    }
}

/// Values supplied explicitly (e.g. from CLI flags). `None` falls back to
/// the matching environment variable.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub api_key: Option<String>,
    pub project: Option<String>,
    pub index: Option<String>,
    pub environment: Option<String>,
    pub host: Option<String>,
}

impl Config {
    /// Load config from environment variables only.
    ///
    /// # Errors
    /// Returns `UploadError::Config` naming the first missing variable.
    pub fn from_env() -> Result<Self> {
        Self::resolve(ConfigOverrides::default())
    }

    /// Explicit values first, then the process environment.
    pub fn resolve(overrides: ConfigOverrides) -> Result<Self> {
        Self::resolve_with(overrides, |key| std::env::var(key).ok())
    }

    /// Same as [`Config::resolve`] with a pluggable variable lookup.
    pub fn resolve_with<F>(overrides: ConfigOverrides, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |explicit: Option<String>, key: &str| -> Option<String> {
            explicit
                .filter(|v| !v.trim().is_empty())
                .or_else(|| lookup(key).filter(|v| !v.trim().is_empty()))
                .map(|v| v.trim().to_string())
        };
        let required = |explicit: Option<String>, key: &str, what: &str| -> Result<String> {
            pick(explicit, key).ok_or_else(|| {
                UploadError::Config(format!("missing {} (set --{} or {})", what, what, key))
            })
        };

        Ok(Self {
            api_key: required(overrides.api_key, ENV_API_KEY, "api-key")?,
            project: required(overrides.project, ENV_PROJECT, "project")?,
            index: required(overrides.index, ENV_INDEX, "index")?,
            environment: required(overrides.environment, ENV_ENVIRONMENT, "environment")?,
            host: pick(overrides.host, ENV_HOST),
        })
    }

    /// Base URL of the index data plane, without a trailing slash.
    pub fn endpoint(&self) -> String {
        match &self.host {
            Some(host) if host.starts_with("http://") || host.starts_with("https://") => {
                host.trim_end_matches('/').to_string()
            }
            Some(host) => format!("https://{}", host.trim_end_matches('/')),
            None => format!(
                "https://{}-{}.svc.{}.pinecone.io",
                self.index, self.project, self.environment
            ),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn full_env() -> impl Fn(&str) -> Option<String> {
        env_of(&[
            (ENV_API_KEY, "key-123"),
            (ENV_PROJECT, "abc1234"),
            (ENV_INDEX, "symbols"),
            (ENV_ENVIRONMENT, "us-east1-gcp"),
        ])
    }

    #[test]
    fn test_resolve_from_env() {
        let cfg = Config::resolve_with(ConfigOverrides::default(), full_env()).unwrap();
        assert_eq!(cfg.api_key, "key-123");
        assert_eq!(cfg.index, "symbols");
        assert_eq!(cfg.host, None);
    }

    #[test]
    fn test_explicit_value_wins() {
        let overrides = ConfigOverrides {
            index: Some("other".into()),
            ..Default::default()
        };
        let cfg = Config::resolve_with(overrides, full_env()).unwrap();
        assert_eq!(cfg.index, "other");
        assert_eq!(cfg.project, "abc1234");
    }

    #[test]
    fn test_missing_value_is_config_error() {
        let lookup = env_of(&[
            (ENV_API_KEY, "key-123"),
            (ENV_PROJECT, "abc1234"),
            (ENV_ENVIRONMENT, "us-east1-gcp"),
        ]);
        let err = Config::resolve_with(ConfigOverrides::default(), lookup).unwrap_err();
        assert!(matches!(err, UploadError::Config(_)));
        assert!(err.to_string().contains(ENV_INDEX));
    }

    #[test]
    fn test_blank_value_counts_as_missing() {
        let overrides = ConfigOverrides {
            api_key: Some("   ".into()),
            ..Default::default()
        };
        let lookup = env_of(&[
            (ENV_PROJECT, "abc1234"),
            (ENV_INDEX, "symbols"),
            (ENV_ENVIRONMENT, "us-east1-gcp"),
        ]);
        let err = Config::resolve_with(overrides, lookup).unwrap_err();
        assert!(err.to_string().contains(ENV_API_KEY));
    }

    #[test]
    fn test_derived_endpoint() {
        let cfg = Config::resolve_with(ConfigOverrides::default(), full_env()).unwrap();
        assert_eq!(
            cfg.endpoint(),
            "https://symbols-abc1234.svc.us-east1-gcp.pinecone.io"
        );
    }

    #[test]
    fn test_host_override_endpoint() {
        let mut cfg = Config::resolve_with(ConfigOverrides::default(), full_env()).unwrap();
        cfg.host = Some("symbols-xyz.svc.aped-4627.pinecone.io/".into());
        assert_eq!(cfg.endpoint(), "https://symbols-xyz.svc.aped-4627.pinecone.io");
        cfg.host = Some("http://127.0.0.1:8080".into());
        assert_eq!(cfg.endpoint(), "http://127.0.0.1:8080");
    }

    #[test]
    fn test_config_from_json() {
        let cfg: Config = serde_json::from_str(
            r#"{"apiKey":"k","project":"p","index":"i","environment":"e"}"#,
        )
        .unwrap();
        assert_eq!(
            cfg,
            Config {
                api_key: "k".into(),
                project: "p".into(),
                index: "i".into(),
                environment: "e".into(),
                host: None,
            }
        );
    }

    #[test]
    fn test_debug_redacts_key() {
        let cfg = Config::resolve_with(ConfigOverrides::default(), full_env()).unwrap();
        let shown = format!("{:?}", cfg);
        assert!(!shown.contains("key-123"));
        assert!(shown.contains("symbols"));
    }
}
