//! Error types for ragscope
//!
//! Provider failures are classified once, at the transport edge, into
//! transient or fatal kinds. The retry layer and the orchestrator only ever
//! look at the kind, never at transport details.

use crate::agent::state::Stage;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classification of a failed provider call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// Attempt exceeded its timeout (transient)
    Timeout,

    /// Provider asked us to slow down (transient)
    RateLimited,

    /// 5xx-class failure (transient)
    Server,

    /// Could not reach the provider (transient)
    Connection,

    /// Credentials rejected (fatal)
    Auth,

    /// Malformed request, 4xx-class (fatal)
    BadRequest,

    /// Unknown index, deployment or route (fatal)
    NotFound,

    /// Response could not be decoded (fatal)
    Decode,
}

impl ProviderErrorKind {
    /// Whether a call failing with this kind may be retried
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderErrorKind::Timeout
                | ProviderErrorKind::RateLimited
                | ProviderErrorKind::Server
                | ProviderErrorKind::Connection
        )
    }

    /// Classify an HTTP status code
    pub fn from_status(status: u16) -> Self {
        match status {
            408 => ProviderErrorKind::Timeout,
            429 => ProviderErrorKind::RateLimited,
            401 | 403 => ProviderErrorKind::Auth,
            404 => ProviderErrorKind::NotFound,
            500..=599 => ProviderErrorKind::Server,
            _ => ProviderErrorKind::BadRequest,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderErrorKind::Timeout => "timeout",
            ProviderErrorKind::RateLimited => "rate_limited",
            ProviderErrorKind::Server => "server_error",
            ProviderErrorKind::Connection => "connection",
            ProviderErrorKind::Auth => "auth",
            ProviderErrorKind::BadRequest => "bad_request",
            ProviderErrorKind::NotFound => "not_found",
            ProviderErrorKind::Decode => "decode",
        }
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single failed call to an external provider
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{provider} call failed ({kind}): {message}")]
pub struct ProviderError {
    /// Provider name, e.g. "azure_search"
    pub provider: String,

    /// Classified failure kind
    pub kind: ProviderErrorKind,

    /// HTTP status, when the failure came from a response
    pub status: Option<u16>,

    /// Short, provider-agnostic description
    pub message: String,
}

impl ProviderError {
    pub fn new(
        provider: impl Into<String>,
        kind: ProviderErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            kind,
            status: None,
            message: message.into(),
        }
    }

    /// Build from a non-success HTTP status. The response body is
    /// deliberately not carried along.
    pub fn from_status(provider: impl Into<String>, status: u16) -> Self {
        Self {
            provider: provider.into(),
            kind: ProviderErrorKind::from_status(status),
            status: Some(status),
            message: format!("HTTP {}", status),
        }
    }

    /// Build from a transport-level reqwest failure
    pub fn from_transport(provider: impl Into<String>, err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ProviderErrorKind::Timeout
        } else if err.is_decode() {
            ProviderErrorKind::Decode
        } else if let Some(status) = err.status() {
            ProviderErrorKind::from_status(status.as_u16())
        } else {
            ProviderErrorKind::Connection
        };

        Self {
            provider: provider.into(),
            kind,
            status: err.status().map(|s| s.as_u16()),
            message: format!("transport failure ({})", kind),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

/// Main error type for the retrieval and generation core
#[derive(Error, Debug)]
pub enum RagError {
    /// Tool input did not match its declared schema
    #[error("Validation failed for {tool}: field `{field}` {reason}")]
    Validation {
        tool: String,
        field: String,
        reason: String,
    },

    /// Transient failures outlasted the retry policy
    #[error("Retries exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted {
        attempts: u32,
        last_error: ProviderError,
    },

    /// Auth/config failure, never retried
    #[error("Fatal provider error: {0}")]
    FatalProvider(ProviderError),

    /// A search strategy could not produce candidates
    #[error("Search unavailable for {strategy} strategy: {source}")]
    SearchUnavailable {
        strategy: String,
        source: Box<RagError>,
    },

    /// A pipeline stage outlasted its aggregate budget
    #[error("Stage {stage} exceeded its {timeout_ms}ms budget")]
    StageTimeout { stage: Stage, timeout_ms: u64 },

    /// Cancellation observed at a stage boundary
    #[error("Cancelled before stage {stage}")]
    Cancelled { stage: Stage },

    /// Query rejected before any external call
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Unknown trace id
    #[error("Trace not found: {0}")]
    TraceNotFound(String),

    /// Attempted to mutate a sealed trace
    #[error("Trace {0} is sealed")]
    TraceSealed(String),

    /// Lifecycle transition that cannot happen
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// HTTP client construction errors
    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, RagError>;

impl RagError {
    /// The provider error at the bottom of this error, if any
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            RagError::RetryExhausted { last_error, .. } => Some(last_error),
            RagError::FatalProvider(err) => Some(err),
            RagError::SearchUnavailable { source, .. } => source.provider_error(),
            _ => None,
        }
    }

    /// Innermost error beneath any `SearchUnavailable` wrapping
    pub fn root(&self) -> &RagError {
        match self {
            RagError::SearchUnavailable { source, .. } => source.root(),
            other => other,
        }
    }

    /// Short description safe to hand to callers: error kinds and counts
    /// only, no provider messages.
    pub fn public_summary(&self) -> String {
        match self {
            RagError::Validation { tool, field, .. } => {
                format!("invalid input for {} (field `{}`)", tool, field)
            }
            RagError::RetryExhausted { attempts, last_error } => format!(
                "{} unavailable after {} attempts ({})",
                last_error.provider, attempts, last_error.kind
            ),
            RagError::FatalProvider(err) => {
                format!("{} rejected the request ({})", err.provider, err.kind)
            }
            RagError::SearchUnavailable { strategy, source } => {
                format!("{} search unavailable: {}", strategy, source.public_summary())
            }
            RagError::StageTimeout { stage, timeout_ms } => {
                format!("stage {} timed out after {}ms", stage, timeout_ms)
            }
            RagError::Cancelled { stage } => format!("cancelled before {}", stage),
            RagError::InvalidQuery(reason) => format!("invalid query: {}", reason),
            RagError::TraceNotFound(id) => format!("trace {} not found", id),
            RagError::TraceSealed(id) => format!("trace {} is sealed", id),
            RagError::InvalidTransition { from, to } => {
                format!("invalid transition from {} to {}", from, to)
            }
            RagError::ConfigError(_) => "configuration error".to_string(),
            RagError::HttpError(_) => "http client error".to_string(),
            RagError::SerializationError(_) => "serialization error".to_string(),
            RagError::IoError(_) => "i/o error".to_string(),
        }
    }
}

/// Kind of failure reported by `Orchestrator::process`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    QueryError,
    RetrievalError,
    GenerationError,
    StageTimeout,
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::QueryError => "QueryError",
            ErrorKind::RetrievalError => "RetrievalError",
            ErrorKind::GenerationError => "GenerationError",
            ErrorKind::StageTimeout => "StageTimeout",
            ErrorKind::Cancelled => "Cancelled",
        };
        f.write_str(name)
    }
}

/// The single structured error a caller of `process` receives
#[derive(Error, Debug)]
#[error("{kind}: {message} (trace {trace_id})")]
pub struct ProcessError {
    pub kind: ErrorKind,
    pub message: String,
    pub trace_id: String,
    #[source]
    pub cause: RagError,
}

impl ProcessError {
    pub fn new(kind: ErrorKind, trace_id: impl Into<String>, cause: RagError) -> Self {
        Self {
            kind,
            message: cause.public_summary(),
            trace_id: trace_id.into(),
            cause,
        }
    }
}
