//! Error taxonomy shared by every krb crate.

use std::time::Duration;

use crate::Gvr;

/// Failures reported by the object-store boundary.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{kind} \"{name}\" not found")]
    NotFound { kind: String, name: String },
    #[error("{kind} \"{name}\" already exists")]
    AlreadyExists { kind: String, name: String },
    #[error("conflict on {kind} \"{name}\": {reason}")]
    Conflict { kind: String, name: String, reason: String },
    #[error("malformed record: {0}")]
    Malformed(String),
    #[error("transport: {0}")]
    Transport(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// True for both flavours of 409: a taken name and a stale write.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. } | StoreError::Conflict { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }
}

/// Failures of the schema resolver.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("the server doesn't have a resource type \"{name}\"{}", did_you_mean(.suggestion))]
    NotFound { name: String, suggestion: Option<String> },
    #[error("\"{name}\" is ambiguous, candidates: {}", join_gvrs(.candidates))]
    Ambiguous { name: String, candidates: Vec<Gvr> },
    #[error("discovery: {0}")]
    Transport(String),
    #[error("discovery timed out after {0:?}")]
    Timeout(Duration),
}

fn did_you_mean(suggestion: &Option<String>) -> String {
    suggestion.as_deref().map(|s| format!(" (did you mean \"{s}\"?)")).unwrap_or_default()
}

fn join_gvrs(candidates: &[Gvr]) -> String {
    candidates.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(", ")
}

/// Top-level error kinds surfaced by the orchestrators.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum KrbError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("ambiguous resolution for \"{name}\": {}", join_gvrs(.candidates))]
    AmbiguousResolution { name: String, candidates: Vec<Gvr> },
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("transport failure: {0}")]
    TransportFailure(String),
    #[error("gave up creating \"{name}\" after {attempts} conflicting attempts")]
    ExhaustedRetries { name: String, attempts: u32 },
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

pub type KrbResult<T> = Result<T, KrbError>;

impl From<StoreError> for KrbError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { .. } => KrbError::NotFound(e.to_string()),
            StoreError::AlreadyExists { .. } | StoreError::Conflict { .. } => KrbError::Conflict(e.to_string()),
            StoreError::Malformed(m) => KrbError::MalformedPayload(m),
            StoreError::Transport(m) => KrbError::TransportFailure(m),
            StoreError::Timeout(d) => KrbError::Timeout(d),
        }
    }
}

impl From<ResolveError> for KrbError {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::NotFound { .. } => KrbError::NotFound(e.to_string()),
            ResolveError::Ambiguous { name, candidates } => KrbError::AmbiguousResolution { name, candidates },
            ResolveError::Transport(m) => KrbError::TransportFailure(m),
            ResolveError::Timeout(d) => KrbError::Timeout(d),
        }
    }
}

impl From<serde_json::Error> for KrbError {
    fn from(e: serde_json::Error) -> Self {
        KrbError::MalformedPayload(e.to_string())
    }
}
