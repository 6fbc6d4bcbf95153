//! Error kinds surfaced across the session lifecycle.
//!
//! These map directly onto the wire-level failure messages
//! (`AUTH_FAILED`, `SIGNATURE_REJECTED`, `INJECTION_FAILED`,
//! `EXECUTION_FAILED`, generic `ERROR`) described in spec §7.

use thiserror::Error;

/// A classified failure reason, stable across the wire boundary.
///
/// Variants are intentionally data-light: anything sensitive (key
/// material, full signatures) must never be embedded here, since these
/// are serialized back to clients and written to the audit log.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    #[error("session id or token did not match")]
    InvalidSessionOrToken,

    #[error("too many failed attempts from this source")]
    RateLimited,

    #[error("public key is not in the eligible set for this session")]
    NotEligible,

    #[error("this public key has already submitted a signature")]
    DuplicateSignature,

    #[error("public key could not be parsed")]
    InvalidKeyFormat,

    #[error("signature could not be parsed")]
    InvalidSignatureFormat,

    #[error("signature does not verify against the frozen transaction bytes")]
    VerificationFailed,

    #[error("operation is not valid in the session's current state")]
    InvalidState,

    #[error("the frozen transaction has passed its validity window")]
    TransactionExpired,

    #[error("the session has passed its time-to-live")]
    SessionExpired,

    #[error("fewer than the required threshold of signatures have been collected")]
    InsufficientSignatures,

    #[error("the ledger submission layer rejected the transaction")]
    SubmissionFailure,

    #[error("session was not found")]
    NotFound,
}

/// Top-level error type for fallible operations in `multisig-session` and
/// `multisig-store`. Distinct from [`ErrorKind`]: this carries enough
/// context for logging, while `ErrorKind` is the wire-safe classification.
#[derive(Debug, Error)]
pub enum MultisigError {
    #[error("{kind}: {context}")]
    Classified { kind: ErrorKind, context: String },

    #[error("storage backend error: {0}")]
    Storage(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl MultisigError {
    pub fn new(kind: ErrorKind, context: impl Into<String>) -> Self {
        Self::Classified {
            kind,
            context: context.into(),
        }
    }

    /// The wire-safe classification, if this error has one.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Classified { kind, .. } => Some(kind.clone()),
            _ => None,
        }
    }
}
