//! Shared domain types for the threshold multisig coordination workspace.
//!
//! This crate has no tokio or axum dependency: it is the pure data model
//! shared between the session store, the session manager, the wire server,
//! and the signing client.

pub mod config;
pub mod error;
pub mod ids;
pub mod types;

pub use config::Config;
pub use error::{ErrorKind, MultisigError};
pub use types::{
    CoordinatorMetadata, FrozenTransaction, Participant, ParticipantStatus, Session,
    SessionStats, SessionStatus, Signature, SignatureMaterial,
};
