//! The session store abstraction (spec §C3): a trait plus an in-memory
//! backend and a replicated-KV (etcd) backend.
//!
//! Status transitions are validated by `multisig-session`, not here: the
//! store's job is atomic, durable reads and writes of whatever the
//! session manager computes, not business-rule enforcement.

mod etcd;
mod memory;

pub use etcd::EtcdStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use multisig_common::{
    error::MultisigError,
    types::{CoordinatorMetadata, FrozenTransaction, Participant, ParticipantStatus, Session, SessionStatus, Signature},
};

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: Session) -> Result<(), MultisigError>;

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>, MultisigError>;

    /// Constant-time token check, scoped to a session id (spec §C3,
    /// rate-limiting and auth hardening). Returns `false` for either a
    /// missing session or a mismatched token, never distinguishing the
    /// two to a caller.
    async fn authenticate(&self, session_id: &str, token: &str) -> Result<bool, MultisigError>;

    async fn add_participant(
        &self,
        session_id: &str,
        participant: Participant,
    ) -> Result<Session, MultisigError>;

    async fn set_participant_status(
        &self,
        session_id: &str,
        participant_id: &str,
        status: ParticipantStatus,
    ) -> Result<Session, MultisigError>;

    async fn remove_participant(
        &self,
        session_id: &str,
        participant_id: &str,
    ) -> Result<Session, MultisigError>;

    async fn add_signature(
        &self,
        session_id: &str,
        signature: Signature,
    ) -> Result<Session, MultisigError>;

    async fn inject_transaction(
        &self,
        session_id: &str,
        transaction: FrozenTransaction,
        tx_details: Option<serde_json::Value>,
        metadata: Option<CoordinatorMetadata>,
    ) -> Result<Session, MultisigError>;

    async fn update_status(
        &self,
        session_id: &str,
        status: SessionStatus,
    ) -> Result<Session, MultisigError>;

    async fn delete_session(&self, session_id: &str) -> Result<(), MultisigError>;

    /// All sessions not yet in a terminal status, for the expiry
    /// scheduler to sweep (spec §C7).
    async fn list_active(&self) -> Result<Vec<Session>, MultisigError>;
}
