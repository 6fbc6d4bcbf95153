//! In-memory session store backend, grounded on the `RwLock<HashMap<..>>`
//! pattern used for single-process session state in the workspace's node
//! crate. Suitable for a single-instance deployment; state does not
//! survive a process restart.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use multisig_common::error::{ErrorKind, MultisigError};
use multisig_common::types::{
    CoordinatorMetadata, FrozenTransaction, Participant, ParticipantStatus, Session, SessionStatus,
    Signature,
};
use subtle::ConstantTimeEq;

use crate::SessionStore;

#[derive(Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn not_found(session_id: &str) -> MultisigError {
        MultisigError::new(ErrorKind::NotFound, format!("session {session_id} not found"))
    }

    fn with_session_mut<F>(&self, session_id: &str, f: F) -> Result<Session, MultisigError>
    where
        F: FnOnce(&mut Session) -> Result<(), MultisigError>,
    {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|e| MultisigError::Storage(e.to_string()))?;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| Self::not_found(session_id))?;
        f(session)?;
        session.recompute_stats();
        Ok(session.clone())
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, session: Session) -> Result<(), MultisigError> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|e| MultisigError::Storage(e.to_string()))?;
        sessions.insert(session.session_id.clone(), session);
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>, MultisigError> {
        let sessions = self
            .sessions
            .read()
            .map_err(|e| MultisigError::Storage(e.to_string()))?;
        Ok(sessions.get(session_id).cloned())
    }

    async fn authenticate(&self, session_id: &str, token: &str) -> Result<bool, MultisigError> {
        let sessions = self
            .sessions
            .read()
            .map_err(|e| MultisigError::Storage(e.to_string()))?;
        Ok(match sessions.get(session_id) {
            Some(session) if !session.status.is_terminal() => {
                session.token.as_bytes().ct_eq(token.as_bytes()).into()
            }
            _ => false,
        })
    }

    async fn add_participant(
        &self,
        session_id: &str,
        participant: Participant,
    ) -> Result<Session, MultisigError> {
        self.with_session_mut(session_id, |session| {
            session
                .participants
                .insert(participant.participant_id.clone(), participant);
            Ok(())
        })
    }

    async fn set_participant_status(
        &self,
        session_id: &str,
        participant_id: &str,
        status: ParticipantStatus,
    ) -> Result<Session, MultisigError> {
        self.with_session_mut(session_id, |session| {
            let participant = session.participants.get_mut(participant_id).ok_or_else(|| {
                MultisigError::new(ErrorKind::NotFound, "participant not found in session")
            })?;
            participant.status = status;
            if status == ParticipantStatus::Ready {
                participant.ready_at = Some(chrono::Utc::now());
            }
            Ok(())
        })
    }

    async fn remove_participant(
        &self,
        session_id: &str,
        participant_id: &str,
    ) -> Result<Session, MultisigError> {
        self.with_session_mut(session_id, |session| {
            session.participants.remove(participant_id);
            Ok(())
        })
    }

    async fn add_signature(
        &self,
        session_id: &str,
        signature: Signature,
    ) -> Result<Session, MultisigError> {
        self.with_session_mut(session_id, |session| {
            session
                .signatures
                .insert(signature.public_key.clone(), signature);
            Ok(())
        })
    }

    async fn inject_transaction(
        &self,
        session_id: &str,
        transaction: FrozenTransaction,
        tx_details: Option<serde_json::Value>,
        metadata: Option<CoordinatorMetadata>,
    ) -> Result<Session, MultisigError> {
        self.with_session_mut(session_id, |session| {
            // A fresh injection supersedes whatever was frozen before: any
            // signatures collected so far were verified against the old
            // bytes and cannot carry over to the new transaction.
            session.signatures.clear();
            for participant in session.participants.values_mut() {
                if participant.status == ParticipantStatus::Signed {
                    participant.status = ParticipantStatus::Connected;
                }
            }
            session.transaction_expires_at = Some(transaction.expires_at);
            session.frozen_transaction = Some(transaction);
            session.tx_details = tx_details;
            session.coordinator_metadata = metadata;
            Ok(())
        })
    }

    async fn update_status(
        &self,
        session_id: &str,
        status: SessionStatus,
    ) -> Result<Session, MultisigError> {
        self.with_session_mut(session_id, |session| {
            session.status = status;
            Ok(())
        })
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), MultisigError> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|e| MultisigError::Storage(e.to_string()))?;
        sessions.remove(session_id);
        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<Session>, MultisigError> {
        let sessions = self
            .sessions
            .read()
            .map_err(|e| MultisigError::Storage(e.to_string()))?;
        Ok(sessions
            .values()
            .filter(|s| !s.status.is_terminal())
            .cloned()
            .collect())
    }
}
