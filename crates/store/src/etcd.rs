//! Replicated key-value session store backend, backed by etcd.
//!
//! Each session is stored as a single JSON value under
//! `{key_prefix}{session_id}`. Mutations are read-modify-write rather
//! than transactional: acceptable here because a given session is only
//! ever mutated by the coordinator process handling its connections, not
//! concurrently from multiple writers (spec §9 Open Question 4 treats
//! this the same as the in-memory backend's sweep-based cleanup:
//! both are acceptable implementation choices).

use async_trait::async_trait;
use etcd_client::{Client, GetOptions};
use multisig_common::error::{ErrorKind, MultisigError};
use multisig_common::types::{
    CoordinatorMetadata, FrozenTransaction, Participant, ParticipantStatus, Session, SessionStatus,
    Signature,
};
use subtle::ConstantTimeEq;
use tokio::sync::Mutex;

use crate::SessionStore;

pub struct EtcdStore {
    client: Mutex<Client>,
    key_prefix: String,
}

impl EtcdStore {
    pub async fn connect(endpoints: &[String], key_prefix: impl Into<String>) -> Result<Self, MultisigError> {
        let client = Client::connect(endpoints, None)
            .await
            .map_err(|e| MultisigError::Storage(format!("etcd connect failed: {e}")))?;
        Ok(Self {
            client: Mutex::new(client),
            key_prefix: key_prefix.into(),
        })
    }

    fn key(&self, session_id: &str) -> String {
        format!("{}{}", self.key_prefix, session_id)
    }

    fn not_found(session_id: &str) -> MultisigError {
        MultisigError::new(ErrorKind::NotFound, format!("session {session_id} not found"))
    }

    async fn fetch(&self, session_id: &str) -> Result<Option<Session>, MultisigError> {
        let mut client = self.client.lock().await;
        let resp = client
            .get(self.key(session_id), None)
            .await
            .map_err(|e| MultisigError::Storage(e.to_string()))?;
        match resp.kvs().first() {
            Some(kv) => {
                let session = serde_json::from_slice(kv.value())
                    .map_err(|e| MultisigError::Storage(format!("corrupt session record: {e}")))?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    async fn store(&self, session: &Session) -> Result<(), MultisigError> {
        let value = serde_json::to_vec(session)
            .map_err(|e| MultisigError::Storage(format!("session serialization failed: {e}")))?;
        let mut client = self.client.lock().await;
        client
            .put(self.key(&session.session_id), value, None)
            .await
            .map_err(|e| MultisigError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn mutate<F>(&self, session_id: &str, f: F) -> Result<Session, MultisigError>
    where
        F: FnOnce(&mut Session) -> Result<(), MultisigError>,
    {
        let mut session = self
            .fetch(session_id)
            .await?
            .ok_or_else(|| Self::not_found(session_id))?;
        f(&mut session)?;
        session.recompute_stats();
        self.store(&session).await?;
        Ok(session)
    }
}

#[async_trait]
impl SessionStore for EtcdStore {
    async fn create_session(&self, session: Session) -> Result<(), MultisigError> {
        self.store(&session).await
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>, MultisigError> {
        self.fetch(session_id).await
    }

    async fn authenticate(&self, session_id: &str, token: &str) -> Result<bool, MultisigError> {
        Ok(match self.fetch(session_id).await? {
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
        self.mutate(session_id, |session| {
            session
                .participants
                .insert(participant.participant_id.clone(), participant);
            Ok(())
        })
        .await
    }

    async fn set_participant_status(
        &self,
        session_id: &str,
        participant_id: &str,
        status: ParticipantStatus,
    ) -> Result<Session, MultisigError> {
        self.mutate(session_id, |session| {
            let participant = session.participants.get_mut(participant_id).ok_or_else(|| {
                MultisigError::new(ErrorKind::NotFound, "participant not found in session")
            })?;
            participant.status = status;
            if status == ParticipantStatus::Ready {
                participant.ready_at = Some(chrono::Utc::now());
            }
            Ok(())
        })
        .await
    }

    async fn remove_participant(
        &self,
        session_id: &str,
        participant_id: &str,
    ) -> Result<Session, MultisigError> {
        self.mutate(session_id, |session| {
            session.participants.remove(participant_id);
            Ok(())
        })
        .await
    }

    async fn add_signature(
        &self,
        session_id: &str,
        signature: Signature,
    ) -> Result<Session, MultisigError> {
        self.mutate(session_id, |session| {
            session
                .signatures
                .insert(signature.public_key.clone(), signature);
            Ok(())
        })
        .await
    }

    async fn inject_transaction(
        &self,
        session_id: &str,
        transaction: FrozenTransaction,
        tx_details: Option<serde_json::Value>,
        metadata: Option<CoordinatorMetadata>,
    ) -> Result<Session, MultisigError> {
        self.mutate(session_id, |session| {
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
        .await
    }

    async fn update_status(
        &self,
        session_id: &str,
        status: SessionStatus,
    ) -> Result<Session, MultisigError> {
        self.mutate(session_id, |session| {
            session.status = status;
            Ok(())
        })
        .await
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), MultisigError> {
        let mut client = self.client.lock().await;
        client
            .delete(self.key(session_id), None)
            .await
            .map_err(|e| MultisigError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<Session>, MultisigError> {
        let mut client = self.client.lock().await;
        let resp = client
            .get(self.key_prefix.clone(), Some(GetOptions::new().with_prefix()))
            .await
            .map_err(|e| MultisigError::Storage(e.to_string()))?;
        resp.kvs()
            .iter()
            .map(|kv| {
                serde_json::from_slice::<Session>(kv.value())
                    .map_err(|e| MultisigError::Storage(format!("corrupt session record: {e}")))
            })
            .filter(|s| !matches!(s, Ok(session) if session.status.is_terminal()))
            .collect()
    }
}
