//! The session manager (spec §C4): composes crypto verification, the
//! session store, and metadata sanitization into the coordinator's
//! lifecycle operations.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use multisig_common::config::Config;
use multisig_common::error::{ErrorKind, MultisigError};
use multisig_common::ids;
use multisig_common::types::{
    FrozenTransaction, Participant, ParticipantStatus, Session, SessionStats, SessionStatus,
    Signature, SignatureMaterial,
};
use multisig_crypto as crypto;
use multisig_store::SessionStore;
use multisig_wire::CoordinatorMetadataInput;
use serde_json::Value;

use crate::executor::TransactionExecutor;
use crate::metadata;
use crate::transitions;

pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    executor: Arc<dyn TransactionExecutor>,
    config: Config,
}

/// Outcome of a signature submission: the updated session plus whether
/// this submission is the one that crossed the threshold.
pub struct SubmissionOutcome {
    pub session: Session,
    pub threshold_just_met: bool,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        executor: Arc<dyn TransactionExecutor>,
        config: Config,
    ) -> Self {
        Self {
            store,
            executor,
            config,
        }
    }

    fn invalid_state(context: impl Into<String>) -> MultisigError {
        MultisigError::new(ErrorKind::InvalidState, context)
    }

    async fn fetch(&self, session_id: &str) -> Result<Session, MultisigError> {
        self.store
            .get_session(session_id)
            .await?
            .ok_or_else(|| MultisigError::new(ErrorKind::NotFound, "session not found"))
    }

    /// Create a new session in `waiting`, generating its id and token
    /// (spec §3). `eligible_keys` is normalized on the way in so later
    /// equality checks never depend on a participant's key casing or
    /// `0x` usage.
    pub async fn create_session(
        &self,
        threshold: u32,
        eligible_keys: HashSet<String>,
        expected_participants: u32,
    ) -> Result<Session, MultisigError> {
        let normalized: HashSet<String> = eligible_keys
            .iter()
            .map(|k| crypto::normalize_public_key(k))
            .collect();

        let now = Utc::now();
        let session = Session {
            session_id: ids::generate_session_id(),
            token: ids::generate_token(),
            threshold,
            eligible_keys: normalized,
            expected_participants,
            frozen_transaction: None,
            tx_details: None,
            coordinator_metadata: None,
            status: SessionStatus::Waiting,
            created_at: now,
            expires_at: now + Duration::milliseconds(self.config.session_timeout_ms as i64),
            transaction_expires_at: None,
            participants: Default::default(),
            signatures: Default::default(),
            stats: SessionStats {
                signatures_required: threshold,
                ..Default::default()
            },
        };

        self.store.create_session(session.clone()).await?;
        Ok(session)
    }

    pub async fn authenticate(&self, session_id: &str, token: &str) -> Result<bool, MultisigError> {
        self.store.authenticate(session_id, token).await
    }

    /// Fetch a session snapshot without registering a participant. Used
    /// for a coordinator's `AUTH_SUCCESS` response, since a coordinator
    /// connection doesn't occupy a participant slot.
    pub async fn get_session(&self, session_id: &str) -> Result<Session, MultisigError> {
        self.fetch(session_id).await
    }

    pub async fn add_participant(
        &self,
        session_id: &str,
        label: Option<String>,
    ) -> Result<(Session, String), MultisigError> {
        let participant_id = ids::generate_participant_id();
        let session = self
            .store
            .add_participant(session_id, Participant::new(participant_id.clone(), label))
            .await?;
        Ok((session, participant_id))
    }

    pub async fn set_participant_ready(
        &self,
        session_id: &str,
        participant_id: &str,
    ) -> Result<Session, MultisigError> {
        self.store
            .set_participant_status(session_id, participant_id, ParticipantStatus::Ready)
            .await
    }

    /// Record a participant's self-reported status (spec §4.5
    /// `STATUS_UPDATE`), e.g. `reviewing` while a signer inspects a
    /// transaction before deciding whether to sign.
    pub async fn set_participant_status(
        &self,
        session_id: &str,
        participant_id: &str,
        status: ParticipantStatus,
    ) -> Result<Session, MultisigError> {
        self.store
            .set_participant_status(session_id, participant_id, status)
            .await
    }

    pub async fn remove_participant(
        &self,
        session_id: &str,
        participant_id: &str,
    ) -> Result<Session, MultisigError> {
        self.store.remove_participant(session_id, participant_id).await
    }

    /// Record that a participant declined to sign. This does not move
    /// the session itself out of `signing`/`transaction_received`: a
    /// rejection from one signer doesn't prevent the remaining eligible
    /// signers from still reaching threshold.
    pub async fn reject_transaction(
        &self,
        session_id: &str,
        participant_id: &str,
    ) -> Result<Session, MultisigError> {
        self.store
            .set_participant_status(session_id, participant_id, ParticipantStatus::Rejected)
            .await
    }

    /// Freeze a coordinator-supplied transaction onto the session (spec
    /// §4.2). Legal from `waiting` or `transaction_expired`; a second
    /// injection while already `transaction_received`/`signing` is
    /// rejected rather than silently replacing in-flight signatures.
    pub async fn inject_transaction(
        &self,
        session_id: &str,
        bytes: Vec<u8>,
        tx_details: Option<Value>,
        metadata_input: Option<CoordinatorMetadataInput>,
    ) -> Result<Session, MultisigError> {
        let session = self.fetch(session_id).await?;
        let now = Utc::now();

        if now > session.expires_at {
            return Err(MultisigError::new(ErrorKind::SessionExpired, "session ttl elapsed"));
        }
        if !transitions::is_legal(session.status, SessionStatus::TransactionReceived) {
            return Err(Self::invalid_state(format!(
                "cannot inject a transaction while session is {:?}",
                session.status
            )));
        }

        let hash = crypto::sha256(&bytes);
        let frozen = FrozenTransaction::freeze(
            bytes,
            hash,
            now,
            Duration::milliseconds(self.config.transaction_validity_ms() as i64),
        );
        let sanitized_metadata = metadata::sanitize(metadata_input);

        self.store
            .inject_transaction(session_id, frozen, tx_details, sanitized_metadata)
            .await?;
        self.store
            .update_status(session_id, SessionStatus::TransactionReceived)
            .await
    }

    /// Admit a signature submission (spec §4.2 six-step pipeline):
    /// session/state validity, eligibility, duplicate check, key/signature
    /// parsing, cryptographic verification, then storage. Nothing is
    /// persisted until verification has already succeeded (invariant I5).
    pub async fn submit_signature(
        &self,
        session_id: &str,
        participant_id: &str,
        public_key_input: &str,
        signature_input: &str,
    ) -> Result<SubmissionOutcome, MultisigError> {
        let session = self.fetch(session_id).await?;
        let now = Utc::now();

        if now > session.expires_at {
            return Err(MultisigError::new(ErrorKind::SessionExpired, "session ttl elapsed"));
        }
        if !matches!(
            session.status,
            SessionStatus::TransactionReceived | SessionStatus::Signing
        ) {
            return Err(Self::invalid_state(format!(
                "cannot submit a signature while session is {:?}",
                session.status
            )));
        }
        let frozen = session
            .frozen_transaction
            .as_ref()
            .ok_or_else(|| Self::invalid_state("no transaction has been frozen yet"))?;
        frozen.validate_not_expired(now)?;

        let normalized_key = crypto::normalize_public_key(public_key_input);
        if !session.eligible_keys.contains(&normalized_key) {
            return Err(MultisigError::new(
                ErrorKind::NotEligible,
                "public key is not in this session's eligible set",
            ));
        }
        if session.signatures.contains_key(&normalized_key) {
            return Err(MultisigError::new(
                ErrorKind::DuplicateSignature,
                "this public key has already signed",
            ));
        }

        let key = crypto::parse_public_key(&normalized_key)
            .map_err(|_| MultisigError::new(ErrorKind::InvalidKeyFormat, "unparseable public key"))?;
        let parsed_signature = crypto::parse_signature(&key, signature_input)
            .map_err(|_| MultisigError::new(ErrorKind::InvalidSignatureFormat, "unparseable signature"))?;
        crypto::verify(&key, &frozen.bytes, &parsed_signature)
            .map_err(|_| MultisigError::new(ErrorKind::VerificationFailed, "signature did not verify"))?;

        let material = SignatureMaterial::Single(signature_bytes(signature_input)?);
        let signature = Signature {
            public_key: normalized_key,
            material,
            participant_id: participant_id.to_string(),
            submitted_at: now,
        };

        let was_below_threshold = (session.signatures.len() as u32) < session.threshold;
        let updated = self.store.add_signature(session_id, signature).await?;
        let updated = self
            .store
            .set_participant_status(session_id, participant_id, ParticipantStatus::Signed)
            .await?;
        let threshold_just_met =
            was_below_threshold && (updated.signatures.len() as u32) >= updated.threshold;

        let updated = if session.status == SessionStatus::TransactionReceived {
            self.store
                .update_status(session_id, SessionStatus::Signing)
                .await?
        } else {
            updated
        };

        Ok(SubmissionOutcome {
            session: updated,
            threshold_just_met,
        })
    }

    /// Execute a session whose threshold has been met (spec §4.2, §4.3,
    /// §4.4). On submission failure the session reverts from `executing`
    /// back to `signing` rather than being stuck `executing`: the
    /// coordinator is free to retry execution or collect more signatures.
    pub async fn execute(&self, session_id: &str) -> Result<Session, MultisigError> {
        let session = self.fetch(session_id).await?;
        let now = Utc::now();

        if !session.is_executable(now) {
            return Err(Self::invalid_state(
                "session is not executable: threshold unmet, transaction missing, or expired",
            ));
        }

        let session = self
            .store
            .update_status(session_id, SessionStatus::Executing)
            .await?;

        let frozen = session
            .frozen_transaction
            .as_ref()
            .expect("is_executable verified frozen_transaction is present");
        if let Err(e) = self.executor.submit(frozen).await {
            self.store
                .update_status(session_id, SessionStatus::Signing)
                .await?;
            return Err(MultisigError::new(ErrorKind::SubmissionFailure, e));
        }

        self.store
            .update_status(session_id, SessionStatus::Completed)
            .await
    }

    pub async fn cancel_session(&self, session_id: &str) -> Result<Session, MultisigError> {
        let session = self.fetch(session_id).await?;
        if session.status.is_terminal() {
            return Err(Self::invalid_state("session is already in a terminal state"));
        }
        self.store
            .update_status(session_id, SessionStatus::Cancelled)
            .await
    }

    /// One scheduler tick (spec §C7): expire sessions whose TTL has
    /// elapsed, expire frozen transactions whose validity window has
    /// elapsed (without touching the session TTL), and delete terminal
    /// sessions past their retention window.
    pub async fn sweep(&self, now: chrono::DateTime<Utc>) -> Result<(), MultisigError> {
        for session in self.store.list_active().await? {
            if now > session.expires_at {
                self.store
                    .update_status(&session.session_id, SessionStatus::Expired)
                    .await?;
                continue;
            }
            if let Some(tx_expires_at) = session.transaction_expires_at {
                if now > tx_expires_at
                    && matches!(
                        session.status,
                        SessionStatus::TransactionReceived | SessionStatus::Signing
                    )
                {
                    self.store
                        .update_status(&session.session_id, SessionStatus::TransactionExpired)
                        .await?;
                }
            }
        }
        Ok(())
    }
}

fn signature_bytes(input: &str) -> Result<Vec<u8>, MultisigError> {
    let trimmed = input.strip_prefix("0x").unwrap_or(input);
    hex::decode(trimmed)
        .or_else(|_| {
            use base64::Engine;
            base64::engine::general_purpose::STANDARD.decode(input)
        })
        .map_err(|_| MultisigError::new(ErrorKind::InvalidSignatureFormat, "unparseable signature bytes"))
}
