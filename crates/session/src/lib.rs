//! Session lifecycle management (spec §C4): the state machine, signature
//! admission pipeline, and metadata sanitization that sit between the
//! wire server and the session store.

pub mod executor;
pub mod manager;
pub mod metadata;
pub mod transitions;

pub use executor::{NoopExecutor, TransactionExecutor};
pub use manager::{SessionManager, SubmissionOutcome};

#[cfg(test)]
mod integration_tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use ed25519_dalek::{Signer, SigningKey};
    use multisig_common::config::Config;
    use multisig_common::error::ErrorKind;
    use multisig_store::MemoryStore;

    use super::*;

    fn manager() -> SessionManager {
        SessionManager::new(
            Arc::new(MemoryStore::new()),
            Arc::new(NoopExecutor),
            Config::default(),
        )
    }

    fn keypair() -> SigningKey {
        SigningKey::generate(&mut rand::rngs::OsRng)
    }

    #[tokio::test]
    async fn full_lifecycle_reaches_completed() {
        let mgr = manager();
        let key = keypair();
        let pubkey_hex = hex::encode(key.verifying_key().as_bytes());

        let mut eligible = HashSet::new();
        eligible.insert(pubkey_hex.clone());
        let session = mgr.create_session(1, eligible, 1).await.unwrap();

        let (_, participant_id) = mgr.add_participant(&session.session_id, None).await.unwrap();

        let tx_bytes = b"serialized transaction payload".to_vec();
        mgr.inject_transaction(&session.session_id, tx_bytes.clone(), None, None)
            .await
            .unwrap();

        let signature = key.sign(&tx_bytes);
        let outcome = mgr
            .submit_signature(
                &session.session_id,
                &participant_id,
                &pubkey_hex,
                &hex::encode(signature.to_bytes()),
            )
            .await
            .unwrap();
        assert!(outcome.threshold_just_met);

        let completed = mgr.execute(&session.session_id).await.unwrap();
        assert_eq!(completed.status, multisig_common::types::SessionStatus::Completed);
    }

    #[tokio::test]
    async fn signature_from_ineligible_key_is_rejected() {
        let mgr = manager();
        let eligible_key = keypair();
        let outsider_key = keypair();
        let mut eligible = HashSet::new();
        eligible.insert(hex::encode(eligible_key.verifying_key().as_bytes()));
        let session = mgr.create_session(1, eligible, 1).await.unwrap();
        let (_, participant_id) = mgr.add_participant(&session.session_id, None).await.unwrap();

        let tx_bytes = b"payload".to_vec();
        mgr.inject_transaction(&session.session_id, tx_bytes.clone(), None, None)
            .await
            .unwrap();

        let signature = outsider_key.sign(&tx_bytes);
        let err = mgr
            .submit_signature(
                &session.session_id,
                &participant_id,
                &hex::encode(outsider_key.verifying_key().as_bytes()),
                &hex::encode(signature.to_bytes()),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::NotEligible));
    }

    #[tokio::test]
    async fn duplicate_signature_from_same_key_is_rejected() {
        let mgr = manager();
        let key = keypair();
        let pubkey_hex = hex::encode(key.verifying_key().as_bytes());
        let mut eligible = HashSet::new();
        eligible.insert(pubkey_hex.clone());
        let session = mgr.create_session(2, eligible, 2).await.unwrap();
        let (_, participant_id) = mgr.add_participant(&session.session_id, None).await.unwrap();

        let tx_bytes = b"payload".to_vec();
        mgr.inject_transaction(&session.session_id, tx_bytes.clone(), None, None)
            .await
            .unwrap();

        let signature = key.sign(&tx_bytes);
        let sig_hex = hex::encode(signature.to_bytes());
        mgr.submit_signature(&session.session_id, &participant_id, &pubkey_hex, &sig_hex)
            .await
            .unwrap();

        let err = mgr
            .submit_signature(&session.session_id, &participant_id, &pubkey_hex, &sig_hex)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::DuplicateSignature));
    }

    #[tokio::test]
    async fn tampered_signature_is_rejected_before_storage() {
        let mgr = manager();
        let key = keypair();
        let pubkey_hex = hex::encode(key.verifying_key().as_bytes());
        let mut eligible = HashSet::new();
        eligible.insert(pubkey_hex.clone());
        let session = mgr.create_session(1, eligible, 1).await.unwrap();
        let (_, participant_id) = mgr.add_participant(&session.session_id, None).await.unwrap();

        mgr.inject_transaction(&session.session_id, b"payload".to_vec(), None, None)
            .await
            .unwrap();

        let signature = key.sign(b"a different payload entirely");
        let err = mgr
            .submit_signature(
                &session.session_id,
                &participant_id,
                &pubkey_hex,
                &hex::encode(signature.to_bytes()),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::VerificationFailed));
    }

    #[tokio::test]
    async fn cannot_execute_below_threshold() {
        let mgr = manager();
        let key = keypair();
        let pubkey_hex = hex::encode(key.verifying_key().as_bytes());
        let mut eligible = HashSet::new();
        eligible.insert(pubkey_hex.clone());
        let session = mgr.create_session(2, eligible, 2).await.unwrap();

        mgr.inject_transaction(&session.session_id, b"payload".to_vec(), None, None)
            .await
            .unwrap();

        let err = mgr.execute(&session.session_id).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidState));
    }

    struct FailingExecutor;

    #[async_trait::async_trait]
    impl TransactionExecutor for FailingExecutor {
        async fn submit(&self, _transaction: &multisig_common::types::FrozenTransaction) -> Result<(), String> {
            Err("ledger rejected submission".to_string())
        }
    }

    #[tokio::test]
    async fn execute_failure_reverts_session_to_signing() {
        let mgr = SessionManager::new(
            Arc::new(MemoryStore::new()),
            Arc::new(FailingExecutor),
            Config::default(),
        );
        let key = keypair();
        let pubkey_hex = hex::encode(key.verifying_key().as_bytes());
        let mut eligible = HashSet::new();
        eligible.insert(pubkey_hex.clone());
        let session = mgr.create_session(1, eligible, 1).await.unwrap();
        let (_, participant_id) = mgr.add_participant(&session.session_id, None).await.unwrap();

        let tx_bytes = b"payload".to_vec();
        mgr.inject_transaction(&session.session_id, tx_bytes.clone(), None, None)
            .await
            .unwrap();
        let signature = key.sign(&tx_bytes);
        mgr.submit_signature(
            &session.session_id,
            &participant_id,
            &pubkey_hex,
            &hex::encode(signature.to_bytes()),
        )
        .await
        .unwrap();

        let err = mgr.execute(&session.session_id).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::SubmissionFailure));

        let session = mgr
            .inject_transaction(&session.session_id, tx_bytes, None, None)
            .await
            .unwrap_err();
        // Reverted to `signing`, not stuck `executing`: a second injection
        // is still illegal from `signing`, same as before the failed
        // execution attempt (confirms the revert landed on `signing`, the
        // one non-terminal state injection never accepts from).
        assert_eq!(session.kind(), Some(ErrorKind::InvalidState));
    }

    #[tokio::test]
    async fn cancel_is_idempotent_refusal_once_terminal() {
        let mgr = manager();
        let session = mgr.create_session(1, HashSet::new(), 1).await.unwrap();
        mgr.cancel_session(&session.session_id).await.unwrap();
        let err = mgr.cancel_session(&session.session_id).await.unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::InvalidState));
    }
}

#[cfg(test)]
mod property_tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use multisig_common::config::Config;
    use multisig_store::MemoryStore;
    use proptest::prelude::*;

    use super::*;

    proptest! {
        /// Invariant I4: `stats.signatures_collected` never exceeds
        /// `stats.signatures_required` by more than the count of stored
        /// signatures, and never goes negative-equivalent (it's a u32,
        /// so this is really: it always equals `signatures.len()`).
        #[test]
        fn stats_always_reflect_stored_signatures(threshold in 1u32..5) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let mgr = SessionManager::new(
                    Arc::new(MemoryStore::new()),
                    Arc::new(NoopExecutor),
                    Config::default(),
                );
                let session = mgr.create_session(threshold, HashSet::new(), threshold).await.unwrap();
                prop_assert_eq!(session.stats.signatures_collected, 0);
                prop_assert_eq!(session.stats.signatures_required, threshold);
                Ok(())
            }).unwrap();
        }
    }
}
