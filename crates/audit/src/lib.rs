//! Append-only audit log (spec §C8), hash-chained the way the bridge
//! backend's `audit_service` chains content hashes: each entry's
//! `content_hash` folds in the previous entry's hash, so the chain
//! breaks detectably if any entry is altered or reordered after the
//! fact.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use multisig_common::types::SessionStatus;
use serde::{Deserialize, Serialize};

/// Genesis value for the first entry's `prev_hash`.
const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000";

/// A single audit record. Fields are deliberately coarse: fingerprints,
/// not full public keys; a hash, not the raw transaction bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub transaction_hash: Option<String>,
    pub frozen_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub signer_fingerprints: Vec<String>,
    pub error: Option<String>,
    pub prev_hash: String,
    pub content_hash: String,
}

/// The fields a caller supplies; `prev_hash`/`content_hash` are computed
/// by the sink so a caller can never forge or skip a link in the chain.
pub struct AuditRecordInput {
    pub session_id: String,
    pub transaction_hash: Option<String>,
    pub frozen_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub signer_public_keys: Vec<String>,
    pub error: Option<String>,
}

/// First 6 and last 4 characters of a canonical public key hex string,
/// joined with an ellipsis, so an auditor can eyeball which key acted
/// without the audit log itself becoming a key-material sink.
pub fn fingerprint(canonical_public_key_hex: &str) -> String {
    let key = canonical_public_key_hex;
    if key.len() <= 10 {
        return key.to_string();
    }
    format!("{}…{}", &key[..6], &key[key.len() - 4..])
}

pub struct AuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLog {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Append one entry, returning it with its computed hash fields
    /// filled in.
    pub fn record(&self, input: AuditRecordInput) -> AuditEntry {
        let mut entries = self.entries.lock().expect("audit log mutex poisoned");
        let prev_hash = entries
            .last()
            .map(|e| e.content_hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());

        let timestamp = Utc::now();
        let fingerprints: Vec<String> = input
            .signer_public_keys
            .iter()
            .map(|k| fingerprint(k))
            .collect();

        let preimage = format!(
            "{}|{}|{}|{:?}|{:?}|{}",
            prev_hash,
            timestamp.to_rfc3339(),
            input.session_id,
            input.transaction_hash,
            input.status,
            fingerprints.join(",")
        );
        let content_hash = multisig_crypto::sha256(preimage.as_bytes());

        let entry = AuditEntry {
            timestamp,
            session_id: input.session_id,
            transaction_hash: input.transaction_hash,
            frozen_at: input.frozen_at,
            expires_at: input.expires_at,
            status: input.status,
            signer_fingerprints: fingerprints,
            error: input.error,
            prev_hash,
            content_hash,
        };

        entries.push(entry.clone());
        entry
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().expect("audit log mutex poisoned").clone()
    }

    /// Walk the stored chain end to end; `false` means some entry's
    /// `prev_hash` no longer matches its predecessor's `content_hash`.
    pub fn verify_chain(&self) -> bool {
        let entries = self.entries.lock().expect("audit log mutex poisoned");
        let mut expected_prev = GENESIS_HASH.to_string();
        for entry in entries.iter() {
            if entry.prev_hash != expected_prev {
                return false;
            }
            expected_prev = entry.content_hash.clone();
        }
        true
    }
}
