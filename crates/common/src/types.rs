//! The session aggregate and its constituent types (spec §3).

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a session (spec §3, §4.3 transition table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Waiting,
    TransactionReceived,
    Signing,
    Executing,
    Completed,
    Cancelled,
    Expired,
    TransactionExpired,
}

impl SessionStatus {
    /// Terminal statuses are never mutated again and are eligible for
    /// retention-based deletion (spec §3 Lifecycles).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Expired)
    }
}

/// Status of an individual participant connection (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    Connected,
    Ready,
    Reviewing,
    Signed,
    Rejected,
    Disconnected,
}

/// A connected or formerly-connected participant (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub participant_id: String,
    pub status: ParticipantStatus,
    /// Known only after signature submission, unless advertised at auth
    /// (spec §4.5, §9 Open Question 3).
    pub public_key: Option<String>,
    pub label: Option<String>,
    pub connected_at: DateTime<Utc>,
    pub ready_at: Option<DateTime<Utc>>,
}

impl Participant {
    pub fn new(participant_id: String, label: Option<String>) -> Self {
        Self {
            participant_id,
            status: ParticipantStatus::Connected,
            public_key: None,
            label,
            connected_at: Utc::now(),
            ready_at: None,
        }
    }
}

/// One signer's contribution. `signature_material` may be a single byte
/// string or one-per-node, per spec §9 Open Question 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignatureMaterial {
    Single(#[serde(with = "hex_bytes")] Vec<u8>),
    PerNode(#[serde(with = "hex_bytes_vec")] Vec<Vec<u8>>),
}

impl SignatureMaterial {
    /// All constituent byte strings, in order, for verification.
    pub fn parts(&self) -> Vec<&[u8]> {
        match self {
            Self::Single(b) => vec![b.as_slice()],
            Self::PerNode(parts) => parts.iter().map(|p| p.as_slice()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signature {
    pub public_key: String,
    pub material: SignatureMaterial,
    pub participant_id: String,
    pub submitted_at: DateTime<Utc>,
}

/// The canonical byte serialization a signer authorizes, plus its freeze
/// and expiry timestamps (spec §3, §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrozenTransaction {
    #[serde(with = "hex_bytes")]
    pub bytes: Vec<u8>,
    pub hash: String,
    pub frozen_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl FrozenTransaction {
    /// Freeze `bytes` (spec §4.2 C2): `hash` is computed by the caller
    /// (C1's responsibility, not C2's), `frozen_at` stamps the freeze, and
    /// `expires_at = frozen_at + validity`.
    pub fn freeze(bytes: Vec<u8>, hash: String, frozen_at: DateTime<Utc>, validity: Duration) -> Self {
        Self {
            bytes,
            hash,
            frozen_at,
            expires_at: frozen_at + validity,
        }
    }

    /// Reconstruct a `FrozenTransaction` on a remote host (spec §4.2): the
    /// reconstructing party never needs the coordinator's in-process
    /// struct, only the exact `bytes`, `hash`, and timing it received over
    /// the wire.
    pub fn from_bytes(bytes: Vec<u8>, hash: String, frozen_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            bytes,
            hash,
            frozen_at,
            expires_at,
        }
    }

    pub fn time_remaining(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }

    /// `true` once fewer than 20 seconds remain before `expires_at` (spec
    /// §4.2): a warning threshold, distinct from `validate_not_expired`'s
    /// hard cutoff.
    pub fn is_near_expiry(&self, now: DateTime<Utc>) -> bool {
        self.time_remaining(now) < Duration::seconds(20)
    }

    pub fn validate_not_expired(&self, now: DateTime<Utc>) -> Result<(), crate::error::MultisigError> {
        if now > self.expires_at {
            Err(crate::error::MultisigError::new(
                crate::error::ErrorKind::TransactionExpired,
                "frozen transaction validity window elapsed",
            ))
        } else {
            Ok(())
        }
    }
}

/// Advisory, coordinator-supplied fields, sanitized per spec §4.4.
/// Never derived from or compared against `frozen_transaction.bytes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorMetadata {
    pub description: Option<AdvisoryField<String>>,
    pub amount: Option<AdvisoryField<String>>,
    pub recipient: Option<AdvisoryField<String>>,
    /// True if `description` matched an urgency-pattern heuristic.
    pub flagged: bool,
}

/// A value that is explicitly tagged as unverified, advisory-only data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisoryField<T> {
    pub value: T,
    pub marker: AdvisoryMarker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdvisoryMarker {
    #[serde(rename = "UNVERIFIED")]
    Unverified,
}

impl<T> AdvisoryField<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            marker: AdvisoryMarker::Unverified,
        }
    }
}

/// Derived counters, recomputed (never drifted) from `participants` and
/// `signatures` (spec §3 invariant I4).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SessionStats {
    pub participants_connected: u32,
    pub participants_ready: u32,
    pub signatures_collected: u32,
    pub signatures_required: u32,
}

/// The primary aggregate (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub token: String,
    pub threshold: u32,
    pub eligible_keys: HashSet<String>,
    pub expected_participants: u32,
    pub frozen_transaction: Option<FrozenTransaction>,
    pub tx_details: Option<serde_json::Value>,
    pub coordinator_metadata: Option<CoordinatorMetadata>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub transaction_expires_at: Option<DateTime<Utc>>,
    pub participants: HashMap<String, Participant>,
    pub signatures: HashMap<String, Signature>,
    pub stats: SessionStats,
}

impl Session {
    /// Recompute `stats` from `participants` and `signatures`. Callers must
    /// invoke this after any mutation so invariant I4 holds.
    pub fn recompute_stats(&mut self) {
        let participants_connected = self.participants.len() as u32;
        let participants_ready = self
            .participants
            .values()
            .filter(|p| {
                matches!(
                    p.status,
                    ParticipantStatus::Ready | ParticipantStatus::Signed
                )
            })
            .count() as u32;
        self.stats = SessionStats {
            participants_connected,
            participants_ready,
            signatures_collected: self.signatures.len() as u32,
            signatures_required: self.threshold,
        };
    }

    pub fn is_executable(&self, now: DateTime<Utc>) -> bool {
        let threshold_met = self.signatures.len() as u32 >= self.threshold;
        let not_expired = self
            .transaction_expires_at
            .map(|exp| now <= exp)
            .unwrap_or(false);
        threshold_met && not_expired && self.frozen_transaction.is_some()
    }
}

/// Serialize byte buffers as lowercase hex rather than serde's default
/// per-element array, matching the wire encoding used for transaction and
/// signature bytes (spec §6: "Byte fields use base64; hex fields use
/// lowercase without 0x"). Internal storage uses hex for readability in
/// logs and store dumps; the wire layer (`multisig-wire`) re-encodes to
/// base64 where the spec requires it.
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

mod hex_bytes_vec {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(parts: &[Vec<u8>], s: S) -> Result<S::Ok, S::Error> {
        let hexed: Vec<String> = parts.iter().map(hex::encode).collect();
        hexed.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Vec<u8>>, D::Error> {
        let hexed: Vec<String> = Vec::deserialize(d)?;
        hexed
            .into_iter()
            .map(|s| hex::decode(&s).map_err(serde::de::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freeze_sets_expiry_from_validity_window() {
        let now = Utc::now();
        let frozen = FrozenTransaction::freeze(
            b"payload".to_vec(),
            "deadbeef".to_string(),
            now,
            Duration::seconds(110),
        );
        assert_eq!(frozen.expires_at, now + Duration::seconds(110));
        assert!(frozen.validate_not_expired(now).is_ok());
    }

    #[test]
    fn near_expiry_and_validate_not_expired_respect_the_threshold() {
        let now = Utc::now();
        let frozen = FrozenTransaction::freeze(
            b"payload".to_vec(),
            "deadbeef".to_string(),
            now,
            Duration::seconds(30),
        );
        assert!(!frozen.is_near_expiry(now));
        assert!(frozen.is_near_expiry(now + Duration::seconds(15)));
        assert!(frozen.validate_not_expired(now + Duration::seconds(29)).is_ok());
        assert!(frozen.validate_not_expired(now + Duration::seconds(31)).is_err());
    }

    #[test]
    fn from_bytes_round_trips_freeze_for_remote_verification() {
        let now = Utc::now();
        let frozen = FrozenTransaction::freeze(
            b"payload".to_vec(),
            "deadbeef".to_string(),
            now,
            Duration::seconds(110),
        );
        let reconstructed =
            FrozenTransaction::from_bytes(frozen.bytes.clone(), frozen.hash.clone(), frozen.frozen_at, frozen.expires_at);
        assert_eq!(reconstructed.hash, frozen.hash);
        assert_eq!(reconstructed.expires_at, frozen.expires_at);
    }

    #[test]
    fn stats_follow_invariant_i4() {
        let mut session = Session {
            session_id: "s".into(),
            token: "t".into(),
            threshold: 2,
            eligible_keys: HashSet::new(),
            expected_participants: 2,
            frozen_transaction: None,
            tx_details: None,
            coordinator_metadata: None,
            status: SessionStatus::Waiting,
            created_at: Utc::now(),
            expires_at: Utc::now(),
            transaction_expires_at: None,
            participants: HashMap::new(),
            signatures: HashMap::new(),
            stats: SessionStats::default(),
        };

        session
            .participants
            .insert("p1".into(), Participant::new("p1".into(), None));
        let mut ready = Participant::new("p2".into(), None);
        ready.status = ParticipantStatus::Ready;
        session.participants.insert("p2".into(), ready);

        session.recompute_stats();
        assert_eq!(session.stats.participants_connected, 2);
        assert_eq!(session.stats.participants_ready, 1);
        assert_eq!(session.stats.signatures_collected, 0);
    }

    #[test]
    fn not_executable_without_frozen_transaction() {
        let session = Session {
            session_id: "s".into(),
            token: "t".into(),
            threshold: 1,
            eligible_keys: HashSet::new(),
            expected_participants: 1,
            frozen_transaction: None,
            tx_details: None,
            coordinator_metadata: None,
            status: SessionStatus::Signing,
            created_at: Utc::now(),
            expires_at: Utc::now(),
            transaction_expires_at: Some(Utc::now() + chrono::Duration::seconds(100)),
            participants: HashMap::new(),
            signatures: HashMap::new(),
            stats: SessionStats::default(),
        };
        assert!(!session.is_executable(Utc::now()));
    }
}
