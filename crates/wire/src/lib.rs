//! Wire protocol types for the persistent, bidirectional JSON-framed
//! connection between a coordinator and its participants (spec §4.5, §6).
//!
//! Byte-valued fields on the wire are base64, distinct from the internal
//! hex encoding used by `multisig-common::types` for storage and logs.

use chrono::{DateTime, Utc};
use multisig_common::error::ErrorKind;
use multisig_common::types::ParticipantStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Which side of the multisig a connection speaks for (spec §4.5). The
/// wire server enforces the coordinator-only operations
/// (`TRANSACTION_INJECT`, `EXECUTE_TRANSACTION`) against this, not against
/// which messages happen to have been sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionRole {
    Coordinator,
    Participant,
}

/// Messages sent from a connected party (coordinator or signer) to the
/// server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    Auth {
        session_id: String,
        token: String,
        role: ConnectionRole,
        label: Option<String>,
        /// Advertised eagerly, per spec §9 Open Question 3 (both an
        /// eager-advertise and a signature-time-only mode are supported).
        public_key: Option<String>,
    },
    ParticipantReady {
        label: Option<String>,
    },
    /// A participant reporting its own local status, e.g. moving into
    /// `reviewing` while the signer inspects the transaction before
    /// deciding whether to sign.
    StatusUpdate {
        status: ParticipantStatus,
    },
    TransactionInject {
        #[serde(with = "base64_bytes")]
        bytes: Vec<u8>,
        tx_details: Option<Value>,
        metadata: Option<CoordinatorMetadataInput>,
    },
    SignatureSubmit {
        public_key: String,
        signature: String,
    },
    TransactionReject {
        reason: Option<String>,
    },
    ExecuteTransaction,
    Ping,
}

/// Coordinator-supplied, advisory-only transaction context (spec §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorMetadataInput {
    pub description: Option<String>,
    pub amount: Option<String>,
    pub recipient: Option<String>,
}

/// A frozen transaction's wire-visible fields, sent both on
/// `TRANSACTION_RECEIVED` and as part of an `AUTH_SUCCESS` snapshot for a
/// participant reconnecting after injection already happened (spec §4.5d).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrozenTransactionSnapshot {
    #[serde(with = "base64_bytes")]
    pub bytes: Vec<u8>,
    pub hash: String,
    pub frozen_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub tx_details: Option<Value>,
}

/// Messages sent from the server to a connected party.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    AuthSuccess {
        session_id: String,
        /// `None` for a coordinator connection: coordinators don't occupy
        /// a participant slot.
        participant_id: Option<String>,
        threshold: u32,
        expected_participants: u32,
        participants_connected: u32,
        participants_ready: u32,
        eligible_keys: Vec<String>,
        frozen_transaction: Option<FrozenTransactionSnapshot>,
    },
    AuthFailed {
        reason: ErrorKind,
    },
    ParticipantJoined {
        participant_id: String,
        label: Option<String>,
    },
    ParticipantLeft {
        participant_id: String,
    },
    ParticipantReadyAck {
        participant_id: String,
    },
    ParticipantStatusUpdate {
        participant_id: String,
        status: ParticipantStatus,
    },
    TransactionReceived {
        #[serde(with = "base64_bytes")]
        bytes: Vec<u8>,
        hash: String,
        frozen_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        tx_details: Option<Value>,
    },
    SignatureAccepted {
        public_key: String,
        signatures_collected: u32,
        signatures_required: u32,
    },
    SignatureRejected {
        reason: ErrorKind,
    },
    ThresholdMet,
    ExecutionResult {
        success: bool,
        detail: Option<String>,
    },
    SessionExpired,
    TransactionExpired,
    Error {
        kind: ErrorKind,
        message: String,
    },
    Pong,
}

mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(&s)
            .map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("malformed multisig:// URI")]
    MalformedUri,
}

/// The session id/token pair a participant needs to connect, and its
/// compact `multisig://` URI form (spec §4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCredential {
    pub session_id: String,
    pub token: String,
}

impl SessionCredential {
    pub fn new(session_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            token: token.into(),
        }
    }

    /// Render as `multisig://<host>:<port>?s=<session_id>&p=<token>`.
    pub fn to_uri(&self, host: &str, port: u16) -> String {
        format!(
            "multisig://{}:{}?s={}&p={}",
            host, port, self.session_id, self.token
        )
    }

    /// Parse the `s=`/`p=` query parameters out of a `multisig://` URI,
    /// ignoring host/port (the caller already knows which server to dial).
    pub fn from_uri(uri: &str) -> Result<Self, CredentialError> {
        let rest = uri
            .strip_prefix("multisig://")
            .ok_or(CredentialError::MalformedUri)?;
        let (_host_port, query) = rest.split_once('?').ok_or(CredentialError::MalformedUri)?;

        let mut session_id = None;
        let mut token = None;
        for pair in query.split('&') {
            let (key, value) = pair.split_once('=').ok_or(CredentialError::MalformedUri)?;
            match key {
                "s" => session_id = Some(value),
                "p" => token = Some(value),
                _ => {}
            }
        }
        let session_id = session_id.ok_or(CredentialError::MalformedUri)?;
        let token = token.ok_or(CredentialError::MalformedUri)?;
        if session_id.is_empty() || token.is_empty() {
            return Err(CredentialError::MalformedUri);
        }
        Ok(Self::new(session_id, token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_uri_round_trips() {
        let cred = SessionCredential::new("abc123", "TOKEN123");
        let uri = cred.to_uri("coordinator.example.com", 3000);
        assert_eq!(uri, "multisig://coordinator.example.com:3000?s=abc123&p=TOKEN123");
        let parsed = SessionCredential::from_uri(&uri).unwrap();
        assert_eq!(parsed, cred);
    }

    #[test]
    fn malformed_uri_is_rejected() {
        assert!(SessionCredential::from_uri("https://example.com").is_err());
        assert!(SessionCredential::from_uri("multisig://missing-query-string").is_err());
        assert!(SessionCredential::from_uri("multisig://host:3000?s=&p=").is_err());
    }

    #[test]
    fn auth_message_round_trips_through_json() {
        let msg = ClientMessage::Auth {
            session_id: "s1".into(),
            token: "t1".into(),
            role: ConnectionRole::Participant,
            label: None,
            public_key: Some("abcd".into()),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"AUTH\""));
        assert!(json.contains("\"role\":\"participant\""));
        let parsed: ClientMessage = serde_json::from_str(&json).unwrap();
        matches!(parsed, ClientMessage::Auth { .. });
    }

    #[test]
    fn transaction_message_bytes_are_base64_on_the_wire() {
        let msg = ClientMessage::TransactionInject {
            bytes: vec![0xde, 0xad, 0xbe, 0xef],
            tx_details: None,
            metadata: None,
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["bytes"], "3q2+7w==");
    }
}
