//! The signing client (spec §C6): a single persistent connection to the
//! coordinator. Key material never leaves this process: it is held only
//! in memory for the lifetime of the connection, the same constraint the
//! bridge backend's `MpcSigner` enforces over its key share.

pub mod policy;

use chrono::Utc;
use ed25519_dalek::{Signer, SigningKey};
use futures::{SinkExt, StreamExt};
use multisig_common::error::{ErrorKind, MultisigError};
use multisig_common::types::FrozenTransaction;
use multisig_wire::{ClientMessage, ConnectionRole, ServerMessage, SessionCredential};
use thiserror::Error;
use tokio_tungstenite::tungstenite::Message;

pub use policy::SigningPolicy;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("coordinator rejected authentication: {0:?}")]
    AuthRejected(ErrorKind),

    #[error("coordinator closed the connection before authenticating")]
    AuthNeverCompleted,

    #[error("malformed message from coordinator: {0}")]
    Protocol(String),
}

pub struct SigningClient<P: SigningPolicy> {
    signing_key: SigningKey,
    policy: P,
    frozen: Option<FrozenTransaction>,
}

impl<P: SigningPolicy> SigningClient<P> {
    pub fn new(signing_key: SigningKey, policy: P) -> Self {
        Self {
            signing_key,
            policy,
            frozen: None,
        }
    }

    fn public_key_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().as_bytes())
    }

    /// Connect, authenticate, and run the client's message loop until the
    /// coordinator closes the connection or a terminal session event
    /// arrives.
    pub async fn run(&mut self, url: &str, credential: &SessionCredential) -> Result<(), ClientError> {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url).await?;
        let (mut sink, mut stream) = ws_stream.split();

        send(&mut sink, &ClientMessage::Auth {
            session_id: credential.session_id.clone(),
            token: credential.token.clone(),
            role: ConnectionRole::Participant,
            label: None,
            public_key: Some(self.public_key_hex()),
        })
        .await?;

        match next_message(&mut stream).await? {
            Some(ServerMessage::AuthSuccess { .. }) => {
                tracing::info!("authenticated with coordinator");
            }
            Some(ServerMessage::AuthFailed { reason }) => return Err(ClientError::AuthRejected(reason)),
            Some(_) => return Err(ClientError::Protocol("expected AUTH_SUCCESS or AUTH_FAILED first".into())),
            None => return Err(ClientError::AuthNeverCompleted),
        }

        send(&mut sink, &ClientMessage::ParticipantReady { label: None }).await?;

        loop {
            let message = match next_message(&mut stream).await? {
                Some(m) => m,
                None => break,
            };

            match message {
                ServerMessage::TransactionReceived { bytes, hash, frozen_at, expires_at, tx_details } => {
                    let frozen = FrozenTransaction::from_bytes(bytes.clone(), hash, frozen_at, expires_at);

                    let computed_hash = multisig_crypto::sha256(&frozen.bytes);
                    if computed_hash != frozen.hash {
                        tracing::warn!("transaction hash mismatch; refusing to consider signing");
                        send(&mut sink, &ClientMessage::TransactionReject {
                            reason: Some("hash mismatch".to_string()),
                        })
                        .await?;
                        continue;
                    }
                    if frozen.is_near_expiry(Utc::now()) {
                        tracing::warn!("frozen transaction is nearing its expiry window");
                    }
                    self.frozen = Some(frozen);

                    if self.policy.approve(&bytes, tx_details.as_ref()).await {
                        self.submit_signature(&mut sink, &bytes).await?;
                    } else {
                        send(&mut sink, &ClientMessage::TransactionReject { reason: None }).await?;
                    }
                }
                ServerMessage::ThresholdMet => tracing::info!("threshold met"),
                ServerMessage::ExecutionResult { success, detail } => {
                    tracing::info!(success, ?detail, "execution result");
                }
                ServerMessage::SessionExpired | ServerMessage::TransactionExpired => {
                    tracing::info!("session or transaction expired; closing");
                    break;
                }
                ServerMessage::Error { kind, message } => {
                    tracing::warn!(?kind, message, "coordinator reported an error");
                }
                _ => {}
            }
        }

        Ok(())
    }

    async fn submit_signature<S>(&self, sink: &mut S, bytes: &[u8]) -> Result<(), ClientError>
    where
        S: futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    {
        if let Some(frozen) = &self.frozen {
            if frozen.validate_not_expired(Utc::now()).is_err() {
                tracing::warn!("refusing to submit a signature past the transaction's validity window");
                send(sink, &ClientMessage::TransactionReject {
                    reason: Some("local deadline passed".to_string()),
                })
                .await?;
                return Ok(());
            }
        }

        let signature = self.signing_key.sign(bytes);
        send(sink, &ClientMessage::SignatureSubmit {
            public_key: self.public_key_hex(),
            signature: hex::encode(signature.to_bytes()),
        })
        .await
    }
}

async fn send<S>(sink: &mut S, message: &ClientMessage) -> Result<(), ClientError>
where
    S: futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    let text = serde_json::to_string(message).expect("ClientMessage always serializes");
    sink.send(Message::Text(text)).await?;
    Ok(())
}

async fn next_message<St>(stream: &mut St) -> Result<Option<ServerMessage>, ClientError>
where
    St: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                let parsed = serde_json::from_str(&text)
                    .map_err(|e| ClientError::Protocol(e.to_string()))?;
                return Ok(Some(parsed));
            }
            Some(Ok(Message::Close(_))) | None => return Ok(None),
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(ClientError::Transport(e)),
        }
    }
}

/// Conversion used by callers that bridge a [`ClientError`] into the
/// shared error type, e.g. when the client library is embedded in a
/// larger coordinator-side test harness.
impl From<ClientError> for MultisigError {
    fn from(e: ClientError) -> Self {
        MultisigError::new(ErrorKind::SubmissionFailure, e.to_string())
    }
}
