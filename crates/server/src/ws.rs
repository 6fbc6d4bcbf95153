//! The per-connection message loop: authenticate, then merge the
//! session's broadcast stream with inbound client messages, the same
//! `tokio::select!`-over-split-socket shape used for the bridge
//! backend's WebSocket route.

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use multisig_common::error::ErrorKind;
use multisig_common::types::SessionStatus;
use multisig_wire::{ClientMessage, ConnectionRole, FrozenTransactionSnapshot, ServerMessage};

use crate::AppState;

const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, addr, state))
}

async fn handle_socket(mut socket: WebSocket, addr: SocketAddr, state: AppState) {
    if let Some(remaining) = state.rate_limiter.check(addr.ip()) {
        tracing::info!(%addr, ?remaining, "rejected connection: source is rate limited");
        let _ = send(&mut socket, &ServerMessage::AuthFailed { reason: ErrorKind::RateLimited }).await;
        return;
    }

    let (session_id, token, role, label, advertised_key) = match wait_for_auth(&mut socket).await {
        Some(auth) => auth,
        None => return,
    };

    let authenticated = state
        .manager
        .authenticate(&session_id, &token)
        .await
        .unwrap_or(false);

    if !authenticated {
        state.rate_limiter.record_failure(addr.ip());
        let _ = send(
            &mut socket,
            &ServerMessage::AuthFailed { reason: ErrorKind::InvalidSessionOrToken },
        )
        .await;
        return;
    }
    state.rate_limiter.record_success(addr.ip());

    let is_coordinator = matches!(role, ConnectionRole::Coordinator);

    let (session, participant_id) = if is_coordinator {
        match state.manager.get_session(&session_id).await {
            Ok(session) => (session, None),
            Err(e) => {
                tracing::warn!(error = %e, "failed to fetch session for coordinator auth");
                return;
            }
        }
    } else {
        match state.manager.add_participant(&session_id, label).await {
            Ok((session, participant_id)) => (session, Some(participant_id)),
            Err(e) => {
                tracing::warn!(error = %e, "failed to register participant after successful auth");
                return;
            }
        }
    };
    tracing::info!(%session_id, ?participant_id, is_coordinator, "connection authenticated");

    let _ = send(
        &mut socket,
        &ServerMessage::AuthSuccess {
            session_id: session_id.clone(),
            participant_id: participant_id.clone(),
            threshold: session.threshold,
            expected_participants: session.expected_participants,
            participants_connected: session.stats.participants_connected,
            participants_ready: session.stats.participants_ready,
            eligible_keys: session.eligible_keys.iter().cloned().collect(),
            frozen_transaction: session.frozen_transaction.as_ref().map(|frozen| FrozenTransactionSnapshot {
                bytes: frozen.bytes.clone(),
                hash: frozen.hash.clone(),
                frozen_at: frozen.frozen_at,
                expires_at: frozen.expires_at,
                tx_details: session.tx_details.clone(),
            }),
        },
    )
    .await;

    if is_coordinator {
        state.mark_coordinator_connected(&session_id);
    } else if let Some(participant_id) = &participant_id {
        state.publish(
            &session_id,
            ServerMessage::ParticipantJoined {
                participant_id: participant_id.clone(),
                label: None,
            },
        );
    }
    let _ = advertised_key;

    let mut broadcast_rx = state.subscribe(&session_id);
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            outgoing = broadcast_rx.recv() => {
                match outgoing {
                    Ok(message) => {
                        let Ok(text) = serde_json::to_string(&message) else { continue };
                        if sender.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(&state, &session_id, participant_id.as_deref(), is_coordinator, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    tracing::info!(%session_id, ?participant_id, is_coordinator, "connection closed");
    if is_coordinator {
        state.mark_coordinator_disconnected(&session_id);
    } else if let Some(participant_id) = participant_id {
        let _ = state.manager.remove_participant(&session_id, &participant_id).await;
        state.publish(&session_id, ServerMessage::ParticipantLeft { participant_id });
    }
}

async fn wait_for_auth(
    socket: &mut WebSocket,
) -> Option<(String, String, ConnectionRole, Option<String>, Option<String>)> {
    let next = tokio::time::timeout(AUTH_TIMEOUT, socket.recv()).await.ok()??;
    let Ok(Message::Text(text)) = next else { return None };
    match serde_json::from_str::<ClientMessage>(&text) {
        Ok(ClientMessage::Auth { session_id, token, role, label, public_key }) => {
            Some((session_id, token, role, label, public_key))
        }
        _ => None,
    }
}

async fn handle_client_message(
    state: &AppState,
    session_id: &str,
    participant_id: Option<&str>,
    is_coordinator: bool,
    text: &str,
) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(_) => return,
    };

    match message {
        ClientMessage::Auth { .. } => {}
        ClientMessage::ParticipantReady { label } => {
            let Some(participant_id) = participant_id else { return };
            if let Err(e) = state.manager.set_participant_ready(session_id, participant_id).await {
                tracing::debug!(error = %e, "participant-ready rejected");
                return;
            }
            let _ = label;
            state.publish(
                session_id,
                ServerMessage::ParticipantReadyAck { participant_id: participant_id.to_string() },
            );
        }
        ClientMessage::StatusUpdate { status } => {
            let Some(participant_id) = participant_id else { return };
            if state
                .manager
                .set_participant_status(session_id, participant_id, status)
                .await
                .is_err()
            {
                return;
            }
            state.publish(
                session_id,
                ServerMessage::ParticipantStatusUpdate { participant_id: participant_id.to_string(), status },
            );
        }
        ClientMessage::TransactionInject { bytes, tx_details, metadata } => {
            if !is_coordinator {
                state.publish(
                    session_id,
                    ServerMessage::Error {
                        kind: ErrorKind::InvalidState,
                        message: "only the coordinator may inject a transaction".to_string(),
                    },
                );
                return;
            }
            match state
                .manager
                .inject_transaction(session_id, bytes.clone(), tx_details.clone(), metadata)
                .await
            {
                Ok(session) => {
                    let frozen = session.frozen_transaction.expect("just injected");
                    state.audit.record(multisig_audit::AuditRecordInput {
                        session_id: session_id.to_string(),
                        transaction_hash: Some(frozen.hash.clone()),
                        frozen_at: Some(frozen.frozen_at),
                        expires_at: Some(frozen.expires_at),
                        status: SessionStatus::TransactionReceived,
                        signer_public_keys: vec![],
                        error: None,
                    });
                    state.publish(
                        session_id,
                        ServerMessage::TransactionReceived {
                            bytes: frozen.bytes,
                            hash: frozen.hash,
                            frozen_at: frozen.frozen_at,
                            expires_at: frozen.expires_at,
                            tx_details,
                        },
                    );
                }
                Err(e) => {
                    state.publish(
                        session_id,
                        ServerMessage::Error { kind: e.kind().unwrap_or(ErrorKind::InvalidState), message: e.to_string() },
                    );
                }
            }
        }
        ClientMessage::SignatureSubmit { public_key, signature } => {
            let Some(participant_id) = participant_id else { return };
            match state
                .manager
                .submit_signature(session_id, participant_id, &public_key, &signature)
                .await
            {
                Ok(outcome) => {
                    state.publish(
                        session_id,
                        ServerMessage::SignatureAccepted {
                            public_key,
                            signatures_collected: outcome.session.stats.signatures_collected,
                            signatures_required: outcome.session.stats.signatures_required,
                        },
                    );
                    if outcome.threshold_just_met {
                        state.publish(session_id, ServerMessage::ThresholdMet);
                    }
                }
                Err(e) => {
                    state.publish(
                        session_id,
                        ServerMessage::SignatureRejected { reason: e.kind().unwrap_or(ErrorKind::InvalidState) },
                    );
                }
            }
        }
        ClientMessage::TransactionReject { reason } => {
            let Some(participant_id) = participant_id else { return };
            let _ = state.manager.reject_transaction(session_id, participant_id).await;
            let _ = reason;
        }
        ClientMessage::ExecuteTransaction => {
            if !is_coordinator {
                state.publish(
                    session_id,
                    ServerMessage::Error {
                        kind: ErrorKind::InvalidState,
                        message: "only the coordinator may execute a transaction".to_string(),
                    },
                );
                return;
            }
            match state.manager.execute(session_id).await {
                Ok(session) => {
                    state.audit.record(multisig_audit::AuditRecordInput {
                        session_id: session_id.to_string(),
                        transaction_hash: session.frozen_transaction.as_ref().map(|t| t.hash.clone()),
                        frozen_at: session.frozen_transaction.as_ref().map(|t| t.frozen_at),
                        expires_at: session.frozen_transaction.as_ref().map(|t| t.expires_at),
                        status: SessionStatus::Completed,
                        signer_public_keys: session.signatures.keys().cloned().collect(),
                        error: None,
                    });
                    state.publish(
                        session_id,
                        ServerMessage::ExecutionResult { success: true, detail: None },
                    );
                }
                Err(e) => {
                    state.audit.record(multisig_audit::AuditRecordInput {
                        session_id: session_id.to_string(),
                        transaction_hash: None,
                        frozen_at: None,
                        expires_at: None,
                        status: SessionStatus::Executing,
                        signer_public_keys: vec![],
                        error: Some(e.to_string()),
                    });
                    state.publish(
                        session_id,
                        ServerMessage::ExecutionResult { success: false, detail: Some(e.to_string()) },
                    );
                }
            }
        }
        ClientMessage::Ping => {
            state.publish(session_id, ServerMessage::Pong);
        }
    }
}

async fn send(socket: &mut WebSocket, message: &ServerMessage) -> Result<(), axum::Error> {
    let text = serde_json::to_string(message).expect("ServerMessage always serializes");
    socket.send(Message::Text(text)).await
}
