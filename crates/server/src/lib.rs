//! The wire server (spec §C5): an axum application exposing a single
//! WebSocket endpoint that coordinators and signers both connect
//! through, distinguished only by which messages they send.

pub mod rate_limit;
pub mod ws;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use axum::extract::connect_info::ConnectInfo;
use axum::routing::get;
use axum::Router;
use multisig_audit::AuditLog;
use multisig_common::config::Config;
use multisig_session::SessionManager;
use multisig_wire::ServerMessage;
use rate_limit::AuthRateLimiter;
use std::net::SocketAddr;
use tokio::sync::broadcast;

/// Fan-out channel capacity per session. A slow or absent participant
/// missing a burst of broadcast messages simply misses stats updates;
/// the next message (or an explicit re-query) catches them up.
const BROADCAST_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SessionManager>,
    pub audit: Arc<AuditLog>,
    pub rate_limiter: Arc<AuthRateLimiter>,
    pub config: Arc<Config>,
    broadcasts: Arc<Mutex<HashMap<String, broadcast::Sender<ServerMessage>>>>,
    /// Which sessions currently have a connected coordinator. A
    /// process-local side map, same idiom as the broadcast channel table:
    /// gates `TRANSACTION_INJECT`/`EXECUTE_TRANSACTION` to the connection
    /// that authenticated as `coordinator`, not to any connected signer.
    coordinators: Arc<Mutex<HashSet<String>>>,
}

impl AppState {
    pub fn new(manager: Arc<SessionManager>, audit: Arc<AuditLog>, config: Config) -> Self {
        let rate_limiter = Arc::new(AuthRateLimiter::new(config.auth_rate_limit.clone()));
        Self {
            manager,
            audit,
            rate_limiter,
            config: Arc::new(config),
            broadcasts: Arc::new(Mutex::new(HashMap::new())),
            coordinators: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn mark_coordinator_connected(&self, session_id: &str) {
        self.coordinators
            .lock()
            .expect("coordinator set mutex poisoned")
            .insert(session_id.to_string());
    }

    pub fn mark_coordinator_disconnected(&self, session_id: &str) {
        self.coordinators
            .lock()
            .expect("coordinator set mutex poisoned")
            .remove(session_id);
    }

    /// Subscribe to (creating if necessary) the broadcast channel for a
    /// session. All participants connected to the same session share
    /// one channel; a coordinator's `TRANSACTION_INJECT` fans out to
    /// every signer as `TRANSACTION_RECEIVED`, and so on.
    pub fn subscribe(&self, session_id: &str) -> broadcast::Receiver<ServerMessage> {
        let mut broadcasts = self.broadcasts.lock().expect("broadcast map mutex poisoned");
        broadcasts
            .entry(session_id.to_string())
            .or_insert_with(|| broadcast::channel(BROADCAST_CAPACITY).0)
            .subscribe()
    }

    pub fn publish(&self, session_id: &str, message: ServerMessage) {
        let broadcasts = self.broadcasts.lock().expect("broadcast map mutex poisoned");
        if let Some(sender) = broadcasts.get(session_id) {
            // No receivers is the common case right after the last
            // participant disconnects; that's not an error.
            let _ = sender.send(message);
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/healthz", get(|| async { "ok" }))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Re-exported so the binary entrypoint can build a `Router` that uses
/// `ConnectInfo<SocketAddr>` extraction without depending on axum
/// directly beyond what `app()` already requires.
pub type PeerAddr = ConnectInfo<SocketAddr>;
