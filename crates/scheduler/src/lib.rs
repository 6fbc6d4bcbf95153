//! Expiry scheduling (spec §C7): a periodic sweep over active sessions,
//! grounded on the node crate's `spawn_cleanup_task` pattern and the
//! bridge backend's periodic expiry task.

use std::sync::Arc;
use std::time::Duration;

use multisig_session::SessionManager;
use tokio::task::JoinHandle;

const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 5;

/// Spawn a background task that calls [`SessionManager::sweep`] every
/// `interval`. Dropping the returned handle does not stop the task; call
/// `.abort()` on it during shutdown.
pub fn spawn_sweep_task(manager: Arc<SessionManager>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(e) = manager.sweep(chrono::Utc::now()).await {
                tracing::warn!(error = %e, "expiry sweep failed");
            }
        }
    })
}

/// Spawn the sweep task at the default interval (spec §C7: frequent
/// enough that no session or frozen transaction outlives its deadline by
/// more than a few seconds).
pub fn spawn_default_sweep_task(manager: Arc<SessionManager>) -> JoinHandle<()> {
    spawn_sweep_task(manager, Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS))
}
