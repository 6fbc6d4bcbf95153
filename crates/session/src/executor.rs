//! Pluggable submission of a fully-signed transaction to the ledger.
//!
//! The session manager never talks to a real ledger directly: it calls
//! through this trait so that a ledger-specific submission layer can be
//! swapped in without touching session lifecycle code. Failure here maps
//! to the `SubmissionFailure` error kind (spec §7); `SessionManager::execute`
//! reverts the session from `Executing` back to `Signing` so the
//! coordinator can retry or cancel.

use async_trait::async_trait;
use multisig_common::types::FrozenTransaction;

#[async_trait]
pub trait TransactionExecutor: Send + Sync {
    async fn submit(&self, transaction: &FrozenTransaction) -> Result<(), String>;
}

/// Always succeeds. Used in tests and local development where no ledger
/// submission layer is configured.
#[derive(Default)]
pub struct NoopExecutor;

#[async_trait]
impl TransactionExecutor for NoopExecutor {
    async fn submit(&self, _transaction: &FrozenTransaction) -> Result<(), String> {
        Ok(())
    }
}
