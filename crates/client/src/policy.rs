//! Pluggable approval policy: what decides whether a signer actually
//! signs a received transaction. A headless client wires in an
//! automated policy; an interactive client would wire in one that
//! prompts a human instead.

use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait SigningPolicy: Send + Sync {
    /// Decide whether to sign `bytes`. `tx_details` is the coordinator's
    /// advisory, unverified context, already sanitized server-side;
    /// never treat it as authoritative over `bytes` itself.
    async fn approve(&self, bytes: &[u8], tx_details: Option<&Value>) -> bool;
}

/// Approves everything. Useful for tests and for a fully automated
/// signer operating under some other out-of-band authorization scheme.
pub struct AlwaysApprove;

#[async_trait]
impl SigningPolicy for AlwaysApprove {
    async fn approve(&self, _bytes: &[u8], _tx_details: Option<&Value>) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn always_approve_does_what_it_says() {
        assert!(AlwaysApprove.approve(b"anything", None).await);
    }
}
