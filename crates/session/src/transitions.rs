//! The session status transition table (spec §4.3).

use multisig_common::types::SessionStatus;

/// Whether moving from `from` to `to` is a legal transition.
///
/// `TransactionExpired -> Waiting` is not listed here: it is an implicit
/// reset performed by `SessionManager::inject_transaction` when a
/// coordinator re-injects after a stale transaction, not a transition the
/// scheduler or manager ever applies on its own.
pub fn is_legal(from: SessionStatus, to: SessionStatus) -> bool {
    use SessionStatus::*;
    match (from, to) {
        (Waiting, TransactionReceived) => true,
        (TransactionExpired, TransactionReceived) => true,
        (TransactionReceived, Signing) => true,
        (Signing, Executing) => true,
        (Executing, Completed) => true,
        (Executing, Signing) => true,

        (TransactionReceived, TransactionExpired) => true,
        (Signing, TransactionExpired) => true,

        (Waiting, Expired) => true,
        (TransactionReceived, Expired) => true,
        (Signing, Expired) => true,

        (Waiting, Cancelled) => true,
        (TransactionReceived, Cancelled) => true,
        (Signing, Cancelled) => true,
        (TransactionExpired, Cancelled) => true,

        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionStatus::*;

    #[test]
    fn terminal_statuses_have_no_outgoing_transitions() {
        for terminal in [Completed, Cancelled, Expired] {
            for to in [
                Waiting,
                TransactionReceived,
                Signing,
                Executing,
                Completed,
                Cancelled,
                Expired,
                TransactionExpired,
            ] {
                assert!(!is_legal(terminal, to), "{terminal:?} -> {to:?} should be illegal");
            }
        }
    }

    #[test]
    fn happy_path_is_legal() {
        assert!(is_legal(Waiting, TransactionReceived));
        assert!(is_legal(TransactionReceived, Signing));
        assert!(is_legal(Signing, Executing));
        assert!(is_legal(Executing, Completed));
    }

    #[test]
    fn cannot_skip_signing_straight_to_executing() {
        assert!(!is_legal(TransactionReceived, Executing));
        assert!(!is_legal(Waiting, Executing));
    }

    #[test]
    fn submission_failure_reverts_executing_to_signing() {
        assert!(is_legal(Executing, Signing));
    }
}
