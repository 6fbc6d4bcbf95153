//! Coordinator-metadata sanitization (spec §4.4).
//!
//! `description`, `amount`, and `recipient` are coordinator-supplied,
//! entirely unverified context for the human signer: they are never
//! derived from, or checked against, `frozen_transaction.bytes`. Every
//! field is wrapped in an `UNVERIFIED` advisory marker before it reaches
//! a participant.

use std::sync::OnceLock;

use multisig_common::types::{AdvisoryField, CoordinatorMetadata};
use multisig_wire::CoordinatorMetadataInput;
use regex::Regex;

const MAX_DESCRIPTION_LEN: usize = 500;

fn urgency_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)urgent|immediately|asap|hurry|quickly|emergency|critical").unwrap()
    })
}

/// Truncate `description` and tag every present field `UNVERIFIED`. Sets
/// `flagged` if `description` matches an urgency-pressure heuristic
/// (spec §4.4): this is advisory only, never a rejection.
pub fn sanitize(input: Option<CoordinatorMetadataInput>) -> Option<CoordinatorMetadata> {
    let input = input?;

    let flagged = input
        .description
        .as_deref()
        .map(|d| urgency_pattern().is_match(d))
        .unwrap_or(false);

    let description = input.description.map(|mut d| {
        if d.len() > MAX_DESCRIPTION_LEN {
            d.truncate(MAX_DESCRIPTION_LEN);
        }
        AdvisoryField::new(d)
    });

    Some(CoordinatorMetadata {
        description,
        amount: input.amount.map(AdvisoryField::new),
        recipient: input.recipient.map(AdvisoryField::new),
        flagged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_description_is_truncated() {
        let input = CoordinatorMetadataInput {
            description: Some("x".repeat(600)),
            amount: None,
            recipient: None,
        };
        let sanitized = sanitize(Some(input)).unwrap();
        assert_eq!(sanitized.description.unwrap().value.len(), MAX_DESCRIPTION_LEN);
    }

    #[test]
    fn urgency_language_is_flagged_but_not_rejected() {
        let input = CoordinatorMetadataInput {
            description: Some("This is urgent, please sign immediately!".to_string()),
            amount: None,
            recipient: None,
        };
        let sanitized = sanitize(Some(input)).unwrap();
        assert!(sanitized.flagged);
    }

    #[test]
    fn ordinary_description_is_not_flagged() {
        let input = CoordinatorMetadataInput {
            description: Some("Monthly treasury disbursement".to_string()),
            amount: Some("125.00".to_string()),
            recipient: Some("0xabc".to_string()),
        };
        let sanitized = sanitize(Some(input)).unwrap();
        assert!(!sanitized.flagged);
        assert!(sanitized.amount.is_some());
        assert!(sanitized.recipient.is_some());
    }

    #[test]
    fn absent_metadata_stays_absent() {
        assert!(sanitize(None).is_none());
    }
}
