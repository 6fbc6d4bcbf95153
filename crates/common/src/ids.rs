//! Identifier and credential generation.
//!
//! Three distinct generators, each sized for its purpose per spec §3:
//! - `session_id`: 128-bit random, hex-encoded.
//! - `token`: 8-character alphanumeric from a reduced, unambiguous alphabet,
//!   used as the participant-facing shared secret (entropy >= 39 bits).
//! - `participant_id`: 64-bit random, hex-encoded.

use rand::Rng;

/// Alphabet with visually-ambiguous characters removed (`I`, `L`, `O`).
/// 33 symbols; `33^8` gives a little over 39 bits of entropy.
const TOKEN_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Generate a session id: 16 random bytes, hex-encoded (32 chars).
pub fn generate_session_id() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    hex::encode(bytes)
}

/// Generate an 8-character session token from [`TOKEN_ALPHABET`].
pub fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    (0..8)
        .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}

/// Generate a participant id: 8 random bytes, hex-encoded (16 chars).
pub fn generate_participant_id() -> String {
    let bytes: [u8; 8] = rand::thread_rng().gen();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn session_id_is_32_hex_chars() {
        let id = generate_session_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn participant_id_is_16_hex_chars() {
        let id = generate_participant_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn token_uses_reduced_alphabet_only() {
        for _ in 0..200 {
            let token = generate_token();
            assert_eq!(token.len(), 8);
            for c in token.chars() {
                assert!(!matches!(c, 'I' | 'L' | 'O'));
                assert!(TOKEN_ALPHABET.contains(&(c as u8)));
            }
        }
    }

    #[test]
    fn generators_are_not_constant() {
        let mut seen = HashSet::new();
        for _ in 0..50 {
            seen.insert(generate_session_id());
        }
        assert!(seen.len() > 40, "session ids collided too often");
    }
}
