//! Public key parsing, signature verification, and hashing (spec §C1).
//!
//! Two key families are supported, matching the grant-signing idiom used
//! elsewhere in the workspace: Ed25519 (`ed25519-dalek`) and secp256k1
//! ECDSA (`k256`). Keys and signatures each accept a small family of wire
//! encodings; callers never need to know which encoding a peer used.

use ed25519_dalek::Verifier;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("public key could not be parsed")]
    InvalidKeyFormat,

    #[error("signature could not be parsed")]
    InvalidSignatureFormat,

    #[error("signature does not verify")]
    VerificationFailed,
}

/// A parsed public key, tagged with its algorithm (spec §C1).
#[derive(Debug, Clone)]
pub enum PublicKey {
    Ed25519(ed25519_dalek::VerifyingKey),
    Secp256k1(k256::ecdsa::VerifyingKey),
}

impl PublicKey {
    pub fn algorithm(&self) -> &'static str {
        match self {
            Self::Ed25519(_) => "ed25519",
            Self::Secp256k1(_) => "secp256k1",
        }
    }

    /// Canonical lowercase-hex form, used for eligibility comparison and
    /// as the map key under which signatures and participants are tracked.
    pub fn canonical_hex(&self) -> String {
        match self {
            Self::Ed25519(k) => hex::encode(k.as_bytes()),
            Self::Secp256k1(k) => hex::encode(k.to_encoded_point(true).as_bytes()),
        }
    }
}

/// RFC 8410 SubjectPublicKeyInfo header for a raw 32-byte Ed25519 key:
/// SEQUENCE { SEQUENCE { OID 1.3.101.112 } BIT STRING { 0 unused, 32 bytes } }
const ED25519_DER_PREFIX: [u8; 12] = [
    0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00,
];

/// SubjectPublicKeyInfo header for an uncompressed secp256k1 point:
/// SEQUENCE { SEQUENCE { OID id-ecPublicKey, OID secp256k1 } BIT STRING }
const SECP256K1_DER_PREFIX: [u8; 23] = [
    0x30, 0x36, 0x30, 0x10, 0x06, 0x07, 0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01, 0x06, 0x05,
    0x2b, 0x81, 0x04, 0x00, 0x0a, 0x03, 0x42, 0x00,
];

/// Parse a public key from either a raw hex string or a DER-prefixed hex
/// string, per spec §C1. Raw 32-byte (64 hex char) keys are treated as
/// Ed25519; raw 33- or 65-byte keys are treated as secp256k1 SEC1 points.
/// DER-prefixed keys are recognized by matching one of the two known
/// SubjectPublicKeyInfo headers above and are dispatched accordingly.
pub fn parse_public_key(input: &str) -> Result<PublicKey, CryptoError> {
    let trimmed = input.strip_prefix("0x").unwrap_or(input);
    let bytes = hex::decode(trimmed).map_err(|_| CryptoError::InvalidKeyFormat)?;

    if let Some(rest) = bytes.strip_prefix(ED25519_DER_PREFIX.as_slice()) {
        return parse_ed25519_raw(rest);
    }
    if let Some(rest) = bytes.strip_prefix(SECP256K1_DER_PREFIX.as_slice()) {
        return parse_secp256k1_raw(rest);
    }

    match bytes.len() {
        32 => parse_ed25519_raw(&bytes),
        33 | 65 => parse_secp256k1_raw(&bytes),
        _ => Err(CryptoError::InvalidKeyFormat),
    }
}

fn parse_ed25519_raw(bytes: &[u8]) -> Result<PublicKey, CryptoError> {
    let arr: [u8; 32] = bytes.try_into().map_err(|_| CryptoError::InvalidKeyFormat)?;
    ed25519_dalek::VerifyingKey::from_bytes(&arr)
        .map(PublicKey::Ed25519)
        .map_err(|_| CryptoError::InvalidKeyFormat)
}

fn parse_secp256k1_raw(bytes: &[u8]) -> Result<PublicKey, CryptoError> {
    k256::ecdsa::VerifyingKey::from_sec1_bytes(bytes)
        .map(PublicKey::Secp256k1)
        .map_err(|_| CryptoError::InvalidKeyFormat)
}

/// A parsed signature, shaped to match whichever key family it verifies
/// against.
#[derive(Debug, Clone)]
pub enum ParsedSignature {
    Ed25519(ed25519_dalek::Signature),
    Secp256k1(k256::ecdsa::Signature),
}

/// Parse a signature's raw bytes against the algorithm of `key`. Accepts
/// hex (optionally `0x`-prefixed) or standard base64.
pub fn parse_signature(key: &PublicKey, input: &str) -> Result<ParsedSignature, CryptoError> {
    let bytes = decode_bytes(input)?;
    match key {
        PublicKey::Ed25519(_) => {
            let arr: [u8; 64] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| CryptoError::InvalidSignatureFormat)?;
            Ok(ParsedSignature::Ed25519(ed25519_dalek::Signature::from_bytes(&arr)))
        }
        PublicKey::Secp256k1(_) => k256::ecdsa::Signature::from_slice(&bytes)
            .or_else(|_| k256::ecdsa::Signature::from_der(&bytes))
            .map(ParsedSignature::Secp256k1)
            .map_err(|_| CryptoError::InvalidSignatureFormat),
    }
}

fn decode_bytes(input: &str) -> Result<Vec<u8>, CryptoError> {
    let trimmed = input.strip_prefix("0x").unwrap_or(input);
    if let Ok(bytes) = hex::decode(trimmed) {
        return Ok(bytes);
    }
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(input)
        .map_err(|_| CryptoError::InvalidSignatureFormat)
}

/// Verify `signature` against `message` under `key`. This is the sole
/// point invariant I5 (no signature is stored unless it has passed
/// verification) depends on.
pub fn verify(key: &PublicKey, message: &[u8], signature: &ParsedSignature) -> Result<(), CryptoError> {
    match (key, signature) {
        (PublicKey::Ed25519(k), ParsedSignature::Ed25519(sig)) => k
            .verify(message, sig)
            .map_err(|_| CryptoError::VerificationFailed),
        (PublicKey::Secp256k1(k), ParsedSignature::Secp256k1(sig)) => {
            use k256::ecdsa::signature::Verifier as _;
            k.verify(message, sig)
                .map_err(|_| CryptoError::VerificationFailed)
        }
        _ => Err(CryptoError::VerificationFailed),
    }
}

/// SHA-256 digest, hex-encoded. Used for transaction hashes and audit log
/// content hashes.
pub fn sha256(data: &[u8]) -> String {
    use sha2::Digest;
    let digest = sha2::Sha256::digest(data);
    hex::encode(digest)
}

/// A short, human-displayable checksum over `data`: the first eight bytes
/// of its SHA-256 digest, as a 16-character hex string. Used where a full
/// hash would be unwieldy to read aloud or compare by eye.
pub fn checksum16(data: &[u8]) -> String {
    use sha2::Digest;
    let digest = sha2::Sha256::digest(data);
    hex::encode(&digest[..8])
}

/// Normalize a public key string for eligibility comparisons: strip an
/// optional `0x` prefix and lowercase. Two keys that normalize equal are
/// treated as the same eligible signer regardless of how either party
/// formatted it on the wire (spec §3, key eligibility-equivalence).
pub fn normalize_public_key(input: &str) -> String {
    input.strip_prefix("0x").unwrap_or(input).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::Signer;

    #[test]
    fn ed25519_raw_hex_round_trips() {
        let mut rng = rand::rngs::OsRng;
        let signing_key = ed25519_dalek::SigningKey::generate(&mut rng);
        let hex_key = hex::encode(signing_key.verifying_key().as_bytes());
        let parsed = parse_public_key(&hex_key).unwrap();
        assert_eq!(parsed.algorithm(), "ed25519");
    }

    #[test]
    fn ed25519_der_prefixed_key_parses() {
        let mut rng = rand::rngs::OsRng;
        let signing_key = ed25519_dalek::SigningKey::generate(&mut rng);
        let mut der = ED25519_DER_PREFIX.to_vec();
        der.extend_from_slice(signing_key.verifying_key().as_bytes());
        let parsed = parse_public_key(&hex::encode(der)).unwrap();
        assert_eq!(parsed.canonical_hex(), hex::encode(signing_key.verifying_key().as_bytes()));
    }

    #[test]
    fn ed25519_sign_and_verify() {
        let mut rng = rand::rngs::OsRng;
        let signing_key = ed25519_dalek::SigningKey::generate(&mut rng);
        let key = PublicKey::Ed25519(signing_key.verifying_key());
        let message = b"frozen transaction bytes";
        let sig = signing_key.sign(message);
        let parsed_sig = parse_signature(&key, &hex::encode(sig.to_bytes())).unwrap();
        assert!(verify(&key, message, &parsed_sig).is_ok());
    }

    #[test]
    fn tampered_message_fails_verification() {
        let mut rng = rand::rngs::OsRng;
        let signing_key = ed25519_dalek::SigningKey::generate(&mut rng);
        let key = PublicKey::Ed25519(signing_key.verifying_key());
        let sig = signing_key.sign(b"original");
        let parsed_sig = parse_signature(&key, &hex::encode(sig.to_bytes())).unwrap();
        assert!(verify(&key, b"tampered", &parsed_sig).is_err());
    }

    #[test]
    fn secp256k1_compressed_raw_key_parses() {
        let signing_key = k256::ecdsa::SigningKey::random(&mut rand::rngs::OsRng);
        let verifying_key = k256::ecdsa::VerifyingKey::from(&signing_key);
        let compressed = verifying_key.to_encoded_point(true);
        let parsed = parse_public_key(&hex::encode(compressed.as_bytes())).unwrap();
        assert_eq!(parsed.algorithm(), "secp256k1");
    }

    #[test]
    fn secp256k1_sign_and_verify() {
        use k256::ecdsa::signature::Signer as _;
        let signing_key = k256::ecdsa::SigningKey::random(&mut rand::rngs::OsRng);
        let verifying_key = k256::ecdsa::VerifyingKey::from(&signing_key);
        let key = PublicKey::Secp256k1(verifying_key);
        let message = b"frozen transaction bytes";
        let sig: k256::ecdsa::Signature = signing_key.sign(message);
        let parsed_sig = parse_signature(&key, &hex::encode(sig.to_bytes())).unwrap();
        assert!(verify(&key, message, &parsed_sig).is_ok());
    }

    #[test]
    fn normalize_strips_prefix_and_lowercases() {
        assert_eq!(normalize_public_key("0xABCDEF"), "abcdef");
        assert_eq!(normalize_public_key("ABCDEF"), "abcdef");
    }

    #[test]
    fn checksum16_is_sixteen_hex_chars() {
        let sum = checksum16(b"hello");
        assert_eq!(sum.len(), 16);
        assert!(sum.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn invalid_hex_key_is_rejected() {
        assert!(parse_public_key("not-hex").is_err());
    }
}
