//! Shared signing primitives for every venue's authentication scheme
//! (spec.md §4.1's exhaustive enumeration). Each venue module holds its
//! own payload-assembly logic and calls into these primitives; no adapter
//! re-implements HMAC or base64 by hand.

use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha384, Sha512};

pub fn hmac_sha256_hex(secret: &[u8], payload: &str) -> String {
    hex::encode(hmac_sha256_bytes(secret, payload))
}

pub fn hmac_sha256_base64(secret: &[u8], payload: &str) -> String {
    base64_encode(&hmac_sha256_bytes(secret, payload))
}

pub fn hmac_sha512_hex(secret: &[u8], payload: &str) -> String {
    hex::encode(hmac_sha512_bytes(secret, payload))
}

pub fn hmac_sha512_base64(secret: &[u8], payload: &[u8]) -> String {
    base64_encode(&hmac_sha512_bytes(secret, payload))
}

pub fn hmac_sha384_base64(secret: &[u8], payload: &str) -> String {
    type HmacSha384 = Hmac<Sha384>;
    let mut mac = HmacSha384::new_from_slice(secret).expect("HMAC accepts a key of any size");
    mac.update(payload.as_bytes());
    base64_encode(&mac.finalize().into_bytes())
}

fn hmac_sha256_bytes(secret: &[u8], payload: impl AsRef<[u8]>) -> Vec<u8> {
    type HmacSha256 = Hmac<Sha256>;
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts a key of any size");
    mac.update(payload.as_ref());
    mac.finalize().into_bytes().to_vec()
}

fn hmac_sha512_bytes(secret: &[u8], payload: impl AsRef<[u8]>) -> Vec<u8> {
    type HmacSha512 = Hmac<Sha512>;
    let mut mac = HmacSha512::new_from_slice(secret).expect("HMAC accepts a key of any size");
    mac.update(payload.as_ref());
    mac.finalize().into_bytes().to_vec()
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

pub fn base64_encode(input: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(input)
}

pub fn base64_decode(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::STANDARD.decode(input)
}

/// Kraken's secret arrives base64-encoded; the HMAC key is the decoded bytes.
pub fn kraken_signature(
    path: &str,
    nonce: &str,
    body: &str,
    secret_b64: &str,
) -> Result<String, base64::DecodeError> {
    let secret = base64_decode(secret_b64)?;
    let mut hasher = Sha256::new();
    hasher.update(nonce.as_bytes());
    hasher.update(body.as_bytes());
    let nonce_body_hash = hasher.finalize();

    let mut message = path.as_bytes().to_vec();
    message.extend_from_slice(&nonce_body_hash);

    Ok(hmac_sha512_base64(&secret, &message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_roundtrip() {
        let original = b"quantflow signing test";
        let encoded = base64_encode(original);
        assert_eq!(base64_decode(&encoded).unwrap(), original);
    }

    #[test]
    fn hmac_sha256_hex_is_deterministic() {
        let a = hmac_sha256_hex(b"secret", "payload");
        let b = hmac_sha256_hex(b"secret", "payload");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn hmac_sha512_hex_known_length() {
        assert_eq!(hmac_sha512_hex(b"k", "v").len(), 128);
    }

    #[test]
    fn kraken_signature_is_stable_for_same_inputs() {
        let secret = base64_encode(b"0123456789abcdef0123456789abcdef");
        let a = kraken_signature("/0/private/AddOrder", "1", "nonce=1", &secret).unwrap();
        let b = kraken_signature("/0/private/AddOrder", "1", "nonce=1", &secret).unwrap();
        assert_eq!(a, b);
    }
}
