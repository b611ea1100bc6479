//! HMAC-SHA256 webhook signatures
//!
//! The signed message is `timestamp + body`; the signature is lowercase hex.
//! Receivers recompute it with the subscription secret to verify authenticity.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// Header carrying the hex-encoded signature
pub const SIGNATURE_HEADER: &str = "X-EVENTSTREAM-SIGNATURE";
/// Header carrying the timestamp that was signed
pub const TIMESTAMP_HEADER: &str = "X-EVENTSTREAM-TIMESTAMP";

type HmacSha256 = Hmac<Sha256>;

/// Sign a body with the current time. Returns `(signature, timestamp)`.
pub fn sign_payload(body: &str, secret: &str) -> (String, String) {
    // ISO8601 with millisecond precision
    let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
    let signature = compute_signature(&timestamp, body.as_bytes(), secret);
    (signature, timestamp)
}

pub fn compute_signature(timestamp: &str, body: &[u8], secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(timestamp.as_bytes());
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a received signature
pub fn verify_signature(signature: &str, timestamp: &str, body: &[u8], secret: &str) -> bool {
    let expected = compute_signature(timestamp, body, secret);
    expected.as_bytes().ct_eq(signature.trim().to_ascii_lowercase().as_bytes()).into()
}
