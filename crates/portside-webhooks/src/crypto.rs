//! Payload signing and secret generation.
//!
//! Signatures are HMAC-SHA256 over the exact serialized envelope bytes that
//! go on the wire, emitted as `X-Signature: sha256=<hex>`. Receivers verify
//! by recomputing the HMAC over the raw body they received, so the body must
//! be signed byte-for-byte as sent.

use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Prefix used in the `X-Signature` header value.
pub const SIGNATURE_PREFIX: &str = "sha256=";

/// Prefix for generated subscription secrets.
const SECRET_PREFIX: &str = "whsec_";

/// Compute the hex-encoded HMAC-SHA256 of a payload body.
#[must_use]
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Build the full `X-Signature` header value for a payload body.
#[must_use]
pub fn signature_header(secret: &str, body: &[u8]) -> String {
    format!("{SIGNATURE_PREFIX}{}", sign(secret, body))
}

/// Verify an `X-Signature` header value against a received body.
///
/// Uses constant-time comparison. Returns false for malformed header values.
#[must_use]
pub fn verify(header_value: &str, secret: &str, body: &[u8]) -> bool {
    let Some(expected_hex) = header_value.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let computed = sign(secret, body);
    expected_hex
        .as_bytes()
        .ct_eq(computed.as_bytes())
        .into()
}

/// Generate a fresh signing secret (`whsec_` + 48 hex chars).
#[must_use]
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 24];
    OsRng.fill_bytes(&mut bytes);
    format!("{SECRET_PREFIX}{}", hex::encode(bytes))
}

/// Generate a random challenge string for endpoint verification probes.
#[must_use]
pub fn generate_challenge() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
