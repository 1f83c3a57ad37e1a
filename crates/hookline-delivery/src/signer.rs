//! HMAC-SHA256 request signing and verification.
//!
//! The dispatcher signs the exact bytes it transmits; the receiver
//! recomputes the MAC over the raw received body and compares in constant
//! time. Both sides must use the same shared secret and the same header
//! format, fixed here as `X-Webhook-Signature: sha256=<lowercase hex>`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the request signature.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

/// Scheme prefix on the header value.
const SIGNATURE_PREFIX: &str = "sha256=";

/// Computes HMAC-SHA256 over `body` keyed by `secret`, as lowercase hex.
///
/// Pure function: the same secret and bytes always produce the same tag.
/// The caller must pass the byte-identical body that goes on the wire.
pub fn sign(secret: &[u8], body: &[u8]) -> String {
    // HMAC accepts keys of any length, so construction cannot fail.
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Builds the `X-Webhook-Signature` header value for a request body.
pub fn signature_header(secret: &[u8], body: &[u8]) -> String {
    format!("{SIGNATURE_PREFIX}{}", sign(secret, body))
}

/// Verifies a signature header against the raw received body.
///
/// Recomputes the MAC and compares constant-time. Rejects a missing
/// prefix, wrong length, or any byte mismatch. This is the receiver side
/// of the contract; the dispatcher itself only signs.
pub fn verify(secret: &[u8], body: &[u8], header_value: &str) -> bool {
    let Some(claimed) = header_value.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let expected = sign(secret, body);
    timing_safe_eq(claimed, &expected)
}

/// Constant-time string comparison to prevent timing attacks.
fn timing_safe_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (a_byte, b_byte) in a.bytes().zip(b.bytes()) {
        result |= a_byte ^ b_byte;
    }

    result == 0
}
