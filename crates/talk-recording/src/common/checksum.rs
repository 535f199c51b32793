//! HMAC-SHA256 checksums shared with the call backend.
//!
//! Every message between the backend and the recording server carries a
//! random nonce and the hex HMAC of `nonce || body`, keyed by the secret
//! shared with that backend.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::Hmac;
use hmac::Mac;
use hmac::digest::InvalidLength;
use hmac::digest::KeyInit;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const NONCE_BYTES: usize = 64;

fn keyed_mac(secret: &[u8], nonce: &[u8], body: &[u8]) -> Result<HmacSha256, InvalidLength> {
    let mut mac = <HmacSha256 as KeyInit>::new_from_slice(secret)?;
    mac.update(nonce);
    mac.update(body);
    Ok(mac)
}

/// Lowercase hex HMAC-SHA256 of `nonce || body` keyed by `secret`.
pub fn compute_checksum(
    secret: &[u8],
    nonce: &[u8],
    body: &[u8],
) -> Result<String, InvalidLength> {
    let mac = keyed_mac(secret, nonce, body)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Compares `checksum` against the expected value in constant time.
///
/// Anything that is not valid hex of the right length is a mismatch, and so
/// is a secret the MAC refuses.
pub fn verify_checksum(secret: &[u8], nonce: &[u8], body: &[u8], checksum: &str) -> bool {
    let Ok(supplied) = hex::decode(checksum.trim()) else {
        return false;
    };
    let Ok(mac) = keyed_mac(secret, nonce, body) else {
        return false;
    };
    mac.verify_slice(&supplied).is_ok()
}

/// Fresh URL-safe random nonce for an outbound request.
pub fn generate_nonce() -> String {
    let bytes: [u8; NONCE_BYTES] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}
