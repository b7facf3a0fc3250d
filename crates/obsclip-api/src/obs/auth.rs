//! OBS WebSocket v5 challenge-response authentication.

use base64::engine::general_purpose::STANDARD as Base64Engine;
use base64::Engine;
use sha2::{Digest, Sha256};

/// Compute the `authentication` string for an Identify message.
///
/// `base64(sha256(base64(sha256(password + salt)) + challenge))`
pub fn authentication_string(password: &str, salt: &str, challenge: &str) -> String {
    let mut sha = Sha256::new();
    sha.update(format!("{password}{salt}").as_bytes());
    let secret = Base64Engine.encode(sha.finalize_reset());

    sha.update(format!("{secret}{challenge}").as_bytes());
    Base64Engine.encode(sha.finalize())
}
