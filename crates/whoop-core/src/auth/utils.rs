use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;

use super::AuthError;

const STATE_BYTES: usize = 32;

/// Fresh URL-safe CSRF state carrying 256 bits of entropy.
pub fn random_state() -> String {
    let mut bytes = [0u8; STATE_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Compare the state returned by the provider against the one issued for this attempt.
pub fn verify_state(returned: &str, expected: &str) -> Result<(), AuthError> {
    if returned != expected {
        return Err(AuthError::StateMismatch);
    }
    Ok(())
}
