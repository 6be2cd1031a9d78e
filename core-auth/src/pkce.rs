//! PKCE material generation (RFC 7636, S256 only).
//!
//! The verifier is held only long enough to journal it into the
//! continuation store; the challenge is a one-way SHA-256 digest, so nothing
//! derivable from the outgoing authorization URL reveals the verifier.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// RFC 7636 bounds on verifier length.
pub const MIN_VERIFIER_LEN: usize = 43;
pub const MAX_VERIFIER_LEN: usize = 128;

/// Raw entropy fed into the verifier. 48 bytes encode to 64 base64url
/// characters, comfortably inside the 43..=128 window.
const VERIFIER_ENTROPY_BYTES: usize = 48;

/// Generate a fresh code verifier from OS randomness.
///
/// The output alphabet is base64url without padding, a subset of the
/// unreserved characters RFC 7636 permits.
pub fn generate_verifier() -> String {
    let mut bytes = [0u8; VERIFIER_ENTROPY_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Derive the S256 code challenge for a verifier:
/// `base64url_nopad(sha256(ascii(verifier)))`.
pub fn derive_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Generate an opaque `state` value binding the redirect to this attempt.
pub fn generate_state() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
