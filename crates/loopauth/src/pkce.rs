// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Proof Key for Code Exchange (RFC 7636) and the anti-CSRF state nonce.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::TryRngCore;
use sha2::{Digest, Sha256};

use crate::error::AuthError;

/// Random bytes behind a verifier or state (32 bytes → 43 base64url chars).
const ENTROPY_BYTES: usize = 32;

/// A code verifier and its S256 challenge.
///
/// The verifier only leaves the process in the token exchange request.
#[derive(Clone, PartialEq, Eq)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    /// Generate a fresh pair from the OS random source.
    pub fn generate() -> Result<Self, AuthError> {
        let verifier = random_token()?;
        let challenge = compute_code_challenge(&verifier);
        Ok(Self { verifier, challenge })
    }
}

impl std::fmt::Debug for PkcePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkcePair")
            .field("verifier", &"<redacted>")
            .field("challenge", &self.challenge)
            .finish()
    }
}

/// Compute code_challenge = base64url_nopad(sha256(verifier)).
pub fn compute_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Check that `challenge` was derived from `verifier`.
pub fn verify_challenge(verifier: &str, challenge: &str) -> bool {
    compute_code_challenge(verifier) == challenge
}

/// Whether `s` is a syntactically valid verifier (RFC 7636 §4.1).
pub fn is_valid_verifier(s: &str) -> bool {
    (43..=128).contains(&s.len())
        && s.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~'))
}

/// Generate a random state parameter.
pub fn generate_state() -> Result<String, AuthError> {
    random_token()
}

fn random_token() -> Result<String, AuthError> {
    let mut bytes = [0u8; ENTROPY_BYTES];
    OsRng.try_fill_bytes(&mut bytes).map_err(|e| AuthError::CryptoUnavailable(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

#[cfg(test)]
#[path = "pkce_tests.rs"]
mod tests;
