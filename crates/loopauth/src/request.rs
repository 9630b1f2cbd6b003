// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authorization request construction.

use url::Url;

use crate::config::ClientConfig;
use crate::error::AuthError;
use crate::pkce::{self, PkcePair};

/// Per-session anti-CSRF state and the redirect it is expected on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationState {
    pub state: String,
    pub expected_redirect_uri: Url,
}

impl AuthorizationState {
    /// Create state with a fresh random nonce.
    pub fn generate(expected_redirect_uri: Url) -> Result<Self, AuthError> {
        Ok(Self { state: pkce::generate_state()?, expected_redirect_uri })
    }

    /// Exact, case-sensitive comparison against a redirect's `state`.
    pub fn matches(&self, received: &str) -> bool {
        self.state == received
    }
}

/// Build the full authorization URL with PKCE parameters.
///
/// The redirect URI is taken from `state`, which carries the effective
/// (bound) loopback address rather than the configured template.
pub fn build_authorization_url(
    config: &ClientConfig,
    pkce: &PkcePair,
    state: &AuthorizationState,
) -> Result<Url, AuthError> {
    if config.client_id.trim().is_empty() {
        return Err(AuthError::InvalidConfig("client_id is empty".into()));
    }
    if config.scopes.is_empty() || config.scopes.iter().any(|s| s.trim().is_empty()) {
        return Err(AuthError::InvalidConfig("scopes must be non-empty".into()));
    }
    let redirect_uri = &state.expected_redirect_uri;
    if redirect_uri.host_str().map_or(true, str::is_empty) {
        return Err(AuthError::InvalidConfig("redirect_uri is empty".into()));
    }

    let mut url = config.authorization_endpoint.clone();
    {
        let mut q = url.query_pairs_mut();
        q.append_pair("client_id", &config.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", redirect_uri.as_str())
            .append_pair("scope", &config.scope_param())
            .append_pair("code_challenge", &pkce.challenge)
            .append_pair("code_challenge_method", "S256")
            .append_pair("state", &state.state);
        if let Some(prompt) = config.prompt {
            q.append_pair("prompt", prompt.as_str());
        }
        if let Some(ref hint) = config.login_hint {
            q.append_pair("login_hint", hint);
        }
    }
    Ok(url)
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
