// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Authorization code → access token exchange.

use std::sync::Once;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

use crate::config::ClientConfig;
use crate::error::AuthError;
use crate::pkce::PkcePair;

/// Token endpoint request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

static CRYPTO_INIT: Once = Once::new();

/// Install the ring crypto provider for reqwest/rustls.
/// Only the first call has an effect.
pub fn ensure_crypto() {
    CRYPTO_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Standard OAuth2 token response.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default, deserialize_with = "seconds")]
    expires_in: Option<u64>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

/// `expires_in` as a JSON number, or a numeric string as some providers send it.
fn seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(u64),
        Text(String),
    }

    match Option::<Seconds>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Seconds::Number(n)) => Ok(Some(n)),
        Some(Seconds::Text(s)) => s.trim().parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// OAuth2 error body (RFC 6749 §5.2).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl TokenErrorResponse {
    /// Parse the error body of a [`AuthError::ProviderRejected`], if it is one.
    pub fn parse(body: &str) -> Option<Self> {
        serde_json::from_str(body).ok()
    }
}

/// An access token issued by the token endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub access_token: String,
    pub expires_in: Option<Duration>,
    pub token_type: String,
    pub scope: Option<String>,
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("access_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Terminal artifact of a token exchange.
pub type TokenResult = Result<AccessToken, AuthError>;

/// Single-attempt client for the token endpoint.
#[derive(Debug, Clone)]
pub struct TokenExchangeClient {
    http: reqwest::Client,
}

impl TokenExchangeClient {
    pub fn new() -> Result<Self, AuthError> {
        ensure_crypto();
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AuthError::Network(format!("build http client: {e}")))?;
        Ok(Self { http })
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Exchange an authorization code for a token. No retries.
    ///
    /// `redirect_uri` must be the one sent in the authorization request.
    pub async fn exchange(
        &self,
        config: &ClientConfig,
        redirect_uri: &Url,
        code: &str,
        pkce: &PkcePair,
    ) -> TokenResult {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri.as_str()),
            ("client_id", config.client_id.as_str()),
            ("code_verifier", pkce.verifier.as_str()),
        ];

        let resp = self
            .http
            .post(config.token_endpoint.clone())
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| AuthError::Network(format!("read body: {e}")))?;

        if !status.is_success() {
            if let Some(err) = TokenErrorResponse::parse(&body) {
                tracing::warn!(
                    status = status.as_u16(),
                    error = %err.error,
                    description = err.error_description.as_deref().unwrap_or_default(),
                    "token endpoint rejected exchange"
                );
            }
            return Err(AuthError::ProviderRejected { status: status.as_u16(), body });
        }

        parse_token_response(&body)
    }
}

/// Interpret a 2xx token endpoint body.
pub fn parse_token_response(body: &str) -> TokenResult {
    let token: TokenResponse =
        serde_json::from_str(body).map_err(|e| AuthError::MalformedResponse(e.to_string()))?;
    if token.access_token.is_empty() {
        return Err(AuthError::MalformedResponse("empty access_token".into()));
    }
    Ok(AccessToken {
        access_token: token.access_token,
        expires_in: token.expires_in.map(Duration::from_secs),
        token_type: token.token_type.filter(|t| !t.is_empty()).unwrap_or_else(|| "Bearer".to_owned()),
        scope: token.scope,
    })
}

#[cfg(test)]
#[path = "exchange_tests.rs"]
mod tests;
