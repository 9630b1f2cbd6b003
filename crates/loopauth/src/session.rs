// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One interactive sign-in, from window resolution to token.
//!
//! ```text
//! Idle → HandleResolved → ChallengeGenerated → RequestBuilt → AwaitingRedirect
//!      → CodeReceived → TokenAcquired
//!      ↘ Failed / Cancelled
//! ```

use std::fmt;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::browser::{BrowserLauncher, PrintUrl, SystemBrowser};
use crate::config::{ClientConfig, DEFAULT_TIMEOUT_SECS};
use crate::error::{AuthError, SessionError, Stage};
use crate::exchange::{AccessToken, TokenExchangeClient};
use crate::listener::{AuthorizationResult, RedirectListener};
use crate::pkce::PkcePair;
use crate::request::{build_authorization_url, AuthorizationState};
use crate::window::WindowHandleResolver;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    HandleResolved,
    ChallengeGenerated,
    RequestBuilt,
    AwaitingRedirect,
    CodeReceived,
    TokenAcquired,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::HandleResolved => "handle_resolved",
            Self::ChallengeGenerated => "challenge_generated",
            Self::RequestBuilt => "request_built",
            Self::AwaitingRedirect => "awaiting_redirect",
            Self::CodeReceived => "code_received",
            Self::TokenAcquired => "token_acquired",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::TokenAcquired | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Successful end of a session. Cancellation is not a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    TokenAcquired(AccessToken),
    /// The redirect wait timed out or was cancelled.
    Cancelled,
}

/// Drives one authorization code + PKCE sign-in. Single use.
pub struct AuthSession {
    config: ClientConfig,
    resolver: WindowHandleResolver,
    browser: Box<dyn BrowserLauncher>,
    exchange: TokenExchangeClient,
    timeout: Duration,
    cancel: CancellationToken,
    state: SessionState,
    history: Vec<SessionState>,
}

impl AuthSession {
    /// A session with the platform resolver, the system browser and the
    /// default redirect timeout.
    pub fn new(config: ClientConfig) -> Result<Self, AuthError> {
        Ok(Self {
            config,
            resolver: WindowHandleResolver::platform(),
            browser: Box::new(SystemBrowser),
            exchange: TokenExchangeClient::new()?,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            cancel: CancellationToken::new(),
            state: SessionState::Idle,
            history: vec![SessionState::Idle],
        })
    }

    pub fn with_browser(mut self, browser: impl BrowserLauncher + 'static) -> Self {
        self.browser = Box::new(browser);
        self
    }

    pub fn with_resolver(mut self, resolver: WindowHandleResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_exchange_client(mut self, exchange: TokenExchangeClient) -> Self {
        self.exchange = exchange;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Cancelling `cancel` ends the redirect wait with [`SessionOutcome::Cancelled`].
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Every state entered so far, starting with `Idle`.
    pub fn history(&self) -> &[SessionState] {
        &self.history
    }

    /// Run the sign-in to completion.
    ///
    /// A session runs once; calling this again fails at [`Stage::Start`]
    /// with [`AuthError::SessionConsumed`] and performs no I/O.
    pub async fn run(&mut self) -> Result<SessionOutcome, SessionError> {
        if self.state != SessionState::Idle {
            return Err(SessionError::new(Stage::Start, AuthError::SessionConsumed));
        }

        let result = self.drive().await;
        match result {
            Ok(SessionOutcome::TokenAcquired(ref token)) => {
                self.transition(SessionState::TokenAcquired);
                info!(
                    token_type = %token.token_type,
                    expires_in = token.expires_in.map(|d| d.as_secs()),
                    "token acquired"
                );
            }
            Ok(SessionOutcome::Cancelled) => self.transition(SessionState::Cancelled),
            Err(ref e) => {
                self.transition(SessionState::Failed);
                if e.source.is_security_relevant() {
                    warn!(stage = %e.stage, code = e.source.as_str(), "redirect rejected: {}", e.source);
                } else {
                    warn!(stage = %e.stage, code = e.source.as_str(), "sign-in failed: {}", e.source);
                }
            }
        }
        result
    }

    async fn drive(&mut self) -> Result<SessionOutcome, SessionError> {
        let parent = self.resolver.resolve();
        self.transition(SessionState::HandleResolved);

        let pkce = PkcePair::generate().map_err(at(Stage::GenerateChallenge))?;
        self.transition(SessionState::ChallengeGenerated);

        // Reject an unusable config before taking a port.
        self.config.validate().map_err(at(Stage::BuildRequest))?;

        let listener = RedirectListener::bind(&self.config.redirect_uri)
            .await
            .map_err(at(Stage::BindListener))?;
        let expected = AuthorizationState::generate(listener.redirect_uri().clone())
            .map_err(at(Stage::GenerateChallenge))?;
        let url = build_authorization_url(&self.config, &pkce, &expected)
            .map_err(at(Stage::BuildRequest))?;
        self.transition(SessionState::RequestBuilt);

        if let Err(e) = self.browser.open(&url, parent) {
            warn!(err = %e, "could not open browser");
            let _ = PrintUrl.open(&url, parent);
        }

        self.transition(SessionState::AwaitingRedirect);
        let result = listener
            .await_redirect(&expected, self.timeout, &self.cancel)
            .await
            .map_err(at(Stage::AwaitRedirect))?;

        let code = match result {
            AuthorizationResult::Code(code) => code,
            AuthorizationResult::Error { kind, description } => {
                return Err(SessionError::new(Stage::AwaitRedirect, kind.into_error(description)));
            }
            AuthorizationResult::Cancelled => return Ok(SessionOutcome::Cancelled),
        };
        self.transition(SessionState::CodeReceived);

        let token = self
            .exchange
            .exchange(&self.config, &expected.expected_redirect_uri, &code, &pkce)
            .await
            .map_err(at(Stage::ExchangeCode))?;
        Ok(SessionOutcome::TokenAcquired(token))
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = %self.state, to = %next, "session transition");
        self.state = next;
        self.history.push(next);
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("client_id", &self.config.client_id)
            .field("timeout", &self.timeout)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

fn at(stage: Stage) -> impl FnOnce(AuthError) -> SessionError {
    move |source| SessionError::new(stage, source)
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
