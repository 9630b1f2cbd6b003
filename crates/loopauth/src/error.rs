// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

/// Failures produced by the authentication components.
///
/// Cancellation and timeouts are not errors; they surface as
/// [`crate::listener::AuthorizationResult::Cancelled`] and
/// [`crate::session::SessionOutcome::Cancelled`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The OS secure random source could not be read.
    CryptoUnavailable(String),
    /// The client configuration cannot produce a valid request.
    InvalidConfig(String),
    /// The redirect carried a `state` that does not match the one we sent.
    StateMismatch,
    /// The provider redirected back with an `error` parameter.
    Provider { error: String, description: Option<String> },
    /// The redirect carried neither `code` nor `error`.
    MissingCode,
    /// The token endpoint answered with a non-success status.
    ProviderRejected { status: u16, body: String },
    /// The token endpoint could not be reached.
    Network(String),
    /// The token endpoint answered 2xx with a body we cannot use.
    MalformedResponse(String),
    /// The loopback acceptor could not be bound or stopped serving.
    Listener(String),
    /// `AuthSession::run` was called on a session that already ran.
    SessionConsumed,
}

impl AuthError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CryptoUnavailable(_) => "CRYPTO_UNAVAILABLE",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::StateMismatch => "STATE_MISMATCH",
            Self::Provider { .. } => "PROVIDER_ERROR",
            Self::MissingCode => "MISSING_CODE",
            Self::ProviderRejected { .. } => "PROVIDER_REJECTED",
            Self::Network(_) => "NETWORK_ERROR",
            Self::MalformedResponse(_) => "MALFORMED_RESPONSE",
            Self::Listener(_) => "LISTENER_ERROR",
            Self::SessionConsumed => "SESSION_CONSUMED",
        }
    }

    /// Whether starting a fresh session may succeed without changing anything.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// Whether the failure may indicate an attack (forged redirect).
    pub fn is_security_relevant(&self) -> bool {
        matches!(self, Self::StateMismatch)
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CryptoUnavailable(msg) => write!(f, "secure random source unavailable: {msg}"),
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            Self::StateMismatch => {
                f.write_str("redirect state does not match request (possible CSRF)")
            }
            Self::Provider { error, description: Some(desc) } => {
                write!(f, "provider returned {error}: {desc}")
            }
            Self::Provider { error, description: None } => write!(f, "provider returned {error}"),
            Self::MissingCode => f.write_str("redirect carried no authorization code"),
            Self::ProviderRejected { status, body } => {
                write!(f, "token endpoint rejected exchange ({status}): {body}")
            }
            Self::Network(msg) => write!(f, "token endpoint unreachable: {msg}"),
            Self::MalformedResponse(msg) => write!(f, "malformed token response: {msg}"),
            Self::Listener(msg) => write!(f, "redirect listener failed: {msg}"),
            Self::SessionConsumed => f.write_str("session already ran; start a new one"),
        }
    }
}

impl std::error::Error for AuthError {}

/// The step of an [`crate::session::AuthSession`] at which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    GenerateChallenge,
    BindListener,
    BuildRequest,
    AwaitRedirect,
    ExchangeCode,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::GenerateChallenge => "generate_challenge",
            Self::BindListener => "bind_listener",
            Self::BuildRequest => "build_request",
            Self::AwaitRedirect => "await_redirect",
            Self::ExchangeCode => "exchange_code",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An [`AuthError`] tagged with the session stage that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionError {
    pub stage: Stage,
    pub source: AuthError,
}

impl SessionError {
    pub fn new(stage: Stage, source: AuthError) -> Self {
        Self { stage, source }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.stage, self.source)
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
