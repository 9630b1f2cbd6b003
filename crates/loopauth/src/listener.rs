// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Loopback HTTP acceptor for the authorization redirect.
//!
//! The listener honours exactly one redirect per session. Later requests on
//! the redirect path get a static "you may close this window" page; other
//! paths (favicon probes and the like) get 404 and do not count.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{RawQuery, State};
use axum::http::{Method, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::{Host, Url};

use crate::error::AuthError;
use crate::request::AuthorizationState;

/// How long a stopping callback server may take to flush its last response.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

const SUCCESS_PAGE: &str = "<!doctype html><html><head><title>Signed in</title></head>\
<body><h1>Signed in</h1><p>You may close this window and return to the terminal.</p></body></html>";

const FAILURE_PAGE: &str = "<!doctype html><html><head><title>Sign-in failed</title></head>\
<body><h1>Sign-in failed</h1><p>Return to the terminal for details. You may close this window.</p></body></html>";

const CLOSED_PAGE: &str = "<!doctype html><html><head><title>Done</title></head>\
<body><p>This sign-in has already completed. You may close this window.</p></body></html>";

/// What came back on the redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationResult {
    Code(String),
    Error { kind: CallbackErrorKind, description: Option<String> },
    /// No redirect before the timeout, or the wait was cancelled.
    Cancelled,
}

/// Why a redirect did not yield a code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackErrorKind {
    /// The provider's `error` code, verbatim.
    Provider(String),
    StateMismatch,
    MissingCode,
}

impl CallbackErrorKind {
    pub fn into_error(self, description: Option<String>) -> AuthError {
        match self {
            Self::Provider(error) => AuthError::Provider { error, description },
            Self::StateMismatch => AuthError::StateMismatch,
            Self::MissingCode => AuthError::MissingCode,
        }
    }
}

/// Query parameters the provider may put on the redirect.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Parse a redirect query string. Unknown keys are ignored.
    ///
    /// A key we read that appears more than once makes the redirect
    /// ambiguous; the repeated key is returned as the error.
    pub fn from_query(query: &str) -> Result<Self, String> {
        let mut params = Self::default();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let slot = match key.as_ref() {
                "code" => &mut params.code,
                "state" => &mut params.state,
                "error" => &mut params.error,
                "error_description" => &mut params.error_description,
                _ => continue,
            };
            if slot.is_some() {
                return Err(key.into_owned());
            }
            *slot = Some(value.into_owned());
        }
        Ok(params)
    }
}

/// Classify a redirect: provider error first, then state, then code.
pub fn interpret_callback(
    params: &CallbackParams,
    expected: &AuthorizationState,
) -> AuthorizationResult {
    if let Some(ref error) = params.error {
        return AuthorizationResult::Error {
            kind: CallbackErrorKind::Provider(error.clone()),
            description: params.error_description.clone(),
        };
    }
    let state_ok = params.state.as_deref().is_some_and(|s| expected.matches(s));
    if !state_ok {
        return AuthorizationResult::Error {
            kind: CallbackErrorKind::StateMismatch,
            description: None,
        };
    }
    match params.code.as_deref() {
        Some(code) if !code.is_empty() => AuthorizationResult::Code(code.to_owned()),
        _ => AuthorizationResult::Error { kind: CallbackErrorKind::MissingCode, description: None },
    }
}

/// Classify a redirect whose query repeats a parameter.
///
/// A repeated `state` cannot be matched against ours; anything else
/// leaves no single code to exchange.
pub fn interpret_ambiguous(repeated: &str) -> AuthorizationResult {
    let kind = if repeated == "state" {
        CallbackErrorKind::StateMismatch
    } else {
        CallbackErrorKind::MissingCode
    };
    AuthorizationResult::Error { kind, description: Some(format!("repeated `{repeated}` parameter")) }
}

struct CallbackState {
    expected: AuthorizationState,
    slot: Mutex<Option<oneshot::Sender<AuthorizationResult>>>,
}

/// Router serving the redirect path. The first GET is classified and sent on `tx`.
pub fn callback_router(
    path: &str,
    expected: AuthorizationState,
    tx: oneshot::Sender<AuthorizationResult>,
) -> Router {
    let state = Arc::new(CallbackState { expected, slot: Mutex::new(Some(tx)) });
    Router::new()
        .route(path, get(handle_callback))
        .fallback(|| async { StatusCode::NOT_FOUND })
        .with_state(state)
}

async fn handle_callback(
    method: Method,
    State(s): State<Arc<CallbackState>>,
    RawQuery(query): RawQuery,
) -> impl IntoResponse {
    if method == Method::HEAD {
        return Html(CLOSED_PAGE);
    }
    let Some(tx) = s.slot.lock().take() else {
        debug!("ignoring repeated redirect");
        return Html(CLOSED_PAGE);
    };
    let result = match CallbackParams::from_query(query.as_deref().unwrap_or_default()) {
        Ok(params) => interpret_callback(&params, &s.expected),
        Err(repeated) => {
            warn!(param = %repeated, "redirect repeats a parameter");
            interpret_ambiguous(&repeated)
        }
    };
    let page = match result {
        AuthorizationResult::Code(_) => SUCCESS_PAGE,
        _ => FAILURE_PAGE,
    };
    let _ = tx.send(result);
    Html(page)
}

/// A bound loopback acceptor waiting to serve one redirect.
#[derive(Debug)]
pub struct RedirectListener {
    listener: TcpListener,
    redirect_uri: Url,
}

impl RedirectListener {
    /// Bind the host and port named by `redirect_uri`.
    ///
    /// Without an explicit port an ephemeral one is chosen; use
    /// [`Self::redirect_uri`] for the address to send to the provider.
    pub async fn bind(redirect_uri: &Url) -> Result<Self, AuthError> {
        if redirect_uri.scheme() != "http" {
            return Err(AuthError::InvalidConfig(format!(
                "redirect_uri must be an http loopback address, got {redirect_uri}"
            )));
        }
        if redirect_uri.path().contains(['{', '}', '*', ':']) {
            return Err(AuthError::InvalidConfig(format!(
                "redirect_uri path must be a plain path, got {}",
                redirect_uri.path()
            )));
        }
        let ip = loopback_ip(redirect_uri)?;
        let addr = SocketAddr::new(ip, redirect_uri.port().unwrap_or(0));

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| AuthError::Listener(format!("bind {addr}: {e}")))?;
        let bound = listener.local_addr().map_err(|e| AuthError::Listener(e.to_string()))?;

        let mut effective = redirect_uri.clone();
        effective
            .set_port(Some(bound.port()))
            .map_err(|()| AuthError::InvalidConfig(format!("cannot set port on {redirect_uri}")))?;

        info!(addr = %bound, redirect_uri = %effective, "redirect listener bound");
        Ok(Self { listener, redirect_uri: effective })
    }

    /// The redirect URI with the bound port filled in.
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    pub fn local_addr(&self) -> Result<SocketAddr, AuthError> {
        self.listener.local_addr().map_err(|e| AuthError::Listener(e.to_string()))
    }

    /// Serve until one redirect arrives, `timeout` elapses, or `cancel` fires.
    ///
    /// The acceptor is closed before this returns, and also if the returned
    /// future is dropped early.
    pub async fn await_redirect(
        self,
        expected: &AuthorizationState,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<AuthorizationResult, AuthError> {
        let Self { listener, redirect_uri } = self;
        let (tx, rx) = oneshot::channel();
        let router = callback_router(redirect_uri.path(), expected.clone(), tx);

        let shutdown = CancellationToken::new();
        let server = tokio::spawn({
            let shutdown = shutdown.clone();
            async move {
                axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await
            }
        });
        let guard = ServerGuard { shutdown, handle: Some(server) };

        let result = tokio::select! {
            received = rx => match received {
                Ok(result) => Ok(result),
                Err(_) => Err(AuthError::Listener("callback server stopped before a redirect arrived".into())),
            },
            _ = tokio::time::sleep(timeout) => {
                info!(timeout_secs = timeout.as_secs(), "timed out waiting for redirect");
                Ok(AuthorizationResult::Cancelled)
            }
            _ = cancel.cancelled() => {
                info!("redirect wait cancelled");
                Ok(AuthorizationResult::Cancelled)
            }
        };

        guard.stop().await;
        result
    }
}

/// Address to bind for a loopback redirect URI.
///
/// `localhost` binds `127.0.0.1` only, while the URI sent to the provider
/// keeps `localhost` so it still matches the registered redirect. Browsers
/// that try `::1` first fall back to IPv4 on connection refusal. Configure
/// `http://[::1]` to listen on IPv6 instead.
fn loopback_ip(redirect_uri: &Url) -> Result<IpAddr, AuthError> {
    let not_loopback =
        || AuthError::InvalidConfig(format!("redirect_uri host must be loopback, got {redirect_uri}"));
    match redirect_uri.host() {
        Some(Host::Domain(d)) if d.eq_ignore_ascii_case("localhost") => {
            Ok(IpAddr::V4(Ipv4Addr::LOCALHOST))
        }
        Some(Host::Ipv4(ip)) if ip.is_loopback() => Ok(IpAddr::V4(ip)),
        Some(Host::Ipv6(ip)) if ip.is_loopback() => Ok(IpAddr::V6(ip)),
        _ => Err(not_loopback()),
    }
}

/// Owns the callback server task; the acceptor never outlives it.
struct ServerGuard {
    shutdown: CancellationToken,
    handle: Option<JoinHandle<std::io::Result<()>>>,
}

impl ServerGuard {
    async fn stop(mut self) {
        self.shutdown.cancel();
        let Some(mut handle) = self.handle.take() else {
            return;
        };
        match tokio::time::timeout(DRAIN_TIMEOUT, &mut handle).await {
            Ok(Ok(Ok(()))) => debug!("callback server stopped"),
            Ok(Ok(Err(e))) => warn!(err = %e, "callback server error"),
            Ok(Err(e)) => warn!(err = %e, "callback server task failed"),
            Err(_) => {
                debug!("callback server did not drain in time, aborting");
                handle.abort();
                let _ = handle.await;
            }
        }
    }
}

impl Drop for ServerGuard {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
