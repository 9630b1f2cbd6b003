// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Loopauth: interactive OAuth2 sign-in over a loopback redirect.
//!
//! Authorization code flow with PKCE against any OAuth2 / OpenID Connect
//! identity provider that accepts loopback redirect URIs. The browser is
//! sent to the provider, the redirect lands on a short-lived local HTTP
//! listener, and the code is exchanged for an access token.

pub mod browser;
pub mod config;
pub mod error;
pub mod exchange;
pub mod listener;
pub mod output;
pub mod pkce;
pub mod request;
pub mod session;
#[doc(hidden)]
pub mod test_support;
pub mod window;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::browser::PrintUrl;
use crate::config::Config;
use crate::error::{AuthError, SessionError};
use crate::session::{AuthSession, SessionOutcome};

/// Process exit status for each way a sign-in can end.
pub mod exit {
    pub const TOKEN_ACQUIRED: i32 = 0;
    pub const FAILURE: i32 = 1;
    pub const INVALID_CONFIG: i32 = 2;
    pub const STATE_MISMATCH: i32 = 3;
    pub const CANCELLED: i32 = 4;
}

/// Map a session result onto a process exit status.
pub fn exit_code(result: &Result<SessionOutcome, SessionError>) -> i32 {
    match result {
        Ok(SessionOutcome::TokenAcquired(_)) => exit::TOKEN_ACQUIRED,
        Ok(SessionOutcome::Cancelled) => exit::CANCELLED,
        Err(e) => match e.source {
            AuthError::InvalidConfig(_) => exit::INVALID_CONFIG,
            AuthError::StateMismatch => exit::STATE_MISMATCH,
            _ => exit::FAILURE,
        },
    }
}

/// Sign in once and print the token. Returns the process exit status.
pub async fn run(config: Config) -> anyhow::Result<i32> {
    let file = match config.file_config() {
        Ok(file) => file,
        Err(e) => {
            error!("invalid configuration: {e:#}");
            return Ok(exit::INVALID_CONFIG);
        }
    };
    let client = match config.client_config(&file) {
        Ok(client) => client,
        Err(e) => {
            error!("invalid configuration: {e:#}");
            return Ok(exit::INVALID_CONFIG);
        }
    };
    let format = config.output_format()?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received Ctrl-C");
                cancel.cancel();
            }
        });
    }

    let mut session = AuthSession::new(client)?
        .with_timeout(config.timeout(&file))
        .with_cancellation(cancel.clone());
    if config.no_browser {
        session = session.with_browser(PrintUrl);
    }

    // The session only watches `cancel` while waiting for the redirect;
    // this also abandons an in-flight token request.
    let result = tokio::select! {
        result = session.run() => result,
        _ = cancel.cancelled() => Ok(SessionOutcome::Cancelled),
    };

    match result {
        Ok(SessionOutcome::TokenAcquired(ref token)) => {
            println!("{}", output::render(token, format, config.truncate)?);
        }
        Ok(SessionOutcome::Cancelled) => info!("sign-in cancelled"),
        Err(ref e) => error!("{e}"),
    }
    Ok(exit_code(&result))
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
