// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end sign-in against a stub identity provider.

use std::time::Duration;

use clap::Parser;
use url::Url;

use loopauth::config::{ClientConfig, Config};
use loopauth::error::{AuthError, Stage};
use loopauth::session::{AuthSession, SessionOutcome, SessionState};
use loopauth::test_support::{MockTokenEndpoint, Redirect, RedirectingBrowser};
use loopauth::window::WindowHandleResolver;

const TOKEN_BODY: &str = r#"{"access_token":"tok123","expires_in":3600,"token_type":"Bearer"}"#;

fn config(token_url: Url) -> anyhow::Result<ClientConfig> {
    Ok(ClientConfig::new(
        "abc",
        Url::parse("http://localhost")?,
        vec!["read".into()],
        Url::parse("https://login.example.com/common/oauth2/v2.0/authorize")?,
        token_url,
    ))
}

// -- Session ------------------------------------------------------------------

#[tokio::test]
async fn sign_in_acquires_token() -> anyhow::Result<()> {
    let endpoint = MockTokenEndpoint::spawn(200, TOKEN_BODY).await?;
    let browser = RedirectingBrowser::new(Redirect::Approve { code: "auth-code".into() });

    let mut session = AuthSession::new(config(endpoint.token_url()?)?)?
        .with_resolver(WindowHandleResolver::new(vec![]))
        .with_browser(browser.clone())
        .with_timeout(Duration::from_secs(10));

    let outcome = session.run().await?;
    let SessionOutcome::TokenAcquired(token) = outcome else {
        anyhow::bail!("expected a token, got {outcome:?}");
    };
    assert_eq!(token.access_token, "tok123");
    assert_eq!(token.expires_in, Some(Duration::from_secs(3600)));
    assert_eq!(token.token_type, "Bearer");
    assert_eq!(session.state(), SessionState::TokenAcquired);

    // Authorization URL carried the configured client, scope and PKCE method.
    let opened = browser.opened();
    assert_eq!(opened.len(), 1);
    let (ref url, parent) = opened[0];
    assert!(!parent.is_present());
    let query: std::collections::HashMap<String, String> = url.query_pairs().into_owned().collect();
    assert_eq!(query["client_id"], "abc");
    assert_eq!(query["scope"], "read");
    assert_eq!(query["response_type"], "code");
    assert_eq!(query["code_challenge_method"], "S256");
    assert!(query["redirect_uri"].starts_with("http://localhost:"));

    let request = endpoint.last_request().ok_or_else(|| anyhow::anyhow!("no token request"))?;
    assert_eq!(request.form["grant_type"], "authorization_code");
    assert_eq!(request.form["code"], "auth-code");
    assert_eq!(request.form["client_id"], "abc");
    assert_eq!(request.form["redirect_uri"], query["redirect_uri"]);
    assert_eq!(endpoint.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn invalid_grant_surfaces_provider_body() -> anyhow::Result<()> {
    let endpoint = MockTokenEndpoint::spawn(
        400,
        r#"{"error":"invalid_grant","error_description":"AADSTS70008: code expired"}"#,
    )
    .await?;
    let browser = RedirectingBrowser::new(Redirect::Approve { code: "expired".into() });
    let mut session = AuthSession::new(config(endpoint.token_url()?)?)?
        .with_resolver(WindowHandleResolver::new(vec![]))
        .with_browser(browser)
        .with_timeout(Duration::from_secs(10));

    let err = session.run().await.expect_err("exchange should fail");
    assert_eq!(err.stage, Stage::ExchangeCode);
    let AuthError::ProviderRejected { status, ref body } = err.source else {
        anyhow::bail!("expected ProviderRejected, got {err:?}");
    };
    assert_eq!(status, 400);
    assert!(body.contains("AADSTS70008"));
    assert!(!err.source.is_retryable());
    Ok(())
}

// -- CLI ----------------------------------------------------------------------

#[tokio::test]
async fn run_without_redirect_exits_cancelled() -> anyhow::Result<()> {
    let endpoint = MockTokenEndpoint::spawn(200, TOKEN_BODY).await?;
    let token_url = endpoint.token_url()?;
    let config = Config::try_parse_from([
        "loopauth",
        "--client-id",
        "abc",
        "--scope",
        "read",
        "--token-url",
        token_url.as_str(),
        "--redirect-uri",
        "http://127.0.0.1",
        "--timeout-secs",
        "1",
        "--no-browser",
    ])?;
    config.validate()?;

    let code = loopauth::run(config).await?;
    assert_eq!(code, loopauth::exit::CANCELLED);
    assert_eq!(endpoint.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn run_rejects_remote_redirect_as_invalid_config() -> anyhow::Result<()> {
    let config = Config::try_parse_from([
        "loopauth",
        "--client-id",
        "abc",
        "--redirect-uri",
        "http://example.com/callback",
        "--no-browser",
    ])?;

    let code = loopauth::run(config).await?;
    assert_eq!(code, loopauth::exit::INVALID_CONFIG);
    Ok(())
}

#[tokio::test]
async fn run_rejects_zero_timeout_from_file() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("loopauth.json");
    std::fs::write(&path, r#"{"client_id": "abc", "timeout_secs": 0}"#)?;
    let path_str = path.to_string_lossy().into_owned();
    let config = Config::try_parse_from(["loopauth", "--config", path_str.as_str(), "--no-browser"])?;
    config.validate()?;

    let code = loopauth::run(config).await?;
    assert_eq!(code, loopauth::exit::INVALID_CONFIG);
    Ok(())
}
