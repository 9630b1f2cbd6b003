// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum_test::TestServer;

use super::*;

fn expected_state() -> AuthorizationState {
    AuthorizationState {
        state: "s-123".into(),
        expected_redirect_uri: Url::parse("http://127.0.0.1:8400/cb").expect("url"),
    }
}

fn callback(code: Option<&str>, state: Option<&str>, error: Option<&str>) -> CallbackParams {
    CallbackParams {
        code: code.map(str::to_owned),
        state: state.map(str::to_owned),
        error: error.map(str::to_owned),
        error_description: None,
    }
}

#[yare::parameterized(
    code_with_state = { callback(Some("c1"), Some("s-123"), None), AuthorizationResult::Code("c1".into()) },
    wrong_state = {
        callback(Some("c1"), Some("s-999"), None),
        AuthorizationResult::Error { kind: CallbackErrorKind::StateMismatch, description: None }
    },
    missing_state = {
        callback(Some("c1"), None, None),
        AuthorizationResult::Error { kind: CallbackErrorKind::StateMismatch, description: None }
    },
    state_case_differs = {
        callback(Some("c1"), Some("S-123"), None),
        AuthorizationResult::Error { kind: CallbackErrorKind::StateMismatch, description: None }
    },
    no_code = {
        callback(None, Some("s-123"), None),
        AuthorizationResult::Error { kind: CallbackErrorKind::MissingCode, description: None }
    },
    empty_code = {
        callback(Some(""), Some("s-123"), None),
        AuthorizationResult::Error { kind: CallbackErrorKind::MissingCode, description: None }
    },
    provider_error_wins_over_state = {
        callback(None, Some("bogus"), Some("access_denied")),
        AuthorizationResult::Error {
            kind: CallbackErrorKind::Provider("access_denied".into()),
            description: None,
        }
    },
)]
fn interprets_callbacks(params: CallbackParams, expected: AuthorizationResult) {
    assert_eq!(interpret_callback(&params, &expected_state()), expected);
}

#[test]
fn provider_error_keeps_description() {
    let mut p = callback(None, Some("s-123"), Some("access_denied"));
    p.error_description = Some("user declined".into());
    let result = interpret_callback(&p, &expected_state());
    let AuthorizationResult::Error { kind, description } = result else {
        panic!("expected error, got {result:?}");
    };
    assert_eq!(
        kind.into_error(description),
        AuthError::Provider { error: "access_denied".into(), description: Some("user declined".into()) }
    );
}

#[tokio::test]
async fn first_redirect_is_delivered_and_later_ones_are_closed() -> anyhow::Result<()> {
    let (tx, mut rx) = oneshot::channel();
    let server = TestServer::new(callback_router("/cb", expected_state(), tx))?;

    let resp = server.get("/cb").add_query_param("code", "c1").add_query_param("state", "s-123").await;
    resp.assert_status_ok();
    assert!(resp.text().contains("Signed in"));
    assert_eq!(rx.try_recv()?, AuthorizationResult::Code("c1".into()));

    let again =
        server.get("/cb").add_query_param("code", "c2").add_query_param("state", "s-123").await;
    again.assert_status_ok();
    assert!(again.text().contains("already completed"));
    Ok(())
}

#[tokio::test]
async fn mismatched_state_renders_failure_page() -> anyhow::Result<()> {
    let (tx, mut rx) = oneshot::channel();
    let server = TestServer::new(callback_router("/cb", expected_state(), tx))?;

    let resp = server.get("/cb").add_query_param("code", "c1").add_query_param("state", "evil").await;
    assert!(resp.text().contains("Sign-in failed"));
    assert!(!resp.text().contains("c1"));
    assert_eq!(
        rx.try_recv()?,
        AuthorizationResult::Error { kind: CallbackErrorKind::StateMismatch, description: None }
    );
    Ok(())
}

#[yare::parameterized(
    plain = { "code=c1&state=s-123", Ok(callback(Some("c1"), Some("s-123"), None)) },
    extra_keys_ignored = {
        "code=c1&state=s-123&session_state=xyz",
        Ok(callback(Some("c1"), Some("s-123"), None))
    },
    encoded = { "code=a%2Bb&state=s-123", Ok(callback(Some("a+b"), Some("s-123"), None)) },
    empty = { "", Ok(CallbackParams::default()) },
    repeated_state = { "code=c1&state=s-123&state=s-123", Err("state".to_owned()) },
    repeated_code = { "code=c1&code=c2&state=s-123", Err("code".to_owned()) },
)]
fn parses_callback_queries(query: &str, expected: Result<CallbackParams, String>) {
    assert_eq!(CallbackParams::from_query(query), expected);
}

#[tokio::test]
async fn repeated_parameters_consume_the_redirect() -> anyhow::Result<()> {
    let (tx, mut rx) = oneshot::channel();
    let server = TestServer::new(callback_router("/cb", expected_state(), tx))?;

    let resp = server.get("/cb?code=c1&state=s-123&state=s-123").await;
    resp.assert_status_ok();
    assert!(resp.text().contains("Sign-in failed"));
    let AuthorizationResult::Error { kind, .. } = rx.try_recv()? else {
        anyhow::bail!("expected an error result");
    };
    assert_eq!(kind, CallbackErrorKind::StateMismatch);
    Ok(())
}

#[test]
fn repeated_code_is_missing_code() {
    let AuthorizationResult::Error { kind, description } = interpret_ambiguous("code") else {
        panic!("expected an error result");
    };
    assert_eq!(kind, CallbackErrorKind::MissingCode);
    assert!(description.is_some_and(|d| d.contains("code")));
}

#[tokio::test]
async fn other_paths_do_not_consume_the_redirect() -> anyhow::Result<()> {
    let (tx, mut rx) = oneshot::channel();
    let server = TestServer::new(callback_router("/cb", expected_state(), tx))?;

    server.get("/favicon.ico").await.assert_status(StatusCode::NOT_FOUND);
    assert!(rx.try_recv().is_err());

    let resp = server.get("/cb").add_query_param("code", "c1").add_query_param("state", "s-123").await;
    resp.assert_status_ok();
    assert_eq!(rx.try_recv()?, AuthorizationResult::Code("c1".into()));
    Ok(())
}

#[tokio::test]
async fn bind_fills_in_ephemeral_port() -> anyhow::Result<()> {
    let listener = RedirectListener::bind(&Url::parse("http://localhost/cb")?).await?;
    let port = listener.local_addr()?.port();
    assert_ne!(port, 0);
    assert_eq!(listener.redirect_uri().port(), Some(port));
    assert_eq!(listener.redirect_uri().path(), "/cb");
    assert_eq!(listener.redirect_uri().host_str(), Some("localhost"));
    assert_eq!(listener.local_addr()?.ip(), IpAddr::V4(Ipv4Addr::LOCALHOST));
    Ok(())
}

#[tokio::test]
async fn ipv6_loopback_binds_ipv6() -> anyhow::Result<()> {
    // Hosts without IPv6 cannot bind ::1.
    let Ok(listener) = RedirectListener::bind(&Url::parse("http://[::1]/cb")?).await else {
        return Ok(());
    };
    assert!(listener.local_addr()?.ip().is_ipv6());
    assert_eq!(listener.redirect_uri().host_str(), Some("[::1]"));
    Ok(())
}

#[yare::parameterized(
    remote_host = { "http://example.com/cb" },
    https = { "https://localhost/cb" },
    any_address = { "http://0.0.0.0/cb" },
    wildcard_path = { "http://127.0.0.1/{*rest}" },
    capture_path = { "http://127.0.0.1/:id" },
)]
#[test_macro(tokio::test)]
async fn bind_rejects_unusable_redirects(uri: &str) {
    let url = Url::parse(uri).expect("url");
    let err = RedirectListener::bind(&url).await.expect_err("should reject");
    assert!(matches!(err, AuthError::InvalidConfig(_)), "got {err:?}");
}

async fn fetch(url: Url) -> anyhow::Result<String> {
    crate::exchange::ensure_crypto();
    let client = reqwest::Client::builder().build()?;
    Ok(client.get(url).send().await?.text().await?)
}

#[tokio::test]
async fn await_redirect_returns_code_and_releases_port() -> anyhow::Result<()> {
    let listener = RedirectListener::bind(&Url::parse("http://127.0.0.1/done")?).await?;
    let addr = listener.local_addr()?;
    let expected = AuthorizationState::generate(listener.redirect_uri().clone())?;

    let mut target = listener.redirect_uri().clone();
    target.query_pairs_mut().append_pair("code", "abc").append_pair("state", &expected.state);

    let cancel = CancellationToken::new();
    let wait = tokio::spawn({
        let expected = expected.clone();
        async move { listener.await_redirect(&expected, Duration::from_secs(10), &cancel).await }
    });

    let page = fetch(target).await?;
    assert!(page.contains("Signed in"));

    let result = wait.await??;
    assert_eq!(result, AuthorizationResult::Code("abc".into()));

    // The acceptor is gone once await_redirect returns.
    let rebound = TcpListener::bind(addr).await?;
    drop(rebound);
    Ok(())
}

#[tokio::test]
async fn await_redirect_reports_ambiguous_redirect() -> anyhow::Result<()> {
    let listener = RedirectListener::bind(&Url::parse("http://127.0.0.1/cb")?).await?;
    let expected = AuthorizationState::generate(listener.redirect_uri().clone())?;

    let mut target = listener.redirect_uri().clone();
    target
        .query_pairs_mut()
        .append_pair("code", "abc")
        .append_pair("state", &expected.state)
        .append_pair("state", &expected.state);

    let cancel = CancellationToken::new();
    let wait = tokio::spawn({
        let expected = expected.clone();
        async move { listener.await_redirect(&expected, Duration::from_secs(10), &cancel).await }
    });

    let page = fetch(target).await?;
    assert!(page.contains("Sign-in failed"));

    let result = tokio::time::timeout(Duration::from_secs(5), wait).await???;
    assert!(
        matches!(result, AuthorizationResult::Error { kind: CallbackErrorKind::StateMismatch, .. }),
        "got {result:?}"
    );
    Ok(())
}

#[tokio::test]
async fn await_redirect_times_out_as_cancelled() -> anyhow::Result<()> {
    let listener = RedirectListener::bind(&Url::parse("http://127.0.0.1/")?).await?;
    let expected = AuthorizationState::generate(listener.redirect_uri().clone())?;
    let result = listener
        .await_redirect(&expected, Duration::from_millis(50), &CancellationToken::new())
        .await?;
    assert_eq!(result, AuthorizationResult::Cancelled);
    Ok(())
}

#[tokio::test]
async fn await_redirect_observes_cancellation() -> anyhow::Result<()> {
    let listener = RedirectListener::bind(&Url::parse("http://127.0.0.1/")?).await?;
    let addr = listener.local_addr()?;
    let expected = AuthorizationState::generate(listener.redirect_uri().clone())?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let result = listener.await_redirect(&expected, Duration::from_secs(30), &cancel).await?;
    assert_eq!(result, AuthorizationResult::Cancelled);
    drop(TcpListener::bind(addr).await?);
    Ok(())
}
