// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fakes for exercising sessions without a real identity provider.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::Router;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use url::Url;

use crate::browser::BrowserLauncher;
use crate::window::WindowHandle;

/// A request received by [`MockTokenEndpoint`].
#[derive(Debug, Clone, Default)]
pub struct CapturedRequest {
    pub content_type: String,
    pub form: HashMap<String, String>,
}

/// Token endpoint on a random port answering every POST with a fixed reply.
pub struct MockTokenEndpoint {
    pub addr: SocketAddr,
    calls: Arc<AtomicU32>,
    last: Arc<Mutex<Option<CapturedRequest>>>,
    handle: JoinHandle<()>,
}

impl MockTokenEndpoint {
    pub async fn spawn(status: u16, body: impl Into<String>) -> anyhow::Result<Self> {
        let calls = Arc::new(AtomicU32::new(0));
        let last = Arc::new(Mutex::new(None));
        let body = body.into();
        let status = StatusCode::from_u16(status)?;

        let app = Router::new().route(
            "/token",
            post({
                let calls = Arc::clone(&calls);
                let last = Arc::clone(&last);
                move |headers: HeaderMap, raw: String| {
                    let calls = Arc::clone(&calls);
                    let last = Arc::clone(&last);
                    let body = body.clone();
                    async move {
                        calls.fetch_add(1, Ordering::Relaxed);
                        let content_type = headers
                            .get("content-type")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default()
                            .to_owned();
                        let form = url::form_urlencoded::parse(raw.as_bytes()).into_owned().collect();
                        *last.lock() = Some(CapturedRequest { content_type, form });
                        (status, body)
                    }
                }
            }),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok(Self { addr, calls, last, handle })
    }

    pub fn token_url(&self) -> anyhow::Result<Url> {
        Ok(Url::parse(&format!("http://{}/token", self.addr))?)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn last_request(&self) -> Option<CapturedRequest> {
        self.last.lock().clone()
    }
}

impl Drop for MockTokenEndpoint {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// What the simulated user does once the authorization page opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redirect {
    /// Approve: redirect with `code` and the state from the request.
    Approve { code: String },
    /// Redirect with `code` but a state that was never issued.
    ForgeState { code: String },
    /// Redirect with a provider error.
    Deny { error: String, description: Option<String> },
    /// Never come back.
    Abandon,
}

/// Browser stand-in that performs the provider redirect itself.
#[derive(Debug, Clone)]
pub struct RedirectingBrowser {
    behavior: Redirect,
    opened: Arc<Mutex<Vec<(Url, WindowHandle)>>>,
}

impl RedirectingBrowser {
    pub fn new(behavior: Redirect) -> Self {
        Self { behavior, opened: Arc::new(Mutex::new(Vec::new())) }
    }

    /// URLs opened so far, with the parent handle they were anchored to.
    pub fn opened(&self) -> Vec<(Url, WindowHandle)> {
        self.opened.lock().clone()
    }

    /// The redirect target the provider would send the browser to.
    pub fn redirect_target(&self, authorize_url: &Url) -> anyhow::Result<Option<Url>> {
        let query: HashMap<String, String> = authorize_url.query_pairs().into_owned().collect();
        let redirect_uri = query
            .get("redirect_uri")
            .ok_or_else(|| anyhow::anyhow!("authorization URL has no redirect_uri"))?;
        let state = query.get("state").cloned().unwrap_or_default();
        let mut target = Url::parse(redirect_uri)?;
        match self.behavior {
            Redirect::Approve { ref code } => {
                target.query_pairs_mut().append_pair("code", code).append_pair("state", &state);
            }
            Redirect::ForgeState { ref code } => {
                target
                    .query_pairs_mut()
                    .append_pair("code", code)
                    .append_pair("state", &format!("{state}-forged"));
            }
            Redirect::Deny { ref error, ref description } => {
                let mut q = target.query_pairs_mut();
                q.append_pair("error", error).append_pair("state", &state);
                if let Some(d) = description {
                    q.append_pair("error_description", d);
                }
            }
            Redirect::Abandon => return Ok(None),
        }
        Ok(Some(target))
    }
}

impl BrowserLauncher for RedirectingBrowser {
    fn open(&self, url: &Url, parent: WindowHandle) -> anyhow::Result<()> {
        self.opened.lock().push((url.clone(), parent));
        let Some(target) = self.redirect_target(url)? else {
            return Ok(());
        };
        crate::exchange::ensure_crypto();
        let client = reqwest::Client::builder().build()?;
        tokio::spawn(async move {
            if let Err(e) = client.get(target).send().await {
                tracing::warn!(err = %e, "simulated redirect failed");
            }
        });
        Ok(())
    }
}
