// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rendering an acquired token for stdout.

use serde::Serialize;

use crate::config::OutputFormat;
use crate::exchange::AccessToken;

#[derive(Debug, Serialize)]
struct TokenJson<'a> {
    access_token: &'a str,
    token_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_in: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<&'a str>,
}

/// The first `max` characters of `token`, with `...` appended when cut.
pub fn truncate_token(token: &str, max: usize) -> String {
    match token.char_indices().nth(max) {
        Some((end, _)) => format!("{}...", &token[..end]),
        None => token.to_owned(),
    }
}

/// Render `token` in `format`, shortening the token itself to `truncate` chars.
pub fn render(
    token: &AccessToken,
    format: OutputFormat,
    truncate: Option<usize>,
) -> anyhow::Result<String> {
    let shown = match truncate {
        Some(n) => truncate_token(&token.access_token, n),
        None => token.access_token.clone(),
    };
    match format {
        OutputFormat::Text => Ok(format!("Access token: {shown}")),
        OutputFormat::Json => Ok(serde_json::to_string(&TokenJson {
            access_token: &shown,
            token_type: &token.token_type,
            expires_in: token.expires_in.map(|d| d.as_secs()),
            scope: token.scope.as_deref(),
        })?),
    }
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
