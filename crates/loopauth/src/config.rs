// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AuthError;

/// Microsoft identity platform authority used when none is configured.
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// Tenant segment used when none is configured (any work or personal account).
pub const DEFAULT_TENANT: &str = "common";

/// Scope requested when none is configured.
pub const DEFAULT_SCOPE: &str = "https://graph.microsoft.com/User.Read";

/// Loopback redirect with no port: the listener picks an ephemeral one.
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost";

/// How long to wait for the browser redirect.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// The `prompt` parameter sent to the authorization endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Prompt {
    SelectAccount,
    Login,
    Consent,
    None,
}

impl Prompt {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SelectAccount => "select_account",
            Self::Login => "login",
            Self::Consent => "consent",
            Self::None => "none",
        }
    }
}

impl std::fmt::Display for Prompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Prompt {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "select_account" => Ok(Self::SelectAccount),
            "login" => Ok(Self::Login),
            "consent" => Ok(Self::Consent),
            "none" => Ok(Self::None),
            other => anyhow::bail!("invalid prompt: {other}"),
        }
    }
}

/// How the acquired token is written to stdout.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => anyhow::bail!("invalid output format: {other}"),
        }
    }
}

/// Everything a session needs to talk to one identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub client_id: String,
    pub redirect_uri: Url,
    pub scopes: Vec<String>,
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    pub prompt: Option<Prompt>,
    pub login_hint: Option<String>,
}

impl ClientConfig {
    /// Build a config with the required fields and no optional parameters.
    pub fn new(
        client_id: impl Into<String>,
        redirect_uri: Url,
        scopes: Vec<String>,
        authorization_endpoint: Url,
        token_endpoint: Url,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            redirect_uri,
            scopes,
            authorization_endpoint,
            token_endpoint,
            prompt: None,
            login_hint: None,
        }
    }

    /// Reject configurations that can never produce a usable request.
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.client_id.trim().is_empty() {
            return Err(AuthError::InvalidConfig("client_id is empty".into()));
        }
        if self.scopes.is_empty() || self.scopes.iter().any(|s| s.trim().is_empty()) {
            return Err(AuthError::InvalidConfig("scopes must be non-empty".into()));
        }
        if self.redirect_uri.host_str().map_or(true, str::is_empty) {
            return Err(AuthError::InvalidConfig("redirect_uri has no host".into()));
        }
        for (name, endpoint) in
            [("authorization_endpoint", &self.authorization_endpoint), ("token_endpoint", &self.token_endpoint)]
        {
            if !matches!(endpoint.scheme(), "http" | "https") {
                return Err(AuthError::InvalidConfig(format!(
                    "{name} must be http(s), got {}",
                    endpoint.scheme()
                )));
            }
        }
        Ok(())
    }

    /// Scopes joined the way they travel on the wire.
    pub fn scope_param(&self) -> String {
        self.scopes.join(" ")
    }
}

/// Authorization and token endpoints of a Microsoft identity platform tenant.
pub fn tenant_endpoints(authority: &str, tenant: &str) -> anyhow::Result<(Url, Url)> {
    let base = format!("{}/{}/oauth2/v2.0", authority.trim_end_matches('/'), tenant.trim_matches('/'));
    let authorize = Url::parse(&format!("{base}/authorize"))?;
    let token = Url::parse(&format!("{base}/token"))?;
    Ok((authorize, token))
}

/// Interactive OAuth2 sign-in (authorization code + PKCE) that prints an access token.
#[derive(Debug, Parser)]
#[command(name = "loopauth", version, about)]
pub struct Config {
    /// Path to a JSON config file. Flags and env vars override its values.
    #[arg(long, env = "LOOPAUTH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Application (client) ID registered with the identity provider.
    #[arg(long, env = "LOOPAUTH_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Tenant segment of the authority (common, organizations, or a tenant ID).
    #[arg(long, env = "LOOPAUTH_TENANT")]
    pub tenant: Option<String>,

    /// Authority base URL.
    #[arg(long, env = "LOOPAUTH_AUTHORITY")]
    pub authority: Option<String>,

    /// Authorization endpoint (overrides the tenant-derived one).
    #[arg(long, env = "LOOPAUTH_AUTHORIZE_URL")]
    pub authorize_url: Option<String>,

    /// Token endpoint (overrides the tenant-derived one).
    #[arg(long, env = "LOOPAUTH_TOKEN_URL")]
    pub token_url: Option<String>,

    /// Scope to request. Repeat for several.
    #[arg(long = "scope", env = "LOOPAUTH_SCOPES", value_delimiter = ' ')]
    pub scopes: Vec<String>,

    /// Loopback redirect URI. Without a port an ephemeral one is used.
    #[arg(long, env = "LOOPAUTH_REDIRECT_URI")]
    pub redirect_uri: Option<String>,

    /// Prompt behaviour (select_account, login, consent, none).
    #[arg(long, env = "LOOPAUTH_PROMPT")]
    pub prompt: Option<String>,

    /// Pre-fill the sign-in page with this account.
    #[arg(long, env = "LOOPAUTH_LOGIN_HINT")]
    pub login_hint: Option<String>,

    /// Seconds to wait for the browser redirect.
    #[arg(long, env = "LOOPAUTH_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Print the authorization URL instead of opening a browser.
    #[arg(long, env = "LOOPAUTH_NO_BROWSER")]
    pub no_browser: bool,

    /// Print only the first N characters of the token.
    #[arg(long, env = "LOOPAUTH_TRUNCATE")]
    pub truncate: Option<usize>,

    /// Output format (text or json).
    #[arg(long, env = "LOOPAUTH_OUTPUT", default_value = "text")]
    pub output: String,

    /// Log format (json or text).
    #[arg(long, env = "LOOPAUTH_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "LOOPAUTH_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Validate the flags that do not depend on the config file.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.output_format()?;
        if !matches!(self.log_format.as_str(), "json" | "text") {
            anyhow::bail!("invalid log format: {}", self.log_format);
        }
        if let Some(ref prompt) = self.prompt {
            prompt.parse::<Prompt>()?;
        }
        if self.truncate == Some(0) {
            anyhow::bail!("--truncate must be at least 1");
        }
        if self.timeout_secs == Some(0) {
            anyhow::bail!("--timeout-secs must be at least 1");
        }
        Ok(())
    }

    pub fn output_format(&self) -> anyhow::Result<OutputFormat> {
        self.output.parse()
    }

    /// Load the `--config` file, or an empty one when unset.
    pub fn file_config(&self) -> anyhow::Result<FileConfig> {
        match self.config {
            Some(ref path) => load_file_config(path),
            None => Ok(FileConfig::default()),
        }
    }

    /// Redirect wait, falling back to the file value and then the default.
    pub fn timeout(&self, file: &FileConfig) -> Duration {
        let secs = self.timeout_secs.or(file.timeout_secs).unwrap_or(DEFAULT_TIMEOUT_SECS);
        Duration::from_secs(secs)
    }

    /// Merge flags over `file` and defaults into a validated [`ClientConfig`].
    pub fn client_config(&self, file: &FileConfig) -> anyhow::Result<ClientConfig> {
        let client_id = self
            .client_id
            .clone()
            .or_else(|| file.client_id.clone())
            .ok_or_else(|| anyhow::anyhow!("no client id: pass --client-id or set LOOPAUTH_CLIENT_ID"))?;

        let authority =
            self.authority.as_deref().or(file.authority.as_deref()).unwrap_or(DEFAULT_AUTHORITY);
        let tenant = self.tenant.as_deref().or(file.tenant.as_deref()).unwrap_or(DEFAULT_TENANT);
        let (default_authorize, default_token) = tenant_endpoints(authority, tenant)?;

        let authorization_endpoint = match self.authorize_url.as_deref().or(file.authorize_url.as_deref()) {
            Some(u) => Url::parse(u)?,
            None => default_authorize,
        };
        let token_endpoint = match self.token_url.as_deref().or(file.token_url.as_deref()) {
            Some(u) => Url::parse(u)?,
            None => default_token,
        };

        let scopes = if !self.scopes.is_empty() {
            self.scopes.clone()
        } else {
            file.scopes.clone().unwrap_or_else(|| vec![DEFAULT_SCOPE.to_owned()])
        };
        let scopes: Vec<String> = scopes.into_iter().filter(|s| !s.trim().is_empty()).collect();

        let redirect_uri = Url::parse(
            self.redirect_uri.as_deref().or(file.redirect_uri.as_deref()).unwrap_or(DEFAULT_REDIRECT_URI),
        )?;

        let prompt = match self.prompt.as_deref() {
            Some(p) => Some(p.parse()?),
            None => file.prompt,
        };

        let config = ClientConfig {
            client_id,
            redirect_uri,
            scopes,
            authorization_endpoint,
            token_endpoint,
            prompt,
            login_hint: self.login_hint.clone().or_else(|| file.login_hint.clone()),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Contents of the `--config` JSON file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorize_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<Prompt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl FileConfig {
    /// Reject values the matching flags would reject.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.timeout_secs == Some(0) {
            anyhow::bail!("timeout_secs must be at least 1");
        }
        Ok(())
    }
}

/// Load, parse and validate the config file at `path`.
pub fn load_file_config(path: &Path) -> anyhow::Result<FileConfig> {
    let contents = std::fs::read_to_string(path)?;
    let config: FileConfig = serde_json::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
