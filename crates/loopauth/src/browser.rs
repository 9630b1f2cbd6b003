// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Opening the authorization URL for the user.

use url::Url;

use crate::window::WindowHandle;

/// Presents the authorization URL to the user.
///
/// A launch failure is not fatal: the session logs it and keeps waiting,
/// since the user can still open the printed URL by hand.
pub trait BrowserLauncher: Send + Sync {
    fn open(&self, url: &Url, parent: WindowHandle) -> anyhow::Result<()>;
}

/// Opens the URL in the system default browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &Url, parent: WindowHandle) -> anyhow::Result<()> {
        // The system browser cannot be parented; the handle is only reported.
        tracing::debug!(parent = %parent, "launching system browser");
        let (program, args) = browser_command(url.as_str());
        std::process::Command::new(program)
            .args(&args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| anyhow::anyhow!("failed to run {program}: {e}"))?;
        Ok(())
    }
}

/// Platform command that hands a URL to the default browser.
///
/// On Windows `start` is a cmd builtin that mangles `&`, so the URL goes
/// through the shell's protocol handler instead.
pub fn browser_command(url: &str) -> (&'static str, Vec<String>) {
    if cfg!(target_os = "macos") {
        ("open", vec![url.to_owned()])
    } else if cfg!(target_os = "windows") {
        ("rundll32", vec!["url.dll,FileProtocolHandler".to_owned(), url.to_owned()])
    } else {
        ("xdg-open", vec![url.to_owned()])
    }
}

/// Prints the URL to stderr and opens nothing (`--no-browser`).
#[derive(Debug, Clone, Copy, Default)]
pub struct PrintUrl;

impl BrowserLauncher for PrintUrl {
    fn open(&self, url: &Url, _parent: WindowHandle) -> anyhow::Result<()> {
        eprintln!("Open this URL to sign in:");
        eprintln!("  {url}");
        Ok(())
    }
}

#[cfg(test)]
#[path = "browser_tests.rs"]
mod tests;
