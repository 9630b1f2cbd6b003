// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Parent window resolution for anchoring the sign-in UI.
//!
//! Sources are tried in priority order: the console window of this process,
//! the active window of this process, then the desktop foreground window.
//! The first present handle wins. Resolution never fails; with no usable
//! source the session simply runs without an anchor.

use std::fmt;
use std::num::NonZeroIsize;

use tracing::debug;

/// Opaque platform window handle, or absent.
///
/// Only meaningful for the duration of the call that resolved it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct WindowHandle(Option<NonZeroIsize>);

impl WindowHandle {
    pub const ABSENT: Self = Self(None);

    /// Wrap a raw handle; zero (the platform null handle) maps to absent.
    pub fn from_raw(raw: isize) -> Self {
        Self(NonZeroIsize::new(raw))
    }

    pub fn raw(&self) -> Option<isize> {
        self.0.map(NonZeroIsize::get)
    }

    pub fn is_present(&self) -> bool {
        self.0.is_some()
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(h) => write!(f, "{:#x}", h.get()),
            None => f.write_str("absent"),
        }
    }
}

/// One way of asking the OS for a window to anchor to.
pub trait WindowHandleSource: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Query the OS. Returns [`WindowHandle::ABSENT`] when there is none.
    fn query(&self) -> WindowHandle;
}

/// Console (terminal) window hosting this process.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleWindow;

/// Active window attached to this process's message queue.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActiveWindow;

/// Window the user is currently working in, whichever process owns it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForegroundWindow;

impl WindowHandleSource for ConsoleWindow {
    fn name(&self) -> &'static str {
        "console"
    }

    fn query(&self) -> WindowHandle {
        platform::console_window()
    }
}

impl WindowHandleSource for ActiveWindow {
    fn name(&self) -> &'static str {
        "active"
    }

    fn query(&self) -> WindowHandle {
        platform::active_window()
    }
}

impl WindowHandleSource for ForegroundWindow {
    fn name(&self) -> &'static str {
        "foreground"
    }

    fn query(&self) -> WindowHandle {
        platform::foreground_window()
    }
}

/// Tries each source in order and returns the first present handle.
pub struct WindowHandleResolver {
    sources: Vec<Box<dyn WindowHandleSource>>,
}

impl WindowHandleResolver {
    pub fn new(sources: Vec<Box<dyn WindowHandleSource>>) -> Self {
        Self { sources }
    }

    /// Console, then active, then foreground window of the running platform.
    pub fn platform() -> Self {
        Self::new(vec![Box::new(ConsoleWindow), Box::new(ActiveWindow), Box::new(ForegroundWindow)])
    }

    pub fn resolve(&self) -> WindowHandle {
        for source in &self.sources {
            let handle = source.query();
            if handle.is_present() {
                debug!(source = source.name(), handle = %handle, "resolved parent window");
                return handle;
            }
        }
        debug!("no parent window available");
        WindowHandle::ABSENT
    }
}

impl Default for WindowHandleResolver {
    fn default() -> Self {
        Self::platform()
    }
}

impl fmt::Debug for WindowHandleResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.sources.iter().map(|s| s.name()).collect();
        f.debug_struct("WindowHandleResolver").field("sources", &names).finish()
    }
}

#[cfg(windows)]
mod platform {
    use windows::Win32::System::Console::GetConsoleWindow;
    use windows::Win32::UI::Input::KeyboardAndMouse::GetActiveWindow;
    use windows::Win32::UI::WindowsAndMessaging::GetForegroundWindow;

    use super::WindowHandle;

    pub fn console_window() -> WindowHandle {
        // SAFETY: GetConsoleWindow takes no arguments and only reads state
        // of the calling process; a null result means no console.
        #[allow(unsafe_code)]
        let hwnd = unsafe { GetConsoleWindow() };
        WindowHandle::from_raw(hwnd.0 as isize)
    }

    pub fn active_window() -> WindowHandle {
        // SAFETY: GetActiveWindow takes no arguments and returns null when the
        // calling thread's queue has no active window.
        #[allow(unsafe_code)]
        let hwnd = unsafe { GetActiveWindow() };
        WindowHandle::from_raw(hwnd.0 as isize)
    }

    pub fn foreground_window() -> WindowHandle {
        // SAFETY: GetForegroundWindow takes no arguments and returns null when
        // focus is in transition.
        #[allow(unsafe_code)]
        let hwnd = unsafe { GetForegroundWindow() };
        WindowHandle::from_raw(hwnd.0 as isize)
    }
}

#[cfg(all(unix, not(target_os = "macos")))]
mod platform {
    use super::WindowHandle;

    /// X11 terminal emulators export their window ID to child processes.
    pub fn console_window() -> WindowHandle {
        std::env::var("WINDOWID").ok().and_then(|v| parse_window_id(&v)).unwrap_or_default()
    }

    pub fn active_window() -> WindowHandle {
        WindowHandle::ABSENT
    }

    pub fn foreground_window() -> WindowHandle {
        WindowHandle::ABSENT
    }

    pub(super) fn parse_window_id(value: &str) -> Option<WindowHandle> {
        let value = value.trim();
        let raw = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
            Some(hex) => isize::from_str_radix(hex, 16).ok()?,
            None => value.parse().ok()?,
        };
        Some(WindowHandle::from_raw(raw))
    }
}

#[cfg(not(any(windows, all(unix, not(target_os = "macos")))))]
mod platform {
    use super::WindowHandle;

    pub fn console_window() -> WindowHandle {
        WindowHandle::ABSENT
    }

    pub fn active_window() -> WindowHandle {
        WindowHandle::ABSENT
    }

    pub fn foreground_window() -> WindowHandle {
        WindowHandle::ABSENT
    }
}

#[cfg(test)]
#[path = "window_tests.rs"]
mod tests;
