//! Opening URLs into named, reused browser tabs.
//!
//! The browser sits behind [`WindowHost`]; [`TabRegistry`] is the in-process
//! host used by the CLI and the tests. Nothing in here reports failure to
//! the caller: a blocked popup or a refused navigation is logged and dropped.

pub mod registry;

pub use registry::{RegistryWindow, TabRegistry};

use std::fmt;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabError {
    /// The host refused to touch the window (cross-origin access).
    Security(String),
    /// The window was closed under us.
    Closed,
}

impl fmt::Display for TabError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TabError::Security(msg) => write!(f, "Security error: {}", msg),
            TabError::Closed => write!(f, "Window is closed"),
        }
    }
}

impl std::error::Error for TabError {}

/// A handle to one browser window or tab.
pub trait BrowserWindow {
    fn is_closed(&self) -> bool;

    /// Navigate without adding a history entry.
    fn replace_location(&self, url: &str) -> Result<(), TabError>;

    fn focus(&self) -> Result<(), TabError>;
}

/// `window.open(url, target)`.
///
/// An empty `url` acquires the named window without navigating it.
/// `Ok(None)` means the popup was blocked.
pub trait WindowHost: Send + Sync {
    type Window: BrowserWindow;

    fn open(&self, url: &str, target: &str) -> Result<Option<Self::Window>, TabError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenStrategy {
    /// Acquire the named window first, then replace its location and focus
    /// it. Falls back to a plain targeted open if that is refused.
    #[default]
    LookupThenReplace,
    /// Open the URL straight into the named target. Used where the opener
    /// may not touch the other window's location.
    DirectTarget,
}

pub struct TabOpener<H> {
    host: H,
    strategy: OpenStrategy,
}

impl<H: WindowHost> TabOpener<H> {
    pub fn new(host: H, strategy: OpenStrategy) -> Self {
        TabOpener { host, strategy }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn strategy(&self) -> OpenStrategy {
        self.strategy
    }

    /// Show `url` in the tab called `name`, creating it if needed.
    pub fn open_named(&self, url: &str, name: &str) {
        match self.strategy {
            OpenStrategy::LookupThenReplace => self.lookup_then_replace(url, name),
            OpenStrategy::DirectTarget => self.direct_target(url, name),
        }
    }

    /// Bring the named tab forward without navigating it.
    pub fn focus_named(&self, name: &str) {
        if let Some(window) = self.try_open("", name) {
            if let Err(e) = window.focus() {
                debug!(window = %name, error = %e, "Focus refused");
            }
        }
    }

    fn lookup_then_replace(&self, url: &str, name: &str) {
        let window = match self.try_open("", name) {
            Some(window) if !window.is_closed() => Some(window),
            _ => self.try_open("about:blank", name),
        };
        let Some(window) = window else {
            debug!(window = %name, "Popup blocked");
            return;
        };

        let navigated = window
            .replace_location(url)
            .and_then(|_| window.focus());
        if let Err(e) = navigated {
            debug!(window = %name, error = %e, "Location replace refused, reopening by target");
            self.try_open(url, name);
        }
    }

    fn direct_target(&self, url: &str, name: &str) {
        match self.host.open(url, name) {
            Ok(Some(window)) => {
                if let Err(e) = window.focus() {
                    debug!(window = %name, error = %e, "Focus refused");
                }
            }
            Ok(None) => debug!(window = %name, "Popup blocked"),
            Err(e) => {
                debug!(window = %name, error = %e, "Targeted open failed, retrying once");
                self.try_open(url, name);
            }
        }
    }

    fn try_open(&self, url: &str, name: &str) -> Option<H::Window> {
        match self.host.open(url, name) {
            Ok(window) => window,
            Err(e) => {
                warn!(window = %name, error = %e, "window.open failed");
                None
            }
        }
    }
}
