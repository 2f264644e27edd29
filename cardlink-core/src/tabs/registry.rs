//! In-process model of a browser's named windows.

use super::{BrowserWindow, TabError, WindowHost};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Debug)]
struct Tab {
    id: u64,
    name: String,
    history: Vec<String>,
    closed: bool,
}

#[derive(Debug, Default)]
struct RegistryState {
    tabs: Vec<Tab>,
    focused: Option<u64>,
    next_id: u64,
    block_popups: bool,
    deny_replace: bool,
}

impl RegistryState {
    fn live_tab(&mut self, name: &str) -> Option<&mut Tab> {
        self.tabs.iter_mut().find(|t| !t.closed && t.name == name)
    }

    fn tab_by_id(&mut self, id: u64) -> Option<&mut Tab> {
        self.tabs.iter_mut().find(|t| t.id == id)
    }
}

/// One tab per name, like `window.open(url, name)` in a browser session.
/// Clones share the same set of tabs.
#[derive(Debug, Clone, Default)]
pub struct TabRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl TabRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_block_popups(&self, block: bool) {
        self.lock().block_popups = block;
    }

    /// Make `replace_location` fail as a cross-origin window would.
    pub fn set_deny_replace(&self, deny: bool) {
        self.lock().deny_replace = deny;
    }

    /// Number of open tabs.
    pub fn tab_count(&self) -> usize {
        self.lock().tabs.iter().filter(|t| !t.closed).count()
    }

    pub fn names(&self) -> Vec<String> {
        self.lock()
            .tabs
            .iter()
            .filter(|t| !t.closed)
            .map(|t| t.name.clone())
            .collect()
    }

    pub fn current_url(&self, name: &str) -> Option<String> {
        self.lock().live_tab(name)?.history.last().cloned()
    }

    pub fn history(&self, name: &str) -> Vec<String> {
        self.lock()
            .live_tab(name)
            .map(|t| t.history.clone())
            .unwrap_or_default()
    }

    pub fn focused(&self) -> Option<String> {
        let state = self.lock();
        let id = state.focused?;
        state
            .tabs
            .iter()
            .find(|t| t.id == id && !t.closed)
            .map(|t| t.name.clone())
    }

    pub fn close(&self, name: &str) {
        if let Some(tab) = self.lock().live_tab(name) {
            tab.closed = true;
        }
    }
}

impl WindowHost for TabRegistry {
    type Window = RegistryWindow;

    fn open(&self, url: &str, target: &str) -> Result<Option<RegistryWindow>, TabError> {
        let mut state = self.lock();
        if state.block_popups {
            return Ok(None);
        }

        if let Some(tab) = state.live_tab(target) {
            if !url.is_empty() {
                tab.history.push(url.to_string());
            }
            let id = tab.id;
            return Ok(Some(RegistryWindow {
                id,
                state: Arc::clone(&self.state),
            }));
        }

        let id = state.next_id;
        state.next_id += 1;
        let first = if url.is_empty() { "about:blank" } else { url };
        state.tabs.push(Tab {
            id,
            name: target.to_string(),
            history: vec![first.to_string()],
            closed: false,
        });
        state.focused = Some(id);
        debug!(window = %target, url = %first, "Opened new tab");

        Ok(Some(RegistryWindow {
            id,
            state: Arc::clone(&self.state),
        }))
    }
}

/// Handle to one tab of a [`TabRegistry`].
#[derive(Debug, Clone)]
pub struct RegistryWindow {
    id: u64,
    state: Arc<Mutex<RegistryState>>,
}

impl RegistryWindow {
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BrowserWindow for RegistryWindow {
    fn is_closed(&self) -> bool {
        self.lock().tab_by_id(self.id).is_none_or(|t| t.closed)
    }

    fn replace_location(&self, url: &str) -> Result<(), TabError> {
        let mut state = self.lock();
        if state.deny_replace {
            return Err(TabError::Security("cross-origin location access".to_string()));
        }
        let tab = state
            .tab_by_id(self.id)
            .filter(|t| !t.closed)
            .ok_or(TabError::Closed)?;
        match tab.history.last_mut() {
            Some(current) => *current = url.to_string(),
            None => tab.history.push(url.to_string()),
        }
        Ok(())
    }

    fn focus(&self) -> Result<(), TabError> {
        let mut state = self.lock();
        if state.tab_by_id(self.id).is_none_or(|t| t.closed) {
            return Err(TabError::Closed);
        }
        state.focused = Some(self.id);
        Ok(())
    }
}
