//! In-memory tab platform
//!
//! Serves stored HTML per supplier. Each knob reproduces a failure seen
//! against real browsers: agents that never auto-inject, injections that
//! silently do nothing, load events that never arrive, tab creation refused.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::broadcast;
use tracing::{debug, trace};
use url::Url;

use super::{
    ChannelError, LoadStatus, PlatformError, TabId, TabInfo, TabPlatform, TabUpdate,
    UPDATE_CHANNEL_CAPACITY,
};
use crate::agent::{AgentRequest, AgentScript, PageAgent};
use crate::supplier::{SupplierCatalog, SupplierId};

/// Call counters, for asserting what the core asked of the platform
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub tabs_created: usize,
    pub navigations: usize,
    pub injections: usize,
    pub messages: usize,
}

#[derive(Debug, Clone, Copy)]
struct Behaviour {
    auto_agent: bool,
    load_events: bool,
    refuse_tabs: bool,
    injection_works: bool,
}

impl Default for Behaviour {
    fn default() -> Self {
        Self {
            auto_agent: true,
            load_events: true,
            refuse_tabs: false,
            injection_works: true,
        }
    }
}

#[derive(Debug)]
struct MemoryTab {
    id: TabId,
    url: String,
    agent: Option<SupplierId>,
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: u64,
    tabs: Vec<MemoryTab>,
    pages: HashMap<SupplierId, String>,
    behaviour: Behaviour,
    stats: MemoryStats,
}

impl MemoryState {
    fn tab_mut(&mut self, id: &TabId) -> Option<&mut MemoryTab> {
        self.tabs.iter_mut().find(|tab| &tab.id == id)
    }
}

pub struct MemoryTabs {
    state: Mutex<MemoryState>,
    updates: broadcast::Sender<TabUpdate>,
    catalog: SupplierCatalog,
    agent: PageAgent,
}

impl MemoryTabs {
    pub fn new(catalog: SupplierCatalog, agent: PageAgent) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(MemoryState::default()),
            updates,
            catalog,
            agent,
        }
    }

    /// Whether navigating to a supplier page installs its agent by itself
    pub fn with_auto_agent(mut self, enabled: bool) -> Self {
        self.state.get_mut().behaviour.auto_agent = enabled;
        self
    }

    /// Whether tabs report load completion at all
    pub fn with_load_events(mut self, enabled: bool) -> Self {
        self.state.get_mut().behaviour.load_events = enabled;
        self
    }

    /// Make every `create_tab` fail
    pub fn refusing_tabs(mut self) -> Self {
        self.state.get_mut().behaviour.refuse_tabs = true;
        self
    }

    /// Make injections report success without installing anything
    pub fn with_broken_injection(mut self) -> Self {
        self.state.get_mut().behaviour.injection_works = false;
        self
    }

    /// Page content every tab on `supplier`'s domain renders
    pub fn serve(&self, supplier: SupplierId, html: impl Into<String>) {
        self.state.lock().pages.insert(supplier, html.into());
    }

    /// Serve `<supplier>.html` files found in `dir`; returns how many were loaded
    pub fn serve_dir(&self, dir: &Path) -> std::io::Result<usize> {
        let mut served = 0;
        for supplier in self.catalog.ids() {
            let path = dir.join(format!("{}.html", supplier.as_str()));
            if !path.is_file() {
                continue;
            }
            self.serve(supplier, std::fs::read_to_string(&path)?);
            debug!("Replaying {} from {}", supplier, path.display());
            served += 1;
        }
        Ok(served)
    }

    /// Open a tab as the user would, outside any search
    pub fn open_tab(&self, url: &str) -> TabId {
        let mut state = self.state.lock();
        self.push_tab(&mut state, url)
    }

    /// Close a tab as the user would
    pub fn close_tab(&self, tab: &TabId) {
        self.state.lock().tabs.retain(|t| &t.id != tab);
    }

    /// Drop the agent of a tab, as a page reload without auto-injection would
    pub fn clear_agent(&self, tab: &TabId) {
        if let Some(tab) = self.state.lock().tab_mut(tab) {
            tab.agent = None;
        }
    }

    pub fn tabs(&self) -> Vec<TabInfo> {
        self.state
            .lock()
            .tabs
            .iter()
            .map(|tab| TabInfo {
                id: tab.id.clone(),
                url: tab.url.clone(),
            })
            .collect()
    }

    pub fn stats(&self) -> MemoryStats {
        self.state.lock().stats
    }

    fn push_tab(&self, state: &mut MemoryState, url: &str) -> TabId {
        state.next_id += 1;
        let id = TabId::new(format!("mem-{}", state.next_id));
        let agent = self.auto_agent(state.behaviour, url);
        state.tabs.push(MemoryTab {
            id: id.clone(),
            url: url.to_string(),
            agent,
        });
        id
    }

    fn auto_agent(&self, behaviour: Behaviour, url: &str) -> Option<SupplierId> {
        if behaviour.auto_agent {
            self.catalog.supplier_for_url(url)
        } else {
            None
        }
    }

    fn report_load(&self, tab: &TabId, load_events: bool) {
        let _ = self.updates.send(TabUpdate {
            tab: tab.clone(),
            status: LoadStatus::Loading,
        });
        if load_events {
            let _ = self.updates.send(TabUpdate {
                tab: tab.clone(),
                status: LoadStatus::Complete,
            });
        }
    }
}

#[async_trait]
impl TabPlatform for MemoryTabs {
    async fn list_tabs(&self) -> Result<Vec<TabInfo>, PlatformError> {
        Ok(self.tabs())
    }

    async fn create_tab(&self, url: &Url) -> Result<TabId, PlatformError> {
        let (id, load_events) = {
            let mut state = self.state.lock();
            if state.behaviour.refuse_tabs {
                return Err(PlatformError::TabCreationRefused(
                    "tab creation disabled".to_string(),
                ));
            }
            state.stats.tabs_created += 1;
            let id = self.push_tab(&mut state, url.as_str());
            (id, state.behaviour.load_events)
        };

        trace!("Created tab {} at {}", id, url);
        self.report_load(&id, load_events);
        Ok(id)
    }

    async fn navigate(&self, tab: &TabId, url: &Url) -> Result<(), PlatformError> {
        let load_events = {
            let mut state = self.state.lock();
            state.stats.navigations += 1;
            let behaviour = state.behaviour;
            let agent = self.auto_agent(behaviour, url.as_str());
            let entry = state
                .tab_mut(tab)
                .ok_or_else(|| PlatformError::TabNotFound(tab.clone()))?;
            entry.url = url.to_string();
            entry.agent = agent;
            behaviour.load_events
        };

        trace!("Navigated tab {} to {}", tab, url);
        self.report_load(tab, load_events);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<TabUpdate> {
        self.updates.subscribe()
    }

    async fn inject_script(&self, tab: &TabId, script: &AgentScript) -> Result<(), PlatformError> {
        let mut state = self.state.lock();
        state.stats.injections += 1;
        let works = state.behaviour.injection_works;
        let entry = state
            .tab_mut(tab)
            .ok_or_else(|| PlatformError::TabNotFound(tab.clone()))?;
        if works {
            entry.agent = Some(script.supplier());
        }
        Ok(())
    }

    async fn send_message(&self, tab: &TabId, request: &AgentRequest) -> Result<Value, ChannelError> {
        let answer = {
            let mut state = self.state.lock();
            state.stats.messages += 1;
            let (url, agent) = state
                .tabs
                .iter()
                .find(|t| &t.id == tab)
                .map(|t| (t.url.clone(), t.agent))
                .ok_or_else(|| ChannelError::TabClosed(tab.clone()))?;
            match agent {
                Some(supplier) => {
                    let html = state.pages.get(&supplier).cloned().unwrap_or_default();
                    json!({ "supplier": supplier, "url": url, "html": html })
                }
                None => Value::Null,
            }
        };

        self.agent.respond(request, answer)
    }
}
