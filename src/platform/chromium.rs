//! Tab platform backed by the shared Chrome instance
//!
//! Pages are tracked by CDP target id. Every tracked page gets a background
//! task forwarding `Page.loadEventFired` into the shared update channel, so
//! load watchers see completions for navigations they did not start.
//!
//! Tabs headed for a supplier page get that supplier's agent registered with
//! `Page.addScriptToEvaluateOnNewDocument`, so it is present in every document
//! the tab loads. `inject_script` only covers the current document and is
//! left for recovery.

use async_trait::async_trait;
use chromiumoxide::page::Page;
use chromiumoxide_cdp::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, EventLoadEventFired,
    RemoveScriptToEvaluateOnNewDocumentParams, ScriptIdentifier,
};
use chromiumoxide_cdp::cdp::browser_protocol::target::CreateTargetParams;
use dashmap::DashMap;
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use url::Url;

use super::{
    ChannelError, LoadStatus, PlatformError, TabId, TabInfo, TabPlatform, TabUpdate,
    UPDATE_CHANNEL_CAPACITY,
};
use crate::agent::{AgentRequest, AgentScript, PageAgent};
use crate::manager::BrowserManager;
use crate::supplier::{SupplierCatalog, SupplierId};

pub struct ChromiumTabs {
    manager: Arc<BrowserManager>,
    catalog: Arc<SupplierCatalog>,
    pages: DashMap<TabId, Page>,
    listeners: DashMap<TabId, JoinHandle<()>>,
    /// Agent registered for new documents, per tab
    resident: DashMap<TabId, (SupplierId, ScriptIdentifier)>,
    updates: broadcast::Sender<TabUpdate>,
    agent: PageAgent,
}

/// What a navigation requires of the tab's resident agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResidentChange {
    Keep,
    Install(SupplierId),
    Remove,
}

fn resident_change(current: Option<SupplierId>, target: Option<SupplierId>) -> ResidentChange {
    match (current, target) {
        (current, Some(target)) if current != Some(target) => ResidentChange::Install(target),
        (Some(_), None) => ResidentChange::Remove,
        _ => ResidentChange::Keep,
    }
}

fn tab_id(page: &Page) -> TabId {
    TabId::new(page.target_id().inner().clone())
}

impl ChromiumTabs {
    pub fn new(manager: Arc<BrowserManager>, catalog: Arc<SupplierCatalog>, agent: PageAgent) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            manager,
            catalog,
            pages: DashMap::new(),
            listeners: DashMap::new(),
            resident: DashMap::new(),
            updates,
            agent,
        }
    }

    /// Stop load listeners and close the browser
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        for entry in self.listeners.iter() {
            entry.value().abort();
        }
        self.listeners.clear();
        self.resident.clear();
        self.pages.clear();
        self.manager.shutdown().await
    }

    fn page(&self, tab: &TabId) -> Option<Page> {
        self.pages.get(tab).map(|entry| entry.value().clone())
    }

    /// Remember `page` and forward its load events
    async fn track(&self, id: TabId, page: Page) {
        if !self.listeners.contains_key(&id) {
            match page.event_listener::<EventLoadEventFired>().await {
                Ok(mut events) => {
                    let updates = self.updates.clone();
                    let tab = id.clone();
                    let handle = tokio::spawn(async move {
                        while events.next().await.is_some() {
                            // no subscribers is fine; nobody is waiting on this tab
                            let _ = updates.send(TabUpdate {
                                tab: tab.clone(),
                                status: LoadStatus::Complete,
                            });
                        }
                        trace!("Load listener for tab {} ended", tab);
                    });
                    self.listeners.insert(id.clone(), handle);
                }
                Err(e) => warn!("Cannot listen for load events on tab {}: {}", id, e),
            }
        }
        self.pages.insert(id, page);
    }

    /// Drop bookkeeping for tabs the user closed
    fn retain_open(&self, open: &[TabInfo]) {
        self.pages.retain(|id, _| open.iter().any(|tab| &tab.id == id));
        self.resident.retain(|id, _| open.iter().any(|tab| &tab.id == id));
        self.listeners.retain(|id, handle| {
            let keep = open.iter().any(|tab| &tab.id == id);
            if !keep {
                handle.abort();
            }
            keep
        });
    }

    /// Make the agent of the supplier behind `url` resident in the tab
    ///
    /// Failures are logged only; the probe reinstalls a missing agent.
    async fn prepare_agent(&self, tab: &TabId, page: &Page, url: &Url) {
        let target = self.catalog.supplier_for_url(url.as_str());
        let current = self.resident.get(tab).map(|entry| entry.value().0);

        let supplier = match resident_change(current, target) {
            ResidentChange::Keep => return,
            ResidentChange::Remove => {
                self.evict_agent(tab, page).await;
                return;
            }
            ResidentChange::Install(supplier) => supplier,
        };
        self.evict_agent(tab, page).await;

        let Some(profile) = self.catalog.profile(supplier) else {
            return;
        };
        let script = match AgentScript::for_supplier(supplier, profile).await {
            Ok(script) => script,
            Err(e) => {
                warn!("No resident agent for tab {}: {}", tab, e);
                return;
            }
        };

        match page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(script.source().to_string()))
            .await
        {
            Ok(response) => {
                debug!("Registered {} agent for new documents in tab {}", supplier, tab);
                self.resident
                    .insert(tab.clone(), (supplier, response.result.identifier.clone()));
            }
            Err(e) => warn!("Failed to register {} agent in tab {}: {}", supplier, tab, e),
        }
    }

    async fn evict_agent(&self, tab: &TabId, page: &Page) {
        let Some((_, (supplier, identifier))) = self.resident.remove(tab) else {
            return;
        };
        if let Err(e) = page
            .execute(RemoveScriptToEvaluateOnNewDocumentParams::new(identifier))
            .await
        {
            debug!("Failed to unregister {} agent in tab {}: {}", supplier, tab, e);
        }
    }

    /// Kick off navigation; completion is reported by the load listener
    fn start_navigation(&self, tab: TabId, page: Page, url: &Url) {
        let _ = self.updates.send(TabUpdate {
            tab: tab.clone(),
            status: LoadStatus::Loading,
        });

        let target = url.to_string();
        tokio::spawn(async move {
            if let Err(e) = page.goto(target.clone()).await {
                warn!("Navigation of tab {} to {} failed: {}", tab, target, e);
            }
        });
    }
}

#[async_trait]
impl TabPlatform for ChromiumTabs {
    async fn list_tabs(&self) -> Result<Vec<TabInfo>, PlatformError> {
        let browser_arc = self
            .manager
            .get_or_launch()
            .await
            .map_err(|e| PlatformError::BrowserUnavailable(e.to_string()))?;
        let browser_guard = browser_arc.lock().await;
        let wrapper = browser_guard
            .as_ref()
            .ok_or_else(|| PlatformError::BrowserUnavailable("browser not running".into()))?;

        let pages = wrapper
            .browser()
            .pages()
            .await
            .map_err(|e| PlatformError::BrowserUnavailable(e.to_string()))?;
        drop(browser_guard);

        let mut tabs = Vec::with_capacity(pages.len());
        for page in pages {
            let id = tab_id(&page);
            let url = page.url().await.ok().flatten().unwrap_or_default();
            self.track(id.clone(), page).await;
            tabs.push(TabInfo { id, url });
        }

        self.retain_open(&tabs);
        Ok(tabs)
    }

    async fn create_tab(&self, url: &Url) -> Result<TabId, PlatformError> {
        let params = CreateTargetParams::builder()
            .url("about:blank")
            .background(true)
            .build()
            .map_err(PlatformError::TabCreationRefused)?;

        let browser_arc = self
            .manager
            .get_or_launch()
            .await
            .map_err(|e| PlatformError::BrowserUnavailable(e.to_string()))?;
        let browser_guard = browser_arc.lock().await;
        let wrapper = browser_guard
            .as_ref()
            .ok_or_else(|| PlatformError::BrowserUnavailable("browser not running".into()))?;

        let page = wrapper
            .browser()
            .new_page(params)
            .await
            .map_err(|e| PlatformError::TabCreationRefused(e.to_string()))?;
        drop(browser_guard);

        let id = tab_id(&page);
        info!("Opened background tab {} for {}", id, url);
        self.track(id.clone(), page.clone()).await;
        self.prepare_agent(&id, &page, url).await;
        self.start_navigation(id.clone(), page, url);
        Ok(id)
    }

    async fn navigate(&self, tab: &TabId, url: &Url) -> Result<(), PlatformError> {
        let page = self
            .page(tab)
            .ok_or_else(|| PlatformError::TabNotFound(tab.clone()))?;
        debug!("Navigating tab {} to {}", tab, url);
        self.prepare_agent(tab, &page, url).await;
        self.start_navigation(tab.clone(), page, url);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<TabUpdate> {
        self.updates.subscribe()
    }

    async fn inject_script(&self, tab: &TabId, script: &AgentScript) -> Result<(), PlatformError> {
        let page = self
            .page(tab)
            .ok_or_else(|| PlatformError::TabNotFound(tab.clone()))?;

        page.evaluate_expression(script.source().to_string())
            .await
            .map_err(|e| PlatformError::InjectionFailed(e.to_string()))?;

        debug!("Injected {} agent into tab {}", script.supplier(), tab);
        Ok(())
    }

    async fn send_message(&self, tab: &TabId, request: &AgentRequest) -> Result<Value, ChannelError> {
        let page = self
            .page(tab)
            .ok_or_else(|| ChannelError::TabClosed(tab.clone()))?;

        let expression = request
            .invocation()
            .map_err(|e| ChannelError::Malformed(e.to_string()))?;

        // A destroyed execution context (mid-navigation, crashed renderer)
        // means nothing can answer, same as a missing agent.
        let answer = match page.evaluate_expression(expression).await {
            Ok(result) => result.value().cloned().unwrap_or(Value::Null),
            Err(e) => {
                debug!("Agent request to tab {} failed: {}", tab, e);
                return Err(ChannelError::NoReceiver);
            }
        };

        // snapshot parsing and extraction are CPU-bound
        let agent = self.agent.clone();
        let request = *request;
        tokio::task::spawn_blocking(move || agent.respond(&request, answer))
            .await
            .map_err(|e| ChannelError::Malformed(format!("extraction task failed: {e}")))?
    }
}

impl Drop for ChromiumTabs {
    fn drop(&mut self) {
        for entry in self.listeners.iter() {
            entry.value().abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supplier_navigation_installs_its_agent() {
        assert_eq!(
            resident_change(None, Some(SupplierId::SupplierA)),
            ResidentChange::Install(SupplierId::SupplierA)
        );
    }

    #[test]
    fn same_supplier_keeps_registered_agent() {
        assert_eq!(
            resident_change(Some(SupplierId::SupplierB), Some(SupplierId::SupplierB)),
            ResidentChange::Keep
        );
        assert_eq!(resident_change(None, None), ResidentChange::Keep);
    }

    #[test]
    fn switching_supplier_replaces_agent() {
        assert_eq!(
            resident_change(Some(SupplierId::SupplierA), Some(SupplierId::SupplierB)),
            ResidentChange::Install(SupplierId::SupplierB)
        );
    }

    #[test]
    fn leaving_suppliers_removes_agent() {
        assert_eq!(resident_change(Some(SupplierId::SupplierA), None), ResidentChange::Remove);
    }
}
