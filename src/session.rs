//! Tab sessions: one browser tab per supplier, navigated to the query page
//!
//! A session moves `Idle → Locating/Creating → Navigating → WaitingLoad →
//! Settled`. There is no failure state after a tab exists: a load that never
//! completes still ends `Settled` once the ceiling elapses, and whether the
//! page is usable is decided by extraction.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::platform::{LoadStatus, TabId, TabPlatform, TabUpdate};
use crate::supplier::{SupplierCatalog, SupplierId, SupplierProfile};
use crate::utils::{SearchError, Timings};

/// Tab bound to each supplier for the lifetime of the process
#[derive(Debug, Default)]
pub struct TabRegistry {
    tabs: Mutex<HashMap<SupplierId, TabId>>,
}

impl TabRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, supplier: SupplierId) -> Option<TabId> {
        self.tabs.lock().get(&supplier).cloned()
    }

    /// Bind `tab` to `supplier`, returning the tab previously bound
    pub fn bind(&self, supplier: SupplierId, tab: TabId) -> Option<TabId> {
        self.tabs.lock().insert(supplier, tab)
    }

    pub fn forget(&self, supplier: SupplierId) -> Option<TabId> {
        self.tabs.lock().remove(&supplier)
    }

    pub fn len(&self) -> usize {
        self.tabs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.lock().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Locating,
    Creating,
    Navigating,
    WaitingLoad,
    Settled,
}

/// How a load wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSignal {
    /// The tab reported load completion
    Completed,
    /// The ceiling elapsed first
    TimedOut,
    /// The update stream closed; nothing more will arrive
    SourceClosed,
}

/// Wait until `tab` reports load completion or `ceiling` elapses
///
/// Takes ownership of the receiver: it is dropped, and the subscription
/// released, exactly once when this returns, together with the timer.
/// Updates for other tabs are ignored. A lagging receiver keeps waiting.
pub async fn wait_for_load(
    mut updates: broadcast::Receiver<TabUpdate>,
    tab: &TabId,
    ceiling: Duration,
) -> LoadSignal {
    let deadline = tokio::time::sleep(ceiling);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            biased;

            update = updates.recv() => match update {
                Ok(update) if &update.tab == tab && update.status == LoadStatus::Complete => {
                    return LoadSignal::Completed;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    trace!("Load watcher for tab {} skipped {} updates", tab, skipped);
                }
                Err(RecvError::Closed) => return LoadSignal::SourceClosed,
            },
            _ = &mut deadline => return LoadSignal::TimedOut,
        }
    }
}

/// A supplier tab showing the results of one query
#[derive(Debug, Clone)]
pub struct TabSession {
    tab: TabId,
    supplier: SupplierId,
    url: Url,
    state: SessionState,
    load: Option<LoadSignal>,
    reused: bool,
}

impl TabSession {
    fn new(supplier: SupplierId, url: Url) -> Self {
        Self {
            tab: TabId::new(String::new()),
            supplier,
            url,
            state: SessionState::Idle,
            load: None,
            reused: false,
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!("{} session: {:?} -> {:?}", self.supplier, self.state, next);
        self.state = next;
    }

    pub fn tab(&self) -> &TabId {
        &self.tab
    }

    pub fn supplier(&self) -> SupplierId {
        self.supplier
    }

    /// Query page the tab was sent to
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// How the load wait ended, once the session reached `WaitingLoad`
    pub fn load_signal(&self) -> Option<LoadSignal> {
        self.load
    }

    /// Whether an already open tab was navigated instead of opening one
    pub fn reused(&self) -> bool {
        self.reused
    }
}

/// Finds or opens the tab for a supplier and brings it to a settled query page
pub struct TabSessionManager {
    platform: Arc<dyn TabPlatform>,
    registry: Arc<TabRegistry>,
    catalog: Arc<SupplierCatalog>,
    timings: Timings,
}

impl TabSessionManager {
    pub fn new(
        platform: Arc<dyn TabPlatform>,
        registry: Arc<TabRegistry>,
        catalog: Arc<SupplierCatalog>,
        timings: Timings,
    ) -> Self {
        Self {
            platform,
            registry,
            catalog,
            timings,
        }
    }

    pub fn registry(&self) -> &Arc<TabRegistry> {
        &self.registry
    }

    /// Return a settled session on `supplier`'s results page for `query`
    ///
    /// Fails only before a tab exists: unknown supplier, unusable search URL,
    /// or tab creation refused by the platform.
    pub async fn acquire(&self, supplier: SupplierId, query: &str) -> Result<TabSession, SearchError> {
        let profile = self
            .catalog
            .profile(supplier)
            .ok_or_else(|| SearchError::UnknownSupplier(supplier.to_string()))?;
        let url = profile.search_url(query)?;
        let mut session = TabSession::new(supplier, url);

        session.transition(SessionState::Locating);
        let mut opened = None;
        if let Some(existing) = self.locate(supplier, profile).await {
            session.transition(SessionState::Navigating);
            // subscribe first so a fast load cannot slip past the watcher
            let updates = self.platform.subscribe();
            match self.platform.navigate(&existing, &session.url).await {
                Ok(()) => {
                    session.reused = true;
                    opened = Some((existing, updates));
                }
                Err(e) => {
                    warn!(
                        "Reusing tab {} for {} failed, opening a new one: {}",
                        existing, supplier, e
                    );
                    self.registry.forget(supplier);
                }
            }
        }

        let (tab, updates) = match opened {
            Some(opened) => opened,
            None => {
                session.transition(SessionState::Creating);
                let updates = self.platform.subscribe();
                let tab = self.platform.create_tab(&session.url).await?;
                session.transition(SessionState::Navigating);
                (tab, updates)
            }
        };
        session.tab = tab;
        self.registry.bind(supplier, session.tab.clone());

        session.transition(SessionState::WaitingLoad);
        let signal = wait_for_load(updates, &session.tab, self.timings.load_ceiling).await;
        match signal {
            LoadSignal::Completed => debug!("Tab {} finished loading", session.tab),
            LoadSignal::TimedOut => warn!(
                "Tab {} did not finish loading within {:?}, continuing",
                session.tab, self.timings.load_ceiling
            ),
            LoadSignal::SourceClosed => warn!(
                "Load updates closed while waiting on tab {}, continuing",
                session.tab
            ),
        }
        session.load = Some(signal);

        tokio::time::sleep(self.timings.quiet_period).await;
        session.transition(SessionState::Settled);

        info!(
            "{} tab {} settled on {} ({})",
            supplier,
            session.tab,
            session.url,
            if session.reused { "reused" } else { "new" }
        );
        Ok(session)
    }

    /// Tab to reuse: the registered one if still open on the supplier, else the first matching tab
    async fn locate(&self, supplier: SupplierId, profile: &SupplierProfile) -> Option<TabId> {
        let tabs = match self.platform.list_tabs().await {
            Ok(tabs) => tabs,
            Err(e) => {
                warn!("Cannot enumerate tabs for {}: {}", supplier, e);
                return None;
            }
        };

        if let Some(bound) = self.registry.get(supplier) {
            if tabs
                .iter()
                .any(|tab| tab.id == bound && profile.matches_url(&tab.url))
            {
                return Some(bound);
            }
            debug!("Registered tab {} for {} is gone or moved away", bound, supplier);
            self.registry.forget(supplier);
        }

        tabs.into_iter()
            .find(|tab| profile.matches_url(&tab.url))
            .map(|tab| tab.id)
    }
}
