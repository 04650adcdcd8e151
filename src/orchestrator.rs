//! Search orchestration
//!
//! One search: acquire the supplier's tab session, ask the agent for
//! products, and on a channel failure run a single recovery cycle
//! (reinstall, probe, extract once more). Every failure ends in a
//! [`SearchResponse`] carrying an empty list and a diagnostic.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::platform::TabPlatform;
use crate::probe::{ExtractionOutcome, PageProbe};
use crate::product::ProductRecord;
use crate::session::{TabRegistry, TabSessionManager};
use crate::supplier::{SupplierCatalog, SupplierId};
use crate::utils::{SearchError, Timings};

/// Inbound request from the business layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub supplier: String,
    pub query: String,
}

/// Outcome of one search; `error` is set only when something went wrong
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub products: Vec<ProductRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SearchResponse {
    pub fn found(products: Vec<ProductRecord>) -> Self {
        Self {
            products,
            error: None,
        }
    }

    pub fn failed(diagnostic: impl Into<String>) -> Self {
        Self {
            products: Vec::new(),
            error: Some(diagnostic.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Progress of the single recovery cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    NotTried,
    Probed,
    Reinstalled,
    Retried,
    GivenUp,
}

/// What the orchestrator does next
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Extract,
    Reinstall,
    Finish(Vec<ProductRecord>),
    GiveUp(String),
}

/// At most one reinstall per search
///
/// `NotTried → Probed` on the first extraction. A channel failure there asks
/// for a reinstall; a reachable agent afterwards moves to `Reinstalled` and
/// allows one more extraction (`Retried`). Anything else gives up.
#[derive(Debug)]
pub struct Recovery {
    state: RecoveryState,
}

impl Default for Recovery {
    fn default() -> Self {
        Self::new()
    }
}

impl Recovery {
    pub fn new() -> Self {
        Self {
            state: RecoveryState::NotTried,
        }
    }

    pub fn state(&self) -> RecoveryState {
        self.state
    }

    /// Record an extraction attempt and pick the next step
    pub fn on_outcome(&mut self, outcome: ExtractionOutcome) -> Step {
        self.state = match self.state {
            RecoveryState::NotTried => RecoveryState::Probed,
            RecoveryState::Reinstalled => RecoveryState::Retried,
            _ => return self.give_up("extraction attempted out of order".to_string()),
        };

        match outcome {
            ExtractionOutcome::Extracted(products) => Step::Finish(products),
            ExtractionOutcome::Failed(failure)
                if self.state == RecoveryState::Probed && failure.is_channel_failure() =>
            {
                Step::Reinstall
            }
            ExtractionOutcome::Failed(failure) if self.state == RecoveryState::Retried => {
                self.give_up(format!("{failure} after reinstalling the agent"))
            }
            ExtractionOutcome::Failed(failure) => self.give_up(failure.to_string()),
        }
    }

    /// Record the reinstall: `Ok(reachable)` from the follow-up probe, or the install error
    pub fn on_reinstall(&mut self, installed: Result<bool, SearchError>) -> Step {
        if self.state != RecoveryState::Probed {
            return self.give_up("reinstall attempted out of order".to_string());
        }

        match installed {
            Ok(true) => {
                self.state = RecoveryState::Reinstalled;
                Step::Extract
            }
            Ok(false) => self.give_up("agent still unreachable after reinstall".to_string()),
            Err(e) => self.give_up(e.to_string()),
        }
    }

    fn give_up(&mut self, reason: String) -> Step {
        self.state = RecoveryState::GivenUp;
        Step::GiveUp(reason)
    }
}

pub struct SearchOrchestrator {
    catalog: Arc<SupplierCatalog>,
    sessions: TabSessionManager,
    probe: PageProbe,
}

impl SearchOrchestrator {
    pub fn new(
        platform: Arc<dyn TabPlatform>,
        registry: Arc<TabRegistry>,
        catalog: Arc<SupplierCatalog>,
        timings: Timings,
    ) -> Self {
        Self {
            sessions: TabSessionManager::new(platform.clone(), registry, catalog.clone(), timings),
            probe: PageProbe::new(platform, catalog.clone(), timings),
            catalog,
        }
    }

    pub fn registry(&self) -> &Arc<TabRegistry> {
        self.sessions.registry()
    }

    /// Serve an inbound request; the supplier name is parsed here
    pub async fn handle(&self, request: SearchRequest) -> SearchResponse {
        match request.supplier.parse::<SupplierId>() {
            Ok(supplier) => self.search(supplier, &request.query).await,
            Err(e) => {
                warn!("Rejected search: {}", e);
                SearchResponse::failed(e.to_string())
            }
        }
    }

    /// Search one supplier; never fails, problems land in `error`
    pub async fn search(&self, supplier: SupplierId, query: &str) -> SearchResponse {
        let query = query.trim();
        if query.is_empty() {
            let e = SearchError::InvalidQuery("query is empty".to_string());
            warn!("Rejected {} search: {}", supplier, e);
            return SearchResponse::failed(e.to_string());
        }
        if self.catalog.profile(supplier).is_none() {
            let e = SearchError::UnknownSupplier(format!("{supplier} is not configured"));
            warn!("Rejected search: {}", e);
            return SearchResponse::failed(e.to_string());
        }

        info!("Searching {} for {:?}", supplier, query);
        let session = match self.sessions.acquire(supplier, query).await {
            Ok(session) => session,
            Err(e) => {
                warn!("{} search aborted: {}", supplier, e);
                return SearchResponse::failed(format!("{supplier}: {e}"));
            }
        };

        let mut recovery = Recovery::new();
        let mut step = Step::Extract;
        loop {
            step = match step {
                Step::Extract => recovery.on_outcome(self.probe.extract(&session).await),
                Step::Reinstall => {
                    warn!("{} agent unreachable in tab {}, reinstalling", supplier, session.tab());
                    let installed = match self.probe.install(&session).await {
                        Ok(()) => Ok(self.probe.probe(&session).await),
                        Err(e) => Err(e),
                    };
                    recovery.on_reinstall(installed)
                }
                Step::Finish(products) => {
                    info!("{} search returned {} products", supplier, products.len());
                    return SearchResponse::found(products);
                }
                Step::GiveUp(reason) => {
                    warn!("{} search gave up: {}", supplier, reason);
                    return SearchResponse::failed(format!("{supplier}: {reason}"));
                }
            };
        }
    }
}
