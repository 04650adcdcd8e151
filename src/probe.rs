//! Page probe: reach, (re)install and query the in-page agent

use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::agent::{AgentReply, AgentRequest, AgentScript};
use crate::platform::{ChannelError, TabPlatform};
use crate::product::{ProductRecord, dedup_by_name};
use crate::session::TabSession;
use crate::supplier::SupplierCatalog;
use crate::utils::{SearchError, Timings};

/// Why an extraction attempt produced no list
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionFailure {
    #[error("extraction agent unreachable")]
    NoAgent,

    #[error("extraction agent did not answer in time")]
    Timeout,

    #[error("unreadable agent reply: {0}")]
    ParseError(String),
}

impl ExtractionFailure {
    /// Failures of the message channel itself, which a reinstall may cure
    pub fn is_channel_failure(&self) -> bool {
        matches!(self, ExtractionFailure::NoAgent | ExtractionFailure::Timeout)
    }
}

/// Result of one extraction attempt
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    /// The agent answered; the list may be empty
    Extracted(Vec<ProductRecord>),
    Failed(ExtractionFailure),
}

pub struct PageProbe {
    platform: Arc<dyn TabPlatform>,
    catalog: Arc<SupplierCatalog>,
    timings: Timings,
}

impl PageProbe {
    pub fn new(platform: Arc<dyn TabPlatform>, catalog: Arc<SupplierCatalog>, timings: Timings) -> Self {
        Self {
            platform,
            catalog,
            timings,
        }
    }

    /// Whether an agent in the session's tab answers a request
    ///
    /// Any failure, including a parse error, counts as unreachable.
    pub async fn probe(&self, session: &TabSession) -> bool {
        match self.extract(session).await {
            ExtractionOutcome::Extracted(_) => true,
            ExtractionOutcome::Failed(failure) => {
                debug!("Probe of tab {} failed: {}", session.tab(), failure);
                false
            }
        }
    }

    /// Inject the supplier's agent script, then wait the install settle period
    pub async fn install(&self, session: &TabSession) -> Result<(), SearchError> {
        let supplier = session.supplier();
        let profile = self
            .catalog
            .profile(supplier)
            .ok_or_else(|| SearchError::UnknownSupplier(supplier.to_string()))?;
        let script = AgentScript::for_supplier(supplier, profile).await?;

        self.platform
            .inject_script(session.tab(), &script)
            .await
            .map_err(|e| SearchError::AgentInstall(e.to_string()))?;
        info!("Installed {} agent in tab {}", supplier, session.tab());

        tokio::time::sleep(self.timings.install_settle).await;
        Ok(())
    }

    /// Ask the agent for the products on the page, bounded by the agent timeout
    pub async fn extract(&self, session: &TabSession) -> ExtractionOutcome {
        let request = AgentRequest::ExtractProducts;
        let sent = tokio::time::timeout(
            self.timings.agent_timeout,
            self.platform.send_message(session.tab(), &request),
        )
        .await;

        let value = match sent {
            Err(_) => {
                warn!(
                    "Agent in tab {} silent for {:?}",
                    session.tab(),
                    self.timings.agent_timeout
                );
                return ExtractionOutcome::Failed(ExtractionFailure::Timeout);
            }
            Ok(Err(ChannelError::NoReceiver)) => {
                return ExtractionOutcome::Failed(ExtractionFailure::NoAgent);
            }
            Ok(Err(ChannelError::TabClosed(tab))) => {
                debug!("Tab {} closed before the agent answered", tab);
                return ExtractionOutcome::Failed(ExtractionFailure::NoAgent);
            }
            Ok(Err(ChannelError::Malformed(reason))) => {
                return ExtractionOutcome::Failed(ExtractionFailure::ParseError(reason));
            }
            Ok(Ok(value)) => value,
        };

        match decode_reply(value) {
            Ok(products) => {
                debug!(
                    "Agent in tab {} returned {} products",
                    session.tab(),
                    products.len()
                );
                ExtractionOutcome::Extracted(products)
            }
            Err(reason) => ExtractionOutcome::Failed(ExtractionFailure::ParseError(reason)),
        }
    }
}

/// Decode a wire reply, re-applying record invariants
fn decode_reply(value: Value) -> Result<Vec<ProductRecord>, String> {
    let reply: AgentReply = serde_json::from_value(value).map_err(|e| e.to_string())?;
    let records = reply
        .products
        .into_iter()
        .filter_map(ProductRecord::sanitize)
        .collect();
    Ok(dedup_by_name(records))
}
