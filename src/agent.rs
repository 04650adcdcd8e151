//! Page-resident extraction agent
//!
//! The agent has two halves. The in-page half is a small script injected
//! into the supplier tab; it registers `window.__partsAgent` and answers an
//! `extractProducts` request with a snapshot of the rendered document. The
//! host half, [`PageAgent`], turns that snapshot into the wire reply
//! `{ "products": [...] }` using the supplier's extractor.
//!
//! A tab where the script is missing answers `null`, which every platform
//! reports as [`ChannelError::NoReceiver`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::extract::ExtractorSet;
use crate::platform::ChannelError;
use crate::product::ProductRecord;
use crate::supplier::{SupplierId, SupplierProfile};
use crate::utils::SearchError;

/// Global the injected script registers itself under
pub const AGENT_GLOBAL: &str = "__partsAgent";

const SUPPLIER_A_SCRIPT: &str = include_str!("../assets/agents/supplier_a.js");
const SUPPLIER_B_SCRIPT: &str = include_str!("../assets/agents/supplier_b.js");

/// Request sent to the in-page agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum AgentRequest {
    ExtractProducts,
}

impl AgentRequest {
    /// JavaScript expression delivering this request to the in-page agent
    ///
    /// Evaluates to `null` when no agent is registered.
    pub fn invocation(&self) -> Result<String, serde_json::Error> {
        let payload = serde_json::to_string(self)?;
        Ok(format!(
            "(() => {{ const agent = window.{AGENT_GLOBAL}; \
             if (!agent || typeof agent.handle !== 'function') {{ return null; }} \
             return agent.handle({payload}); }})()"
        ))
    }
}

/// Reply to [`AgentRequest::ExtractProducts`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentReply {
    pub products: Vec<ProductRecord>,
}

/// What the in-page half hands back: the rendered document of the tab
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub supplier: SupplierId,
    pub url: String,
    pub html: String,
}

/// Supplier-specific script injected into a tab to (re)install the agent
#[derive(Debug, Clone)]
pub struct AgentScript {
    supplier: SupplierId,
    source: String,
}

impl AgentScript {
    /// Script shipped with the crate
    pub fn embedded(supplier: SupplierId) -> Self {
        let source = match supplier {
            SupplierId::SupplierA => SUPPLIER_A_SCRIPT,
            SupplierId::SupplierB => SUPPLIER_B_SCRIPT,
        };
        Self {
            supplier,
            source: source.to_string(),
        }
    }

    /// Script file configured for the supplier, or the embedded one
    pub async fn for_supplier(
        supplier: SupplierId,
        profile: &SupplierProfile,
    ) -> Result<Self, SearchError> {
        let Some(path) = &profile.agent_script else {
            return Ok(Self::embedded(supplier));
        };

        let source = tokio::fs::read_to_string(path).await.map_err(|e| {
            SearchError::AgentInstall(format!(
                "cannot read agent script {} for {}: {}",
                path.display(),
                supplier,
                e
            ))
        })?;
        debug!("Loaded agent script for {} from {}", supplier, path.display());
        Ok(Self { supplier, source })
    }

    pub fn supplier(&self) -> SupplierId {
        self.supplier
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Host half of the agent: answers requests from page snapshots
#[derive(Clone)]
pub struct PageAgent {
    extractors: Arc<ExtractorSet>,
}

impl PageAgent {
    pub fn new(extractors: Arc<ExtractorSet>) -> Self {
        Self { extractors }
    }

    /// Build the wire reply for `request` from the in-page agent's answer
    pub fn respond(&self, request: &AgentRequest, answer: Value) -> Result<Value, ChannelError> {
        if answer.is_null() {
            return Err(ChannelError::NoReceiver);
        }

        let snapshot: PageSnapshot = serde_json::from_value(answer)
            .map_err(|e| ChannelError::Malformed(format!("page snapshot: {e}")))?;

        match request {
            AgentRequest::ExtractProducts => {
                let extractor = self.extractors.get(snapshot.supplier).ok_or_else(|| {
                    ChannelError::Malformed(format!("no extractor for {}", snapshot.supplier))
                })?;
                let products = extractor.extract_html(&snapshot.html);
                debug!(
                    "Agent on {} extracted {} products from {}",
                    snapshot.supplier,
                    products.len(),
                    snapshot.url
                );
                serde_json::to_value(AgentReply { products })
                    .map_err(|e| ChannelError::Malformed(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supplier::SupplierCatalog;
    use serde_json::json;

    fn agent() -> PageAgent {
        let catalog = SupplierCatalog::default();
        PageAgent::new(Arc::new(ExtractorSet::from_catalog(&catalog).unwrap()))
    }

    #[test]
    fn request_uses_action_tag() {
        let value = serde_json::to_value(AgentRequest::ExtractProducts).unwrap();
        assert_eq!(value, json!({ "action": "extractProducts" }));
    }

    #[test]
    fn invocation_targets_agent_global() {
        let js = AgentRequest::ExtractProducts.invocation().unwrap();
        assert!(js.contains("window.__partsAgent"));
        assert!(js.contains(r#"{"action":"extractProducts"}"#));
    }

    #[test]
    fn embedded_scripts_register_their_supplier() {
        for supplier in SupplierId::ALL {
            let script = AgentScript::embedded(supplier);
            assert!(script.source().contains(AGENT_GLOBAL));
            assert!(script.source().contains(supplier.as_str()));
        }
    }

    #[test]
    fn null_answer_means_no_receiver() {
        let err = agent()
            .respond(&AgentRequest::ExtractProducts, Value::Null)
            .unwrap_err();
        assert_eq!(err, ChannelError::NoReceiver);
    }

    #[test]
    fn garbage_answer_is_malformed() {
        let err = agent()
            .respond(&AgentRequest::ExtractProducts, json!({ "unexpected": true }))
            .unwrap_err();
        assert!(matches!(err, ChannelError::Malformed(_)));
    }

    #[test]
    fn snapshot_is_answered_with_products() {
        let answer = json!({
            "supplier": "supplierA",
            "url": "https://www.supplier-a.example/recherche?s=ecran",
            "html": r#"<article class="product-miniature"><h3 class="product-title">Ecran iPhone 11</h3><span class="price">39,90 €</span></article>"#,
        });
        let reply = agent().respond(&AgentRequest::ExtractProducts, answer).unwrap();
        let reply: AgentReply = serde_json::from_value(reply).unwrap();
        assert_eq!(reply.products.len(), 1);
        assert_eq!(reply.products[0].price, 39.90);
    }
}
