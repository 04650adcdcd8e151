//! Multi-supplier parts search
//!
//! Drives supplier catalog pages in browser tabs, extracts product records
//! from their rendered markup and returns them per supplier. Searches never
//! fail outright: problems surface as an empty list plus a diagnostic.

pub mod agent;
pub mod aggregate;
mod browser;
pub mod browser_setup;
pub mod extract;
mod manager;
pub mod orchestrator;
pub mod platform;
pub mod probe;
pub mod product;
pub mod session;
pub mod supplier;
pub mod utils;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::utils::constants::{
    DEFAULT_AGENT_TIMEOUT_MS, DEFAULT_INSTALL_SETTLE_MS, DEFAULT_LOAD_CEILING_MS,
    DEFAULT_QUIET_PERIOD_MS, DEFAULT_WINDOW_HEIGHT, DEFAULT_WINDOW_WIDTH,
};

/// Environment variable naming a config file, checked before any other source
pub const CONFIG_ENV: &str = "PARTS_SEARCH_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub browser: BrowserConfig,

    /// Per-supplier overrides; missing suppliers use built-in profiles
    #[serde(default)]
    pub suppliers: SupplierCatalog,
}

/// Waits applied by sessions and the probe, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    #[serde(default = "default_load_ceiling_ms")]
    pub load_ceiling_ms: u64,

    #[serde(default = "default_quiet_period_ms")]
    pub quiet_period_ms: u64,

    #[serde(default = "default_install_settle_ms")]
    pub install_settle_ms: u64,

    #[serde(default = "default_agent_timeout_ms")]
    pub agent_timeout_ms: u64,
}

/// Browser security and launch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Disable web security features (Same-Origin Policy, etc.)
    /// WARNING: Only enable for trusted content
    #[serde(default)]
    pub disable_security: bool,

    #[serde(default)]
    pub window: WindowConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_window_width")]
    pub width: u32,

    #[serde(default = "default_window_height")]
    pub height: u32,
}

fn default_load_ceiling_ms() -> u64 {
    DEFAULT_LOAD_CEILING_MS
}
fn default_quiet_period_ms() -> u64 {
    DEFAULT_QUIET_PERIOD_MS
}
fn default_install_settle_ms() -> u64 {
    DEFAULT_INSTALL_SETTLE_MS
}
fn default_agent_timeout_ms() -> u64 {
    DEFAULT_AGENT_TIMEOUT_MS
}

fn default_headless() -> bool {
    true
}

fn default_window_width() -> u32 {
    DEFAULT_WINDOW_WIDTH
}

fn default_window_height() -> u32 {
    DEFAULT_WINDOW_HEIGHT
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            load_ceiling_ms: default_load_ceiling_ms(),
            quiet_period_ms: default_quiet_period_ms(),
            install_settle_ms: default_install_settle_ms(),
            agent_timeout_ms: default_agent_timeout_ms(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            disable_security: false,
            window: WindowConfig::default(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: default_window_width(),
            height: default_window_height(),
        }
    }
}

impl Config {
    pub fn from_yaml(contents: &str) -> Result<Self, SearchError> {
        let mut config: Config = serde_yaml::from_str(contents)?;
        config.suppliers = config.suppliers.with_defaults();
        Ok(config)
    }
}

/// Load config from one file
pub fn load_config_from(path: &Path) -> Result<Config, SearchError> {
    let contents = fs::read_to_string(path)
        .map_err(|e| SearchError::Config(format!("cannot read {}: {}", path.display(), e)))?;
    debug!("Loading config from {}", path.display());
    Config::from_yaml(&contents)
}

/// Load config: `PARTS_SEARCH_CONFIG`, then `explicit`, then config.yaml in package root
///
/// Falls back to defaults when none of them exists.
pub fn load_yaml_config(explicit: Option<&Path>) -> Result<Config, SearchError> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return load_config_from(Path::new(&path));
    }
    if let Some(path) = explicit {
        return load_config_from(path);
    }

    let packaged = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config.yaml");
    if packaged.exists() {
        load_config_from(&packaged)
    } else {
        Ok(Config::default())
    }
}

pub use agent::{AgentReply, AgentRequest, AgentScript, PageAgent};
pub use aggregate::{merge_responses, sort_by_price};
pub use browser::BrowserWrapper;
pub use browser_setup::{download_managed_browser, find_browser_executable, launch_browser};
pub use extract::{ExtractorSet, SupplierExtractor};
pub use manager::BrowserManager;
pub use orchestrator::{SearchOrchestrator, SearchRequest, SearchResponse};
pub use platform::{ChromiumTabs, MemoryTabs, TabPlatform};
pub use probe::{ExtractionFailure, ExtractionOutcome, PageProbe};
pub use product::{Availability, ProductRecord};
pub use session::{TabRegistry, TabSession, TabSessionManager};
pub use supplier::{SupplierCatalog, SupplierId, SupplierProfile};
pub use utils::{SearchError, Timings};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_yaml_gives_defaults() {
        let config = Config::from_yaml("{}").unwrap();
        assert_eq!(config.timing.load_ceiling_ms, 15_000);
        assert!(config.browser.headless);
        assert!(config.suppliers.profile(SupplierId::SupplierA).is_some());
        assert!(config.suppliers.profile(SupplierId::SupplierB).is_some());
    }

    #[test]
    fn partial_yaml_overrides_only_named_fields() {
        let yaml = r#"
timing:
  quiet_period_ms: 500
suppliers:
  supplierB:
    label: "Supplier B (staging)"
    search_url: "https://staging.supplier-b.example/search?q={query}"
    domain: "supplier-b.example"
    product_path: "/product/"
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.timing.quiet_period_ms, 500);
        assert_eq!(config.timing.agent_timeout_ms, 5_000);

        let b = config.suppliers.profile(SupplierId::SupplierB).unwrap();
        assert_eq!(b.label, "Supplier B (staging)");
        assert_eq!(config.suppliers.profile(SupplierId::SupplierA).unwrap().label, "SupplierA");
    }

    #[test]
    fn unknown_supplier_key_is_a_config_error() {
        let yaml = "suppliers:\n  supplierZ:\n    label: x\n";
        assert!(matches!(Config::from_yaml(yaml), Err(SearchError::Config(_))));
    }
}
