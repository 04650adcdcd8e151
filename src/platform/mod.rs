//! Tab platform abstraction
//!
//! The search core never talks to a browser directly. It needs a small set
//! of capabilities: enumerate tabs, open a background tab, navigate one,
//! observe load progress, inject a script and message the page agent.
//! [`ChromiumTabs`] provides them over the DevTools protocol; [`MemoryTabs`]
//! serves stored HTML for tests and offline replay.

mod chromium;
mod memory;

pub use chromium::ChromiumTabs;
pub use memory::{MemoryStats, MemoryTabs};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;
use tokio::sync::broadcast;
use url::Url;

use crate::agent::{AgentRequest, AgentScript};

/// Capacity of the tab update fan-out; slow listeners skip older updates
pub const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// Stable identifier of a browser tab
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(String);

impl TabId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An open tab and its current location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabInfo {
    pub id: TabId,
    pub url: String,
}

/// Load progress of a tab
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Loading,
    Complete,
}

/// Load progress notification, broadcast for every tab
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabUpdate {
    pub tab: TabId,
    pub status: LoadStatus,
}

/// Failures of tab-level operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Browser unavailable: {0}")]
    BrowserUnavailable(String),

    #[error("Tab creation refused: {0}")]
    TabCreationRefused(String),

    #[error("Tab not found: {0}")]
    TabNotFound(TabId),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Script injection failed: {0}")]
    InjectionFailed(String),
}

/// Failures delivering a message to the page agent
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// Nothing in the page is listening (agent not installed or wiped by navigation)
    #[error("no agent is listening in the page")]
    NoReceiver,

    #[error("tab {0} is gone")]
    TabClosed(TabId),

    #[error("malformed agent reply: {0}")]
    Malformed(String),
}

/// Browser capabilities the search core relies on
#[async_trait]
pub trait TabPlatform: Send + Sync {
    /// All open tabs, in browser order
    async fn list_tabs(&self) -> Result<Vec<TabInfo>, PlatformError>;

    /// Open a background tab at `url`; load progress arrives through [`subscribe`](Self::subscribe)
    async fn create_tab(&self, url: &Url) -> Result<TabId, PlatformError>;

    /// Start navigating `tab` to `url` without waiting for the load
    async fn navigate(&self, tab: &TabId, url: &Url) -> Result<(), PlatformError>;

    /// Subscribe to load updates of every tab; dropping the receiver unsubscribes
    fn subscribe(&self) -> broadcast::Receiver<TabUpdate>;

    /// Run `script` in the tab's page context
    async fn inject_script(&self, tab: &TabId, script: &AgentScript) -> Result<(), PlatformError>;

    /// Deliver `request` to the page agent and return its raw reply
    async fn send_message(&self, tab: &TabId, request: &AgentRequest) -> Result<Value, ChannelError>;
}
