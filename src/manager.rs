//! Shared browser instance
//!
//! One Chrome process serves every supplier tab. It is launched on first
//! use, health-checked on every access and relaunched after a crash.
//!
//! Uses `tokio::sync::Mutex`: the guard is held across CDP calls.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::BrowserConfig;
use crate::browser::BrowserWrapper;
use crate::browser_setup::launch_browser;

pub struct BrowserManager {
    config: BrowserConfig,
    browser: Arc<Mutex<Option<BrowserWrapper>>>,
}

impl BrowserManager {
    /// Browser is launched lazily on the first [`get_or_launch`](Self::get_or_launch)
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config,
            browser: Arc::new(Mutex::new(None)),
        }
    }

    /// Return the running browser, launching or relaunching it as needed
    ///
    /// Callers lock the returned mutex; it always holds `Some` on success.
    pub async fn get_or_launch(&self) -> Result<Arc<Mutex<Option<BrowserWrapper>>>> {
        let mut guard = self.browser.lock().await;

        if let Some(wrapper) = guard.as_ref() {
            match wrapper.browser().version().await {
                Ok(_) => {
                    debug!("Browser health check passed");
                    drop(guard);
                    return Ok(self.browser.clone());
                }
                Err(e) => {
                    warn!("Browser health check failed: {}. Relaunching", e);
                    if let Some(mut crashed) = guard.take() {
                        // the process may already be gone
                        let _ = crashed.browser_mut().close().await;
                        let _ = crashed.browser_mut().wait().await;
                        crashed.cleanup_profile_dir();
                    }
                }
            }
        }

        let user_data_dir = std::env::temp_dir().join(format!("parts_search_chrome_{}", std::process::id()));
        let (browser, handler, user_data_dir) = launch_browser(&self.config, user_data_dir).await?;
        *guard = Some(BrowserWrapper::new(browser, handler, user_data_dir));
        drop(guard);

        Ok(self.browser.clone())
    }

    /// Close the browser and remove its profile; no-op when not running
    ///
    /// `close` asks Chrome to exit and `wait` reaps the process. Dropping
    /// the wrapper alone would only abort the handler task.
    pub async fn shutdown(&self) -> Result<()> {
        let mut guard = self.browser.lock().await;

        if let Some(mut wrapper) = guard.take() {
            info!("Shutting down browser");
            if let Err(e) = wrapper.browser_mut().close().await {
                warn!("Failed to close browser cleanly: {}", e);
            }
            if let Err(e) = wrapper.browser_mut().wait().await {
                warn!("Failed to wait for browser exit: {}", e);
            }
            wrapper.cleanup_profile_dir();
        }

        Ok(())
    }
}
