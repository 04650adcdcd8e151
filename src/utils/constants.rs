//! Shared configuration constants
//!
//! Default values used by configuration, sessions and the browser launcher,
//! kept here to avoid magic numbers.

/// Chrome user agent string for stealth mode
///
/// Chrome releases new stable versions ~every 4 weeks.
/// Update quarterly to stay within reasonable version window.
///
/// Reference: https://chromiumdash.appspot.com/schedule
pub const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36";

/// Ceiling on waiting for a tab's load-complete signal
pub const DEFAULT_LOAD_CEILING_MS: u64 = 15_000;

/// Pause after load so client-rendered catalogs can hydrate
pub const DEFAULT_QUIET_PERIOD_MS: u64 = 2_000;

/// Pause after injecting the agent before asking it anything
pub const DEFAULT_INSTALL_SETTLE_MS: u64 = 750;

/// Bound on a single agent request
pub const DEFAULT_AGENT_TIMEOUT_MS: u64 = 5_000;

/// Default browser window size
pub const DEFAULT_WINDOW_WIDTH: u32 = 1280;
pub const DEFAULT_WINDOW_HEIGHT: u32 = 800;
