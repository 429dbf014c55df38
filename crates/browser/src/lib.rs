//! CDP-based browser automation session core.
//!
//! Drives a locally installed Chrome/Edge over the DevTools protocol:
//! - **cdp**: duplex WebSocket transport, concurrent commands correlated by
//!   id, event fan-out
//! - **launch**: binary discovery, stale-process reclaim, spawn with
//!   debugging flags, endpoint readiness
//! - **session**: one connection + one owned process, navigate/evaluate/
//!   screenshot/input verbs over a single `send_command` primitive
//! - **auth**: transparent login handling: headless detection, visible
//!   window for the human, back to headless on the same profile
//!
//! # Example
//!
//! ```ignore
//! use webpilot_browser::{BrowserSession, LoginIndicators};
//! use webpilot_core::{BrowserConfig, Paths};
//!
//! let paths = Paths::new();
//! let mut session = BrowserSession::new(
//!     BrowserConfig::default(),
//!     paths.profile_dir(webpilot_core::paths::AGENT_PROFILE),
//! );
//! session.launch(true).await?;
//! let indicators = LoginIndicators::new(vec!["/login".into()], vec![]);
//! session.ensure_authenticated("https://example.com/inbox", &indicators).await?;
//! let location = session.navigate("https://example.com/inbox").await?;
//! session.close().await;
//! ```

pub mod auth;
pub mod cdp;
pub mod launch;
pub mod retry;
pub mod session;

pub use {
    auth::{ensure_authenticated, is_login_page, LoginIndicators, SessionDriver},
    cdp::{CdpConnection, EventKind},
    launch::{AttachedBrowser, BrowserKind, TargetDescriptor},
    retry::RetryPolicy,
    session::{json_response, BrowserSession, PageLocation, SessionState},
};
