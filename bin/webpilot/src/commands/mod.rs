pub mod eval;
pub mod login;
pub mod navigate;
pub mod screenshot;
pub mod targets;

use std::path::PathBuf;

use webpilot_browser::BrowserSession;
use webpilot_core::paths::AGENT_PROFILE;
use webpilot_core::{Config, Paths};

/// One-shot session bound to the agent profile. Every invocation reuses the
/// same profile dir, so logins survive across runs.
pub(crate) fn agent_session() -> anyhow::Result<BrowserSession> {
    let paths = Paths::new();
    let config = Config::load_or_default(&paths)?;
    let profile = match &config.browser.profile_dir {
        Some(dir) => PathBuf::from(dir),
        None => paths.profile_dir(AGENT_PROFILE),
    };
    Ok(BrowserSession::new(config.browser, profile))
}

pub(crate) fn print_response(response: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(response)?);
    Ok(())
}
