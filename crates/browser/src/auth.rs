//! Login-wall handling: detect an authentication page from a headless
//! session, hand a visible window to the human on the same profile, then
//! return to headless once the cookies are in place.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use webpilot_core::{BrowserConfig, Error, Result};

use crate::retry::RetryPolicy;
use crate::session::{BrowserSession, PageLocation};

/// Caller-supplied substrings that mark a service's login pages. Matching is
/// a permissive OR: any URL substring or any title substring is enough,
/// because indicator sets differ wildly across services.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginIndicators {
    #[serde(default)]
    pub url_patterns: Vec<String>,
    #[serde(default)]
    pub title_patterns: Vec<String>,
}

impl LoginIndicators {
    pub fn new(url_patterns: Vec<String>, title_patterns: Vec<String>) -> Self {
        Self {
            url_patterns,
            title_patterns,
        }
    }
}

/// Case-insensitive substring OR over both indicator lists.
pub fn is_login_page(location: &PageLocation, indicators: &LoginIndicators) -> bool {
    let url = location.url.to_lowercase();
    let title = location.title.to_lowercase();
    indicators
        .url_patterns
        .iter()
        .any(|p| !p.is_empty() && url.contains(&p.to_lowercase()))
        || indicators
            .title_patterns
            .iter()
            .any(|p| !p.is_empty() && title.contains(&p.to_lowercase()))
}

/// Progress of one `ensure_authenticated` call, for logging only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthPhase {
    CheckingHeadless,
    SwitchingToVisible,
    AwaitingLogin,
    SwitchingToHeadless,
}

/// What the auth controller needs from a session. [`BrowserSession`]
/// implements it; tests drive the state machine with a scripted stand-in.
#[async_trait]
pub trait SessionDriver: Send + Sync {
    async fn ensure_running(&mut self, headless: bool) -> Result<()>;
    /// Close, wait out the profile-lock release, relaunch on the same profile.
    async fn restart(&mut self, headless: bool) -> Result<()>;
    async fn navigate(&mut self, url: &str) -> Result<PageLocation>;
    async fn current_location(&self) -> Result<PageLocation>;
    async fn shutdown(&mut self) -> Result<()>;
}

#[async_trait]
impl SessionDriver for BrowserSession {
    async fn ensure_running(&mut self, headless: bool) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        self.launch(headless).await
    }

    async fn restart(&mut self, headless: bool) -> Result<()> {
        let delay = Duration::from_millis(self.config().relaunch_delay_ms);
        self.close().await;
        tokio::time::sleep(delay).await;
        self.launch(headless).await
    }

    async fn navigate(&mut self, url: &str) -> Result<PageLocation> {
        BrowserSession::navigate(self, url).await
    }

    async fn current_location(&self) -> Result<PageLocation> {
        BrowserSession::current_location(self).await
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.close().await;
        Ok(())
    }
}

impl BrowserSession {
    /// Make sure `url` can be used without hitting a login wall, walking the
    /// interactive flow if one shows up. On success the session is headless
    /// again with the login cookies in its profile.
    pub async fn ensure_authenticated(
        &mut self,
        url: &str,
        indicators: &LoginIndicators,
    ) -> Result<()> {
        let config = self.config().clone();
        ensure_authenticated(self, &config, url, indicators).await
    }
}

/// The headless to visible to headless dance. The fast path (already logged
/// in) never shows a window.
pub async fn ensure_authenticated<D: SessionDriver>(
    driver: &mut D,
    config: &BrowserConfig,
    url: &str,
    indicators: &LoginIndicators,
) -> Result<()> {
    debug!(phase = ?AuthPhase::CheckingHeadless, url, "checking auth state");
    driver.ensure_running(true).await?;
    driver.navigate(url).await?;

    // Let client-side SSO redirects settle before classifying; many flows
    // bounce through several URLs first.
    tokio::time::sleep(Duration::from_millis(config.settle_delay_ms)).await;
    let location = driver.current_location().await?;

    if !is_login_page(&location, indicators) {
        info!(url = %location.url, "already authenticated");
        return Ok(());
    }

    info!(
        phase = ?AuthPhase::SwitchingToVisible,
        url = %location.url,
        "login page detected, handing a visible window to the user"
    );
    let result = await_interactive_login(driver, config, url, indicators).await;
    if result.is_err() {
        // Whatever went wrong, never leave a visible window running.
        let _ = driver.shutdown().await;
    }
    result
}

async fn await_interactive_login<D: SessionDriver>(
    driver: &mut D,
    config: &BrowserConfig,
    url: &str,
    indicators: &LoginIndicators,
) -> Result<()> {
    driver.restart(false).await?;
    driver.navigate(url).await?;

    let ceiling = Duration::from_millis(config.login_timeout_ms);
    let policy = RetryPolicy::new(
        Duration::from_millis(config.login_poll_interval_ms),
        ceiling,
    );

    debug!(phase = ?AuthPhase::AwaitingLogin, "waiting for the user to finish logging in");
    let poll_driver: &D = driver;
    let landed = policy
        .wait_until(|| {
            let driver = poll_driver;
            async move {
                let location = driver.current_location().await?;
                if is_login_page(&location, indicators) {
                    Ok(None)
                } else {
                    Ok(Some(location))
                }
            }
        })
        .await?;

    let location = match landed {
        Some(location) => location,
        None => {
            warn!("login was not completed in time, closing the visible window");
            return Err(Error::Auth(format!(
                "login was not completed within {ceiling:?}"
            )));
        }
    };

    info!(
        phase = ?AuthPhase::SwitchingToHeadless,
        url = %location.url,
        "login completed, returning to headless"
    );
    driver.restart(true).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(url: &str, title: &str) -> PageLocation {
        PageLocation {
            url: url.to_string(),
            title: title.to_string(),
        }
    }

    #[test]
    fn test_url_match_alone_triggers() {
        let indicators = LoginIndicators::new(vec!["/login".to_string()], vec![]);
        assert!(is_login_page(
            &at("https://example.com/login?next=/home", "Welcome"),
            &indicators
        ));
    }

    #[test]
    fn test_title_match_alone_triggers() {
        let indicators = LoginIndicators::new(vec![], vec!["sign in".to_string()]);
        assert!(is_login_page(
            &at("https://example.com/home", "Sign In - Example"),
            &indicators
        ));
    }

    #[test]
    fn test_match_is_case_insensitive() {
        let indicators = LoginIndicators::new(
            vec!["/LOGIN".to_string()],
            vec!["ANMELDEN".to_string()],
        );
        assert!(is_login_page(&at("https://example.com/login", ""), &indicators));
        assert!(is_login_page(&at("https://example.com/", "Anmelden"), &indicators));
    }

    #[test]
    fn test_no_match_is_not_a_login_page() {
        let indicators = LoginIndicators::new(
            vec!["/login".to_string()],
            vec!["sign in".to_string()],
        );
        assert!(!is_login_page(
            &at("https://example.com/dashboard", "Dashboard"),
            &indicators
        ));
    }

    #[test]
    fn test_empty_patterns_never_match() {
        let indicators = LoginIndicators::new(vec![String::new()], vec![String::new()]);
        assert!(!is_login_page(&at("https://example.com/", "Home"), &indicators));
        assert!(!is_login_page(&at("", ""), &LoginIndicators::default()));
    }

    #[test]
    fn test_indicator_wire_shape() {
        let indicators: LoginIndicators = serde_json::from_str(
            r#"{"urlPatterns": ["/login"], "titlePatterns": ["Sign in"]}"#,
        )
        .unwrap();
        assert_eq!(indicators.url_patterns, vec!["/login"]);
        assert_eq!(indicators.title_patterns, vec!["Sign in"]);
    }
}
