//! Authentication state machine tests with a scripted session driver,
//! running under paused tokio time so the 120 s ceiling is simulated.

use std::sync::Mutex;

use async_trait::async_trait;
use webpilot_browser::auth::{ensure_authenticated, LoginIndicators, SessionDriver};
use webpilot_browser::PageLocation;
use webpilot_core::{BrowserConfig, Error, Result};

fn at(url: &str, title: &str) -> PageLocation {
    PageLocation {
        url: url.to_string(),
        title: title.to_string(),
    }
}

fn login_page() -> PageLocation {
    at("https://example.com/login?next=/home", "Sign in - Example")
}

fn dashboard() -> PageLocation {
    at("https://example.com/dashboard", "Dashboard")
}

fn indicators() -> LoginIndicators {
    LoginIndicators::new(vec!["/login".to_string()], vec!["sign in".to_string()])
}

/// Scripted stand-in for a real session. Headless reads return
/// `headless_location`; visible reads return the login page until
/// `flips_after` polls have happened (never, if `None`).
struct ScriptedDriver {
    running: bool,
    headless: bool,
    headless_location: PageLocation,
    flips_after: Option<u32>,
    die_at_poll: Option<u32>,
    launches: Vec<bool>,
    navigations: Vec<String>,
    closes: u32,
    polls: Mutex<u32>,
}

impl ScriptedDriver {
    fn new(headless_location: PageLocation) -> Self {
        Self {
            running: false,
            headless: true,
            headless_location,
            flips_after: None,
            die_at_poll: None,
            launches: Vec::new(),
            navigations: Vec::new(),
            closes: 0,
            polls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl SessionDriver for ScriptedDriver {
    async fn ensure_running(&mut self, headless: bool) -> Result<()> {
        if !self.running {
            self.running = true;
            self.headless = headless;
            self.launches.push(headless);
        }
        Ok(())
    }

    async fn restart(&mut self, headless: bool) -> Result<()> {
        self.closes += 1;
        self.running = true;
        self.headless = headless;
        self.launches.push(headless);
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> Result<PageLocation> {
        self.navigations.push(url.to_string());
        if self.headless {
            Ok(self.headless_location.clone())
        } else {
            Ok(login_page())
        }
    }

    async fn current_location(&self) -> Result<PageLocation> {
        if self.headless {
            return Ok(self.headless_location.clone());
        }
        let mut polls = self.polls.lock().unwrap();
        *polls += 1;
        if let Some(n) = self.die_at_poll {
            if *polls >= n {
                return Err(Error::ConnectionClosed);
            }
        }
        match self.flips_after {
            Some(n) if *polls > n => Ok(dashboard()),
            _ => Ok(login_page()),
        }
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.closes += 1;
        self.running = false;
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_already_authenticated_never_shows_a_window() {
    let mut driver = ScriptedDriver::new(dashboard());
    ensure_authenticated(
        &mut driver,
        &BrowserConfig::default(),
        "https://example.com/dashboard",
        &indicators(),
    )
    .await
    .unwrap();

    // One headless launch, no visible launch, nothing closed.
    assert_eq!(driver.launches, vec![true]);
    assert_eq!(driver.closes, 0);
    assert_eq!(*driver.polls.lock().unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_login_dance_relaunches_visible_then_headless() {
    let mut driver = ScriptedDriver::new(login_page());
    driver.flips_after = Some(3);

    ensure_authenticated(
        &mut driver,
        &BrowserConfig::default(),
        "https://example.com/inbox",
        &indicators(),
    )
    .await
    .unwrap();

    // headless check -> visible window -> headless again.
    assert_eq!(driver.launches, vec![true, false, true]);
    // The headless session and the visible session each got closed once.
    assert_eq!(driver.closes, 2);
    // Both phases navigated to the same requested URL.
    assert_eq!(
        driver.navigations,
        vec!["https://example.com/inbox", "https://example.com/inbox"]
    );
    // Three polls saw the login page, the fourth saw the dashboard.
    assert_eq!(*driver.polls.lock().unwrap(), 4);
    assert!(driver.headless);
    assert!(driver.running);
}

#[tokio::test(start_paused = true)]
async fn test_stuck_login_times_out_and_closes_the_window() {
    let mut driver = ScriptedDriver::new(login_page());
    // flips_after stays None: the user never gets past the login page.

    let err = ensure_authenticated(
        &mut driver,
        &BrowserConfig::default(),
        "https://example.com/inbox",
        &indicators(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::Auth(_)));
    // Polls every 3 s from t = 0 through the 120 s ceiling.
    assert_eq!(*driver.polls.lock().unwrap(), 41);
    // The visible window was closed, not left on screen.
    assert_eq!(driver.launches, vec![true, false]);
    assert_eq!(driver.closes, 2);
    assert!(!driver.running);
}

#[tokio::test(start_paused = true)]
async fn test_connection_death_mid_poll_fails_fast() {
    let mut driver = ScriptedDriver::new(login_page());
    driver.die_at_poll = Some(2);

    let err = ensure_authenticated(
        &mut driver,
        &BrowserConfig::default(),
        "https://example.com/inbox",
        &indicators(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::ConnectionClosed));
    // Only two polls happened; the loop did not spin out the ceiling.
    assert_eq!(*driver.polls.lock().unwrap(), 2);
    // Cleanup still ran.
    assert!(!driver.running);
    assert_eq!(driver.closes, 2);
}
