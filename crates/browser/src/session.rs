//! Browser session management.
//!
//! A [`BrowserSession`] owns at most one live CDP connection plus the
//! browser process behind it, and exposes the command surface: one
//! `send_command` primitive and typed verbs that are pure request/response
//! calls through it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info};
use webpilot_core::{BrowserConfig, Error, Result};

use crate::cdp::{CdpConnection, EventKind};
use crate::launch::{self, BrowserKind, LaunchedBrowser};
use crate::retry::RetryPolicy;

/// Lifecycle of one logical automation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Launching,
    Ready,
    Navigating,
    Closed,
}

/// Where the page actually ended up: redirects mean the final URL often
/// differs from the requested one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLocation {
    pub url: String,
    pub title: String,
}

pub struct BrowserSession {
    config: BrowserConfig,
    profile_dir: PathBuf,
    state: SessionState,
    conn: Option<CdpConnection>,
    browser: Option<LaunchedBrowser>,
}

impl BrowserSession {
    pub fn new(config: BrowserConfig, profile_dir: PathBuf) -> Self {
        Self {
            config,
            profile_dir,
            state: SessionState::Idle,
            conn: None,
            browser: None,
        }
    }

    pub fn config(&self) -> &BrowserConfig {
        &self.config
    }

    /// The user-data dir this session is bound to. Stable across relaunches,
    /// which is what carries cookies between headless and visible runs.
    pub fn profile_dir(&self) -> &Path {
        &self.profile_dir
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Vendor recorded at launch, so teardown matches the same binary.
    pub fn vendor(&self) -> Option<BrowserKind> {
        self.browser.as_ref().map(|b| b.kind)
    }

    pub fn is_headless(&self) -> Option<bool> {
        self.browser.as_ref().map(|b| b.headless)
    }

    pub fn is_running(&self) -> bool {
        self.conn.as_ref().is_some_and(|c| !c.is_closed())
    }

    /// Launch a browser on this session's profile and attach to its first
    /// page target. Idempotent: while the current session is live and still
    /// answering, this is a no-op and no second process is spawned.
    pub async fn launch(&mut self, headless: bool) -> Result<()> {
        if self.is_running() {
            if self.probe().await {
                debug!("session already running, launch is a no-op");
                return Ok(());
            }
            debug!("session stopped answering, relaunching");
        }
        // Idempotent teardown: never leave two connections alive.
        self.close().await;

        self.state = SessionState::Launching;
        let launched = match launch::launch(&self.config, &self.profile_dir, headless).await {
            Ok(launched) => launched,
            Err(e) => {
                self.state = SessionState::Idle;
                return Err(e);
            }
        };
        match self.attach(&launched.ws_url).await {
            Ok(()) => {
                self.browser = Some(launched);
                self.state = SessionState::Ready;
                info!(headless, "browser session ready");
                Ok(())
            }
            Err(e) => {
                let mut launched = launched;
                let _ = launched.child.start_kill();
                self.state = SessionState::Idle;
                Err(e)
            }
        }
    }

    /// Attach to an externally launched browser listening on `port`. The
    /// session drives it but does not own its process.
    pub async fn connect(&mut self, port: u16) -> Result<()> {
        self.close().await;
        self.state = SessionState::Launching;
        let attached = match launch::connect(port).await {
            Ok(attached) => attached,
            Err(e) => {
                self.state = SessionState::Idle;
                return Err(e);
            }
        };
        match self.attach(&attached.ws_url).await {
            Ok(()) => {
                self.state = SessionState::Ready;
                info!(port, "attached to running browser");
                Ok(())
            }
            Err(e) => {
                self.state = SessionState::Idle;
                Err(e)
            }
        }
    }

    async fn attach(&mut self, ws_url: &str) -> Result<()> {
        let timeout = Duration::from_millis(self.config.command_timeout_ms);
        let conn = CdpConnection::connect(ws_url, timeout).await?;
        for domain in ["Page", "Runtime", "DOM", "Network"] {
            conn.send(&format!("{domain}.enable"), json!({})).await?;
        }
        self.conn = Some(conn);
        Ok(())
    }

    /// Cheap responsiveness check, bounded well below the command timeout.
    async fn probe(&self) -> bool {
        let probe = self.send_command(
            "Runtime.evaluate",
            json!({"expression": "1", "returnByValue": true}),
        );
        matches!(
            tokio::time::timeout(Duration::from_secs(2), probe).await,
            Ok(Ok(_))
        )
    }

    /// Tear the session down. Safe from any state and idempotent. Kills only
    /// the owned process (and strays rooted at this profile, matching the
    /// recorded vendor), never unrelated browser windows.
    pub async fn close(&mut self) {
        let owns_process = self.browser.is_some();
        if let Some(conn) = self.conn.take() {
            if owns_process && !conn.is_closed() {
                // Graceful shutdown first; the hard kill below is the backstop.
                let _ = tokio::time::timeout(
                    Duration::from_secs(2),
                    conn.send("Browser.close", json!({})),
                )
                .await;
            }
            conn.close().await;
        }
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.child.start_kill() {
                debug!("browser process already gone: {e}");
            }
            launch::reclaim_stale(browser.debug_port, &self.profile_dir, Some(browser.kind));
        }
        self.state = SessionState::Closed;
    }

    /// The single command primitive everything else goes through. Also the
    /// raw protocol passthrough for callers that need an unwrapped method.
    pub async fn send_command(&self, method: &str, params: Value) -> Result<Value> {
        let conn = self.conn.as_ref().ok_or(Error::ConnectionClosed)?;
        conn.send(method, params).await
    }

    /// Navigate and wait for the page's load event, then report where the
    /// page ended up. A load timeout is an error but leaves the connection
    /// open; the page may still be usable.
    pub async fn navigate(&mut self, url: &str) -> Result<PageLocation> {
        self.state = SessionState::Navigating;
        let result = self.navigate_inner(url).await;
        self.state = SessionState::Ready;
        result
    }

    async fn navigate_inner(&self, url: &str) -> Result<PageLocation> {
        let conn = self.conn.as_ref().ok_or(Error::ConnectionClosed)?;
        let mut load_events = conn.subscribe(EventKind::LoadEventFired).await;

        let result = conn.send("Page.navigate", json!({"url": url})).await?;
        if let Some(error_text) = result.get("errorText").and_then(|v| v.as_str()) {
            if !error_text.is_empty() {
                return Err(Error::Navigation(format!("{url}: {error_text}")));
            }
        }

        let nav_timeout = Duration::from_millis(self.config.navigation_timeout_ms);
        match tokio::time::timeout(nav_timeout, load_events.recv()).await {
            Ok(Some(_)) => {}
            Ok(None) => return Err(Error::ConnectionClosed),
            Err(_) => {
                return Err(Error::Navigation(format!(
                    "load event did not fire within {nav_timeout:?} for {url}"
                )));
            }
        }

        self.current_location().await
    }

    /// Evaluate JavaScript in the page and return its value.
    pub async fn evaluate(&self, expression: &str) -> Result<Value> {
        let result = self
            .send_command(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;
        if let Some(details) = result.get("exceptionDetails") {
            let text = details
                .get("text")
                .and_then(|v| v.as_str())
                .unwrap_or("script threw");
            return Err(Error::Transport(format!("evaluate failed: {text}")));
        }
        Ok(result.pointer("/result/value").cloned().unwrap_or(Value::Null))
    }

    /// Read the page's final URL and title.
    pub async fn current_location(&self) -> Result<PageLocation> {
        let value = self
            .evaluate("JSON.stringify({url: location.href, title: document.title})")
            .await?;
        let raw = value
            .as_str()
            .ok_or_else(|| Error::Transport("location probe returned a non-string".to_string()))?;
        let location: PageLocation = serde_json::from_str(raw)?;
        Ok(location)
    }

    /// Capture a screenshot as PNG bytes.
    pub async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>> {
        let mut params = json!({"format": "png"});
        if full_page {
            params["captureBeyondViewport"] = json!(true);
        }
        let result = self.send_command("Page.captureScreenshot", params).await?;
        let data = result
            .get("data")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::Transport("screenshot returned no data".to_string()))?;
        base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| Error::Transport(format!("screenshot payload was not valid base64: {e}")))
    }

    pub async fn click(&self, selector: &str) -> Result<()> {
        self.element_action(selector, "el.click()", "click").await
    }

    pub async fn focus(&self, selector: &str) -> Result<()> {
        self.element_action(selector, "el.focus()", "focus").await
    }

    /// Set an input's value the way a framework-bound page expects: focus,
    /// assign, then fire input/change.
    pub async fn fill(&self, selector: &str, text: &str) -> Result<()> {
        let quoted = Value::String(text.to_string()).to_string();
        let body = format!(
            "el.focus(); el.value = {quoted}; \
             el.dispatchEvent(new Event('input', {{bubbles: true}})); \
             el.dispatchEvent(new Event('change', {{bubbles: true}}))"
        );
        self.element_action(selector, &body, "fill").await
    }

    /// Insert text into the focused element, bypassing per-key events.
    pub async fn type_text(&self, text: &str) -> Result<()> {
        self.send_command("Input.insertText", json!({"text": text}))
            .await?;
        Ok(())
    }

    /// Press one key: down then up, with text attached for printables.
    pub async fn press_key(&self, key: &str) -> Result<()> {
        let mut down = json!({"type": "keyDown", "key": key});
        if key.chars().count() == 1 {
            down["text"] = json!(key);
        }
        self.send_command("Input.dispatchKeyEvent", down).await?;
        self.send_command("Input.dispatchKeyEvent", json!({"type": "keyUp", "key": key}))
            .await?;
        Ok(())
    }

    /// Poll until `selector` matches something, up to `timeout`.
    pub async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
        let quoted = Value::String(selector.to_string()).to_string();
        let expression = format!("!!document.querySelector({quoted})");
        let policy = RetryPolicy::new(Duration::from_millis(250), timeout);
        let found = policy
            .wait_until(|| {
                let session = self;
                let expression = expression.clone();
                async move {
                    let value = session.evaluate(&expression).await?;
                    Ok(value.as_bool().unwrap_or(false).then_some(()))
                }
            })
            .await?;
        found.ok_or_else(|| {
            Error::ElementNotFound(format!("{selector} did not appear within {timeout:?}"))
        })
    }

    async fn element_action(&self, selector: &str, action_body: &str, verb: &str) -> Result<()> {
        let value = self.evaluate(&element_script(selector, action_body)).await?;
        parse_element_outcome(selector, verb, &value)
    }
}

/// Scoped script for a single-selector action. The selector is JSON-escaped
/// into the source; the outcome distinguishes "nothing matched" from
/// "matched but the element refused".
fn element_script(selector: &str, action_body: &str) -> String {
    let quoted = Value::String(selector.to_string()).to_string();
    format!(
        "JSON.stringify((() => {{ \
           const el = document.querySelector({quoted}); \
           if (!el) return {{outcome: 'not-found'}}; \
           try {{ {action_body}; return {{outcome: 'ok'}}; }} \
           catch (err) {{ return {{outcome: 'rejected', detail: String(err)}}; }} \
         }})())"
    )
}

pub(crate) fn parse_element_outcome(selector: &str, verb: &str, value: &Value) -> Result<()> {
    let raw = value
        .as_str()
        .ok_or_else(|| Error::Transport("element probe returned a non-string".to_string()))?;
    let parsed: Value = serde_json::from_str(raw)?;
    match parsed.get("outcome").and_then(|v| v.as_str()) {
        Some("ok") => Ok(()),
        Some("not-found") => Err(Error::ElementNotFound(format!(
            "{verb}: no element matches {selector}"
        ))),
        Some("rejected") => {
            let detail = parsed.get("detail").and_then(|v| v.as_str()).unwrap_or("");
            Err(Error::ElementRejected(format!(
                "{verb} on {selector}: {detail}"
            )))
        }
        _ => Err(Error::Transport(
            "element probe returned an unexpected shape".to_string(),
        )),
    }
}

/// The uniform result shape the CLI prints: `{"success": true, ...fields}`
/// on success, `{"success": false, "error": ...}` on failure.
pub fn json_response(result: Result<Value>) -> Value {
    match result {
        Ok(Value::Object(fields)) => {
            let mut merged = Map::new();
            merged.insert("success".to_string(), json!(true));
            merged.extend(fields);
            Value::Object(merged)
        }
        Ok(Value::Null) => json!({"success": true}),
        Ok(other) => json!({"success": true, "result": other}),
        Err(e) => json!({"success": false, "error": e.to_string()}),
    }
}
