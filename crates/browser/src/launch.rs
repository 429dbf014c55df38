//! Browser process lifecycle: binary discovery, stale-process reclaim,
//! spawn with debugging flags, and debug-endpoint readiness.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sysinfo::{ProcessesToUpdate, System};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};
use webpilot_core::{BrowserConfig, Error, Result};

use crate::retry::RetryPolicy;

/// Supported browser vendors. The wire protocol is CDP, so the set is the
/// Chromium family only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserKind {
    Chrome,
    Edge,
}

impl BrowserKind {
    pub fn from_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "edge" | "msedge" => Self::Edge,
            _ => Self::Chrome,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Chrome => "chrome",
            Self::Edge => "edge",
        }
    }

    /// The vendor tried when this one is not installed.
    pub fn fallback(&self) -> Self {
        match self {
            Self::Chrome => Self::Edge,
            Self::Edge => Self::Chrome,
        }
    }

    /// Substrings that identify this vendor's processes in a process list.
    fn process_needles(&self) -> &'static [&'static str] {
        match self {
            Self::Chrome => &["chrome", "chromium"],
            Self::Edge => &["msedge", "edge"],
        }
    }
}

/// One inspectable endpoint from `GET /json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDescriptor {
    pub id: String,
    #[serde(rename = "type")]
    pub target_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub web_socket_debugger_url: Option<String>,
}

/// A browser process this launcher spawned and owns.
pub struct LaunchedBrowser {
    pub kind: BrowserKind,
    pub headless: bool,
    pub debug_port: u16,
    pub ws_url: String,
    pub child: Child,
}

/// A browser someone else launched; we only hold its page-target address.
#[derive(Debug, Clone)]
pub struct AttachedBrowser {
    pub debug_port: u16,
    pub ws_url: String,
}

/// Find a browser binary on the system for the given vendor.
pub fn find_browser_binary(kind: BrowserKind) -> Option<String> {
    let candidates: Vec<&str> = match kind {
        BrowserKind::Chrome => {
            if cfg!(target_os = "macos") {
                vec![
                    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
                    "/Applications/Chromium.app/Contents/MacOS/Chromium",
                ]
            } else if cfg!(target_os = "linux") {
                vec![
                    "google-chrome",
                    "google-chrome-stable",
                    "chromium",
                    "chromium-browser",
                    "/usr/bin/google-chrome",
                    "/usr/bin/chromium",
                ]
            } else {
                vec![
                    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
                    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
                ]
            }
        }
        BrowserKind::Edge => {
            if cfg!(target_os = "macos") {
                vec!["/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge"]
            } else if cfg!(target_os = "linux") {
                vec![
                    "microsoft-edge",
                    "microsoft-edge-stable",
                    "/usr/bin/microsoft-edge",
                ]
            } else {
                vec![
                    r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
                    r"C:\Program Files\Microsoft\Edge\Application\msedge.exe",
                ]
            }
        }
    };

    for candidate in candidates {
        if Path::new(candidate).exists() {
            return Some(candidate.to_string());
        }
        if !candidate.contains('/') && !candidate.contains('\\') && which::which(candidate).is_ok()
        {
            return Some(candidate.to_string());
        }
    }
    None
}

/// Resolve the preferred vendor, falling back to the other one. Records the
/// vendor actually used so later teardown matches the same binary.
pub fn resolve_browser(preferred: BrowserKind) -> Result<(BrowserKind, String)> {
    if let Some(path) = find_browser_binary(preferred) {
        return Ok((preferred, path));
    }
    let fallback = preferred.fallback();
    if let Some(path) = find_browser_binary(fallback) {
        debug!(
            preferred = preferred.name(),
            fallback = fallback.name(),
            "preferred browser not installed, using fallback"
        );
        return Ok((fallback, path));
    }
    Err(Error::BrowserNotFound(format!(
        "neither {} nor {} is installed",
        preferred.name(),
        fallback.name()
    )))
}

/// Compose the launch flag set: fixed debug port, fixed profile, no
/// first-run or default-browser prompts, no popup blocking, maximized.
pub fn build_browser_args(debug_port: u16, profile_dir: &Path, headless: bool) -> Vec<String> {
    let mut args = vec![
        format!("--remote-debugging-port={debug_port}"),
        format!("--user-data-dir={}", profile_dir.display()),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-popup-blocking".to_string(),
        "--start-maximized".to_string(),
    ];
    if headless {
        args.push("--headless=new".to_string());
    }
    args.push("about:blank".to_string());
    args
}

/// Kill any browser process still bound to the debug port or rooted at the
/// managed profile directory. Only processes named like a known vendor are
/// ever touched. Best-effort: a stale process may already be gone, and
/// nothing here is allowed to fail the launch.
pub fn reclaim_stale(debug_port: u16, profile_dir: &Path, kind: Option<BrowserKind>) {
    let port_flag = format!("--remote-debugging-port={debug_port}");
    let profile_needle = profile_dir.to_string_lossy().to_string();
    let needles: Vec<&str> = match kind {
        Some(kind) => kind.process_needles().to_vec(),
        None => {
            let mut all = BrowserKind::Chrome.process_needles().to_vec();
            all.extend_from_slice(BrowserKind::Edge.process_needles());
            all
        }
    };

    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::All, true);
    for (pid, process) in sys.processes() {
        let name = process.name().to_string_lossy().to_lowercase();
        if !needles.iter().any(|n| name.contains(n)) {
            continue;
        }
        let cmdline = process
            .cmd()
            .iter()
            .map(|s| s.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");
        if cmdline.contains(&port_flag)
            || (!profile_needle.is_empty() && cmdline.contains(profile_needle.as_str()))
        {
            warn!(
                pid = pid.as_u32(),
                "killing stale browser process holding the debug port or profile"
            );
            process.kill();
        }
    }
}

/// Launch a browser bound to `profile_dir` and return the page target to
/// attach to. The child is spawned detached; the returned handle is kept for
/// direct termination on close.
pub async fn launch(
    config: &BrowserConfig,
    profile_dir: &Path,
    headless: bool,
) -> Result<LaunchedBrowser> {
    reclaim_stale(config.debug_port, profile_dir, None);

    let preferred = BrowserKind::from_name(&config.preferred_browser);
    let (kind, binary) = resolve_browser(preferred)?;

    std::fs::create_dir_all(profile_dir)?;
    let args = build_browser_args(config.debug_port, profile_dir, headless);

    info!(
        browser = kind.name(),
        port = config.debug_port,
        headless,
        profile = %profile_dir.display(),
        "launching browser"
    );

    let mut child = Command::new(&binary)
        .args(&args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| Error::Launch(format!("failed to spawn {}: {e}", kind.name())))?;

    let policy = RetryPolicy::new(
        Duration::from_millis(config.launch_poll_interval_ms),
        Duration::from_millis(config.launch_timeout_ms),
    );
    if let Err(e) = wait_for_endpoint(config.debug_port, policy).await {
        let _ = child.start_kill();
        return Err(e);
    }

    let targets = match query_targets(config.debug_port).await {
        Ok(targets) => targets,
        Err(e) => {
            let _ = child.start_kill();
            return Err(e);
        }
    };
    let ws_url = match select_page_target(&targets) {
        Ok(url) => url,
        Err(e) => {
            let _ = child.start_kill();
            return Err(e);
        }
    };

    Ok(LaunchedBrowser {
        kind,
        headless,
        debug_port: config.debug_port,
        ws_url,
        child,
    })
}

/// Attach to a browser already listening on `port`: one readiness probe, no
/// spawn, no reclaim.
pub async fn connect(port: u16) -> Result<AttachedBrowser> {
    probe_endpoint(port).await.map_err(|e| {
        Error::EndpointNotReady(format!("no browser is answering on port {port}: {e}"))
    })?;
    let targets = query_targets(port).await?;
    let ws_url = select_page_target(&targets)?;
    Ok(AttachedBrowser {
        debug_port: port,
        ws_url,
    })
}

async fn probe_endpoint(port: u16) -> std::result::Result<Value, String> {
    let url = format!("http://127.0.0.1:{port}/json/version");
    let resp = reqwest::get(&url).await.map_err(|e| e.to_string())?;
    resp.json::<Value>().await.map_err(|e| e.to_string())
}

/// Poll `/json/version` until the endpoint answers. The ceiling error names
/// the usual culprits because this is the dominant real-world launch
/// failure, and "installed but unresponsive" must read differently from
/// "not installed".
pub async fn wait_for_endpoint(port: u16, policy: RetryPolicy) -> Result<Value> {
    let version = policy
        .wait_until(|| async move {
            match probe_endpoint(port).await {
                Ok(version) => Ok(Some(version)),
                Err(_) => Ok(None),
            }
        })
        .await?;
    version.ok_or_else(|| {
        Error::EndpointNotReady(format!(
            "port {port} did not answer /json/version within {:?}; \
             the browser may be blocked from starting (antivirus, slow disk, \
             or a corrupted profile directory)",
            policy.ceiling
        ))
    })
}

/// List the inspectable targets the browser currently exposes.
pub async fn query_targets(port: u16) -> Result<Vec<TargetDescriptor>> {
    let url = format!("http://127.0.0.1:{port}/json");
    let resp = reqwest::get(&url)
        .await
        .map_err(|e| Error::Launch(format!("target list query failed: {e}")))?;
    resp.json::<Vec<TargetDescriptor>>()
        .await
        .map_err(|e| Error::Launch(format!("target list was not valid JSON: {e}")))
}

/// First page-typed target wins; no further tie-break.
pub fn select_page_target(targets: &[TargetDescriptor]) -> Result<String> {
    for target in targets {
        if target.target_type == "page" {
            if let Some(ws_url) = &target.web_socket_debugger_url {
                return Ok(ws_url.clone());
            }
        }
    }
    Err(Error::NoPageTarget(format!(
        "{} targets listed, none of type page",
        targets.len()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_name() {
        assert_eq!(BrowserKind::from_name("edge"), BrowserKind::Edge);
        assert_eq!(BrowserKind::from_name("msedge"), BrowserKind::Edge);
        assert_eq!(BrowserKind::from_name("chrome"), BrowserKind::Chrome);
        assert_eq!(BrowserKind::from_name("anything"), BrowserKind::Chrome);
    }

    #[test]
    fn test_fallback_is_the_other_vendor() {
        assert_eq!(BrowserKind::Chrome.fallback(), BrowserKind::Edge);
        assert_eq!(BrowserKind::Edge.fallback(), BrowserKind::Chrome);
    }

    #[test]
    fn test_args_carry_port_and_profile() {
        let args = build_browser_args(9377, Path::new("/tmp/profile"), false);
        assert!(args.contains(&"--remote-debugging-port=9377".to_string()));
        assert!(args.contains(&"--user-data-dir=/tmp/profile".to_string()));
        assert!(args.contains(&"--no-first-run".to_string()));
        assert!(args.contains(&"--disable-popup-blocking".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--headless")));
    }

    #[test]
    fn test_args_headless_flag() {
        let args = build_browser_args(9377, Path::new("/tmp/profile"), true);
        assert!(args.contains(&"--headless=new".to_string()));
    }

    #[test]
    fn test_target_descriptor_wire_shape() {
        let raw = r#"{
            "id": "A1B2",
            "type": "page",
            "title": "Example",
            "url": "https://example.com/",
            "webSocketDebuggerUrl": "ws://127.0.0.1:9377/devtools/page/A1B2"
        }"#;
        let target: TargetDescriptor = serde_json::from_str(raw).unwrap();
        assert_eq!(target.target_type, "page");
        assert_eq!(
            target.web_socket_debugger_url.as_deref(),
            Some("ws://127.0.0.1:9377/devtools/page/A1B2")
        );
    }

    #[test]
    fn test_first_page_target_wins() {
        let targets: Vec<TargetDescriptor> = serde_json::from_str(
            r#"[
                {"id": "x", "type": "iframe", "webSocketDebuggerUrl": "ws://a"},
                {"id": "y", "type": "page", "webSocketDebuggerUrl": "ws://b"},
                {"id": "z", "type": "page", "webSocketDebuggerUrl": "ws://c"}
            ]"#,
        )
        .unwrap();
        assert_eq!(select_page_target(&targets).unwrap(), "ws://b");
    }

    #[test]
    fn test_no_page_target_is_an_explicit_error() {
        let targets: Vec<TargetDescriptor> = serde_json::from_str(
            r#"[{"id": "x", "type": "background_page", "webSocketDebuggerUrl": "ws://a"}]"#,
        )
        .unwrap();
        let err = select_page_target(&targets).unwrap_err();
        assert!(matches!(err, Error::NoPageTarget(_)));
    }
}
