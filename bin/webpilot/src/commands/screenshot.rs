use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use webpilot_browser::{json_response, BrowserSession};
use webpilot_core::{Paths, Result};

pub async fn run(
    url: String,
    output: Option<PathBuf>,
    full_page: bool,
    headed: bool,
) -> anyhow::Result<()> {
    let output = match output {
        Some(path) => path,
        None => {
            let media = Paths::new().media_dir();
            std::fs::create_dir_all(&media)?;
            media.join(format!(
                "webpilot_{}.png",
                chrono::Utc::now().format("%Y%m%d_%H%M%S")
            ))
        }
    };

    let mut session = super::agent_session()?;
    session.launch(!headed).await?;
    let result = capture(&mut session, &url, &output, full_page).await;
    session.close().await;
    super::print_response(&json_response(result))
}

async fn capture(
    session: &mut BrowserSession,
    url: &str,
    output: &Path,
    full_page: bool,
) -> Result<Value> {
    let location = session.navigate(url).await?;
    let png = session.screenshot(full_page).await?;
    std::fs::write(output, &png)?;
    Ok(json!({
        "url": location.url,
        "title": location.title,
        "path": output.display().to_string(),
        "bytes": png.len(),
    }))
}
