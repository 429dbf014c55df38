use serde_json::json;
use webpilot_browser::{json_response, LoginIndicators};

pub async fn run(
    url: String,
    url_patterns: Vec<String>,
    title_patterns: Vec<String>,
) -> anyhow::Result<()> {
    let indicators = LoginIndicators::new(url_patterns, title_patterns);
    let mut session = super::agent_session()?;
    let result = session
        .ensure_authenticated(&url, &indicators)
        .await
        .map(|()| json!({"url": url, "authenticated": true}));
    session.close().await;
    super::print_response(&json_response(result))
}
