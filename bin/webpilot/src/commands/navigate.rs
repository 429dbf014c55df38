use serde_json::json;
use webpilot_browser::json_response;

pub async fn run(url: String, headed: bool) -> anyhow::Result<()> {
    let mut session = super::agent_session()?;
    session.launch(!headed).await?;
    let result = session
        .navigate(&url)
        .await
        .map(|location| json!({"url": location.url, "title": location.title}));
    session.close().await;
    super::print_response(&json_response(result))
}
