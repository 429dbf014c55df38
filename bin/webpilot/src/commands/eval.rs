use serde_json::{json, Value};
use webpilot_browser::{json_response, BrowserSession};
use webpilot_core::Result;

pub async fn run(expression: String, url: Option<String>, headed: bool) -> anyhow::Result<()> {
    let mut session = super::agent_session()?;
    session.launch(!headed).await?;
    let result = evaluate(&mut session, &expression, url.as_deref()).await;
    session.close().await;
    super::print_response(&json_response(result))
}

async fn evaluate(
    session: &mut BrowserSession,
    expression: &str,
    url: Option<&str>,
) -> Result<Value> {
    if let Some(url) = url {
        session.navigate(url).await?;
    }
    let value = session.evaluate(expression).await?;
    Ok(json!({"result": value}))
}
