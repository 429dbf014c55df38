use serde_json::{json, Value};
use webpilot_browser::json_response;
use webpilot_core::Result;

pub async fn run(port: u16) -> anyhow::Result<()> {
    let result: Result<Value> = async {
        let targets = webpilot_browser::launch::query_targets(port).await?;
        Ok(json!({"port": port, "targets": serde_json::to_value(&targets)?}))
    }
    .await;
    super::print_response(&json_response(result))
}
