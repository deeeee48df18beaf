use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::generate_schema;
use ops_agents_core::{Tool, ToolResult};

#[derive(Debug, Deserialize, JsonSchema)]
struct FullResultInput {
    /// Result id from a compact or cleared tool-result reference
    result_id: String,
}

/// Drill-down tool: serves full result bodies by id from a frozen snapshot
/// of the tiered store. The coordinator installs a fresh snapshot before
/// each iteration; reads never race the store's writer.
pub struct FullResultTool {
    snapshot: RwLock<Arc<HashMap<String, Value>>>,
}

impl FullResultTool {
    pub fn new() -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    pub fn install_snapshot(&self, snapshot: Arc<HashMap<String, Value>>) {
        *self.snapshot.write() = snapshot;
    }
}

impl Default for FullResultTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for FullResultTool {
    fn name(&self) -> &str {
        "get_full_result"
    }

    fn description(&self) -> &str {
        "Retrieve the full body of a previously summarized or cleared tool result by its result id"
    }

    fn parameters(&self) -> Value {
        generate_schema::<FullResultInput>()
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let input: FullResultInput = match serde_json::from_value(args) {
            Ok(input) => input,
            Err(e) => return ToolResult::error(format!("invalid arguments: {e}")),
        };

        let snapshot = self.snapshot.read().clone();
        match snapshot.get(&input.result_id) {
            Some(body) => ToolResult::ok(body.clone()),
            None => ToolResult::error(format!("result not found: {}", input.result_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_serves_from_installed_snapshot() {
        let tool = FullResultTool::new();
        let mut bodies = HashMap::new();
        bodies.insert("log-0a1b2c3d".to_string(), json!({"events": ["line"]}));
        tool.install_snapshot(Arc::new(bodies));

        let result = tool
            .execute(json!({"result_id": "log-0a1b2c3d"}))
            .await;
        assert!(result.success);
        assert_eq!(result.output["events"][0], "line");
    }

    #[tokio::test]
    async fn test_missing_id_is_error_value() {
        let tool = FullResultTool::new();
        let result = tool.execute(json!({"result_id": "log-ffffffff"})).await;
        assert!(result.is_error());
        assert!(result.error.unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_snapshot_swap_is_visible() {
        let tool = FullResultTool::new();
        let mut first = HashMap::new();
        first.insert("met-00000001".to_string(), json!(1));
        tool.install_snapshot(Arc::new(first));

        let mut second = HashMap::new();
        second.insert("met-00000002".to_string(), json!(2));
        tool.install_snapshot(Arc::new(second));

        assert!(tool
            .execute(json!({"result_id": "met-00000001"}))
            .await
            .is_error());
        assert!(tool
            .execute(json!({"result_id": "met-00000002"}))
            .await
            .success);
    }

    #[test]
    fn test_schema_names_required_field() {
        let tool = FullResultTool::new();
        let schema = tool.parameters();
        let rendered = schema.to_string();
        assert!(rendered.contains("result_id"));
    }
}
