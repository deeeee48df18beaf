//! Tool port for observability, cloud, and incident backends

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub output: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, Value>>,
}

impl ToolResult {
    pub fn ok(output: Value) -> Self {
        Self {
            success: true,
            output,
            error: None,
            metadata: None,
        }
    }

    pub fn ok_with_metadata(output: Value, metadata: HashMap<String, Value>) -> Self {
        Self {
            success: true,
            output,
            error: None,
            metadata: Some(metadata),
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: Value::Null,
            error: Some(error.into()),
            metadata: None,
        }
    }

    pub fn is_error(&self) -> bool {
        !self.success || self.error.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    /// JSON schema: nested type-tagged objects plus a `required` name list.
    pub parameters: Value,
}

/// Core tool port. Implementations must be safe to invoke concurrently with
/// distinct argument sets; failures are returned, never panicked.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters(&self) -> Value;

    async fn execute(&self, args: Value) -> ToolResult;

    fn info(&self) -> ToolInfo {
        ToolInfo {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Returns its arguments"
        }

        fn parameters(&self) -> Value {
            serde_json::json!({
                "type": "object",
                "properties": { "message": { "type": "string" } },
                "required": ["message"]
            })
        }

        async fn execute(&self, args: Value) -> ToolResult {
            ToolResult::ok(args)
        }
    }

    #[tokio::test]
    async fn test_tool_execute_and_info() {
        let tool = EchoTool;
        let result = tool.execute(serde_json::json!({"message": "hi"})).await;
        assert!(result.success);
        assert!(!result.is_error());
        assert_eq!(result.output["message"], "hi");

        let info = tool.info();
        assert_eq!(info.name, "echo");
        assert_eq!(info.parameters["required"][0], "message");
    }

    #[test]
    fn test_error_result() {
        let result = ToolResult::error("connection refused");
        assert!(result.is_error());
        assert!(!result.success);
        assert_eq!(result.output, Value::Null);
    }
}
