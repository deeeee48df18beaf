use std::collections::HashMap;
use std::sync::Arc;

use ops_agents_core::{Tool, ToolInfo};

use crate::ToolError;

/// Name-keyed tool registry. Names are opaque; lookups that miss surface as
/// unknown-tool errors at the call site.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ToolError::AlreadyRegistered(name));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn infos(&self) -> Vec<ToolInfo> {
        let mut infos: Vec<ToolInfo> = self.tools.values().map(|t| t.info()).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Restrict to an allow-list, e.g. the run configuration's
    /// `available_tools` filter. Unknown names are ignored.
    pub fn filtered(&self, allowed: &[String]) -> Self {
        let tools = self
            .tools
            .iter()
            .filter(|(name, _)| allowed.iter().any(|a| a == *name))
            .map(|(name, tool)| (name.clone(), Arc::clone(tool)))
            .collect();
        Self { tools }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ops_agents_core::ToolResult;
    use serde_json::Value;

    struct NamedTool(&'static str);

    #[async_trait]
    impl Tool for NamedTool {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            "test tool"
        }

        fn parameters(&self) -> Value {
            serde_json::json!({"type": "object"})
        }

        async fn execute(&self, _args: Value) -> ToolResult {
            ToolResult::ok(Value::Null)
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(NamedTool("alarms_query"))).unwrap();
        registry.register(Arc::new(NamedTool("logs_query"))).unwrap();

        assert!(registry.contains("alarms_query"));
        assert!(registry.get("metrics_query").is_none());
        assert_eq!(registry.names(), vec!["alarms_query", "logs_query"]);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(NamedTool("logs_query"))).unwrap();
        let err = registry.register(Arc::new(NamedTool("logs_query"))).unwrap_err();
        assert!(matches!(err, ToolError::AlreadyRegistered(_)));
    }

    #[test]
    fn test_filtered_allow_list() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(NamedTool("alarms_query"))).unwrap();
        registry.register(Arc::new(NamedTool("logs_query"))).unwrap();

        let filtered = registry.filtered(&["logs_query".to_string(), "missing".to_string()]);
        assert_eq!(filtered.len(), 1);
        assert!(filtered.contains("logs_query"));
    }
}
