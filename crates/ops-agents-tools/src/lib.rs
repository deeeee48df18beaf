//! Tool infrastructure for the ops-agents investigation engine

pub mod cache;
pub mod executor;
mod full_result;
mod registry;
pub mod summarizer;

pub use cache::{CacheStats, ToolCache, ToolCacheConfig};
pub use executor::{ExecutedCall, ParallelExecutor, ParallelExecutorConfig};
pub use full_result::FullResultTool;
pub use registry::ToolRegistry;
pub use summarizer::{
    extract_services, make_result_id, AlarmSummarizer, DefaultSummarizer, LogSummarizer,
    MetricsSummarizer, SummarizerRegistry, ToolSummarizer,
};

pub use ops_agents_core::{Tool, ToolInfo, ToolResult};

use schemars::JsonSchema;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),
    #[error("Tool already registered: {0}")]
    AlreadyRegistered(String),
    #[error("Tool execution failed: {0}")]
    ExecutionFailed(String),
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
}

/// Tools with side effects or approval semantics must never be served from
/// or written to the cache.
pub const NON_CACHEABLE_TOOLS: &[&str] = &[
    "skill_invoke",
    "run_command",
    "remediation_execute",
    "remediation_approve",
    "container_exec",
];

pub fn is_cacheable(tool: &str) -> bool {
    !NON_CACHEABLE_TOOLS.contains(&tool)
}

pub fn generate_schema<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema).unwrap_or_else(|_| serde_json::json!({}))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_cacheable_set() {
        assert!(!is_cacheable("skill_invoke"));
        assert!(!is_cacheable("remediation_execute"));
        assert!(is_cacheable("alarms_query"));
        assert!(is_cacheable("logs_query"));
    }
}
