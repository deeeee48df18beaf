//! Shared plain types used across the workspace

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool invocation proposed by the model or planned by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            arguments,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The default lookback window when triage produced none.
    pub fn last_minutes(minutes: i64) -> Self {
        let end = Utc::now();
        Self {
            start: end - chrono::Duration::minutes(minutes),
            end,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Critical,
    #[default]
    Unknown,
}

impl HealthStatus {
    pub fn severity_rank(&self) -> u8 {
        match self {
            HealthStatus::Critical => 3,
            HealthStatus::Degraded => 2,
            HealthStatus::Healthy => 1,
            HealthStatus::Unknown => 0,
        }
    }
}

/// In-memory state of a stored tool result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolResultTier {
    /// Raw result body retained.
    Full,
    /// Summary only; body dropped from the prompt context.
    Compact,
    /// Reference metadata only.
    Cleared,
}

/// Compact summary of one tool result, addressable by a stable id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactToolResult {
    pub result_id: String,
    pub tool_name: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub key_highlights: HashMap<String, Value>,
    #[serde(default)]
    pub item_count: usize,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<String>,
    #[serde(default)]
    pub health: HealthStatus,
    pub timestamp: DateTime<Utc>,
}

impl CompactToolResult {
    pub fn context_line(&self) -> String {
        format!(
            "[{}] {}: {} ({} items{})",
            self.result_id,
            self.tool_name,
            self.summary,
            self.item_count,
            if self.is_error { ", error" } else { "" }
        )
    }
}

/// Tier assignment for every known result, produced by the compactor and
/// applied by the scratchpad.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompactionPlan {
    pub assignments: HashMap<String, ToolResultTier>,
}

impl CompactionPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, result_id: impl Into<String>, tier: ToolResultTier) {
        self.assignments.insert(result_id.into(), tier);
    }

    pub fn tier_for(&self, result_id: &str) -> Option<ToolResultTier> {
        self.assignments.get(result_id).copied()
    }

    pub fn count(&self, tier: ToolResultTier) -> usize {
        self.assignments.values().filter(|t| **t == tier).count()
    }
}

/// Conservative token estimator: bytes / 4, rounded up. Deterministic and
/// monotone in the input length, which is all compaction thresholds need.
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens_monotone() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        let short = estimate_tokens("some text");
        let long = estimate_tokens("some text and then some more");
        assert!(long > short);
    }

    #[test]
    fn test_health_ranking() {
        assert!(HealthStatus::Critical.severity_rank() > HealthStatus::Degraded.severity_rank());
        assert!(HealthStatus::Degraded.severity_rank() > HealthStatus::Healthy.severity_rank());
        assert_eq!(HealthStatus::default(), HealthStatus::Unknown);
    }

    #[test]
    fn test_tier_serde() {
        let json = serde_json::to_string(&ToolResultTier::Compact).unwrap();
        assert_eq!(json, "\"compact\"");
        let tier: ToolResultTier = serde_json::from_str("\"cleared\"").unwrap();
        assert_eq!(tier, ToolResultTier::Cleared);
    }

    #[test]
    fn test_compaction_plan_counts() {
        let mut plan = CompactionPlan::new();
        plan.assign("cw-00000001", ToolResultTier::Full);
        plan.assign("cw-00000002", ToolResultTier::Compact);
        plan.assign("cw-00000003", ToolResultTier::Cleared);
        plan.assign("cw-00000004", ToolResultTier::Cleared);

        assert_eq!(plan.count(ToolResultTier::Full), 1);
        assert_eq!(plan.count(ToolResultTier::Cleared), 2);
        assert_eq!(plan.tier_for("cw-00000002"), Some(ToolResultTier::Compact));
        assert_eq!(plan.tier_for("missing"), None);
    }

    #[test]
    fn test_time_window_contains() {
        let window = TimeWindow::last_minutes(60);
        assert!(window.contains(Utc::now() - chrono::Duration::minutes(30)));
        assert!(!window.contains(Utc::now() - chrono::Duration::minutes(120)));
    }
}
