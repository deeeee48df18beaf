//! Per-tool compact summaries with stable result ids

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use regex::Regex;
use serde_json::Value;

use ops_agents_core::{CompactToolResult, HealthStatus, ToolResult};

/// Produces the compact form of one tool result. Implementations choose the
/// id prefix so result ids read as `<prefix>-<8 hex chars>`.
pub trait ToolSummarizer: Send + Sync {
    fn id_prefix(&self) -> &str;

    fn summarize(&self, tool_name: &str, result: &ToolResult) -> CompactToolResult;
}

pub fn make_result_id(prefix: &str) -> String {
    format!("{prefix}-{:08x}", rand::random::<u32>())
}

/// Registry mapping tool names to summarizers, with a default for tools
/// nobody registered.
pub struct SummarizerRegistry {
    by_tool: HashMap<String, Arc<dyn ToolSummarizer>>,
    fallback: Arc<dyn ToolSummarizer>,
}

impl SummarizerRegistry {
    pub fn new() -> Self {
        Self {
            by_tool: HashMap::new(),
            fallback: Arc::new(DefaultSummarizer::new("res")),
        }
    }

    pub fn register(&mut self, tool_name: impl Into<String>, summarizer: Arc<dyn ToolSummarizer>) {
        self.by_tool.insert(tool_name.into(), summarizer);
    }

    pub fn summarize(&self, tool_name: &str, result: &ToolResult) -> CompactToolResult {
        self.by_tool
            .get(tool_name)
            .unwrap_or(&self.fallback)
            .summarize(tool_name, result)
    }

    /// Summarizers tuned for the common observability tool families.
    pub fn with_builtin_summarizers() -> Self {
        let mut registry = Self::new();
        registry.register("alarms_query", Arc::new(AlarmSummarizer));
        registry.register("logs_query", Arc::new(LogSummarizer));
        registry.register("metrics_query", Arc::new(MetricsSummarizer));
        registry
    }
}

impl Default for SummarizerRegistry {
    fn default() -> Self {
        Self::with_builtin_summarizers()
    }
}

/// Fallback: item count plus top-level keys.
pub struct DefaultSummarizer {
    prefix: String,
}

impl DefaultSummarizer {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl ToolSummarizer for DefaultSummarizer {
    fn id_prefix(&self) -> &str {
        &self.prefix
    }

    fn summarize(&self, tool_name: &str, result: &ToolResult) -> CompactToolResult {
        let item_count = count_items(&result.output);
        let summary = if result.is_error() {
            format!(
                "{tool_name} failed: {}",
                result.error.as_deref().unwrap_or("unknown error")
            )
        } else {
            match &result.output {
                Value::Object(map) => {
                    let mut keys: Vec<&String> = map.keys().collect();
                    keys.sort();
                    let keys: Vec<&str> = keys.into_iter().map(|k| k.as_str()).collect();
                    format!("{item_count} items; keys: {}", keys.join(", "))
                }
                Value::Array(_) => format!("{item_count} items"),
                other => format!("scalar result: {other}"),
            }
        };

        CompactToolResult {
            result_id: make_result_id(&self.prefix),
            tool_name: tool_name.to_string(),
            summary,
            key_highlights: HashMap::new(),
            item_count,
            is_error: result.is_error(),
            services: extract_services(&result.output),
            health: classify_health(&result.output, result.is_error()),
            timestamp: Utc::now(),
        }
    }
}

pub struct AlarmSummarizer;

impl ToolSummarizer for AlarmSummarizer {
    fn id_prefix(&self) -> &str {
        "alm"
    }

    fn summarize(&self, tool_name: &str, result: &ToolResult) -> CompactToolResult {
        let alarms = result.output.get("alarms").and_then(Value::as_array);
        let total = alarms.map(|a| a.len()).unwrap_or(0);
        let firing = alarms
            .map(|a| {
                a.iter()
                    .filter(|alarm| {
                        alarm
                            .get("state")
                            .and_then(Value::as_str)
                            .is_some_and(|s| s.eq_ignore_ascii_case("alarm"))
                    })
                    .count()
            })
            .unwrap_or(0);

        let mut key_highlights = HashMap::new();
        key_highlights.insert("firing".to_string(), Value::from(firing));

        let health = if result.is_error() {
            HealthStatus::Unknown
        } else if firing > 0 {
            HealthStatus::Critical
        } else if total > 0 {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unknown
        };

        CompactToolResult {
            result_id: make_result_id(self.id_prefix()),
            tool_name: tool_name.to_string(),
            summary: format!("{firing} of {total} alarms firing"),
            key_highlights,
            item_count: total,
            is_error: result.is_error(),
            services: extract_services(&result.output),
            health,
            timestamp: Utc::now(),
        }
    }
}

pub struct LogSummarizer;

impl ToolSummarizer for LogSummarizer {
    fn id_prefix(&self) -> &str {
        "log"
    }

    fn summarize(&self, tool_name: &str, result: &ToolResult) -> CompactToolResult {
        let events = result
            .output
            .get("events")
            .or_else(|| result.output.get("messages"))
            .and_then(Value::as_array);
        let total = events.map(|e| e.len()).unwrap_or(0);

        let error_re = error_pattern();
        let error_lines = events
            .map(|e| {
                e.iter()
                    .filter(|event| error_re.is_match(&render_text(event)))
                    .count()
            })
            .unwrap_or(0);

        let mut key_highlights = HashMap::new();
        key_highlights.insert("error_lines".to_string(), Value::from(error_lines));

        let health = if result.is_error() {
            HealthStatus::Unknown
        } else if error_lines > total / 2 && error_lines > 0 {
            HealthStatus::Critical
        } else if error_lines > 0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        CompactToolResult {
            result_id: make_result_id(self.id_prefix()),
            tool_name: tool_name.to_string(),
            summary: format!("{total} log events, {error_lines} matching error patterns"),
            key_highlights,
            item_count: total,
            is_error: result.is_error(),
            services: extract_services(&result.output),
            health,
            timestamp: Utc::now(),
        }
    }
}

pub struct MetricsSummarizer;

impl ToolSummarizer for MetricsSummarizer {
    fn id_prefix(&self) -> &str {
        "met"
    }

    fn summarize(&self, tool_name: &str, result: &ToolResult) -> CompactToolResult {
        let datapoints = result.output.get("datapoints").and_then(Value::as_array);
        let total = datapoints.map(|d| d.len()).unwrap_or(0);
        let peak = datapoints
            .and_then(|d| {
                d.iter()
                    .filter_map(|p| p.get("value").and_then(Value::as_f64))
                    .fold(None, |acc: Option<f64>, v| {
                        Some(acc.map_or(v, |a| a.max(v)))
                    })
            })
            .unwrap_or(0.0);

        let mut key_highlights = HashMap::new();
        key_highlights.insert("peak".to_string(), Value::from(peak));

        CompactToolResult {
            result_id: make_result_id(self.id_prefix()),
            tool_name: tool_name.to_string(),
            summary: format!("{total} datapoints, peak {peak:.2}"),
            key_highlights,
            item_count: total,
            is_error: result.is_error(),
            services: extract_services(&result.output),
            health: classify_health(&result.output, result.is_error()),
            timestamp: Utc::now(),
        }
    }
}

fn count_items(value: &Value) -> usize {
    match value {
        Value::Array(items) => items.len(),
        Value::Object(map) => map
            .values()
            .find_map(|v| v.as_array().map(|a| a.len()))
            .unwrap_or(map.len()),
        Value::Null => 0,
        _ => 1,
    }
}

const SERVICE_KEYS: &[&str] = &["service", "service_name", "serviceName", "services", "application"];

/// Best-effort service-name extraction: well-known field names first, then a
/// hyphenated-name pattern over service-ish string values.
pub fn extract_services(value: &Value) -> Vec<String> {
    let mut found = Vec::new();
    collect_services(value, &mut found);
    found.dedup();
    found
}

fn collect_services(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, v) in map {
                if SERVICE_KEYS.contains(&key.as_str()) {
                    match v {
                        Value::String(s) => push_unique(out, s),
                        Value::Array(items) => {
                            for item in items {
                                if let Value::String(s) = item {
                                    push_unique(out, s);
                                }
                            }
                        }
                        _ => {}
                    }
                } else if key.to_lowercase().contains("resource") {
                    if let Value::String(s) = v {
                        // ARNs and resource paths put the interesting name last.
                        if let Some(m) = service_name_pattern().find_iter(s).last() {
                            push_unique(out, m.as_str());
                        }
                    }
                }
                collect_services(v, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_services(item, out);
            }
        }
        _ => {}
    }
}

fn push_unique(out: &mut Vec<String>, candidate: &str) {
    if !candidate.is_empty() && !out.iter().any(|s| s == candidate) {
        out.push(candidate.to_string());
    }
}

fn service_name_pattern() -> Regex {
    Regex::new(r"[a-z][a-z0-9]*(?:-[a-z0-9]+)+").unwrap_or_else(|_| Regex::new("x^").unwrap())
}

fn error_pattern() -> Regex {
    Regex::new(r"(?i)(error|exception|timed? ?out|fatal|panic)")
        .unwrap_or_else(|_| Regex::new("x^").unwrap())
}

fn render_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

const HEALTH_KEYS: &[&str] = &["state", "status", "health"];

fn classify_health(value: &Value, is_error: bool) -> HealthStatus {
    if is_error {
        return HealthStatus::Unknown;
    }
    let mut worst = HealthStatus::Unknown;
    scan_health(value, &mut worst);
    worst
}

fn scan_health(value: &Value, worst: &mut HealthStatus) {
    match value {
        Value::Object(map) => {
            for (key, v) in map {
                if HEALTH_KEYS.contains(&key.to_lowercase().as_str()) {
                    if let Value::String(s) = v {
                        let status = health_from_str(s);
                        if status.severity_rank() > worst.severity_rank() {
                            *worst = status;
                        }
                    }
                }
                scan_health(v, worst);
            }
        }
        Value::Array(items) => {
            for item in items {
                scan_health(item, worst);
            }
        }
        _ => {}
    }
}

fn health_from_str(s: &str) -> HealthStatus {
    let lowered = s.to_lowercase();
    if ["alarm", "critical", "error", "unhealthy", "failed"]
        .iter()
        .any(|m| lowered.contains(m))
    {
        HealthStatus::Critical
    } else if ["warn", "degraded", "insufficient"]
        .iter()
        .any(|m| lowered.contains(m))
    {
        HealthStatus::Degraded
    } else if ["ok", "healthy", "running", "active"]
        .iter()
        .any(|m| lowered.contains(m))
    {
        HealthStatus::Healthy
    } else {
        HealthStatus::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_result_id_format() {
        let id = make_result_id("alm");
        assert!(id.starts_with("alm-"));
        assert_eq!(id.len(), "alm-".len() + 8);
        assert!(id["alm-".len()..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_alarm_summarizer_health() {
        let result = ToolResult::ok(json!({
            "alarms": [
                {"name": "checkout-api-5xx", "state": "ALARM", "service": "checkout-api"},
                {"name": "cpu-high", "state": "OK"}
            ]
        }));
        let registry = SummarizerRegistry::default();
        let compact = registry.summarize("alarms_query", &result);

        assert_eq!(compact.item_count, 2);
        assert_eq!(compact.health, HealthStatus::Critical);
        assert!(compact.summary.contains("1 of 2"));
        assert_eq!(compact.services, vec!["checkout-api"]);
        assert!(compact.result_id.starts_with("alm-"));
    }

    #[test]
    fn test_log_summarizer_counts_errors() {
        let result = ToolResult::ok(json!({
            "events": [
                "2026-08-01 connection timed out",
                "2026-08-01 request ok",
                "2026-08-01 ERROR pool exhausted"
            ]
        }));
        let compact = LogSummarizer.summarize("logs_query", &result);
        assert_eq!(compact.item_count, 3);
        assert_eq!(compact.key_highlights["error_lines"], 2);
        assert_eq!(compact.health, HealthStatus::Critical);
    }

    #[test]
    fn test_metrics_summarizer_peak() {
        let result = ToolResult::ok(json!({
            "datapoints": [{"value": 0.4}, {"value": 0.97}, {"value": 0.2}]
        }));
        let compact = MetricsSummarizer.summarize("metrics_query", &result);
        assert_eq!(compact.item_count, 3);
        assert_eq!(compact.key_highlights["peak"], 0.97);
    }

    #[test]
    fn test_default_summarizer_for_unknown_tool() {
        let registry = SummarizerRegistry::default();
        let result = ToolResult::ok(json!({"nodes": [1, 2, 3], "region": "us-east-1"}));
        let compact = registry.summarize("custom_inventory", &result);

        assert_eq!(compact.item_count, 3);
        assert!(compact.summary.contains("nodes"));
        assert!(compact.summary.contains("region"));
    }

    #[test]
    fn test_error_result_marks_compact() {
        let registry = SummarizerRegistry::default();
        let compact = registry.summarize("logs_query", &ToolResult::error("access denied"));
        assert!(compact.is_error);
        assert_eq!(compact.item_count, 0);
    }

    #[test]
    fn test_service_extraction_from_resource_string() {
        let services = extract_services(&json!({
            "resource": "arn:aws:lambda:us-east-1:123:function:billing-worker",
            "items": [{"service": "checkout-api"}]
        }));
        assert!(services.iter().any(|s| s == "checkout-api"));
        assert!(services.iter().any(|s| s.contains("billing-worker") || s == "billing-worker"));
    }
}
