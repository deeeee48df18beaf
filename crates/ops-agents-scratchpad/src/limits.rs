use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Soft caps: going over a cap warns, it never blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolLimitConfig {
    #[serde(default)]
    pub caps: HashMap<String, usize>,
    #[serde(default = "default_cap")]
    pub default_cap: usize,
}

fn default_cap() -> usize {
    15
}

impl Default for ToolLimitConfig {
    fn default() -> Self {
        let mut caps = HashMap::new();
        caps.insert("knowledge_search".to_string(), 5);
        caps.insert("web_search".to_string(), 3);
        Self {
            caps,
            default_cap: default_cap(),
        }
    }
}

impl ToolLimitConfig {
    pub fn cap_for(&self, tool: &str) -> usize {
        if let Some(cap) = self.caps.get(tool) {
            return *cap;
        }
        // Cloud query tools fan out fast; keep their suggested cap tighter.
        if tool.starts_with("aws_") || tool.ends_with("_query") {
            return 10;
        }
        self.default_cap
    }
}

#[derive(Debug, Clone)]
pub struct LimitCheck {
    /// Always true: limits are advisory.
    pub allowed: bool,
    pub warning: Option<String>,
}

impl LimitCheck {
    fn clear() -> Self {
        Self {
            allowed: true,
            warning: None,
        }
    }

    fn warn(message: String) -> Self {
        Self {
            allowed: true,
            warning: Some(message),
        }
    }
}

const RETRY_OVERLAP_THRESHOLD: f64 = 0.8;

/// Tracks per-tool call counts and recent argument text, producing warnings
/// the model sees in its next prompt.
#[derive(Debug, Default)]
pub struct GracefulLimits {
    config: ToolLimitConfig,
    counts: HashMap<String, usize>,
    recent_args: HashMap<String, Vec<String>>,
}

impl GracefulLimits {
    pub fn new(config: ToolLimitConfig) -> Self {
        Self {
            config,
            counts: HashMap::new(),
            recent_args: HashMap::new(),
        }
    }

    pub fn record(&mut self, tool: &str, args_text: &str) {
        *self.counts.entry(tool.to_string()).or_insert(0) += 1;
        self.recent_args
            .entry(tool.to_string())
            .or_default()
            .push(args_text.to_string());
    }

    pub fn count(&self, tool: &str) -> usize {
        self.counts.get(tool).copied().unwrap_or(0)
    }

    pub fn check(&self, tool: &str, args_text: Option<&str>) -> LimitCheck {
        let cap = self.config.cap_for(tool);
        let used = self.count(tool);

        if let Some(args) = args_text {
            if let Some(history) = self.recent_args.get(tool) {
                let similar = history
                    .iter()
                    .any(|prior| jaccard(prior, args) >= RETRY_OVERLAP_THRESHOLD);
                if similar {
                    return LimitCheck::warn(format!(
                        "possible retry loop: {tool} was already called with near-identical arguments"
                    ));
                }
            }
        }

        if used >= cap {
            return LimitCheck::warn(format!(
                "{tool} has been called {used} times (suggested cap {cap}); consider a different angle"
            ));
        }

        LimitCheck::clear()
    }

    pub fn usage_summary(&self) -> String {
        if self.counts.is_empty() {
            return "no tool calls yet".to_string();
        }
        let mut lines: Vec<String> = self
            .counts
            .iter()
            .map(|(tool, used)| format!("{tool}: {used}/{}", self.config.cap_for(tool)))
            .collect();
        lines.sort();
        lines.join(", ")
    }
}

fn tokenize(text: &str) -> HashSet<&str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect()
}

fn jaccard(a: &str, b: &str) -> f64 {
    let set_a = tokenize(a);
    let set_b = tokenize(b);
    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_over_cap_warns_but_allows() {
        let mut limits = GracefulLimits::new(ToolLimitConfig::default());
        for i in 0..3 {
            limits.record("web_search", &format!("query variant {i}"));
        }

        let check = limits.check("web_search", Some("a completely different query"));
        assert!(check.allowed);
        assert!(check.warning.unwrap().contains("suggested cap 3"));
    }

    #[test]
    fn test_retry_loop_detection() {
        let mut limits = GracefulLimits::new(ToolLimitConfig::default());
        limits.record("logs_query", "service checkout-api errors last hour");

        let check = limits.check("logs_query", Some("service checkout-api errors last hour"));
        assert!(check.allowed);
        assert!(check.warning.unwrap().contains("retry loop"));

        let check = limits.check("logs_query", Some("memory usage for billing worker"));
        assert!(check.warning.is_none());
    }

    #[test]
    fn test_cap_defaults() {
        let config = ToolLimitConfig::default();
        assert_eq!(config.cap_for("knowledge_search"), 5);
        assert_eq!(config.cap_for("web_search"), 3);
        assert_eq!(config.cap_for("aws_metrics"), 10);
        assert_eq!(config.cap_for("alarms_query"), 10);
        assert_eq!(config.cap_for("incident_detail"), 15);
    }

    #[test]
    fn test_cap_override() {
        let mut caps = HashMap::new();
        caps.insert("logs_query".to_string(), 2);
        let mut limits = GracefulLimits::new(ToolLimitConfig {
            caps,
            default_cap: 15,
        });

        limits.record("logs_query", "one");
        limits.record("logs_query", "two");
        assert!(limits.check("logs_query", None).warning.is_some());
    }

    #[test]
    fn test_jaccard_bounds() {
        assert!((jaccard("a b c", "a b c") - 1.0).abs() < f64::EPSILON);
        assert!(jaccard("a b c d e", "v w x y z") < 0.01);
    }

    #[test]
    fn test_usage_summary() {
        let mut limits = GracefulLimits::new(ToolLimitConfig::default());
        assert_eq!(limits.usage_summary(), "no tool calls yet");
        limits.record("web_search", "query");
        assert!(limits.usage_summary().contains("web_search: 1/3"));
    }
}
