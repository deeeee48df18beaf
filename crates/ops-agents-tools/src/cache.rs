//! Bounded LRU cache over (tool, canonical args)

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use ops_agents_core::ToolResult;

use crate::is_cacheable;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCacheConfig {
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
    #[serde(default = "default_ttl_overrides")]
    pub ttl_overrides: HashMap<String, u64>,
}

fn default_max_size() -> usize {
    100
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_ttl_overrides() -> HashMap<String, u64> {
    let mut overrides = HashMap::new();
    // Observability data goes stale fast; knowledge barely moves.
    for tool in ["metrics_query", "alarms_query", "logs_query", "monitors_query"] {
        overrides.insert(tool.to_string(), 60);
    }
    overrides.insert("knowledge_search".to_string(), 300);
    overrides.insert("container_status".to_string(), 30);
    overrides
}

impl Default for ToolCacheConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            default_ttl_secs: default_ttl_secs(),
            ttl_overrides: default_ttl_overrides(),
        }
    }
}

impl ToolCacheConfig {
    fn ttl_for(&self, tool: &str) -> Duration {
        let secs = self
            .ttl_overrides
            .get(tool)
            .copied()
            .unwrap_or(self.default_ttl_secs);
        Duration::from_secs(secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

struct CacheEntry {
    result: ToolResult,
    stored_at: Instant,
    ttl: Duration,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    // Front = least recently used.
    order: VecDeque<String>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Internally synchronized; safe for concurrent get/set across a parallel
/// batch.
pub struct ToolCache {
    config: ToolCacheConfig,
    inner: Mutex<CacheInner>,
}

impl ToolCache {
    pub fn new(config: ToolCacheConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    pub fn get(&self, tool: &str, args: &Value) -> Option<ToolResult> {
        if !is_cacheable(tool) {
            return None;
        }
        let key = cache_key(tool, args);
        let mut inner = self.inner.lock();

        let expired = match inner.entries.get(&key) {
            Some(entry) => entry.stored_at.elapsed() > entry.ttl,
            None => {
                inner.misses += 1;
                return None;
            }
        };

        if expired {
            inner.entries.remove(&key);
            inner.order.retain(|k| k != &key);
            inner.misses += 1;
            return None;
        }

        inner.order.retain(|k| k != &key);
        inner.order.push_back(key.clone());
        inner.hits += 1;
        debug!(tool, "cache hit");
        inner.entries.get(&key).map(|e| e.result.clone())
    }

    pub fn set(&self, tool: &str, args: &Value, result: &ToolResult) {
        if !is_cacheable(tool) {
            return;
        }
        // Errors and empty results are never stored.
        if result.is_error() || result.output.is_null() {
            return;
        }

        let key = cache_key(tool, args);
        let mut inner = self.inner.lock();

        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.config.max_size {
            if let Some(oldest) = inner.order.pop_front() {
                inner.entries.remove(&oldest);
                inner.evictions += 1;
            }
        }

        inner.order.retain(|k| k != &key);
        inner.order.push_back(key.clone());
        inner.entries.insert(
            key,
            CacheEntry {
                result: result.clone(),
                stored_at: Instant::now(),
                ttl: self.config.ttl_for(tool),
            },
        );
    }

    pub fn invalidate_all(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    pub fn invalidate_tool(&self, tool: &str) {
        let prefix = format!("{tool}::");
        let mut inner = self.inner.lock();
        inner.entries.retain(|k, _| !k.starts_with(&prefix));
        inner.order.retain(|k| !k.starts_with(&prefix));
    }

    /// Drop entries whose canonical args contain the pattern.
    pub fn invalidate_matching(&self, pattern: &str) {
        let mut inner = self.inner.lock();
        inner.entries.retain(|k, _| !k.contains(pattern));
        inner.order.retain(|k| !k.contains(pattern));
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            size: inner.entries.len(),
        }
    }
}

impl Default for ToolCache {
    fn default() -> Self {
        Self::new(ToolCacheConfig::default())
    }
}

pub fn cache_key(tool: &str, args: &Value) -> String {
    format!("{tool}::{}", canonicalize(args))
}

/// Deterministic flattening: object keys sorted recursively, array elements
/// sorted by their own canonical form.
fn canonicalize(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let fields: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{k}={}", canonicalize(&map[k])))
                .collect();
            format!("{{{}}}", fields.join(","))
        }
        Value::Array(items) => {
            let mut parts: Vec<String> = items.iter().map(canonicalize).collect();
            parts.sort();
            format!("[{}]", parts.join(","))
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_key_order_insensitive() {
        let a = json!({"service": "api", "region": "us-east-1", "tags": ["b", "a"]});
        let b = json!({"region": "us-east-1", "tags": ["a", "b"], "service": "api"});
        assert_eq!(cache_key("logs_query", &a), cache_key("logs_query", &b));

        let c = json!({"service": "worker", "region": "us-east-1", "tags": ["a", "b"]});
        assert_ne!(cache_key("logs_query", &a), cache_key("logs_query", &c));
    }

    #[test]
    fn test_set_then_get_within_ttl() {
        let cache = ToolCache::default();
        let args = json!({"service": "checkout-api"});
        let result = ToolResult::ok(json!({"alarms": []}));

        assert!(cache.get("alarms_query", &args).is_none());
        cache.set("alarms_query", &args, &result);
        let hit = cache.get("alarms_query", &args).unwrap();
        assert_eq!(hit.output, result.output);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_errors_and_null_never_stored() {
        let cache = ToolCache::default();
        let args = json!({"service": "api"});

        cache.set("logs_query", &args, &ToolResult::error("socket closed"));
        assert!(cache.get("logs_query", &args).is_none());

        cache.set("logs_query", &args, &ToolResult::ok(Value::Null));
        assert!(cache.get("logs_query", &args).is_none());
    }

    #[test]
    fn test_non_cacheable_bypass() {
        let cache = ToolCache::default();
        let args = json!({"command": "restart"});
        let result = ToolResult::ok(json!({"status": "done"}));

        cache.set("remediation_execute", &args, &result);
        assert!(cache.get("remediation_execute", &args).is_none());
        // Bypass is silent: no miss recorded for the set-side skip.
        assert_eq!(cache.stats().size, 0);
    }

    #[test]
    fn test_lru_eviction() {
        let cache = ToolCache::new(ToolCacheConfig {
            max_size: 2,
            ..Default::default()
        });
        let result = ToolResult::ok(json!({"ok": true}));

        cache.set("logs_query", &json!({"q": 1}), &result);
        cache.set("logs_query", &json!({"q": 2}), &result);
        // Touch q=1 so q=2 becomes the eviction candidate.
        assert!(cache.get("logs_query", &json!({"q": 1})).is_some());
        cache.set("logs_query", &json!({"q": 3}), &result);

        assert!(cache.get("logs_query", &json!({"q": 1})).is_some());
        assert!(cache.get("logs_query", &json!({"q": 2})).is_none());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = ToolCache::new(ToolCacheConfig {
            max_size: 10,
            default_ttl_secs: 0,
            ttl_overrides: HashMap::new(),
        });
        let args = json!({"service": "api"});
        cache.set("custom_tool", &args, &ToolResult::ok(json!({"n": 1})));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("custom_tool", &args).is_none());
    }

    #[test]
    fn test_invalidation() {
        let cache = ToolCache::default();
        let result = ToolResult::ok(json!({"ok": true}));
        cache.set("logs_query", &json!({"service": "api"}), &result);
        cache.set("alarms_query", &json!({"service": "api"}), &result);

        cache.invalidate_tool("logs_query");
        assert!(cache.get("logs_query", &json!({"service": "api"})).is_none());
        assert!(cache.get("alarms_query", &json!({"service": "api"})).is_some());

        cache.invalidate_matching("api");
        assert!(cache.get("alarms_query", &json!({"service": "api"})).is_none());

        cache.set("logs_query", &json!({"service": "api"}), &result);
        cache.invalidate_all();
        assert_eq!(cache.stats().size, 0);
    }
}
