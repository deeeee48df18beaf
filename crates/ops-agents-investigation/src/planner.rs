//! Hypothesis-to-query planning
//!
//! Maps a hypothesis statement onto a library of query templates, refines
//! over-broad queries with triage context, and adapts tool choices to what
//! is actually registered.

use chrono::SecondsFormat;
use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;

use ops_agents_core::TimeWindow;

use crate::model::{CausalQuery, Hypothesis, QueryType, TriageResult};

const FALLBACK_PENALTY_PER_HOP: f64 = 0.05;
const DEFAULT_WINDOW_MINUTES: i64 = 60;

struct QueryTemplate {
    pattern: &'static str,
    tool: &'static str,
    query_type: QueryType,
    parameters: fn() -> Value,
    expected_outcome: &'static str,
    relevance: f64,
}

fn template_library() -> Vec<QueryTemplate> {
    vec![
        QueryTemplate {
            pattern: r"(?i)latenc|slow|p9\d|response time",
            tool: "metrics_query",
            query_type: QueryType::Confirming,
            parameters: || json!({"metric": "latency_p99", "statistic": "p99"}),
            expected_outcome: "p99 latency elevated during the incident window",
            relevance: 0.9,
        },
        QueryTemplate {
            pattern: r"(?i)error rate|5\d\d|failure|exception",
            tool: "logs_query",
            query_type: QueryType::Confirming,
            parameters: || json!({"filter_pattern": "ERROR"}),
            expected_outcome: "error volume correlated with incident start",
            relevance: 0.85,
        },
        QueryTemplate {
            pattern: r"(?i)memory|oom|leak|heap",
            tool: "metrics_query",
            query_type: QueryType::Confirming,
            parameters: || json!({"metric": "memory_utilization", "statistic": "max"}),
            expected_outcome: "memory climbing toward the limit before the incident",
            relevance: 0.85,
        },
        QueryTemplate {
            pattern: r"(?i)\bcpu\b|throttl",
            tool: "metrics_query",
            query_type: QueryType::Confirming,
            parameters: || json!({"metric": "cpu_utilization", "statistic": "max"}),
            expected_outcome: "CPU saturation or throttling in the incident window",
            relevance: 0.8,
        },
        QueryTemplate {
            pattern: r"(?i)connection pool|pool exhaust|connections",
            tool: "metrics_query",
            query_type: QueryType::Confirming,
            parameters: || json!({"metric": "db_connections", "statistic": "max"}),
            expected_outcome: "connection count pinned at the configured maximum",
            relevance: 0.9,
        },
        QueryTemplate {
            pattern: r"(?i)deploy|release|rollout|config change",
            tool: "deploy_history",
            query_type: QueryType::Confirming,
            parameters: || json!({}),
            expected_outcome: "a deploy or config change shortly before the incident",
            relevance: 0.85,
        },
        QueryTemplate {
            pattern: r"(?i)\bdns\b|resolution|lookup",
            tool: "logs_query",
            query_type: QueryType::Confirming,
            parameters: || json!({"filter_pattern": "dns"}),
            expected_outcome: "resolution failures or elevated lookup times",
            relevance: 0.75,
        },
        QueryTemplate {
            pattern: r"(?i)dependency|downstream|upstream|third.party",
            tool: "dependency_map",
            query_type: QueryType::Exploratory,
            parameters: || json!({}),
            expected_outcome: "a degraded dependency in the service graph",
            relevance: 0.7,
        },
        QueryTemplate {
            pattern: r"(?i)quota|rate.?limit|throttle",
            tool: "quota_status",
            query_type: QueryType::Confirming,
            parameters: || json!({}),
            expected_outcome: "a quota or rate limit at or near its ceiling",
            relevance: 0.8,
        },
    ]
}

fn fallback_chain(tool: &str) -> &'static [&'static str] {
    match tool {
        "metrics_query" => &["alarms_query", "logs_query", "cloud_inventory"],
        "deploy_history" => &["cloud_inventory", "logs_query"],
        "dependency_map" => &["cloud_inventory", "logs_query"],
        "quota_status" => &["cloud_inventory", "alarms_query"],
        "alarms_query" => &["logs_query", "cloud_inventory"],
        "logs_query" => &["alarms_query", "cloud_inventory"],
        _ => &[],
    }
}

/// Runtime knowledge the planner folds into queries: a log group observed
/// earlier in the run, or a function name a log group can be derived from.
#[derive(Debug, Clone, Default)]
pub struct PlannerHints {
    pub log_group: Option<String>,
    pub observed_function: Option<String>,
}

pub struct CausalQueryPlanner {
    available_tools: Vec<String>,
    default_log_group: Option<String>,
}

impl CausalQueryPlanner {
    pub fn new(available_tools: Vec<String>) -> Self {
        Self {
            available_tools,
            default_log_group: None,
        }
    }

    pub fn with_default_log_group(mut self, log_group: impl Into<String>) -> Self {
        self.default_log_group = Some(log_group.into());
        self
    }

    /// Candidate queries for one hypothesis, highest relevance first.
    pub fn plan(
        &self,
        hypothesis: &Hypothesis,
        triage: Option<&TriageResult>,
        hints: &PlannerHints,
    ) -> Vec<CausalQuery> {
        let mut queries = Vec::new();

        for template in template_library() {
            let Ok(re) = Regex::new(template.pattern) else {
                continue;
            };
            if !re.is_match(&hypothesis.statement) {
                continue;
            }
            queries.push(CausalQuery {
                id: String::new(),
                hypothesis_id: hypothesis.id.clone(),
                query_type: template.query_type,
                tool_name: template.tool.to_string(),
                parameters: (template.parameters)(),
                expected_outcome: template.expected_outcome.to_string(),
                relevance_score: template.relevance,
            });
        }

        // Nothing matched: fall back to a broad look at alarms and logs.
        if queries.is_empty() {
            for (tool, expected) in [
                ("alarms_query", "any alarm correlated with the hypothesis"),
                ("logs_query", "log evidence for or against the hypothesis"),
            ] {
                queries.push(CausalQuery {
                    id: String::new(),
                    hypothesis_id: hypothesis.id.clone(),
                    query_type: QueryType::Exploratory,
                    tool_name: tool.to_string(),
                    parameters: json!({}),
                    expected_outcome: expected.to_string(),
                    relevance_score: 0.4,
                });
            }
        }

        for query in &mut queries {
            if is_too_broad(&query.parameters) {
                refine(query, triage);
            }
            self.adapt_to_environment(query);
            self.enrich_log_query(query, hints);
        }

        queries.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        for (i, query) in queries.iter_mut().enumerate() {
            query.id = format!("q_{}_{}", hypothesis.id, i + 1);
        }

        debug!(
            hypothesis = %hypothesis.id,
            count = queries.len(),
            "planned causal queries"
        );
        queries
    }

    /// Swap an unavailable preferred tool for the first registered fallback,
    /// at a small relevance penalty per hop.
    fn adapt_to_environment(&self, query: &mut CausalQuery) {
        if self.available_tools.is_empty() || self.is_available(&query.tool_name) {
            return;
        }
        for (hop, fallback) in fallback_chain(&query.tool_name).iter().enumerate() {
            if self.is_available(fallback) {
                debug!(
                    from = %query.tool_name,
                    to = %fallback,
                    "preferred tool unavailable, using fallback"
                );
                query.tool_name = fallback.to_string();
                query.relevance_score =
                    (query.relevance_score - FALLBACK_PENALTY_PER_HOP * (hop + 1) as f64).max(0.0);
                return;
            }
        }
    }

    fn is_available(&self, tool: &str) -> bool {
        self.available_tools.iter().any(|t| t == tool)
    }

    fn enrich_log_query(&self, query: &mut CausalQuery, hints: &PlannerHints) {
        if query.tool_name != "logs_query" {
            return;
        }
        let Value::Object(params) = &mut query.parameters else {
            return;
        };
        if params.contains_key("log_group") {
            return;
        }

        let group = hints
            .log_group
            .clone()
            .or_else(|| {
                hints
                    .observed_function
                    .as_ref()
                    .map(|f| format!("/aws/lambda/{f}"))
            })
            .or_else(|| self.default_log_group.clone());

        if let Some(group) = group {
            params.insert("log_group".to_string(), Value::String(group));
        }
    }
}

const NARROWING_KEYS: &[&str] = &[
    "service",
    "resource",
    "filter_pattern",
    "start_time",
    "end_time",
];

/// A query is too broad when nothing narrows it: no service, resource,
/// filter, or time window.
fn is_too_broad(parameters: &Value) -> bool {
    match parameters {
        Value::Object(map) => !NARROWING_KEYS.iter().any(|k| map.contains_key(*k)),
        _ => true,
    }
}

/// Inherit the triage's first affected service and a default 60-minute
/// window.
fn refine(query: &mut CausalQuery, triage: Option<&TriageResult>) {
    let window = triage
        .and_then(|t| t.time_window)
        .unwrap_or_else(|| TimeWindow::last_minutes(DEFAULT_WINDOW_MINUTES));

    if !query.parameters.is_object() {
        query.parameters = json!({});
    }
    if let Value::Object(params) = &mut query.parameters {
        if let Some(service) = triage.and_then(|t| t.affected_services.first()) {
            params.insert("service".to_string(), Value::String(service.clone()));
        }
        params.insert(
            "start_time".to_string(),
            Value::String(window.start.to_rfc3339_opts(SecondsFormat::Secs, true)),
        );
        params.insert(
            "end_time".to_string(),
            Value::String(window.end.to_rfc3339_opts(SecondsFormat::Secs, true)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HypothesisCategory, HypothesisSeed};
    use chrono::Utc;

    fn hypothesis(statement: &str) -> Hypothesis {
        let seed = HypothesisSeed::new(statement).with_category(HypothesisCategory::Capacity);
        let now = Utc::now();
        Hypothesis {
            id: "h_1".into(),
            statement: seed.statement,
            category: seed.category,
            priority: 1,
            confirming_evidence: String::new(),
            refuting_evidence: String::new(),
            queries: Vec::new(),
            query_results: Default::default(),
            reasoning: None,
            confidence: 0,
            evidence_strength: Default::default(),
            status: Default::default(),
            parent_id: None,
            children: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn triage_with_service(service: &str) -> TriageResult {
        TriageResult {
            affected_services: vec![service.to_string()],
            ..Default::default()
        }
    }

    fn all_tools() -> Vec<String> {
        [
            "metrics_query",
            "logs_query",
            "alarms_query",
            "deploy_history",
            "dependency_map",
            "quota_status",
            "cloud_inventory",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    #[test]
    fn test_latency_hypothesis_plans_metrics() {
        let planner = CausalQueryPlanner::new(all_tools());
        let queries = planner.plan(
            &hypothesis("p99 latency spike caused by connection pool exhaustion"),
            Some(&triage_with_service("checkout-api")),
            &PlannerHints::default(),
        );

        assert!(!queries.is_empty());
        assert!(queries.iter().any(|q| q.tool_name == "metrics_query"));
        // Sorted by relevance, ids sequential.
        assert!(queries.windows(2).all(|w| w[0].relevance_score >= w[1].relevance_score));
        assert_eq!(queries[0].id, "q_h_1_1");
    }

    #[test]
    fn test_broad_query_inherits_service_and_window() {
        let planner = CausalQueryPlanner::new(all_tools());
        let queries = planner.plan(
            &hypothesis("a recent deploy regressed checkout"),
            Some(&triage_with_service("checkout-api")),
            &PlannerHints::default(),
        );

        let deploy = queries
            .iter()
            .find(|q| q.tool_name == "deploy_history")
            .unwrap();
        assert_eq!(deploy.parameters["service"], "checkout-api");
        assert!(deploy.parameters.get("start_time").is_some());
        assert!(deploy.parameters.get("end_time").is_some());
    }

    #[test]
    fn test_fallback_when_tool_unavailable() {
        let planner = CausalQueryPlanner::new(vec![
            "alarms_query".to_string(),
            "logs_query".to_string(),
        ]);
        let queries = planner.plan(
            &hypothesis("memory leak in the checkout workers"),
            None,
            &PlannerHints::default(),
        );

        // metrics_query is unavailable: first fallback is alarms_query.
        let adapted = &queries[0];
        assert_eq!(adapted.tool_name, "alarms_query");
        assert!(adapted.relevance_score >= 0.85 - 0.1);
        assert!(adapted.relevance_score < 0.85);
    }

    #[test]
    fn test_no_template_match_falls_back_to_exploratory() {
        let planner = CausalQueryPlanner::new(all_tools());
        let queries = planner.plan(
            &hypothesis("something odd happened"),
            None,
            &PlannerHints::default(),
        );

        assert_eq!(queries.len(), 2);
        assert!(queries.iter().all(|q| q.query_type == QueryType::Exploratory));
        assert!(queries.iter().all(|q| (q.relevance_score - 0.4).abs() < f64::EPSILON));
    }

    #[test]
    fn test_log_group_enrichment_priority() {
        let planner =
            CausalQueryPlanner::new(all_tools()).with_default_log_group("/demo/app-logs");

        // Observed function wins over the configured default.
        let queries = planner.plan(
            &hypothesis("error rate spike in checkout"),
            None,
            &PlannerHints {
                log_group: None,
                observed_function: Some("checkout-handler".into()),
            },
        );
        let log_query = queries.iter().find(|q| q.tool_name == "logs_query").unwrap();
        assert_eq!(log_query.parameters["log_group"], "/aws/lambda/checkout-handler");

        // With no hints, the configured default applies.
        let queries = planner.plan(
            &hypothesis("error rate spike in checkout"),
            None,
            &PlannerHints::default(),
        );
        let log_query = queries.iter().find(|q| q.tool_name == "logs_query").unwrap();
        assert_eq!(log_query.parameters["log_group"], "/demo/app-logs");
    }

    #[test]
    fn test_explicit_log_group_not_overwritten() {
        let planner = CausalQueryPlanner::new(all_tools());
        let queries = planner.plan(
            &hypothesis("error rate spike"),
            None,
            &PlannerHints {
                log_group: Some("/services/checkout".into()),
                observed_function: Some("other-function".into()),
            },
        );
        let log_query = queries.iter().find(|q| q.tool_name == "logs_query").unwrap();
        assert_eq!(log_query.parameters["log_group"], "/services/checkout");
    }

    #[test]
    fn test_too_broad_detection() {
        assert!(is_too_broad(&json!({})));
        assert!(is_too_broad(&json!({"metric": "latency_p99"})));
        assert!(!is_too_broad(&json!({"service": "checkout-api"})));
        assert!(!is_too_broad(&json!({"filter_pattern": "ERROR"})));
    }
}
