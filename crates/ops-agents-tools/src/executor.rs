//! Concurrency-limited batch execution with per-call timeouts

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use ops_agents_core::{Tool, ToolCall, ToolResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelExecutorConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_max_concurrent() -> usize {
    5
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl Default for ParallelExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// One finished call, attributed back to its batch and original call id so
/// completion order can differ from dispatch order without losing track.
#[derive(Debug, Clone)]
pub struct ExecutedCall {
    pub batch_id: String,
    pub call_id: String,
    pub tool_name: String,
    pub arguments: Value,
    pub result: ToolResult,
    pub duration_ms: u64,
    pub timed_out: bool,
}

pub struct ParallelExecutor {
    config: ParallelExecutorConfig,
}

impl ParallelExecutor {
    pub fn new(config: ParallelExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ParallelExecutorConfig {
        &self.config
    }

    /// Run a batch with bounded concurrency. Results come back in completion
    /// order. Cancellation stops dispatch and interrupts in-flight calls;
    /// already-completed results are preserved.
    pub async fn execute_batch(
        &self,
        calls: Vec<(ToolCall, Arc<dyn Tool>)>,
        cancel: &CancellationToken,
    ) -> Vec<ExecutedCall> {
        let batch_id = uuid::Uuid::new_v4().to_string();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent));
        let timeout = Duration::from_millis(self.config.timeout_ms);

        let mut join_set = JoinSet::new();
        for (call, tool) in calls {
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let batch_id = batch_id.clone();
            join_set.spawn(async move {
                // Closed only if the executor were dropped mid-batch.
                let Ok(_permit) = semaphore.acquire().await else {
                    return cancelled_call(batch_id, call);
                };
                if cancel.is_cancelled() {
                    return cancelled_call(batch_id, call);
                }
                run_one(batch_id, call, tool, timeout, cancel).await
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(executed) => results.push(executed),
                Err(e) => warn!(error = %e, "tool task failed to join"),
            }
        }
        results
    }

    /// Heuristic dependency grouping: calls that touch the same resource run
    /// sequentially within their group while distinct groups run in
    /// parallel.
    pub fn group_by_resource(
        &self,
        calls: Vec<(ToolCall, Arc<dyn Tool>)>,
    ) -> Vec<Vec<(ToolCall, Arc<dyn Tool>)>> {
        let mut groups: Vec<(String, Vec<(ToolCall, Arc<dyn Tool>)>)> = Vec::new();
        for (call, tool) in calls {
            let signature = resource_signature(&call);
            match groups.iter_mut().find(|(sig, _)| *sig == signature) {
                Some((_, group)) => group.push((call, tool)),
                None => groups.push((signature, vec![(call, tool)])),
            }
        }
        groups.into_iter().map(|(_, group)| group).collect()
    }

    /// Grouped execution: one task per group, sequential inside the group,
    /// the per-call concurrency bound still applies across groups. When no
    /// calls share a resource, this is a plain bounded batch.
    pub async fn execute_grouped(
        &self,
        calls: Vec<(ToolCall, Arc<dyn Tool>)>,
        cancel: &CancellationToken,
    ) -> Vec<ExecutedCall> {
        let total = calls.len();
        let groups = self.group_by_resource(calls);
        if groups.len() == total {
            let flat: Vec<(ToolCall, Arc<dyn Tool>)> = groups.into_iter().flatten().collect();
            return self.execute_batch(flat, cancel).await;
        }
        debug!(groups = groups.len(), "dispatching grouped batch");

        let batch_id = uuid::Uuid::new_v4().to_string();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent));
        let timeout = Duration::from_millis(self.config.timeout_ms);

        let mut join_set = JoinSet::new();
        for group in groups {
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let batch_id = batch_id.clone();
            join_set.spawn(async move {
                let mut completed = Vec::new();
                for (call, tool) in group {
                    let Ok(_permit) = semaphore.acquire().await else {
                        completed.push(cancelled_call(batch_id.clone(), call));
                        continue;
                    };
                    if cancel.is_cancelled() {
                        completed.push(cancelled_call(batch_id.clone(), call));
                        continue;
                    }
                    completed
                        .push(run_one(batch_id.clone(), call, tool, timeout, cancel.clone()).await);
                }
                completed
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(group_results) => results.extend(group_results),
                Err(e) => warn!(error = %e, "tool group task failed to join"),
            }
        }
        results
    }
}

impl Default for ParallelExecutor {
    fn default() -> Self {
        Self::new(ParallelExecutorConfig::default())
    }
}

async fn run_one(
    batch_id: String,
    call: ToolCall,
    tool: Arc<dyn Tool>,
    timeout: Duration,
    cancel: CancellationToken,
) -> ExecutedCall {
    let started = Instant::now();
    let outcome = tokio::select! {
        _ = cancel.cancelled() => None,
        result = tokio::time::timeout(timeout, tool.execute(call.arguments.clone())) => Some(result),
    };
    let duration_ms = started.elapsed().as_millis() as u64;

    match outcome {
        None => ExecutedCall {
            batch_id,
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            arguments: call.arguments,
            result: ToolResult::error("cancelled"),
            duration_ms,
            timed_out: false,
        },
        Some(Err(_elapsed)) => ExecutedCall {
            batch_id,
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            arguments: call.arguments,
            result: ToolResult::error(format!("timed out after {}ms", timeout.as_millis())),
            duration_ms,
            timed_out: true,
        },
        Some(Ok(result)) => ExecutedCall {
            batch_id,
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            arguments: call.arguments,
            result,
            duration_ms,
            timed_out: false,
        },
    }
}

fn cancelled_call(batch_id: String, call: ToolCall) -> ExecutedCall {
    ExecutedCall {
        batch_id,
        call_id: call.id.clone(),
        tool_name: call.name.clone(),
        arguments: call.arguments,
        result: ToolResult::error("cancelled"),
        duration_ms: 0,
        timed_out: false,
    }
}

const RESOURCE_ARG_KEYS: &[&str] = &[
    "service",
    "services",
    "log_group",
    "cluster",
    "namespace",
    "region",
];

fn resource_signature(call: &ToolCall) -> String {
    let mut parts = vec![call.name.clone()];
    if let Value::Object(map) = &call.arguments {
        let mut resource_values: Vec<String> = map
            .iter()
            .filter(|(k, _)| RESOURCE_ARG_KEYS.contains(&k.as_str()))
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        resource_values.sort();
        parts.extend(resource_values);
    }
    parts.join("|")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SleepTool {
        sleep_ms: u64,
        in_flight: Arc<AtomicUsize>,
        max_observed: Arc<AtomicUsize>,
    }

    impl SleepTool {
        fn new(sleep_ms: u64) -> Self {
            Self {
                sleep_ms,
                in_flight: Arc::new(AtomicUsize::new(0)),
                max_observed: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl Tool for SleepTool {
        fn name(&self) -> &str {
            "sleep_tool"
        }

        fn description(&self) -> &str {
            "sleeps then returns"
        }

        fn parameters(&self) -> Value {
            json!({"type": "object"})
        }

        async fn execute(&self, args: Value) -> ToolResult {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_observed.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(self.sleep_ms)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            ToolResult::ok(args)
        }
    }

    fn call(n: usize) -> ToolCall {
        ToolCall::new("sleep_tool", json!({"n": n}))
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_bound() {
        let executor = ParallelExecutor::new(ParallelExecutorConfig {
            max_concurrent: 3,
            timeout_ms: 5_000,
        });
        let tool = Arc::new(SleepTool::new(20));
        let calls: Vec<_> = (0..10)
            .map(|n| (call(n), Arc::clone(&tool) as Arc<dyn Tool>))
            .collect();

        let results = executor
            .execute_batch(calls, &CancellationToken::new())
            .await;

        assert_eq!(results.len(), 10);
        assert!(tool.max_observed.load(Ordering::SeqCst) <= 3);
        assert!(results.iter().all(|r| !r.timed_out));
    }

    #[tokio::test]
    async fn test_timeout_bounded_and_flagged() {
        let executor = ParallelExecutor::new(ParallelExecutorConfig {
            max_concurrent: 3,
            timeout_ms: 100,
        });
        let fast = Arc::new(SleepTool::new(10));
        let slow = Arc::new(SleepTool::new(500));

        let calls: Vec<(ToolCall, Arc<dyn Tool>)> = vec![
            (call(0), Arc::clone(&fast) as Arc<dyn Tool>),
            (call(1), Arc::clone(&slow) as Arc<dyn Tool>),
            (call(2), Arc::clone(&fast) as Arc<dyn Tool>),
        ];

        let started = Instant::now();
        let results = executor
            .execute_batch(calls, &CancellationToken::new())
            .await;
        let elapsed = started.elapsed();

        assert_eq!(results.len(), 3);
        assert!(elapsed < Duration::from_millis(250));

        let timed_out: Vec<_> = results.iter().filter(|r| r.timed_out).collect();
        assert_eq!(timed_out.len(), 1);
        assert!(timed_out[0]
            .result
            .error
            .as_ref()
            .unwrap()
            .contains("timed out"));
    }

    #[tokio::test]
    async fn test_results_carry_batch_and_call_ids() {
        let executor = ParallelExecutor::default();
        let tool = Arc::new(SleepTool::new(1));
        let original = call(7);
        let original_id = original.id.clone();

        let results = executor
            .execute_batch(
                vec![(original, Arc::clone(&tool) as Arc<dyn Tool>)],
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(results[0].call_id, original_id);
        assert!(!results[0].batch_id.is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_preserves_completed() {
        let executor = ParallelExecutor::new(ParallelExecutorConfig {
            max_concurrent: 1,
            timeout_ms: 5_000,
        });
        let tool = Arc::new(SleepTool::new(50));
        let calls: Vec<_> = (0..4)
            .map(|n| (call(n), Arc::clone(&tool) as Arc<dyn Tool>))
            .collect();

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(75)).await;
            canceller.cancel();
        });

        let results = executor.execute_batch(calls, &cancel).await;
        assert_eq!(results.len(), 4);

        let completed = results.iter().filter(|r| r.result.success).count();
        let cancelled = results
            .iter()
            .filter(|r| r.result.error.as_deref() == Some("cancelled"))
            .count();
        assert!(completed >= 1);
        assert!(cancelled >= 1);
        assert_eq!(completed + cancelled, 4);
    }

    #[tokio::test]
    async fn test_grouping_by_resource_signature() {
        let executor = ParallelExecutor::default();
        let tool = Arc::new(SleepTool::new(1));

        let calls: Vec<(ToolCall, Arc<dyn Tool>)> = vec![
            (
                ToolCall::new("logs_query", json!({"service": "api", "filter": "ERROR"})),
                Arc::clone(&tool) as Arc<dyn Tool>,
            ),
            (
                ToolCall::new("logs_query", json!({"filter": "WARN", "service": "api"})),
                Arc::clone(&tool) as Arc<dyn Tool>,
            ),
            (
                ToolCall::new("logs_query", json!({"service": "worker"})),
                Arc::clone(&tool) as Arc<dyn Tool>,
            ),
        ];

        let groups = executor.group_by_resource(calls);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[1].len(), 1);
    }

    #[tokio::test]
    async fn test_grouped_execution_runs_all() {
        let executor = ParallelExecutor::default();
        let tool = Arc::new(SleepTool::new(1));
        let calls: Vec<(ToolCall, Arc<dyn Tool>)> = (0..3)
            .map(|n| {
                (
                    ToolCall::new("logs_query", json!({"service": format!("svc-{n}")})),
                    Arc::clone(&tool) as Arc<dyn Tool>,
                )
            })
            .collect();

        let results = executor
            .execute_grouped(calls, &CancellationToken::new())
            .await;
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.result.success));
    }

    #[tokio::test]
    async fn test_same_resource_calls_run_sequentially() {
        let executor = ParallelExecutor::new(ParallelExecutorConfig {
            max_concurrent: 4,
            timeout_ms: 5_000,
        });
        let tool = Arc::new(SleepTool::new(20));
        let calls: Vec<(ToolCall, Arc<dyn Tool>)> = (0..4)
            .map(|n| {
                (
                    ToolCall::new("logs_query", json!({"service": "checkout-api", "n": n})),
                    Arc::clone(&tool) as Arc<dyn Tool>,
                )
            })
            .collect();

        let results = executor
            .execute_grouped(calls, &CancellationToken::new())
            .await;

        // One shared resource signature: the group runs one call at a time
        // even though the concurrency bound would allow all four at once.
        assert_eq!(results.len(), 4);
        assert_eq!(tool.max_observed.load(Ordering::SeqCst), 1);
    }
}
