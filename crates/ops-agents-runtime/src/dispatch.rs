//! Shared tool dispatch: cache, parallel execution, summarize, store
//!
//! Both loops funnel tool calls through here so cache hits, events, and
//! scratchpad bookkeeping behave identically.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use ops_agents_core::{AgentEvent, ToolCall, ToolResult};
use ops_agents_scratchpad::Scratchpad;
use ops_agents_tools::{
    ParallelExecutor, SummarizerRegistry, ToolCache, ToolRegistry,
};

use crate::events::EventBus;

#[derive(Debug, Clone)]
pub struct DispatchedCall {
    pub call: ToolCall,
    pub result: ToolResult,
    pub result_id: Option<String>,
    pub from_cache: bool,
    pub duration_ms: u64,
    pub timed_out: bool,
}

pub struct ToolDispatcher {
    registry: ToolRegistry,
    cache: Option<Arc<ToolCache>>,
    executor: Arc<ParallelExecutor>,
    summarizers: Arc<SummarizerRegistry>,
    pad: Arc<Scratchpad>,
    events: EventBus,
}

impl ToolDispatcher {
    pub fn new(
        registry: ToolRegistry,
        cache: Option<Arc<ToolCache>>,
        executor: Arc<ParallelExecutor>,
        summarizers: Arc<SummarizerRegistry>,
        pad: Arc<Scratchpad>,
        events: EventBus,
    ) -> Self {
        Self {
            registry,
            cache,
            executor,
            summarizers,
            pad,
            events,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn pad(&self) -> &Arc<Scratchpad> {
        &self.pad
    }

    pub fn cache(&self) -> Option<&Arc<ToolCache>> {
        self.cache.as_ref()
    }

    /// Run a set of calls: cache first, then a bounded parallel batch with
    /// same-resource calls serialized inside their group. Successful fresh
    /// results are summarized, stored in the scratchpad, and written back
    /// to the cache. Results keep call attribution.
    pub async fn dispatch(
        &self,
        calls: Vec<ToolCall>,
        cancel: &CancellationToken,
    ) -> Vec<DispatchedCall> {
        let mut outcomes = Vec::new();
        let mut to_run = Vec::new();

        for call in calls {
            self.events.emit(AgentEvent::tool_start(
                call.id.clone(),
                call.name.clone(),
                call.arguments.clone(),
            ));

            if let Some(cache) = &self.cache {
                if let Some(result) = cache.get(&call.name, &call.arguments) {
                    self.events.emit(AgentEvent::tool_end(
                        call.id.clone(),
                        call.name.clone(),
                        0,
                        true,
                        None,
                    ));
                    outcomes.push(DispatchedCall {
                        call,
                        result,
                        result_id: None,
                        from_cache: true,
                        duration_ms: 0,
                        timed_out: false,
                    });
                    continue;
                }
            }

            match self.registry.get(&call.name) {
                Some(tool) => to_run.push((call, tool)),
                None => {
                    let error = format!("unknown tool: {}", call.name);
                    warn!(tool = %call.name, "planner requested an unregistered tool");
                    self.events.emit(AgentEvent::tool_error(
                        call.id.clone(),
                        call.name.clone(),
                        error.clone(),
                        false,
                    ));
                    outcomes.push(DispatchedCall {
                        call,
                        result: ToolResult::error(error),
                        result_id: None,
                        from_cache: false,
                        duration_ms: 0,
                        timed_out: false,
                    });
                }
            }
        }

        if to_run.is_empty() {
            return outcomes;
        }

        let executed = self.executor.execute_grouped(to_run, cancel).await;
        for executed_call in executed {
            let call = ToolCall {
                id: executed_call.call_id.clone(),
                name: executed_call.tool_name.clone(),
                arguments: executed_call.arguments.clone(),
            };

            if executed_call.result.is_error() {
                self.events.emit(AgentEvent::tool_error(
                    call.id.clone(),
                    call.name.clone(),
                    executed_call
                        .result
                        .error
                        .clone()
                        .unwrap_or_else(|| "tool failed".to_string()),
                    executed_call.timed_out,
                ));
            }

            let mut result_id = None;
            let compact = self.summarizers.summarize(&call.name, &executed_call.result);
            match self
                .pad
                .append_tool_result(&call, executed_call.result.output.clone(), compact)
            {
                Ok(id) => result_id = Some(id),
                Err(e) => warn!(error = %e, "failed to persist tool result"),
            }

            if !executed_call.result.is_error() {
                if let Some(cache) = &self.cache {
                    cache.set(&call.name, &call.arguments, &executed_call.result);
                }
                self.events.emit(AgentEvent::tool_end(
                    call.id.clone(),
                    call.name.clone(),
                    executed_call.duration_ms,
                    false,
                    result_id.clone(),
                ));
            }

            outcomes.push(DispatchedCall {
                call,
                result: executed_call.result,
                result_id,
                from_cache: false,
                duration_ms: executed_call.duration_ms,
                timed_out: executed_call.timed_out,
            });
        }

        outcomes
    }
}
