//! Engine assembly

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use ops_agents_context::{CompactorConfig, ContextCompactor};
use ops_agents_core::{
    AgentError, AgentEvent, KnowledgeRetriever, LLMClient, Result, RunSummary, Tool,
};
use ops_agents_scratchpad::{Scratchpad, ToolLimitConfig};
use ops_agents_tools::{
    FullResultTool, ParallelExecutor, SummarizerRegistry, ToolCache, ToolRegistry,
};

use crate::agent::ReactiveAgent;
use crate::config::RunConfig;
use crate::dispatch::ToolDispatcher;
use crate::events::EventBus;
use crate::orchestrator::{ApprovalHandler, Orchestrator, RejectAllHandler};

/// One assembled engine: the investigation orchestrator and the free-form
/// agent loop, sharing the session scratchpad, cache, executor, and event
/// bus.
pub struct OpsEngine {
    orchestrator: Arc<Orchestrator>,
    agent: Arc<ReactiveAgent>,
    events: EventBus,
}

impl std::fmt::Debug for OpsEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpsEngine").finish_non_exhaustive()
    }
}

impl OpsEngine {
    pub fn subscribe(&self) -> tokio::sync::mpsc::UnboundedReceiver<AgentEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub async fn investigate(
        &self,
        query: &str,
        incident_id: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<RunSummary> {
        self.orchestrator.investigate(query, incident_id, cancel).await
    }

    pub async fn ask(&self, query: &str, cancel: CancellationToken) -> Result<RunSummary> {
        self.agent.ask(query, cancel).await
    }

    /// Event-stream form of `investigate`: yields every event in order and
    /// finishes after `done`.
    pub fn investigate_stream(
        &self,
        query: impl Into<String>,
        incident_id: Option<String>,
        cancel: CancellationToken,
    ) -> impl futures::Stream<Item = AgentEvent> {
        let orchestrator = Arc::clone(&self.orchestrator);
        let mut rx = self.events.subscribe();
        let query = query.into();

        async_stream::stream! {
            let runner = tokio::spawn(async move {
                let _ = orchestrator
                    .investigate(&query, incident_id.as_deref(), cancel)
                    .await;
            });
            while let Some(event) = rx.recv().await {
                let done = event.is_done();
                yield event;
                if done {
                    break;
                }
            }
            let _ = runner.await;
        }
    }
}

pub struct EngineBuilder {
    llm: Option<Arc<dyn LLMClient>>,
    knowledge: Option<Arc<dyn KnowledgeRetriever>>,
    tools: ToolRegistry,
    approval: Option<Arc<dyn ApprovalHandler>>,
    config: RunConfig,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            llm: None,
            knowledge: None,
            tools: ToolRegistry::new(),
            approval: None,
            config: RunConfig::default(),
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LLMClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_knowledge(mut self, knowledge: Arc<dyn KnowledgeRetriever>) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn register_tool(mut self, tool: Arc<dyn Tool>) -> Result<Self> {
        self.tools
            .register(tool)
            .map_err(|e| AgentError::Config(e.to_string()))?;
        Ok(self)
    }

    pub fn with_approval_handler(mut self, handler: Arc<dyn ApprovalHandler>) -> Self {
        self.approval = Some(handler);
        self
    }

    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<OpsEngine> {
        let llm = self
            .llm
            .ok_or_else(|| AgentError::Config("an LLM client is required".into()))?;
        let config = self.config;

        let mut registry = if config.available_tools.is_empty() {
            self.tools
        } else {
            self.tools.filtered(&config.available_tools)
        };

        let full_result_tool = Arc::new(FullResultTool::new());
        registry
            .register(Arc::clone(&full_result_tool) as Arc<dyn Tool>)
            .map_err(|e| AgentError::Config(e.to_string()))?;

        let limits = ToolLimitConfig {
            caps: config.tool_limits.clone(),
            ..Default::default()
        };
        let pad = Arc::new(Scratchpad::create(&config.session_dir, limits)?);

        let cache = if config.cache.enabled {
            Some(Arc::new(ToolCache::new(config.cache.config.clone())))
        } else {
            None
        };

        let mut executor_config = config.parallel.config.clone();
        if !config.parallel.enabled {
            executor_config.max_concurrent = 1;
        }
        let executor = Arc::new(ParallelExecutor::new(executor_config));

        let summarizers = Arc::new(if config.enable_summarization {
            SummarizerRegistry::with_builtin_summarizers()
        } else {
            SummarizerRegistry::new()
        });

        let events = EventBus::new();
        let dispatcher = Arc::new(ToolDispatcher::new(
            registry,
            cache,
            executor,
            summarizers,
            Arc::clone(&pad),
            events.clone(),
        ));

        let approval = self
            .approval
            .unwrap_or_else(|| Arc::new(RejectAllHandler));

        let compactor_config = CompactorConfig {
            preset: config.compaction_preset,
            keep_tool_uses: config.keep_tool_uses,
        };

        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&llm),
            self.knowledge.clone(),
            Arc::clone(&dispatcher),
            ContextCompactor::new(compactor_config.clone()),
            Arc::clone(&full_result_tool),
            approval,
            config.clone(),
            events.clone(),
        ));

        let agent = Arc::new(ReactiveAgent::new(
            llm,
            self.knowledge,
            dispatcher,
            ContextCompactor::new(compactor_config),
            full_result_tool,
            config,
            events.clone(),
        ));

        Ok(OpsEngine {
            orchestrator,
            agent,
            events,
        })
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
