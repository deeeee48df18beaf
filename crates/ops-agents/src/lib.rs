//! Agentic incident-investigation engine
//!
//! Given a free-form query or an incident id, the engine forms root-cause
//! hypotheses, tests them with observability queries, grades the evidence,
//! and concludes with a confidence-annotated root cause and an optional
//! remediation plan. Concrete tools, knowledge backends, and model
//! transports are injected through the ports in [`error`]'s sibling
//! modules.

pub mod engine {
    pub use ops_agents_runtime::{
        ApprovalHandler, ApproveAllHandler, EngineBuilder, EventBus, OpsEngine, Orchestrator,
        ReactiveAgent, RejectAllHandler, RunConfig, ToolDispatcher,
    };
}

pub mod error {
    pub use ops_agents_core::{AgentError, Result};
}

pub mod events {
    pub use ops_agents_core::{AgentEvent, RunSummary};
}

pub mod llm {
    pub use ops_agents_core::{
        ChatChunk, ChatRequest, ChatResponse, LLMClient, LLMError,
    };
    pub use ops_agents_llm::{extract_json, extract_json_array, extract_json_as, MockLLMClient};
}

pub mod knowledge {
    pub use ops_agents_core::{
        KnowledgeBundle, KnowledgeDoc, KnowledgeDocKind, KnowledgeRequest, KnowledgeRetriever,
    };
}

pub mod tools {
    pub use ops_agents_core::{Tool, ToolCall, ToolInfo, ToolResult};
    pub use ops_agents_tools::{
        generate_schema, is_cacheable, CacheStats, ExecutedCall, FullResultTool,
        ParallelExecutor, ParallelExecutorConfig, SummarizerRegistry, ToolCache,
        ToolCacheConfig, ToolRegistry, ToolSummarizer, NON_CACHEABLE_TOOLS,
    };
}

pub mod scratchpad {
    pub use ops_agents_scratchpad::{
        generate_session_id, GracefulLimits, LimitCheck, Scratchpad, ScratchpadEntry,
        StoredToolResult, ToolLimitConfig,
    };
}

pub mod context {
    pub use ops_agents_context::{
        CandidateResult, CompactionContext, CompactionOutcome, CompactionPreset,
        CompactionWeights, CompactorConfig, ContextCompactor,
    };
    pub use ops_agents_core::{estimate_tokens, CompactionPlan, ToolResultTier};
}

pub mod investigation {
    pub use ops_agents_investigation::{
        confidence_level, compute_confidence, CausalQuery, CausalQueryPlanner, Conclusion,
        ConfidenceLevel, EvaluationAction, EvidenceEvaluation, EvidenceLink, EvidenceScorer,
        EvidenceSignals, EvidenceStrength, Hypothesis, HypothesisCategory, HypothesisSeed,
        HypothesisStatus, InvestigationEvent, InvestigationPhase, InvestigationState,
        InvestigationStateMachine, PlannerHints, RemediationPlan, RemediationStep, RiskLevel,
        Severity, StateMachineConfig, StepStatus, TriageResult,
    };
}
