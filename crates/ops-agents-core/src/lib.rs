//! Core types and ports for the ops-agents investigation engine

pub mod error;
pub mod event;
pub mod traits;
pub mod types;

pub use error::{AgentError, Result};
pub use event::{AgentEvent, RunSummary};
pub use traits::knowledge::{
    KnowledgeBundle, KnowledgeDoc, KnowledgeDocKind, KnowledgeRequest, KnowledgeRetriever,
};
pub use traits::llm::{ChatChunk, ChatRequest, ChatResponse, LLMClient, LLMError};
pub use traits::tool::{Tool, ToolInfo, ToolResult};
pub use types::{
    estimate_tokens, CompactToolResult, CompactionPlan, HealthStatus, TimeWindow, ToolCall,
    ToolResultTier,
};
