//! Orchestrator and reactive agent loop

mod agent;
mod builder;
mod compact;
mod config;
mod dispatch;
mod events;
mod orchestrator;
mod prompts;

pub use agent::ReactiveAgent;
pub use builder::{EngineBuilder, OpsEngine};
pub use config::{CacheToggle, ParallelToggle, RunConfig};
pub use dispatch::{DispatchedCall, ToolDispatcher};
pub use events::EventBus;
pub use orchestrator::{
    ApprovalHandler, ApproveAllHandler, Orchestrator, RejectAllHandler,
};

pub use ops_agents_core::{AgentEvent, RunSummary};
