//! LLM output handling for the ops-agents investigation engine

pub mod extract;
pub mod mock;

pub use extract::{extract_json, extract_json_array, extract_json_as};
pub use mock::{MockCall, MockLLMClient};

pub use ops_agents_core::{ChatChunk, ChatRequest, ChatResponse, LLMClient, LLMError};
