//! Mock LLM client for testing

use parking_lot::RwLock;
use std::sync::Arc;

use async_trait::async_trait;

use ops_agents_core::{ChatRequest, ChatResponse, LLMClient, LLMError};

/// Scripted client: returns queued responses in order, records every call.
#[derive(Clone)]
pub struct MockLLMClient {
    inner: Arc<RwLock<MockLLMClientInner>>,
}

struct MockLLMClientInner {
    responses: Vec<ChatResponse>,
    response_index: usize,
    cycle_responses: bool,
    call_history: Vec<MockCall>,
    should_error: bool,
    error_message: String,
    latency_ms: u64,
}

#[derive(Debug, Clone)]
pub struct MockCall {
    pub request: ChatRequest,
    pub timestamp: std::time::Instant,
}

impl MockLLMClient {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(MockLLMClientInner {
                responses: Vec::new(),
                response_index: 0,
                cycle_responses: false,
                call_history: Vec::new(),
                should_error: false,
                error_message: "Mock error".to_string(),
                latency_ms: 0,
            })),
        }
    }

    pub fn add_response(&self, response: ChatResponse) {
        self.inner.write().responses.push(response);
    }

    pub fn add_text(&self, content: impl Into<String>) {
        self.add_response(ChatResponse::text(content));
    }

    pub fn set_responses(&self, responses: Vec<ChatResponse>, cycle: bool) {
        let mut inner = self.inner.write();
        inner.responses = responses;
        inner.response_index = 0;
        inner.cycle_responses = cycle;
    }

    pub fn set_error(&self, error_message: impl Into<String>) {
        let mut inner = self.inner.write();
        inner.should_error = true;
        inner.error_message = error_message.into();
    }

    pub fn clear_error(&self) {
        self.inner.write().should_error = false;
    }

    pub fn set_latency(&self, latency_ms: u64) {
        self.inner.write().latency_ms = latency_ms;
    }

    pub fn call_count(&self) -> usize {
        self.inner.read().call_history.len()
    }

    pub fn call_history(&self) -> Vec<MockCall> {
        self.inner.read().call_history.clone()
    }

    pub fn last_call(&self) -> Option<MockCall> {
        self.inner.read().call_history.last().cloned()
    }

    pub fn reset(&self) {
        let mut inner = self.inner.write();
        inner.responses.clear();
        inner.response_index = 0;
        inner.cycle_responses = false;
        inner.call_history.clear();
        inner.should_error = false;
        inner.error_message = "Mock error".to_string();
        inner.latency_ms = 0;
    }

    fn next_response(&self) -> ChatResponse {
        let mut inner = self.inner.write();

        if inner.responses.is_empty() {
            return ChatResponse::text("Mock response");
        }

        let response = inner.responses[inner.response_index].clone();
        if inner.cycle_responses {
            inner.response_index = (inner.response_index + 1) % inner.responses.len();
        } else if inner.response_index < inner.responses.len() - 1 {
            inner.response_index += 1;
        }
        response
    }

    fn record_call(&self, request: &ChatRequest) {
        self.inner.write().call_history.push(MockCall {
            request: request.clone(),
            timestamp: std::time::Instant::now(),
        });
    }

    async fn simulate_latency(&self) {
        let latency_ms = self.inner.read().latency_ms;
        if latency_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(latency_ms)).await;
        }
    }
}

impl Default for MockLLMClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LLMClient for MockLLMClient {
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, LLMError> {
        self.record_call(&request);
        self.simulate_latency().await;

        if self.inner.read().should_error {
            let error_message = self.inner.read().error_message.clone();
            return Err(LLMError::Other(error_message));
        }

        Ok(self.next_response())
    }

    fn client_name(&self) -> &str {
        "mock"
    }
}
