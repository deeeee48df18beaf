//! Chat-model port

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::traits::tool::ToolInfo;
use crate::types::ToolCall;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolInfo>,
}

impl ChatRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            tools: Vec::new(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolInfo>) -> Self {
        self.tools = tools;
        self
    }
}

/// Tool calls returned here are proposals; executing them is the caller's
/// responsibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
}

impl ChatResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
            thinking: None,
        }
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    pub fn with_thinking(mut self, thinking: impl Into<String>) -> Self {
        self.thinking = Some(thinking.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatChunk {
    Text { text: String },
    ToolCall { call: ToolCall },
    Thinking { text: String },
    Done {},
}

pub type ChatStream =
    Box<dyn futures::Stream<Item = std::result::Result<ChatChunk, LLMError>> + Unpin + Send>;

#[derive(Debug, Error)]
pub enum LLMError {
    #[error("API error: {message}")]
    Api {
        message: String,
        status: Option<u16>,
    },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {retry_after:?}")]
    RateLimit {
        retry_after: Option<std::time::Duration>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<serde_json::Error> for LLMError {
    fn from(err: serde_json::Error) -> Self {
        LLMError::Serialization(err.to_string())
    }
}

#[async_trait]
pub trait LLMClient: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> std::result::Result<ChatResponse, LLMError>;

    /// Lazy finite chunk sequence. The default adapter materializes `chat`
    /// into text / tool-call / thinking chunks followed by `Done`.
    async fn chat_stream(&self, request: ChatRequest) -> std::result::Result<ChatStream, LLMError> {
        let response = self.chat(request).await?;
        let mut chunks = Vec::new();
        if let Some(thinking) = response.thinking {
            chunks.push(Ok(ChatChunk::Thinking { text: thinking }));
        }
        if !response.content.is_empty() {
            chunks.push(Ok(ChatChunk::Text {
                text: response.content,
            }));
        }
        for call in response.tool_calls {
            chunks.push(Ok(ChatChunk::ToolCall { call }));
        }
        chunks.push(Ok(ChatChunk::Done {}));
        Ok(Box::new(futures::stream::iter(chunks)))
    }

    fn client_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    struct FixedClient;

    #[async_trait]
    impl LLMClient for FixedClient {
        async fn chat(&self, _request: ChatRequest) -> std::result::Result<ChatResponse, LLMError> {
            Ok(ChatResponse::text("done looking")
                .with_thinking("checking the alarms first")
                .with_tool_calls(vec![ToolCall::new(
                    "alarms_query",
                    serde_json::json!({"service": "checkout-api"}),
                )]))
        }

        fn client_name(&self) -> &str {
            "fixed"
        }
    }

    #[tokio::test]
    async fn test_default_stream_adapter_is_finite() {
        let client = FixedClient;
        let mut stream = client
            .chat_stream(ChatRequest::new("system", "user"))
            .await
            .unwrap();

        let mut kinds = Vec::new();
        while let Some(chunk) = stream.next().await {
            kinds.push(chunk.unwrap());
        }
        assert_eq!(kinds.len(), 4);
        assert!(matches!(kinds[0], ChatChunk::Thinking { .. }));
        assert!(matches!(kinds[1], ChatChunk::Text { .. }));
        assert!(matches!(kinds[2], ChatChunk::ToolCall { .. }));
        assert!(matches!(kinds[3], ChatChunk::Done {}));
    }

    #[test]
    fn test_chunk_serde_tags() {
        let chunk = ChatChunk::Text {
            text: "hello".into(),
        };
        let json = serde_json::to_string(&chunk).unwrap();
        assert!(json.contains("\"type\":\"text\""));
    }
}
