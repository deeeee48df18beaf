//! External event surface emitted during a run

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Terminal result payload carried by the `done` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: String,
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected_services: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation_plan: Option<Value>,
    pub summary: String,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn not_determined(id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            query: query.into(),
            root_cause: None,
            confidence: None,
            affected_services: Vec::new(),
            remediation_plan: None,
            summary: "Root cause: not determined".to_string(),
            duration_ms: 0,
        }
    }
}

/// Event stream surfaced to subscribers. Streams are finite and always end
/// with `Done`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    Init {
        session_id: String,
        query: String,
    },
    Thinking {
        text: String,
    },
    ToolStart {
        call_id: String,
        tool: String,
        arguments: Value,
    },
    ToolProgress {
        call_id: String,
        tool: String,
        message: String,
    },
    ToolEnd {
        call_id: String,
        tool: String,
        duration_ms: u64,
        from_cache: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        result_id: Option<String>,
    },
    ToolError {
        call_id: String,
        tool: String,
        error: String,
        timed_out: bool,
    },
    ToolLimit {
        tool: String,
        warning: String,
    },
    ContextCleared {
        kept_full: usize,
        compacted: usize,
        cleared: usize,
        estimated_tokens: usize,
    },
    KnowledgeRetrieved {
        runbooks: usize,
        postmortems: usize,
        known_issues: usize,
    },
    HypothesisFormed {
        id: String,
        statement: String,
    },
    HypothesisPruned {
        id: String,
        reason: String,
    },
    HypothesisConfirmed {
        id: String,
        confidence: u8,
    },
    EvidenceGathered {
        hypothesis_id: String,
        strength: String,
    },
    AnswerStart {},
    Done {
        result: RunSummary,
    },
}

impl AgentEvent {
    pub fn init(session_id: impl Into<String>, query: impl Into<String>) -> Self {
        AgentEvent::Init {
            session_id: session_id.into(),
            query: query.into(),
        }
    }

    pub fn thinking(text: impl Into<String>) -> Self {
        AgentEvent::Thinking { text: text.into() }
    }

    pub fn tool_start(call_id: impl Into<String>, tool: impl Into<String>, arguments: Value) -> Self {
        AgentEvent::ToolStart {
            call_id: call_id.into(),
            tool: tool.into(),
            arguments,
        }
    }

    pub fn tool_end(
        call_id: impl Into<String>,
        tool: impl Into<String>,
        duration_ms: u64,
        from_cache: bool,
        result_id: Option<String>,
    ) -> Self {
        AgentEvent::ToolEnd {
            call_id: call_id.into(),
            tool: tool.into(),
            duration_ms,
            from_cache,
            result_id,
        }
    }

    pub fn tool_error(
        call_id: impl Into<String>,
        tool: impl Into<String>,
        error: impl Into<String>,
        timed_out: bool,
    ) -> Self {
        AgentEvent::ToolError {
            call_id: call_id.into(),
            tool: tool.into(),
            error: error.into(),
            timed_out,
        }
    }

    pub fn tool_limit(tool: impl Into<String>, warning: impl Into<String>) -> Self {
        AgentEvent::ToolLimit {
            tool: tool.into(),
            warning: warning.into(),
        }
    }

    pub fn done(result: RunSummary) -> Self {
        AgentEvent::Done { result }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, AgentEvent::Done { .. })
    }

    pub fn is_tool_event(&self) -> bool {
        matches!(
            self,
            AgentEvent::ToolStart { .. }
                | AgentEvent::ToolProgress { .. }
                | AgentEvent::ToolEnd { .. }
                | AgentEvent::ToolError { .. }
                | AgentEvent::ToolLimit { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_tags() {
        let event = AgentEvent::tool_limit("aws_metrics", "suggested cap of 10 reached");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"tool_limit\""));
        assert!(json.contains("aws_metrics"));

        let event = AgentEvent::init("sess-1", "why is checkout slow");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"init\""));
    }

    #[test]
    fn test_done_predicate() {
        let done = AgentEvent::done(RunSummary::not_determined("inv-1", "q"));
        assert!(done.is_done());
        assert!(!AgentEvent::AnswerStart {}.is_done());
    }

    #[test]
    fn test_tool_event_predicate() {
        let start = AgentEvent::tool_start("c1", "logs_query", serde_json::json!({}));
        assert!(start.is_tool_event());
        assert!(!AgentEvent::thinking("hmm").is_tool_event());
    }

    #[test]
    fn test_event_round_trip() {
        let event = AgentEvent::tool_error("c9", "metrics_query", "timed out", true);
        let json = serde_json::to_string(&event).unwrap();
        let back: AgentEvent = serde_json::from_str(&json).unwrap();
        match back {
            AgentEvent::ToolError {
                timed_out, error, ..
            } => {
                assert!(timed_out);
                assert!(error.contains("timed out"));
            }
            _ => panic!("Expected ToolError"),
        }
    }
}
