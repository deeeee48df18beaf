use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use ops_agents_core::CompactToolResult;

/// One line of the session log. The on-disk file is newline-delimited JSON,
/// one entry per line, `{type, timestamp, ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScratchpadEntry {
    Init {
        timestamp: DateTime<Utc>,
        session_id: String,
        query: String,
    },
    Thinking {
        timestamp: DateTime<Utc>,
        text: String,
    },
    ToolResult {
        timestamp: DateTime<Utc>,
        result_id: String,
        tool_name: String,
        arguments: Value,
        output: Value,
        compact: CompactToolResult,
    },
    HypothesisFormed {
        timestamp: DateTime<Utc>,
        hypothesis_id: String,
        statement: String,
    },
    HypothesisPruned {
        timestamp: DateTime<Utc>,
        hypothesis_id: String,
        reason: String,
    },
    HypothesisConfirmed {
        timestamp: DateTime<Utc>,
        hypothesis_id: String,
        confidence: u8,
    },
    EvidenceGathered {
        timestamp: DateTime<Utc>,
        hypothesis_id: String,
        strength: String,
        summary: String,
    },
    RemediationPlanned {
        timestamp: DateTime<Utc>,
        step_count: usize,
    },
    RemediationStepUpdated {
        timestamp: DateTime<Utc>,
        step_id: String,
        status: String,
    },
}

impl ScratchpadEntry {
    pub fn init(session_id: impl Into<String>, query: impl Into<String>) -> Self {
        ScratchpadEntry::Init {
            timestamp: Utc::now(),
            session_id: session_id.into(),
            query: query.into(),
        }
    }

    pub fn thinking(text: impl Into<String>) -> Self {
        ScratchpadEntry::Thinking {
            timestamp: Utc::now(),
            text: text.into(),
        }
    }

    pub fn hypothesis_formed(hypothesis_id: impl Into<String>, statement: impl Into<String>) -> Self {
        ScratchpadEntry::HypothesisFormed {
            timestamp: Utc::now(),
            hypothesis_id: hypothesis_id.into(),
            statement: statement.into(),
        }
    }

    pub fn hypothesis_pruned(hypothesis_id: impl Into<String>, reason: impl Into<String>) -> Self {
        ScratchpadEntry::HypothesisPruned {
            timestamp: Utc::now(),
            hypothesis_id: hypothesis_id.into(),
            reason: reason.into(),
        }
    }

    pub fn hypothesis_confirmed(hypothesis_id: impl Into<String>, confidence: u8) -> Self {
        ScratchpadEntry::HypothesisConfirmed {
            timestamp: Utc::now(),
            hypothesis_id: hypothesis_id.into(),
            confidence,
        }
    }

    pub fn evidence_gathered(
        hypothesis_id: impl Into<String>,
        strength: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        ScratchpadEntry::EvidenceGathered {
            timestamp: Utc::now(),
            hypothesis_id: hypothesis_id.into(),
            strength: strength.into(),
            summary: summary.into(),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ScratchpadEntry::Init { timestamp, .. }
            | ScratchpadEntry::Thinking { timestamp, .. }
            | ScratchpadEntry::ToolResult { timestamp, .. }
            | ScratchpadEntry::HypothesisFormed { timestamp, .. }
            | ScratchpadEntry::HypothesisPruned { timestamp, .. }
            | ScratchpadEntry::HypothesisConfirmed { timestamp, .. }
            | ScratchpadEntry::EvidenceGathered { timestamp, .. }
            | ScratchpadEntry::RemediationPlanned { timestamp, .. }
            | ScratchpadEntry::RemediationStepUpdated { timestamp, .. } => *timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_serde_tag() {
        let entry = ScratchpadEntry::thinking("narrowing to the checkout service");
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"type\":\"thinking\""));
        assert!(json.contains("timestamp"));

        let back: ScratchpadEntry = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, ScratchpadEntry::Thinking { .. }));
    }

    #[test]
    fn test_timestamp_accessor() {
        let entry = ScratchpadEntry::hypothesis_confirmed("h_1", 85);
        assert!(entry.timestamp() <= Utc::now());
    }
}
