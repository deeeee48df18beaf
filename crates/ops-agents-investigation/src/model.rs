//! Investigation data model

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use ops_agents_core::TimeWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HypothesisCategory {
    Infrastructure,
    Application,
    Dependency,
    Configuration,
    Capacity,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceStrength {
    Strong,
    Weak,
    None,
    Contradicting,
    #[default]
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HypothesisStatus {
    #[default]
    Pending,
    Investigating,
    Confirmed,
    Pruned,
}

/// A testable statement about the root cause. Nodes form a tree through
/// `parent_id`/`children` id links; the flat list in `InvestigationState`
/// is the arena.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hypothesis {
    pub id: String,
    pub statement: String,
    pub category: HypothesisCategory,
    /// 1 is highest.
    pub priority: u8,
    pub confirming_evidence: String,
    pub refuting_evidence: String,
    #[serde(default)]
    pub queries: Vec<CausalQuery>,
    #[serde(default)]
    pub query_results: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub confidence: u8,
    #[serde(default)]
    pub evidence_strength: EvidenceStrength,
    #[serde(default)]
    pub status: HypothesisStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub children: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The model-proposed part of a hypothesis, before the machine assigns an
/// id and position in the tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HypothesisSeed {
    pub statement: String,
    #[serde(default)]
    pub category: HypothesisCategory,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub confirming_evidence: String,
    #[serde(default)]
    pub refuting_evidence: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

fn default_priority() -> u8 {
    3
}

impl HypothesisSeed {
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            category: HypothesisCategory::Unknown,
            priority: default_priority(),
            confirming_evidence: String::new(),
            refuting_evidence: String::new(),
            reasoning: None,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.clamp(1, 5);
        self
    }

    pub fn with_category(mut self, category: HypothesisCategory) -> Self {
        self.category = category;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TriageResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident_id: Option<String>,
    pub summary: String,
    #[serde(default)]
    pub affected_services: Vec<String>,
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub error_messages: Vec<String>,
    #[serde(default)]
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_window: Option<TimeWindow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_knowledge: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    #[default]
    Exploratory,
    Confirming,
    Refuting,
}

/// A planned tool invocation chosen to confirm or refute one hypothesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CausalQuery {
    pub id: String,
    pub hypothesis_id: String,
    pub query_type: QueryType,
    pub tool_name: String,
    #[serde(default)]
    pub parameters: Value,
    pub expected_outcome: String,
    pub relevance_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationAction {
    Branch,
    Prune,
    Confirm,
    #[default]
    Continue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceEvaluation {
    pub hypothesis_id: String,
    #[serde(default)]
    pub evidence_strength: EvidenceStrength,
    #[serde(default)]
    pub confidence: u8,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub action: EvaluationAction,
    #[serde(default)]
    pub findings: Vec<String>,
    /// Sub-hypotheses to add when `action` is `Branch`.
    #[serde(default)]
    pub branch_hypotheses: Vec<HypothesisSeed>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    High,
    Medium,
    #[default]
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceLink {
    pub finding: String,
    pub source: String,
    pub strength: EvidenceStrength,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conclusion {
    pub root_cause: String,
    #[serde(default)]
    pub confidence: ConfidenceLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_hypothesis_id: Option<String>,
    #[serde(default)]
    pub affected_services: Vec<String>,
    #[serde(default)]
    pub evidence_chain: Vec<EvidenceLink>,
    #[serde(default)]
    pub alternative_explanations: Vec<String>,
    #[serde(default)]
    pub unknowns: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Approved,
    Executing,
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationStep {
    pub id: String,
    pub action: String,
    #[serde(default)]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback_command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_reference: Option<String>,
    #[serde(default)]
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub requires_approval: bool,
    #[serde(default)]
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matching_skill: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matching_runbook: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RemediationPlan {
    #[serde(default)]
    pub steps: Vec<RemediationStep>,
}

impl RemediationPlan {
    pub fn step_mut(&mut self, step_id: &str) -> Option<&mut RemediationStep> {
        self.steps.iter_mut().find(|s| s.id == step_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InvestigationPhase {
    #[default]
    Idle,
    Triage,
    Hypothesize,
    Investigate,
    Evaluate,
    Conclude,
    Remediate,
    Complete,
}

impl InvestigationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvestigationPhase::Idle => "idle",
            InvestigationPhase::Triage => "triage",
            InvestigationPhase::Hypothesize => "hypothesize",
            InvestigationPhase::Investigate => "investigate",
            InvestigationPhase::Evaluate => "evaluate",
            InvestigationPhase::Conclude => "conclude",
            InvestigationPhase::Remediate => "remediate",
            InvestigationPhase::Complete => "complete",
        }
    }

    pub fn can_transition_to(&self, next: InvestigationPhase) -> bool {
        use InvestigationPhase::*;
        matches!(
            (self, next),
            (Idle, Triage)
                | (Triage, Hypothesize)
                | (Triage, Conclude)
                | (Hypothesize, Investigate)
                | (Hypothesize, Conclude)
                | (Investigate, Evaluate)
                | (Evaluate, Investigate)
                | (Evaluate, Hypothesize)
                | (Evaluate, Conclude)
                | (Conclude, Remediate)
                | (Conclude, Complete)
                | (Remediate, Complete)
        )
    }
}

impl std::fmt::Display for InvestigationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: InvestigationPhase,
    pub to: InvestigationPhase,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate root owned by one state machine instance. Mutated only through
/// state-machine methods.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigationState {
    pub id: String,
    pub query: String,
    pub phase: InvestigationPhase,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub triage: Option<TriageResult>,
    #[serde(default)]
    pub hypotheses: Vec<Hypothesis>,
    #[serde(default)]
    pub roots: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_hypothesis_id: Option<String>,
    #[serde(default)]
    pub evaluations: Vec<EvidenceEvaluation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conclusion: Option<Conclusion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation_plan: Option<RemediationPlan>,
    #[serde(default)]
    pub phase_history: Vec<PhaseTransition>,
    #[serde(default)]
    pub iterations: u32,
    pub max_iterations: u32,
    #[serde(default)]
    pub tool_call_count: u32,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        use InvestigationPhase::*;
        assert!(Idle.can_transition_to(Triage));
        assert!(Triage.can_transition_to(Hypothesize));
        assert!(Triage.can_transition_to(Conclude));
        assert!(Evaluate.can_transition_to(Investigate));
        assert!(Evaluate.can_transition_to(Hypothesize));
        assert!(Conclude.can_transition_to(Remediate));
        assert!(Remediate.can_transition_to(Complete));

        assert!(!Idle.can_transition_to(Evaluate));
        assert!(!Investigate.can_transition_to(Conclude));
        assert!(!Complete.can_transition_to(Triage));
        assert!(!Remediate.can_transition_to(Investigate));
    }

    #[test]
    fn test_enum_serde_forms() {
        assert_eq!(
            serde_json::to_string(&EvidenceStrength::Contradicting).unwrap(),
            "\"contradicting\""
        );
        assert_eq!(
            serde_json::to_string(&EvaluationAction::Prune).unwrap(),
            "\"prune\""
        );
        assert_eq!(
            serde_json::to_string(&InvestigationPhase::Hypothesize).unwrap(),
            "\"hypothesize\""
        );
        let severity: Severity = serde_json::from_str("\"critical\"").unwrap();
        assert_eq!(severity, Severity::Critical);
    }

    #[test]
    fn test_seed_priority_clamped() {
        let seed = HypothesisSeed::new("pool exhausted").with_priority(9);
        assert_eq!(seed.priority, 5);
        let seed = HypothesisSeed::new("pool exhausted").with_priority(0);
        assert_eq!(seed.priority, 1);
    }

    #[test]
    fn test_query_results_serialize_sorted() {
        let mut results = BTreeMap::new();
        results.insert("q_h_1_2".to_string(), Value::from(2));
        results.insert("q_h_1_1".to_string(), Value::from(1));

        let json = serde_json::to_string(&results).unwrap();
        let pos_1 = json.find("q_h_1_1").unwrap();
        let pos_2 = json.find("q_h_1_2").unwrap();
        assert!(pos_1 < pos_2);
    }
}
