//! Hypothesis-driven investigation engine

pub mod machine;
pub mod model;
pub mod parse;
pub mod planner;
pub mod scorer;

pub use machine::{InvestigationEvent, InvestigationStateMachine, StateMachineConfig};
pub use model::{
    CausalQuery, Conclusion, ConfidenceLevel, EvaluationAction, EvidenceEvaluation, EvidenceLink,
    EvidenceStrength, Hypothesis, HypothesisCategory, HypothesisSeed, HypothesisStatus,
    InvestigationPhase, InvestigationState, PhaseTransition, QueryType, RemediationPlan,
    RemediationStep, RiskLevel, Severity, StepStatus, TriageResult,
};
pub use planner::{CausalQueryPlanner, PlannerHints};
pub use scorer::{confidence_level, compute_confidence, EvidenceScorer, EvidenceSignals};
