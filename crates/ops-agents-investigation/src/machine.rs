//! Phase state machine and hypothesis tree

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use ops_agents_core::{AgentError, Result};

use crate::model::{
    Conclusion, EvaluationAction, EvidenceEvaluation, Hypothesis, HypothesisSeed,
    HypothesisStatus, InvestigationPhase, InvestigationState, PhaseTransition, RemediationPlan,
    StepStatus, TriageResult,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateMachineConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_max_depth")]
    pub max_hypothesis_depth: usize,
    #[serde(default = "default_max_hypotheses")]
    pub max_hypotheses: usize,
}

fn default_max_iterations() -> u32 {
    20
}

fn default_max_depth() -> usize {
    4
}

fn default_max_hypotheses() -> usize {
    10
}

impl Default for StateMachineConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_hypothesis_depth: default_max_depth(),
            max_hypotheses: default_max_hypotheses(),
        }
    }
}

/// Events emitted by the machine, in mutation order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InvestigationEvent {
    PhaseChange {
        from: InvestigationPhase,
        to: InvestigationPhase,
        reason: String,
    },
    HypothesisCreated {
        id: String,
        statement: String,
    },
    HypothesisUpdated {
        id: String,
        status: HypothesisStatus,
        confidence: u8,
    },
    EvidenceEvaluated {
        hypothesis_id: String,
        action: EvaluationAction,
        strength: String,
    },
    ConclusionReached {
        root_cause: String,
        confidence: String,
    },
    RemediationStarted {
        step_count: usize,
    },
    StepCompleted {
        step_id: String,
        status: StepStatus,
    },
    Error {
        message: String,
    },
}

/// Single-owner state machine: one coordinator mutates, subscribers observe.
pub struct InvestigationStateMachine {
    state: RwLock<InvestigationState>,
    config: StateMachineConfig,
    subscribers: RwLock<Vec<mpsc::UnboundedSender<InvestigationEvent>>>,
}

impl InvestigationStateMachine {
    pub fn new(
        query: impl Into<String>,
        incident_id: Option<String>,
        config: StateMachineConfig,
    ) -> Self {
        let now = Utc::now();
        let id = incident_id
            .unwrap_or_else(|| format!("inv-{}", &uuid::Uuid::new_v4().to_string()[..8]));
        let state = InvestigationState {
            id,
            query: query.into(),
            phase: InvestigationPhase::Idle,
            started_at: now,
            updated_at: now,
            completed_at: None,
            triage: None,
            hypotheses: Vec::new(),
            roots: Vec::new(),
            current_hypothesis_id: None,
            evaluations: Vec::new(),
            conclusion: None,
            remediation_plan: None,
            phase_history: Vec::new(),
            iterations: 0,
            max_iterations: config.max_iterations,
            tool_call_count: 0,
            errors: Vec::new(),
        };
        Self {
            state: RwLock::new(state),
            config,
            subscribers: RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<InvestigationEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.write().push(tx);
        rx
    }

    fn emit(&self, event: InvestigationEvent) {
        self.subscribers
            .write()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn id(&self) -> String {
        self.state.read().id.clone()
    }

    pub fn phase(&self) -> InvestigationPhase {
        self.state.read().phase
    }

    pub fn start(&self) -> Result<()> {
        self.transition_to(InvestigationPhase::Triage, "investigation started")
    }

    /// Rejects transitions the table forbids and leaves state untouched.
    pub fn transition_to(&self, to: InvestigationPhase, reason: &str) -> Result<()> {
        let from = self.state.read().phase;
        if !from.can_transition_to(to) {
            return Err(AgentError::invalid_transition(from.as_str(), to.as_str()));
        }

        {
            let mut state = self.state.write();
            state.phase = to;
            state.updated_at = Utc::now();
            if to == InvestigationPhase::Complete {
                state.completed_at = Some(Utc::now());
            }
            state.phase_history.push(PhaseTransition {
                from,
                to,
                reason: reason.to_string(),
                timestamp: Utc::now(),
            });
        }

        debug!(from = from.as_str(), to = to.as_str(), reason, "phase change");
        self.emit(InvestigationEvent::PhaseChange {
            from,
            to,
            reason: reason.to_string(),
        });
        Ok(())
    }

    pub fn set_triage_result(&self, triage: TriageResult) -> Result<()> {
        let mut state = self.state.write();
        if state.phase != InvestigationPhase::Triage {
            return Err(AgentError::invalid_transition(
                state.phase.as_str(),
                "set_triage_result",
            ));
        }
        state.triage = Some(triage);
        state.updated_at = Utc::now();
        Ok(())
    }

    pub fn triage(&self) -> Option<TriageResult> {
        self.state.read().triage.clone()
    }

    /// Add a hypothesis, enforcing the depth and total-count caps. Returns
    /// the assigned `h_<n>` id.
    pub fn add_hypothesis(&self, seed: HypothesisSeed, parent_id: Option<&str>) -> Result<String> {
        let mut state = self.state.write();

        if state.hypotheses.len() >= self.config.max_hypotheses {
            return Err(AgentError::Config(format!(
                "hypothesis cap reached ({})",
                self.config.max_hypotheses
            )));
        }

        let depth = match parent_id {
            None => 1,
            Some(pid) => {
                let parent_depth = depth_of(&state, pid)
                    .ok_or_else(|| AgentError::NotFound(format!("hypothesis {pid}")))?;
                parent_depth + 1
            }
        };
        if depth > self.config.max_hypothesis_depth {
            return Err(AgentError::Config(format!(
                "hypothesis depth cap reached ({})",
                self.config.max_hypothesis_depth
            )));
        }

        let id = format!("h_{}", state.hypotheses.len() + 1);
        let now = Utc::now();
        let hypothesis = Hypothesis {
            id: id.clone(),
            statement: seed.statement,
            category: seed.category,
            priority: seed.priority.clamp(1, 5),
            confirming_evidence: seed.confirming_evidence,
            refuting_evidence: seed.refuting_evidence,
            queries: Vec::new(),
            query_results: Default::default(),
            reasoning: seed.reasoning,
            confidence: 0,
            evidence_strength: Default::default(),
            status: HypothesisStatus::Pending,
            parent_id: parent_id.map(String::from),
            children: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        let statement = hypothesis.statement.clone();
        match parent_id {
            Some(pid) => {
                let parent = state
                    .hypotheses
                    .iter_mut()
                    .find(|h| h.id == pid)
                    .ok_or_else(|| AgentError::NotFound(format!("hypothesis {pid}")))?;
                parent.children.push(id.clone());
            }
            None => state.roots.push(id.clone()),
        }
        state.hypotheses.push(hypothesis);
        state.updated_at = now;
        drop(state);

        self.emit(InvestigationEvent::HypothesisCreated {
            id: id.clone(),
            statement,
        });
        Ok(id)
    }

    pub fn find_hypothesis(&self, id: &str) -> Option<Hypothesis> {
        self.state
            .read()
            .hypotheses
            .iter()
            .find(|h| h.id == id)
            .cloned()
    }

    pub fn active_hypotheses(&self) -> Vec<Hypothesis> {
        self.state
            .read()
            .hypotheses
            .iter()
            .filter(|h| {
                matches!(
                    h.status,
                    HypothesisStatus::Pending | HypothesisStatus::Investigating
                )
            })
            .cloned()
            .collect()
    }

    /// Next candidate: pending before investigating, then priority, then
    /// shallower, then insertion order.
    pub fn next_hypothesis(&self) -> Option<Hypothesis> {
        let state = self.state.read();
        let mut candidates: Vec<(usize, &Hypothesis)> = state
            .hypotheses
            .iter()
            .enumerate()
            .filter(|(_, h)| {
                matches!(
                    h.status,
                    HypothesisStatus::Pending | HypothesisStatus::Investigating
                )
            })
            .map(|(i, h)| (i, h))
            .collect();

        candidates.sort_by_key(|(i, h)| {
            let status_rank = match h.status {
                HypothesisStatus::Pending => 0,
                _ => 1,
            };
            let depth = depth_of(&state, &h.id).unwrap_or(usize::MAX);
            (status_rank, h.priority, depth, *i)
        });

        candidates.first().map(|(_, h)| (*h).clone())
    }

    pub fn set_current_hypothesis(&self, id: &str) -> Result<()> {
        let (status, confidence) = {
            let mut state = self.state.write();
            let hypothesis = state
                .hypotheses
                .iter_mut()
                .find(|h| h.id == id)
                .ok_or_else(|| AgentError::NotFound(format!("hypothesis {id}")))?;
            if hypothesis.status == HypothesisStatus::Pending {
                hypothesis.status = HypothesisStatus::Investigating;
            }
            hypothesis.updated_at = Utc::now();
            let snapshot = (hypothesis.status, hypothesis.confidence);
            state.current_hypothesis_id = Some(id.to_string());
            snapshot
        };

        self.emit(InvestigationEvent::HypothesisUpdated {
            id: id.to_string(),
            status,
            confidence,
        });
        Ok(())
    }

    pub fn current_hypothesis(&self) -> Option<Hypothesis> {
        let id = self.state.read().current_hypothesis_id.clone()?;
        self.find_hypothesis(&id)
    }

    pub fn set_queries(&self, hypothesis_id: &str, queries: Vec<crate::model::CausalQuery>) -> Result<()> {
        let mut state = self.state.write();
        let hypothesis = state
            .hypotheses
            .iter_mut()
            .find(|h| h.id == hypothesis_id)
            .ok_or_else(|| AgentError::NotFound(format!("hypothesis {hypothesis_id}")))?;
        hypothesis.queries = queries;
        hypothesis.updated_at = Utc::now();
        Ok(())
    }

    pub fn record_query_result(
        &self,
        hypothesis_id: &str,
        query_id: &str,
        value: Value,
    ) -> Result<()> {
        let mut state = self.state.write();
        let hypothesis = state
            .hypotheses
            .iter_mut()
            .find(|h| h.id == hypothesis_id)
            .ok_or_else(|| AgentError::NotFound(format!("hypothesis {hypothesis_id}")))?;
        hypothesis
            .query_results
            .insert(query_id.to_string(), value);
        hypothesis.updated_at = Utc::now();
        state.tool_call_count += 1;
        state.updated_at = Utc::now();
        Ok(())
    }

    /// Apply a verdict to a hypothesis. Branch seeds are added as children;
    /// their ids are returned. A confirmed hypothesis never reverts; pruning
    /// propagates to all descendants.
    pub fn apply_evaluation(&self, evaluation: EvidenceEvaluation) -> Result<Vec<String>> {
        let hypothesis_id = evaluation.hypothesis_id.clone();
        let action = evaluation.action;
        let strength = evaluation.evidence_strength;

        {
            let mut state = self.state.write();
            let hypothesis = state
                .hypotheses
                .iter_mut()
                .find(|h| h.id == hypothesis_id)
                .ok_or_else(|| AgentError::NotFound(format!("hypothesis {hypothesis_id}")))?;

            hypothesis.evidence_strength = strength;
            hypothesis.confidence = evaluation.confidence.min(100);
            if !evaluation.reasoning.is_empty() {
                hypothesis.reasoning = Some(evaluation.reasoning.clone());
            }
            hypothesis.updated_at = Utc::now();

            match action {
                EvaluationAction::Confirm => {
                    if hypothesis.status != HypothesisStatus::Pruned {
                        hypothesis.status = HypothesisStatus::Confirmed;
                    }
                }
                EvaluationAction::Prune => {
                    prune_recursive(&mut state, &hypothesis_id);
                }
                EvaluationAction::Branch | EvaluationAction::Continue => {}
            }

            state.evaluations.push(evaluation.clone());
            state.updated_at = Utc::now();
        }

        self.emit(InvestigationEvent::EvidenceEvaluated {
            hypothesis_id: hypothesis_id.clone(),
            action,
            strength: format!("{strength:?}").to_lowercase(),
        });

        let updated = self
            .find_hypothesis(&hypothesis_id)
            .ok_or_else(|| AgentError::NotFound(format!("hypothesis {hypothesis_id}")))?;
        self.emit(InvestigationEvent::HypothesisUpdated {
            id: hypothesis_id.clone(),
            status: updated.status,
            confidence: updated.confidence,
        });

        let mut branch_ids = Vec::new();
        if action == EvaluationAction::Branch {
            for seed in evaluation.branch_hypotheses {
                match self.add_hypothesis(seed, Some(&hypothesis_id)) {
                    Ok(id) => branch_ids.push(id),
                    Err(e) => self.record_error(format!("branch rejected: {e}")),
                }
            }
        }
        Ok(branch_ids)
    }

    pub fn confirmed_hypothesis(&self) -> Option<Hypothesis> {
        self.state
            .read()
            .hypotheses
            .iter()
            .find(|h| h.status == HypothesisStatus::Confirmed)
            .cloned()
    }

    pub fn set_conclusion(&self, conclusion: Conclusion) -> Result<()> {
        let root_cause = conclusion.root_cause.clone();
        let confidence = format!("{:?}", conclusion.confidence).to_lowercase();
        {
            let mut state = self.state.write();
            if let Some(id) = conclusion.confirmed_hypothesis_id.clone() {
                if let Some(hypothesis) = state.hypotheses.iter_mut().find(|h| h.id == id) {
                    if hypothesis.status != HypothesisStatus::Pruned {
                        hypothesis.status = HypothesisStatus::Confirmed;
                    }
                }
            }
            state.conclusion = Some(conclusion);
            state.updated_at = Utc::now();
        }
        self.emit(InvestigationEvent::ConclusionReached {
            root_cause,
            confidence,
        });
        Ok(())
    }

    pub fn conclusion(&self) -> Option<Conclusion> {
        self.state.read().conclusion.clone()
    }

    pub fn set_remediation_plan(&self, plan: RemediationPlan) {
        let step_count = plan.steps.len();
        {
            let mut state = self.state.write();
            state.remediation_plan = Some(plan);
            state.updated_at = Utc::now();
        }
        self.emit(InvestigationEvent::RemediationStarted { step_count });
    }

    pub fn remediation_plan(&self) -> Option<RemediationPlan> {
        self.state.read().remediation_plan.clone()
    }

    pub fn update_remediation_step(
        &self,
        step_id: &str,
        status: StepStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<()> {
        {
            let mut state = self.state.write();
            let plan = state
                .remediation_plan
                .as_mut()
                .ok_or_else(|| AgentError::NotFound("remediation plan".into()))?;
            let step = plan
                .step_mut(step_id)
                .ok_or_else(|| AgentError::NotFound(format!("remediation step {step_id}")))?;
            step.status = status;
            step.result = result;
            step.error = error;
            state.updated_at = Utc::now();
        }

        if matches!(status, StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped) {
            self.emit(InvestigationEvent::StepCompleted {
                step_id: step_id.to_string(),
                status,
            });
        }
        Ok(())
    }

    pub fn record_error(&self, message: impl Into<String>) {
        let message = message.into();
        {
            let mut state = self.state.write();
            state.errors.push(message.clone());
            state.updated_at = Utc::now();
        }
        self.emit(InvestigationEvent::Error { message });
    }

    pub fn increment_iteration(&self) -> u32 {
        let mut state = self.state.write();
        state.iterations += 1;
        state.iterations
    }

    pub fn can_continue(&self) -> bool {
        let state = self.state.read();
        state.iterations < state.max_iterations
            && state.phase != InvestigationPhase::Complete
            && state.phase != InvestigationPhase::Idle
    }

    pub fn snapshot(&self) -> InvestigationState {
        self.state.read().clone()
    }

    /// Deterministic serialization: hypothesis maps are ordered, lists keep
    /// insertion order.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&*self.state.read())?)
    }
}

fn depth_of(state: &InvestigationState, id: &str) -> Option<usize> {
    let mut depth = 1;
    let mut current = state.hypotheses.iter().find(|h| h.id == id)?;
    while let Some(parent_id) = &current.parent_id {
        current = state.hypotheses.iter().find(|h| &h.id == parent_id)?;
        depth += 1;
    }
    Some(depth)
}

fn prune_recursive(state: &mut InvestigationState, id: &str) {
    let mut stack = vec![id.to_string()];
    while let Some(next) = stack.pop() {
        if let Some(hypothesis) = state.hypotheses.iter_mut().find(|h| h.id == next) {
            if hypothesis.status != HypothesisStatus::Confirmed {
                hypothesis.status = HypothesisStatus::Pruned;
                hypothesis.updated_at = Utc::now();
            }
            stack.extend(hypothesis.children.iter().cloned());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EvidenceStrength, HypothesisCategory};

    fn machine() -> InvestigationStateMachine {
        InvestigationStateMachine::new(
            "checkout latency spike",
            Some("PD-12345".into()),
            StateMachineConfig::default(),
        )
    }

    fn seed(statement: &str, priority: u8) -> HypothesisSeed {
        HypothesisSeed::new(statement)
            .with_priority(priority)
            .with_category(HypothesisCategory::Capacity)
    }

    #[test]
    fn test_initial_state() {
        let sm = machine();
        assert_eq!(sm.phase(), InvestigationPhase::Idle);
        assert_eq!(sm.id(), "PD-12345");
        assert!(!sm.can_continue());
    }

    #[test]
    fn test_legal_phase_walk() {
        let sm = machine();
        sm.start().unwrap();
        sm.transition_to(InvestigationPhase::Hypothesize, "triaged").unwrap();
        sm.transition_to(InvestigationPhase::Investigate, "picked h_1").unwrap();
        sm.transition_to(InvestigationPhase::Evaluate, "results in").unwrap();
        sm.transition_to(InvestigationPhase::Conclude, "confirmed").unwrap();
        sm.transition_to(InvestigationPhase::Complete, "done").unwrap();

        let snapshot = sm.snapshot();
        assert_eq!(snapshot.phase_history.len(), 6);
        assert!(snapshot.completed_at.is_some());
    }

    #[test]
    fn test_illegal_transition_leaves_state_unchanged() {
        let sm = machine();
        let err = sm
            .transition_to(InvestigationPhase::Evaluate, "skip ahead")
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidTransition { .. }));
        assert_eq!(sm.phase(), InvestigationPhase::Idle);
        assert!(sm.snapshot().phase_history.is_empty());
    }

    #[test]
    fn test_triage_only_in_triage_phase() {
        let sm = machine();
        assert!(sm.set_triage_result(TriageResult::default()).is_err());
        sm.start().unwrap();
        assert!(sm.set_triage_result(TriageResult::default()).is_ok());
    }

    #[test]
    fn test_hypothesis_ids_and_tree() {
        let sm = machine();
        let h1 = sm.add_hypothesis(seed("pool exhausted", 1), None).unwrap();
        let h2 = sm.add_hypothesis(seed("bad deploy", 2), None).unwrap();
        let child = sm
            .add_hypothesis(seed("pool too small", 1), Some(&h1))
            .unwrap();

        assert_eq!(h1, "h_1");
        assert_eq!(h2, "h_2");
        assert_eq!(child, "h_3");

        let parent = sm.find_hypothesis(&h1).unwrap();
        assert_eq!(parent.children, vec!["h_3"]);
        assert_eq!(sm.find_hypothesis(&child).unwrap().parent_id, Some(h1));
        assert_eq!(sm.snapshot().roots, vec!["h_1", "h_2"]);
    }

    #[test]
    fn test_depth_cap() {
        let sm = InvestigationStateMachine::new(
            "q",
            None,
            StateMachineConfig {
                max_hypothesis_depth: 2,
                ..Default::default()
            },
        );
        let h1 = sm.add_hypothesis(seed("root", 1), None).unwrap();
        let h2 = sm.add_hypothesis(seed("child", 1), Some(&h1)).unwrap();
        let err = sm.add_hypothesis(seed("grandchild", 1), Some(&h2)).unwrap_err();
        assert!(err.to_string().contains("depth cap"));
    }

    #[test]
    fn test_count_cap() {
        let sm = InvestigationStateMachine::new(
            "q",
            None,
            StateMachineConfig {
                max_hypotheses: 2,
                ..Default::default()
            },
        );
        sm.add_hypothesis(seed("one", 1), None).unwrap();
        sm.add_hypothesis(seed("two", 1), None).unwrap();
        assert!(sm.add_hypothesis(seed("three", 1), None).is_err());
    }

    #[test]
    fn test_unknown_parent_rejected() {
        let sm = machine();
        let err = sm.add_hypothesis(seed("orphan", 1), Some("h_99")).unwrap_err();
        assert!(matches!(err, AgentError::NotFound(_)));
    }

    #[test]
    fn test_next_hypothesis_ordering() {
        let sm = machine();
        let _h1 = sm.add_hypothesis(seed("low priority", 4), None).unwrap();
        let h2 = sm.add_hypothesis(seed("high priority", 1), None).unwrap();
        let h3 = sm.add_hypothesis(seed("also high, deeper", 1), Some(&h2)).unwrap();

        // h_2 and h_3 share priority 1, but h_2 is shallower.
        assert_eq!(sm.next_hypothesis().unwrap().id, h2);

        // Once h_2 is investigating, pending h_3 comes first.
        sm.set_current_hypothesis(&h2).unwrap();
        assert_eq!(sm.next_hypothesis().unwrap().id, h3);
    }

    #[test]
    fn test_prune_propagates_to_descendants() {
        let sm = machine();
        let h1 = sm.add_hypothesis(seed("root", 1), None).unwrap();
        let h2 = sm.add_hypothesis(seed("child", 1), Some(&h1)).unwrap();
        let h3 = sm.add_hypothesis(seed("grandchild", 1), Some(&h2)).unwrap();

        sm.apply_evaluation(EvidenceEvaluation {
            hypothesis_id: h1.clone(),
            evidence_strength: EvidenceStrength::Contradicting,
            confidence: 10,
            reasoning: "metrics flat".into(),
            action: EvaluationAction::Prune,
            findings: vec![],
            branch_hypotheses: vec![],
        })
        .unwrap();

        for id in [&h1, &h2, &h3] {
            assert_eq!(sm.find_hypothesis(id).unwrap().status, HypothesisStatus::Pruned);
        }
        assert!(sm.next_hypothesis().is_none());
    }

    #[test]
    fn test_confirm_never_reverts() {
        let sm = machine();
        let h1 = sm.add_hypothesis(seed("root", 1), None).unwrap();
        sm.apply_evaluation(EvidenceEvaluation {
            hypothesis_id: h1.clone(),
            evidence_strength: EvidenceStrength::Strong,
            confidence: 85,
            reasoning: "pool maxed at incident start".into(),
            action: EvaluationAction::Confirm,
            findings: vec!["connections pinned at limit".into()],
            branch_hypotheses: vec![],
        })
        .unwrap();

        sm.apply_evaluation(EvidenceEvaluation {
            hypothesis_id: h1.clone(),
            evidence_strength: EvidenceStrength::Weak,
            confidence: 30,
            reasoning: "second look".into(),
            action: EvaluationAction::Prune,
            findings: vec![],
            branch_hypotheses: vec![],
        })
        .unwrap();

        assert_eq!(
            sm.find_hypothesis(&h1).unwrap().status,
            HypothesisStatus::Confirmed
        );
        assert_eq!(sm.confirmed_hypothesis().unwrap().id, h1);
    }

    #[test]
    fn test_branch_adds_children() {
        let sm = machine();
        let h1 = sm.add_hypothesis(seed("dependency slow", 2), None).unwrap();
        let branch_ids = sm
            .apply_evaluation(EvidenceEvaluation {
                hypothesis_id: h1.clone(),
                evidence_strength: EvidenceStrength::Weak,
                confidence: 45,
                reasoning: "two downstreams look suspicious".into(),
                action: EvaluationAction::Branch,
                findings: vec![],
                branch_hypotheses: vec![
                    HypothesisSeed::new("payments dependency degraded"),
                    HypothesisSeed::new("inventory dependency degraded"),
                ],
            })
            .unwrap();

        assert_eq!(branch_ids.len(), 2);
        let parent = sm.find_hypothesis(&h1).unwrap();
        assert_eq!(parent.children, branch_ids);
    }

    #[test]
    fn test_event_order_matches_phase_history() {
        let sm = machine();
        let mut rx = sm.subscribe();

        sm.start().unwrap();
        sm.add_hypothesis(seed("pool exhausted", 1), None).unwrap();
        sm.transition_to(InvestigationPhase::Hypothesize, "triaged").unwrap();

        let mut phase_events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let InvestigationEvent::PhaseChange { from, to, .. } = event {
                phase_events.push((from, to));
            }
        }

        let history: Vec<_> = sm
            .snapshot()
            .phase_history
            .iter()
            .map(|t| (t.from, t.to))
            .collect();
        assert_eq!(phase_events, history);
    }

    #[test]
    fn test_query_results_and_tool_count() {
        let sm = machine();
        let h1 = sm.add_hypothesis(seed("root", 1), None).unwrap();
        sm.record_query_result(&h1, "q_h_1_1", serde_json::json!({"datapoints": []}))
            .unwrap();
        sm.record_query_result(&h1, "q_h_1_2", serde_json::json!({"events": []}))
            .unwrap();

        let hypothesis = sm.find_hypothesis(&h1).unwrap();
        assert_eq!(hypothesis.query_results.len(), 2);
        assert_eq!(sm.snapshot().tool_call_count, 2);
    }

    #[test]
    fn test_can_continue_bounds() {
        let sm = InvestigationStateMachine::new(
            "q",
            None,
            StateMachineConfig {
                max_iterations: 2,
                ..Default::default()
            },
        );
        sm.start().unwrap();
        assert!(sm.can_continue());
        sm.increment_iteration();
        sm.increment_iteration();
        assert!(!sm.can_continue());
    }

    #[test]
    fn test_to_json_round_trips() {
        let sm = machine();
        sm.start().unwrap();
        sm.add_hypothesis(seed("root", 1), None).unwrap();

        let json = sm.to_json().unwrap();
        let state: InvestigationState = serde_json::from_str(&json).unwrap();
        assert_eq!(state.id, "PD-12345");
        assert_eq!(state.hypotheses.len(), 1);
        assert_eq!(state.phase, InvestigationPhase::Triage);
    }

    #[test]
    fn test_remediation_step_updates() {
        let sm = machine();
        sm.set_remediation_plan(RemediationPlan {
            steps: vec![crate::model::RemediationStep {
                id: "step_1".into(),
                action: "restart pods".into(),
                description: "roll the deployment".into(),
                command: Some("kubectl rollout restart deploy/checkout-api".into()),
                rollback_command: None,
                code_reference: None,
                risk_level: crate::model::RiskLevel::Medium,
                requires_approval: true,
                status: StepStatus::Pending,
                matching_skill: None,
                matching_runbook: None,
                result: None,
                error: None,
            }],
        });

        sm.update_remediation_step("step_1", StepStatus::Completed, None, None)
            .unwrap();
        let plan = sm.remediation_plan().unwrap();
        assert_eq!(plan.steps[0].status, StepStatus::Completed);

        assert!(sm
            .update_remediation_step("step_9", StepStatus::Failed, None, None)
            .is_err());
    }
}
