//! The incident-investigation loop

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ops_agents_context::{CompactionContext, ContextCompactor};
use ops_agents_core::{
    AgentEvent, ChatRequest, KnowledgeBundle, KnowledgeRequest, KnowledgeRetriever, LLMClient,
    Result, RunSummary, ToolCall,
};
use ops_agents_investigation::{
    confidence_level, CausalQueryPlanner, Conclusion, EvaluationAction, EvidenceLink,
    EvidenceScorer, EvidenceStrength, InvestigationPhase, InvestigationStateMachine,
    PlannerHints, RemediationPlan, RemediationStep, StateMachineConfig, StepStatus, TriageResult,
};
use ops_agents_scratchpad::ScratchpadEntry;
use ops_agents_tools::FullResultTool;

use crate::config::RunConfig;
use crate::dispatch::ToolDispatcher;
use crate::events::EventBus;
use crate::prompts;

/// Decides whether a remediation step that requires approval may proceed.
#[async_trait]
pub trait ApprovalHandler: Send + Sync {
    async fn approve(&self, step: &RemediationStep) -> bool;
}

pub struct RejectAllHandler;

#[async_trait]
impl ApprovalHandler for RejectAllHandler {
    async fn approve(&self, _step: &RemediationStep) -> bool {
        false
    }
}

pub struct ApproveAllHandler;

#[async_trait]
impl ApprovalHandler for ApproveAllHandler {
    async fn approve(&self, _step: &RemediationStep) -> bool {
        true
    }
}

/// Drives triage, hypothesis generation, investigation cycles, conclusion,
/// and optional remediation. Failures are recorded on the state machine and
/// the loop moves on; only configuration defects abort a run.
pub struct Orchestrator {
    llm: Arc<dyn LLMClient>,
    knowledge: Option<Arc<dyn KnowledgeRetriever>>,
    dispatcher: Arc<ToolDispatcher>,
    compactor: ContextCompactor,
    scorer: EvidenceScorer,
    full_result_tool: Arc<FullResultTool>,
    approval: Arc<dyn ApprovalHandler>,
    config: RunConfig,
    events: EventBus,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        llm: Arc<dyn LLMClient>,
        knowledge: Option<Arc<dyn KnowledgeRetriever>>,
        dispatcher: Arc<ToolDispatcher>,
        compactor: ContextCompactor,
        full_result_tool: Arc<FullResultTool>,
        approval: Arc<dyn ApprovalHandler>,
        config: RunConfig,
        events: EventBus,
    ) -> Self {
        let scorer = EvidenceScorer::new(Arc::clone(&llm));
        Self {
            llm,
            knowledge,
            dispatcher,
            compactor,
            scorer,
            full_result_tool,
            approval,
            config,
            events,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Run one investigation to completion. Always terminates with a `done`
    /// event carrying whatever conclusion is available.
    pub async fn investigate(
        &self,
        query: &str,
        incident_id: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<RunSummary> {
        let started = Instant::now();
        let machine = InvestigationStateMachine::new(
            query,
            incident_id.map(String::from),
            StateMachineConfig {
                max_iterations: self.config.max_investigation_iterations,
                max_hypothesis_depth: self.config.max_hypothesis_depth,
                max_hypotheses: self.config.max_hypotheses,
            },
        );

        let pad = self.dispatcher.pad();
        self.events.emit(AgentEvent::init(pad.session_id(), query));
        if let Err(e) = pad.append(ScratchpadEntry::init(pad.session_id(), query)) {
            warn!(error = %e, "failed to log session init");
        }

        machine.start()?;
        self.explain(&machine, "starting triage");

        // Triage context: tool pre-fetch chain, then knowledge.
        let signals = self.triage_prefetch(query, incident_id, &cancel).await;
        let bundle = if cancel.is_cancelled() {
            None
        } else {
            self.retrieve_knowledge(query, incident_id).await
        };
        let knowledge_text = bundle
            .as_ref()
            .map(knowledge_digest)
            .unwrap_or_default();

        // No new model calls once cancellation is signalled.
        let triage = if cancel.is_cancelled() {
            TriageResult {
                incident_id: incident_id.map(String::from),
                summary: query.to_string(),
                ..Default::default()
            }
        } else {
            self.run_triage(query, incident_id, &signals, &knowledge_text, &machine)
                .await
        };
        machine.set_triage_result(triage.clone())?;
        machine.transition_to(InvestigationPhase::Hypothesize, "triage complete")?;
        self.explain(&machine, "triage complete, forming hypotheses");

        // Hypothesize.
        let seeds = if cancel.is_cancelled() {
            Ok(Vec::new())
        } else {
            self.generate_hypotheses(&triage).await
        };
        match seeds {
            Ok(seeds) => {
                for seed in seeds {
                    match machine.add_hypothesis(seed, None) {
                        Ok(id) => {
                            let hypothesis = machine.find_hypothesis(&id);
                            let statement = hypothesis
                                .map(|h| h.statement)
                                .unwrap_or_default();
                            self.events.emit(AgentEvent::HypothesisFormed {
                                id: id.clone(),
                                statement: statement.clone(),
                            });
                            let _ = pad.append(ScratchpadEntry::hypothesis_formed(id, statement));
                        }
                        Err(e) => machine.record_error(format!("hypothesis rejected: {e}")),
                    }
                }
            }
            Err(e) => machine.record_error(format!("hypothesis generation failed: {e}")),
        }

        let mut discovered_services = Vec::new();
        if self.config.enable_infra_discovery {
            discovered_services = self.discover_infra(&cancel).await;
        }

        // Investigation cycles.
        let planner = self.build_planner();
        let mut hints = PlannerHints::default();

        while machine.can_continue()
            && machine.phase() != InvestigationPhase::Conclude
            && !cancel.is_cancelled()
        {
            let Some(hypothesis) = machine.next_hypothesis() else {
                break;
            };
            machine.increment_iteration();

            if let Err(e) =
                machine.transition_to(InvestigationPhase::Investigate, "picked next hypothesis")
            {
                machine.record_error(e.to_string());
                break;
            }
            self.explain(&machine, &format!("investigating {}", hypothesis.id));
            machine.set_current_hypothesis(&hypothesis.id)?;

            self.maybe_compact(&machine, &discovered_services);
            self.full_result_tool
                .install_snapshot(pad.full_results_snapshot());

            let triage_ref = machine.triage();
            let queries = planner.plan(&hypothesis, triage_ref.as_ref(), &hints);
            machine.set_queries(&hypothesis.id, queries.clone())?;

            let calls: Vec<ToolCall> = queries
                .iter()
                .map(|q| {
                    ToolCall::new(q.tool_name.clone(), q.parameters.clone()).with_id(q.id.clone())
                })
                .collect();
            let dispatched = self.dispatcher.dispatch(calls, &cancel).await;

            for outcome in &dispatched {
                let recorded = if outcome.result.is_error() {
                    json!({"error": outcome.result.error})
                } else {
                    outcome.result.output.clone()
                };
                machine.record_query_result(&hypothesis.id, &outcome.call.id, recorded)?;
                update_hints(&mut hints, &outcome.result.output);
            }

            machine.transition_to(InvestigationPhase::Evaluate, "query results collected")?;
            self.explain(&machine, "weighing the evidence");

            let current = machine
                .find_hypothesis(&hypothesis.id)
                .unwrap_or(hypothesis.clone());
            match self.scorer.evaluate(&current, triage_ref.as_ref()).await {
                Ok(mut evaluation) => {
                    evaluation.hypothesis_id = hypothesis.id.clone();
                    let action = evaluation.action;
                    let strength = evaluation.evidence_strength;
                    let confidence = evaluation.confidence;
                    let reasoning = evaluation.reasoning.clone();

                    if let Err(e) = machine.apply_evaluation(evaluation) {
                        machine.record_error(e.to_string());
                        continue;
                    }

                    self.events.emit(AgentEvent::EvidenceGathered {
                        hypothesis_id: hypothesis.id.clone(),
                        strength: strength_label(strength).to_string(),
                    });
                    let _ = pad.append(ScratchpadEntry::evidence_gathered(
                        &hypothesis.id,
                        strength_label(strength),
                        &reasoning,
                    ));

                    match action {
                        EvaluationAction::Confirm => {
                            self.events.emit(AgentEvent::HypothesisConfirmed {
                                id: hypothesis.id.clone(),
                                confidence,
                            });
                            let _ = pad.append(ScratchpadEntry::hypothesis_confirmed(
                                &hypothesis.id,
                                confidence,
                            ));
                        }
                        EvaluationAction::Prune => {
                            self.events.emit(AgentEvent::HypothesisPruned {
                                id: hypothesis.id.clone(),
                                reason: reasoning.clone(),
                            });
                            let _ = pad.append(ScratchpadEntry::hypothesis_pruned(
                                &hypothesis.id,
                                &reasoning,
                            ));
                        }
                        _ => {}
                    }
                }
                Err(e) => machine.record_error(format!("evidence evaluation failed: {e}")),
            }

            // First confirmation short-circuits the loop.
            if machine.confirmed_hypothesis().is_some() {
                machine.transition_to(InvestigationPhase::Conclude, "hypothesis confirmed")?;
                break;
            }
        }

        self.ensure_conclude(&machine);
        self.explain(&machine, "concluding");

        let conclusion = if cancel.is_cancelled() {
            self.fallback_conclusion(&machine)
        } else {
            self.conclude(query, &machine, &discovered_services).await
        };
        if let Some(conclusion) = conclusion {
            if let Err(e) = machine.set_conclusion(conclusion) {
                machine.record_error(e.to_string());
            }
        }

        // Remediation only applies when there is something to remediate and
        // a path to execute or approve it.
        let remediation_possible = self.dispatcher.registry().contains("skill_invoke")
            || self.config.auto_approve_remediation;
        if machine.conclusion().is_some() && remediation_possible && !cancel.is_cancelled() {
            if machine
                .transition_to(InvestigationPhase::Remediate, "conclusion reached")
                .is_ok()
            {
                self.remediate(&machine, &bundle, &cancel).await;
            }
        }

        if machine.phase() != InvestigationPhase::Complete {
            if let Err(e) =
                machine.transition_to(InvestigationPhase::Complete, "investigation finished")
            {
                machine.record_error(e.to_string());
            }
        }

        let summary = build_summary(&machine, query, started.elapsed().as_millis() as u64);
        info!(
            id = %summary.id,
            determined = summary.root_cause.is_some(),
            duration_ms = summary.duration_ms,
            "investigation complete"
        );
        self.events.emit(AgentEvent::done(summary.clone()));
        Ok(summary)
    }

    fn explain(&self, machine: &InvestigationStateMachine, text: &str) {
        if self.config.explain_mode {
            self.events
                .emit(AgentEvent::thinking(format!("[{}] {text}", machine.phase())));
        }
    }

    fn build_planner(&self) -> CausalQueryPlanner {
        let names = self.dispatcher.registry().names();
        let mut planner = CausalQueryPlanner::new(names);
        if let Some(group) = &self.config.default_log_group {
            planner = planner.with_default_log_group(group.clone());
        }
        planner
    }

    /// Walk the pre-fetch chain until one tool returns a meaningful signal.
    async fn triage_prefetch(
        &self,
        query: &str,
        incident_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> String {
        const CHAIN: &[&str] = &[
            "incident_detail",
            "alarms_query",
            "monitors_query",
            "cloud_inventory",
        ];

        for tool in CHAIN {
            if cancel.is_cancelled() {
                break;
            }
            if !self.dispatcher.registry().contains(tool) {
                continue;
            }
            let args = match (*tool, incident_id) {
                ("incident_detail", Some(id)) => json!({"incident_id": id}),
                ("incident_detail", None) => continue,
                _ => json!({"query": query}),
            };

            let results = self
                .dispatcher
                .dispatch(vec![ToolCall::new(*tool, args)], cancel)
                .await;
            if let Some(outcome) = results.first() {
                if is_meaningful(&outcome.result.output) && !outcome.result.is_error() {
                    debug!(tool, "triage pre-fetch found a signal");
                    return format!("{tool}: {}", outcome.result.output);
                }
            }
        }
        String::new()
    }

    async fn retrieve_knowledge(
        &self,
        query: &str,
        incident_id: Option<&str>,
    ) -> Option<KnowledgeBundle> {
        let retriever = self.knowledge.as_ref()?;
        let request = KnowledgeRequest {
            query: Some(query.to_string()),
            incident_id: incident_id.map(String::from),
            ..Default::default()
        };
        match retriever.retrieve(request).await {
            Ok(bundle) => {
                self.events.emit(AgentEvent::KnowledgeRetrieved {
                    runbooks: bundle.runbooks.len(),
                    postmortems: bundle.postmortems.len(),
                    known_issues: bundle.known_issues.len(),
                });
                Some(bundle)
            }
            Err(e) => {
                debug!(error = %e, "knowledge retrieval failed");
                None
            }
        }
    }

    /// Triage via the model, with one strict retry; falls back to a minimal
    /// triage built from the query so the run can proceed.
    async fn run_triage(
        &self,
        query: &str,
        incident_id: Option<&str>,
        signals: &str,
        knowledge: &str,
        machine: &InvestigationStateMachine,
    ) -> TriageResult {
        let prompt = prompts::triage_prompt(query, signals, knowledge);
        match self
            .structured_chat(prompts::TRIAGE_SYSTEM, &prompt, |content| {
                ops_agents_investigation::parse::parse_triage(content)
            })
            .await
        {
            Ok(mut triage) => {
                if triage.incident_id.is_none() {
                    triage.incident_id = incident_id.map(String::from);
                }
                triage
            }
            Err(e) => {
                machine.record_error(format!("triage failed: {e}"));
                TriageResult {
                    incident_id: incident_id.map(String::from),
                    summary: query.to_string(),
                    ..Default::default()
                }
            }
        }
    }

    async fn generate_hypotheses(
        &self,
        triage: &TriageResult,
    ) -> Result<Vec<ops_agents_investigation::HypothesisSeed>> {
        let prompt = prompts::hypothesis_prompt(triage);
        self.structured_chat(prompts::HYPOTHESIS_SYSTEM, &prompt, |content| {
            ops_agents_investigation::parse::parse_hypotheses(content)
        })
        .await
    }

    /// One LLM call plus one stricter retry on schema failures.
    async fn structured_chat<T>(
        &self,
        system: &str,
        prompt: &str,
        parse: impl Fn(&str) -> Result<T>,
    ) -> Result<T> {
        let response = self
            .llm
            .chat(ChatRequest::new(system, prompt))
            .await?;
        match parse(&response.content) {
            Ok(parsed) => Ok(parsed),
            Err(first_err) => {
                debug!(error = %first_err, "structured output unparseable, retrying strictly");
                let retry_prompt =
                    format!("{prompt}\n\n{}", prompts::STRICT_JSON_REMINDER);
                let response = self
                    .llm
                    .chat(ChatRequest::new(system, retry_prompt))
                    .await?;
                parse(&response.content)
            }
        }
    }

    async fn discover_infra(&self, cancel: &CancellationToken) -> Vec<String> {
        if !self.dispatcher.registry().contains("cloud_inventory") {
            return Vec::new();
        }
        let results = self
            .dispatcher
            .dispatch(
                vec![ToolCall::new("cloud_inventory", json!({}))],
                cancel,
            )
            .await;
        results
            .first()
            .filter(|o| !o.result.is_error())
            .map(|o| ops_agents_tools::extract_services(&o.result.output))
            .unwrap_or_default()
    }

    fn maybe_compact(&self, machine: &InvestigationStateMachine, discovered: &[String]) {
        let mut affected: Vec<String> = machine
            .triage()
            .map(|t| t.affected_services)
            .unwrap_or_default();
        affected.extend(self.config.known_services.iter().cloned());
        affected.extend(discovered.iter().cloned());

        let context = CompactionContext {
            query: machine.snapshot().query,
            affected_services: affected,
            hypothesis_statement: machine.current_hypothesis().map(|h| h.statement),
        };
        crate::compact::compact_pad(
            self.dispatcher.pad(),
            &self.compactor,
            &self.config,
            &context,
            &self.events,
        );
    }

    /// Reaching conclude is always legal from evaluate, hypothesize, and
    /// triage; a cancelled run parked in investigate walks through evaluate.
    fn ensure_conclude(&self, machine: &InvestigationStateMachine) {
        if machine.phase() == InvestigationPhase::Conclude {
            return;
        }
        if machine.phase() == InvestigationPhase::Investigate {
            let _ = machine.transition_to(InvestigationPhase::Evaluate, "winding down");
        }
        if let Err(e) = machine.transition_to(
            InvestigationPhase::Conclude,
            "no further hypotheses to investigate",
        ) {
            machine.record_error(e.to_string());
        }
    }

    async fn conclude(
        &self,
        query: &str,
        machine: &InvestigationStateMachine,
        discovered: &[String],
    ) -> Option<Conclusion> {
        let snapshot = machine.snapshot();

        // Contradicting evidence is excluded here; it belongs in the
        // alternative explanations the model writes.
        let evidence: Vec<EvidenceLink> = snapshot
            .evaluations
            .iter()
            .filter(|e| {
                matches!(
                    e.evidence_strength,
                    EvidenceStrength::Strong | EvidenceStrength::Weak
                )
            })
            .flat_map(|e| {
                e.findings.iter().map(move |finding| EvidenceLink {
                    finding: finding.clone(),
                    source: e.hypothesis_id.clone(),
                    strength: e.evidence_strength,
                })
            })
            .collect();

        let hypotheses_text = snapshot
            .hypotheses
            .iter()
            .map(|h| {
                format!(
                    "{} [{:?}, confidence {}] {}",
                    h.id, h.status, h.confidence, h.statement
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = prompts::conclusion_prompt(query, &evidence, &hypotheses_text);
        let parsed = self
            .structured_chat(prompts::CONCLUSION_SYSTEM, &prompt, |content| {
                ops_agents_investigation::parse::parse_conclusion(content)
            })
            .await;

        let mut conclusion = match parsed {
            Ok(conclusion) => conclusion,
            Err(e) => {
                machine.record_error(format!("conclusion failed: {e}"));
                return self.fallback_conclusion(machine);
            }
        };

        // Reconcile the confirmed id with what the machine actually holds.
        let known_id = conclusion
            .confirmed_hypothesis_id
            .as_ref()
            .and_then(|id| machine.find_hypothesis(id))
            .map(|h| h.id);
        conclusion.confirmed_hypothesis_id =
            known_id.or_else(|| machine.confirmed_hypothesis().map(|h| h.id));

        // Affected services: intersect the model's proposals with what
        // triage and configuration actually know about.
        let mut pool: Vec<String> = snapshot
            .triage
            .as_ref()
            .map(|t| t.affected_services.clone())
            .unwrap_or_default();
        pool.extend(self.config.known_services.iter().cloned());
        pool.extend(discovered.iter().cloned());

        let intersection: Vec<String> = conclusion
            .affected_services
            .iter()
            .filter(|s| pool.iter().any(|p| p == *s))
            .cloned()
            .collect();
        if !intersection.is_empty() {
            conclusion.affected_services = intersection;
        } else if let Some(triage) = &snapshot.triage {
            conclusion.affected_services = triage.affected_services.clone();
        }

        if conclusion.evidence_chain.is_empty() {
            conclusion.evidence_chain = evidence;
        }
        Some(conclusion)
    }

    /// Without a usable model conclusion, fall back to the confirmed
    /// hypothesis if there is one.
    fn fallback_conclusion(&self, machine: &InvestigationStateMachine) -> Option<Conclusion> {
        let confirmed = machine.confirmed_hypothesis()?;
        Some(Conclusion {
            root_cause: confirmed.statement.clone(),
            confidence: confidence_level(confirmed.confidence),
            confirmed_hypothesis_id: Some(confirmed.id),
            affected_services: machine
                .triage()
                .map(|t| t.affected_services)
                .unwrap_or_default(),
            evidence_chain: Vec::new(),
            alternative_explanations: Vec::new(),
            unknowns: Vec::new(),
        })
    }

    async fn remediate(
        &self,
        machine: &InvestigationStateMachine,
        bundle: &Option<KnowledgeBundle>,
        cancel: &CancellationToken,
    ) {
        let Some(conclusion) = machine.conclusion() else {
            return;
        };

        let runbook_titles: Vec<String> = bundle
            .as_ref()
            .map(|b| b.runbooks.iter().map(|d| d.title.clone()).collect())
            .unwrap_or_default();

        let code_refs = if self.dispatcher.registry().contains("code_search") {
            let results = self
                .dispatcher
                .dispatch(
                    vec![ToolCall::new(
                        "code_search",
                        json!({"query": conclusion.root_cause}),
                    )],
                    cancel,
                )
                .await;
            results
                .first()
                .filter(|o| !o.result.is_error())
                .map(|o| o.result.output.to_string())
                .unwrap_or_default()
        } else {
            String::new()
        };

        let prompt = prompts::remediation_prompt(&conclusion, &runbook_titles, &code_refs);
        let steps = match self
            .structured_chat(prompts::REMEDIATION_SYSTEM, &prompt, |content| {
                ops_agents_investigation::parse::parse_remediation(content)
            })
            .await
        {
            Ok(steps) if !steps.is_empty() => steps,
            Ok(_) => return,
            Err(e) => {
                machine.record_error(format!("remediation planning failed: {e}"));
                return;
            }
        };

        machine.set_remediation_plan(RemediationPlan {
            steps: steps.clone(),
        });

        for step in &steps {
            if cancel.is_cancelled() {
                break;
            }
            self.execute_step(machine, step, cancel).await;
        }
    }

    async fn execute_step(
        &self,
        machine: &InvestigationStateMachine,
        step: &RemediationStep,
        cancel: &CancellationToken,
    ) {
        if !self.config.auto_approve_remediation {
            if step.requires_approval && self.approval.approve(step).await {
                let _ = machine.update_remediation_step(&step.id, StepStatus::Approved, None, None);
            }
            return;
        }

        let skill_backed = step.matching_skill.is_some()
            && self.dispatcher.registry().contains("skill_invoke");
        if skill_backed {
            let _ = machine.update_remediation_step(&step.id, StepStatus::Executing, None, None);
            let skill = step.matching_skill.clone().unwrap_or_default();
            let results = self
                .dispatcher
                .dispatch(
                    vec![ToolCall::new(
                        "skill_invoke",
                        json!({"skill": skill, "command": step.command}),
                    )],
                    cancel,
                )
                .await;

            let (status, result, error) = match results.first() {
                Some(outcome) if !outcome.result.is_error() => (
                    StepStatus::Completed,
                    Some(outcome.result.output.clone()),
                    None,
                ),
                Some(outcome) => (
                    StepStatus::Failed,
                    None,
                    outcome.result.error.clone(),
                ),
                None => (StepStatus::Failed, None, Some("no result".to_string())),
            };
            let _ = machine.update_remediation_step(&step.id, status, result, error);
        } else if step.command.is_some() {
            // A raw command with no backing skill is never run automatically.
            let _ = machine.update_remediation_step(
                &step.id,
                StepStatus::Pending,
                None,
                Some("manual execution required".to_string()),
            );
        }
    }
}

fn strength_label(strength: EvidenceStrength) -> &'static str {
    match strength {
        EvidenceStrength::Strong => "strong",
        EvidenceStrength::Weak => "weak",
        EvidenceStrength::None => "none",
        EvidenceStrength::Contradicting => "contradicting",
        EvidenceStrength::Pending => "pending",
    }
}

fn is_meaningful(output: &Value) -> bool {
    match output {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

/// Pick up log groups and function names a later log query can inherit.
fn update_hints(hints: &mut PlannerHints, output: &Value) {
    if hints.log_group.is_none() {
        if let Some(group) = find_string_field(output, "log_group") {
            hints.log_group = Some(group);
        }
    }
    if hints.observed_function.is_none() {
        if let Some(function) = find_string_field(output, "function_name") {
            hints.observed_function = Some(function);
        }
    }
}

fn find_string_field(value: &Value, field: &str) -> Option<String> {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(s)) = map.get(field) {
                return Some(s.clone());
            }
            map.values().find_map(|v| find_string_field(v, field))
        }
        Value::Array(items) => items.iter().find_map(|v| find_string_field(v, field)),
        _ => None,
    }
}

fn build_summary(machine: &InvestigationStateMachine, query: &str, duration_ms: u64) -> RunSummary {
    let snapshot = machine.snapshot();
    match snapshot.conclusion {
        Some(conclusion) => RunSummary {
            id: snapshot.id,
            query: query.to_string(),
            root_cause: Some(conclusion.root_cause.clone()),
            confidence: Some(format!("{:?}", conclusion.confidence).to_lowercase()),
            affected_services: conclusion.affected_services.clone(),
            remediation_plan: snapshot
                .remediation_plan
                .as_ref()
                .and_then(|plan| serde_json::to_value(plan).ok()),
            summary: format!("Root cause: {}", conclusion.root_cause),
            duration_ms,
        },
        None => RunSummary {
            id: snapshot.id,
            query: query.to_string(),
            root_cause: None,
            confidence: None,
            affected_services: Vec::new(),
            remediation_plan: None,
            summary: "Root cause: not determined".to_string(),
            duration_ms,
        },
    }
}

fn knowledge_digest(bundle: &KnowledgeBundle) -> String {
    bundle
        .all_docs()
        .take(5)
        .map(|doc| format!("- {} [{:?}]", doc.title, doc.doc_type))
        .collect::<Vec<_>>()
        .join("\n")
}
