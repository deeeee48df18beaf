//! Evidence strength classification and confidence scoring
//!
//! The strength verdict is delegated to the model through a structured
//! evaluation prompt; the confidence number is computed locally from
//! deterministic factors so two runs over the same evidence agree.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use ops_agents_core::{ChatRequest, LLMClient, Result};
use ops_agents_llm::extract::extract_json_as;

use crate::model::{
    ConfidenceLevel, EvidenceEvaluation, EvidenceStrength, Hypothesis, TriageResult,
};

const TEMPORAL_CORRELATION_MINUTES: i64 = 5;

/// Deterministic inputs to the confidence computation.
#[derive(Debug, Clone, Default)]
pub struct EvidenceSignals {
    pub chain_depth: u32,
    pub strong_signals: u32,
    pub contradicting_signals: u32,
    pub temporal_correlation: bool,
    pub historical_match: bool,
    pub direct_evidence: bool,
}

/// Factor weights: chain depth up to 30, corroboration up to 40, each
/// contradiction -25, temporal +15, historical +15, direct +20; clamped to
/// 0..=100.
pub fn compute_confidence(signals: &EvidenceSignals) -> u8 {
    let mut score: i32 = 0;
    score += (signals.chain_depth as i32 * 10).min(30);
    score += (signals.strong_signals as i32 * 20).min(40);
    score -= signals.contradicting_signals as i32 * 25;
    if signals.temporal_correlation {
        score += 15;
    }
    if signals.historical_match {
        score += 15;
    }
    if signals.direct_evidence {
        score += 20;
    }
    score.clamp(0, 100) as u8
}

pub fn confidence_level(confidence: u8) -> ConfidenceLevel {
    if confidence >= 70 {
        ConfidenceLevel::High
    } else if confidence >= 40 {
        ConfidenceLevel::Medium
    } else {
        ConfidenceLevel::Low
    }
}

/// Raw model verdict before local scoring replaces its confidence.
#[derive(Debug, Clone, Deserialize)]
struct EvaluationVerdict {
    #[serde(default)]
    evidence_strength: EvidenceStrength,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    action: crate::model::EvaluationAction,
    #[serde(default)]
    findings: Vec<String>,
    #[serde(default)]
    branch_hypotheses: Vec<crate::model::HypothesisSeed>,
    #[serde(default)]
    strong_signal_count: u32,
    #[serde(default)]
    contradicting_signal_count: u32,
    #[serde(default)]
    historical_match: bool,
    #[serde(default)]
    direct_evidence: bool,
    #[serde(default)]
    evidence_timestamp: Option<DateTime<Utc>>,
}

const EVALUATION_SYSTEM_PROMPT: &str = "You are evaluating evidence gathered for a root-cause hypothesis during an incident investigation. Judge only from the query results provided. Respond with a single JSON object.";

const EVALUATION_PROMPT: &str = r#"Hypothesis: {statement}

Evidence that would confirm it: {confirming}
Evidence that would refute it: {refuting}

Query results:
{results}

Classify the evidence and choose the next action. Respond as JSON:
{"evidence_strength": "strong|weak|none|contradicting|pending",
 "reasoning": "...",
 "action": "confirm|prune|branch|continue",
 "findings": ["..."],
 "branch_hypotheses": [{"statement": "...", "category": "...", "priority": 1}],
 "strong_signal_count": 0,
 "contradicting_signal_count": 0,
 "historical_match": false,
 "direct_evidence": false,
 "evidence_timestamp": null}"#;

pub struct EvidenceScorer {
    llm: Arc<dyn LLMClient>,
}

impl EvidenceScorer {
    pub fn new(llm: Arc<dyn LLMClient>) -> Self {
        Self { llm }
    }

    /// Ask the model for a strength verdict, then score confidence locally.
    pub async fn evaluate(
        &self,
        hypothesis: &Hypothesis,
        triage: Option<&TriageResult>,
    ) -> Result<EvidenceEvaluation> {
        let results_text = if hypothesis.query_results.is_empty() {
            "(no results yet)".to_string()
        } else {
            hypothesis
                .query_results
                .iter()
                .map(|(id, value)| format!("{id}: {value}"))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let prompt = EVALUATION_PROMPT
            .replace("{statement}", &hypothesis.statement)
            .replace("{confirming}", &hypothesis.confirming_evidence)
            .replace("{refuting}", &hypothesis.refuting_evidence)
            .replace("{results}", &results_text);

        let response = self
            .llm
            .chat(ChatRequest::new(EVALUATION_SYSTEM_PROMPT, prompt))
            .await?;
        let verdict: EvaluationVerdict = extract_json_as(&response.content)?;

        let signals = derive_signals(hypothesis, triage, &verdict);
        let confidence = compute_confidence(&signals);
        debug!(
            hypothesis = %hypothesis.id,
            strength = ?verdict.evidence_strength,
            confidence,
            "evidence scored"
        );

        Ok(EvidenceEvaluation {
            hypothesis_id: hypothesis.id.clone(),
            evidence_strength: verdict.evidence_strength,
            confidence,
            reasoning: verdict.reasoning,
            action: verdict.action,
            findings: verdict.findings,
            branch_hypotheses: verdict.branch_hypotheses,
        })
    }
}

fn derive_signals(
    hypothesis: &Hypothesis,
    triage: Option<&TriageResult>,
    verdict: &EvaluationVerdict,
) -> EvidenceSignals {
    let strong_signals = match verdict.evidence_strength {
        EvidenceStrength::Strong => verdict.strong_signal_count.max(1),
        _ => verdict.strong_signal_count,
    };
    let contradicting_signals = match verdict.evidence_strength {
        EvidenceStrength::Contradicting => verdict.contradicting_signal_count.max(1),
        _ => verdict.contradicting_signal_count,
    };

    let temporal_correlation = match (
        verdict.evidence_timestamp,
        triage.and_then(|t| t.time_window),
    ) {
        (Some(at), Some(window)) => {
            (at - window.start).num_minutes().abs() <= TEMPORAL_CORRELATION_MINUTES
        }
        _ => false,
    };

    EvidenceSignals {
        chain_depth: hypothesis.query_results.len() as u32,
        strong_signals,
        contradicting_signals,
        temporal_correlation,
        historical_match: verdict.historical_match,
        direct_evidence: verdict.direct_evidence,
    }
}
