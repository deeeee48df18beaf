//! Structured-output parsing with normalization
//!
//! Model output is extracted tolerantly, then normalized before strict
//! deserialization: nulls become absent fields and scalars become singleton
//! lists where the schema expects a list.

use serde_json::Value;

use ops_agents_core::{AgentError, Result};
use ops_agents_llm::extract::{extract_json, extract_json_array};

use crate::model::{
    Conclusion, EvidenceEvaluation, HypothesisSeed, RemediationStep, TriageResult,
};

const MAX_HYPOTHESES_PER_ROUND: usize = 5;

pub fn parse_triage(content: &str) -> Result<TriageResult> {
    let mut value = extract_json(content)?;
    normalize(
        &mut value,
        &["affected_services", "symptoms", "error_messages"],
    );
    serde_json::from_value(value).map_err(AgentError::from)
}

/// Accepts either a bare array or `{"hypotheses": [...]}`; yields 1–5 seeds.
pub fn parse_hypotheses(content: &str) -> Result<Vec<HypothesisSeed>> {
    let value = extract_json_array(content)
        .or_else(|_| extract_json(content).map(|v| v.get("hypotheses").cloned().unwrap_or(v)))?;

    let items = value
        .as_array()
        .cloned()
        .ok_or_else(|| AgentError::Schema("expected a hypothesis array".into()))?;

    let mut seeds = Vec::new();
    for mut item in items.into_iter().take(MAX_HYPOTHESES_PER_ROUND) {
        normalize(&mut item, &[]);
        let seed: HypothesisSeed = serde_json::from_value(item)?;
        seeds.push(seed);
    }

    if seeds.is_empty() {
        return Err(AgentError::Schema("model proposed no hypotheses".into()));
    }
    Ok(seeds)
}

pub fn parse_evaluation(content: &str) -> Result<EvidenceEvaluation> {
    let mut value = extract_json(content)?;
    normalize(&mut value, &["findings", "branch_hypotheses"]);
    // Tolerate a missing id; the caller overrides it with the current
    // hypothesis anyway.
    if value.get("hypothesis_id").is_none() {
        value["hypothesis_id"] = Value::String(String::new());
    }
    serde_json::from_value(value).map_err(AgentError::from)
}

pub fn parse_conclusion(content: &str) -> Result<Conclusion> {
    let mut value = extract_json(content)?;
    normalize(
        &mut value,
        &[
            "affected_services",
            "evidence_chain",
            "alternative_explanations",
            "unknowns",
        ],
    );
    serde_json::from_value(value).map_err(AgentError::from)
}

/// Accepts either a bare array or `{"steps": [...]}`. Steps get stable
/// `step_<n>` ids when the model omitted them.
pub fn parse_remediation(content: &str) -> Result<Vec<RemediationStep>> {
    let value = extract_json_array(content)
        .or_else(|_| extract_json(content).map(|v| v.get("steps").cloned().unwrap_or(v)))?;

    let items = value
        .as_array()
        .cloned()
        .ok_or_else(|| AgentError::Schema("expected a remediation step array".into()))?;

    let mut steps = Vec::new();
    for (i, mut item) in items.into_iter().enumerate() {
        normalize(&mut item, &[]);
        if item.get("id").is_none() {
            item["id"] = Value::String(format!("step_{}", i + 1));
        }
        let step: RemediationStep = serde_json::from_value(item)?;
        steps.push(step);
    }
    Ok(steps)
}

/// Drop nulls so `Option` fields read as absent, and wrap scalars in arrays
/// for the named list fields.
fn normalize(value: &mut Value, list_fields: &[&str]) {
    let Value::Object(map) = value else {
        return;
    };

    map.retain(|_, v| !v.is_null());

    for field in list_fields {
        if let Some(v) = map.get_mut(*field) {
            if !v.is_array() {
                *v = Value::Array(vec![v.take()]);
            }
        }
    }
}
