//! Prompt templates and builders
//!
//! Plain placeholder substitution; every structured prompt spells out the
//! exact JSON shape the parser expects.

use ops_agents_core::KnowledgeBundle;
use ops_agents_investigation::{Conclusion, EvidenceLink, TriageResult};

pub const TRIAGE_SYSTEM: &str = "You are an SRE triaging a production incident. Summarize what is known before any deep investigation. Respond with a single JSON object.";

const TRIAGE_PROMPT: &str = r#"Incident query: {query}

Signals gathered so far:
{signals}

Relevant knowledge:
{knowledge}

Produce a triage assessment as JSON:
{"incident_id": null, "summary": "...", "affected_services": ["..."],
 "symptoms": ["..."], "error_messages": ["..."],
 "severity": "low|medium|high|critical",
 "time_window": {"start": "...", "end": "..."}}"#;

pub fn triage_prompt(query: &str, signals: &str, knowledge: &str) -> String {
    TRIAGE_PROMPT
        .replace("{query}", query)
        .replace("{signals}", if signals.is_empty() { "(none)" } else { signals })
        .replace(
            "{knowledge}",
            if knowledge.is_empty() { "(none)" } else { knowledge },
        )
}

pub const HYPOTHESIS_SYSTEM: &str = "You are forming root-cause hypotheses for a production incident. Each hypothesis must be testable with observability queries. Respond with a single JSON array.";

const HYPOTHESIS_PROMPT: &str = r#"Triage summary: {summary}
Affected services: {services}
Symptoms: {symptoms}
Error messages: {errors}

Propose 1-5 root-cause hypotheses, most likely first, as a JSON array:
[{"statement": "...",
  "category": "infrastructure|application|dependency|configuration|capacity|unknown",
  "priority": 1,
  "confirming_evidence": "what would confirm this",
  "refuting_evidence": "what would refute this",
  "reasoning": "..."}]"#;

pub fn hypothesis_prompt(triage: &TriageResult) -> String {
    HYPOTHESIS_PROMPT
        .replace("{summary}", &triage.summary)
        .replace("{services}", &join_or_none(&triage.affected_services))
        .replace("{symptoms}", &join_or_none(&triage.symptoms))
        .replace("{errors}", &join_or_none(&triage.error_messages))
}

pub const CONCLUSION_SYSTEM: &str = "You are concluding an incident investigation. State the root cause supported by the evidence chain; surface alternatives the evidence contradicted. Respond with a single JSON object.";

const CONCLUSION_PROMPT: &str = r#"Incident query: {query}

Evidence chain:
{evidence}

Hypotheses and their outcomes:
{hypotheses}

Produce the conclusion as JSON:
{"root_cause": "...", "confidence": "high|medium|low",
 "confirmed_hypothesis_id": "h_n or null",
 "affected_services": ["..."],
 "evidence_chain": [{"finding": "...", "source": "...", "strength": "strong|weak"}],
 "alternative_explanations": ["..."], "unknowns": ["..."]}"#;

pub fn conclusion_prompt(query: &str, evidence: &[EvidenceLink], hypotheses: &str) -> String {
    let evidence_text = if evidence.is_empty() {
        "(none collected)".to_string()
    } else {
        evidence
            .iter()
            .map(|link| {
                format!(
                    "- [{:?}] {} (source: {})",
                    link.strength, link.finding, link.source
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };
    CONCLUSION_PROMPT
        .replace("{query}", query)
        .replace("{evidence}", &evidence_text)
        .replace("{hypotheses}", hypotheses)
}

pub const REMEDIATION_SYSTEM: &str = "You are planning remediation for a diagnosed incident. Prefer reversible, low-risk steps; every step must be concretely executable. Respond with a single JSON array of steps.";

const REMEDIATION_PROMPT: &str = r#"Root cause: {root_cause}
Affected services: {services}

Available runbooks:
{runbooks}

Code-change candidates:
{code_refs}

Propose remediation steps as a JSON array:
[{"action": "...", "description": "...", "command": null,
  "rollback_command": null, "code_reference": null,
  "risk_level": "low|medium|high|critical", "requires_approval": true,
  "matching_skill": null, "matching_runbook": null}]"#;

pub fn remediation_prompt(
    conclusion: &Conclusion,
    runbook_titles: &[String],
    code_refs: &str,
) -> String {
    REMEDIATION_PROMPT
        .replace("{root_cause}", &conclusion.root_cause)
        .replace("{services}", &join_or_none(&conclusion.affected_services))
        .replace("{runbooks}", &join_or_none(runbook_titles))
        .replace(
            "{code_refs}",
            if code_refs.is_empty() { "(none)" } else { code_refs },
        )
}

pub const ITERATION_SYSTEM: &str = "You are an SRE assistant with read access to observability tools. Use tools when you need data; answer directly once you have enough. Previously summarized results can be fetched in full with get_full_result.";

const ITERATION_PROMPT: &str = r#"Question: {query}

{knowledge}Collected results so far:
{context}

Tool usage: {usage}
{warnings}"#;

pub fn iteration_prompt(
    query: &str,
    context: &str,
    usage: &str,
    knowledge: Option<&str>,
    warnings: &[String],
) -> String {
    let knowledge_block = match knowledge {
        Some(text) if !text.is_empty() => format!("Background knowledge:\n{text}\n\n"),
        _ => String::new(),
    };
    let warnings_block = if warnings.is_empty() {
        String::new()
    } else {
        format!("Warnings:\n{}", warnings.join("\n"))
    };
    ITERATION_PROMPT
        .replace("{query}", query)
        .replace("{knowledge}", &knowledge_block)
        .replace(
            "{context}",
            if context.is_empty() { "(none)" } else { context },
        )
        .replace("{usage}", usage)
        .replace("{warnings}", &warnings_block)
}

pub const KNOWLEDGE_SYSTEM: &str = "You are answering an operational how-to question strictly from the runbooks provided. Do not call tools. Cite the runbooks you used.";

const KNOWLEDGE_PROMPT: &str = r#"Question: {query}

Runbooks:
{docs}

Answer from the runbooks above."#;

pub fn knowledge_prompt(query: &str, bundle: &KnowledgeBundle) -> String {
    let docs = bundle
        .all_docs()
        .map(|doc| format!("## {}\n{}", doc.title, doc.content))
        .collect::<Vec<_>>()
        .join("\n\n");
    KNOWLEDGE_PROMPT
        .replace("{query}", query)
        .replace("{docs}", &docs)
}

pub fn sources_section(bundle: &KnowledgeBundle) -> String {
    let mut lines = vec!["Sources:".to_string()];
    for doc in bundle.all_docs() {
        match &doc.source_url {
            Some(url) => lines.push(format!("- {} ({url})", doc.title)),
            None => lines.push(format!("- {}", doc.title)),
        }
    }
    lines.join("\n")
}

pub const STRICT_JSON_REMINDER: &str =
    "Your previous reply could not be parsed. Respond with ONLY the JSON described, no prose, no code fences.";

fn join_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join(", ")
    }
}
