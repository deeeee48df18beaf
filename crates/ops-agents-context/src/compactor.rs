use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use ops_agents_core::{CompactToolResult, CompactionPlan, ToolResultTier};

/// Rough token cost of the metadata header a cleared result leaves behind.
const CLEARED_HEADER_TOKENS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CompactionPreset {
    #[default]
    Incident,
    Research,
    Balanced,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionWeights {
    pub recency: f64,
    pub service_match: f64,
    pub error_signal: f64,
    pub hypothesis_overlap: f64,
    pub health: f64,
}

impl CompactionPreset {
    pub fn weights(&self) -> CompactionWeights {
        match self {
            // Incidents: what is broken and where beats everything else.
            CompactionPreset::Incident => CompactionWeights {
                recency: 0.15,
                service_match: 0.30,
                error_signal: 0.25,
                hypothesis_overlap: 0.10,
                health: 0.20,
            },
            // Research: stay on the current question.
            CompactionPreset::Research => CompactionWeights {
                recency: 0.25,
                service_match: 0.10,
                error_signal: 0.10,
                hypothesis_overlap: 0.35,
                health: 0.20,
            },
            CompactionPreset::Balanced => CompactionWeights {
                recency: 0.20,
                service_match: 0.20,
                error_signal: 0.20,
                hypothesis_overlap: 0.20,
                health: 0.20,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactorConfig {
    #[serde(default)]
    pub preset: CompactionPreset,
    #[serde(default = "default_keep_tool_uses")]
    pub keep_tool_uses: usize,
}

fn default_keep_tool_uses() -> usize {
    5
}

impl Default for CompactorConfig {
    fn default() -> Self {
        Self {
            preset: CompactionPreset::default(),
            keep_tool_uses: default_keep_tool_uses(),
        }
    }
}

/// One stored result as the compactor sees it: the compact summary plus the
/// token cost of each tier.
#[derive(Debug, Clone)]
pub struct CandidateResult {
    pub compact: CompactToolResult,
    pub full_tokens: usize,
    pub compact_tokens: usize,
}

/// Investigation context the scoring factors read.
#[derive(Debug, Clone, Default)]
pub struct CompactionContext {
    pub query: String,
    pub affected_services: Vec<String>,
    pub hypothesis_statement: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CompactionOutcome {
    pub plan: CompactionPlan,
    pub estimated_tokens: usize,
}

pub struct ContextCompactor {
    config: CompactorConfig,
}

impl ContextCompactor {
    pub fn new(config: CompactorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompactorConfig {
        &self.config
    }

    /// Assign every candidate a tier such that the estimated context cost
    /// fits the budget where possible. Candidates must be in insertion
    /// order; the newest `keep_tool_uses` are always kept full.
    pub fn plan(
        &self,
        candidates: &[CandidateResult],
        context: &CompactionContext,
        budget_tokens: usize,
    ) -> CompactionOutcome {
        let total = candidates.len();
        let protected_from = total.saturating_sub(self.config.keep_tool_uses);
        let weights = self.config.preset.weights();

        let mut plan = CompactionPlan::new();
        let mut spent = 0usize;

        // Protected results first: they are kept full no matter the budget.
        for candidate in &candidates[protected_from..] {
            plan.assign(candidate.compact.result_id.clone(), ToolResultTier::Full);
            spent += candidate.full_tokens;
        }

        // Everything older competes for the remaining budget by score.
        let mut scored: Vec<(usize, f64)> = candidates[..protected_from]
            .iter()
            .enumerate()
            .map(|(i, c)| (i, self.score(c, i, total, context, &weights)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let remaining = budget_tokens.saturating_sub(spent);
        let mut pool = remaining;
        for (index, score) in scored {
            let candidate = &candidates[index];
            let id = candidate.compact.result_id.clone();

            if score >= 0.5 && candidate.full_tokens + CLEARED_HEADER_TOKENS <= pool {
                plan.assign(id, ToolResultTier::Full);
                pool -= candidate.full_tokens;
            } else if candidate.compact_tokens + CLEARED_HEADER_TOKENS <= pool {
                plan.assign(id, ToolResultTier::Compact);
                pool -= candidate.compact_tokens;
            } else if CLEARED_HEADER_TOKENS <= pool {
                plan.assign(id, ToolResultTier::Cleared);
                pool -= CLEARED_HEADER_TOKENS;
            } else {
                plan.assign(id, ToolResultTier::Cleared);
            }
        }

        let estimated_tokens = estimate_plan_cost(&plan, candidates);
        debug!(
            total,
            estimated_tokens,
            budget_tokens,
            full = plan.count(ToolResultTier::Full),
            compact = plan.count(ToolResultTier::Compact),
            cleared = plan.count(ToolResultTier::Cleared),
            "compaction plan computed"
        );

        CompactionOutcome {
            plan,
            estimated_tokens,
        }
    }

    fn score(
        &self,
        candidate: &CandidateResult,
        index: usize,
        total: usize,
        context: &CompactionContext,
        weights: &CompactionWeights,
    ) -> f64 {
        let recency = if total <= 1 {
            1.0
        } else {
            (index + 1) as f64 / total as f64
        };

        let service_match = if candidate
            .compact
            .services
            .iter()
            .any(|s| context.affected_services.iter().any(|a| a == s))
        {
            1.0
        } else {
            0.0
        };

        let error_signal = if candidate.compact.is_error
            || candidate.compact.health.severity_rank() >= 3
        {
            1.0
        } else {
            0.0
        };

        let overlap_target = context
            .hypothesis_statement
            .as_deref()
            .unwrap_or(&context.query);
        let overlap = token_overlap(
            overlap_target,
            &format!("{} {}", candidate.compact.tool_name, candidate.compact.summary),
        );

        let health = candidate.compact.health.severity_rank() as f64 / 3.0;

        weights.recency * recency
            + weights.service_match * service_match
            + weights.error_signal * error_signal
            + weights.hypothesis_overlap * overlap
            + weights.health * health
    }
}

impl Default for ContextCompactor {
    fn default() -> Self {
        Self::new(CompactorConfig::default())
    }
}

fn estimate_plan_cost(plan: &CompactionPlan, candidates: &[CandidateResult]) -> usize {
    candidates
        .iter()
        .map(|c| match plan.tier_for(&c.compact.result_id) {
            Some(ToolResultTier::Full) => c.full_tokens,
            Some(ToolResultTier::Compact) => c.compact_tokens,
            Some(ToolResultTier::Cleared) | None => CLEARED_HEADER_TOKENS,
        })
        .sum()
}

fn token_overlap(a: &str, b: &str) -> f64 {
    let set_a: HashSet<String> = a.split_whitespace().map(str::to_lowercase).collect();
    let set_b: HashSet<String> = b.split_whitespace().map(str::to_lowercase).collect();
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let overlap = set_a.intersection(&set_b).count();
    overlap as f64 / set_a.len().min(set_b.len()) as f64
}
