//! Pre-iteration compaction shared by both loops

use std::sync::Arc;

use ops_agents_context::{CandidateResult, CompactionContext, ContextCompactor};
use ops_agents_core::{estimate_tokens, AgentEvent};
use ops_agents_scratchpad::Scratchpad;

use crate::config::RunConfig;
use crate::events::EventBus;

/// Bring the tiered context back under the configured threshold. Returns
/// true when a compaction ran. With smart compaction off, falls back to
/// keep-last-N.
pub(crate) fn compact_pad(
    pad: &Arc<Scratchpad>,
    compactor: &ContextCompactor,
    config: &RunConfig,
    context: &CompactionContext,
    events: &EventBus,
) -> bool {
    let current = estimate_tokens(&pad.build_tiered_context());
    if current <= config.context_threshold_tokens {
        return false;
    }

    if !config.enable_smart_compaction {
        let cleared = pad.clear_oldest_tool_results(config.keep_tool_uses);
        events.emit(AgentEvent::ContextCleared {
            kept_full: config.keep_tool_uses,
            compacted: 0,
            cleared,
            estimated_tokens: estimate_tokens(&pad.build_tiered_context()),
        });
        return true;
    }

    let candidates: Vec<CandidateResult> = pad
        .tiered_results()
        .into_iter()
        .map(|(_, compact)| {
            let full_tokens = pad
                .full_result(&compact.result_id)
                .map(|v| estimate_tokens(&v.to_string()))
                .unwrap_or(0);
            let compact_tokens = estimate_tokens(&compact.context_line());
            CandidateResult {
                compact,
                full_tokens,
                compact_tokens,
            }
        })
        .collect();

    let outcome = compactor.plan(&candidates, context, config.context_threshold_tokens);
    let (kept_full, compacted, cleared) = pad.apply_compaction_plan(&outcome.plan);
    events.emit(AgentEvent::ContextCleared {
        kept_full,
        compacted,
        cleared,
        estimated_tokens: outcome.estimated_tokens,
    });
    true
}
