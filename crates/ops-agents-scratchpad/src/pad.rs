use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write as IoWrite};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::debug;

use ops_agents_core::{
    CompactToolResult, CompactionPlan, Result, ToolCall, ToolResultTier,
};

use crate::entry::ScratchpadEntry;
use crate::limits::{GracefulLimits, LimitCheck, ToolLimitConfig};
use crate::session::generate_session_id;

/// One tool result in the tiered in-memory store. The full body is dropped
/// when the tier falls to `Cleared`; the compact summary always remains so
/// the model can still reference the result id.
#[derive(Debug, Clone)]
pub struct StoredToolResult {
    pub tier: ToolResultTier,
    pub full: Option<Value>,
    pub compact: CompactToolResult,
}

/// Append-only session log with an in-memory mirror.
///
/// The on-disk file is never truncated or rewritten; compaction only changes
/// the in-memory view. The process holds the append handle exclusively.
pub struct Scratchpad {
    session_id: String,
    path: PathBuf,
    file: Mutex<File>,
    entries: RwLock<Vec<ScratchpadEntry>>,
    order: RwLock<Vec<String>>,
    results: RwLock<HashMap<String, StoredToolResult>>,
    limits: RwLock<GracefulLimits>,
}

impl Scratchpad {
    pub fn create(base_dir: impl AsRef<Path>, limits: ToolLimitConfig) -> Result<Self> {
        Self::create_with_id(base_dir, generate_session_id(), limits)
    }

    pub fn create_with_id(
        base_dir: impl AsRef<Path>,
        session_id: String,
        limits: ToolLimitConfig,
    ) -> Result<Self> {
        let base = base_dir.as_ref();
        std::fs::create_dir_all(base)?;
        let path = base.join(format!("{session_id}.jsonl"));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            session_id,
            path,
            file: Mutex::new(file),
            entries: RwLock::new(Vec::new()),
            order: RwLock::new(Vec::new()),
            results: RwLock::new(HashMap::new()),
            limits: RwLock::new(GracefulLimits::new(limits)),
        })
    }

    /// Re-open an existing session file and rebuild the in-memory history.
    /// Tool results come back at the `Full` tier; compaction state is not
    /// persisted.
    pub fn resume(
        base_dir: impl AsRef<Path>,
        session_id: &str,
        limits: ToolLimitConfig,
    ) -> Result<Self> {
        let path = base_dir.as_ref().join(format!("{session_id}.jsonl"));
        let reader = BufReader::new(File::open(&path)?);

        let mut entries = Vec::new();
        let mut order = Vec::new();
        let mut results = HashMap::new();
        let mut tracker = GracefulLimits::new(limits);

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: ScratchpadEntry = serde_json::from_str(&line)?;
            if let ScratchpadEntry::ToolResult {
                result_id,
                tool_name,
                arguments,
                output,
                compact,
                ..
            } = &entry
            {
                order.push(result_id.clone());
                results.insert(
                    result_id.clone(),
                    StoredToolResult {
                        tier: ToolResultTier::Full,
                        full: Some(output.clone()),
                        compact: compact.clone(),
                    },
                );
                tracker.record(tool_name, &arguments.to_string());
            }
            entries.push(entry);
        }

        let file = OpenOptions::new().append(true).open(&path)?;
        Ok(Self {
            session_id: session_id.to_string(),
            path,
            file: Mutex::new(file),
            entries: RwLock::new(entries),
            order: RwLock::new(order),
            results: RwLock::new(results),
            limits: RwLock::new(tracker),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> Vec<ScratchpadEntry> {
        self.entries.read().clone()
    }

    /// Write one entry and flush before returning.
    pub fn append(&self, entry: ScratchpadEntry) -> Result<()> {
        let line = serde_json::to_string(&entry)?;
        {
            let mut file = self.file.lock();
            writeln!(file, "{line}")?;
            file.flush()?;
        }
        self.entries.write().push(entry);
        Ok(())
    }

    /// Store a tool result in both forms and log it. Returns the result id
    /// assigned by the summarizer.
    pub fn append_tool_result(
        &self,
        call: &ToolCall,
        output: Value,
        compact: CompactToolResult,
    ) -> Result<String> {
        let result_id = compact.result_id.clone();

        self.append(ScratchpadEntry::ToolResult {
            timestamp: Utc::now(),
            result_id: result_id.clone(),
            tool_name: call.name.clone(),
            arguments: call.arguments.clone(),
            output: output.clone(),
            compact: compact.clone(),
        })?;

        self.order.write().push(result_id.clone());
        self.results.write().insert(
            result_id.clone(),
            StoredToolResult {
                tier: ToolResultTier::Full,
                full: Some(output),
                compact,
            },
        );
        self.limits
            .write()
            .record(&call.name, &call.arguments.to_string());

        Ok(result_id)
    }

    pub fn tool_results(&self) -> Vec<CompactToolResult> {
        let order = self.order.read();
        let results = self.results.read();
        order
            .iter()
            .filter_map(|id| results.get(id).map(|r| r.compact.clone()))
            .collect()
    }

    /// Results in insertion order with their current tier.
    pub fn tiered_results(&self) -> Vec<(ToolResultTier, CompactToolResult)> {
        let order = self.order.read();
        let results = self.results.read();
        order
            .iter()
            .filter_map(|id| results.get(id).map(|r| (r.tier, r.compact.clone())))
            .collect()
    }

    pub fn full_result(&self, result_id: &str) -> Option<Value> {
        self.results
            .read()
            .get(result_id)
            .and_then(|r| r.full.clone())
    }

    /// Frozen view for the drill-down tool. Cleared bodies are absent.
    pub fn full_results_snapshot(&self) -> Arc<HashMap<String, Value>> {
        let results = self.results.read();
        Arc::new(
            results
                .iter()
                .filter_map(|(id, r)| r.full.clone().map(|v| (id.clone(), v)))
                .collect(),
        )
    }

    /// Render the tiered store as prompt context. Cleared results keep a
    /// metadata header so the model can ask for them by id.
    pub fn build_tiered_context(&self) -> String {
        let order = self.order.read();
        let results = self.results.read();

        let mut sections = Vec::new();
        for id in order.iter() {
            let Some(stored) = results.get(id) else {
                continue;
            };
            match stored.tier {
                ToolResultTier::Full => {
                    let body = stored
                        .full
                        .as_ref()
                        .map(|v| v.to_string())
                        .unwrap_or_default();
                    sections.push(format!("{}\n{}", stored.compact.context_line(), body));
                }
                ToolResultTier::Compact => sections.push(stored.compact.context_line()),
                ToolResultTier::Cleared => sections.push(format!(
                    "[{}] {} (cleared; retrieve with get_full_result)",
                    stored.compact.result_id, stored.compact.tool_name
                )),
            }
        }
        sections.join("\n")
    }

    /// Naive fallback compaction: everything but the newest `keep` results
    /// drops to the cleared tier. Returns how many were cleared.
    pub fn clear_oldest_tool_results(&self, keep: usize) -> usize {
        let order = self.order.read().clone();
        let mut results = self.results.write();

        let cutoff = order.len().saturating_sub(keep);
        let mut cleared = 0;
        for id in &order[..cutoff] {
            if let Some(stored) = results.get_mut(id) {
                if stored.tier != ToolResultTier::Cleared {
                    stored.tier = ToolResultTier::Cleared;
                    stored.full = None;
                    cleared += 1;
                }
            }
        }
        debug!(cleared, keep, "cleared oldest tool results");
        cleared
    }

    /// Apply a compactor-produced plan. Returns (full, compact, cleared)
    /// counts after application.
    pub fn apply_compaction_plan(&self, plan: &CompactionPlan) -> (usize, usize, usize) {
        let mut results = self.results.write();
        for (id, tier) in &plan.assignments {
            if let Some(stored) = results.get_mut(id) {
                // A cleared body cannot be resurrected in memory.
                if *tier == ToolResultTier::Full && stored.full.is_none() {
                    stored.tier = ToolResultTier::Compact;
                    continue;
                }
                stored.tier = *tier;
                if *tier == ToolResultTier::Cleared {
                    stored.full = None;
                }
            }
        }

        let mut counts = (0, 0, 0);
        for stored in results.values() {
            match stored.tier {
                ToolResultTier::Full => counts.0 += 1,
                ToolResultTier::Compact => counts.1 += 1,
                ToolResultTier::Cleared => counts.2 += 1,
            }
        }
        counts
    }

    pub fn can_call_tool(&self, tool: &str, args_text: Option<&str>) -> LimitCheck {
        self.limits.read().check(tool, args_text)
    }

    pub fn tool_usage_summary(&self) -> String {
        self.limits.read().usage_summary()
    }
}
