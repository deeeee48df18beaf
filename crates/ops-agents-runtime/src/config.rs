use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use ops_agents_context::CompactionPreset;
use ops_agents_tools::{ParallelExecutorConfig, ToolCacheConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheToggle {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(flatten)]
    pub config: ToolCacheConfig,
}

impl Default for CacheToggle {
    fn default() -> Self {
        Self {
            enabled: true,
            config: ToolCacheConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelToggle {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(flatten)]
    pub config: ParallelExecutorConfig,
}

impl Default for ParallelToggle {
    fn default() -> Self {
        Self {
            enabled: true,
            config: ParallelExecutorConfig::default(),
        }
    }
}

/// Per-run configuration; YAML-loadable with defaults for every field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Free-form agent loop iterations.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Investigation loop iterations.
    #[serde(default = "default_max_investigation_iterations")]
    pub max_investigation_iterations: u32,
    #[serde(default = "default_max_hypothesis_depth")]
    pub max_hypothesis_depth: usize,
    #[serde(default = "default_max_hypotheses")]
    pub max_hypotheses: usize,
    #[serde(default = "default_context_threshold_tokens")]
    pub context_threshold_tokens: usize,
    #[serde(default = "default_keep_tool_uses")]
    pub keep_tool_uses: usize,
    #[serde(default)]
    pub tool_limits: HashMap<String, usize>,
    #[serde(default)]
    pub compaction_preset: CompactionPreset,
    #[serde(default = "default_true")]
    pub enable_summarization: bool,
    #[serde(default)]
    pub enable_investigation_memory: bool,
    #[serde(default = "default_true")]
    pub enable_smart_compaction: bool,
    #[serde(default)]
    pub enable_infra_discovery: bool,
    #[serde(default)]
    pub cache: CacheToggle,
    #[serde(default)]
    pub parallel: ParallelToggle,
    #[serde(default)]
    pub explain_mode: bool,
    #[serde(default)]
    pub auto_approve_remediation: bool,
    /// Empty means every registered tool is available.
    #[serde(default)]
    pub available_tools: Vec<String>,
    #[serde(default)]
    pub known_services: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_log_group: Option<String>,
    #[serde(default = "default_session_dir")]
    pub session_dir: PathBuf,
}

fn default_true() -> bool {
    true
}

fn default_max_iterations() -> u32 {
    10
}

fn default_max_investigation_iterations() -> u32 {
    20
}

fn default_max_hypothesis_depth() -> usize {
    4
}

fn default_max_hypotheses() -> usize {
    10
}

fn default_context_threshold_tokens() -> usize {
    100_000
}

fn default_keep_tool_uses() -> usize {
    5
}

fn default_session_dir() -> PathBuf {
    PathBuf::from(".ops-agents/sessions")
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            max_investigation_iterations: default_max_investigation_iterations(),
            max_hypothesis_depth: default_max_hypothesis_depth(),
            max_hypotheses: default_max_hypotheses(),
            context_threshold_tokens: default_context_threshold_tokens(),
            keep_tool_uses: default_keep_tool_uses(),
            tool_limits: HashMap::new(),
            compaction_preset: CompactionPreset::default(),
            enable_summarization: true,
            enable_investigation_memory: false,
            enable_smart_compaction: true,
            enable_infra_discovery: false,
            cache: CacheToggle::default(),
            parallel: ParallelToggle::default(),
            explain_mode: false,
            auto_approve_remediation: false,
            available_tools: Vec::new(),
            known_services: Vec::new(),
            default_log_group: None,
            session_dir: default_session_dir(),
        }
    }
}

impl RunConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }
}
