//! Importance-scored context compaction

mod compactor;

pub use compactor::{
    CandidateResult, CompactionContext, CompactionOutcome, CompactionPreset, CompactionWeights,
    CompactorConfig, ContextCompactor,
};
