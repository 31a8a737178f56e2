//! # flowmine-mining
//!
//! Execution history and pattern learning for flowmine.
//!
//! This crate provides:
//! - The append-only execution history store
//! - Frequent-subsequence mining and pattern scoring
//! - Optimization analysis over named workflows
//! - Context-driven pattern recommendations

mod history;
mod miner;
pub mod optimizer;
mod recommend;

pub use history::HistoryStore;
pub use miner::{
    extract_variables, pattern_id, pattern_name, quality_score, MiningOptions, PatternMiner,
    WorkflowAnalysis, NAME_EXTRACTION, PHASE_EXTRACTION,
};
pub use recommend::{recommend, relevance, PatternRecommendation, RecommendationContext};
