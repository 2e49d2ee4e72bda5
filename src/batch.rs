//! Batch sizing
//!
//! Large folders are capped before any model call is made. The cap either
//! truncates silently or asks the user; in both cases scan order is kept.

use serde::{Deserialize, Serialize};

/// Default number of files reviewed in one run.
pub const DEFAULT_BATCH_LIMIT: usize = 15;

/// What to do when more files than the limit are eligible.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OverLimit {
    /// Keep the first `limit` files and carry on.
    #[default]
    Truncate,
    /// Ask whether to review everything, the first `limit` files, or nothing.
    Ask,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPolicy {
    pub limit: usize,
    pub over_limit: OverLimit,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            limit: DEFAULT_BATCH_LIMIT,
            over_limit: OverLimit::Truncate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchChoice {
    All,
    FirstN,
    Cancel,
}

/// Answers the over-limit question for `OverLimit::Ask`.
pub trait BatchChooser {
    fn choose(&self, total: usize, limit: usize) -> BatchChoice;
}

/// Chooser for non-interactive runs: always takes the first `limit` files.
pub struct TruncateChooser;

impl BatchChooser for TruncateChooser {
    fn choose(&self, _total: usize, _limit: usize) -> BatchChoice {
        BatchChoice::FirstN
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchDecision<T> {
    Proceed(Vec<T>),
    /// Nothing eligible was found.
    Empty,
    Cancel,
}

impl BatchPolicy {
    pub fn decide<T>(&self, mut candidates: Vec<T>, chooser: &dyn BatchChooser) -> BatchDecision<T> {
        if candidates.is_empty() {
            return BatchDecision::Empty;
        }
        if candidates.len() <= self.limit {
            return BatchDecision::Proceed(candidates);
        }

        let choice = match self.over_limit {
            OverLimit::Truncate => BatchChoice::FirstN,
            OverLimit::Ask => chooser.choose(candidates.len(), self.limit),
        };

        match choice {
            BatchChoice::All => BatchDecision::Proceed(candidates),
            BatchChoice::FirstN => {
                candidates.truncate(self.limit);
                BatchDecision::Proceed(candidates)
            }
            BatchChoice::Cancel => BatchDecision::Cancel,
        }
    }
}
