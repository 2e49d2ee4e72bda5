//! Per-file review: prompt construction, the model call, and outcome classification.

pub mod invoker;
pub mod prompt;

pub use invoker::{strip_code_fence, ReviewInvoker, DEFAULT_DEADLINE};
pub use prompt::{build_review_prompt, LanguageCategory, PromptInput, FIX_MARKER};

use std::fmt;

/// Why a file was not sent to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Empty,
    TooLarge { chars: usize, limit: usize },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Empty => write!(f, "empty"),
            SkipReason::TooLarge { chars, limit } => {
                write!(f, "too large, {} chars > {}", chars, limit)
            }
        }
    }
}

/// Result of reviewing one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewOutcome {
    /// The model returned materially different content.
    Fixed(String),
    /// Nothing to change.
    Clean,
    Skipped(SkipReason),
    Error(String),
    /// The provider refused the call for rate or usage limits. Ends the batch.
    QuotaExceeded,
}

impl ReviewOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ReviewOutcome::Fixed(_) => "fixed",
            ReviewOutcome::Clean => "clean",
            ReviewOutcome::Skipped(_) => "skipped",
            ReviewOutcome::Error(_) => "error",
            ReviewOutcome::QuotaExceeded => "quota exceeded",
        }
    }
}
