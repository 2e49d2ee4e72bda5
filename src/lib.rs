//! Kritiq library crate
//!
//! Batch code review: scan a folder, send each eligible file to a language
//! model, and write the corrected file back when the model changed it.

pub mod batch;
pub mod config;
pub mod llm;
pub mod orchestrator;
pub mod report;
pub mod review;
pub mod scan;
pub mod util;
pub mod workspace;
