//! Review runs
//!
//! One run = scan a folder, size the batch, then review files one at a time
//! in scan order. Only one run may be active per orchestrator; the lock is a
//! guard value, so every exit path (including panics and dropped futures)
//! releases it.

use crate::batch::{BatchChooser, BatchDecision, BatchPolicy};
use crate::llm::{ModelClient, ModelConnector, ModelError};
use crate::report::{NoticeLevel, Reporter};
use crate::review::{
    build_review_prompt, PromptInput, ReviewInvoker, ReviewOutcome, SkipReason, DEFAULT_DEADLINE,
};
use crate::scan::{FileCandidate, PathFilter, ScanError, TreeScanner};
use crate::util::truncate;
use crate::workspace::Workspace;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;


/// Longest error text kept in a single log line.
const MAX_LOG_ERROR_CHARS: usize = 300;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("No target folder given. Pass the folder to review.")]
    MissingFolder,
    #[error("{} is not a folder", .0.display())]
    NotADirectory(PathBuf),
    #[error("API key missing. Run `kritiq setup` or set KRITIQ_API_KEY.")]
    MissingCredential,
    #[error("A review is already running. Please wait for it to finish.")]
    AlreadyRunning,
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error("Could not create model client: {0}")]
    Connect(#[source] ModelError),
}

impl RunError {
    /// Errors caused by missing or invalid setup rather than by the run itself.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RunError::MissingFolder | RunError::NotADirectory(_) | RunError::MissingCredential
        )
    }
}

/// Single-run lock.
#[derive(Debug, Default)]
pub struct RunState {
    running: AtomicBool,
}

/// Held for the duration of a run; dropping it releases the lock.
#[must_use = "the run lock is released as soon as the guard is dropped"]
pub struct RunGuard<'a> {
    state: &'a RunState,
}

impl RunState {
    pub fn try_acquire(&self) -> Result<RunGuard<'_>, RunError> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| RunGuard { state: self })
            .map_err(|_| RunError::AlreadyRunning)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.state.running.store(false, Ordering::Release);
    }
}

/// Cooperative cancellation, checked between files.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub fixed: usize,
    /// Clean and skipped files
    pub clean: usize,
    pub errors: usize,
}

impl RunStats {
    pub fn summary(&self) -> String {
        format!(
            "Fixed: {} | Clean/Skipped: {} | Errors: {}",
            self.fixed, self.clean, self.errors
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Cancelled,
    QuotaExceeded,
    NoEligibleFiles,
    /// The user declined an over-limit batch.
    Declined,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub stats: RunStats,
    pub status: RunStatus,
    /// Undo point for files written during the run
    pub backup_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub folder: Option<PathBuf>,
    pub credential: Option<String>,
    pub mode: String,
    /// Review and classify, but never write.
    pub dry_run: bool,
}

#[derive(Debug, Clone)]
pub struct ReviewSettings {
    pub filter: PathFilter,
    pub policy: BatchPolicy,
    pub deadline: Duration,
    pub max_file_chars: usize,
}

impl Default for ReviewSettings {
    fn default() -> Self {
        Self {
            filter: PathFilter::default(),
            policy: BatchPolicy::default(),
            deadline: DEFAULT_DEADLINE,
            max_file_chars: crate::config::DEFAULT_MAX_FILE_CHARS,
        }
    }
}

pub struct Orchestrator<C, W, R> {
    connector: C,
    workspace: W,
    reporter: R,
    settings: ReviewSettings,
    state: RunState,
    stats: Mutex<RunStats>,
}

impl<C, W, R> Orchestrator<C, W, R>
where
    C: ModelConnector,
    W: Workspace,
    R: Reporter,
{
    pub fn new(connector: C, workspace: W, reporter: R, settings: ReviewSettings) -> Self {
        Self {
            connector,
            workspace,
            reporter,
            settings,
            state: RunState::default(),
            stats: Mutex::new(RunStats::default()),
        }
    }

    pub fn run_state(&self) -> &RunState {
        &self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Counters of the current or most recent run.
    pub fn stats(&self) -> RunStats {
        *self.stats.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn workspace(&self) -> &W {
        &self.workspace
    }

    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    fn update_stats(&self, f: impl FnOnce(&mut RunStats)) {
        let mut stats = self.stats.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut stats);
    }

    /// Review every file of the batch. Rejected immediately when a run is
    /// already active; nothing is touched in that case.
    pub async fn run(
        &self,
        request: RunRequest,
        chooser: &dyn BatchChooser,
        cancel: &CancelFlag,
    ) -> Result<RunReport, RunError> {
        let _guard = self.state.try_acquire()?;
        self.update_stats(|s| *s = RunStats::default());

        let folder = request.folder.ok_or(RunError::MissingFolder)?;
        if !folder.is_dir() {
            return Err(RunError::NotADirectory(folder));
        }
        let credential = request
            .credential
            .filter(|c| !c.trim().is_empty())
            .ok_or(RunError::MissingCredential)?;

        self.reporter
            .log(&format!("Scanning folder: {}", folder.display()));
        let scan = TreeScanner::new(self.settings.filter.clone()).scan(&folder)?;

        if !scan.is_empty() {
            self.log_enumeration(&scan.files);
        }

        let total = scan.len();
        let files = match self.settings.policy.decide(scan.files, chooser) {
            BatchDecision::Proceed(files) => files,
            BatchDecision::Empty => {
                self.reporter.log("No supported code files found.");
                self.reporter
                    .notify(NoticeLevel::Warning, "No supported code files found.");
                return Ok(self.report(RunStatus::NoEligibleFiles));
            }
            BatchDecision::Cancel => {
                self.reporter.log("Review cancelled before start.");
                return Ok(self.report(RunStatus::Declined));
            }
        };
        if files.len() < total {
            self.reporter.log(&format!(
                "Large project detected. Limiting to the first {} of {} files.",
                files.len(),
                total
            ));
        }

        let client = self
            .connector
            .connect(&credential)
            .map_err(RunError::Connect)?;
        let invoker = ReviewInvoker::new(&client, self.settings.deadline);
        let project_files: Vec<String> = files.iter().map(|f| f.name.clone()).collect();

        let mut status = RunStatus::Completed;
        for (index, file) in files.iter().enumerate() {
            if cancel.is_cancelled() {
                self.reporter.log("Operation cancelled by user.");
                status = RunStatus::Cancelled;
                break;
            }

            self.reporter.log(&format!(
                "Reviewing {}/{}: {}",
                index + 1,
                files.len(),
                file.name
            ));
            let outcome = self
                .review_file(&invoker, file, &project_files, &request.mode)
                .await;
            debug!(file = %file.path.display(), outcome = outcome.label(), "file reviewed");

            if !self.record_outcome(file, outcome, request.dry_run) {
                status = RunStatus::QuotaExceeded;
                break;
            }
        }

        let report = self.report(status);
        self.reporter.log(&format!("Review finished. {}", report.stats.summary()));
        self.reporter.notify(
            NoticeLevel::Info,
            &format!("Review complete! {}", report.stats.summary()),
        );
        Ok(report)
    }

    fn log_enumeration(&self, files: &[FileCandidate]) {
        self.reporter
            .log("---------------------------------------------------");
        self.reporter
            .log(&format!("Found {} files to review:", files.len()));
        for (i, file) in files.iter().enumerate() {
            self.reporter.log(&format!("{}. {}", i + 1, file.name));
        }
        self.reporter
            .log("---------------------------------------------------");
    }

    async fn review_file<M: ModelClient>(
        &self,
        invoker: &ReviewInvoker<'_, M>,
        file: &FileCandidate,
        project_files: &[String],
        mode: &str,
    ) -> ReviewOutcome {
        let content = match self.workspace.read_file_text(&file.path) {
            Ok(content) => content,
            Err(err) => return ReviewOutcome::Error(err.to_string()),
        };

        if content.trim().is_empty() {
            return ReviewOutcome::Skipped(SkipReason::Empty);
        }
        let chars = content.chars().count();
        if chars > self.settings.max_file_chars {
            return ReviewOutcome::Skipped(SkipReason::TooLarge {
                chars,
                limit: self.settings.max_file_chars,
            });
        }

        let prompt = build_review_prompt(PromptInput {
            content: &content,
            file_name: &file.name,
            project_files,
            mode,
        });
        invoker.invoke(&prompt, &content).await
    }

    /// Count and log one outcome. Returns false when the batch must stop.
    fn record_outcome(&self, file: &FileCandidate, outcome: ReviewOutcome, dry_run: bool) -> bool {
        let name = &file.name;
        match outcome {
            ReviewOutcome::Fixed(_) if dry_run => {
                self.update_stats(|s| s.fixed += 1);
                self.reporter.log(&format!("WOULD FIX: {}", name));
            }
            ReviewOutcome::Fixed(new_content) => {
                match self.workspace.replace_file_content(&file.path, &new_content) {
                    Ok(()) => {
                        self.update_stats(|s| s.fixed += 1);
                        self.reporter.log(&format!("FIXED: {}", name));
                    }
                    Err(err) => {
                        self.update_stats(|s| s.errors += 1);
                        self.reporter.log(&format!(
                            "ERROR {}: write failed: {}",
                            name,
                            truncate(&err.to_string(), MAX_LOG_ERROR_CHARS)
                        ));
                    }
                }
            }
            ReviewOutcome::Clean => {
                self.update_stats(|s| s.clean += 1);
                self.reporter.log(&format!("CLEAN: {}", name));
            }
            ReviewOutcome::Skipped(reason) => {
                self.update_stats(|s| s.clean += 1);
                self.reporter.log(&format!("Skipped {} ({})", name, reason));
            }
            ReviewOutcome::Error(message) => {
                self.update_stats(|s| s.errors += 1);
                self.reporter.log(&format!(
                    "ERROR {}: {}",
                    name,
                    truncate(&message, MAX_LOG_ERROR_CHARS)
                ));
            }
            ReviewOutcome::QuotaExceeded => {
                self.update_stats(|s| s.errors += 1);
                self.reporter.log("MODEL QUOTA EXCEEDED. Stopping.");
                self.reporter.notify(
                    NoticeLevel::Error,
                    "Model API quota exceeded. Stopping review; files already fixed are kept.",
                );
                return false;
            }
        }
        true
    }

    fn report(&self, status: RunStatus) -> RunReport {
        RunReport {
            stats: self.stats(),
            status,
            backup_id: self.workspace.backup_id(),
        }
    }
}
