use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kritiq::batch::{BatchChoice, BatchChooser, OverLimit, TruncateChooser};
use kritiq::config::{self, Config};
use kritiq::llm::{Provider, ProviderConnector};
use kritiq::orchestrator::{
    CancelFlag, Orchestrator, ReviewSettings, RunError, RunRequest, RunStatus,
};
use kritiq::report::ConsoleReporter;
use kritiq::scan::TreeScanner;
use kritiq::workspace::{undo_latest, BackupSet, FsWorkspace, WorkspaceError};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Log filter variable, e.g. `KRITIQ_LOG=kritiq=debug`.
const LOG_ENV: &str = "KRITIQ_LOG";

#[derive(Parser, Debug)]
#[command(
    name = "kritiq",
    about = "Batch code review that fixes files in place",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Review every eligible file in a folder and write fixes back
    Review {
        /// Folder to review
        folder: PathBuf,

        /// Review mode label passed to the model (default: from config)
        #[arg(short, long)]
        mode: Option<String>,

        /// Maximum number of files per run
        #[arg(short, long)]
        limit: Option<usize>,

        /// Ask before reviewing more files than the limit
        #[arg(long)]
        ask: bool,

        /// Report what would change without writing anything
        #[arg(long)]
        dry_run: bool,

        #[arg(long, value_enum)]
        provider: Option<Provider>,

        /// Model id (default: provider default)
        #[arg(long)]
        model: Option<String>,

        /// Also append the run log to this file
        #[arg(long)]
        log_file: Option<PathBuf>,
    },
    /// List the files a review would pick up, without calling the model
    Scan {
        folder: PathBuf,
    },
    /// Restore the files changed by the most recent review
    Undo,
    /// Store the API key in the system keychain
    Setup {
        #[arg(long, value_enum)]
        provider: Option<Provider>,
    },
}

/// Asks on the terminal how to handle an over-limit batch.
struct StdinChooser;

impl BatchChooser for StdinChooser {
    fn choose(&self, total: usize, limit: usize) -> BatchChoice {
        eprintln!();
        eprintln!("  Found {} files (limit is {}).", total, limit);
        eprint!("  Review [a]ll, the [f]irst {}, or [c]ancel? ", limit);
        let _ = io::stderr().flush();

        let mut answer = String::new();
        if io::stdin().read_line(&mut answer).is_err() {
            return BatchChoice::Cancel;
        }
        match answer.trim().to_lowercase().as_str() {
            "a" | "all" => BatchChoice::All,
            "f" | "first" => BatchChoice::FirstN,
            _ => BatchChoice::Cancel,
        }
    }
}

fn init_tracing() {
    let default_level = "warn";
    let env_filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let mut config = Config::load();

    match args.command {
        Command::Review {
            folder,
            mode,
            limit,
            ask,
            dry_run,
            provider,
            model,
            log_file,
        } => {
            if let Some(provider) = provider {
                config.provider = provider;
                config.model = None;
            }
            if model.is_some() {
                config.model = model;
            }
            if let Some(limit) = limit {
                config.batch_limit = limit;
            }
            if ask {
                config.over_limit = OverLimit::Ask;
            }
            let mode = mode.unwrap_or_else(|| config.review_mode.clone());
            run_review(&config, folder, mode, dry_run, log_file).await
        }
        Command::Scan { folder } => run_scan(&config, folder),
        Command::Undo => run_undo(&config),
        Command::Setup { provider } => {
            if let Some(provider) = provider {
                config.provider = provider;
                config.save()?;
            }
            config::setup_api_key_interactive(&config)
        }
    }
}

async fn run_review(
    config: &Config,
    folder: PathBuf,
    mode: String,
    dry_run: bool,
    log_file: Option<PathBuf>,
) -> Result<()> {
    let folder = std::path::absolute(&folder)
        .with_context(|| format!("Failed to resolve {}", folder.display()))?;
    let reporter = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            ConsoleReporter::with_log_file(file)
        }
        None => ConsoleReporter::new(),
    };

    let workspace = match config.backup_root().filter(|_| config.keep_backups && !dry_run) {
        Some(root) => {
            let root = std::path::absolute(&root)
                .with_context(|| format!("Failed to resolve {}", root.display()))?;
            FsWorkspace::with_backups(BackupSet::new(&root, &folder))
        }
        None => FsWorkspace::new(),
    };

    let connector = ProviderConnector {
        provider: config.provider,
        model: config.model_id(),
        timeout_secs: config.request_timeout_secs,
    };
    let settings = ReviewSettings {
        filter: config.path_filter(),
        policy: config.batch_policy(),
        deadline: config.request_timeout(),
        max_file_chars: config.max_file_chars,
    };
    let orchestrator = Orchestrator::new(connector, workspace, reporter, settings);

    let cancel = CancelFlag::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n  Cancelling after the current file...");
            on_ctrl_c.cancel();
        }
    });

    let chooser: &dyn BatchChooser = match config.over_limit {
        OverLimit::Ask => &StdinChooser,
        OverLimit::Truncate => &TruncateChooser,
    };

    let request = RunRequest {
        folder: Some(folder),
        credential: config.get_api_key(),
        mode,
        dry_run,
    };

    let report = match orchestrator.run(request, chooser, &cancel).await {
        Ok(report) => report,
        Err(err @ RunError::MissingCredential) => {
            eprintln!("  ! {}", err);
            eprintln!("  Config: {}", Config::config_location());
            std::process::exit(2);
        }
        Err(err) if err.is_configuration() => {
            eprintln!("  ! {}", err);
            std::process::exit(2);
        }
        Err(err) => return Err(err.into()),
    };

    if let Some(id) = &report.backup_id {
        eprintln!("  Backup saved ({}). Run `kritiq undo` to restore.", id);
    }
    if report.status == RunStatus::QuotaExceeded {
        std::process::exit(3);
    }
    Ok(())
}

fn run_scan(config: &Config, folder: PathBuf) -> Result<()> {
    let scan = TreeScanner::new(config.path_filter())
        .scan(&folder)
        .with_context(|| format!("Failed to scan {}", folder.display()))?;

    if scan.is_empty() {
        eprintln!("  No supported code files found.");
        return Ok(());
    }

    let limit = config.batch_policy().limit;
    for (i, file) in scan.files.iter().enumerate() {
        println!("{:>4}. {}", i + 1, file.path.display());
    }
    eprintln!();
    eprintln!(
        "  {} files eligible; a review takes the first {}.",
        scan.len(),
        limit.min(scan.len())
    );
    Ok(())
}

fn run_undo(config: &Config) -> Result<()> {
    let root = config
        .backup_root()
        .context("Could not determine backup directory")?;

    match undo_latest(&root) {
        Ok(restored) => {
            for path in &restored {
                println!("  restored {}", path.display());
            }
            eprintln!("  + Restored {} files", restored.len());
            Ok(())
        }
        Err(WorkspaceError::NoBackups) => {
            eprintln!("  Nothing to undo.");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}
