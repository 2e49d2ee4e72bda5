//! Run log and user notifications
//!
//! The run log is observational only: nothing reads it back. Each console
//! line carries a local `[HH:MM:SS]` timestamp.

use std::io::Write;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Progress log plus user-facing messages.
pub trait Reporter {
    /// Append one line to the run log.
    fn log(&self, message: &str);

    /// Show a message to the user (summary, warnings, fatal conditions).
    fn notify(&self, level: NoticeLevel, message: &str);
}

/// Writes the run log to stderr, and notifications to stdout/stderr.
pub struct ConsoleReporter {
    /// Optional extra copy of the log (e.g. `--log-file`)
    mirror: Option<Mutex<std::fs::File>>,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self { mirror: None }
    }

    pub fn with_log_file(file: std::fs::File) -> Self {
        Self {
            mirror: Some(Mutex::new(file)),
        }
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

pub fn timestamped(message: &str) -> String {
    format!("[{}] {}", chrono::Local::now().format("%H:%M:%S"), message)
}

impl Reporter for ConsoleReporter {
    fn log(&self, message: &str) {
        let line = timestamped(message);
        eprintln!("{}", line);
        tracing::info!(target: "kritiq::run", "{}", message);

        if let Some(mirror) = &self.mirror {
            if let Ok(mut file) = mirror.lock() {
                let _ = writeln!(file, "{}", line);
            }
        }
    }

    fn notify(&self, level: NoticeLevel, message: &str) {
        match level {
            NoticeLevel::Info => println!("  + {}", message),
            NoticeLevel::Warning => eprintln!("  Warning: {}", message),
            NoticeLevel::Error => eprintln!("  ! {}", message),
        }
    }
}

/// Keeps everything in memory. Used by tests and embedding callers.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    lines: Mutex<Vec<String>>,
    notices: Mutex<Vec<(NoticeLevel, String)>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn notices(&self) -> Vec<(NoticeLevel, String)> {
        self.notices.lock().map(|n| n.clone()).unwrap_or_default()
    }
}

impl Reporter for MemoryReporter {
    fn log(&self, message: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(message.to_string());
        }
    }

    fn notify(&self, level: NoticeLevel, message: &str) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push((level, message.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamped_prefix() {
        let line = timestamped("Scanning folder");
        assert!(line.starts_with('['));
        assert_eq!(&line[9..], "] Scanning folder");
    }

    #[test]
    fn test_memory_reporter_records_in_order() {
        let reporter = MemoryReporter::new();
        reporter.log("one");
        reporter.log("two");
        reporter.notify(NoticeLevel::Error, "stop");
        assert_eq!(reporter.lines(), vec!["one", "two"]);
        assert_eq!(reporter.notices(), vec![(NoticeLevel::Error, "stop".to_string())]);
    }
}
