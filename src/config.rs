//! Configuration management for kritiq
//!
//! Stores settings in ~/.config/kritiq/config.json. The API key never goes in
//! that file: it comes from the environment or the system keychain.

use crate::batch::{BatchPolicy, OverLimit, DEFAULT_BATCH_LIMIT};
use crate::llm::Provider;
use crate::review::prompt::DEFAULT_REVIEW_MODE;
use crate::scan::PathFilter;
use crate::util::env_flag;
use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides every other credential source.
pub const API_KEY_ENV: &str = "KRITIQ_API_KEY";

/// Files larger than this many characters are never sent for review.
pub const DEFAULT_MAX_FILE_CHARS: usize = 40_000;

const DEFAULT_TIMEOUT_SECS: u64 = 120;

const KEYRING_SERVICE: &str = "kritiq";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: Provider,
    /// Model id; the provider's default when unset
    pub model: Option<String>,
    /// Free-text label passed into the prompt
    pub review_mode: String,
    pub batch_limit: usize,
    pub over_limit: OverLimit,
    /// Deadline for one model call
    pub request_timeout_secs: u64,
    pub max_file_chars: usize,
    /// Also skip `public/` and `assets/`
    pub skip_asset_folders: bool,
    pub extra_blocked_dirs: Vec<String>,
    /// Where pre-write copies are kept; defaults to the user data dir
    pub backup_dir: Option<PathBuf>,
    /// If false, files are overwritten without a copy for `kritiq undo`
    pub keep_backups: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model: None,
            review_mode: DEFAULT_REVIEW_MODE.to_string(),
            batch_limit: DEFAULT_BATCH_LIMIT,
            over_limit: OverLimit::default(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_file_chars: DEFAULT_MAX_FILE_CHARS,
            skip_asset_folders: false,
            extra_blocked_dirs: Vec::new(),
            backup_dir: None,
            keep_backups: true,
        }
    }
}

fn keyring_disabled() -> bool {
    if cfg!(test) {
        return true;
    }
    env_flag("KRITIQ_DISABLE_KEYRING")
}

fn keyring_entry(provider: Provider) -> Result<Entry, keyring::Error> {
    Entry::new(KEYRING_SERVICE, provider.key_env_var())
}

fn read_keyring_key(provider: Provider) -> Result<Option<String>, keyring::Error> {
    if keyring_disabled() {
        return Ok(None);
    }
    match keyring_entry(provider)?.get_password() {
        Ok(key) => Ok(Some(key)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(err) => Err(err),
    }
}

fn write_keyring_key(provider: Provider, key: &str) -> Result<(), keyring::Error> {
    keyring_entry(provider)?.set_password(key)
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl Config {
    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("kritiq"))
    }

    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.json"))
    }

    /// Load config from disk, or return default
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    /// Load from a specific file. A corrupt file is moved aside and defaults are used.
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str(&content) {
            Ok(config) => config,
            Err(err) => {
                preserve_corrupt_config(path, &content);
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "config file corrupted; a backup was saved and defaults were loaded"
                );
                Self::default()
            }
        }
    }

    /// Save config to disk
    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::config_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        use anyhow::Context;

        let dir = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Config path has no parent directory"))?;
        fs::create_dir_all(dir).context("Failed to create config directory")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = fs::set_permissions(dir, fs::Permissions::from_mode(0o700)) {
                tracing::warn!(error = %e, "failed to set config directory permissions");
            }
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        write_config_atomic(path, &content).context("Failed to write config")
    }

    /// Model id to use, falling back to the provider default.
    pub fn model_id(&self) -> String {
        self.model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.provider.default_model().to_string())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn batch_policy(&self) -> BatchPolicy {
        BatchPolicy {
            limit: self.batch_limit.max(1),
            over_limit: self.over_limit,
        }
    }

    pub fn path_filter(&self) -> PathFilter {
        PathFilter::new()
            .skip_asset_folders(self.skip_asset_folders)
            .with_blocked_dirs(self.extra_blocked_dirs.iter().cloned())
    }

    pub fn backup_root(&self) -> Option<PathBuf> {
        self.backup_dir.clone().or_else(|| {
            dirs::data_local_dir().map(|p| p.join("kritiq").join("backups"))
        })
    }

    /// Get the API key: `KRITIQ_API_KEY`, then the provider's own variable,
    /// then the system keychain. Blank values count as missing.
    pub fn get_api_key(&self) -> Option<String> {
        for var in [API_KEY_ENV, self.provider.key_env_var()] {
            if let Some(key) = std::env::var(var).ok().and_then(non_blank) {
                return Some(key);
            }
        }

        match read_keyring_key(self.provider) {
            Ok(key) => key.and_then(non_blank),
            Err(err) => {
                eprintln!(
                    "  Warning: Failed to read API key from system keychain: {}",
                    err
                );
                eprintln!("  Tip: Set the {} environment variable as a workaround.", API_KEY_ENV);
                None
            }
        }
    }

    /// Store the API key in the system keychain and verify it reads back.
    pub fn set_api_key(&self, key: &str) -> anyhow::Result<()> {
        if let Err(write_err) = write_keyring_key(self.provider, key) {
            anyhow::bail!(
                "Failed to store API key in system keychain: {}. \
                 You can set the {} environment variable instead.",
                write_err,
                API_KEY_ENV
            );
        }

        match read_keyring_key(self.provider) {
            Ok(Some(stored)) if stored == key => Ok(()),
            Ok(_) => anyhow::bail!(
                "API key verification failed: key was not persisted to keychain. \
                 You can set the {} environment variable instead.",
                API_KEY_ENV
            ),
            Err(read_err) => anyhow::bail!(
                "API key verification failed: couldn't read back from keychain ({}). \
                 You can set the {} environment variable instead.",
                read_err,
                API_KEY_ENV
            ),
        }
    }

    /// Get the config file location for display
    pub fn config_location() -> String {
        Self::config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "~/.config/kritiq/config.json".to_string())
    }
}

/// Interactive prompt to set up the API key
pub fn setup_api_key_interactive(config: &Config) -> anyhow::Result<()> {
    use std::io;

    println!();
    println!("  ┌─────────────────────────────────────────────────────────┐");
    println!("  │  KRITIQ SETUP                                           │");
    println!("  └─────────────────────────────────────────────────────────┘");
    println!();
    println!("  kritiq sends each file to {} for review.", config.provider.label());
    println!("  Paste your API key below (saved in your system keychain).");
    println!();
    print!("  API Key: ");
    io::stdout().flush()?;

    let mut key = String::new();
    io::stdin().read_line(&mut key)?;
    let key = key.trim();

    if key.is_empty() {
        anyhow::bail!("No API key provided");
    }

    config.set_api_key(key)?;

    println!();
    println!("  + API key saved for {}", config.provider.label());
    println!();
    Ok(())
}

fn preserve_corrupt_config(path: &Path, content: &str) {
    let corrupt_path = path.with_extension("json.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}

fn write_config_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    let tmp_path = path.with_extension("tmp");
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&tmp_path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = file.set_permissions(fs::Permissions::from_mode(0o600)) {
            tracing::warn!(error = %e, "failed to set temp config file permissions");
        }
    }

    file.write_all(content.as_bytes())?;
    drop(file);

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    Ok(())
}
