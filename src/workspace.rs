//! Filesystem access for reviewed files
//!
//! Reads are plain UTF-8 reads. Writes replace the whole file atomically and,
//! when a backup store is attached, copy the previous content aside first so
//! `kritiq undo` can put it back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{} is not valid UTF-8", path.display())]
    Decode { path: PathBuf },
    #[error("backup manifest {}: {message}", path.display())]
    Manifest { path: PathBuf, message: String },
    #[error("no backups to restore")]
    NoBackups,
}

impl WorkspaceError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Read and write-back collaborators used by the orchestrator.
pub trait Workspace {
    fn read_file_text(&self, path: &Path) -> Result<String, WorkspaceError>;

    /// Overwrite the whole file. Readers see either the old or the new content.
    fn replace_file_content(&self, path: &Path, text: &str) -> Result<(), WorkspaceError>;

    /// Identifier of the undo point for the writes made so far, if any.
    fn backup_id(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupEntry {
    pub original: PathBuf,
    pub backup: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupManifest {
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub root: PathBuf,
    pub entries: Vec<BackupEntry>,
}

/// Backups for one run, stored under `<backup_root>/<run_id>/`.
pub struct BackupSet {
    dir: PathBuf,
    manifest: Mutex<BackupManifest>,
}

impl BackupSet {
    pub fn new(backup_root: &Path, root: &Path) -> Self {
        let run_id = Uuid::new_v4();
        Self {
            dir: backup_root.join(run_id.to_string()),
            manifest: Mutex::new(BackupManifest {
                run_id,
                created_at: Utc::now(),
                root: root.to_path_buf(),
                entries: Vec::new(),
            }),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.lock_manifest().run_id
    }

    fn lock_manifest(&self) -> std::sync::MutexGuard<'_, BackupManifest> {
        // A poisoned manifest is still a valid list of what was copied
        self.manifest
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Copy `path` aside before it is overwritten. Only the first copy of a
    /// file per run is kept, so undo returns to the pre-run content.
    fn preserve(&self, path: &Path) -> Result<(), WorkspaceError> {
        let mut manifest = self.lock_manifest();
        if manifest.entries.iter().any(|e| e.original == path) {
            return Ok(());
        }

        let files_dir = self.dir.join("files");
        fs::create_dir_all(&files_dir).map_err(|e| WorkspaceError::io(&files_dir, e))?;

        let backup = files_dir.join(manifest.entries.len().to_string());
        fs::copy(path, &backup).map_err(|e| WorkspaceError::io(path, e))?;

        manifest.entries.push(BackupEntry {
            original: path.to_path_buf(),
            backup,
        });

        let manifest_path = self.dir.join(MANIFEST_FILE);
        let content = serde_json::to_string_pretty(&*manifest).map_err(|e| {
            WorkspaceError::Manifest {
                path: manifest_path.clone(),
                message: e.to_string(),
            }
        })?;
        write_atomic(&manifest_path, content.as_bytes())
    }

    fn has_entries(&self) -> bool {
        !self.lock_manifest().entries.is_empty()
    }
}

/// The real filesystem.
#[derive(Default)]
pub struct FsWorkspace {
    backups: Option<BackupSet>,
}

impl FsWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backups(backups: BackupSet) -> Self {
        Self {
            backups: Some(backups),
        }
    }
}

impl Workspace for FsWorkspace {
    fn read_file_text(&self, path: &Path) -> Result<String, WorkspaceError> {
        let bytes = fs::read(path).map_err(|e| WorkspaceError::io(path, e))?;
        String::from_utf8(bytes).map_err(|_| WorkspaceError::Decode {
            path: path.to_path_buf(),
        })
    }

    /// Writes go to the link target, so a symlinked file stays a symlink.
    fn replace_file_content(&self, path: &Path, text: &str) -> Result<(), WorkspaceError> {
        let target = fs::canonicalize(path).map_err(|e| WorkspaceError::io(path, e))?;
        if let Some(backups) = &self.backups {
            backups.preserve(&target)?;
        }
        write_atomic(&target, text.as_bytes())
    }

    fn backup_id(&self) -> Option<String> {
        self.backups
            .as_ref()
            .filter(|b| b.has_entries())
            .map(|b| b.run_id().to_string())
    }
}

/// Write content atomically by writing to a temp file next to `path`, then renaming.
/// Keeps the permissions of an existing file.
fn write_atomic(path: &Path, content: &[u8]) -> Result<(), WorkspaceError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    let tmp_path = parent.join(format!(".{}.kritiq-tmp", file_name));

    fs::write(&tmp_path, content).map_err(|e| WorkspaceError::io(&tmp_path, e))?;

    if let Ok(meta) = fs::metadata(path) {
        if let Err(err) = fs::set_permissions(&tmp_path, meta.permissions()) {
            debug!(path = %tmp_path.display(), error = %err, "could not copy permissions");
        }
    }

    #[cfg(windows)]
    if path.exists() {
        let _ = fs::remove_file(path);
    }

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(WorkspaceError::io(path, err));
    }
    Ok(())
}

/// Most recent backup set under `backup_root`.
pub fn latest_backup(backup_root: &Path) -> Result<(PathBuf, BackupManifest), WorkspaceError> {
    let entries = match fs::read_dir(backup_root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(WorkspaceError::NoBackups)
        }
        Err(err) => return Err(WorkspaceError::io(backup_root, err)),
    };

    let mut latest: Option<(PathBuf, BackupManifest)> = None;
    for entry in entries.flatten() {
        let manifest_path = entry.path().join(MANIFEST_FILE);
        let Ok(content) = fs::read_to_string(&manifest_path) else {
            continue;
        };
        let manifest: BackupManifest = match serde_json::from_str(&content) {
            Ok(m) => m,
            Err(err) => {
                warn!(path = %manifest_path.display(), error = %err, "ignoring unreadable backup manifest");
                continue;
            }
        };
        let newer = latest
            .as_ref()
            .is_none_or(|(_, current)| manifest.created_at > current.created_at);
        if newer {
            latest = Some((entry.path(), manifest));
        }
    }

    latest.ok_or(WorkspaceError::NoBackups)
}

/// Restore every file of the most recent backup set, then delete the set.
/// Returns the restored paths.
pub fn undo_latest(backup_root: &Path) -> Result<Vec<PathBuf>, WorkspaceError> {
    let (dir, manifest) = latest_backup(backup_root)?;

    let mut restored = Vec::with_capacity(manifest.entries.len());
    for entry in &manifest.entries {
        let content = fs::read(&entry.backup).map_err(|e| WorkspaceError::io(&entry.backup, e))?;
        write_atomic(&entry.original, &content)?;
        restored.push(entry.original.clone());
    }

    fs::remove_dir_all(&dir).map_err(|e| WorkspaceError::io(&dir, e))?;
    Ok(restored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_rejects_invalid_utf8() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.js");
        fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();

        let err = FsWorkspace::new().read_file_text(&path).unwrap_err();
        assert!(matches!(err, WorkspaceError::Decode { .. }));
    }

    #[test]
    fn test_replace_overwrites_whole_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.js");
        fs::write(&path, "a much longer original body\n").unwrap();

        FsWorkspace::new().replace_file_content(&path, "short\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "short\n");
        assert!(!tmp.path().join(".a.js.kritiq-tmp").exists());
    }

    #[test]
    fn test_backup_and_undo_round_trip() {
        let project = TempDir::new().unwrap();
        let backups = TempDir::new().unwrap();
        let a = project.path().join("a.py");
        let b = project.path().join("b.py");
        fs::write(&a, "a = 1\n").unwrap();
        fs::write(&b, "b = 1\n").unwrap();

        let workspace =
            FsWorkspace::with_backups(BackupSet::new(backups.path(), project.path()));
        assert!(workspace.backup_id().is_none());

        workspace.replace_file_content(&a, "a = 2\n").unwrap();
        workspace.replace_file_content(&a, "a = 3\n").unwrap();
        workspace.replace_file_content(&b, "b = 2\n").unwrap();
        assert!(workspace.backup_id().is_some());

        let restored = undo_latest(backups.path()).unwrap();
        assert_eq!(
            restored,
            vec![fs::canonicalize(&a).unwrap(), fs::canonicalize(&b).unwrap()]
        );
        assert_eq!(fs::read_to_string(&a).unwrap(), "a = 1\n");
        assert_eq!(fs::read_to_string(&b).unwrap(), "b = 1\n");

        assert!(matches!(
            undo_latest(backups.path()),
            Err(WorkspaceError::NoBackups)
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_replace_through_symlink_updates_target() {
        let project = TempDir::new().unwrap();
        let backups = TempDir::new().unwrap();
        let target = project.path().join("shared.js");
        let link = project.path().join("link.js");
        fs::write(&target, "let a = 1;\n").unwrap();
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let workspace =
            FsWorkspace::with_backups(BackupSet::new(backups.path(), project.path()));
        workspace.replace_file_content(&link, "let a = 2;\n").unwrap();

        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(&target).unwrap(), "let a = 2;\n");

        let restored = undo_latest(backups.path()).unwrap();
        assert_eq!(restored, vec![fs::canonicalize(&target).unwrap()]);
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(&link).unwrap(), "let a = 1;\n");
    }

    #[test]
    fn test_undo_without_backup_dir() {
        let tmp = TempDir::new().unwrap();
        assert!(matches!(
            undo_latest(&tmp.path().join("none")),
            Err(WorkspaceError::NoBackups)
        ));
    }
}
