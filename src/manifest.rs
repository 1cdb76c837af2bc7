//! Manifest store
//!
//! Every backup directory under the root holds one JSON manifest. The set of
//! valid manifests on disk is the set of backups: a directory without a
//! readable, valid manifest is not a backup, and the garbage collector only
//! keeps save store entries that some valid manifest references.
//!
//! Listing is forgiving: unreadable or malformed manifests are skipped with a
//! log line. Loading one specific backup is strict and reports
//! [`VaultError::CorruptManifest`].

use crate::error::{Result, VaultError};
use crate::types::BackupManifest;
use crate::utils::{atomic_write, normalize_version, paths_equal};
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Enumerates, reads, writes and deletes backup manifests under a root
#[derive(Debug, Clone)]
pub struct ManifestStore {
    /// Backup root
    root: PathBuf,
    /// Manifest file name inside each backup directory
    manifest_file_name: String,
}

impl ManifestStore {
    /// Create a manifest store for `root`
    pub fn new(root: PathBuf, manifest_file_name: String) -> Self {
        Self { root, manifest_file_name }
    }

    /// Backup root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the manifest inside `backup_directory`
    pub fn manifest_path(&self, backup_directory: &Path) -> PathBuf {
        backup_directory.join(&self.manifest_file_name)
    }

    /// Persist `manifest` into `backup_directory`
    ///
    /// The file is written atomically; it either appears complete or not at
    /// all. Existing manifests are only ever replaced whole.
    pub fn write(&self, backup_directory: &Path, manifest: &BackupManifest) -> Result<()> {
        let json = serde_json::to_string_pretty(manifest)?;
        atomic_write(&self.manifest_path(backup_directory), json.as_bytes())?;
        debug!("Wrote manifest for backup {}", manifest.id);
        Ok(())
    }

    /// Load the manifest of `backup_directory`, treating any problem as absence
    pub fn try_load(&self, backup_directory: &Path) -> Option<BackupManifest> {
        match self.load(backup_directory) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                debug!("Ignoring {:?}: {}", backup_directory, e);
                None
            }
        }
    }

    /// Load the manifest of `backup_directory`, reporting why it is unusable
    ///
    /// # Errors
    ///
    /// - [`VaultError::BackupNotFound`] if the directory does not exist
    /// - [`VaultError::CorruptManifest`] if the manifest is missing, malformed
    ///   or lacks an id or creation time
    pub fn load(&self, backup_directory: &Path) -> Result<BackupManifest> {
        if !backup_directory.is_dir() {
            return Err(VaultError::BackupNotFound(backup_directory.display().to_string()));
        }

        let path = self.manifest_path(backup_directory);
        let corrupt = |reason: String| VaultError::CorruptManifest {
            path: path.clone(),
            reason,
        };

        let json = fs::read_to_string(&path).map_err(|e| corrupt(e.to_string()))?;
        let manifest: BackupManifest = serde_json::from_str(&json).map_err(|e| corrupt(e.to_string()))?;
        if !manifest.is_valid() {
            return Err(corrupt("missing id or creation time".to_string()));
        }

        Ok(manifest)
    }

    /// Every valid backup under the root, newest first
    ///
    /// Never fails: an unreadable root lists as empty.
    pub fn list_all(&self) -> Vec<(BackupManifest, PathBuf)> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to read backup root {:?}: {}", self.root, e);
                }
                return Vec::new();
            }
        };

        let mut backups: Vec<_> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .filter_map(|path| self.try_load(&path).map(|manifest| (manifest, path)))
            .collect();

        backups.sort_by(|a, b| {
            b.0.created_on_utc
                .cmp(&a.0.created_on_utc)
                .then_with(|| b.0.id.cmp(&a.0.id))
        });
        backups
    }

    /// Find a backup by id
    pub fn find(&self, id: &str) -> Option<(BackupManifest, PathBuf)> {
        self.list_all().into_iter().find(|(manifest, _)| manifest.id == id)
    }

    /// Backups of `source_data_directory` taken with `game_version`
    ///
    /// Both sides are compared in normalized form; paths case-insensitively
    /// where the platform's filesystem is.
    pub fn select_for_deletion(
        &self,
        source_data_directory: &str,
        game_version: &str,
    ) -> Vec<(BackupManifest, PathBuf)> {
        let target_version = normalize_version(Some(game_version));
        self.list_all()
            .into_iter()
            .filter(|(manifest, _)| {
                paths_equal(&manifest.source_data_directory, source_data_directory)
                    && normalize_version(manifest.game_version.as_deref()) == target_version
            })
            .collect()
    }

    /// Remove a whole backup directory
    pub fn delete(&self, backup_directory: &Path) -> Result<()> {
        fs::remove_dir_all(backup_directory)?;
        info!("Deleted backup directory {:?}", backup_directory);
        Ok(())
    }

    /// Pick the id and directory for a backup created on `date`
    ///
    /// Ids are `yyyy-MM-dd-NNN` with `NNN` one above the highest suffix
    /// already used that day. If the directory still exists, `_1`, `_2`, ...
    /// are appended until the name is free; the id always equals the
    /// directory name.
    pub fn allocate_id(&self, date: NaiveDate) -> (String, PathBuf) {
        let prefix = format!("{}-", date.format("%Y-%m-%d"));
        let highest = fs::read_dir(&self.root)
            .map(|entries| {
                entries
                    .filter_map(|entry| entry.ok())
                    .filter_map(|entry| {
                        let name = entry.file_name().to_string_lossy().to_string();
                        day_sequence(&name, &prefix)
                    })
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0);

        let base = format!("{}{:03}", prefix, highest + 1);
        let mut id = base.clone();
        let mut attempt = 1;
        while self.root.join(&id).exists() {
            id = format!("{}_{}", base, attempt);
            attempt += 1;
        }

        let directory = self.root.join(&id);
        (id, directory)
    }
}

/// Numeric suffix of a same-day backup directory name
fn day_sequence(name: &str, prefix: &str) -> Option<u32> {
    let rest = name.strip_prefix(prefix)?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}
