//! Restore execution
//!
//! Rebuilds a data directory from a backup's `Data/` tree and the saves its
//! manifest references in the save store. Restoring is destructive: the
//! destination is emptied first. There is no rollback; a failed or
//! cancelled restore leaves the destination partially rewritten.
//!
//! Before anything is deleted every referenced save is checked for in the
//! store, so the common "save archive missing" failure does not cost the
//! user their current data. The check is repeated per save while copying.

use crate::cancel::CancellationToken;
use crate::error::{Result, VaultError};
use crate::save_store::SaveStore;
use crate::types::{
    BackupManifest, OperationPhase, ProgressCallback, ProgressReporter, SaveReference, CACHE_FOLDER,
    SAVES_FOLDER,
};
use crate::utils::{copy_dir_recursive, copy_file_streaming, remove_path};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

/// Result of a restore operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreStats {
    /// Plain files copied from the backup's `Data/` tree
    pub files_restored: usize,
    /// Saves copied out of the store
    pub saves_restored: usize,
    /// Total bytes written
    pub bytes_written: u64,
    /// Time taken in milliseconds
    pub duration_ms: u64,
}

/// Restores backups of one backup root
#[derive(Debug, Clone)]
pub struct RestoreExecutor<'a> {
    store: &'a SaveStore,
    data_folder_name: &'a str,
    buffer_size: usize,
}

impl<'a> RestoreExecutor<'a> {
    /// Executor reading saves from `store` and plain files from `<backup>/<data_folder_name>`
    pub fn new(store: &'a SaveStore, data_folder_name: &'a str, buffer_size: usize) -> Self {
        Self {
            store,
            data_folder_name,
            buffer_size,
        }
    }

    /// Replace the contents of `destination` with the backup described by `manifest`
    ///
    /// # Errors
    ///
    /// - [`VaultError::NothingToRestore`] if the backup has no `Data/` tree
    /// - [`VaultError::SaveArchiveMissing`] naming the first save absent from the store
    /// - [`VaultError::CorruptManifest`] if a save path would escape `Saves/`
    /// - [`VaultError::Cancelled`] or [`VaultError::Io`] from copying
    pub fn restore(
        &self,
        manifest: &BackupManifest,
        backup_directory: &Path,
        destination: &Path,
        progress: Option<ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<RestoreStats> {
        let start = Instant::now();
        let data_dir = backup_directory.join(self.data_folder_name);
        if !data_dir.is_dir() {
            return Err(VaultError::NothingToRestore(data_dir));
        }

        for save in &manifest.saves {
            save_target(destination, save, backup_directory)?;
            self.require_stored(save)?;
        }

        cancel.check()?;
        fs::create_dir_all(destination)?;
        clear_directory(destination)?;
        remove_cache(destination);

        let plain_files = plain_file_listing(&data_dir)?;
        let plain_total: u64 = plain_files.iter().map(|(_, len)| (*len).max(1)).sum();
        let save_total: u64 = manifest.saves.iter().map(|s| s.size_bytes.max(1)).sum();
        let mut reporter = ProgressReporter::new(progress, plain_total + save_total);
        let mut stats = RestoreStats::default();

        for entry in WalkDir::new(&data_dir).min_depth(1).sort_by_file_name() {
            cancel.check()?;
            let entry = entry?;
            let relative = entry
                .path()
                .strip_prefix(&data_dir)
                .map_err(|_| VaultError::internal(format!("{:?} escaped {:?}", entry.path(), data_dir)))?;
            let target = destination.join(relative);

            if entry.file_type().is_dir() {
                fs::create_dir_all(&target)?;
                continue;
            }

            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let copied = copy_file_streaming(entry.path(), &target, self.buffer_size, cancel)?;
            stats.files_restored += 1;
            stats.bytes_written += copied;
            reporter.advance(copied.max(1), "Restoring files", OperationPhase::Copying);
        }

        for save in &manifest.saves {
            cancel.check()?;
            let source = self.require_stored(save)?;
            let target = save_target(destination, save, backup_directory)?;
            trace!("Restoring save {} from {:?}", save.relative_path, source);

            let copied = if save.is_directory {
                copy_dir_recursive(&source, &target, self.buffer_size, cancel)?
            } else {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                copy_file_streaming(&source, &target, self.buffer_size, cancel)?
            };

            stats.saves_restored += 1;
            stats.bytes_written += copied;
            reporter.advance(
                save.size_bytes.max(1),
                &format!("Restoring save {}", save.relative_path),
                OperationPhase::Restoring,
            );
        }

        reporter.report(100, "Finalizing", OperationPhase::Finalizing);
        remove_cache(destination);

        stats.duration_ms = start.elapsed().as_millis() as u64;
        reporter.report(100, "Restore completed", OperationPhase::Completed);
        info!(
            "Restored backup {} into {:?}: {} files, {} saves in {}ms",
            manifest.id, destination, stats.files_restored, stats.saves_restored, stats.duration_ms
        );
        Ok(stats)
    }

    /// Store path of `save`, or the error naming it if the entry is gone
    fn require_stored(&self, save: &SaveReference) -> Result<PathBuf> {
        if self.store.exists(&save.content_hash, save.is_directory) {
            Ok(self.store.path(&save.content_hash, save.is_directory))
        } else {
            Err(VaultError::SaveArchiveMissing {
                relative_path: save.relative_path.clone(),
                hash: save.content_hash.clone(),
            })
        }
    }
}

/// `<destination>/Saves/<relative path>`, refusing paths that leave `Saves/`
fn save_target(destination: &Path, save: &SaveReference, backup_directory: &Path) -> Result<PathBuf> {
    let relative = Path::new(&save.relative_path);
    let escapes = save.relative_path.is_empty()
        || relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
    if escapes {
        return Err(VaultError::CorruptManifest {
            path: backup_directory.to_path_buf(),
            reason: format!("save path '{}' is not inside the Saves folder", save.relative_path),
        });
    }

    let mut target = destination.join(SAVES_FOLDER);
    for part in save.relative_path.split('/').filter(|p| !p.is_empty()) {
        target.push(part);
    }
    Ok(target)
}

/// Plain files of the backup with their sizes
fn plain_file_listing(data_dir: &Path) -> Result<Vec<(PathBuf, u64)>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(data_dir).min_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_dir() {
            let len = entry.metadata()?.len();
            files.push((entry.into_path(), len));
        }
    }
    Ok(files)
}

/// Remove every entry of `dir`
fn clear_directory(dir: &Path) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        remove_path(&path).map_err(|e| VaultError::Io(e.source))?;
    }
    debug!("Cleared {:?}", dir);
    Ok(())
}

/// Make sure no stale Cache folder survives in the destination
fn remove_cache(destination: &Path) {
    let Ok(entries) = fs::read_dir(destination) else { return };
    for entry in entries.filter_map(|e| e.ok()) {
        if entry.file_name().to_string_lossy().eq_ignore_ascii_case(CACHE_FOLDER) {
            if let Err(e) = remove_path(&entry.path()) {
                warn!("{}", e);
            }
        }
    }
}
