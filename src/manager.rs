//! Backup manager
//!
//! [`BackupManager`] is the main entry point of the library. It owns one
//! backup root and orchestrates the lower layers:
//!
//! - **create**: planner → executor → manifest write → garbage collection
//! - **restore**: strict manifest load → restore executor
//! - **maintenance**: listing, retention deletion, garbage collection,
//!   verification and store statistics
//!
//! ## Layout of a backup root
//!
//! ```text
//! <root>/
//! ├── 2024-05-01-001/
//! │   ├── Data/            plain files, mirroring the data directory minus Saves and Cache
//! │   └── manifest.json
//! ├── 2024-05-01-002/
//! └── SaveStore/
//!     ├── <sha256>.dir     one entry per distinct save
//!     └── <sha256>.file
//! ```
//!
//! ## Concurrency
//!
//! Every operation runs sequentially on the calling thread. Operations on the
//! same root must not overlap; callers serialize them.
//!
//! ## Examples
//!
//! ```rust,no_run
//! use savevault::{BackupManager, CancellationToken};
//! use std::path::{Path, PathBuf};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = BackupManager::new(PathBuf::from("./backups"));
//! let cancel = CancellationToken::new();
//!
//! let backup = manager.create_backup(Path::new("./VintagestoryData"), Some("1.19.8"), None, &cancel)?;
//! println!("Created backup {}", backup.id);
//!
//! let latest = &manager.list_backups()[0];
//! manager.restore_backup(latest, Path::new("./VintagestoryData"), None, &cancel)?;
//! # Ok(())
//! # }
//! ```

use crate::cancel::CancellationToken;
use crate::error::{Result, VaultError};
use crate::executor::execute;
use crate::gc::GarbageCollector;
use crate::manifest::ManifestStore;
use crate::plan::build_plan;
use crate::restore::{RestoreExecutor, RestoreStats};
use crate::save_store::SaveStore;
use crate::types::{
    BackupConfig, BackupManifest, BackupResult, BackupSummary, GcStats, OperationPhase, ProgressCallback,
    ProgressReporter, StoreStats, DEFAULT_COPY_BUFFER_SIZE, DEFAULT_DATA_FOLDER, DEFAULT_MANIFEST_FILE,
    DEFAULT_SAVE_STORE_FOLDER,
};
use crate::utils::{is_within, normalize_path, normalize_version, remove_path};
use crate::verification::{BackupVerifier, VerificationReport};
use chrono::{Local, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Backup and restore operations on one backup root
///
/// # Examples
///
/// ```rust,no_run
/// use savevault::{BackupManager, BackupManagerBuilder};
/// use std::path::PathBuf;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// // Defaults
/// let manager = BackupManager::new(PathBuf::from("./backups"));
///
/// // Custom configuration
/// let manager = BackupManagerBuilder::new()
///     .copy_buffer_size(1024 * 1024)
///     .build(PathBuf::from("./backups"))?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BackupManager {
    config: BackupConfig,
    manifests: ManifestStore,
    store: SaveStore,
}

impl BackupManager {
    /// Manager for `backup_root` with default folder names and buffer size
    ///
    /// No I/O happens until the first operation; the root is created on the
    /// first backup.
    pub fn new(backup_root: PathBuf) -> Self {
        Self::with_config(BackupConfig::new(backup_root))
    }

    /// Manager using an explicit configuration
    pub fn with_config(config: BackupConfig) -> Self {
        let manifests = ManifestStore::new(config.backup_root.clone(), config.manifest_file_name.clone());
        let store = SaveStore::new(config.save_store_path(), config.copy_buffer_size);
        Self {
            config,
            manifests,
            store,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &BackupConfig {
        &self.config
    }

    /// Directory holding every backup and the save store
    pub fn backup_root_directory(&self) -> &Path {
        &self.config.backup_root
    }

    /// Back up `source_data_directory`
    ///
    /// Plain files are copied into a fresh backup directory, saves not yet in
    /// the store are archived there, and the manifest is written last. After
    /// success the store is swept of entries no manifest references.
    ///
    /// # Arguments
    ///
    /// * `source_data_directory` - Game data directory to back up
    /// * `game_version` - Game version to record, normalized before storing
    /// * `progress` - Optional progress sink
    /// * `cancel` - Token checked between steps and copy chunks
    ///
    /// # Errors
    ///
    /// - [`VaultError::Validation`] if the source path is empty, or if it and
    ///   the backup root contain one another
    /// - [`VaultError::SourceNotFound`] if it is not a directory
    /// - [`VaultError::Cancelled`] if the token was raised
    /// - Any I/O error from planning or copying
    ///
    /// On error the partially written backup directory is removed, so no
    /// manifest exists for the allocated id.
    #[instrument(skip(self, progress, cancel))]
    pub fn create_backup(
        &self,
        source_data_directory: &Path,
        game_version: Option<&str>,
        progress: Option<ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<BackupResult> {
        let start = Instant::now();
        let source = normalize_path(source_data_directory)?;
        if !source.is_dir() {
            return Err(VaultError::SourceNotFound(source));
        }
        self.ensure_disjoint(&source)?;
        info!("Creating backup of {:?}", source);

        let phases = ProgressReporter::new(progress.clone(), 1);
        phases.report(0, "Planning backup", OperationPhase::Planning);

        let (id, directory) = match self.allocate_backup_directory() {
            Ok(allocated) => allocated,
            Err(e) => {
                phases.report(0, &failure_status(&e), OperationPhase::Failed);
                return Err(e);
            }
        };

        let mut manifest = BackupManifest::new(
            id.clone(),
            Utc::now(),
            source.to_string_lossy().to_string(),
            normalize_version(game_version),
        );

        if let Err(e) = self.populate_backup(&source, &directory, &mut manifest, progress, cancel) {
            phases.report(0, &failure_status(&e), OperationPhase::Failed);
            if let Err(cleanup) = remove_path(&directory) {
                warn!("Could not roll back backup {}: {}", id, cleanup);
            } else {
                debug!("Rolled back backup directory {:?}", directory);
            }
            return Err(e);
        }

        phases.report(100, "Cleaning up save store", OperationPhase::Finalizing);
        GarbageCollector::new(&self.manifests, &self.store).sweep();

        phases.report(100, "Backup completed", OperationPhase::Completed);
        info!(
            "Created backup {} with {} saves in {}ms",
            id,
            manifest.saves.len(),
            start.elapsed().as_millis()
        );

        Ok(BackupResult {
            id,
            created_at_utc: manifest.created_on_utc,
            directory_path: directory,
        })
    }

    /// Create the root if needed and claim a fresh backup directory in it
    fn allocate_backup_directory(&self) -> Result<(String, PathBuf)> {
        fs::create_dir_all(&self.config.backup_root)?;
        let (id, directory) = self.manifests.allocate_id(Local::now().date_naive());
        fs::create_dir(&directory)?;
        Ok((id, directory))
    }

    /// Refuse a data directory that contains the backup root or lies inside it
    ///
    /// A backup would otherwise copy the root into itself, and a restore
    /// would clear the root before reading from it.
    fn ensure_disjoint(&self, data_directory: &Path) -> Result<()> {
        let root = &self.config.backup_root;
        if is_within(root, data_directory) || is_within(data_directory, root) {
            return Err(VaultError::validation(format!(
                "backup root {:?} and data directory {:?} must not contain one another",
                root, data_directory
            )));
        }
        Ok(())
    }

    /// Plan, execute and commit a backup into `directory`
    fn populate_backup(
        &self,
        source: &Path,
        directory: &Path,
        manifest: &mut BackupManifest,
        progress: Option<ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let data_dir = directory.join(&self.config.data_folder_name);
        let plan = build_plan(source, &data_dir, &self.store, cancel)?;
        let stats = execute(
            &plan,
            manifest,
            &self.store,
            self.config.copy_buffer_size,
            progress.clone(),
            cancel,
        )?;
        debug!("Backup {} execution: {:?}", manifest.id, stats);

        ProgressReporter::new(progress, 1).report(100, "Writing manifest", OperationPhase::Finalizing);
        cancel.check()?;
        self.manifests.write(directory, manifest)
    }

    /// Replace the contents of `destination_data_directory` with a backup
    ///
    /// The backup's manifest is loaded strictly: a corrupt manifest is an
    /// error here even though listing skips it.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Validation`] if the destination path is empty, or if it
    ///   and the backup root contain one another
    /// - [`VaultError::BackupNotFound`] or [`VaultError::CorruptManifest`]
    /// - [`VaultError::NothingToRestore`] if the backup has no `Data/` tree
    /// - [`VaultError::SaveArchiveMissing`] if a referenced save is not stored
    /// - [`VaultError::Cancelled`] if the token was raised
    ///
    /// A failed restore is not rolled back.
    #[instrument(skip(self, summary, progress, cancel), fields(backup = %summary.id))]
    pub fn restore_backup(
        &self,
        summary: &BackupSummary,
        destination_data_directory: &Path,
        progress: Option<ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<RestoreStats> {
        let destination = normalize_path(destination_data_directory)?;
        info!("Restoring backup {} into {:?}", summary.id, destination);

        let phases = ProgressReporter::new(progress.clone(), 1);
        phases.report(0, "Loading manifest", OperationPhase::Planning);

        let result = self
            .ensure_disjoint(&destination)
            .and_then(|()| self.manifests.load(&summary.directory_path))
            .and_then(|manifest| {
                RestoreExecutor::new(&self.store, &self.config.data_folder_name, self.config.copy_buffer_size)
                    .restore(&manifest, &summary.directory_path, &destination, progress, cancel)
            });

        if let Err(e) = &result {
            phases.report(0, &failure_status(e), OperationPhase::Failed);
        }
        result
    }

    /// Every valid backup under the root, newest first
    ///
    /// Corrupt or unreadable backups are left out.
    pub fn list_backups(&self) -> Vec<BackupSummary> {
        self.manifests
            .list_all()
            .into_iter()
            .map(|(manifest, directory)| BackupSummary::from_manifest(&manifest, directory))
            .collect()
    }

    /// Look up a backup by id
    pub fn find_backup(&self, id: &str) -> Result<BackupSummary> {
        self.manifests
            .find(id)
            .map(|(manifest, directory)| BackupSummary::from_manifest(&manifest, directory))
            .ok_or_else(|| VaultError::BackupNotFound(id.to_string()))
    }

    /// Delete every backup of `source_data_directory` taken with `game_version`
    ///
    /// Both arguments are normalized before matching. The save store is swept
    /// if anything was deleted. A backup directory that cannot be removed is
    /// logged and left out of the count.
    ///
    /// # Returns
    ///
    /// Number of backups deleted.
    #[instrument(skip(self))]
    pub fn delete_backups(&self, source_data_directory: &Path, game_version: &str) -> Result<usize> {
        let source = normalize_path(source_data_directory)?;
        if normalize_version(Some(game_version)).is_none() {
            return Err(VaultError::validation("game version must not be empty"));
        }

        let mut deleted = 0;
        for (manifest, directory) in self
            .manifests
            .select_for_deletion(&source.to_string_lossy(), game_version)
        {
            match self.manifests.delete(&directory) {
                Ok(()) => deleted += 1,
                Err(e) => warn!("Failed to delete backup {}: {}", manifest.id, e),
            }
        }

        if deleted > 0 {
            GarbageCollector::new(&self.manifests, &self.store).sweep();
        }
        info!("Deleted {} backups of {:?} ({})", deleted, source, game_version);
        Ok(deleted)
    }

    /// Delete one backup by id and sweep the save store
    #[instrument(skip(self))]
    pub fn delete_backup(&self, id: &str) -> Result<GcStats> {
        let summary = self.find_backup(id)?;
        self.manifests.delete(&summary.directory_path)?;
        Ok(GarbageCollector::new(&self.manifests, &self.store).sweep())
    }

    /// Remove save store entries no backup references
    #[instrument(skip(self))]
    pub fn gc(&self) -> GcStats {
        info!("Starting garbage collection");
        GarbageCollector::new(&self.manifests, &self.store).sweep()
    }

    /// Report what [`gc`](Self::gc) would remove without removing anything
    #[instrument(skip(self))]
    pub fn gc_analyze(&self) -> GcStats {
        info!("Analyzing garbage collection (dry run)");
        GarbageCollector::new(&self.manifests, &self.store).analyze()
    }

    /// Re-hash every save a backup references and check its `Data/` tree
    #[instrument(skip(self))]
    pub fn verify_backup(&self, id: &str) -> Result<VerificationReport> {
        let summary = self.find_backup(id)?;
        let manifest = self.manifests.load(&summary.directory_path)?;
        BackupVerifier::new(&self.store).verify(
            &manifest,
            &summary.directory_path,
            &self.config.data_folder_name,
            &CancellationToken::new(),
        )
    }

    /// Entry counts and size of the save store
    pub fn store_stats(&self) -> Result<StoreStats> {
        self.store.stats()
    }
}

fn failure_status(error: &VaultError) -> String {
    if error.is_cancelled() {
        "Cancelled".to_string()
    } else {
        format!("Failed: {}", error)
    }
}

/// Builder for [`BackupManager`]
///
/// # Default Values
///
/// - `save_store_folder`: `"SaveStore"`
/// - `manifest_file_name`: `"manifest.json"`
/// - `data_folder_name`: `"Data"`
/// - `copy_buffer_size`: 81 920 bytes
#[derive(Debug, Clone)]
pub struct BackupManagerBuilder {
    save_store_folder: String,
    manifest_file_name: String,
    data_folder_name: String,
    copy_buffer_size: usize,
}

impl BackupManagerBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self {
            save_store_folder: DEFAULT_SAVE_STORE_FOLDER.to_string(),
            manifest_file_name: DEFAULT_MANIFEST_FILE.to_string(),
            data_folder_name: DEFAULT_DATA_FOLDER.to_string(),
            copy_buffer_size: DEFAULT_COPY_BUFFER_SIZE,
        }
    }

    /// Name of the save store folder under the root
    pub fn save_store_folder(mut self, name: impl Into<String>) -> Self {
        self.save_store_folder = name.into();
        self
    }

    /// Manifest file name inside each backup directory
    pub fn manifest_file_name(mut self, name: impl Into<String>) -> Self {
        self.manifest_file_name = name.into();
        self
    }

    /// Name of the plain-file tree inside each backup directory
    pub fn data_folder_name(mut self, name: impl Into<String>) -> Self {
        self.data_folder_name = name.into();
        self
    }

    /// Size of the streaming copy buffer in bytes
    pub fn copy_buffer_size(mut self, size: usize) -> Self {
        self.copy_buffer_size = size;
        self
    }

    /// Build a manager for `backup_root`
    ///
    /// # Errors
    ///
    /// [`VaultError::Validation`] if the root or any folder name is empty, a
    /// folder name contains a path separator, or the buffer size is zero.
    pub fn build(self, backup_root: PathBuf) -> Result<BackupManager> {
        if backup_root.as_os_str().is_empty() {
            return Err(VaultError::validation("backup root must not be empty"));
        }
        if self.copy_buffer_size == 0 {
            return Err(VaultError::validation("copy buffer size must be positive"));
        }
        for (what, name) in [
            ("save store folder", &self.save_store_folder),
            ("manifest file name", &self.manifest_file_name),
            ("data folder name", &self.data_folder_name),
        ] {
            if name.trim().is_empty() || name.contains(['/', '\\']) {
                return Err(VaultError::validation(format!("invalid {}: '{}'", what, name)));
            }
        }

        Ok(BackupManager::with_config(BackupConfig {
            backup_root,
            save_store_folder: self.save_store_folder,
            manifest_file_name: self.manifest_file_name,
            data_folder_name: self.data_folder_name,
            copy_buffer_size: self.copy_buffer_size,
        }))
    }
}

impl Default for BackupManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
