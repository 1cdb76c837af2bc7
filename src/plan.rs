//! Backup planning
//!
//! Walks a game data directory and describes everything a backup has to do
//! without doing any of it: which directories to create, which plain files
//! to copy, and which saves to archive. The only reads are size lookups and
//! the hashing of saves.
//!
//! The plan is built bottom-up: each recursive step returns its own partial
//! [`BackupPlan`] and the caller merges it into its result, so no mutable
//! state is shared across the walk.
//!
//! ## Layout rules
//!
//! - `Cache/` at the top of the data directory is never backed up.
//! - Every immediate entry of `Saves/` is one save, hashed as a unit and
//!   destined for the save store rather than the backup's `Data/` tree.
//! - Everything else is mirrored into `Data/` file by file.
//! - Symbolic links are backed up as what they point to. Dangling links are
//!   skipped, and a link back into one of its own ancestors is an error.

use crate::cancel::CancellationToken;
use crate::error::{Result, VaultError};
use crate::hashing::hash_save;
use crate::save_store::SaveStore;
use crate::types::{CACHE_FOLDER, SAVES_FOLDER};
use crate::utils::entry_size;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// A plain file to copy into the backup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFile {
    /// File in the data directory
    pub source: PathBuf,
    /// Destination under the backup's `Data/` tree
    pub destination: PathBuf,
    /// Size at planning time
    pub length: u64,
}

/// A save to reference from the manifest, and to archive if new
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedSave {
    /// File or directory under `Saves/`
    pub source: PathBuf,
    /// Path relative to `Saves/`, forward-slash separated
    pub relative_path: String,
    /// Content fingerprint
    pub hash: String,
    /// Whether the save is a directory
    pub is_directory: bool,
    /// Whether the store already holds this fingerprint
    pub exists_in_store: bool,
    /// Size in bytes, 0 if unreadable
    pub size: u64,
}

/// Everything one backup will do
///
/// `total_bytes` counts plain files plus saves that still have to be
/// stored, each floored at 1 so progress math never divides by zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupPlan {
    /// Directories to create, parents sort before children
    pub directories_to_create: BTreeSet<PathBuf>,
    /// Plain files to copy
    pub files: Vec<PlannedFile>,
    /// Saves found under `Saves/`, in name order
    pub saves: Vec<PlannedSave>,
    /// Bytes of work for progress reporting
    pub total_bytes: u64,
}

impl BackupPlan {
    /// Combine two partial plans
    pub fn merge(mut self, other: BackupPlan) -> BackupPlan {
        self.directories_to_create.extend(other.directories_to_create);
        self.files.extend(other.files);
        self.saves.extend(other.saves);
        self.total_bytes += other.total_bytes;
        self
    }

    fn directory(path: PathBuf) -> BackupPlan {
        BackupPlan {
            directories_to_create: BTreeSet::from([path]),
            ..Default::default()
        }
    }

    fn file(source: PathBuf, destination: PathBuf, length: u64) -> BackupPlan {
        BackupPlan {
            files: vec![PlannedFile { source, destination, length }],
            total_bytes: length.max(1),
            ..Default::default()
        }
    }

    fn save(save: PlannedSave) -> BackupPlan {
        let total_bytes = if save.exists_in_store { 0 } else { save.size.max(1) };
        BackupPlan {
            saves: vec![save],
            total_bytes,
            ..Default::default()
        }
    }

    /// Number of saves the store does not have yet
    pub fn new_save_count(&self) -> usize {
        self.saves.iter().filter(|s| !s.exists_in_store).count()
    }
}

/// Plan a backup of `source_data_dir` into `target_data_dir`
///
/// # Errors
///
/// Any enumeration or hashing failure aborts planning; nothing is executed
/// from a partial plan.
pub fn build_plan(
    source_data_dir: &Path,
    target_data_dir: &Path,
    store: &SaveStore,
    cancel: &CancellationToken,
) -> Result<BackupPlan> {
    cancel.check()?;
    let ancestors = [fs::canonicalize(source_data_dir)?];
    let mut plan = BackupPlan::directory(target_data_dir.to_path_buf());

    for (name, path, is_dir) in sorted_entries(source_data_dir)? {
        let partial = if is_dir && name.eq_ignore_ascii_case(CACHE_FOLDER) {
            trace!("Skipping cache folder {:?}", path);
            continue;
        } else if is_dir && name.eq_ignore_ascii_case(SAVES_FOLDER) {
            plan_saves(&path, store, cancel)?
        } else if is_dir {
            plan_tree(&path, &target_data_dir.join(&name), &ancestors, cancel)?
        } else {
            let length = fs::metadata(&path)?.len();
            BackupPlan::file(path, target_data_dir.join(&name), length)
        };
        plan = plan.merge(partial);
    }

    debug!(
        "Planned {} directories, {} files, {} saves ({} new), {} bytes",
        plan.directories_to_create.len(),
        plan.files.len(),
        plan.saves.len(),
        plan.new_save_count(),
        plan.total_bytes
    );
    Ok(plan)
}

/// Mirror a directory tree into the backup
///
/// `ancestors` holds the resolved paths of every directory above `source`.
fn plan_tree(
    source: &Path,
    destination: &Path,
    ancestors: &[PathBuf],
    cancel: &CancellationToken,
) -> Result<BackupPlan> {
    cancel.check()?;
    let resolved = fs::canonicalize(source)?;
    if ancestors.contains(&resolved) {
        return Err(VaultError::validation(format!(
            "{:?} links back to {:?}",
            source, resolved
        )));
    }
    let mut ancestors = ancestors.to_vec();
    ancestors.push(resolved);
    let mut plan = BackupPlan::directory(destination.to_path_buf());

    for (name, path, is_dir) in sorted_entries(source)? {
        let target = destination.join(&name);
        let partial = if is_dir {
            plan_tree(&path, &target, &ancestors, cancel)?
        } else {
            let length = fs::metadata(&path)?.len();
            BackupPlan::file(path, target, length)
        };
        plan = plan.merge(partial);
    }

    Ok(plan)
}

/// One planned save per immediate entry of the Saves folder
fn plan_saves(saves_dir: &Path, store: &SaveStore, cancel: &CancellationToken) -> Result<BackupPlan> {
    cancel.check()?;
    let mut plan = BackupPlan::default();

    for (name, path, is_directory) in sorted_entries(saves_dir)? {
        cancel.check()?;
        let hash = hash_save(&path, is_directory, cancel)?;
        let exists_in_store = store.exists(&hash, is_directory);
        let size = entry_size(&path);
        trace!("Save {} -> {} (stored: {})", name, &hash[..8], exists_in_store);

        plan = plan.merge(BackupPlan::save(PlannedSave {
            source: path,
            relative_path: name.replace('\\', "/"),
            hash,
            is_directory,
            exists_in_store,
            size,
        }));
    }

    Ok(plan)
}

/// Immediate children of `dir` as `(name, path, is_dir)`, sorted by name
///
/// `is_dir` describes the link target for symbolic links.
fn sorted_entries(dir: &Path) -> Result<Vec<(String, PathBuf, bool)>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let is_dir = match fs::metadata(entry.path()) {
            Ok(meta) => meta.is_dir(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && entry.file_type()?.is_symlink() => {
                warn!("Skipping dangling symbolic link {:?}", entry.path());
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        entries.push((entry.file_name().to_string_lossy().to_string(), entry.path(), is_dir));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}
