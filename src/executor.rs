//! Backup execution
//!
//! Carries out a [`BackupPlan`]: creates the directory skeleton, streams
//! plain files into the backup's `Data/` tree, inserts new saves into the
//! save store and records a [`SaveReference`] for every save.
//!
//! Execution is sequential and not re-entrant. If it fails part-way the
//! caller deletes the whole backup directory; the save store is left as is,
//! because every entry in it is complete and content-addressed, and anything
//! no manifest references is reclaimed by the next garbage collection.

use crate::cancel::CancellationToken;
use crate::error::Result;
use crate::plan::BackupPlan;
use crate::save_store::SaveStore;
use crate::types::{BackupManifest, OperationPhase, ProgressCallback, ProgressReporter, SaveReference};
use crate::utils::copy_file_streaming;
use std::fs;
use tracing::{debug, trace};

/// Counters describing what an execution did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    /// Plain files copied
    pub files_copied: usize,
    /// Plain file bytes copied
    pub bytes_copied: u64,
    /// Saves newly inserted into the store
    pub saves_stored: usize,
    /// Saves the store already held
    pub saves_reused: usize,
}

/// Execute `plan`, appending one reference per save to `manifest`
///
/// Progress is reported after every file and every newly stored save as
/// completed bytes over `plan.total_bytes`.
///
/// # Errors
///
/// I/O failures and cancellation are returned as-is; partial output is left
/// for the caller to roll back.
pub fn execute(
    plan: &BackupPlan,
    manifest: &mut BackupManifest,
    store: &SaveStore,
    buffer_size: usize,
    progress: Option<ProgressCallback>,
    cancel: &CancellationToken,
) -> Result<ExecutionStats> {
    let mut stats = ExecutionStats::default();
    let mut reporter = ProgressReporter::new(progress, plan.total_bytes);

    for dir in &plan.directories_to_create {
        cancel.check()?;
        fs::create_dir_all(dir)?;
    }

    let file_count = plan.files.len();
    for (idx, file) in plan.files.iter().enumerate() {
        let copied = copy_file_streaming(&file.source, &file.destination, buffer_size, cancel)?;
        stats.files_copied += 1;
        stats.bytes_copied += copied;
        reporter.advance(
            file.length.max(1),
            &format!("Copying files ({}/{})", idx + 1, file_count),
            OperationPhase::Copying,
        );
    }

    for save in &plan.saves {
        cancel.check()?;
        if !save.exists_in_store {
            let inserted = store.put(&save.source, &save.hash, save.is_directory, cancel)?;
            if inserted {
                stats.saves_stored += 1;
            } else {
                stats.saves_reused += 1;
            }
            reporter.advance(
                save.size.max(1),
                &format!("Archiving save {}", save.relative_path),
                OperationPhase::Archiving,
            );
        } else {
            trace!("Save {} already in store", save.relative_path);
            stats.saves_reused += 1;
        }

        manifest.saves.push(SaveReference {
            relative_path: save.relative_path.clone(),
            content_hash: save.hash.clone(),
            is_directory: save.is_directory,
            size_bytes: save.size,
        });
    }

    debug!(
        "Executed plan: {} files ({} bytes), {} saves stored, {} reused",
        stats.files_copied, stats.bytes_copied, stats.saves_stored, stats.saves_reused
    );
    Ok(stats)
}
