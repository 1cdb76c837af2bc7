//! Mark-and-sweep garbage collection of the save store
//!
//! 1. **Mark**: load every valid manifest under the backup root and collect
//!    the content hashes their saves reference.
//! 2. **Sweep**: walk the save store, recover each entry's hash from its name
//!    and delete entries whose hash was not marked.
//!
//! `.partial` copies left behind by an interrupted insert are always swept.
//! Other names that do not parse as `<hash>.file` / `<hash>.dir` are never
//! touched. Collection is best effort: failed deletions are logged, recorded
//! in [`GcStats::failures`] and retried implicitly by the next sweep.

use crate::manifest::ManifestStore;
use crate::save_store::{is_partial_name, SaveStore};
use crate::types::GcStats;
use crate::utils::entry_size;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Reclaims save store entries no manifest references
#[derive(Debug, Clone)]
pub struct GarbageCollector<'a> {
    manifests: &'a ManifestStore,
    store: &'a SaveStore,
}

impl<'a> GarbageCollector<'a> {
    /// Collector over the manifests and save store of one backup root
    pub fn new(manifests: &'a ManifestStore, store: &'a SaveStore) -> Self {
        Self { manifests, store }
    }

    /// Delete every unreferenced store entry
    pub fn sweep(&self) -> GcStats {
        self.run(false)
    }

    /// Report what [`sweep`](Self::sweep) would delete without deleting anything
    pub fn analyze(&self) -> GcStats {
        self.run(true)
    }

    /// Hashes referenced by at least one valid manifest
    pub fn live_set(&self) -> HashSet<String> {
        self.manifests
            .list_all()
            .iter()
            .flat_map(|(manifest, _)| manifest.referenced_hashes())
            .collect()
    }

    fn run(&self, dry_run: bool) -> GcStats {
        let start = Instant::now();
        let mut stats = GcStats::default();

        let live = self.live_set();
        stats.live_hashes = live.len();

        let entries = match self.store.entries() {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to enumerate save store {:?}: {}", self.store.root(), e);
                stats.failures.push(e.to_string());
                return stats;
            }
        };

        for entry in entries {
            stats.entries_examined += 1;
            let referenced = match &entry.key {
                Some(key) => live.contains(&key.hash),
                None if is_partial_name(&entry.name) => {
                    debug!("Found leftover partial copy {}", entry.name);
                    false
                }
                None => {
                    debug!("Leaving unrecognized store entry {}", entry.name);
                    stats.skipped_entries.push(entry.name);
                    continue;
                }
            };
            if referenced {
                continue;
            }

            stats.unreferenced_entries.push(entry.name.clone());
            let size = entry_size(&entry.path);
            if dry_run {
                stats.bytes_reclaimed += size;
                continue;
            }

            match self.store.remove(&entry.path) {
                Ok(()) => {
                    stats.entries_deleted += 1;
                    stats.bytes_reclaimed += size;
                }
                Err(e) => {
                    warn!("{}", e);
                    stats.failures.push(e.to_string());
                }
            }
        }

        stats.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Garbage collection{} complete in {}ms: {} of {} entries unreferenced, {} deleted",
            if dry_run { " (dry run)" } else { "" },
            stats.duration_ms,
            stats.unreferenced_entries.len(),
            stats.entries_examined,
            stats.entries_deleted
        );
        stats
    }
}
