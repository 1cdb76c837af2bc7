//! Content-addressed save store
//!
//! Saves are stored once per fingerprint in a flat folder shared by every
//! backup under a root:
//!
//! ```text
//! backup_root/
//! ├── SaveStore/
//! │   ├── <hash>.file     # a save that was a single file
//! │   └── <hash>.dir/     # a save that was a directory tree
//! ├── 2024-05-01-001/
//! │   ├── Data/           # plain files of the data directory
//! │   └── manifest.json
//! └── 2024-05-01-002/
//! ```
//!
//! ## Invariants
//!
//! - At most one entry exists per `(hash, is_directory)` pair.
//! - Entries are never modified after creation.
//! - An entry name only appears once its content is complete: content is
//!   copied into a hidden `.partial` sibling first and renamed into place.
//! - An entry's content always hashes to its name. The `.partial` copy is
//!   re-hashed before the rename and discarded on a mismatch.
//! - Entries are only deleted by the garbage collector.

use crate::cancel::CancellationToken;
use crate::error::{CleanupError, Result, VaultError};
use crate::hashing::{hash_save, is_content_hash};
use crate::types::StoreStats;
use crate::utils::{self, copy_dir_recursive, copy_file_streaming, entry_size};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// Suffix of store entries holding a single save file
pub const FILE_SUFFIX: &str = ".file";
/// Suffix of store entries holding a save directory
pub const DIR_SUFFIX: &str = ".dir";
const PARTIAL_SUFFIX: &str = ".partial";

/// Identity of a store entry recovered from its name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryKey {
    /// Content hash
    pub hash: String,
    /// Whether the entry is a directory save
    pub is_directory: bool,
}

impl EntryKey {
    /// Parse `<hash>.file` or `<hash>.dir`
    ///
    /// Returns `None` for anything else, including in-flight `.partial` copies.
    pub fn parse(name: &str) -> Option<Self> {
        let (hash, is_directory) = if let Some(hash) = name.strip_suffix(FILE_SUFFIX) {
            (hash, false)
        } else if let Some(hash) = name.strip_suffix(DIR_SUFFIX) {
            (hash, true)
        } else {
            return None;
        };

        is_content_hash(hash).then(|| Self {
            hash: hash.to_string(),
            is_directory,
        })
    }

    /// File name of the entry
    pub fn file_name(&self) -> String {
        entry_name(&self.hash, self.is_directory)
    }
}

/// One item found in the store folder
#[derive(Debug, Clone)]
pub struct StoreEntry {
    /// File name inside the store
    pub name: String,
    /// Full path
    pub path: PathBuf,
    /// Parsed identity, `None` when the name is not a store entry name
    pub key: Option<EntryKey>,
}

/// Content-addressed repository of save archives
#[derive(Debug, Clone)]
pub struct SaveStore {
    /// Folder holding the entries
    root: PathBuf,
    /// Streaming copy buffer size
    buffer_size: usize,
}

impl SaveStore {
    /// Create a handle for the store at `root`; no I/O is performed
    pub fn new(root: PathBuf, buffer_size: usize) -> Self {
        Self { root, buffer_size }
    }

    /// Folder holding the entries
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the entry for `hash`
    ///
    /// Pure function of its arguments; the entry may or may not exist.
    pub fn path(&self, hash: &str, is_directory: bool) -> PathBuf {
        self.root.join(entry_name(hash, is_directory))
    }

    /// Whether the entry for `hash` is present
    pub fn exists(&self, hash: &str, is_directory: bool) -> bool {
        let path = self.path(hash, is_directory);
        if is_directory {
            path.is_dir()
        } else {
            path.is_file()
        }
    }

    /// Insert a save under its fingerprint
    ///
    /// Copies `source` into the store unless an entry for the same hash and
    /// kind already exists, in which case nothing happens. The copy goes to a
    /// uniquely named `.partial` sibling and is renamed into place once
    /// complete, so a cancelled or failed insert never leaves a store entry
    /// behind.
    ///
    /// # Returns
    ///
    /// `true` if a new entry was created, `false` if it already existed.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Validation`] if `hash` is not a content hash
    /// - [`VaultError::HashMismatch`] if the copied content does not hash to
    ///   `hash`, typically because the save changed since it was hashed
    /// - [`VaultError::Io`] if the copy or rename fails
    /// - [`VaultError::Cancelled`] if the token was raised mid-copy
    pub fn put(
        &self,
        source: &Path,
        hash: &str,
        is_directory: bool,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        if !is_content_hash(hash) {
            return Err(VaultError::validation(format!("'{}' is not a content hash", hash)));
        }
        if self.exists(hash, is_directory) {
            trace!("Save {} already stored", &hash[..8]);
            return Ok(false);
        }

        fs::create_dir_all(&self.root)?;
        let final_path = self.path(hash, is_directory);
        let partial_path = self.root.join(format!(
            ".{}.{}{}",
            entry_name(hash, is_directory),
            uuid::Uuid::new_v4().simple(),
            PARTIAL_SUFFIX
        ));

        let copied = if is_directory {
            copy_dir_recursive(source, &partial_path, self.buffer_size, cancel)
        } else {
            copy_file_streaming(source, &partial_path, self.buffer_size, cancel)
        };

        let verified = copied.and_then(|_| {
            cancel.check()?;
            let actual = hash_save(&partial_path, is_directory, cancel)?;
            if actual == hash {
                Ok(())
            } else {
                Err(VaultError::HashMismatch {
                    path: source.to_path_buf(),
                    expected: hash.to_string(),
                    actual,
                })
            }
        });

        if let Err(e) = verified {
            discard_partial(&partial_path);
            return Err(e);
        }

        if let Err(e) = fs::rename(&partial_path, &final_path) {
            discard_partial(&partial_path);
            if self.exists(hash, is_directory) {
                // Someone else completed the same entry first
                return Ok(false);
            }
            return Err(e.into());
        }

        debug!("Stored save {} as {:?}", &hash[..8], final_path.file_name());
        Ok(true)
    }

    /// Delete a single store entry
    pub fn remove(&self, entry_path: &Path) -> std::result::Result<(), CleanupError> {
        utils::remove_path(entry_path)
    }

    /// Every item in the store folder, recognized or not
    ///
    /// A missing store folder is an empty store.
    pub fn entries(&self) -> Result<Vec<StoreEntry>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            entries.push(StoreEntry {
                key: EntryKey::parse(&name),
                path: entry.path(),
                name,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Entry counts and total size of recognized entries
    pub fn stats(&self) -> Result<StoreStats> {
        let mut stats = StoreStats::default();
        for entry in self.entries()? {
            let Some(key) = entry.key else { continue };
            stats.entry_count += 1;
            if key.is_directory {
                stats.directory_entries += 1;
            } else {
                stats.file_entries += 1;
            }
            stats.total_bytes += entry_size(&entry.path);
        }
        Ok(stats)
    }
}

/// Whether `name` is a `.partial` copy left behind by an interrupted insert
pub fn is_partial_name(name: &str) -> bool {
    name.strip_prefix('.')
        .and_then(|rest| rest.strip_suffix(PARTIAL_SUFFIX))
        .and_then(|rest| rest.rsplit_once('.'))
        .is_some_and(|(entry, _)| EntryKey::parse(entry).is_some())
}

fn entry_name(hash: &str, is_directory: bool) -> String {
    format!("{}{}", hash, if is_directory { DIR_SUFFIX } else { FILE_SUFFIX })
}

fn discard_partial(path: &Path) {
    if let Err(e) = utils::remove_path(path) {
        warn!("{}", e);
    }
}
