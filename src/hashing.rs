//! Content fingerprints for saves
//!
//! A save is either a single file or a whole directory tree, and the save
//! store is keyed by its fingerprint. Both kinds are hashed with SHA-256 and
//! rendered as lowercase hex.
//!
//! ## Directory fingerprints
//!
//! A directory is hashed as one incremental digest over a canonical listing
//! of the tree:
//!
//! 1. every subdirectory contributes the UTF-8 bytes of `D:<relative path>`
//! 2. then every file contributes `F:<relative path>` immediately followed by
//!    its raw bytes
//!
//! Relative paths use `/` separators. Each group is ordered by the upper-cased
//! path, falling back to the raw path bytes for ties, so the digest does not
//! depend on the order in which the filesystem happens to enumerate entries.
//! Symbolic links are hashed as whatever they point to.
//! The path-then-bytes interleaving is part of the fingerprint: changing it
//! changes every directory hash already in a store.

use crate::cancel::CancellationToken;
use crate::error::{Result, VaultError};
use crate::utils::{to_forward_slashes, walk_resolved};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::trace;

const HASH_BUFFER_SIZE: usize = 8192;

/// Hash a file's content using SHA-256
///
/// The file is streamed through an 8KB buffer; cancellation is checked
/// before every chunk.
///
/// # Errors
///
/// - [`VaultError::Io`] if the file cannot be opened or read
/// - [`VaultError::Cancelled`] if the token was raised
pub fn hash_file(path: &Path, cancel: &CancellationToken) -> Result<String> {
    let mut hasher = Sha256::new();
    stream_into(&mut hasher, path, cancel)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Hash a directory tree using the canonical listing described above
///
/// # Errors
///
/// Any unreadable entry or file aborts hashing; a partial fingerprint is
/// never returned.
pub fn hash_directory(path: &Path, cancel: &CancellationToken) -> Result<String> {
    cancel.check()?;
    let (directories, files) = canonical_listing(path)?;
    let mut hasher = Sha256::new();

    for (relative, _) in &directories {
        hasher.update(format!("D:{}", relative).as_bytes());
    }

    for (relative, full_path) in &files {
        cancel.check()?;
        hasher.update(format!("F:{}", relative).as_bytes());
        stream_into(&mut hasher, full_path, cancel)?;
    }

    trace!(
        "Hashed directory {:?} ({} dirs, {} files)",
        path,
        directories.len(),
        files.len()
    );
    Ok(hex::encode(hasher.finalize()))
}

/// Hash a save, dispatching on whether it is a directory
pub fn hash_save(path: &Path, is_directory: bool, cancel: &CancellationToken) -> Result<String> {
    if is_directory {
        hash_directory(path, cancel)
    } else {
        hash_file(path, cancel)
    }
}

/// Whether `value` looks like a fingerprint produced by this module
pub fn is_content_hash(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

type Listing = Vec<(String, PathBuf)>;

/// Collect every subdirectory and file under `root`, each list sorted canonically
fn canonical_listing(root: &Path) -> Result<(Listing, Listing)> {
    let mut directories = Vec::new();
    let mut files = Vec::new();

    for entry in walk_resolved(root) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|_| VaultError::internal(format!("{:?} escaped {:?}", entry.path(), root)))?;
        let relative = to_forward_slashes(relative);

        if entry.file_type().is_dir() {
            directories.push((relative, entry.into_path()));
        } else {
            files.push((relative, entry.into_path()));
        }
    }

    directories.sort_by(|a, b| canonical_order(&a.0, &b.0));
    files.sort_by(|a, b| canonical_order(&a.0, &b.0));
    Ok((directories, files))
}

/// Case-insensitive ordinal ordering with a byte-wise tie break
fn canonical_order(a: &str, b: &str) -> std::cmp::Ordering {
    a.to_uppercase()
        .cmp(&b.to_uppercase())
        .then_with(|| a.as_bytes().cmp(b.as_bytes()))
}

fn stream_into(hasher: &mut Sha256, path: &Path, cancel: &CancellationToken) -> Result<()> {
    let mut file = File::open(path)?;
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];

    loop {
        cancel.check()?;
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(())
}
