use std::fs::{self, DirBuilder, File};
use std::io::{self, BufReader};
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::hasher::ContentHasher;
use crate::index::FileRecord;
use crate::progress::ProgressObserver;

/// Mode for directories created under a destination root
const DIR_MODE: u32 = 0o755;

/// Result of a batch of copies, moves or deletions
#[derive(Debug, Default)]
pub struct ActionResult {
    /// Records whose file was written, moved or removed
    pub completed: Vec<FileRecord>,
    /// Bytes copied, moved or freed
    pub bytes: u64,
    /// Errors encountered (path, error message)
    pub errors: Vec<(PathBuf, String)>,
}

impl ActionResult {
    fn absorb(&mut self, record: FileRecord, outcome: Result<u64>) {
        match outcome {
            Ok(bytes) => {
                self.bytes += bytes;
                self.completed.push(record);
            }
            Err(e) => {
                warn!(path = %record.path.display(), error = %e, "action failed, will retry next run");
                self.errors.push((record.path, e.to_string()));
            }
        }
    }
}

/// Map a path under `source_root` to the same relative path under `dest_root`.
pub fn destination_for(source_root: &Path, dest_root: &Path, path: &Path) -> Result<PathBuf> {
    let relative = path
        .strip_prefix(source_root)
        .map_err(|_| Error::OutsideRoot {
            path: path.to_path_buf(),
            root: source_root.to_path_buf(),
        })?;
    Ok(dest_root.join(relative))
}

/// Copy every record into `dest_root`, keeping its path relative to `source_root`.
///
/// Copies run in parallel. A record outside `source_root` fails the whole
/// batch before anything is written. Individual copy failures are collected
/// and the rest of the batch continues.
pub fn archive_copy_all(
    source_root: &Path,
    dest_root: &Path,
    records: Vec<FileRecord>,
    dry_run: bool,
    observer: &dyn ProgressObserver,
) -> Result<ActionResult> {
    let planned = plan(source_root, dest_root, records)?;
    let mut result = ActionResult::default();

    if dry_run {
        for (record, dest) in planned {
            debug!(from = %record.path.display(), to = %dest.display(), "dry run: would copy");
            let size = fs::metadata(&record.path).map(|m| m.len()).unwrap_or(0);
            result.absorb(record, Ok(size));
        }
        return Ok(result);
    }

    let outcomes: Vec<(FileRecord, Result<u64>)> = planned
        .into_par_iter()
        .map(|(record, dest)| {
            let outcome = copy_preserving_mode(&record.path, &dest);
            if outcome.is_ok() {
                observer.on_materialized(&dest);
            }
            (record, outcome)
        })
        .collect();

    for (record, outcome) in outcomes {
        result.absorb(record, outcome);
    }
    info!(copied = result.completed.len(), failed = result.errors.len(), "archive copy done");
    Ok(result)
}

/// Move every record out of the source tree into `quarantine_root`.
///
/// Same-filesystem moves are a rename. Across filesystems the file is copied,
/// the copy is re-hashed and compared against the record's digest, and only
/// then is the original removed.
pub fn relocate_all<H: ContentHasher>(
    source_root: &Path,
    quarantine_root: &Path,
    records: Vec<FileRecord>,
    hasher: &H,
    dry_run: bool,
    observer: &dyn ProgressObserver,
) -> Result<ActionResult> {
    let planned = plan(source_root, quarantine_root, records)?;
    let mut result = ActionResult::default();

    for (record, dest) in planned {
        if dry_run {
            debug!(from = %record.path.display(), to = %dest.display(), "dry run: would move");
            let size = fs::metadata(&record.path).map(|m| m.len()).unwrap_or(0);
            result.absorb(record, Ok(size));
            continue;
        }

        let outcome = move_file(&record, &dest, hasher);
        if outcome.is_ok() {
            observer.on_materialized(&dest);
        }
        result.absorb(record, outcome);
    }
    info!(moved = result.completed.len(), failed = result.errors.len(), "relocation done");
    Ok(result)
}

/// Remove every record from disk.
pub fn delete_all(records: Vec<FileRecord>, dry_run: bool) -> ActionResult {
    let mut result = ActionResult::default();

    for record in records {
        let outcome = fs::metadata(&record.path)
            .map_err(|e| Error::io(&record.path, e))
            .and_then(|meta| {
                if !dry_run {
                    fs::remove_file(&record.path).map_err(|e| Error::io(&record.path, e))?;
                }
                Ok(meta.len())
            });
        result.absorb(record, outcome);
    }
    result
}

/// Pair each record with its destination, rejecting anything outside the root.
fn plan(
    source_root: &Path,
    dest_root: &Path,
    records: Vec<FileRecord>,
) -> Result<Vec<(FileRecord, PathBuf)>> {
    records
        .into_iter()
        .map(|record| {
            let dest = destination_for(source_root, dest_root, &record.path)?;
            Ok((record, dest))
        })
        .collect()
}

fn create_parent_dirs(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) => DirBuilder::new()
            .recursive(true)
            .mode(DIR_MODE)
            .create(parent)
            .map_err(|e| Error::io(parent, e)),
        None => Ok(()),
    }
}

/// Copy bytes and permission bits. Returns bytes copied.
fn copy_preserving_mode(from: &Path, to: &Path) -> Result<u64> {
    create_parent_dirs(to)?;
    let permissions = fs::metadata(from)
        .map_err(|e| Error::io(from, e))?
        .permissions();
    let bytes = fs::copy(from, to).map_err(|e| Error::io(from, e))?;
    fs::set_permissions(to, permissions).map_err(|e| Error::io(to, e))?;
    Ok(bytes)
}

/// Move one file, falling back to copy + verify + delete across devices.
fn move_file<H: ContentHasher>(record: &FileRecord, dest: &Path, hasher: &H) -> Result<u64> {
    create_parent_dirs(dest)?;
    let size = fs::metadata(&record.path)
        .map_err(|e| Error::io(&record.path, e))?
        .len();

    match fs::rename(&record.path, dest) {
        Ok(()) => Ok(size),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            debug!(path = %record.path.display(), "rename crosses devices, copying instead");
            copy_verify_remove(record, dest, hasher)
        }
        Err(e) => Err(Error::io(&record.path, e)),
    }
}

/// Copy to `dest`, check the copy hashes to the record's digest, then remove
/// the original. On mismatch the copy is removed and the original kept.
fn copy_verify_remove<H: ContentHasher>(
    record: &FileRecord,
    dest: &Path,
    hasher: &H,
) -> Result<u64> {
    let bytes = copy_preserving_mode(&record.path, dest)?;

    let copy = File::open(dest).map_err(|e| Error::io(dest, e))?;
    let actual = hasher
        .hash_reader(&mut BufReader::new(copy))
        .map_err(|e| Error::io(dest, e))?;

    if actual != record.digest {
        if let Err(e) = fs::remove_file(dest) {
            warn!(path = %dest.display(), error = %e, "could not remove unverified copy");
        }
        return Err(Error::VerifyMismatch {
            path: record.path.clone(),
            expected: record.digest.clone(),
            actual,
        });
    }

    fs::remove_file(&record.path).map_err(|e| Error::io(&record.path, e))?;
    Ok(bytes)
}
