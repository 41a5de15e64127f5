use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::index::DedupIndex;

/// Load the persisted index.
///
/// A missing file is the first-run case and yields an empty index. A file
/// that exists but cannot be read or parsed is an error: carrying on with an
/// empty index would re-archive everything.
pub fn load(path: &Path) -> Result<DedupIndex> {
    let content = match fs::read(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!(path = %path.display(), "no state file yet, starting empty");
            return Ok(DedupIndex::new());
        }
        Err(source) => {
            return Err(Error::StateRead {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let entries: BTreeMap<String, PathBuf> =
        serde_json::from_slice(&content).map_err(|source| Error::StateFormat {
            path: path.to_path_buf(),
            source,
        })?;

    debug!(path = %path.display(), entries = entries.len(), "state loaded");
    Ok(entries.into_iter().collect())
}

/// Persist the index as a flat `digest -> path` JSON object.
///
/// The document is written to a temporary file next to `path`, flushed to
/// disk, then renamed over `path`, so a crash never leaves a truncated state
/// file behind.
pub fn save(path: &Path, index: &DedupIndex) -> Result<()> {
    let write_error = |source| Error::StateWrite {
        path: path.to_path_buf(),
        source,
    };

    // Sorted keys keep the file diffable between runs
    let entries: BTreeMap<&str, &Path> = index.iter().collect();
    let json = serde_json::to_vec_pretty(&entries).map_err(|e| write_error(e.into()))?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(write_error)?;

    let mut temp = NamedTempFile::new_in(dir).map_err(write_error)?;
    temp.write_all(&json).map_err(write_error)?;
    temp.as_file().sync_all().map_err(write_error)?;
    temp.persist(path).map_err(|e| write_error(e.error))?;

    debug!(path = %path.display(), entries = index.len(), "state saved");
    Ok(())
}
