use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

/// One hashed file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub path: PathBuf,
    pub digest: String,
}

/// Outcome of [`DedupIndex::record`]
#[derive(Debug, PartialEq, Eq)]
pub enum Recorded<'a> {
    /// Digest was new; the path is now canonical for it
    Inserted,
    /// Digest was already known under this canonical path
    Present(&'a Path),
}

/// Digest to canonical path, first seen wins.
///
/// Entries are only ever added. Within a run "first seen" means first to come
/// out of the hashing pipeline, which is the order hashes *complete*, not the
/// order files were discovered. Callers that need the same canonical path
/// across runs should rely on the persisted index, not on walk order.
///
/// The index is not synchronized. It is owned and mutated by the single
/// pipeline consumer only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupIndex {
    entries: HashMap<String, PathBuf>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical path for a digest, if recorded
    pub fn lookup(&self, digest: &str) -> Option<&Path> {
        self.entries.get(digest).map(PathBuf::as_path)
    }

    /// Insert `digest -> path` unless the digest is already present.
    ///
    /// An existing entry is never overwritten.
    pub fn record(&mut self, digest: String, path: PathBuf) -> Recorded<'_> {
        use std::collections::hash_map::Entry;

        match self.entries.entry(digest) {
            Entry::Occupied(existing) => Recorded::Present(existing.into_mut().as_path()),
            Entry::Vacant(slot) => {
                slot.insert(path);
                Recorded::Inserted
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Point a digest at a new canonical path, replacing one that was not
    /// found in the tree this pass.
    fn relink(&mut self, digest: String, path: PathBuf) {
        self.entries.insert(digest, path);
    }

    /// Read-only view of all entries, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.entries
            .iter()
            .map(|(digest, path)| (digest.as_str(), path.as_path()))
    }
}

impl FromIterator<(String, PathBuf)> for DedupIndex {
    /// Build an index keeping the first path for each digest
    fn from_iter<I: IntoIterator<Item = (String, PathBuf)>>(iter: I) -> Self {
        let mut index = DedupIndex::new();
        for (digest, path) in iter {
            index.record(digest, path);
        }
        index
    }
}

/// How the consumer classified a pipeline pass
#[derive(Debug, Default)]
pub struct Classification {
    /// Records that became canonical during this pass
    pub unique: Vec<FileRecord>,
    /// Records whose digest already had a different canonical path
    pub duplicates: Vec<FileRecord>,
    /// Records that already were the canonical path for their digest
    pub unchanged: usize,
    /// Records that took over from a canonical path missing from the tree
    pub relinked: Vec<FileRecord>,
    /// Digests whose canonical path was seen in this pass
    confirmed: HashSet<String>,
    /// Records matching a canonical path not seen yet
    unconfirmed: Vec<FileRecord>,
}

/// Apply one record to the index and sort it into the classification.
///
/// A record only counts as a duplicate once its digest's canonical path has
/// been seen in the same pass. A canonical path loaded from an earlier run
/// may have been moved or deleted since, so records matching it wait for
/// [`settle`].
pub fn classify(index: &mut DedupIndex, record: FileRecord, into: &mut Classification) {
    match index.record(record.digest.clone(), record.path.clone()) {
        Recorded::Inserted => {
            into.confirmed.insert(record.digest.clone());
            into.unique.push(record);
        }
        Recorded::Present(canonical) if canonical == record.path => {
            into.confirmed.insert(record.digest);
            into.unchanged += 1;
        }
        Recorded::Present(_) if into.confirmed.contains(&record.digest) => {
            into.duplicates.push(record)
        }
        Recorded::Present(_) => into.unconfirmed.push(record),
    }
}

/// Resolve records held back by [`classify`] once the pass is drained.
///
/// If the canonical path turned up after all, they are duplicates. Otherwise
/// the first of them becomes canonical in its place, so the last copy of a
/// piece of content is never classified as a duplicate.
pub fn settle(index: &mut DedupIndex, into: &mut Classification) {
    for record in std::mem::take(&mut into.unconfirmed) {
        if into.confirmed.contains(&record.digest) {
            into.duplicates.push(record);
            continue;
        }
        debug!(
            digest = %record.digest,
            path = %record.path.display(),
            "canonical path missing, relinking"
        );
        index.relink(record.digest.clone(), record.path.clone());
        into.confirmed.insert(record.digest.clone());
        into.relinked.push(record);
    }
}
