use std::fs;
use std::path::{self, Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::actions::{self, ActionResult};
use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::hasher::ContentHasher;
use crate::index::{Classification, DedupIndex, FileRecord, Recorded, classify, settle};
use crate::pipeline::{self, FileFailure, PassReport};
use crate::progress::ProgressObserver;
use crate::state;

/// Settings shared by every run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub config: PipelineConfig,
    /// Classify and report only; touch no files and save no state
    pub dry_run: bool,
}

/// What to do with duplicates found by [`dedup`]
#[derive(Debug, Clone)]
pub enum DuplicateAction {
    /// Move into this root, keeping the relative path
    Relocate(PathBuf),
    /// Remove from disk
    Delete,
}

/// Counters for a finished run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    /// Regular files discovered by the walk
    pub total_files: usize,
    /// Files successfully hashed
    pub hashed_files: usize,
    /// Digests first seen in this run
    pub new_files: usize,
    /// Files whose content was already in the persisted index
    pub known_files: usize,
    /// Files whose content matched another file
    pub duplicate_files: usize,
    /// Files copied, moved or deleted
    pub processed_files: usize,
    /// Bytes copied, moved or freed
    pub processed_bytes: u64,
    /// Files skipped because of an error
    pub failed_files: usize,
    /// Entries in the index after the run
    pub index_entries: usize,
}

/// Complete outcome of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub stats: RunStats,
    /// Duplicate set, in the order the consumer classified it
    pub duplicates: Vec<FileRecord>,
    pub failures: Vec<FileFailure>,
    pub dry_run: bool,
}

impl RunReport {
    fn new(pass: PassReport, action: ActionResult, dry_run: bool) -> Self {
        let mut failures = pass.failures;
        failures.extend(
            action
                .errors
                .into_iter()
                .map(|(path, reason)| FileFailure { path, reason }),
        );

        let stats = RunStats {
            total_files: pass.discovered,
            hashed_files: pass.hashed,
            processed_files: action.completed.len(),
            processed_bytes: action.bytes,
            failed_files: failures.len(),
            ..Default::default()
        };

        Self {
            stats,
            duplicates: Vec::new(),
            failures,
            dry_run,
        }
    }
}

/// Copy every piece of content under `source` not yet archived into `dest`.
///
/// The index at `state_path` says which digests are already archived. New
/// content is copied once, from the first path to finish hashing; other paths
/// with the same content are reported as duplicates. Only successful copies
/// are added to the index, so failures are retried on the next run. The index
/// is saved even when some files failed.
pub fn backup<H: ContentHasher>(
    source: &Path,
    dest: &Path,
    state_path: &Path,
    options: &RunOptions,
    hasher: &H,
    observer: &dyn ProgressObserver,
) -> Result<RunReport> {
    let source = source_root(source)?;
    let dest = separate_root(&source, dest)?;
    let mut archived = state::load(state_path)?;
    let before = archived.len();
    if archived.is_empty() {
        info!(state = %state_path.display(), "nothing archived yet, full backup");
    }

    let mut candidates = DedupIndex::new();
    let mut pending = Vec::new();
    let mut duplicates = Vec::new();
    let mut known = 0;

    let pass = pipeline::run(&source, &options.config, hasher, observer, |record| {
        if archived.lookup(&record.digest).is_some() {
            known += 1;
            return;
        }
        match candidates.record(record.digest.clone(), record.path.clone()) {
            Recorded::Inserted => pending.push(record),
            Recorded::Present(_) => duplicates.push(record),
        }
    })?;

    let new_files = pending.len();
    let copied = actions::archive_copy_all(&source, &dest, pending, options.dry_run, observer)?;

    if !options.dry_run {
        for record in &copied.completed {
            archived.record(record.digest.clone(), record.path.clone());
        }
        state::save(state_path, &archived)?;
    }
    observer.on_finished();

    let mut report = RunReport::new(pass, copied, options.dry_run);
    report.stats.new_files = new_files;
    report.stats.known_files = known;
    report.stats.duplicate_files = duplicates.len();
    report.stats.index_entries = archived.len();
    report.duplicates = duplicates;

    info!(
        archived = archived.len() - before,
        known,
        failed = report.stats.failed_files,
        "backup finished"
    );
    Ok(report)
}

/// Find content stored more than once under `source` and remove the extra copies.
///
/// The first path to finish hashing for each digest becomes canonical, unless
/// the index at `state_path` already names one that is still in the tree.
/// Every other path is a duplicate and is relocated or deleted. Canonical
/// paths are never touched, and when a loaded canonical path has been moved
/// or removed, a surviving copy takes its place in the index.
pub fn dedup<H: ContentHasher>(
    source: &Path,
    action: &DuplicateAction,
    state_path: Option<&Path>,
    options: &RunOptions,
    hasher: &H,
    observer: &dyn ProgressObserver,
) -> Result<RunReport> {
    let source = source_root(source)?;
    let action = match action {
        DuplicateAction::Relocate(quarantine) => {
            DuplicateAction::Relocate(separate_root(&source, quarantine)?)
        }
        DuplicateAction::Delete => DuplicateAction::Delete,
    };
    let mut index = match state_path {
        Some(path) => state::load(path)?,
        None => DedupIndex::new(),
    };

    let mut classified = Classification::default();
    let pass = pipeline::run(&source, &options.config, hasher, observer, |record| {
        classify(&mut index, record, &mut classified)
    })?;
    settle(&mut index, &mut classified);

    let duplicates = classified.duplicates;
    let result = match &action {
        DuplicateAction::Relocate(quarantine) => actions::relocate_all(
            &source,
            quarantine,
            duplicates.clone(),
            hasher,
            options.dry_run,
            observer,
        )?,
        DuplicateAction::Delete => actions::delete_all(duplicates.clone(), options.dry_run),
    };

    if !options.dry_run {
        if let Some(path) = state_path {
            state::save(path, &index)?;
        }
    }
    observer.on_finished();

    let mut report = RunReport::new(pass, result, options.dry_run);
    report.stats.new_files = classified.unique.len();
    report.stats.known_files = classified.unchanged + classified.relinked.len();
    report.stats.duplicate_files = duplicates.len();
    report.stats.index_entries = index.len();
    report.duplicates = duplicates;

    info!(
        unique = index.len(),
        duplicates = report.stats.duplicate_files,
        failed = report.stats.failed_files,
        "dedup finished"
    );
    Ok(report)
}

/// Resolve the source root so recorded paths are stable across runs.
fn source_root(source: &Path) -> Result<PathBuf> {
    fs::canonicalize(source).map_err(|e| Error::SourceRoot {
        path: source.to_path_buf(),
        source: e,
    })
}

/// Destination roots may not live inside the tree being walked.
fn separate_root(source: &Path, dest: &Path) -> Result<PathBuf> {
    let dest = match fs::canonicalize(dest) {
        Ok(resolved) => resolved,
        Err(_) => path::absolute(dest).map_err(|e| Error::io(dest, e))?,
    };
    if dest.starts_with(source) {
        return Err(Error::InvalidConfig {
            message: format!(
                "destination {} is inside the source root {}",
                dest.display(),
                source.display()
            ),
        });
    }
    Ok(dest)
}
