//! Concurrent hashing pipeline.
//!
//! ```text
//! walker thread --(bounded paths)--> N hash workers --(bounded results)--> consumer
//!                                          |
//!                              closer joins all workers,
//!                              then drops the last results sender
//! ```
//!
//! The walker blocks when the path queue is full, so enumeration never runs
//! unboundedly ahead of hashing. The consumer runs on the calling thread and
//! is the only code that sees results, which is what lets the dedup index be
//! mutated without locks.

use std::path::{Path, PathBuf};
use std::thread;

use crossbeam_channel::{Receiver, Sender, bounded};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::hasher::{self, ContentHasher};
use crate::index::FileRecord;
use crate::progress::ProgressObserver;
use crate::scanner::{self, Walk, WalkEntry};

/// A file that was dropped from processing
#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub reason: String,
}

/// Totals for one pipeline pass
#[derive(Debug, Default)]
pub struct PassReport {
    /// Regular files the walker handed to the workers
    pub discovered: usize,
    /// Files hashed and passed to the consumer
    pub hashed: usize,
    /// Files skipped by the walker or dropped by a worker
    pub failures: Vec<FileFailure>,
}

type Outcome = std::result::Result<FileRecord, FileFailure>;

/// Walk `root`, hash every file, and hand each record to `consume`.
///
/// `consume` runs on the calling thread, one record at a time, in the order
/// hashes complete. Per-file failures are collected in the report and never
/// stop the pass. Structural failures (unreadable root, fatal walk error, a
/// panicked thread) are returned as `Err` after all threads have stopped; an
/// unreadable root fails before any file is hashed.
pub fn run<H, F>(
    root: &Path,
    config: &PipelineConfig,
    hasher: &H,
    observer: &dyn ProgressObserver,
    mut consume: F,
) -> Result<PassReport>
where
    H: ContentHasher,
    F: FnMut(FileRecord),
{
    config.validate()?;
    let exclude = config.exclude_set()?;

    let (path_tx, path_rx) = bounded::<WalkEntry>(config.queue_capacity);
    let (result_tx, result_rx) = bounded::<Outcome>(config.queue_capacity);
    let threshold = config.small_file_threshold;

    info!(
        root = %root.display(),
        workers = config.workers,
        queue = config.queue_capacity,
        "starting hashing pipeline"
    );

    thread::scope(|scope| -> Result<PassReport> {
        let walker = scope.spawn(move || -> Result<Walked> {
            let walk = scanner::walk(root, exclude)?;
            feed(walk, path_tx, observer)
        });

        let workers: Vec<_> = (0..config.workers)
            .map(|id| {
                let paths = path_rx.clone();
                let results = result_tx.clone();
                scope.spawn(move || hash_worker(id, paths, results, hasher, threshold, observer))
            })
            .collect();
        drop(path_rx);

        // Join barrier: results close only after every worker has exited
        let closer = scope.spawn(move || {
            let mut panicked = false;
            for worker in workers {
                panicked |= worker.join().is_err();
            }
            drop(result_tx);
            panicked
        });

        let mut report = PassReport::default();
        for outcome in result_rx {
            match outcome {
                Ok(record) => {
                    report.hashed += 1;
                    consume(record);
                }
                Err(failure) => report.failures.push(failure),
            }
        }

        let worker_panicked = closer
            .join()
            .map_err(|_| Error::WorkerPanicked("closer"))?;
        let walked = walker
            .join()
            .map_err(|_| Error::WorkerPanicked("walker"))??;
        if worker_panicked {
            return Err(Error::WorkerPanicked("hash worker"));
        }

        report.discovered = walked.discovered;
        report.failures.extend(walked.skipped);
        debug!(
            discovered = report.discovered,
            hashed = report.hashed,
            failed = report.failures.len(),
            "pipeline drained"
        );
        Ok(report)
    })
}

struct Walked {
    discovered: usize,
    skipped: Vec<FileFailure>,
}

/// Producer: push walk entries into the bounded queue until the walk ends.
///
/// Dropping `paths` on return is what tells the workers to finish.
fn feed(
    mut walk: Walk,
    paths: Sender<WalkEntry>,
    observer: &dyn ProgressObserver,
) -> Result<Walked> {
    let mut discovered = 0;

    for entry in walk.by_ref() {
        let entry = entry?;
        debug!(path = %entry.path.display(), mode = format_args!("{:o}", entry.mode), "queued");
        observer.on_discovered(&entry.path, entry.size);
        if paths.send(entry).is_err() {
            // All workers are gone
            break;
        }
        discovered += 1;
    }

    let skipped = walk
        .into_skipped()
        .into_iter()
        .map(|s| {
            observer.on_failed(&s.path, &s.reason);
            FileFailure {
                path: s.path,
                reason: s.reason,
            }
        })
        .collect();

    Ok(Walked {
        discovered,
        skipped,
    })
}

/// Worker: hash paths until the queue is closed and empty.
fn hash_worker<H: ContentHasher>(
    id: usize,
    paths: Receiver<WalkEntry>,
    results: Sender<Outcome>,
    hasher: &H,
    threshold: u64,
    observer: &dyn ProgressObserver,
) {
    for entry in paths {
        let outcome = match hasher::hash_file(hasher, &entry.path, entry.size, threshold) {
            Ok(digest) => {
                let record = FileRecord {
                    path: entry.path,
                    digest,
                };
                observer.on_hashed(&record);
                Ok(record)
            }
            Err(e) => {
                warn!(worker = id, path = %entry.path.display(), error = %e, "hash failed, dropping file");
                observer.on_failed(&entry.path, &e.to_string());
                Err(FileFailure {
                    path: entry.path,
                    reason: e.to_string(),
                })
            }
        };

        if results.send(outcome).is_err() {
            break;
        }
    }
    debug!(worker = id, "worker exiting");
}
