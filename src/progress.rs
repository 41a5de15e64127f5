use std::path::Path;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::index::FileRecord;

/// Hooks the core invokes as work progresses.
///
/// Called from the walker thread, worker threads and the consumer, so
/// implementations must be thread safe. All methods default to no-ops.
pub trait ProgressObserver: Send + Sync {
    fn on_discovered(&self, _path: &Path, _size: u64) {}
    fn on_hashed(&self, _record: &FileRecord) {}
    fn on_failed(&self, _path: &Path, _reason: &str) {}
    fn on_materialized(&self, _path: &Path) {}
    fn on_finished(&self) {}
}

/// Observer that does nothing
pub struct SilentObserver;

impl ProgressObserver for SilentObserver {}

/// Spinner on stderr counting discovered and hashed files
pub struct SpinnerObserver {
    bar: ProgressBar,
}

impl SpinnerObserver {
    pub fn new() -> Self {
        // Length grows as files are discovered
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        bar.set_message("Scanning...");
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar }
    }
}

impl Default for SpinnerObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressObserver for SpinnerObserver {
    fn on_discovered(&self, _path: &Path, _size: u64) {
        self.bar.inc_length(1);
        self.update();
    }

    fn on_hashed(&self, _record: &FileRecord) {
        self.bar.inc(1);
        self.update();
    }

    fn on_failed(&self, path: &Path, reason: &str) {
        self.bar.inc(1);
        self.bar
            .suspend(|| eprintln!("  skipped {}: {}", path.display(), reason));
    }

    fn on_materialized(&self, path: &Path) {
        self.bar.set_message(format!("Writing {}", path.display()));
    }

    fn on_finished(&self) {
        self.bar.finish_and_clear();
    }
}

impl SpinnerObserver {
    fn update(&self) {
        let total = self.bar.length().unwrap_or(0);
        self.bar
            .set_message(format!("Hashed {}/{} files", self.bar.position(), total));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        hashed: AtomicUsize,
    }

    impl ProgressObserver for Counting {
        fn on_hashed(&self, _record: &FileRecord) {
            self.hashed.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_default_hooks_are_noops() {
        let observer = Counting::default();
        let record = FileRecord {
            path: PathBuf::from("/a"),
            digest: "d".to_string(),
        };

        observer.on_discovered(Path::new("/a"), 1);
        observer.on_hashed(&record);
        observer.on_failed(Path::new("/b"), "gone");
        observer.on_finished();

        assert_eq!(observer.hashed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_spinner_counts() {
        let observer = SpinnerObserver::new();
        let record = FileRecord {
            path: PathBuf::from("/a"),
            digest: "d".to_string(),
        };

        observer.on_discovered(Path::new("/a"), 1);
        observer.on_discovered(Path::new("/b"), 1);
        observer.on_hashed(&record);

        assert_eq!(observer.bar.length(), Some(2));
        assert_eq!(observer.bar.position(), 1);
        observer.on_finished();
    }
}
