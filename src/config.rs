use std::fs;
use std::path::Path;
use std::thread;

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::error::{Error, Result};

/// Files below this size are read into memory before hashing (1 GiB)
pub const DEFAULT_SMALL_FILE_THRESHOLD: u64 = 1024 * 1024 * 1024;

/// Capacity of the path queue and the results queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

const MIN_WORKERS: usize = 8;
const MAX_WORKERS: usize = 16;

/// Settings for one pipeline pass
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of hashing workers
    pub workers: usize,
    /// Bound on both the path queue and the results queue
    pub queue_capacity: usize,
    /// Files strictly smaller than this are hashed from memory
    pub small_file_threshold: u64,
    /// Glob patterns pruned from the walk
    pub exclude: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            small_file_threshold: DEFAULT_SMALL_FILE_THRESHOLD,
            exclude: Vec::new(),
        }
    }
}

impl PipelineConfig {
    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::InvalidConfig {
                message: "at least one worker is required".to_string(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(Error::InvalidConfig {
                message: "queue capacity must be at least 1".to_string(),
            });
        }
        self.exclude_set().map(|_| ())
    }

    /// Compile the exclude patterns.
    pub fn exclude_set(&self) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.exclude {
            let glob = Glob::new(pattern).map_err(|e| Error::InvalidConfig {
                message: format!("bad exclude pattern '{}': {}", pattern, e),
            })?;
            builder.add(glob);
        }
        builder.build().map_err(|e| Error::InvalidConfig {
            message: e.to_string(),
        })
    }
}

/// Read exclude patterns from a file, one per line.
///
/// Blank lines and lines starting with `#` are ignored.
pub fn read_exclude_file(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect())
}

/// Worker count sized to the machine, clamped to 8..=16
fn default_workers() -> usize {
    thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(MIN_WORKERS)
        .clamp(MIN_WORKERS, MAX_WORKERS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();

        assert!(config.validate().is_ok());
        assert!((MIN_WORKERS..=MAX_WORKERS).contains(&config.workers));
        assert_eq!(config.queue_capacity, 1000);
        assert_eq!(config.small_file_threshold, 1 << 30);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = PipelineConfig {
            workers: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_zero_queue_rejected() {
        let config = PipelineConfig {
            queue_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_glob_rejected() {
        let config = PipelineConfig {
            exclude: vec!["a[".to_string()],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_read_exclude_file_skips_comments_and_blanks() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("excludes.txt");
        fs::write(&path, "# logs\n*.log\n\n   \n  cache  \n").unwrap();

        let patterns = read_exclude_file(&path).unwrap();

        assert_eq!(patterns, vec!["*.log".to_string(), "cache".to_string()]);
    }

    #[test]
    fn test_read_missing_exclude_file() {
        assert!(read_exclude_file(Path::new("/nonexistent/excludes.txt")).is_err());
    }

    #[test]
    fn test_exclude_set_matches() {
        let config = PipelineConfig {
            exclude: vec!["*.log".to_string(), "node_modules".to_string()],
            ..Default::default()
        };
        let set = config.exclude_set().unwrap();

        assert!(set.is_match("debug.log"));
        assert!(set.is_match("node_modules"));
        assert!(!set.is_match("main.rs"));
    }
}
