use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the backup and dedup runs.
///
/// Per-file variants (`Io`, `OutsideRoot`, `VerifyMismatch`) are collected into
/// the run report and never abort a run. Everything else is structural.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O failure on a specific path.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Source root is missing, not a directory, or unreadable.
    #[error("Cannot read source root {path}: {source}")]
    SourceRoot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The directory walk hit an error it cannot step over.
    #[error("Walk failed at {path}: {message}")]
    Walk { path: PathBuf, message: String },

    /// State file exists but could not be read.
    #[error("Cannot read state file {path}: {source}")]
    StateRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// State file exists but is not a digest -> path document.
    #[error("State file {path} is not valid: {source}")]
    StateFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// State file could not be written.
    #[error("Cannot write state file {path}: {source}")]
    StateWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A record handed to the materializer does not live under the source root.
    #[error("{path} is not under the source root {root}")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    /// A cross-device copy produced different bytes than the original.
    #[error("Copy of {path} failed verification (expected {expected}, got {actual})")]
    VerifyMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// Invalid pipeline settings.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// A pipeline thread panicked.
    #[error("Pipeline thread panicked: {0}")]
    WorkerPanicked(&'static str),
}

impl Error {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_carries_path() {
        let err = Error::io("/data/a.txt", io::Error::from(io::ErrorKind::NotFound));
        let msg = err.to_string();
        assert!(msg.contains("/data/a.txt"));
    }

    #[test]
    fn test_outside_root_message() {
        let err = Error::OutsideRoot {
            path: PathBuf::from("/elsewhere/x"),
            root: PathBuf::from("/src"),
        };
        assert_eq!(err.to_string(), "/elsewhere/x is not under the source root /src");
    }
}
