use std::ffi::OsStr;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use globset::GlobSet;
use jwalk::{DirEntryIter, Parallelism, WalkDir};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// A regular file found during the walk
#[derive(Debug, Clone)]
pub struct WalkEntry {
    pub path: PathBuf,
    pub size: u64,
    /// Permission bits (`st_mode & 0o7777`)
    pub mode: u32,
}

/// An entry the walk stepped over
#[derive(Debug, Clone)]
pub struct Skipped {
    pub path: PathBuf,
    pub reason: String,
}

/// Entries whose base name starts with `.` are never walked
pub fn is_hidden(name: &OsStr) -> bool {
    name.as_encoded_bytes().starts_with(b".")
}

/// Lazy walk over every regular file under a root.
///
/// Directories are read in sorted order, depth first. Hidden and excluded
/// entries are pruned before they are descended into. Permission errors and
/// entries that vanish mid-walk are logged and kept for [`Walk::into_skipped`];
/// any other error is yielded as `Err` and should end the walk.
pub struct Walk {
    inner: DirEntryIter<((), ())>,
    skipped: Vec<Skipped>,
}

/// Start walking `root`.
///
/// The root must exist, be a directory, and be readable; otherwise this fails
/// before anything is yielded.
pub fn walk(root: &Path, exclude: GlobSet) -> Result<Walk> {
    check_root(root)?;

    let prune_root = root.to_path_buf();
    let inner = WalkDir::new(root)
        .skip_hidden(false) // handled below so the root itself is never pruned
        .follow_links(false) // Don't follow symlinks to avoid infinite loops
        .sort(true)
        .parallelism(Parallelism::Serial)
        .process_read_dir(move |depth, _dir, _state, children| {
            // The root arrives alone in a parentless listing
            if depth.is_none() {
                return;
            }
            children.retain(|child| match child {
                Ok(entry) => {
                    !is_hidden(&entry.file_name)
                        && !is_excluded(&exclude, &prune_root, &entry.path())
                }
                Err(_) => true,
            });
        })
        .into_iter();

    Ok(Walk {
        inner,
        skipped: Vec::new(),
    })
}

impl Walk {
    /// Entries stepped over
    pub fn into_skipped(self) -> Vec<Skipped> {
        self.skipped
    }

    /// Record a transient walk error, or turn it into a fatal one
    fn walk_error(&mut self, e: &jwalk::Error) -> Option<Error> {
        let path = e.path().map(Path::to_path_buf).unwrap_or_default();
        match e.io_error().map(io::Error::kind) {
            Some(kind) if is_transient(kind) => {
                self.skip(path, e.to_string());
                None
            }
            _ => Some(Error::Walk {
                path,
                message: e.to_string(),
            }),
        }
    }

    fn skip(&mut self, path: PathBuf, reason: String) {
        warn!(path = %path.display(), %reason, "skipping entry");
        self.skipped.push(Skipped { path, reason });
    }
}

impl Iterator for Walk {
    type Item = Result<WalkEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(e) => match self.walk_error(&e) {
                    Some(fatal) => return Some(Err(fatal)),
                    None => continue,
                },
            };

            // A directory that could not be listed is still yielded, with the error attached
            if let Some(e) = &entry.read_children_error {
                if let Some(fatal) = self.walk_error(e) {
                    return Some(Err(fatal));
                }
                continue;
            }

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let metadata = match fs::symlink_metadata(&path) {
                Ok(m) => m,
                Err(e) if is_transient(e.kind()) => {
                    self.skip(path, e.to_string());
                    continue;
                }
                Err(e) => return Some(Err(Error::io(path, e))),
            };

            debug!(path = %path.display(), size = metadata.len(), "discovered");
            return Some(Ok(WalkEntry {
                path,
                size: metadata.len(),
                mode: metadata.permissions().mode() & 0o7777,
            }));
        }
    }
}

/// Sizes of every regular file under `root`, in walk order.
///
/// Skipped entries are logged and left out.
pub fn file_sizes(root: &Path, exclude: GlobSet) -> Result<Vec<u64>> {
    walk(root, exclude)?
        .map(|entry| entry.map(|e| e.size))
        .collect()
}

fn check_root(root: &Path) -> Result<()> {
    let root_error = |source| Error::SourceRoot {
        path: root.to_path_buf(),
        source,
    };

    let metadata = fs::metadata(root).map_err(root_error)?;
    if !metadata.is_dir() {
        return Err(root_error(io::Error::from(io::ErrorKind::NotADirectory)));
    }
    fs::read_dir(root).map_err(root_error)?;
    Ok(())
}

fn is_transient(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::PermissionDenied | io::ErrorKind::NotFound
    )
}

fn is_excluded(exclude: &GlobSet, root: &Path, path: &Path) -> bool {
    if exclude.is_empty() {
        return false;
    }
    let name_match = path.file_name().is_some_and(|name| exclude.is_match(name));
    name_match
        || path
            .strip_prefix(root)
            .is_ok_and(|relative| exclude.is_match(relative))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    /// Helper to create a test file with specific content
    fn create_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let mut file = File::create(&path).unwrap();
        file.write_all(content).unwrap();
        path
    }

    fn scan(root: &Path) -> Vec<WalkEntry> {
        walk(root, GlobSet::empty())
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    fn scan_excluding(root: &Path, patterns: &[&str]) -> Vec<WalkEntry> {
        let config = PipelineConfig {
            exclude: patterns.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        };
        walk(root, config.exclude_set().unwrap())
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_finds_files() {
        let temp = TempDir::new().unwrap();
        create_file(temp.path(), "file1.txt", b"hello");
        create_file(temp.path(), "file2.txt", b"world");

        let files = scan(temp.path());

        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_returns_correct_sizes() {
        let temp = TempDir::new().unwrap();
        create_file(temp.path(), "small.txt", b"hi");
        create_file(temp.path(), "large.txt", b"hello world!");

        let files = scan(temp.path());

        let small = files
            .iter()
            .find(|f| f.path.ends_with("small.txt"))
            .unwrap();
        let large = files
            .iter()
            .find(|f| f.path.ends_with("large.txt"))
            .unwrap();

        assert_eq!(small.size, 2);
        assert_eq!(large.size, 12);
    }

    #[test]
    fn test_reports_permission_bits() {
        let temp = TempDir::new().unwrap();
        let path = create_file(temp.path(), "script.sh", b"#!/bin/sh");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o741)).unwrap();

        let files = scan(temp.path());

        assert_eq!(files[0].mode, 0o741);
    }

    #[test]
    fn test_scans_subdirectories() {
        let temp = TempDir::new().unwrap();
        create_file(temp.path(), "root.txt", b"root");
        create_file(temp.path(), "subdir/nested.txt", b"nested");

        let files = scan(temp.path());

        assert_eq!(files.len(), 2);
        assert!(files.iter().any(|f| f.path.ends_with("root.txt")));
        assert!(files.iter().any(|f| f.path.ends_with("subdir/nested.txt")));
    }

    #[test]
    fn test_skips_directories() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("subdir")).unwrap();
        create_file(temp.path(), "file.txt", b"content");

        let files = scan(temp.path());

        assert_eq!(files.len(), 1);
        assert!(files[0].path.ends_with("file.txt"));
    }

    #[test]
    fn test_skips_hidden_files_and_directories() {
        let temp = TempDir::new().unwrap();
        create_file(temp.path(), "visible.txt", b"visible");
        create_file(temp.path(), ".hidden.txt", b"hidden");
        create_file(temp.path(), ".git/config", b"hidden dir");
        create_file(temp.path(), "sub/.secret", b"nested hidden");
        create_file(temp.path(), "sub/.cache/blob", b"nested hidden dir");
        create_file(temp.path(), "sub/shown.txt", b"nested visible");

        let files = scan(temp.path());

        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| {
            f.path
                .strip_prefix(temp.path())
                .unwrap()
                .components()
                .all(|c| !is_hidden(c.as_os_str()))
        }));
    }

    #[test]
    fn test_hidden_root_is_still_walked() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join(".stash");
        create_file(&root, "inside.txt", b"inside");
        create_file(&root, "sub/f.txt", b"nested");
        create_file(&root, "sub/.skip", b"hidden");

        let files = scan(&root);

        assert_eq!(files.len(), 2);
        assert!(files.iter().any(|f| f.path.ends_with("sub/f.txt")));
    }

    #[test]
    fn test_non_utf8_hidden_name() {
        use std::os::unix::ffi::OsStrExt;

        assert!(is_hidden(OsStr::from_bytes(b".\xff")));
        assert!(!is_hidden(OsStr::from_bytes(b"\xff.")));

        let temp = TempDir::new().unwrap();
        create_file(temp.path(), "shown.txt", b"shown");
        fs::write(temp.path().join(OsStr::from_bytes(b".\xffdata")), b"hidden").unwrap();

        let files = scan(temp.path());

        assert_eq!(files.len(), 1);
        assert!(files[0].path.ends_with("shown.txt"));
    }

    #[test]
    fn test_exclude_prunes_directories_and_names() {
        let temp = TempDir::new().unwrap();
        create_file(temp.path(), "keep.txt", b"keep");
        create_file(temp.path(), "skip.log", b"skip");
        create_file(temp.path(), "node_modules/pkg/a.js", b"skip");
        create_file(temp.path(), "build/out/main.o", b"skip");

        let files = scan_excluding(temp.path(), &["*.log", "node_modules", "**/*.o"]);

        assert_eq!(files.len(), 1);
        assert!(files[0].path.ends_with("keep.txt"));
    }

    #[test]
    fn test_empty_directory() {
        let temp = TempDir::new().unwrap();

        let files = scan(temp.path());

        assert!(files.is_empty());
    }

    #[test]
    fn test_handles_symlinks() {
        let temp = TempDir::new().unwrap();
        let file_path = create_file(temp.path(), "real.txt", b"content");
        std::os::unix::fs::symlink(&file_path, temp.path().join("link.txt")).unwrap();

        let files = scan(temp.path());

        assert_eq!(files.len(), 1);
        assert!(files[0].path.ends_with("real.txt"));
    }

    #[test]
    fn test_deeply_nested() {
        let temp = TempDir::new().unwrap();
        create_file(temp.path(), "a/b/c/deep.txt", b"deep content");

        let files = scan(temp.path());

        assert_eq!(files.len(), 1);
        assert!(files[0].path.ends_with("a/b/c/deep.txt"));
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let temp = TempDir::new().unwrap();
        let result = walk(&temp.path().join("missing"), GlobSet::empty());

        assert!(matches!(result, Err(Error::SourceRoot { .. })));
    }

    #[test]
    fn test_file_root_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = create_file(temp.path(), "plain.txt", b"not a dir");

        assert!(matches!(
            walk(&path, GlobSet::empty()),
            Err(Error::SourceRoot { .. })
        ));
    }

    #[test]
    fn test_unreadable_subdirectory_is_skipped() {
        let temp = TempDir::new().unwrap();
        create_file(temp.path(), "ok.txt", b"ok");
        create_file(temp.path(), "locked/secret.txt", b"secret");
        let locked = temp.path().join("locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        // Root can read anything, so only check the no-abort part there
        let mut entries = walk(temp.path(), GlobSet::empty()).unwrap();
        let files: Vec<WalkEntry> = entries.by_ref().collect::<Result<_>>().unwrap();

        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert!(files.iter().any(|f| f.path.ends_with("ok.txt")));
        if !files.iter().any(|f| f.path.ends_with("secret.txt")) {
            assert!(!entries.into_skipped().is_empty());
        }
    }

    #[test]
    fn test_file_sizes() {
        let temp = TempDir::new().unwrap();
        create_file(temp.path(), "a.txt", b"12345");
        create_file(temp.path(), "b/c.txt", b"123");

        let mut sizes = file_sizes(temp.path(), GlobSet::empty()).unwrap();
        sizes.sort();

        assert_eq!(sizes, vec![3, 5]);
    }
}
