#![allow(dead_code)]

use assert_cmd::cargo;
use std::fs;
use std::path::{Path, PathBuf};

pub fn hoard() -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::new(cargo::cargo_bin!("hoard"));
    cmd.env_remove("HOARD_LOG");
    cmd
}

pub fn create_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
    path
}

/// Paths of every regular file under `root`, relative to it, sorted
pub fn list_files(root: &Path) -> Vec<String> {
    fn visit(dir: &Path, root: &Path, out: &mut Vec<String>) {
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                visit(&path, root, out);
            } else {
                out.push(path.strip_prefix(root).unwrap().to_string_lossy().into_owned());
            }
        }
    }

    let mut out = Vec::new();
    if root.exists() {
        visit(root, root, &mut out);
    }
    out.sort();
    out
}

/// Run with JSON output and parse stdout
pub fn run_json(cmd: &mut assert_cmd::Command) -> serde_json::Value {
    let output = cmd
        .arg("--format")
        .arg("json")
        .arg("--no-progress")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    serde_json::from_slice(&output).unwrap()
}

pub fn read_state(path: &Path) -> serde_json::Map<String, serde_json::Value> {
    let content = fs::read(path).unwrap();
    serde_json::from_slice::<serde_json::Value>(&content)
        .unwrap()
        .as_object()
        .unwrap()
        .clone()
}
