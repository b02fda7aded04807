//! Watch individual files through their parent directories
//!
//! Editors often save by writing a new file and renaming it over the old one,
//! which silently ends a watch on the file itself. Watching the directory and
//! filtering by name survives that.

use anyhow::{bail, Context, Result};
use seer_watcher::table::normalize_path;
use seer_watcher::{Event, Watcher, WatcherConfig};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Directory to watch for `file`
fn parent_dir(file: &Path) -> PathBuf {
    match file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Paths whose events should be printed
struct FileSet {
    files: BTreeSet<PathBuf>,
}

impl FileSet {
    fn new(files: &[PathBuf]) -> Self {
        Self {
            files: files.iter().map(|f| normalize_path(f)).collect(),
        }
    }

    fn matches(&self, event: &Event) -> bool {
        self.files.contains(&normalize_path(event.path()))
    }
}

pub async fn run(config: WatcherConfig, files: &[PathBuf]) -> Result<()> {
    let watcher = Watcher::with_config(config).context("Failed to create watcher")?;

    for file in files {
        let meta = fs::symlink_metadata(file).with_context(|| format!("Failed to stat {}", file.display()))?;
        if meta.is_dir() {
            bail!("{} is a directory, not a file", file.display());
        }

        let dir = parent_dir(file);
        watcher
            .add(&dir)
            .with_context(|| format!("Failed to watch {}", dir.display()))?;
    }

    let set = FileSet::new(files);
    let events = watcher.events().clone();
    super::serve(watcher, events, move |event| set.matches(event)).await
}
