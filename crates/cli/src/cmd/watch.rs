//! Watch paths and print every event

use anyhow::{Context, Result};
use seer_watcher::{Watcher, WatcherConfig};
use std::path::PathBuf;

pub async fn run(config: WatcherConfig, paths: &[PathBuf]) -> Result<()> {
    let watcher = Watcher::with_config(config).context("Failed to create watcher")?;

    for path in paths {
        watcher
            .add(path)
            .with_context(|| format!("Failed to watch {}", path.display()))?;
    }

    let events = watcher.events().clone();
    super::serve(watcher, events, |_| true).await
}
