//! Print one event per finished write
//!
//! A single logical write can show up as hundreds of Write events (a compiler
//! writing a large binary, say). Where the platform reports close-after-write
//! that event is used directly; otherwise bursts are debounced.

use anyhow::{Context, Result};
use seer_watcher::debounce::Completion;
use seer_watcher::{Debouncer, Op, Watcher, WatcherConfig};
use std::path::PathBuf;
use tracing::debug;

/// Operations to watch for the chosen completion strategy
fn ops_for(completion: Completion) -> Op {
    match completion {
        Completion::Native => Op::CLOSE_WRITE,
        Completion::Debounce(_) => Op::CREATE | Op::WRITE,
    }
}

pub async fn run(config: WatcherConfig, paths: &[PathBuf], force_debounce: bool) -> Result<()> {
    let window = config.debounce_window();
    let watcher = Watcher::with_config(config).context("Failed to create watcher")?;

    let completion = if force_debounce {
        Completion::Debounce(window)
    } else {
        watcher.completion()
    };
    debug!("Write completion: {:?}", completion);

    let ops = ops_for(completion);
    for path in paths {
        watcher
            .add_with(path, ops)
            .with_context(|| format!("Failed to watch {}", path.display()))?;
    }

    let (_debouncer, completions) =
        Debouncer::spawn(watcher.events().clone(), completion).context("Failed to start debouncer")?;
    super::serve(watcher, completions, |event| event.has(Op::CLOSE_WRITE)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_ops_for_completion() {
        assert_eq!(ops_for(Completion::Native), Op::CLOSE_WRITE);
        assert_eq!(
            ops_for(Completion::Debounce(Duration::from_millis(100))),
            Op::CREATE | Op::WRITE
        );
    }
}
