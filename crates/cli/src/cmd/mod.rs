//! CLI command implementations and the shared print loop

pub mod file;
pub mod finish_write;
pub mod watch;

use anyhow::{Context, Result};
use crossbeam_channel::{never, select, Receiver};
use owo_colors::OwoColorize;
use seer_watcher::{Event, WatchError, Watcher, WatcherConfig};
use std::fmt::Display;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Build the watcher configuration from `--config` and `--debounce-ms`
pub fn load_config(path: Option<&Path>, debounce_ms: Option<u64>) -> Result<WatcherConfig> {
    let config = match path {
        Some(path) => WatcherConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => WatcherConfig::default(),
    };

    Ok(match debounce_ms {
        Some(ms) => config.with_debounce(Duration::from_millis(ms)),
        None => config,
    })
}

/// Print a line prefixed with the wall-clock time
fn print_time(line: impl Display) {
    println!("{} {}", chrono::Local::now().format("%H:%M:%S%.3f").dimmed(), line);
}

/// Print events accepted by `keep` and every error until both streams close
///
/// Returns the number of events printed.
fn print_loop<F>(events: &Receiver<Event>, errors: &Receiver<WatchError>, keep: F) -> usize
where
    F: Fn(&Event) -> bool,
{
    // A closed stream is swapped for one that never fires
    let mut events = events.clone();
    let mut errors = errors.clone();
    let (mut events_open, mut errors_open) = (true, true);
    let mut seen = 0;

    while events_open || errors_open {
        select! {
            recv(errors) -> err => match err {
                Ok(err) => print_time(format_args!("{}: {}", "ERROR".red().bold(), err)),
                Err(_) => {
                    errors_open = false;
                    errors = never();
                }
            },
            recv(events) -> event => match event {
                Ok(event) => {
                    if keep(&event) {
                        seen += 1;
                        print_time(format_args!("{:>3} {}", seen, event));
                    }
                }
                Err(_) => {
                    events_open = false;
                    events = never();
                }
            },
        }
    }
    seen
}

/// Print until Ctrl-C, then close the watcher and drain what is left
async fn serve<F>(watcher: Watcher, events: Receiver<Event>, keep: F) -> Result<()>
where
    F: Fn(&Event) -> bool + Send + 'static,
{
    let errors = watcher.errors().clone();
    let printer = tokio::task::spawn_blocking(move || print_loop(&events, &errors, keep));

    print_time("ready; press ^C to exit");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    watcher.close().context("Failed to close watcher")?;
    let seen = printer.await.context("Event printer failed")?;
    info!("{} events", seen);
    Ok(())
}
