//! The seam between the portable `Watcher` and OS notification facilities

use crossbeam_channel::Receiver;
use seer_core::{Event, Op, WatchError, WatchOptions, WatcherConfig};
use std::path::{Path, PathBuf};

/// An OS notification backend
///
/// A backend is created together with its two output streams. Both streams
/// close exactly once, when the backend is closed or dropped.
pub trait Backend: Send + Sync {
    /// Open the OS facility and start delivering into fresh streams
    fn create(config: &WatcherConfig) -> Result<(Self, Receiver<Event>, Receiver<WatchError>), WatchError>
    where
        Self: Sized;

    /// Watch `path` for `options.ops`, widening an existing registration
    fn add(&self, path: &Path, options: WatchOptions) -> Result<(), WatchError>;

    /// Stop watching `path`; returns once the backend has confirmed it
    fn remove(&self, path: &Path) -> Result<(), WatchError>;

    /// Release all OS resources and close both streams; idempotent
    fn close(&self) -> Result<(), WatchError>;

    /// Whether `ops` can be delivered by this backend
    fn supports(&self, ops: Op) -> bool;

    /// Currently watched paths, sorted
    fn watch_list(&self) -> Vec<PathBuf>;
}
