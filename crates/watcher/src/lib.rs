//! Filesystem change notifications for Seer
//!
//! This crate provides:
//! - A `Watcher` over the platform backend (inotify on Linux)
//! - The watch table mapping paths to kernel watch handles
//! - Suppression of stale kernel events
//! - Write-completion synthesis for backends without a native close-write

pub mod backend;
pub mod debounce;
pub mod filter;
pub mod platform;
pub mod table;

use backend::Backend;
use crossbeam_channel::Receiver;
use debounce::Completion;
use platform::PlatformBackend;
use std::path::{Path, PathBuf};

// Re-exports
pub use debounce::Debouncer;
pub use seer_core::{Event, Op, Result, WatchError, WatchOptions, WatcherConfig};

/// Watches paths and delivers portable events
///
/// Events and errors arrive on two independent streams. Both close once the
/// watcher is closed, either explicitly or by dropping it.
///
/// ```no_run
/// use seer_watcher::Watcher;
///
/// let watcher = Watcher::new()?;
/// watcher.add("/tmp")?;
/// for event in watcher.events() {
///     println!("{event}");
/// }
/// # Ok::<(), seer_watcher::WatchError>(())
/// ```
pub struct Watcher {
    backend: PlatformBackend,
    events: Receiver<Event>,
    errors: Receiver<WatchError>,
    config: WatcherConfig,
}

impl Watcher {
    /// Create a watcher with the default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(WatcherConfig::default())
    }

    /// Create a watcher tuned by `config`
    ///
    /// Fails with [`WatchError::Unsupported`] on targets without a backend.
    pub fn with_config(config: WatcherConfig) -> Result<Self> {
        let (backend, events, errors) = PlatformBackend::create(&config)?;
        Ok(Self {
            backend,
            events,
            errors,
            config,
        })
    }

    /// Watch `path` for every portable operation
    pub fn add(&self, path: impl AsRef<Path>) -> Result<()> {
        self.backend.add(path.as_ref(), WatchOptions::default())
    }

    /// Watch `path` with the given operations or [`WatchOptions`]
    ///
    /// Adding a path that is already watched widens its registration to the
    /// union of old and new operations. An empty set means all portable ones.
    ///
    /// ```no_run
    /// use seer_watcher::{Op, WatchOptions, Watcher};
    ///
    /// let watcher = Watcher::new()?;
    /// watcher.add_with("/tmp/build", Op::CREATE | Op::CLOSE_WRITE)?;
    /// watcher.add_with("/tmp/current", WatchOptions::new(Op::CHMOD).no_follow())?;
    /// # Ok::<(), seer_watcher::WatchError>(())
    /// ```
    pub fn add_with(&self, path: impl AsRef<Path>, options: impl Into<WatchOptions>) -> Result<()> {
        self.backend.add(path.as_ref(), options.into())
    }

    /// Stop watching `path`
    ///
    /// Blocks until the kernel has confirmed the watch is gone (or the
    /// configured remove timeout elapses). No event for the path is delivered
    /// after this returns.
    pub fn remove(&self, path: impl AsRef<Path>) -> Result<()> {
        self.backend.remove(path.as_ref())
    }

    /// Stop watching everything and close both streams
    pub fn close(&self) -> Result<()> {
        self.backend.close()
    }

    /// Whether this platform can deliver every operation in `ops`
    pub fn supports(&self, ops: Op) -> bool {
        self.backend.supports(ops)
    }

    /// Currently watched paths, sorted
    pub fn watch_list(&self) -> Vec<PathBuf> {
        self.backend.watch_list()
    }

    /// Stream of events; closes when the watcher is closed
    pub fn events(&self) -> &Receiver<Event> {
        &self.events
    }

    /// Stream of errors from the background reader (overflow, read failures)
    pub fn errors(&self) -> &Receiver<WatchError> {
        &self.errors
    }

    /// Configuration this watcher was created with
    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    /// How write completion should be detected for this watcher
    pub fn completion(&self) -> Completion {
        if self.supports(Op::CLOSE_WRITE) {
            Completion::Native
        } else {
            Completion::Debounce(self.config.debounce_window())
        }
    }
}
