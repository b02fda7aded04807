//! Watcher configuration
//!
//! Loaded from TOML, e.g.:
//! ```toml
//! event_capacity = 1024
//! read_buffer_bytes = 65536
//! remove_timeout_ms = 2000
//! debounce_ms = 100
//! ```

use crate::error::WatchError;
use crate::event::Op;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Size of a raw kernel record header (wd, mask, cookie, len)
pub const RECORD_HEADER_LEN: usize = 16;

/// Smallest read buffer that can always hold one record with a maximal name
pub const MIN_READ_BUFFER: usize = RECORD_HEADER_LEN + 256;

/// Default read buffer: room for 4096 minimal records
pub const DEFAULT_READ_BUFFER: usize = RECORD_HEADER_LEN * 4096;

/// Default quiet window for write-completion debouncing
pub const DEFAULT_DEBOUNCE_MS: u64 = 100;

/// Watcher tuning knobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Capacity of the events channel (`None` = unbounded)
    pub event_capacity: Option<usize>,

    /// Bytes requested from the kernel per read
    pub read_buffer_bytes: usize,

    /// Upper bound on how long `remove` waits for the kernel to confirm
    /// (`None` = wait until confirmed)
    pub remove_timeout_ms: Option<u64>,

    /// Quiet window before a write burst is reported as finished
    pub debounce_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            event_capacity: None,
            read_buffer_bytes: DEFAULT_READ_BUFFER,
            remove_timeout_ms: None,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

impl WatcherConfig {
    /// Parse configuration from a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self, WatchError> {
        toml::from_str(s).map_err(|e| WatchError::Config(e.to_string()))
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, WatchError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| WatchError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    /// Read buffer size, never smaller than one maximal record
    pub fn read_buffer_len(&self) -> usize {
        self.read_buffer_bytes.max(MIN_READ_BUFFER)
    }

    /// Bounded wait for `remove`, if configured
    pub fn remove_timeout(&self) -> Option<Duration> {
        self.remove_timeout_ms.map(Duration::from_millis)
    }

    /// Debounce quiet window
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Set the bounded wait for `remove`
    pub fn with_remove_timeout(mut self, timeout: Duration) -> Self {
        self.remove_timeout_ms = Some(millis(timeout));
        self
    }

    /// Set the debounce quiet window
    pub fn with_debounce(mut self, window: Duration) -> Self {
        self.debounce_ms = millis(window);
        self
    }

    /// Bound the events channel
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = Some(capacity);
        self
    }
}

/// Per-path options for `Watcher::add_with`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WatchOptions {
    /// Operations to report; empty means every portable operation
    pub ops: Op,
    /// Watch a symlink itself rather than what it points to
    pub no_follow: bool,
}

impl WatchOptions {
    pub fn new(ops: Op) -> Self {
        Self { ops, no_follow: false }
    }

    /// Don't dereference `path` if it is a symlink
    pub fn no_follow(mut self) -> Self {
        self.no_follow = true;
        self
    }
}

impl From<Op> for WatchOptions {
    fn from(ops: Op) -> Self {
        Self::new(ops)
    }
}

/// Whole milliseconds, saturating at `u64::MAX`
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
