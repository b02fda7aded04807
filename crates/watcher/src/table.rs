//! Watch table: watched paths <-> kernel watch handles
//!
//! The forward (path -> entry) and reverse (handle -> path) maps live behind
//! one lock and are kept in 1:1 correspondence. Removal is a handshake: the
//! caller asks the kernel to drop a watch, then waits on `purged` until the
//! poll loop sees the kernel's acknowledgement and calls [`WatchTable::purge`].

use parking_lot::{Condvar, Mutex};
use seer_core::WatchError;
use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Opaque kernel watch identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchHandle(pub i32);

impl fmt::Display for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wd{}", self.0)
    }
}

/// A registered watch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchEntry {
    /// Kernel handle for the watch
    pub handle: WatchHandle,
    /// Kernel flags registered so far (only ever widened)
    pub flags: u32,
}

#[derive(Default)]
struct Maps {
    by_path: HashMap<PathBuf, WatchEntry>,
    by_handle: HashMap<WatchHandle, PathBuf>,
}

impl Maps {
    fn insert(&mut self, path: &Path, entry: WatchEntry) {
        // Re-arming may hand back a new handle (the path now names another inode)
        if let Some(old) = self.by_path.get(path) {
            if old.handle != entry.handle {
                self.by_handle.remove(&old.handle);
            }
        }

        // Two names for one inode share a handle; the newest name wins
        if let Some(other) = self.by_handle.get(&entry.handle) {
            if other != path {
                warn!(
                    "{} already watched as {}, replacing with {}",
                    entry.handle,
                    other.display(),
                    path.display()
                );
                let other = other.clone();
                self.by_path.remove(&other);
            }
        }

        self.by_path.insert(path.to_path_buf(), entry);
        self.by_handle.insert(entry.handle, path.to_path_buf());
        self.check();
    }

    fn remove_handle(&mut self, handle: WatchHandle) -> Option<PathBuf> {
        let path = self.by_handle.remove(&handle)?;
        if self.by_path.get(&path).map(|e| e.handle) == Some(handle) {
            self.by_path.remove(&path);
        }
        self.check();
        Some(path)
    }

    fn owns(&self, path: &Path, handle: WatchHandle) -> bool {
        self.by_handle.get(&handle).map(PathBuf::as_path) == Some(path)
    }

    fn check(&self) {
        debug_assert_eq!(
            self.by_path.len(),
            self.by_handle.len(),
            "watch table forward/reverse maps out of sync"
        );
    }
}

/// Shared bookkeeping between caller threads and the poll loop
#[derive(Default)]
pub struct WatchTable {
    maps: Mutex<Maps>,
    purged: Condvar,
}

impl WatchTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `path`, or widen its existing registration
    ///
    /// `arm` is called under the table lock with the union of the new and
    /// already registered flags, and whether the path was already watched.
    /// It performs the kernel call and returns the resulting handle. On
    /// failure the table is left untouched.
    pub fn register<F>(&self, path: &Path, flags: u32, arm: F) -> Result<WatchEntry, WatchError>
    where
        F: FnOnce(u32, bool) -> Result<WatchHandle, WatchError>,
    {
        let mut maps = self.maps.lock();
        let existing = maps.by_path.get(path).copied();
        let flags = existing.map_or(flags, |e| e.flags | flags);

        let handle = arm(flags, existing.is_some())?;
        let entry = WatchEntry { handle, flags };
        maps.insert(path, entry);

        debug!("Registered {} as {} (flags {:#x})", path.display(), handle, flags);
        Ok(entry)
    }

    /// Current registration for `path`
    pub fn entry(&self, path: &Path) -> Option<WatchEntry> {
        self.maps.lock().by_path.get(path).copied()
    }

    /// Kernel handle for `path`
    pub fn handle_of(&self, path: &Path) -> Option<WatchHandle> {
        self.entry(path).map(|e| e.handle)
    }

    /// Resolve a kernel handle back to its watched path
    pub fn resolve(&self, handle: WatchHandle) -> Option<PathBuf> {
        self.maps.lock().by_handle.get(&handle).cloned()
    }

    /// Drop a handle the kernel has invalidated and wake blocked removers
    pub fn purge(&self, handle: WatchHandle) -> Option<PathBuf> {
        let mut maps = self.maps.lock();
        let path = maps.remove_handle(handle);
        self.purged.notify_all();
        path
    }

    /// Block until `handle` no longer backs `path`
    ///
    /// Returns `false` if `timeout` elapsed first; the entry is then purged
    /// here so the caller still observes a consistent table.
    pub fn wait_purged(&self, path: &Path, handle: WatchHandle, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut maps = self.maps.lock();

        while maps.owns(path, handle) {
            match deadline {
                None => self.purged.wait(&mut maps),
                Some(deadline) => {
                    if self.purged.wait_until(&mut maps, deadline).timed_out() && maps.owns(path, handle) {
                        maps.remove_handle(handle);
                        self.purged.notify_all();
                        return false;
                    }
                }
            }
        }

        true
    }

    /// Forget every watch and release all blocked removers
    pub fn clear(&self) {
        let mut maps = self.maps.lock();
        maps.by_path.clear();
        maps.by_handle.clear();
        self.purged.notify_all();
    }

    /// Number of watched paths
    pub fn len(&self) -> usize {
        let maps = self.maps.lock();
        maps.check();
        maps.by_path.len()
    }

    /// Whether nothing is watched
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All watched paths, sorted
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.maps.lock().by_path.keys().cloned().collect();
        paths.sort();
        paths
    }
}

/// Lexically clean a path before it is used as a table key
///
/// - Collapses repeated separators and drops trailing ones
/// - Removes `.` components (an empty result becomes `.`)
/// - Keeps `..`, which can't be resolved without touching the filesystem
pub fn normalize_path(path: &Path) -> PathBuf {
    let cleaned: PathBuf = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect();

    if cleaned.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        cleaned
    }
}
