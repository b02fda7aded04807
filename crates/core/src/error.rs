//! Error taxonomy shared by all watcher backends

use crate::event::Op;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by watcher operations or delivered on the error stream
#[derive(Debug, Error)]
pub enum WatchError {
    /// The kernel refused to watch a path (missing, permission denied, quota)
    #[error("cannot watch {}: {source}", path.display())]
    Registration {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// `remove` was called for a path that is not watched
    #[error("can't remove non-existent watch: {}", .0.display())]
    NotWatched(PathBuf),

    /// The watcher was closed
    #[error("watcher already closed")]
    Closed,

    /// The kernel produced a malformed event record
    #[error("malformed event record: {0}")]
    Protocol(String),

    /// The kernel event queue overflowed; some events were lost
    #[error("event queue overflow: some events were dropped")]
    Overflow,

    /// A system call failed
    #[error("{call}: {source}")]
    Syscall {
        call: &'static str,
        #[source]
        source: io::Error,
    },

    /// The backend cannot deliver the requested operations
    #[error("operations not supported on this platform: {0}")]
    Unsupported(Op),

    /// The configuration could not be loaded
    #[error("invalid watcher configuration: {0}")]
    Config(String),
}
