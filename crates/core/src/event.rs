//! Platform-independent filesystem events

use bitflags::bitflags;
use std::fmt;
use std::path::{Path, PathBuf};

bitflags! {
    /// Set of file operations carried by an [`Event`]
    ///
    /// The first five flags are portable. The rest are only reported by
    /// backends that can observe them, and only when asked for explicitly;
    /// use `Watcher::supports` before requesting one.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Op: u32 {
        /// A new path was created (or moved into a watched directory)
        const CREATE = 1 << 0;
        /// A file was written to; one logical write may produce many of these
        const WRITE = 1 << 1;
        /// A path was removed
        const REMOVE = 1 << 2;
        /// A path was renamed; reported with the old name
        const RENAME = 1 << 3;
        /// Attributes changed (Linux also sends this when a link is removed)
        const CHMOD = 1 << 4;
        /// A file opened for writing was closed
        const CLOSE_WRITE = 1 << 5;
        /// A file or directory was opened
        const OPEN = 1 << 6;
        /// A file was read from
        const READ = 1 << 7;
        /// A file opened read-only was closed
        const CLOSE_READ = 1 << 8;
    }
}

impl Op {
    /// Every operation all backends can deliver
    pub const PORTABLE: Op = Op::CREATE
        .union(Op::WRITE)
        .union(Op::REMOVE)
        .union(Op::RENAME)
        .union(Op::CHMOD);

    /// Display order, matching the order operations are usually reasoned about
    const NAMES: [(Op, &'static str); 9] = [
        (Op::CREATE, "CREATE"),
        (Op::REMOVE, "REMOVE"),
        (Op::WRITE, "WRITE"),
        (Op::RENAME, "RENAME"),
        (Op::CHMOD, "CHMOD"),
        (Op::OPEN, "OPEN"),
        (Op::READ, "READ"),
        (Op::CLOSE_WRITE, "CLOSE_WRITE"),
        (Op::CLOSE_READ, "CLOSE_READ"),
    ];
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (op, name) in Self::NAMES {
            if self.contains(op) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// A single filesystem change notification
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Event {
    /// Path of the file or directory that changed
    pub path: PathBuf,
    /// Operations that triggered the notification
    pub op: Op,
}

impl Event {
    /// Create a new event
    pub fn new(path: impl Into<PathBuf>, op: Op) -> Self {
        Self {
            path: path.into(),
            op,
        }
    }

    /// Check if the event carries all of the given operations
    pub fn has(&self, op: Op) -> bool {
        self.op.contains(op)
    }

    /// Path that changed
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.path, self.op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_orders_operations() {
        let event = Event::new("/tmp/a", Op::WRITE | Op::CREATE | Op::CHMOD);
        assert_eq!(event.to_string(), "\"/tmp/a\": CREATE|WRITE|CHMOD");
    }

    #[test]
    fn test_display_without_operations() {
        let event = Event::new("/tmp/a", Op::empty());
        assert_eq!(event.to_string(), "\"/tmp/a\": ");
    }

    #[test]
    fn test_display_platform_specific_operations() {
        let event = Event::new("/tmp/a", Op::CLOSE_READ | Op::READ | Op::OPEN | Op::CLOSE_WRITE);
        assert_eq!(event.to_string(), "\"/tmp/a\": OPEN|READ|CLOSE_WRITE|CLOSE_READ");
    }

    #[test]
    fn test_portable_excludes_platform_specific() {
        assert!(Op::PORTABLE.contains(Op::CREATE | Op::WRITE | Op::REMOVE));
        assert!(Op::PORTABLE.contains(Op::RENAME | Op::CHMOD));
        for op in [Op::CLOSE_WRITE, Op::OPEN, Op::READ, Op::CLOSE_READ] {
            assert!(!Op::PORTABLE.intersects(op));
        }
    }

    #[test]
    fn test_has() {
        let event = Event::new("x", Op::REMOVE | Op::RENAME);
        assert!(event.has(Op::REMOVE));
        assert!(event.has(Op::REMOVE | Op::RENAME));
        assert!(!event.has(Op::WRITE));
    }

    #[test]
    fn test_value_equality() {
        assert_eq!(Event::new("a", Op::WRITE), Event::new("a", Op::WRITE));
        assert_ne!(Event::new("a", Op::WRITE), Event::new("a", Op::CREATE));
    }
}
