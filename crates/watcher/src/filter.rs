//! Suppression of events that are kernel artifacts
//!
//! A Write can arrive after the Delete of the same file has already been
//! processed. Anything that is not itself a Remove or Rename is dropped when
//! the path no longer exists. This can also drop a legitimate event if the
//! file is deleted and recreated between the kernel event and the check.

use seer_core::{Event, Op};
use std::fs;
use std::io;
use std::path::Path;

/// Existence check used by the suppression filter
pub trait PathProbe {
    /// Whether `path` currently exists (without following symlinks)
    fn exists(&self, path: &Path) -> bool;
}

/// Probe backed by `lstat`
#[derive(Debug, Default, Clone, Copy)]
pub struct FsProbe;

impl PathProbe for FsProbe {
    fn exists(&self, path: &Path) -> bool {
        match fs::symlink_metadata(path) {
            Ok(_) => true,
            Err(e) => e.kind() != io::ErrorKind::NotFound,
        }
    }
}

impl<F> PathProbe for F
where
    F: Fn(&Path) -> bool,
{
    fn exists(&self, path: &Path) -> bool {
        self(path)
    }
}

/// Check if a decoded event should be dropped before delivery
pub fn should_suppress<P: PathProbe + ?Sized>(event: &Event, probe: &P) -> bool {
    if event.op.intersects(Op::REMOVE | Op::RENAME) {
        return false;
    }
    !probe.exists(&event.path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn missing(_: &Path) -> bool {
        false
    }

    #[test]
    fn test_write_for_missing_path_is_suppressed() {
        let event = Event::new("/gone", Op::WRITE);
        assert!(should_suppress(&event, &missing));
    }

    #[test]
    fn test_remove_for_missing_path_is_kept() {
        assert!(!should_suppress(&Event::new("/gone", Op::REMOVE), &missing));
        assert!(!should_suppress(&Event::new("/gone", Op::RENAME), &missing));
        assert!(!should_suppress(&Event::new("/gone", Op::CHMOD | Op::REMOVE), &missing));
    }

    #[test]
    fn test_existing_path_is_kept() {
        let present = |_: &Path| true;
        assert!(!should_suppress(&Event::new("/here", Op::WRITE), &present));
        assert!(!should_suppress(&Event::new("/here", Op::CREATE), &present));
    }

    #[test]
    fn test_fs_probe() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("file");
        fs::write(&file, b"x").unwrap();

        assert!(FsProbe.exists(&file));
        assert!(!FsProbe.exists(&temp_dir.path().join("missing")));

        fs::remove_file(&file).unwrap();
        assert!(should_suppress(&Event::new(&file, Op::WRITE), &FsProbe));
    }
}
