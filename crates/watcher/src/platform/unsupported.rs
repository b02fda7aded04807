//! Placeholder for targets without a notification backend

use crate::backend::Backend;
use crossbeam_channel::Receiver;
use seer_core::{Event, Op, WatchError, WatchOptions, WatcherConfig};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Backend that can never be constructed
pub struct UnsupportedBackend {
    _private: (),
}

impl Backend for UnsupportedBackend {
    fn create(_config: &WatcherConfig) -> Result<(Self, Receiver<Event>, Receiver<WatchError>), WatchError> {
        warn!("No filesystem notification backend for {}", std::env::consts::OS);
        Err(WatchError::Unsupported(Op::PORTABLE))
    }

    fn add(&self, _path: &Path, options: WatchOptions) -> Result<(), WatchError> {
        Err(WatchError::Unsupported(options.ops))
    }

    fn remove(&self, _path: &Path) -> Result<(), WatchError> {
        Err(WatchError::Unsupported(Op::PORTABLE))
    }

    fn close(&self) -> Result<(), WatchError> {
        Ok(())
    }

    fn supports(&self, _ops: Op) -> bool {
        false
    }

    fn watch_list(&self) -> Vec<PathBuf> {
        Vec::new()
    }
}
