//! Portable filesystem change model for Seer
//!
//! This crate provides:
//! - The platform-independent event model (`Event`, `Op`)
//! - The error taxonomy shared by every backend (`WatchError`)
//! - Watcher configuration (`WatcherConfig`, TOML loadable) and per-path `WatchOptions`

pub mod config;
pub mod error;
pub mod event;

// Re-exports
pub use config::{WatchOptions, WatcherConfig};
pub use error::WatchError;
pub use event::{Event, Op};

/// Result type for watcher operations
pub type Result<T> = std::result::Result<T, WatchError>;
