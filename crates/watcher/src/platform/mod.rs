//! Platform-specific backends, selected at compile time

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(not(target_os = "linux"))]
pub mod unsupported;

/// Backend used by [`crate::Watcher`] on this target
#[cfg(target_os = "linux")]
pub type PlatformBackend = linux::InotifyBackend;

/// Backend used by [`crate::Watcher`] on this target
#[cfg(not(target_os = "linux"))]
pub type PlatformBackend = unsupported::UnsupportedBackend;
