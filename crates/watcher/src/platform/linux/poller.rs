//! inotify descriptor and the epoll set the poll loop blocks on
//!
//! The epoll set holds two descriptors: the inotify instance and the read end
//! of a wake pipe. Writing to the pipe is how `close` interrupts a poll loop
//! that is blocked waiting for kernel events.

use crate::table::WatchHandle;
use nix::errno::Errno;
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags};
use parking_lot::Mutex;
use seer_core::WatchError;
use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

const INOTIFY_TOKEN: u64 = 0;
const WAKE_TOKEN: u64 = 1;

/// The inotify instance
///
/// The descriptor sits behind a lock so `close` can release it while caller
/// threads may still be issuing add/remove calls; those then fail with
/// [`WatchError::Closed`].
pub(crate) struct Inotify {
    fd: Mutex<Option<OwnedFd>>,
}

impl Inotify {
    /// Open a non-blocking, close-on-exec inotify instance
    pub(crate) fn open() -> Result<OwnedFd, WatchError> {
        let fd = Errno::result(unsafe { libc::inotify_init1(libc::IN_CLOEXEC | libc::IN_NONBLOCK) })
            .map_err(|e| syscall("inotify_init1", e))?;
        Ok(unsafe { OwnedFd::from_raw_fd(fd) })
    }

    pub(crate) fn new(fd: OwnedFd) -> Self {
        Self {
            fd: Mutex::new(Some(fd)),
        }
    }

    /// Watch `path` with `mask`
    pub(crate) fn add_watch(&self, path: &Path, mask: u32) -> Result<WatchHandle, WatchError> {
        let registration = |source: io::Error| WatchError::Registration {
            path: path.to_path_buf(),
            source,
        };

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| registration(io::Error::new(io::ErrorKind::InvalidInput, e)))?;

        let guard = self.fd.lock();
        let fd = guard.as_ref().ok_or(WatchError::Closed)?;
        let wd = Errno::result(unsafe { libc::inotify_add_watch(fd.as_raw_fd(), c_path.as_ptr(), mask) })
            .map_err(|e| registration(e.into()))?;
        Ok(WatchHandle(wd))
    }

    /// Ask the kernel to drop a watch
    ///
    /// Returns `false` if the kernel had already invalidated it (`EINVAL`);
    /// the `IN_IGNORED` record for it is then queued or already consumed.
    pub(crate) fn rm_watch(&self, handle: WatchHandle) -> Result<bool, WatchError> {
        let guard = self.fd.lock();
        let fd = guard.as_ref().ok_or(WatchError::Closed)?;
        match Errno::result(unsafe { libc::inotify_rm_watch(fd.as_raw_fd(), handle.0) }) {
            Ok(_) => Ok(true),
            Err(Errno::EINVAL) => Ok(false),
            Err(e) => Err(syscall("inotify_rm_watch", e)),
        }
    }

    /// One non-blocking read of raw records
    ///
    /// A released descriptor reads as `EBADF`.
    pub(crate) fn read(&self, buf: &mut [u8]) -> Result<usize, Errno> {
        let guard = self.fd.lock();
        let fd = guard.as_ref().ok_or(Errno::EBADF)?;
        nix::unistd::read(fd.as_raw_fd(), buf)
    }

    /// Release the descriptor; returns `false` if it was already released
    pub(crate) fn close(&self) -> bool {
        self.fd.lock().take().is_some()
    }
}

/// What woke the poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wakeup {
    /// inotify has records to read (or an error to report through `read`)
    Readable,
    /// `close` was requested
    Shutdown,
}

/// Write end of the wake pipe
pub(crate) struct Waker {
    fd: OwnedFd,
}

impl Waker {
    pub(crate) fn wake(&self) -> Result<(), WatchError> {
        let byte = [1u8];
        match Errno::result(unsafe { libc::write(self.fd.as_raw_fd(), byte.as_ptr().cast(), 1) }) {
            // A full pipe already holds a pending wakeup
            Ok(_) | Err(Errno::EAGAIN) => Ok(()),
            Err(e) => Err(syscall("write", e)),
        }
    }
}

/// epoll set owned by the poll loop thread
pub(crate) struct FdPoller {
    epoll: Epoll,
    _wake_read: OwnedFd,
}

impl FdPoller {
    /// Build the epoll set for `inotify` and the wake pipe
    pub(crate) fn new(inotify: &OwnedFd) -> Result<(Self, Waker), WatchError> {
        let epoll = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC).map_err(|e| syscall("epoll_create1", e))?;

        let mut fds = [0; 2];
        Errno::result(unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC | libc::O_NONBLOCK) })
            .map_err(|e| syscall("pipe2", e))?;
        let (wake_read, wake_write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };

        epoll
            .add(inotify, EpollEvent::new(EpollFlags::EPOLLIN, INOTIFY_TOKEN))
            .map_err(|e| syscall("epoll_ctl", e))?;
        epoll
            .add(&wake_read, EpollEvent::new(EpollFlags::EPOLLIN, WAKE_TOKEN))
            .map_err(|e| syscall("epoll_ctl", e))?;

        Ok((
            Self {
                epoll,
                _wake_read: wake_read,
            },
            Waker { fd: wake_write },
        ))
    }

    /// Block until inotify is readable or a shutdown is requested
    ///
    /// `EINTR` is retried here. A shutdown request wins over pending records.
    pub(crate) fn wait(&self) -> Result<Wakeup, WatchError> {
        let mut events = [EpollEvent::empty(); 4];
        loop {
            let n = match self.epoll.wait(&mut events, -1) {
                Ok(n) => n,
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(syscall("epoll_wait", e)),
            };

            let mut readable = false;
            for event in &events[..n] {
                match event.data() {
                    WAKE_TOKEN => {
                        if event.events().contains(EpollFlags::EPOLLERR) {
                            return Err(WatchError::Protocol("error on the wake pipe".into()));
                        }
                        return Ok(Wakeup::Shutdown);
                    }
                    INOTIFY_TOKEN => {
                        // Errors and hangups are picked up by the following read
                        readable |= event
                            .events()
                            .intersects(EpollFlags::EPOLLIN | EpollFlags::EPOLLERR | EpollFlags::EPOLLHUP);
                    }
                    _ => {}
                }
            }

            if readable {
                return Ok(Wakeup::Readable);
            }
        }
    }
}

fn syscall(call: &'static str, errno: Errno) -> WatchError {
    WatchError::Syscall {
        call,
        source: errno.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_wake_interrupts_wait() {
        let fd = Inotify::open().unwrap();
        let (poller, waker) = FdPoller::new(&fd).unwrap();

        let waiter = thread::spawn(move || poller.wait().unwrap());
        thread::sleep(Duration::from_millis(20));
        waker.wake().unwrap();

        assert_eq!(waiter.join().unwrap(), Wakeup::Shutdown);
    }

    #[test]
    fn test_kernel_events_make_poller_readable() {
        let temp_dir = TempDir::new().unwrap();
        let fd = Inotify::open().unwrap();
        let (poller, _waker) = FdPoller::new(&fd).unwrap();
        let inotify = Inotify::new(fd);

        inotify.add_watch(temp_dir.path(), libc::IN_CREATE).unwrap();
        std::fs::write(temp_dir.path().join("file"), b"x").unwrap();

        assert_eq!(poller.wait().unwrap(), Wakeup::Readable);
        let mut buf = [0u8; 4096];
        let n = inotify.read(&mut buf).unwrap();
        assert!(n >= 16);
    }

    #[test]
    fn test_add_watch_on_missing_path() {
        let temp_dir = TempDir::new().unwrap();
        let inotify = Inotify::new(Inotify::open().unwrap());

        let err = inotify.add_watch(&temp_dir.path().join("missing"), libc::IN_CREATE).unwrap_err();
        match err {
            WatchError::Registration { source, .. } => assert_eq!(source.kind(), io::ErrorKind::NotFound),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_closed_instance() {
        let temp_dir = TempDir::new().unwrap();
        let inotify = Inotify::new(Inotify::open().unwrap());
        let handle = inotify.add_watch(temp_dir.path(), libc::IN_CREATE).unwrap();

        assert!(inotify.close());
        assert!(!inotify.close());
        assert!(matches!(inotify.add_watch(temp_dir.path(), libc::IN_CREATE), Err(WatchError::Closed)));
        assert!(matches!(inotify.rm_watch(handle), Err(WatchError::Closed)));
        assert_eq!(inotify.read(&mut [0u8; 64]), Err(Errno::EBADF));
    }

    #[test]
    fn test_rm_watch_twice_reports_invalidated() {
        let temp_dir = TempDir::new().unwrap();
        let inotify = Inotify::new(Inotify::open().unwrap());
        let handle = inotify.add_watch(temp_dir.path(), libc::IN_CREATE).unwrap();

        assert!(inotify.rm_watch(handle).unwrap());
        assert!(!inotify.rm_watch(handle).unwrap());
    }
}
