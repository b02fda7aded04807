//! inotify backend
//!
//! One reader thread owns the epoll set and is the only consumer of the
//! inotify descriptor. Caller threads register and remove watches through the
//! shared [`WatchTable`] and talk to the reader only through that table and the
//! two output channels.

mod poller;
pub mod translate;

use crate::backend::Backend;
use crate::filter::{should_suppress, FsProbe, PathProbe};
use crate::table::{normalize_path, WatchHandle, WatchTable};
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use nix::errno::Errno;
use parking_lot::Mutex;
use poller::{FdPoller, Inotify, Waker, Wakeup};
use seer_core::config::RECORD_HEADER_LEN;
use seer_core::{Event, Op, WatchError, WatchOptions, WatcherConfig};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, trace, warn};
use translate::{mask_for, translate, RawRecord, RecordCursor};

/// Lifecycle of a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Created,
    Running,
    ShuttingDown,
    Closed,
}

/// State shared between caller threads and the reader thread
struct Shared {
    table: WatchTable,
    inotify: Inotify,
    /// Set once the reader has exited, whether through close or a fatal error
    stopped: AtomicBool,
}

/// Linux backend built on inotify + epoll
pub struct InotifyBackend {
    shared: Arc<Shared>,
    state: Mutex<State>,
    waker: Waker,
    /// Dropped on close so a reader blocked on a full events channel gives up
    done: Mutex<Option<Sender<()>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    remove_timeout: Option<Duration>,
}

impl InotifyBackend {
    /// Current lifecycle state
    pub fn state(&self) -> State {
        *self.state.lock()
    }

    /// Number of registered watches
    pub fn watch_count(&self) -> usize {
        self.shared.table.len()
    }

    fn ensure_open(&self) -> Result<(), WatchError> {
        if self.shared.stopped.load(Ordering::Acquire) {
            return Err(WatchError::Closed);
        }
        match *self.state.lock() {
            State::Created | State::Running => Ok(()),
            State::ShuttingDown | State::Closed => Err(WatchError::Closed),
        }
    }
}

impl Backend for InotifyBackend {
    fn create(config: &WatcherConfig) -> Result<(Self, Receiver<Event>, Receiver<WatchError>), WatchError> {
        let fd = Inotify::open()?;
        let (poller, waker) = FdPoller::new(&fd)?;
        let shared = Arc::new(Shared {
            table: WatchTable::new(),
            inotify: Inotify::new(fd),
            stopped: AtomicBool::new(false),
        });

        let (event_tx, event_rx) = match config.event_capacity {
            Some(capacity) => bounded(capacity),
            None => unbounded(),
        };
        let (error_tx, error_rx) = unbounded();
        let (done_tx, done_rx) = bounded(0);

        let backend = Self {
            shared: Arc::clone(&shared),
            state: Mutex::new(State::Created),
            waker,
            done: Mutex::new(Some(done_tx)),
            reader: Mutex::new(None),
            remove_timeout: config.remove_timeout(),
        };

        let reader = EventReader {
            shared,
            poller,
            events: event_tx,
            errors: error_tx,
            done: done_rx,
            buf: vec![0; config.read_buffer_len()],
            probe: FsProbe,
        };
        let handle = thread::Builder::new()
            .name("seer-inotify".into())
            .spawn(move || reader.run())
            .map_err(|source| WatchError::Syscall { call: "spawn", source })?;

        *backend.reader.lock() = Some(handle);
        *backend.state.lock() = State::Running;
        info!("inotify watcher started");

        Ok((backend, event_rx, error_rx))
    }

    fn add(&self, path: &Path, options: WatchOptions) -> Result<(), WatchError> {
        self.ensure_open()?;

        let ops = if options.ops.is_empty() { Op::PORTABLE } else { options.ops };
        if !self.supports(ops) {
            return Err(WatchError::Unsupported(ops));
        }

        let mut mask = mask_for(ops);
        if options.no_follow {
            mask |= libc::IN_DONT_FOLLOW;
        }

        let path = normalize_path(path);
        let inotify = &self.shared.inotify;
        self.shared.table.register(&path, mask, |flags, existing| {
            let flags = if existing { flags | libc::IN_MASK_ADD } else { flags };
            inotify.add_watch(&path, flags)
        })?;

        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<(), WatchError> {
        self.ensure_open()?;

        let path = normalize_path(path);
        let handle = self
            .shared
            .table
            .handle_of(&path)
            .ok_or_else(|| WatchError::NotWatched(path.clone()))?;

        if !self.shared.inotify.rm_watch(handle)? {
            debug!("{} for {} was already invalidated by the kernel", handle, path.display());
        }

        if !self.shared.table.wait_purged(&path, handle, self.remove_timeout) {
            warn!(
                "Kernel did not confirm removal of {} within {:?}, purged anyway",
                path.display(),
                self.remove_timeout
            );
        }

        debug!("Removed watch for {}", path.display());
        Ok(())
    }

    fn close(&self) -> Result<(), WatchError> {
        // Held for the whole shutdown: a concurrent close waits, then sees Closed
        let mut state = self.state.lock();
        if *state == State::Closed {
            return Ok(());
        }
        *state = State::ShuttingDown;

        self.done.lock().take();
        let woken = self.waker.wake();

        let reader = self.reader.lock().take();
        match (reader, &woken) {
            (Some(reader), Ok(())) => {
                if reader.join().is_err() {
                    warn!("inotify reader thread panicked");
                }
            }
            // Without a wakeup the reader may never leave epoll_wait; leave it detached
            (Some(_), Err(err)) => warn!("Could not wake inotify reader: {}", err),
            (None, _) => {}
        }

        self.shared.inotify.close();
        self.shared.table.clear();
        *state = State::Closed;
        info!("inotify watcher closed");

        woken
    }

    fn supports(&self, _ops: Op) -> bool {
        true
    }

    fn watch_list(&self) -> Vec<PathBuf> {
        if self.ensure_open().is_err() {
            return Vec::new();
        }
        self.shared.table.paths()
    }
}

impl Drop for InotifyBackend {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// The descriptor itself is gone; nothing more can be read from it
fn is_bad_descriptor(err: &WatchError) -> bool {
    matches!(err, WatchError::Syscall { source, .. } if source.raw_os_error() == Some(Errno::EBADF as i32))
}

/// The poll loop
struct EventReader<P> {
    shared: Arc<Shared>,
    poller: FdPoller,
    events: Sender<Event>,
    errors: Sender<WatchError>,
    done: Receiver<()>,
    buf: Vec<u8>,
    probe: P,
}

impl<P: PathProbe> EventReader<P> {
    fn run(mut self) {
        debug!("inotify reader running ({} byte buffer)", self.buf.len());
        self.poll();

        // Nobody can confirm a removal anymore; release anyone still waiting
        self.shared.stopped.store(true, Ordering::Release);
        if self.shared.inotify.close() && self.is_running() {
            warn!("inotify reader stopped on its own, watcher is no longer usable");
        }
        self.shared.table.clear();
        debug!("inotify reader stopped");
        // Dropping self closes the events and errors channels
    }

    fn poll(&mut self) {
        loop {
            match self.poller.wait() {
                Ok(Wakeup::Shutdown) => return,
                Ok(Wakeup::Readable) => {}
                Err(err) => {
                    let fatal = is_bad_descriptor(&err);
                    if !self.report(err) || fatal {
                        return;
                    }
                    continue;
                }
            }

            let n = match self.shared.inotify.read(&mut self.buf) {
                Ok(n) => n,
                Err(Errno::EAGAIN | Errno::EINTR) => continue,
                Err(errno) => {
                    let err = WatchError::Syscall {
                        call: "read",
                        source: errno.into(),
                    };
                    if !self.report(err) || errno == Errno::EBADF {
                        return;
                    }
                    continue;
                }
            };

            if n < RECORD_HEADER_LEN {
                let err = if n == 0 {
                    WatchError::Protocol("zero-length read".into())
                } else {
                    WatchError::Protocol(format!("short read of {} bytes", n))
                };
                if !self.report(err) {
                    return;
                }
                continue;
            }

            for record in RecordCursor::new(&self.buf[..n]) {
                let keep_going = match record {
                    Ok(record) => self.dispatch(&record),
                    Err(err) => {
                        // The rest of this read can't be trusted; wait for the next one
                        if !self.report(err) {
                            return;
                        }
                        break;
                    }
                };
                if !keep_going {
                    return;
                }
            }
        }
    }

    /// Handle one record; returns false once the watcher is shutting down
    fn dispatch(&self, record: &RawRecord<'_>) -> bool {
        trace!("{:?}", record);

        if record.has(libc::IN_Q_OVERFLOW) {
            warn!("inotify queue overflow");
            return self.report(WatchError::Overflow);
        }

        // Bookkeeping only: the kernel dropped this watch
        if record.has(libc::IN_IGNORED) {
            if let Some(path) = self.shared.table.purge(record.handle) {
                debug!("Watch {} for {} removed by the kernel", record.handle, path.display());
            }
            return true;
        }

        // The watched path itself moved away; its recorded name is stale
        if record.has(libc::IN_MOVE_SELF) && record.name.is_none() {
            if let Err(err) = self.shared.inotify.rm_watch(record.handle) {
                if !self.report(err) {
                    return false;
                }
            }
        }

        if record.has(libc::IN_DELETE_SELF) && self.parent_reports_delete(record.handle) {
            trace!("Dropped delete of {}, reported by its parent", record.handle);
            return true;
        }

        let Some(event) = translate(record, &self.shared.table) else {
            trace!("Dropped record for {}", record.handle);
            return true;
        };

        if should_suppress(&event, &self.probe) {
            trace!("Suppressed {} (path no longer exists)", event);
            return true;
        }

        self.deliver(event)
    }

    /// Whether the watched parent of `handle`'s path also sees its deletion
    fn parent_reports_delete(&self, handle: WatchHandle) -> bool {
        let table = &self.shared.table;
        table
            .resolve(handle)
            .as_deref()
            .and_then(Path::parent)
            .and_then(|parent| table.entry(parent))
            .is_some_and(|entry| entry.flags & libc::IN_DELETE != 0)
    }

    fn deliver(&self, event: Event) -> bool {
        select! {
            send(self.events, event) -> res => res.is_ok() || self.is_running(),
            recv(self.done) -> _ => false,
        }
    }

    fn report(&self, err: WatchError) -> bool {
        debug!("Reporting error: {}", err);
        select! {
            send(self.errors, err) -> res => res.is_ok() || self.is_running(),
            recv(self.done) -> _ => false,
        }
    }

    /// Nobody listening is not a reason to stop; only close is
    fn is_running(&self) -> bool {
        !matches!(self.done.try_recv(), Err(crossbeam_channel::TryRecvError::Disconnected))
    }
}
