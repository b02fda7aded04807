//! Per-path write-completion synthesis
//!
//! One logical write often shows up as many Write events. Where the backend
//! cannot report "closed after write" itself, each Write (re)arms a per-path
//! deadline; once a path stays quiet for the whole window a single
//! `CLOSE_WRITE` event is emitted for it. A Remove or Rename ends the burst
//! early: the completion goes out first, then the removal. The deadline map
//! has its own lock, separate from the watch table.

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use seer_core::{Event, Op, WatchError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// How write completion is detected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The backend delivers `CLOSE_WRITE`; events pass through untouched
    Native,
    /// Synthesize `CLOSE_WRITE` after the given quiet window
    Debounce(Duration),
}

/// Pending per-path deadlines
#[derive(Default)]
struct PendingWrites {
    deadlines: Mutex<HashMap<PathBuf, Instant>>,
}

impl PendingWrites {
    fn arm(&self, path: &Path, at: Instant) {
        self.deadlines.lock().insert(path.to_path_buf(), at);
    }

    fn cancel(&self, path: &Path) -> bool {
        self.deadlines.lock().remove(path).is_some()
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.lock().values().min().copied()
    }

    /// Remove and return every path whose deadline is at or before `now`,
    /// earliest first
    fn take_expired(&self, now: Instant) -> Vec<PathBuf> {
        let mut deadlines = self.deadlines.lock();
        let mut expired: Vec<(Instant, PathBuf)> = deadlines
            .iter()
            .filter(|(_, &at)| at <= now)
            .map(|(path, &at)| (at, path.clone()))
            .collect();
        for (_, path) in &expired {
            deadlines.remove(path);
        }
        drop(deadlines);

        expired.sort();
        expired.into_iter().map(|(_, path)| path).collect()
    }

    fn drain(&self) -> Vec<PathBuf> {
        let mut pending: Vec<(Instant, PathBuf)> = self
            .deadlines
            .lock()
            .drain()
            .map(|(path, at)| (at, path))
            .collect();
        pending.sort();
        pending.into_iter().map(|(_, path)| path).collect()
    }

    fn len(&self) -> usize {
        self.deadlines.lock().len()
    }
}

/// Coalesces bursts of Write events into one completion per path
pub struct Debouncer {
    pending: Arc<PendingWrites>,
    worker: Option<JoinHandle<()>>,
}

impl Debouncer {
    /// Start synthesizing completions for events read from `input`
    ///
    /// Returns the debouncer and the stream to consume instead of `input`.
    /// With [`Completion::Native`] no thread is started and `input` itself is
    /// handed back.
    pub fn spawn(input: Receiver<Event>, completion: Completion) -> Result<(Self, Receiver<Event>), WatchError> {
        let pending = Arc::new(PendingWrites::default());

        let quiet = match completion {
            Completion::Native => {
                debug!("Native close-write available, debouncing bypassed");
                return Ok((Self { pending, worker: None }, input));
            }
            Completion::Debounce(quiet) => quiet,
        };

        let (tx, rx) = unbounded();
        let worker = Worker {
            input,
            output: tx,
            pending: Arc::clone(&pending),
            quiet,
        };
        let handle = thread::Builder::new()
            .name("seer-debounce".into())
            .spawn(move || worker.run())
            .map_err(|source| WatchError::Syscall { call: "spawn", source })?;

        Ok((Self { pending, worker: Some(handle) }, rx))
    }

    /// Number of paths with a write burst still in progress
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Wait for the worker to finish (after the input stream closes)
    pub fn join(mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

struct Worker {
    input: Receiver<Event>,
    output: Sender<Event>,
    pending: Arc<PendingWrites>,
    quiet: Duration,
}

impl Worker {
    fn run(self) {
        loop {
            if !self.fire_expired() {
                return;
            }

            let received = match self.pending.next_deadline() {
                Some(deadline) => self.input.recv_deadline(deadline),
                None => self.input.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            match received {
                Ok(event) => {
                    if !self.handle(event) {
                        return;
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        // Input closed: writes still in flight are reported as finished
        for path in self.pending.drain() {
            if self.output.send(Event::new(path, Op::CLOSE_WRITE)).is_err() {
                return;
            }
        }
        debug!("Debounce worker stopped");
    }

    /// Returns false once nobody is listening anymore
    fn handle(&self, event: Event) -> bool {
        if event.has(Op::CLOSE_WRITE) {
            if self.pending.cancel(&event.path) {
                trace!("Native completion for {}", event.path.display());
            }
            return self.output.send(event).is_ok();
        }

        // The write burst ended with the path going away; report it before the removal
        if event.op.intersects(Op::REMOVE | Op::RENAME) {
            if self.pending.cancel(&event.path) {
                trace!("Completing write burst early for {}", event.path.display());
                if self.output.send(Event::new(event.path.clone(), Op::CLOSE_WRITE)).is_err() {
                    return false;
                }
            }
            return self.output.send(event).is_ok();
        }

        if !event.has(Op::WRITE) {
            return self.output.send(event).is_ok();
        }

        self.pending.arm(&event.path, Instant::now() + self.quiet);

        let rest = event.op - Op::WRITE;
        if rest.is_empty() {
            return true;
        }
        self.output.send(Event::new(event.path, rest)).is_ok()
    }

    fn fire_expired(&self) -> bool {
        for path in self.pending.take_expired(Instant::now()) {
            trace!("Write burst finished for {}", path.display());
            if self.output.send(Event::new(path, Op::CLOSE_WRITE)).is_err() {
                return false;
            }
        }
        true
    }
}
