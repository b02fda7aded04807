//! Decoding of raw inotify records
//!
//! A read from an inotify descriptor returns zero or more records back to back:
//! ```text
//! | wd: i32 | mask: u32 | cookie: u32 | len: u32 | name: [u8; len] |
//! ```
//! `name` is only present for events on entries inside a watched directory
//! and is NUL padded. All integers are in native byte order.

use crate::table::{WatchHandle, WatchTable};
use seer_core::config::RECORD_HEADER_LEN;
use seer_core::{Event, Op, WatchError};
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;

/// One decoded record, borrowing its name from the read buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawRecord<'a> {
    pub handle: WatchHandle,
    pub mask: u32,
    pub cookie: u32,
    /// Entry name inside a watched directory, padding trimmed
    pub name: Option<&'a OsStr>,
}

impl RawRecord<'_> {
    /// Check if any of the given kernel mask bits are set
    pub fn has(&self, bits: u32) -> bool {
        self.mask & bits != 0
    }
}

/// Bounds-checked cursor over a read buffer
///
/// Yields records until the buffer is exhausted or a malformed record is
/// found. After an error the cursor is fused and its offset stays at the
/// start of the bad record.
pub struct RecordCursor<'a> {
    buf: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> RecordCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            offset: 0,
            failed: false,
        }
    }

    /// Byte offset of the next record
    pub fn offset(&self) -> usize {
        self.offset
    }

    fn decode(&mut self) -> Result<RawRecord<'a>, WatchError> {
        let buf: &'a [u8] = self.buf;
        let rest = &buf[self.offset..];

        let header = rest.get(..RECORD_HEADER_LEN).ok_or_else(|| {
            WatchError::Protocol(format!(
                "truncated header: {} bytes left at offset {}",
                rest.len(),
                self.offset
            ))
        })?;

        let wd = i32::from_ne_bytes(word(header, 0));
        let mask = u32::from_ne_bytes(word(header, 4));
        let cookie = u32::from_ne_bytes(word(header, 8));
        let len = u32::from_ne_bytes(word(header, 12)) as usize;

        let record_len = RECORD_HEADER_LEN
            .checked_add(len)
            .ok_or_else(|| WatchError::Protocol(format!("name length {} overflows", len)))?;
        let padded = rest.get(RECORD_HEADER_LEN..record_len).ok_or_else(|| {
            WatchError::Protocol(format!(
                "truncated name: need {} bytes, {} left at offset {}",
                len,
                rest.len() - RECORD_HEADER_LEN,
                self.offset
            ))
        })?;

        let name_end = padded.iter().position(|&b| b == 0).unwrap_or(padded.len());
        let name = match &padded[..name_end] {
            [] => None,
            bytes => Some(OsStr::from_bytes(bytes)),
        };

        let next = self.offset + record_len;
        if next <= self.offset {
            return Err(WatchError::Protocol(format!(
                "record at offset {} did not advance",
                self.offset
            )));
        }
        self.offset = next;

        Ok(RawRecord {
            handle: WatchHandle(wd),
            mask,
            cookie,
            name,
        })
    }
}

impl<'a> Iterator for RecordCursor<'a> {
    type Item = Result<RawRecord<'a>, WatchError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.buf.len() {
            return None;
        }

        let record = self.decode();
        self.failed = record.is_err();
        Some(record)
    }
}

fn word(header: &[u8], at: usize) -> [u8; 4] {
    [header[at], header[at + 1], header[at + 2], header[at + 3]]
}

/// Map an inotify mask to portable operations
pub fn op_from_mask(mask: u32) -> Op {
    let mut op = Op::empty();
    if mask & (libc::IN_CREATE | libc::IN_MOVED_TO) != 0 {
        op |= Op::CREATE;
    }
    if mask & (libc::IN_DELETE | libc::IN_DELETE_SELF) != 0 {
        op |= Op::REMOVE;
    }
    if mask & libc::IN_MODIFY != 0 {
        op |= Op::WRITE;
    }
    if mask & (libc::IN_MOVE_SELF | libc::IN_MOVED_FROM) != 0 {
        op |= Op::RENAME;
    }
    if mask & libc::IN_ATTRIB != 0 {
        op |= Op::CHMOD;
    }
    if mask & libc::IN_CLOSE_WRITE != 0 {
        op |= Op::CLOSE_WRITE;
    }
    if mask & libc::IN_OPEN != 0 {
        op |= Op::OPEN;
    }
    if mask & libc::IN_ACCESS != 0 {
        op |= Op::READ;
    }
    if mask & libc::IN_CLOSE_NOWRITE != 0 {
        op |= Op::CLOSE_READ;
    }
    op
}

/// Map requested operations to the inotify flags that produce them
pub fn mask_for(op: Op) -> u32 {
    let mut mask = 0;
    if op.contains(Op::CREATE) {
        mask |= libc::IN_CREATE;
    }
    if op.contains(Op::WRITE) {
        mask |= libc::IN_MODIFY;
    }
    if op.contains(Op::REMOVE) {
        mask |= libc::IN_DELETE | libc::IN_DELETE_SELF;
    }
    if op.contains(Op::RENAME) {
        mask |= libc::IN_MOVED_FROM | libc::IN_MOVED_TO | libc::IN_MOVE_SELF;
    }
    if op.contains(Op::CHMOD) {
        mask |= libc::IN_ATTRIB;
    }
    if op.contains(Op::CLOSE_WRITE) {
        mask |= libc::IN_CLOSE_WRITE;
    }
    if op.contains(Op::OPEN) {
        mask |= libc::IN_OPEN;
    }
    if op.contains(Op::READ) {
        mask |= libc::IN_ACCESS;
    }
    if op.contains(Op::CLOSE_READ) {
        mask |= libc::IN_CLOSE_NOWRITE;
    }
    mask
}

/// Turn a record into an event
///
/// Returns `None` when the handle is unknown (the watch is already gone) or
/// the record carries nothing the portable model can express.
pub fn translate(record: &RawRecord<'_>, table: &WatchTable) -> Option<Event> {
    let watched = table.resolve(record.handle)?;

    let op = op_from_mask(record.mask);
    if op.is_empty() {
        return None;
    }

    let path = match record.name {
        Some(name) => watched.join(name),
        None => watched,
    };
    Some(Event::new(path, op))
}
