//! Log segment
//!
//! One contiguous, file-backed extent of the log.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::Result;

use super::LogRecord;

/// Outcome of an append attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendStatus {
    /// The frame was written
    Appended,

    /// Not enough bytes left (or the segment is sealed)
    NoSpace,

    /// Record count limit reached
    NoSlots,
}

/// Frames recovered by [`Segment::open`]
#[derive(Debug)]
pub struct Replayed {
    pub records: Vec<LogRecord>,

    /// A corrupt frame ended the replay before the end of written data
    pub torn: bool,
}

/// A file-backed log segment
///
/// ## Concurrency:
/// - Appends come from a single writer (the owning disk's writer lock)
/// - `written` is published after the bytes hit the file, so readers that
///   load it only ever read complete frames
/// - Readers open their own file handle; they never take `file`
#[derive(Debug)]
pub struct Segment {
    id: u64,
    path: PathBuf,

    /// Writer handle
    file: Mutex<File>,

    capacity: u64,
    max_records: usize,

    /// Bytes of complete frames
    written: AtomicU64,

    /// Bytes known to be durable
    synced: AtomicU64,

    records: AtomicUsize,
    sealed: AtomicBool,
}

impl Segment {
    /// Create a new segment file, preallocated to `capacity` bytes
    pub fn create(dir: &Path, id: u64, capacity: u64, max_records: usize) -> Result<Self> {
        let path = dir.join(segment_file_name(id));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;
        file.set_len(capacity)?;

        Ok(Self {
            id,
            path,
            file: Mutex::new(file),
            capacity,
            max_records,
            written: AtomicU64::new(0),
            synced: AtomicU64::new(0),
            records: AtomicUsize::new(0),
            sealed: AtomicBool::new(false),
        })
    }

    /// Open an existing segment and replay its frames
    ///
    /// Stops at the first corrupt frame; everything before it is kept and
    /// everything after it is zeroed, so frames past the damage can never be
    /// replayed by a later open.
    pub fn open(
        path: &Path,
        id: u64,
        capacity: u64,
        max_records: usize,
    ) -> Result<(Self, Replayed)> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;

        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;

        let (records, written, err) = LogRecord::decode_all(&buf);
        let torn = err.is_some();
        if let Some(e) = err {
            tracing::warn!(
                "Segment {} truncated to {} bytes after {} records: {}",
                path.display(),
                written,
                records.len(),
                e
            );
            file.set_len(written as u64)?;
            file.set_len(buf.len() as u64)?;
            file.sync_data()?;
        }

        let segment = Self {
            id,
            path: path.to_path_buf(),
            file: Mutex::new(file),
            capacity: capacity.max(buf.len() as u64),
            max_records,
            written: AtomicU64::new(written as u64),
            synced: AtomicU64::new(written as u64),
            records: AtomicUsize::new(records.len()),
            sealed: AtomicBool::new(false),
        };

        Ok((segment, Replayed { records, torn }))
    }

    /// Append an encoded frame
    ///
    /// An empty segment always accepts a frame, even one larger than the
    /// capacity, so an oversized record cannot wedge the log.
    pub fn append(&self, frame: &[u8]) -> Result<AppendStatus> {
        if self.is_sealed() {
            return Ok(AppendStatus::NoSpace);
        }

        let offset = self.written.load(Ordering::Acquire);
        let records = self.records.load(Ordering::Acquire);

        if records >= self.max_records {
            return Ok(AppendStatus::NoSlots);
        }
        if records > 0 && offset + frame.len() as u64 > self.capacity {
            return Ok(AppendStatus::NoSpace);
        }

        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(frame)?;
        }

        self.records.fetch_add(1, Ordering::AcqRel);
        self.written
            .store(offset + frame.len() as u64, Ordering::Release);
        Ok(AppendStatus::Appended)
    }

    /// Force written frames to durable storage
    ///
    /// Returns `true` if there was anything to sync.
    pub fn sync(&self) -> Result<bool> {
        let written = self.written.load(Ordering::Acquire);
        if self.synced.load(Ordering::Acquire) >= written {
            return Ok(false);
        }

        self.file.lock().sync_data()?;
        self.synced.store(written, Ordering::Release);
        Ok(true)
    }

    /// Read every complete frame written so far
    pub fn read_records(&self) -> Result<Vec<LogRecord>> {
        let limit = self.written.load(Ordering::Acquire);

        let mut buf = vec![0u8; limit as usize];
        let mut file = File::open(&self.path)?;
        file.read_exact(&mut buf)?;

        let (records, _, err) = LogRecord::decode_all(&buf);
        match err {
            Some(e) => Err(e),
            None => Ok(records),
        }
    }

    /// Mark the segment read-only
    pub fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// True once all written bytes are durable
    pub fn is_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire) >= self.written.load(Ordering::Acquire)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Acquire)
    }

    pub fn record_count(&self) -> usize {
        self.records.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }
}

// =============================================================================
// File Naming
// =============================================================================

/// "segment_000042.log" for id 42
pub fn segment_file_name(id: u64) -> String {
    format!("segment_{:06}.log", id)
}

/// Parse a segment id from a file name
/// "segment_000042.log" → Some(42)
pub fn parse_segment_id(path: &Path) -> Option<u64> {
    if path.extension()? != "log" {
        return None;
    }
    let name = path.file_stem()?.to_string_lossy();
    let id_str = name.strip_prefix("segment_")?;
    id_str.parse().ok()
}
