//! Log-structured disk
//!
//! Keeps the region's live keys in an ordered in-memory index and makes
//! writes durable in an append-only log of preallocated segments.
//!
//! ## Write Path
//! ```text
//!   put/del ──► index + pending queue        (foreground, state lock)
//!                     │
//!   flush   ──────────┴──► tail segment      (writer lock)
//!                               │ full? → DataFull / SearchFull
//!   mandatory I/O ──► seal tail, publish list.add(spare)
//!   preallocate   ──► create the spare segment file
//!   optimistic    ──► fsync segments with unsynced bytes
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::cluster::{Coordinate, HashingStrategy};
use crate::config::Config;
use crate::error::{DataLayerError, Result};
use crate::log::{
    parse_segment_id, segment_file_name, AppendStatus, LogRecord, Operation, Segment, SegmentList,
};

use super::{Disk, DiskFactory, Record, ReturnCode, RollingSnapshot, Snapshot, SnapshotEntry};

/// Sizing of a log disk
#[derive(Debug, Clone, Copy)]
pub struct LogDiskOptions {
    /// Bytes per segment file
    pub segment_capacity: u64,

    /// Records per segment
    pub segment_max_records: usize,

    /// Ceiling on acknowledged-but-unlogged records
    pub max_pending: usize,
}

impl Default for LogDiskOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for LogDiskOptions {
    fn from(config: &Config) -> Self {
        Self {
            segment_capacity: config.segment_capacity,
            segment_max_records: config.segment_max_records.max(1),
            max_pending: config.max_pending,
        }
    }
}

/// State shared with foreground calls
struct DiskState {
    index: BTreeMap<Bytes, Record>,

    /// Acknowledged records not yet in the log, in sequence order
    pending: VecDeque<LogRecord>,

    next_seq: u64,
}

/// State of the single log writer
struct WriterState {
    /// Preallocated next segment
    spare: Option<Arc<Segment>>,

    next_segment_id: u64,

    /// Back-pressure reported by the last flush, cleared by rotation
    blocked: Option<ReturnCode>,

    /// Sequence number the next logged record will carry
    next_log_seq: u64,
}

/// Disk backed by an append-only log
///
/// ## Concurrency:
/// - `state`: short critical sections for index and pending queue
/// - `writer`: serializes flush, rotation and preallocation
/// - `segments`: published copy-on-write; readers never lock it
pub struct LogDisk {
    dir: PathBuf,
    hasher: HashingStrategy,
    columns: u16,
    options: LogDiskOptions,
    segments: ArcSwap<SegmentList>,
    state: Mutex<DiskState>,
    writer: Mutex<WriterState>,
    destroyed: AtomicBool,
}

impl LogDisk {
    /// Open or create a disk in `dir`
    ///
    /// On open:
    /// 1. Create the directory if it doesn't exist
    /// 2. Replay segments in id order into the index
    /// 3. Remove leftover empty segments (unused spares)
    /// 4. Resume on the last non-empty segment, or start a fresh one
    pub fn open(
        dir: &Path,
        hasher: HashingStrategy,
        columns: u16,
        options: LogDiskOptions,
    ) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let mut ids: Vec<u64> = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.is_file() {
                if let Some(id) = parse_segment_id(&path) {
                    ids.push(id);
                }
            }
        }
        ids.sort_unstable();

        let mut index = BTreeMap::new();
        let mut list = SegmentList::new();
        let mut next_seq = 0;
        let mut next_segment_id = ids.last().map(|&id| id + 1).unwrap_or(1);

        // Once a segment is torn or the sequence skips ahead, nothing after
        // it can be replayed without leaving a hole in the log.
        let mut halted = false;

        for id in ids {
            let path = dir.join(segment_file_name(id));
            if halted {
                tracing::warn!("Discarding {} after damaged log", path.display());
                fs::remove_file(&path)?;
                continue;
            }

            let (segment, replayed) = Segment::open(
                &path,
                id,
                options.segment_capacity,
                options.segment_max_records,
            )?;

            let Some(first) = replayed.records.first() else {
                halted = replayed.torn;
                fs::remove_file(&path)?;
                continue;
            };

            let lower_bound = first.seq;
            if !list.is_empty() && lower_bound < next_seq {
                return Err(DataLayerError::LogCorruption(format!(
                    "segment {} starts at {} but log already reached {}",
                    path.display(),
                    lower_bound,
                    next_seq
                )));
            }
            if !list.is_empty() && lower_bound > next_seq {
                tracing::warn!(
                    "Segment {} starts at {} but log ends at {}",
                    path.display(),
                    lower_bound,
                    next_seq
                );
                halted = true;
                drop(segment);
                fs::remove_file(&path)?;
                continue;
            }

            halted = replayed.torn;
            for record in replayed.records {
                next_seq = record.seq + 1;
                apply(&mut index, record);
            }
            list = list.add(lower_bound, Arc::new(segment));
        }

        if list.is_empty() {
            let segment = Segment::create(
                dir,
                next_segment_id,
                options.segment_capacity,
                options.segment_max_records,
            )?;
            next_segment_id += 1;
            list = list.add(next_seq, Arc::new(segment));
        } else {
            tracing::info!(
                "Recovered {} keys from {} segments in {}",
                index.len(),
                list.len(),
                dir.display()
            );
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            hasher,
            columns,
            options,
            segments: ArcSwap::new(list),
            state: Mutex::new(DiskState {
                index,
                pending: VecDeque::new(),
                next_seq,
            }),
            writer: Mutex::new(WriterState {
                spare: None,
                next_segment_id,
                blocked: None,
                next_log_seq: next_seq,
            }),
            destroyed: AtomicBool::new(false),
        })
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn columns(&self) -> u16 {
        self.columns
    }

    /// The currently published segment list
    pub fn segments(&self) -> Arc<SegmentList> {
        self.segments.load_full()
    }

    pub fn key_count(&self) -> usize {
        self.state.lock().index.len()
    }

    /// Records acknowledged but not yet logged
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn has_spare(&self) -> bool {
        self.writer.lock().spare.is_some()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn create_segment(&self, writer: &mut WriterState) -> Result<Arc<Segment>> {
        let id = writer.next_segment_id;
        writer.next_segment_id += 1;

        let segment = Segment::create(
            &self.dir,
            id,
            self.options.segment_capacity,
            self.options.segment_max_records,
        )?;
        Ok(Arc::new(segment))
    }

    /// Claim the next sequence number; `None` when the pending queue is full
    fn claim_seq(&self, state: &mut DiskState) -> Option<u64> {
        if state.pending.len() >= self.options.max_pending {
            return None;
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        Some(seq)
    }
}

impl Disk for LogDisk {
    fn get(&self, key: &[u8]) -> std::result::Result<Record, ReturnCode> {
        if self.is_destroyed() {
            return Err(ReturnCode::MissingDisk);
        }

        self.state
            .lock()
            .index
            .get(key)
            .cloned()
            .ok_or(ReturnCode::NotFound)
    }

    fn put(&self, key: Bytes, value: Vec<Bytes>, version: u64) -> ReturnCode {
        if self.is_destroyed() {
            return ReturnCode::MissingDisk;
        }
        if value.len() + 1 != usize::from(self.columns) {
            return ReturnCode::WrongArity;
        }

        let mut state = self.state.lock();
        let Some(seq) = self.claim_seq(&mut state) else {
            return ReturnCode::DataFull;
        };

        let logged: Vec<Vec<u8>> = value.iter().map(|v| v.to_vec()).collect();
        state
            .pending
            .push_back(LogRecord::put(seq, key.to_vec(), logged, version));
        state.index.insert(key, Record { value, version });
        ReturnCode::Success
    }

    fn del(&self, key: &[u8]) -> ReturnCode {
        if self.is_destroyed() {
            return ReturnCode::MissingDisk;
        }

        let mut state = self.state.lock();
        if !state.index.contains_key(key) {
            return ReturnCode::NotFound;
        }
        let Some(seq) = self.claim_seq(&mut state) else {
            return ReturnCode::DataFull;
        };

        state.pending.push_back(LogRecord::delete(seq, key.to_vec()));
        state.index.remove(key);
        ReturnCode::Success
    }

    fn flush(&self, limit: usize) -> ReturnCode {
        let mut writer = self.writer.lock();
        if self.is_destroyed() {
            return ReturnCode::DidNothing;
        }

        let mut batch: Vec<LogRecord> = {
            let mut state = self.state.lock();
            let n = limit.min(state.pending.len());
            state.pending.drain(..n).collect()
        };
        if batch.is_empty() {
            return ReturnCode::DidNothing;
        }

        let list = self.segments.load_full();
        let mut written = 0;
        let mut outcome = ReturnCode::Failure;

        if let Some(tail) = list.tail() {
            for record in &batch {
                let status = record.encode().and_then(|frame| tail.append(&frame));
                match status {
                    Ok(AppendStatus::Appended) => {
                        written += 1;
                        writer.next_log_seq = record.seq + 1;
                    }
                    Ok(AppendStatus::NoSpace) => {
                        outcome = ReturnCode::DataFull;
                        break;
                    }
                    Ok(AppendStatus::NoSlots) => {
                        outcome = ReturnCode::SearchFull;
                        break;
                    }
                    Err(e) => {
                        tracing::error!("Append to {} failed: {}", tail.path().display(), e);
                        break;
                    }
                }
            }
        }

        writer.blocked = outcome.is_back_pressure().then_some(outcome);

        if written < batch.len() {
            let mut state = self.state.lock();
            for record in batch.drain(written..).rev() {
                state.pending.push_front(record);
            }
        }

        if written > 0 {
            ReturnCode::Success
        } else {
            outcome
        }
    }

    fn preallocate(&self) -> ReturnCode {
        let mut writer = self.writer.lock();
        if self.is_destroyed() || writer.spare.is_some() {
            return ReturnCode::DidNothing;
        }

        match self.create_segment(&mut writer) {
            Ok(segment) => {
                tracing::debug!("Preallocated {}", segment.path().display());
                writer.spare = Some(segment);
                ReturnCode::Success
            }
            Err(e) => {
                tracing::warn!("Preallocation in {} failed: {}", self.dir.display(), e);
                ReturnCode::Failure
            }
        }
    }

    fn do_optimistic_io(&self) -> ReturnCode {
        if self.is_destroyed() {
            return ReturnCode::DidNothing;
        }

        let list = self.segments.load_full();
        let mut synced = false;

        for i in 0..list.len() {
            match list.sync(i) {
                Ok(did_sync) => synced |= did_sync,
                Err(e) => {
                    tracing::warn!(
                        "Sync of {} failed: {}",
                        list.get_segment(i).path().display(),
                        e
                    );
                    return ReturnCode::Failure;
                }
            }
        }

        if synced {
            ReturnCode::Success
        } else {
            ReturnCode::DidNothing
        }
    }

    fn do_mandatory_io(&self) -> ReturnCode {
        let mut writer = self.writer.lock();
        if self.is_destroyed() || writer.blocked.is_none() {
            return ReturnCode::DidNothing;
        }

        let segment = match writer.spare.take() {
            Some(segment) => segment,
            None => match self.create_segment(&mut writer) {
                Ok(segment) => segment,
                Err(e) => {
                    tracing::error!("Rotation in {} failed: {}", self.dir.display(), e);
                    return ReturnCode::Failure;
                }
            },
        };

        let list = self.segments.load_full();
        tracing::debug!(
            "Rotating {} to {} at seq {}",
            self.dir.display(),
            segment.path().display(),
            writer.next_log_seq
        );
        self.segments.store(list.add(writer.next_log_seq, segment));
        writer.blocked = None;
        ReturnCode::Success
    }

    fn make_snapshot(&self, coordinate: Coordinate) -> Option<Snapshot> {
        if self.is_destroyed() {
            return None;
        }

        let state = self.state.lock();
        let entries = state
            .index
            .iter()
            .filter(|(key, _)| coordinate.matches(self.hasher.point(key)))
            .map(|(key, record)| SnapshotEntry {
                key: key.clone(),
                record: record.clone(),
            })
            .collect();
        Some(Snapshot::new(entries))
    }

    fn make_rolling_snapshot(&self) -> Option<RollingSnapshot> {
        if self.is_destroyed() {
            return None;
        }

        // Pending first: anything flushed after this copy is in the log below.
        let pending: Vec<LogRecord> = self.state.lock().pending.iter().cloned().collect();
        let list = self.segments.load_full();

        let mut records = Vec::new();
        for (_, segment) in list.iter() {
            match segment.read_records() {
                Ok(mut logged) => records.append(&mut logged),
                Err(e) => {
                    tracing::warn!("Reading {} failed: {}", segment.path().display(), e);
                    return None;
                }
            }
        }

        let logged_upto = records.last().map(|r| r.seq + 1).unwrap_or(0);
        records.extend(pending.into_iter().filter(|r| r.seq >= logged_upto));
        Some(RollingSnapshot::new(records))
    }

    fn destroy(&self) -> Result<()> {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return Err(DataLayerError::Destroyed(self.dir.display().to_string()));
        }

        // Writer-side calls re-check `destroyed` under this lock.
        let mut writer = self.writer.lock();
        writer.spare = None;

        match fs::remove_dir_all(&self.dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Apply a replayed record to the index
fn apply(index: &mut BTreeMap<Bytes, Record>, record: LogRecord) {
    match record.operation {
        Operation::Put { value, version } => {
            let value = value.into_iter().map(Bytes::from).collect();
            index.insert(Bytes::from(record.key), Record { value, version });
        }
        Operation::Delete => {
            index.remove(record.key.as_slice());
        }
    }
}

/// Creates [`LogDisk`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDiskFactory {
    options: LogDiskOptions,
}

impl LogDiskFactory {
    pub fn new(options: LogDiskOptions) -> Self {
        Self { options }
    }
}

impl DiskFactory for LogDiskFactory {
    fn create(&self, path: &Path, hasher: HashingStrategy, columns: u16) -> Result<Arc<dyn Disk>> {
        Ok(Arc::new(LogDisk::open(path, hasher, columns, self.options)?))
    }
}
