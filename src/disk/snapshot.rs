//! Snapshots
//!
//! Materialized views handed out by a disk. Both are detached from the disk
//! once built: later writes do not show up in them.

use bytes::Bytes;

use crate::log::LogRecord;

use super::Record;

/// One key of a point-in-time snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub key: Bytes,
    pub record: Record,
}

/// Live keys of a disk at one instant, in key order
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    entries: Vec<SnapshotEntry>,
}

impl Snapshot {
    pub fn new(entries: Vec<SnapshotEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SnapshotEntry> {
        self.entries.iter()
    }
}

impl IntoIterator for Snapshot {
    type Item = SnapshotEntry;
    type IntoIter = std::vec::IntoIter<SnapshotEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Every operation applied to a disk, in sequence order
///
/// Used to stream a region to another instance: replaying the records in
/// order reproduces the disk's contents.
#[derive(Debug, Clone, Default)]
pub struct RollingSnapshot {
    records: Vec<LogRecord>,
}

impl RollingSnapshot {
    pub fn new(records: Vec<LogRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sequence number of the last operation, if any
    pub fn last_seq(&self) -> Option<u64> {
        self.records.last().map(|r| r.seq)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LogRecord> {
        self.records.iter()
    }
}

impl IntoIterator for RollingSnapshot {
    type Item = LogRecord;
    type IntoIter = std::vec::IntoIter<LogRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}
