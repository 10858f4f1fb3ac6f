//! Disk Module
//!
//! The storage engine hosted for one region.
//!
//! ## Responsibilities
//! - Foreground key/value access (get/put/del)
//! - Maintenance hooks driven by the scheduler: flush, preallocate,
//!   opportunistic I/O and mandatory I/O
//! - Point-in-time and rolling snapshots
//! - Destroying the region's persisted state
//!
//! The directory and scheduler only talk to the [`Disk`] trait. [`LogDisk`]
//! is the bundled implementation built on the append-only log.

mod log_disk;
mod snapshot;

pub use log_disk::{LogDisk, LogDiskFactory, LogDiskOptions};
pub use snapshot::{RollingSnapshot, Snapshot, SnapshotEntry};

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

use crate::cluster::{Coordinate, HashingStrategy};
use crate::error::Result;

/// Outcome of a disk operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ReturnCode {
    #[error("success")]
    Success,

    /// Nothing needed doing; not an error
    #[error("did nothing")]
    DidNothing,

    #[error("key not found")]
    NotFound,

    /// Value column count does not match the region's
    #[error("wrong arity")]
    WrongArity,

    /// Out of data space; mandatory I/O must run
    #[error("data full")]
    DataFull,

    /// Out of index space; mandatory I/O must run
    #[error("search full")]
    SearchFull,

    /// The region is not hosted here
    #[error("missing disk")]
    MissingDisk,

    #[error("failure")]
    Failure,
}

impl ReturnCode {
    /// True for the capacity signals that call for mandatory I/O
    pub fn is_back_pressure(self) -> bool {
        matches!(self, ReturnCode::DataFull | ReturnCode::SearchFull)
    }
}

/// A stored value: the non-key columns and their version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub value: Vec<Bytes>,
    pub version: u64,
}

/// Storage engine of one region
///
/// Maintenance calls are issued by a single scheduler thread, but may overlap
/// with any number of foreground calls and with a foreground `flush`
/// (trickle). Implementations handle that concurrency internally.
pub trait Disk: Send + Sync {
    fn get(&self, key: &[u8]) -> std::result::Result<Record, ReturnCode>;

    fn put(&self, key: Bytes, value: Vec<Bytes>, version: u64) -> ReturnCode;

    fn del(&self, key: &[u8]) -> ReturnCode;

    /// Make up to `limit` buffered writes durable
    fn flush(&self, limit: usize) -> ReturnCode;

    /// Grow capacity ahead of need
    fn preallocate(&self) -> ReturnCode;

    /// Background work worth doing while idle
    fn do_optimistic_io(&self) -> ReturnCode;

    /// Relieve a DataFull/SearchFull condition
    fn do_mandatory_io(&self) -> ReturnCode;

    fn make_snapshot(&self, coordinate: Coordinate) -> Option<Snapshot>;

    fn make_rolling_snapshot(&self) -> Option<RollingSnapshot>;

    /// Release resources and delete persisted state
    fn destroy(&self) -> Result<()>;
}

/// Creates the disk for a region at a path
pub trait DiskFactory: Send + Sync {
    fn create(&self, path: &Path, hasher: HashingStrategy, columns: u16) -> Result<Arc<dyn Disk>>;
}
