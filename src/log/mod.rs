//! Append-Only Log Module
//!
//! The write path of a disk: an ordered list of file-backed segments.
//!
//! ## Responsibilities
//! - Frame records with a length and CRC32 checksum
//! - Append to the single writable tail segment
//! - Publish segment lists copy-on-write so readers never block the writer
//! - Replay segments on reopen, stopping at the first torn frame
//!
//! ## Segment Layout
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Frame 1                                 │
//! │ ┌─────────┬─────────┬─────────────────┐ │
//! │ │ Len (4) │ CRC (4) │ bincode record  │ │
//! │ └─────────┴─────────┴─────────────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Frame 2 ...                             │
//! ├─────────────────────────────────────────┤
//! │ zeroes (preallocated, Len == 0 ends)    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Segment List
//! ```text
//!   list v1: [ (0, seg1) ]
//!   list v2: [ (0, seg1 sealed), (812, seg2) ]      <- v1 still valid
//!   list v3: [ (0, seg1), (812, seg2 sealed), (1630, seg3) ]
//! ```

mod record;
mod segment;
mod segment_list;

pub use record::{LogRecord, Operation, FRAME_HEADER_SIZE};
pub use segment::{parse_segment_id, segment_file_name, AppendStatus, Replayed, Segment};
pub use segment_list::SegmentList;
