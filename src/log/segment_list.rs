//! Segment list
//!
//! Immutable, shared, ordered list of the segments of one log.
//!
//! A list is never changed once published. The single writer extends the log
//! by calling [`SegmentList::add`] and publishing the returned list (the disk
//! keeps it in an `ArcSwap`); readers load the current `Arc` and walk a fixed
//! snapshot for as long as they hold it, without taking any lock.

use std::sync::Arc;

use crate::error::Result;

use super::Segment;

/// Ordered `(lower_bound, segment)` pairs
///
/// Lower bounds strictly increase by position. Only the last segment is
/// writable; `add` seals the previous tail.
#[derive(Debug, Default)]
pub struct SegmentList {
    segments: Vec<(u64, Arc<Segment>)>,
}

impl SegmentList {
    /// An empty list
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Return a new list with `segment` appended as the writable tail
    ///
    /// `self` is left unchanged; holders of it keep seeing the old contents.
    ///
    /// # Panics
    /// If `lower_bound` does not exceed the current tail's lower bound.
    pub fn add(&self, lower_bound: u64, segment: Arc<Segment>) -> Arc<SegmentList> {
        if let Some((last_bound, tail)) = self.segments.last() {
            assert!(
                lower_bound > *last_bound,
                "segment lower bound {} must exceed {}",
                lower_bound,
                last_bound
            );
            tail.seal();
        }

        let mut segments = Vec::with_capacity(self.segments.len() + 1);
        segments.extend(self.segments.iter().cloned());
        segments.push((lower_bound, segment));
        Arc::new(Self { segments })
    }

    /// Lower bound of the segment at position `i`
    ///
    /// # Panics
    /// If `i` is out of range.
    pub fn get_lower_bound(&self, i: usize) -> u64 {
        self.segments[i].0
    }

    /// Segment at position `i`
    ///
    /// # Panics
    /// If `i` is out of range.
    pub fn get_segment(&self, i: usize) -> &Arc<Segment> {
        &self.segments[i].1
    }

    /// Force segment `i` to durable storage
    ///
    /// Returns whether a sync was actually performed.
    pub fn sync(&self, i: usize) -> Result<bool> {
        self.segments[i].1.sync()
    }

    /// The writable segment, if any
    pub fn tail(&self) -> Option<&Arc<Segment>> {
        self.segments.last().map(|(_, s)| s)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &Arc<Segment>)> + '_ {
        self.segments.iter().map(|(bound, s)| (*bound, s))
    }
}
