//! Disk map
//!
//! The region → disk table shared by foreground calls, reconfiguration and
//! the maintenance scheduler.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::cluster::RegionId;
use crate::disk::Disk;

/// Ready disks in region order, detached from the map's lock
pub type DiskSnapshot = Vec<(RegionId, Arc<dyn Disk>)>;

/// State of one region's entry
enum Slot {
    /// Claimed by a caller that is constructing the disk; invisible to readers
    Reserved,

    Ready(Arc<dyn Disk>),

    /// Unpublished and being destroyed; still blocks a new reservation
    Dropping,
}

/// Region → disk table
///
/// ## Concurrency:
/// - Lookups and snapshots take the read lock and clone an `Arc` out
/// - Reserve/install/release/retire/forget take the write lock for O(log n) work
/// - No method does I/O while holding the lock
#[derive(Default)]
pub struct DiskMap {
    slots: RwLock<BTreeMap<RegionId, Slot>>,
}

impl DiskMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// The ready disk of a region
    pub fn get(&self, region: &RegionId) -> Option<Arc<dyn Disk>> {
        match self.slots.read().get(region) {
            Some(Slot::Ready(disk)) => Some(Arc::clone(disk)),
            _ => None,
        }
    }

    /// True if the region is ready, being constructed or being destroyed
    pub fn is_claimed(&self, region: &RegionId) -> bool {
        self.slots.read().contains_key(region)
    }

    /// Claim a region for construction
    ///
    /// Returns `false` if the region already has a slot; only the caller
    /// that got `true` may construct and install its disk.
    pub fn reserve(&self, region: RegionId) -> bool {
        let mut slots = self.slots.write();
        if slots.contains_key(&region) {
            return false;
        }
        slots.insert(region, Slot::Reserved);
        true
    }

    /// Publish the disk of a reserved region
    pub fn install(&self, region: RegionId, disk: Arc<dyn Disk>) {
        self.slots.write().insert(region, Slot::Ready(disk));
    }

    /// Give up a reservation after a failed construction
    pub fn release(&self, region: &RegionId) {
        let mut slots = self.slots.write();
        if let Some(Slot::Reserved) = slots.get(region) {
            slots.remove(region);
        }
    }

    /// Unpublish a ready disk, leaving a tombstone until [`forget`](Self::forget)
    pub fn retire(&self, region: &RegionId) -> Option<Arc<dyn Disk>> {
        let mut slots = self.slots.write();
        if !matches!(slots.get(region), Some(Slot::Ready(_))) {
            return None;
        }
        match slots.insert(*region, Slot::Dropping) {
            Some(Slot::Ready(disk)) => Some(disk),
            _ => None,
        }
    }

    /// Clear the tombstone of a retired region
    pub fn forget(&self, region: &RegionId) {
        let mut slots = self.slots.write();
        if let Some(Slot::Dropping) = slots.get(region) {
            slots.remove(region);
        }
    }

    /// All ready disks, sorted by region
    pub fn snapshot(&self) -> DiskSnapshot {
        self.slots
            .read()
            .iter()
            .filter_map(|(region, slot)| match slot {
                Slot::Ready(disk) => Some((*region, Arc::clone(disk))),
                Slot::Reserved | Slot::Dropping => None,
            })
            .collect()
    }

    /// Regions with a ready disk, sorted
    pub fn regions(&self) -> Vec<RegionId> {
        self.slots
            .read()
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Ready(_)))
            .map(|(region, _)| *region)
            .collect()
    }

    /// Number of ready disks
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
