//! Cluster Module
//!
//! Identifiers and configuration snapshots produced by the cluster layer.
//!
//! ## Responsibilities
//! - Name regions, replicas (entities) and server instances
//! - Describe how keys of a subspace map onto hash coordinates
//! - Expose an immutable view of region assignment and in-flight transfers
//!
//! The directory never mutates any of these; it only reads a
//! [`Configuration`] handed to it on every reconfiguration step.

mod configuration;

pub use configuration::{Configuration, ConfigurationBuilder, Transfer};

use std::fmt;
use std::net::SocketAddr;

/// Space reserved for internal bookkeeping entities
///
/// Entities in this space never cause a region to be hosted.
pub const BOOKKEEPING_SPACE: u32 = u32::MAX - 1;

// =============================================================================
// Identifiers
// =============================================================================

/// Identifies one subspace of a space
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubspaceId {
    pub space: u32,
    pub subspace: u16,
}

impl SubspaceId {
    pub fn new(space: u32, subspace: u16) -> Self {
        Self { space, subspace }
    }
}

/// Identifies a shard of the keyspace
///
/// Ordering follows field order: space, subspace, prefix, mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegionId {
    pub space: u32,
    pub subspace: u16,
    pub prefix: u8,
    pub mask: u64,
}

impl RegionId {
    pub fn new(space: u32, subspace: u16, prefix: u8, mask: u64) -> Self {
        Self {
            space,
            subspace,
            prefix,
            mask,
        }
    }

    /// The subspace this region partitions
    pub fn subspace_id(&self) -> SubspaceId {
        SubspaceId::new(self.space, self.subspace)
    }
}

impl fmt::Display for RegionId {
    /// Also the name of the region's storage directory
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}-{:016x}",
            self.space, self.subspace, self.prefix, self.mask
        )
    }
}

/// Identifies one replica of a region
///
/// Ordered by region, then replica number, so all replicas of a region are
/// adjacent in an ordered map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId {
    pub region: RegionId,
    pub number: u8,
}

impl EntityId {
    pub fn new(region: RegionId, number: u8) -> Self {
        Self { region, number }
    }

    /// True for identifiers used by internal bookkeeping
    pub fn is_bookkeeping(&self) -> bool {
        self.region.space == BOOKKEEPING_SPACE
    }
}

/// A server process in the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Instance {
    pub address: SocketAddr,
}

impl Instance {
    pub fn new(address: SocketAddr) -> Self {
        Self { address }
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "instance({})", self.address)
    }
}

// =============================================================================
// Hashing
// =============================================================================

/// Maps keys of one subspace onto 64-bit hash points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HashingStrategy {
    seed: u32,
}

impl HashingStrategy {
    pub fn new(seed: u32) -> Self {
        Self { seed }
    }

    /// Hash point of a key
    pub fn point(&self, key: &[u8]) -> u64 {
        let mut low = crc32fast::Hasher::new_with_initial(self.seed);
        low.update(key);
        let mut high = crc32fast::Hasher::new_with_initial(!self.seed);
        high.update(key);
        (u64::from(high.finalize()) << 32) | u64::from(low.finalize())
    }
}

/// Selects the hash points whose masked bits equal `value`'s
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Coordinate {
    pub mask: u64,
    pub value: u64,
}

impl Coordinate {
    pub fn new(mask: u64, value: u64) -> Self {
        Self { mask, value }
    }

    /// Coordinate matching every point
    pub fn all() -> Self {
        Self::default()
    }

    pub fn matches(&self, point: u64) -> bool {
        point & self.mask == self.value & self.mask
    }
}
