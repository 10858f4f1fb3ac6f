//! Configuration snapshot
//!
//! Immutable view of the cluster layout at one version.

use std::collections::BTreeMap;

use super::{EntityId, HashingStrategy, Instance, RegionId, SubspaceId};

/// An in-flight handoff of a region's data to an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    pub region: RegionId,
    pub destination: Instance,
}

/// Immutable cluster configuration
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    version: u64,

    /// Region → column count (key column included)
    regions: BTreeMap<RegionId, u16>,

    /// Replica → hosting instance, ordered by region then replica number
    entities: BTreeMap<EntityId, Instance>,

    /// Transfer id → transfer
    transfers: BTreeMap<u16, Transfer>,

    hashers: BTreeMap<SubspaceId, HashingStrategy>,
}

impl Configuration {
    /// Create a new configuration builder
    pub fn builder() -> ConfigurationBuilder {
        ConfigurationBuilder::default()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Region → column count table
    pub fn regions(&self) -> &BTreeMap<RegionId, u16> {
        &self.regions
    }

    /// Entity → instance assignment table
    pub fn entity_mapping(&self) -> &BTreeMap<EntityId, Instance> {
        &self.entities
    }

    /// All replicas of one region, in replica order
    pub fn entities_of(
        &self,
        region: RegionId,
    ) -> impl Iterator<Item = (&EntityId, &Instance)> + '_ {
        self.entities
            .range(EntityId::new(region, 0)..=EntityId::new(region, u8::MAX))
    }

    /// Transfers whose destination is `instance`, keyed by transfer id
    pub fn transfers_to(&self, instance: &Instance) -> BTreeMap<u16, RegionId> {
        self.transfers
            .iter()
            .filter(|(_, t)| t.destination == *instance)
            .map(|(id, t)| (*id, t.region))
            .collect()
    }

    /// Hashing strategy registered for a subspace
    pub fn disk_hasher(&self, subspace: SubspaceId) -> Option<HashingStrategy> {
        self.hashers.get(&subspace).copied()
    }
}

/// Builder for Configuration
#[derive(Default)]
pub struct ConfigurationBuilder {
    config: Configuration,
}

impl ConfigurationBuilder {
    pub fn version(mut self, version: u64) -> Self {
        self.config.version = version;
        self
    }

    /// Declare a region and its column count
    pub fn region(mut self, region: RegionId, columns: u16) -> Self {
        self.config.regions.insert(region, columns);
        self
    }

    /// Assign a replica to an instance
    pub fn entity(mut self, entity: EntityId, instance: Instance) -> Self {
        self.config.entities.insert(entity, instance);
        self
    }

    /// Register a transfer of `region` towards `destination`
    pub fn transfer(mut self, id: u16, region: RegionId, destination: Instance) -> Self {
        self.config
            .transfers
            .insert(id, Transfer { region, destination });
        self
    }

    /// Register the hashing strategy of a subspace
    pub fn hasher(mut self, subspace: SubspaceId, hasher: HashingStrategy) -> Self {
        self.config.hashers.insert(subspace, hasher);
        self
    }

    pub fn build(self) -> Configuration {
        self.config
    }
}
