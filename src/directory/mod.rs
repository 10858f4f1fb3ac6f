//! Directory Module
//!
//! The set of disks hosted by this process, kept in step with the cluster
//! configuration.
//!
//! ## Responsibilities
//! - Create disks for regions assigned to (or transferring to) this instance
//! - Drop disks for regions that are neither, deleting their state
//! - Route region-scoped key/value calls to the right disk
//! - Own the maintenance scheduler and stop it before tearing down
//!
//! ## Reconfiguration
//! ```text
//!   new config ──► prepare ──► reconfigure ──► cleanup
//!                  (create)     (no-op)         (drop)
//! ```
//! Between `prepare` and `cleanup` this instance hosts the union of the old
//! and new assignments, so no region is ever briefly unhosted.

mod map;

pub use map::{DiskMap, DiskSnapshot};

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;

use crate::cluster::{Configuration, Coordinate, HashingStrategy, Instance, RegionId};
use crate::config::Config;
use crate::disk::{
    DiskFactory, LogDiskFactory, LogDiskOptions, Record, ReturnCode, RollingSnapshot, Snapshot,
};
use crate::error::Result;
use crate::scheduler::MaintenanceScheduler;

/// Region-local storage directory
///
/// ## Concurrency Model
///
/// - **Lookups** (get/put/del/snapshots/trickle): read lock on the map just
///   long enough to clone the disk's `Arc`; the call itself runs unlocked
/// - **Reconfiguration** (prepare/cleanup): write lock only to reserve,
///   install or remove a slot; opening and destroying disks happen outside
/// - **Maintenance**: one background thread, see [`MaintenanceScheduler`]
pub struct RegionDirectory {
    config: Config,
    factory: Arc<dyn DiskFactory>,
    disks: Arc<DiskMap>,
    scheduler: MaintenanceScheduler,
}

impl RegionDirectory {
    /// Open a directory rooted at `config.base_path`
    ///
    /// Starts the maintenance thread immediately; it idles until the first
    /// region is hosted.
    pub fn open(config: Config, factory: Arc<dyn DiskFactory>) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.base_path)?;

        let disks = Arc::new(DiskMap::new());
        let scheduler = MaintenanceScheduler::spawn(Arc::clone(&disks), &config)?;

        tracing::info!("Region directory opened at {}", config.base_path.display());

        Ok(Self {
            config,
            factory,
            disks,
            scheduler,
        })
    }

    /// Open a directory whose disks are [`crate::disk::LogDisk`]s
    pub fn open_with_log_disks(config: Config) -> Result<Self> {
        let factory = Arc::new(LogDiskFactory::new(LogDiskOptions::from(&config)));
        Self::open(config, factory)
    }

    // =========================================================================
    // Reconfiguration
    // =========================================================================

    /// Create disks for every region `us` must host under `config`
    ///
    /// A region must be hosted if one of its (non-bookkeeping) entities is
    /// assigned to `us`, or if it is the target of a transfer to `us`.
    /// Regions already hosted are left alone, so repeated calls are no-ops.
    /// A region still being dropped by a concurrent `cleanup` is skipped; a
    /// later `prepare` picks it up.
    ///
    /// Returns the number of disks created.
    pub fn prepare(&self, config: &Configuration, us: &Instance) -> usize {
        let mut created = 0;

        for (entity, instance) in config.entity_mapping() {
            if entity.is_bookkeeping() || instance != us {
                continue;
            }
            if self.host(config, entity.region) {
                created += 1;
            }
        }

        for region in config.transfers_to(us).into_values() {
            if self.host(config, region) {
                created += 1;
            }
        }

        created
    }

    /// Hook between prepare and cleanup
    ///
    /// Existing disks keep serving unmodified across a reconfiguration.
    pub fn reconfigure(&self, _config: &Configuration, _us: &Instance) {}

    /// Drop every hosted region `us` no longer needs under `config`
    ///
    /// A region is kept if `us` is assigned to any of its entities or if it is
    /// the target of a transfer to `us`. Returns the number of disks dropped.
    pub fn cleanup(&self, config: &Configuration, us: &Instance) -> usize {
        let transfers = config.transfers_to(us);
        let mut dropped = 0;

        for region in self.disks.regions() {
            let assigned = config
                .entities_of(region)
                .any(|(_, instance)| instance == us);
            let incoming = transfers.values().any(|r| *r == region);

            if !assigned && !incoming && self.drop_disk(&region) {
                dropped += 1;
            }
        }

        dropped
    }

    /// Signal the maintenance thread to stop
    ///
    /// Returns immediately; the thread is joined when the directory is
    /// dropped.
    pub fn shutdown(&self) {
        self.scheduler.stop();
    }

    pub fn is_shutdown(&self) -> bool {
        self.scheduler.is_stopping()
    }

    // =========================================================================
    // Foreground Operations
    // =========================================================================

    /// Get the value of a key
    pub fn get(&self, region: RegionId, key: &[u8]) -> std::result::Result<Record, ReturnCode> {
        match self.disks.get(&region) {
            Some(disk) => disk.get(key),
            None => Err(ReturnCode::MissingDisk),
        }
    }

    /// Store the non-key columns of a key at a version
    pub fn put(&self, region: RegionId, key: Bytes, value: Vec<Bytes>, version: u64) -> ReturnCode {
        match self.disks.get(&region) {
            Some(disk) => disk.put(key, value, version),
            None => ReturnCode::MissingDisk,
        }
    }

    /// Delete a key
    pub fn del(&self, region: RegionId, key: &[u8]) -> ReturnCode {
        match self.disks.get(&region) {
            Some(disk) => disk.del(key),
            None => ReturnCode::MissingDisk,
        }
    }

    /// Point-in-time snapshot of a region; `None` if not hosted
    pub fn make_snapshot(&self, region: RegionId) -> Option<Snapshot> {
        self.disks.get(&region)?.make_snapshot(Coordinate::all())
    }

    /// Rolling snapshot of a region; `None` if not hosted
    pub fn make_rolling_snapshot(&self, region: RegionId) -> Option<RollingSnapshot> {
        self.disks.get(&region)?.make_rolling_snapshot()
    }

    /// Best-effort flush of one region from a foreground thread
    ///
    /// Back-pressure is left to the maintenance thread; any code other than
    /// `Success` or `DidNothing` is only logged.
    pub fn trickle(&self, region: RegionId) -> ReturnCode {
        let Some(disk) = self.disks.get(&region) else {
            return ReturnCode::MissingDisk;
        };

        let code = disk.flush(self.config.trickle_limit);
        if !matches!(code, ReturnCode::Success | ReturnCode::DidNothing) {
            tracing::debug!(region = %region, "Trickle flush returned {}", code);
        }
        code
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn is_hosted(&self, region: RegionId) -> bool {
        self.disks.get(&region).is_some()
    }

    /// Hosted regions, sorted
    pub fn hosted_regions(&self) -> Vec<RegionId> {
        self.disks.regions()
    }

    pub fn disk_count(&self) -> usize {
        self.disks.len()
    }

    /// Storage directory of a region
    pub fn region_path(&self, region: RegionId) -> PathBuf {
        self.config.base_path.join(region.to_string())
    }

    pub fn base_path(&self) -> &Path {
        &self.config.base_path
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Create the disk of `region` unless it is already hosted
    ///
    /// The slot is reserved before any I/O so two concurrent callers never
    /// both open the same region.
    fn host(&self, config: &Configuration, region: RegionId) -> bool {
        if self.disks.is_claimed(&region) {
            return false;
        }

        let Some(&columns) = config.regions().get(&region) else {
            tracing::error!(
                "Configuration {} routes to {} but has no column count for it",
                config.version(),
                region
            );
            return false;
        };
        let Some(hasher) = config.disk_hasher(region.subspace_id()) else {
            tracing::error!(
                "Configuration {} has no hashing strategy for {}",
                config.version(),
                region
            );
            return false;
        };

        if !self.disks.reserve(region) {
            return false;
        }

        match self.create_disk(region, hasher, columns) {
            Ok(()) => true,
            Err(e) => {
                self.disks.release(&region);
                tracing::error!("Failed to create disk for {}: {}", region, e);
                false
            }
        }
    }

    /// Open the disk of a reserved region and publish it
    fn create_disk(&self, region: RegionId, hasher: HashingStrategy, columns: u16) -> Result<()> {
        tracing::info!("Creating {} with {} columns", region, columns);

        let path = self.region_path(region);
        let disk = self.factory.create(&path, hasher, columns)?;
        self.disks.install(region, disk);
        Ok(())
    }

    /// Unpublish a region's disk and delete its state
    ///
    /// The region stays claimed until its files are gone, so a concurrent
    /// `prepare` cannot open a disk at the path being removed.
    fn drop_disk(&self, region: &RegionId) -> bool {
        let Some(disk) = self.disks.retire(region) else {
            return false;
        };

        tracing::info!("Dropping {}", region);
        if let Err(e) = disk.destroy() {
            tracing::error!("Failed to destroy disk for {}: {}", region, e);
        }
        self.disks.forget(region);
        true
    }
}

impl Drop for RegionDirectory {
    /// Stops and joins the maintenance thread before any disk is released
    fn drop(&mut self) {
        self.scheduler.stop();
        self.scheduler.join();
        tracing::info!("Region directory at {} closed", self.config.base_path.display());
    }
}
