//! # datalayer
//!
//! The region-local storage directory of a sharded, replicated key-value
//! store:
//! - One storage engine ("disk") per region hosted by this process
//! - Hosting kept in step with cluster configuration and data transfers
//! - A background maintenance thread for durability and capacity
//! - A copy-on-write segment list for lock-free reads of the log
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │        Cluster layer (configuration snapshots)              │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ prepare / reconfigure / cleanup
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                  RegionDirectory                            │
//! │     get/put/del/snapshots ──► DiskMap (RwLock)              │
//! └─────────────────────┬───────────────────┬───────────────────┘
//!                       │                   │ snapshot per iteration
//!                       │          ┌────────▼────────┐
//!                       │          │  Maintenance    │
//!                       │          │  Scheduler      │
//!                       │          └────────┬────────┘
//!          ┌────────────┴───────────────────┴──┐
//!          ▼                                   ▼
//!   ┌─────────────┐                     ┌─────────────┐
//!   │  Disk (A)   │        ...          │  Disk (N)   │
//!   └──────┬──────┘                     └─────────────┘
//!          ▼
//!   ┌─────────────┐
//!   │ SegmentList │  (ArcSwap, copy-on-write)
//!   └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod cluster;
pub mod log;
pub mod disk;
pub mod directory;
pub mod scheduler;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{DataLayerError, Result};
pub use config::Config;
pub use cluster::{Configuration, EntityId, Instance, RegionId};
pub use disk::{Disk, DiskFactory, Record, ReturnCode};
pub use directory::RegionDirectory;
pub use scheduler::MaintenanceScheduler;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of datalayer
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
