//! Region Directory Tests
//!
//! Tests for hosting and routing:
//! - prepare creates exactly the regions assigned or transferring to us
//! - prepare is idempotent and safe to call concurrently
//! - cleanup drops unassigned regions and deletes their state
//! - foreground calls on unhosted regions have no side effects
//! - shutdown stops all background I/O

#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use tempfile::TempDir;

use common::{assign, instance, journal, layout, region, value, wait_for, Call, MockFactory};
use datalayer::cluster::{RegionId, BOOKKEEPING_SPACE};
use datalayer::{Config, DataLayerError, EntityId, RegionDirectory, ReturnCode};

// =============================================================================
// Helper Functions
// =============================================================================

fn test_config(dir: &TempDir) -> Config {
    Config::builder()
        .base_path(dir.path())
        .preallocate_interval(Duration::from_millis(10))
        .optimism_interval(Duration::from_millis(10))
        .idle_sleep(Duration::from_millis(5))
        .build()
}

fn mock_directory(dir: &TempDir) -> (RegionDirectory, Arc<MockFactory>) {
    let factory = MockFactory::new(&journal());
    let directory = RegionDirectory::open(test_config(dir), factory.clone()).unwrap();
    (directory, factory)
}

fn log_directory(dir: &TempDir) -> RegionDirectory {
    RegionDirectory::open_with_log_disks(test_config(dir)).unwrap()
}

#[test]
fn test_open_rejects_zero_limits() {
    let dir = TempDir::new().unwrap();
    let config = Config::builder()
        .base_path(dir.path())
        .flush_limit(0)
        .build();

    let result = RegionDirectory::open_with_log_disks(config);
    assert!(matches!(result, Err(DataLayerError::Config(_))));
}

// =============================================================================
// Prepare Tests
// =============================================================================

#[test]
fn test_prepare_hosts_only_our_regions() {
    let dir = TempDir::new().unwrap();
    let (directory, factory) = mock_directory(&dir);
    let (us, other) = (instance(1), instance(2));
    let (a, b) = (region(1, 0), region(1, 1));

    let config = assign(assign(layout(&[1]), a, 0, us), b, 0, other).build();

    assert_eq!(directory.prepare(&config, &us), 1);
    assert!(directory.is_hosted(a));
    assert!(!directory.is_hosted(b));
    assert_eq!(factory.creations(), 1);
    assert!(factory.disk(a).is_some());
}

#[test]
fn test_prepare_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let (directory, factory) = mock_directory(&dir);
    let us = instance(1);
    let config = assign(layout(&[1]), region(1, 0), 0, us).build();

    assert_eq!(directory.prepare(&config, &us), 1);
    assert_eq!(directory.prepare(&config, &us), 0);
    assert_eq!(directory.disk_count(), 1);
    assert_eq!(factory.creations(), 1);
}

#[test]
fn test_prepare_hosts_region_once_for_many_replicas() {
    let dir = TempDir::new().unwrap();
    let (directory, factory) = mock_directory(&dir);
    let us = instance(1);
    let r = region(1, 0);

    let config = assign(assign(layout(&[1]), r, 0, us), r, 1, us).build();

    assert_eq!(directory.prepare(&config, &us), 1);
    assert_eq!(factory.creations(), 1);
}

#[test]
fn test_prepare_skips_bookkeeping_entities() {
    let dir = TempDir::new().unwrap();
    let (directory, factory) = mock_directory(&dir);
    let us = instance(1);
    let internal = RegionId::new(BOOKKEEPING_SPACE, 0, 0, 0);

    let config = assign(layout(&[BOOKKEEPING_SPACE]), internal, 0, us).build();

    assert_eq!(directory.prepare(&config, &us), 0);
    assert_eq!(directory.disk_count(), 0);
    assert_eq!(factory.creations(), 0);
}

#[test]
fn test_prepare_skips_region_without_columns() {
    let dir = TempDir::new().unwrap();
    let (directory, _factory) = mock_directory(&dir);
    let us = instance(1);
    let (broken, good) = (region(1, 0), region(1, 1));

    // `broken` is assigned but never declared
    let config = assign(layout(&[1]), good, 0, us)
        .entity(EntityId::new(broken, 0), us)
        .build();

    assert_eq!(directory.prepare(&config, &us), 1);
    assert!(!directory.is_hosted(broken));
    assert!(directory.is_hosted(good));
}

#[test]
fn test_prepare_skips_region_without_hasher() {
    let dir = TempDir::new().unwrap();
    let (directory, _factory) = mock_directory(&dir);
    let us = instance(1);

    // No hashing strategy registered for space 7
    let config = assign(layout(&[1]), region(7, 0), 0, us).build();

    assert_eq!(directory.prepare(&config, &us), 0);
    assert_eq!(directory.disk_count(), 0);
}

#[test]
fn test_prepare_hosts_transfer_targets() {
    let dir = TempDir::new().unwrap();
    let (directory, _factory) = mock_directory(&dir);
    let (us, other) = (instance(1), instance(2));
    let r = region(1, 0);

    let config = assign(layout(&[1]), r, 0, other)
        .transfer(1, r, us)
        .build();

    assert_eq!(directory.prepare(&config, &us), 1);
    assert!(directory.is_hosted(r));
}

#[test]
fn test_failed_creation_can_be_retried() {
    let dir = TempDir::new().unwrap();
    let (directory, factory) = mock_directory(&dir);
    let us = instance(1);
    let r = region(1, 0);
    let config = assign(layout(&[1]), r, 0, us).build();

    factory.set_fail(true);
    assert_eq!(directory.prepare(&config, &us), 0);
    assert!(!directory.is_hosted(r));

    factory.set_fail(false);
    assert_eq!(directory.prepare(&config, &us), 1);
    assert!(directory.is_hosted(r));
}

#[test]
fn test_concurrent_prepare_creates_each_disk_once() {
    let dir = TempDir::new().unwrap();
    let (directory, factory) = mock_directory(&dir);
    factory.set_delay(Duration::from_millis(20));
    let directory = Arc::new(directory);
    let us = instance(1);

    let mut builder = layout(&[1]);
    for i in 0..4 {
        builder = assign(builder, region(1, i), 0, us);
    }
    let config = Arc::new(builder.build());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let directory = Arc::clone(&directory);
            let config = Arc::clone(&config);
            thread::spawn(move || directory.prepare(&config, &us))
        })
        .collect();

    let created: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(created, 4);
    assert_eq!(factory.creations(), 4);
    assert_eq!(directory.disk_count(), 4);
}

// =============================================================================
// Cleanup Tests
// =============================================================================

#[test]
fn test_cleanup_drops_unassigned_regions() {
    let dir = TempDir::new().unwrap();
    let directory = log_directory(&dir);
    let (us, other) = (instance(1), instance(2));
    let (a, b) = (region(1, 0), region(1, 1));

    let before = assign(assign(layout(&[1]), a, 0, us), b, 0, us).build();
    directory.prepare(&before, &us);
    assert_eq!(
        directory.put(b, Bytes::from("k"), value(&["v"]), 1),
        ReturnCode::Success
    );
    assert!(directory.region_path(b).exists());

    // b moves to another instance
    let after = assign(assign(layout(&[1]), a, 0, us), b, 0, other).build();
    directory.prepare(&after, &us);
    directory.reconfigure(&after, &us);
    assert_eq!(directory.cleanup(&after, &us), 1);

    assert!(directory.is_hosted(a));
    assert!(!directory.is_hosted(b));
    assert!(!directory.region_path(b).exists());
    assert_eq!(directory.get(b, b"k"), Err(ReturnCode::MissingDisk));
}

#[test]
fn test_prepare_skips_region_until_drop_finishes() {
    let dir = TempDir::new().unwrap();
    let (directory, factory) = mock_directory(&dir);
    let (us, other) = (instance(1), instance(2));
    let r = region(1, 0);

    let ours = assign(layout(&[1]), r, 0, us).build();
    let theirs = assign(layout(&[1]), r, 0, other).build();
    directory.prepare(&ours, &us);
    factory
        .disk(r)
        .unwrap()
        .set_destroy_delay(Duration::from_millis(200));

    thread::scope(|s| {
        let dropping = s.spawn(|| directory.cleanup(&theirs, &us));

        assert!(wait_for(Duration::from_secs(5), || !directory.is_hosted(r)));
        // Still being destroyed: no new disk at the same path
        assert_eq!(directory.prepare(&ours, &us), 0);
        assert_eq!(factory.creations(), 1);

        assert_eq!(dropping.join().unwrap(), 1);
    });

    assert_eq!(directory.prepare(&ours, &us), 1);
    assert_eq!(factory.creations(), 2);
    assert!(directory.is_hosted(r));
}

#[test]
fn test_cleanup_keeps_secondary_replicas() {
    let dir = TempDir::new().unwrap();
    let (directory, factory) = mock_directory(&dir);
    let (us, other) = (instance(1), instance(2));
    let r = region(1, 0);

    let config = assign(assign(layout(&[1]), r, 0, other), r, 2, us).build();
    directory.prepare(&config, &us);

    assert_eq!(directory.cleanup(&config, &us), 0);
    assert!(directory.is_hosted(r));
    assert_eq!(factory.disk(r).unwrap().count(Call::Destroy), 0);
}

#[test]
fn test_cleanup_keeps_transfer_targets() {
    let dir = TempDir::new().unwrap();
    let (directory, factory) = mock_directory(&dir);
    let (us, other) = (instance(1), instance(2));
    let r = region(1, 0);

    let config = assign(layout(&[1]), r, 0, other)
        .transfer(4, r, us)
        .build();
    directory.prepare(&config, &us);
    assert_eq!(directory.cleanup(&config, &us), 0);
    assert!(directory.is_hosted(r));

    // Transfer completed elsewhere: no longer needed here
    let done = assign(layout(&[1]), r, 0, other).build();
    assert_eq!(directory.cleanup(&done, &us), 1);
    assert!(!directory.is_hosted(r));
    assert_eq!(factory.disk(r).unwrap().count(Call::Destroy), 1);
}

#[test]
fn test_prepare_then_cleanup_hosts_union_in_between() {
    let dir = TempDir::new().unwrap();
    let (directory, _factory) = mock_directory(&dir);
    let (us, other) = (instance(1), instance(2));
    let (a, b) = (region(1, 0), region(1, 1));

    let old = assign(assign(layout(&[1]), a, 0, us), b, 0, other).build();
    let new = assign(assign(layout(&[1]), a, 0, other), b, 0, us).build();

    directory.prepare(&old, &us);
    directory.prepare(&new, &us);
    assert_eq!(directory.hosted_regions(), vec![a, b]);

    directory.cleanup(&new, &us);
    assert_eq!(directory.hosted_regions(), vec![b]);
}

// =============================================================================
// Foreground Operation Tests
// =============================================================================

#[test]
fn test_routes_to_hosted_disk() {
    let dir = TempDir::new().unwrap();
    let directory = log_directory(&dir);
    let us = instance(1);
    let r = region(1, 0);
    directory.prepare(&assign(layout(&[1]), r, 0, us).build(), &us);

    assert_eq!(
        directory.put(r, Bytes::from("user:1"), value(&["alice"]), 3),
        ReturnCode::Success
    );
    let record = directory.get(r, b"user:1").unwrap();
    assert_eq!(record.value, value(&["alice"]));
    assert_eq!(record.version, 3);

    assert_eq!(
        directory.put(r, Bytes::from("user:2"), value(&["a", "b"]), 1),
        ReturnCode::WrongArity
    );

    assert_eq!(directory.make_snapshot(r).unwrap().len(), 1);
    assert_eq!(directory.make_rolling_snapshot(r).unwrap().len(), 1);

    assert_eq!(directory.del(r, b"user:1"), ReturnCode::Success);
    assert_eq!(directory.get(r, b"user:1"), Err(ReturnCode::NotFound));
}

#[test]
fn test_unhosted_region_has_no_side_effects() {
    let dir = TempDir::new().unwrap();
    let directory = log_directory(&dir);
    let r = region(1, 0);

    assert_eq!(directory.get(r, b"k"), Err(ReturnCode::MissingDisk));
    assert_eq!(
        directory.put(r, Bytes::from("k"), value(&["v"]), 1),
        ReturnCode::MissingDisk
    );
    assert_eq!(directory.del(r, b"k"), ReturnCode::MissingDisk);
    assert!(directory.make_snapshot(r).is_none());
    assert!(directory.make_rolling_snapshot(r).is_none());
    assert_eq!(directory.trickle(r), ReturnCode::MissingDisk);

    assert!(!directory.region_path(r).exists());
    assert_eq!(directory.disk_count(), 0);
}

#[test]
fn test_snapshot_of_empty_region() {
    let dir = TempDir::new().unwrap();
    let directory = log_directory(&dir);
    let us = instance(1);
    let r = region(1, 0);
    directory.prepare(&assign(layout(&[1]), r, 0, us).build(), &us);

    assert!(directory.make_snapshot(r).unwrap().is_empty());
    assert!(directory.make_rolling_snapshot(r).unwrap().is_empty());
}

#[test]
fn test_trickle_flushes_one_region() {
    let dir = TempDir::new().unwrap();
    let (directory, factory) = mock_directory(&dir);
    let us = instance(1);
    let r = region(1, 0);
    directory.prepare(&assign(layout(&[1]), r, 0, us).build(), &us);
    directory.shutdown();

    let disk = factory.disk(r).unwrap();
    // Let a maintenance pass in flight finish
    thread::sleep(Duration::from_millis(20));
    let before = disk.count(Call::Flush);

    assert_eq!(directory.trickle(r), ReturnCode::DidNothing);
    assert_eq!(disk.count(Call::Flush), before + 1);
}

#[test]
fn test_trickle_reports_flush_failure() {
    let dir = TempDir::new().unwrap();
    let (directory, factory) = mock_directory(&dir);
    let us = instance(1);
    let r = region(1, 0);
    directory.prepare(&assign(layout(&[1]), r, 0, us).build(), &us);
    directory.shutdown();
    thread::sleep(Duration::from_millis(20));

    let disk = factory.disk(r).unwrap();
    disk.script_flush(&[ReturnCode::Failure, ReturnCode::DataFull]);

    assert_eq!(directory.trickle(r), ReturnCode::Failure);
    // Back-pressure is left for the maintenance thread
    assert_eq!(directory.trickle(r), ReturnCode::DataFull);
    assert_eq!(disk.count(Call::MandatoryIo), 0);
}

// =============================================================================
// Maintenance and Shutdown Tests
// =============================================================================

#[test]
fn test_hosted_disks_receive_maintenance() {
    let dir = TempDir::new().unwrap();
    let (directory, factory) = mock_directory(&dir);
    let us = instance(1);
    let r = region(1, 0);
    directory.prepare(&assign(layout(&[1]), r, 0, us).build(), &us);

    let disk = factory.disk(r).unwrap();
    assert!(wait_for(Duration::from_secs(5), || {
        disk.count(Call::Flush) > 0
            && disk.count(Call::Preallocate) > 0
            && disk.count(Call::OptimisticIo) > 0
    }));
}

#[test]
fn test_no_io_after_drop() {
    let dir = TempDir::new().unwrap();
    let (directory, factory) = mock_directory(&dir);
    let us = instance(1);
    let r = region(1, 0);
    directory.prepare(&assign(layout(&[1]), r, 0, us).build(), &us);

    let disk = factory.disk(r).unwrap();
    assert!(wait_for(Duration::from_secs(5), || disk.count(Call::Flush) > 0));

    directory.shutdown();
    assert!(directory.is_shutdown());
    drop(directory);

    let calls = disk.calls().len();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(disk.calls().len(), calls);
}

#[test]
fn test_drop_without_shutdown_joins_thread() {
    let dir = TempDir::new().unwrap();
    let (directory, factory) = mock_directory(&dir);
    let us = instance(1);
    let r = region(1, 0);
    directory.prepare(&assign(layout(&[1]), r, 0, us).build(), &us);
    let disk = factory.disk(r).unwrap();

    drop(directory);

    let calls = disk.calls().len();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(disk.calls().len(), calls);
}
