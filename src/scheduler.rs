//! Maintenance Scheduler
//!
//! One background thread per directory that keeps every hosted disk durable
//! and within capacity.
//!
//! ## Iteration
//! ```text
//!   ┌──► stop signalled? ── yes ──► exit
//!   │         │ no
//!   │    snapshot map (read lock, released at once)
//!   │    enqueue new regions on both round-robin queues
//!   │    preallocation pass  (every preallocate_interval, first Success ends it)
//!   │    optimistic I/O pass (every optimism_interval,    first Success ends it)
//!   │    flush every disk; DataFull/SearchFull → mandatory I/O on that disk
//!   │         │
//!   └── work done? ── no ──► wait idle_sleep (or until stop)
//! ```
//!
//! Round-robin bounds how long any region waits for preallocation or
//! opportunistic I/O to O(number of hosted regions) passes. Mandatory I/O is
//! not timed: it runs the moment a flush reports back-pressure.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::cluster::RegionId;
use crate::config::Config;
use crate::directory::DiskMap;
use crate::disk::{Disk, ReturnCode};
use crate::error::Result;

/// Scheduling state owned by the maintenance thread
///
/// Queues are never pruned eagerly: a region that has been dropped is
/// discarded the next time a pass reaches it.
pub struct MaintenanceState {
    preallocate_rr: VecDeque<RegionId>,
    optimistic_rr: VecDeque<RegionId>,
    last_preallocation: Option<Instant>,
    last_optimism: Option<Instant>,
    preallocate_interval: Duration,
    optimism_interval: Duration,
    flush_limit: usize,
}

impl MaintenanceState {
    pub fn new(config: &Config) -> Self {
        Self {
            preallocate_rr: VecDeque::new(),
            optimistic_rr: VecDeque::new(),
            last_preallocation: None,
            last_optimism: None,
            preallocate_interval: config.preallocate_interval,
            optimism_interval: config.optimism_interval,
            flush_limit: config.flush_limit,
        }
    }

    /// Run one scheduling iteration over a snapshot sorted by region
    ///
    /// Returns `true` if any disk reported useful work.
    pub fn run_once(&mut self, disks: &[(RegionId, Arc<dyn Disk>)]) -> bool {
        self.observe(disks);

        let mut did_work = false;

        if is_due(self.last_preallocation, self.preallocate_interval) {
            did_work |= rotate(&mut self.preallocate_rr, disks, "Preallocation", |d| {
                d.preallocate()
            });
            self.last_preallocation = Some(Instant::now());
        }

        if is_due(self.last_optimism, self.optimism_interval) {
            did_work |= rotate(&mut self.optimistic_rr, disks, "Optimistic I/O", |d| {
                d.do_optimistic_io()
            });
            self.last_optimism = Some(Instant::now());
        }

        did_work |= self.flush_all(disks);
        did_work
    }

    /// Regions waiting for preallocation, next in line first
    pub fn preallocate_queue(&self) -> &VecDeque<RegionId> {
        &self.preallocate_rr
    }

    /// Regions waiting for opportunistic I/O, next in line first
    pub fn optimism_queue(&self) -> &VecDeque<RegionId> {
        &self.optimistic_rr
    }

    /// Append regions seen for the first time to both queues
    fn observe(&mut self, disks: &[(RegionId, Arc<dyn Disk>)]) {
        for (region, _) in disks {
            if !self.preallocate_rr.contains(region) {
                self.preallocate_rr.push_back(*region);
            }
            if !self.optimistic_rr.contains(region) {
                self.optimistic_rr.push_back(*region);
            }
        }
    }

    fn flush_all(&self, disks: &[(RegionId, Arc<dyn Disk>)]) -> bool {
        let mut did_work = false;

        for (region, disk) in disks {
            match disk.flush(self.flush_limit) {
                ReturnCode::Success => did_work = true,
                ReturnCode::DidNothing => {}
                code if code.is_back_pressure() => match disk.do_mandatory_io() {
                    ReturnCode::Success => did_work = true,
                    ReturnCode::DidNothing => {}
                    io => tracing::error!(
                        region = %region,
                        "Mandatory I/O after {} returned {}",
                        code,
                        io
                    ),
                },
                code => tracing::error!(region = %region, "Disk flush returned {}", code),
            }
        }

        did_work
    }
}

/// Walk a round-robin queue until one disk reports `Success`
///
/// Each visited region moves to the back; regions missing from the snapshot
/// are dropped from the queue.
fn rotate<F>(
    queue: &mut VecDeque<RegionId>,
    disks: &[(RegionId, Arc<dyn Disk>)],
    what: &str,
    mut op: F,
) -> bool
where
    F: FnMut(&dyn Disk) -> ReturnCode,
{
    for _ in 0..queue.len() {
        let Some(region) = queue.pop_front() else {
            break;
        };
        let Ok(pos) = disks.binary_search_by(|(r, _)| r.cmp(&region)) else {
            continue;
        };
        queue.push_back(region);

        match op(disks[pos].1.as_ref()) {
            ReturnCode::Success => return true,
            ReturnCode::DidNothing => {}
            code => tracing::warn!(region = %region, "{} failed: {}", what, code),
        }
    }

    false
}

fn is_due(last: Option<Instant>, interval: Duration) -> bool {
    last.map_or(true, |at| at.elapsed() >= interval)
}

/// Handle to the maintenance thread
///
/// Dropping the handle stops and joins the thread.
pub struct MaintenanceScheduler {
    stop_tx: Sender<()>,
    stopping: AtomicBool,
    handle: Option<JoinHandle<()>>,
}

impl MaintenanceScheduler {
    /// Start the maintenance thread over `disks`
    pub fn spawn(disks: Arc<DiskMap>, config: &Config) -> Result<Self> {
        let (stop_tx, stop_rx) = channel::bounded(1);
        let state = MaintenanceState::new(config);
        let idle_sleep = config.idle_sleep;

        let handle = thread::Builder::new()
            .name("datalayer-maintenance".to_string())
            .spawn(move || maintenance_loop(state, disks, stop_rx, idle_sleep))?;

        Ok(Self {
            stop_tx,
            stopping: AtomicBool::new(false),
            handle: Some(handle),
        })
    }

    /// Ask the thread to exit at its next check
    pub fn stop(&self) {
        if !self.stopping.swap(true, Ordering::AcqRel) {
            let _ = self.stop_tx.try_send(());
        }
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    /// Wait for the thread to exit
    ///
    /// Call [`stop`](Self::stop) first, or this blocks forever.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Maintenance thread panicked");
            }
        }
    }
}

impl Drop for MaintenanceScheduler {
    fn drop(&mut self) {
        self.stop();
        self.join();
    }
}

fn maintenance_loop(
    mut state: MaintenanceState,
    disks: Arc<DiskMap>,
    stop_rx: Receiver<()>,
    idle_sleep: Duration,
) {
    tracing::info!("Maintenance thread started");
    let mut iterations: u64 = 0;

    loop {
        match stop_rx.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }

        let did_work = state.run_once(&disks.snapshot());
        iterations += 1;

        if !did_work {
            match stop_rx.recv_timeout(idle_sleep) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
    }

    tracing::info!(iterations, "Maintenance thread stopped");
}
