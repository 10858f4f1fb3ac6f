//! datalayer Server Binary
//!
//! Hosts a set of regions from a single-node configuration and keeps them
//! maintained until the run time elapses.

use std::net::SocketAddr;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use datalayer::cluster::{HashingStrategy, SubspaceId};
use datalayer::{Config, Configuration, EntityId, Instance, RegionDirectory, RegionId};
use tracing_subscriber::{fmt, EnvFilter};

/// datalayer Server
#[derive(Parser, Debug)]
#[command(name = "datalayer-server")]
#[command(about = "Region-local storage directory of a sharded key-value store")]
#[command(version)]
struct Args {
    /// Base directory for region storage
    #[arg(short, long, default_value = "./datalayer_data")]
    base_path: String,

    /// Address identifying this instance
    #[arg(short, long, default_value = "127.0.0.1:1982")]
    listen: SocketAddr,

    /// Number of regions to host
    #[arg(short, long, default_value = "4")]
    regions: u8,

    /// Space the regions belong to
    #[arg(short, long, default_value = "1")]
    space: u32,

    /// Columns per region, key included
    #[arg(short, long, default_value = "2")]
    columns: u16,

    /// Seconds to run before shutting down (0 = forever)
    #[arg(long, default_value = "0")]
    run_secs: u64,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,datalayer=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("datalayer server v{}", datalayer::VERSION);
    tracing::info!("Base path: {}", args.base_path);
    tracing::info!("Instance: {}", args.listen);

    let config = Config::builder().base_path(&args.base_path).build();

    let directory = match RegionDirectory::open_with_log_disks(config) {
        Ok(d) => d,
        Err(e) => {
            tracing::error!("Failed to open region directory: {}", e);
            std::process::exit(1);
        }
    };

    let us = Instance::new(args.listen);
    let layout = single_node_layout(&args, us);

    directory.prepare(&layout, &us);
    directory.reconfigure(&layout, &us);
    directory.cleanup(&layout, &us);
    tracing::info!("Hosting {} regions", directory.disk_count());

    let started = Instant::now();
    while args.run_secs == 0 || started.elapsed() < Duration::from_secs(args.run_secs) {
        thread::sleep(Duration::from_millis(250));
    }

    directory.shutdown();
    drop(directory);
    tracing::info!("Server stopped");
}

/// Every region of the space on one replica assigned to `us`
fn single_node_layout(args: &Args, us: Instance) -> Configuration {
    let subspace = SubspaceId::new(args.space, 0);
    let prefix = u8::BITS - (args.regions.max(1) - 1).leading_zeros();

    let mut builder = Configuration::builder()
        .version(1)
        .hasher(subspace, HashingStrategy::new(args.space));

    for i in 0..args.regions {
        let mask = if prefix == 0 { 0 } else { u64::from(i) << (64 - prefix) };
        let region = RegionId::new(args.space, 0, prefix as u8, mask);
        builder = builder
            .region(region, args.columns)
            .entity(EntityId::new(region, 0), us);
    }

    builder.build()
}
