//! Runs scheduled configuration backups for the devices in an inventory file.
//!
//! ```text
//! cargo run --example backup_daemon -- inventory.json
//! ```
//!
//! The inventory holds `devices` (endpoints) and `schedules` (backup
//! descriptors), plus optional `engine`, `pool` and `scheduler` settings.
//! Snapshots and archive commits are kept in memory.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;

use netcollect::backup::{
    Archive, ConfigBackup, ConfigSnapshot, DeviceDirectory, SnapshotStore, config_digest,
};
use netcollect::collect::Collector;
use netcollect::config::{EngineConfig, PoolConfig, SchedulerConfig};
use netcollect::error::BackupError;
use netcollect::model::{BackupScheduleDescriptor, DeviceEndpoint};
use netcollect::pool::ConnectionPool;
use netcollect::schedule::BackupScheduler;
use netcollect::session::ConnectionManager;

#[derive(Deserialize)]
struct Inventory {
    devices: Vec<DeviceEndpoint>,
    #[serde(default)]
    schedules: Vec<BackupScheduleDescriptor>,
    #[serde(default)]
    engine: EngineConfig,
    #[serde(default)]
    pool: PoolConfig,
    #[serde(default)]
    scheduler: SchedulerConfig,
}

struct StaticDirectory(HashMap<u64, DeviceEndpoint>);

#[async_trait]
impl DeviceDirectory for StaticDirectory {
    async fn endpoint(&self, device_id: u64) -> Option<DeviceEndpoint> {
        self.0.get(&device_id).cloned()
    }
}

#[derive(Default)]
struct MemoryStore(Mutex<HashMap<u64, ConfigSnapshot>>);

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn latest(&self, device_id: u64) -> Result<Option<ConfigSnapshot>, BackupError> {
        Ok(self.0.lock().await.get(&device_id).cloned())
    }

    async fn save(&self, snapshot: ConfigSnapshot) -> Result<(), BackupError> {
        self.0.lock().await.insert(snapshot.device_id, snapshot);
        Ok(())
    }
}

/// Numbers commits and prints what would have been written.
#[derive(Default)]
struct PrintingArchive(Mutex<u64>);

#[async_trait]
impl Archive for PrintingArchive {
    async fn commit(
        &self,
        device_name: &str,
        config: &str,
        message: &str,
    ) -> Result<String, BackupError> {
        let mut counter = self.0.lock().await;
        *counter += 1;
        let digest = config_digest(config);
        println!(
            "commit #{} {}: {} ({} bytes, sha256 {})",
            counter,
            device_name,
            message,
            config.len(),
            &digest[..12]
        );
        Ok(format!("{:08x}", *counter))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .context("usage: backup_daemon <inventory.json>")?;
    let raw = std::fs::read_to_string(&path).with_context(|| format!("read {path}"))?;
    let inventory: Inventory =
        serde_json::from_str(&raw).with_context(|| format!("parse {path}"))?;

    let pool = ConnectionPool::new(ConnectionManager::new(inventory.engine), inventory.pool);
    pool.start_sweeper().await;

    let directory = StaticDirectory(
        inventory
            .devices
            .into_iter()
            .map(|device| (device.id, device))
            .collect(),
    );
    let backup = ConfigBackup::new(
        Collector::with_pool(pool.clone()),
        Arc::new(directory),
        Arc::new(MemoryStore::default()),
        Arc::new(PrintingArchive::default()),
    );

    let scheduler = BackupScheduler::new(Arc::new(backup), inventory.scheduler);
    let loaded = scheduler.load_schedules(&inventory.schedules).await;
    for job in scheduler.jobs().await {
        println!(
            "{} device={} cron=\"{}\" next={:?}",
            job.key, job.device_id, job.expression, job.next_fire
        );
    }
    println!("{loaded} schedules loaded, press Ctrl-C to stop");
    scheduler.start().await;

    tokio::signal::ctrl_c().await.context("wait for Ctrl-C")?;

    scheduler.shutdown().await;
    let stats = pool.stats().await;
    println!("pool at shutdown: {}", serde_json::to_string(&stats)?);
    pool.close_all().await;
    Ok(())
}
