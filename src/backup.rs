//! Configuration backup workflow.
//!
//! A backup collects the running configuration, compares it with the last
//! stored snapshot and, when it changed, commits it to the archive and
//! stores a new snapshot. Device lookup, snapshot storage and the archive
//! are collaborators supplied by the host application.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use futures::future::join_all;
use log::{error, info};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::collect::Collector;
use crate::error::BackupError;
use crate::model::DeviceEndpoint;

/// Looks up connection facts by device identity.
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    async fn endpoint(&self, device_id: u64) -> Option<DeviceEndpoint>;
}

/// Stored configuration snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Most recent snapshot of the device, if any.
    async fn latest(&self, device_id: u64) -> Result<Option<ConfigSnapshot>, BackupError>;

    async fn save(&self, snapshot: ConfigSnapshot) -> Result<(), BackupError>;
}

/// Version-controlled configuration archive.
#[async_trait]
pub trait Archive: Send + Sync {
    /// Commits `config` as the configuration of `device_name` and returns the
    /// commit identifier.
    async fn commit(
        &self,
        device_name: &str,
        config: &str,
        message: &str,
    ) -> Result<String, BackupError>;
}

/// One stored running configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub device_id: u64,
    pub content: String,
    /// Lowercase hex SHA-256 of `content`.
    pub digest: String,
    pub taken_at: DateTime<Local>,
    pub commit_id: Option<String>,
}

pub fn config_digest(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

/// Result of one successful backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BackupStatus {
    /// Configuration changed and was archived.
    Archived { commit_id: String },
    /// Configuration equals the last snapshot; nothing was written.
    Unchanged,
}

/// Per-device entry of a batch backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupItem {
    pub device_id: u64,
    pub status: Option<BackupStatus>,
    pub error: Option<String>,
}

impl BackupItem {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub details: Vec<BackupItem>,
}

/// Runs a backup for a device. Implemented by [`ConfigBackup`]; the
/// scheduler only depends on this trait.
#[async_trait]
pub trait BackupRunner: Send + Sync {
    async fn run_backup(&self, device_id: u64) -> Result<BackupStatus, BackupError>;
}

/// The collect, compare and archive workflow.
#[derive(Clone)]
pub struct ConfigBackup {
    collector: Collector,
    directory: Arc<dyn DeviceDirectory>,
    store: Arc<dyn SnapshotStore>,
    archive: Arc<dyn Archive>,
}

impl ConfigBackup {
    pub fn new(
        collector: Collector,
        directory: Arc<dyn DeviceDirectory>,
        store: Arc<dyn SnapshotStore>,
        archive: Arc<dyn Archive>,
    ) -> Self {
        Self {
            collector,
            directory,
            store,
            archive,
        }
    }

    /// Backs up one device.
    pub async fn run(&self, device_id: u64) -> Result<BackupStatus, BackupError> {
        let endpoint = self
            .directory
            .endpoint(device_id)
            .await
            .ok_or(BackupError::DeviceNotFound(device_id))?;

        let config = self
            .collector
            .collect_running_config(&endpoint)
            .await?
            .ok_or_else(|| BackupError::EmptyConfig(endpoint.hostname.clone()))?;

        let digest = config_digest(&config);
        if let Some(last) = self.store.latest(device_id).await? {
            if last.digest == digest {
                info!("{} Configuration unchanged", endpoint.hostname);
                return Ok(BackupStatus::Unchanged);
            }
        }

        let taken_at = Local::now();
        let message = format!(
            "Backup {} at {}",
            endpoint.hostname,
            taken_at.format("%Y-%m-%d %H:%M:%S")
        );
        let commit_id = self
            .archive
            .commit(&endpoint.hostname, &config, &message)
            .await?;

        self.store
            .save(ConfigSnapshot {
                device_id,
                content: config,
                digest,
                taken_at,
                commit_id: Some(commit_id.clone()),
            })
            .await?;

        info!("{} Configuration archived as {}", endpoint.hostname, commit_id);
        Ok(BackupStatus::Archived { commit_id })
    }

    /// Backs up many devices concurrently. One device failing never stops
    /// the others.
    pub async fn backup_many(&self, device_ids: &[u64]) -> BackupReport {
        let details: Vec<BackupItem> = join_all(device_ids.iter().map(|&device_id| async move {
            match self.run(device_id).await {
                Ok(status) => BackupItem {
                    device_id,
                    status: Some(status),
                    error: None,
                },
                Err(err) => {
                    error!("Backup of device {} failed: {}", device_id, err);
                    BackupItem {
                        device_id,
                        status: None,
                        error: Some(err.to_string()),
                    }
                }
            }
        }))
        .await;

        let succeeded = details.iter().filter(|item| item.succeeded()).count();
        BackupReport {
            total: details.len(),
            succeeded,
            failed: details.len() - succeeded,
            details,
        }
    }
}

#[async_trait]
impl BackupRunner for ConfigBackup {
    async fn run_backup(&self, device_id: u64) -> Result<BackupStatus, BackupError> {
        self.run(device_id).await
    }
}
