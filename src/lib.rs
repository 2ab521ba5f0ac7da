//! # netcollect - Multi-vendor Network Device Collection Engine
//!
//! `netcollect` logs into network devices over SSH, Telnet or a console
//! server, runs vendor-specific commands and turns the free-form CLI output
//! into structured records. Sessions can be pooled per device, and
//! configuration backups can run on hourly, daily or monthly schedules.
//!
//! ## Features
//!
//! - **Vendor Dialects**: Cisco, Huawei, H3C, Ruijie and more, resolved from
//!   free-text vendor names including localized spellings
//! - **Prompt Detection**: Reads until the dialect's prompt, answering
//!   pagination prompts on the way
//! - **Retry with Backoff**: Transient connection failures are retried,
//!   authentication failures are not
//! - **Parsers**: Version, serial number, interfaces and MAC address tables
//! - **Connection Pooling**: Bounded per-device pool with idle expiry
//! - **Scheduled Backups**: Cron-driven jobs with a misfire grace period
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use netcollect::collect::Collector;
//! use netcollect::config::EngineConfig;
//! use netcollect::model::{DeviceEndpoint, LoginMethod};
//! use netcollect::session::ConnectionManager;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let collector = Collector::new(ConnectionManager::new(EngineConfig::default()));
//!
//!     let endpoint = DeviceEndpoint {
//!         id: 1,
//!         hostname: "core-1".to_string(),
//!         ip_address: "192.168.1.1".to_string(),
//!         vendor: "huawei".to_string(),
//!         login_method: LoginMethod::Ssh,
//!         port: None,
//!         username: Some("admin".to_string()),
//!         password: Some("password".to_string()),
//!     };
//!
//!     if let Some(version) = collector.collect_version(&endpoint).await? {
//!         println!("Software: {:?}", version.software_version);
//!     }
//!     for entry in collector.collect_mac_table(&endpoint).await? {
//!         println!("{} vlan {} on {}", entry.mac_address, entry.vlan_id, entry.interface);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Main Components
//!
//! - [`collect::Collector`] - Collects telemetry from one or many devices
//! - [`session::ConnectionManager`] - Opens sessions with retry and backoff
//! - [`pool::ConnectionPool`] - Reuses open sessions per device
//! - [`schedule::BackupScheduler`] - Runs configuration backups on a schedule
//! - [`error::ConnectError`] - Error types for connection and command failures

pub mod backup;
pub mod collect;
pub mod config;
pub mod dialect;
pub mod error;
pub mod exec;
pub mod model;
pub mod parse;
pub mod pool;
pub mod prompt;
pub mod schedule;
pub mod session;
