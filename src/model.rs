//! Data types exchanged with collaborators: endpoints, telemetry records,
//! schedule descriptors and collection outcomes.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Local};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::dialect::Vendor;

/// Login transport used to reach a device's CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LoginMethod {
    #[default]
    Ssh,
    Telnet,
    /// Console line reached through a terminal server.
    Console,
}

impl LoginMethod {
    /// Parses a persisted login method, case-insensitively. Unknown values
    /// fall back to SSH.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "telnet" => LoginMethod::Telnet,
            "console" => LoginMethod::Console,
            _ => LoginMethod::Ssh,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoginMethod::Ssh => "ssh",
            LoginMethod::Telnet => "telnet",
            LoginMethod::Console => "console",
        }
    }
}

pub const SSH_PORT: u16 = 22;
pub const TELNET_PORT: u16 = 23;

/// Read-only snapshot of how to reach one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DeviceEndpoint {
    /// Identity assigned by the persistence layer.
    pub id: u64,
    pub hostname: String,
    pub ip_address: String,
    /// Free-text vendor name, any case, English or localized.
    pub vendor: String,
    #[serde(default)]
    pub login_method: LoginMethod,
    /// `None` means the transport default.
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl DeviceEndpoint {
    /// Resolves the vendor string into the closed vendor set.
    pub fn vendor(&self) -> Vendor {
        Vendor::resolve(&self.vendor)
    }

    /// Port actually dialed. Telnet with no port, or with the SSH default,
    /// is coerced to 23.
    pub fn effective_port(&self) -> u16 {
        match (self.login_method, self.port) {
            (LoginMethod::Telnet, None) | (LoginMethod::Telnet, Some(SSH_PORT)) => TELNET_PORT,
            (LoginMethod::Console, None) => TELNET_PORT,
            (_, Some(port)) => port,
            (LoginMethod::Ssh, None) => SSH_PORT,
        }
    }

    /// Both username and password are present and non-empty.
    pub fn has_credentials(&self) -> bool {
        let filled = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        filled(&self.username) && filled(&self.password)
    }

    /// `user@host:port`, used for logging and session naming.
    pub fn addr(&self) -> String {
        format!(
            "{}@{}:{}",
            self.username.as_deref().unwrap_or(""),
            self.ip_address,
            self.effective_port()
        )
    }
}

/// Categories of data the engine can extract from a device.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryKind {
    Version,
    Serial,
    Interfaces,
    MacTable,
    RunningConfig,
}

impl TelemetryKind {
    /// Order in which a batch collects kinds on one session.
    pub const COLLECTION_ORDER: [TelemetryKind; 5] = [
        TelemetryKind::Version,
        TelemetryKind::Serial,
        TelemetryKind::Interfaces,
        TelemetryKind::MacTable,
        TelemetryKind::RunningConfig,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TelemetryKind::Version => "version",
            TelemetryKind::Serial => "serial",
            TelemetryKind::Interfaces => "interfaces",
            TelemetryKind::MacTable => "mac_table",
            TelemetryKind::RunningConfig => "running_config",
        }
    }
}

impl fmt::Display for TelemetryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Software/hardware facts from the version command. Every field is best effort.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct VersionRecord {
    pub software_version: Option<String>,
    pub hardware_version: Option<String>,
    pub boot_version: Option<String>,
    pub system_image: Option<String>,
    pub uptime: Option<String>,
    pub collected_at: Option<DateTime<Local>>,
}

impl VersionRecord {
    /// True when no field besides the timestamp was extracted.
    pub fn is_empty(&self) -> bool {
        self.software_version.is_none()
            && self.hardware_version.is_none()
            && self.boot_version.is_none()
            && self.system_image.is_none()
            && self.uptime.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AddressType {
    Static,
    Dynamic,
}

impl AddressType {
    /// Maps a vendor type column to the two-valued type. Learned entries are
    /// dynamic; configured, sticky and secure entries count as static.
    pub fn from_label(label: &str) -> Self {
        let label = label.trim().to_ascii_lowercase();
        if label.starts_with("dynamic") || label.starts_with("learned") {
            AddressType::Dynamic
        } else {
            AddressType::Static
        }
    }
}

/// One row of a MAC address table. The MAC keeps the vendor's own separators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MacTableEntry {
    pub mac_address: String,
    pub vlan_id: u32,
    pub interface: String,
    pub address_type: AddressType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct InterfaceRecord {
    pub port_name: String,
    pub status: String,
    pub description: String,
    pub speed: String,
}

/// How often a device's configuration is backed up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    Hourly,
    Daily,
    Monthly,
}

/// A persisted backup schedule for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BackupScheduleDescriptor {
    pub id: u64,
    pub device_id: u64,
    pub cadence: Cadence,
    /// `HH:MM`, local time. Defaults to 01:00.
    #[serde(default)]
    pub time: Option<String>,
    /// Day of month for monthly cadence. Defaults to 1.
    #[serde(default)]
    pub day: Option<u32>,
    pub active: bool,
}

/// Extracted data for one telemetry kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum TelemetryRecord {
    Version(VersionRecord),
    Serial(String),
    Interfaces(Vec<InterfaceRecord>),
    MacTable(Vec<MacTableEntry>),
    RunningConfig(String),
}

/// Per-device result of a batch collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CollectionOutcome {
    pub device_id: u64,
    pub hostname: String,
    /// At least one requested kind produced data.
    pub success: bool,
    pub data: BTreeMap<TelemetryKind, TelemetryRecord>,
    /// Kinds whose command failed, with the failure message.
    #[serde(default)]
    pub kind_errors: BTreeMap<TelemetryKind, String>,
    pub error: Option<String>,
}

impl CollectionOutcome {
    pub(crate) fn new(endpoint: &DeviceEndpoint) -> Self {
        Self {
            device_id: endpoint.id,
            hostname: endpoint.hostname.clone(),
            success: false,
            data: BTreeMap::new(),
            kind_errors: BTreeMap::new(),
            error: None,
        }
    }
}

/// Aggregate of a batch collection across devices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BatchReport {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub details: Vec<CollectionOutcome>,
}

impl BatchReport {
    pub fn from_outcomes(details: Vec<CollectionOutcome>) -> Self {
        let success = details.iter().filter(|d| d.success).count();
        Self {
            total: details.len(),
            success,
            failed: details.len() - success,
            details,
        }
    }
}
