//! Telemetry collection from devices.
//!
//! [`Collector`] is the entry point for callers: each `collect_*` method
//! checks a session out (from the pool when one is configured, directly
//! otherwise), runs the dialect's command, parses the output and checks the
//! session back in. Sessions from a direct connect are always closed on
//! the way out, whatever the result.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use futures::future::join_all;
use log::{debug, error, info, warn};

use crate::dialect::{CommandKind, Vendor};
use crate::error::ConnectError;
use crate::exec::{SCRIPT_SEPARATOR, execute, execute_script, split_script};
use crate::model::{
    BatchReport, CollectionOutcome, DeviceEndpoint, InterfaceRecord, MacTableEntry,
    TelemetryKind, TelemetryRecord, VersionRecord,
};
use crate::parse;
use crate::pool::{ConnectionPool, PooledSession};
use crate::session::{ConnectionManager, TerminalSession};

/// A checked-out session.
enum SessionHandle {
    Pooled(PooledSession, Arc<ConnectionPool>),
    Direct(Box<dyn TerminalSession>),
}

impl SessionHandle {
    fn session(&mut self) -> &mut dyn TerminalSession {
        match self {
            SessionHandle::Pooled(pooled, _) => pooled.session(),
            SessionHandle::Direct(session) => session.as_mut(),
        }
    }
}

/// Runs collection commands against devices and parses their output.
#[derive(Clone)]
pub struct Collector {
    manager: ConnectionManager,
    pool: Option<Arc<ConnectionPool>>,
}

impl Collector {
    /// Collector that opens and closes a session per call.
    pub fn new(manager: ConnectionManager) -> Self {
        Self {
            manager,
            pool: None,
        }
    }

    /// Collector that borrows sessions from `pool` and falls back to a direct
    /// connection when the pool is exhausted.
    pub fn with_pool(pool: Arc<ConnectionPool>) -> Self {
        Self {
            manager: pool.manager().clone(),
            pool: Some(pool),
        }
    }

    fn command_timeout(&self) -> Duration {
        self.manager.config().command_timeout()
    }

    fn bulk_timeout(&self) -> Duration {
        self.manager.config().bulk_command_timeout()
    }

    async fn checkout(&self, endpoint: &DeviceEndpoint) -> Result<SessionHandle, ConnectError> {
        if !endpoint.has_credentials() {
            return Err(ConnectError::MissingCredentials(endpoint.hostname.clone()));
        }
        if let Some(pool) = self.pool.as_ref().filter(|_| self.manager.config().use_pool) {
            if let Some(pooled) = pool.acquire(endpoint).await? {
                return Ok(SessionHandle::Pooled(pooled, pool.clone()));
            }
            debug!(
                "{} No pooled session available, connecting directly",
                endpoint.addr()
            );
        }
        Ok(SessionHandle::Direct(self.manager.connect(endpoint).await?))
    }

    async fn checkin(&self, handle: SessionHandle) {
        match handle {
            SessionHandle::Pooled(pooled, pool) => pool.release(pooled).await,
            SessionHandle::Direct(mut session) => {
                if let Err(err) = session.close().await {
                    warn!("{} Error closing session: {}", session.device_addr(), err);
                }
            }
        }
    }

    /// Collects one kind on a session of its own.
    async fn fetch(
        &self,
        endpoint: &DeviceEndpoint,
        kind: TelemetryKind,
    ) -> Result<Option<TelemetryRecord>, ConnectError> {
        let mut handle = self.checkout(endpoint).await?;
        let result = self
            .collect_kind(handle.session(), endpoint.vendor(), kind)
            .await;
        self.checkin(handle).await;
        if let Err(err) = &result {
            error!("{} Collecting {} failed: {}", endpoint.addr(), kind, err);
        }
        result
    }

    /// Version facts, stamped with the local collection time. `None` when
    /// nothing could be extracted.
    pub async fn collect_version(
        &self,
        endpoint: &DeviceEndpoint,
    ) -> Result<Option<VersionRecord>, ConnectError> {
        match self.fetch(endpoint, TelemetryKind::Version).await? {
            Some(TelemetryRecord::Version(record)) => Ok(Some(record)),
            _ => Ok(None),
        }
    }

    /// Serial number from the version output, else from inventory output.
    pub async fn collect_serial(
        &self,
        endpoint: &DeviceEndpoint,
    ) -> Result<Option<String>, ConnectError> {
        match self.fetch(endpoint, TelemetryKind::Serial).await? {
            Some(TelemetryRecord::Serial(serial)) => Ok(Some(serial)),
            _ => Ok(None),
        }
    }

    pub async fn collect_interfaces(
        &self,
        endpoint: &DeviceEndpoint,
    ) -> Result<Vec<InterfaceRecord>, ConnectError> {
        match self.fetch(endpoint, TelemetryKind::Interfaces).await? {
            Some(TelemetryRecord::Interfaces(interfaces)) => Ok(interfaces),
            _ => Ok(Vec::new()),
        }
    }

    pub async fn collect_mac_table(
        &self,
        endpoint: &DeviceEndpoint,
    ) -> Result<Vec<MacTableEntry>, ConnectError> {
        match self.fetch(endpoint, TelemetryKind::MacTable).await? {
            Some(TelemetryRecord::MacTable(entries)) => Ok(entries),
            _ => Ok(Vec::new()),
        }
    }

    /// Running configuration text. `None` when the device printed nothing.
    pub async fn collect_running_config(
        &self,
        endpoint: &DeviceEndpoint,
    ) -> Result<Option<String>, ConnectError> {
        match self.fetch(endpoint, TelemetryKind::RunningConfig).await? {
            Some(TelemetryRecord::RunningConfig(config)) => Ok(Some(config)),
            _ => Ok(None),
        }
    }

    /// Runs an arbitrary command, or a ` ; ` separated script on one
    /// session, and returns the raw output.
    pub async fn execute_command(
        &self,
        endpoint: &DeviceEndpoint,
        command: &str,
        expect_pattern: Option<&str>,
    ) -> Result<String, ConnectError> {
        let vendor = endpoint.vendor();
        let timeout = self.command_timeout();
        let mut handle = self.checkout(endpoint).await?;
        let result = if command.contains(SCRIPT_SEPARATOR) && expect_pattern.is_none() {
            let commands = split_script(command);
            execute_script(handle.session(), &commands, vendor, timeout).await
        } else {
            execute(handle.session(), command, vendor, expect_pattern, timeout).await
        };
        self.checkin(handle).await;
        result
    }

    /// Collects `kinds` from every endpoint concurrently.
    ///
    /// Kinds for one device run in order on one session. A failure on one
    /// device never affects the others: the report has one outcome per
    /// endpoint, in input order.
    pub async fn batch_collect(
        &self,
        endpoints: &[DeviceEndpoint],
        kinds: &[TelemetryKind],
    ) -> BatchReport {
        let outcomes = join_all(
            endpoints
                .iter()
                .map(|endpoint| self.collect_device(endpoint, kinds)),
        )
        .await;
        let report = BatchReport::from_outcomes(outcomes);
        info!(
            "Batch collection finished: {}/{} devices succeeded",
            report.success, report.total
        );
        report
    }

    async fn collect_device(
        &self,
        endpoint: &DeviceEndpoint,
        kinds: &[TelemetryKind],
    ) -> CollectionOutcome {
        let mut outcome = CollectionOutcome::new(endpoint);
        let mut handle = match self.checkout(endpoint).await {
            Ok(handle) => handle,
            Err(err) => {
                error!("{} Connection failed: {}", endpoint.addr(), err);
                outcome.error = Some(err.to_string());
                return outcome;
            }
        };

        let vendor = endpoint.vendor();
        for kind in TelemetryKind::COLLECTION_ORDER
            .into_iter()
            .filter(|kind| kinds.contains(kind))
        {
            match self.collect_kind(handle.session(), vendor, kind).await {
                Ok(Some(record)) => {
                    outcome.data.insert(kind, record);
                }
                Ok(None) => debug!("{} Nothing collected for {}", endpoint.addr(), kind),
                Err(err) => {
                    warn!("{} Collecting {} failed: {}", endpoint.addr(), kind, err);
                    outcome.kind_errors.insert(kind, err.to_string());
                }
            }
        }
        self.checkin(handle).await;

        outcome.success = !outcome.data.is_empty();
        if !outcome.success {
            let message = if outcome.kind_errors.is_empty() {
                "no data collected".to_string()
            } else {
                outcome
                    .kind_errors
                    .iter()
                    .map(|(kind, err)| format!("{kind}: {err}"))
                    .collect::<Vec<_>>()
                    .join("; ")
            };
            error!("{} Collection failed: {}", endpoint.addr(), message);
            outcome.error = Some(message);
        }
        outcome
    }

    /// Runs the commands for one kind on an open session. `Ok(None)` means
    /// the kind is unsupported by the dialect or nothing was extracted.
    async fn collect_kind(
        &self,
        session: &mut dyn TerminalSession,
        vendor: Vendor,
        kind: TelemetryKind,
    ) -> Result<Option<TelemetryRecord>, ConnectError> {
        match kind {
            TelemetryKind::Version => {
                let Some(output) = self
                    .run_command(session, vendor, CommandKind::Version, self.command_timeout())
                    .await?
                else {
                    return Ok(None);
                };
                let mut record = parse::parse_version(&output, vendor);
                if record.is_empty() {
                    return Ok(None);
                }
                record.collected_at = Some(Local::now());
                Ok(Some(TelemetryRecord::Version(record)))
            }
            TelemetryKind::Serial => {
                let version = self
                    .run_command(session, vendor, CommandKind::Version, self.command_timeout())
                    .await?;
                if let Some(serial) = version
                    .as_deref()
                    .and_then(|out| parse::serial_from_version(out, vendor))
                {
                    return Ok(Some(TelemetryRecord::Serial(serial)));
                }
                let inventory = self
                    .run_command(session, vendor, CommandKind::Inventory, self.command_timeout())
                    .await?;
                Ok(inventory
                    .as_deref()
                    .and_then(|out| parse::serial_from_inventory(out, vendor))
                    .map(TelemetryRecord::Serial))
            }
            TelemetryKind::Interfaces => {
                let Some(output) = self
                    .run_command(session, vendor, CommandKind::Interfaces, self.bulk_timeout())
                    .await?
                else {
                    return Ok(None);
                };
                let status = match self
                    .run_command(
                        session,
                        vendor,
                        CommandKind::InterfacesStatus,
                        self.command_timeout(),
                    )
                    .await
                {
                    Ok(status) => status,
                    Err(err) => {
                        warn!(
                            "{} Interface status table unavailable: {}",
                            session.device_addr(),
                            err
                        );
                        None
                    }
                };
                let interfaces = parse::parse_interfaces(&output, status.as_deref(), vendor);
                Ok((!interfaces.is_empty()).then_some(TelemetryRecord::Interfaces(interfaces)))
            }
            TelemetryKind::MacTable => {
                let Some(output) = self
                    .run_command(session, vendor, CommandKind::MacTable, self.bulk_timeout())
                    .await?
                else {
                    return Ok(None);
                };
                let entries = parse::parse_mac_table(&output, vendor);
                Ok((!entries.is_empty()).then_some(TelemetryRecord::MacTable(entries)))
            }
            TelemetryKind::RunningConfig => {
                let output = self
                    .run_command(session, vendor, CommandKind::RunningConfig, self.bulk_timeout())
                    .await?;
                Ok(output
                    .filter(|config| !config.trim().is_empty())
                    .map(TelemetryRecord::RunningConfig))
            }
        }
    }

    async fn run_command(
        &self,
        session: &mut dyn TerminalSession,
        vendor: Vendor,
        kind: CommandKind,
        timeout: Duration,
    ) -> Result<Option<String>, ConnectError> {
        let command = vendor.command(kind);
        if command.is_empty() {
            return Ok(None);
        }
        execute(session, command, vendor, None, timeout)
            .await
            .map(Some)
    }
}
