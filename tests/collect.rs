use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use netcollect::collect::Collector;
use netcollect::config::{EngineConfig, PoolConfig};
use netcollect::error::{ConnectError, ErrorKind};
use netcollect::model::{DeviceEndpoint, LoginMethod, TelemetryKind, TelemetryRecord};
use netcollect::pool::ConnectionPool;
use netcollect::session::{ConnectionManager, Connector, Output, SessionParams, TerminalSession};

const CISCO_VERSION: &str = include_str!("fixtures/cisco_show_version.txt");
const CISCO_INVENTORY: &str = include_str!("fixtures/cisco_show_inventory.txt");
const CISCO_MAC_TABLE: &str = include_str!("fixtures/cisco_mac_table.txt");
const HUAWEI_VERSION: &str = include_str!("fixtures/huawei_display_version.txt");
const HUAWEI_MAC_TABLE: &str = include_str!("fixtures/huawei_mac_table.txt");

/// Replies from a fixed command table and records every command sent.
struct ScriptedSession {
    addr: String,
    replies: HashMap<&'static str, &'static str>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicU32>,
}

#[async_trait]
impl TerminalSession for ScriptedSession {
    fn device_addr(&self) -> &str {
        &self.addr
    }

    fn is_connected(&self) -> bool {
        true
    }

    async fn send_command(
        &mut self,
        command: &str,
        _expect: Option<&Regex>,
        _timeout: Duration,
    ) -> Result<Output, ConnectError> {
        self.sent.lock().expect("sent log").push(command.to_string());
        let content = self.replies.get(command).copied().unwrap_or("");
        Ok(Output {
            success: true,
            content: content.to_string(),
            all: content.to_string(),
            prompt: None,
        })
    }

    async fn close(&mut self) -> Result<(), ConnectError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hosts listed in `unreachable` fail every attempt.
#[derive(Default)]
struct FakeConnector {
    unreachable: Vec<&'static str>,
    attempts: Mutex<HashMap<String, u32>>,
    sent: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicU32>,
}

impl FakeConnector {
    fn attempts(&self, host: &str) -> u32 {
        self.attempts
            .lock()
            .expect("attempt log")
            .get(host)
            .copied()
            .unwrap_or(0)
    }

    fn sent(&self) -> Vec<String> {
        self.sent.lock().expect("sent log").clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn open(&self, params: &SessionParams) -> Result<Box<dyn TerminalSession>, ConnectError> {
        *self
            .attempts
            .lock()
            .expect("attempt log")
            .entry(params.host.clone())
            .or_default() += 1;
        if self.unreachable.contains(&params.host.as_str()) {
            return Err(ConnectError::ProtocolError("connection refused".to_string()));
        }

        let replies: HashMap<&'static str, &'static str> = match params.vendor.family() {
            netcollect::dialect::Family::HuaweiLike => HashMap::from([
                ("display version", HUAWEI_VERSION),
                ("display mac-address", HUAWEI_MAC_TABLE),
            ]),
            _ => HashMap::from([
                ("show version", CISCO_VERSION),
                ("show inventory", CISCO_INVENTORY),
                ("show mac address-table", CISCO_MAC_TABLE),
                ("show running-config", "hostname access-3\n!\nend"),
            ]),
        };
        Ok(Box::new(ScriptedSession {
            addr: params.device_addr.clone(),
            replies,
            sent: self.sent.clone(),
            closed: self.closed.clone(),
        }))
    }
}

fn endpoint(id: u64, ip: &str, vendor: &str) -> DeviceEndpoint {
    DeviceEndpoint {
        id,
        hostname: format!("dev-{id}"),
        ip_address: ip.to_string(),
        vendor: vendor.to_string(),
        login_method: LoginMethod::Ssh,
        port: None,
        username: Some("admin".to_string()),
        password: Some("secret".to_string()),
    }
}

fn collector(connector: Arc<FakeConnector>) -> Collector {
    Collector::new(ConnectionManager::with_connector(
        connector,
        EngineConfig::default(),
    ))
}

#[tokio::test]
async fn serial_falls_back_to_inventory_on_one_session() {
    let connector = Arc::new(FakeConnector::default());
    let collector = collector(connector.clone());

    let serial = collector
        .collect_serial(&endpoint(1, "10.0.0.1", "cisco"))
        .await
        .expect("collect serial");

    assert_eq!(serial.as_deref(), Some("FOC12345678"));
    assert_eq!(connector.attempts("10.0.0.1"), 1);
    assert_eq!(connector.sent(), ["show version", "show inventory"]);
    assert_eq!(connector.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn version_is_stamped_with_collection_time() {
    let connector = Arc::new(FakeConnector::default());
    let version = collector(connector)
        .collect_version(&endpoint(1, "10.0.0.1", "Cisco"))
        .await
        .expect("collect version")
        .expect("version record");

    assert_eq!(version.software_version.as_deref(), Some("15.2(7)E4"));
    assert!(version.collected_at.is_some());
}

#[tokio::test]
async fn missing_credentials_fail_without_connecting() {
    let connector = Arc::new(FakeConnector::default());
    let mut ep = endpoint(1, "10.0.0.1", "cisco");
    ep.password = None;

    let err = collector(connector.clone())
        .collect_mac_table(&ep)
        .await
        .expect_err("no password");

    assert!(matches!(err, ConnectError::MissingCredentials(ref host) if host == "dev-1"));
    assert_eq!(err.kind(), ErrorKind::Authentication);
    assert_eq!(connector.attempts("10.0.0.1"), 0);
}

#[tokio::test(start_paused = true)]
async fn batch_tolerates_one_failing_device() {
    let connector = Arc::new(FakeConnector {
        unreachable: vec!["10.0.0.2"],
        ..FakeConnector::default()
    });
    let collector = collector(connector.clone());
    let endpoints = [
        endpoint(1, "10.0.0.1", "cisco"),
        endpoint(2, "10.0.0.2", "cisco"),
        endpoint(3, "10.0.0.3", "华为"),
    ];

    let report = collector
        .batch_collect(
            &endpoints,
            &[TelemetryKind::MacTable, TelemetryKind::Version],
        )
        .await;

    assert_eq!(report.total, 3);
    assert_eq!(report.success, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.details.len(), 3);

    let failed = &report.details[1];
    assert_eq!(failed.device_id, 2);
    assert!(!failed.success);
    assert!(failed.error.as_deref().expect("error").contains("unreachable after 3 attempts"));
    assert_eq!(connector.attempts("10.0.0.2"), 3);

    let huawei = &report.details[2];
    assert!(huawei.success);
    match huawei.data.get(&TelemetryKind::MacTable) {
        Some(TelemetryRecord::MacTable(entries)) => assert_eq!(entries.len(), 3),
        other => panic!("unexpected mac table record: {other:?}"),
    }
    assert!(huawei.data.contains_key(&TelemetryKind::Version));
}

#[tokio::test]
async fn kinds_run_in_fixed_order_on_one_session() {
    let connector = Arc::new(FakeConnector::default());
    let report = collector(connector.clone())
        .batch_collect(
            &[endpoint(1, "10.0.0.1", "cisco")],
            &[TelemetryKind::RunningConfig, TelemetryKind::MacTable, TelemetryKind::Version],
        )
        .await;

    assert_eq!(report.success, 1);
    assert_eq!(connector.attempts("10.0.0.1"), 1);
    assert_eq!(
        connector.sent(),
        ["show version", "show mac address-table", "show running-config"]
    );
    assert_eq!(
        report.details[0].data.get(&TelemetryKind::RunningConfig),
        Some(&TelemetryRecord::RunningConfig("hostname access-3\n!\nend".to_string()))
    );
}

#[tokio::test]
async fn device_with_nothing_collected_is_failed() {
    let connector = Arc::new(FakeConnector::default());
    let report = collector(connector)
        .batch_collect(&[endpoint(1, "10.0.0.1", "cisco")], &[TelemetryKind::Interfaces])
        .await;

    assert_eq!(report.failed, 1);
    assert_eq!(report.details[0].error.as_deref(), Some("no data collected"));
}

#[tokio::test]
async fn pooled_collections_reuse_one_session() {
    let connector = Arc::new(FakeConnector::default());
    let manager = ConnectionManager::with_connector(connector.clone(), EngineConfig::default());
    let pool = ConnectionPool::new(manager, PoolConfig::default());
    let collector = Collector::with_pool(pool.clone());
    let ep = endpoint(1, "10.0.0.1", "cisco");

    collector.collect_version(&ep).await.expect("first");
    collector.collect_mac_table(&ep).await.expect("second");

    assert_eq!(connector.attempts("10.0.0.1"), 1);
    assert_eq!(connector.closed.load(Ordering::SeqCst), 0);
    assert_eq!(pool.stats().await.idle_sessions, 1);

    pool.close_all().await;
    assert_eq!(connector.closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn exhausted_pool_falls_back_to_direct_session_and_closes_it() {
    let connector = Arc::new(FakeConnector::default());
    let manager = ConnectionManager::with_connector(connector.clone(), EngineConfig::default());
    let pool = ConnectionPool::new(
        manager,
        PoolConfig {
            max_connections_per_device: 0,
            ..PoolConfig::default()
        },
    );
    let collector = Collector::with_pool(pool.clone());

    let entries = collector
        .collect_mac_table(&endpoint(1, "10.0.0.1", "cisco"))
        .await
        .expect("mac table");

    assert_eq!(entries.len(), 2);
    assert_eq!(connector.closed.load(Ordering::SeqCst), 1);
    assert_eq!(pool.stats().await.total_sessions, 0);
}

#[tokio::test]
async fn scripts_run_sequentially_on_one_session() {
    let connector = Arc::new(FakeConnector::default());
    collector(connector.clone())
        .execute_command(
            &endpoint(1, "10.0.0.1", "huawei"),
            "system-view ; sysname core-1 ; return",
            None,
        )
        .await
        .expect("script");

    assert_eq!(connector.attempts("10.0.0.1"), 1);
    assert_eq!(connector.sent(), ["system-view", "sysname core-1", "return"]);
}
