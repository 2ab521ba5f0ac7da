use super::*;

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::model::DeviceEndpoint;

/// Upper bound for the pause between connection attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Opens one session for a set of connection parameters, without retrying.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, params: &SessionParams)
    -> Result<Box<dyn TerminalSession>, ConnectError>;
}

/// Dispatches on the login method: SSH, or Telnet for both Telnet and
/// console lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransportConnector;

#[async_trait]
impl Connector for TransportConnector {
    async fn open(
        &self,
        params: &SessionParams,
    ) -> Result<Box<dyn TerminalSession>, ConnectError> {
        match params.login_method {
            LoginMethod::Ssh => Ok(Box::new(SshSession::connect(params).await?)),
            LoginMethod::Telnet | LoginMethod::Console => {
                Ok(Box::new(TelnetSession::connect(params).await?))
            }
        }
    }
}

/// Pause before the attempt following `attempt` (1-based): 2, 4, 8, then 10
/// seconds.
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt)).min(MAX_BACKOFF)
}

/// Opens sessions to devices, retrying transient failures with exponential
/// backoff.
#[derive(Clone)]
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    config: EngineConfig,
}

impl ConnectionManager {
    /// Creates a manager that dials real devices.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_connector(Arc::new(TransportConnector), config)
    }

    pub fn with_connector(connector: Arc<dyn Connector>, config: EngineConfig) -> Self {
        Self { connector, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Resolves dialect, port and security profile for an endpoint.
    pub fn session_params(&self, endpoint: &DeviceEndpoint) -> Result<SessionParams, ConnectError> {
        let (Some(username), Some(password)) = (
            endpoint.username.as_deref().filter(|s| !s.is_empty()),
            endpoint.password.as_deref().filter(|s| !s.is_empty()),
        ) else {
            return Err(ConnectError::MissingCredentials(endpoint.hostname.clone()));
        };
        let vendor = endpoint.vendor();

        Ok(SessionParams {
            device_addr: endpoint.addr(),
            host: endpoint.ip_address.clone(),
            port: endpoint.effective_port(),
            username: username.to_string(),
            password: password.to_string(),
            vendor,
            login_method: endpoint.login_method,
            session_type: vendor.session_type(endpoint.login_method),
            security: ConnectionSecurityOptions::for_level(self.config.security),
            login_timeout: self.config.connect_timeout(),
        })
    }

    /// Connects with the configured number of attempts.
    pub async fn connect(
        &self,
        endpoint: &DeviceEndpoint,
    ) -> Result<Box<dyn TerminalSession>, ConnectError> {
        self.connect_with_retries(endpoint, self.config.max_retries)
            .await
    }

    /// Connects, making up to `max_retries` attempts (at least one).
    ///
    /// Each attempt is bounded by the connect timeout. Authentication failures
    /// return immediately; any other failure backs off and retries. When every
    /// attempt fails the result is a timeout carrying the last failure.
    pub async fn connect_with_retries(
        &self,
        endpoint: &DeviceEndpoint,
        max_retries: u32,
    ) -> Result<Box<dyn TerminalSession>, ConnectError> {
        let params = self.session_params(endpoint)?;
        let attempts = max_retries.max(1);
        let connect_timeout = self.config.connect_timeout();
        let mut last_error = None;

        for attempt in 1..=attempts {
            debug!(
                "{} Connecting as {} (attempt {}/{})",
                params.device_addr, params.session_type, attempt, attempts
            );
            let result = match tokio::time::timeout(connect_timeout, self.connector.open(&params))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(ConnectError::ConnectTimeout(format!(
                    "{} not ready after {:?}",
                    params.device_addr, connect_timeout
                ))),
            };

            match result {
                Ok(session) => {
                    info!("{} Connected ({})", params.device_addr, params.session_type);
                    return Ok(session);
                }
                Err(err) if !err.is_retryable() => {
                    warn!("{} Authentication failed: {}", params.device_addr, err);
                    return Err(err);
                }
                Err(err) => {
                    warn!(
                        "{} Connection attempt {}/{} failed: {}",
                        params.device_addr, attempt, attempts, err
                    );
                    last_error = Some(err);
                    if attempt < attempts {
                        tokio::time::sleep(backoff_delay(attempt)).await;
                    }
                }
            }
        }

        let last_error = last_error.map(|e| e.to_string()).unwrap_or_default();
        Err(ConnectError::ConnectTimeout(format!(
            "{} unreachable after {} attempts: {}",
            params.device_addr, attempts, last_error
        )))
    }
}
