//! Error types for device sessions, command execution, scheduling and backups.
//!
//! Connection and command failures are reported as [`ConnectError`]. Each
//! variant belongs to exactly one [`ErrorKind`], which is what retry logic and
//! callers branch on. Parse problems are never errors: parsers leave fields
//! unset instead.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::error::SendError;

/// Coarse classification of a [`ConnectError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Wrong credentials or locked account. Never retried.
    Authentication,
    /// Connect or read budget exceeded.
    Timeout,
    /// Transport failure other than timeout or authentication.
    Protocol,
    /// Anything else.
    Unknown,
}

/// Errors that can occur while connecting to a device or running commands on it.
#[derive(Error, Debug)]
pub enum ConnectError {
    /// The device rejected the supplied credentials.
    #[error("authentication failed for {0}")]
    AuthenticationFailed(String),

    /// The endpoint has no username or password configured.
    #[error("device {0} missing credentials")]
    MissingCredentials(String),

    /// Establishing the connection (TCP, handshake, login, first prompt)
    /// did not finish within the connect timeout.
    #[error("connect timeout: {0}")]
    ConnectTimeout(String),

    /// Command execution timed out.
    ///
    /// The error contains the partial output received before the timeout.
    #[error("exec command timeout: {0}")]
    ExecTimeout(String),

    /// The shell channel was closed while waiting for a prompt.
    #[error("channel disconnect on wait prompt")]
    ChannelDisconnectError,

    /// The session has already been closed.
    #[error("connect closed")]
    ConnectClosedError,

    /// The remote side violated the expected terminal protocol.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// A prompt or expect pattern could not be compiled.
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    /// An error occurred in the async-ssh2-tokio library.
    #[error("async ssh2 error: {0}")]
    Ssh2Error(#[from] async_ssh2_tokio::Error),

    /// An error occurred in the russh library.
    #[error("russh error: {0}")]
    RusshError(#[from] russh::Error),

    /// Socket level failure on a telnet or console link.
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to hand data to the shell I/O task.
    #[error("Failed to send data: {0}")]
    SendDataError(#[from] SendError<String>),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl ConnectError {
    /// Returns the retry-relevant classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConnectError::AuthenticationFailed(_) | ConnectError::MissingCredentials(_) => {
                ErrorKind::Authentication
            }
            ConnectError::ConnectTimeout(_) | ConnectError::ExecTimeout(_) => ErrorKind::Timeout,
            ConnectError::Ssh2Error(async_ssh2_tokio::Error::PasswordWrong) => {
                ErrorKind::Authentication
            }
            ConnectError::IoError(err) if err.kind() == std::io::ErrorKind::TimedOut => {
                ErrorKind::Timeout
            }
            ConnectError::ChannelDisconnectError
            | ConnectError::ConnectClosedError
            | ConnectError::ProtocolError(_)
            | ConnectError::Ssh2Error(_)
            | ConnectError::RusshError(_)
            | ConnectError::IoError(_)
            | ConnectError::SendDataError(_) => ErrorKind::Protocol,
            ConnectError::InvalidPattern(_) | ConnectError::InternalError(_) => ErrorKind::Unknown,
        }
    }

    /// Authentication failures stop the retry loop immediately.
    pub fn is_retryable(&self) -> bool {
        self.kind() != ErrorKind::Authentication
    }
}

/// Errors raised while turning a backup descriptor into a trigger.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("unknown cadence '{0}'")]
    UnknownCadence(String),

    #[error("invalid time of day '{0}', expected HH:MM")]
    InvalidTime(String),

    #[error("invalid day of month {0}, expected 1-31")]
    InvalidDay(u32),

    #[error("invalid cron expression '{expr}': {message}")]
    InvalidCron { expr: String, message: String },
}

/// Errors raised by the configuration backup workflow.
#[derive(Error, Debug)]
pub enum BackupError {
    #[error("device {0} not found")]
    DeviceNotFound(u64),

    #[error("collect running config failed: {0}")]
    Collect(#[from] ConnectError),

    #[error("device {0} returned an empty configuration")]
    EmptyConfig(String),

    #[error("archive commit failed: {0}")]
    Archive(String),

    #[error("snapshot store failed: {0}")]
    Store(String),
}
