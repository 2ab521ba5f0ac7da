//! Interactive terminal sessions to network devices.
//!
//! A [`TerminalSession`] is one live CLI shell opened over SSH, Telnet or a
//! console server. Both transports feed the same [`Shell`] read loop, which
//! sends a command and reads until a prompt (or an explicit expect pattern)
//! shows up, answering pagination prompts on the way.
//!
//! # Main Components
//!
//! - [`ConnectionManager`] - Opens sessions with retry and backoff
//! - [`SshSession`] / [`TelnetSession`] - Transport implementations
//! - [`Output`] - Command execution results

use std::borrow::Cow;
use std::time::Duration;

use async_ssh2_tokio::client::{AuthMethod, Client};
use async_ssh2_tokio::{Config, ServerCheckMethod};
use async_trait::async_trait;
use log::{debug, info, trace, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use russh::{ChannelMsg, Preferred};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, Receiver, Sender};

use crate::config;
use crate::dialect::Vendor;
use crate::error::ConnectError;
use crate::model::LoginMethod;
use crate::prompt::{IGNORE_START_LINE, PromptMatcher};

pub use manager::{ConnectionManager, Connector, TransportConnector, backoff_delay};
pub use security::{ConnectionSecurityOptions, SecurityLevel};
pub use shell::Shell;
pub use ssh::SshSession;
pub use telnet::{TelnetDecoder, TelnetSession};

/// The output result of a command execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Output {
    /// No error line was seen while reading the response.
    pub success: bool,
    /// Response with the echoed command and trailing prompt removed.
    pub content: String,
    /// Everything read, including echo and prompt.
    pub all: String,
    /// Prompt seen after the command completed.
    pub prompt: Option<String>,
}

/// Connection facts a transport needs to open a session.
#[derive(Debug, Clone)]
pub struct SessionParams {
    /// `user@host:port`
    pub device_addr: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub vendor: Vendor,
    pub login_method: LoginMethod,
    /// Device type with transport suffix, e.g. `huawei_telnet`.
    pub session_type: String,
    pub security: ConnectionSecurityOptions,
    /// Budget for login and initial prompt, enforced by the transport.
    pub login_timeout: Duration,
}

/// One live interactive CLI connection to a device.
///
/// A session is used by one caller at a time and must be closed explicitly.
#[async_trait]
pub trait TerminalSession: Send {
    /// `user@host:port` of the remote end.
    fn device_addr(&self) -> &str;

    /// Whether the underlying transport is still open.
    fn is_connected(&self) -> bool;

    /// Sends `command` and reads until `expect` matches the received text, or
    /// until the dialect's prompt appears when `expect` is `None`.
    async fn send_command(
        &mut self,
        command: &str,
        expect: Option<&Regex>,
        timeout: Duration,
    ) -> Result<Output, ConnectError>;

    /// Logs out and releases the transport.
    async fn close(&mut self) -> Result<(), ConnectError>;
}

mod manager;
mod security;
mod shell;
mod ssh;
mod telnet;
