//! Command execution over an open session.
//!
//! A command is sent with one of three read strategies: an explicit expect
//! pattern from the caller, configuration mode (read until a configuration
//! view prompt, falling back to any prompt), or a plain query that stops at
//! the dialect's prompt.

use std::time::Duration;

use log::{debug, warn};
use regex::Regex;

use crate::dialect::Vendor;
use crate::error::ConnectError;
use crate::session::TerminalSession;

/// Words that mark a command as changing device configuration.
pub const CONFIG_KEYWORDS: &[&str] = &[
    "system-view",
    "sysname",
    "interface",
    "vlan",
    "ip address",
    "route",
    "acl",
    "commit",
    "quit",
    "return",
    "undo",
    "description",
    "shutdown",
];

/// Leading words of read-only commands. They never run in configuration mode,
/// even when their arguments mention a configuration keyword.
const QUERY_PREFIXES: &[&str] = &["show ", "display ", "ping ", "traceroute ", "tracert "];

/// Commands that may leave configuration mode.
const VIEW_EXIT_COMMANDS: &[&str] = &["quit", "return", "end", "exit"];

/// Separator between commands of a script.
pub const SCRIPT_SEPARATOR: char = ';';

/// How a command's response is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Read until the caller's pattern matches.
    Expect,
    /// Read until a configuration prompt, without leaving configuration mode.
    Config,
    /// Read until the dialect's prompt.
    Query,
}

/// A command is a configuration command when it contains one of
/// [`CONFIG_KEYWORDS`]. Commands starting with a read-only verb (`show`,
/// `display`, `ping`, `traceroute`, `tracert`) are queries regardless, so
/// `display interface brief` is read at the normal prompt.
pub fn is_config_command(command: &str) -> bool {
    let cmd = command.trim().to_ascii_lowercase();
    if QUERY_PREFIXES.iter().any(|prefix| cmd.starts_with(prefix)) {
        return false;
    }
    CONFIG_KEYWORDS.iter().any(|keyword| cmd.contains(keyword))
}

pub fn strategy_for(command: &str, expect_pattern: Option<&str>) -> Strategy {
    if expect_pattern.is_some() {
        Strategy::Expect
    } else if is_config_command(command) {
        Strategy::Config
    } else {
        Strategy::Query
    }
}

/// Splits `a ; b ; c` into commands, dropping empty pieces.
pub fn split_script(script: &str) -> Vec<String> {
    script
        .split(SCRIPT_SEPARATOR)
        .map(str::trim)
        .filter(|cmd| !cmd.is_empty())
        .map(str::to_string)
        .collect()
}

fn compile(pattern: &str) -> Result<Regex, ConnectError> {
    Regex::new(pattern)
        .map_err(|err| ConnectError::InvalidPattern(format!("'{pattern}': {err}")))
}

/// Sends one command and returns its raw output.
///
/// Output that contains a device error message is still returned; empty
/// output is a valid result.
pub async fn execute(
    session: &mut dyn TerminalSession,
    command: &str,
    vendor: Vendor,
    expect_pattern: Option<&str>,
    read_timeout: Duration,
) -> Result<String, ConnectError> {
    let prompts = vendor.prompts();
    let strategy = strategy_for(command, expect_pattern);
    debug!(
        "{} Executing '{}' as {:?}",
        session.device_addr(),
        command,
        strategy
    );

    let output = match (strategy, expect_pattern) {
        (Strategy::Expect, Some(pattern)) => {
            let expect = compile(pattern)?;
            session
                .send_command(command, Some(&expect), read_timeout)
                .await?
        }
        (Strategy::Config, _) => {
            let any_view = compile(&prompts.any_view_pattern())?;
            let leaves_view = VIEW_EXIT_COMMANDS
                .iter()
                .any(|exit| command.trim().eq_ignore_ascii_case(exit));
            let config_view = if leaves_view {
                any_view.clone()
            } else {
                compile(&prompts.config_pattern())?
            };

            match session
                .send_command(command, Some(&config_view), read_timeout)
                .await
            {
                Ok(output) => output,
                Err(err) if session.is_connected() && err.is_retryable() => {
                    warn!(
                        "{} '{}' did not reach a configuration prompt ({}), retrying as query",
                        session.device_addr(),
                        command,
                        err
                    );
                    session
                        .send_command(command, Some(&any_view), read_timeout)
                        .await?
                }
                Err(err) => return Err(err),
            }
        }
        _ => session.send_command(command, None, read_timeout).await?,
    };

    if !output.success {
        warn!(
            "{} Device reported an error for '{}'",
            session.device_addr(),
            command
        );
    }
    Ok(output.content)
}

/// Runs commands in order on one session and joins their outputs with
/// newlines. Configuration mode entered by one command carries over to the
/// next. Stops at the first failing command.
pub async fn execute_script(
    session: &mut dyn TerminalSession,
    commands: &[String],
    vendor: Vendor,
    read_timeout: Duration,
) -> Result<String, ConnectError> {
    let mut outputs = Vec::with_capacity(commands.len());
    for command in commands {
        outputs.push(execute(session, command, vendor, None, read_timeout).await?);
    }
    Ok(outputs.join("\n"))
}
