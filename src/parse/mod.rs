//! Text parsers for device command output.
//!
//! Parsers are total: a field that cannot be extracted stays unset, and
//! output that yields nothing produces an empty record or collection. The
//! vendor family picks the grammar; vendors outside the Cisco and Huawei
//! families have no parser and yield empty results.

mod interfaces;
mod mac;
mod serial;
mod version;

use once_cell::sync::Lazy;
use regex::Regex;

pub use interfaces::{merge_status_table, parse_interfaces};
pub use mac::parse_mac_table;
pub use serial::{serial_from_inventory, serial_from_version};
pub use version::parse_version;

/// Compiles a constant pattern.
fn compile(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(re) => re,
        Err(err) => panic!("invalid parser regex {pattern:?}: {err}"),
    }
}

/// First capture group of the first match, trimmed. Empty captures count as
/// no match.
fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Tries each pattern in order.
fn capture_first(patterns: &[&Lazy<Regex>], text: &str) -> Option<String> {
    patterns.iter().find_map(|re| capture(re, text))
}

/// Normalizes line endings so `$` and `[^\n]` behave on CRLF output.
fn normalize(output: &str) -> String {
    output.replace("\r\n", "\n").replace('\r', "")
}
