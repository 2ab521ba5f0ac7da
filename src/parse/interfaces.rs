use once_cell::sync::Lazy;
use regex::Regex;

use super::{capture, capture_first, compile, normalize};
use crate::dialect::{Family, Vendor};
use crate::model::InterfaceRecord;

/// Interface name at the start of a line, e.g. `GigabitEthernet1/0/1`,
/// `Vlanif10`, `Eth-Trunk1`, `Port-channel1.100`.
static BLOCK_START: Lazy<Regex> =
    Lazy::new(|| compile(r"^([A-Za-z][A-Za-z-]*\d+(?:[/:.]\d+)*)"));

static CISCO_HEADER: Lazy<Regex> = Lazy::new(|| {
    compile(r"^([A-Za-z][A-Za-z-]*\d+(?:[/:.]\d+)*)\s+is\s+((?:administratively\s+)?\w+)")
});
static CISCO_BANDWIDTH: Lazy<Regex> = Lazy::new(|| compile(r"BW\s+(\d+)\s*Kbit"));

static HUAWEI_CURRENT_STATE: Lazy<Regex> =
    Lazy::new(|| compile(r"^\S+\s+current state\s*:\s*((?:Administratively\s+)?\w+)"));
static HUAWEI_PROTOCOL_STATE: Lazy<Regex> =
    Lazy::new(|| compile(r"(?:Line protocol state|Physical state)\s*:\s*(\w+)"));

static DESCRIPTION: Lazy<Regex> = Lazy::new(|| compile(r"Description:[ \t]*([^\n]*)"));

/// Status words of a `show interfaces status` table.
const CISCO_STATUS_WORDS: &[&str] = &[
    "connected",
    "notconnect",
    "notconnec",
    "disabled",
    "err-disabled",
    "inactive",
    "monitoring",
    "suspended",
    "faulty",
    "sfpAbsent",
    "xcvrAbsen",
    "noOperMem",
];

/// Parses detailed interface output and, when given, overlays the compact
/// status table. Blocks that do not start with an interface header are
/// ignored.
pub fn parse_interfaces(
    output: &str,
    status_output: Option<&str>,
    vendor: Vendor,
) -> Vec<InterfaceRecord> {
    let text = normalize(output);
    let mut interfaces: Vec<InterfaceRecord> = match vendor.family() {
        Family::CiscoLike => blocks(&text).filter_map(cisco_block).collect(),
        Family::HuaweiLike => blocks(&text).filter_map(huawei_block).collect(),
        Family::Other => return Vec::new(),
    };
    if let Some(status) = status_output {
        merge_status_table(&mut interfaces, status, vendor);
    }
    interfaces
}

/// Splits output into blocks, each starting at a line whose first column is
/// an interface name.
fn blocks(text: &str) -> impl Iterator<Item = &str> {
    let mut starts: Vec<usize> = Vec::new();
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if BLOCK_START.is_match(line) {
            starts.push(offset);
        }
        offset += line.len();
    }
    let ends = starts
        .iter()
        .skip(1)
        .copied()
        .chain(std::iter::once(text.len()))
        .collect::<Vec<_>>();
    starts
        .into_iter()
        .zip(ends)
        .map(move |(start, end)| &text[start..end])
}

fn cisco_block(block: &str) -> Option<InterfaceRecord> {
    let caps = CISCO_HEADER.captures(block)?;
    Some(InterfaceRecord {
        port_name: caps[1].to_string(),
        status: caps[2].to_string(),
        description: capture(&DESCRIPTION, block).unwrap_or_default(),
        speed: capture(&CISCO_BANDWIDTH, block)
            .map(|bw| format!("{bw} Kbit"))
            .unwrap_or_default(),
    })
}

fn huawei_block(block: &str) -> Option<InterfaceRecord> {
    let name = capture(&BLOCK_START, block)?;
    let status = capture_first(&[&HUAWEI_CURRENT_STATE, &HUAWEI_PROTOCOL_STATE], block)
        .map(|s| s.to_lowercase())
        .unwrap_or_else(|| "unknown".to_string());
    Some(InterfaceRecord {
        port_name: name,
        status,
        description: capture(&DESCRIPTION, block).unwrap_or_default(),
        speed: String::new(),
    })
}

/// Overwrites coarse up/down status with the status table's value for each
/// row whose port matches an interface.
pub fn merge_status_table(interfaces: &mut [InterfaceRecord], status_output: &str, vendor: Vendor) {
    let rows = match vendor.family() {
        Family::CiscoLike => cisco_status_rows(status_output),
        Family::HuaweiLike => huawei_brief_rows(status_output),
        Family::Other => return,
    };
    for (port, status) in rows {
        if let Some(index) = find_port(interfaces, &port) {
            interfaces[index].status = status;
        }
    }
}

/// `Port Name Status Vlan Duplex Speed Type`. The name column is free text
/// and may be empty, so the status is the last status word on the row.
fn cisco_status_rows(text: &str) -> Vec<(String, String)> {
    text.lines()
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            let port = tokens.next()?;
            if !BLOCK_START.is_match(port) {
                return None;
            }
            let status = tokens
                .filter(|t| CISCO_STATUS_WORDS.contains(t))
                .last()?;
            Some((port.to_string(), status.to_string()))
        })
        .collect()
}

/// `Interface PHY Protocol ...`. `*down` is administratively down; other
/// markers on the PHY column (`^down` standby, `(l)` loopback) are stripped.
fn huawei_brief_rows(text: &str) -> Vec<(String, String)> {
    text.lines()
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            let port = tokens.next()?;
            if !BLOCK_START.is_match(port) {
                return None;
            }
            let phy = tokens.next()?;
            if phy.starts_with("*down") {
                return Some((port.to_string(), "administratively down".to_string()));
            }
            let phy = phy.trim_start_matches(['^', '#']);
            let phy = phy.split('(').next().unwrap_or(phy);
            matches!(phy, "up" | "down").then(|| (port.to_string(), phy.to_string()))
        })
        .collect()
}

/// Index of the interface a status-table port refers to: same name, then
/// abbreviated name (`Gi1/0/1` for `GigabitEthernet1/0/1`), then substring.
fn find_port(interfaces: &[InterfaceRecord], port: &str) -> Option<usize> {
    interfaces
        .iter()
        .position(|i| i.port_name.eq_ignore_ascii_case(port))
        .or_else(|| {
            interfaces
                .iter()
                .position(|i| is_abbreviation(port, &i.port_name))
        })
        .or_else(|| interfaces.iter().position(|i| i.port_name.contains(port)))
}

fn is_abbreviation(short: &str, full: &str) -> bool {
    let split = |name: &str| {
        let at = name.find(|c: char| c.is_ascii_digit()).unwrap_or(name.len());
        (name[..at].to_ascii_lowercase(), name[at..].to_string())
    };
    let (short_kind, short_index) = split(short);
    let (full_kind, full_index) = split(full);
    !short_kind.is_empty() && short_index == full_index && full_kind.starts_with(&short_kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, status: &str) -> InterfaceRecord {
        InterfaceRecord {
            port_name: name.to_string(),
            status: status.to_string(),
            ..InterfaceRecord::default()
        }
    }

    #[test]
    fn cisco_blocks_yield_status_description_and_speed() {
        let text = "GigabitEthernet1/0/1 is up, line protocol is up (connected)\n  \
Hardware is Gigabit Ethernet, address is 0011.2233.4401 (bia 0011.2233.4401)\n  \
Description: Uplink to Core\n  \
MTU 1500 bytes, BW 1000000 Kbit/sec, DLY 10 usec,\n\
GigabitEthernet1/0/2 is administratively down, line protocol is down (disabled)\n  \
MTU 1500 bytes, BW 10000 Kbit/sec, DLY 1000 usec,\n";

        let interfaces = parse_interfaces(text, None, Vendor::CiscoIos);
        assert_eq!(interfaces.len(), 2);
        assert_eq!(interfaces[0].port_name, "GigabitEthernet1/0/1");
        assert_eq!(interfaces[0].status, "up");
        assert_eq!(interfaces[0].description, "Uplink to Core");
        assert_eq!(interfaces[0].speed, "1000000 Kbit");
        assert_eq!(interfaces[1].status, "administratively down");
        assert_eq!(interfaces[1].description, "");
    }

    #[test]
    fn status_table_overrides_coarse_status() {
        let mut interfaces = vec![
            record("GigabitEthernet1/0/1", "up"),
            record("GigabitEthernet1/0/10", "down"),
        ];
        let table = "Port      Name               Status       Vlan       Duplex  Speed Type\n\
Gi1/0/1   Uplink to core     connected    1          a-full a-1000 10/100/1000BaseTX\n\
Gi1/0/10                     notconnect   1            auto   auto 10/100/1000BaseTX\n";

        merge_status_table(&mut interfaces, table, Vendor::CiscoIos);
        assert_eq!(interfaces[0].status, "connected");
        assert_eq!(interfaces[1].status, "notconnect");
    }

    #[test]
    fn substring_match_applies_when_names_differ() {
        let mut interfaces = vec![record("Gi1/0/3-uplink", "up")];
        merge_status_table(&mut interfaces, "Gi1/0/3  err-disabled 1 auto auto", Vendor::CiscoIos);
        assert_eq!(interfaces[0].status, "err-disabled");
    }

    #[test]
    fn huawei_brief_phy_column_is_merged() {
        let mut interfaces = vec![
            record("GigabitEthernet0/0/1", "unknown"),
            record("GigabitEthernet0/0/2", "up"),
            record("GigabitEthernet0/0/3", "up"),
        ];
        let brief = "PHY: Physical\n*down: administratively down\n\
Interface                   PHY   Protocol  InUti OutUti   inErrors  outErrors\n\
GigabitEthernet0/0/1        up    up           0%     0%          0          0\n\
GigabitEthernet0/0/2        *down down         0%     0%          0          0\n\
GigabitEthernet0/0/3        ^down down         0%     0%          0          0\n";

        merge_status_table(&mut interfaces, brief, Vendor::Huawei);
        assert_eq!(interfaces[0].status, "up");
        assert_eq!(interfaces[1].status, "administratively down");
        assert_eq!(interfaces[2].status, "down");
    }

    #[test]
    fn empty_output_is_empty_list() {
        assert!(parse_interfaces("", Some("Gi1/0/1 connected"), Vendor::CiscoIos).is_empty());
        assert!(parse_interfaces("ge-0/0/0 up", None, Vendor::Juniper).is_empty());
    }
}
