use once_cell::sync::Lazy;
use regex::Regex;

use super::compile;
use crate::dialect::{Family, Vendor};
use crate::model::{AddressType, MacTableEntry};

/// `vlan mac type ... port`. The port is the last column; NX-OS puts age and
/// flag columns before it and prefixes rows with `*`.
static CISCO_ROW: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"^[\s*+]*(\d+)\s+([0-9A-Fa-f]{4}\.[0-9A-Fa-f]{4}\.[0-9A-Fa-f]{4}|(?:[0-9A-Fa-f]{2}[:-]){5}[0-9A-Fa-f]{2})\s+(\S+)\s+.*?(\S+)\s*$",
    )
});

/// `mac vlan/vsi port type`. VRP V200 inserts PEVLAN and CEVLAN columns,
/// usually `-`, before the port.
static HUAWEI_ROW: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"^\s*([0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4})\s+(\d+)(?:/\S*)?\s+(?:-\s+)*(\S+)\s+(\w+)",
    )
});

/// Comware `mac vlan state port aging`. The state column replaces the type
/// column and sits before the port.
static COMWARE_ROW: Lazy<Regex> = Lazy::new(|| {
    compile(
        r"(?i)^\s*([0-9A-Fa-f]{4}-[0-9A-Fa-f]{4}-[0-9A-Fa-f]{4})\s+(\d+)\s+(Learned|Config(?:\s+(?:static|dynamic|multiport))?|Security|Blackhole|Mac-move|Sticky|Static|Dynamic)\s+(\S+)",
    )
});

/// Parses a MAC address table. Header, separator and summary lines are
/// skipped because they do not match the row grammar. MAC tokens keep their
/// original separators and case.
pub fn parse_mac_table(output: &str, vendor: Vendor) -> Vec<MacTableEntry> {
    let row: fn(&str) -> Option<MacTableEntry> = match vendor.family() {
        Family::CiscoLike => cisco_row,
        Family::HuaweiLike => huawei_row,
        Family::Other => return Vec::new(),
    };
    output.lines().filter_map(row).collect()
}

fn cisco_row(line: &str) -> Option<MacTableEntry> {
    let caps = CISCO_ROW.captures(line.trim_end())?;
    Some(MacTableEntry {
        vlan_id: caps[1].parse().ok()?,
        mac_address: caps[2].to_string(),
        address_type: AddressType::from_label(&caps[3]),
        interface: caps[4].to_string(),
    })
}

fn huawei_row(line: &str) -> Option<MacTableEntry> {
    if let Some(caps) = COMWARE_ROW.captures(line.trim_end()) {
        return Some(MacTableEntry {
            mac_address: caps[1].to_string(),
            vlan_id: caps[2].parse().ok()?,
            interface: caps[4].to_string(),
            address_type: state_type(&caps[3]),
        });
    }
    let caps = HUAWEI_ROW.captures(line.trim_end())?;
    Some(MacTableEntry {
        mac_address: caps[1].to_string(),
        vlan_id: caps[2].parse().ok()?,
        interface: caps[3].to_string(),
        address_type: AddressType::from_label(&caps[4]),
    })
}

/// Learned and `Config dynamic` entries age out; everything else is static.
fn state_type(state: &str) -> AddressType {
    let state = state.to_ascii_lowercase();
    if state.starts_with("learned") || state.ends_with("dynamic") {
        AddressType::Dynamic
    } else {
        AddressType::Static
    }
}
