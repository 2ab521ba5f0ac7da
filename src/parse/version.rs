use once_cell::sync::Lazy;
use regex::Regex;

use super::{capture, capture_first, compile, normalize};
use crate::dialect::{Family, Vendor};
use crate::model::VersionRecord;

static CISCO_RELEASE_VERSION: Lazy<Regex> =
    Lazy::new(|| compile(r"(?i)Version\s+([^\s,]+),\s*RELEASE"));
static CISCO_BARE_VERSION: Lazy<Regex> = Lazy::new(|| compile(r"(?i)Version\s+([^\s,\n]+)"));
static CISCO_IMAGE: Lazy<Regex> = Lazy::new(|| compile(r#"System image file is\s+"?([^"\n]+)"?"#));
static CISCO_HARDWARE: Lazy<Regex> = Lazy::new(|| compile(r"Hardware is\s+([^\n]+)"));
static CISCO_CHASSIS: Lazy<Regex> =
    Lazy::new(|| compile(r"(?mi)^cisco\s+(\S+)\s.*(?:processor|bytes of memory)"));
static CISCO_BOOT: Lazy<Regex> = Lazy::new(|| compile(r"(?m)^(?:ROM|BOOTLDR):\s+([^\n]+)"));
static CISCO_UPTIME: Lazy<Regex> = Lazy::new(|| compile(r"uptime is\s+([^\n]+)"));

static HUAWEI_VERSION: Lazy<Regex> = Lazy::new(|| compile(r"Version\s+([^\s\n]+)"));
static HUAWEI_VRP_VERSION: Lazy<Regex> = Lazy::new(|| compile(r"VRP.*Version\s+([^\s\n]+)"));
static HUAWEI_HARDWARE: Lazy<Regex> = Lazy::new(|| compile(r"Hardware Version\s+([^\s\n]+)"));
static HUAWEI_BOOT: Lazy<Regex> =
    Lazy::new(|| compile(r"(?i)Bootrom\s+Version\s*:?\s*([^\s\n]+)"));
static HUAWEI_IMAGE: Lazy<Regex> = Lazy::new(|| compile(r"Software Name\s+([^\s\n]+)"));
static HUAWEI_UPTIME: Lazy<Regex> = Lazy::new(|| compile(r"(?i)uptime is\s+([^\n]+)"));

static RUIJIE_VERSION: Lazy<Regex> =
    Lazy::new(|| compile(r"Software Version\s*:?\s*([^\n]+)"));
static RUIJIE_IMAGE: Lazy<Regex> = Lazy::new(|| compile(r"Boot image\s*:?\s*([^\s\n]+)"));
static RUIJIE_UPTIME: Lazy<Regex> = Lazy::new(|| compile(r"System uptime\s*:?\s*([^\n]+)"));

/// Extracts version facts from version-command output. `collected_at` is
/// left for the caller to stamp.
pub fn parse_version(output: &str, vendor: Vendor) -> VersionRecord {
    let text = normalize(output);
    if text.trim().is_empty() {
        return VersionRecord::default();
    }
    match (vendor, vendor.family()) {
        (Vendor::Ruijie, _) => parse_ruijie(&text),
        (_, Family::CiscoLike) => parse_cisco(&text),
        (_, Family::HuaweiLike) => parse_huawei(&text),
        (_, Family::Other) => VersionRecord::default(),
    }
}

fn parse_cisco(text: &str) -> VersionRecord {
    VersionRecord {
        software_version: capture_first(&[&CISCO_RELEASE_VERSION, &CISCO_BARE_VERSION], text),
        hardware_version: capture_first(&[&CISCO_HARDWARE, &CISCO_CHASSIS], text),
        boot_version: capture(&CISCO_BOOT, text),
        system_image: capture(&CISCO_IMAGE, text),
        uptime: capture(&CISCO_UPTIME, text),
        collected_at: None,
    }
}

fn parse_huawei(text: &str) -> VersionRecord {
    VersionRecord {
        software_version: capture_first(&[&HUAWEI_VERSION, &HUAWEI_VRP_VERSION], text),
        hardware_version: capture(&HUAWEI_HARDWARE, text),
        boot_version: capture(&HUAWEI_BOOT, text),
        system_image: capture(&HUAWEI_IMAGE, text),
        uptime: capture(&HUAWEI_UPTIME, text),
        collected_at: None,
    }
}

fn parse_ruijie(text: &str) -> VersionRecord {
    VersionRecord {
        software_version: capture(&RUIJIE_VERSION, text),
        system_image: capture(&RUIJIE_IMAGE, text),
        uptime: capture(&RUIJIE_UPTIME, text),
        ..VersionRecord::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IOS: &str = "Cisco IOS Software, C3750 Software (C3750-IPSERVICESK9-M), Version 15.0(2)SE11, RELEASE SOFTWARE (fc3)\r\n\
Technical Support: http://www.cisco.com/techsupport\r\n\
ROM: Bootstrap program is C3750 boot loader\r\n\
sw1 uptime is 1 year, 2 weeks, 3 days, 4 hours, 5 minutes\r\n\
System image file is \"flash:/c3750-ipservicesk9-mz.150-2.SE11.bin\"\r\n\
cisco WS-C3750X-48P (PowerPC405) processor (revision A0) with 262144K bytes of memory.\r\n\
Processor board ID FDO1234X5YZ\r\n";

    #[test]
    fn cisco_release_line_yields_bare_version() {
        let record = parse_version(IOS, Vendor::CiscoIos);
        assert_eq!(record.software_version.as_deref(), Some("15.0(2)SE11"));
        assert_eq!(
            record.system_image.as_deref(),
            Some("flash:/c3750-ipservicesk9-mz.150-2.SE11.bin")
        );
        assert_eq!(record.hardware_version.as_deref(), Some("WS-C3750X-48P"));
        assert_eq!(
            record.boot_version.as_deref(),
            Some("Bootstrap program is C3750 boot loader")
        );
        assert_eq!(
            record.uptime.as_deref(),
            Some("1 year, 2 weeks, 3 days, 4 hours, 5 minutes")
        );
        assert!(record.collected_at.is_none());
    }

    #[test]
    fn cisco_without_release_label_uses_bare_token() {
        let record = parse_version("Cisco IOS XE Software, Version 17.03.05\n", Vendor::CiscoIos);
        assert_eq!(record.software_version.as_deref(), Some("17.03.05"));
        assert!(record.uptime.is_none());
    }

    #[test]
    fn ruijie_labels() {
        let text = "System description      : Ruijie Gigabit Security & Intelligence Access Switch\n\
System uptime           : 6:03:27:51\n\
Software Version        : RGOS 10.4(3b19)p2\n\
Boot image              : 10.4.3\n";
        let record = parse_version(text, Vendor::Ruijie);
        assert_eq!(record.software_version.as_deref(), Some("RGOS 10.4(3b19)p2"));
        assert_eq!(record.system_image.as_deref(), Some("10.4.3"));
        assert_eq!(record.uptime.as_deref(), Some("6:03:27:51"));
    }

    #[test]
    fn empty_or_unknown_family_is_empty_record() {
        assert!(parse_version("", Vendor::Huawei).is_empty());
        assert!(parse_version("JUNOS 18.4R3", Vendor::Juniper).is_empty());
    }
}
