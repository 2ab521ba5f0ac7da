//! Vendor dialect registry.
//!
//! Maps free-text vendor names (English or localized, any case) onto a closed
//! [`Vendor`] set, and gives each vendor its device-type identifier, command
//! table and prompt conventions. Resolution is total: anything unrecognized
//! becomes [`DEFAULT_VENDOR`].

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::model::LoginMethod;

/// Supported device vendors and platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Vendor {
    CiscoIos,
    CiscoNxos,
    CiscoAsa,
    Huawei,
    H3c,
    Ruijie,
    Juniper,
    Arista,
    Zte,
}

/// Vendor used for empty or unrecognized names.
pub const DEFAULT_VENDOR: Vendor = Vendor::CiscoIos;

/// Vendors sharing CLI layout, prompts and parsers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    /// `host>` / `host#` / `host(config)#`
    CiscoLike,
    /// `<host>` / `[host]`
    HuaweiLike,
    /// No dedicated parsers.
    Other,
}

/// Vendor name aliases, matched after trimming and lowercasing.
const VENDOR_ALIASES: &[(&str, Vendor)] = &[
    ("cisco", Vendor::CiscoIos),
    ("cisco_ios", Vendor::CiscoIos),
    ("思科", Vendor::CiscoIos),
    ("cisco_nxos", Vendor::CiscoNxos),
    ("cisco_asa", Vendor::CiscoAsa),
    ("huawei", Vendor::Huawei),
    ("华为", Vendor::Huawei),
    ("h3c", Vendor::H3c),
    ("hp_comware", Vendor::H3c),
    ("华三", Vendor::H3c),
    ("ruijie", Vendor::Ruijie),
    ("ruijie_os", Vendor::Ruijie),
    ("锐捷", Vendor::Ruijie),
    ("juniper", Vendor::Juniper),
    ("juniper_junos", Vendor::Juniper),
    ("arista", Vendor::Arista),
    ("arista_eos", Vendor::Arista),
    ("zte", Vendor::Zte),
    ("中兴", Vendor::Zte),
];

impl Vendor {
    /// Resolves a vendor name. Never fails.
    pub fn resolve(name: &str) -> Vendor {
        let key = name.trim().to_lowercase();
        if key.is_empty() {
            return DEFAULT_VENDOR;
        }
        if let Some((_, vendor)) = VENDOR_ALIASES.iter().find(|(alias, _)| *alias == key) {
            return *vendor;
        }
        if key.starts_with("cisco") {
            return Vendor::CiscoIos;
        }
        DEFAULT_VENDOR
    }

    /// Normalized device-type identifier.
    pub fn device_type(&self) -> &'static str {
        match self {
            Vendor::CiscoIos => "cisco_ios",
            Vendor::CiscoNxos => "cisco_nxos",
            Vendor::CiscoAsa => "cisco_asa",
            Vendor::Huawei | Vendor::Zte => "huawei",
            Vendor::H3c => "hp_comware",
            Vendor::Ruijie => "ruijie_os",
            Vendor::Juniper => "juniper_junos",
            Vendor::Arista => "arista_eos",
        }
    }

    /// Device type qualified by transport, e.g. `huawei_telnet`.
    pub fn session_type(&self, method: LoginMethod) -> String {
        match method {
            LoginMethod::Ssh => self.device_type().to_string(),
            LoginMethod::Telnet => format!("{}_telnet", self.device_type()),
            LoginMethod::Console => format!("{}_serial", self.device_type()),
        }
    }

    pub fn family(&self) -> Family {
        match self {
            Vendor::CiscoIos
            | Vendor::CiscoNxos
            | Vendor::CiscoAsa
            | Vendor::Ruijie
            | Vendor::Arista => Family::CiscoLike,
            Vendor::Huawei | Vendor::H3c | Vendor::Zte => Family::HuaweiLike,
            Vendor::Juniper => Family::Other,
        }
    }

    /// Command table; vendors without their own table use Cisco's.
    pub fn commands(&self) -> &'static CommandTable {
        match self {
            Vendor::Huawei | Vendor::Zte => &HUAWEI_COMMANDS,
            Vendor::H3c => &H3C_COMMANDS,
            Vendor::Ruijie => &RUIJIE_COMMANDS,
            _ => &CISCO_COMMANDS,
        }
    }

    pub fn command(&self, kind: CommandKind) -> &'static str {
        self.commands().get(kind)
    }

    pub fn prompts(&self) -> &'static PromptPatterns {
        match self.family() {
            Family::CiscoLike => &CISCO_PROMPTS,
            Family::HuaweiLike => &HUAWEI_PROMPTS,
            Family::Other => &GENERIC_PROMPTS,
        }
    }
}

/// Commands a dialect knows how to issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Version,
    Interfaces,
    InterfacesStatus,
    MacTable,
    Inventory,
    RunningConfig,
}

impl CommandKind {
    pub fn from_label(label: &str) -> Option<CommandKind> {
        match label.trim().to_ascii_lowercase().as_str() {
            "version" => Some(CommandKind::Version),
            "interfaces" => Some(CommandKind::Interfaces),
            "interfaces_status" => Some(CommandKind::InterfacesStatus),
            "mac_table" => Some(CommandKind::MacTable),
            "inventory" => Some(CommandKind::Inventory),
            "running_config" => Some(CommandKind::RunningConfig),
            _ => None,
        }
    }
}

/// Per-vendor command strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTable {
    pub version: &'static str,
    pub interfaces: &'static str,
    pub interfaces_status: &'static str,
    pub mac_table: &'static str,
    pub inventory: &'static str,
    pub running_config: &'static str,
}

impl CommandTable {
    pub fn get(&self, kind: CommandKind) -> &'static str {
        match kind {
            CommandKind::Version => self.version,
            CommandKind::Interfaces => self.interfaces,
            CommandKind::InterfacesStatus => self.interfaces_status,
            CommandKind::MacTable => self.mac_table,
            CommandKind::Inventory => self.inventory,
            CommandKind::RunningConfig => self.running_config,
        }
    }
}

pub static CISCO_COMMANDS: CommandTable = CommandTable {
    version: "show version",
    interfaces: "show interfaces",
    interfaces_status: "show interfaces status",
    mac_table: "show mac address-table",
    inventory: "show inventory",
    running_config: "show running-config",
};

pub static HUAWEI_COMMANDS: CommandTable = CommandTable {
    version: "display version",
    interfaces: "display interface",
    interfaces_status: "display interface brief",
    mac_table: "display mac-address",
    inventory: "display elabel",
    running_config: "display current-configuration",
};

pub static H3C_COMMANDS: CommandTable = CommandTable {
    version: "display version",
    interfaces: "display interface",
    interfaces_status: "display interface brief",
    mac_table: "display mac-address",
    inventory: "display device",
    running_config: "display current-configuration",
};

pub static RUIJIE_COMMANDS: CommandTable = CommandTable {
    version: "show version",
    interfaces: "show interface",
    interfaces_status: "show interface status",
    mac_table: "show mac-address-table",
    inventory: "show inventory",
    running_config: "show running-config",
};

/// Prompt and terminal conventions of a vendor family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPatterns {
    /// Unprivileged / user-view prompts.
    pub user: &'static [&'static str],
    /// System-view or configuration-mode prompts.
    pub config: &'static [&'static str],
    /// Pagination markers answered with a space.
    pub more: &'static [&'static str],
    /// Lines that mark a rejected command.
    pub error: &'static [&'static str],
    /// Sent once after login.
    pub disable_paging: &'static str,
    /// Leaves the CLI before the transport is dropped.
    pub logout: &'static str,
}

impl PromptPatterns {
    /// Single alternation matching a configuration prompt at end of text.
    pub fn config_pattern(&self) -> String {
        alternation(self.config.iter())
    }

    /// Single alternation matching any prompt view at end of text.
    pub fn any_view_pattern(&self) -> String {
        alternation(self.user.iter().chain(self.config.iter()))
    }
}

fn alternation<'a>(patterns: impl Iterator<Item = &'a &'static str>) -> String {
    let body = patterns
        .map(|p| format!("(?:{})", p.trim_start_matches('^').trim_end_matches('$')))
        .collect::<Vec<_>>()
        .join("|");
    format!(r"(?m)^(?:{body})\s*$")
}

pub static CISCO_PROMPTS: PromptPatterns = PromptPatterns {
    user: &[r"^[^\s<#>]+>\s*$", r"^[^\s#()]+#\s*$"],
    config: &[r"^[^\s#()]+\([^)\s]*\)#\s*$"],
    more: &[r"\s*--More--\s*", r"\s*<--- More --->\s*"],
    error: &[
        r"% Invalid input detected at '\^' marker\.",
        r"% Invalid command at '\^' marker\.",
        r"% Incomplete command\.",
        r"% Ambiguous command",
        r"^Command authorization failed.*",
        r"^Command rejected:.*",
    ],
    disable_paging: "terminal length 0",
    logout: "exit",
};

pub static HUAWEI_PROMPTS: PromptPatterns = PromptPatterns {
    user: &[r"^(?:RBM_P|RBM_S)?<[^<>\s]+>\s*$"],
    config: &[r"^(?:HRP_M|HRP_S|RBM_P|RBM_S)?\[[^\[\]\s]+\]\s*$"],
    more: &[r"\s*---- More ----\s*"],
    error: &[
        r"^Error: .+$",
        r"Unrecognized command found at '\^' position\.",
        r"Incomplete command found at '\^' position\.",
        r"% Unrecognized command found at '\^' position\.",
    ],
    disable_paging: "screen-length 0 temporary",
    logout: "quit",
};

pub static GENERIC_PROMPTS: PromptPatterns = PromptPatterns {
    user: &[r"^[\w.@-]+[>%$]\s*$"],
    config: &[r"^[\w.@-]+(?:\([^)]*\))?#\s*$"],
    more: &[r"\s*---\(more\)---\s*", r"\s*--More--\s*"],
    error: &[r"^(?:error|syntax error|unknown command).*"],
    disable_paging: "",
    logout: "exit",
};

/// Normalized device type for a vendor string. Unknown or empty input yields
/// `cisco_ios`.
pub fn resolve_device_type(vendor: &str) -> &'static str {
    Vendor::resolve(vendor).device_type()
}

/// Command string for a vendor and command kind label. Unknown kinds yield
/// an empty string, which callers treat as "unsupported".
pub fn command_for(vendor: &str, kind: &str) -> &'static str {
    match CommandKind::from_label(kind) {
        Some(kind) => Vendor::resolve(vendor).command(kind),
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn known_spellings_resolve_to_stable_identifiers() {
        let cases = [
            ("cisco", "cisco_ios"),
            ("Cisco", "cisco_ios"),
            ("  CISCO_IOS ", "cisco_ios"),
            ("cisco_nxos", "cisco_nxos"),
            ("huawei", "huawei"),
            ("华为", "huawei"),
            ("h3c", "hp_comware"),
            ("H3C", "hp_comware"),
            ("华三", "hp_comware"),
            ("ruijie", "ruijie_os"),
            ("锐捷", "ruijie_os"),
            ("juniper", "juniper_junos"),
            ("arista", "arista_eos"),
            ("zte", "huawei"),
            ("中兴", "huawei"),
        ];
        for (name, expected) in cases {
            assert_eq!(resolve_device_type(name), expected, "vendor {name}");
            assert_eq!(resolve_device_type(name), resolve_device_type(name));
        }
    }

    #[test]
    fn unknown_or_empty_vendor_uses_default() {
        assert_eq!(resolve_device_type(""), "cisco_ios");
        assert_eq!(resolve_device_type("   "), "cisco_ios");
        assert_eq!(resolve_device_type("acme-switch"), "cisco_ios");
        assert_eq!(Vendor::resolve("cisco_xe"), Vendor::CiscoIos);
    }

    #[test]
    fn command_lookup_falls_back_to_cisco_table() {
        assert_eq!(command_for("huawei", "version"), "display version");
        assert_eq!(command_for("华为", "running_config"), "display current-configuration");
        assert_eq!(command_for("h3c", "inventory"), "display device");
        assert_eq!(command_for("ruijie", "mac_table"), "show mac-address-table");
        assert_eq!(command_for("acme", "mac_table"), "show mac address-table");
        assert_eq!(command_for("juniper", "version"), "show version");
    }

    #[test]
    fn unknown_command_kind_is_empty() {
        assert_eq!(command_for("cisco", "serial"), "");
        assert_eq!(command_for("huawei", "bogus"), "");
    }

    #[test]
    fn session_type_carries_transport_suffix() {
        assert_eq!(Vendor::Huawei.session_type(LoginMethod::Ssh), "huawei");
        assert_eq!(Vendor::Huawei.session_type(LoginMethod::Telnet), "huawei_telnet");
        assert_eq!(Vendor::CiscoIos.session_type(LoginMethod::Console), "cisco_ios_serial");
    }

    #[test]
    fn families_group_vendors() {
        assert_eq!(Vendor::Ruijie.family(), Family::CiscoLike);
        assert_eq!(Vendor::H3c.family(), Family::HuaweiLike);
        assert_eq!(Vendor::Juniper.family(), Family::Other);
    }

    #[test]
    fn huawei_prompt_patterns_distinguish_views() {
        let prompts = Vendor::Huawei.prompts();
        let config = Regex::new(&prompts.config_pattern()).expect("config pattern");
        let any = Regex::new(&prompts.any_view_pattern()).expect("any pattern");

        assert!(config.is_match("sysname core-1\n[core-1]"));
        assert!(!config.is_match("<core-1>"));
        assert!(any.is_match("<core-1>"));
        assert!(any.is_match("[core-1]"));
        assert!(any.is_match("HRP_M[fw-1]"));
    }

    #[test]
    fn cisco_prompt_patterns_distinguish_views() {
        let prompts = Vendor::CiscoIos.prompts();
        let config = Regex::new(&prompts.config_pattern()).expect("config pattern");
        let any = Regex::new(&prompts.any_view_pattern()).expect("any pattern");

        assert!(config.is_match("sw1(config)#"));
        assert!(config.is_match("sw1(config-if)#"));
        assert!(!config.is_match("sw1#"));
        assert!(any.is_match("output\nsw1#"));
        assert!(any.is_match("sw1>"));
    }
}
