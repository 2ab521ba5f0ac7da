use super::*;

/// Security level used for SSH algorithm selection.
///
/// The default is [`LegacyCompatible`](SecurityLevel::LegacyCompatible),
/// which also turns off host key verification. Select
/// [`Secure`](SecurityLevel::Secure) in [`EngineConfig`](crate::config::EngineConfig)
/// to check host keys against known_hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    /// Modern algorithms only, host keys checked against known_hosts.
    Secure,
    /// Adds SHA-1 key exchange, CBC ciphers and DSA keys for old firmware.
    /// Host keys are not verified.
    LegacyCompatible,
}

/// Connection security options for SSH establishment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSecurityOptions {
    /// SSH algorithm policy.
    pub level: SecurityLevel,
    /// Server host key verification method.
    pub server_check: ServerCheckMethod,
}

impl Default for ConnectionSecurityOptions {
    fn default() -> Self {
        Self::for_level(SecurityLevel::LegacyCompatible)
    }
}

impl ConnectionSecurityOptions {
    /// Profile for a configured level. Legacy devices rarely have stable,
    /// distributed host keys, so that profile skips the host check.
    pub fn for_level(level: SecurityLevel) -> Self {
        match level {
            SecurityLevel::Secure => Self::secure_default(),
            SecurityLevel::LegacyCompatible => Self::legacy_compatible(),
        }
    }

    pub fn secure_default() -> Self {
        Self {
            level: SecurityLevel::Secure,
            server_check: ServerCheckMethod::DefaultKnownHostsFile,
        }
    }

    pub fn legacy_compatible() -> Self {
        Self {
            level: SecurityLevel::LegacyCompatible,
            server_check: ServerCheckMethod::NoCheck,
        }
    }

    pub(super) fn preferred(&self) -> Preferred {
        match self.level {
            SecurityLevel::Secure => Preferred {
                kex: Cow::Borrowed(config::SECURE_KEX_ORDER),
                key: Cow::Borrowed(config::SECURE_KEY_TYPES),
                cipher: Cow::Borrowed(config::SECURE_CIPHERS),
                mac: Cow::Borrowed(config::SECURE_MAC_ALGORITHMS),
                compression: Cow::Borrowed(config::DEFAULT_COMPRESSION_ALGORITHMS),
            },
            SecurityLevel::LegacyCompatible => Preferred {
                kex: Cow::Borrowed(config::LEGACY_KEX_ORDER),
                key: Cow::Borrowed(config::LEGACY_KEY_TYPES),
                cipher: Cow::Borrowed(config::LEGACY_CIPHERS),
                mac: Cow::Borrowed(config::LEGACY_MAC_ALGORITHMS),
                compression: Cow::Borrowed(config::DEFAULT_COMPRESSION_ALGORITHMS),
            },
        }
    }
}
