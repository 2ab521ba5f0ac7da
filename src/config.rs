//! Engine settings and SSH algorithm preferences.
//!
//! The settings structs deserialize from any serde format with durations
//! given in whole seconds, and fall back to the defaults below for missing
//! fields. The algorithm lists feed
//! [`ConnectionSecurityOptions`](crate::session::ConnectionSecurityOptions).

use std::time::Duration;

use russh::keys::{Algorithm, EcdsaCurve, HashAlg};
use russh::{cipher, compression, kex, mac};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::session::SecurityLevel;

/// Settings for connecting to devices and running commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EngineConfig {
    /// Connection attempts before giving up.
    pub max_retries: u32,
    /// Budget for TCP connect, handshake, login and first prompt (seconds).
    pub connect_timeout_secs: u64,
    /// Read timeout for ordinary commands (seconds).
    pub command_timeout_secs: u64,
    /// Read timeout for large outputs such as interfaces and running config (seconds).
    pub bulk_command_timeout_secs: u64,
    /// Route collections through the connection pool.
    pub use_pool: bool,
    /// SSH algorithm policy. Defaults to the legacy profile, which does not
    /// verify host keys.
    pub security: SecurityLevel,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            connect_timeout_secs: 30,
            command_timeout_secs: 20,
            bulk_command_timeout_secs: 30,
            use_pool: true,
            security: SecurityLevel::LegacyCompatible,
        }
    }
}

impl EngineConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn bulk_command_timeout(&self) -> Duration {
        Duration::from_secs(self.bulk_command_timeout_secs)
    }
}

/// Settings for the per-device session pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PoolConfig {
    /// Upper bound on live sessions per device.
    pub max_connections_per_device: usize,
    /// Idle time after which the sweeper closes a session (seconds).
    pub idle_timeout_secs: u64,
    /// Interval between sweeps (seconds).
    pub sweep_interval_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections_per_device: 10,
            idle_timeout_secs: 300,
            sweep_interval_secs: 60,
        }
    }
}

impl PoolConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Settings for the backup scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SchedulerConfig {
    /// How late a job may still run after its exact fire time (seconds).
    pub misfire_grace_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            misfire_grace_secs: 300,
        }
    }
}

impl SchedulerConfig {
    pub fn misfire_grace(&self) -> Duration {
        Duration::from_secs(self.misfire_grace_secs)
    }
}

/// Key exchange algorithms accepted by the secure profile.
pub const SECURE_KEX_ORDER: &[kex::Name] = &[
    kex::CURVE25519,
    kex::CURVE25519_PRE_RFC_8731,
    kex::DH_GEX_SHA256,
    kex::DH_G14_SHA256,
    kex::DH_G16_SHA512,
    kex::ECDH_SHA2_NISTP256,
    kex::ECDH_SHA2_NISTP384,
    kex::ECDH_SHA2_NISTP521,
];

/// Key exchange algorithms for old switch firmware, including SHA-1 groups.
pub const LEGACY_KEX_ORDER: &[kex::Name] = &[
    kex::CURVE25519,
    kex::CURVE25519_PRE_RFC_8731,
    kex::DH_GEX_SHA256,
    kex::DH_G14_SHA256,
    kex::DH_G16_SHA512,
    kex::ECDH_SHA2_NISTP256,
    kex::ECDH_SHA2_NISTP384,
    kex::ECDH_SHA2_NISTP521,
    kex::DH_GEX_SHA1,
    kex::DH_G14_SHA1,
    kex::DH_G1_SHA1,
];

pub static SECURE_CIPHERS: &[cipher::Name] = &[
    cipher::CHACHA20_POLY1305,
    cipher::AES_256_GCM,
    cipher::AES_256_CTR,
    cipher::AES_192_CTR,
    cipher::AES_128_CTR,
];

/// Adds CBC ciphers, which many VRP and IOS 12.x images still insist on.
pub static LEGACY_CIPHERS: &[cipher::Name] = &[
    cipher::CHACHA20_POLY1305,
    cipher::AES_256_GCM,
    cipher::AES_256_CTR,
    cipher::AES_192_CTR,
    cipher::AES_128_CTR,
    cipher::AES_256_CBC,
    cipher::AES_192_CBC,
    cipher::AES_128_CBC,
];

pub const SECURE_MAC_ALGORITHMS: &[mac::Name] = &[
    mac::HMAC_SHA512_ETM,
    mac::HMAC_SHA256_ETM,
    mac::HMAC_SHA512,
    mac::HMAC_SHA256,
];

pub const LEGACY_MAC_ALGORITHMS: &[mac::Name] = &[
    mac::HMAC_SHA512_ETM,
    mac::HMAC_SHA256_ETM,
    mac::HMAC_SHA512,
    mac::HMAC_SHA256,
    mac::HMAC_SHA1_ETM,
    mac::HMAC_SHA1,
];

pub const DEFAULT_COMPRESSION_ALGORITHMS: &[compression::Name] = &[
    compression::NONE,
    compression::ZLIB,
    compression::ZLIB_LEGACY,
];

pub const SECURE_KEY_TYPES: &[Algorithm] = &[
    Algorithm::Ed25519,
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP256,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP384,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP521,
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha512),
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha256),
    },
];

pub const LEGACY_KEY_TYPES: &[Algorithm] = &[
    Algorithm::Ed25519,
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP256,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP384,
    },
    Algorithm::Ecdsa {
        curve: EcdsaCurve::NistP521,
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha512),
    },
    Algorithm::Rsa {
        hash: Some(HashAlg::Sha256),
    },
    Algorithm::Rsa { hash: None },
    Algorithm::Dsa,
];

#[cfg(test)]
mod tests {
    use super::*;

    use crate::session::ConnectionSecurityOptions;
    use async_ssh2_tokio::ServerCheckMethod;

    #[test]
    fn defaults_match_documented_values() {
        let engine = EngineConfig::default();
        assert_eq!(engine.max_retries, 3);
        assert_eq!(engine.connect_timeout(), Duration::from_secs(30));
        assert_eq!(engine.command_timeout(), Duration::from_secs(20));
        assert_eq!(engine.bulk_command_timeout(), Duration::from_secs(30));
        assert_eq!(engine.security, SecurityLevel::LegacyCompatible);
        assert_eq!(
            ConnectionSecurityOptions::for_level(engine.security).server_check,
            ServerCheckMethod::NoCheck
        );

        let pool = PoolConfig::default();
        assert_eq!(pool.max_connections_per_device, 10);
        assert_eq!(pool.idle_timeout(), Duration::from_secs(300));
        assert_eq!(pool.sweep_interval(), Duration::from_secs(60));

        assert_eq!(
            SchedulerConfig::default().misfire_grace(),
            Duration::from_secs(300)
        );
    }

    #[test]
    fn partial_json_keeps_defaults_for_missing_fields() {
        let engine: EngineConfig =
            serde_json::from_str(r#"{"max_retries": 5, "use_pool": false}"#).expect("parse");
        assert_eq!(engine.max_retries, 5);
        assert!(!engine.use_pool);
        assert_eq!(engine.connect_timeout_secs, 30);

        let pool: PoolConfig = serde_json::from_str(r#"{"idle_timeout_secs": 60}"#).expect("parse");
        assert_eq!(pool.idle_timeout(), Duration::from_secs(60));
        assert_eq!(pool.max_connections_per_device, 10);
    }

    #[test]
    fn legacy_lists_extend_secure_lists() {
        assert!(LEGACY_KEX_ORDER.contains(&kex::DH_G1_SHA1));
        assert!(!SECURE_KEX_ORDER.contains(&kex::DH_G1_SHA1));
        assert!(LEGACY_CIPHERS.contains(&cipher::AES_128_CBC));
        assert!(!SECURE_CIPHERS.contains(&cipher::AES_128_CBC));
        assert!(LEGACY_MAC_ALGORITHMS.contains(&mac::HMAC_SHA1));
        assert!(!SECURE_MAC_ALGORITHMS.contains(&mac::HMAC_SHA1));
    }
}
