//! Runtime configuration.
//!
//! Defaults suit a production build. `from_env` lets a test harness or the
//! demo binary override the few values that differ per deployment:
//!
//! - `SECURITY_CORE_TRUSTED_IDENTITY`: expected process name substring
//! - `SECURITY_CORE_HEAL_INTERVAL_MS`: watchdog period in milliseconds
//!
//! Malformed or empty values are ignored.

use std::path::PathBuf;
use std::time::Duration;

use crate::detectors::artifacts::INSTRUMENTATION_SERVER_PATH;
use crate::encoding::Signature;

pub const DEFAULT_TRUSTED_IDENTITY: &str = "com.app.trusted";
pub const DEFAULT_HEAL_INTERVAL: Duration = Duration::from_secs(2);

/// Thread name used by the Frida JavaScript runtime.
pub const DEFAULT_THREAD_MARKER: Signature = crate::signature!(b"gum-js-loop");

/// Substring of any mapping backed by a Frida agent or gadget.
pub const DEFAULT_MAPPING_MARKER: Signature = crate::signature!(b"frida");

const ENV_TRUSTED_IDENTITY: &str = "SECURITY_CORE_TRUSTED_IDENTITY";
const ENV_HEAL_INTERVAL_MS: &str = "SECURITY_CORE_HEAL_INTERVAL_MS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShieldConfig {
    pub trusted_identity: String,
    pub thread_marker: Signature,
    pub mapping_marker: Signature,
    pub heal_interval: Duration,
    pub instrumentation_server_path: PathBuf,
}

impl Default for ShieldConfig {
    fn default() -> Self {
        Self {
            trusted_identity: DEFAULT_TRUSTED_IDENTITY.to_string(),
            thread_marker: DEFAULT_THREAD_MARKER,
            mapping_marker: DEFAULT_MAPPING_MARKER,
            heal_interval: DEFAULT_HEAL_INTERVAL,
            instrumentation_server_path: PathBuf::from(INSTRUMENTATION_SERVER_PATH),
        }
    }
}

impl ShieldConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(identity) = env_string(ENV_TRUSTED_IDENTITY) {
            config.trusted_identity = identity;
        }
        if let Some(ms) = env_u64(ENV_HEAL_INTERVAL_MS).filter(|ms| *ms > 0) {
            config.heal_interval = Duration::from_millis(ms);
        }
        config
    }

    pub fn with_trusted_identity(mut self, identity: impl Into<String>) -> Self {
        self.trusted_identity = identity.into();
        self
    }

    pub fn with_heal_interval(mut self, interval: Duration) -> Self {
        self.heal_interval = interval;
        self
    }

    pub fn with_instrumentation_server_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.instrumentation_server_path = path.into();
        self
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ShieldConfig::default();
        assert_eq!(config.trusted_identity, "com.app.trusted");
        assert_eq!(config.heal_interval, Duration::from_secs(2));
        assert_eq!(config.thread_marker.reveal_str(), "gum-js-loop");
        assert_eq!(config.mapping_marker.reveal_str(), "frida");
    }

    #[test]
    fn test_builders() {
        let config = ShieldConfig::default()
            .with_trusted_identity("org.example.bank")
            .with_heal_interval(Duration::from_millis(250))
            .with_instrumentation_server_path("/tmp/fs");
        assert_eq!(config.trusted_identity, "org.example.bank");
        assert_eq!(config.heal_interval, Duration::from_millis(250));
        assert_eq!(config.instrumentation_server_path, PathBuf::from("/tmp/fs"));
    }

    #[test]
    fn test_env_helpers_ignore_malformed_values() {
        std::env::set_var("SECURITY_CORE_TEST_U64", " 1500 ");
        std::env::set_var("SECURITY_CORE_TEST_BAD_U64", "soon");
        std::env::set_var("SECURITY_CORE_TEST_BLANK", "   ");

        assert_eq!(env_u64("SECURITY_CORE_TEST_U64"), Some(1500));
        assert_eq!(env_u64("SECURITY_CORE_TEST_BAD_U64"), None);
        assert_eq!(env_string("SECURITY_CORE_TEST_BLANK"), None);
        assert_eq!(env_string("SECURITY_CORE_TEST_UNSET_VALUE"), None);
    }
}
