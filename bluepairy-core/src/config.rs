/*!
 * Configuration
 * Timeouts and agent settings, read from TOML
 */

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/bluepairy/bluepairy.toml";

/// Agent capabilities BlueZ accepts in `RegisterAgent`.
const VALID_CAPABILITIES: &[&str] = &[
    "DisplayOnly",
    "DisplayYesNo",
    "KeyboardOnly",
    "NoInputNoOutput",
    "KeyboardDisplay",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub timeouts: Timeouts,
    pub agent: AgentConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Timeouts {
    /// How long to wait for one adapter to report power after switching it on.
    pub power_on_ms: u64,
    /// How long to wait for a freshly paired device to report trust.
    pub trust_ms: u64,
    /// How long to wait for an adapter to report discovering.
    pub discovery_ms: u64,
    /// Upper bound for a single method call such as Pair or ConnectProfile.
    pub call_secs: u64,
    /// Give up when no usable device shows up within this window.
    pub overall_secs: u64,
    /// Bound of one receive-and-dispatch round on the bus.
    pub pump_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    pub path: String,
    pub capability: String,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            power_on_ms: 1000,
            trust_ms: 5000,
            discovery_ms: 5000,
            call_secs: 60,
            overall_secs: 300,
            pump_ms: 100,
        }
    }
}

impl Timeouts {
    pub fn power_on(&self) -> Duration {
        Duration::from_millis(self.power_on_ms)
    }

    pub fn trust(&self) -> Duration {
        Duration::from_millis(self.trust_ms)
    }

    pub fn discovery(&self) -> Duration {
        Duration::from_millis(self.discovery_ms)
    }

    pub fn call(&self) -> Duration {
        Duration::from_secs(self.call_secs)
    }

    pub fn overall(&self) -> Duration {
        Duration::from_secs(self.overall_secs)
    }

    pub fn pump(&self) -> Duration {
        Duration::from_millis(self.pump_ms)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            path: "/bluepairy/agent".to_string(),
            capability: "DisplayYesNo".to_string(),
        }
    }
}

impl Config {
    /// Load from a TOML file; a missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        match fs::read_to_string(path.as_ref()) {
            Ok(content) => Self::from_toml(&content),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("no config at {}, using defaults", path.as_ref().display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let bounds = [
            ("pump_ms", self.timeouts.pump_ms),
            ("call_secs", self.timeouts.call_secs),
            ("overall_secs", self.timeouts.overall_secs),
        ];
        for (name, value) in bounds {
            if value == 0 {
                return Err(Error::Config(format!("timeouts.{} must be greater than zero", name)));
            }
        }
        if !self.agent.path.starts_with('/') {
            return Err(Error::Config(format!(
                "agent.path must be an absolute object path, got {:?}",
                self.agent.path
            )));
        }
        if !VALID_CAPABILITIES.contains(&self.agent.capability.as_str()) {
            return Err(Error::Config(format!(
                "agent.capability {:?} is not one of {}",
                self.agent.capability,
                VALID_CAPABILITIES.join(", ")
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_means_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.timeouts.power_on(), Duration::from_secs(1));
        assert_eq!(config.timeouts.overall(), Duration::from_secs(300));
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::from_toml("[timeouts]\noverall_secs = 30\n").unwrap();
        assert_eq!(config.timeouts.overall_secs, 30);
        assert_eq!(config.timeouts.power_on_ms, 1000);
        assert_eq!(config.agent.capability, "DisplayYesNo");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            Config::from_toml("[timeouts]\nforever = true\n"),
            Err(Error::ConfigParse(_))
        ));
    }

    #[test]
    fn validation_catches_bad_values() {
        assert!(matches!(
            Config::from_toml("[timeouts]\npump_ms = 0\n"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::from_toml("[timeouts]\ncall_secs = 0\n"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::from_toml("[timeouts]\noverall_secs = 0\n"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::from_toml("[agent]\npath = \"agent\"\n"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::from_toml("[agent]\ncapability = \"Shout\"\n"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn load_reads_file_and_tolerates_missing_one() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert_eq!(Config::load(&missing).unwrap(), Config::default());

        let path = dir.path().join("bluepairy.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "[agent]\npath = \"/test/agent\"").unwrap();
        assert_eq!(Config::load(&path).unwrap().agent.path, "/test/agent");
    }
}
