//! Runtime configuration loaded from TOML
//!
//! ```toml
//! ports_dir = "/tmp/bgas-ports"
//!
//! [engine]
//! retry = { deadline_ms = 1000 }   # or { attempts = 64 } or "unbounded"
//! response = "ignore"              # or "check"
//!
//! [port]
//! capacity = 16
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::domain::BusDomain;
use crate::engine::{EngineConfig, ResponsePolicy, RetryPolicy};
use crate::{FmemError, Result};

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FmemConfig {
    /// Directory holding one port folder per bus domain
    pub ports_dir: PathBuf,
    pub engine: EngineSection,
    pub port: PortSection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSection {
    pub retry: RetrySetting,
    pub response: ResponsePolicy,
}

/// Retry policy as written in the config file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrySetting {
    Unbounded,
    Attempts(u64),
    DeadlineMs(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PortSection {
    /// Slots per channel queue; must be a power of two
    pub capacity: usize,
}

impl Default for FmemConfig {
    fn default() -> Self {
        Self {
            ports_dir: PathBuf::from("sim-ports"),
            engine: EngineSection::default(),
            port: PortSection::default(),
        }
    }
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            retry: RetrySetting::DeadlineMs(1000),
            response: ResponsePolicy::default(),
        }
    }
}

impl Default for PortSection {
    fn default() -> Self {
        Self { capacity: 16 }
    }
}

impl From<RetrySetting> for RetryPolicy {
    fn from(setting: RetrySetting) -> Self {
        match setting {
            RetrySetting::Unbounded => RetryPolicy::Unbounded,
            RetrySetting::Attempts(n) => RetryPolicy::Attempts(n),
            RetrySetting::DeadlineMs(ms) => RetryPolicy::Deadline(Duration::from_millis(ms)),
        }
    }
}

impl FmemConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: FmemConfig =
            toml::from_str(text).map_err(|e| FmemError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| FmemError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if let RetrySetting::Attempts(0) = self.engine.retry {
            return Err(FmemError::Config(
                "engine.retry.attempts must be at least 1".to_string(),
            ));
        }
        if !self.port.capacity.is_power_of_two() {
            return Err(FmemError::Config(format!(
                "port.capacity must be a power of two, got {}",
                self.port.capacity
            )));
        }
        Ok(())
    }

    /// Engine policies, validated
    pub fn engine_config(&self) -> Result<EngineConfig> {
        self.validate()?;
        Ok(EngineConfig {
            retry: self.engine.retry.into(),
            response: self.engine.response,
        })
    }

    /// Port path of `domain` under `ports_dir`
    pub fn port_path(&self, domain: BusDomain) -> PathBuf {
        self.ports_dir.join(domain.params().folder)
    }
}
