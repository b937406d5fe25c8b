//! Configuration file loading
//!
//! Channels, their log files and pattern lists come from a TOML file. Everything is
//! validated up front so a bad channel never fails in the middle of a session.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use querywatch_engine::Channel;
use querywatch_logs::{DEFAULT_POLL_INTERVAL, LogFormat};

pub const DEFAULT_CONFIG_PATH: &str = "querywatch.toml";

fn default_tests_dir() -> PathBuf {
    PathBuf::from("testcases")
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL.as_millis() as u64
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Directory holding one JSON document per testcase
    #[serde(default = "default_tests_dir")]
    pub tests_dir: PathBuf,

    /// Backoff between reads once a log is at its end
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(rename = "channel", default)]
    pub channels: Vec<ChannelConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelConfig {
    pub name: String,
    pub log: PathBuf,
    pub format: String,

    /// strftime format, only for `format = "custom"`
    pub timestamp_format: Option<String>,

    #[serde(default)]
    pub patterns: Vec<String>,

    #[serde(default)]
    pub report_additional: bool,
}

impl Config {
    /// Read and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.channels.is_empty() {
            bail!("no [[channel]] configured");
        }
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be greater than zero");
        }

        let mut seen = HashSet::new();
        for channel in &self.channels {
            if !seen.insert(channel.name.as_str()) {
                bail!("channel '{}' is defined twice", channel.name);
            }
            channel
                .log_format()
                .with_context(|| format!("channel '{}'", channel.name))?;
            channel.to_channel()?;
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Look up a channel by name; without a name the only channel is used
    pub fn channel(&self, name: Option<&str>) -> Result<&ChannelConfig> {
        match name {
            Some(name) => self
                .channels
                .iter()
                .find(|c| c.name == name)
                .with_context(|| format!("Channel '{}' not found in config", name)),
            None if self.channels.len() == 1 => Ok(&self.channels[0]),
            None => bail!(
                "Several channels configured, pick one with --channel ({})",
                self.channels
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

impl ChannelConfig {
    pub fn log_format(&self) -> Result<LogFormat> {
        Ok(LogFormat::from_config(
            &self.format,
            self.timestamp_format.as_deref(),
        )?)
    }

    pub fn to_channel(&self) -> Result<Channel> {
        Ok(Channel::new(&self.name, &self.patterns)?.with_report_additional(self.report_additional))
    }
}
