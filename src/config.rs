//! Configuration loading from TOML with environment variable overrides.
//!
//! Reads `config.toml` (path overridable through `CLI_CONFIG_FILE`) and
//! deserializes it into strongly-typed structs. Every field has a default,
//! so a missing file is not fatal. `CLI_*` environment variables take
//! precedence over values from the file.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::client::ClientConfig;
use crate::source::data_file_path;

/// Default config file, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub client: ClientSection,
    pub server: ServerConfig,
    #[serde(rename = "loop")]
    pub loop_timing: LoopConfig,
    pub batch: BatchConfig,
    pub data: DataConfig,
    pub protocol: ProtocolConfig,
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ClientSection {
    /// Agency number; also used as the agency id of every bet.
    pub id: u32,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self { id: 1 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "server:12345".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoopConfig {
    /// Pause between batches and between poll attempts.
    pub period_ms: u64,
    /// Upper bound on the polling phase. Unbounded when absent.
    pub lapse_ms: Option<u64>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            period_ms: 5_000,
            lapse_ms: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum bets per submission frame.
    pub max_amount: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { max_amount: 100 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DataConfig {
    pub dir: PathBuf,
    pub file_prefix: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./.data"),
            file_prefix: "agency-".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Read one acknowledgement line after each submitted batch.
    pub await_submission_ack: bool,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            await_submission_ack: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file, falling back to defaults
    /// when the file does not exist.
    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Load the file named by `CLI_CONFIG_FILE` (or the default), apply
    /// `CLI_*` overrides from the process environment, and validate.
    pub fn from_env() -> Result<Self> {
        let path =
            std::env::var("CLI_CONFIG_FILE").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let mut config = Self::load(&path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `CLI_*` overrides using `lookup` to read variables.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CLI_ID") {
            self.client.id = parse_var("CLI_ID", &v)?;
        }
        if let Some(v) = lookup("CLI_SERVER_ADDRESS") {
            self.server.address = v;
        }
        if let Some(v) = lookup("CLI_LOOP_PERIOD_MS") {
            self.loop_timing.period_ms = parse_var("CLI_LOOP_PERIOD_MS", &v)?;
        }
        if let Some(v) = lookup("CLI_LOOP_LAPSE_MS") {
            self.loop_timing.lapse_ms = Some(parse_var("CLI_LOOP_LAPSE_MS", &v)?);
        }
        if let Some(v) = lookup("CLI_BATCH_MAX_AMOUNT") {
            self.batch.max_amount = parse_var("CLI_BATCH_MAX_AMOUNT", &v)?;
        }
        if let Some(v) = lookup("CLI_DATA_DIR") {
            self.data.dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("CLI_DATA_FILE_PREFIX") {
            self.data.file_prefix = v;
        }
        if let Some(v) = lookup("CLI_PROTOCOL_AWAIT_ACK") {
            self.protocol.await_submission_ack = parse_var("CLI_PROTOCOL_AWAIT_ACK", &v)?;
        }
        if let Some(v) = lookup("CLI_LOG_LEVEL") {
            self.log.level = v;
        }
        Ok(())
    }

    /// Reject values the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.client.id == 0 {
            bail!("client.id must be a positive agency number");
        }
        if self.server.address.trim().is_empty() {
            bail!("server.address must not be empty");
        }
        if self.batch.max_amount == 0 {
            bail!("batch.max_amount must be at least 1");
        }
        Ok(())
    }

    /// Path of this agency's bet file.
    pub fn data_file(&self) -> PathBuf {
        data_file_path(&self.data.dir, &self.data.file_prefix, self.client.id)
    }

    /// Runtime settings for the client loop.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            id: self.client.id,
            loop_period: Duration::from_millis(self.loop_timing.period_ms),
            loop_lapse: self.loop_timing.lapse_ms.map(Duration::from_millis),
            batch_size: self.batch.max_amount,
            await_submission_ack: self.protocol.await_submission_ack,
        }
    }

    /// Log the resolved configuration once at startup.
    pub fn log_summary(&self) {
        info!(
            action = "config",
            result = "success",
            client_id = self.client.id,
            server_address = %self.server.address,
            loop_period_ms = self.loop_timing.period_ms,
            loop_lapse_ms = ?self.loop_timing.lapse_ms,
            batch_max_amount = self.batch.max_amount,
            data_file = %self.data_file().display(),
            await_submission_ack = self.protocol.await_submission_ack,
            log_level = %self.log.level
        );
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Could not parse {key}={value:?}"))
}
