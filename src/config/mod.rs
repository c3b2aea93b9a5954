//! Configuration management module for the configuration client.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support (`CONFIG_PATH`)
//! - Environment variable overrides (`DCONFIG__` prefix)
//! - Component-wise validation
mod poll;
mod retry;
pub use poll::*;
pub use retry::*;

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_ENCODE;
use crate::Error;
use crate::Result;

const ENV_PREFIX: &str = "DCONFIG";

/// Construction record of a configuration client
///
/// Combines all options with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClientConfig {
    /// Address(es) of the configuration service, comma separated
    #[serde(default, alias = "serverAddr")]
    pub server_addr: String,

    /// Namespace (tenant) applied to every key, empty for the public one
    #[serde(default)]
    pub namespace: String,

    /// Content encoding handed to the transport
    ///
    /// Default: `UTF-8`
    #[serde(default = "default_encode")]
    pub encode: String,

    /// Logical client name; isolates the local cache of this client
    ///
    /// Default: derived from `server_addr` and `namespace`
    #[serde(default)]
    pub name: Option<String>,

    /// Root directory of the failover and snapshot records
    ///
    /// Default: `/tmp/d-config`
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Timeout of publish and remove requests (ms)
    ///
    /// Default: 3000
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    /// Long-polling parameters
    #[serde(default)]
    pub poll: PollConfig,

    /// Backoff applied by the poller after failed cycles
    #[serde(default)]
    pub retry: BackoffPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: String::new(),
            namespace: String::new(),
            encode: default_encode(),
            name: None,
            cache_dir: default_cache_dir(),
            write_timeout_ms: default_write_timeout_ms(),
            poll: PollConfig::default(),
            retry: BackoffPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Configuration sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `DCONFIG__` prefix (highest priority)
    ///
    /// # Note
    /// Callers MUST call `validate()` once all overrides are applied.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("DCONFIG__SERVER_ADDR", "127.0.0.1:8848");
    /// let cfg = ClientConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(env_source());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config) // No validation - deferred to validate()
    }

    /// Default record pointing at `server_addr`
    pub fn with_server_addr(server_addr: impl Into<String>) -> Self {
        Self {
            server_addr: server_addr.into(),
            ..Self::default()
        }
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates configuration and returns the normalised instance.
    ///
    /// Trims `namespace` and `encode`, falling back to `UTF-8` for a blank
    /// encoding.
    pub fn validate(mut self) -> Result<Self> {
        if self.server_addr.trim().is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "server_addr cannot be empty".into(),
            )));
        }

        self.namespace = self.namespace.trim().to_string();
        if !self.namespace.is_empty() && !crate::model::is_valid(&self.namespace) {
            return Err(Error::Config(ConfigError::Message(format!(
                "namespace {:?} contains invalid characters",
                self.namespace
            ))));
        }

        self.encode = self.encode.trim().to_string();
        if self.encode.is_empty() {
            self.encode = default_encode();
        }

        if let Some(name) = &self.name {
            if name.trim().is_empty() || name.contains(['/', '\\']) || name.contains("..") {
                return Err(Error::Config(ConfigError::Message(format!(
                    "name {name:?} is not usable as a cache directory"
                ))));
            }
        }

        if self.cache_dir.as_os_str().is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "cache_dir path cannot be empty".into(),
            )));
        }

        if self.write_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "write_timeout_ms must be > 0".into(),
            )));
        }

        self.poll.validate()?;
        self.retry.validate()?;
        Ok(self)
    }

    /// Logical client name, used in log lines and as the cache root
    pub fn client_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.trim().to_string();
        }

        let suffix = self
            .server_addr
            .split(',')
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
            .map(|addr| {
                addr.trim_start_matches("http://")
                    .trim_start_matches("https://")
                    .replace([':', '/'], "_")
            })
            .collect::<Vec<_>>()
            .join("-");

        let namespace = self.namespace.trim();
        if namespace.is_empty() {
            format!("fixed-{suffix}")
        } else {
            format!("fixed-{suffix}-{namespace}")
        }
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}

fn default_encode() -> String {
    DEFAULT_ENCODE.to_string()
}
fn default_cache_dir() -> PathBuf {
    PathBuf::from("/tmp/d-config")
}
fn default_write_timeout_ms() -> u64 {
    3000
}
