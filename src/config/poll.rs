use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Long-polling parameters of the change-detection poller
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PollConfig {
    /// How long the server may hold a listening request (ms)
    ///
    /// Default: 30000
    #[serde(default = "default_long_poll_timeout_ms")]
    pub long_poll_timeout_ms: u64,

    /// Maximum number of keys carried by one listening request
    ///
    /// Default: 3000
    #[serde(default = "default_keys_per_batch")]
    pub keys_per_batch: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            long_poll_timeout_ms: default_long_poll_timeout_ms(),
            keys_per_batch: default_keys_per_batch(),
        }
    }
}

impl PollConfig {
    pub fn validate(&self) -> Result<()> {
        if self.long_poll_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "poll.long_poll_timeout_ms must be > 0".into(),
            )));
        }

        if self.keys_per_batch == 0 {
            return Err(Error::Config(ConfigError::Message(
                "poll.keys_per_batch must be > 0".into(),
            )));
        }

        if self.client_timeout() <= self.hold_timeout() {
            return Err(Error::Config(ConfigError::Message(format!(
                "poll.long_poll_timeout_ms {}ms is too small to derive a client timeout",
                self.long_poll_timeout_ms
            ))));
        }

        Ok(())
    }

    /// Server-side hold time sent with every listening request
    pub fn hold_timeout(&self) -> Duration {
        Duration::from_millis(self.long_poll_timeout_ms)
    }

    /// Client-side timeout of a listening request: hold time plus half of it
    pub fn client_timeout(&self) -> Duration {
        Duration::from_millis(self.long_poll_timeout_ms.saturating_add(self.long_poll_timeout_ms >> 1))
    }
}

fn default_long_poll_timeout_ms() -> u64 {
    30000
}
fn default_keys_per_batch() -> usize {
    3000
}
