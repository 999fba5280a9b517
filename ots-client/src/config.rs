//! Client configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::bitcoin::BitcoinRpcConfig;
use crate::client::DEFAULT_CALENDARS;
use crate::{ClientError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Calendar servers to submit digests to
    pub calendars: Vec<String>,

    /// Calendar responses to wait for before a stamp succeeds
    pub quorum: usize,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Bitcoin Core RPC settings for verification (optional)
    #[serde(default)]
    pub bitcoin: Option<BitcoinRpcConfig>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            calendars: DEFAULT_CALENDARS.iter().map(|url| url.to_string()).collect(),
            quorum: 2,
            timeout_secs: 10,
            bitcoin: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file. The RPC password is taken from
    /// the `OTS_RPC_PASSWORD` environment variable, never from the file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: ClientConfig =
            toml::from_str(&contents).map_err(|e| ClientError::Config(e.to_string()))?;

        if let Some(bitcoin) = &mut config.bitcoin {
            if bitcoin.password.is_none() {
                bitcoin.password = std::env::var("OTS_RPC_PASSWORD").ok();
            }
        }

        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ClientError::Config(e.to_string()))?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}
