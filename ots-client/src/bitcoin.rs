//! Bitcoin Core JSON-RPC block-header source
//!
//! Serves block headers keyed by height for proof verification. The header
//! itself is the oracle: the verifier checks the attested digest against the
//! merkle root and takes the time from the header.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use ots_core::{BlockHeader, Chain};

use crate::{ClientError, Result};

/// A by-height block-header index for proof verification.
#[async_trait]
pub trait HeaderSource: Send + Sync {
    async fn block_header(&self, chain: Chain, height: u64) -> Result<BlockHeader>;
}

/// Connection settings for a Bitcoin Core node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitcoinRpcConfig {
    /// RPC endpoint, e.g. `http://127.0.0.1:8332`
    pub url: String,

    /// RPC username (basic auth)
    pub user: Option<String>,

    /// RPC password; left out of config files, supplied via the
    /// `OTS_RPC_PASSWORD` environment variable
    #[serde(skip)]
    pub password: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,
}

fn default_rpc_timeout() -> u64 {
    10
}

impl Default for BitcoinRpcConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8332".to_string(),
            user: None,
            password: None,
            timeout_secs: default_rpc_timeout(),
        }
    }
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: serde_json::Value,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i32,
    message: String,
}

/// Verbose `getblockheader` result, reduced to the fields verification needs.
#[derive(Debug, Deserialize)]
struct RpcBlockHeader {
    merkleroot: String,
    time: u64,
}

/// Bitcoin Core RPC client serving the Bitcoin chain only.
pub struct BitcoinRpc {
    http: reqwest::Client,
    config: BitcoinRpcConfig,
    request_id: AtomicU64,
}

impl BitcoinRpc {
    pub fn new(config: BitcoinRpcConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ClientError::Network(format!("failed to build rpc client: {e}")))?;

        Ok(Self {
            http,
            config,
            request_id: AtomicU64::new(0),
        })
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T> {
        let request = RpcRequest {
            jsonrpc: "1.0",
            id: self.request_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let mut builder = self.http.post(&self.config.url).json(&request);
        if let Some(user) = &self.config.user {
            builder = builder.basic_auth(user, self.config.password.as_deref());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ClientError::Network(format!("rpc request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Rpc(format!("{method} returned status {status}")));
        }

        let envelope: RpcResponse<T> = response
            .json()
            .await
            .map_err(|e| ClientError::Rpc(format!("invalid rpc response: {e}")))?;

        if let Some(err) = envelope.error {
            return Err(ClientError::Rpc(format!(
                "{method} failed: {} (code {})",
                err.message, err.code
            )));
        }

        envelope
            .result
            .ok_or_else(|| ClientError::Rpc(format!("{method} returned no result")))
    }

    pub async fn get_block_hash(&self, height: u64) -> Result<String> {
        self.call("getblockhash", serde_json::json!([height])).await
    }

    pub async fn get_block_header(&self, hash: &str) -> Result<BlockHeader> {
        let header: RpcBlockHeader = self
            .call("getblockheader", serde_json::json!([hash, true]))
            .await?;

        let merkle_root = hex::decode(&header.merkleroot)
            .map_err(|e| ClientError::Rpc(format!("invalid merkleroot hex: {e}")))?;

        Ok(BlockHeader {
            merkle_root,
            time: header.time,
        })
    }
}

#[async_trait]
impl HeaderSource for BitcoinRpc {
    async fn block_header(&self, chain: Chain, height: u64) -> Result<BlockHeader> {
        if chain != Chain::Bitcoin {
            return Err(ClientError::UnsupportedChain(chain));
        }

        let hash = self.get_block_hash(height).await?;
        self.get_block_header(&hash).await
    }
}
