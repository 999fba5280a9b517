//! Shared fakes for orchestrator tests: scripted calendars and a canned
//! block-header index, so the full stamp/upgrade/verify flow runs without
//! a network.

// Each test binary uses a different subset of these helpers
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use ots_client::{CalendarSource, ClientError, HeaderSource, Result};
use ots_core::{Attestation, BlockHeader, Chain, Op, Timestamp};

/// A calendar with scripted submit/fetch behavior.
pub struct FakeCalendar {
    url: String,
    /// Suffix the calendar appends before committing; `None` makes submit
    /// fail as unreachable.
    submit_suffix: Option<Vec<u8>>,
    /// Block height returned on fetch; `None` yields commitment-not-found.
    fetch_height: Option<u64>,
}

impl FakeCalendar {
    pub fn pending(url: &str, suffix: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            url: url.to_string(),
            submit_suffix: Some(suffix.to_vec()),
            fetch_height: None,
        })
    }

    pub fn upgradable(url: &str, suffix: &[u8], height: u64) -> Arc<Self> {
        Arc::new(Self {
            url: url.to_string(),
            submit_suffix: Some(suffix.to_vec()),
            fetch_height: Some(height),
        })
    }

    pub fn down(url: &str) -> Arc<Self> {
        Arc::new(Self {
            url: url.to_string(),
            submit_suffix: None,
            fetch_height: None,
        })
    }

    /// The commitment this calendar derives from a submitted digest.
    pub fn commitment(&self, digest: &[u8]) -> Vec<u8> {
        let suffix = self.submit_suffix.as_deref().unwrap_or_default();
        Op::Sha256.call(&Op::Append(suffix.to_vec()).call(digest))
    }
}

#[async_trait]
impl CalendarSource for FakeCalendar {
    fn url(&self) -> &str {
        &self.url
    }

    async fn submit(&self, digest: &[u8]) -> Result<Timestamp> {
        let Some(suffix) = &self.submit_suffix else {
            return Err(ClientError::Network(format!("{} unreachable", self.url)));
        };

        let mut stamp = Timestamp::new(digest.to_vec());
        let tip = stamp.add(Op::Append(suffix.clone())).add(Op::Sha256);
        tip.attest(Attestation::Pending { uri: self.url.clone() });
        Ok(stamp)
    }

    async fn fetch(&self, commitment: &[u8]) -> Result<Timestamp> {
        let Some(height) = self.fetch_height else {
            return Err(ClientError::CommitmentNotFound(hex::encode(commitment)));
        };

        let mut stamp = Timestamp::new(commitment.to_vec());
        stamp.attest(Attestation::Bitcoin { height });
        Ok(stamp)
    }
}

/// A block-header index backed by a fixed map.
#[derive(Default)]
pub struct FakeHeaderSource {
    headers: HashMap<(Chain, u64), BlockHeader>,
}

impl FakeHeaderSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, chain: Chain, height: u64, merkle_root: Vec<u8>, time: u64) {
        self.headers.insert((chain, height), BlockHeader { merkle_root, time });
    }
}

#[async_trait]
impl HeaderSource for FakeHeaderSource {
    async fn block_header(&self, chain: Chain, height: u64) -> Result<BlockHeader> {
        if chain == Chain::Ethereum {
            return Err(ClientError::UnsupportedChain(chain));
        }
        self.headers
            .get(&(chain, height))
            .cloned()
            .ok_or_else(|| ClientError::Rpc(format!("no header for {chain} height {height}")))
    }
}
