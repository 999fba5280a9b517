//! Orchestration: stamping, upgrading and verifying proofs
//!
//! Calendar traffic fans out one task per calendar and collects results
//! through a channel; proof-tree work is synchronous and happens only after
//! collection, so the shared tree is never touched from two tasks at once.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use rand::RngCore;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use ots_core::{Attestation, Chain, DetachedTimestampFile, MerkleTree, Op, Timestamp};

use crate::bitcoin::HeaderSource;
use crate::calendar::{CalendarSource, RemoteCalendar};
use crate::config::ClientConfig;
use crate::{ClientError, Result};

/// The public calendars used when none are configured.
pub const DEFAULT_CALENDARS: &[&str] = &[
    "https://alice.btc.calendar.opentimestamps.org",
    "https://bob.btc.calendar.opentimestamps.org",
    "https://finney.calendar.eternitywall.com",
];

/// Length of the random nonce appended to each file digest before
/// aggregation, keeping the raw digest out of calendar submissions.
const NONCE_LENGTH: usize = 16;

/// Outcome of verifying one chain's attestation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyResult {
    /// Block time attesting the digest existed, UNIX seconds.
    pub time: u64,
    /// Height of the attesting block.
    pub height: u64,
}

impl fmt::Display for VerifyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match DateTime::from_timestamp(self.time as i64, 0) {
            Some(when) => write!(
                f,
                "block {} attests existence as of {}",
                self.height,
                when.format("%Y-%m-%d %Z")
            ),
            None => write!(f, "block {} attests existence at {}", self.height, self.time),
        }
    }
}

/// Client orchestrating calendar submissions and proof verification.
pub struct OtsClient {
    calendars: Vec<Arc<dyn CalendarSource>>,
    quorum: usize,
}

impl OtsClient {
    /// Client for the default public calendars.
    pub fn new() -> Result<Self> {
        Self::with_urls(DEFAULT_CALENDARS.iter().map(|url| url.to_string()))
    }

    pub fn with_urls(urls: impl IntoIterator<Item = String>) -> Result<Self> {
        let calendars = urls
            .into_iter()
            .map(|url| {
                RemoteCalendar::new(url).map(|calendar| Arc::new(calendar) as Arc<dyn CalendarSource>)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::with_calendars(calendars))
    }

    /// Client over pre-built calendar sources.
    pub fn with_calendars(calendars: Vec<Arc<dyn CalendarSource>>) -> Self {
        let quorum = calendars.len().min(2).max(1);
        Self { calendars, quorum }
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let calendars = config
            .calendars
            .iter()
            .map(|url| {
                RemoteCalendar::with_timeout(url.clone(), timeout)
                    .map(|calendar| Arc::new(calendar) as Arc<dyn CalendarSource>)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::with_calendars(calendars).with_quorum(config.quorum))
    }

    /// Number of calendar responses to wait for before proceeding.
    /// Clamped to the number of configured calendars.
    pub fn with_quorum(mut self, quorum: usize) -> Self {
        self.quorum = quorum.clamp(1, self.calendars.len().max(1));
        self
    }

    pub fn calendars(&self) -> &[Arc<dyn CalendarSource>] {
        &self.calendars
    }

    /// Stamp a single detached file.
    pub async fn stamp(&self, detached: &mut DetachedTimestampFile) -> Result<()> {
        self.stamp_many(std::slice::from_mut(detached)).await
    }

    /// Stamp a batch of detached files with one calendar submission.
    ///
    /// Each file digest is blinded with a random nonce, the nonce-wrapped
    /// digests are aggregated into a Merkle root, and the root is submitted
    /// to every configured calendar concurrently. Each file then receives
    /// its replayed chain with the calendar responses merged at the tip.
    pub async fn stamp_many(&self, files: &mut [DetachedTimestampFile]) -> Result<()> {
        if files.is_empty() {
            return Ok(());
        }

        // Blind each digest: append a fresh nonce, then hash
        let mut rng = rand::thread_rng();
        let mut prefixes: Vec<Vec<Op>> = Vec::with_capacity(files.len());
        let mut leaves: Vec<Vec<u8>> = Vec::with_capacity(files.len());

        for file in files.iter() {
            let mut nonce = vec![0u8; NONCE_LENGTH];
            rng.fill_bytes(&mut nonce);

            let prefix = vec![Op::Append(nonce), Op::Sha256];
            let leaf = prefix
                .iter()
                .fold(file.file_digest().to_vec(), |msg, op| op.call(&msg));
            prefixes.push(prefix);
            leaves.push(leaf);
        }

        // ThreadRng is not Send; release it before the first await
        drop(rng);

        let tree = MerkleTree::build(leaves)?;

        let anchor = self.submit_to_calendars(tree.root().to_vec()).await?;

        for (i, file) in files.iter_mut().enumerate() {
            let mut chain = prefixes[i].clone();
            chain.extend_from_slice(tree.chain(i));

            let proof =
                ots_core::replay_chain(file.file_digest().to_vec(), &chain, anchor.clone())?;
            file.timestamp.merge(proof)?;
        }

        Ok(())
    }

    /// Submit a digest to every calendar concurrently and merge the
    /// responses. Individual calendar failures are tolerated; the call
    /// fails only if no calendar responds. Returns once the quorum of
    /// successes has arrived (or every calendar has answered).
    async fn submit_to_calendars(&self, digest: Vec<u8>) -> Result<Timestamp> {
        let (tx, mut rx) = mpsc::channel(self.calendars.len().max(1));

        for calendar in &self.calendars {
            let calendar = Arc::clone(calendar);
            let digest = digest.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let url = calendar.url().to_string();
                let result = calendar.submit(&digest).await;
                // Receiver may have left after reaching quorum
                let _ = tx.send((url, result)).await;
            });
        }
        drop(tx);

        let mut root = Timestamp::new(digest);
        let mut successes = 0usize;

        while let Some((url, result)) = rx.recv().await {
            match result {
                Ok(response) => {
                    if let Err(e) = root.merge(response) {
                        warn!(calendar = %url, error = %e, "discarding mismatched calendar response");
                        continue;
                    }
                    info!(calendar = %url, "calendar accepted submission");
                    successes += 1;
                    if successes >= self.quorum {
                        break;
                    }
                }
                Err(e) => {
                    warn!(calendar = %url, error = %e, "calendar submission failed");
                }
            }
        }

        if successes == 0 {
            return Err(ClientError::NoCalendarResponse);
        }
        Ok(root)
    }

    /// Refresh pending attestations from their calendars.
    ///
    /// Every directly verified node holding a pending attestation (and not
    /// already carrying a block-header claim in its subtree) is looked up at
    /// its calendar by the node's own digest; responses are merged into that
    /// node. Per-node failures are logged and skipped so the remaining
    /// branches still get their chance. Returns whether anything changed.
    pub async fn upgrade(&self, timestamp: &mut Timestamp) -> Result<bool> {
        let mut targets: Vec<(Vec<u8>, String)> = Vec::new();
        for node in timestamp.directly_verified() {
            if node.is_complete() {
                continue;
            }
            for attestation in node.attestations() {
                if let Attestation::Pending { uri } = attestation {
                    targets.push((node.msg().to_vec(), uri.clone()));
                }
            }
        }

        if targets.is_empty() {
            return Ok(false);
        }

        let (tx, mut rx) = mpsc::channel(targets.len());
        for (commitment, uri) in targets {
            let calendar = match self.resolve_calendar(&uri) {
                Ok(calendar) => calendar,
                Err(e) => {
                    warn!(calendar = %uri, error = %e, "skipping unusable calendar");
                    continue;
                }
            };
            let tx = tx.clone();
            tokio::spawn(async move {
                let result = calendar.fetch(&commitment).await;
                let _ = tx.send((commitment, calendar.url().to_string(), result)).await;
            });
        }
        drop(tx);

        let mut fetched: Vec<(Vec<u8>, Timestamp)> = Vec::new();
        while let Some((commitment, url, result)) = rx.recv().await {
            match result {
                Ok(response) => {
                    debug!(calendar = %url, "calendar returned upgraded timestamp");
                    fetched.push((commitment, response));
                }
                Err(e) => {
                    warn!(calendar = %url, error = %e, "calendar upgrade failed");
                }
            }
        }

        let mut changed = false;
        for node in timestamp.directly_verified_mut() {
            for (commitment, response) in &fetched {
                if node.msg() == commitment.as_slice() {
                    let before = node.clone();
                    if let Err(e) = node.merge(response.clone()) {
                        warn!(error = %e, "discarding mismatched upgrade response");
                        continue;
                    }
                    if *node != before {
                        changed = true;
                    }
                }
            }
        }

        Ok(changed)
    }

    /// Verify a proof against an independently recomputed digest.
    ///
    /// The digest must come from rehashing the original content — never
    /// from the proof itself; the equality check here is what stops a valid
    /// but unrelated proof from being substituted. Every block-header
    /// attestation is checked against its fetched header; any mismatch
    /// fails the whole call. Pending and unknown attestations carry no
    /// checkable claim and are ignored.
    pub async fn verify(
        &self,
        timestamp: &Timestamp,
        digest: &[u8],
        headers: &dyn HeaderSource,
    ) -> Result<BTreeMap<Chain, VerifyResult>> {
        if timestamp.msg() != digest {
            return Err(ClientError::DigestMismatch);
        }

        let mut results = BTreeMap::new();

        for (msg, attestation) in timestamp.attestation_pairs() {
            let (Some(chain), Some(height)) = (attestation.chain(), attestation.height()) else {
                continue;
            };

            let header = match headers.block_header(chain, height).await {
                Ok(header) => header,
                Err(ClientError::UnsupportedChain(chain)) => {
                    warn!(%chain, height, "no header source for chain, skipping");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let time = attestation.verify_against_header(&msg, &header)?;
            info!(%chain, height, time, "attestation verified");
            results.insert(chain, VerifyResult { time, height });
        }

        Ok(results)
    }

    /// Reuse a configured calendar when the URI matches, otherwise open a
    /// fresh connection to the calendar named by the attestation.
    fn resolve_calendar(&self, uri: &str) -> Result<Arc<dyn CalendarSource>> {
        let normalized = uri.trim_end_matches('/');
        for calendar in &self.calendars {
            if calendar.url() == normalized {
                return Ok(Arc::clone(calendar));
            }
        }
        Ok(Arc::new(RemoteCalendar::new(normalized)?))
    }
}
