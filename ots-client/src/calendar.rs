//! Remote calendar server interface
//!
//! A calendar accepts digest submissions, anchors them into a blockchain on
//! its own schedule, and serves completed timestamps keyed by commitment.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use ots_core::Timestamp;

use crate::{ClientError, Result};

/// Maximum accepted calendar response body.
pub const MAX_RESPONSE_SIZE: usize = 10_000;

/// Protocol media type sent in the Accept header.
pub const ACCEPT_HEADER: &str = "application/vnd.opentimestamps.v1";

const USER_AGENT: &str = concat!("ots-client/", env!("CARGO_PKG_VERSION"));

/// Signs a digest for authenticated calendar submission. Key management is
/// the caller's concern; the client only forwards the resulting header.
pub trait DigestSigner: Send + Sync {
    /// Produce the `x-signature` header value for a digest.
    fn sign(&self, digest: &[u8]) -> String;
}

/// A calendar the orchestrator can submit to and fetch from.
#[async_trait]
pub trait CalendarSource: Send + Sync {
    fn url(&self) -> &str;

    /// Submit a digest; returns a timestamp tree committing to it.
    async fn submit(&self, digest: &[u8]) -> Result<Timestamp>;

    /// Fetch the timestamp for a previously submitted commitment.
    async fn fetch(&self, commitment: &[u8]) -> Result<Timestamp>;
}

/// HTTP calendar client.
pub struct RemoteCalendar {
    url: String,
    http: reqwest::Client,
    signer: Option<Arc<dyn DigestSigner>>,
}

impl RemoteCalendar {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(url, Duration::from_secs(10))
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ClientError::Network(format!("failed to build http client: {e}")))?;

        Ok(Self {
            url: url.into().trim_end_matches('/').to_string(),
            http,
            signer: None,
        })
    }

    /// Sign submissions with the given signer.
    pub fn with_signer(mut self, signer: Arc<dyn DigestSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Read a capped response body, treating oversized bodies as errors
    /// rather than truncating them.
    async fn read_body(&self, response: reqwest::Response) -> Result<Vec<u8>> {
        let body = response
            .bytes()
            .await
            .map_err(|e| ClientError::Network(format!("failed to read calendar response: {e}")))?;

        if body.len() > MAX_RESPONSE_SIZE {
            return Err(ClientError::ExceededSize {
                limit: MAX_RESPONSE_SIZE,
                actual: body.len(),
            });
        }
        Ok(body.to_vec())
    }
}

#[async_trait]
impl CalendarSource for RemoteCalendar {
    fn url(&self) -> &str {
        &self.url
    }

    async fn submit(&self, digest: &[u8]) -> Result<Timestamp> {
        let submit_url = format!("{}/digest", self.url);
        debug!(url = %submit_url, "submitting digest to calendar");

        let mut request = self
            .http
            .post(&submit_url)
            .header("Accept", ACCEPT_HEADER)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(digest.to_vec());

        if let Some(signer) = &self.signer {
            request = request.header("x-signature", signer.sign(digest));
        }

        let response = request
            .send()
            .await
            .map_err(|e| ClientError::Network(format!("could not reach {submit_url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::BadStatus {
                status: status.as_u16(),
                url: submit_url,
            });
        }

        let body = self.read_body(response).await?;
        Ok(Timestamp::from_bytes(&body, digest.to_vec())?)
    }

    async fn fetch(&self, commitment: &[u8]) -> Result<Timestamp> {
        let commitment_hex = hex::encode(commitment);
        let fetch_url = format!("{}/timestamp/{}", self.url, commitment_hex);
        debug!(url = %fetch_url, "fetching timestamp from calendar");

        let response = self
            .http
            .get(&fetch_url)
            .header("Accept", ACCEPT_HEADER)
            .send()
            .await
            .map_err(|e| ClientError::Network(format!("could not reach {fetch_url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::CommitmentNotFound(commitment_hex));
        }

        let body = self.read_body(response).await?;
        Ok(Timestamp::from_bytes(&body, commitment.to_vec())?)
    }
}
