//! HTTP(S) transport posting JSON-RPC envelopes to a control plane

use core::time::Duration;

use anyhow::{bail, Context as _};
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, instrument};
use url::Url;
use xenrpc_transport::Invoke;

/// Path of the JSON-RPC endpoint relative to the control plane URL
pub const ENDPOINT: &str = "jsonrpc";

/// Transport configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Base URL of the control plane, e.g. `https://pool-master.example.com`
    pub url: Url,
    /// Deadline for a single exchange, unbounded if `None`.
    ///
    /// Must exceed the timeout passed to `event.from`, long-polls are ordinary
    /// exchanges.
    pub timeout: Option<Duration>,
    /// Skip certificate verification, control planes commonly use self-signed certificates
    pub accept_invalid_certs: bool,
}

impl Config {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            timeout: None,
            accept_invalid_certs: false,
        }
    }
}

/// [Invoke] implementation backed by [reqwest]
#[derive(Clone, Debug)]
pub struct Client {
    http: reqwest::Client,
    endpoint: Url,
}

impl Client {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let mut http = reqwest::Client::builder().danger_accept_invalid_certs(config.accept_invalid_certs);
        if let Some(timeout) = config.timeout {
            http = http.timeout(timeout);
        }
        let http = http.build().context("failed to build HTTP client")?;
        Self::from_parts(http, &config.url)
    }

    /// Constructs a [Client] reusing an existing [reqwest::Client]
    pub fn from_parts(http: reqwest::Client, url: &Url) -> anyhow::Result<Self> {
        let endpoint = url
            .join(ENDPOINT)
            .with_context(|| format!("failed to derive endpoint from `{url}`"))?;
        Ok(Self { http, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl Invoke for Client {
    #[instrument(level = "trace", skip(self, request), fields(endpoint = %self.endpoint))]
    async fn invoke(&self, request: Bytes) -> anyhow::Result<Bytes> {
        debug!(len = request.len(), "posting request");
        let res = self
            .http
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(request)
            .send()
            .await
            .context("failed to send request")?;
        let status = res.status();
        if !status.is_success() {
            bail!("control plane responded with status `{status}`")
        }
        res.bytes().await.context("failed to read response body")
    }
}
