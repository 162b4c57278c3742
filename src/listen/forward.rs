//! Signed delivery of event payloads to a local endpoint.
//!
//! Every forward is spawned on its own task and never reports back to the
//! dispatcher: failures are logged at `warn` and dropped. There is no retry
//! and no ordering between forwards.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;

use crate::constants::{self, HEADER_WEBHOOK_ID, HEADER_WEBHOOK_SIGNATURE, HEADER_WEBHOOK_TIMESTAMP};
use crate::signing::{ForwardingSignature, Signer};

/// Posts signed payloads to the configured target.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    target: reqwest::Url,
    signer: Arc<Signer>,
}

impl Forwarder {
    /// Forwarder for `target`, signing with `signer`.
    ///
    /// `skip_tls_verify` accepts self-signed certificates on the target.
    pub fn new(target: reqwest::Url, signer: Signer, skip_tls_verify: bool) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(constants::FORWARD_REQUEST_TIMEOUT)
            .user_agent(constants::user_agent())
            .danger_accept_invalid_certs(skip_tls_verify)
            .build()
            .context("failed to build forwarding HTTP client")?;

        Ok(Self {
            client,
            target,
            signer: Arc::new(signer),
        })
    }

    /// Where events are posted.
    pub fn target(&self) -> &reqwest::Url {
        &self.target
    }

    /// Signing secret in use.
    pub fn secret(&self) -> &str {
        self.signer.secret()
    }

    /// Fire-and-forget delivery on a new task.
    ///
    /// The handle is only useful to tests; callers normally drop it.
    pub fn forward(&self, payload: Vec<u8>) -> JoinHandle<()> {
        let forwarder = self.clone();
        tokio::spawn(async move {
            match forwarder.deliver(&payload).await {
                Ok((signature, status)) if status.is_success() => {
                    log::debug!(
                        "[Forward] {} delivered to {} ({})",
                        signature.message_id,
                        forwarder.target,
                        status
                    );
                }
                Ok((signature, status)) => {
                    log::warn!(
                        "[Forward] {} rejected by {}: {}",
                        signature.message_id,
                        forwarder.target,
                        status
                    );
                }
                Err(e) => {
                    log::warn!("[Forward] Delivery to {} failed: {:#}", forwarder.target, e);
                }
            }
        })
    }

    /// Sign and POST `payload` once, returning the signature used and the
    /// response status.
    pub async fn deliver(
        &self,
        payload: &[u8],
    ) -> Result<(ForwardingSignature, reqwest::StatusCode)> {
        let signature = self.signer.signature_for(payload);

        let response = self
            .client
            .post(self.target.clone())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(HEADER_WEBHOOK_ID, &signature.message_id)
            .header(HEADER_WEBHOOK_TIMESTAMP, signature.timestamp.to_string())
            .header(HEADER_WEBHOOK_SIGNATURE, &signature.signature)
            .body(payload.to_vec())
            .send()
            .await
            .context("forward request failed")?;

        let status = response.status();
        Ok((signature, status))
    }
}

/// Parse and check a `--forward-to` value.
pub fn parse_target(raw: &str) -> Result<reqwest::Url> {
    let url = reqwest::Url::parse(raw).with_context(|| format!("invalid forward URL {raw:?}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        anyhow::bail!("invalid forward URL {raw:?}: scheme must be http or https");
    }
    if url.host_str().is_none() {
        anyhow::bail!("invalid forward URL {raw:?}: missing host");
    }
    Ok(url)
}
