//! Stream initiation against the AhaSend API.
//!
//! A listen session starts by asking the API for a stream handle, either for
//! an existing webhook/route (`--webhook-id` / `--route-id`) or for a
//! temporary one scoped to a recipient pattern (`--recipient`). Flags are
//! validated by [`StreamTarget::from_flags`] before any request is made.

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::types::{StreamHandle, StreamKind};
use crate::constants::{self, MAX_RECIPIENT_WILDCARDS};

/// What the stream should be bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamTarget {
    /// An existing webhook or route.
    Existing(String),
    /// A server-created temporary stream for matching recipients.
    Recipient(String),
}

impl StreamTarget {
    /// Validate the id / recipient flag pair.
    ///
    /// Empty strings count as unset. Exactly one of the two must be given;
    /// a recipient must contain `@` and at most two `*` wildcards.
    pub fn from_flags(kind: StreamKind, id: Option<&str>, recipient: Option<&str>) -> Result<Self> {
        let id = id.map(str::trim).filter(|s| !s.is_empty());
        let recipient = recipient.map(str::trim).filter(|s| !s.is_empty());

        match (id, recipient) {
            (None, None) => {
                anyhow::bail!("either {} or --recipient must be provided", kind.id_flag())
            }
            (Some(_), Some(_)) => anyhow::bail!(
                "only one of {} or --recipient can be provided, not both",
                kind.id_flag()
            ),
            (Some(id), None) => Ok(Self::Existing(id.to_string())),
            (None, Some(pattern)) => {
                validate_recipient(pattern)?;
                Ok(Self::Recipient(pattern.to_string()))
            }
        }
    }
}

/// Check a recipient pattern such as `*@example.com`.
pub fn validate_recipient(pattern: &str) -> Result<()> {
    if !pattern.contains('@') {
        anyhow::bail!("recipient must be an email pattern containing '@' (got {pattern:?})");
    }
    let wildcards = pattern.matches('*').count();
    if wildcards > MAX_RECIPIENT_WILDCARDS {
        anyhow::bail!(
            "recipient pattern {pattern:?} has too many wildcards ({wildcards}, max {MAX_RECIPIENT_WILDCARDS})"
        );
    }
    Ok(())
}

/// REST collaborator that hands out stream handles.
#[async_trait]
pub trait StreamApi: Send + Sync {
    /// Ask the server for a stream of `kind` bound to `target`.
    async fn initiate_stream(
        &self,
        kind: StreamKind,
        target: &StreamTarget,
    ) -> Result<StreamHandle>;
}

/// Request a stream handle, wrapping failures with context.
///
/// No retry happens here.
pub async fn initiate(
    api: &dyn StreamApi,
    kind: StreamKind,
    target: &StreamTarget,
) -> Result<StreamHandle> {
    let handle = api
        .initiate_stream(kind, target)
        .await
        .with_context(|| format!("failed to initiate {kind} stream"))?;
    log::info!(
        "[Api] Stream {} ready at {}",
        handle.id,
        handle.websocket_url
    );
    Ok(handle)
}

/// `reqwest`-backed [`StreamApi`].
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    account_id: String,
}

impl ApiClient {
    /// Creates a new API client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(api_url: &str, api_key: &str, account_id: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(constants::HTTP_REQUEST_TIMEOUT)
            .user_agent(constants::user_agent())
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            account_id: account_id.to_string(),
        })
    }

    fn stream_url(&self, kind: StreamKind) -> String {
        format!(
            "{}/v2/accounts/{}/{}/stream",
            self.api_url, self.account_id, kind.path_segment()
        )
    }
}

#[async_trait]
impl StreamApi for ApiClient {
    async fn initiate_stream(
        &self,
        kind: StreamKind,
        target: &StreamTarget,
    ) -> Result<StreamHandle> {
        let (param, value) = match target {
            StreamTarget::Existing(id) => (kind.id_param(), id.as_str()),
            StreamTarget::Recipient(pattern) => ("recipient", pattern.as_str()),
        };

        let url = self.stream_url(kind);
        log::debug!("[Api] POST {url}");

        let response = self
            .client
            .post(&url)
            .query(&[(param, value)])
            .bearer_auth(&self.api_key)
            .send()
            .await
            .context("stream initiation request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Server returned {}: {}", status, body.trim());
        }

        response
            .json::<StreamHandle>()
            .await
            .context("Invalid stream initiation response")
    }
}
