use crate::{
    config::WorkflowConfig, identity::UserId, poller::ChallengeKind, transport::Transport, Error,
    Result,
};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::debug;
use url::Url;
use uuid::Uuid;

const CLIENT_TOKEN_PARAM: &str = "clientToken";
const TRANSACTION_ID_PARAM: &str = "transactionId";

/// Where and how to poll an initiated challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollHandle {
    pub url: Url,
    pub kind: ChallengeKind,
    /// Client-generated correlation id, workflow challenges only.
    pub transaction_id: Option<Uuid>,
}

impl PollHandle {
    #[must_use]
    pub fn push(url: Url) -> Self {
        Self {
            url,
            kind: ChallengeKind::Push,
            transaction_id: None,
        }
    }

    #[must_use]
    pub fn workflow(url: Url, transaction_id: Uuid) -> Self {
        Self {
            url,
            kind: ChallengeKind::Workflow,
            transaction_id: Some(transaction_id),
        }
    }
}

/// Parsed workflow endpoints; client tokens are only attached per request.
#[derive(Debug, Clone)]
pub struct WorkflowEndpoints {
    invoke_url: Url,
    invoke_token: SecretString,
    poll_url: Url,
    poll_token: SecretString,
}

impl WorkflowEndpoints {
    /// # Errors
    /// Returns an error if either workflow URL cannot be parsed.
    pub fn from_config(config: &WorkflowConfig) -> Result<Self> {
        let parse = |raw: &str, name: &str| {
            Url::parse(raw).map_err(|e| Error::Config(format!("invalid workflow {name} URL: {e}")))
        };

        Ok(Self {
            invoke_url: parse(&config.invoke_url, "invoke")?,
            invoke_token: config.invoke_token.clone(),
            poll_url: parse(&config.poll_url, "poll")?,
            poll_token: config.poll_token.clone(),
        })
    }

    fn invoke_url(&self) -> Url {
        let mut url = self.invoke_url.clone();
        url.query_pairs_mut()
            .append_pair(CLIENT_TOKEN_PARAM, self.invoke_token.expose_secret());
        url
    }

    fn poll_url(&self, transaction_id: &Uuid) -> Url {
        let mut url = self.poll_url.clone();
        url.query_pairs_mut()
            .append_pair(CLIENT_TOKEN_PARAM, self.poll_token.expose_secret())
            .append_pair(TRANSACTION_ID_PARAM, &transaction_id.to_string());
        url
    }
}

/// Send a push to `factor_id` and return its poll handle.
/// # Errors
/// Returns an error if the provider rejects the request or the response has no `_links.poll.href`.
pub async fn initiate_push(
    transport: &Transport,
    user_id: &UserId,
    factor_id: &str,
) -> Result<PollHandle> {
    let url = transport.api_url([
        "api",
        "v1",
        "users",
        user_id.as_str(),
        "factors",
        factor_id,
        "verify",
    ])?;

    let page = transport.post(&url, None).await?;

    let href = page
        .get("_links")
        .and_then(|v| v.get("poll"))
        .and_then(|v| v.get("href"))
        .and_then(Value::as_str)
        .ok_or_else(|| Error::MalformedResponse("no _links.poll.href found".to_string()))?;

    let poll_url = Url::parse(href)
        .map_err(|e| Error::MalformedResponse(format!("invalid poll href {href}: {e}")))?;

    debug!("push sent to factor {} of user {}", factor_id, user_id);

    Ok(PollHandle::push(poll_url))
}

/// Start a workflow challenge for `username` under a fresh transaction id.
///
/// The provider does not echo the transaction id back; the returned handle
/// carries the one generated here.
/// # Errors
/// Returns an error if the workflow invocation fails.
pub async fn initiate_async_challenge(
    transport: &Transport,
    workflow: &WorkflowEndpoints,
    username: &str,
) -> Result<PollHandle> {
    let transaction_id = Uuid::new_v4();

    let payload = json!({
        "username": username,
        "transactionId": transaction_id.to_string(),
    });

    transport.post(&workflow.invoke_url(), Some(&payload)).await?;

    debug!("workflow challenge {} started for {}", transaction_id, username);

    Ok(PollHandle::workflow(
        workflow.poll_url(&transaction_id),
        transaction_id,
    ))
}
