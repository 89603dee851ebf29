//! HTTP transport for the identity provider REST API.
//!
//! All requests share one `reqwest` client carrying the fixed identity
//! headers (`Authorization`, `Accept`, `User-Agent`). Rate-limited responses
//! and failed connections are retried according to [`RetryPolicy`]; any other non-success status is
//! surfaced as [`Error::Http`] with the parsed body, so callers only ever see
//! JSON on success.

pub mod retry;

use crate::{config::Config, Error, Result};
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION},
    Method, Response,
};
use retry::RetryPolicy;
use secrecy::ExposeSecret;
use serde_json::Value;
use std::{sync::Arc, time::Duration};
use tokio::time::sleep;
use tracing::{debug, info_span, warn, Instrument};
use url::Url;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct Transport {
    inner: Arc<TransportInner>,
}

#[derive(Debug)]
struct TransportInner {
    client: reqwest::Client,
    base_url: Url,
    retry: RetryPolicy,
}

impl Transport {
    /// # Errors
    /// Returns an error if the base URL or credential is invalid, or the HTTP client cannot be constructed.
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = config.base_url()?;

        let mut authorization = HeaderValue::from_str(&format!(
            "{} {}",
            config.auth_scheme,
            config.api_token.expose_secret()
        ))
        .map_err(|_| Error::Config("API token is not a valid header value".to_string()))?;
        authorization.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, authorization);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            inner: Arc::new(TransportInner {
                client,
                base_url,
                retry: config.retry.clone(),
            }),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Append percent-encoded path segments to the base URL.
    /// # Errors
    /// Returns an error if the base URL cannot carry a path.
    pub fn api_url<I>(&self, segments: I) -> Result<Url>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut url = self.inner.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| Error::Config("base URL cannot carry a path".to_string()))?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    /// # Errors
    /// Returns an error if the request fails or the provider answers with a non-success status.
    pub async fn get(&self, url: &Url) -> Result<Value> {
        self.send(Method::GET, url, None).await
    }

    /// # Errors
    /// Returns an error if the request fails or the provider answers with a non-success status.
    pub async fn post(&self, url: &Url, body: Option<&Value>) -> Result<Value> {
        self.send(Method::POST, url, body).await
    }

    async fn send(&self, method: Method, url: &Url, body: Option<&Value>) -> Result<Value> {
        let span = info_span!(
            "mfa_push.request",
            http.method = %method,
            url = %display_url(url)
        );

        async {
            let mut attempt = 0;
            loop {
                let mut request = self.inner.client.request(method.clone(), url.clone());
                if let Some(body) = body {
                    request = request.json(body);
                }

                let response = match request.send().await {
                    Ok(response) => response,
                    Err(e) if self.inner.retry.should_retry_error(attempt, &method, &e) => {
                        let delay = self.inner.retry.delay_for(attempt);
                        warn!(
                            attempt = attempt + 1,
                            max_retries = self.inner.retry.max_retries,
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            "request failed: {}, backing off",
                            e
                        );
                        sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                };
                let status = response.status();

                if self.inner.retry.should_retry(attempt, status) {
                    let delay = self.inner.retry.delay_for_response(attempt, &response);
                    warn!(
                        attempt = attempt + 1,
                        max_retries = self.inner.retry.max_retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "rate limited, backing off"
                    );
                    sleep(delay).await;
                    attempt += 1;
                    continue;
                }

                return parse_response(response).await;
            }
        }
        .instrument(span)
        .await
    }
}

async fn parse_response(response: Response) -> Result<Value> {
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        let body = serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text));
        debug!("request failed: {}", status);

        return Err(Error::Http {
            status: status.as_u16(),
            body,
        });
    }

    if text.trim().is_empty() {
        return Ok(Value::Null);
    }

    Ok(serde_json::from_str(&text)?)
}

// Query strings may carry client tokens; keep them out of logs.
fn display_url(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}
