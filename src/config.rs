use crate::{poller::PollPolicy, transport::retry::RetryPolicy, Error, Result, APP_USER_AGENT};
use secrecy::SecretString;
use std::env;
use tracing::debug;
use url::Url;

pub const HOST_ENV: &str = "MFA_PUSH_HOST";
pub const API_TOKEN_ENV: &str = "MFA_PUSH_API_TOKEN";

pub const DEFAULT_AUTH_SCHEME: &str = "SSWS";
pub const DEFAULT_SEARCH_ATTRIBUTE: &str = "profile.samAccountName";

/// Endpoints of the workflow that delivers asynchronous challenges.
///
/// Each endpoint authenticates with its own client token, sent as the
/// `clientToken` query parameter.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub invoke_url: String,
    pub invoke_token: SecretString,
    pub poll_url: String,
    pub poll_token: SecretString,
}

impl WorkflowConfig {
    #[must_use]
    pub fn new(
        invoke_url: impl Into<String>,
        invoke_token: SecretString,
        poll_url: impl Into<String>,
        poll_token: SecretString,
    ) -> Self {
        Self {
            invoke_url: invoke_url.into(),
            invoke_token,
            poll_url: poll_url.into(),
            poll_token,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Identity provider host, either bare (`example.okta.com`) or a full URL.
    pub host: String,
    pub api_token: SecretString,
    pub auth_scheme: String,
    pub user_agent: String,
    /// Profile attribute matched by `resolve_user_id_by_attribute`.
    pub search_attribute: String,
    pub retry: RetryPolicy,
    pub push_poll: PollPolicy,
    pub workflow_poll: PollPolicy,
    pub workflow: Option<WorkflowConfig>,
}

impl Config {
    #[must_use]
    pub fn new(host: impl Into<String>, api_token: SecretString) -> Self {
        Self {
            host: host.into(),
            api_token,
            auth_scheme: DEFAULT_AUTH_SCHEME.to_string(),
            user_agent: APP_USER_AGENT.to_string(),
            search_attribute: DEFAULT_SEARCH_ATTRIBUTE.to_string(),
            retry: RetryPolicy::default(),
            push_poll: PollPolicy::push(),
            workflow_poll: PollPolicy::workflow(),
            workflow: None,
        }
    }

    /// Build a config from `MFA_PUSH_HOST` and `MFA_PUSH_API_TOKEN`.
    /// # Errors
    /// Returns an error if either variable is unset or empty.
    pub fn from_env() -> Result<Self> {
        let host = non_empty_var(HOST_ENV)?;
        let api_token = non_empty_var(API_TOKEN_ENV)?;

        Ok(Self::new(host, SecretString::from(api_token)))
    }

    #[must_use]
    pub fn with_auth_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.auth_scheme = scheme.into();
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub fn with_search_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.search_attribute = attribute.into();
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_push_poll(mut self, policy: PollPolicy) -> Self {
        self.push_poll = policy;
        self
    }

    #[must_use]
    pub fn with_workflow_poll(mut self, policy: PollPolicy) -> Self {
        self.workflow_poll = policy;
        self
    }

    #[must_use]
    pub fn with_workflow(mut self, workflow: WorkflowConfig) -> Self {
        self.workflow = Some(workflow);
        self
    }

    /// Resolve `host` into the API base URL.
    /// # Errors
    /// Returns an error if the host cannot be parsed, has no host part, or uses an unsupported scheme.
    pub fn base_url(&self) -> Result<Url> {
        let host = self.host.trim();

        if host.is_empty() {
            return Err(Error::Config("host is empty".to_string()));
        }

        let url = if host.contains("://") {
            Url::parse(host)?
        } else {
            Url::parse(&format!("https://{host}"))?
        };

        match url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(Error::Config(format!("unsupported scheme {scheme}")));
            }
        }

        if url.host().is_none() {
            return Err(Error::Config("no host specified".to_string()));
        }

        debug!("base URL: {}", url);

        Ok(url)
    }
}

fn non_empty_var(name: &str) -> Result<String> {
    match env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(Error::Config(format!("{name} is not set"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use secrecy::ExposeSecret;
    use std::time::Duration;

    fn config(host: &str) -> Config {
        Config::new(host, SecretString::from("token".to_string()))
    }

    #[test]
    fn defaults() {
        let config = config("example.okta.com");
        assert_eq!(config.auth_scheme, "SSWS");
        assert_eq!(config.search_attribute, "profile.samAccountName");
        assert_eq!(config.user_agent, APP_USER_AGENT);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.push_poll.interval, Duration::from_secs(4));
        assert_eq!(config.push_poll.deadline, Duration::from_secs(60));
        assert_eq!(config.workflow_poll.interval, Duration::from_secs(20));
        assert_eq!(config.workflow_poll.deadline, Duration::from_secs(100));
        assert!(config.workflow.is_none());
    }

    #[test]
    fn base_url_defaults_to_https() -> Result<()> {
        let url = config("example.okta.com").base_url()?;
        assert_eq!(url.as_str(), "https://example.okta.com/");
        Ok(())
    }

    #[test]
    fn base_url_keeps_explicit_scheme_and_port() -> Result<()> {
        let url = config("http://127.0.0.1:8080").base_url()?;
        assert_eq!(url.as_str(), "http://127.0.0.1:8080/");
        Ok(())
    }

    #[test]
    fn base_url_rejects_unsupported_scheme() -> Result<()> {
        let err = config("ftp://example.com")
            .base_url()
            .err()
            .ok_or_else(|| anyhow!("expected error"))?;
        assert!(err.to_string().contains("unsupported scheme"));
        Ok(())
    }

    #[test]
    fn base_url_rejects_empty_host() {
        assert!(matches!(config("  ").base_url(), Err(Error::Config(_))));
    }

    #[test]
    fn from_env_reads_host_and_token() {
        temp_env::with_vars(
            [
                (HOST_ENV, Some("example.okta.com")),
                (API_TOKEN_ENV, Some("api-token")),
            ],
            || {
                let config = Config::from_env();
                assert!(config.is_ok());
                if let Ok(config) = config {
                    assert_eq!(config.host, "example.okta.com");
                    assert_eq!(config.api_token.expose_secret(), "api-token");
                }
            },
        );
    }

    #[test]
    fn from_env_requires_token() {
        temp_env::with_vars(
            [
                (HOST_ENV, Some("example.okta.com")),
                (API_TOKEN_ENV, None),
            ],
            || {
                let err = Config::from_env().err();
                assert!(matches!(err, Some(Error::Config(msg)) if msg.contains(API_TOKEN_ENV)));
            },
        );
    }

    #[test]
    fn debug_output_redacts_token() {
        let rendered = format!("{:?}", config("example.okta.com"));
        assert!(!rendered.contains("\"token\""));
    }
}
