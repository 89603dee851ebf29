use crate::{
    challenge::{self, PollHandle, WorkflowEndpoints},
    config::Config,
    identity::{self, Factor, UserId},
    outcome::Outcome,
    poller::{self, ChallengeKind, PollPolicy, Verification},
    transport::Transport,
    Error, Result,
};
use tracing::{error, info_span, Instrument, Span};

/// Push MFA client for one identity provider.
///
/// Holds no per-verification state: clones share the HTTP connection pool
/// and may run verifications concurrently.
#[derive(Debug, Clone)]
pub struct Client {
    transport: Transport,
    search_attribute: String,
    push_poll: PollPolicy,
    workflow_poll: PollPolicy,
    workflow: Option<WorkflowEndpoints>,
    span: Span,
}

impl Client {
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_span(config, info_span!("mfa_push"))
    }

    /// Build a client whose operation spans are children of `span`.
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn with_span(config: Config, span: Span) -> Result<Self> {
        let transport = Transport::new(&config)?;
        let workflow = config
            .workflow
            .as_ref()
            .map(WorkflowEndpoints::from_config)
            .transpose()?;

        Ok(Self {
            transport,
            search_attribute: config.search_attribute,
            push_poll: config.push_poll,
            workflow_poll: config.workflow_poll,
            workflow,
            span,
        })
    }

    #[must_use]
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// # Errors
    /// See [`identity::resolve_user_id`].
    pub async fn resolve_user_id(&self, username: &str) -> Result<UserId> {
        let span = info_span!(parent: &self.span, "mfa_push.resolve_user_id", user = %username);

        identity::resolve_user_id(&self.transport, username)
            .instrument(span)
            .await
    }

    /// Resolve a user by the configured search attribute.
    /// # Errors
    /// See [`identity::resolve_user_id_by_attribute`].
    pub async fn resolve_user_id_by_attribute(&self, value: &str) -> Result<UserId> {
        let span = info_span!(
            parent: &self.span,
            "mfa_push.resolve_user_id_by_attribute",
            attribute = %self.search_attribute,
            value = %value
        );

        identity::resolve_user_id_by_attribute(&self.transport, &self.search_attribute, value)
            .instrument(span)
            .await
    }

    /// # Errors
    /// See [`identity::get_push_factor`].
    pub async fn get_push_factor(&self, user_id: &UserId) -> Result<Option<Factor>> {
        let span = info_span!(parent: &self.span, "mfa_push.get_push_factor", user_id = %user_id);

        identity::get_push_factor(&self.transport, user_id)
            .instrument(span)
            .await
    }

    /// # Errors
    /// See [`challenge::initiate_push`].
    pub async fn initiate_push(&self, user_id: &UserId, factor_id: &str) -> Result<PollHandle> {
        let span = info_span!(
            parent: &self.span,
            "mfa_push.initiate_push",
            user_id = %user_id,
            factor_id = %factor_id
        );

        challenge::initiate_push(&self.transport, user_id, factor_id)
            .instrument(span)
            .await
    }

    /// # Errors
    /// Returns [`Error::Config`] when no workflow is configured, otherwise see
    /// [`challenge::initiate_async_challenge`].
    pub async fn initiate_async_challenge(&self, username: &str) -> Result<PollHandle> {
        let span = info_span!(parent: &self.span, "mfa_push.initiate_async_challenge", user = %username);

        self.async_challenge(username).instrument(span).await
    }

    /// Poll `handle` with the policy configured for its kind.
    /// # Errors
    /// See [`poller::wait_for`].
    pub async fn wait_for(&self, handle: PollHandle) -> Result<Verification> {
        let span = info_span!(parent: &self.span, "mfa_push.wait_for");

        self.poll(handle).instrument(span).await
    }

    /// Push-verify a user looked up by login.
    ///
    /// Lookup and initiation errors are returned. A user without a push
    /// factor, a rejection, a timeout and a failed poll all yield
    /// [`Outcome::Failure`].
    /// # Errors
    /// Returns an error if the user cannot be resolved or the push cannot be sent.
    pub async fn verify_user(&self, username: &str) -> Result<Outcome> {
        let span = info_span!(parent: &self.span, "mfa_push.verify_user", user = %username);

        async {
            let user_id = identity::resolve_user_id(&self.transport, username).await?;
            self.report_push(&user_id).await
        }
        .instrument(span)
        .await
    }

    /// Like [`Client::verify_user`], keeping rejection and timeout apart.
    /// # Errors
    /// Returns an error if the user cannot be resolved, has no push factor,
    /// the push cannot be sent, or polling fails.
    pub async fn verify_user_detailed(&self, username: &str) -> Result<Verification> {
        let span = info_span!(parent: &self.span, "mfa_push.verify_user", user = %username);

        async {
            let user_id = identity::resolve_user_id(&self.transport, username).await?;
            self.push_verify(&user_id).await
        }
        .instrument(span)
        .await
    }

    /// Push-verify a user found through the configured search attribute.
    /// # Errors
    /// Returns an error if no user matches, the search fails, or the push cannot be sent.
    pub async fn verify_user_by_attribute(&self, value: &str) -> Result<Outcome> {
        let span = info_span!(
            parent: &self.span,
            "mfa_push.verify_user_by_attribute",
            attribute = %self.search_attribute,
            value = %value
        );

        async {
            let user_id = identity::resolve_user_id_by_attribute(
                &self.transport,
                &self.search_attribute,
                value,
            )
            .await?;
            self.report_push(&user_id).await
        }
        .instrument(span)
        .await
    }

    /// # Errors
    /// Returns an error if no user matches, the user has no push factor,
    /// the push cannot be sent, or polling fails.
    pub async fn verify_user_by_attribute_detailed(&self, value: &str) -> Result<Verification> {
        let span = info_span!(
            parent: &self.span,
            "mfa_push.verify_user_by_attribute",
            attribute = %self.search_attribute,
            value = %value
        );

        async {
            let user_id = identity::resolve_user_id_by_attribute(
                &self.transport,
                &self.search_attribute,
                value,
            )
            .await?;
            self.push_verify(&user_id).await
        }
        .instrument(span)
        .await
    }

    /// Verify a user through the configured workflow challenge.
    /// # Errors
    /// Returns an error if no workflow is configured or the invocation fails.
    pub async fn verify_user_async(&self, username: &str) -> Result<Outcome> {
        let span = info_span!(parent: &self.span, "mfa_push.verify_user_async", user = %username);

        async {
            let handle = self.async_challenge(username).await?;
            Ok(self.report(handle).await)
        }
        .instrument(span)
        .await
    }

    /// # Errors
    /// Returns an error if no workflow is configured, the invocation fails, or polling fails.
    pub async fn verify_user_async_detailed(&self, username: &str) -> Result<Verification> {
        let span = info_span!(parent: &self.span, "mfa_push.verify_user_async", user = %username);

        async {
            let handle = self.async_challenge(username).await?;
            self.poll(handle).await
        }
        .instrument(span)
        .await
    }

    // Helpers below run in the caller's span; the public operations scope them.

    async fn async_challenge(&self, username: &str) -> Result<PollHandle> {
        let workflow = self
            .workflow
            .as_ref()
            .ok_or_else(|| Error::Config("workflow endpoints are not configured".to_string()))?;

        challenge::initiate_async_challenge(&self.transport, workflow, username).await
    }

    async fn poll(&self, handle: PollHandle) -> Result<Verification> {
        let policy = match handle.kind {
            ChallengeKind::Push => self.push_poll,
            ChallengeKind::Workflow => self.workflow_poll,
        };

        poller::wait_for(&self.transport, handle, policy).await
    }

    async fn push_challenge(&self, user_id: &UserId) -> Result<Option<PollHandle>> {
        let Some(factor) = identity::get_push_factor(&self.transport, user_id).await? else {
            return Ok(None);
        };

        challenge::initiate_push(&self.transport, user_id, &factor.id)
            .await
            .map(Some)
    }

    async fn push_verify(&self, user_id: &UserId) -> Result<Verification> {
        let handle = self
            .push_challenge(user_id)
            .await?
            .ok_or_else(|| Error::NoPushFactor(user_id.to_string()))?;

        self.poll(handle).await
    }

    async fn report_push(&self, user_id: &UserId) -> Result<Outcome> {
        match self.push_challenge(user_id).await? {
            Some(handle) => Ok(self.report(handle).await),
            None => Ok(Outcome::Failure),
        }
    }

    async fn report(&self, handle: PollHandle) -> Outcome {
        match self.poll(handle).await {
            Ok(verification) => Outcome::from(verification),
            Err(e) => {
                error!("polling failed: {}", e);
                Outcome::Failure
            }
        }
    }
}
