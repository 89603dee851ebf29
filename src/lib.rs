//! # mfa-push
//!
//! Client-side orchestration of push-factor MFA against an Okta-style
//! identity provider: resolve the user, find their push factor, send the
//! challenge, and wait for the answer from their device.
//!
//! ## Flow
//!
//! 1. **Identity** ([`identity`]): user by login or by a profile attribute
//!    search, then the first enrolled `push` factor.
//! 2. **Challenge** ([`challenge`]): `POST .../verify` returns the poll link;
//!    workflow challenges use a client-generated transaction id instead.
//! 3. **Polling** ([`poller`]): a spawned task samples the poll link at a
//!    fixed interval until the provider answers or the deadline passes.
//! 4. **Outcome** ([`outcome`]): the result is reduced to success or failure.
//!
//! All HTTP goes through [`transport::Transport`], which attaches the API
//! credential and retries rate-limited (`429`) responses with exponential
//! backoff.
//!
//! ## Outcomes
//!
//! [`Client::verify_user`] and friends return [`Outcome::Failure`] for an
//! explicit rejection and for a challenge nobody answered alike. The
//! `*_detailed` variants return [`Verification`], which keeps `Rejected` and
//! `TimedOut` apart.
//!
//! ```no_run
//! use mfa_push::{Client, Config, Outcome};
//! use secrecy::SecretString;
//!
//! # async fn run() -> mfa_push::Result<()> {
//! let config = Config::new("example.okta.com", SecretString::from("api-token".to_string()));
//! let client = Client::new(config)?;
//!
//! if client.verify_user("jdoe@example.com").await? == Outcome::Success {
//!     println!("approved");
//! }
//! # Ok(())
//! # }
//! ```

pub mod challenge;
pub mod client;
pub mod config;
pub mod error;
pub mod identity;
pub mod outcome;
pub mod poller;
pub mod telemetry;
pub mod transport;

pub use challenge::PollHandle;
pub use client::Client;
pub use config::{Config, WorkflowConfig};
pub use error::{Error, Result};
pub use identity::{Factor, UserId};
pub use outcome::Outcome;
pub use poller::{ChallengeKind, PollPolicy, Verification};
pub use transport::retry::RetryPolicy;

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
