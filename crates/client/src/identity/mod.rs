//! Identity provider boundary.
//!
//! The identity provider is a third-party service that owns credential
//! policy (password strength, duplicate accounts) and the notion of "who is
//! signed in". This module defines the trait the rest of the crate consumes,
//! the error taxonomy for provider operations, and the state-change
//! subscription abstraction.
//!
//! Subscriptions follow an explicit ownership model: [`IdentityProvider::subscribe`]
//! returns a receiver, and dropping that receiver is the unsubscribe. The
//! session store holds exactly one.

pub mod federated;
pub mod rest;

pub use federated::{FederatedError, FederatedFlow};
pub use rest::RestIdentityProvider;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use life_shield_core::{Email, EmailError, Principal};

/// Errors that can occur during identity provider operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    /// Wrong email/password pair at sign-in.
    ///
    /// Kept distinct from other credential errors so the UI can show a
    /// specific message.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// An account with this email already exists.
    #[error("an account with this email is already registered")]
    AlreadyRegistered,

    /// Password rejected by the identity provider's policy.
    #[error("password rejected: {0}")]
    WeakPassword(String),

    /// No federated sign-in is pending under the presented state parameter.
    #[error("no federated sign-in pending for this state")]
    UnknownFederatedState,

    /// Provider endpoint URL could not be constructed.
    #[error("invalid identity endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    /// The provider could not be reached.
    #[error("identity provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider responded with something the client cannot interpret.
    #[error("identity provider error: {0}")]
    Provider(String),
}

/// A stream of authentication state changes.
///
/// Each item is the full new principal value (`None` after sign-out), so a
/// consumer always observes a complete, consistent state rather than a
/// delta. Dropping the stream unsubscribes.
pub struct AuthStateChanges {
    rx: mpsc::UnboundedReceiver<Option<Principal>>,
}

impl AuthStateChanges {
    /// Wrap a raw receiver. Providers call this from `subscribe`.
    #[must_use]
    pub fn new(rx: mpsc::UnboundedReceiver<Option<Principal>>) -> Self {
        Self { rx }
    }

    /// Wait for the next state change.
    ///
    /// Returns `None` once the provider has been dropped and no further
    /// changes can arrive.
    pub async fn next(&mut self) -> Option<Option<Principal>> {
        self.rx.recv().await
    }
}

/// Operations the identity provider exposes to this client.
///
/// Credential operations do not return the principal: the authoritative
/// update arrives through the subscription, keeping a single writer for
/// session state. Callers must not assume the principal is current the
/// moment an operation resolves.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Begin credential creation for a new account.
    ///
    /// # Errors
    ///
    /// Fails with [`AuthError::AlreadyRegistered`] or
    /// [`AuthError::WeakPassword`] when the provider rejects the input.
    async fn create_user(&self, email: &Email, password: &str) -> Result<(), AuthError>;

    /// Sign in with existing credentials.
    ///
    /// # Errors
    ///
    /// Fails with [`AuthError::InvalidCredentials`] for a wrong
    /// email/password pair, distinctly from other provider errors.
    async fn sign_in(&self, email: &Email, password: &str) -> Result<(), AuthError>;

    /// Ask the provider to invalidate the current session.
    ///
    /// On completion the subscription fires with an absent principal.
    ///
    /// # Errors
    ///
    /// Fails if the provider rejects the request outright.
    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Start an interactive federated sign-in flow.
    ///
    /// The returned flow carries the URL to present to the user and a
    /// completion handle; abandoning the flow rejects it with
    /// [`FederatedError::Cancelled`] rather than hanging.
    ///
    /// # Errors
    ///
    /// Fails if the flow cannot be initiated.
    async fn begin_federated(&self) -> Result<FederatedFlow, AuthError>;

    /// Subscribe to authentication state changes.
    ///
    /// The current state is delivered immediately as the first item, so a
    /// new subscriber never waits for an unrelated event to learn whether
    /// someone is signed in.
    fn subscribe(&self) -> AuthStateChanges;
}
