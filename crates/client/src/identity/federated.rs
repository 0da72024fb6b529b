//! Interactive federated sign-in flows.
//!
//! A federated sign-in is provider-driven: the client hands the user an
//! authorization URL, the provider runs its own interactive surface (popup,
//! redirect), and control returns through a callback carrying a one-time
//! code. The [`FederatedFlow`] models that round trip as an awaitable
//! completion: the provider resolves it when the callback arrives and
//! rejects it when the user abandons the flow, so the caller never hangs.

use life_shield_core::Principal;
use thiserror::Error;
use tokio::sync::oneshot;
use url::Url;

/// Errors terminating a federated sign-in attempt.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FederatedError {
    /// The user abandoned the flow (e.g. closed the popup).
    #[error("federated sign-in was cancelled")]
    Cancelled,

    /// The provider rejected the callback exchange.
    #[error("federated sign-in failed: {0}")]
    Failed(String),
}

/// A pending federated sign-in.
///
/// Hand [`FederatedFlow::authorize_url`] to the UI, then await
/// [`FederatedFlow::finish`]. The provider completes or cancels the flow by
/// its `state` parameter when the interactive surface reports back.
pub struct FederatedFlow {
    state: String,
    authorize_url: Url,
    completion: oneshot::Receiver<Result<Principal, FederatedError>>,
}

impl FederatedFlow {
    /// Create a flow handle. Called by providers when a flow begins.
    #[must_use]
    pub fn new(
        state: impl Into<String>,
        authorize_url: Url,
        completion: oneshot::Receiver<Result<Principal, FederatedError>>,
    ) -> Self {
        Self {
            state: state.into(),
            authorize_url,
            completion,
        }
    }

    /// The CSRF state identifying this flow at the provider.
    #[must_use]
    pub fn state(&self) -> &str {
        &self.state
    }

    /// The URL the user must visit to authenticate with the federated
    /// provider.
    #[must_use]
    pub fn authorize_url(&self) -> &Url {
        &self.authorize_url
    }

    /// Wait for the flow to complete.
    ///
    /// # Errors
    ///
    /// Returns [`FederatedError::Cancelled`] when the flow was abandoned
    /// (including the provider dropping the completion sender) and
    /// [`FederatedError::Failed`] when the callback exchange was rejected.
    pub async fn finish(self) -> Result<Principal, FederatedError> {
        match self.completion.await {
            Ok(outcome) => outcome,
            // Sender dropped without a verdict: the flow was abandoned.
            Err(_) => Err(FederatedError::Cancelled),
        }
    }
}
