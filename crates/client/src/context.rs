//! Composition root for the authenticated-session core.
//!
//! `AuthContext` is an explicit context object with a defined construction
//! and teardown lifecycle: it is built once at application start, passed
//! down to consumers, and dropped on shutdown (which tears down the
//! session store's provider subscription). Nothing in this crate mutates
//! ambient global state.

use std::sync::Arc;

use async_trait::async_trait;
use moka::future::Cache;

use life_shield_core::{Email, Role};

use crate::backend::{ApiClient, Navigator, UnauthorizedHandler};
use crate::config::ClientConfig;
use crate::guard::GuardPolicy;
use crate::identity::{AuthError, FederatedError, FederatedFlow, IdentityProvider};
use crate::role::RoleResolver;
use crate::session::SessionStore;
use crate::token::{TokenBridge, TokenError, TokenStore};

/// Errors from a sign-in or registration attempt.
#[derive(Debug, thiserror::Error)]
pub enum SignInError {
    /// The identity provider rejected the credential operation; the user is
    /// not signed in.
    #[error(transparent)]
    Credential(#[from] AuthError),

    /// The federated flow failed or was abandoned; the session is
    /// unchanged.
    #[error(transparent)]
    Federated(#[from] FederatedError),

    /// The provider authenticated the user but backend token issuance
    /// failed. The session stands: the user is provider-authenticated and
    /// backend-degraded until the exchange is retried.
    #[error("token exchange failed: {0}")]
    TokenExchange(#[from] TokenError),
}

/// Forced-teardown hook handed to the authorized HTTP client.
struct ForcedSignOut {
    provider: Arc<dyn IdentityProvider>,
    roles: Cache<Email, Role>,
}

#[async_trait]
impl UnauthorizedHandler for ForcedSignOut {
    async fn on_unauthorized(&self) {
        if let Err(err) = self.provider.sign_out().await {
            tracing::warn!(error = %err, "provider sign-out failed during forced teardown");
        }
        self.roles.invalidate_all();
    }
}

/// The wired-up authenticated-session core.
pub struct AuthContext {
    session: SessionStore,
    tokens: Arc<dyn TokenStore>,
    bridge: TokenBridge,
    api: ApiClient,
    roles: RoleResolver,
    guards: GuardPolicy,
}

impl AuthContext {
    /// Wire the core together.
    ///
    /// Must be called on a Tokio runtime (the session store spawns its
    /// subscription task here).
    #[must_use]
    pub fn new(
        config: &ClientConfig,
        provider: Arc<dyn IdentityProvider>,
        navigator: Arc<dyn Navigator>,
        tokens: Arc<dyn TokenStore>,
    ) -> Self {
        let session = SessionStore::new(Arc::clone(&provider));

        let role_cache = RoleResolver::default_cache();
        let handler = Arc::new(ForcedSignOut {
            provider,
            roles: role_cache.clone(),
        });

        let api = ApiClient::new(
            config.backend_url.clone(),
            Arc::clone(&tokens),
            navigator,
            handler,
            config.sign_in_route.clone(),
        );
        let bridge = TokenBridge::new(config.backend_url.clone(), Arc::clone(&tokens));
        let roles = RoleResolver::with_cache(api.clone(), role_cache);
        let guards = config.guard_policy();

        Self {
            session,
            tokens,
            bridge,
            api,
            roles,
            guards,
        }
    }

    /// Register a new account, then mint a backend token for it.
    ///
    /// # Errors
    ///
    /// [`SignInError::Credential`] when the provider rejects registration;
    /// [`SignInError::TokenExchange`] when the provider succeeded but
    /// backend issuance failed (the session stands).
    pub async fn register(&self, email: &Email, password: &str) -> Result<(), SignInError> {
        self.session.create_user(email, password).await?;
        self.issue_token(email).await
    }

    /// Sign in with existing credentials, then mint a backend token.
    ///
    /// # Errors
    ///
    /// [`SignInError::Credential`] (specifically
    /// [`AuthError::InvalidCredentials`] for a wrong pair) when the
    /// provider rejects the sign-in; [`SignInError::TokenExchange`] when
    /// only token issuance failed.
    pub async fn sign_in(&self, email: &Email, password: &str) -> Result<(), SignInError> {
        self.session.sign_in(email, password).await?;
        self.issue_token(email).await
    }

    /// Complete a federated sign-in, then mint a backend token.
    ///
    /// # Errors
    ///
    /// [`SignInError::Federated`] when the flow failed or was abandoned;
    /// [`SignInError::TokenExchange`] when only token issuance failed.
    pub async fn sign_in_federated(&self, flow: FederatedFlow) -> Result<(), SignInError> {
        let principal = self.session.sign_in_federated(flow).await?;
        self.issue_token(&principal.email).await
    }

    async fn issue_token(&self, email: &Email) -> Result<(), SignInError> {
        if let Err(err) = self.bridge.exchange_for_token(email).await {
            tracing::warn!(
                error = %err,
                "token exchange failed; session is provider-authenticated but backend-degraded"
            );
            return Err(SignInError::TokenExchange(err));
        }
        Ok(())
    }

    /// Sign out: provider invalidation, token slot cleared, role cache
    /// dropped.
    ///
    /// # Errors
    ///
    /// Propagates the provider's rejection. Local cleanup (token, role
    /// cache) runs regardless.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        let result = self.session.sign_out().await;
        if let Err(err) = self.tokens.clear() {
            tracing::warn!(error = %err, "failed to clear stored token on sign-out");
        }
        self.roles.invalidate_all();
        result
    }

    /// The session store.
    #[must_use]
    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    /// The authorized HTTP client for backend calls.
    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// The role resolver.
    #[must_use]
    pub fn roles(&self) -> &RoleResolver {
        &self.roles
    }

    /// The guard policy.
    #[must_use]
    pub fn guards(&self) -> &GuardPolicy {
        &self.guards
    }
}
