//! Authorized HTTP client for the Life Shield backend.
//!
//! Every outbound request is attributed to the current session: the client
//! reads the bearer token from durable storage before sending (absent token
//! means the request goes out unauthenticated - some endpoints are public),
//! and a 401/403 response tears the session down unless the user is already
//! on the sign-in route.
//!
//! Teardown and navigation are injected at construction ([`UnauthorizedHandler`]
//! and [`Navigator`]), not reached for through globals, which keeps the
//! client testable in isolation and makes the registration lifecycle
//! explicit: the hooks live and die with the client value.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, Response, StatusCode};
use serde::Serialize;
use url::Url;

use life_shield_core::RoutePath;

use crate::token::{TokenError, TokenStore};

/// Errors from requests through the authorized client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Network-level failure: no response was received. Never triggers
    /// session teardown.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend rejected the request's authorization (401/403). The
    /// session has been torn down unless the user was already on the
    /// sign-in route.
    #[error("authorization rejected ({status})")]
    Unauthorized {
        /// The rejecting status (401 or 403).
        status: StatusCode,
    },

    /// The stored token could not be read or cleared.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// The request path could not be joined onto the base URL.
    #[error("invalid request path: {0}")]
    Endpoint(#[from] url::ParseError),
}

/// Routing boundary the client needs: where the user is, and how to send
/// them somewhere else.
pub trait Navigator: Send + Sync {
    /// The route the user is currently on.
    fn current_location(&self) -> RoutePath;

    /// Perform a client-side redirect.
    fn navigate(&self, to: &RoutePath);
}

/// Session teardown hook invoked on an authorization failure, before the
/// stored token is cleared and navigation happens.
#[async_trait]
pub trait UnauthorizedHandler: Send + Sync {
    /// Invalidate the session (provider sign-out, cache invalidation).
    async fn on_unauthorized(&self);
}

/// HTTP client bound to the backend base URL.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    http: reqwest::Client,
    base: Url,
    tokens: Arc<dyn TokenStore>,
    navigator: Arc<dyn Navigator>,
    on_unauthorized: Arc<dyn UnauthorizedHandler>,
    sign_in_route: RoutePath,
}

impl ApiClient {
    /// Create a client.
    ///
    /// `base` should carry a trailing slash so request paths join under it.
    #[must_use]
    pub fn new(
        base: Url,
        tokens: Arc<dyn TokenStore>,
        navigator: Arc<dyn Navigator>,
        on_unauthorized: Arc<dyn UnauthorizedHandler>,
        sign_in_route: RoutePath,
    ) -> Self {
        Self {
            inner: Arc::new(ApiClientInner {
                http: reqwest::Client::new(),
                base,
                tokens,
                navigator,
                on_unauthorized,
                sign_in_route,
            }),
        }
    }

    /// Send a GET request.
    ///
    /// # Errors
    ///
    /// See [`ApiError`].
    pub async fn get(&self, path: &str) -> Result<Response, ApiError> {
        self.request::<()>(Method::GET, path, None).await
    }

    /// Send a POST request with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`ApiError`].
    pub async fn post<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Response, ApiError> {
        self.request(Method::POST, path, Some(body)).await
    }

    /// Send a PATCH request with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`ApiError`].
    pub async fn patch<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Response, ApiError> {
        self.request(Method::PATCH, path, Some(body)).await
    }

    /// Send a DELETE request.
    ///
    /// # Errors
    ///
    /// See [`ApiError`].
    pub async fn delete(&self, path: &str) -> Result<Response, ApiError> {
        self.request::<()>(Method::DELETE, path, None).await
    }

    async fn request<B: Serialize + Sync>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response, ApiError> {
        let url = self.inner.base.join(path.trim_start_matches('/'))?;
        let mut request = self.inner.http.request(method, url);

        // Attach the bearer credential when a token is stored; public
        // endpoints are still reachable without one.
        if let Some(token) = self.inner.tokens.load()? {
            request = request.bearer_auth(secrecy::ExposeSecret::expose_secret(&token));
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            self.handle_unauthorized(status).await;
            // The caller's failure path still executes.
            return Err(ApiError::Unauthorized { status });
        }

        // Everything else passes through unchanged; callers inspect the
        // status themselves.
        Ok(response)
    }

    async fn handle_unauthorized(&self, status: StatusCode) {
        let location = self.inner.navigator.current_location();
        if location.matches(&self.inner.sign_in_route) {
            // Already on the sign-in route: tearing down again would loop.
            tracing::debug!(%status, "authorization failure on the sign-in route, skipping teardown");
            return;
        }

        tracing::warn!(%status, %location, "authorization failure, tearing down session");
        self.inner.on_unauthorized.on_unauthorized().await;
        if let Err(err) = self.inner.tokens.clear() {
            tracing::warn!(error = %err, "failed to clear stored token during teardown");
        }
        self.inner.navigator.navigate(&self.inner.sign_in_route);
    }
}
