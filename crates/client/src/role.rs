//! Role resolution.
//!
//! Answers "what can this principal do" as a derived, cacheable fact. The
//! lookup is keyed by email, so a principal change is a new cache key by
//! construction and a stale role can never leak into the next principal's
//! authorization decisions. Sign-out invalidates the cache outright.

use life_shield_core::{Email, Role, RoleParseError};
use moka::future::Cache;
use serde::Deserialize;

use crate::backend::ApiClient;
use crate::session::SessionState;

/// Bounded cache size; one entry per signed-in principal in practice.
const ROLE_CACHE_CAPACITY: u64 = 64;

/// Errors from a role lookup.
#[derive(Debug, thiserror::Error)]
pub enum RoleError {
    /// The request itself failed (transport, authorization teardown).
    #[error(transparent)]
    Api(#[from] crate::backend::ApiError),

    /// The backend answered with a non-success status.
    #[error("role lookup rejected ({status})")]
    Status {
        /// The backend's response status.
        status: reqwest::StatusCode,
    },

    /// The response body could not be decoded.
    #[error("role response malformed: {0}")]
    Decode(#[from] reqwest::Error),

    /// The backend returned a role string outside the closed enumeration.
    #[error(transparent)]
    Parse(#[from] RoleParseError),
}

/// What a consumer knows about the principal's role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleLookup {
    /// The lookup has not run yet (session still resolving).
    Pending,
    /// The backend answered with a recognized role.
    Known(Role),
    /// No resolvable role: absent principal or a failed lookup. Guards
    /// treat this as "not yet authorized", never as a grant.
    Unknown,
}

#[derive(Deserialize)]
struct RolePayload {
    role: String,
}

/// Resolves and caches the role associated with a principal's email.
#[derive(Clone)]
pub struct RoleResolver {
    api: ApiClient,
    cache: Cache<Email, Role>,
}

impl RoleResolver {
    /// Create a resolver with its own cache.
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        Self::with_cache(api, Cache::new(ROLE_CACHE_CAPACITY))
    }

    /// Create a resolver sharing an externally owned cache (the forced
    /// sign-out hook invalidates through the same handle).
    #[must_use]
    pub(crate) fn with_cache(api: ApiClient, cache: Cache<Email, Role>) -> Self {
        Self { api, cache }
    }

    /// Default cache for [`RoleResolver::with_cache`] callers.
    #[must_use]
    pub(crate) fn default_cache() -> Cache<Email, Role> {
        Cache::new(ROLE_CACHE_CAPACITY)
    }

    /// Resolve the role for `email`, hitting the backend at most once per
    /// cached lifetime.
    ///
    /// # Errors
    ///
    /// A failed lookup leaves the role unknown; it is never substituted
    /// with a default.
    pub async fn resolve(&self, email: &Email) -> Result<Role, RoleError> {
        if let Some(role) = self.cache.get(email).await {
            return Ok(role);
        }
        let role = self.fetch(email).await?;
        self.cache.insert(email.clone(), role).await;
        Ok(role)
    }

    async fn fetch(&self, email: &Email) -> Result<Role, RoleError> {
        let path = format!("users/role/{}", urlencoding::encode(email.as_str()));
        let response = self.api.get(&path).await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RoleError::Status { status });
        }

        let payload: RolePayload = response.json().await?;
        Ok(payload.role.parse()?)
    }

    /// The consumer view for a session snapshot.
    ///
    /// Disabled while the session is resolving ([`RoleLookup::Pending`]);
    /// an absent principal or a failed lookup is [`RoleLookup::Unknown`].
    pub async fn lookup_for(&self, session: &SessionState) -> RoleLookup {
        if session.resolving {
            return RoleLookup::Pending;
        }
        let Some(email) = session.email() else {
            return RoleLookup::Unknown;
        };
        match self.resolve(email).await {
            Ok(role) => RoleLookup::Known(role),
            Err(err) => {
                tracing::warn!(error = %err, %email, "role lookup failed, treating role as unknown");
                RoleLookup::Unknown
            }
        }
    }

    /// Drop every cached role. Called on sign-out and forced teardown.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}
