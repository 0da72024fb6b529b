//! Life Shield authenticated-session core.
//!
//! Coordinates external identity state, token storage, request
//! authorization, and route-level access control for the Life Shield
//! client:
//!
//! - [`session`] - single source of truth for "who is signed in", driven by
//!   one subscription to the identity provider
//! - [`token`] - exchanges an authenticated email for a backend bearer
//!   token and persists it durably
//! - [`backend`] - HTTP client that attaches the bearer token and tears the
//!   session down on authorization failures
//! - [`role`] - derives the principal's authorization role, cached per
//!   email
//! - [`guard`] - route guards gating protected subtrees on session and role
//!   resolution
//! - [`context`] - the composition root wiring the above together
//!
//! Business logic (policies, applications, payments) lives in the backend;
//! this crate only guarantees that calls made through the authorized client
//! are attributed to the current session.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod backend;
pub mod config;
pub mod context;
pub mod guard;
pub mod identity;
pub mod role;
pub mod session;
pub mod token;

pub use backend::{ApiClient, ApiError, Navigator, UnauthorizedHandler};
pub use config::{ClientConfig, ConfigError, IdentityConfig};
pub use context::{AuthContext, SignInError};
pub use guard::{GuardPolicy, GuardState, Redirect};
pub use identity::{
    AuthError, AuthStateChanges, FederatedError, FederatedFlow, IdentityProvider,
    RestIdentityProvider,
};
pub use role::{RoleError, RoleLookup, RoleResolver};
pub use session::{SessionState, SessionStore};
pub use token::{
    ACCESS_TOKEN_KEY, FileTokenStore, MemoryTokenStore, TokenBridge, TokenError, TokenStore,
};
