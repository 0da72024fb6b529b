//! Core types for Life Shield.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod principal;
pub mod role;
pub mod route;

pub use email::{Email, EmailError};
pub use principal::{Principal, PrincipalMetadata};
pub use role::{Role, RoleParseError};
pub use route::RoutePath;
