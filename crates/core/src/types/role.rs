//! Authorization roles.

use serde::{Deserialize, Serialize};

/// Error returned when a role string from the backend is not recognized.
#[derive(thiserror::Error, Debug, Clone)]
#[error("unrecognized role: {0}")]
pub struct RoleParseError(pub String);

/// Coarse-grained authorization category for a principal.
///
/// The backend is the authority on role assignment; the client only parses
/// the lookup result into this closed enumeration and matches on it
/// exhaustively at guard sites. A string the backend returns that is not one
/// of these values is an error, never a default role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// A policyholder or prospective policyholder.
    Customer,
    /// A brokerage agent managing applications and claims.
    Agent,
    /// A platform administrator.
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Customer => write!(f, "customer"),
            Self::Agent => write!(f, "agent"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = RoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "customer" => Ok(Self::Customer),
            "agent" => Ok(Self::Agent),
            "admin" => Ok(Self::Admin),
            _ => Err(RoleParseError(s.to_owned())),
        }
    }
}
