//! Principal domain types.
//!
//! These types mirror the shape the identity provider returns for a
//! signed-in identity, separate from any backend user record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Email;

/// The authenticated identity representing the signed-in user.
///
/// Created when the identity provider confirms credentials or a federated
/// login; set to absent on sign-out or session expiry. The session store
/// owns the current `Principal`; everything else holds a read reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// The principal's unique identifier.
    pub email: Email,
    /// Display name, if the provider has one.
    #[serde(rename = "displayName")]
    pub display_name: Option<String>,
    /// Reference to the principal's photo, if any.
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
    /// Provider-recorded account metadata.
    pub metadata: PrincipalMetadata,
}

/// Account metadata reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalMetadata {
    /// When the account was created at the provider.
    #[serde(rename = "creationTime")]
    pub creation_time: DateTime<Utc>,
    /// When the account last signed in.
    #[serde(rename = "lastSignInTime")]
    pub last_sign_in_time: DateTime<Utc>,
}
