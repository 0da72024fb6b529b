//! Token bridge and durable token storage.
//!
//! The token bridge converts "this email is authenticated at the identity
//! provider" into "the backend trusts this client": it exchanges the email
//! for a backend-issued bearer token and persists it. Persistence goes
//! through the [`TokenStore`] trait so the HTTP client and tests can share
//! the same single-slot contract.
//!
//! A token present in storage is no proof of validity; the backend is the
//! sole authority, and the authorized HTTP client treats a 401/403 as proof
//! of invalidity regardless of local presence.

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use url::Url;

use life_shield_core::Email;

/// Fixed storage key under which the bearer token persists.
pub const ACCESS_TOKEN_KEY: &str = "access-token";

/// Errors from token exchange or storage.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// Reading or writing the durable storage slot failed.
    #[error("token storage error: {0}")]
    Storage(#[from] io::Error),

    /// The token-issuance endpoint could not be reached.
    #[error("token exchange request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend refused to issue a token.
    #[error("token exchange rejected ({status})")]
    Exchange {
        /// The backend's response status.
        status: reqwest::StatusCode,
    },

    /// The token endpoint URL could not be constructed.
    #[error("invalid token endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

/// Durable single-slot storage for the bearer token.
///
/// One global mutable cell: the token bridge writes, the authorized HTTP
/// client reads (and clears on forced sign-out). Writes replace the entire
/// value; there is no partial-token state.
pub trait TokenStore: Send + Sync {
    /// Load the stored token, if any.
    ///
    /// # Errors
    ///
    /// Fails when the storage backend cannot be read.
    fn load(&self) -> Result<Option<SecretString>, TokenError>;

    /// Replace the stored token atomically.
    ///
    /// # Errors
    ///
    /// Fails when the storage backend cannot be written.
    fn save(&self, token: &SecretString) -> Result<(), TokenError>;

    /// Remove the stored token. Clearing an empty slot is not an error.
    ///
    /// # Errors
    ///
    /// Fails when the storage backend cannot be written.
    fn clear(&self) -> Result<(), TokenError>;
}

/// In-memory token store, for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryTokenStore {
    slot: Mutex<Option<SecretString>>,
}

impl MemoryTokenStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<SecretString>, TokenError> {
        Ok(self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, token: &SecretString) -> Result<(), TokenError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), TokenError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

/// File-backed token store that survives application restarts.
///
/// The token lives in a file named [`ACCESS_TOKEN_KEY`] under the given
/// directory. Saves write a sibling temp file and rename it over the slot,
/// so a reader never observes a partial token.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Create a store rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            path: dir.into().join(ACCESS_TOKEN_KEY),
        }
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<SecretString>, TokenError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(Some(SecretString::from(contents))),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(TokenError::Storage(err)),
        }
    }

    fn save(&self, token: &SecretString) -> Result<(), TokenError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let staging = self.path.with_extension("tmp");
        std::fs::write(&staging, token.expose_secret())?;
        std::fs::rename(&staging, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), TokenError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(TokenError::Storage(err)),
        }
    }
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    email: &'a str,
}

#[derive(Deserialize)]
struct TokenIssued {
    token: String,
}

/// Exchanges an authenticated principal's email for a backend bearer token.
pub struct TokenBridge {
    http: reqwest::Client,
    base: Url,
    store: Arc<dyn TokenStore>,
}

impl TokenBridge {
    /// Create a bridge against the backend base URL.
    #[must_use]
    pub fn new(base: Url, store: Arc<dyn TokenStore>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base,
            store,
        }
    }

    /// Exchange `email` for a bearer token and persist it.
    ///
    /// A failure here is not a failed login: the identity provider may
    /// already consider the user signed in, and session state is not
    /// touched. The caller decides how to surface the degraded mode.
    ///
    /// # Errors
    ///
    /// Fails when the backend is unreachable, refuses issuance, or the
    /// token cannot be persisted.
    pub async fn exchange_for_token(&self, email: &Email) -> Result<(), TokenError> {
        let url = self.base.join("jwt")?;
        let response = self
            .http
            .post(url)
            .json(&TokenRequest {
                email: email.as_str(),
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TokenError::Exchange { status });
        }

        let issued: TokenIssued = response.json().await?;
        self.store.save(&SecretString::from(issued.token))?;
        tracing::debug!(%email, "bearer token issued and stored");
        Ok(())
    }
}
