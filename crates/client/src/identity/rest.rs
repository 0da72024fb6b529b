//! HTTP-backed identity provider.
//!
//! Talks to a hosted identity service over its REST surface:
//!
//! - `POST accounts/sign-up` - credential creation
//! - `POST accounts/sign-in` - credential sign-in
//! - `POST accounts/sign-out` - session invalidation
//! - `GET  oauth/authorize` - federated interactive flow entry (URL only)
//! - `POST oauth/exchange` - federated callback code exchange
//!
//! Successful credential operations return the principal and a provider
//! session token; the provider keeps both and broadcasts the new principal
//! to every subscriber, which is how the session store learns about it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use url::Url;

use life_shield_core::{Email, Principal};

use crate::config::IdentityConfig;

use super::{AuthError, AuthStateChanges, FederatedError, FederatedFlow, IdentityProvider};

/// Length of the generated federated CSRF state parameter.
const FEDERATED_STATE_LENGTH: usize = 32;

#[derive(Serialize)]
struct CredentialRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct ExchangeRequest<'a> {
    code: &'a str,
}

#[derive(Deserialize)]
struct SessionResponse {
    principal: Principal,
    #[serde(rename = "sessionToken")]
    session_token: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
    message: Option<String>,
}

/// Client for the hosted identity service.
///
/// Cheaply cloneable via `Arc`; a single instance is shared between the
/// session store (subscription) and the composition root (operations).
#[derive(Clone)]
pub struct RestIdentityProvider {
    inner: Arc<ProviderInner>,
}

type FederatedCompletion = oneshot::Sender<Result<Principal, FederatedError>>;

struct ProviderInner {
    http: reqwest::Client,
    base: Url,
    api_key: SecretString,
    current: Mutex<Option<Principal>>,
    session_token: Mutex<Option<SecretString>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Option<Principal>>>>,
    pending_federated: Mutex<HashMap<String, FederatedCompletion>>,
}

impl RestIdentityProvider {
    /// Create a new identity provider client.
    #[must_use]
    pub fn new(config: &IdentityConfig) -> Self {
        Self {
            inner: Arc::new(ProviderInner {
                http: reqwest::Client::new(),
                base: config.base_url.clone(),
                api_key: config.api_key.clone(),
                current: Mutex::new(None),
                session_token: Mutex::new(None),
                subscribers: Mutex::new(Vec::new()),
                pending_federated: Mutex::new(HashMap::new()),
            }),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url, AuthError> {
        Ok(self.inner.base.join(path)?)
    }

    /// Record the new session and broadcast the principal to subscribers.
    fn establish(&self, session: SessionResponse) -> Principal {
        let principal = session.principal;
        *lock(&self.inner.session_token) = Some(SecretString::from(session.session_token));
        *lock(&self.inner.current) = Some(principal.clone());
        self.emit(Some(principal.clone()));
        principal
    }

    fn clear_session(&self) {
        *lock(&self.inner.session_token) = None;
        *lock(&self.inner.current) = None;
        self.emit(None);
    }

    fn emit(&self, principal: Option<Principal>) {
        let mut subscribers = lock(&self.inner.subscribers);
        // Dropped receivers are unsubscribes; prune them here.
        subscribers.retain(|tx| tx.send(principal.clone()).is_ok());
    }

    async fn credential_request(&self, path: &str, email: &Email, password: &str) -> Result<(), AuthError> {
        let response = self
            .inner
            .http
            .post(self.endpoint(path)?)
            .header("X-Api-Key", self.inner.api_key.expose_secret())
            .json(&CredentialRequest {
                email: email.as_str(),
                password,
            })
            .send()
            .await?;

        let session = read_session(response).await?;
        self.establish(session);
        Ok(())
    }

    /// Complete a pending federated flow with the callback code.
    ///
    /// Called by the surface handling the federated redirect. Resolves the
    /// matching [`FederatedFlow`] and broadcasts the new principal.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UnknownFederatedState`] when no flow is pending
    /// under `state`, or the mapped provider error when the code exchange is
    /// rejected (the waiting flow is rejected with the same failure).
    pub async fn complete_federated(&self, state: &str, code: &str) -> Result<(), AuthError> {
        let completion = lock(&self.inner.pending_federated)
            .remove(state)
            .ok_or(AuthError::UnknownFederatedState)?;

        let exchange = async {
            let response = self
                .inner
                .http
                .post(self.endpoint("oauth/exchange")?)
                .header("X-Api-Key", self.inner.api_key.expose_secret())
                .json(&ExchangeRequest { code })
                .send()
                .await?;
            read_session(response).await
        };

        match exchange.await {
            Ok(session) => {
                let principal = self.establish(session);
                // The waiter may have been dropped; completion is best-effort.
                let _ = completion.send(Ok(principal));
                Ok(())
            }
            Err(err) => {
                let _ = completion.send(Err(FederatedError::Failed(err.to_string())));
                Err(err)
            }
        }
    }

    /// Cancel a pending federated flow (the user closed the popup).
    ///
    /// Returns whether a flow was pending under `state`. The waiting
    /// [`FederatedFlow`] rejects with [`FederatedError::Cancelled`].
    pub fn cancel_federated(&self, state: &str) -> bool {
        match lock(&self.inner.pending_federated).remove(state) {
            Some(completion) => {
                let _ = completion.send(Err(FederatedError::Cancelled));
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl IdentityProvider for RestIdentityProvider {
    async fn create_user(&self, email: &Email, password: &str) -> Result<(), AuthError> {
        self.credential_request("accounts/sign-up", email, password)
            .await
    }

    async fn sign_in(&self, email: &Email, password: &str) -> Result<(), AuthError> {
        self.credential_request("accounts/sign-in", email, password)
            .await
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let token = lock(&self.inner.session_token).clone();

        // Remote invalidation is best-effort: the local session is cleared
        // either way so the subscription always fires with an absent
        // principal, and the provider expires the remote session on its own.
        if let Some(token) = token {
            let request = self
                .inner
                .http
                .post(self.endpoint("accounts/sign-out")?)
                .header("X-Api-Key", self.inner.api_key.expose_secret())
                .bearer_auth(token.expose_secret())
                .send()
                .await;
            if let Err(err) = request {
                tracing::warn!(error = %err, "remote session invalidation failed");
            }
        }

        self.clear_session();
        Ok(())
    }

    async fn begin_federated(&self) -> Result<FederatedFlow, AuthError> {
        let state = generate_random_string(FEDERATED_STATE_LENGTH);
        let authorize_url = Url::parse(&format!(
            "{}oauth/authorize?response_type=code&state={}",
            self.inner.base,
            urlencoding::encode(&state)
        ))?;

        let (tx, rx) = oneshot::channel();
        lock(&self.inner.pending_federated).insert(state.clone(), tx);

        Ok(FederatedFlow::new(state, authorize_url, rx))
    }

    fn subscribe(&self) -> AuthStateChanges {
        let (tx, rx) = mpsc::unbounded_channel();
        // Deliver the current state immediately so a new subscriber never
        // waits for an unrelated event.
        let _ = tx.send(lock(&self.inner.current).clone());
        lock(&self.inner.subscribers).push(tx);
        AuthStateChanges::new(rx)
    }
}

/// Lock a mutex, recovering from poisoning.
///
/// No invariant spans a panic while these locks are held; the inner value
/// is still usable.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Map a provider response into a session or the local error taxonomy.
async fn read_session(response: reqwest::Response) -> Result<SessionResponse, AuthError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let error: ErrorResponse = match response.json().await {
        Ok(body) => body,
        Err(_) => {
            return Err(AuthError::Provider(format!(
                "unexpected response ({status})"
            )));
        }
    };

    Err(map_error_code(&error))
}

fn map_error_code(error: &ErrorResponse) -> AuthError {
    match error.error.as_str() {
        "invalid-credentials" => AuthError::InvalidCredentials,
        "email-already-in-use" => AuthError::AlreadyRegistered,
        "weak-password" => AuthError::WeakPassword(
            error
                .message
                .clone()
                .unwrap_or_else(|| "password does not meet the provider's policy".to_owned()),
        ),
        code => AuthError::Provider(
            error
                .message
                .clone()
                .unwrap_or_else(|| format!("provider rejected the request ({code})")),
        ),
    }
}

/// Generate a cryptographically random alphanumeric string.
fn generate_random_string(length: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..length)
        .map(|_| {
            let idx = rng.random_range(0..CHARSET.len());
            char::from(CHARSET.get(idx).copied().unwrap_or(b'0'))
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_map_error_code_invalid_credentials() {
        let err = map_error_code(&ErrorResponse {
            error: "invalid-credentials".into(),
            message: None,
        });
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[test]
    fn test_map_error_code_duplicate_account() {
        let err = map_error_code(&ErrorResponse {
            error: "email-already-in-use".into(),
            message: None,
        });
        assert!(matches!(err, AuthError::AlreadyRegistered));
    }

    #[test]
    fn test_map_error_code_weak_password_carries_message() {
        let err = map_error_code(&ErrorResponse {
            error: "weak-password".into(),
            message: Some("at least 8 characters".into()),
        });
        assert!(matches!(err, AuthError::WeakPassword(msg) if msg == "at least 8 characters"));
    }

    #[test]
    fn test_map_error_code_unknown_falls_back_to_provider() {
        let err = map_error_code(&ErrorResponse {
            error: "rate-limited".into(),
            message: None,
        });
        assert!(matches!(err, AuthError::Provider(_)));
    }

    #[test]
    fn test_generate_random_string_length_and_charset() {
        let state = generate_random_string(32);
        assert_eq!(state.len(), 32);
        assert!(state.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
