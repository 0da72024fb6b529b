//! Identity session store.
//!
//! Single source of truth for "who is signed in". The store holds exactly
//! one subscription to the identity provider's state changes; the task
//! draining that subscription is the only writer of the principal. The
//! credential operations here flip the `resolving` flag but never set the
//! principal themselves, so there is one authoritative update path and no
//! race between call sites.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use life_shield_core::{Email, Principal};

use crate::identity::{AuthError, FederatedError, FederatedFlow, IdentityProvider};

/// A snapshot of the current session.
///
/// `resolving` is true only during the initial subscription bootstrap or an
/// in-flight credential operation. Every provider state change publishes
/// `{principal, resolving: false}` as one value, so no observer ever sees
/// `resolving == false` paired with a principal from a previous tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    /// The signed-in principal, if any.
    pub principal: Option<Principal>,
    /// Whether an authoritative answer is still pending.
    pub resolving: bool,
}

impl Default for SessionState {
    /// The bootstrap state: nobody known yet, answer pending.
    fn default() -> Self {
        Self {
            principal: None,
            resolving: true,
        }
    }
}

impl SessionState {
    /// Whether a principal is present and resolution has completed.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.principal.is_some() && !self.resolving
    }

    /// The signed-in principal's email, if any.
    #[must_use]
    pub fn email(&self) -> Option<&Email> {
        self.principal.as_ref().map(|p| &p.email)
    }
}

/// Process-wide store of the authenticated session.
///
/// Construct once at application start (requires a Tokio runtime); dropping
/// the store tears down its provider subscription exactly once.
pub struct SessionStore {
    provider: Arc<dyn IdentityProvider>,
    state: Arc<watch::Sender<SessionState>>,
    /// Whether the provider's first answer has been published.
    settled: Arc<AtomicBool>,
    listener: JoinHandle<()>,
}

impl SessionStore {
    /// Create the store and establish the provider subscription.
    #[must_use]
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        let (state_tx, _) = watch::channel(SessionState::default());
        let state = Arc::new(state_tx);

        let settled = Arc::new(AtomicBool::new(false));

        let mut events = provider.subscribe();
        let writer = Arc::clone(&state);
        let seen = Arc::clone(&settled);
        let listener = tokio::spawn(async move {
            while let Some(principal) = events.next().await {
                tracing::info!(
                    authenticated = principal.is_some(),
                    "session state change"
                );
                // Principal and resolving flag are published as one value.
                writer.send_replace(SessionState {
                    principal,
                    resolving: false,
                });
                seen.store(true, Ordering::Release);
            }
        });

        Self {
            provider,
            state,
            settled,
            listener,
        }
    }

    /// Watch session state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// The current session snapshot.
    #[must_use]
    pub fn current(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Begin credential creation for a new account.
    ///
    /// Sets `resolving` before the provider request starts. On success the
    /// principal arrives through the subscription; this call never sets it.
    ///
    /// # Errors
    ///
    /// Propagates the provider's rejection; `resolving` is reset since no
    /// state change will follow.
    pub async fn create_user(&self, email: &Email, password: &str) -> Result<(), AuthError> {
        self.begin_resolving();
        match self.provider.create_user(email, password).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.end_resolving();
                Err(err)
            }
        }
    }

    /// Sign in with existing credentials.
    ///
    /// Same contract as [`SessionStore::create_user`]; a wrong
    /// email/password pair surfaces as [`AuthError::InvalidCredentials`].
    ///
    /// # Errors
    ///
    /// Propagates the provider's rejection; `resolving` is reset.
    pub async fn sign_in(&self, email: &Email, password: &str) -> Result<(), AuthError> {
        self.begin_resolving();
        match self.provider.sign_in(email, password).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.end_resolving();
                Err(err)
            }
        }
    }

    /// Wait for an interactive federated flow to finish.
    ///
    /// # Errors
    ///
    /// An abandoned flow rejects with [`FederatedError::Cancelled`]; the
    /// principal stays exactly as it was before the attempt.
    pub async fn sign_in_federated(&self, flow: FederatedFlow) -> Result<Principal, FederatedError> {
        self.begin_resolving();
        match flow.finish().await {
            Ok(principal) => {
                // The provider may have broadcast this principal before the
                // flag flipped, in which case no further event will arrive.
                // Settle the flag when the published state already carries
                // the flow's principal; otherwise the subscription stays
                // authoritative.
                self.state.send_modify(|state| {
                    if state.principal.as_ref() == Some(&principal) {
                        state.resolving = false;
                    }
                });
                Ok(principal)
            }
            Err(err) => {
                tracing::info!(error = %err, "federated sign-in did not complete");
                self.end_resolving();
                Err(err)
            }
        }
    }

    /// Ask the provider to invalidate the session.
    ///
    /// On completion the subscription fires with an absent principal.
    ///
    /// # Errors
    ///
    /// Propagates the provider's rejection; `resolving` is reset.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.begin_resolving();
        match self.provider.sign_out().await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.end_resolving();
                Err(err)
            }
        }
    }

    fn begin_resolving(&self) {
        self.state.send_modify(|state| state.resolving = true);
    }

    fn end_resolving(&self) {
        // A failed operation before the provider's first answer must not
        // publish a settled state ahead of that answer; the bootstrap event
        // clears the flag when it lands.
        if self.settled.load(Ordering::Acquire) {
            self.state.send_modify(|state| state.resolving = false);
        }
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        // Mount/unmount symmetry: the one subscription this store
        // established is torn down here, once.
        self.listener.abort();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;
    use tokio::sync::{Notify, mpsc, oneshot};
    use url::Url;

    use life_shield_core::PrincipalMetadata;

    use crate::identity::AuthStateChanges;

    use super::*;

    fn principal(email: &str) -> Principal {
        Principal {
            email: Email::parse(email).unwrap(),
            display_name: None,
            photo_url: None,
            metadata: PrincipalMetadata {
                creation_time: Utc::now(),
                last_sign_in_time: Utc::now(),
            },
        }
    }

    /// Scriptable in-memory provider.
    struct FakeProvider {
        subscribers: Mutex<Vec<mpsc::UnboundedSender<Option<Principal>>>>,
        initial: Option<Principal>,
        password: String,
        /// When set, credential calls park here until released.
        gate: Option<Arc<Notify>>,
        pending: Mutex<Vec<oneshot::Sender<Result<Principal, FederatedError>>>>,
    }

    impl FakeProvider {
        fn new() -> Self {
            Self {
                subscribers: Mutex::new(Vec::new()),
                initial: None,
                password: "correct horse".to_owned(),
                gate: None,
                pending: Mutex::new(Vec::new()),
            }
        }

        fn emit(&self, principal: Option<Principal>) {
            let mut subs = self.subscribers.lock().unwrap();
            subs.retain(|tx| tx.send(principal.clone()).is_ok());
        }
    }

    #[async_trait]
    impl IdentityProvider for FakeProvider {
        async fn create_user(&self, email: &Email, password: &str) -> Result<(), AuthError> {
            self.sign_in(email, password).await
        }

        async fn sign_in(&self, email: &Email, password: &str) -> Result<(), AuthError> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if password != self.password {
                return Err(AuthError::InvalidCredentials);
            }
            self.emit(Some(principal(email.as_str())));
            Ok(())
        }

        async fn sign_out(&self) -> Result<(), AuthError> {
            self.emit(None);
            Ok(())
        }

        async fn begin_federated(&self) -> Result<FederatedFlow, AuthError> {
            let (tx, rx) = oneshot::channel();
            self.pending.lock().unwrap().push(tx);
            let url = Url::parse("https://id.example.com/oauth/authorize?state=s").unwrap();
            Ok(FederatedFlow::new("s", url, rx))
        }

        fn subscribe(&self) -> AuthStateChanges {
            let (tx, rx) = mpsc::unbounded_channel();
            let _ = tx.send(self.initial.clone());
            self.subscribers.lock().unwrap().push(tx);
            AuthStateChanges::new(rx)
        }
    }

    async fn settled(store: &SessionStore) -> SessionState {
        let mut rx = store.subscribe();
        rx.wait_for(|state| !state.resolving).await.unwrap().clone()
    }

    #[tokio::test]
    async fn test_bootstrap_resolves_to_signed_out() {
        let store = SessionStore::new(Arc::new(FakeProvider::new()));
        let state = settled(&store).await;
        assert!(state.principal.is_none());
        assert!(!state.resolving);
    }

    #[tokio::test]
    async fn test_bootstrap_resolves_to_existing_principal() {
        let mut provider = FakeProvider::new();
        provider.initial = Some(principal("existing@example.com"));
        let store = SessionStore::new(Arc::new(provider));

        let state = settled(&store).await;
        assert_eq!(
            state.email().map(Email::as_str),
            Some("existing@example.com")
        );
    }

    #[tokio::test]
    async fn test_sign_in_sets_resolving_before_provider_responds() {
        let gate = Arc::new(Notify::new());
        let mut provider = FakeProvider::new();
        provider.gate = Some(Arc::clone(&gate));
        let store = Arc::new(SessionStore::new(Arc::new(provider)));
        settled(&store).await;

        let email = Email::parse("user@example.com").unwrap();
        let op = {
            let store = Arc::clone(&store);
            let email = email.clone();
            tokio::spawn(async move { store.sign_in(&email, "correct horse").await })
        };

        let mut rx = store.subscribe();
        rx.wait_for(|state| state.resolving).await.unwrap();
        assert!(store.current().principal.is_none());

        gate.notify_one();
        op.await.unwrap().unwrap();

        let state = settled(&store).await;
        assert_eq!(state.email().map(Email::as_str), Some("user@example.com"));
    }

    #[tokio::test]
    async fn test_failed_sign_in_resets_resolving_and_keeps_principal() {
        let store = SessionStore::new(Arc::new(FakeProvider::new()));
        settled(&store).await;

        let email = Email::parse("user@example.com").unwrap();
        let err = store.sign_in(&email, "wrong").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));

        let state = store.current();
        assert!(!state.resolving);
        assert!(state.principal.is_none());
    }

    #[tokio::test]
    async fn test_state_change_publishes_principal_and_flag_together() {
        let store = SessionStore::new(Arc::new(FakeProvider::new()));
        let mut rx = store.subscribe();
        settled(&store).await;

        let email = Email::parse("user@example.com").unwrap();
        store.sign_in(&email, "correct horse").await.unwrap();

        // Every observed snapshot with resolving == false must carry the
        // principal that accompanied that very state change.
        let state = rx
            .wait_for(|state| !state.resolving && state.principal.is_some())
            .await
            .unwrap()
            .clone();
        assert!(state.is_authenticated());
    }

    #[tokio::test]
    async fn test_sign_out_clears_principal_via_subscription() {
        let mut provider = FakeProvider::new();
        provider.initial = Some(principal("user@example.com"));
        let store = SessionStore::new(Arc::new(provider));
        settled(&store).await;

        store.sign_out().await.unwrap();

        let mut rx = store.subscribe();
        let state = rx
            .wait_for(|state| !state.resolving && state.principal.is_none())
            .await
            .unwrap()
            .clone();
        assert!(!state.is_authenticated());
    }

    #[tokio::test]
    async fn test_federated_completion_before_await_settles_session() {
        let provider = Arc::new(FakeProvider::new());
        let store = SessionStore::new(Arc::clone(&provider) as Arc<dyn IdentityProvider>);
        settled(&store).await;

        let flow = provider.begin_federated().await.unwrap();

        // The callback lands before the caller awaits the flow: the
        // provider broadcasts the principal and resolves the completion.
        let fed = principal("fed@example.com");
        provider.emit(Some(fed.clone()));
        let tx = provider.pending.lock().unwrap().pop().unwrap();
        tx.send(Ok(fed)).unwrap();

        // Drain the broadcast so the listener has already published it.
        let mut rx = store.subscribe();
        rx.wait_for(|state| state.principal.is_some()).await.unwrap();

        let got = store.sign_in_federated(flow).await.unwrap();
        assert_eq!(got.email.as_str(), "fed@example.com");

        // No further provider event will arrive; the flag must still
        // settle.
        let state = store.current();
        assert!(!state.resolving);
        assert!(state.is_authenticated());
    }

    #[tokio::test]
    async fn test_failed_sign_in_before_bootstrap_does_not_settle() {
        let mut provider = FakeProvider::new();
        provider.initial = Some(principal("existing@example.com"));
        let store = SessionStore::new(Arc::new(provider));

        // The listener has not run yet: the bootstrap answer is still
        // pending when the credential op fails.
        let email = Email::parse("user@example.com").unwrap();
        let err = store.sign_in(&email, "wrong").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        assert!(store.current().resolving);

        // The first settled snapshot is the provider's answer, never a
        // premature signed-out state.
        let state = settled(&store).await;
        assert_eq!(
            state.email().map(Email::as_str),
            Some("existing@example.com")
        );
    }

    #[tokio::test]
    async fn test_abandoned_federated_flow_leaves_session_unchanged() {
        let mut provider = FakeProvider::new();
        provider.initial = Some(principal("existing@example.com"));
        let provider = Arc::new(provider);
        let store = SessionStore::new(Arc::clone(&provider) as Arc<dyn IdentityProvider>);
        settled(&store).await;

        let flow = provider.begin_federated().await.unwrap();
        // Abandon the flow: drop the provider's completion sender.
        provider.pending.lock().unwrap().clear();

        let err = store.sign_in_federated(flow).await.unwrap_err();
        assert_eq!(err, FederatedError::Cancelled);

        let state = store.current();
        assert!(!state.resolving);
        assert_eq!(
            state.email().map(Email::as_str),
            Some("existing@example.com")
        );
    }
}
