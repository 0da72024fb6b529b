//! Shared test fixtures: an in-process mock of the Life Shield backend and
//! the hosted identity service, plus recording doubles for the routing and
//! teardown boundaries.
//!
//! The mock serves both APIs from one ephemeral-port axum server: backend
//! routes at `/` and identity routes under `/identity/`.

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::extract::{Json, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::task::JoinHandle;
use url::Url;

use life_shield_client::{ClientConfig, IdentityConfig, Navigator, UnauthorizedHandler};
use life_shield_core::RoutePath;

/// Bearer token the mock backend issues from `POST /jwt`.
pub const ISSUED_TOKEN: &str = "backend-token-1";

/// One recorded `GET /users/role/{email}` call.
pub struct RoleCall {
    pub email: String,
    pub authorization: Option<String>,
}

/// Observable state of the mock server.
pub struct ServerState {
    pub jwt_calls: Mutex<Vec<String>>,
    pub jwt_fail: AtomicBool,
    pub role_calls: Mutex<Vec<RoleCall>>,
    pub roles: Mutex<HashMap<String, String>>,
    pub passwords: Mutex<HashMap<String, String>>,
    pub federated_codes: Mutex<HashMap<String, String>>,
}

impl ServerState {
    fn new() -> Self {
        Self {
            jwt_calls: Mutex::new(Vec::new()),
            jwt_fail: AtomicBool::new(false),
            role_calls: Mutex::new(Vec::new()),
            roles: Mutex::new(HashMap::new()),
            passwords: Mutex::new(HashMap::new()),
            federated_codes: Mutex::new(HashMap::new()),
        }
    }

    pub fn add_account(&self, email: &str, password: &str) {
        self.passwords
            .lock()
            .unwrap()
            .insert(email.to_owned(), password.to_owned());
    }

    pub fn set_role(&self, email: &str, role: &str) {
        self.roles
            .lock()
            .unwrap()
            .insert(email.to_owned(), role.to_owned());
    }

    pub fn add_federated_code(&self, code: &str, email: &str) {
        self.federated_codes
            .lock()
            .unwrap()
            .insert(code.to_owned(), email.to_owned());
    }

    pub fn role_calls_for(&self, email: &str) -> usize {
        self.role_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.email == email)
            .count()
    }
}

/// The running mock server. Aborted on drop.
pub struct MockServer {
    pub addr: SocketAddr,
    pub state: Arc<ServerState>,
    handle: JoinHandle<()>,
}

/// Install a test-writer subscriber once; later calls are no-ops.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

impl MockServer {
    pub async fn start() -> Self {
        init_tracing();
        let state = Arc::new(ServerState::new());
        let app = Router::new()
            .route("/jwt", post(issue_jwt))
            .route("/users/role/{email}", get(lookup_role))
            .route("/policies", get(list_policies))
            .route("/identity/accounts/sign-up", post(sign_up))
            .route("/identity/accounts/sign-in", post(sign_in))
            .route("/identity/accounts/sign-out", post(sign_out))
            .route("/identity/oauth/exchange", post(oauth_exchange))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn backend_url(&self) -> Url {
        Url::parse(&format!("http://{}/", self.addr)).unwrap()
    }

    pub fn identity_url(&self) -> Url {
        Url::parse(&format!("http://{}/identity/", self.addr)).unwrap()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// A `ClientConfig` pointed at the mock server.
pub fn client_config(server: &MockServer) -> ClientConfig {
    ClientConfig {
        backend_url: server.backend_url(),
        identity: IdentityConfig {
            base_url: server.identity_url(),
            api_key: SecretString::from("kJ8#mN2$pQ5@rT9!xW3*"),
        },
        sign_in_route: RoutePath::new("/login"),
        dashboard_route: RoutePath::new("/dashboard"),
        token_dir: PathBuf::from(".life-shield"),
    }
}

// ============================================================================
// Test doubles for the routing and teardown boundaries
// ============================================================================

/// Navigator double recording every redirect.
pub struct RecordingNavigator {
    location: Mutex<RoutePath>,
    pub history: Mutex<Vec<RoutePath>>,
}

impl RecordingNavigator {
    pub fn at(path: &str) -> Self {
        Self {
            location: Mutex::new(RoutePath::new(path)),
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn location(&self) -> RoutePath {
        self.location.lock().unwrap().clone()
    }

    pub fn redirects(&self) -> usize {
        self.history.lock().unwrap().len()
    }
}

impl Navigator for RecordingNavigator {
    fn current_location(&self) -> RoutePath {
        self.location()
    }

    fn navigate(&self, to: &RoutePath) {
        *self.location.lock().unwrap() = to.clone();
        self.history.lock().unwrap().push(to.clone());
    }
}

/// Teardown hook double counting invocations.
#[derive(Default)]
pub struct CountingHandler {
    pub invocations: AtomicUsize,
}

impl CountingHandler {
    pub fn count(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UnauthorizedHandler for CountingHandler {
    async fn on_unauthorized(&self) {
        self.invocations.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Backend routes
// ============================================================================

async fn issue_jwt(State(state): State<Arc<ServerState>>, Json(body): Json<Value>) -> Response {
    let email = body["email"].as_str().unwrap_or_default().to_owned();
    state.jwt_calls.lock().unwrap().push(email);

    if state.jwt_fail.load(Ordering::SeqCst) {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "issuance-unavailable"})),
        )
            .into_response();
    }

    Json(json!({"token": ISSUED_TOKEN})).into_response()
}

async fn lookup_role(
    State(state): State<Arc<ServerState>>,
    Path(email): Path<String>,
    headers: HeaderMap,
) -> Response {
    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    state.role_calls.lock().unwrap().push(RoleCall {
        email: email.clone(),
        authorization,
    });

    match state.roles.lock().unwrap().get(&email) {
        Some(role) => Json(json!({"role": role})).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({"error": "no-role"}))).into_response(),
    }
}

/// Protected domain endpoint: absent bearer is 401, wrong bearer is 403.
async fn list_policies(State(_state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    let expected = format!("Bearer {ISSUED_TOKEN}");
    match headers.get("authorization").and_then(|v| v.to_str().ok()) {
        Some(value) if value == expected => {
            Json(json!([{"id": "pol-1", "name": "Term Life 20"}])).into_response()
        }
        Some(_) => StatusCode::FORBIDDEN.into_response(),
        None => StatusCode::UNAUTHORIZED.into_response(),
    }
}

// ============================================================================
// Identity service routes
// ============================================================================

fn session_json(email: &str) -> Value {
    json!({
        "principal": {
            "email": email,
            "displayName": null,
            "photoURL": null,
            "metadata": {
                "creationTime": "2026-01-01T00:00:00Z",
                "lastSignInTime": "2026-08-01T00:00:00Z"
            }
        },
        "sessionToken": "provider-session-1"
    })
}

async fn sign_up(State(state): State<Arc<ServerState>>, Json(body): Json<Value>) -> Response {
    let email = body["email"].as_str().unwrap_or_default().to_owned();
    let password = body["password"].as_str().unwrap_or_default().to_owned();

    if password.len() < 8 {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "weak-password",
                "message": "password must be at least 8 characters"
            })),
        )
            .into_response();
    }

    let mut passwords = state.passwords.lock().unwrap();
    if passwords.contains_key(&email) {
        return (
            StatusCode::CONFLICT,
            Json(json!({"error": "email-already-in-use"})),
        )
            .into_response();
    }
    passwords.insert(email.clone(), password);

    Json(session_json(&email)).into_response()
}

async fn sign_in(State(state): State<Arc<ServerState>>, Json(body): Json<Value>) -> Response {
    let email = body["email"].as_str().unwrap_or_default();
    let password = body["password"].as_str().unwrap_or_default();

    let matches = state.passwords.lock().unwrap().get(email) == Some(&password.to_owned());
    if matches {
        Json(session_json(email)).into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "invalid-credentials"})),
        )
            .into_response()
    }
}

async fn sign_out() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn oauth_exchange(State(state): State<Arc<ServerState>>, Json(body): Json<Value>) -> Response {
    let code = body["code"].as_str().unwrap_or_default();
    match state.federated_codes.lock().unwrap().get(code) {
        Some(email) => Json(session_json(email)).into_response(),
        None => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid-code"})),
        )
            .into_response(),
    }
}
