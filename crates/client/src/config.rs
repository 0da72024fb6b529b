//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `LIFE_SHIELD_BACKEND_URL` - Base URL of the Life Shield backend API
//! - `LIFE_SHIELD_IDENTITY_URL` - Base URL of the hosted identity service
//! - `LIFE_SHIELD_IDENTITY_API_KEY` - API key for the identity service
//!   (placeholder/entropy validated)
//!
//! ## Optional
//! - `LIFE_SHIELD_SIGN_IN_ROUTE` - Sign-in route (default: /login)
//! - `LIFE_SHIELD_DASHBOARD_ROUTE` - Dashboard landing route
//!   (default: /dashboard)
//! - `LIFE_SHIELD_TOKEN_DIR` - Directory for the durable token slot
//!   (default: .life-shield)

use std::collections::HashMap;
use std::path::PathBuf;

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

use life_shield_core::RoutePath;

use crate::guard::GuardPolicy;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Client application configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the Life Shield backend (normalized with a trailing
    /// slash so request paths join under it).
    pub backend_url: Url,
    /// Identity service configuration.
    pub identity: IdentityConfig,
    /// The sign-in route; also the loop-prevention anchor for forced
    /// teardown.
    pub sign_in_route: RoutePath,
    /// Landing route for authenticated but under-privileged users.
    pub dashboard_route: RoutePath,
    /// Directory holding the durable token slot.
    pub token_dir: PathBuf,
}

/// Hosted identity service configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct IdentityConfig {
    /// Identity service base URL (normalized with a trailing slash).
    pub base_url: Url,
    /// API key presented on every identity request.
    pub api_key: SecretString,
}

impl std::fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the API key fails validation (placeholder detection, entropy
    /// check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let backend_url = get_base_url("LIFE_SHIELD_BACKEND_URL")?;
        let identity = IdentityConfig::from_env()?;
        let sign_in_route = RoutePath::new(get_env_or_default("LIFE_SHIELD_SIGN_IN_ROUTE", "/login"));
        let dashboard_route = RoutePath::new(get_env_or_default(
            "LIFE_SHIELD_DASHBOARD_ROUTE",
            "/dashboard",
        ));
        let token_dir = PathBuf::from(get_env_or_default("LIFE_SHIELD_TOKEN_DIR", ".life-shield"));

        Ok(Self {
            backend_url,
            identity,
            sign_in_route,
            dashboard_route,
            token_dir,
        })
    }

    /// The redirect targets guards use.
    #[must_use]
    pub fn guard_policy(&self) -> GuardPolicy {
        GuardPolicy {
            sign_in_route: self.sign_in_route.clone(),
            dashboard_route: self.dashboard_route.clone(),
        }
    }
}

impl IdentityConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: get_base_url("LIFE_SHIELD_IDENTITY_URL")?,
            api_key: get_validated_secret("LIFE_SHIELD_IDENTITY_API_KEY")?,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get a required base URL, normalized with a trailing slash.
fn get_base_url(key: &str) -> Result<Url, ConfigError> {
    let raw = get_required_env(key)?;
    let normalized = if raw.ends_with('/') {
        raw
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalized).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    // Check blocklist
    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    // Check entropy (real API keys have high entropy)
    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated key."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
