//! HTTP Basic Authentication for host routes

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;

const REALM: &str = "Basic realm=\"DungeonBox Host\"";

/// Authentication configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Username for host routes (None = auth disabled)
    pub username: Option<String>,
    /// Password for host routes
    pub password: Option<String>,
}

impl AuthConfig {
    /// Load auth config from environment variables
    /// HOST_USERNAME and HOST_PASSWORD must both be set to enable auth
    pub fn from_env() -> Self {
        let username = std::env::var("HOST_USERNAME")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let password = std::env::var("HOST_PASSWORD")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        if username.is_some() && password.is_some() {
            tracing::info!("Host authentication enabled");
            Self { username, password }
        } else {
            if username.is_some() || password.is_some() {
                tracing::warn!(
                    "HOST_USERNAME and HOST_PASSWORD must both be set to enable authentication"
                );
            }
            tracing::warn!("Host authentication DISABLED - anyone can create and control rooms!");
            Self::disabled()
        }
    }

    pub fn disabled() -> Self {
        Self {
            username: None,
            password: None,
        }
    }

    /// Check if authentication is enabled
    pub fn is_enabled(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    /// Validate credentials
    pub fn validate(&self, username: &str, password: &str) -> bool {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => {
                // Evaluate both so timing does not reveal which one failed
                let user_ok = constant_time_eq(u.as_bytes(), username.as_bytes());
                let pass_ok = constant_time_eq(p.as_bytes(), password.as_bytes());
                user_ok & pass_ok
            }
            _ => true, // Auth disabled, allow all
        }
    }

    /// Check the request's `Authorization: Basic ...` header
    pub fn authorize(&self, headers: &HeaderMap) -> bool {
        if !self.is_enabled() {
            return true;
        }
        basic_credentials(headers)
            .is_some_and(|(username, password)| self.validate(&username, &password))
    }
}

/// Constant-time byte comparison
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Decode `Authorization: Basic base64(user:pass)`
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Middleware for HTTP Basic Authentication on host routes
pub async fn host_auth_middleware(
    State(auth_config): State<Arc<AuthConfig>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if auth_config.authorize(request.headers()) {
        return next.run(request).await;
    }

    tracing::warn!("Rejected host request to {}", request.uri().path());
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, REALM)],
        "Unauthorized",
    )
        .into_response()
}
