//! Admin sessions: credential check, signed session tokens, and the
//! request guards built on them.

use crate::api::AppState;
use crate::config::AuthConfig;
use crate::error::ApiError;
use axum::async_trait;
use axum::extract::{FromRequestParts, OriginalUri, Request, State};
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Role carried by every session this service issues
pub const ADMIN_ROLE: &str = "admin";

/// Errors that can occur while issuing or checking sessions
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Session token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("Session is not an admin session")]
    NotAdmin,
}

/// Claims inside a session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies admin session tokens
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
    cookie_name: String,
    admin_username: String,
    admin_password: String,
}

impl SessionKeys {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
            ttl: Duration::days(i64::from(config.token_ttl_days)),
            cookie_name: config.cookie_name.clone(),
            admin_username: config.admin_username.clone(),
            admin_password: config.admin_password.clone(),
        }
    }

    /// Check a login against the configured admin account
    pub fn check_credentials(&self, username: &str, password: &str) -> Result<(), AuthError> {
        let user_ok = constant_time_eq(username.as_bytes(), self.admin_username.as_bytes());
        let pass_ok = constant_time_eq(password.as_bytes(), self.admin_password.as_bytes());

        if user_ok && pass_ok {
            Ok(())
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }

    /// Sign a new admin session token
    pub fn issue(&self, username: &str) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: username.to_string(),
            role: ADMIN_ROLE.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Verify signature, expiry and role of a session token
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)?;

        if data.claims.role != ADMIN_ROLE {
            return Err(AuthError::NotAdmin);
        }

        Ok(data.claims)
    }

    /// Session token from the cookie, falling back to a bearer header
    pub fn token_from_headers<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        cookie_value(headers, &self.cookie_name).or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(str::trim)
                .filter(|t| !t.is_empty())
        })
    }

    /// Whether the request carries a valid admin session
    pub fn is_authorized(&self, headers: &HeaderMap) -> bool {
        self.token_from_headers(headers)
            .map(|token| self.verify(token).is_ok())
            .unwrap_or(false)
    }

    /// `Set-Cookie` value carrying a fresh session token
    pub fn session_cookie(&self, token: &str) -> String {
        format!(
            "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Strict",
            self.cookie_name,
            token,
            self.ttl.num_seconds()
        )
    }

    /// `Set-Cookie` value that clears the session
    pub fn clear_cookie(&self) -> String {
        format!(
            "{}=; Path=/; Max-Age=0; HttpOnly; SameSite=Strict",
            self.cookie_name
        )
    }
}

fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Extractor guarding admin-only API routes; rejects with 401
#[derive(Debug, Clone)]
pub struct AdminSession {
    pub username: String,
}

#[async_trait]
impl FromRequestParts<AppState> for AdminSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = state
            .sessions
            .token_from_headers(&parts.headers)
            .ok_or(ApiError::Unauthorized)?;

        let claims = state.sessions.verify(token).map_err(|e| {
            debug!(error = %e, "Rejected session token");
            ApiError::Unauthorized
        })?;

        Ok(Self {
            username: claims.sub,
        })
    }
}

/// Middleware for `/admin` pages: redirect to the login page without a session
pub async fn admin_gate(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if state.sessions.is_authorized(request.headers()) {
        return next.run(request).await;
    }

    let path = request
        .extensions()
        .get::<OriginalUri>()
        .map(|uri| uri.0.path().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    debug!(path = %path, "Redirecting unauthenticated admin request");
    Redirect::to(&format!("/login?redirect={path}")).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::create_test_config;
    use axum::http::HeaderValue;

    fn keys() -> SessionKeys {
        SessionKeys::new(&create_test_config().auth)
    }

    #[test]
    fn test_credentials() {
        let keys = keys();
        assert!(keys.check_credentials("admin", "admin123").is_ok());
        assert!(keys.check_credentials("admin", "wrong").is_err());
        assert!(keys.check_credentials("root", "admin123").is_err());
        assert!(keys.check_credentials("", "").is_err());
    }

    #[test]
    fn test_issue_then_verify() {
        let keys = keys();
        let token = keys.issue("admin").unwrap();
        let claims = keys.verify(&token).unwrap();

        assert_eq!(claims.sub, "admin");
        assert_eq!(claims.role, ADMIN_ROLE);
        assert_eq!(claims.exp - claims.iat, 7 * 24 * 3600);
    }

    #[test]
    fn test_token_signed_with_other_secret_is_rejected() {
        let mut config = create_test_config().auth;
        config.jwt_secret = "someone-else".to_string();
        let foreign = SessionKeys::new(&config).issue("admin").unwrap();

        assert!(keys().verify(&foreign).is_err());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let keys = keys();
        let past = Utc::now() - Duration::days(2);
        let claims = Claims {
            sub: "admin".to_string(),
            role: ADMIN_ROLE.to_string(),
            iat: past.timestamp(),
            exp: (past + Duration::hours(1)).timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding).unwrap();

        assert!(matches!(keys.verify(&token), Err(AuthError::Token(_))));
    }

    #[test]
    fn test_token_from_cookie_or_bearer() {
        let keys = keys();

        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; auth-token=abc.def.ghi"));
        assert_eq!(keys.token_from_headers(&headers), Some("abc.def.ghi"));

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        assert_eq!(keys.token_from_headers(&headers), Some("xyz"));

        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("auth-token="));
        assert_eq!(keys.token_from_headers(&headers), None);
    }

    #[test]
    fn test_cookie_strings() {
        let keys = keys();
        let set = keys.session_cookie("tok");
        assert!(set.starts_with("auth-token=tok; Path=/; Max-Age=604800"));
        assert!(set.contains("HttpOnly"));
        assert!(keys.clear_cookie().contains("Max-Age=0"));
    }
}
