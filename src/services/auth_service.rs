use async_trait::async_trait;
use axum::http::{self, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::db::UserDirectory;
use crate::error::SyncError;
use crate::ws::userctx::{Identity, UserCtxCache};

/// Claims carried by a bearer token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Turns an opaque bearer credential into an authenticated identity
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify(&self, token: Option<&str>) -> Result<Identity, SyncError>;

    /// Number of identities currently cached
    fn cached_identities(&self) -> u64 {
        0
    }
}

// Get the auth token from a handshake.
//
// Browsers cannot set headers on a WebSocket upgrade, so the `token` query
// parameter wins; then the Authorization header; then the auth_token cookie.
pub fn get_auth_token(headers: &HeaderMap, query_token: Option<&str>) -> Result<String, String> {
    if let Some(token) = query_token.filter(|t| !t.is_empty()) {
        return Ok(token.to_string());
    }

    if let Some(auth_header) = headers.get(http::header::AUTHORIZATION) {
        let auth_str = auth_header
            .to_str()
            .map_err(|_| "Invalid Authorization header".to_string())?;
        return Ok(auth_str.strip_prefix("Bearer ").unwrap_or(auth_str).to_string());
    }

    let cookie_header = headers
        .get(http::header::COOKIE)
        .ok_or_else(|| "Missing token, Authorization header or Cookie".to_string())?
        .to_str()
        .map_err(|_| "Invalid Cookie header".to_string())?;

    cookie::Cookie::split_parse(cookie_header)
        .flatten()
        .find(|c| c.name() == "auth_token")
        .map(|c| c.value().to_string())
        .ok_or_else(|| "auth_token cookie not found".to_string())
}

// Validate a JWT token and return the token data
pub fn validate_jwt(token: &str, secret: &str) -> Result<TokenData<Claims>, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_required_spec_claims(&["exp", "sub"]);
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    decode::<Claims>(token, &decoding_key, &validation)
}

/// Verifies HS256 tokens and resolves the `sub` claim against the user directory
pub struct JwtVerifier {
    secret: Option<String>,
    directory: Arc<dyn UserDirectory>,
    cache: UserCtxCache,
}

impl JwtVerifier {
    pub fn new(secret: Option<String>, directory: Arc<dyn UserDirectory>, cache: UserCtxCache) -> Self {
        if secret.is_none() {
            warn!("No JWT secret configured - every handshake will be rejected");
        }
        Self { secret, directory, cache }
    }
}

#[async_trait]
impl IdentityProvider for JwtVerifier {
    async fn verify(&self, token: Option<&str>) -> Result<Identity, SyncError> {
        let token = token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SyncError::unauthenticated("Authentication required"))?;

        let secret = self
            .secret
            .as_deref()
            .ok_or_else(|| SyncError::unauthenticated("No JWT secret configured"))?;

        let token_data = validate_jwt(token, secret)
            .map_err(|e| SyncError::unauthenticated(format!("Invalid token: {}", e)))?;
        let claims = token_data.claims;

        let user = self
            .cache
            .get_or_fetch(&claims.sub, self.directory.as_ref())
            .await
            .map_err(|e| SyncError::unauthenticated(format!("Identity lookup failed: {}", e)))?
            .ok_or_else(|| SyncError::unauthenticated("User not found"))?;

        info!("JWT token validated successfully for user: {}", user.id);
        Ok(Identity::new(user, claims.roles))
    }

    fn cached_identities(&self) -> u64 {
        self.cache.entry_count()
    }
}
