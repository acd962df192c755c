use std::sync::Arc;

use chrono::{Duration, Utc};
use url::Url;
use uuid::Uuid;

use crate::auth::jwt::{Claims, DEFAULT_ROLE, JwtManager};
use crate::auth::services::AuthService;
use crate::auth::tokens::{APP_TOKEN_ISSUER, TokenService};
use crate::db::store::MemoryStore;
use crate::provider::mock::MockProvider;
use crate::provider::{Session, User};

pub const PROVIDER_SECRET: &[u8] = b"provider-secret-for-tests-only-0123456789";
pub const APP_SECRET: &[u8] = b"app-secret-for-tests-only-0123456789abcdef";
pub const SITE_URL: &str = "https://movies.test";

pub fn token_service(store: Arc<MemoryStore>) -> TokenService {
    TokenService::new(
        JwtManager::new(PROVIDER_SECRET),
        JwtManager::new(APP_SECRET).with_issuer(APP_TOKEN_ISSUER),
        store,
    )
}

/// Access token shaped like the provider's, valid for `ttl`.
pub fn provider_token(user: &User, ttl: Duration) -> String {
    let mut claims = Claims::for_user(user, ttl);
    claims.role = Some(DEFAULT_ROLE.to_string());
    claims.session_id = Some(Uuid::new_v4().to_string());
    JwtManager::new(PROVIDER_SECRET)
        .generate_token(claims)
        .unwrap()
}

pub fn session_for(user: &User, ttl: Duration) -> Session {
    Session {
        access_token: provider_token(user, ttl),
        refresh_token: format!("refresh-{}", Uuid::new_v4()),
        expires_at: (Utc::now() + ttl).timestamp(),
        user: user.clone(),
    }
}

pub fn auth_service(provider: Arc<MockProvider>, store: Arc<MemoryStore>) -> AuthService {
    AuthService::new(
        provider,
        token_service(store),
        SITE_URL.parse::<Url>().unwrap(),
    )
}
