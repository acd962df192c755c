use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::auth::jwt::{Claims, DEFAULT_ROLE, JwtError, JwtManager};
use crate::db::error::RepositoryError;
use crate::db::models::blacklisted_token::NewBlacklistedToken;
use crate::db::store::TokenBlacklist;
use crate::provider::User;

pub const APP_TOKEN_ISSUER: &str = "movie-app";
pub const REASON_ROTATED: &str = "rotated";

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Token has expired")]
    Expired,
    #[error("Invalid token")]
    Invalid,
    #[error("Token has been revoked")]
    Revoked,
    #[error("Token carries no identifier and cannot be revoked")]
    NotRevocable,
    #[error(transparent)]
    Jwt(#[from] JwtError),
    #[error(transparent)]
    Store(#[from] RepositoryError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Provider,
    App,
}

#[derive(Debug, Clone)]
pub struct VerifiedToken {
    pub claims: Claims,
    pub kind: TokenKind,
}

/// Application token pair handed out by `/api/auth/token/*`.
#[derive(Clone)]
pub struct AppTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub user: User,
    pub role: String,
}

/// Verifies provider access tokens and issues our own token pairs, both
/// gated by the token blacklist.
#[derive(Clone)]
pub struct TokenService {
    provider_jwt: JwtManager,
    app_jwt: JwtManager,
    blacklist: Arc<dyn TokenBlacklist>,
}

impl TokenService {
    pub fn new(
        provider_jwt: JwtManager,
        app_jwt: JwtManager,
        blacklist: Arc<dyn TokenBlacklist>,
    ) -> Self {
        Self {
            provider_jwt,
            app_jwt,
            blacklist,
        }
    }

    pub fn provider_jwt(&self) -> &JwtManager {
        &self.provider_jwt
    }

    /// Signature and expiry only; no blacklist lookup.
    pub fn decode_provider_token(&self, token: &str) -> Result<Claims, TokenError> {
        self.provider_jwt.verify_access_token(token).map_err(classify)
    }

    /// Provider tokens are tried first, then application tokens. A token
    /// whose id is blacklisted is rejected whichever kind it is.
    pub async fn validate_access_token(&self, token: &str) -> Result<VerifiedToken, TokenError> {
        let verified = match self.provider_jwt.verify_access_token(token) {
            Ok(claims) => VerifiedToken {
                claims,
                kind: TokenKind::Provider,
            },
            Err(provider_err) => match self.app_jwt.verify_access_token(token) {
                Ok(claims) => VerifiedToken {
                    claims,
                    kind: TokenKind::App,
                },
                Err(app_err) if provider_err.is_expired() || app_err.is_expired() => {
                    return Err(TokenError::Expired);
                }
                Err(app_err) => {
                    tracing::debug!(%provider_err, %app_err, "access token rejected");
                    return Err(TokenError::Invalid);
                }
            },
        };

        self.ensure_not_revoked(&verified.claims).await?;
        Ok(verified)
    }

    pub async fn ensure_not_revoked(&self, claims: &Claims) -> Result<(), TokenError> {
        if let Some(jti) = claims.token_id()
            && self.blacklist.is_blacklisted(jti).await?
        {
            tracing::info!(user_id = %claims.sub, "revoked token presented");
            return Err(TokenError::Revoked);
        }
        Ok(())
    }

    pub fn issue_app_tokens(&self, user: &User, role: &str) -> Result<AppTokens, TokenError> {
        Ok(AppTokens {
            access_token: self.app_jwt.generate_access_token(user, role)?,
            refresh_token: self.app_jwt.generate_refresh_token(user, role)?,
            expires_in: self.app_jwt.access_expiration_secs(),
            user: user.clone(),
            role: role.to_string(),
        })
    }

    /// Refresh tokens are single use: the presented one is blacklisted
    /// before the new pair is issued.
    pub async fn refresh_app_tokens(&self, refresh_token: &str) -> Result<AppTokens, TokenError> {
        let claims = self
            .app_jwt
            .verify_refresh_token(refresh_token)
            .map_err(classify)?;
        self.ensure_not_revoked(&claims).await?;
        self.blacklist_claims(&claims, REASON_ROTATED).await?;

        let role = claims.role.clone().unwrap_or_else(|| DEFAULT_ROLE.to_string());
        self.issue_app_tokens(&claims.user(), &role)
    }

    /// Returns false when the token was already blacklisted.
    pub async fn revoke(&self, claims: &Claims, reason: &str) -> Result<bool, TokenError> {
        self.blacklist_claims(claims, reason).await
    }

    async fn blacklist_claims(&self, claims: &Claims, reason: &str) -> Result<bool, TokenError> {
        let jti = claims.token_id().ok_or(TokenError::NotRevocable)?;
        let expires_at = DateTime::<Utc>::from_timestamp(claims.exp, 0).unwrap_or_else(Utc::now);
        let added = self
            .blacklist
            .add(NewBlacklistedToken {
                jti: jti.to_string(),
                user_id: claims.sub,
                expires_at,
                reason: reason.to_string(),
            })
            .await?;
        tracing::debug!(user_id = %claims.sub, reason, added, "token blacklisted");
        Ok(added)
    }

    pub async fn cleanup_expired(&self) -> Result<usize, TokenError> {
        let removed = self.blacklist.cleanup_expired().await?;
        tracing::info!(removed, "expired blacklist entries purged");
        Ok(removed)
    }
}

fn classify(err: JwtError) -> TokenError {
    if err.is_expired() {
        TokenError::Expired
    } else {
        tracing::debug!(error = %err, "token rejected");
        TokenError::Invalid
    }
}

/// Purges expired blacklist entries every `every`, starting one period
/// after spawn. Failures are logged and retried on the next tick.
pub fn spawn_blacklist_sweeper(tokens: TokenService, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(e) = tokens.cleanup_expired().await {
                tracing::warn!(error = %e, "blacklist cleanup failed");
            }
        }
    })
}
