use axum::Json;
use axum::extract::State;
use movie_auth_api::{
    CleanupResponse, TokenKind as ApiTokenKind, TokenPairResponse, TokenRefreshRequest, TokenUser,
    TokenValidationResponse,
};

use crate::app::AppState;
use crate::auth::extractors::{AuthClaims, BearerToken};
use crate::auth::tokens::{AppTokens, TokenError, TokenKind};
use crate::error::AppError;

const ADMIN_ROLE: &str = "admin";

fn api_kind(kind: TokenKind) -> ApiTokenKind {
    match kind {
        TokenKind::Provider => ApiTokenKind::Provider,
        TokenKind::App => ApiTokenKind::App,
    }
}

fn token_pair_response(tokens: AppTokens) -> TokenPairResponse {
    TokenPairResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: tokens.expires_in,
        user: TokenUser {
            id: tokens.user.id,
            email: tokens.user.email,
            role: tokens.role,
        },
    }
}

/// POST /api/auth/token/exchange
///
/// Trades a provider access token for an application token pair.
pub async fn exchange(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
) -> Result<Json<TokenPairResponse>, AppError> {
    let tokens = state.auth.tokens();
    let claims = tokens.decode_provider_token(&token)?;
    tokens.ensure_not_revoked(&claims).await?;

    let issued = tokens.issue_app_tokens(&claims.user(), claims.role())?;
    tracing::info!(user_id = %claims.sub, "application tokens issued");
    Ok(Json(token_pair_response(issued)))
}

/// POST /api/auth/token/refresh
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<TokenRefreshRequest>,
) -> Result<Json<TokenPairResponse>, AppError> {
    let issued = state
        .auth
        .tokens()
        .refresh_app_tokens(&payload.refresh_token)
        .await?;
    Ok(Json(token_pair_response(issued)))
}

/// POST /api/auth/token/validate
///
/// Always 200; the body says whether the token is usable.
pub async fn validate(
    State(state): State<AppState>,
    bearer: Option<BearerToken>,
) -> Result<Json<TokenValidationResponse>, AppError> {
    let Some(BearerToken(token)) = bearer else {
        return Ok(Json(TokenValidationResponse {
            error: Some("No token provided".to_string()),
            ..Default::default()
        }));
    };

    match state.auth.tokens().validate_access_token(&token).await {
        Ok(verified) => Ok(Json(TokenValidationResponse {
            valid: true,
            user: Some(TokenUser {
                id: verified.claims.sub,
                email: verified.claims.email.clone(),
                role: verified.claims.role().to_string(),
            }),
            token_kind: Some(api_kind(verified.kind)),
            expires_at: Some(verified.claims.exp),
            error: None,
        })),
        Err(e @ (TokenError::Expired | TokenError::Invalid | TokenError::Revoked)) => {
            Ok(Json(TokenValidationResponse {
                error: Some(e.to_string()),
                ..Default::default()
            }))
        }
        Err(e) => Err(e.into()),
    }
}

/// POST /api/auth/admin/cleanup-tokens
pub async fn cleanup_tokens(
    State(state): State<AppState>,
    AuthClaims { claims, .. }: AuthClaims,
) -> Result<Json<CleanupResponse>, AppError> {
    if claims.role() != ADMIN_ROLE {
        return Err(AppError::forbidden("Admin role required"));
    }

    let removed = state.auth.tokens().cleanup_expired().await?;
    Ok(Json(CleanupResponse {
        message: format!("Removed {removed} expired blacklist entries"),
        removed,
    }))
}
