use std::convert::Infallible;

use axum::extract::{FromRequestParts, OptionalFromRequestParts, Query};
use axum::http::{header, request::Parts};
use axum_extra::extract::CookieJar;
use serde::Deserialize;

use crate::app::AppState;
use crate::auth::jwt::Claims;
use crate::auth::tokens::TokenKind;
use crate::error::AppError;
use crate::provider::Session;

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Raw bearer token, looked up in order: `Authorization` header (with or
/// without the `Bearer ` prefix), `access_token` cookie, `token` query
/// parameter.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

impl BearerToken {
    fn from_parts(parts: &Parts) -> Option<String> {
        if let Some(value) = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
        {
            const BEARER: &str = "Bearer ";
            if let Some(token) = value.strip_prefix(BEARER) {
                return Some(token.trim().to_string()).filter(|t| !t.is_empty());
            }
            if !value.starts_with("Basic ") && !value.trim().is_empty() {
                return Some(value.trim().to_string());
            }
        }

        if let Some(cookie) = CookieJar::from_headers(&parts.headers).get(ACCESS_TOKEN_COOKIE) {
            return Some(cookie.value().to_string());
        }

        Query::<TokenQuery>::try_from_uri(&parts.uri)
            .ok()
            .and_then(|Query(q)| q.token)
            .filter(|t| !t.is_empty())
    }
}

impl<S: Send + Sync> FromRequestParts<S> for BearerToken {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_parts(parts)
            .map(BearerToken)
            .ok_or(AppError::MissingToken)
    }
}

impl<S: Send + Sync> OptionalFromRequestParts<S> for BearerToken {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(Self::from_parts(parts).map(BearerToken))
    }
}

/// Claims of a valid, non-revoked provider or application access token.
#[derive(Debug, Clone)]
pub struct AuthClaims {
    pub claims: Claims,
    pub kind: TokenKind,
}

impl FromRequestParts<AppState> for AuthClaims {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = BearerToken::from_parts(parts).ok_or(AppError::MissingToken)?;
        let verified = state.auth.tokens().validate_access_token(&token).await?;
        Ok(AuthClaims {
            claims: verified.claims,
            kind: verified.kind,
        })
    }
}

/// Session placed in the request extensions by the session middleware.
#[derive(Debug, Clone)]
pub struct CurrentSession(pub Session);

impl<S: Send + Sync> FromRequestParts<S> for CurrentSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentSession>()
            .cloned()
            .ok_or_else(|| AppError::unauthorized("Authentication required"))
    }
}

#[derive(Debug, Clone)]
pub struct MaybeSession(pub Option<Session>);

impl<S: Send + Sync> FromRequestParts<S> for MaybeSession {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeSession(
            parts
                .extensions
                .get::<CurrentSession>()
                .map(|current| current.0.clone()),
        ))
    }
}
