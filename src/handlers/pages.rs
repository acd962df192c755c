use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::Uri;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::CookieJar;
use movie_auth_api::ResetTokenResponse;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::app::AppState;
use crate::auth::extractors::CurrentSession;
use crate::auth::reset::extract_reset_material;
use crate::error::AppError;
use crate::handlers::user_response;
use crate::middleware::cookies;
use crate::provider::OAuthProvider;
use crate::routes::{AUTH_CODE_ERROR_PATH, LANDING_PATH, safe_next};

/// GET /dashboard, /profile, /favorites, ...
pub async fn protected_page(uri: Uri, CurrentSession(session): CurrentSession) -> Json<Value> {
    Json(json!({
        "page": uri.path(),
        "user": user_response(&session.user),
    }))
}

/// GET /auth/login, /auth/register, /auth/forgot-password
pub async fn auth_page(uri: Uri) -> Json<Value> {
    Json(json!({ "page": uri.path() }))
}

/// GET /auth/auth-code-error
pub async fn auth_code_error() -> Json<Value> {
    Json(json!({
        "page": AUTH_CODE_ERROR_PATH,
        "message": "The sign-in link is invalid or has expired. Please try again.",
    }))
}

/// GET /auth/reset-password
///
/// Handles links that carry their material in the query string. Links with
/// a fragment go through `POST /api/auth/reset/verify` instead.
pub async fn reset_password_page(
    State(state): State<AppState>,
    jar: CookieJar,
    uri: Uri,
) -> Result<(CookieJar, Json<ResetTokenResponse>), AppError> {
    let target = uri
        .path_and_query()
        .map_or_else(|| uri.path(), |pq| pq.as_str());
    verify_reset_link(&state, jar, target).await
}

/// Verifies whatever token material the reset link carried. A valid link
/// leaves the recovery session in the cookies for the password form.
pub(crate) async fn verify_reset_link(
    state: &AppState,
    jar: CookieJar,
    link: &str,
) -> Result<(CookieJar, Json<ResetTokenResponse>), AppError> {
    let url = state
        .site_url
        .join(link)
        .map_err(|e| AppError::invalid_input(format!("Malformed reset link: {e}")))?;

    let verifier = cookies::pkce_verifier(&jar);
    let verification = state
        .auth
        .verify_password_reset_token(extract_reset_material(&url), verifier.as_deref())
        .await;

    let jar = match &verification.session {
        Some(session) => cookies::clear_pkce_verifier(cookies::set_session(
            jar,
            session,
            state.secure_cookies,
        )),
        None => jar,
    };

    Ok((
        jar,
        Json(ResetTokenResponse {
            valid: verification.valid,
            error: verification.error,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub next: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// GET /auth/callback
pub async fn callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> Response {
    if let Some(error) = query.error_description.as_deref().or(query.error.as_deref()) {
        tracing::info!(%error, "provider reported a failed sign-in");
        return Redirect::temporary(AUTH_CODE_ERROR_PATH).into_response();
    }

    let verifier = cookies::pkce_verifier(&jar);
    let code = query.code.as_deref().unwrap_or_default();
    match state.auth.exchange_code(code, verifier.as_deref()).await {
        Ok(session) => {
            let target = query
                .next
                .as_deref()
                .and_then(safe_next)
                .unwrap_or(LANDING_PATH)
                .to_string();
            let jar = cookies::clear_pkce_verifier(cookies::set_session(
                jar,
                &session,
                state.secure_cookies,
            ));
            (jar, Redirect::temporary(&target)).into_response()
        }
        Err(e) => {
            tracing::info!(error = %e, "code exchange failed");
            Redirect::temporary(AUTH_CODE_ERROR_PATH).into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OAuthQuery {
    pub next: Option<String>,
}

/// GET /auth/oauth/{provider}
pub async fn oauth_start(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(provider): Path<String>,
    Query(query): Query<OAuthQuery>,
) -> Result<(CookieJar, Redirect), AppError> {
    let provider: OAuthProvider = provider
        .parse()
        .map_err(|e: crate::provider::UnsupportedProvider| AppError::invalid_input(e.to_string()))?;
    let redirect = state
        .auth
        .sign_in_with_oauth(provider, query.next.as_deref())?;

    let jar = cookies::set_pkce_verifier(jar, &redirect.code_verifier, state.secure_cookies);
    Ok((jar, Redirect::temporary(redirect.url.as_str())))
}
