// src/handlers/auth.rs

use axum::Json;
use axum::extract::State;
use axum_extra::extract::CookieJar;
use movie_auth_api::{
    AuthStatusResponse, ForgotPasswordRequest, LoginRequest, LoginResponse, MeResponse,
    MessageResponse, PasswordUpdateResponse, PasswordUpdateStatus, ProfileResponse,
    RegisterRequest, RegisterResponse, SessionInfoResponse, StatusCode as ApiStatusCode,
    ResetTokenResponse, UpdatePasswordRequest, UpdateProfileRequest, VerifyResetLinkRequest,
};

use crate::app::AppState;
use crate::auth::context::AuthContext;
use crate::auth::extractors::{BearerToken, CurrentSession, MaybeSession};
use crate::auth::jwt::DEFAULT_ROLE;
use crate::auth::password::validate_password_change;
use crate::auth::reset::{FlowError, PasswordResetFlow, ResetState};
use crate::auth::tokens::TokenKind;
use crate::db::models::blacklisted_token::REASON_LOGOUT;
use crate::db::models::profile::ProfileChanges;
use crate::error::AppError;
use crate::handlers::pages::verify_reset_link;
use crate::handlers::{profile_response, user_response};
use crate::middleware::cookies;
use crate::response::AppResponse;
use crate::provider::UserMetadata;
use crate::routes::{LANDING_PATH, safe_next};

const ANONYMOUS_ROLE: &str = "anonymous";

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), AppError> {
    let session = state
        .auth
        .sign_in_with_password(&payload.email, &payload.password)
        .await?;

    let redirect_to = payload
        .redirect_to
        .as_deref()
        .and_then(safe_next)
        .unwrap_or(LANDING_PATH)
        .to_string();
    let jar = cookies::set_session(jar, &session, state.secure_cookies);

    Ok((
        jar,
        Json(LoginResponse {
            user: user_response(&session.user),
            expires_at: session.expires_at,
            redirect_to,
        }),
    ))
}

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<RegisterRequest>,
) -> Result<(CookieJar, AppResponse<RegisterResponse>), AppError> {
    if let Some(confirm) = &payload.confirm_password {
        validate_password_change(&payload.password, confirm)?;
    }
    let metadata = UserMetadata {
        full_name: payload.full_name.filter(|name| !name.trim().is_empty()),
        avatar_url: None,
    };

    let outcome = state
        .auth
        .sign_up(&payload.email, &payload.password, metadata)
        .await?;

    let (jar, message) = match &outcome.session {
        Some(session) => (
            cookies::set_session(jar, session, state.secure_cookies),
            "Account created",
        ),
        None => (jar, "Check your email to confirm your account"),
    };

    Ok((
        jar,
        AppResponse::created(RegisterResponse {
            user: outcome.user.as_ref().map(user_response),
            session_created: outcome.session.is_some(),
            message: message.to_string(),
        }),
    ))
}

/// POST /api/auth/logout
///
/// Ends the cookie session and, when an application token is presented,
/// blacklists it as well. Cookies are cleared even if the provider is down.
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    MaybeSession(session): MaybeSession,
    bearer: Option<BearerToken>,
) -> Result<(CookieJar, Json<MessageResponse>), AppError> {
    if let Some(session) = &session
        && let Err(e) = state.auth.sign_out(session).await
    {
        tracing::warn!(error = %e, "provider sign-out failed, clearing cookies anyway");
    }

    if let Some(BearerToken(token)) = bearer
        && let Ok(verified) = state.auth.tokens().validate_access_token(&token).await
        && verified.kind == TokenKind::App
    {
        state.auth.tokens().revoke(&verified.claims, REASON_LOGOUT).await?;
    }

    Ok((
        cookies::clear_session(jar),
        Json(MessageResponse::new("Successfully logged out")),
    ))
}

/// POST /api/auth/forgot-password
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    state.auth.send_password_reset_email(&payload.email).await?;
    Ok(Json(MessageResponse::new(
        "If an account exists for this email, you will receive a password reset link.",
    )))
}

/// POST /api/auth/reset/verify
///
/// Reset links may carry their tokens in the fragment, which never reaches
/// the server on a page load; the reset page posts its full URL here.
pub async fn verify_reset(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<VerifyResetLinkRequest>,
) -> Result<(CookieJar, Json<ResetTokenResponse>), AppError> {
    verify_reset_link(&state, jar, payload.url.trim()).await
}

/// POST /api/auth/password
///
/// Drives the password reset flow for the current session. Without a nonce
/// the flow starts from a verified link; with one it resumes after the
/// reauthentication email.
pub async fn update_password(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Json(payload): Json<UpdatePasswordRequest>,
) -> Result<AppResponse<PasswordUpdateResponse>, AppError> {
    let flow = match payload.nonce.as_deref() {
        None => {
            let mut flow = PasswordResetFlow::with_session(state.auth.clone(), session);
            flow.submit_password(&payload.password, &payload.confirm_password)
                .await?;
            flow
        }
        Some(nonce) => {
            validate_password_change(&payload.password, &payload.confirm_password)?;
            let mut flow =
                PasswordResetFlow::awaiting_nonce(state.auth.clone(), session, &payload.password);
            let outcome = flow.submit_nonce(nonce).await.map(|_| ());
            match outcome {
                // A malformed code is reported inline, like a wrong one.
                Ok(()) | Err(FlowError::Validation(_)) => flow,
                Err(e) => return Err(e.into()),
            }
        }
    };

    Ok(password_update_response(flow.state()))
}

fn password_update_response(state: &ResetState) -> AppResponse<PasswordUpdateResponse> {
    match state {
        ResetState::Success => AppResponse::ok(PasswordUpdateResponse {
            status: PasswordUpdateStatus::Success,
            message: "Password updated successfully".to_string(),
            nonce_error: None,
        }),
        ResetState::NeedsReauth { error, .. } => AppResponse::accepted(PasswordUpdateResponse {
            status: PasswordUpdateStatus::NeedsReauth,
            message: "Enter the verification code we emailed you".to_string(),
            nonce_error: error.clone(),
        }),
        other => AppResponse::with_status(
            ApiStatusCode::BadRequest,
            PasswordUpdateResponse {
                status: PasswordUpdateStatus::Failed,
                message: other
                    .error()
                    .unwrap_or("Password could not be updated")
                    .to_string(),
                nonce_error: None,
            },
        ),
    }
}

/// POST /api/auth/reauthenticate
pub async fn reauthenticate(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
) -> Result<Json<MessageResponse>, AppError> {
    state.auth.reauthenticate(&session).await?;
    Ok(Json(MessageResponse::new("Verification code sent")))
}

/// GET /api/auth/session
pub async fn session_info(MaybeSession(session): MaybeSession) -> Json<SessionInfoResponse> {
    Json(SessionInfoResponse {
        authenticated: session.is_some(),
        user: session.as_ref().map(|s| user_response(&s.user)),
        expires_at: session.as_ref().map(|s| s.expires_at),
    })
}

/// GET /api/auth/status
pub async fn status(
    State(state): State<AppState>,
    MaybeSession(session): MaybeSession,
) -> Json<AuthStatusResponse> {
    let Some(session) = session else {
        return Json(AuthStatusResponse {
            authenticated: false,
            user_id: None,
            email: None,
            role: ANONYMOUS_ROLE.to_string(),
        });
    };

    let role = state
        .auth
        .tokens()
        .decode_provider_token(&session.access_token)
        .map_or_else(|_| DEFAULT_ROLE.to_string(), |claims| claims.role().to_string());

    Json(AuthStatusResponse {
        authenticated: true,
        user_id: Some(session.user.id),
        email: session.user.email,
        role,
    })
}

/// GET /api/auth/me
pub async fn me(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
) -> Json<MeResponse> {
    let user = user_response(&session.user);
    let context = AuthContext::mount(state.auth.clone(), state.profiles.clone(), Some(session)).await;
    let profile = context.snapshot().profile.map(profile_response);
    context.unmount();

    Json(MeResponse { user, profile })
}

/// PUT /api/auth/profile
pub async fn update_profile(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<ProfileResponse>, AppError> {
    let full_name = payload.full_name.map(|name| name.trim().to_string());
    let avatar_url = payload.avatar_url.map(|url| url.trim().to_string());
    if full_name.is_none() && avatar_url.is_none() {
        return Err(AppError::invalid_input("Nothing to update"));
    }

    let profile = state
        .profiles
        .update_profile(session.user.id, ProfileChanges::new(full_name, avatar_url))
        .await?;
    tracing::info!(user_id = %session.user.id, "profile updated");
    Ok(Json(profile_response(profile)))
}
