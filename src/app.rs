// src/app.rs

use std::sync::Arc;

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use url::Url;

use crate::auth::services::AuthService;
use crate::db::store::ProfileStore;
use crate::handlers::health::health;
use crate::handlers::{auth, pages, tokens};
use crate::middleware::session::session_middleware;
use crate::routes::{AUTH_CODE_ERROR_PATH, CALLBACK_PATH, PROTECTED_ROUTES, RESET_PASSWORD_PATH};

/// Shared by every handler and the session middleware.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    pub profiles: Arc<dyn ProfileStore>,
    /// Sets the `Secure` attribute on the cookies we write.
    pub secure_cookies: bool,
    pub site_url: Url,
}

/// Page endpoints, classified by the session middleware.
fn page_routes() -> Router<AppState> {
    let mut router = Router::new();
    for path in PROTECTED_ROUTES {
        router = router.route(path, get(pages::protected_page));
    }

    router
        .route("/auth/login", get(pages::auth_page))
        .route("/auth/register", get(pages::auth_page))
        .route("/auth/forgot-password", get(pages::auth_page))
        .route(RESET_PASSWORD_PATH, get(pages::reset_password_page))
        .route(CALLBACK_PATH, get(pages::callback))
        .route(AUTH_CODE_ERROR_PATH, get(pages::auth_code_error))
        .route("/auth/oauth/{provider}", get(pages::oauth_start))
}

/// JSON API, nested under `/api/auth`.
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(auth::login))
        .route("/register", post(auth::register))
        .route("/logout", post(auth::logout))
        .route("/forgot-password", post(auth::forgot_password))
        .route("/reset/verify", post(auth::verify_reset))
        .route("/password", post(auth::update_password))
        .route("/reauthenticate", post(auth::reauthenticate))
        .route("/session", get(auth::session_info))
        .route("/status", get(auth::status))
        .route("/me", get(auth::me))
        .route("/profile", put(auth::update_profile))
        .route("/token/exchange", post(tokens::exchange))
        .route("/token/refresh", post(tokens::refresh))
        .route("/token/validate", post(tokens::validate))
        .route("/admin/cleanup-tokens", post(tokens::cleanup_tokens))
}

fn cors_layer(site_url: &Url) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true);

    match HeaderValue::from_str(&site_url.origin().ascii_serialization()) {
        Ok(origin) => cors.allow_origin(origin),
        Err(e) => {
            tracing::warn!(error = %e, "site origin is not a valid header value, CORS disabled");
            cors
        }
    }
}

/// Builds the complete application.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(page_routes())
        .nest("/api/auth", api_routes())
        .layer(middleware::from_fn_with_state(state.clone(), session_middleware))
        .layer(cors_layer(&state.site_url))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_XSS_PROTECTION,
            HeaderValue::from_static("1; mode=block"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
