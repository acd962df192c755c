use std::sync::Arc;

use anyhow::Context;
use movie_auth::app::{AppState, build_router};
use movie_auth::auth::jwt::JwtManager;
use movie_auth::auth::services::AuthService;
use movie_auth::auth::tokens::{APP_TOKEN_ISSUER, TokenService, spawn_blacklist_sweeper};
use movie_auth::config::Config;
use movie_auth::db::connection::{DEFAULT_POOL_SIZE, create_pool};
use movie_auth::db::store::{MemoryStore, PgStore, ProfileStore, TokenBlacklist};
use movie_auth::provider::supabase::SupabaseClient;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub fn setup_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        // Defaults when RUST_LOG is not set
        tracing_subscriber::EnvFilter::new(
            "info,movie_auth=debug,hyper_util=warn,tower_http=info",
        )
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn stores(config: &Config) -> anyhow::Result<(Arc<dyn ProfileStore>, Arc<dyn TokenBlacklist>)> {
    match &config.database_url {
        Some(url) => {
            let pool = create_pool(url, DEFAULT_POOL_SIZE).context("failed to create database pool")?;
            let store = Arc::new(PgStore::new(pool));
            let profiles: Arc<dyn ProfileStore> = store.clone();
            let blacklist: Arc<dyn TokenBlacklist> = store;
            Ok((profiles, blacklist))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, profiles and blacklist live in memory");
            let store = Arc::new(MemoryStore::new());
            let profiles: Arc<dyn ProfileStore> = store.clone();
            let blacklist: Arc<dyn TokenBlacklist> = store;
            Ok((profiles, blacklist))
        }
    }
}

fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let provider = SupabaseClient::new(&config.provider_url, config.anon_key.clone())?;
    let (profiles, blacklist) = stores(config)?;

    let provider_jwt = JwtManager::new(&config.provider_jwt_secret).with_leeway(config.jwt_leeway_secs);
    let app_jwt = JwtManager::new(config.app_jwt_secret.as_bytes())
        .with_expiration(config.access_token_minutes, config.refresh_token_days)
        .with_leeway(config.jwt_leeway_secs)
        .with_issuer(APP_TOKEN_ISSUER);
    let tokens = TokenService::new(provider_jwt, app_jwt, blacklist);

    let auth = AuthService::new(Arc::new(provider), tokens, config.site_url.clone())
        .with_refresh_margin(config.session_refresh_margin_secs);

    Ok(AppState {
        auth: Arc::new(auth),
        profiles,
        secure_cookies: config.secure_cookies(),
        site_url: config.site_url.clone(),
    })
}

// ----------------- Main -----------------

#[tokio::main]
async fn main() -> Result<(), lambda_http::Error> {
    setup_logging();
    tracing::info!("Starting movie-auth...");

    let config = Config::from_env()?;
    let state = build_state(&config)?;
    spawn_blacklist_sweeper(state.auth.tokens().clone(), config.blacklist_cleanup_interval);

    let app = build_router(state);

    if std::env::var("AWS_LAMBDA_FUNCTION_NAME").is_ok() {
        tracing::info!("Running in Lambda mode");
        lambda_http::run(app).await
    } else {
        tracing::info!("Running in local HTTP server mode");
        let addr = format!("{}:{}", config.server_host, config.server_port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!(%addr, "server listening");
        axum::serve(listener, app).await?;

        Ok(())
    }
}
