use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use url::Url;

const DEV_PROVIDER_URL: &str = "http://localhost:54321";
const DEV_SITE_URL: &str = "http://localhost:3000";
const DEV_ANON_KEY: &str = "dev-anon-key";
/// Secret used by a local Supabase stack.
const DEV_PROVIDER_JWT_SECRET: &str = "super-secret-jwt-token-with-at-least-32-characters-long";
const DEV_APP_JWT_SECRET: &str = "dev_app_secret_change_in_production";
const MIN_PRODUCTION_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Lambda always counts as production; elsewhere `APP_ENV` decides.
    pub fn detect() -> Self {
        if env::var("AWS_LAMBDA_FUNCTION_NAME").is_ok() {
            return Self::Production;
        }

        match env::var("APP_ENV").as_deref() {
            Ok("production" | "prod") => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub environment: Environment,
    pub provider_url: Url,
    pub anon_key: String,
    pub site_url: Url,
    pub provider_jwt_secret: Vec<u8>,
    pub app_jwt_secret: String,
    pub access_token_minutes: i64,
    pub refresh_token_days: i64,
    pub jwt_leeway_secs: u64,
    pub session_refresh_margin_secs: i64,
    /// `None` in development runs on the in-memory store.
    pub database_url: Option<String>,
    pub server_host: String,
    pub server_port: u16,
    pub blacklist_cleanup_interval: Duration,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("environment", &self.environment)
            .field("provider_url", &self.provider_url.as_str())
            .field("site_url", &self.site_url.as_str())
            .field(
                "database_url",
                &self.database_url.as_deref().map(Self::mask_credentials),
            )
            .field("server_host", &self.server_host)
            .field("server_port", &self.server_port)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let environment = Environment::detect();
        tracing::info!(environment = environment.as_str(), "environment detected");

        let provider_url = Self::url_setting("SUPABASE_URL", DEV_PROVIDER_URL, &environment)?;
        let site_url = Self::url_setting("SITE_URL", DEV_SITE_URL, &environment)?;
        let anon_key = Self::required(
            Self::public_var("SUPABASE_ANON_KEY"),
            "SUPABASE_ANON_KEY",
            DEV_ANON_KEY,
            &environment,
        )?;
        let provider_jwt_secret = Self::provider_jwt_secret(&environment)?;
        let app_jwt_secret = Self::app_jwt_secret(&environment)?;

        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());
        if database_url.is_none() && environment.is_production() {
            anyhow::bail!(
                "DATABASE_URL must be set in production! \
                 Configure it in Lambda environment variables."
            );
        }

        let config = Self {
            provider_url,
            anon_key,
            site_url,
            provider_jwt_secret,
            app_jwt_secret,
            access_token_minutes: Self::parsed("ACCESS_TOKEN_EXPIRY_MINUTES", 15),
            refresh_token_days: Self::parsed("REFRESH_TOKEN_EXPIRY_DAYS", 7),
            jwt_leeway_secs: Self::parsed("JWT_LEEWAY_SECONDS", 10),
            session_refresh_margin_secs: Self::parsed("SESSION_REFRESH_MARGIN_SECONDS", 60),
            database_url,
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: Self::parsed("SERVER_PORT", 3000),
            blacklist_cleanup_interval: Duration::from_secs(Self::parsed(
                "BLACKLIST_CLEANUP_INTERVAL_SECS",
                3600,
            )),
            environment,
        };

        tracing::info!("configuration loaded");
        tracing::debug!(?config, "effective configuration");
        Ok(config)
    }

    /// `NAME`, then the browser-facing `NEXT_PUBLIC_NAME` the frontend uses.
    fn public_var(name: &str) -> Option<String> {
        env::var(name)
            .or_else(|_| env::var(format!("NEXT_PUBLIC_{name}")))
            .ok()
            .filter(|value| !value.is_empty())
    }

    fn required(
        value: Option<String>,
        name: &str,
        dev_default: &str,
        environment: &Environment,
    ) -> Result<String> {
        match value {
            Some(value) => Ok(value),
            None if environment.is_production() => {
                anyhow::bail!("{name} is required in production")
            }
            None => {
                tracing::warn!(name, "not set, using local default (DEVELOPMENT ONLY!)");
                Ok(dev_default.to_string())
            }
        }
    }

    fn url_setting(name: &str, dev_default: &str, environment: &Environment) -> Result<Url> {
        let raw = Self::required(Self::public_var(name), name, dev_default, environment)?;
        Url::parse(&raw).with_context(|| format!("{name} is not a valid URL: {raw}"))
    }

    /// Raw bytes unless `SUPABASE_JWT_SECRET_ENCODING=base64`.
    fn provider_jwt_secret(environment: &Environment) -> Result<Vec<u8>> {
        let secret = Self::required(
            env::var("SUPABASE_JWT_SECRET").ok(),
            "SUPABASE_JWT_SECRET",
            DEV_PROVIDER_JWT_SECRET,
            environment,
        )?;

        match env::var("SUPABASE_JWT_SECRET_ENCODING").as_deref() {
            Ok("base64") => STANDARD
                .decode(secret.trim())
                .context("SUPABASE_JWT_SECRET is not valid base64"),
            Ok("raw") | Err(_) => Ok(secret.into_bytes()),
            Ok(other) => anyhow::bail!("unknown SUPABASE_JWT_SECRET_ENCODING: {other}"),
        }
    }

    fn app_jwt_secret(environment: &Environment) -> Result<String> {
        let secret = Self::required(
            env::var("APP_JWT_SECRET").ok(),
            "APP_JWT_SECRET",
            DEV_APP_JWT_SECRET,
            environment,
        )?;

        if environment.is_production() && secret.len() < MIN_PRODUCTION_SECRET_LEN {
            anyhow::bail!(
                "APP_JWT_SECRET must be at least {MIN_PRODUCTION_SECRET_LEN} characters in production (current: {})",
                secret.len()
            );
        }
        Ok(secret)
    }

    fn parsed<T: FromStr + Copy + fmt::Display>(name: &str, default: T) -> T {
        match env::var(name) {
            Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!(name, raw = %raw, %default, "invalid value, using default");
                default
            }),
            Err(_) => default,
        }
    }

    /// Masks the credentials of a connection URL for logging.
    fn mask_credentials(url: &str) -> String {
        if let Some(at_pos) = url.find('@')
            && let Some(scheme_end) = url.find("://")
        {
            let scheme = &url[..scheme_end + 3];
            let after_at = &url[at_pos..];
            return format!("{scheme}***:***{after_at}");
        }
        url.to_string()
    }

    pub fn is_production(&self) -> bool {
        self.environment.is_production()
    }

    /// Cookies only get `Secure` when the site is served over https.
    pub fn secure_cookies(&self) -> bool {
        self.site_url.scheme() == "https"
    }
}
