use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::RequestBuilder;
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

use super::{
    IdentityProvider, OAuthProvider, ProviderError, Session, SignUpOutcome, User, UserMetadata,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_EXPIRES_IN: i64 = 3600;

pub struct SupabaseClient {
    http: reqwest::Client,
    /// `<provider url>/auth/v1/`
    auth_base: Url,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(provider_url: &Url, anon_key: impl Into<String>) -> Result<Self> {
        anyhow::ensure!(
            !provider_url.cannot_be_a_base(),
            "provider URL must be hierarchical: {provider_url}"
        );

        let mut auth_base = provider_url.clone();
        let base_path = provider_url.path().trim_end_matches('/').to_string();
        auth_base.set_path(&format!("{base_path}/auth/v1/"));
        auth_base.set_query(None);

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build identity provider HTTP client")?;

        Ok(Self {
            http,
            auth_base,
            anon_key: anon_key.into(),
        })
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.auth_base.clone();
        url.set_path(&format!("{}{path}", self.auth_base.path()));
        url
    }

    fn token_endpoint(&self, grant_type: &str) -> Url {
        let mut url = self.endpoint("token");
        url.query_pairs_mut().append_pair("grant_type", grant_type);
        url
    }

    fn request(&self, method: reqwest::Method, url: Url, access_token: Option<&str>) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token.unwrap_or(&self.anon_key))
    }

    async fn send(request: RequestBuilder) -> Result<reqwest::Response, ProviderError> {
        let response = request.send().await.map_err(transport_error)?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let error = parse_error_body(status, &body);
        tracing::debug!(status, code = ?error.code(), "identity provider rejected request");
        Err(error)
    }

    async fn send_for_session(request: RequestBuilder) -> Result<Session, ProviderError> {
        let payload: SessionPayload = Self::send(request)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        Ok(payload.into_session())
    }
}

#[derive(Deserialize)]
struct SessionPayload {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: User,
}

impl SessionPayload {
    fn into_session(self) -> Session {
        let expires_at = self.expires_at.unwrap_or_else(|| {
            Utc::now().timestamp() + self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN)
        });
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

#[derive(Deserialize, Default)]
struct ErrorBody {
    error_code: Option<String>,
    error: Option<String>,
    msg: Option<String>,
    error_description: Option<String>,
    message: Option<String>,
}

/// GoTrue has used several error shapes over time; take the most specific fields.
fn parse_error_body(status: u16, body: &str) -> ProviderError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let code = parsed.error_code.or(parsed.error);
    let message = parsed
        .msg
        .or(parsed.error_description)
        .or(parsed.message)
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                format!("HTTP {status}")
            } else {
                body.to_string()
            }
        });

    ProviderError::Api {
        status,
        code,
        message,
    }
}

fn transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_decode() {
        ProviderError::Malformed(err.to_string())
    } else {
        ProviderError::Transport(err.to_string())
    }
}

/// Sign-up answers with a full session when confirmation is off,
/// and with the bare user (or `{ user }`) while confirmation is pending.
fn parse_sign_up(value: Value) -> Result<SignUpOutcome, ProviderError> {
    if value.get("access_token").is_some() {
        let payload: SessionPayload =
            serde_json::from_value(value).map_err(|e| ProviderError::Malformed(e.to_string()))?;
        let session = payload.into_session();
        return Ok(SignUpOutcome {
            user: Some(session.user.clone()),
            session: Some(session),
        });
    }

    let user_value = value.get("user").cloned().unwrap_or(value);
    let user = if user_value.get("id").is_some() {
        Some(
            serde_json::from_value(user_value)
                .map_err(|e| ProviderError::Malformed(e.to_string()))?,
        )
    } else {
        None
    };

    Ok(SignUpOutcome {
        user,
        session: None,
    })
}

#[async_trait]
impl IdentityProvider for SupabaseClient {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, ProviderError> {
        let request = self
            .request(reqwest::Method::POST, self.token_endpoint("password"), None)
            .json(&json!({ "email": email, "password": password }));
        Self::send_for_session(request).await
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &UserMetadata,
        email_redirect_to: &str,
    ) -> Result<SignUpOutcome, ProviderError> {
        let mut url = self.endpoint("signup");
        url.query_pairs_mut()
            .append_pair("redirect_to", email_redirect_to);

        let request = self
            .request(reqwest::Method::POST, url, None)
            .json(&json!({ "email": email, "password": password, "data": metadata }));
        let value: Value = Self::send(request)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        parse_sign_up(value)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), ProviderError> {
        let mut url = self.endpoint("logout");
        url.query_pairs_mut().append_pair("scope", "local");
        Self::send(self.request(reqwest::Method::POST, url, Some(access_token))).await?;
        Ok(())
    }

    async fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: &str,
    ) -> Result<(), ProviderError> {
        let mut url = self.endpoint("recover");
        url.query_pairs_mut().append_pair("redirect_to", redirect_to);
        let request = self
            .request(reqwest::Method::POST, url, None)
            .json(&json!({ "email": email }));
        Self::send(request).await?;
        Ok(())
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, ProviderError> {
        let request = self
            .request(
                reqwest::Method::POST,
                self.token_endpoint("refresh_token"),
                None,
            )
            .json(&json!({ "refresh_token": refresh_token }));
        Self::send_for_session(request).await
    }

    async fn exchange_code_for_session(
        &self,
        auth_code: &str,
        code_verifier: Option<&str>,
    ) -> Result<Session, ProviderError> {
        let request = self
            .request(reqwest::Method::POST, self.token_endpoint("pkce"), None)
            .json(&json!({
                "auth_code": auth_code,
                "code_verifier": code_verifier.unwrap_or_default(),
            }));
        Self::send_for_session(request).await
    }

    async fn update_password(
        &self,
        access_token: &str,
        password: &str,
        nonce: Option<&str>,
    ) -> Result<User, ProviderError> {
        let mut body = json!({ "password": password });
        if let Some(nonce) = nonce {
            body["nonce"] = Value::String(nonce.to_string());
        }

        let request = self
            .request(reqwest::Method::PUT, self.endpoint("user"), Some(access_token))
            .json(&body);
        Self::send(request)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))
    }

    async fn reauthenticate(&self, access_token: &str) -> Result<(), ProviderError> {
        let request = self.request(
            reqwest::Method::GET,
            self.endpoint("reauthenticate"),
            Some(access_token),
        );
        Self::send(request).await?;
        Ok(())
    }

    fn authorize_url(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
        code_challenge: &str,
    ) -> Url {
        let mut url = self.endpoint("authorize");
        url.query_pairs_mut()
            .append_pair("provider", provider.as_str())
            .append_pair("redirect_to", redirect_to)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", "s256");
        url
    }
}
