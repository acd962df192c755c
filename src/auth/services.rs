// src/auth/services.rs

use std::sync::Arc;

use chrono::Utc;
use url::Url;

use crate::auth::error::{AuthError, AuthResult};
use crate::auth::events::{AuthEvent, AuthEventBus, AuthEventKind, Subscription};
use crate::auth::password::{validate_credentials, validate_email, validate_new_password, validate_nonce};
use crate::auth::reset::ResetTokenMaterial;
use crate::auth::tokens::{TokenError, TokenService};
use crate::db::models::blacklisted_token::REASON_LOGOUT;
use crate::provider::pkce::{generate_code_challenge, generate_code_verifier};
use crate::provider::{
    IdentityProvider, OAuthProvider, Session, SignUpOutcome, TokenPair, User, UserMetadata,
};
use crate::routes;

pub const DEFAULT_REFRESH_MARGIN_SECS: i64 = 60;
pub const INVALID_RESET_LINK: &str = "Invalid or expired reset link. Please request a new one.";

/// Session loaded from cookies; `refreshed` means the token pair changed.
#[derive(Debug, Clone)]
pub struct LoadedSession {
    pub session: Session,
    pub refreshed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TokenVerification {
    pub valid: bool,
    pub session: Option<Session>,
    pub error: Option<String>,
}

impl TokenVerification {
    fn invalid(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            session: None,
            error: Some(message.into()),
        }
    }
}

/// Where to send the browser for an OAuth sign-in. The verifier must come
/// back with the callback to complete the code exchange.
#[derive(Debug, Clone)]
pub struct OAuthRedirect {
    pub url: Url,
    pub code_verifier: String,
}

/// Façade over the identity provider.
///
/// Every operation validates its input before touching the network and
/// returns provider failures as [`AuthError`] values.
#[derive(Clone)]
pub struct AuthService {
    provider: Arc<dyn IdentityProvider>,
    tokens: TokenService,
    events: AuthEventBus,
    site_url: Url,
    refresh_margin_secs: i64,
}

impl AuthService {
    pub fn new(provider: Arc<dyn IdentityProvider>, tokens: TokenService, site_url: Url) -> Self {
        Self {
            provider,
            tokens,
            events: AuthEventBus::new(),
            site_url,
            refresh_margin_secs: DEFAULT_REFRESH_MARGIN_SECS,
        }
    }

    #[must_use]
    pub fn with_refresh_margin(mut self, secs: i64) -> Self {
        self.refresh_margin_secs = secs;
        self
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn events(&self) -> &AuthEventBus {
        &self.events
    }

    fn site_path(&self, path: &str) -> AuthResult<Url> {
        self.site_url
            .join(path)
            .map_err(|e| AuthError::unexpected(format!("invalid site url: {e}")))
    }

    fn emit(&self, kind: AuthEventKind, session: Option<&Session>) {
        self.events.emit(&AuthEvent::new(kind, session.cloned()));
    }

    // === Credentials ===

    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> AuthResult<Session> {
        validate_credentials(email, password)?;
        let email = email.trim();

        let session = self
            .provider
            .sign_in_with_password(email, password)
            .await
            .inspect_err(|e| tracing::info!(error = %e, "sign-in rejected"))?;

        tracing::info!(user_id = %session.user.id, "user signed in");
        self.emit(AuthEventKind::SignedIn, Some(&session));
        Ok(session)
    }

    /// Without a session in the outcome the account awaits email confirmation.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        profile: UserMetadata,
    ) -> AuthResult<SignUpOutcome> {
        validate_email(email)?;
        validate_new_password(password)?;
        let confirm_url = self.site_path(routes::CALLBACK_PATH)?;

        let outcome = self
            .provider
            .sign_up(email.trim(), password, &profile, confirm_url.as_str())
            .await?;

        tracing::info!(
            user_id = ?outcome.user.as_ref().map(|u| u.id),
            confirmed = outcome.session.is_some(),
            "user registered"
        );
        if let Some(session) = &outcome.session {
            self.emit(AuthEventKind::SignedIn, Some(session));
        }
        Ok(outcome)
    }

    /// Blacklists the session's access token, then ends the session at the
    /// provider. Only a provider outage is reported: a session the provider
    /// already considers gone is signed out as far as we are concerned.
    pub async fn sign_out(&self, session: &Session) -> AuthResult<()> {
        match self.tokens.decode_provider_token(&session.access_token) {
            Ok(claims) => match self.tokens.revoke(&claims, REASON_LOGOUT).await {
                Ok(_) | Err(TokenError::NotRevocable) => {}
                Err(e) => tracing::warn!(error = %e, "could not blacklist token on sign-out"),
            },
            Err(e) => tracing::debug!(error = %e, "signing out with an unverifiable token"),
        }

        let outcome = match self.provider.sign_out(&session.access_token).await {
            Ok(()) => Ok(()),
            Err(err) => match AuthError::from(err) {
                e if e.is_transient() => Err(e),
                e => {
                    tracing::debug!(error = %e, "provider had already ended the session");
                    Ok(())
                }
            },
        };

        tracing::info!(user_id = %session.user.id, "user signed out");
        self.events.emit(&AuthEvent::signed_out(session.user.id));
        outcome
    }

    // === Password reset ===

    /// Succeeds whether or not an account exists for `email`.
    pub async fn send_password_reset_email(&self, email: &str) -> AuthResult<()> {
        validate_email(email)?;
        let redirect = self.site_path(routes::RESET_PASSWORD_PATH)?;

        match self
            .provider
            .reset_password_for_email(email.trim(), redirect.as_str())
            .await
        {
            Ok(()) => Ok(()),
            Err(err) => match AuthError::from(err) {
                e if e.is_transient() => Err(e),
                e => {
                    tracing::debug!(error = %e, "reset email refused, reporting success anyway");
                    Ok(())
                }
            },
        }
    }

    /// Valid iff the material from the reset link yields a session.
    pub async fn verify_password_reset_token(
        &self,
        material: Option<ResetTokenMaterial>,
        code_verifier: Option<&str>,
    ) -> TokenVerification {
        let result = match material {
            None => return TokenVerification::invalid(INVALID_RESET_LINK),
            Some(ResetTokenMaterial::ProviderError(description)) => {
                return TokenVerification::invalid(description);
            }
            Some(ResetTokenMaterial::Code(code)) => self
                .provider
                .exchange_code_for_session(&code, code_verifier)
                .await
                .map_err(AuthError::from),
            Some(ResetTokenMaterial::Tokens(pair)) => {
                self.load_session(pair).await.map(|loaded| loaded.session)
            }
        };

        match result {
            Ok(session) => {
                self.emit(AuthEventKind::PasswordRecovery, Some(&session));
                TokenVerification {
                    valid: true,
                    session: Some(session),
                    error: None,
                }
            }
            Err(e) if e.is_transient() => TokenVerification::invalid(e.to_string()),
            Err(e) => {
                tracing::debug!(error = %e, "reset link rejected");
                TokenVerification::invalid(INVALID_RESET_LINK)
            }
        }
    }

    /// A reauthentication-class rejection means "send a nonce" when none was
    /// supplied and "wrong nonce" when one was.
    pub async fn update_password(
        &self,
        session: &Session,
        new_password: &str,
        nonce: Option<&str>,
    ) -> AuthResult<User> {
        validate_new_password(new_password)?;
        let nonce = nonce.map(validate_nonce).transpose()?;

        let user = self
            .provider
            .update_password(&session.access_token, new_password, nonce)
            .await
            .map_err(|err| match AuthError::from(err) {
                AuthError::ReauthenticationRequired if nonce.is_some() => AuthError::InvalidNonce,
                other => other,
            })
            .inspect_err(|e| tracing::info!(user_id = %session.user.id, error = %e, "password update rejected"))?;

        tracing::info!(user_id = %user.id, "password updated");
        let mut updated = session.clone();
        updated.user = user.clone();
        self.emit(AuthEventKind::UserUpdated, Some(&updated));
        Ok(user)
    }

    /// Dispatches a reauthentication nonce; safe to repeat.
    pub async fn reauthenticate(&self, session: &Session) -> AuthResult<()> {
        self.provider
            .reauthenticate(&session.access_token)
            .await
            .map_err(AuthError::from)?;
        tracing::info!(user_id = %session.user.id, "reauthentication nonce sent");
        Ok(())
    }

    // === OAuth ===

    pub fn sign_in_with_oauth(
        &self,
        provider: OAuthProvider,
        next: Option<&str>,
    ) -> AuthResult<OAuthRedirect> {
        let mut callback = self.site_path(routes::CALLBACK_PATH)?;
        if let Some(next) = next.and_then(routes::safe_next) {
            callback.query_pairs_mut().append_pair("next", next);
        }

        let code_verifier = generate_code_verifier();
        let challenge = generate_code_challenge(&code_verifier);
        let url = self
            .provider
            .authorize_url(provider, callback.as_str(), &challenge);

        Ok(OAuthRedirect { url, code_verifier })
    }

    pub async fn exchange_code(&self, code: &str, code_verifier: Option<&str>) -> AuthResult<Session> {
        if code.trim().is_empty() {
            return Err(AuthError::InvalidLink("Missing authorization code".to_string()));
        }
        let session = self
            .provider
            .exchange_code_for_session(code, code_verifier)
            .await?;
        tracing::info!(user_id = %session.user.id, "code exchanged for session");
        self.emit(AuthEventKind::SignedIn, Some(&session));
        Ok(session)
    }

    // === Sessions ===

    /// Trusts the access token while it verifies locally and is not about to
    /// expire; otherwise trades the refresh token for a new pair.
    pub async fn load_session(&self, pair: TokenPair) -> AuthResult<LoadedSession> {
        let now = Utc::now().timestamp();

        match self.tokens.decode_provider_token(&pair.access_token) {
            Ok(claims) => {
                match self.tokens.ensure_not_revoked(&claims).await {
                    Ok(()) => {}
                    Err(TokenError::Revoked) => return Err(AuthError::SessionRevoked),
                    Err(e) => return Err(AuthError::unexpected(e.to_string())),
                }
                if claims.exp - now > self.refresh_margin_secs {
                    return Ok(LoadedSession {
                        session: Session {
                            user: claims.user(),
                            expires_at: claims.exp,
                            access_token: pair.access_token,
                            refresh_token: pair.refresh_token,
                        },
                        refreshed: false,
                    });
                }
            }
            Err(e) => tracing::debug!(error = %e, "access token unusable, refreshing"),
        }

        if pair.refresh_token.is_empty() {
            return Err(AuthError::SessionExpired);
        }

        let session = self.provider.refresh_session(&pair.refresh_token).await?;
        tracing::debug!(user_id = %session.user.id, "session refreshed");
        self.emit(AuthEventKind::TokenRefreshed, Some(&session));
        Ok(LoadedSession {
            session,
            refreshed: true,
        })
    }

    pub fn on_auth_state_change<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&AuthEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(listener)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::Duration;

    use super::*;
    use crate::auth::password::{PasswordRule, ValidationError};
    use crate::auth::testing::{SITE_URL, auth_service, session_for};
    use crate::db::store::MemoryStore;
    use crate::provider::ProviderError;
    use crate::provider::mock::{MockProvider, Reply, reauth_needed, same_password, user};

    const STRONG: &str = "Str0ng!Pass";

    fn setup() -> (Arc<MockProvider>, Arc<MemoryStore>, AuthService) {
        let mock = Arc::new(MockProvider::new());
        let store = Arc::new(MemoryStore::new());
        let service = auth_service(mock.clone(), store.clone());
        (mock, store, service)
    }

    fn record_events(service: &AuthService) -> (Arc<Mutex<Vec<AuthEventKind>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let sub = service.on_auth_state_change(move |event| sink.lock().unwrap().push(event.kind));
        (seen, sub)
    }

    #[tokio::test]
    async fn sign_in_returns_session_and_emits() {
        let (mock, _, service) = setup();
        let session = session_for(&user("fan@movies.example"), Duration::hours(1));
        mock.on("sign_in_with_password", Reply::Session(session.clone()));
        let (events, _sub) = record_events(&service);

        let got = service
            .sign_in_with_password(" fan@movies.example ", "whatever")
            .await
            .unwrap();

        assert_eq!(got, session);
        assert_eq!(*events.lock().unwrap(), vec![AuthEventKind::SignedIn]);
        let call = mock.last_call("sign_in_with_password").unwrap();
        assert_eq!(call.args[0], "fan@movies.example");
    }

    #[tokio::test]
    async fn sign_in_with_bad_credentials_maps_message() {
        let (mock, _, service) = setup();
        mock.on(
            "sign_in_with_password",
            Reply::Fail(ProviderError::api(400, Some("invalid_credentials"), "Invalid login credentials")),
        );

        let err = service
            .sign_in_with_password("fan@movies.example", "wrong")
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::InvalidCredentials);
    }

    #[tokio::test]
    async fn weak_registration_password_never_reaches_provider() {
        let (mock, _, service) = setup();

        let err = service
            .sign_up("new@movies.example", "weak", UserMetadata::default())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            AuthError::Validation(ValidationError::WeakPassword(PasswordRule::MinLength))
        );
        assert_eq!(err.to_string(), "Password must be at least 8 characters");
        assert_eq!(mock.total_calls(), 0);
    }

    #[tokio::test]
    async fn sign_up_without_session_awaits_confirmation() {
        let (mock, _, service) = setup();
        mock.on(
            "sign_up",
            Reply::SignUp(SignUpOutcome {
                user: Some(user("new@movies.example")),
                session: None,
            }),
        );
        let (events, _sub) = record_events(&service);

        let outcome = service
            .sign_up(
                "new@movies.example",
                STRONG,
                UserMetadata {
                    full_name: Some("New Fan".into()),
                    avatar_url: None,
                },
            )
            .await
            .unwrap();

        assert!(outcome.session.is_none());
        assert!(events.lock().unwrap().is_empty());
        let call = mock.last_call("sign_up").unwrap();
        assert_eq!(call.args[2], "New Fan");
        assert_eq!(call.args[3], format!("{SITE_URL}/auth/callback"));
    }

    #[tokio::test]
    async fn reset_email_succeeds_for_known_and_unknown_addresses() {
        let (mock, _, service) = setup();
        mock.on("reset_password_for_email", Reply::Done).on(
            "reset_password_for_email",
            Reply::Fail(ProviderError::api(404, Some("user_not_found"), "User not found")),
        );

        assert!(service.send_password_reset_email("known@movies.example").await.is_ok());
        assert!(service.send_password_reset_email("ghost@movies.example").await.is_ok());
        assert_eq!(mock.calls("reset_password_for_email"), 2);
        let call = mock.last_call("reset_password_for_email").unwrap();
        assert_eq!(call.args[1], format!("{SITE_URL}/auth/reset-password"));
    }

    #[tokio::test]
    async fn reset_email_surfaces_outages_and_rate_limits() {
        let (mock, _, service) = setup();
        mock.on(
            "reset_password_for_email",
            Reply::Fail(ProviderError::Transport("timeout".into())),
        )
        .on(
            "reset_password_for_email",
            Reply::Fail(ProviderError::api(429, None, "Too many requests")),
        );

        let outage = service.send_password_reset_email("a@movies.example").await;
        let limited = service.send_password_reset_email("a@movies.example").await;
        assert!(matches!(outage, Err(AuthError::Unexpected { .. })));
        assert_eq!(limited, Err(AuthError::RateLimited));
    }

    #[tokio::test]
    async fn reset_email_rejects_malformed_address_locally() {
        let (mock, _, service) = setup();
        let err = service.send_password_reset_email("not-an-email").await.unwrap_err();
        assert_eq!(err, AuthError::Validation(ValidationError::InvalidEmail));
        assert_eq!(mock.total_calls(), 0);
    }

    #[tokio::test]
    async fn same_password_gets_its_own_message() {
        let (mock, _, service) = setup();
        mock.on("update_password", Reply::Fail(same_password()));
        let session = session_for(&user("fan@movies.example"), Duration::hours(1));

        let err = service.update_password(&session, STRONG, None).await.unwrap_err();

        assert_eq!(err, AuthError::SamePassword);
        assert_eq!(
            err.to_string(),
            "New password must be different from your current password"
        );
        assert_eq!(mock.calls("reauthenticate"), 0);
    }

    #[tokio::test]
    async fn reauth_rejection_depends_on_nonce_presence() {
        let (mock, _, service) = setup();
        mock.on("update_password", Reply::Fail(reauth_needed()))
            .on("update_password", Reply::Fail(reauth_needed()));
        let session = session_for(&user("fan@movies.example"), Duration::hours(1));

        let without = service.update_password(&session, STRONG, None).await;
        let with = service.update_password(&session, STRONG, Some(" 123456 ")).await;

        assert_eq!(without, Err(AuthError::ReauthenticationRequired));
        assert_eq!(with, Err(AuthError::InvalidNonce));
        assert_eq!(mock.last_call("update_password").unwrap().args[2], "123456");
    }

    #[tokio::test]
    async fn empty_nonce_is_a_validation_error() {
        let (mock, _, service) = setup();
        let session = session_for(&user("fan@movies.example"), Duration::hours(1));
        let err = service.update_password(&session, STRONG, Some("  ")).await.unwrap_err();
        assert_eq!(err, AuthError::Validation(ValidationError::NonceRequired));
        assert_eq!(mock.total_calls(), 0);
    }

    #[tokio::test]
    async fn password_update_emits_user_updated() {
        let (mock, _, service) = setup();
        let viewer = user("fan@movies.example");
        mock.on("update_password", Reply::User(viewer.clone()));
        let (events, _sub) = record_events(&service);
        let session = session_for(&viewer, Duration::hours(1));

        let updated = service.update_password(&session, STRONG, None).await.unwrap();
        assert_eq!(updated, viewer);
        assert_eq!(*events.lock().unwrap(), vec![AuthEventKind::UserUpdated]);
    }

    #[tokio::test]
    async fn load_session_trusts_fresh_access_token() {
        let (mock, _, service) = setup();
        let viewer = user("fan@movies.example");
        let session = session_for(&viewer, Duration::hours(1));

        let loaded = service.load_session(session.tokens()).await.unwrap();

        assert!(!loaded.refreshed);
        assert_eq!(loaded.session.user.id, viewer.id);
        assert_eq!(loaded.session.access_token, session.access_token);
        assert_eq!(mock.total_calls(), 0);
    }

    #[tokio::test]
    async fn load_session_refreshes_near_expiry() {
        let (mock, _, service) = setup();
        let viewer = user("fan@movies.example");
        let stale = session_for(&viewer, Duration::seconds(30));
        let fresh = session_for(&viewer, Duration::hours(1));
        mock.on("refresh_session", Reply::Session(fresh.clone()));
        let (events, _sub) = record_events(&service);

        let loaded = service.load_session(stale.tokens()).await.unwrap();

        assert!(loaded.refreshed);
        assert_eq!(loaded.session, fresh);
        assert_eq!(mock.last_call("refresh_session").unwrap().args[0], stale.refresh_token);
        assert_eq!(*events.lock().unwrap(), vec![AuthEventKind::TokenRefreshed]);
    }

    #[tokio::test]
    async fn load_session_with_garbage_token_and_dead_refresh_expires() {
        let (mock, _, service) = setup();
        mock.on(
            "refresh_session",
            Reply::Fail(ProviderError::api(400, Some("refresh_token_not_found"), "Invalid Refresh Token")),
        );
        let pair = TokenPair {
            access_token: "garbage".into(),
            refresh_token: "dead".into(),
        };

        let err = service.load_session(pair).await.unwrap_err();
        assert_eq!(err, AuthError::SessionExpired);
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn signed_out_token_is_revoked() {
        let (mock, store, service) = setup();
        let session = session_for(&user("fan@movies.example"), Duration::hours(1));

        service.sign_out(&session).await.unwrap();

        assert_eq!(store.blacklist_len(), 1);
        assert_eq!(mock.calls("sign_out"), 1);
        let err = service.load_session(session.tokens()).await.unwrap_err();
        assert_eq!(err, AuthError::SessionRevoked);
        assert_eq!(mock.calls("refresh_session"), 0);
    }

    #[tokio::test]
    async fn sign_out_tolerates_provider_rejection_but_not_outage() {
        let (mock, _, service) = setup();
        mock.on("sign_out", Reply::Fail(ProviderError::api(401, None, "session not found")))
            .on("sign_out", Reply::Fail(ProviderError::Transport("down".into())));
        let (events, _sub) = record_events(&service);
        let session = session_for(&user("fan@movies.example"), Duration::hours(1));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _ids = service.on_auth_state_change(move |event| sink.lock().unwrap().push(event.user_id));

        assert!(service.sign_out(&session).await.is_ok());
        assert!(service.sign_out(&session).await.is_err());
        assert_eq!(
            *events.lock().unwrap(),
            vec![AuthEventKind::SignedOut, AuthEventKind::SignedOut]
        );
        assert_eq!(*seen.lock().unwrap(), vec![Some(session.user.id); 2]);
    }

    #[tokio::test]
    async fn reset_verification_with_token_pair() {
        let (_, _, service) = setup();
        let session = session_for(&user("fan@movies.example"), Duration::hours(1));

        let verdict = service
            .verify_password_reset_token(Some(ResetTokenMaterial::Tokens(session.tokens())), None)
            .await;
        assert!(verdict.valid);
        assert_eq!(verdict.session.map(|s| s.user.id), Some(session.user.id));
    }

    #[tokio::test]
    async fn reset_verification_without_material_is_invalid() {
        let (mock, _, service) = setup();
        let verdict = service.verify_password_reset_token(None, None).await;
        assert!(!verdict.valid);
        assert_eq!(verdict.error.as_deref(), Some(INVALID_RESET_LINK));
        assert_eq!(mock.total_calls(), 0);
    }

    #[tokio::test]
    async fn reset_verification_with_rejected_code_is_invalid() {
        let (mock, _, service) = setup();
        mock.on(
            "exchange_code_for_session",
            Reply::Fail(ProviderError::api(403, Some("flow_state_expired"), "Flow state expired")),
        );
        let verdict = service
            .verify_password_reset_token(Some(ResetTokenMaterial::Code("c0de".into())), Some("v"))
            .await;
        assert!(!verdict.valid);
        assert_eq!(verdict.error.as_deref(), Some(INVALID_RESET_LINK));
        assert_eq!(mock.last_call("exchange_code_for_session").unwrap().args, vec!["c0de", "v"]);
    }

    #[tokio::test]
    async fn oauth_redirect_uses_fixed_callback_and_pkce() {
        let (_, _, service) = setup();
        let redirect = service
            .sign_in_with_oauth(OAuthProvider::Github, Some("/watchlist"))
            .unwrap();

        let pairs: std::collections::HashMap<_, _> = redirect.url.query_pairs().into_owned().collect();
        assert_eq!(pairs["provider"], "github");
        assert_eq!(pairs["redirect_to"], format!("{SITE_URL}/auth/callback?next=%2Fwatchlist"));
        assert_eq!(pairs["code_challenge"], generate_code_challenge(&redirect.code_verifier));
    }

    #[tokio::test]
    async fn oauth_redirect_drops_offsite_next() {
        let (_, _, service) = setup();
        let redirect = service
            .sign_in_with_oauth(OAuthProvider::Google, Some("//evil.example"))
            .unwrap();
        let pairs: std::collections::HashMap<_, _> = redirect.url.query_pairs().into_owned().collect();
        assert_eq!(pairs["redirect_to"], format!("{SITE_URL}/auth/callback"));
    }

    #[tokio::test]
    async fn unsubscribed_listener_is_not_called() {
        let (mock, _, service) = setup();
        mock.on(
            "sign_in_with_password",
            Reply::Session(session_for(&user("fan@movies.example"), Duration::hours(1))),
        );
        let (events, sub) = record_events(&service);
        sub.unsubscribe();
        assert_eq!(service.events().subscriber_count(), 0);

        service
            .sign_in_with_password("fan@movies.example", "pw")
            .await
            .unwrap();
        assert!(events.lock().unwrap().is_empty());
    }
}
