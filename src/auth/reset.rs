use std::fmt;
use std::sync::Arc;

use url::Url;
use url::form_urlencoded;

use crate::auth::error::AuthError;
use crate::auth::password::{ValidationError, validate_email, validate_nonce, validate_password_change};
use crate::auth::services::AuthService;
use crate::provider::{Session, TokenPair};

/// Token material carried by a reset (or confirmation) link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetTokenMaterial {
    Code(String),
    Tokens(TokenPair),
    /// The provider redirected with an error instead of a token.
    ProviderError(String),
}

/// Looks in the query string, then in the fragment. Provider errors win
/// over tokens, and a token pair wins over a code.
pub fn extract_reset_material(url: &Url) -> Option<ResetTokenMaterial> {
    let mut pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    if let Some(fragment) = url.fragment() {
        pairs.extend(form_urlencoded::parse(fragment.as_bytes()).into_owned());
    }
    let find = |key: &str| {
        pairs
            .iter()
            .find(|(k, v)| k == key && !v.is_empty())
            .map(|(_, v)| v.clone())
    };

    if let Some(description) = find("error_description").or_else(|| find("error")) {
        return Some(ResetTokenMaterial::ProviderError(description));
    }
    if let (Some(access_token), Some(refresh_token)) = (find("access_token"), find("refresh_token")) {
        return Some(ResetTokenMaterial::Tokens(TokenPair {
            access_token,
            refresh_token,
        }));
    }
    find("code").map(ResetTokenMaterial::Code)
}

#[derive(Clone, PartialEq, Eq)]
pub struct PendingPassword(String);

impl PendingPassword {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PendingPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PendingPassword(<redacted>)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetState {
    Idle,
    EmailSent {
        email: String,
    },
    TokenVerifying,
    /// `error` is the inline message of a rejected attempt, if any.
    TokenValid {
        session: Session,
        error: Option<String>,
    },
    TokenInvalid {
        message: String,
    },
    Submitting {
        session: Session,
        password: PendingPassword,
    },
    NeedsReauth {
        session: Session,
        password: PendingPassword,
        error: Option<String>,
    },
    Resubmitting {
        session: Session,
        password: PendingPassword,
    },
    Success,
    Failed {
        message: String,
    },
}

impl ResetState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::EmailSent { .. } => "email_sent",
            Self::TokenVerifying => "token_verifying",
            Self::TokenValid { .. } => "token_valid",
            Self::TokenInvalid { .. } => "token_invalid",
            Self::Submitting { .. } => "submitting",
            Self::NeedsReauth { .. } => "needs_reauth",
            Self::Resubmitting { .. } => "resubmitting",
            Self::Success => "success",
            Self::Failed { .. } => "failed",
        }
    }

    /// Inline error to show next to the form, if any.
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::TokenValid { error, .. } | Self::NeedsReauth { error, .. } => error.as_deref(),
            Self::TokenInvalid { message } | Self::Failed { message } => Some(message),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    #[error("cannot {action} while {from}")]
    InvalidTransition {
        from: &'static str,
        action: &'static str,
    },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Auth(AuthError),
}

/// ```text
/// Idle -> EmailSent -> TokenVerifying -> TokenValid | TokenInvalid
/// TokenValid -> Submitting -> Success | NeedsReauth | TokenValid (retry) | Failed
/// NeedsReauth -> Resubmitting -> Success | NeedsReauth (bad nonce) | Failed
/// ```
///
/// Actions from any other state fail with [`FlowError::InvalidTransition`]
/// before any provider call. A future dropped mid-call leaves the flow in
/// `Submitting`/`Resubmitting`.
pub struct PasswordResetFlow {
    service: Arc<AuthService>,
    state: ResetState,
}

impl PasswordResetFlow {
    pub fn new(service: Arc<AuthService>) -> Self {
        Self {
            service,
            state: ResetState::Idle,
        }
    }

    /// Resumes a flow whose reset link was already verified.
    pub fn with_session(service: Arc<AuthService>, session: Session) -> Self {
        Self {
            service,
            state: ResetState::TokenValid {
                session,
                error: None,
            },
        }
    }

    /// Resumes a flow waiting for the user's reauthentication nonce.
    pub fn awaiting_nonce(service: Arc<AuthService>, session: Session, password: &str) -> Self {
        Self {
            service,
            state: ResetState::NeedsReauth {
                session,
                password: PendingPassword(password.to_string()),
                error: None,
            },
        }
    }

    pub fn state(&self) -> &ResetState {
        &self.state
    }

    fn reject(&self, action: &'static str) -> FlowError {
        FlowError::InvalidTransition {
            from: self.state.name(),
            action,
        }
    }

    fn transition(&mut self, next: ResetState) -> &ResetState {
        tracing::debug!(from = self.state.name(), to = next.name(), "password reset transition");
        self.state = next;
        &self.state
    }

    /// Moves to `EmailSent` once the service answers, whether or not the
    /// address belongs to an account.
    pub async fn request_email(&mut self, email: &str) -> Result<&ResetState, FlowError> {
        if !matches!(self.state, ResetState::Idle | ResetState::EmailSent { .. }) {
            return Err(self.reject("request a reset email"));
        }
        validate_email(email)?;

        self.service
            .send_password_reset_email(email)
            .await
            .map_err(FlowError::Auth)?;

        Ok(self.transition(ResetState::EmailSent {
            email: email.trim().to_string(),
        }))
    }

    pub async fn verify_callback(
        &mut self,
        callback: &Url,
        code_verifier: Option<&str>,
    ) -> Result<&ResetState, FlowError> {
        if !matches!(
            self.state,
            ResetState::Idle | ResetState::EmailSent { .. } | ResetState::TokenInvalid { .. }
        ) {
            return Err(self.reject("verify a reset link"));
        }
        self.transition(ResetState::TokenVerifying);

        let verdict = self
            .service
            .verify_password_reset_token(extract_reset_material(callback), code_verifier)
            .await;

        let next = match verdict.session {
            Some(session) if verdict.valid => ResetState::TokenValid {
                session,
                error: None,
            },
            _ => ResetState::TokenInvalid {
                message: verdict
                    .error
                    .unwrap_or_else(|| crate::auth::services::INVALID_RESET_LINK.to_string()),
            },
        };
        Ok(self.transition(next))
    }

    /// A reauthentication demand dispatches exactly one nonce email and
    /// waits for the code; it is not a failure.
    pub async fn submit_password(
        &mut self,
        password: &str,
        confirm: &str,
    ) -> Result<&ResetState, FlowError> {
        let ResetState::TokenValid { session, .. } = &self.state else {
            return Err(self.reject("submit a new password"));
        };
        let session = session.clone();
        if let Err(e) = validate_password_change(password, confirm) {
            self.state = ResetState::TokenValid {
                session,
                error: Some(e.to_string()),
            };
            return Err(e.into());
        }

        let password = PendingPassword(password.to_string());
        self.transition(ResetState::Submitting {
            session: session.clone(),
            password: password.clone(),
        });

        let next = match self
            .service
            .update_password(&session, password.expose(), None)
            .await
        {
            Ok(_) => ResetState::Success,
            Err(AuthError::ReauthenticationRequired) => {
                let error = self
                    .service
                    .reauthenticate(&session)
                    .await
                    .err()
                    .map(|e| e.to_string());
                ResetState::NeedsReauth {
                    session,
                    password,
                    error,
                }
            }
            Err(e) => Self::after_rejection(session, e),
        };
        Ok(self.transition(next))
    }

    /// Wrong or expired codes return to `NeedsReauth` with an inline error;
    /// no new code is sent unless [`resend_nonce`](Self::resend_nonce) is called.
    pub async fn submit_nonce(&mut self, nonce: &str) -> Result<&ResetState, FlowError> {
        let ResetState::NeedsReauth {
            session, password, ..
        } = &self.state
        else {
            return Err(self.reject("submit a verification code"));
        };
        let (session, password) = (session.clone(), password.clone());
        let nonce = match validate_nonce(nonce) {
            Ok(nonce) => nonce,
            Err(e) => {
                self.state = ResetState::NeedsReauth {
                    session,
                    password,
                    error: Some(e.to_string()),
                };
                return Err(e.into());
            }
        };

        self.transition(ResetState::Resubmitting {
            session: session.clone(),
            password: password.clone(),
        });

        let next = match self
            .service
            .update_password(&session, password.expose(), Some(nonce))
            .await
        {
            Ok(_) => ResetState::Success,
            Err(e @ (AuthError::InvalidNonce | AuthError::ReauthenticationRequired)) => {
                ResetState::NeedsReauth {
                    session,
                    password,
                    error: Some(e.to_string()),
                }
            }
            Err(e) if e.is_transient() => ResetState::NeedsReauth {
                session,
                password,
                error: Some(e.to_string()),
            },
            Err(e) => Self::after_rejection(session, e),
        };
        Ok(self.transition(next))
    }

    /// Explicit "resend code".
    pub async fn resend_nonce(&mut self) -> Result<&ResetState, FlowError> {
        let ResetState::NeedsReauth {
            session, password, ..
        } = &self.state
        else {
            return Err(self.reject("resend the verification code"));
        };
        let (session, password) = (session.clone(), password.clone());

        let error = self
            .service
            .reauthenticate(&session)
            .await
            .err()
            .map(|e| e.to_string());
        Ok(self.transition(ResetState::NeedsReauth {
            session,
            password,
            error,
        }))
    }

    /// Same-password and transient failures let the user try again with the
    /// link still valid; anything else ends the flow.
    fn after_rejection(session: Session, err: AuthError) -> ResetState {
        match err {
            e @ AuthError::SamePassword => ResetState::TokenValid {
                session,
                error: Some(e.to_string()),
            },
            e if e.is_transient() => ResetState::TokenValid {
                session,
                error: Some(e.to_string()),
            },
            e => ResetState::Failed {
                message: e.to_string(),
            },
        }
    }
}
