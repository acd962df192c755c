use crate::auth::password::ValidationError;
use crate::provider::ProviderError;

/// Uniform failure shape of the auth service. `Display` is the user-facing
/// message; internal detail, when any, is only ever logged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Please confirm your email address before signing in")]
    EmailNotConfirmed,
    #[error("An account with this email already exists")]
    UserAlreadyRegistered,
    #[error("New password must be different from your current password")]
    SamePassword,
    #[error("For your security, enter the verification code we emailed you")]
    ReauthenticationRequired,
    #[error("Invalid or expired verification code")]
    InvalidNonce,
    #[error("Your session has expired. Please sign in again")]
    SessionExpired,
    #[error("Your session has been revoked. Please sign in again")]
    SessionRevoked,
    #[error("{0}")]
    InvalidLink(String),
    #[error("Too many requests. Please wait a moment and try again")]
    RateLimited,
    #[error("{0}")]
    Rejected(String),
    #[error("An unexpected error occurred. Please try again")]
    Unexpected { detail: String },
}

pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    pub fn unexpected(detail: impl Into<String>) -> Self {
        Self::Unexpected {
            detail: detail.into(),
        }
    }

    /// Stable machine-readable code, shared with the HTTP error body.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::EmailNotConfirmed => "EMAIL_NOT_CONFIRMED",
            Self::UserAlreadyRegistered => "USER_EXISTS",
            Self::SamePassword => "SAME_PASSWORD",
            Self::ReauthenticationRequired => "REAUTHENTICATION_REQUIRED",
            Self::InvalidNonce => "INVALID_NONCE",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::SessionRevoked => "SESSION_REVOKED",
            Self::InvalidLink(_) => "INVALID_LINK",
            Self::RateLimited => "RATE_LIMITED",
            Self::Rejected(_) => "PROVIDER_REJECTED",
            Self::Unexpected { .. } => "UNEXPECTED_ERROR",
        }
    }

    /// Token or session problems (as opposed to the provider being unreachable).
    pub fn is_session_rejection(&self) -> bool {
        matches!(self, Self::SessionExpired | Self::SessionRevoked)
    }

    /// The provider could not be reached or failed on its side; the
    /// credentials involved may still be good.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unexpected { .. } | Self::RateLimited)
    }

    /// Maps a provider failure onto the user-facing taxonomy.
    ///
    /// Same-password is checked before reauthentication: the provider may
    /// mention both, and the user must see the actionable one.
    pub fn from_provider(err: &ProviderError) -> Self {
        let ProviderError::Api {
            status,
            code,
            message,
        } = err
        else {
            tracing::error!(error = %err, "identity provider call failed");
            return Self::unexpected(err.to_string());
        };

        let code = code.as_deref().unwrap_or_default().to_ascii_lowercase();
        let msg = message.to_ascii_lowercase();

        if code == "same_password"
            || msg.contains("different from the old password")
            || msg.contains("same password")
        {
            Self::SamePassword
        } else if code.starts_with("reauthentication") || msg.contains("reauthentication") {
            Self::ReauthenticationRequired
        } else if code == "invalid_credentials" || msg.contains("invalid login credentials") {
            Self::InvalidCredentials
        } else if code == "email_not_confirmed" || msg.contains("email not confirmed") {
            Self::EmailNotConfirmed
        } else if matches!(code.as_str(), "user_already_exists" | "email_exists")
            || msg.contains("already registered")
        {
            Self::UserAlreadyRegistered
        } else if *status == 429 || code.starts_with("over_") {
            Self::RateLimited
        } else if matches!(
            code.as_str(),
            "refresh_token_not_found"
                | "refresh_token_already_used"
                | "session_not_found"
                | "session_expired"
                | "bad_jwt"
        ) || matches!(*status, 401 | 403)
        {
            Self::SessionExpired
        } else if *status >= 500 {
            tracing::error!(status, code, "identity provider server error");
            Self::unexpected(message.clone())
        } else {
            Self::Rejected(message.clone())
        }
    }
}

impl From<ProviderError> for AuthError {
    fn from(err: ProviderError) -> Self {
        Self::from_provider(&err)
    }
}
