use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProfileResponse {
    pub id: Uuid,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoginResponse {
    pub user: UserResponse,
    /// Unix timestamp (seconds) at which the access token expires.
    pub expires_at: i64,
    pub redirect_to: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RegisterResponse {
    pub user: Option<UserResponse>,
    /// `false` when the account still has to be confirmed by email.
    pub session_created: bool,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AuthStatusResponse {
    pub authenticated: bool,
    pub user_id: Option<Uuid>,
    pub email: Option<String>,
    pub role: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SessionInfoResponse {
    pub authenticated: bool,
    pub user: Option<UserResponse>,
    pub expires_at: Option<i64>,
}

/// Application token pair minted from a provider session.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: TokenUser,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TokenUser {
    pub id: Uuid,
    pub email: Option<String>,
    pub role: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Provider,
    App,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct TokenValidationResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<TokenUser>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_kind: Option<TokenKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a password update attempt, mirroring the reset flow's states.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PasswordUpdateStatus {
    Success,
    NeedsReauth,
    Failed,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PasswordUpdateResponse {
    pub status: PasswordUpdateStatus,
    pub message: String,
    /// Inline error for the nonce field (wrong or expired code).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce_error: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ResetTokenResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CleanupResponse {
    pub message: String,
    pub removed: usize,
}

/// Current user with their application profile, once the trigger created it.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MeResponse {
    pub user: UserResponse,
    pub profile: Option<ProfileResponse>,
}
