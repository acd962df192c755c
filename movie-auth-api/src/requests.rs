use serde::{Deserialize, Serialize};

// -------- REQUEST DTOs --------
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoginRequest {
    pub email: String,
    pub password: String, // Plain text, forwarded to the identity provider
    /// Page to land on after login, usually the `redirectTo` the middleware added.
    #[serde(default)]
    pub redirect_to: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub confirm_password: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

/// The reset link as the browser saw it, fragment included.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct VerifyResetLinkRequest {
    pub url: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UpdatePasswordRequest {
    pub password: String,
    pub confirm_password: String,
    /// Reauthentication code from the email, once the provider asked for one.
    #[serde(default)]
    pub nonce: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TokenRefreshRequest {
    pub refresh_token: String,
}
