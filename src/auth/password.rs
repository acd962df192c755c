pub const MIN_PASSWORD_LENGTH: usize = 8;

/// One rule of the password policy, checked in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordRule {
    MinLength,
    Lowercase,
    Uppercase,
    Digit,
    Symbol,
}

impl PasswordRule {
    const ALL: [Self; 5] = [
        Self::MinLength,
        Self::Lowercase,
        Self::Uppercase,
        Self::Digit,
        Self::Symbol,
    ];

    pub fn message(self) -> &'static str {
        match self {
            Self::MinLength => "Password must be at least 8 characters",
            Self::Lowercase => "Password must contain at least one lowercase letter",
            Self::Uppercase => "Password must contain at least one uppercase letter",
            Self::Digit => "Password must contain at least one number",
            Self::Symbol => "Password must contain at least one special character",
        }
    }

    fn is_met_by(self, password: &str) -> bool {
        match self {
            Self::MinLength => password.chars().count() >= MIN_PASSWORD_LENGTH,
            Self::Lowercase => password.chars().any(char::is_lowercase),
            Self::Uppercase => password.chars().any(char::is_uppercase),
            Self::Digit => password.chars().any(|c| c.is_ascii_digit()),
            Self::Symbol => password
                .chars()
                .any(|c| !c.is_alphanumeric() && !c.is_whitespace()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Email is required")]
    EmailRequired,
    #[error("Please enter a valid email address")]
    InvalidEmail,
    #[error("Password is required")]
    PasswordRequired,
    #[error("{}", .0.message())]
    WeakPassword(PasswordRule),
    #[error("Passwords do not match")]
    PasswordMismatch,
    #[error("Verification code is required")]
    NonceRequired,
}

impl ValidationError {
    /// Form field the error belongs to, for inline display.
    pub fn field(&self) -> &'static str {
        match self {
            Self::EmailRequired | Self::InvalidEmail => "email",
            Self::PasswordRequired | Self::WeakPassword(_) => "password",
            Self::PasswordMismatch => "confirm_password",
            Self::NonceRequired => "nonce",
        }
    }
}

/// Returns the first rule the password does not satisfy.
pub fn check_password_strength(password: &str) -> Result<(), PasswordRule> {
    match PasswordRule::ALL
        .into_iter()
        .find(|rule| !rule.is_met_by(password))
    {
        Some(rule) => Err(rule),
        None => Ok(()),
    }
}

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ValidationError::EmailRequired);
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(ValidationError::InvalidEmail);
    };
    let domain_ok = domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains('@');
    if local.is_empty() || !domain_ok || email.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidEmail);
    }

    Ok(())
}

/// Sign-in only needs something to send; strength is not re-checked there.
pub fn validate_credentials(email: &str, password: &str) -> Result<(), ValidationError> {
    validate_email(email)?;
    if password.is_empty() {
        return Err(ValidationError::PasswordRequired);
    }
    Ok(())
}

pub fn validate_new_password(password: &str) -> Result<(), ValidationError> {
    check_password_strength(password).map_err(ValidationError::WeakPassword)
}

/// Strength first, then confirmation, the order a form shows them in.
pub fn validate_password_change(password: &str, confirm: &str) -> Result<(), ValidationError> {
    validate_new_password(password)?;
    if password != confirm {
        return Err(ValidationError::PasswordMismatch);
    }
    Ok(())
}

pub fn validate_nonce(nonce: &str) -> Result<&str, ValidationError> {
    let nonce = nonce.trim();
    if nonce.is_empty() {
        return Err(ValidationError::NonceRequired);
    }
    Ok(nonce)
}
