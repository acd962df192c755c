use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::provider::{User, UserMetadata};

pub const TOKEN_TYPE_ACCESS: &str = "access";
pub const TOKEN_TYPE_REFRESH: &str = "refresh";
pub const DEFAULT_ROLE: &str = "authenticated";

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Token generation failed: {0}")]
    GenerationFailed(jsonwebtoken::errors::Error),
    #[error("Token verification failed: {0}")]
    VerificationFailed(jsonwebtoken::errors::Error),
    #[error("Unexpected token type, expected {expected}")]
    WrongTokenType { expected: &'static str },
}

impl JwtError {
    pub fn is_expired(&self) -> bool {
        matches!(
            self,
            Self::VerificationFailed(e)
                if matches!(e.kind(), jsonwebtoken::errors::ErrorKind::ExpiredSignature)
        )
    }
}

/// Claims shared by provider-issued and application-issued tokens.
/// Provider tokens carry `session_id`; application tokens carry `jti`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: i64,
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

impl Claims {
    pub fn for_user(user: &User, expires_in: Duration) -> Self {
        let now = Utc::now();
        Self {
            sub: user.id,
            exp: (now + expires_in).timestamp(),
            iat: now.timestamp(),
            email: user.email.clone(),
            role: None,
            iss: None,
            session_id: None,
            jti: None,
            token_type: None,
            user_metadata: user.user_metadata.clone(),
        }
    }

    /// Identifier used for blacklisting.
    pub fn token_id(&self) -> Option<&str> {
        self.jti.as_deref().or(self.session_id.as_deref())
    }

    pub fn role(&self) -> &str {
        self.role.as_deref().unwrap_or(DEFAULT_ROLE)
    }

    pub fn user(&self) -> User {
        User {
            id: self.sub,
            email: self.email.clone(),
            user_metadata: self.user_metadata.clone(),
        }
    }
}

#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_expiration_minutes: i64,
    refresh_expiration_days: i64,
    leeway_secs: u64,
    issuer: Option<String>,
}

impl JwtManager {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            access_expiration_minutes: 15,
            refresh_expiration_days: 7,
            leeway_secs: 10,
            issuer: None,
        }
    }

    #[must_use]
    pub fn with_expiration(mut self, access_minutes: i64, refresh_days: i64) -> Self {
        self.access_expiration_minutes = access_minutes;
        self.refresh_expiration_days = refresh_days;
        self
    }

    #[must_use]
    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.leeway_secs = leeway_secs;
        self
    }

    /// Tokens generated carry this issuer and tokens verified must match it.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn access_expiration_secs(&self) -> i64 {
        self.access_expiration_minutes * 60
    }

    /// Access token with a fresh `jti`, so it can be revoked on its own.
    pub fn generate_access_token(&self, user: &User, role: &str) -> Result<String, JwtError> {
        let mut claims = Claims::for_user(user, Duration::minutes(self.access_expiration_minutes));
        claims.role = Some(role.to_string());
        claims.jti = Some(Uuid::new_v4().to_string());
        claims.token_type = Some(TOKEN_TYPE_ACCESS.to_string());
        self.generate_token(claims)
    }

    pub fn generate_refresh_token(&self, user: &User, role: &str) -> Result<String, JwtError> {
        let mut claims = Claims::for_user(user, Duration::days(self.refresh_expiration_days));
        claims.role = Some(role.to_string());
        claims.jti = Some(Uuid::new_v4().to_string());
        claims.token_type = Some(TOKEN_TYPE_REFRESH.to_string());
        claims.user_metadata = UserMetadata::default();
        self.generate_token(claims)
    }

    pub fn generate_token(&self, mut claims: Claims) -> Result<String, JwtError> {
        if claims.iss.is_none() {
            claims.iss.clone_from(&self.issuer);
        }
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(JwtError::GenerationFailed)
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = self.leeway_secs;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp", "sub"]);
        if let Some(issuer) = &self.issuer {
            validation.set_issuer(&[issuer]);
        }

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(JwtError::VerificationFailed)
    }

    /// Provider tokens carry no `token_type`; application ones must say "access".
    pub fn verify_access_token(&self, token: &str) -> Result<Claims, JwtError> {
        let claims = self.verify_token(token)?;
        match claims.token_type.as_deref() {
            None | Some(TOKEN_TYPE_ACCESS) => Ok(claims),
            Some(_) => Err(JwtError::WrongTokenType {
                expected: TOKEN_TYPE_ACCESS,
            }),
        }
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<Claims, JwtError> {
        let claims = self.verify_token(token)?;
        if claims.token_type.as_deref() == Some(TOKEN_TYPE_REFRESH) {
            Ok(claims)
        } else {
            Err(JwtError::WrongTokenType {
                expected: TOKEN_TYPE_REFRESH,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_jwt_manager() -> JwtManager {
        JwtManager::new(b"my_secret_key_for_tests").with_issuer("movie-app")
    }

    fn viewer() -> User {
        User {
            id: Uuid::new_v4(),
            email: Some("viewer@movies.example".into()),
            user_metadata: UserMetadata {
                full_name: Some("Viewer".into()),
                avatar_url: None,
            },
        }
    }

    #[test]
    fn access_token_round_trips_claims() {
        let jwt = make_jwt_manager();
        let user = viewer();
        let token = jwt.generate_access_token(&user, DEFAULT_ROLE).unwrap();

        let claims = jwt.verify_access_token(&token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert_eq!(claims.email, user.email);
        assert_eq!(claims.iss.as_deref(), Some("movie-app"));
        assert!(claims.jti.is_some());
        assert_eq!(claims.token_id(), claims.jti.as_deref());
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn refresh_token_is_not_an_access_token() {
        let jwt = make_jwt_manager();
        let refresh = jwt.generate_refresh_token(&viewer(), DEFAULT_ROLE).unwrap();

        assert!(jwt.verify_refresh_token(&refresh).is_ok());
        assert!(matches!(
            jwt.verify_access_token(&refresh),
            Err(JwtError::WrongTokenType { .. })
        ));
    }

    #[test]
    fn provider_style_token_without_type_is_accepted() {
        let jwt = JwtManager::new(b"provider-secret");
        let mut claims = Claims::for_user(&viewer(), Duration::hours(1));
        claims.session_id = Some("sess-1".into());
        let token = jwt.generate_token(claims).unwrap();

        let verified = jwt.verify_access_token(&token).unwrap();
        assert_eq!(verified.token_id(), Some("sess-1"));
        assert_eq!(verified.role(), DEFAULT_ROLE);
    }

    #[test]
    fn expired_token_is_reported_as_expired() {
        let jwt = make_jwt_manager().with_leeway(0);
        let claims = Claims::for_user(&viewer(), Duration::minutes(-5));
        let token = jwt.generate_token(claims).unwrap();

        let err = jwt.verify_token(&token).unwrap_err();
        assert!(err.is_expired());
    }

    #[test]
    fn leeway_tolerates_small_clock_skew() {
        let jwt = make_jwt_manager().with_leeway(30);
        let claims = Claims::for_user(&viewer(), Duration::seconds(-5));
        let token = jwt.generate_token(claims).unwrap();
        assert!(jwt.verify_token(&token).is_ok());
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let ours = make_jwt_manager();
        let theirs = JwtManager::new(b"another-secret").with_issuer("movie-app");
        let token = theirs.generate_access_token(&viewer(), DEFAULT_ROLE).unwrap();

        let err = ours.verify_token(&token).unwrap_err();
        assert!(matches!(err, JwtError::VerificationFailed(_)));
        assert!(!err.is_expired());
    }

    #[test]
    fn issuer_mismatch_is_rejected() {
        let app = make_jwt_manager();
        let foreign = JwtManager::new(b"my_secret_key_for_tests").with_issuer("someone-else");
        let token = foreign.generate_access_token(&viewer(), DEFAULT_ROLE).unwrap();
        assert!(app.verify_token(&token).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        let jwt = make_jwt_manager();
        assert!(matches!(
            jwt.verify_token("invalid.token.here"),
            Err(JwtError::VerificationFailed(_))
        ));
    }
}
