use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use url::Url;
use uuid::Uuid;

use super::{
    IdentityProvider, OAuthProvider, ProviderError, Session, SignUpOutcome, User, UserMetadata,
};

#[derive(Debug, Clone)]
pub enum Reply {
    Session(Session),
    User(User),
    SignUp(SignUpOutcome),
    Done,
    Fail(ProviderError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: &'static str,
    pub args: Vec<String>,
}

/// Replies are queued per operation and consumed in order. Operations without
/// a queued reply succeed when they return nothing and fail otherwise.
#[derive(Default)]
pub struct MockProvider {
    replies: Mutex<HashMap<&'static str, VecDeque<Reply>>>,
    calls: Mutex<Vec<Call>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, op: &'static str, reply: Reply) -> &Self {
        self.replies
            .lock()
            .unwrap()
            .entry(op)
            .or_default()
            .push_back(reply);
        self
    }

    pub fn calls(&self, op: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.op == op)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_call(&self, op: &str) -> Option<Call> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|c| c.op == op)
            .cloned()
    }

    fn record(&self, op: &'static str, args: &[&str]) -> Option<Reply> {
        self.calls.lock().unwrap().push(Call {
            op,
            args: args.iter().map(|a| (*a).to_string()).collect(),
        });
        self.replies
            .lock()
            .unwrap()
            .get_mut(op)
            .and_then(VecDeque::pop_front)
    }

    fn unscripted(op: &str) -> ProviderError {
        ProviderError::api(500, Some("unscripted"), format!("no reply scripted for {op}"))
    }

    fn expect_session(op: &'static str, reply: Option<Reply>) -> Result<Session, ProviderError> {
        match reply {
            Some(Reply::Session(session)) => Ok(session),
            Some(Reply::Fail(err)) => Err(err),
            _ => Err(Self::unscripted(op)),
        }
    }

    fn expect_done(reply: Option<Reply>) -> Result<(), ProviderError> {
        match reply {
            Some(Reply::Fail(err)) => Err(err),
            _ => Ok(()),
        }
    }
}

pub fn user(email: &str) -> User {
    User {
        id: Uuid::new_v4(),
        email: Some(email.to_string()),
        user_metadata: UserMetadata {
            full_name: Some("Test Viewer".to_string()),
            avatar_url: None,
        },
    }
}

pub fn reauth_needed() -> ProviderError {
    ProviderError::api(
        401,
        Some("reauthentication_needed"),
        "Password update requires reauthentication",
    )
}

pub fn same_password() -> ProviderError {
    ProviderError::api(
        422,
        Some("same_password"),
        "New password should be different from the old password.",
    )
}

#[async_trait]
impl IdentityProvider for MockProvider {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, ProviderError> {
        let reply = self.record("sign_in_with_password", &[email, password]);
        Self::expect_session("sign_in_with_password", reply)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &UserMetadata,
        email_redirect_to: &str,
    ) -> Result<SignUpOutcome, ProviderError> {
        let full_name = metadata.full_name.clone().unwrap_or_default();
        match self.record("sign_up", &[email, password, &full_name, email_redirect_to]) {
            Some(Reply::SignUp(outcome)) => Ok(outcome),
            Some(Reply::Fail(err)) => Err(err),
            _ => Err(Self::unscripted("sign_up")),
        }
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), ProviderError> {
        Self::expect_done(self.record("sign_out", &[access_token]))
    }

    async fn reset_password_for_email(
        &self,
        email: &str,
        redirect_to: &str,
    ) -> Result<(), ProviderError> {
        Self::expect_done(self.record("reset_password_for_email", &[email, redirect_to]))
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Session, ProviderError> {
        let reply = self.record("refresh_session", &[refresh_token]);
        Self::expect_session("refresh_session", reply)
    }

    async fn exchange_code_for_session(
        &self,
        auth_code: &str,
        code_verifier: Option<&str>,
    ) -> Result<Session, ProviderError> {
        let reply = self.record(
            "exchange_code_for_session",
            &[auth_code, code_verifier.unwrap_or_default()],
        );
        Self::expect_session("exchange_code_for_session", reply)
    }

    async fn update_password(
        &self,
        access_token: &str,
        password: &str,
        nonce: Option<&str>,
    ) -> Result<User, ProviderError> {
        match self.record(
            "update_password",
            &[access_token, password, nonce.unwrap_or_default()],
        ) {
            Some(Reply::User(user)) => Ok(user),
            Some(Reply::Fail(err)) => Err(err),
            _ => Err(Self::unscripted("update_password")),
        }
    }

    async fn reauthenticate(&self, access_token: &str) -> Result<(), ProviderError> {
        Self::expect_done(self.record("reauthenticate", &[access_token]))
    }

    fn authorize_url(
        &self,
        provider: OAuthProvider,
        redirect_to: &str,
        code_challenge: &str,
    ) -> Url {
        let mut url: Url = "https://idp.test/auth/v1/authorize".parse().unwrap();
        url.query_pairs_mut()
            .append_pair("provider", provider.as_str())
            .append_pair("redirect_to", redirect_to)
            .append_pair("code_challenge", code_challenge);
        url
    }
}
