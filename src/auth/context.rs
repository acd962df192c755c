use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use uuid::Uuid;

use crate::auth::error::AuthResult;
use crate::auth::events::{AuthEvent, Subscription};
use crate::auth::services::AuthService;
use crate::db::models::profile::Profile;
use crate::db::store::ProfileStore;
use crate::provider::{Session, User};

pub const PROFILE_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthSnapshot {
    pub user: Option<User>,
    pub profile: Option<Profile>,
    /// A profile fetch is in flight; navigation decisions should wait.
    pub loading: bool,
}

struct Inner {
    service: Arc<AuthService>,
    profiles: Arc<dyn ProfileStore>,
    snapshot: watch::Sender<AuthSnapshot>,
    session: Mutex<Option<Session>>,
    generation: AtomicU64,
    runtime: Option<Handle>,
}

impl Inner {
    fn set_session(&self, session: Option<Session>) {
        let mut slot = self
            .session
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *slot = session;
    }

    fn current_session(&self) -> Option<Session> {
        self.session
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Replaces the user and returns the generation of the fetch to start,
    /// or `None` once signed out. Runs under the watch lock so a completing
    /// fetch cannot interleave with the bump.
    fn begin(&self, user: Option<User>) -> Option<(Uuid, u64)> {
        let mut started = None;
        self.snapshot.send_modify(|snapshot| {
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            match user {
                Some(user) => {
                    if snapshot.user.as_ref().map(|u| u.id) != Some(user.id) {
                        snapshot.profile = None;
                    }
                    started = Some((user.id, generation));
                    snapshot.user = Some(user);
                    snapshot.loading = true;
                }
                None => {
                    snapshot.user = None;
                    snapshot.profile = None;
                    snapshot.loading = false;
                }
            }
        });
        started
    }

    async fn load_profile(&self, user_id: Uuid, generation: u64) {
        let profile = match tokio::time::timeout(
            PROFILE_FETCH_TIMEOUT,
            self.profiles.find_profile(user_id),
        )
        .await
        {
            Ok(Ok(profile)) => profile,
            Ok(Err(e)) => {
                tracing::warn!(%user_id, error = %e, "profile fetch failed");
                None
            }
            Err(_) => {
                tracing::warn!(%user_id, "profile fetch timed out");
                None
            }
        };

        self.snapshot.send_if_modified(|snapshot| {
            if self.generation.load(Ordering::SeqCst) != generation {
                tracing::debug!(%user_id, generation, "stale profile fetch discarded");
                return false;
            }
            snapshot.profile = profile;
            snapshot.loading = false;
            true
        });
    }

    /// Events for any user other than the one signed in here are ignored;
    /// an anonymous context follows nobody.
    fn on_event(self: Arc<Self>, event: &AuthEvent) {
        let owner = self.current_session().map(|s| s.user.id);
        if owner.is_none() || event.user_id != owner {
            tracing::trace!(
                event = event.kind.as_str(),
                user_id = ?event.user_id,
                "auth event for another user ignored"
            );
            return;
        }
        self.apply(event.session.clone());
    }

    fn apply(self: Arc<Self>, session: Option<Session>) {
        let user = session.as_ref().map(|s| s.user.clone());
        self.set_session(session);

        let Some((user_id, generation)) = self.begin(user) else {
            return;
        };
        match &self.runtime {
            Some(runtime) => {
                let inner = Arc::clone(&self);
                runtime.spawn(async move { inner.load_profile(user_id, generation).await });
            }
            None => {
                tracing::warn!(%user_id, "no runtime to refresh profile on");
                self.snapshot.send_modify(|snapshot| snapshot.loading = false);
            }
        }
    }
}

/// Who is signed in at one application root.
///
/// The context is bound to the session it was mounted with (or later handed
/// via [`AuthContext::adopt_session`]) and only follows auth events for that
/// user. Each accepted change refetches the profile in the background with
/// `loading` set; a fetch overtaken by a newer change is discarded.
pub struct AuthContext {
    inner: Arc<Inner>,
    subscription: Option<Subscription>,
}

impl AuthContext {
    /// Fetches the initial profile, then starts following auth events.
    pub async fn mount(
        service: Arc<AuthService>,
        profiles: Arc<dyn ProfileStore>,
        initial_session: Option<Session>,
    ) -> Self {
        let (snapshot, _) = watch::channel(AuthSnapshot::default());
        let inner = Arc::new(Inner {
            service,
            profiles,
            snapshot,
            session: Mutex::new(None),
            generation: AtomicU64::new(0),
            runtime: Handle::try_current().ok(),
        });

        let user = initial_session.as_ref().map(|s| s.user.clone());
        inner.set_session(initial_session);
        if let Some((user_id, generation)) = inner.begin(user) {
            inner.load_profile(user_id, generation).await;
        }

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        let subscription = inner.service.on_auth_state_change(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.on_event(event);
            }
        });

        Self {
            inner,
            subscription: Some(subscription),
        }
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<AuthSnapshot> {
        self.inner.snapshot.subscribe()
    }

    pub fn session(&self) -> Option<Session> {
        self.inner.current_session()
    }

    /// Switches this root to another session, or to anonymous with `None`.
    /// The profile is fetched in the background.
    pub fn adopt_session(&self, session: Option<Session>) {
        Arc::clone(&self.inner).apply(session);
    }

    /// The resulting sign-out event clears the snapshot.
    pub async fn sign_out(&self) -> AuthResult<()> {
        match self.inner.current_session() {
            Some(session) => self.inner.service.sign_out(&session).await,
            None => Ok(()),
        }
    }

    /// Refetches the profile of the current user and waits for it.
    pub async fn refresh_profile(&self) {
        let user = self.inner.snapshot.borrow().user.clone();
        if let Some((user_id, generation)) = user.and_then(|u| self.inner.begin(Some(u))) {
            self.inner.load_profile(user_id, generation).await;
        }
    }

    pub fn unmount(mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}
