use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use uuid::Uuid;

use crate::provider::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEventKind {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    PasswordRecovery,
}

impl AuthEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SignedIn => "SIGNED_IN",
            Self::SignedOut => "SIGNED_OUT",
            Self::TokenRefreshed => "TOKEN_REFRESHED",
            Self::UserUpdated => "USER_UPDATED",
            Self::PasswordRecovery => "PASSWORD_RECOVERY",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    /// Whose session changed. Set on sign-out too, where `session` is gone.
    pub user_id: Option<Uuid>,
    pub session: Option<Session>,
}

impl AuthEvent {
    pub fn new(kind: AuthEventKind, session: Option<Session>) -> Self {
        Self {
            kind,
            user_id: session.as_ref().map(|s| s.user.id),
            session,
        }
    }

    pub fn signed_out(user_id: Uuid) -> Self {
        Self {
            kind: AuthEventKind::SignedOut,
            user_id: Some(user_id),
            session: None,
        }
    }
}

type Listener = Arc<dyn Fn(&AuthEvent) + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    entries: HashMap<u64, Listener>,
}

fn lock(listeners: &Mutex<Listeners>) -> MutexGuard<'_, Listeners> {
    // A panicking listener runs outside the lock, so poisoning only means a
    // panic mid-insert; the map itself is still consistent.
    listeners
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[derive(Clone, Default)]
pub struct AuthEventBus {
    listeners: Arc<Mutex<Listeners>>,
}

impl AuthEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&AuthEvent) + Send + Sync + 'static,
    {
        let mut guard = lock(&self.listeners);
        let id = guard.next_id;
        guard.next_id += 1;
        guard.entries.insert(id, Arc::new(listener));

        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
            active: true,
        }
    }

    /// Listeners are called outside the lock, so they may subscribe or
    /// unsubscribe re-entrantly.
    pub fn emit(&self, event: &AuthEvent) {
        let listeners: Vec<Listener> = lock(&self.listeners).entries.values().cloned().collect();
        tracing::debug!(
            event = event.kind.as_str(),
            user_id = ?event.user_id,
            listeners = listeners.len(),
            "auth state changed"
        );
        for listener in listeners {
            listener(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.listeners).entries.len()
    }
}

/// Handle returned by [`AuthEventBus::subscribe`].
#[must_use = "dropping a subscription immediately detaches its listener"]
pub struct Subscription {
    id: u64,
    listeners: Weak<Mutex<Listeners>>,
    active: bool,
}

impl Subscription {
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    fn detach(&mut self) {
        if !std::mem::replace(&mut self.active, false) {
            return;
        }
        if let Some(listeners) = self.listeners.upgrade() {
            lock(&listeners).entries.remove(&self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counter(bus: &AuthEventBus) -> (Arc<AtomicUsize>, Subscription) {
        let hits = Arc::new(AtomicUsize::new(0));
        let seen = hits.clone();
        let sub = bus.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        (hits, sub)
    }

    #[test]
    fn listeners_receive_events_until_unsubscribed() {
        let bus = AuthEventBus::new();
        let (hits, sub) = counter(&bus);

        bus.emit(&AuthEvent::signed_out(Uuid::new_v4()));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        sub.unsubscribe();
        bus.emit(&AuthEvent::signed_out(Uuid::new_v4()));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn drop_detaches_exactly_once() {
        let bus = AuthEventBus::new();
        let (_a, first) = counter(&bus);
        let (_b, second) = counter(&bus);
        assert_eq!(bus.subscriber_count(), 2);

        drop(first);
        assert_eq!(bus.subscriber_count(), 1);
        assert!(second.is_active());
        drop(second);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn subscription_outliving_bus_is_harmless() {
        let bus = AuthEventBus::new();
        let (_hits, sub) = counter(&bus);
        drop(bus);
        sub.unsubscribe();
    }

    #[test]
    fn listener_may_subscribe_during_emit() {
        let bus = AuthEventBus::new();
        let inner_bus = bus.clone();
        let spawned = Arc::new(Mutex::new(Vec::new()));
        let store = spawned.clone();
        let _outer = bus.subscribe(move |_| {
            let sub = inner_bus.subscribe(|_| {});
            store.lock().unwrap().push(sub);
        });

        bus.emit(&AuthEvent::new(AuthEventKind::SignedIn, None));
        assert_eq!(bus.subscriber_count(), 2);
        spawned.lock().unwrap().clear();
        assert_eq!(bus.subscriber_count(), 1);
    }
}
