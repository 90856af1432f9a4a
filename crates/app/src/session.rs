//! Signed-in state shared across the app.
//!
//! Listeners are snapshotted under the lock and called after it is released,
//! so a listener may read the context or drop its own subscription.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, Weak},
};

use crate::backend::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn,
    TokenRefreshed,
    SignedOut,
}

type Listener = Arc<dyn Fn(AuthEvent, Option<&Session>) + Send + Sync>;

#[derive(Default)]
struct Inner {
    session: Option<Session>,
    listeners: BTreeMap<u64, Listener>,
    next_id: u64,
}

#[derive(Clone, Default)]
pub struct SessionContext {
    inner: Arc<Mutex<Inner>>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Session> {
        self.lock().session.clone()
    }

    pub fn is_signed_in(&self) -> bool {
        self.lock().session.is_some()
    }

    pub fn sign_in(&self, session: Session) {
        tracing::info!("Signed in as {}", session.user_id);
        self.set(Some(session), AuthEvent::SignedIn);
    }

    /// Replace the token of the current session; ignored when signed out
    pub fn refresh(&self, session: Session) {
        let applied = self.apply(AuthEvent::TokenRefreshed, |current| {
            if current.is_none() {
                return false;
            }
            *current = Some(session);
            true
        });

        if !applied {
            tracing::warn!("Token refresh without a session, ignoring");
        }
    }

    pub fn sign_out(&self) {
        self.set(None, AuthEvent::SignedOut);
    }

    /// Register `listener` until the returned handle is dropped or
    /// unsubscribed
    pub fn subscribe(
        &self,
        listener: impl Fn(AuthEvent, Option<&Session>) + Send + Sync + 'static,
    ) -> Subscription {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.insert(id, Arc::new(listener));

        Subscription {
            id,
            context: Arc::downgrade(&self.inner),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    fn set(&self, session: Option<Session>, event: AuthEvent) {
        self.apply(event, |current| {
            *current = session;
            true
        });
    }

    /// Run `change` under the lock and notify listeners when it reports a
    /// change
    fn apply(&self, event: AuthEvent, change: impl FnOnce(&mut Option<Session>) -> bool) -> bool {
        let (snapshot, listeners) = {
            let mut inner = self.lock();
            if !change(&mut inner.session) {
                return false;
            }
            let listeners: Vec<Listener> = inner.listeners.values().cloned().collect();
            (inner.session.clone(), listeners)
        };

        for listener in listeners {
            listener(event, snapshot.as_ref());
        }
        true
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock(&self.inner)
    }
}

// A listener that panicked must not take the session down with it.
fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Live registration of a session listener
#[must_use = "dropping the subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    context: Weak<Mutex<Inner>>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.context.upgrade() {
            lock(&inner).listeners.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn session(token: &str) -> Session {
        Session {
            user_id: "user-1".to_string(),
            email: Some("ama@example.com".to_string()),
            access_token: token.to_string(),
            expires_at: None,
        }
    }

    #[test]
    fn listeners_see_each_transition() {
        let context = SessionContext::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = seen.clone();
        let _subscription = context.subscribe(move |event, session| {
            log.lock()
                .unwrap()
                .push((event, session.map(|s| s.access_token.clone())));
        });

        context.sign_in(session("a"));
        context.refresh(session("b"));
        context.sign_out();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (AuthEvent::SignedIn, Some("a".to_string())),
                (AuthEvent::TokenRefreshed, Some("b".to_string())),
                (AuthEvent::SignedOut, None),
            ]
        );
        assert_eq!(context.current(), None);
    }

    #[test]
    fn refresh_while_signed_out_is_ignored() {
        let context = SessionContext::new();
        context.refresh(session("b"));
        assert!(!context.is_signed_in());
    }

    #[test]
    fn sign_out_wins_over_concurrent_refreshes() {
        for _ in 0..200 {
            let context = SessionContext::new();
            context.sign_in(session("a"));

            let refresher = context.clone();
            let handle = std::thread::spawn(move || {
                for _ in 0..50 {
                    refresher.refresh(session("b"));
                }
            });
            context.sign_out();
            handle.join().unwrap();

            assert_eq!(context.current(), None);
        }
    }

    #[test]
    fn unsubscribed_listeners_stop_receiving() {
        let context = SessionContext::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let explicit = context.subscribe(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = calls.clone();
        let dropped = context.subscribe(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        context.sign_in(session("a"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        explicit.unsubscribe();
        drop(dropped);
        assert_eq!(context.listener_count(), 0);

        context.sign_out();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn listener_may_read_the_context() {
        let context = SessionContext::new();
        let observed = Arc::new(Mutex::new(None));

        let reader = context.clone();
        let out = observed.clone();
        let _subscription = context.subscribe(move |_, _| {
            *out.lock().unwrap() = reader.current().map(|s| s.user_id);
        });

        context.sign_in(session("a"));
        assert_eq!(*observed.lock().unwrap(), Some("user-1".to_string()));
    }
}
