//! Session state holder
//!
//! Owns the signed-in user and token, mirrored into durable storage under two
//! entries. Restored once at startup; mutated only through login, register
//! and logout.
//!
//! Storage is written in step with memory. When a write fails the in-memory
//! session stays authoritative until logout or close, any half-written entry
//! is removed, and [`SessionHolder::is_persisted`] reports false.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use toefl_core::invariants::{assert_session_invariants, assert_storage_pair_invariants};
use toefl_core::{KeyValueStore, Session, User};
use toefl_net::{AuthApi, AuthResponse};

use crate::error::AuthError;

/// Storage entry holding the raw token
pub const TOKEN_KEY: &str = "token";
/// Storage entry holding the serialized user record
pub const USER_KEY: &str = "user";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Restoring from storage or waiting on the backend
    Loading,
    Ready,
}

type AuthResult<T> = std::result::Result<T, AuthError>;

struct Inner {
    session: Option<Session>,
    restored: bool,
    in_flight: usize,
    /// Bumped on logout and close; responses from an older generation are dropped
    generation: u64,
    closed: bool,
    persisted: bool,
}

pub struct SessionHolder {
    api: Arc<dyn AuthApi>,
    store: Mutex<Box<dyn KeyValueStore + Send>>,
    inner: Mutex<Inner>,
}

/// Counts a request as in flight until dropped, including on cancellation
struct InFlight<'a> {
    holder: &'a SessionHolder,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut inner = lock(&self.holder.inner);
        inner.in_flight = inner.in_flight.saturating_sub(1);
    }
}

impl SessionHolder {
    pub fn new(api: Arc<dyn AuthApi>, store: Box<dyn KeyValueStore + Send>) -> Self {
        Self {
            api,
            store: Mutex::new(store),
            inner: Mutex::new(Inner {
                session: None,
                restored: false,
                in_flight: 0,
                generation: 0,
                closed: false,
                persisted: true,
            }),
        }
    }

    /// Load a persisted session.
    ///
    /// A token with a user record that parses becomes the current session.
    /// Anything else found in storage (unparseable record, a lone entry, an
    /// empty token) is purged and the holder stays signed out.
    #[instrument(skip(self))]
    pub fn restore(&self) -> AuthResult<()> {
        let mut inner = lock(&self.inner);
        if inner.closed {
            return Err(AuthError::Closed);
        }

        let store = lock(&self.store);
        let token = read_entry(&**store, TOKEN_KEY);
        let user = read_entry(&**store, USER_KEY);

        let session = match (token, user) {
            (None, None) => {
                debug!("No stored session");
                None
            }
            (Some(token), Some(record)) if !token.is_empty() => {
                match serde_json::from_str::<User>(&record) {
                    Ok(user) => {
                        let session = Session::new(user, token);
                        if session.is_expired(Utc::now()) {
                            info!("Stored token has expired; the backend will reject it");
                        }
                        info!(user_id = session.user.id, "Restored session");
                        Some(session)
                    }
                    Err(e) => {
                        warn!(error = %e, "Stored user record is corrupt, clearing session");
                        inner.persisted = purge(&**store);
                        None
                    }
                }
            }
            _ => {
                warn!("Stored session is incomplete, clearing it");
                inner.persisted = purge(&**store);
                None
            }
        };

        inner.session = session;
        inner.restored = true;
        Ok(())
    }

    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> AuthResult<User> {
        let (generation, _in_flight) = self.begin()?;
        let result = self.api.login_user(email, password).await;
        self.finish(generation, result)
    }

    #[instrument(skip(self, password))]
    pub async fn register(&self, username: &str, email: &str, password: &str) -> AuthResult<User> {
        let (generation, _in_flight) = self.begin()?;
        let result = self.api.register_user(username, email, password).await;
        self.finish(generation, result)
    }

    /// Sign out locally and tell the backend.
    ///
    /// Local state and storage are cleared first; the backend call is
    /// best-effort. Safe to call when already signed out.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> AuthResult<()> {
        let token = {
            let mut inner = lock(&self.inner);
            if inner.closed {
                return Err(AuthError::Closed);
            }
            inner.generation += 1;
            let token = inner.session.take().map(|s| s.token);
            inner.persisted = purge(&**lock(&self.store));
            token
        };

        match token {
            Some(token) => {
                if let Err(e) = self.api.logout_user(&token).await {
                    warn!(error = %e, "Backend logout failed; local session already cleared");
                }
                info!("Logged out");
            }
            None => debug!("Logout without a session"),
        }
        Ok(())
    }

    /// Tear the holder down. Storage is left as is for the next start.
    pub fn close(&self) {
        let mut inner = lock(&self.inner);
        if inner.closed {
            return;
        }
        inner.closed = true;
        inner.generation += 1;
        inner.session = None;
        debug!("Session holder closed");
    }

    pub fn is_authenticated(&self) -> bool {
        lock(&self.inner)
            .session
            .as_ref()
            .is_some_and(|s| !s.token.is_empty())
    }

    pub fn status(&self) -> SessionStatus {
        let inner = lock(&self.inner);
        if !inner.restored || inner.in_flight > 0 {
            SessionStatus::Loading
        } else {
            SessionStatus::Ready
        }
    }

    pub fn is_loading(&self) -> bool {
        self.status() == SessionStatus::Loading
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.inner).closed
    }

    /// Whether storage currently mirrors the in-memory session
    pub fn is_persisted(&self) -> bool {
        lock(&self.inner).persisted
    }

    pub fn session(&self) -> Option<Session> {
        lock(&self.inner).session.clone()
    }

    pub fn user(&self) -> Option<User> {
        lock(&self.inner).session.as_ref().map(|s| s.user.clone())
    }

    pub fn token(&self) -> Option<String> {
        lock(&self.inner).session.as_ref().map(|s| s.token.clone())
    }

    fn begin(&self) -> AuthResult<(u64, InFlight<'_>)> {
        let mut inner = lock(&self.inner);
        if inner.closed {
            return Err(AuthError::Closed);
        }
        inner.in_flight += 1;
        Ok((inner.generation, InFlight { holder: self }))
    }

    fn finish(&self, generation: u64, result: toefl_net::Result<AuthResponse>) -> AuthResult<User> {
        let mut inner = lock(&self.inner);
        if inner.closed {
            return Err(AuthError::Closed);
        }
        if inner.generation != generation {
            debug!("Discarding auth response from a previous session");
            return Err(AuthError::Superseded);
        }

        let auth = result.map_err(|e| {
            error!(error = %e, "Authentication failed");
            AuthError::Backend(e)
        })?;
        if auth.token.is_empty() {
            error!(user_id = auth.user.id, "Backend returned an empty token");
            return Err(AuthError::Backend(toefl_net::Error::Protocol(
                "Authentication response carried an empty token".into(),
            )));
        }

        let session = Session::new(auth.user, auth.token);
        assert_session_invariants(&session);
        inner.persisted = persist(&**lock(&self.store), &session);
        let user = session.user.clone();
        inner.session = Some(session);
        info!(user_id = user.id, persisted = inner.persisted, "Signed in");
        Ok(user)
    }
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read_entry(store: &dyn KeyValueStore, key: &str) -> Option<String> {
    store.get_item(key).unwrap_or_else(|e| {
        warn!(key, error = %e, "Failed to read stored entry");
        None
    })
}

/// Write both entries. On failure remove whatever landed and return false.
fn persist(store: &dyn KeyValueStore, session: &Session) -> bool {
    let written = serde_json::to_string(&session.user)
        .map_err(toefl_core::Error::from)
        .and_then(|record| {
            store.set_item(TOKEN_KEY, &session.token)?;
            store.set_item(USER_KEY, &record)
        });

    match written {
        Ok(()) => {
            assert_storage_pair_invariants(
                read_entry(store, TOKEN_KEY).as_deref(),
                read_entry(store, USER_KEY).as_deref(),
            );
            true
        }
        Err(e) => {
            error!(error = %e, "Failed to persist session; keeping it in memory only");
            purge(store);
            false
        }
    }
}

/// Remove both entries; true when storage ends up empty
fn purge(store: &dyn KeyValueStore) -> bool {
    let mut ok = true;
    for key in [TOKEN_KEY, USER_KEY] {
        if let Err(e) = store.remove_item(key) {
            error!(key, error = %e, "Failed to remove stored entry");
            ok = false;
        }
    }
    ok
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Notify;
    use toefl_core::Error as CoreError;
    use toefl_net::Error as NetError;

    /// In-memory store whose contents the test can inspect after handing it over
    #[derive(Clone, Default)]
    pub(crate) struct SharedStore {
        entries: Arc<Mutex<HashMap<String, String>>>,
        fail_writes_to: Option<&'static str>,
    }

    impl SharedStore {
        pub(crate) fn get(&self, key: &str) -> Option<String> {
            self.entries.lock().unwrap().get(key).cloned()
        }

        pub(crate) fn put(&self, key: &str, value: &str) {
            self.entries.lock().unwrap().insert(key.into(), value.into());
        }

        fn failing_on(key: &'static str) -> Self {
            Self {
                fail_writes_to: Some(key),
                ..Default::default()
            }
        }
    }

    impl KeyValueStore for SharedStore {
        fn get_item(&self, key: &str) -> toefl_core::Result<Option<String>> {
            Ok(self.get(key))
        }

        fn set_item(&self, key: &str, value: &str) -> toefl_core::Result<()> {
            if self.fail_writes_to == Some(key) {
                return Err(CoreError::Storage("disk full".into()));
            }
            self.put(key, value);
            Ok(())
        }

        fn remove_item(&self, key: &str) -> toefl_core::Result<()> {
            self.entries.lock().unwrap().remove(key);
            Ok(())
        }
    }

    #[derive(Default)]
    pub(crate) struct MockAuth {
        pub(crate) gate: Option<Arc<Notify>>,
        pub(crate) logouts: AtomicUsize,
        pub(crate) fail_logout: bool,
        pub(crate) empty_token: bool,
    }

    fn user_for(id: i64, username: &str, email: &str) -> User {
        let user = User::new(id, username, email);
        if email.starts_with("admin") {
            user.with_role("admin")
        } else {
            user.with_role("student")
        }
    }

    #[async_trait]
    impl AuthApi for MockAuth {
        async fn login_user(&self, email: &str, password: &str) -> toefl_net::Result<AuthResponse> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if password != "secret" {
                return Err(NetError::Api {
                    status: 401,
                    message: "Invalid email or password".into(),
                });
            }
            let token = if self.empty_token { "" } else { "tok-1" };
            Ok(AuthResponse {
                user: user_for(1, "li", email),
                token: token.into(),
            })
        }

        async fn register_user(
            &self,
            username: &str,
            email: &str,
            _password: &str,
        ) -> toefl_net::Result<AuthResponse> {
            if email == "taken@example.com" {
                return Err(NetError::Api {
                    status: 409,
                    message: "Email already registered".into(),
                });
            }
            Ok(AuthResponse {
                user: user_for(9, username, email),
                token: "tok-9".into(),
            })
        }

        async fn logout_user(&self, _token: &str) -> toefl_net::Result<()> {
            self.logouts.fetch_add(1, Ordering::SeqCst);
            if self.fail_logout {
                return Err(NetError::Protocol("connection reset".into()));
            }
            Ok(())
        }
    }

    pub(crate) fn holder_with(api: MockAuth, store: SharedStore) -> (SessionHolder, Arc<MockAuth>) {
        let api = Arc::new(api);
        let holder = SessionHolder::new(api.clone(), Box::new(store));
        (holder, api)
    }

    pub(crate) async fn signed_in_holder(email: &str) -> SessionHolder {
        let (holder, _) = holder_with(MockAuth::default(), SharedStore::default());
        holder.restore().unwrap();
        holder.login(email, "secret").await.unwrap();
        holder
    }

    #[tokio::test]
    async fn login_persists_both_entries() {
        let store = SharedStore::default();
        let (holder, _) = holder_with(MockAuth::default(), store.clone());
        holder.restore().unwrap();

        let user = holder.login("li@example.com", "secret").await.unwrap();
        assert_eq!(user.email, "li@example.com");
        assert!(holder.is_authenticated());
        assert!(holder.is_persisted());
        assert_eq!(store.get(TOKEN_KEY).as_deref(), Some("tok-1"));

        let stored: User = serde_json::from_str(&store.get(USER_KEY).unwrap()).unwrap();
        assert_eq!(stored, user);
    }

    #[tokio::test]
    async fn failed_login_leaves_state_unchanged() {
        let store = SharedStore::default();
        let (holder, _) = holder_with(MockAuth::default(), store.clone());
        holder.restore().unwrap();

        let err = holder.login("li@example.com", "wrong").await.unwrap_err();
        assert!(matches!(err, AuthError::Backend(NetError::Api { status: 401, .. })));
        assert!(!holder.is_authenticated());
        assert!(store.get(TOKEN_KEY).is_none());
        assert!(!holder.is_loading());
    }

    #[tokio::test]
    async fn register_creates_session() {
        let (holder, _) = holder_with(MockAuth::default(), SharedStore::default());
        holder.restore().unwrap();

        let user = holder.register("mina", "mina@example.com", "pw").await.unwrap();
        assert_eq!(user.role.as_deref(), Some("student"));
        assert_eq!(holder.token().as_deref(), Some("tok-9"));

        let err = holder.register("x", "taken@example.com", "pw").await.unwrap_err();
        assert_eq!(err.to_string(), "Email already registered");
        // The earlier session survives a failed registration
        assert!(holder.is_authenticated());
    }

    #[tokio::test]
    async fn empty_token_is_rejected() {
        let store = SharedStore::default();
        let api = MockAuth {
            empty_token: true,
            ..Default::default()
        };
        let (holder, _) = holder_with(api, store.clone());
        holder.restore().unwrap();

        let err = holder.login("li@example.com", "secret").await.unwrap_err();
        assert!(matches!(err, AuthError::Backend(NetError::Protocol(_))));
        assert!(!holder.is_authenticated());
        assert!(holder.session().is_none());
        assert!(store.get(TOKEN_KEY).is_none());
        assert!(store.get(USER_KEY).is_none());
    }

    #[test]
    fn restore_valid_session() {
        let store = SharedStore::default();
        store.put(TOKEN_KEY, "tok-1");
        store.put(
            USER_KEY,
            r#"{"id":3,"username":"li","email":"li@example.com","role":"admin"}"#,
        );
        let (holder, _) = holder_with(MockAuth::default(), store);

        assert!(holder.is_loading());
        holder.restore().unwrap();
        assert!(!holder.is_loading());
        assert!(holder.is_authenticated());
        assert!(holder.user().unwrap().is_admin());
    }

    #[test]
    fn restore_purges_corrupt_record() {
        let store = SharedStore::default();
        store.put(TOKEN_KEY, "tok-1");
        store.put(USER_KEY, "{not json");
        let (holder, _) = holder_with(MockAuth::default(), store.clone());

        holder.restore().unwrap();
        assert!(!holder.is_authenticated());
        assert!(store.get(TOKEN_KEY).is_none());
        assert!(store.get(USER_KEY).is_none());
    }

    #[test]
    fn restore_purges_stray_entries() {
        let store = SharedStore::default();
        store.put(TOKEN_KEY, "tok-1");
        let (holder, _) = holder_with(MockAuth::default(), store.clone());
        holder.restore().unwrap();
        assert!(!holder.is_authenticated());
        assert!(store.get(TOKEN_KEY).is_none());

        let store = SharedStore::default();
        store.put(TOKEN_KEY, "");
        store.put(USER_KEY, r#"{"id":3,"username":"li","email":"li@example.com"}"#);
        let (holder, _) = holder_with(MockAuth::default(), store.clone());
        holder.restore().unwrap();
        assert!(!holder.is_authenticated());
        assert!(store.get(USER_KEY).is_none());
    }

    #[tokio::test]
    async fn logout_is_idempotent() {
        let store = SharedStore::default();
        let (holder, api) = holder_with(MockAuth::default(), store.clone());
        holder.restore().unwrap();
        holder.login("li@example.com", "secret").await.unwrap();

        holder.logout().await.unwrap();
        assert!(!holder.is_authenticated());
        assert!(store.get(TOKEN_KEY).is_none());
        assert!(store.get(USER_KEY).is_none());

        // Second logout: no backend call, stray entries still cleared
        store.put(USER_KEY, "stale");
        holder.logout().await.unwrap();
        assert!(!holder.is_authenticated());
        assert!(store.get(USER_KEY).is_none());
        assert_eq!(api.logouts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn backend_logout_failure_still_clears() {
        let store = SharedStore::default();
        let api = MockAuth {
            fail_logout: true,
            ..Default::default()
        };
        let (holder, _) = holder_with(api, store.clone());
        holder.restore().unwrap();
        holder.login("li@example.com", "secret").await.unwrap();

        holder.logout().await.unwrap();
        assert!(!holder.is_authenticated());
        assert!(store.get(TOKEN_KEY).is_none());
    }

    #[tokio::test]
    async fn storage_failure_keeps_memory_authoritative() {
        let store = SharedStore::failing_on(USER_KEY);
        let (holder, _) = holder_with(MockAuth::default(), store.clone());
        holder.restore().unwrap();

        holder.login("li@example.com", "secret").await.unwrap();
        assert!(holder.is_authenticated());
        assert!(!holder.is_persisted());
        // The token written before the failure was rolled back
        assert!(store.get(TOKEN_KEY).is_none());
    }

    #[tokio::test]
    async fn response_after_logout_is_discarded() {
        let gate = Arc::new(Notify::new());
        let api = MockAuth {
            gate: Some(gate.clone()),
            ..Default::default()
        };
        let store = SharedStore::default();
        let (holder, _) = holder_with(api, store.clone());
        holder.restore().unwrap();

        let (result, ()) = tokio::join!(holder.login("li@example.com", "secret"), async {
            assert!(holder.is_loading());
            holder.logout().await.unwrap();
            gate.notify_one();
        });

        assert!(matches!(result, Err(AuthError::Superseded)));
        assert!(!holder.is_authenticated());
        assert!(store.get(TOKEN_KEY).is_none());
        assert!(!holder.is_loading());
    }

    #[tokio::test]
    async fn closed_holder_rejects_operations() {
        let store = SharedStore::default();
        let (holder, _) = holder_with(MockAuth::default(), store.clone());
        holder.restore().unwrap();
        holder.login("li@example.com", "secret").await.unwrap();

        holder.close();
        assert!(holder.is_closed());
        assert!(!holder.is_authenticated());
        // Storage is kept for the next start
        assert_eq!(store.get(TOKEN_KEY).as_deref(), Some("tok-1"));

        assert!(matches!(
            holder.login("li@example.com", "secret").await,
            Err(AuthError::Closed)
        ));
        assert!(matches!(holder.logout().await, Err(AuthError::Closed)));
        assert!(matches!(holder.restore(), Err(AuthError::Closed)));
    }
}
