use std::future::Future;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::Result;
use tracing::{debug, info, warn};

use super::store::{TokenKey, TokenStore};
use crate::models::UserProfile;
use crate::utils::mask_token;

/// Whether the startup `load()` has resolved yet.
/// Guards show a neutral loading state while `Loading`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Loading,
    Ready,
}

#[derive(Debug, Default)]
struct SessionState {
    access_token: Option<String>,
    refresh_token: Option<String>,
    user: Option<UserProfile>,
}

/// Cloneable point-in-time view of the session, safe to hand to UI code
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub status: LoadStatus,
    pub authenticated: bool,
    pub user: Option<UserProfile>,
}

struct Inner {
    state: RwLock<SessionState>,
    status: RwLock<LoadStatus>,
    store: Arc<dyn TokenStore>,
}

/// The process-wide session: token pair plus cached profile.
///
/// Clone is cheap and every clone shares the same state, so the composition
/// root builds one and hands clones to the gateway and to the guards.
/// Last writer wins; there is no locking beyond the field-level `RwLock`.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl SessionStore {
    /// Empty, still-loading session backed by `store`
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(SessionState::default()),
                status: RwLock::new(LoadStatus::Loading),
                store,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.inner.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.inner.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Resolve the persisted session at startup.
    ///
    /// Reads the stored tokens; when an access token exists, `fetch_profile`
    /// is awaited to confirm it. Any failure (unreadable store, network,
    /// authorization) clears everything and leaves the session logged out.
    /// Never fails and always ends in `LoadStatus::Ready`.
    pub async fn load<F, Fut, E>(&self, fetch_profile: F) -> SessionSnapshot
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<UserProfile, E>>,
        E: std::fmt::Display,
    {
        match self.restore_tokens() {
            Ok(true) => match fetch_profile().await {
                Ok(user) => {
                    info!(user = %user.username, "Session restored");
                    self.set_user(user);
                }
                Err(e) => {
                    warn!(error = %e, "Stored session rejected, signing out");
                    self.clear();
                }
            },
            Ok(false) => debug!("No stored session"),
            Err(e) => {
                warn!(error = %e, "Failed to read stored tokens, signing out");
                self.clear();
            }
        }

        self.mark_ready();
        self.snapshot()
    }

    /// Copy persisted tokens into memory. Returns whether an access token was found.
    fn restore_tokens(&self) -> Result<bool> {
        let access_token = self.inner.store.get(TokenKey::AccessToken)?;
        let refresh_token = self.inner.store.get(TokenKey::RefreshToken)?;
        let found = access_token.is_some();

        let mut state = self.write();
        state.access_token = access_token;
        state.refresh_token = refresh_token;
        state.user = None;
        Ok(found)
    }

    /// Persist both tokens and cache the profile.
    /// Takes effect for the very next gateway request.
    pub fn set_session(
        &self,
        access_token: String,
        refresh_token: String,
        user: UserProfile,
    ) -> Result<()> {
        let persisted = self
            .inner
            .store
            .set(TokenKey::AccessToken, &access_token)
            .and_then(|_| self.inner.store.set(TokenKey::RefreshToken, &refresh_token));
        if let Err(e) = persisted {
            // Don't leave half a pair behind
            self.remove_persisted();
            return Err(e);
        }

        debug!(access_token = %mask_token(&access_token), user = %user.username, "Session established");
        let mut state = self.write();
        state.access_token = Some(access_token);
        state.refresh_token = Some(refresh_token);
        state.user = Some(user);
        Ok(())
    }

    /// Replace the access token after a refresh.
    /// The in-memory token is updated even when persisting fails.
    pub fn set_access_token(&self, access_token: String) -> Result<()> {
        debug!(access_token = %mask_token(&access_token), "Access token replaced");
        self.write().access_token = Some(access_token.clone());
        self.inner.store.set(TokenKey::AccessToken, &access_token)
    }

    /// Replace the cached profile
    pub fn set_user(&self, user: UserProfile) {
        self.write().user = Some(user);
    }

    /// Drop both tokens and the cached profile. Idempotent.
    pub fn clear(&self) {
        {
            let mut state = self.write();
            *state = SessionState::default();
        }
        self.remove_persisted();
        debug!("Session cleared");
    }

    fn remove_persisted(&self) {
        for key in TokenKey::ALL {
            if let Err(e) = self.inner.store.remove(key) {
                warn!(key = key.as_str(), error = %e, "Failed to remove persisted token");
            }
        }
    }

    /// True iff an access token is present. Says nothing about its validity.
    pub fn is_authenticated(&self) -> bool {
        self.read().access_token.is_some()
    }

    pub fn access_token(&self) -> Option<String> {
        self.read().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.read().refresh_token.clone()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.read().user.clone()
    }

    pub fn status(&self) -> LoadStatus {
        *self.inner.status.read().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn mark_ready(&self) {
        *self.inner.status.write().unwrap_or_else(|e| e.into_inner()) = LoadStatus::Ready;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.read();
        SessionSnapshot {
            status: self.status(),
            authenticated: state.access_token.is_some(),
            user: state.user.clone(),
        }
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read();
        f.debug_struct("SessionStore")
            .field("status", &self.status())
            .field("authenticated", &state.access_token.is_some())
            .field("has_refresh_token", &state.refresh_token.is_some())
            .field("user", &state.user.as_ref().map(|u| u.username.as_str()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::MemoryTokenStore;
    use crate::models::Role;

    fn alice() -> UserProfile {
        UserProfile {
            id: 1,
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            role: Role::User,
            is_active: true,
            created_at: None,
        }
    }

    fn session_with(store: MemoryTokenStore) -> (SessionStore, Arc<MemoryTokenStore>) {
        let store = Arc::new(store);
        (SessionStore::new(store.clone()), store)
    }

    #[test]
    fn test_new_session_is_empty_and_loading() {
        let (session, _) = session_with(MemoryTokenStore::new());
        assert_eq!(session.status(), LoadStatus::Loading);
        assert!(!session.is_authenticated());
        assert!(session.user().is_none());
    }

    #[test]
    fn test_set_session_persists_and_caches() {
        let (session, store) = session_with(MemoryTokenStore::new());
        session
            .set_session("A1".to_string(), "R1".to_string(), alice())
            .unwrap();

        assert!(session.is_authenticated());
        assert_eq!(session.access_token().as_deref(), Some("A1"));
        assert_eq!(session.refresh_token().as_deref(), Some("R1"));
        assert_eq!(session.user().unwrap().username, "alice");
        assert_eq!(store.get(TokenKey::AccessToken).unwrap().as_deref(), Some("A1"));
        assert_eq!(store.get(TokenKey::RefreshToken).unwrap().as_deref(), Some("R1"));
    }

    #[test]
    fn test_clear_is_idempotent() {
        let (session, store) = session_with(MemoryTokenStore::new());
        session
            .set_session("A1".to_string(), "R1".to_string(), alice())
            .unwrap();

        session.clear();
        session.clear();

        assert!(!session.is_authenticated());
        assert!(session.refresh_token().is_none());
        assert!(session.user().is_none());
        assert!(store.get(TokenKey::AccessToken).unwrap().is_none());
        assert!(store.get(TokenKey::RefreshToken).unwrap().is_none());
    }

    #[test]
    fn test_is_authenticated_tracks_access_token_only() {
        let (session, _) = session_with(MemoryTokenStore::new());
        session
            .set_session("A1".to_string(), "R1".to_string(), alice())
            .unwrap();
        assert!(session.is_authenticated());

        // A refresh token alone does not count
        let (session, _) = session_with(MemoryTokenStore::with_tokens(None, Some("R1")));
        session.restore_tokens().unwrap();
        assert!(!session.is_authenticated());
        assert_eq!(session.refresh_token().as_deref(), Some("R1"));
    }

    #[tokio::test]
    async fn test_load_without_tokens_skips_fetch() {
        let (session, _) = session_with(MemoryTokenStore::new());
        let snapshot = session
            .load(|| async { Err::<UserProfile, _>("should not be called") })
            .await;
        assert_eq!(snapshot.status, LoadStatus::Ready);
        assert!(!snapshot.authenticated);
    }

    #[tokio::test]
    async fn test_load_restores_session() {
        let (session, _) = session_with(MemoryTokenStore::with_tokens(Some("A1"), Some("R1")));
        let snapshot = session
            .load(|| async { Ok::<_, String>(alice()) })
            .await;
        assert_eq!(snapshot.status, LoadStatus::Ready);
        assert!(snapshot.authenticated);
        assert_eq!(snapshot.user.unwrap().username, "alice");
        assert_eq!(session.refresh_token().as_deref(), Some("R1"));
    }

    #[tokio::test]
    async fn test_load_failure_clears_everything() {
        let (session, store) = session_with(MemoryTokenStore::with_tokens(Some("A1"), Some("R1")));
        let snapshot = session
            .load(|| async { Err::<UserProfile, _>("401 Unauthorized") })
            .await;
        assert_eq!(snapshot.status, LoadStatus::Ready);
        assert!(!snapshot.authenticated);
        assert!(store.get(TokenKey::AccessToken).unwrap().is_none());
        assert!(store.get(TokenKey::RefreshToken).unwrap().is_none());
    }

    #[test]
    fn test_set_access_token_keeps_refresh_token() {
        let (session, store) = session_with(MemoryTokenStore::new());
        session
            .set_session("A1".to_string(), "R1".to_string(), alice())
            .unwrap();
        session.set_access_token("A2".to_string()).unwrap();

        assert_eq!(session.access_token().as_deref(), Some("A2"));
        assert_eq!(session.refresh_token().as_deref(), Some("R1"));
        assert_eq!(store.get(TokenKey::AccessToken).unwrap().as_deref(), Some("A2"));
    }

    #[test]
    fn test_clones_share_state() {
        let (session, _) = session_with(MemoryTokenStore::new());
        let other = session.clone();
        session
            .set_session("A1".to_string(), "R1".to_string(), alice())
            .unwrap();
        assert!(other.is_authenticated());
    }
}
