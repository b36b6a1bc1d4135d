//! Route table and navigation guards.
//!
//! Guards read the session synchronously. While the startup load is still
//! resolving they answer `Loading` instead of redirecting, so a stored
//! session is never bounced to the login page before it has been checked.

use std::fmt;

use crate::api::SessionEvent;
use crate::auth::{LoadStatus, SessionStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Login,
    Register,
    ForgotPassword,
    ResetPassword,
    Dashboard,
    ChangePassword,
}

impl Route {
    pub const ALL: [Route; 6] = [
        Route::Login,
        Route::Register,
        Route::ForgotPassword,
        Route::ResetPassword,
        Route::Dashboard,
        Route::ChangePassword,
    ];

    pub fn path(&self) -> &'static str {
        match self {
            Route::Login => "/login",
            Route::Register => "/register",
            Route::ForgotPassword => "/forgot-password",
            Route::ResetPassword => "/reset-password",
            Route::Dashboard => "/dashboard",
            Route::ChangePassword => "/change-password",
        }
    }

    /// Match a path, ignoring any query string and trailing slash
    pub fn from_path(path: &str) -> Option<Route> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let path = match path.trim_end_matches('/') {
            "" => "/",
            p => p,
        };
        Route::ALL.into_iter().find(|route| route.path() == path)
    }

    /// Which guard, if any, wraps this route
    pub fn guard(&self) -> Option<Guard> {
        match self {
            Route::Login | Route::Register => Some(Guard::GuestOnly),
            Route::Dashboard | Route::ChangePassword => Some(Guard::Protected),
            Route::ForgotPassword | Route::ResetPassword => None,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// Signed-in users only; others go to login
    Protected,
    /// Signed-out users only; others go to the dashboard
    GuestOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    Render,
    Loading,
    Redirect(Route),
}

impl Guard {
    pub fn check(&self, session: &SessionStore) -> GuardDecision {
        if session.status() == LoadStatus::Loading {
            return GuardDecision::Loading;
        }
        let authenticated = session.is_authenticated();
        match (self, authenticated) {
            (Guard::Protected, true) | (Guard::GuestOnly, false) => GuardDecision::Render,
            (Guard::Protected, false) => GuardDecision::Redirect(Route::Login),
            (Guard::GuestOnly, true) => GuardDecision::Redirect(Route::Dashboard),
        }
    }
}

/// Resolve a navigation to `path`. Unknown paths redirect to login.
pub fn resolve(path: &str, session: &SessionStore) -> GuardDecision {
    match Route::from_path(path) {
        Some(route) => match route.guard() {
            Some(guard) => guard.check(session),
            None => GuardDecision::Render,
        },
        None => GuardDecision::Redirect(Route::Login),
    }
}

/// Turns session events into navigation. The gateway only reports; this
/// decides where the user goes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Navigator;

impl Navigator {
    pub fn redirect_for(&self, event: &SessionEvent) -> Option<Route> {
        match event {
            SessionEvent::Expired { .. } | SessionEvent::LoggedOut => Some(Route::Login),
            SessionEvent::SignedIn => Some(Route::Dashboard),
            SessionEvent::Refreshed => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::api::RefreshFailure;
    use crate::auth::MemoryTokenStore;
    use crate::models::{Role, UserProfile};

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

    async fn ready_session(signed_in: bool) -> SessionStore {
        let session = SessionStore::new(Arc::new(MemoryTokenStore::new()));
        session.load(|| async { Ok::<_, String>(alice()) }).await;
        if signed_in {
            session
                .set_session("A1".to_string(), "R1".to_string(), alice())
                .unwrap();
        }
        session
    }

    #[test]
    fn test_guards_wait_for_load() {
        let session = SessionStore::new(Arc::new(MemoryTokenStore::with_tokens(Some("A1"), None)));
        assert_eq!(Guard::Protected.check(&session), GuardDecision::Loading);
        assert_eq!(Guard::GuestOnly.check(&session), GuardDecision::Loading);
    }

    #[tokio::test]
    async fn test_protected_guard() {
        let session = ready_session(false).await;
        assert_eq!(
            Guard::Protected.check(&session),
            GuardDecision::Redirect(Route::Login)
        );

        let session = ready_session(true).await;
        assert_eq!(Guard::Protected.check(&session), GuardDecision::Render);
    }

    #[tokio::test]
    async fn test_guest_only_guard() {
        let session = ready_session(false).await;
        assert_eq!(Guard::GuestOnly.check(&session), GuardDecision::Render);

        let session = ready_session(true).await;
        assert_eq!(
            Guard::GuestOnly.check(&session),
            GuardDecision::Redirect(Route::Dashboard)
        );
    }

    #[tokio::test]
    async fn test_resolve_route_table() {
        let session = ready_session(false).await;
        assert_eq!(resolve("/login", &session), GuardDecision::Render);
        assert_eq!(resolve("/reset-password?token=abc", &session), GuardDecision::Render);
        assert_eq!(resolve("/dashboard/", &session), GuardDecision::Redirect(Route::Login));
        assert_eq!(resolve("/nowhere", &session), GuardDecision::Redirect(Route::Login));
        assert_eq!(resolve("/", &session), GuardDecision::Redirect(Route::Login));

        let session = ready_session(true).await;
        assert_eq!(resolve("/register", &session), GuardDecision::Redirect(Route::Dashboard));
        assert_eq!(resolve("/change-password", &session), GuardDecision::Render);
        assert_eq!(resolve("/forgot-password", &session), GuardDecision::Render);
    }

    #[test]
    fn test_route_paths_round_trip() {
        for route in Route::ALL {
            assert_eq!(Route::from_path(route.path()), Some(route));
        }
    }

    #[test]
    fn test_navigator_redirects() {
        let nav = Navigator;
        assert_eq!(
            nav.redirect_for(&SessionEvent::Expired {
                reason: RefreshFailure::MissingRefreshToken
            }),
            Some(Route::Login)
        );
        assert_eq!(nav.redirect_for(&SessionEvent::LoggedOut), Some(Route::Login));
        assert_eq!(nav.redirect_for(&SessionEvent::SignedIn), Some(Route::Dashboard));
        assert_eq!(nav.redirect_for(&SessionEvent::Refreshed), None);
    }
}
