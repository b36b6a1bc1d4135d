//! Application state for the authgate CLI.
//!
//! The composition root: one `SessionStore` built on the configured token
//! backend, one `AuthClient` sharing it, and the navigation side of the
//! session events the gateway reports.

use anyhow::Result;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, warn};

use authgate_core::auth::token_store_for;
use authgate_core::{
    AuthClient, Config, GuardDecision, Navigator, Route, SessionEvent, SessionStore,
};

/// Environment variables for non-interactive login
pub const ENV_LOGIN_ID: &str = "AUTHGATE_LOGIN_ID";
pub const ENV_PASSWORD: &str = "AUTHGATE_PASSWORD";

pub struct App {
    pub config: Config,
    pub client: AuthClient,
    events: broadcast::Receiver<SessionEvent>,
    navigator: Navigator,
}

impl App {
    pub fn new(api_url: Option<String>) -> Result<Self> {
        let mut config = match Config::load() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to load config, using defaults");
                Config::default()
            }
        };
        config.apply_env()?;
        if let Some(url) = api_url {
            config.api_base_url = url;
        }
        debug!(api = %config.api_base_url, backend = %config.token_backend, "Config loaded");

        let store = token_store_for(&config)?;
        let session = SessionStore::new(store);
        let client = AuthClient::new(&config, session)?;
        Ok(Self::with_client(config, client))
    }

    pub fn with_client(config: Config, client: AuthClient) -> Self {
        let events = client.subscribe();
        Self {
            config,
            client,
            events,
            navigator: Navigator,
        }
    }

    pub fn session(&self) -> &SessionStore {
        self.client.session()
    }

    /// Resolve the stored session before any page is shown. A stored session
    /// that no longer works just leaves the user signed out, so the events
    /// the load produced are dropped unseen.
    pub async fn start(&mut self) {
        let snapshot = self.client.load_session().await;
        debug!(authenticated = snapshot.authenticated, "Session loaded");
        self.events = self.events.resubscribe();
    }

    /// Run the route's guard. Returns whether the page may render; otherwise
    /// prints where the user was sent instead.
    pub fn enter(&self, route: Route) -> bool {
        let decision = match route.guard() {
            Some(guard) => guard.check(self.session()),
            None => GuardDecision::Render,
        };
        match decision {
            GuardDecision::Render => true,
            GuardDecision::Loading => {
                println!("Checking your session, try again in a moment.");
                false
            }
            GuardDecision::Redirect(Route::Dashboard) => {
                let name = self
                    .session()
                    .user()
                    .map(|u| u.username)
                    .unwrap_or_else(|| "another account".to_string());
                println!(
                    "Already signed in as {}. Run `authgate dashboard`, or `authgate logout` to switch accounts.",
                    name
                );
                false
            }
            GuardDecision::Redirect(target) => {
                println!("You are not signed in. Run `authgate {}` first.", command_for(target));
                false
            }
        }
    }

    /// Remember the login id for the next prompt
    pub fn remember_login_id(&mut self, login_id: &str) {
        self.config.last_login_id = Some(login_id.to_string());
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }
    }

    /// React to everything the gateway reported since the last call.
    /// Expiry is the only event that needs a visible redirect here; sign-in
    /// and logout are already followed by their page's own output.
    pub fn drain_session_events(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    let target = self.navigator.redirect_for(&event);
                    debug!(?event, ?target, "Session event");
                    if let (SessionEvent::Expired { .. }, Some(route)) = (&event, target) {
                        println!(
                            "Your session has expired. Please sign in again with `authgate {}`.",
                            command_for(route)
                        );
                    }
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Missed session events");
                }
                Err(_) => break,
            }
        }
    }
}

/// CLI subcommand that shows a route
pub fn command_for(route: Route) -> &'static str {
    match route {
        Route::Login => "login",
        Route::Register => "register",
        Route::ForgotPassword => "forgot-password",
        Route::ResetPassword => "reset-password",
        Route::Dashboard => "dashboard",
        Route::ChangePassword => "change-password",
    }
}
