//! API client for the account service.
//!
//! `AuthClient` exposes one method per endpoint. Form-driven calls validate
//! locally first, so a bad form never reaches the network. Every call goes
//! through the `Gateway`, which owns credential attachment and refresh.

use tokio::sync::broadcast;
use tracing::{info, warn};

use super::gateway::{ApiRequest, Gateway, SessionEvent};
use super::ApiError;
use crate::auth::{SessionSnapshot, SessionStore};
use crate::config::Config;
use crate::forms::{
    ChangePasswordForm, ForgotPasswordForm, LoginForm, RegisterForm, ResetPasswordForm,
};
use crate::models::{AuthResponse, MessageResponse, ProfileResponse, UserProfile};

const REGISTER_PATH: &str = "/auth/register";
const LOGIN_PATH: &str = "/auth/login";
const LOGOUT_PATH: &str = "/auth/logout";
const CHANGE_PASSWORD_PATH: &str = "/auth/change-password";
const FORGOT_PASSWORD_PATH: &str = "/auth/forgot-password";
const RESET_PASSWORD_PATH: &str = "/auth/reset-password";
const PROFILE_PATH: &str = "/user/profile";

/// Clone is cheap - the gateway and session are shared handles.
#[derive(Clone, Debug)]
pub struct AuthClient {
    gateway: Gateway,
}

impl AuthClient {
    pub fn new(config: &Config, session: SessionStore) -> Result<Self, ApiError> {
        Ok(Self {
            gateway: Gateway::new(config, session)?,
        })
    }

    pub fn with_gateway(gateway: Gateway) -> Self {
        Self { gateway }
    }

    pub fn session(&self) -> &SessionStore {
        self.gateway.session()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.gateway.subscribe()
    }

    /// Resolve the stored session at startup: confirm the persisted access
    /// token by fetching the profile, falling back to logged-out on any error.
    pub async fn load_session(&self) -> SessionSnapshot {
        self.session().load(|| self.profile()).await
    }

    /// Create an account and sign in with it
    pub async fn register(&self, form: &RegisterForm) -> Result<UserProfile, ApiError> {
        let body = form.validate()?;
        let request = ApiRequest::post(REGISTER_PATH).json(&body)?.anonymous();
        let resp: AuthResponse = self.gateway.send(request).await?;
        info!(user = %resp.user.username, "Registered");
        self.establish(resp)
    }

    /// Sign in with a username or email
    pub async fn login(&self, form: &LoginForm) -> Result<UserProfile, ApiError> {
        let body = form.validate()?;
        let request = ApiRequest::post(LOGIN_PATH).json(&body)?.anonymous();
        let resp: AuthResponse = self.gateway.send(request).await?;
        info!(user = %resp.user.username, "Logged in");
        self.establish(resp)
    }

    fn establish(&self, resp: AuthResponse) -> Result<UserProfile, ApiError> {
        let user = resp.user.clone();
        self.session()
            .set_session(resp.access_token, resp.refresh_token, resp.user)?;
        self.gateway.emit(SessionEvent::SignedIn);
        Ok(user)
    }

    /// Revoke the token server-side and clear local state.
    /// The server call failing does not stop the local sign-out.
    pub async fn logout(&self) {
        if self.session().is_authenticated() {
            let result: Result<MessageResponse, ApiError> =
                self.gateway.send(ApiRequest::post(LOGOUT_PATH)).await;
            if let Err(e) = result {
                warn!(error = %e, "Logout request failed, clearing local session anyway");
            }
        }
        self.session().clear();
        self.gateway.emit(SessionEvent::LoggedOut);
        info!("Logged out");
    }

    pub async fn change_password(&self, form: &ChangePasswordForm) -> Result<String, ApiError> {
        let body = form.validate()?;
        let request = ApiRequest::post(CHANGE_PASSWORD_PATH).json(&body)?;
        let resp: MessageResponse = self.gateway.send(request).await?;
        info!("Password changed");
        Ok(resp.message)
    }

    /// Ask for a reset email. The server answers the same way whether or not
    /// the address is registered.
    pub async fn forgot_password(&self, form: &ForgotPasswordForm) -> Result<String, ApiError> {
        let body = form.validate()?;
        let request = ApiRequest::post(FORGOT_PASSWORD_PATH).json(&body)?.anonymous();
        let resp: MessageResponse = self.gateway.send(request).await?;
        Ok(resp.message)
    }

    pub async fn reset_password(&self, form: &ResetPasswordForm) -> Result<String, ApiError> {
        let body = form.validate()?;
        let request = ApiRequest::post(RESET_PASSWORD_PATH).json(&body)?.anonymous();
        let resp: MessageResponse = self.gateway.send(request).await?;
        info!("Password reset");
        Ok(resp.message)
    }

    /// Fetch the current user's profile
    pub async fn profile(&self) -> Result<UserProfile, ApiError> {
        let resp: ProfileResponse = self.gateway.send(ApiRequest::get(PROFILE_PATH)).await?;
        Ok(resp.user)
    }

    /// Re-fetch the profile and replace the cached copy
    pub async fn refresh_user(&self) -> Result<UserProfile, ApiError> {
        let user = self.profile().await?;
        self.session().set_user(user.clone());
        Ok(user)
    }
}
