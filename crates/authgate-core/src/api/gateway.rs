//! Request gateway: the single choke point for every API call.
//!
//! Two cross-cutting policies apply to requests sent with `AuthPolicy::Session`:
//!
//! 1. The current access token is attached as a bearer credential.
//! 2. A 401 triggers one refresh-and-retry. The request is marked retried,
//!    the refresh endpoint is called with the refresh token, and on success
//!    the original request is redelivered with the new access token. On
//!    failure the session is cleared, `SessionEvent::Expired` is broadcast,
//!    and the caller gets the original 401.
//!
//! Concurrent 401s share a single in-flight refresh. Every other status and
//! every network error is returned to the caller untouched.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::{header, Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::ApiError;
use crate::auth::SessionStore;
use crate::config::Config;
use crate::models::RefreshResponse;
use crate::utils::mask_token;

/// Refresh endpoint, relative to the API base
const REFRESH_PATH: &str = "/auth/refresh";

/// Buffered session events per subscriber before the oldest are dropped
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Session lifecycle notifications for the navigation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Login or registration stored a new token pair
    SignedIn,
    /// A 401 was recovered with a fresh access token
    Refreshed,
    /// Refresh was impossible or rejected; the session has been cleared
    Expired { reason: RefreshFailure },
    /// Explicit logout
    LoggedOut,
}

/// Why a refresh attempt could not produce a new access token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshFailure {
    MissingRefreshToken,
    Rejected { status: u16 },
    Network(String),
    InvalidResponse(String),
}

impl fmt::Display for RefreshFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshFailure::MissingRefreshToken => write!(f, "no refresh token stored"),
            RefreshFailure::Rejected { status } => write!(f, "refresh rejected with status {}", status),
            RefreshFailure::Network(e) => write!(f, "network error during refresh: {}", e),
            RefreshFailure::InvalidResponse(e) => write!(f, "invalid refresh response: {}", e),
        }
    }
}

/// Whether a request carries the session's credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPolicy {
    /// Attach the access token and run refresh-and-retry on 401
    Session,
    /// Send without a credential; a 401 is an ordinary error
    Anonymous,
}

/// An outbound call plus its retried flag.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    body: Option<serde_json::Value>,
    auth: AuthPolicy,
    retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            auth: AuthPolicy::Session,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn json<B: Serialize>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to encode request body: {}", e)))?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn anonymous(mut self) -> Self {
        self.auth = AuthPolicy::Anonymous;
        self
    }

}

type RefreshOutcome = Result<String, RefreshFailure>;
type RefreshFuture = Shared<BoxFuture<'static, RefreshOutcome>>;

struct GatewayInner {
    client: Client,
    base_url: String,
    session: SessionStore,
    /// Refresh currently in flight, tagged with a generation so a settling
    /// task only clears its own entry
    in_flight: Mutex<Option<(u64, RefreshFuture)>>,
    next_generation: Mutex<u64>,
    events: broadcast::Sender<SessionEvent>,
}

/// Clone is cheap - clones share the HTTP pool, the session and the event channel.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

impl Gateway {
    pub fn new(config: &Config, session: SessionStore) -> Result<Self, ApiError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .default_headers(headers)
            .build()?;
        Ok(Self::with_client(client, config.api_base(), session))
    }

    /// Build around an existing client; `base_url` is the API root (`.../api`)
    pub fn with_client(client: Client, base_url: &str, session: SessionStore) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(GatewayInner {
                client,
                base_url: base_url.trim_end_matches('/').to_string(),
                session,
                in_flight: Mutex::new(None),
                next_generation: Mutex::new(0),
                events,
            }),
        }
    }

    pub fn session(&self) -> &SessionStore {
        &self.inner.session
    }

    /// Receive session events (expiry, refresh, sign-in/out)
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.inner.base_url, path)
    }

    /// Send a request and decode its JSON body.
    pub async fn send<T: DeserializeOwned>(&self, mut request: ApiRequest) -> Result<T, ApiError> {
        loop {
            let token = match request.auth {
                AuthPolicy::Session => self.inner.session.access_token(),
                AuthPolicy::Anonymous => None,
            };

            let response = self.dispatch(&request, token.as_deref()).await?;
            let status = response.status();
            if status.as_u16() < 400 {
                return Self::parse_body(response, &request.path).await;
            }

            let body = response.text().await.unwrap_or_default();
            let error = ApiError::from_status(status, &body);

            if status == StatusCode::UNAUTHORIZED
                && request.auth == AuthPolicy::Session
                && !request.retried
            {
                request.retried = true;
                if self.recover(token.as_deref()).await {
                    debug!(path = %request.path, "Redelivering request after refresh");
                    continue;
                }
            } else {
                debug!(path = %request.path, status = status.as_u16(), retried = request.retried, "Request failed");
            }
            return Err(error);
        }
    }

    async fn dispatch(&self, request: &ApiRequest, token: Option<&str>) -> Result<Response, ApiError> {
        let mut builder = self
            .inner
            .client
            .request(request.method.clone(), self.url(&request.path));
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        debug!(
            method = %request.method,
            path = %request.path,
            token = %token.map(mask_token).unwrap_or_default(),
            retried = request.retried,
            "Sending request"
        );
        builder.send().await.map_err(|e| {
            warn!(path = %request.path, error = %e, "Request did not complete");
            ApiError::Network(e)
        })
    }

    async fn parse_body<T: DeserializeOwned>(response: Response, path: &str) -> Result<T, ApiError> {
        let text = response.text().await?;
        let text = if text.trim().is_empty() { "null" } else { text.as_str() };
        serde_json::from_str(text)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response from {}: {}", path, e)))
    }

    /// Decide whether a 401 can be retried. `rejected` is the token the
    /// failed attempt carried.
    async fn recover(&self, rejected: Option<&str>) -> bool {
        let current = self.inner.session.access_token();
        if current.is_some() && current.as_deref() != rejected {
            // Another call already refreshed while this one was in flight
            debug!("Access token changed since dispatch, retrying without refresh");
            return true;
        }
        self.refresh().await.is_ok()
    }

    /// Obtain a new access token, joining any refresh already in flight.
    ///
    /// On success the token is stored in the session. On failure the session
    /// has been cleared and `SessionEvent::Expired` broadcast. The refresh runs
    /// as its own task, so it settles even if every caller awaiting it is dropped.
    pub async fn refresh(&self) -> Result<String, RefreshFailure> {
        let flight = {
            let mut slot = self.inner.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            match slot.as_ref() {
                Some((generation, flight)) => {
                    debug!(generation, "Joining in-flight token refresh");
                    flight.clone()
                }
                None => {
                    let generation = {
                        let mut next = self.inner.next_generation.lock().unwrap_or_else(|e| e.into_inner());
                        *next += 1;
                        *next
                    };
                    let task = tokio::spawn(Self::run_refresh(self.inner.clone(), generation));
                    let flight = task
                        .map(|joined| {
                            joined.unwrap_or_else(|e| {
                                Err(RefreshFailure::Network(format!("refresh task failed: {}", e)))
                            })
                        })
                        .boxed()
                        .shared();
                    *slot = Some((generation, flight.clone()));
                    flight
                }
            }
        };

        flight.await
    }

    async fn run_refresh(inner: Arc<GatewayInner>, generation: u64) -> RefreshOutcome {
        let outcome = Self::request_access_token(&inner).await;
        match outcome {
            Ok(ref token) => {
                if let Err(e) = inner.session.set_access_token(token.clone()) {
                    warn!(error = %e, "Failed to persist refreshed access token");
                }
                info!("Access token refreshed");
                let _ = inner.events.send(SessionEvent::Refreshed);
            }
            Err(ref failure) => {
                warn!(reason = %failure, "Token refresh failed, clearing session");
                inner.session.clear();
                let _ = inner.events.send(SessionEvent::Expired {
                    reason: failure.clone(),
                });
            }
        }
        Self::settle(&inner, generation);
        outcome
    }

    /// Release the in-flight slot if it still holds this generation's refresh
    fn settle(inner: &GatewayInner, generation: u64) {
        let mut slot = inner.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if matches!(slot.as_ref(), Some((current, _)) if *current == generation) {
            *slot = None;
        }
    }

    async fn request_access_token(inner: &GatewayInner) -> RefreshOutcome {
        let refresh_token = inner
            .session
            .refresh_token()
            .ok_or(RefreshFailure::MissingRefreshToken)?;

        let url = format!("{}{}", inner.base_url, REFRESH_PATH);
        debug!(refresh_token = %mask_token(&refresh_token), "Requesting new access token");
        let response = inner
            .client
            .post(&url)
            .bearer_auth(&refresh_token)
            .send()
            .await
            .map_err(|e| RefreshFailure::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RefreshFailure::Rejected {
                status: status.as_u16(),
            });
        }

        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|e| RefreshFailure::InvalidResponse(e.to_string()))?;
        Ok(body.access_token)
    }
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("base_url", &self.inner.base_url)
            .field("session", &self.inner.session)
            .finish()
    }
}
