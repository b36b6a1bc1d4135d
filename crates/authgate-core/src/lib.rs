//! Authgate core library.
//!
//! Client-side session and token lifecycle for the authgate account API:
//!
//! - `auth`: token persistence backends and the `SessionStore`
//! - `api`: the request `Gateway` (bearer attach + refresh-and-retry) and the
//!   typed `AuthClient` built on top of it
//! - `forms`: local field validation run before any network call
//! - `guard`: route table and the protected / guest-only guards
//! - `models`: user profile and wire payloads
//!
//! Front ends (the `authgate` CLI, a web shell) own presentation and navigation;
//! they hold one `SessionStore` and one `AuthClient` built from the same store.

pub mod api;
pub mod auth;
pub mod config;
pub mod forms;
pub mod guard;
pub mod models;
pub mod utils;

pub use api::{ApiError, AuthClient, Gateway, SessionEvent};
pub use auth::{LoadStatus, SessionSnapshot, SessionStore, TokenKey, TokenStore};
pub use config::{Config, TokenBackend};
pub use forms::ValidationError;
pub use guard::{Guard, GuardDecision, Navigator, Route};
pub use models::{Role, UserProfile};
