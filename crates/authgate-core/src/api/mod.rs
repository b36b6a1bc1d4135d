//! REST API client module for the account service.
//!
//! This module provides the `Gateway` that every call passes through
//! (bearer attachment, one refresh-and-retry on 401) and the `AuthClient`
//! with one method per `/auth/*` and `/user/*` endpoint.

pub mod client;
pub mod error;
pub mod gateway;

pub use client::AuthClient;
pub use error::ApiError;
pub use gateway::{ApiRequest, AuthPolicy, Gateway, RefreshFailure, SessionEvent};
