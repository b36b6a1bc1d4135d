//! Data models for the account API.
//!
//! - `UserProfile`, `Role`: the cached profile of the signed-in user
//! - Request/response payloads for every `/auth/*` and `/user/*` endpoint

pub mod auth;
pub mod user;

pub use auth::{
    AuthResponse, ChangePasswordRequest, ErrorBody, ForgotPasswordRequest, LoginRequest,
    MessageResponse, ProfileResponse, RefreshResponse, RegisterRequest, ResetPasswordRequest,
};
pub use user::{Role, UserProfile};
