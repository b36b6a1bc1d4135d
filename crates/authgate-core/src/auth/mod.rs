//! Authentication module for the client-side session.
//!
//! This module provides:
//! - `SessionStore`: the token pair plus cached profile, shared by every consumer
//! - `TokenStore`: pluggable persistence (memory, file, OS keychain)
//!
//! `is_authenticated()` is the only logged-in signal; token validity is
//! discovered lazily when a protected call comes back 401.

pub mod session;
pub mod store;

pub use session::{LoadStatus, SessionSnapshot, SessionStore};
pub use store::{
    token_store_for, FileTokenStore, KeyringTokenStore, MemoryTokenStore, TokenKey, TokenStore,
};
