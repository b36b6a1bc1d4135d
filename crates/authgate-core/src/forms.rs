//! Form input and local field validation.
//!
//! Each form validates synchronously into its wire request. A form that fails
//! validation never reaches the network.

use thiserror::Error;
use url::Url;

use crate::models::{
    ChangePasswordRequest, ForgotPasswordRequest, LoginRequest, RegisterRequest,
    ResetPasswordRequest,
};

/// Minimum password length, in characters
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Minimum username length, in characters
pub const MIN_USERNAME_LENGTH: usize = 3;

/// Query parameter carrying the reset token in emailed links
const RESET_TOKEN_PARAM: &str = "token";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please enter your username/email and password")]
    MissingCredentials,

    #[error("Please enter a username")]
    UsernameRequired,

    #[error("Username must be at least {min} characters")]
    UsernameTooShort { min: usize },

    #[error("Please enter an email address")]
    EmailRequired,

    #[error("Please enter a password")]
    PasswordRequired,

    #[error("Password must be at least {min} characters")]
    PasswordTooShort { min: usize },

    #[error("Passwords do not match")]
    PasswordMismatch,

    #[error("Please enter your current password")]
    OldPasswordRequired,

    #[error("New password must differ from the current password")]
    PasswordUnchanged,

    #[error("This password reset link is invalid or has expired")]
    InvalidResetLink,
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn check_new_password(password: &str, confirm: &str) -> Result<(), ValidationError> {
    if char_len(password) < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::PasswordTooShort {
            min: MIN_PASSWORD_LENGTH,
        });
    }
    if password != confirm {
        return Err(ValidationError::PasswordMismatch);
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct LoginForm {
    /// Username or email
    pub login_id: String,
    pub password: String,
}

impl LoginForm {
    pub fn validate(&self) -> Result<LoginRequest, ValidationError> {
        let login_id = self.login_id.trim();
        if login_id.is_empty() || self.password.is_empty() {
            return Err(ValidationError::MissingCredentials);
        }
        Ok(LoginRequest {
            login_id: login_id.to_string(),
            password: self.password.clone(),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegisterForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl RegisterForm {
    pub fn validate(&self) -> Result<RegisterRequest, ValidationError> {
        let username = self.username.trim();
        if username.is_empty() {
            return Err(ValidationError::UsernameRequired);
        }
        if char_len(username) < MIN_USERNAME_LENGTH {
            return Err(ValidationError::UsernameTooShort {
                min: MIN_USERNAME_LENGTH,
            });
        }
        let email = self.email.trim();
        if email.is_empty() {
            return Err(ValidationError::EmailRequired);
        }
        if self.password.is_empty() {
            return Err(ValidationError::PasswordRequired);
        }
        check_new_password(&self.password, &self.confirm_password)?;

        Ok(RegisterRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: self.password.clone(),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ForgotPasswordForm {
    pub email: String,
}

impl ForgotPasswordForm {
    pub fn validate(&self) -> Result<ForgotPasswordRequest, ValidationError> {
        let email = self.email.trim();
        if email.is_empty() {
            return Err(ValidationError::EmailRequired);
        }
        Ok(ForgotPasswordRequest {
            email: email.to_string(),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResetPasswordForm {
    /// `None` (or empty) renders the "invalid link" state
    pub token: Option<String>,
    pub new_password: String,
    pub confirm_password: String,
}

impl ResetPasswordForm {
    /// Pull the reset token out of an emailed link such as
    /// `https://app.example.com/reset-password?token=abc`.
    /// Unparseable links and links without a token yield `None`.
    pub fn token_from_link(link: &str) -> Option<String> {
        let url = Url::parse(link.trim()).ok()?;
        url.query_pairs()
            .find(|(key, _)| *key == RESET_TOKEN_PARAM)
            .map(|(_, value)| value.into_owned())
            .filter(|token| !token.is_empty())
    }

    /// True when the link carried no usable token; no request can be made
    pub fn is_invalid_link(&self) -> bool {
        self.token.as_deref().map_or(true, |t| t.trim().is_empty())
    }

    pub fn validate(&self) -> Result<ResetPasswordRequest, ValidationError> {
        let token = match self.token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => token,
            _ => return Err(ValidationError::InvalidResetLink),
        };
        check_new_password(&self.new_password, &self.confirm_password)?;
        Ok(ResetPasswordRequest {
            token: token.to_string(),
            new_password: self.new_password.clone(),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChangePasswordForm {
    pub old_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

impl ChangePasswordForm {
    pub fn validate(&self) -> Result<ChangePasswordRequest, ValidationError> {
        if self.old_password.is_empty() {
            return Err(ValidationError::OldPasswordRequired);
        }
        check_new_password(&self.new_password, &self.confirm_password)?;
        if self.old_password == self.new_password {
            return Err(ValidationError::PasswordUnchanged);
        }
        Ok(ChangePasswordRequest {
            old_password: self.old_password.clone(),
            new_password: self.new_password.clone(),
        })
    }
}
