//! One function per page. Each collects its form, lets the core validate and
//! submit it, and prints either the inline error or the success view.

use anyhow::{bail, Result};
use tracing::{error, info};

use authgate_core::forms::{
    ChangePasswordForm, ForgotPasswordForm, LoginForm, RegisterForm, ResetPasswordForm,
};
use authgate_core::utils::format_timestamp;
use authgate_core::{ApiError, UserProfile};

use crate::app::{App, ENV_LOGIN_ID, ENV_PASSWORD};
use crate::prompt::{prompt_line, prompt_password, value_or_prompt};

const LOGIN_FAILED: &str = "Login failed, please try again";
const REGISTER_FAILED: &str = "Registration failed, please try again";
const FORGOT_FAILED: &str = "Could not send the email, please try again later";
const RESET_FAILED: &str = "Reset failed, the link may have expired";
const CHANGE_FAILED: &str = "Could not change the password, please try again";

/// Turn an API error into the page's inline error
fn inline_error(e: ApiError, fallback: &str) -> anyhow::Error {
    if !matches!(e, ApiError::Validation(_)) {
        error!(error = %e, "Request failed");
    }
    anyhow::anyhow!(e.user_message_or(fallback))
}

pub async fn login(app: &mut App, login_id: Option<String>) -> Result<()> {
    let last = app.config.last_login_id.clone();
    let login_id = match login_id.or_else(|| std::env::var(ENV_LOGIN_ID).ok()) {
        Some(id) => id,
        None => prompt_line("Username or email", last.as_deref())?,
    };
    let password = match std::env::var(ENV_PASSWORD) {
        Ok(p) => p,
        Err(_) => prompt_password("Password")?,
    };

    let form = LoginForm { login_id, password };
    let user = app
        .client
        .login(&form)
        .await
        .map_err(|e| inline_error(e, LOGIN_FAILED))?;

    app.remember_login_id(form.login_id.trim());
    info!(user = %user.username, "Login successful");
    println!("Signed in.\n");
    render_dashboard(&user);
    Ok(())
}

pub async fn register(app: &mut App, username: Option<String>, email: Option<String>) -> Result<()> {
    let username = value_or_prompt(username, "Username", None)?;
    let email = value_or_prompt(email, "Email", None)?;
    let password = prompt_password("Password (at least 6 characters)")?;
    let confirm_password = prompt_password("Confirm password")?;

    let form = RegisterForm {
        username,
        email,
        password,
        confirm_password,
    };
    let user = app
        .client
        .register(&form)
        .await
        .map_err(|e| inline_error(e, REGISTER_FAILED))?;

    app.remember_login_id(&user.username);
    println!("Account created.\n");
    render_dashboard(&user);
    Ok(())
}

pub async fn forgot_password(app: &mut App, email: Option<String>) -> Result<()> {
    let email = value_or_prompt(email, "Email", None)?;
    let form = ForgotPasswordForm { email };
    let message = app
        .client
        .forgot_password(&form)
        .await
        .map_err(|e| inline_error(e, FORGOT_FAILED))?;

    println!("Check your inbox");
    if message.is_empty() {
        println!("If that address is registered, a reset link is on its way.");
    } else {
        println!("{}", message);
    }
    println!("Then run `authgate reset-password --link <url from the email>`.");
    Ok(())
}

pub async fn reset_password(app: &mut App, token: Option<String>, link: Option<String>) -> Result<()> {
    let token = token.or_else(|| link.as_deref().and_then(ResetPasswordForm::token_from_link));
    let mut form = ResetPasswordForm {
        token,
        ..Default::default()
    };

    if form.is_invalid_link() {
        println!("Invalid link");
        println!("This password reset link is invalid or has expired.");
        println!("Request a new one with `authgate forgot-password`.");
        bail!("Invalid reset link");
    }

    form.new_password = prompt_password("New password (at least 6 characters)")?;
    form.confirm_password = prompt_password("Confirm new password")?;

    let message = app
        .client
        .reset_password(&form)
        .await
        .map_err(|e| inline_error(e, RESET_FAILED))?;

    println!("Password reset");
    if !message.is_empty() {
        println!("{}", message);
    }
    println!("Sign in with your new password: `authgate login`.");
    Ok(())
}

pub async fn change_password(app: &mut App) -> Result<()> {
    let form = ChangePasswordForm {
        old_password: prompt_password("Current password")?,
        new_password: prompt_password("New password (at least 6 characters)")?,
        confirm_password: prompt_password("Confirm new password")?,
    };

    app.client
        .change_password(&form)
        .await
        .map_err(|e| inline_error(e, CHANGE_FAILED))?;

    println!("Password changed.");
    Ok(())
}

pub async fn dashboard(app: &mut App, json: bool) -> Result<()> {
    let user = match app.session().user() {
        Some(user) => user,
        None => app
            .client
            .refresh_user()
            .await
            .map_err(|e| inline_error(e, "Could not load your profile"))?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&user)?);
    } else {
        render_dashboard(&user);
    }
    Ok(())
}

pub async fn logout(app: &mut App) -> Result<()> {
    app.client.logout().await;
    println!("Signed out.");
    Ok(())
}

fn render_dashboard(user: &UserProfile) {
    println!("Welcome back, {}!", user.username);
    println!();
    println!("Account");
    println!("  Username      {}", user.username);
    println!("  Email         {}", user.email);
    println!("  Role          {}", user.role);
    println!("  Status        {}", user.status_display());
    println!("  Member since  {}", format_timestamp(user.created_at.as_ref()));
    println!();
    println!("`authgate change-password` to change your password, `authgate logout` to sign out.");
}
