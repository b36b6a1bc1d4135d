//! Authgate - sign in, register and manage your account from the terminal.
//!
//! Each subcommand is one page of the account front end. The stored session
//! is resolved first, then the page's route guard decides whether it runs.

mod app;
mod pages;
mod prompt;

use std::io;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use app::App;
use authgate_core::Route;

/// Directory for a daily rolling log file (stderr only when unset)
const ENV_LOG_DIR: &str = "AUTHGATE_LOG_DIR";

#[derive(Parser)]
#[command(name = "authgate", version, about = "Sign in, register and manage your account")]
struct Cli {
    /// API base URL, e.g. https://accounts.example.com/api
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in with your username or email
    Login {
        #[arg(long)]
        login_id: Option<String>,
    },
    /// Create an account
    Register {
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Email yourself a password reset link
    ForgotPassword {
        #[arg(long)]
        email: Option<String>,
    },
    /// Set a new password from a reset link
    ResetPassword {
        /// Token from the reset link
        #[arg(long, conflicts_with = "link")]
        token: Option<String>,
        /// The full reset link from the email
        #[arg(long)]
        link: Option<String>,
    },
    /// Change your password
    ChangePassword,
    /// Show your account
    Dashboard {
        /// Print the profile as JSON
        #[arg(long)]
        json: bool,
    },
    /// Sign out
    Logout,
}

impl Command {
    fn route(&self) -> Route {
        match self {
            Command::Login { .. } => Route::Login,
            Command::Register { .. } => Route::Register,
            Command::ForgotPassword { .. } => Route::ForgotPassword,
            Command::ResetPassword { .. } => Route::ResetPassword,
            Command::ChangePassword => Route::ChangePassword,
            Command::Dashboard { .. } | Command::Logout => Route::Dashboard,
        }
    }
}

/// Initialize the tracing subscriber for logging
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr_layer = fmt::layer().with_writer(io::stderr);

    match std::env::var(ENV_LOG_DIR) {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "authgate.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(stderr_layer)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .with(filter)
                .init();
            Some(guard)
        }
        _ => {
            tracing_subscriber::registry()
                .with(stderr_layer)
                .with(filter)
                .init();
            None
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut app = App::new(cli.api_url)?;
    app.start().await;

    if !app.enter(cli.command.route()) {
        return Ok(());
    }

    let result = match cli.command {
        Command::Login { login_id } => pages::login(&mut app, login_id).await,
        Command::Register { username, email } => pages::register(&mut app, username, email).await,
        Command::ForgotPassword { email } => pages::forgot_password(&mut app, email).await,
        Command::ResetPassword { token, link } => pages::reset_password(&mut app, token, link).await,
        Command::ChangePassword => pages::change_password(&mut app).await,
        Command::Dashboard { json } => pages::dashboard(&mut app, json).await,
        Command::Logout => pages::logout(&mut app).await,
    };

    app.drain_session_events();
    result
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _log_guard = init_tracing();
    info!("authgate starting");

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
