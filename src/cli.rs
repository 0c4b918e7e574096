//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::accounts::{DEFAULT_PASSWORD_COST, LoginIdentifier};
use crate::auth::ClientIpHeader;
use crate::contact::LogRelay;
use crate::db::Database;
use crate::rate_limit::RateLimitConfig;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use url::Url;

const MIN_JWT_SECRET_LENGTH: usize = 32;

const ACCESS_SECRET_ENV: &str = "JWT_SECRET_KEY";
const REFRESH_SECRET_ENV: &str = "JWT_REFRESH_SECRET_KEY";

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "oakshelf", about = "Furniture catalog API")]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "4000")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, default_value = "oakshelf.db")]
    pub database: String,

    /// Path to file containing the access token secret. Prefer the JWT_SECRET_KEY env var
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Path to file containing the refresh token secret. Prefer the JWT_REFRESH_SECRET_KEY env var
    #[arg(long)]
    pub jwt_refresh_secret_file: Option<String>,

    /// Frontend origin allowed to call the API with credentials
    #[arg(long, default_value = "http://localhost:3000", value_parser = validate_origin)]
    pub cors_origin: Url,

    /// Set the Secure flag on the refresh cookie (use behind HTTPS)
    #[arg(long)]
    pub secure_cookies: bool,

    /// What users log in with
    #[arg(long, value_enum, default_value = "email")]
    pub login_identifier: LoginIdentifier,

    /// Take the client IP from this proxy header instead of the socket address
    #[arg(long, value_enum)]
    pub ip_header: Option<ClientIpHeader>,

    /// Address contact form messages are addressed to
    #[arg(long, env = "CONTACT_RECIPIENT", default_value = "owner@localhost")]
    pub contact_recipient: String,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

fn validate_origin(s: &str) -> Result<Url, String> {
    let url = Url::parse(s).map_err(|e| format!("Invalid origin URL {}: {}", s, e))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("Origin must use http or https: {}", s));
    }
    if url.host_str().is_none() {
        return Err(format!("Origin must have a host: {}", s));
    }
    Ok(url)
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load one JWT secret from an environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
fn load_secret(env_var: &str, file: Option<&str>, flag: &str) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var(env_var) {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var(env_var) };
        secret
    } else if let Some(path) = file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "{} is required. Set the environment variable (recommended) or use {}",
            env_var, flag
        );
        return None;
    };

    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "{} is shorter than {} characters. Use a longer secret",
            env_var, MIN_JWT_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Load the access and refresh secrets. They must differ.
pub fn load_jwt_secrets(
    access_file: Option<&str>,
    refresh_file: Option<&str>,
) -> Option<(String, String)> {
    let access = load_secret(ACCESS_SECRET_ENV, access_file, "--jwt-secret-file")?;
    let refresh = load_secret(
        REFRESH_SECRET_ENV,
        refresh_file,
        "--jwt-refresh-secret-file",
    )?;

    if access == refresh {
        error!("Access and refresh token secrets must be different");
        return None;
    }

    Some((access, refresh))
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    args: &Args,
    db: Database,
    access_secret: String,
    refresh_secret: String,
) -> ServerConfig {
    ServerConfig {
        db,
        access_secret: access_secret.into_bytes(),
        refresh_secret: refresh_secret.into_bytes(),
        secure_cookies: args.secure_cookies,
        login_identifier: args.login_identifier,
        password_cost: DEFAULT_PASSWORD_COST,
        cors_origin: Some(args.cors_origin.clone()),
        ip_header: args.ip_header,
        rate_limits: RateLimitConfig::new(),
        contact_relay: Arc::new(LogRelay::new(args.contact_recipient.clone())),
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
