//! Registration, login and logout.

use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{IssueError, TokenPair, issue_for};
use crate::db::{Database, NewUser, User, UserRole};
use crate::jwt::JwtConfig;

/// Default bcrypt cost.
pub const DEFAULT_PASSWORD_COST: u32 = 10;

const MAX_USER_NAME_LENGTH: usize = 32;
const MAX_EMAIL_LENGTH: usize = 254;
const MIN_PASSWORD_LENGTH: usize = 8;

/// What a login identifier is matched against.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoginIdentifier {
    #[default]
    Email,
    Username,
    Either,
}

/// Errors from account operations.
#[derive(Debug)]
pub enum AccountError {
    /// Input failed validation
    Validation(&'static str),
    /// User name or email already taken
    Conflict,
    /// No user matches the login identifier
    UserNotFound,
    /// Password does not match
    InvalidCredentials,
    /// Password hashing failed
    Hashing(String),
    /// Database failure
    Storage(sqlx::Error),
    /// Token issuance failed
    Issue(IssueError),
}

impl std::fmt::Display for AccountError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountError::Validation(msg) => write!(f, "{}", msg),
            AccountError::Conflict => {
                write!(f, "User already exists with same username or email")
            }
            AccountError::UserNotFound => write!(f, "User not found"),
            AccountError::InvalidCredentials => write!(f, "Invalid credentials"),
            AccountError::Hashing(e) => write!(f, "Password hashing failed: {}", e),
            AccountError::Storage(e) => write!(f, "Database error: {}", e),
            AccountError::Issue(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for AccountError {}

impl From<sqlx::Error> for AccountError {
    fn from(e: sqlx::Error) -> Self {
        AccountError::Storage(e)
    }
}

impl From<IssueError> for AccountError {
    fn from(e: IssueError) -> Self {
        AccountError::Issue(e)
    }
}

/// Registration input.
#[derive(Debug, Clone)]
pub struct Registration {
    pub user_name: String,
    pub email: String,
    pub password: String,
    pub role: Option<UserRole>,
}

/// Successful login: the user and their new credential pair.
#[derive(Debug)]
pub struct LoginSession {
    pub user: User,
    pub tokens: TokenPair,
}

fn validate_user_name(user_name: &str) -> Result<(), AccountError> {
    if user_name.is_empty() {
        return Err(AccountError::Validation("userName is required"));
    }
    if user_name.chars().count() > MAX_USER_NAME_LENGTH {
        return Err(AccountError::Validation(
            "userName must be at most 32 characters",
        ));
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-');
    if !user_name.chars().all(allowed) {
        return Err(AccountError::Validation(
            "userName may only contain letters, digits, '_', '.' and '-'",
        ));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), AccountError> {
    if email.is_empty() {
        return Err(AccountError::Validation("email is required"));
    }
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(AccountError::Validation("email is too long"));
    }
    if !email.contains('@') {
        return Err(AccountError::Validation("email is invalid"));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), AccountError> {
    if password.is_empty() {
        return Err(AccountError::Validation("password is required"));
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AccountError::Validation(
            "password must be at least 8 characters",
        ));
    }
    Ok(())
}

/// Hash a password on the blocking pool.
pub async fn hash_password(password: String, cost: u32) -> Result<String, AccountError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AccountError::Hashing(e.to_string()))?
        .map_err(|e| AccountError::Hashing(e.to_string()))
}

/// Compare a password with a stored hash on the blocking pool.
pub async fn verify_password(password: String, hash: String) -> Result<bool, AccountError> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AccountError::Hashing(e.to_string()))?
        .map_err(|e| AccountError::Hashing(e.to_string()))
}

/// Create a new user. The password is stored as a salted bcrypt hash.
pub async fn register(
    db: &Database,
    password_cost: u32,
    registration: Registration,
) -> Result<User, AccountError> {
    let user_name = registration.user_name.trim();
    let email = registration.email.trim();
    validate_user_name(user_name)?;
    validate_email(email)?;
    validate_password(&registration.password)?;

    if db.users().exists_with_name_or_email(user_name, email).await? {
        return Err(AccountError::Conflict);
    }

    let password_hash = hash_password(registration.password, password_cost).await?;
    let uuid = Uuid::new_v4().to_string();

    let created = db
        .users()
        .create(&NewUser {
            uuid: &uuid,
            user_name,
            email,
            password_hash: &password_hash,
            role: registration.role.unwrap_or_default(),
        })
        .await;

    let id = match created {
        Ok(id) => id,
        // Lost a race with a concurrent registration
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            return Err(AccountError::Conflict);
        }
        Err(e) => return Err(e.into()),
    };

    let user = db
        .users()
        .get_by_id(id)
        .await?
        .ok_or(AccountError::Storage(sqlx::Error::RowNotFound))?;

    info!(user_id = %user.uuid, user_name = %user.user_name, "User registered");
    Ok(user)
}

/// Check a password and open a new session, replacing any earlier one.
pub async fn login(
    jwt: &JwtConfig,
    db: &Database,
    mode: LoginIdentifier,
    identifier: &str,
    password: &str,
) -> Result<LoginSession, AccountError> {
    let identifier = identifier.trim();
    if identifier.is_empty() || password.is_empty() {
        return Err(AccountError::Validation("identifier and password are required"));
    }

    let users = db.users();
    let user = match mode {
        LoginIdentifier::Email => users.get_by_email(identifier).await?,
        LoginIdentifier::Username => users.get_by_user_name(identifier).await?,
        LoginIdentifier::Either => users.get_by_user_name_or_email(identifier).await?,
    }
    .ok_or(AccountError::UserNotFound)?;

    if !verify_password(password.to_string(), user.password_hash.clone()).await? {
        warn!(user_id = %user.uuid, "Login with wrong password");
        return Err(AccountError::InvalidCredentials);
    }

    let tokens = issue_for(jwt, db, &user).await?;
    info!(user_id = %user.uuid, "User logged in");
    Ok(LoginSession { user, tokens })
}

/// End the session holding `refresh_token`. Unknown or already cleared tokens
/// succeed as well.
pub async fn logout(db: &Database, refresh_token: &str) -> Result<(), AccountError> {
    if db.sessions().clear_refresh_token_value(refresh_token).await? {
        info!("User logged out");
    }
    Ok(())
}
