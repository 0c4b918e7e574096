//! Minting access/refresh pairs for an authenticated user.

use crate::db::{Database, User};
use crate::jwt::{AccessPayload, IssuedToken, JwtConfig, JwtError, unix_now};

/// A freshly minted credential pair. The refresh token is already stored.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

/// Errors that can occur while issuing a pair.
#[derive(Debug)]
pub enum IssueError {
    /// Signing failed
    Token(JwtError),
    /// Writing the refresh token failed
    Storage(sqlx::Error),
    /// The user row disappeared before the refresh token could be attached
    UserMissing,
}

impl std::fmt::Display for IssueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IssueError::Token(e) => write!(f, "Failed to sign token: {}", e),
            IssueError::Storage(e) => write!(f, "Failed to store refresh token: {}", e),
            IssueError::UserMissing => write!(f, "User no longer exists"),
        }
    }
}

impl std::error::Error for IssueError {}

impl From<JwtError> for IssueError {
    fn from(e: JwtError) -> Self {
        IssueError::Token(e)
    }
}

impl From<sqlx::Error> for IssueError {
    fn from(e: sqlx::Error) -> Self {
        IssueError::Storage(e)
    }
}

/// Access payload for a stored user.
pub fn access_payload(user: &User) -> AccessPayload {
    AccessPayload {
        user_id: user.uuid.clone(),
        user_name: user.user_name.clone(),
        role: user.role,
    }
}

/// Mint a new pair for `user` and make its refresh token the user's only live
/// session. Any previously stored refresh token stops working.
pub async fn issue_for(
    jwt: &JwtConfig,
    db: &Database,
    user: &User,
) -> Result<TokenPair, IssueError> {
    issue_for_at(jwt, db, user, unix_now()?).await
}

/// Like [`issue_for`] with an explicit clock value.
pub async fn issue_for_at(
    jwt: &JwtConfig,
    db: &Database,
    user: &User,
    now: u64,
) -> Result<TokenPair, IssueError> {
    let access = jwt.issue_access_at(access_payload(user), now)?;
    let refresh = jwt.issue_refresh_at(&user.uuid, now)?;

    let expires_at = i64::try_from(refresh.expires_at).map_err(|_| JwtError::TimeError)?;
    let attached = db
        .sessions()
        .attach_refresh_token(user.id, &refresh.token, expires_at)
        .await?;
    if !attached {
        return Err(IssueError::UserMissing);
    }

    Ok(TokenPair { access, refresh })
}
