//! Per-request authentication decision.
//!
//! A request is authorized by a valid bearer access token. Failing that, the
//! refresh cookie is checked against the single stored session of its owner
//! and, if it matches, a new access token is minted. The refresh token itself
//! is never rotated on this path.
//!
//! Deciding performs reads only. Writes and response changes are returned as
//! [`AuthEffect`]s and applied by the caller.

use tracing::{error, warn};

use super::errors::AuthErrorKind;
use super::issuer::access_payload;
use super::types::AuthenticatedUser;
use crate::db::{Database, User};
use crate::jwt::{IssuedToken, JwtConfig};

/// Side effect requested by a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEffect {
    /// Null the stored refresh token of this user
    ClearStoredRefreshToken { user_id: i64 },
    /// Send this renewed access token back in `X-New-Access-Token`
    ExposeAccessToken(String),
}

impl AuthEffect {
    /// Apply the effect. Returns the token to expose, if any.
    pub async fn apply(&self, db: &Database) -> Result<Option<String>, sqlx::Error> {
        match self {
            AuthEffect::ClearStoredRefreshToken { user_id } => {
                db.sessions().clear_refresh_token(*user_id).await?;
                Ok(None)
            }
            AuthEffect::ExposeAccessToken(token) => Ok(Some(token.clone())),
        }
    }
}

/// A decision plus the effects it requires.
#[derive(Debug)]
pub struct Outcome<T> {
    pub decision: Result<T, AuthErrorKind>,
    pub effects: Vec<AuthEffect>,
}

impl<T> Outcome<T> {
    fn reject(kind: AuthErrorKind) -> Self {
        Self {
            decision: Err(kind),
            effects: Vec::new(),
        }
    }
}

/// Result of a silent refresh: the session holder and their new access token.
#[derive(Debug)]
pub struct Renewal {
    pub user: User,
    pub access: IssuedToken,
}

pub type AuthOutcome = Outcome<AuthenticatedUser>;
pub type RefreshOutcome = Outcome<Renewal>;

/// Apply every effect in order. Returns the access token to expose, if any.
pub async fn apply_effects(
    db: &Database,
    effects: &[AuthEffect],
) -> Result<Option<String>, sqlx::Error> {
    let mut exposed = None;
    for effect in effects {
        if let Some(token) = effect.apply(db).await? {
            exposed = Some(token);
        }
    }
    Ok(exposed)
}

/// Decide whether a request is authorized.
pub async fn authenticate(
    jwt: &JwtConfig,
    db: &Database,
    access_token: Option<&str>,
    refresh_token: Option<&str>,
    now: u64,
) -> AuthOutcome {
    if let Some(token) = access_token {
        if let Ok(claims) = jwt.verify_access_at(token, now) {
            return Outcome {
                decision: Ok(AuthenticatedUser::from(claims)),
                effects: Vec::new(),
            };
        }
    }

    let Some(refresh_token) = refresh_token else {
        return Outcome::reject(AuthErrorKind::NotAuthenticated);
    };

    let RefreshOutcome {
        decision,
        mut effects,
    } = renew(jwt, db, refresh_token, now).await;

    match decision {
        Ok(renewal) => {
            effects.push(AuthEffect::ExposeAccessToken(renewal.access.token));
            Outcome {
                decision: Ok(AuthenticatedUser {
                    user_id: renewal.user.uuid,
                    user_name: renewal.user.user_name,
                    role: renewal.user.role,
                }),
                effects,
            }
        }
        Err(kind) => Outcome {
            decision: Err(kind),
            effects,
        },
    }
}

/// Check a refresh token against the stored session and mint a new access token.
pub async fn renew(
    jwt: &JwtConfig,
    db: &Database,
    refresh_token: &str,
    now: u64,
) -> RefreshOutcome {
    let holder = match db.sessions().find_by_refresh_token(refresh_token).await {
        Ok(holder) => holder,
        Err(e) => {
            error!(error = %e, "Failed to look up refresh token");
            return Outcome::reject(AuthErrorKind::Internal);
        }
    };

    let Some(user) = holder else {
        return Outcome::reject(classify_unknown(jwt, db, refresh_token, now).await);
    };

    let claims = match jwt.verify_refresh_at(refresh_token, now) {
        Ok(claims) => claims,
        Err(e) => {
            warn!(user_id = user.id, error = %e, "Stored refresh token failed verification");
            return Outcome {
                decision: Err(AuthErrorKind::InvalidRefreshToken),
                effects: vec![AuthEffect::ClearStoredRefreshToken { user_id: user.id }],
            };
        }
    };

    if claims.payload.user_id != user.uuid {
        warn!(user_id = user.id, "Refresh token claims name another user");
        return Outcome::reject(AuthErrorKind::IdentityMismatch);
    }

    match jwt.issue_access_at(access_payload(&user), now) {
        Ok(access) => Outcome {
            decision: Ok(Renewal { user, access }),
            effects: Vec::new(),
        },
        Err(e) => {
            error!(error = %e, "Failed to generate access token");
            Outcome::reject(AuthErrorKind::Internal)
        }
    }
}

/// A refresh token no user holds. Genuine tokens whose owner has no live
/// session (logged out) end the session; anything else was revoked.
async fn classify_unknown(
    jwt: &JwtConfig,
    db: &Database,
    refresh_token: &str,
    now: u64,
) -> AuthErrorKind {
    let Ok(claims) = jwt.verify_refresh_at(refresh_token, now) else {
        return AuthErrorKind::SessionRevoked;
    };

    match db.users().get_by_uuid(&claims.payload.user_id).await {
        Ok(Some(owner)) if owner.refresh_token.is_none() => AuthErrorKind::SessionEnded,
        Ok(_) => AuthErrorKind::SessionRevoked,
        Err(e) => {
            error!(error = %e, "Failed to look up refresh token owner");
            AuthErrorKind::Internal
        }
    }
}
