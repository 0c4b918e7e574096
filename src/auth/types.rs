//! Authentication user types.

use crate::db::UserRole;
use crate::jwt::AccessClaims;

/// Identity attached to an authorized request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    /// Public user UUID
    pub user_id: String,
    pub user_name: String,
    pub role: UserRole,
}

impl From<AccessClaims> for AuthenticatedUser {
    fn from(claims: AccessClaims) -> Self {
        Self {
            user_id: claims.payload.user_id,
            user_name: claims.payload.user_name,
            role: claims.payload.role,
        }
    }
}
