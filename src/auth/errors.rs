//! Authentication error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use super::cookie::CookiePolicy;

/// Why a request was rejected by the authentication layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// No usable access token and no refresh cookie
    NotAuthenticated,
    /// Refresh token is genuine but its owner has no live session (logged out)
    SessionEnded,
    /// Refresh token is not the one currently stored (superseded or unknown)
    SessionRevoked,
    /// Stored refresh token failed verification
    InvalidRefreshToken,
    /// Refresh claims name a different user than the one holding the token
    IdentityMismatch,
    /// Storage or signing failure
    Internal,
}

/// API authentication errors. Returns JSON and clears the refresh cookie when
/// a refresh was attempted.
#[derive(Debug)]
pub struct ApiAuthError {
    pub kind: AuthErrorKind,
    clear_cookie: Option<CookiePolicy>,
}

impl ApiAuthError {
    pub fn new(kind: AuthErrorKind) -> Self {
        Self {
            kind,
            clear_cookie: None,
        }
    }

    /// Also remove the refresh cookie in the response.
    pub fn clearing_cookie(mut self, policy: CookiePolicy) -> Self {
        self.clear_cookie = Some(policy);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        match self.kind {
            AuthErrorKind::NotAuthenticated | AuthErrorKind::SessionEnded => {
                StatusCode::UNAUTHORIZED
            }
            AuthErrorKind::SessionRevoked
            | AuthErrorKind::InvalidRefreshToken
            | AuthErrorKind::IdentityMismatch => StatusCode::FORBIDDEN,
            AuthErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &'static str {
        match self.kind {
            AuthErrorKind::NotAuthenticated => "Not authenticated",
            AuthErrorKind::SessionEnded => "Session has ended, please log in again",
            AuthErrorKind::SessionRevoked => "Refresh token has been revoked",
            AuthErrorKind::InvalidRefreshToken => "Invalid or expired refresh token",
            AuthErrorKind::IdentityMismatch => "Refresh token does not match its user",
            AuthErrorKind::Internal => "Internal server error",
        }
    }
}

impl From<AuthErrorKind> for ApiAuthError {
    fn from(kind: AuthErrorKind) -> Self {
        Self::new(kind)
    }
}

impl IntoResponse for ApiAuthError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: &'static str,
        }

        let mut response = (
            self.status_code(),
            Json(ErrorResponse {
                error: self.message(),
            }),
        )
            .into_response();

        if let Some(policy) = self.clear_cookie {
            CookiePolicy::append(response.headers_mut(), &policy.clear_refresh_cookie());
        }

        response
    }
}
