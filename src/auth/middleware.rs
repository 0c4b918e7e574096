//! Axum middleware and extractor for protected routes.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderValue, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, error};

use super::authenticator::{AuthOutcome, apply_effects, authenticate};
use super::cookie::{NEW_ACCESS_TOKEN_HEADER, REFRESH_COOKIE_NAME, bearer_token, get_cookie};
use super::errors::{ApiAuthError, AuthErrorKind};
use super::state::HasAuthBackend;
use super::types::AuthenticatedUser;
use crate::jwt::unix_now;

/// Middleware guarding protected routes.
///
/// Authorized requests get an [`AuthenticatedUser`] in their extensions. A
/// silently renewed access token is returned in `X-New-Access-Token`.
/// Rejected requests never reach the handler.
pub async fn require_auth<S>(State(state): State<S>, mut request: Request, next: Next) -> Response
where
    S: HasAuthBackend + Clone + Send + Sync + 'static,
{
    let headers = request.headers();
    let access_token = bearer_token(headers).map(str::to_owned);
    let refresh_token = get_cookie(headers, REFRESH_COOKIE_NAME).map(str::to_owned);

    let now = match unix_now() {
        Ok(now) => now,
        Err(e) => {
            error!(error = %e, "Clock error during authentication");
            return ApiAuthError::new(AuthErrorKind::Internal).into_response();
        }
    };

    let AuthOutcome { decision, effects } = authenticate(
        state.jwt(),
        state.db(),
        access_token.as_deref(),
        refresh_token.as_deref(),
        now,
    )
    .await;

    let exposed = match apply_effects(state.db(), &effects).await {
        Ok(exposed) => exposed,
        Err(e) => {
            error!(error = %e, "Failed to apply authentication effects");
            return ApiAuthError::new(AuthErrorKind::Internal).into_response();
        }
    };

    let user = match decision {
        Ok(user) => user,
        Err(kind) => {
            debug!(?kind, "Request rejected");
            return rejection(kind, refresh_token.is_some(), &state).into_response();
        }
    };

    request.extensions_mut().insert(user);
    let mut response = next.run(request).await;

    if let Some(token) = exposed {
        if let Ok(value) = HeaderValue::from_str(&token) {
            response.headers_mut().insert(NEW_ACCESS_TOKEN_HEADER, value);
        }
    }

    response
}

/// Build the rejection, clearing the refresh cookie if one was offered and refused.
pub fn rejection<S: HasAuthBackend>(
    kind: AuthErrorKind,
    refresh_offered: bool,
    state: &S,
) -> ApiAuthError {
    let error = ApiAuthError::new(kind);
    let refused = !matches!(
        kind,
        AuthErrorKind::NotAuthenticated | AuthErrorKind::Internal
    );
    if refresh_offered && refused {
        error.clearing_cookie(state.cookies())
    } else {
        error
    }
}

/// Extractor for the identity attached by [`require_auth`].
pub struct Auth(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for Auth
where
    S: Send + Sync,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .map(Auth)
            .ok_or_else(|| ApiAuthError::new(AuthErrorKind::NotAuthenticated))
    }
}
