//! Registration, login, silent refresh and logout endpoints.

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::post,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

use super::error::{ApiError, json_body};
use crate::accounts::{self, AccountError, LoginIdentifier, Registration};
use crate::auth::{
    AuthErrorKind, ClientIpHeader, CookiePolicy, REFRESH_COOKIE_NAME, RefreshOutcome,
    apply_effects, get_cookie, rejection, renew,
};
use crate::db::{Database, User, UserRole};
use crate::impl_has_auth_backend;
use crate::jwt::{JwtConfig, unix_now};
use crate::rate_limit::{Limit, RateLimitConfig, RateLimitGuard, rate_limit};

/// State for auth endpoints.
#[derive(Clone)]
pub struct AuthState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
    pub cookies: CookiePolicy,
    pub login_identifier: LoginIdentifier,
    pub password_cost: u32,
    pub rate_limits: RateLimitConfig,
    pub ip_header: Option<ClientIpHeader>,
}

impl_has_auth_backend!(AuthState);

pub fn router(state: AuthState) -> Router {
    let register_router = Router::new()
        .route("/register", post(register))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            RateLimitGuard::new(&state.rate_limits, Limit::Register, state.ip_header),
            rate_limit,
        ));

    let login_router = Router::new()
        .route("/login", post(login))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            RateLimitGuard::new(&state.rate_limits, Limit::Login, state.ip_header),
            rate_limit,
        ));

    let session_router = Router::new()
        .route("/refresh-token", post(refresh_token))
        .route("/logout", post(logout))
        .with_state(state);

    Router::new()
        .merge(register_router)
        .merge(login_router)
        .merge(session_router)
}

// --- Request/Response types ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
    user_name: Option<String>,
    email: Option<String>,
    password: Option<String>,
    role: Option<UserRole>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest {
    identifier: Option<String>,
    email: Option<String>,
    user_name: Option<String>,
    password: Option<String>,
}

impl LoginRequest {
    /// `identifier` wins, then the field matching the configured mode.
    fn take_identifier(&mut self, mode: LoginIdentifier) -> Option<String> {
        let (first, second) = match mode {
            LoginIdentifier::Username => (&mut self.user_name, &mut self.email),
            LoginIdentifier::Email | LoginIdentifier::Either => {
                (&mut self.email, &mut self.user_name)
            }
        };
        self.identifier
            .take()
            .or_else(|| first.take())
            .or_else(|| second.take())
    }
}

/// Public profile. Never includes the password hash or refresh token.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserResponse {
    id: String,
    user_name: String,
    email: String,
    role: UserRole,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.uuid.clone(),
            user_name: user.user_name.clone(),
            email: user.email.clone(),
            role: user.role,
        }
    }
}

#[derive(Serialize)]
struct RegisterResponse {
    message: &'static str,
    user: UserResponse,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    message: &'static str,
    access_token: String,
    user: UserResponse,
}

#[derive(Serialize)]
struct MessageResponse {
    message: &'static str,
}

impl From<AccountError> for ApiError {
    fn from(e: AccountError) -> Self {
        match e {
            AccountError::Validation(msg) => ApiError::bad_request(msg),
            AccountError::Conflict
            | AccountError::UserNotFound
            | AccountError::InvalidCredentials => ApiError::bad_request(e.to_string()),
            AccountError::Storage(e) => ApiError::db_error("Account storage failed", e),
            AccountError::Hashing(_) | AccountError::Issue(_) => {
                error!(error = %e, "Account operation failed");
                ApiError::internal("Internal server error")
            }
        }
    }
}

fn with_cookie(mut response: Response, cookie: &str) -> Response {
    CookiePolicy::append(response.headers_mut(), cookie);
    response
}

// --- Handlers ---

async fn register(
    State(state): State<AuthState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = json_body(payload)?;

    let (Some(user_name), Some(email), Some(password)) =
        (payload.user_name, payload.email, payload.password)
    else {
        return Err(ApiError::bad_request(
            "userName, email and password are required",
        ));
    };

    let user = accounts::register(
        &state.db,
        state.password_cost,
        Registration {
            user_name,
            email,
            password,
            role: payload.role,
        },
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User registered successfully!",
            user: UserResponse::from(&user),
        }),
    ))
}

async fn login(
    State(state): State<AuthState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let mut payload = json_body(payload)?;

    let identifier = payload.take_identifier(state.login_identifier);
    let (Some(identifier), Some(password)) = (identifier, payload.password) else {
        return Err(ApiError::bad_request("identifier and password are required"));
    };

    let session = accounts::login(
        &state.jwt,
        &state.db,
        state.login_identifier,
        &identifier,
        &password,
    )
    .await?;

    let response = Json(SessionResponse {
        message: "Login successful",
        access_token: session.tokens.access.token,
        user: UserResponse::from(&session.user),
    })
    .into_response();

    Ok(with_cookie(
        response,
        &state.cookies.refresh_cookie(&session.tokens.refresh.token),
    ))
}

/// Explicit form of the silent refresh performed by the auth middleware.
async fn refresh_token(State(state): State<AuthState>, headers: HeaderMap) -> Response {
    let Some(token) = get_cookie(&headers, REFRESH_COOKIE_NAME) else {
        return rejection(AuthErrorKind::NotAuthenticated, false, &state).into_response();
    };

    let now = match unix_now() {
        Ok(now) => now,
        Err(e) => {
            error!(error = %e, "Clock error during refresh");
            return rejection(AuthErrorKind::Internal, true, &state).into_response();
        }
    };

    let RefreshOutcome { decision, effects } = renew(&state.jwt, &state.db, token, now).await;

    if let Err(e) = apply_effects(&state.db, &effects).await {
        error!(error = %e, "Failed to apply refresh effects");
        return rejection(AuthErrorKind::Internal, true, &state).into_response();
    }

    match decision {
        Ok(renewal) => Json(SessionResponse {
            message: "Access token refreshed",
            access_token: renewal.access.token,
            user: UserResponse::from(&renewal.user),
        })
        .into_response(),
        Err(kind) => rejection(kind, true, &state).into_response(),
    }
}

async fn logout(State(state): State<AuthState>, headers: HeaderMap) -> Result<Response, ApiError> {
    let Some(token) = get_cookie(&headers, REFRESH_COOKIE_NAME) else {
        return Err(ApiError::bad_request("No refresh token provided"));
    };

    accounts::logout(&state.db, token).await?;

    let response = Json(MessageResponse {
        message: "Logged out successfully",
    })
    .into_response();
    Ok(with_cookie(response, &state.cookies.clear_refresh_cookie()))
}
