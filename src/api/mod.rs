mod auth;
mod contact;
mod error;
mod products;

use axum::Router;
use std::sync::Arc;

use crate::accounts::LoginIdentifier;
use crate::auth::{ClientIpHeader, CookiePolicy};
use crate::contact::ContactRelay;
use crate::db::Database;
use crate::jwt::JwtConfig;
use crate::rate_limit::RateLimitConfig;

pub use auth::AuthState;
pub use contact::ContactState;
pub use products::{MAX_IMAGE_BYTES, ProductsState};

/// Everything the API routers need.
#[derive(Clone)]
pub struct ApiContext {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
    pub cookies: CookiePolicy,
    pub login_identifier: LoginIdentifier,
    pub password_cost: u32,
    pub rate_limits: RateLimitConfig,
    pub ip_header: Option<ClientIpHeader>,
    pub contact_relay: Arc<dyn ContactRelay>,
}

/// Create the API router. Mounted under `/api`.
pub fn create_api_router(ctx: ApiContext) -> Router {
    let auth_state = AuthState {
        db: ctx.db.clone(),
        jwt: ctx.jwt.clone(),
        cookies: ctx.cookies,
        login_identifier: ctx.login_identifier,
        password_cost: ctx.password_cost,
        rate_limits: ctx.rate_limits.clone(),
        ip_header: ctx.ip_header,
    };

    let products_state = ProductsState {
        db: ctx.db,
        jwt: ctx.jwt,
        cookies: ctx.cookies,
    };

    let contact_state = ContactState {
        relay: ctx.contact_relay,
        rate_limits: ctx.rate_limits,
        ip_header: ctx.ip_header,
    };

    Router::new()
        .nest("/auth", auth::router(auth_state))
        .nest("/products", products::router(products_state))
        .merge(contact::router(contact_state))
}
