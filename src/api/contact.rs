use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    middleware,
    response::IntoResponse,
    routing::post,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

use super::error::{ApiError, json_body};
use crate::auth::ClientIpHeader;
use crate::contact::{ContactMessage, ContactRelay};
use crate::rate_limit::{Limit, RateLimitConfig, RateLimitGuard, rate_limit};

#[derive(Clone)]
pub struct ContactState {
    pub relay: Arc<dyn ContactRelay>,
    pub rate_limits: RateLimitConfig,
    pub ip_header: Option<ClientIpHeader>,
}

pub fn router(state: ContactState) -> Router {
    let guard = RateLimitGuard::new(&state.rate_limits, Limit::Contact, state.ip_header);

    Router::new()
        .route("/contact-us", post(send_contact_message))
        .with_state(state)
        .layer(middleware::from_fn_with_state(guard, rate_limit))
}

#[derive(Deserialize)]
struct ContactRequest {
    name: Option<String>,
    email: Option<String>,
    subject: Option<String>,
    message: Option<String>,
}

#[derive(Serialize)]
struct ContactResponse {
    message: &'static str,
}

async fn send_contact_message(
    State(state): State<ContactState>,
    payload: Result<Json<ContactRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let payload = json_body(payload)?;

    let message = ContactMessage::new(
        payload.name,
        payload.email,
        payload.subject,
        payload.message,
    )
    .map_err(ApiError::bad_request)?;

    state.relay.send(&message).await.map_err(|e| {
        error!(error = %e, "Contact relay failed");
        ApiError::internal("Error sending mail")
    })?;

    Ok(Json(ContactResponse {
        message: "Contact us mail sent successfully",
    }))
}
