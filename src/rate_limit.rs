//! Rate limiting for login, registration and the contact form.
//!
//! Uses a token bucket algorithm with per-IP tracking to slow down brute force
//! and spam.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc};
use tracing::warn;

use crate::auth::{ClientIpHeader, extract_client_ip};

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Which endpoint family a limiter protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Login,
    Register,
    Contact,
}

impl Limit {
    fn message(&self) -> &'static str {
        match self {
            Limit::Login => "Too many login attempts. Please wait before trying again.",
            Limit::Register => "Too many signup attempts. Please wait before trying again.",
            Limit::Contact => "Too many messages. Please try again later.",
        }
    }
}

fn quota(per_minute: u32, burst: u32) -> Quota {
    let per_minute = NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN);
    let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
    Quota::per_minute(per_minute).allow_burst(burst)
}

/// Rate limiting configuration.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Login: 10 per minute, burst of 5
    pub login: Arc<IpLimiter>,
    /// Registration: 3 per minute
    pub register: Arc<IpLimiter>,
    /// Contact form: 5 per minute
    pub contact: Arc<IpLimiter>,
}

impl RateLimitConfig {
    /// Production limits.
    pub fn new() -> Self {
        Self {
            login: Arc::new(RateLimiter::keyed(quota(10, 5))),
            register: Arc::new(RateLimiter::keyed(quota(3, 3))),
            contact: Arc::new(RateLimiter::keyed(quota(5, 5))),
        }
    }

    /// Very high limits for tests.
    pub fn relaxed() -> Self {
        Self {
            login: Arc::new(RateLimiter::keyed(quota(10_000, 10_000))),
            register: Arc::new(RateLimiter::keyed(quota(10_000, 10_000))),
            contact: Arc::new(RateLimiter::keyed(quota(10_000, 10_000))),
        }
    }

    /// Drop per-IP state that has fallen back to a full bucket. Returns the
    /// number of clients still tracked.
    pub fn retain_recent(&self) -> usize {
        [&self.login, &self.register, &self.contact]
            .into_iter()
            .map(|limiter| {
                limiter.retain_recent();
                limiter.shrink_to_fit();
                limiter.len()
            })
            .sum()
    }

    fn limiter(&self, limit: Limit) -> Arc<IpLimiter> {
        match limit {
            Limit::Login => self.login.clone(),
            Limit::Register => self.register.clone(),
            Limit::Contact => self.contact.clone(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// State for the [`rate_limit`] middleware.
#[derive(Clone)]
pub struct RateLimitGuard {
    limit: Limit,
    limiter: Arc<IpLimiter>,
    ip_header: Option<ClientIpHeader>,
}

impl RateLimitGuard {
    pub fn new(config: &RateLimitConfig, limit: Limit, ip_header: Option<ClientIpHeader>) -> Self {
        Self {
            limit,
            limiter: config.limiter(limit),
            ip_header,
        }
    }
}

/// Middleware rejecting requests over the per-IP quota with 429.
pub async fn rate_limit(
    State(guard): State<RateLimitGuard>,
    request: Request,
    next: Next,
) -> Response {
    let ip = match extract_client_ip(&request, guard.ip_header) {
        Ok(ip) => ip,
        Err(reason) => {
            warn!(reason, "Unable to determine client IP");
            return (StatusCode::FORBIDDEN, "Unable to determine client IP.").into_response();
        }
    };

    match guard.limiter.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            warn!(ip = %ip, limit = ?guard.limit, "Rate limit exceeded");
            (StatusCode::TOO_MANY_REQUESTS, guard.limit.message()).into_response()
        }
    }
}
