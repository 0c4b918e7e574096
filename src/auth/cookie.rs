//! Cookie and header helpers for the refresh session.

use axum::http::{HeaderMap, HeaderValue, header};

use crate::jwt::REFRESH_TOKEN_DURATION_SECS;

/// Cookie name for the refresh token (long-lived, 7 days).
pub const REFRESH_COOKIE_NAME: &str = "refreshToken";

/// Response header carrying an access token minted by silent refresh.
pub const NEW_ACCESS_TOKEN_HEADER: &str = "x-new-access-token";

/// Path the refresh cookie is scoped to. Covers the refresh endpoint and the
/// protected catalog routes, so the middleware can see it.
pub const REFRESH_COOKIE_PATH: &str = "/api";

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                return Some(value.trim());
            }
        }
    }
    None
}

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Attributes of the refresh cookie.
#[derive(Debug, Clone, Copy, Default)]
pub struct CookiePolicy {
    pub secure: bool,
}

impl CookiePolicy {
    pub fn new(secure: bool) -> Self {
        Self { secure }
    }

    fn secure_attr(&self) -> &'static str {
        if self.secure { "; Secure" } else { "" }
    }

    /// `Set-Cookie` value carrying a refresh token.
    pub fn refresh_cookie(&self, token: &str) -> String {
        format!(
            "{}={}; HttpOnly; SameSite=Strict; Path={}; Max-Age={}{}",
            REFRESH_COOKIE_NAME,
            token,
            REFRESH_COOKIE_PATH,
            REFRESH_TOKEN_DURATION_SECS,
            self.secure_attr()
        )
    }

    /// `Set-Cookie` value that removes the refresh cookie.
    pub fn clear_refresh_cookie(&self) -> String {
        format!(
            "{}=; HttpOnly; SameSite=Strict; Path={}; Max-Age=0{}",
            REFRESH_COOKIE_NAME,
            REFRESH_COOKIE_PATH,
            self.secure_attr()
        )
    }

    /// Append a `Set-Cookie` header, skipping values that are not valid header text.
    pub fn append(headers: &mut HeaderMap, cookie: &str) {
        if let Ok(value) = HeaderValue::from_str(cookie) {
            headers.append(header::SET_COOKIE, value);
        }
    }
}
