//! JWT authentication with silent refresh.
//!
//! Dual-token system: short-lived access tokens (15 min, stateless, sent as a
//! bearer header) and long-lived refresh tokens (7 days, one per user, stored on
//! the user row and carried in an HTTP-only cookie). Expired access tokens are
//! renewed by middleware when the refresh token matches the stored session.

mod authenticator;
mod cookie;
mod errors;
mod ip;
mod issuer;
mod middleware;
mod state;
mod types;

pub use authenticator::{
    AuthEffect, AuthOutcome, Outcome, RefreshOutcome, Renewal, apply_effects, authenticate, renew,
};
pub use cookie::{
    CookiePolicy, NEW_ACCESS_TOKEN_HEADER, REFRESH_COOKIE_NAME, REFRESH_COOKIE_PATH, bearer_token,
    get_cookie,
};
pub use errors::{ApiAuthError, AuthErrorKind};
pub use ip::{ClientIpHeader, extract_client_ip};
pub use issuer::{IssueError, TokenPair, access_payload, issue_for, issue_for_at};
pub use middleware::{Auth, rejection, require_auth};
pub use state::HasAuthBackend;
pub use types::AuthenticatedUser;
