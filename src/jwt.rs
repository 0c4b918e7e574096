//! JWT token generation and validation.
//!
//! Two token kinds are signed with two distinct secrets:
//! - Access tokens: short-lived (15 minutes), carry the user's identity and role
//! - Refresh tokens: long-lived (7 days), carry only the user id and a unique JTI,
//!   and are mirrored on the user row so they can be revoked by overwriting

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::db::UserRole;

/// Token type for distinguishing access vs refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// A claims payload bound to one token kind. The kind selects the signing key.
pub trait TokenPayload: Serialize + DeserializeOwned {
    const KIND: TokenKind;
}

/// Identity carried by an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessPayload {
    /// Public user UUID
    pub user_id: String,
    pub user_name: String,
    pub role: UserRole,
}

impl TokenPayload for AccessPayload {
    const KIND: TokenKind = TokenKind::Access;
}

/// Identity carried by a refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshPayload {
    /// Public user UUID
    pub user_id: String,
    /// Unique per issued token, so two logins in the same second never collide
    pub jti: String,
}

impl RefreshPayload {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            jti: uuid::Uuid::new_v4().to_string(),
        }
    }
}

impl TokenPayload for RefreshPayload {
    const KIND: TokenKind = TokenKind::Refresh;
}

/// Signed claims: the payload plus token type, issue time and expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims<P> {
    #[serde(flatten)]
    pub payload: P,
    /// Token type
    #[serde(rename = "typ")]
    pub token_type: TokenKind,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

pub type AccessClaims = Claims<AccessPayload>;
pub type RefreshClaims = Claims<RefreshPayload>;

/// Access token duration: 15 minutes
pub const ACCESS_TOKEN_DURATION_SECS: u64 = 15 * 60;

/// Refresh token duration: 7 days
pub const REFRESH_TOKEN_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Clone)]
struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

/// Configuration for JWT operations.
#[derive(Clone)]
pub struct JwtConfig {
    access: SigningKeys,
    refresh: SigningKeys,
}

/// A freshly signed token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The JWT token string
    pub token: String,
    /// Issued at timestamp (Unix seconds)
    pub issued_at: u64,
    /// Expiration timestamp (Unix seconds)
    pub expires_at: u64,
    /// Token duration in seconds
    pub duration: u64,
}

/// Current Unix time in seconds.
pub fn unix_now() -> Result<u64, JwtError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| JwtError::TimeError)
}

impl JwtConfig {
    /// Create a JWT configuration from the access and refresh signing secrets.
    pub fn new(access_secret: &[u8], refresh_secret: &[u8]) -> Self {
        Self {
            access: SigningKeys::from_secret(access_secret),
            refresh: SigningKeys::from_secret(refresh_secret),
        }
    }

    fn keys(&self, kind: TokenKind) -> &SigningKeys {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    /// Sign `payload` with the key of its kind, valid for `ttl` seconds from `now`.
    pub fn issue_at<P: TokenPayload>(
        &self,
        payload: P,
        ttl: u64,
        now: u64,
    ) -> Result<IssuedToken, JwtError> {
        let exp = now.checked_add(ttl).ok_or(JwtError::TimeError)?;

        let claims = Claims {
            payload,
            token_type: P::KIND,
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.keys(P::KIND).encoding,
        )
        .map_err(JwtError::Encoding)?;

        Ok(IssuedToken {
            token,
            issued_at: now,
            expires_at: exp,
            duration: ttl,
        })
    }

    /// Validate and decode a token of kind `P::KIND` against the clock value `now`.
    /// A token is valid while `now < exp`.
    pub fn verify_at<P: TokenPayload>(&self, token: &str, now: u64) -> Result<Claims<P>, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        // Expiry is checked below against the caller's clock
        validation.validate_exp = false;

        let token_data =
            jsonwebtoken::decode::<Claims<P>>(token, &self.keys(P::KIND).decoding, &validation)
                .map_err(JwtError::Decoding)?;

        if token_data.claims.token_type != P::KIND {
            return Err(JwtError::WrongTokenType);
        }

        if now >= token_data.claims.exp {
            return Err(JwtError::Expired);
        }

        Ok(token_data.claims)
    }

    /// Access token valid for 15 minutes from `now`.
    pub fn issue_access_at(
        &self,
        payload: AccessPayload,
        now: u64,
    ) -> Result<IssuedToken, JwtError> {
        self.issue_at(payload, ACCESS_TOKEN_DURATION_SECS, now)
    }

    /// Refresh token with a fresh JTI, valid for 7 days from `now`.
    pub fn issue_refresh_at(&self, user_id: &str, now: u64) -> Result<IssuedToken, JwtError> {
        self.issue_at(RefreshPayload::new(user_id), REFRESH_TOKEN_DURATION_SECS, now)
    }

    pub fn verify_access_at(&self, token: &str, now: u64) -> Result<AccessClaims, JwtError> {
        self.verify_at(token, now)
    }

    pub fn verify_refresh_at(&self, token: &str, now: u64) -> Result<RefreshClaims, JwtError> {
        self.verify_at(token, now)
    }
}

/// Errors that can occur during JWT operations.
#[derive(Debug)]
pub enum JwtError {
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// Malformed token or signature mismatch
    Decoding(jsonwebtoken::errors::Error),
    /// Token is past its expiry
    Expired,
    /// System time error
    TimeError,
    /// Wrong token type (e.g., using refresh token as access token)
    WrongTokenType,
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            JwtError::Decoding(e) => write!(f, "Failed to decode token: {}", e),
            JwtError::Expired => write!(f, "Token has expired"),
            JwtError::TimeError => write!(f, "System time error"),
            JwtError::WrongTokenType => write!(f, "Wrong token type"),
        }
    }
}

impl std::error::Error for JwtError {}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: u64 = 1_700_000_000;

    fn config() -> JwtConfig {
        JwtConfig::new(b"access-secret-for-testing", b"refresh-secret-for-testing")
    }

    fn alice() -> AccessPayload {
        AccessPayload {
            user_id: "uuid-123".to_string(),
            user_name: "alice".to_string(),
            role: UserRole::User,
        }
    }

    #[test]
    fn test_generate_and_validate_access_token() {
        let config = config();

        let result = config.issue_access_at(alice(), NOW).unwrap();
        assert_eq!(result.duration, ACCESS_TOKEN_DURATION_SECS);
        assert_eq!(result.issued_at, NOW);
        assert_eq!(result.expires_at, NOW + ACCESS_TOKEN_DURATION_SECS);

        let claims = config.verify_access_at(&result.token, NOW).unwrap();
        assert_eq!(claims.payload, alice());
        assert_eq!(claims.token_type, TokenKind::Access);
    }

    #[test]
    fn test_generate_and_validate_refresh_token() {
        let config = config();

        let result = config.issue_refresh_at("uuid-123", NOW).unwrap();
        assert_eq!(result.duration, REFRESH_TOKEN_DURATION_SECS);

        let claims = config.verify_refresh_at(&result.token, NOW).unwrap();
        assert_eq!(claims.payload.user_id, "uuid-123");
        assert!(!claims.payload.jti.is_empty());
        assert_eq!(claims.token_type, TokenKind::Refresh);
    }

    #[test]
    fn test_access_claims_use_camel_case() {
        let config = config();
        let token = config.issue_at(alice(), 60, NOW).unwrap().token;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        let decoded = jsonwebtoken::decode::<serde_json::Value>(
            &token,
            &DecodingKey::from_secret(b"access-secret-for-testing"),
            &validation,
        )
        .unwrap()
        .claims;

        assert_eq!(decoded["userId"], "uuid-123");
        assert_eq!(decoded["userName"], "alice");
        assert_eq!(decoded["role"], "user");
        assert_eq!(decoded["typ"], "access");
        assert_eq!(decoded["exp"], NOW + 60);
    }

    #[test]
    fn test_wrong_token_kind_rejected() {
        let config = config();

        let access = config.issue_access_at(alice(), NOW).unwrap();
        let refresh = config.issue_refresh_at("uuid-123", NOW).unwrap();

        assert!(config.verify_refresh_at(&access.token, NOW).is_err());
        assert!(config.verify_access_at(&refresh.token, NOW).is_err());
    }

    #[test]
    fn test_same_secret_still_checks_type() {
        let config = JwtConfig::new(b"shared", b"shared");

        let refresh = config.issue_refresh_at("uuid-123", NOW).unwrap();
        assert!(config.verify_access_at(&refresh.token, NOW).is_err());
    }

    #[test]
    fn test_admin_role_in_token() {
        let config = config();
        let payload = AccessPayload {
            role: UserRole::Admin,
            ..alice()
        };

        let result = config.issue_access_at(payload, NOW).unwrap();
        let claims = config.verify_access_at(&result.token, NOW).unwrap();
        assert_eq!(claims.payload.role, UserRole::Admin);
    }

    #[test]
    fn test_invalid_token() {
        let config = config();
        assert!(matches!(
            config.verify_access_at("invalid-token", NOW),
            Err(JwtError::Decoding(_))
        ));
    }

    #[test]
    fn test_tampered_token_rejected() {
        let config = config();
        let user = config.issue_at(alice(), 60, NOW).unwrap().token;
        let admin = config
            .issue_at(
                AccessPayload {
                    role: UserRole::Admin,
                    ..alice()
                },
                60,
                NOW,
            )
            .unwrap()
            .token;

        // Admin payload with the user token's signature
        let user_parts: Vec<&str> = user.split('.').collect();
        let admin_parts: Vec<&str> = admin.split('.').collect();
        let forged = format!("{}.{}.{}", admin_parts[0], admin_parts[1], user_parts[2]);

        assert!(config.verify_at::<AccessPayload>(&forged, NOW).is_err());
    }

    #[test]
    fn test_wrong_secret() {
        let config1 = JwtConfig::new(b"secret-1", b"refresh-1");
        let config2 = JwtConfig::new(b"secret-2", b"refresh-2");

        let result = config1.issue_access_at(alice(), NOW).unwrap();
        assert!(config2.verify_access_at(&result.token, NOW).is_err());
    }

    #[test]
    fn test_access_key_does_not_verify_refresh_tokens() {
        // Same access secret, different refresh secret
        let config1 = JwtConfig::new(b"access", b"refresh-1");
        let config2 = JwtConfig::new(b"access", b"refresh-2");

        let refresh = config1.issue_refresh_at("uuid-123", NOW).unwrap();
        assert!(config2.verify_refresh_at(&refresh.token, NOW).is_err());

        let access = config1.issue_access_at(alice(), NOW).unwrap();
        assert!(config2.verify_access_at(&access.token, NOW).is_ok());
    }

    #[test]
    fn test_access_expiry_boundary() {
        let config = config();
        let issued = config
            .issue_at(alice(), ACCESS_TOKEN_DURATION_SECS, NOW)
            .unwrap();
        let exp = NOW + ACCESS_TOKEN_DURATION_SECS;

        assert!(
            config
                .verify_at::<AccessPayload>(&issued.token, exp - 1)
                .is_ok()
        );
        assert!(matches!(
            config.verify_at::<AccessPayload>(&issued.token, exp),
            Err(JwtError::Expired)
        ));
        assert!(matches!(
            config.verify_at::<AccessPayload>(&issued.token, exp + 1),
            Err(JwtError::Expired)
        ));
    }

    #[test]
    fn test_expired_token_with_system_clock() {
        let config = config();
        let now = unix_now().unwrap();

        let issued = config.issue_at(alice(), 50, now - 100).unwrap();
        assert!(matches!(
            config.verify_access_at(&issued.token, now),
            Err(JwtError::Expired)
        ));
    }

    #[test]
    fn test_issue_is_deterministic_for_fixed_clock() {
        let config = config();

        let a = config.issue_at(alice(), 60, NOW).unwrap();
        let b = config.issue_at(alice(), 60, NOW).unwrap();
        assert_eq!(a.token, b.token);
    }

    #[test]
    fn test_unique_jti_per_refresh_token() {
        let config = config();

        let result1 = config.issue_refresh_at("uuid-123", NOW).unwrap();
        let result2 = config.issue_refresh_at("uuid-123", NOW).unwrap();

        assert_ne!(
            result1.token, result2.token,
            "Each refresh token should have a unique jti"
        );
    }

    #[test]
    fn test_refresh_token_lives_seven_days() {
        let config = config();

        let issued = config.issue_refresh_at("uuid-123", NOW).unwrap();
        assert_eq!(issued.duration, REFRESH_TOKEN_DURATION_SECS);
        assert_eq!(issued.expires_at, NOW + 7 * 24 * 60 * 60);

        assert!(config.verify_refresh_at(&issued.token, issued.expires_at - 1).is_ok());
        assert!(matches!(
            config.verify_refresh_at(&issued.token, issued.expires_at),
            Err(JwtError::Expired)
        ));
    }
}
