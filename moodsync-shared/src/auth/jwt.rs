/// JWT access and refresh tokens
///
/// Tokens are HS256-signed and carry the user id as `sub`. Access tokens
/// authenticate API calls; refresh tokens are only accepted by the refresh
/// endpoint. Premium and admin flags are read from the database on each
/// request rather than baked into the token, so billing changes take effect
/// immediately.
///
/// # Example
///
/// ```
/// use moodsync_shared::auth::jwt::{issue_token_pair, decode_token, TokenType};
/// use chrono::Duration;
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let user_id = Uuid::new_v4();
/// let pair = issue_token_pair(user_id, "secret", Duration::hours(1), Duration::days(30))?;
///
/// let claims = decode_token(&pair.access_token, "secret", TokenType::Access)?;
/// assert_eq!(claims.sub, user_id);
/// # Ok(())
/// # }
/// ```

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Value of the `iss` claim
pub const ISSUER: &str = "moodsync";

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Failed to create token: {0}")]
    CreateError(String),

    #[error("Token has expired")]
    Expired,

    #[error("Expected {expected} token, got {actual}")]
    WrongTokenType {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Invalid token: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

/// Token claims
///
/// Standard `sub`, `iss`, `iat`, `exp` and `nbf` plus `token_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: Uuid,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub nbf: i64,
    pub token_type: TokenType,
}

impl Claims {
    pub fn new(user_id: Uuid, token_type: TokenType, expires_in: Duration) -> Self {
        let now = Utc::now();
        Self {
            sub: user_id,
            iss: ISSUER.to_string(),
            iat: now.timestamp(),
            exp: (now + expires_in).timestamp(),
            nbf: now.timestamp(),
            token_type,
        }
    }

    /// Seconds until expiry, zero once expired
    pub fn expires_in_seconds(&self) -> i64 {
        (self.exp - Utc::now().timestamp()).max(0)
    }
}

/// Access and refresh token returned at login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,

    /// Access token lifetime in seconds
    pub expires_in: i64,
}

pub fn create_token(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| JwtError::CreateError(e.to_string()))
}

/// Issues a fresh access/refresh pair for a user
pub fn issue_token_pair(
    user_id: Uuid,
    secret: &str,
    access_ttl: Duration,
    refresh_ttl: Duration,
) -> Result<TokenPair, JwtError> {
    let access = Claims::new(user_id, TokenType::Access, access_ttl);
    let refresh = Claims::new(user_id, TokenType::Refresh, refresh_ttl);

    Ok(TokenPair {
        access_token: create_token(&access, secret)?,
        refresh_token: create_token(&refresh, secret)?,
        token_type: "Bearer".to_string(),
        expires_in: access_ttl.num_seconds(),
    })
}

/// Validates signature, expiry, issuer and token type
///
/// # Errors
///
/// - `Expired` if `exp` has passed
/// - `WrongTokenType` if a refresh token is presented where an access token
///   is expected, or vice versa
/// - `Invalid` for anything else (bad signature, malformed, wrong issuer)
pub fn decode_token(token: &str, secret: &str, expected: TokenType) -> Result<Claims, JwtError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    validation.validate_nbf = true;

    let claims = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => JwtError::Expired,
            _ => JwtError::Invalid(e.to_string()),
        })?
        .claims;

    if claims.token_type != expected {
        return Err(JwtError::WrongTokenType {
            expected: expected.as_str(),
            actual: claims.token_type.as_str(),
        });
    }

    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    #[test]
    fn test_issue_and_decode_pair() {
        let user_id = Uuid::new_v4();
        let pair = issue_token_pair(user_id, SECRET, Duration::minutes(15), Duration::days(30))
            .unwrap();

        assert_eq!(pair.token_type, "Bearer");
        assert_eq!(pair.expires_in, 900);

        let access = decode_token(&pair.access_token, SECRET, TokenType::Access).unwrap();
        assert_eq!(access.sub, user_id);
        assert_eq!(access.iss, ISSUER);

        let refresh = decode_token(&pair.refresh_token, SECRET, TokenType::Refresh).unwrap();
        assert_eq!(refresh.sub, user_id);
    }

    #[test]
    fn test_token_type_is_enforced() {
        let pair = issue_token_pair(Uuid::new_v4(), SECRET, Duration::hours(1), Duration::days(1))
            .unwrap();

        let err = decode_token(&pair.refresh_token, SECRET, TokenType::Access).unwrap_err();
        assert!(matches!(err, JwtError::WrongTokenType { expected: "access", .. }));

        let err = decode_token(&pair.access_token, SECRET, TokenType::Refresh).unwrap_err();
        assert!(matches!(err, JwtError::WrongTokenType { expected: "refresh", .. }));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let claims = Claims::new(Uuid::new_v4(), TokenType::Access, Duration::hours(1));
        let token = create_token(&claims, SECRET).unwrap();

        let err = decode_token(&token, "another-secret", TokenType::Access).unwrap_err();
        assert!(matches!(err, JwtError::Invalid(_)));
    }

    #[test]
    fn test_expired_token_rejected() {
        let claims = Claims::new(Uuid::new_v4(), TokenType::Access, Duration::seconds(-3600));
        assert_eq!(claims.expires_in_seconds(), 0);

        let token = create_token(&claims, SECRET).unwrap();
        let err = decode_token(&token, SECRET, TokenType::Access).unwrap_err();
        assert!(matches!(err, JwtError::Expired));
    }

    #[test]
    fn test_foreign_issuer_rejected() {
        let mut claims = Claims::new(Uuid::new_v4(), TokenType::Access, Duration::hours(1));
        claims.iss = "someone-else".to_string();
        let token = create_token(&claims, SECRET).unwrap();

        assert!(decode_token(&token, SECRET, TokenType::Access).is_err());
    }
}
