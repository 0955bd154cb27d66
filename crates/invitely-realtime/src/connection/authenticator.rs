//! WebSocket authentication: validates the JWT presented on the handshake.

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use invitely_core::config::AuthConfig;
use invitely_core::error::AppError;
use invitely_core::result::AppResult;
use invitely_core::types::{PrincipalId, UserRole};

/// Authenticated identity attached to a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Stable principal identifier (the token subject).
    pub id: PrincipalId,
    /// Role claimed by the token.
    pub role: UserRole,
    /// Display name, when the token carries one.
    pub name: Option<String>,
}

/// Claims carried by dashboard access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Principal identifier.
    pub sub: String,
    /// Role name (`superuser`, `staff`, `customer`).
    pub role: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

/// Resolves a handshake token into a principal.
///
/// Errors of kind `Authentication` reject the handshake with close code
/// 4001; any other error is treated the same way after being logged.
#[async_trait]
pub trait TokenAuthenticator: Send + Sync + std::fmt::Debug {
    /// Validate `token` and return the principal it identifies.
    async fn authenticate(&self, token: &str) -> AppResult<Principal>;
}

/// HS256 JWT authenticator sharing its secret with the main application.
#[derive(Clone)]
pub struct JwtAuthenticator {
    decoding_key: DecodingKey,
    encoding_key: EncodingKey,
    validation: Validation,
    issuer: Option<String>,
}

impl std::fmt::Debug for JwtAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtAuthenticator")
            .field("validation", &self.validation)
            .finish()
    }
}

impl JwtAuthenticator {
    /// Creates an authenticator from auth configuration.
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = config.leeway_seconds;
        validation.required_spec_claims = ["exp", "sub"].iter().map(|c| c.to_string()).collect();
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }

        Self {
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            issuer: config.issuer.clone(),
        }
    }

    /// Decode and validate a token without interpreting the role.
    pub fn decode_claims(&self, token: &str) -> AppResult<Claims> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    AppError::authentication("Token has expired")
                }
                jsonwebtoken::errors::ErrorKind::InvalidToken => {
                    AppError::authentication("Invalid token format")
                }
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    AppError::authentication("Invalid token signature")
                }
                jsonwebtoken::errors::ErrorKind::InvalidIssuer => {
                    AppError::authentication("Unexpected token issuer")
                }
                _ => AppError::authentication(format!("Token validation failed: {e}")),
            }
        })?;
        Ok(data.claims)
    }

    /// Sign a token for `principal` valid for `ttl_seconds`.
    ///
    /// Used by operational tooling and tests; the main application mints
    /// its own tokens with the same secret.
    pub fn issue(&self, principal: &Principal, ttl_seconds: i64) -> AppResult<String> {
        let claims = Claims {
            sub: principal.id.as_str().to_string(),
            role: principal.role.as_str().to_string(),
            name: principal.name.clone(),
            exp: chrono::Utc::now().timestamp() + ttl_seconds,
            iss: self.issuer.clone(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::internal(format!("Failed to sign token: {e}")))
    }
}

#[async_trait]
impl TokenAuthenticator for JwtAuthenticator {
    async fn authenticate(&self, token: &str) -> AppResult<Principal> {
        if token.trim().is_empty() {
            return Err(AppError::authentication("Missing access token"));
        }
        let claims = self.decode_claims(token)?;
        let role = claims
            .role
            .parse::<UserRole>()
            .map_err(|_| AppError::authorization(format!("Unknown role '{}'", claims.role)))?;

        Ok(Principal {
            id: PrincipalId::new(claims.sub),
            role,
            name: claims.name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use invitely_core::error::ErrorKind;

    fn config() -> AuthConfig {
        AuthConfig {
            jwt_secret: "test-secret".to_string(),
            issuer: Some("invitely".to_string()),
            leeway_seconds: 0,
        }
    }

    fn staff() -> Principal {
        Principal {
            id: PrincipalId::from("staff-7"),
            role: UserRole::Staff,
            name: Some("Dana".to_string()),
        }
    }

    #[tokio::test]
    async fn test_valid_token_yields_principal() {
        let auth = JwtAuthenticator::new(&config());
        let token = auth.issue(&staff(), 300).unwrap();
        let principal = auth.authenticate(&token).await.unwrap();
        assert_eq!(principal, staff());
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let auth = JwtAuthenticator::new(&config());
        let token = auth.issue(&staff(), -120).unwrap();
        let err = auth.authenticate(&token).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Authentication);
    }

    #[tokio::test]
    async fn test_wrong_secret_rejected() {
        let other = JwtAuthenticator::new(&AuthConfig {
            jwt_secret: "other".to_string(),
            ..config()
        });
        let token = other.issue(&staff(), 300).unwrap();
        let err = JwtAuthenticator::new(&config())
            .authenticate(&token)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Authentication);
    }

    #[tokio::test]
    async fn test_garbage_and_empty_tokens_rejected() {
        let auth = JwtAuthenticator::new(&config());
        assert!(auth.authenticate("not-a-jwt").await.is_err());
        assert!(auth.authenticate("").await.is_err());
    }
}
