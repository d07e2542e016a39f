use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use pictor_core::AppError;
use uuid::Uuid;

use super::models::JwtClaims;

/// HS256 token validation against the shared `JWT_SECRET`.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtService {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Validate signature and expiry and return the claims.
    pub fn validate_token(&self, token: &str) -> Result<JwtClaims, AppError> {
        let token_data =
            decode::<JwtClaims>(token, &self.decoding_key, &self.validation).map_err(|e| {
                tracing::debug!("JWT validation failed: {}", e);
                match e.kind() {
                    ErrorKind::ExpiredSignature => {
                        AppError::Unauthorized("Token has expired".to_string())
                    }
                    ErrorKind::InvalidSignature => {
                        AppError::Unauthorized("Invalid token signature".to_string())
                    }
                    _ => AppError::Unauthorized("Invalid or expired token".to_string()),
                }
            })?;

        Ok(token_data.claims)
    }

    /// Sign a token for `user_id`. Issuance belongs to the identity provider;
    /// this exists for local tooling and tests.
    pub fn issue_token(&self, user_id: Uuid, ttl: Duration) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = JwtClaims {
            sub: user_id,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Failed to sign token: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-that-is-at-least-32-characters";

    #[test]
    fn test_issued_token_validates() {
        let service = JwtService::new(SECRET);
        let user_id = Uuid::new_v4();
        let token = service.issue_token(user_id, Duration::minutes(5)).unwrap();
        let claims = service.validate_token(&token).unwrap();
        assert_eq!(claims.sub, user_id);
    }

    #[test]
    fn test_expired_token_rejected() {
        let service = JwtService::new(SECRET);
        let token = service
            .issue_token(Uuid::new_v4(), Duration::minutes(-5))
            .unwrap();
        match service.validate_token(&token) {
            Err(AppError::Unauthorized(msg)) => assert_eq!(msg, "Token has expired"),
            other => panic!("Expected Unauthorized, got {:?}", other),
        }
    }

    #[test]
    fn test_foreign_signature_rejected() {
        let issuer = JwtService::new("another-secret-that-is-at-least-32-chars");
        let token = issuer.issue_token(Uuid::new_v4(), Duration::minutes(5)).unwrap();
        assert!(JwtService::new(SECRET).validate_token(&token).is_err());
    }
}
