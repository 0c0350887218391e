/// Token Codec
///
/// Stateless signing and verification of bearer token claims. The same
/// secret must be used for issue and verify within a deployment; rotating
/// the key invalidates every outstanding token.

use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::auth::claims::Claims;
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};

/// Sign a new token for a user with the given TTL
///
/// # Errors
/// Returns error if token generation fails
pub fn issue_token(
    user_id: Uuid,
    roles: Vec<String>,
    ttl_seconds: i64,
    config: &JwtSettings,
) -> Result<String, AppError> {
    let claims = Claims::new(user_id, roles, ttl_seconds, config.issuer.clone());

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
}

/// Verify a token's signature and embedded expiry, returning its claims
///
/// # Errors
/// `TokenExpired` when the embedded expiry has elapsed,
/// `TokenMalformed` on any other signature or decode failure
pub fn verify_token(token: &str, config: &JwtSettings) -> Result<Claims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[&config.issuer]);

    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::warn!("Token verification error: {}", e);
        match e.kind() {
            ErrorKind::ExpiredSignature => AppError::Auth(AuthError::TokenExpired),
            _ => AppError::Auth(AuthError::TokenMalformed),
        }
    })?;

    // The decoder tolerates clock skew (60s leeway); the embedded expiry
    // itself is enforced exactly.
    if claims.is_expired() {
        return Err(AppError::Auth(AuthError::TokenExpired));
    }

    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_test_config() -> JwtSettings {
        JwtSettings {
            secret: "test-secret-key-at-least-32-characters-long".to_string(),
            access_token_expiry: 3600,
            refresh_token_expiry: 604800,
            issuer: "test".to_string(),
        }
    }

    #[test]
    fn test_issue_and_verify_token() {
        let config = get_test_config();
        let user_id = Uuid::new_v4();
        let roles = vec!["USER".to_string(), "TEACHER".to_string()];

        let token = issue_token(user_id, roles.clone(), config.access_token_expiry, &config)
            .expect("Failed to issue token");
        let claims = verify_token(&token, &config).expect("Failed to verify token");

        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.roles, roles);
        assert_eq!(claims.iss, "test");
    }

    #[test]
    fn test_invalid_token_is_malformed() {
        let config = get_test_config();
        let result = verify_token("invalid.token.here", &config);

        match result {
            Err(AppError::Auth(AuthError::TokenMalformed)) => (),
            other => panic!("Expected TokenMalformed, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_tampered_token() {
        let config = get_test_config();
        let user_id = Uuid::new_v4();

        let token = issue_token(user_id, vec![], 3600, &config).expect("Failed to issue token");

        let tampered = format!("{}X", token);
        let result = verify_token(&tampered, &config);

        assert!(result.is_err());
    }

    #[test]
    fn test_wrong_issuer() {
        let mut config = get_test_config();
        let user_id = Uuid::new_v4();

        let token = issue_token(user_id, vec![], 3600, &config).expect("Failed to issue token");

        config.issuer = "wrong-issuer".to_string();
        let result = verify_token(&token, &config);

        assert!(result.is_err());
    }

    #[test]
    fn test_expiry_within_decoder_leeway_is_still_rejected() {
        let config = get_test_config();
        let user_id = Uuid::new_v4();

        // 30 seconds past expiry: inside jsonwebtoken's default leeway,
        // but the embedded claim has elapsed.
        let token = issue_token(user_id, vec![], -30, &config).expect("Failed to issue token");
        let result = verify_token(&token, &config);

        match result {
            Err(AppError::Auth(AuthError::TokenExpired)) => (),
            other => panic!("Expected TokenExpired, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_expired_token_reports_expiry() {
        let config = get_test_config();
        let user_id = Uuid::new_v4();

        // Issued already past its expiry, beyond the default leeway
        let token = issue_token(user_id, vec![], -120, &config).expect("Failed to issue token");
        let result = verify_token(&token, &config);

        match result {
            Err(AppError::Auth(AuthError::TokenExpired)) => (),
            other => panic!("Expected TokenExpired, got {:?}", other.err()),
        }
    }
}
