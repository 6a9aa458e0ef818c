//! Bearer-token verification.
//!
//! The identity provider issues HS256 JWTs with the caller's subject, name,
//! tenant and permissions. Verification turns one into an
//! [`IdentityContext`]; anything malformed, expired or anonymous is rejected
//! as unauthorized.

use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use livepoll_common::{AppError, AppResult, IdentityContext};
use serde::Deserialize;

/// Claims carried by identity-provider tokens.
#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    name: String,
    org_id: String,
    #[serde(default)]
    app_id: String,
    #[serde(default)]
    permissions: String,
    #[serde(default)]
    anonymous: bool,
}

/// Verifies bearer tokens against the shared identity-provider secret.
#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    /// Create a verifier for the given HS256 secret.
    #[must_use]
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Verify a token and build the request principal from its claims.
    pub fn verify(&self, token: &str) -> AppResult<IdentityContext> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|_| AppError::Unauthorized)?;

        if data.claims.anonymous {
            return Err(AppError::Unauthorized);
        }

        Ok(IdentityContext {
            subject: data.claims.sub,
            name: data.claims.name,
            org_id: data.claims.org_id,
            app_id: data.claims.app_id,
            permissions: data.claims.permissions,
            token: token.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde::Serialize;

    #[derive(Serialize)]
    struct TestClaims {
        sub: String,
        name: String,
        org_id: String,
        app_id: String,
        permissions: String,
        anonymous: bool,
        exp: i64,
    }

    fn token(secret: &str, anonymous: bool) -> String {
        let claims = TestClaims {
            sub: "u1".into(),
            name: "User One".into(),
            org_id: "o1".into(),
            app_id: "a1".into(),
            permissions: "polls_user".into(),
            anonymous,
            exp: chrono::Utc::now().timestamp() + 3600,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_verify_roundtrip() {
        let verifier = TokenVerifier::new("secret");
        let identity = verifier.verify(&token("secret", false)).unwrap();

        assert_eq!(identity.subject, "u1");
        assert_eq!(identity.org_id, "o1");
        assert!(!identity.token.is_empty());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let verifier = TokenVerifier::new("secret");
        assert!(matches!(
            verifier.verify(&token("other", false)),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn test_anonymous_rejected() {
        let verifier = TokenVerifier::new("secret");
        assert!(matches!(
            verifier.verify(&token("secret", true)),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn test_garbage_rejected() {
        let verifier = TokenVerifier::new("secret");
        assert!(verifier.verify("not-a-token").is_err());
    }
}
