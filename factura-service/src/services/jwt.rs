//! Bearer token issuance and validation (HS256).

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;

/// Claims carried by an access token. `company_id` is present for company
/// operators and drives all company-scoped queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub sub: Uuid,
    pub email: String,
    pub company_id: Option<Uuid>,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry_hours: i64,
}

impl JwtService {
    pub fn new(secret: &str, expiry_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiry_hours,
        }
    }

    pub fn issue_token(
        &self,
        user_id: Uuid,
        email: &str,
        company_id: Option<Uuid>,
    ) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = AccessTokenClaims {
            sub: user_id,
            email: email.to_string(),
            company_id,
            iat: now.timestamp(),
            exp: (now + Duration::hours(self.expiry_hours)).timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;
        Ok(token)
    }

    pub fn validate_token(&self, token: &str) -> Result<AccessTokenClaims, AppError> {
        let data = decode::<AccessTokenClaims>(
            token,
            &self.decoding_key,
            &Validation::new(Algorithm::HS256),
        )?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_and_validate_round_trip() {
        let jwt = JwtService::new("test-secret", 24);
        let user_id = Uuid::new_v4();
        let company_id = Some(Uuid::new_v4());

        let token = jwt.issue_token(user_id, "user@example.com", company_id).unwrap();
        let claims = jwt.validate_token(&token).unwrap();

        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.email, "user@example.com");
        assert_eq!(claims.company_id, company_id);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn rejects_a_token_signed_with_another_secret() {
        let issuer = JwtService::new("secret-a", 24);
        let verifier = JwtService::new("secret-b", 24);

        let token = issuer
            .issue_token(Uuid::new_v4(), "user@example.com", None)
            .unwrap();
        assert!(verifier.validate_token(&token).is_err());
    }

    #[test]
    fn rejects_garbage() {
        let jwt = JwtService::new("test-secret", 24);
        assert!(jwt.validate_token("not.a.token").is_err());
    }
}
