use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::config::Settings;

#[derive(Debug, Error)]
pub(crate) enum SecurityError {
    #[error("missing bearer token")]
    MissingBearer,
    #[error("jwt decoding failed")]
    JwtDecoding,
    #[error("unsupported jwt algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[cfg(test)]
    #[error("jwt encoding failed")]
    JwtEncoding,
}

/// Identity carried by bearer tokens. Tokens are issued by the account service;
/// this crate only verifies them.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Claims {
    pub(crate) sub: String,
    pub(crate) exp: i64,
}

/// Extracts and verifies the token from an `Authorization: Bearer ...` header value.
pub(crate) fn claims_from_header(
    header: Option<&str>,
    settings: &Settings,
) -> Result<Claims, SecurityError> {
    let token = header
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(SecurityError::MissingBearer)?;
    verify_token(token, settings)
}

pub(crate) fn verify_token(token: &str, settings: &Settings) -> Result<Claims, SecurityError> {
    let algorithm = algorithm_from_settings(settings)?;
    let mut validation = Validation::new(algorithm);
    validation.validate_exp = true;
    validation.required_spec_claims.insert("exp".to_string());
    validation.required_spec_claims.insert("sub".to_string());

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(settings.security().secret_key.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|_| SecurityError::JwtDecoding)
}

fn algorithm_from_settings(settings: &Settings) -> Result<Algorithm, SecurityError> {
    match settings.security().algorithm.as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        other => Err(SecurityError::UnsupportedAlgorithm(other.to_string())),
    }
}

/// Mints tokens the way the account service does, for tests only.
#[cfg(test)]
pub(crate) fn create_access_token(
    subject: &str,
    settings: &Settings,
    expires_in: Option<time::Duration>,
) -> Result<String, SecurityError> {
    let algorithm = algorithm_from_settings(settings)?;
    let lifetime = expires_in.unwrap_or_else(|| {
        time::Duration::minutes(settings.security().access_token_expire_minutes as i64)
    });
    let claims = Claims {
        sub: subject.to_string(),
        exp: (time::OffsetDateTime::now_utc() + lifetime).unix_timestamp(),
    };

    jsonwebtoken::encode(
        &jsonwebtoken::Header::new(algorithm),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(settings.security().secret_key.as_bytes()),
    )
    .map_err(|_| SecurityError::JwtEncoding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;
    use time::Duration;

    #[test]
    fn bearer_header_yields_subject() {
        let settings = test_support::test_settings();
        let token =
            create_access_token("student-1", &settings, Some(Duration::minutes(1))).expect("token");

        let header = format!("Bearer {token}");
        let claims = claims_from_header(Some(&header), &settings).expect("claims");
        assert_eq!(claims.sub, "student-1");
    }

    #[test]
    fn missing_or_malformed_header_is_rejected() {
        let settings = test_support::test_settings();
        assert!(matches!(
            claims_from_header(None, &settings),
            Err(SecurityError::MissingBearer)
        ));
        assert!(matches!(
            claims_from_header(Some("Basic abc"), &settings),
            Err(SecurityError::MissingBearer)
        ));
        assert!(matches!(
            claims_from_header(Some("Bearer not-a-jwt"), &settings),
            Err(SecurityError::JwtDecoding)
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let settings = test_support::test_settings();
        let token = create_access_token("teacher-1", &settings, Some(Duration::minutes(-10)))
            .expect("token");
        assert!(matches!(verify_token(&token, &settings), Err(SecurityError::JwtDecoding)));
    }
}
