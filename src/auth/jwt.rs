use anyhow::Result;
use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::AppConfig;

#[derive(Clone)]
pub struct JwtService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    expiry: Duration,
    attestation_audience: String,
    attestation_expiry: Duration,
}

/// Why an attestation link was refused. Expired links get their own copy in the UI.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("attestation link has expired")]
    Expired,
    #[error("attestation link is invalid")]
    Invalid,
}

impl JwtService {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            issuer: config.jwt_issuer.clone(),
            audience: config.jwt_audience.clone(),
            expiry: Duration::minutes(config.jwt_expiry_minutes),
            attestation_audience: config.attestation_token_audience.clone(),
            attestation_expiry: Duration::days(config.attestation_token_expiry_days),
        })
    }

    pub fn generate_token(
        &self,
        user_id: Uuid,
        name: &str,
        email: &str,
        role: &str,
    ) -> Result<String> {
        let now = Utc::now();
        let exp = now + self.expiry;
        let claims = Claims {
            sub: user_id,
            name: name.to_owned(),
            email: email.to_owned(),
            role: role.to_owned(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp() as usize,
            exp: exp.timestamp() as usize,
        };

        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(&[self.audience.clone()]);
        validation.set_issuer(&[self.issuer.clone()]);
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        Ok(data.claims)
    }

    pub fn generate_attestation_token(&self, note_id: Uuid) -> Result<String> {
        self.generate_attestation_token_with_expiry(note_id, self.attestation_expiry)
    }

    pub fn generate_attestation_token_with_expiry(
        &self,
        note_id: Uuid,
        expires_in: Duration,
    ) -> Result<String> {
        let now = Utc::now();
        let exp = now + expires_in;
        let claims = AttestationClaims {
            note_id,
            iss: self.issuer.clone(),
            aud: self.attestation_audience.clone(),
            iat: now.timestamp() as usize,
            exp: exp.timestamp().max(0) as usize,
        };

        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    /// Checks signature, audience and expiry. The caller still has to confirm the
    /// note is pending; a valid token says nothing about the note's current state.
    pub fn verify_attestation_token(&self, token: &str) -> Result<AttestationClaims, TokenError> {
        let mut validation = Validation::default();
        validation.set_audience(&[self.attestation_audience.clone()]);
        validation.set_issuer(&[self.issuer.clone()]);
        validation.leeway = 0;
        decode::<AttestationClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
    pub iss: String,
    pub aud: String,
    pub iat: usize,
    pub exp: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttestationClaims {
    pub note_id: Uuid,
    pub iss: String,
    pub aud: String,
    pub iat: usize,
    pub exp: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> JwtService {
        let secret = "unit-test-secret";
        JwtService {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer: "ateste".into(),
            audience: "ateste-clients".into(),
            expiry: Duration::minutes(5),
            attestation_audience: "ateste-attestation".into(),
            attestation_expiry: Duration::days(30),
        }
    }

    #[test]
    fn attestation_token_carries_note_id() {
        let jwt = service();
        let note_id = Uuid::new_v4();
        let token = jwt.generate_attestation_token(note_id).unwrap();
        let claims = jwt.verify_attestation_token(&token).unwrap();
        assert_eq!(claims.note_id, note_id);
    }

    #[test]
    fn expired_attestation_token_is_reported_as_expired() {
        let jwt = service();
        let token = jwt
            .generate_attestation_token_with_expiry(Uuid::new_v4(), Duration::hours(-2))
            .unwrap();
        assert_eq!(
            jwt.verify_attestation_token(&token).unwrap_err(),
            TokenError::Expired
        );
    }

    #[test]
    fn garbage_and_tampered_tokens_are_invalid() {
        let jwt = service();
        assert_eq!(
            jwt.verify_attestation_token("not.a.token").unwrap_err(),
            TokenError::Invalid
        );

        let token = jwt.generate_attestation_token(Uuid::new_v4()).unwrap();
        let mut tampered = token.clone();
        tampered.pop();
        tampered.push(if token.ends_with('A') { 'B' } else { 'A' });
        assert_eq!(
            jwt.verify_attestation_token(&tampered).unwrap_err(),
            TokenError::Invalid
        );
    }

    #[test]
    fn session_token_is_not_an_attestation_token() {
        let jwt = service();
        let session = jwt
            .generate_token(Uuid::new_v4(), "Ana", "ana@example.org", "USER")
            .unwrap();
        assert_eq!(
            jwt.verify_attestation_token(&session).unwrap_err(),
            TokenError::Invalid
        );
    }

    #[test]
    fn attestation_token_is_not_a_session_token() {
        let jwt = service();
        let token = jwt.generate_attestation_token(Uuid::new_v4()).unwrap();
        assert!(jwt.verify_token(&token).is_err());
    }
}
