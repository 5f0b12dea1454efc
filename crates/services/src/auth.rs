use bson::oid::ObjectId;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use storechat_db::models::Role;
use thiserror::Error;

/// An authenticated actor. Issued by the external identity service as a
/// signed bearer token; immutable for the lifetime of a connection.
#[derive(Debug, Clone)]
pub struct Principal {
    pub id: ObjectId,
    pub role: Role,
    pub display_name: String,
}

impl Principal {
    pub fn is_staff(&self) -> bool {
        self.role == Role::Staff
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid token: {0}")]
    InvalidToken(String),
    #[error("token expired")]
    TokenExpired,
    #[error("invalid token subject")]
    InvalidSubject,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    role: Role,
    name: String,
    exp: i64,
}

/// Verifies bearer credentials minted by the identity collaborator and
/// turns them into a [`Principal`]. The messaging core never issues
/// production tokens itself; `issue_token` exists for tests and tooling.
pub struct AuthService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl AuthService {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    pub fn verify_token(&self, token: &str) -> Result<Principal, AuthError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => AuthError::InvalidToken(e.to_string()),
            }
        })?;

        let id = ObjectId::parse_str(&data.claims.sub)
            .map_err(|_| AuthError::InvalidSubject)?;

        Ok(Principal {
            id,
            role: data.claims.role,
            display_name: data.claims.name,
        })
    }

    pub fn issue_token(
        &self,
        principal: &Principal,
        ttl: chrono::Duration,
    ) -> Result<String, AuthError> {
        let claims = Claims {
            sub: principal.id.to_hex(),
            role: principal.role,
            name: principal.display_name.clone(),
            exp: (chrono::Utc::now() + ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))
    }
}
