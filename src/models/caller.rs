//! Caller identity and bearer token claims

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Role of an authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[serde(alias = "student")]
    Borrower,
    Librarian,
}

impl Role {
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Librarian)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Borrower => write!(f, "borrower"),
            Role::Librarian => write!(f, "librarian"),
        }
    }
}

/// Authenticated caller, passed explicitly to every lending operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerIdentity {
    pub id: i32,
    pub role: Role,
}

impl CallerIdentity {
    pub fn borrower(id: i32) -> Self {
        Self { id, role: Role::Borrower }
    }

    pub fn librarian(id: i32) -> Self {
        Self { id, role: Role::Librarian }
    }
}

/// JWT claims issued by the authentication layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    pub sub: String,
    pub user_id: i32,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

impl UserClaims {
    pub fn new(user_id: i32, role: Role, ttl: chrono::Duration) -> Self {
        let now = chrono::Utc::now();
        Self {
            sub: user_id.to_string(),
            user_id,
            role,
            exp: (now + ttl).timestamp(),
            iat: now.timestamp(),
        }
    }

    /// Create a new JWT token
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse JWT token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    pub fn caller(&self) -> CallerIdentity {
        CallerIdentity {
            id: self.user_id,
            role: self.role,
        }
    }
}
