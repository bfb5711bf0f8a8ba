use bcrypt::{DEFAULT_COST, hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::ValidationError;

use crate::config::Config;
use crate::error::AppError;

pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    hash(password.as_bytes(), DEFAULT_COST)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
    verify(password.as_bytes(), hash)
}

/// Audience of a token. Admins are staff with extra rights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Staff,
    Member,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn is_staff(&self) -> bool {
        matches!(self.role, Role::Admin | Role::Staff)
    }

    /// Id of the scanning/acting staff account.
    pub fn staff_id(&self) -> Result<Uuid, AppError> {
        if self.is_staff() {
            Ok(self.sub)
        } else {
            Err(AppError::Forbidden("Staff access required".into()))
        }
    }

    pub fn require_admin(&self) -> Result<Uuid, AppError> {
        if self.role == Role::Admin {
            Ok(self.sub)
        } else {
            Err(AppError::Forbidden("Admin access required".into()))
        }
    }

    pub fn member_id(&self) -> Result<Uuid, AppError> {
        if self.role == Role::Member {
            Ok(self.sub)
        } else {
            Err(AppError::Forbidden("Access denied".into()))
        }
    }

    /// Members may act on their own records; staff on anyone's.
    pub fn require_self_or_staff(&self, member_id: Uuid) -> Result<(), AppError> {
        if self.is_staff() || self.sub == member_id {
            Ok(())
        } else {
            Err(AppError::Forbidden("Access denied".into()))
        }
    }
}

pub fn generate_token(
    subject: Uuid,
    email: &str,
    role: Role,
    config: &Config,
) -> Result<(String, i64), jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let expiration = (now + Duration::seconds(config.jwt_expiration().as_secs() as i64)).timestamp();

    let claims = Claims {
        sub: subject,
        email: email.to_string(),
        role,
        exp: expiration,
        iat: now.timestamp(),
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )?;

    tracing::debug!("Issued {:?} token for {}", role, subject);
    Ok((token, expiration))
}

pub fn verify_token(token: &str, config: &Config) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let username = username.trim();
    let valid_len = (3..=20).contains(&username.chars().count());
    if valid_len && username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(ValidationError::new("username")
            .with_message("3-20 characters: letters, digits and underscore".into()))
    }
}

/// Accepts an optional leading '+', then 7 to 15 digits; spaces and dashes
/// are ignored.
pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    let body = phone.trim().strip_prefix('+').unwrap_or(phone.trim());
    let digits: Vec<char> = body.chars().filter(|c| *c != ' ' && *c != '-').collect();
    if (7..=15).contains(&digits.len()) && digits.iter().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ValidationError::new("phone_number").with_message("invalid phone number".into()))
    }
}

pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::new("blank").with_message("must not be empty".into()))
    } else {
        Ok(())
    }
}
