use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::config::Config;
use crate::error::AppError;
use crate::utils::{Role, hash_password, normalize_email, validate_not_blank};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "staff_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum StaffRole {
    Admin,
    Staff,
}

impl From<StaffRole> for Role {
    fn from(role: StaffRole) -> Self {
        match role {
            StaffRole::Admin => Role::Admin,
            StaffRole::Staff => Role::Staff,
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Staff {
    pub staff_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: StaffRole,
    pub is_active: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const STAFF_COLUMNS: &str = "staff_id, first_name, last_name, email, password_hash, role, \
     is_active, created_by, created_at, updated_at";

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterStaffRequest {
    #[validate(custom(function = "validate_not_blank"))]
    pub first_name: String,
    #[validate(custom(function = "validate_not_blank"))]
    pub last_name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 6, message = "must be at least 6 characters"))]
    pub password: String,
    pub role: StaffRole,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateStaffStatusRequest {
    pub is_active: bool,
}

#[derive(Debug, Serialize)]
pub struct StaffResponse {
    pub message: String,
    pub staff: Staff,
}

impl Staff {
    pub async fn create(
        pool: &PgPool,
        req: &RegisterStaffRequest,
        created_by: Option<Uuid>,
    ) -> Result<Self, AppError> {
        let password_hash = hash_password(&req.password)?;

        sqlx::query_as::<_, Staff>(&format!(
            r#"
            INSERT INTO staff (staff_id, first_name, last_name, email, password_hash, role, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {STAFF_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(req.first_name.trim())
        .bind(req.last_name.trim())
        .bind(normalize_email(&req.email))
        .bind(password_hash)
        .bind(req.role)
        .bind(created_by)
        .fetch_one(pool)
        .await
        .map_err(|e| AppError::conflict_on_unique(e, "Staff with this email already exists"))
    }

    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Staff>(&format!("SELECT {STAFF_COLUMNS} FROM staff WHERE email = $1"))
            .bind(normalize_email(email))
            .fetch_optional(pool)
            .await
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Staff>(&format!(
            "SELECT {STAFF_COLUMNS} FROM staff ORDER BY created_at DESC"
        ))
        .fetch_all(pool)
        .await
    }

    pub async fn set_active(
        pool: &PgPool,
        staff_id: Uuid,
        is_active: bool,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Staff>(&format!(
            r#"
            UPDATE staff
            SET is_active = $2, updated_at = NOW()
            WHERE staff_id = $1
            RETURNING {STAFF_COLUMNS}
            "#
        ))
        .bind(staff_id)
        .bind(is_active)
        .fetch_optional(pool)
        .await
    }

    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM staff")
            .fetch_one(pool)
            .await
    }
}

/// Creates the first admin account from `BOOTSTRAP_ADMIN_*` when the staff
/// table is empty. Returns whether an account was created.
pub async fn ensure_bootstrap_admin(pool: &PgPool, config: &Config) -> Result<bool, AppError> {
    let (Some(email), Some(password)) = (
        config.bootstrap_admin_email.as_deref(),
        config.bootstrap_admin_password.as_deref(),
    ) else {
        return Ok(false);
    };

    if Staff::count(pool).await? > 0 {
        return Ok(false);
    }

    let req = RegisterStaffRequest {
        first_name: "Admin".into(),
        last_name: "User".into(),
        email: email.to_string(),
        password: password.to_string(),
        role: StaffRole::Admin,
    };
    req.validate()?;

    let admin = Staff::create(pool, &req, None).await?;
    tracing::info!("Created bootstrap admin {}", admin.email);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn staff_roles_map_to_token_roles() {
        assert_eq!(Role::from(StaffRole::Admin), Role::Admin);
        assert_eq!(Role::from(StaffRole::Staff), Role::Staff);
    }

    #[test]
    fn register_request_rejects_unknown_role() {
        let parsed = serde_json::from_value::<RegisterStaffRequest>(json!({
            "first_name": "A",
            "last_name": "B",
            "email": "a@b.com",
            "password": "secret1",
            "role": "owner"
        }));
        assert!(parsed.is_err());
    }

    #[test]
    fn register_request_requires_six_char_password() {
        let req: RegisterStaffRequest = serde_json::from_value(json!({
            "first_name": "A",
            "last_name": "B",
            "email": "a@b.com",
            "password": "12345",
            "role": "staff"
        }))
        .unwrap();
        assert!(req.validate().unwrap_err().field_errors().contains_key("password"));
    }
}
