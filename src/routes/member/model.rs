use std::collections::HashMap;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::error::AppError;
use crate::routes::membership::model::Membership;
use crate::scoring::{Progress, VisitScore};
use crate::utils::{normalize_email, validate_not_blank, validate_phone, validate_username};

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Member {
    pub member_id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub qr_code: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub total_points: i64,
    pub current_streak: i32,
    pub longest_streak: i32,
    pub level: i32,
    pub experience: i64,
    pub last_visit_date: Option<DateTime<Utc>>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub member_since: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub(crate) const MEMBER_COLUMNS: &str = "member_id, username, first_name, last_name, email, \
     phone_number, qr_code, password_hash, total_points, current_streak, longest_streak, level, \
     experience, last_visit_date, bio, avatar_url, member_since, created_at, updated_at";

/// Fields shared by staff-side creation, self-registration and updates.
#[derive(Debug, Deserialize, Validate)]
pub struct MemberDetails {
    #[validate(custom(function = "validate_username"))]
    pub username: String,
    #[validate(custom(function = "validate_not_blank"))]
    pub first_name: String,
    #[validate(custom(function = "validate_not_blank"))]
    pub last_name: String,
    #[validate(email)]
    pub email: String,
    #[validate(custom(function = "validate_phone"))]
    pub phone_number: Option<String>,
}

impl MemberDetails {
    fn normalized(&self) -> (String, String, String, String, Option<String>) {
        (
            self.username.trim().to_string(),
            self.first_name.trim().to_string(),
            self.last_name.trim().to_string(),
            normalize_email(&self.email),
            self.phone_number
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MemberWithMemberships {
    #[serde(flatten)]
    pub member: Member,
    pub memberships: Vec<Membership>,
}

#[derive(Debug, Serialize)]
pub struct MemberResponse {
    pub message: String,
    pub member: Member,
}

#[derive(Debug, Serialize)]
pub struct MemberContact {
    pub member_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct QrCodeResponse {
    pub qr_code: String,
    pub qr_code_image: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member: Option<MemberContact>,
}

fn member_conflict(err: sqlx::Error) -> AppError {
    let constraint = match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            db.constraint().map(str::to_string)
        }
        _ => None,
    };
    match constraint.as_deref() {
        Some("members_email_key") => {
            AppError::Conflict("Member with this email already exists".into())
        }
        Some("members_username_key") => AppError::Conflict("Username is already taken".into()),
        Some(_) => AppError::Conflict("Member already exists".into()),
        None => AppError::Database(err),
    }
}

impl Member {
    pub fn contact(&self) -> MemberContact {
        MemberContact {
            member_id: self.member_id,
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
        }
    }

    /// Gamification state with the last visit reduced to a server-local day.
    pub fn progress(&self) -> Progress {
        Progress {
            total_points: self.total_points,
            experience: self.experience,
            level: self.level,
            current_streak: self.current_streak,
            longest_streak: self.longest_streak,
            last_visit: self
                .last_visit_date
                .map(|ts| ts.with_timezone(&Local).date_naive()),
        }
    }

    /// Inserts a member with a fresh QR token. `password_hash` is `None` for
    /// members registered at the front desk.
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        details: &MemberDetails,
        password_hash: Option<String>,
    ) -> Result<Self, AppError> {
        let (username, first_name, last_name, email, phone_number) = details.normalized();

        let member = sqlx::query_as::<_, Member>(&format!(
            r#"
            INSERT INTO members
                (member_id, username, first_name, last_name, email, phone_number, qr_code, password_hash)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {MEMBER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(first_name)
        .bind(last_name)
        .bind(email)
        .bind(phone_number)
        .bind(Uuid::new_v4().to_string())
        .bind(password_hash)
        .fetch_one(executor)
        .await
        .map_err(member_conflict)?;

        tracing::info!("Registered member {}", member.member_id);
        Ok(member)
    }

    pub async fn update_details<'e, E: PgExecutor<'e>>(
        executor: E,
        member_id: Uuid,
        details: &MemberDetails,
    ) -> Result<Option<Self>, AppError> {
        let (username, first_name, last_name, email, phone_number) = details.normalized();

        sqlx::query_as::<_, Member>(&format!(
            r#"
            UPDATE members
            SET username = $2, first_name = $3, last_name = $4, email = $5,
                phone_number = $6, updated_at = NOW()
            WHERE member_id = $1
            RETURNING {MEMBER_COLUMNS}
            "#
        ))
        .bind(member_id)
        .bind(username)
        .bind(first_name)
        .bind(last_name)
        .bind(email)
        .bind(phone_number)
        .fetch_optional(executor)
        .await
        .map_err(member_conflict)
    }

    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        member_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Member>(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members WHERE member_id = $1"
        ))
        .bind(member_id)
        .fetch_optional(executor)
        .await
    }

    /// Same as `find_by_id` but holds a row lock until the transaction ends.
    pub async fn find_by_id_for_update<'e, E: PgExecutor<'e>>(
        executor: E,
        member_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Member>(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members WHERE member_id = $1 FOR UPDATE"
        ))
        .bind(member_id)
        .fetch_optional(executor)
        .await
    }

    /// Looks a member up by QR token and locks the row, serializing
    /// concurrent scans of the same card.
    pub async fn find_by_qr_code_for_update<'e, E: PgExecutor<'e>>(
        executor: E,
        qr_code: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Member>(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members WHERE qr_code = $1 FOR UPDATE"
        ))
        .bind(qr_code)
        .fetch_optional(executor)
        .await
    }

    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Member>(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members WHERE email = $1"
        ))
        .bind(normalize_email(email))
        .fetch_optional(pool)
        .await
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Member>(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members ORDER BY created_at DESC"
        ))
        .fetch_all(pool)
        .await
    }

    /// Case-insensitive substring match on names, username, email and QR
    /// token.
    pub async fn search(pool: &PgPool, query: &str) -> Result<Vec<Self>, sqlx::Error> {
        let escaped = query
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let pattern = format!("%{}%", escaped);

        sqlx::query_as::<_, Member>(&format!(
            r#"
            SELECT {MEMBER_COLUMNS}
            FROM members
            WHERE first_name ILIKE $1
               OR last_name ILIKE $1
               OR username ILIKE $1
               OR email ILIKE $1
               OR qr_code ILIKE $1
            ORDER BY created_at DESC
            "#
        ))
        .bind(pattern)
        .fetch_all(pool)
        .await
    }

    /// Writes the result of a scored visit back to the member row.
    pub async fn apply_visit_score<'e, E: PgExecutor<'e>>(
        executor: E,
        member_id: Uuid,
        score: &VisitScore,
        visited_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE members
            SET total_points = $2, experience = $3, level = $4,
                current_streak = $5, longest_streak = $6,
                last_visit_date = $7, updated_at = NOW()
            WHERE member_id = $1
            "#,
        )
        .bind(member_id)
        .bind(score.total_points)
        .bind(score.experience)
        .bind(score.level)
        .bind(score.streak)
        .bind(score.longest_streak)
        .bind(visited_at)
        .execute(executor)
        .await?;
        Ok(())
    }

    pub async fn apply_points<'e, E: PgExecutor<'e>>(
        executor: E,
        member_id: Uuid,
        total_points: i64,
        experience: i64,
        level: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE members
            SET total_points = $2, experience = $3, level = $4, updated_at = NOW()
            WHERE member_id = $1
            "#,
        )
        .bind(member_id)
        .bind(total_points)
        .bind(experience)
        .bind(level)
        .execute(executor)
        .await?;
        Ok(())
    }
}

impl MemberWithMemberships {
    /// Attaches every member's memberships (newest first) with one query.
    pub async fn load(pool: &PgPool, members: Vec<Member>) -> Result<Vec<Self>, sqlx::Error> {
        let ids: Vec<Uuid> = members.iter().map(|m| m.member_id).collect();
        let mut by_member: HashMap<Uuid, Vec<Membership>> = HashMap::new();
        for membership in Membership::list_for_members(pool, &ids).await? {
            by_member
                .entry(membership.member_id)
                .or_default()
                .push(membership);
        }

        Ok(members
            .into_iter()
            .map(|member| {
                let memberships = by_member.remove(&member.member_id).unwrap_or_default();
                MemberWithMemberships {
                    member,
                    memberships,
                }
            })
            .collect())
    }
}
