use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor, PgPool};
use uuid::Uuid;
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "membership_type", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum MembershipType {
    Daily,
    Monthly,
    Yearly,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "membership_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum MembershipStatus {
    Active,
    Expired,
}

impl MembershipStatus {
    pub fn for_expiration(expiration_date: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        if expiration_date > now {
            MembershipStatus::Active
        } else {
            MembershipStatus::Expired
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Membership {
    pub membership_id: Uuid,
    pub member_id: Uuid,
    pub membership_type: MembershipType,
    pub purchase_date: DateTime<Utc>,
    pub expiration_date: DateTime<Utc>,
    pub status: MembershipStatus,
    pub created_at: DateTime<Utc>,
}

const MEMBERSHIP_COLUMNS: &str =
    "membership_id, member_id, membership_type, purchase_date, expiration_date, status, created_at";

/// Accepts RFC 3339 timestamps and plain `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_iso_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn validate_iso_datetime(raw: &str) -> Result<(), ValidationError> {
    match parse_iso_datetime(raw) {
        Some(_) => Ok(()),
        None => Err(ValidationError::new("iso8601").with_message("expected an ISO 8601 date".into())),
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateMembershipRequest {
    pub member_id: Uuid,
    pub membership_type: MembershipType,
    #[validate(custom(function = "validate_iso_datetime"))]
    pub purchase_date: String,
    #[validate(custom(function = "validate_iso_datetime"))]
    pub expiration_date: String,
}

#[derive(Debug, Serialize, FromRow)]
pub struct MembershipOwner {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct MembershipWithOwner {
    #[serde(flatten)]
    pub membership: Membership,
    pub member: MembershipOwner,
}

#[derive(Debug, Serialize)]
pub struct CreateMembershipResponse {
    pub message: String,
    pub membership: MembershipWithOwner,
}

#[derive(Debug, Serialize)]
pub struct DeletedMembership {
    pub membership_id: Uuid,
    pub member_name: String,
    pub membership_type: MembershipType,
}

#[derive(Debug, Serialize)]
pub struct DeleteMembershipResponse {
    pub message: String,
    pub deleted_membership: DeletedMembership,
}

impl Membership {
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        member_id: Uuid,
        membership_type: MembershipType,
        purchase_date: DateTime<Utc>,
        expiration_date: DateTime<Utc>,
    ) -> Result<Self, sqlx::Error> {
        let status = MembershipStatus::for_expiration(expiration_date, Utc::now());

        sqlx::query_as::<_, Membership>(&format!(
            r#"
            INSERT INTO memberships
                (membership_id, member_id, membership_type, purchase_date, expiration_date, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {MEMBERSHIP_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(member_id)
        .bind(membership_type)
        .bind(purchase_date)
        .bind(expiration_date)
        .bind(status)
        .fetch_one(executor)
        .await
    }

    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        membership_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Membership>(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM memberships WHERE membership_id = $1"
        ))
        .bind(membership_id)
        .fetch_optional(executor)
        .await
    }

    pub async fn delete<'e, E: PgExecutor<'e>>(
        executor: E,
        membership_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM memberships WHERE membership_id = $1")
            .bind(membership_id)
            .execute(executor)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// The membership that governs access: among rows that are ACTIVE and
    /// not yet past their expiration, the one expiring last. Validity is
    /// decided here, at read time, independent of the background sweep.
    pub async fn authoritative_active<'e, E: PgExecutor<'e>>(
        executor: E,
        member_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Membership>(&format!(
            r#"
            SELECT {MEMBERSHIP_COLUMNS}
            FROM memberships
            WHERE member_id = $1
              AND status = 'ACTIVE'
              AND expiration_date > NOW()
            ORDER BY expiration_date DESC
            LIMIT 1
            "#
        ))
        .bind(member_id)
        .fetch_optional(executor)
        .await
    }

    pub async fn list_for_member(pool: &PgPool, member_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Membership>(&format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM memberships WHERE member_id = $1 ORDER BY created_at DESC"
        ))
        .bind(member_id)
        .fetch_all(pool)
        .await
    }

    pub async fn list_for_members(
        pool: &PgPool,
        member_ids: &[Uuid],
    ) -> Result<Vec<Self>, sqlx::Error> {
        if member_ids.is_empty() {
            return Ok(Vec::new());
        }
        sqlx::query_as::<_, Membership>(&format!(
            r#"
            SELECT {MEMBERSHIP_COLUMNS}
            FROM memberships
            WHERE member_id = ANY($1)
            ORDER BY created_at DESC
            "#
        ))
        .bind(member_ids)
        .fetch_all(pool)
        .await
    }
}

impl MembershipOwner {
    pub async fn find<'e, E: PgExecutor<'e>>(
        executor: E,
        member_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, MembershipOwner>(
            "SELECT first_name, last_name, email FROM members WHERE member_id = $1",
        )
        .bind(member_id)
        .fetch_optional(executor)
        .await
    }
}

/// Flips every ACTIVE membership past its expiration to EXPIRED. Returns the
/// number of rows changed.
pub async fn expire_memberships(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE memberships
        SET status = 'EXPIRED'
        WHERE status = 'ACTIVE' AND expiration_date <= NOW()
        "#,
    )
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn status_follows_expiration() {
        let now = Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap();
        assert_eq!(
            MembershipStatus::for_expiration(now + Duration::days(30), now),
            MembershipStatus::Active
        );
        assert_eq!(
            MembershipStatus::for_expiration(now - Duration::seconds(1), now),
            MembershipStatus::Expired
        );
        assert_eq!(MembershipStatus::for_expiration(now, now), MembershipStatus::Expired);
    }

    #[test]
    fn parses_dates_and_timestamps() {
        assert_eq!(
            parse_iso_datetime("2025-01-31"),
            Some(Utc.with_ymd_and_hms(2025, 1, 31, 0, 0, 0).unwrap())
        );
        assert_eq!(
            parse_iso_datetime("2025-01-31T10:00:00+02:00"),
            Some(Utc.with_ymd_and_hms(2025, 1, 31, 8, 0, 0).unwrap())
        );
        assert_eq!(parse_iso_datetime("31/01/2025"), None);
    }

    #[test]
    fn membership_request_rejects_bad_dates() {
        let req: CreateMembershipRequest = serde_json::from_value(serde_json::json!({
            "member_id": Uuid::new_v4(),
            "membership_type": "MONTHLY",
            "purchase_date": "2025-01-01",
            "expiration_date": "next month"
        }))
        .unwrap();

        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("expiration_date"));
        assert!(!errors.field_errors().contains_key("purchase_date"));
    }

    #[test]
    fn unknown_membership_type_does_not_deserialize() {
        let parsed = serde_json::from_value::<CreateMembershipRequest>(serde_json::json!({
            "member_id": Uuid::new_v4(),
            "membership_type": "WEEKLY",
            "purchase_date": "2025-01-01",
            "expiration_date": "2025-02-01"
        }));
        assert!(parsed.is_err());
    }
}
