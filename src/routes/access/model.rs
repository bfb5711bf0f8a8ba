use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::routes::member::model::MemberContact;
use crate::routes::membership::model::MembershipType;
use crate::utils::validate_not_blank;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "access_result", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum AccessResult {
    Granted,
    Denied,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AccessLog {
    pub log_id: Uuid,
    pub member_id: Option<Uuid>,
    pub scanned_by: Option<Uuid>,
    pub result: AccessResult,
    pub scan_time: DateTime<Utc>,
}

impl AccessLog {
    /// Appends a scan attempt. `member_id` is `None` for tokens that match
    /// no member.
    pub async fn record<'e, E: PgExecutor<'e>>(
        executor: E,
        member_id: Option<Uuid>,
        scanned_by: Uuid,
        result: AccessResult,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, AccessLog>(
            r#"
            INSERT INTO access_logs (log_id, member_id, scanned_by, result)
            VALUES ($1, $2, $3, $4)
            RETURNING log_id, member_id, scanned_by, result, scan_time
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(member_id)
        .bind(scanned_by)
        .bind(result)
        .fetch_one(executor)
        .await
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ValidateAccessRequest {
    #[validate(custom(function = "validate_not_blank"))]
    pub qr_code: String,
}

// ── Scan outcome ──

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScannedMember {
    pub member_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MembershipSummary {
    pub membership_id: Uuid,
    pub membership_type: MembershipType,
    pub purchase_date: DateTime<Utc>,
    pub expiration_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct PointsAwarded {
    pub earned: i32,
    pub streak: i32,
    pub multiplier: f64,
    pub total: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_level: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct AccessGranted {
    pub access: bool,
    pub message: String,
    pub member: ScannedMember,
    pub membership: MembershipSummary,
    pub points: PointsAwarded,
}

#[derive(Debug, Serialize)]
pub struct AccessDenied {
    pub access: bool,
    pub message: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member: Option<MemberContact>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum AccessOutcome {
    Granted(AccessGranted),
    Denied(AccessDenied),
}

impl AccessOutcome {
    pub fn denied(reason: &str, member: Option<MemberContact>) -> Self {
        AccessOutcome::Denied(AccessDenied {
            access: false,
            message: "Access Denied".into(),
            reason: reason.into(),
            member,
        })
    }
}

// ── Log listing ──

pub const LOGS_DEFAULT_LIMIT: i64 = 50;
pub const LOGS_MAX_LIMIT: i64 = 200;

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl LogsQuery {
    /// `(page, limit)` with page ≥ 1 and limit within `1..=200`.
    pub fn normalized(&self) -> (i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self
            .limit
            .unwrap_or(LOGS_DEFAULT_LIMIT)
            .clamp(1, LOGS_MAX_LIMIT);
        (page, limit)
    }
}

/// Rows to skip for a 1-based page; `None` when the page is too large to
/// address.
pub fn page_offset(page: i64, limit: i64) -> Option<i64> {
    page.checked_sub(1)?.checked_mul(limit)
}

#[derive(Debug, FromRow)]
pub struct AccessLogRow {
    pub log_id: Uuid,
    pub member_id: Option<Uuid>,
    pub scanned_by: Option<Uuid>,
    pub result: AccessResult,
    pub scan_time: DateTime<Utc>,
    pub member_first_name: Option<String>,
    pub member_last_name: Option<String>,
    pub member_email: Option<String>,
    pub staff_first_name: Option<String>,
    pub staff_last_name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoggedMember {
    pub member_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct LoggedStaff {
    pub staff_id: Uuid,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Serialize)]
pub struct AccessLogEntry {
    pub log_id: Uuid,
    pub result: AccessResult,
    pub scan_time: DateTime<Utc>,
    pub member: Option<LoggedMember>,
    pub scanned_by: Option<LoggedStaff>,
}

impl From<AccessLogRow> for AccessLogEntry {
    fn from(row: AccessLogRow) -> Self {
        let member = match (row.member_id, row.member_first_name, row.member_last_name) {
            (Some(member_id), Some(first_name), Some(last_name)) => Some(LoggedMember {
                member_id,
                first_name,
                last_name,
                email: row.member_email.unwrap_or_default(),
            }),
            _ => None,
        };
        let scanned_by = match (row.scanned_by, row.staff_first_name, row.staff_last_name) {
            (Some(staff_id), Some(first_name), Some(last_name)) => Some(LoggedStaff {
                staff_id,
                first_name,
                last_name,
            }),
            _ => None,
        };
        AccessLogEntry {
            log_id: row.log_id,
            result: row.result,
            scan_time: row.scan_time,
            member,
            scanned_by,
        }
    }
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub pages: i64,
}

impl Pagination {
    pub fn new(page: i64, limit: i64, total: i64) -> Self {
        let pages = if total == 0 { 0 } else { (total + limit - 1) / limit };
        Pagination {
            page,
            limit,
            total,
            pages,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AccessLogsResponse {
    pub logs: Vec<AccessLogEntry>,
    pub pagination: Pagination,
}

impl AccessLogRow {
    pub async fn page(pool: &PgPool, offset: i64, limit: i64) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, AccessLogRow>(
            r#"
            SELECT l.log_id, l.member_id, l.scanned_by, l.result, l.scan_time,
                   m.first_name AS member_first_name,
                   m.last_name AS member_last_name,
                   m.email AS member_email,
                   s.first_name AS staff_first_name,
                   s.last_name AS staff_last_name
            FROM access_logs l
            LEFT JOIN members m ON m.member_id = l.member_id
            LEFT JOIN staff s ON s.staff_id = l.scanned_by
            ORDER BY l.scan_time DESC
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM access_logs")
            .fetch_one(pool)
            .await
    }
}
