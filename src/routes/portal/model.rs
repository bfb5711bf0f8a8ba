use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Days, Local, Months, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::routes::gamification::model::{EarnedBadge, Notification};
use crate::routes::membership::model::MembershipType;
use crate::scoring::consecutive_visit_days;

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;
/// Visits in a month that count as full activity.
const FULL_ACTIVITY_VISITS: f64 = 30.0;

#[derive(Debug, Serialize)]
pub struct DashboardMember {
    pub member_id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub member_since: DateTime<Utc>,
    pub qr_code: String,
    pub total_points: i64,
    pub level: i32,
}

#[derive(Debug, Serialize)]
pub struct DashboardMembership {
    #[serde(rename = "type")]
    pub membership_type: MembershipType,
    pub purchase_date: DateTime<Utc>,
    pub expiration_date: DateTime<Utc>,
    pub days_until_expiration: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisitStats {
    pub total_visits: i64,
    pub this_month_visits: usize,
    pub last_month_visits: usize,
    pub current_streak: u32,
    pub activity_percentage: f64,
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub member: DashboardMember,
    pub membership: Option<DashboardMembership>,
    pub stats: VisitStats,
    pub badges: Vec<EarnedBadge>,
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct CalendarResponse {
    pub year: i32,
    pub month: u32,
    pub activity: BTreeMap<NaiveDate, u32>,
}

/// Whole days left on a membership, rounded up; zero once expired.
pub fn days_until(expiration: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let seconds = (expiration - now).num_seconds();
    if seconds <= 0 {
        0
    } else {
        (seconds + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY
    }
}

pub fn month_start(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
}

/// Half-open `[start, end)` bounds of a local calendar month.
pub fn local_month_bounds(start: NaiveDate) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let end = start.checked_add_months(Months::new(1))?;
    Some((local_midnight(start)?, local_midnight(end)?))
}

/// Start of `day` in server-local time.
pub fn local_midnight(day: NaiveDate) -> Option<DateTime<Utc>> {
    Local
        .from_local_datetime(&day.and_hms_opt(0, 0, 0)?)
        .earliest()
        .map(|ts| ts.with_timezone(&Utc))
}

/// First day of last month: the oldest scan the monthly stats look at.
pub fn stats_window_start(today: NaiveDate) -> NaiveDate {
    let this_month = today.with_day(1).unwrap_or(today);
    this_month
        .checked_sub_months(Months::new(1))
        .unwrap_or(this_month)
}

/// Whether a streak ending today starts on or before `window_start`, so the
/// scans before the window may extend it.
pub fn streak_reaches_window(streak: u32, window_start: NaiveDate, today: NaiveDate) -> bool {
    if streak == 0 {
        return false;
    }
    match today.checked_sub_days(Days::new(u64::from(streak - 1))) {
        Some(first_day) => first_day <= window_start,
        None => true,
    }
}

fn scan_days(scans: &[DateTime<Utc>]) -> Vec<NaiveDate> {
    scans
        .iter()
        .map(|ts| ts.with_timezone(&Local).date_naive())
        .collect()
}

pub fn current_streak(scans: &[DateTime<Utc>], today: NaiveDate) -> u32 {
    consecutive_visit_days(&scan_days(scans), today)
}

/// Summarizes the granted scans since [`stats_window_start`] relative to
/// `today` in server-local time. `total_visits` is the all-time count.
pub fn visit_stats(total_visits: i64, recent: &[DateTime<Utc>], today: NaiveDate) -> VisitStats {
    let days = scan_days(recent);

    let this_month = today.with_day(1).unwrap_or(today);
    let last_month = stats_window_start(today);

    let this_month_visits = days.iter().filter(|d| **d >= this_month).count();
    let last_month_visits = days
        .iter()
        .filter(|d| **d >= last_month && **d < this_month)
        .count();

    VisitStats {
        total_visits,
        this_month_visits,
        last_month_visits,
        current_streak: consecutive_visit_days(&days, today),
        activity_percentage: (this_month_visits as f64 / FULL_ACTIVITY_VISITS * 100.0).min(100.0),
    }
}

pub fn activity_by_day(scans: &[DateTime<Utc>]) -> BTreeMap<NaiveDate, u32> {
    let mut activity = BTreeMap::new();
    for ts in scans {
        *activity
            .entry(ts.with_timezone(&Local).date_naive())
            .or_insert(0) += 1;
    }
    activity
}

pub async fn count_granted_scans(pool: &PgPool, member_id: Uuid) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM access_logs WHERE member_id = $1 AND result = 'GRANTED'",
    )
    .bind(member_id)
    .fetch_one(pool)
    .await
}

/// Granted scan times for a member, optionally bounded to `[from, to)`.
pub async fn granted_scans(
    pool: &PgPool,
    member_id: Uuid,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> Result<Vec<DateTime<Utc>>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT scan_time
        FROM access_logs
        WHERE member_id = $1
          AND result = 'GRANTED'
          AND ($2::timestamptz IS NULL OR scan_time >= $2)
          AND ($3::timestamptz IS NULL OR scan_time < $3)
        ORDER BY scan_time DESC
        "#,
    )
    .bind(member_id)
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await
}
