use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::{FromRow, PgExecutor, PgPool};
use uuid::Uuid;
use validator::Validate;

use crate::routes::member::model::Member;

// ── Daily points ──

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DailyPoints {
    pub daily_points_id: Uuid,
    pub member_id: Uuid,
    pub date: NaiveDate,
    pub base_points: i32,
    pub streak_multiplier: f64,
    pub total_points: i32,
    pub created_at: DateTime<Utc>,
}

const DAILY_POINTS_COLUMNS: &str =
    "daily_points_id, member_id, date, base_points, streak_multiplier, total_points, created_at";

impl DailyPoints {
    pub async fn exists_for<'e, E: PgExecutor<'e>>(
        executor: E,
        member_id: Uuid,
        date: NaiveDate,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM daily_points WHERE member_id = $1 AND date = $2)",
        )
        .bind(member_id)
        .bind(date)
        .fetch_one(executor)
        .await
    }

    /// Inserts the day's award unless one already exists for
    /// `(member_id, date)`; `None` means the day was already awarded.
    pub async fn insert_if_absent<'e, E: PgExecutor<'e>>(
        executor: E,
        member_id: Uuid,
        date: NaiveDate,
        base_points: i32,
        streak_multiplier: f64,
        total_points: i32,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, DailyPoints>(&format!(
            r#"
            INSERT INTO daily_points
                (daily_points_id, member_id, date, base_points, streak_multiplier, total_points)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (member_id, date) DO NOTHING
            RETURNING {DAILY_POINTS_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(member_id)
        .bind(date)
        .bind(base_points)
        .bind(streak_multiplier)
        .bind(total_points)
        .fetch_optional(executor)
        .await
    }

    pub async fn recent(pool: &PgPool, member_id: Uuid, limit: i64) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, DailyPoints>(&format!(
            r#"
            SELECT {DAILY_POINTS_COLUMNS}
            FROM daily_points
            WHERE member_id = $1
            ORDER BY date DESC
            LIMIT $2
            "#
        ))
        .bind(member_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    pub async fn count_for(pool: &PgPool, member_id: Uuid) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM daily_points WHERE member_id = $1")
            .bind(member_id)
            .fetch_one(pool)
            .await
    }
}

// ── Notifications ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "notification_type", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum NotificationType {
    Achievement,
    Success,
    Warning,
    Promotion,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Notification {
    pub notification_id: Uuid,
    pub member_id: Uuid,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: NotificationType,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

const NOTIFICATION_COLUMNS: &str =
    "notification_id, member_id, title, message, type, is_read, created_at";

#[derive(Debug, Deserialize)]
pub struct NotificationsQuery {
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Serialize)]
pub struct NotificationsResponse {
    pub notifications: Vec<Notification>,
}

pub fn level_up_message(level: i32) -> (String, String) {
    (
        "Level Up! 🎉".to_string(),
        format!("Congratulations! You've reached level {level}!"),
    )
}

impl Notification {
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        member_id: Uuid,
        title: &str,
        message: &str,
        kind: NotificationType,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Notification>(&format!(
            r#"
            INSERT INTO notifications (notification_id, member_id, title, message, type)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(member_id)
        .bind(title)
        .bind(message)
        .bind(kind)
        .fetch_one(executor)
        .await
    }

    pub async fn list_for_member(
        pool: &PgPool,
        member_id: Uuid,
        unread_only: bool,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Notification>(&format!(
            r#"
            SELECT {NOTIFICATION_COLUMNS}
            FROM notifications
            WHERE member_id = $1 AND (NOT $2 OR is_read = FALSE)
            ORDER BY created_at DESC
            LIMIT $3
            "#
        ))
        .bind(member_id)
        .bind(unread_only)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Marks one of `member_id`'s notifications read. `false` when no such
    /// notification belongs to the member.
    pub async fn mark_read(
        pool: &PgPool,
        notification_id: Uuid,
        member_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE WHERE notification_id = $1 AND member_id = $2",
        )
        .bind(notification_id)
        .bind(member_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

// ── Badges ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "badge_rarity", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum BadgeRarity {
    Common,
    Rare,
    Epic,
    Legendary,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Badge {
    pub badge_id: Uuid,
    pub name: String,
    pub description: String,
    pub icon_url: String,
    pub rarity: BadgeRarity,
    pub point_value: i32,
    pub criteria: Option<String>,
    pub created_at: DateTime<Utc>,
}

const BADGE_COLUMNS: &str =
    "badge_id, name, description, icon_url, rarity, point_value, criteria, created_at";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MemberBadge {
    pub member_badge_id: Uuid,
    pub member_id: Uuid,
    pub badge_id: Uuid,
    pub earned_date: DateTime<Utc>,
}

/// A badge as shown on a profile.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct EarnedBadge {
    pub badge_id: Uuid,
    pub name: String,
    pub description: String,
    pub icon_url: String,
    pub rarity: BadgeRarity,
    pub point_value: i32,
    pub earned_date: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AwardBadgeRequest {
    pub member_id: Uuid,
    pub badge_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct AwardedBadge {
    #[serde(flatten)]
    pub member_badge: MemberBadge,
    pub badge: Badge,
}

#[derive(Debug, Serialize)]
pub struct AwardBadgeResponse {
    pub message: String,
    pub member_badge: AwardedBadge,
    pub points_awarded: i32,
    pub level: i32,
}

impl Badge {
    pub async fn find<'e, E: PgExecutor<'e>>(
        executor: E,
        badge_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Badge>(&format!("SELECT {BADGE_COLUMNS} FROM badges WHERE badge_id = $1"))
            .bind(badge_id)
            .fetch_optional(executor)
            .await
    }

    pub async fn list(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Badge>(&format!(
            "SELECT {BADGE_COLUMNS} FROM badges ORDER BY rarity, name"
        ))
        .fetch_all(pool)
        .await
    }
}

impl MemberBadge {
    /// `None` when the member already holds the badge.
    pub async fn insert_if_absent<'e, E: PgExecutor<'e>>(
        executor: E,
        member_id: Uuid,
        badge_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, MemberBadge>(
            r#"
            INSERT INTO member_badges (member_badge_id, member_id, badge_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (member_id, badge_id) DO NOTHING
            RETURNING member_badge_id, member_id, badge_id, earned_date
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(member_id)
        .bind(badge_id)
        .fetch_optional(executor)
        .await
    }
}

impl EarnedBadge {
    pub async fn for_member(pool: &PgPool, member_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, EarnedBadge>(
            r#"
            SELECT b.badge_id, b.name, b.description, b.icon_url, b.rarity, b.point_value,
                   mb.earned_date
            FROM member_badges mb
            JOIN badges b ON b.badge_id = mb.badge_id
            WHERE mb.member_id = $1
            ORDER BY mb.earned_date DESC
            "#,
        )
        .bind(member_id)
        .fetch_all(pool)
        .await
    }
}

// ── Leaderboard ──

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaderboardType {
    #[default]
    All,
    Weekly,
    Monthly,
}

impl LeaderboardType {
    /// Unrecognized names fall back to the all-time board.
    pub fn from_name(name: &str) -> Self {
        match name {
            "weekly" => LeaderboardType::Weekly,
            "monthly" => LeaderboardType::Monthly,
            _ => LeaderboardType::All,
        }
    }

    /// Earliest last-visit a member may have to be listed; `None` lists
    /// everyone.
    pub fn active_since(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            LeaderboardType::All => None,
            LeaderboardType::Weekly => Some(now - chrono::Duration::days(7)),
            LeaderboardType::Monthly => Some(now.checked_sub_months(Months::new(1)).unwrap_or(now)),
        }
    }
}

pub const LEADERBOARD_DEFAULT_LIMIT: i64 = 50;
pub const LEADERBOARD_MAX_LIMIT: i64 = 100;

fn leaderboard_type_lenient<'de, D>(deserializer: D) -> Result<LeaderboardType, D::Error>
where
    D: Deserializer<'de>,
{
    let name = String::deserialize(deserializer)?;
    Ok(LeaderboardType::from_name(&name))
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    #[serde(default, rename = "type", deserialize_with = "leaderboard_type_lenient")]
    pub kind: LeaderboardType,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct LeaderboardRow {
    pub member_id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub total_points: i64,
    pub current_streak: i32,
    pub level: i32,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardEntry {
    #[serde(flatten)]
    pub row: LeaderboardRow,
    pub rank: usize,
    pub display_name: String,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardResponse {
    pub leaderboard: Vec<LeaderboardEntry>,
    #[serde(rename = "type")]
    pub kind: LeaderboardType,
    pub limit: i64,
}

impl LeaderboardRow {
    /// Ranked by all-time points; the window only filters who is listed.
    pub async fn top(
        pool: &PgPool,
        active_since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, LeaderboardRow>(
            r#"
            SELECT member_id, username, first_name, last_name, total_points,
                   current_streak, level, avatar_url
            FROM members
            WHERE $1::timestamptz IS NULL OR last_visit_date >= $1
            ORDER BY total_points DESC, longest_streak DESC, username ASC
            LIMIT $2
            "#,
        )
        .bind(active_since)
        .bind(limit)
        .fetch_all(pool)
        .await
    }
}

pub fn rank_entries(rows: Vec<LeaderboardRow>) -> Vec<LeaderboardEntry> {
    rows.into_iter()
        .enumerate()
        .map(|(index, row)| {
            let display_name = if row.username.is_empty() {
                format!("{} {}", row.first_name, row.last_name)
            } else {
                row.username.clone()
            };
            LeaderboardEntry {
                row,
                rank: index + 1,
                display_name,
            }
        })
        .collect()
}

// ── Profile and stats ──

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(max = 500, message = "must be at most 500 characters"))]
    pub bio: Option<String>,
    #[validate(url)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProfileMember {
    pub member_id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub total_points: i64,
    pub current_streak: i32,
    pub longest_streak: i32,
    pub level: i32,
    pub experience: i64,
    pub exp_to_next_level: i64,
    pub rank: i64,
    pub member_since: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub member: ProfileMember,
    pub badges: Vec<EarnedBadge>,
    pub recent_points: Vec<DailyPoints>,
}

#[derive(Debug, Serialize, FromRow)]
pub struct ProfileSummary {
    pub member_id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UpdateProfileResponse {
    pub member: ProfileSummary,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct MemberStats {
    pub total_visits: i64,
    pub total_days_with_points: i64,
    pub weekly_visits: i64,
    pub monthly_visits: i64,
    pub total_points: i64,
    pub current_streak: i32,
    pub longest_streak: i32,
    pub level: i32,
    pub experience: i64,
    pub avg_points_per_visit: f64,
}

pub fn average_points_per_visit(total_points: i64, total_visits: i64) -> f64 {
    if total_visits <= 0 {
        return 0.0;
    }
    let avg = total_points as f64 / total_visits as f64;
    (avg * 100.0).round() / 100.0
}

/// Position on the all-time board: one more than the members strictly ahead.
pub async fn global_rank(pool: &PgPool, total_points: i64) -> Result<i64, sqlx::Error> {
    let ahead: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM members WHERE total_points > $1")
        .bind(total_points)
        .fetch_one(pool)
        .await?;
    Ok(ahead + 1)
}

pub async fn update_profile(
    pool: &PgPool,
    member_id: Uuid,
    req: &UpdateProfileRequest,
) -> Result<Option<ProfileSummary>, sqlx::Error> {
    sqlx::query_as::<_, ProfileSummary>(
        r#"
        UPDATE members
        SET bio = COALESCE($2, bio),
            avatar_url = COALESCE($3, avatar_url),
            updated_at = NOW()
        WHERE member_id = $1
        RETURNING member_id, username, first_name, last_name, bio, avatar_url
        "#,
    )
    .bind(member_id)
    .bind(req.bio.as_deref().filter(|b| !b.is_empty()))
    .bind(req.avatar_url.as_deref().filter(|u| !u.is_empty()))
    .fetch_optional(pool)
    .await
}

impl ProfileMember {
    pub fn new(member: Member, rank: i64) -> Self {
        ProfileMember {
            exp_to_next_level: crate::scoring::experience_to_next_level(
                member.level,
                member.experience,
            ),
            member_id: member.member_id,
            username: member.username,
            first_name: member.first_name,
            last_name: member.last_name,
            email: member.email,
            avatar_url: member.avatar_url,
            bio: member.bio,
            total_points: member.total_points,
            current_streak: member.current_streak,
            longest_streak: member.longest_streak,
            level: member.level,
            experience: member.experience,
            rank,
            member_since: member.member_since,
        }
    }
}
