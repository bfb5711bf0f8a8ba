use axum::{
    Extension, Json,
    extract::{Path, State},
};
use chrono::{Duration, Months, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    AppState,
    error::{AppError, AppResult},
    extract::{ApiQuery, ValidatedJson},
    routes::member::model::Member,
    scoring,
    utils::Claims,
};

use super::model::{
    AwardBadgeRequest, AwardBadgeResponse, AwardedBadge, Badge, DailyPoints, EarnedBadge,
    LEADERBOARD_DEFAULT_LIMIT, LEADERBOARD_MAX_LIMIT, LeaderboardQuery, LeaderboardResponse,
    LeaderboardRow, MemberBadge, MemberStats, Notification, NotificationType, NotificationsQuery,
    NotificationsResponse, ProfileMember, ProfileResponse, UpdateProfileRequest,
    UpdateProfileResponse, average_points_per_visit, global_rank, level_up_message, rank_entries,
    update_profile,
};

const NOTIFICATIONS_LIMIT: i64 = 50;
const RECENT_POINTS_LIMIT: i64 = 30;

async fn load_member(pool: &PgPool, member_id: Uuid) -> AppResult<Member> {
    Member::find_by_id(pool, member_id)
        .await?
        .ok_or(AppError::NotFound("Member"))
}

#[axum::debug_handler]
pub async fn leaderboard(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<LeaderboardQuery>,
) -> AppResult<Json<LeaderboardResponse>> {
    let limit = query
        .limit
        .unwrap_or(LEADERBOARD_DEFAULT_LIMIT)
        .clamp(1, LEADERBOARD_MAX_LIMIT);
    let rows = LeaderboardRow::top(&state.pool, query.kind.active_since(Utc::now()), limit).await?;

    Ok(Json(LeaderboardResponse {
        leaderboard: rank_entries(rows),
        kind: query.kind,
        limit,
    }))
}

#[axum::debug_handler]
pub async fn get_profile(
    State(state): State<AppState>,
    Path(member_id): Path<Uuid>,
) -> AppResult<Json<ProfileResponse>> {
    let member = load_member(&state.pool, member_id).await?;
    let rank = global_rank(&state.pool, member.total_points).await?;
    let badges = EarnedBadge::for_member(&state.pool, member_id).await?;
    let recent_points = DailyPoints::recent(&state.pool, member_id, RECENT_POINTS_LIMIT).await?;

    Ok(Json(ProfileResponse {
        member: ProfileMember::new(member, rank),
        badges,
        recent_points,
    }))
}

#[axum::debug_handler]
pub async fn patch_profile(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(member_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateProfileRequest>,
) -> AppResult<Json<UpdateProfileResponse>> {
    claims.require_self_or_staff(member_id)?;

    let member = update_profile(&state.pool, member_id, &req)
        .await?
        .ok_or(AppError::NotFound("Member"))?;

    Ok(Json(UpdateProfileResponse { member }))
}

async fn granted_visits_since(
    pool: &PgPool,
    member_id: Uuid,
    since: Option<chrono::DateTime<Utc>>,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM access_logs
        WHERE member_id = $1
          AND result = 'GRANTED'
          AND ($2::timestamptz IS NULL OR scan_time >= $2)
        "#,
    )
    .bind(member_id)
    .bind(since)
    .fetch_one(pool)
    .await
}

#[axum::debug_handler]
pub async fn member_stats(
    State(state): State<AppState>,
    Path(member_id): Path<Uuid>,
) -> AppResult<Json<MemberStats>> {
    let member = load_member(&state.pool, member_id).await?;

    let now = Utc::now();
    let total_visits = granted_visits_since(&state.pool, member_id, None).await?;
    let weekly_visits =
        granted_visits_since(&state.pool, member_id, Some(now - Duration::days(7))).await?;
    let monthly_visits = granted_visits_since(
        &state.pool,
        member_id,
        Some(now.checked_sub_months(Months::new(1)).unwrap_or(now)),
    )
    .await?;
    let total_days_with_points = DailyPoints::count_for(&state.pool, member_id).await?;

    Ok(Json(MemberStats {
        total_visits,
        total_days_with_points,
        weekly_visits,
        monthly_visits,
        total_points: member.total_points,
        current_streak: member.current_streak,
        longest_streak: member.longest_streak,
        level: member.level,
        experience: member.experience,
        avg_points_per_visit: average_points_per_visit(member.total_points, total_visits),
    }))
}

#[axum::debug_handler]
pub async fn notifications(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(member_id): Path<Uuid>,
    ApiQuery(query): ApiQuery<NotificationsQuery>,
) -> AppResult<Json<NotificationsResponse>> {
    claims.require_self_or_staff(member_id)?;

    let notifications =
        Notification::list_for_member(&state.pool, member_id, query.unread_only, NOTIFICATIONS_LIMIT)
            .await?;
    Ok(Json(NotificationsResponse { notifications }))
}

#[axum::debug_handler]
pub async fn mark_notification_read(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(notification_id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let member_id = claims.member_id()?;

    if !Notification::mark_read(&state.pool, notification_id, member_id).await? {
        return Err(AppError::NotFound("Notification"));
    }
    Ok(Json(serde_json::json!({ "message": "Notification marked as read" })))
}

#[axum::debug_handler]
pub async fn list_badges(State(state): State<AppState>) -> AppResult<Json<Vec<Badge>>> {
    Ok(Json(Badge::list(&state.pool).await?))
}

#[axum::debug_handler]
pub async fn award_badge(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<AwardBadgeRequest>,
) -> AppResult<Json<AwardBadgeResponse>> {
    claims.require_admin()?;

    let mut tx = state.pool.begin().await?;
    let badge = Badge::find(&mut *tx, req.badge_id)
        .await?
        .ok_or(AppError::NotFound("Badge"))?;
    let member = Member::find_by_id_for_update(&mut *tx, req.member_id)
        .await?
        .ok_or(AppError::NotFound("Member"))?;

    let member_badge = MemberBadge::insert_if_absent(&mut *tx, member.member_id, badge.badge_id)
        .await?
        .ok_or_else(|| AppError::Conflict("Member already has this badge".into()))?;

    let progress = member.progress();
    let (total_points, experience, level) = scoring::grant_points(&progress, badge.point_value);
    Member::apply_points(&mut *tx, member.member_id, total_points, experience, level).await?;

    Notification::create(
        &mut *tx,
        member.member_id,
        "New Badge Earned! 🏆",
        &format!(
            "You earned the \"{}\" badge and {} points!",
            badge.name, badge.point_value
        ),
        NotificationType::Achievement,
    )
    .await?;
    if level > progress.level {
        let (title, message) = level_up_message(level);
        Notification::create(
            &mut *tx,
            member.member_id,
            &title,
            &message,
            NotificationType::Achievement,
        )
        .await?;
    }
    tx.commit().await?;

    tracing::info!(
        "Awarded badge {} to member {} (+{} points)",
        badge.name,
        member.member_id,
        badge.point_value
    );

    Ok(Json(AwardBadgeResponse {
        message: "Badge awarded successfully".into(),
        points_awarded: badge.point_value,
        level,
        member_badge: AwardedBadge {
            member_badge,
            badge,
        },
    }))
}
