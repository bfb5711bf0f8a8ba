use axum::{Extension, Json, extract::State};
use chrono::{Datelike, Local, Utc};

use crate::{
    AppState,
    error::{AppError, AppResult},
    extract::ApiQuery,
    qr::qr_data_url,
    routes::{
        gamification::model::{EarnedBadge, Notification},
        member::model::{Member, QrCodeResponse},
        membership::model::Membership,
    },
    utils::Claims,
};

use super::model::{
    CalendarQuery, CalendarResponse, DashboardMember, DashboardMembership, DashboardResponse,
    activity_by_day, count_granted_scans, current_streak, days_until, granted_scans,
    local_midnight, local_month_bounds, month_start, stats_window_start, streak_reaches_window,
    visit_stats,
};

const DASHBOARD_NOTIFICATIONS: i64 = 10;

async fn current_member(state: &AppState, claims: &Claims) -> AppResult<Member> {
    let member_id = claims.member_id()?;
    Member::find_by_id(&state.pool, member_id)
        .await?
        .ok_or(AppError::NotFound("Member"))
}

#[axum::debug_handler]
pub async fn dashboard(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
) -> AppResult<Json<DashboardResponse>> {
    let member = current_member(&state, &claims).await?;
    let now = Utc::now();

    let membership = Membership::authoritative_active(&state.pool, member.member_id)
        .await?
        .map(|m| DashboardMembership {
            membership_type: m.membership_type,
            purchase_date: m.purchase_date,
            expiration_date: m.expiration_date,
            days_until_expiration: days_until(m.expiration_date, now),
        });

    let today = Local::now().date_naive();
    let window_start = stats_window_start(today);
    let total_visits = count_granted_scans(&state.pool, member.member_id).await?;
    let recent = granted_scans(
        &state.pool,
        member.member_id,
        local_midnight(window_start),
        None,
    )
    .await?;
    let mut stats = visit_stats(total_visits, &recent, today);
    if streak_reaches_window(stats.current_streak, window_start, today) {
        let history = granted_scans(&state.pool, member.member_id, None, None).await?;
        stats.current_streak = current_streak(&history, today);
    }
    let badges = EarnedBadge::for_member(&state.pool, member.member_id).await?;
    let notifications = Notification::list_for_member(
        &state.pool,
        member.member_id,
        false,
        DASHBOARD_NOTIFICATIONS,
    )
    .await?;

    Ok(Json(DashboardResponse {
        member: DashboardMember {
            member_id: member.member_id,
            username: member.username,
            first_name: member.first_name,
            last_name: member.last_name,
            email: member.email,
            phone_number: member.phone_number,
            member_since: member.member_since,
            qr_code: member.qr_code,
            total_points: member.total_points,
            level: member.level,
        },
        membership,
        stats,
        badges,
        notifications,
    }))
}

#[axum::debug_handler]
pub async fn my_qr_code(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
) -> AppResult<Json<QrCodeResponse>> {
    let member = current_member(&state, &claims).await?;
    let qr_code_image = qr_data_url(&member.qr_code)?;

    Ok(Json(QrCodeResponse {
        qr_code: member.qr_code,
        qr_code_image,
        member: None,
    }))
}

#[axum::debug_handler]
pub async fn activity_calendar(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<CalendarQuery>,
) -> AppResult<Json<CalendarResponse>> {
    let member_id = claims.member_id()?;

    let today = Local::now().date_naive();
    let year = query.year.unwrap_or(today.year());
    let month = query.month.unwrap_or(today.month());
    let start = month_start(year, month)
        .ok_or_else(|| AppError::BadRequest("Invalid year or month".into()))?;
    let (from, to) = local_month_bounds(start)
        .ok_or_else(|| AppError::BadRequest("Invalid year or month".into()))?;

    let scans = granted_scans(&state.pool, member_id, Some(from), Some(to)).await?;

    Ok(Json(CalendarResponse {
        year,
        month,
        activity: activity_by_day(&scans),
    }))
}
