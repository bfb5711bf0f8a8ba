use axum::{Extension, Json, extract::State};
use chrono::Local;

use crate::{
    AppState,
    error::{AppError, AppResult},
    extract::{ApiQuery, ValidatedJson},
    utils::Claims,
};

use super::{
    model::{
        AccessLogEntry, AccessLogRow, AccessLogsResponse, AccessOutcome, LogsQuery, Pagination,
        ValidateAccessRequest, page_offset,
    },
    scan::validate_qr,
};

#[axum::debug_handler]
pub async fn validate_access(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ValidateAccessRequest>,
) -> AppResult<Json<AccessOutcome>> {
    let staff_id = claims.staff_id()?;
    // 以服务器本地日期为准
    let today = Local::now().date_naive();

    let outcome = validate_qr(&state.pool, &req.qr_code, staff_id, today).await?;
    Ok(Json(outcome))
}

#[axum::debug_handler]
pub async fn access_logs(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<LogsQuery>,
) -> AppResult<Json<AccessLogsResponse>> {
    claims.staff_id()?;

    let (page, limit) = query.normalized();
    let offset =
        page_offset(page, limit).ok_or_else(|| AppError::BadRequest("Invalid page".into()))?;
    let rows = AccessLogRow::page(&state.pool, offset, limit).await?;
    let total = AccessLogRow::count(&state.pool).await?;

    Ok(Json(AccessLogsResponse {
        logs: rows.into_iter().map(AccessLogEntry::from).collect(),
        pagination: Pagination::new(page, limit, total),
    }))
}
