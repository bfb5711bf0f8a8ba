use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use crate::{
    AppState,
    error::{AppError, AppResult},
    extract::ValidatedJson,
    utils::Claims,
};

use super::model::{RegisterStaffRequest, Staff, StaffResponse, UpdateStaffStatusRequest};

#[axum::debug_handler]
pub async fn register_staff(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RegisterStaffRequest>,
) -> AppResult<impl IntoResponse> {
    let admin_id = claims.require_admin()?;

    let staff = Staff::create(&state.pool, &req, Some(admin_id)).await?;
    tracing::info!("Admin {} registered {:?} {}", admin_id, staff.role, staff.staff_id);

    Ok((
        StatusCode::CREATED,
        Json(StaffResponse {
            message: "Staff registered successfully".into(),
            staff,
        }),
    ))
}

#[axum::debug_handler]
pub async fn list_staff(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<Staff>>> {
    claims.require_admin()?;
    Ok(Json(Staff::list(&state.pool).await?))
}

#[axum::debug_handler]
pub async fn update_staff_status(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(staff_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<UpdateStaffStatusRequest>,
) -> AppResult<Json<StaffResponse>> {
    let admin_id = claims.require_admin()?;
    if staff_id == admin_id {
        return Err(AppError::BadRequest(
            "Cannot deactivate your own account".into(),
        ));
    }

    let staff = Staff::set_active(&state.pool, staff_id, req.is_active)
        .await?
        .ok_or(AppError::NotFound("Staff"))?;

    let verb = if staff.is_active { "activated" } else { "deactivated" };
    tracing::info!("Admin {} {} staff {}", admin_id, verb, staff_id);

    Ok(Json(StaffResponse {
        message: format!("Staff {verb} successfully"),
        staff,
    }))
}
