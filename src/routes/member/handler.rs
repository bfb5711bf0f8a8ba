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
    extract::{ApiQuery, ValidatedJson},
    qr::qr_data_url,
    utils::Claims,
};

use super::model::{
    Member, MemberDetails, MemberResponse, MemberWithMemberships, QrCodeResponse, SearchQuery,
};

#[axum::debug_handler]
pub async fn list_members(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<MemberWithMemberships>>> {
    claims.staff_id()?;

    let members = Member::list(&state.pool).await?;
    Ok(Json(MemberWithMemberships::load(&state.pool, members).await?))
}

#[axum::debug_handler]
pub async fn search_members(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> AppResult<Json<Vec<MemberWithMemberships>>> {
    claims.staff_id()?;

    let query = query.query.unwrap_or_default();
    let query = query.trim();
    if query.is_empty() {
        return Err(AppError::BadRequest("Search query is required".into()));
    }

    let members = Member::search(&state.pool, query).await?;
    Ok(Json(MemberWithMemberships::load(&state.pool, members).await?))
}

/// Front-desk registration: the member gets a QR token but no password.
#[axum::debug_handler]
pub async fn create_member(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<MemberDetails>,
) -> AppResult<impl IntoResponse> {
    claims.staff_id()?;

    let member = Member::create(&state.pool, &req, None).await?;
    Ok((
        StatusCode::CREATED,
        Json(MemberResponse {
            message: "Member registered successfully".into(),
            member,
        }),
    ))
}

#[axum::debug_handler]
pub async fn update_member(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(member_id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<MemberDetails>,
) -> AppResult<Json<MemberResponse>> {
    claims.staff_id()?;

    let member = Member::update_details(&state.pool, member_id, &req)
        .await?
        .ok_or(AppError::NotFound("Member"))?;

    Ok(Json(MemberResponse {
        message: "Member updated successfully".into(),
        member,
    }))
}

#[axum::debug_handler]
pub async fn member_qr_code(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(member_id): Path<Uuid>,
) -> AppResult<Json<QrCodeResponse>> {
    claims.staff_id()?;

    let member = Member::find_by_id(&state.pool, member_id)
        .await?
        .ok_or(AppError::NotFound("Member"))?;

    Ok(Json(QrCodeResponse {
        qr_code_image: qr_data_url(&member.qr_code)?,
        member: Some(member.contact()),
        qr_code: member.qr_code,
    }))
}
