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

use super::model::{
    CreateMembershipRequest, CreateMembershipResponse, DeleteMembershipResponse,
    DeletedMembership, Membership, MembershipOwner, MembershipWithOwner, parse_iso_datetime,
};

#[axum::debug_handler]
pub async fn create_membership(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<CreateMembershipRequest>,
) -> AppResult<impl IntoResponse> {
    claims.staff_id()?;

    // 日期格式已在校验阶段检查过
    let (Some(purchase_date), Some(expiration_date)) = (
        parse_iso_datetime(&req.purchase_date),
        parse_iso_datetime(&req.expiration_date),
    ) else {
        return Err(AppError::BadRequest("Invalid membership dates".into()));
    };
    if expiration_date < purchase_date {
        return Err(AppError::BadRequest(
            "Expiration date must not precede purchase date".into(),
        ));
    }

    let mut tx = state.pool.begin().await?;
    let owner = MembershipOwner::find(&mut *tx, req.member_id)
        .await?
        .ok_or(AppError::NotFound("Member"))?;
    let membership = Membership::create(
        &mut *tx,
        req.member_id,
        req.membership_type,
        purchase_date,
        expiration_date,
    )
    .await?;
    tx.commit().await?;

    tracing::info!(
        "Assigned {:?} membership {} to member {}",
        membership.membership_type,
        membership.membership_id,
        membership.member_id
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateMembershipResponse {
            message: "Membership assigned successfully".into(),
            membership: MembershipWithOwner {
                membership,
                member: owner,
            },
        }),
    ))
}

#[axum::debug_handler]
pub async fn delete_membership(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(membership_id): Path<Uuid>,
) -> AppResult<Json<DeleteMembershipResponse>> {
    claims.staff_id()?;

    let mut tx = state.pool.begin().await?;
    let membership = Membership::find_by_id(&mut *tx, membership_id)
        .await?
        .ok_or(AppError::NotFound("Membership"))?;
    let owner = MembershipOwner::find(&mut *tx, membership.member_id).await?;
    Membership::delete(&mut *tx, membership_id).await?;
    tx.commit().await?;

    tracing::info!("Deleted membership {}", membership_id);

    Ok(Json(DeleteMembershipResponse {
        message: "Membership deleted successfully".into(),
        deleted_membership: DeletedMembership {
            membership_id,
            member_name: owner
                .map(|o| format!("{} {}", o.first_name, o.last_name))
                .unwrap_or_default(),
            membership_type: membership.membership_type,
        },
    }))
}

#[axum::debug_handler]
pub async fn list_member_memberships(
    Extension(claims): Extension<Claims>,
    State(state): State<AppState>,
    Path(member_id): Path<Uuid>,
) -> AppResult<Json<Vec<Membership>>> {
    claims.staff_id()?;

    if MembershipOwner::find(&state.pool, member_id).await?.is_none() {
        return Err(AppError::NotFound("Member"));
    }
    Ok(Json(Membership::list_for_member(&state.pool, member_id).await?))
}
