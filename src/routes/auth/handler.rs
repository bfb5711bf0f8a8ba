use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

use crate::{
    AppState,
    error::{AppError, AppResult},
    extract::ValidatedJson,
    routes::{member::model::Member, staff::model::Staff},
    utils::{Role, generate_token, hash_password, verify_password},
};

use super::model::{AuthResponse, AuthUser, LoginRequest, RegisterMemberRequest};

fn invalid_credentials() -> AppError {
    AppError::Unauthorized("Invalid credentials".into())
}

#[axum::debug_handler]
pub async fn staff_login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let staff = Staff::find_by_email(&state.pool, &req.email)
        .await?
        .ok_or_else(invalid_credentials)?;

    // 停用账号先于密码校验返回
    if !staff.is_active {
        tracing::info!("Rejected login for deactivated staff {}", staff.staff_id);
        return Err(AppError::Unauthorized("Account is deactivated".into()));
    }

    if !verify_password(&req.password, &staff.password_hash)? {
        return Err(invalid_credentials());
    }

    let role = Role::from(staff.role);
    let (token, expires_at) = generate_token(staff.staff_id, &staff.email, role, &state.config)?;

    Ok(Json(AuthResponse {
        token,
        expires_at,
        user: AuthUser {
            id: staff.staff_id,
            username: None,
            first_name: staff.first_name,
            last_name: staff.last_name,
            email: staff.email,
            role,
        },
    }))
}

fn member_auth_response(member: Member, state: &AppState) -> AppResult<AuthResponse> {
    let (token, expires_at) =
        generate_token(member.member_id, &member.email, Role::Member, &state.config)?;

    Ok(AuthResponse {
        token,
        expires_at,
        user: AuthUser {
            id: member.member_id,
            username: Some(member.username),
            first_name: member.first_name,
            last_name: member.last_name,
            email: member.email,
            role: Role::Member,
        },
    })
}

#[axum::debug_handler]
pub async fn member_login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let member = Member::find_by_email(&state.pool, &req.email)
        .await?
        .ok_or_else(invalid_credentials)?;

    // 前台登记的会员没有密码，不能登录
    let Some(hash) = member.password_hash.as_deref() else {
        return Err(invalid_credentials());
    };
    if !verify_password(&req.password, hash)? {
        return Err(invalid_credentials());
    }

    Ok(Json(member_auth_response(member, &state)?))
}

#[axum::debug_handler]
pub async fn member_register(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RegisterMemberRequest>,
) -> AppResult<impl IntoResponse> {
    let password_hash = hash_password(&req.password)?;
    let member = Member::create(&state.pool, &req.details, Some(password_hash)).await?;

    Ok((StatusCode::CREATED, Json(member_auth_response(member, &state)?)))
}
