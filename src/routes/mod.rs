use axum::{
    Router,
    routing::{delete, get, patch, post, put},
};
use tower_http::trace::TraceLayer;

use crate::{
    AppState,
    middleware::{auth_middleware, log_errors},
};

pub mod access;
pub mod auth;
pub mod gamification;
pub mod health;
pub mod member;
pub mod membership;
pub mod portal;
pub mod staff;

/// Builds the full API under `config.api_base_uri`. Rate limiting is layered
/// on by the binary.
pub fn router(state: AppState) -> Router {
    // 公开路由
    let public_routes = Router::new()
        .route("/health", get(health::health))
        .route("/auth/staff/login", post(auth::staff_login))
        .route("/auth/user/login", post(auth::member_login))
        .route("/auth/user/register", post(auth::member_register))
        .route("/leaderboard", get(gamification::leaderboard));

    let protected_routes = Router::new()
        // 门禁
        .route("/access/validate", post(access::validate_access))
        .route("/access/logs", get(access::access_logs))
        // 会员管理
        .route(
            "/members",
            get(member::list_members).post(member::create_member),
        )
        .route("/members/search", get(member::search_members))
        .route("/members/{id}", put(member::update_member))
        .route("/members/{id}/qr-code", get(member::member_qr_code))
        .route(
            "/members/{id}/memberships",
            get(membership::list_member_memberships),
        )
        .route("/memberships", post(membership::create_membership))
        .route("/memberships/{id}", delete(membership::delete_membership))
        // 管理员
        .route("/admin/staff", get(staff::list_staff))
        .route("/admin/staff/register", post(staff::register_staff))
        .route("/admin/staff/{id}/status", patch(staff::update_staff_status))
        .route("/admin/badges/award", post(gamification::award_badge))
        // 积分与个人资料
        .route("/badges", get(gamification::list_badges))
        .route(
            "/user/profile/{id}",
            get(gamification::get_profile).patch(gamification::patch_profile),
        )
        .route("/user/stats/{id}", get(gamification::member_stats))
        .route("/user/notifications/{id}", get(gamification::notifications))
        .route(
            "/user/notifications/{id}/read",
            patch(gamification::mark_notification_read),
        )
        // 会员自助
        .route("/user/dashboard", get(portal::dashboard))
        .route("/user/qr-code", get(portal::my_qr_code))
        .route("/user/activity-calendar", get(portal::activity_calendar))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let api = Router::new().merge(public_routes).merge(protected_routes);
    let base = state.config.api_base_uri.clone();
    let router = if base.is_empty() {
        api
    } else {
        Router::new().nest(&base, api)
    };

    let router = router
        .layer(axum::middleware::from_fn(log_errors))
        .layer(TraceLayer::new_for_http());

    #[cfg(debug_assertions)]
    let router = router.layer(tower_http::cors::CorsLayer::permissive());

    router.with_state(state)
}
