//! End-to-end scenarios against a real Postgres. Each test gets a fresh
//! database from `#[sqlx::test]`; run with
//! `DATABASE_URL=postgres://... cargo test -- --ignored`.

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use chrono::{Duration, Local, Utc};
use gym_access::{
    AppState,
    config::Config,
    routes::{
        self,
        access::{
            model::{AccessOutcome, AccessResult},
            validate_qr,
        },
        gamification::model::{Notification, NotificationType},
        member::model::{Member, MemberDetails},
        membership::model::{Membership, MembershipType, expire_memberships},
        staff::model::{RegisterStaffRequest, Staff, StaffRole},
    },
    utils::{Role, generate_token},
};
use serde_json::{Value, json};
use sqlx::PgPool;
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "scenario-secret";

fn app(pool: PgPool) -> Router {
    let config = Config::for_tests(SECRET);
    routes::router(AppState { pool, config })
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn post_json(uri: &str, bearer: Option<&str>, body: Value) -> Request<Body> {
    json_request("POST", uri, bearer, body)
}

fn json_request(method: &str, uri: &str, bearer: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn token_for(id: Uuid, email: &str, role: Role) -> String {
    let config = Config::for_tests(SECRET);
    generate_token(id, email, role, &config).unwrap().0
}

async fn staff(pool: &PgPool, email: &str, role: StaffRole) -> Staff {
    let req = RegisterStaffRequest {
        first_name: "Front".into(),
        last_name: "Desk".into(),
        email: email.into(),
        password: "desk-password".into(),
        role,
    };
    Staff::create(pool, &req, None).await.unwrap()
}

async fn member(pool: &PgPool, username: &str) -> Member {
    let details: MemberDetails = serde_json::from_value(json!({
        "username": username,
        "first_name": "Jamie",
        "last_name": "Lifter",
        "email": format!("{username}@gym.com"),
        "phone_number": "+1 555 010 0199"
    }))
    .unwrap();
    Member::create(pool, &details, None).await.unwrap()
}

async fn monthly_membership(pool: &PgPool, member_id: Uuid) -> Membership {
    let now = Utc::now();
    Membership::create(
        pool,
        member_id,
        MembershipType::Monthly,
        now - Duration::days(1),
        now + Duration::days(29),
    )
    .await
    .unwrap()
}

async fn daily_points_rows(pool: &PgPool, member_id: Uuid) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM daily_points WHERE member_id = $1")
        .bind(member_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

fn granted(outcome: AccessOutcome) -> gym_access::routes::access::model::AccessGranted {
    match outcome {
        AccessOutcome::Granted(g) => g,
        AccessOutcome::Denied(d) => panic!("expected grant, denied: {}", d.reason),
    }
}

fn denied(outcome: AccessOutcome) -> gym_access::routes::access::model::AccessDenied {
    match outcome {
        AccessOutcome::Denied(d) => d,
        AccessOutcome::Granted(_) => panic!("expected denial"),
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires Postgres"]
async fn member_without_membership_is_denied_and_earns_nothing(pool: PgPool) {
    let desk = staff(&pool, "desk@gym.com", StaffRole::Staff).await;
    let m = member(&pool, "no_plan").await;

    let outcome = validate_qr(&pool, &m.qr_code, desk.staff_id, Local::now().date_naive())
        .await
        .unwrap();
    let d = denied(outcome);
    assert_eq!(d.reason, "No active membership");
    assert_eq!(d.member.unwrap().member_id, m.member_id);
    assert_eq!(daily_points_rows(&pool, m.member_id).await, 0);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires Postgres"]
async fn points_are_awarded_once_per_day(pool: PgPool) {
    let desk = staff(&pool, "desk@gym.com", StaffRole::Staff).await;
    let m = member(&pool, "daily_one").await;
    monthly_membership(&pool, m.member_id).await;
    let today = Local::now().date_naive();

    let first = granted(validate_qr(&pool, &m.qr_code, desk.staff_id, today).await.unwrap());
    assert_eq!(first.points.earned, 100);
    assert_eq!(first.points.streak, 1);
    assert_eq!(first.points.total, 100);

    let second = granted(validate_qr(&pool, &m.qr_code, desk.staff_id, today).await.unwrap());
    assert!(second.access);
    assert_eq!(second.points.earned, 0);
    assert_eq!(second.points.total, 100);

    assert_eq!(daily_points_rows(&pool, m.member_id).await, 1);
    let stored = Member::find_by_id(&pool, m.member_id).await.unwrap().unwrap();
    assert_eq!(stored.total_points, 100);
    assert_eq!(stored.experience, 100);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires Postgres"]
async fn concurrent_scans_award_once(pool: PgPool) {
    let desk = staff(&pool, "desk@gym.com", StaffRole::Staff).await;
    let m = member(&pool, "double_tap").await;
    monthly_membership(&pool, m.member_id).await;
    let today = Local::now().date_naive();

    let (a, b) = tokio::join!(
        validate_qr(&pool, &m.qr_code, desk.staff_id, today),
        validate_qr(&pool, &m.qr_code, desk.staff_id, today),
    );
    let earned = granted(a.unwrap()).points.earned + granted(b.unwrap()).points.earned;
    assert_eq!(earned, 100);
    assert_eq!(daily_points_rows(&pool, m.member_id).await, 1);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires Postgres"]
async fn fourth_consecutive_day_earns_130(pool: PgPool) {
    let desk = staff(&pool, "desk@gym.com", StaffRole::Staff).await;
    let m = member(&pool, "streaker").await;
    monthly_membership(&pool, m.member_id).await;
    sqlx::query(
        r#"
        UPDATE members
        SET current_streak = 3, longest_streak = 3, total_points = 330, experience = 330,
            last_visit_date = NOW() - INTERVAL '1 day'
        WHERE member_id = $1
        "#,
    )
    .bind(m.member_id)
    .execute(&pool)
    .await
    .unwrap();

    let g = granted(
        validate_qr(&pool, &m.qr_code, desk.staff_id, Local::now().date_naive())
            .await
            .unwrap(),
    );
    assert_eq!(g.points.streak, 4);
    assert_eq!(g.points.multiplier, 1.3);
    assert_eq!(g.points.earned, 130);
    assert_eq!(g.points.total, 460);

    let stored = Member::find_by_id(&pool, m.member_id).await.unwrap().unwrap();
    assert_eq!(stored.current_streak, 4);
    assert_eq!(stored.longest_streak, 4);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires Postgres"]
async fn a_gap_resets_the_streak(pool: PgPool) {
    let desk = staff(&pool, "desk@gym.com", StaffRole::Staff).await;
    let m = member(&pool, "lapsed").await;
    monthly_membership(&pool, m.member_id).await;
    sqlx::query(
        "UPDATE members SET current_streak = 9, longest_streak = 9, \
         last_visit_date = NOW() - INTERVAL '3 days' WHERE member_id = $1",
    )
    .bind(m.member_id)
    .execute(&pool)
    .await
    .unwrap();

    let g = granted(
        validate_qr(&pool, &m.qr_code, desk.staff_id, Local::now().date_naive())
            .await
            .unwrap(),
    );
    assert_eq!(g.points.streak, 1);
    assert_eq!(g.points.earned, 100);

    let stored = Member::find_by_id(&pool, m.member_id).await.unwrap().unwrap();
    assert_eq!(stored.longest_streak, 9);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires Postgres"]
async fn crossing_a_thousand_experience_levels_up(pool: PgPool) {
    let desk = staff(&pool, "desk@gym.com", StaffRole::Staff).await;
    let m = member(&pool, "almost_two").await;
    monthly_membership(&pool, m.member_id).await;
    sqlx::query("UPDATE members SET total_points = 950, experience = 950 WHERE member_id = $1")
        .bind(m.member_id)
        .execute(&pool)
        .await
        .unwrap();

    let g = granted(
        validate_qr(&pool, &m.qr_code, desk.staff_id, Local::now().date_naive())
            .await
            .unwrap(),
    );
    assert_eq!(g.points.new_level, Some(2));

    let stored = Member::find_by_id(&pool, m.member_id).await.unwrap().unwrap();
    assert_eq!(stored.level, 2);

    let titles: Vec<String> =
        sqlx::query_scalar("SELECT title FROM notifications WHERE member_id = $1")
            .bind(m.member_id)
            .fetch_all(&pool)
            .await
            .unwrap();
    assert_eq!(titles, vec!["Level Up! 🎉".to_string()]);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires Postgres"]
async fn unknown_token_logs_denied_without_member(pool: PgPool) {
    let desk = staff(&pool, "desk@gym.com", StaffRole::Staff).await;

    let d = denied(
        validate_qr(&pool, "no-such-token", desk.staff_id, Local::now().date_naive())
            .await
            .unwrap(),
    );
    assert_eq!(d.reason, "Member not found");
    assert!(d.member.is_none());

    let (member_id, result): (Option<Uuid>, AccessResult) =
        sqlx::query_as("SELECT member_id, result FROM access_logs")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(member_id, None);
    assert_eq!(result, AccessResult::Denied);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires Postgres"]
async fn deleting_the_only_membership_revokes_access(pool: PgPool) {
    let desk = staff(&pool, "desk@gym.com", StaffRole::Staff).await;
    let m = member(&pool, "cancelled").await;
    let membership = monthly_membership(&pool, m.member_id).await;

    assert!(Membership::delete(&pool, membership.membership_id).await.unwrap());

    let d = denied(
        validate_qr(&pool, &m.qr_code, desk.staff_id, Local::now().date_naive())
            .await
            .unwrap(),
    );
    assert_eq!(d.reason, "No active membership");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires Postgres"]
async fn expired_memberships_do_not_grant_and_get_swept(pool: PgPool) {
    let desk = staff(&pool, "desk@gym.com", StaffRole::Staff).await;
    let m = member(&pool, "expired_plan").await;
    let now = Utc::now();
    Membership::create(
        &pool,
        m.member_id,
        MembershipType::Daily,
        now - Duration::days(2),
        now - Duration::days(1),
    )
    .await
    .unwrap();
    // 状态仍为 ACTIVE 但已过期
    sqlx::query("UPDATE memberships SET status = 'ACTIVE' WHERE member_id = $1")
        .bind(m.member_id)
        .execute(&pool)
        .await
        .unwrap();

    let d = denied(
        validate_qr(&pool, &m.qr_code, desk.staff_id, Local::now().date_naive())
            .await
            .unwrap(),
    );
    assert_eq!(d.reason, "No active membership");
    assert_eq!(expire_memberships(&pool).await.unwrap(), 1);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires Postgres"]
async fn registered_member_is_found_by_exact_email(pool: PgPool) {
    member(&pool, "findme").await;
    member(&pool, "someone_else").await;

    let found = Member::search(&pool, "findme@gym.com").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].username, "findme");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires Postgres"]
async fn deactivated_staff_cannot_log_in(pool: PgPool) {
    let desk = staff(&pool, "gone@gym.com", StaffRole::Staff).await;
    Staff::set_active(&pool, desk.staff_id, false).await.unwrap();

    let (status, body) = send(
        app(pool),
        post_json(
            "/api/auth/staff/login",
            None,
            json!({ "email": "gone@gym.com", "password": "desk-password" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Account is deactivated");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires Postgres"]
async fn wrong_password_is_invalid_credentials(pool: PgPool) {
    staff(&pool, "desk@gym.com", StaffRole::Staff).await;

    let (status, body) = send(
        app(pool),
        post_json(
            "/api/auth/staff/login",
            None,
            json!({ "email": "desk@gym.com", "password": "not-the-password" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid credentials");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires Postgres"]
async fn badges_are_awarded_once(pool: PgPool) {
    let admin = staff(&pool, "boss@gym.com", StaffRole::Admin).await;
    let m = member(&pool, "decorated").await;
    let badge_id: Uuid = sqlx::query_scalar("SELECT badge_id FROM badges ORDER BY name LIMIT 1")
        .fetch_one(&pool)
        .await
        .unwrap();
    let token = token_for(admin.staff_id, &admin.email, Role::Admin);
    let body = json!({ "member_id": m.member_id, "badge_id": badge_id });

    let (status, first) = send(
        app(pool.clone()),
        post_json("/api/admin/badges/award", Some(&token), body.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let awarded = first["points_awarded"].as_i64().unwrap();

    let (status, second) = send(
        app(pool.clone()),
        post_json("/api/admin/badges/award", Some(&token), body),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(second["error"], "Member already has this badge");

    let stored = Member::find_by_id(&pool, m.member_id).await.unwrap().unwrap();
    assert_eq!(stored.total_points, awarded);
    assert_eq!(stored.experience, awarded);
}

async fn notification_is_read(pool: &PgPool, notification_id: Uuid) -> bool {
    sqlx::query_scalar("SELECT is_read FROM notifications WHERE notification_id = $1")
        .bind(notification_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires Postgres"]
async fn only_the_owner_can_mark_a_notification_read(pool: PgPool) {
    let owner = member(&pool, "owner").await;
    let other = member(&pool, "nosy").await;
    let note = Notification::create(
        &pool,
        owner.member_id,
        "Welcome",
        "Glad to have you",
        NotificationType::Success,
    )
    .await
    .unwrap();
    let uri = format!("/api/user/notifications/{}/read", note.notification_id);

    let nosy = token_for(other.member_id, &other.email, Role::Member);
    let (status, body) = send(
        app(pool.clone()),
        json_request("PATCH", &uri, Some(&nosy), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Notification not found");

    assert!(!notification_is_read(&pool, note.notification_id).await);

    let mine = token_for(owner.member_id, &owner.email, Role::Member);
    let (status, _) = send(
        app(pool.clone()),
        json_request("PATCH", &uri, Some(&mine), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(notification_is_read(&pool, note.notification_id).await);
}

async fn set_standing(
    pool: &PgPool,
    member_id: Uuid,
    total_points: i64,
    longest_streak: i32,
    last_visit_days_ago: Option<i64>,
) {
    sqlx::query(
        "UPDATE members SET total_points = $2, longest_streak = $3, last_visit_date = $4 WHERE member_id = $1",
    )
    .bind(member_id)
    .bind(total_points)
    .bind(longest_streak)
    .bind(last_visit_days_ago.map(|days| Utc::now() - Duration::days(days)))
    .execute(pool)
    .await
    .unwrap();
}

async fn leaderboard_names(pool: &PgPool, query: &str) -> (String, Vec<String>) {
    let (status, body) = send(
        app(pool.clone()),
        get(&format!("/api/leaderboard{query}"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let names = body["leaderboard"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["username"].as_str().unwrap().to_string())
        .collect();
    (body["type"].as_str().unwrap().to_string(), names)
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires Postgres"]
async fn windowed_leaderboards_filter_on_last_visit_but_rank_by_all_time_points(pool: PgPool) {
    for (name, points, longest, days_ago) in [
        ("alpha", 500, 3, Some(1)),
        ("bravo", 500, 7, Some(2)),
        ("charlie", 500, 7, Some(3)),
        ("delta", 800, 0, Some(6)),
        ("stale", 9000, 40, Some(20)),
        ("never", 0, 0, None),
    ] {
        let m = member(&pool, name).await;
        set_standing(&pool, m.member_id, points, longest, days_ago).await;
    }

    let (kind, names) = leaderboard_names(&pool, "?type=weekly").await;
    assert_eq!(kind, "weekly");
    assert_eq!(names, ["delta", "bravo", "charlie", "alpha"]);

    let (kind, names) = leaderboard_names(&pool, "?type=monthly").await;
    assert_eq!(kind, "monthly");
    assert_eq!(names, ["stale", "delta", "bravo", "charlie", "alpha"]);

    let everyone = ["stale", "delta", "bravo", "charlie", "alpha", "never"];
    let (kind, names) = leaderboard_names(&pool, "").await;
    assert_eq!(kind, "all");
    assert_eq!(names, everyone);

    let (kind, names) = leaderboard_names(&pool, "?type=daily").await;
    assert_eq!(kind, "all");
    assert_eq!(names, everyone);

    let (_, names) = leaderboard_names(&pool, "?type=weekly&limit=2").await;
    assert_eq!(names, ["delta", "bravo"]);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires Postgres"]
async fn profiles_are_edited_by_their_owner_or_staff(pool: PgPool) {
    let desk = staff(&pool, "desk@gym.com", StaffRole::Staff).await;
    let owner = member(&pool, "profiled").await;
    let other = member(&pool, "meddler").await;
    let uri = format!("/api/user/profile/{}", owner.member_id);
    let mine = token_for(owner.member_id, &owner.email, Role::Member);

    let (status, body) = send(
        app(pool.clone()),
        json_request(
            "PATCH",
            &uri,
            Some(&mine),
            json!({ "avatar_url": "https://cdn.gym.com/me.png" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["member"]["avatar_url"], "https://cdn.gym.com/me.png");
    assert!(body["member"]["bio"].is_null());

    let (status, body) = send(
        app(pool.clone()),
        json_request("PATCH", &uri, Some(&mine), json!({ "bio": "Leg day" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["member"]["bio"], "Leg day");
    assert_eq!(body["member"]["avatar_url"], "https://cdn.gym.com/me.png");

    let meddler = token_for(other.member_id, &other.email, Role::Member);
    let (status, _) = send(
        app(pool.clone()),
        json_request("PATCH", &uri, Some(&meddler), json!({ "bio": "hacked" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let desk_token = token_for(desk.staff_id, &desk.email, Role::Staff);
    let (status, body) = send(
        app(pool.clone()),
        json_request("PATCH", &uri, Some(&desk_token), json!({ "bio": "Edited at the desk" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["member"]["bio"], "Edited at the desk");
    assert_eq!(body["member"]["avatar_url"], "https://cdn.gym.com/me.png");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires Postgres"]
async fn memberships_need_a_real_member_and_ordered_dates(pool: PgPool) {
    let desk = staff(&pool, "desk@gym.com", StaffRole::Staff).await;
    let m = member(&pool, "planless").await;
    let desk_token = token_for(desk.staff_id, &desk.email, Role::Staff);

    let (status, body) = send(
        app(pool.clone()),
        post_json(
            "/api/memberships",
            Some(&desk_token),
            json!({
                "member_id": Uuid::new_v4(),
                "membership_type": "MONTHLY",
                "purchase_date": "2025-06-01",
                "expiration_date": "2025-07-01"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Member not found");

    let (status, body) = send(
        app(pool.clone()),
        post_json(
            "/api/memberships",
            Some(&desk_token),
            json!({
                "member_id": m.member_id,
                "membership_type": "MONTHLY",
                "purchase_date": "2025-07-01",
                "expiration_date": "2025-06-01"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Expiration date must not precede purchase date");

    let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM memberships")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(stored, 0);
}
