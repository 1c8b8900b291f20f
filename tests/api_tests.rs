//! End-to-end tests against the full router

use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use serde_json::{json, Value};
use std::sync::Arc;

use preppal::api::{build_router, AppState};
use preppal::cache::create_cache;
use preppal::config::Config;
use preppal::db::{create_test_pool, migrations};
use preppal::services::{LocalImageHost, Services};

struct TestApp {
    server: TestServer,
    _uploads: tempfile::TempDir,
}

async fn spawn_app() -> TestApp {
    let pool = create_test_pool().await.expect("Failed to create test pool");
    migrations::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    let uploads = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.images.path = uploads.path().to_path_buf();

    let images = Arc::new(LocalImageHost::new(
        uploads.path().to_path_buf(),
        config.images.public_base.clone(),
    ));
    let services = Services::new(pool.clone(), &config, create_cache(&config.cache), images);
    let state = AppState::new(pool, &config, services);

    TestApp {
        server: TestServer::new(build_router(state, &config)).unwrap(),
        _uploads: uploads,
    }
}

/// Register an account and return its token and id
async fn register(app: &TestApp, name: &str, email: &str, city: &str) -> (String, i64) {
    let response = app
        .server
        .post("/api/v1/auth/register")
        .json(&json!({
            "name": name,
            "email": email,
            "password": "password123",
            "province": "Albay",
            "city": city,
            "barangay": "Poblacion",
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED, "{}", response.text());
    let body: Value = response.json();
    (
        body["token"].as_str().unwrap().to_string(),
        body["user"]["id"].as_i64().unwrap(),
    )
}

async fn promote_to_lgu(app: &TestApp, admin: &str, user_id: i64) {
    let response = app
        .server
        .put(&format!("/api/v1/admin/users/{}/role", user_id))
        .authorization_bearer(admin)
        .json(&json!({ "role": "lgu" }))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK, "{}", response.text());
}

async fn create_post(app: &TestApp, token: &str, item_ids: &str) -> i64 {
    let form = MultipartForm::new()
        .add_text("caption", "Our family go bag")
        .add_text("item_ids", item_ids)
        .add_part(
            "image",
            Part::bytes(b"fake png bytes".to_vec())
                .file_name("bag.png")
                .mime_type("image/png"),
        );
    let response = app
        .server
        .post("/api/v1/posts")
        .authorization_bearer(token)
        .multipart(form)
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED, "{}", response.text());
    response.json::<Value>()["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = spawn_app().await;
    let response = app.server.get("/health").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(response.json::<Value>()["database"], "ok");
}

#[tokio::test]
async fn test_auth_flow() {
    let app = spawn_app().await;
    let (admin, _) = register(&app, "Admin", "admin@example.ph", "Legazpi").await;

    let me = app.server.get("/api/v1/auth/me").authorization_bearer(&admin).await;
    assert_eq!(me.status_code(), StatusCode::OK);
    let me: Value = me.json();
    assert_eq!(me["role"], "super_admin");
    assert!(me.get("password_hash").is_none());

    let (_, _) = register(&app, "Ana", "ana@example.ph", "Legazpi").await;
    let dup = app
        .server
        .post("/api/v1/auth/register")
        .json(&json!({
            "name": "Ana again",
            "email": "ANA@example.ph",
            "password": "password123",
            "province": "Albay",
            "city": "Legazpi",
        }))
        .await;
    assert_eq!(dup.status_code(), StatusCode::CONFLICT);
    assert_eq!(dup.json::<Value>()["error"]["code"], "CONFLICT");

    let bad = app
        .server
        .post("/api/v1/auth/login")
        .json(&json!({ "email": "ana@example.ph", "password": "wrong-password" }))
        .await;
    assert_eq!(bad.status_code(), StatusCode::UNAUTHORIZED);

    let login = app
        .server
        .post("/api/v1/auth/login")
        .json(&json!({ "email": "ana@example.ph", "password": "password123" }))
        .await;
    assert_eq!(login.status_code(), StatusCode::OK);
    assert!(login
        .headers()
        .get("set-cookie")
        .and_then(|v| v.to_str().ok())
        .map(|c| c.starts_with("session="))
        .unwrap_or(false));
    let token = login.json::<Value>()["token"].as_str().unwrap().to_string();

    let logout = app
        .server
        .post("/api/v1/auth/logout")
        .authorization_bearer(&token)
        .await;
    assert_eq!(logout.status_code(), StatusCode::NO_CONTENT);

    let after = app.server.get("/api/v1/auth/me").authorization_bearer(&token).await;
    assert_eq!(after.status_code(), StatusCode::UNAUTHORIZED);
    let anonymous = app.server.get("/api/v1/auth/me").await;
    assert_eq!(anonymous.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_forgot_password_does_not_reveal_accounts() {
    let app = spawn_app().await;
    register(&app, "Admin", "admin@example.ph", "Legazpi").await;

    for email in ["admin@example.ph", "nobody@example.ph"] {
        let response = app
            .server
            .post("/api/v1/auth/forgot-password")
            .json(&json!({ "email": email }))
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
    }

    let reset = app
        .server
        .post("/api/v1/auth/reset-password")
        .json(&json!({ "email": "admin@example.ph", "code": "000000x", "new_password": "newpassword1" }))
        .await;
    assert_eq!(reset.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_go_bag_progress() {
    let app = spawn_app().await;
    let (token, _) = register(&app, "Admin", "admin@example.ph", "Legazpi").await;

    let catalog = app.server.get("/api/v1/go-bag/items").await;
    assert_eq!(catalog.status_code(), StatusCode::OK);
    let total = catalog.json::<Value>().as_array().unwrap().len();
    assert!(total > 0);

    let packed = app
        .server
        .post("/api/v1/go-bag/me/items/1")
        .authorization_bearer(&token)
        .await;
    assert_eq!(packed.status_code(), StatusCode::OK);
    assert_eq!(packed.json::<Value>()["packed_count"], 1);

    let unknown = app
        .server
        .post("/api/v1/go-bag/me/items/9999")
        .authorization_bearer(&token)
        .await;
    assert_eq!(unknown.status_code(), StatusCode::NOT_FOUND);

    let all: Vec<i64> = (1..=total as i64).collect();
    let full = app
        .server
        .put("/api/v1/go-bag/me")
        .authorization_bearer(&token)
        .json(&json!({ "item_ids": all }))
        .await;
    assert_eq!(full.status_code(), StatusCode::OK);
    let full: Value = full.json();
    assert_eq!(full["completion"], 100);
    assert_eq!(full["essential_missing"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_community_verification_awards_points() {
    let app = spawn_app().await;
    register(&app, "Admin", "admin@example.ph", "Legazpi").await;
    let (owner, owner_id) = register(&app, "Ana", "ana@example.ph", "Legazpi").await;
    let (rater, _) = register(&app, "Ben", "ben@example.ph", "Legazpi").await;

    let post_id = create_post(&app, &owner, "1,2").await;

    let own = app
        .server
        .post(&format!("/api/v1/posts/{}/ratings", post_id))
        .authorization_bearer(&owner)
        .json(&json!({ "confirmed_item_ids": [1] }))
        .await;
    assert_eq!(own.status_code(), StatusCode::BAD_REQUEST);

    let outside = app
        .server
        .post(&format!("/api/v1/posts/{}/ratings", post_id))
        .authorization_bearer(&rater)
        .json(&json!({ "confirmed_item_ids": [3] }))
        .await;
    assert_eq!(outside.status_code(), StatusCode::BAD_REQUEST);

    let rated = app
        .server
        .post(&format!("/api/v1/posts/{}/ratings", post_id))
        .authorization_bearer(&rater)
        .json(&json!({ "confirmed_item_ids": [1, 2, 2] }))
        .await;
    assert_eq!(rated.status_code(), StatusCode::CREATED, "{}", rated.text());
    let rated: Value = rated.json();
    assert_eq!(rated["verified_item_count"], 2);
    assert_eq!(rated["points_awarded"], 20);

    let again = app
        .server
        .post(&format!("/api/v1/posts/{}/ratings", post_id))
        .authorization_bearer(&rater)
        .json(&json!({ "confirmed_item_ids": [] }))
        .await;
    assert_eq!(again.status_code(), StatusCode::CONFLICT);

    let profile: Value = app
        .server
        .get(&format!("/api/v1/users/{}", owner_id))
        .await
        .json();
    assert_eq!(profile["points"], 20);

    let detail = app
        .server
        .get(&format!("/api/v1/posts/{}", post_id))
        .authorization_bearer(&rater)
        .await;
    assert_eq!(detail.status_code(), StatusCode::OK);
    assert_eq!(detail.json::<Value>()["viewer_has_rated"], true);

    let leaderboard: Value = app.server.get("/api/v1/leaderboard").await.json();
    assert_eq!(leaderboard["items"][0]["user_id"], owner_id);
    assert_eq!(leaderboard["items"][0]["rank"], 1);
}

#[tokio::test]
async fn test_post_requires_image() {
    let app = spawn_app().await;
    let (token, _) = register(&app, "Admin", "admin@example.ph", "Legazpi").await;

    let form = MultipartForm::new()
        .add_text("caption", "No picture")
        .add_text("item_ids", "[1]");
    let response = app
        .server
        .post("/api/v1/posts")
        .authorization_bearer(&token)
        .multipart(form)
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);

    let wrong_type = MultipartForm::new().add_text("item_ids", "1").add_part(
        "image",
        Part::bytes(b"%PDF".to_vec())
            .file_name("bag.pdf")
            .mime_type("application/pdf"),
    );
    let response = app
        .server
        .post("/api/v1/posts")
        .authorization_bearer(&token)
        .multipart(wrong_type)
        .await;
    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_role_guards() {
    let app = spawn_app().await;
    let (admin, _) = register(&app, "Admin", "admin@example.ph", "Legazpi").await;
    let (citizen, citizen_id) = register(&app, "Ana", "ana@example.ph", "Legazpi").await;

    for path in ["/api/v1/admin/dashboard", "/api/v1/lgu/dashboard", "/api/v1/reports"] {
        let response = app.server.get(path).authorization_bearer(&citizen).await;
        assert_eq!(response.status_code(), StatusCode::FORBIDDEN, "{}", path);
    }

    promote_to_lgu(&app, &admin, citizen_id).await;
    let lgu_dashboard = app
        .server
        .get("/api/v1/lgu/dashboard")
        .authorization_bearer(&citizen)
        .await;
    assert_eq!(lgu_dashboard.status_code(), StatusCode::OK);
    assert_eq!(lgu_dashboard.json::<Value>()["city"], "Legazpi");

    let admin_only = app
        .server
        .get("/api/v1/admin/users")
        .authorization_bearer(&citizen)
        .await;
    assert_eq!(admin_only.status_code(), StatusCode::FORBIDDEN);

    let dashboard = app
        .server
        .get("/api/v1/admin/dashboard")
        .authorization_bearer(&admin)
        .await;
    assert_eq!(dashboard.status_code(), StatusCode::OK);
    assert_eq!(dashboard.json::<Value>()["lgu_count"], 1);
}

#[tokio::test]
async fn test_banned_user_is_locked_out() {
    let app = spawn_app().await;
    let (admin, _) = register(&app, "Admin", "admin@example.ph", "Legazpi").await;
    let (troll, troll_id) = register(&app, "Troll", "troll@example.ph", "Legazpi").await;

    let ban = app
        .server
        .put(&format!("/api/v1/admin/users/{}/ban", troll_id))
        .authorization_bearer(&admin)
        .json(&json!({ "banned": true }))
        .await;
    assert_eq!(ban.status_code(), StatusCode::OK);

    let me = app.server.get("/api/v1/auth/me").authorization_bearer(&troll).await;
    assert_eq!(me.status_code(), StatusCode::UNAUTHORIZED);

    let login = app
        .server
        .post("/api/v1/auth/login")
        .json(&json!({ "email": "troll@example.ph", "password": "password123" }))
        .await;
    assert_eq!(login.status_code(), StatusCode::FORBIDDEN);
    assert_eq!(login.json::<Value>()["error"]["code"], "USER_BANNED");
}

#[tokio::test]
async fn test_report_moderation_flow() {
    let app = spawn_app().await;
    let (admin, _) = register(&app, "Admin", "admin@example.ph", "Legazpi").await;
    let (owner, _) = register(&app, "Ana", "ana@example.ph", "Legazpi").await;
    let (reporter, _) = register(&app, "Ben", "ben@example.ph", "Daraga").await;
    let (local, local_id) = register(&app, "Mayor", "mayor@example.ph", "Legazpi").await;
    let (remote, remote_id) = register(&app, "Other", "other@example.ph", "Daraga").await;
    promote_to_lgu(&app, &admin, local_id).await;
    promote_to_lgu(&app, &admin, remote_id).await;

    let post_id = create_post(&app, &owner, "[1]").await;
    let report = app
        .server
        .post("/api/v1/reports")
        .authorization_bearer(&reporter)
        .json(&json!({ "target_type": "post", "target_id": post_id, "reason": "Not a go bag" }))
        .await;
    assert_eq!(report.status_code(), StatusCode::CREATED, "{}", report.text());
    let report_id = report.json::<Value>()["id"].as_i64().unwrap();

    let remote_list: Value = app
        .server
        .get("/api/v1/reports?status=PENDING")
        .authorization_bearer(&remote)
        .await
        .json();
    assert_eq!(remote_list["total"], 0);

    let local_list: Value = app
        .server
        .get("/api/v1/reports?status=PENDING")
        .authorization_bearer(&local)
        .await
        .json();
    assert_eq!(local_list["total"], 1);

    let resolved = app
        .server
        .post(&format!("/api/v1/reports/{}/resolve", report_id))
        .authorization_bearer(&local)
        .json(&json!({ "note": "Removed", "remove_content": true }))
        .await;
    assert_eq!(resolved.status_code(), StatusCode::OK, "{}", resolved.text());
    assert_eq!(resolved.json::<Value>()["status"], "RESOLVED");

    let gone = app.server.get(&format!("/api/v1/posts/{}", post_id)).await;
    assert_eq!(gone.status_code(), StatusCode::NOT_FOUND);

    let twice = app
        .server
        .post(&format!("/api/v1/reports/{}/dismiss", report_id))
        .authorization_bearer(&local)
        .json(&json!({}))
        .await;
    assert_eq!(twice.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_learning_flow() {
    let app = spawn_app().await;
    let (admin, _) = register(&app, "Admin", "admin@example.ph", "Legazpi").await;
    let (author, author_id) = register(&app, "Mayor", "mayor@example.ph", "Legazpi").await;
    let (citizen, _) = register(&app, "Ana", "ana@example.ph", "Legazpi").await;
    promote_to_lgu(&app, &admin, author_id).await;

    let forbidden = app
        .server
        .post("/api/v1/modules")
        .authorization_bearer(&citizen)
        .json(&json!({ "title": "x", "content": "y" }))
        .await;
    assert_eq!(forbidden.status_code(), StatusCode::FORBIDDEN);

    let module = app
        .server
        .post("/api/v1/modules")
        .authorization_bearer(&author)
        .json(&json!({
            "title": "Typhoon basics",
            "content": "## Signal No. 3\n\nStay indoors.",
            "category": "typhoon",
            "points": 15,
            "is_published": true,
        }))
        .await;
    assert_eq!(module.status_code(), StatusCode::CREATED, "{}", module.text());
    let module: Value = module.json();
    let module_id = module["id"].as_i64().unwrap();
    assert!(module["content_html"].as_str().unwrap().contains("<h2"));

    let first: Value = app
        .server
        .post(&format!("/api/v1/modules/{}/complete", module_id))
        .authorization_bearer(&citizen)
        .await
        .json();
    assert_eq!(first["points_awarded"], 15);
    let repeat: Value = app
        .server
        .post(&format!("/api/v1/modules/{}/complete", module_id))
        .authorization_bearer(&citizen)
        .await
        .json();
    assert_eq!(repeat["points_awarded"], 0);

    let quiz = app
        .server
        .post("/api/v1/quizzes")
        .authorization_bearer(&author)
        .json(&json!({
            "module_id": module_id,
            "title": "Typhoon quiz",
            "points_per_question": 5,
            "is_published": true,
            "questions": [
                { "prompt": "Safest place?", "choices": ["Window", "Interior room"], "correct_index": 1 },
                { "prompt": "Prepare before?", "choices": ["Yes", "No"], "correct_index": 0 },
            ],
        }))
        .await;
    assert_eq!(quiz.status_code(), StatusCode::CREATED, "{}", quiz.text());
    let quiz_id = quiz.json::<Value>()["id"].as_i64().unwrap();

    let view: Value = app
        .server
        .get(&format!("/api/v1/quizzes/{}", quiz_id))
        .authorization_bearer(&citizen)
        .await
        .json();
    assert!(view["questions"][0].get("correct_index").is_none());

    let short = app
        .server
        .post(&format!("/api/v1/quizzes/{}/attempts", quiz_id))
        .authorization_bearer(&citizen)
        .json(&json!({ "answers": [1] }))
        .await;
    assert_eq!(short.status_code(), StatusCode::BAD_REQUEST);

    let attempt = app
        .server
        .post(&format!("/api/v1/quizzes/{}/attempts", quiz_id))
        .authorization_bearer(&citizen)
        .json(&json!({ "answers": [1, 1] }))
        .await;
    assert_eq!(attempt.status_code(), StatusCode::CREATED, "{}", attempt.text());
    let attempt: Value = attempt.json();
    assert_eq!(attempt["attempt"]["score"], 1);
    assert_eq!(attempt["attempt"]["points_awarded"], 5);

    let rank: Value = app
        .server
        .get("/api/v1/leaderboard/me")
        .authorization_bearer(&citizen)
        .await
        .json();
    assert_eq!(rank["points"], 20);
    assert_eq!(rank["overall_rank"], 1);
}
