mod helpers;

use axum::http::StatusCode;
use helpers::{
    dimensions, id_of, image_form, sample_jpeg, sample_png, TestApp, VISIBILITY_TIMEOUT,
};
use pictor_core::models::{FailureKind, JobState};
use pictor_worker::{JobHandler, JobQueue};
use serde_json::{json, Value};
use std::time::Duration;
use uuid::Uuid;

async fn submit(app: &TestApp, user: Uuid, image_id: Uuid, body: Value) -> Uuid {
    let response = app
        .post(&format!("/images/transform/{}", image_id), user)
        .json(&body)
        .await;
    response.assert_status(StatusCode::ACCEPTED);
    let body: Value = response.json();
    body["jobId"].as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn test_in_place_resize_end_to_end() {
    let app = TestApp::with_local_storage();
    let user = Uuid::new_v4();

    let original = sample_jpeg(800, 600);
    let uploaded = app.upload(user, "photo.jpg", original.clone()).await;
    let id = id_of(&uploaded);

    let view: Value = app.get(&format!("/images/{}", id), user).await.json();
    assert_eq!(view["width"], 800);
    assert_eq!(view["height"], 600);
    assert_eq!(view["format"], "jpeg");
    let stored = app.server.get(view["url"].as_str().unwrap()).await;
    stored.assert_status_ok();
    assert_eq!(stored.as_bytes().as_ref(), original.as_slice());

    submit(
        &app,
        user,
        id,
        json!({"resize": {"width": 400, "height": 300, "fit": "cover"}}),
    )
    .await;
    assert_eq!(app.run_next_job().await, Some(JobState::Completed));

    let response = app.get(&format!("/images/{}", id), user).await;
    response.assert_status_ok();
    let view: Value = response.json();
    assert_eq!(id_of(&view), id);
    assert_eq!(view["width"], 400);
    assert_eq!(view["height"], 300);
    assert_eq!(view["format"], "jpeg");
    assert_eq!(view["original_file_name"], "photo.jpg");
    assert_eq!(view["created_at"], uploaded["created_at"]);
    assert_ne!(view["url"], uploaded["url"]);

    let url = view["url"].as_str().unwrap();
    assert!(url.starts_with("/uploads/transformed/"));
    let file = app.server.get(url).await;
    file.assert_status_ok();
    assert_eq!(dimensions(file.as_bytes()), (400, 300));
}

#[tokio::test]
async fn test_new_derivative_keeps_source() {
    let app = TestApp::in_memory();
    let user = Uuid::new_v4();
    let id = id_of(&app.upload(user, "cat.png", sample_png(64, 48)).await);

    let job_id = submit(
        &app,
        user,
        id,
        json!({"rotate": {"angle": 90}, "format": "jpeg", "mode": "new_derivative"}),
    )
    .await;
    assert_eq!(app.run_next_job().await, Some(JobState::Completed));

    let status: Value = app.get(&format!("/jobs/{}", job_id), user).await.json();
    let target: Uuid = status["targetImageId"].as_str().unwrap().parse().unwrap();
    assert_ne!(target, id);

    let source: Value = app.get(&format!("/images/{}", id), user).await.json();
    assert_eq!(source["width"], 64);
    assert_eq!(source["format"], "png");

    let derivative: Value = app.get(&format!("/images/{}", target), user).await.json();
    assert_eq!(derivative["width"], 48);
    assert_eq!(derivative["height"], 64);
    assert_eq!(derivative["format"], "jpeg");
    assert_eq!(derivative["mime_type"], "image/jpeg");
    assert_eq!(derivative["original_file_name"], "transformed-cat.png");
    assert_eq!(derivative["owner_id"], source["owner_id"]);

    let listing: Vec<Value> = app.get("/images", user).await.json();
    assert_eq!(listing.len(), 2);
}

#[tokio::test]
async fn test_submit_by_non_owner_enqueues_nothing() {
    let app = TestApp::in_memory();
    let owner = Uuid::new_v4();
    let id = id_of(&app.upload(owner, "a.png", sample_png(32, 32)).await);

    let response = app
        .post(&format!("/images/transform/{}", id), Uuid::new_v4())
        .json(&json!({"resize": {"width": 16}}))
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
    let body: Value = response.json();
    assert_eq!(body["code"], "UNAUTHORIZED");
    assert!(app.queue.is_empty().await);
}

#[tokio::test]
async fn test_invalid_submissions_are_rejected_up_front() {
    let app = TestApp::in_memory();
    let user = Uuid::new_v4();
    let id = id_of(&app.upload(user, "a.png", sample_png(100, 50)).await);
    let path = format!("/images/transform/{}", id);

    let empty = app.post(&path, user).json(&json!({})).await;
    empty.assert_status(StatusCode::BAD_REQUEST);

    let crop = app
        .post(&path, user)
        .json(&json!({"crop": {"x": 90, "y": 0, "width": 20, "height": 10}}))
        .await;
    crop.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = crop.json();
    assert_eq!(body["code"], "INVALID_INPUT");

    let quality = app
        .post(&path, user)
        .json(&json!({"compress": {"quality": 0}}))
        .await;
    quality.assert_status(StatusCode::BAD_REQUEST);

    let missing = app
        .post(&format!("/images/transform/{}", Uuid::new_v4()), user)
        .json(&json!({"resize": {"width": 10}}))
        .await;
    missing.assert_status(StatusCode::NOT_FOUND);

    assert!(app.queue.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn test_redelivered_job_writes_one_record() {
    let app = TestApp::in_memory();
    let user = Uuid::new_v4();
    let id = id_of(&app.upload(user, "a.png", sample_png(40, 40)).await);
    submit(
        &app,
        user,
        id,
        json!({"resize": {"width": 20}, "mode": "new_derivative"}),
    )
    .await;

    // First delivery does the work but its worker dies before acknowledging.
    let job = app.queue.reserve().await.unwrap().unwrap();
    app.handler.handle(&job).await.unwrap();
    assert_eq!(app.run_next_job().await, None);

    tokio::time::advance(VISIBILITY_TIMEOUT + Duration::from_secs(1)).await;
    assert_eq!(app.run_next_job().await, Some(JobState::Completed));

    assert_eq!(app.repository.len().await, 2);
    let listing: Vec<Value> = app.get("/images", user).await.json();
    assert_eq!(listing.len(), 2);
}

#[tokio::test]
async fn test_transform_invalidates_cached_reads() {
    let app = TestApp::in_memory();
    let user = Uuid::new_v4();
    let id = id_of(&app.upload(user, "a.png", sample_png(80, 60)).await);
    let path = format!("/images/{}", id);

    // Populate both cache entries.
    let before: Value = app.get(&path, user).await.json();
    assert_eq!(before["width"], 80);
    let listing: Vec<Value> = app.get("/images", user).await.json();
    assert_eq!(listing[0]["width"], 80);
    assert_eq!(app.cache.len().await, 2);

    submit(&app, user, id, json!({"resize": {"width": 40, "height": 30}})).await;
    assert_eq!(app.run_next_job().await, Some(JobState::Completed));
    assert!(app.cache.is_empty().await);

    let after: Value = app.get(&path, user).await.json();
    assert_eq!(after["width"], 40);
    let listing: Vec<Value> = app.get("/images", user).await.json();
    assert_eq!(listing[0]["height"], 30);
}

#[tokio::test]
async fn test_every_read_resolves_a_fresh_url() {
    let app = TestApp::in_memory();
    let user = Uuid::new_v4();
    let id = id_of(&app.upload(user, "a.png", sample_png(8, 8)).await);
    let path = format!("/images/{}", id);

    let calls = app.memory_storage().url_calls();
    let first: Value = app.get(&path, user).await.json();
    let second: Value = app.get(&path, user).await.json();

    assert_eq!(app.memory_storage().url_calls(), calls + 2);
    assert_ne!(first["url"], second["url"]);
}

#[tokio::test]
async fn test_requests_without_caller_are_rejected() {
    let app = TestApp::in_memory();

    let response = app.server.get("/images").await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["code"], "MISSING_CALLER_ID");

    let response = app
        .server
        .get("/images")
        .add_header("x-user-id", "not-a-uuid")
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_owner_scoped_reads() {
    let app = TestApp::in_memory();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let id = id_of(&app.upload(alice, "a.png", sample_png(8, 8)).await);
    app.upload(alice, "b.png", sample_png(8, 8)).await;

    app.get(&format!("/images/{}", id), bob)
        .await
        .assert_status(StatusCode::FORBIDDEN);
    app.get(&format!("/images/{}", Uuid::new_v4()), alice)
        .await
        .assert_status(StatusCode::NOT_FOUND);

    let alice_images: Vec<Value> = app.get("/images", alice).await.json();
    assert_eq!(alice_images.len(), 2);
    assert_eq!(alice_images[0]["original_file_name"], "b.png");
    let bob_images: Vec<Value> = app.get("/images", bob).await.json();
    assert!(bob_images.is_empty());
}

#[tokio::test]
async fn test_delete_removes_record_and_bytes() {
    let app = TestApp::in_memory();
    let user = Uuid::new_v4();
    let id = id_of(&app.upload(user, "a.png", sample_png(8, 8)).await);
    let path = format!("/images/{}", id);

    app.delete(&path, Uuid::new_v4())
        .await
        .assert_status(StatusCode::FORBIDDEN);

    app.get(&path, user).await.assert_status_ok();
    app.delete(&path, user)
        .await
        .assert_status(StatusCode::NO_CONTENT);

    app.get(&path, user).await.assert_status(StatusCode::NOT_FOUND);
    assert!(app.memory_storage().keys().await.is_empty());
    let listing: Vec<Value> = app.get("/images", user).await.json();
    assert!(listing.is_empty());
}

#[tokio::test]
async fn test_job_status_is_visible_to_submitter_only() {
    let app = TestApp::in_memory();
    let user = Uuid::new_v4();
    let id = id_of(&app.upload(user, "a.png", sample_png(16, 16)).await);
    let job_id = submit(&app, user, id, json!({"flip": {"horizontal": true}})).await;
    let path = format!("/jobs/{}", job_id);

    let queued: Value = app.get(&path, user).await.json();
    assert_eq!(queued["state"], "queued");
    assert_eq!(queued["attempts"], 0);
    assert_eq!(queued["imageId"], id.to_string());
    assert_eq!(queued["targetImageId"], id.to_string());

    app.get(&path, Uuid::new_v4())
        .await
        .assert_status(StatusCode::NOT_FOUND);

    assert_eq!(app.run_next_job().await, Some(JobState::Completed));
    let done: Value = app.get(&path, user).await.json();
    assert_eq!(done["state"], "completed");
    assert_eq!(done["attempts"], 1);
}

#[tokio::test]
async fn test_watermark_without_font_is_dead_lettered() {
    let app = TestApp::in_memory();
    let user = Uuid::new_v4();
    let id = id_of(&app.upload(user, "a.png", sample_png(16, 16)).await);
    let job_id = submit(&app, user, id, json!({"watermark": {"text": "hi"}})).await;

    assert_eq!(
        app.run_next_job().await,
        Some(JobState::Failed(FailureKind::Terminal))
    );
    let status: Value = app.get(&format!("/jobs/{}", job_id), user).await.json();
    assert_eq!(status["state"], "failed_terminal");
    assert!(status["lastError"].is_string());

    let view: Value = app.get(&format!("/images/{}", id), user).await.json();
    assert_eq!(view["width"], 16);
}

#[tokio::test]
async fn test_upload_rejects_non_images() {
    let app = TestApp::in_memory();
    let user = Uuid::new_v4();

    let response = app
        .post("/images/upload", user)
        .multipart(image_form("notes.txt", b"just some text".to_vec()))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["code"], "INVALID_IMAGE");
    assert!(app.memory_storage().keys().await.is_empty());
}

#[tokio::test]
async fn test_failed_save_removes_uploaded_bytes() {
    let app = TestApp::in_memory();
    let user = Uuid::new_v4();
    app.repository.fail_next_saves(1);

    let response = app
        .post("/images/upload", user)
        .multipart(image_form("a.png", sample_png(8, 8)))
        .await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["code"], "REPOSITORY_ERROR");
    assert_eq!(body["error"], "Failed to access database");

    assert!(app.memory_storage().keys().await.is_empty());
    assert!(app.repository.is_empty().await);
}

#[tokio::test]
async fn test_storage_outage_is_retried() {
    let app = TestApp::in_memory();
    let user = Uuid::new_v4();
    let id = id_of(&app.upload(user, "a.png", sample_png(16, 16)).await);
    submit(&app, user, id, json!({"resize": {"width": 8}})).await;

    app.memory_storage().fail_next_uploads(1);
    assert_eq!(
        app.run_next_job().await,
        Some(JobState::Failed(FailureKind::Retryable))
    );
}

#[tokio::test(start_paused = true)]
async fn test_failed_record_write_leaves_no_orphaned_output() {
    let app = TestApp::in_memory();
    let user = Uuid::new_v4();
    let id = id_of(&app.upload(user, "a.png", sample_png(16, 16)).await);
    submit(
        &app,
        user,
        id,
        json!({"resize": {"width": 8}, "mode": "new_derivative"}),
    )
    .await;

    app.repository.fail_next_saves(1);
    assert_eq!(
        app.run_next_job().await,
        Some(JobState::Failed(FailureKind::Retryable))
    );
    assert_eq!(app.memory_storage().keys().await.len(), 1);

    // First retry is due two seconds after the failure.
    tokio::time::advance(Duration::from_secs(3)).await;
    assert_eq!(app.run_next_job().await, Some(JobState::Completed));

    assert_eq!(app.repository.len().await, 2);
    assert_eq!(app.memory_storage().keys().await.len(), 2);
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::in_memory();
    let response = app.server.get("/health").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
}
