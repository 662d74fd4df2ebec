//! HTTP and WebSocket route tests over in-memory collaborators
mod common;

use actix_web::{http::StatusCode, test, web, App};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use common::{FakeToolkit, Harness, ScriptedAssetStore};
use media_service::config::IngestConfig;
use media_service::db::VideoStore;
use media_service::handlers;
use media_service::middleware::JwtVerifier;
use media_service::models::{NewVideo, PublishedVideo, Video, VideoCategory, VideoStatus};
use media_service::services::storage::{AssetStore, ResourceType};
use media_service::services::PresenceRegistry;

const SECRET: &str = "test-secret";
const BOUNDARY: &str = "nexushub-test-boundary";

struct TestContext {
    harness: Harness,
    presence: PresenceRegistry,
    ingest: IngestConfig,
    verifier: Arc<JwtVerifier>,
}

impl TestContext {
    async fn new(max_upload_bytes: usize) -> Self {
        let harness = Harness::new(FakeToolkit::default(), ScriptedAssetStore::default());
        let upload_dir = harness.dir.path().join("uploads");
        tokio::fs::create_dir_all(&upload_dir).await.unwrap();

        let ingest = IngestConfig {
            upload_dir,
            work_dir: harness.dir.path().join("work"),
            max_upload_bytes,
            max_concurrent_transcodes: None,
        };

        Self {
            harness,
            presence: PresenceRegistry::new(),
            ingest,
            verifier: Arc::new(JwtVerifier::new(SECRET)),
        }
    }

    fn upload_dir(&self) -> PathBuf {
        self.ingest.upload_dir.clone()
    }

    async fn upload_dir_entries(&self) -> usize {
        let mut entries = tokio::fs::read_dir(self.upload_dir()).await.unwrap();
        let mut count = 0;
        while entries.next_entry().await.unwrap().is_some() {
            count += 1;
        }
        count
    }

    async fn seed(&self, owner: Uuid, is_public: bool, processed: bool) -> Video {
        let mut video = Video::new_upload(NewVideo {
            owner_id: owner,
            title: "Seeded".to_string(),
            description: "Seeded video".to_string(),
            category: VideoCategory::Education,
            tags: vec![],
            is_public,
            temp_path: "/tmp/seeded.mp4".to_string(),
        });
        if processed {
            video.start_processing().unwrap();
            video
                .complete(&PublishedVideo {
                    video_url: format!("https://cdn.test/videos/{}/master.m3u8", video.id),
                    thumbnail_url: format!("https://cdn.test/videos/{}/thumbs/thumbnail.jpg", video.id),
                    video_public_id: format!("videos/{}", video.id),
                    thumbnail_public_id: format!("videos/{}/thumbs/thumbnail.jpg", video.id),
                    duration_seconds: 30.0,
                })
                .unwrap();
        }
        self.harness.memory.insert(&video).await.unwrap();
        video
    }
}

macro_rules! init_app {
    ($ctx:expr) => {{
        let ctx = &$ctx;
        let store: Arc<dyn VideoStore> = Arc::new(ctx.harness.store.clone());
        let assets: Arc<dyn AssetStore> = Arc::new(ctx.harness.assets.clone());
        let verifier = ctx.verifier.clone();
        test::init_service(
            App::new()
                .app_data(web::Data::new(store))
                .app_data(web::Data::new(assets))
                .app_data(web::Data::new(ctx.harness.orchestrator.clone()))
                .app_data(web::Data::new(ctx.harness.relay.clone()))
                .app_data(web::Data::new(ctx.presence.clone()))
                .app_data(web::Data::new(ctx.ingest.clone()))
                .app_data(web::Data::from(verifier.clone()))
                .configure(|cfg| handlers::configure(cfg, verifier)),
        )
        .await
    }};
}

fn token_for(user: Uuid) -> String {
    let claims = json!({
        "sub": user.to_string(),
        "exp": chrono::Utc::now().timestamp() + 3600,
    });
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

fn bearer(user: Uuid) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", token_for(user)))
}

fn multipart(fields: &[(&str, &str)], file: Option<(&str, &str, &[u8])>) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, content_type, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"video\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(user: Option<Uuid>, body: Vec<u8>) -> test::TestRequest {
    let mut req = test::TestRequest::post()
        .uri("/api/v1/videos/upload")
        .insert_header((
            "Content-Type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        ))
        .set_payload(body);
    if let Some(user) = user {
        req = req.insert_header(bearer(user));
    }
    req
}

const VALID_FIELDS: &[(&str, &str)] = &[
    ("title", "My first clip"),
    ("description", "Recorded on the weekend"),
    ("category", "gaming"),
    ("tags", "speedrun, ,retro"),
];

#[actix_web::test]
async fn upload_accepts_video_and_processes_in_background() {
    let ctx = TestContext::new(1024 * 1024).await;
    let app = init_app!(ctx);
    let owner = Uuid::new_v4();

    let body = multipart(VALID_FIELDS, Some(("clip.MP4", "video/mp4", &b"fake video bytes"[..])));
    let resp = test::call_service(&app, upload_request(Some(owner), body).to_request()).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let body: Value = test::read_body_json(resp).await;
    assert!(body["message"].as_str().unwrap().contains("processing started"));
    let video_id = Uuid::parse_str(body["videoId"].as_str().unwrap()).unwrap();

    let mut status = VideoStatus::Uploaded;
    for _ in 0..100 {
        status = ctx.harness.stored(video_id).await.status;
        if status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(status, VideoStatus::Processed);

    let stored = ctx.harness.stored(video_id).await;
    assert_eq!(stored.owner_id, owner);
    assert_eq!(stored.category, VideoCategory::Gaming);
    assert_eq!(stored.tags, vec!["speedrun", "retro"]);
    assert_eq!(ctx.upload_dir_entries().await, 0);
}

#[actix_web::test]
async fn upload_requires_authentication() {
    let ctx = TestContext::new(1024).await;
    let app = init_app!(ctx);

    let body = multipart(VALID_FIELDS, Some(("clip.mp4", "video/mp4", &b"bytes"[..])));
    let resp = test::call_service(&app, upload_request(None, body).to_request()).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(ctx.harness.memory.is_empty().await);
}

#[actix_web::test]
async fn upload_rejects_non_video_content() {
    let ctx = TestContext::new(1024).await;
    let app = init_app!(ctx);

    let body = multipart(VALID_FIELDS, Some(("notes.txt", "text/plain", &b"hello"[..])));
    let resp =
        test::call_service(&app, upload_request(Some(Uuid::new_v4()), body).to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(ctx.harness.memory.is_empty().await);
    assert_eq!(ctx.upload_dir_entries().await, 0);
}

#[actix_web::test]
async fn upload_over_size_limit_is_rejected_and_discarded() {
    let ctx = TestContext::new(8).await;
    let app = init_app!(ctx);

    let body = multipart(VALID_FIELDS, Some(("clip.mp4", "video/mp4", &[0u8; 64][..])));
    let resp =
        test::call_service(&app, upload_request(Some(Uuid::new_v4()), body).to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(ctx.harness.memory.is_empty().await);
    assert_eq!(ctx.upload_dir_entries().await, 0);
}

#[actix_web::test]
async fn upload_with_invalid_metadata_discards_file() {
    let ctx = TestContext::new(1024).await;
    let app = init_app!(ctx);

    let fields = [("title", ""), ("description", "ok"), ("category", "gaming")];
    let body = multipart(&fields, Some(("clip.mp4", "video/mp4", &b"bytes"[..])));
    let resp =
        test::call_service(&app, upload_request(Some(Uuid::new_v4()), body).to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(ctx.upload_dir_entries().await, 0);

    let fields = [("title", "t"), ("description", "d"), ("category", "cooking")];
    let body = multipart(&fields, Some(("clip.mp4", "video/mp4", &b"bytes"[..])));
    let resp =
        test::call_service(&app, upload_request(Some(Uuid::new_v4()), body).to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(ctx.harness.memory.is_empty().await);
}

#[actix_web::test]
async fn upload_without_file_is_rejected() {
    let ctx = TestContext::new(1024).await;
    let app = init_app!(ctx);

    let body = multipart(VALID_FIELDS, None);
    let resp =
        test::call_service(&app, upload_request(Some(Uuid::new_v4()), body).to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn listing_shows_processed_public_videos_with_pagination() {
    let ctx = TestContext::new(1024).await;
    let owner = Uuid::new_v4();
    let listed = ctx.seed(owner, true, true).await;
    ctx.seed(owner, false, true).await;
    ctx.seed(owner, true, false).await;
    let app = init_app!(ctx);

    let req = test::TestRequest::get()
        .uri("/api/v1/videos?page=1&limit=5")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;

    let videos = body["videos"].as_array().unwrap();
    assert_eq!(videos.len(), 1);
    assert_eq!(videos[0]["id"], listed.id.to_string());
    assert_eq!(videos[0]["status"], "processed");
    assert_eq!(body["pagination"]["totalVideos"], 1);
    assert_eq!(body["pagination"]["currentPage"], 1);
    assert_eq!(body["pagination"]["hasNext"], false);

    let req = test::TestRequest::get()
        .uri("/api/v1/videos?category=unknown")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn private_video_is_visible_only_to_owner() {
    let ctx = TestContext::new(1024).await;
    let owner = Uuid::new_v4();
    let video = ctx.seed(owner, false, true).await;
    let app = init_app!(ctx);
    let uri = format!("/api/v1/videos/{}", video.id);

    let resp = test::call_service(&app, test::TestRequest::get().uri(&uri).to_request()).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::get()
        .uri(&uri)
        .insert_header(bearer(Uuid::new_v4()))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::get()
        .uri(&uri)
        .insert_header(bearer(owner))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["views"], 1);
    assert_eq!(body["duration"], 30.0);
}

#[actix_web::test]
async fn unknown_and_malformed_ids() {
    let ctx = TestContext::new(1024).await;
    let app = init_app!(ctx);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/videos/{}", Uuid::new_v4()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["code"], "VIDEO_NOT_FOUND");

    let req = test::TestRequest::get()
        .uri("/api/v1/videos/not-a-uuid/status")
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn status_reports_lifecycle_without_counting_a_view() {
    let ctx = TestContext::new(1024).await;
    let video = ctx.seed(Uuid::new_v4(), true, false).await;
    let app = init_app!(ctx);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/videos/{}/status", video.id))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["status"], "uploaded");
    assert_eq!(body["progress"], 0);
    assert!(body["videoUrl"].is_null());

    assert_eq!(ctx.harness.stored(video.id).await.views, 0);
}

#[actix_web::test]
async fn only_owner_can_update_metadata() {
    let ctx = TestContext::new(1024).await;
    let owner = Uuid::new_v4();
    let video = ctx.seed(owner, true, true).await;
    let app = init_app!(ctx);
    let uri = format!("/api/v1/videos/{}", video.id);

    let req = test::TestRequest::put()
        .uri(&uri)
        .insert_header(bearer(Uuid::new_v4()))
        .set_json(json!({ "title": "Hijacked" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::put()
        .uri(&uri)
        .insert_header(bearer(owner))
        .set_json(json!({ "title": "  Renamed  ", "category": "tutorial", "isPublic": false }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["title"], "Renamed");
    assert_eq!(body["category"], "tutorial");
    assert_eq!(body["isPublic"], false);

    let req = test::TestRequest::put()
        .uri(&uri)
        .insert_header(bearer(owner))
        .set_json(json!({ "title": "x".repeat(101) }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn delete_removes_record_and_stored_artifacts() {
    let ctx = TestContext::new(1024).await;
    let owner = Uuid::new_v4();
    let video = ctx.seed(owner, true, true).await;
    let app = init_app!(ctx);
    let uri = format!("/api/v1/videos/{}", video.id);

    let req = test::TestRequest::delete()
        .uri(&uri)
        .insert_header(bearer(Uuid::new_v4()))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::FORBIDDEN);

    let req = test::TestRequest::delete()
        .uri(&uri)
        .insert_header(bearer(owner))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NO_CONTENT);

    assert!(ctx.harness.memory.get(video.id).await.unwrap().is_none());
    assert_eq!(
        ctx.harness.assets.deletes(),
        vec![
            (format!("videos/{}", video.id), ResourceType::Video),
            (format!("videos/{}/thumbs/thumbnail.jpg", video.id), ResourceType::Image),
        ]
    );
}

#[actix_web::test]
async fn like_requires_auth_and_counts() {
    let ctx = TestContext::new(1024).await;
    let video = ctx.seed(Uuid::new_v4(), true, true).await;
    let app = init_app!(ctx);
    let uri = format!("/api/v1/videos/{}/like", video.id);

    let resp = test::call_service(&app, test::TestRequest::post().uri(&uri).to_request()).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = test::TestRequest::post()
        .uri(&uri)
        .insert_header(bearer(Uuid::new_v4()))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["likes"], 1);
}

#[actix_web::test]
async fn invalid_bearer_token_is_rejected() {
    let ctx = TestContext::new(1024).await;
    let app = init_app!(ctx);

    let req = test::TestRequest::get()
        .uri("/api/v1/videos")
        .insert_header(("Authorization", "Bearer not-a-jwt"))
        .to_request();
    let status = match test::try_call_service(&app, req).await {
        Ok(resp) => resp.status(),
        Err(err) => err.as_response_error().status_code(),
    };
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn online_users_lists_connected_users() {
    let ctx = TestContext::new(1024).await;
    let user = Uuid::new_v4();
    let (_connection, _rx) = ctx.presence.connect(user).await;
    let app = init_app!(ctx);

    let req = test::TestRequest::get()
        .uri("/api/v1/presence/online")
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["onlineUsers"][0], user.to_string());
}

#[actix_rt::test]
async fn websocket_routes_validate_before_upgrading() {
    let ctx = TestContext::new(1024).await;
    let app = init_app!(ctx);

    // unknown video
    let req = test::TestRequest::get()
        .uri(&format!("/ws/videos/{}/progress", Uuid::new_v4()))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

    // presence without a token
    let req = test::TestRequest::get().uri("/ws/presence").to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
}
