/// HTTP handlers for media-related endpoints
///
/// This module contains handlers for:
/// - Videos: upload, listing, metadata, likes, lifecycle status
/// - WebSockets: live ingestion progress and user presence
pub mod videos;
pub mod ws;

use actix_web::web;
use std::sync::Arc;

use crate::middleware::{JwtAuthMiddleware, JwtVerifier, MetricsMiddleware};

pub use videos::{
    delete_video, get_video, get_video_status, like_video, list_videos, update_video,
    upload_video,
};
pub use ws::{online_users, presence_ws, progress_stream_ws};

/// Register the API and WebSocket routes
///
/// Application data (stores, orchestrator, relay, presence registry, ingest
/// config and verifier) is expected to be installed by the caller.
pub fn configure(cfg: &mut web::ServiceConfig, verifier: Arc<JwtVerifier>) {
    cfg.service(
        web::scope("/api/v1")
            .wrap(JwtAuthMiddleware::new(verifier))
            .wrap(MetricsMiddleware)
            .service(
                web::scope("/videos")
                    .route("", web::get().to(list_videos))
                    .route("/upload", web::post().to(upload_video))
                    .route("/{id}", web::get().to(get_video))
                    .route("/{id}", web::put().to(update_video))
                    .route("/{id}", web::delete().to(delete_video))
                    .route("/{id}/status", web::get().to(get_video_status))
                    .route("/{id}/like", web::post().to(like_video)),
            )
            .route("/presence/online", web::get().to(online_users)),
    )
    .service(
        web::scope("/ws")
            .route("/videos/{id}/progress", web::get().to(progress_stream_ws))
            .route("/presence", web::get().to(presence_ws)),
    );
}
