use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
/// OpenAPI documentation for the NexusHub Media Service
use utoipa::OpenApi;

use crate::models::{
    Pagination, UpdateVideoRequest, UploadAcceptedResponse, VideoCategory, VideoListResponse,
    VideoResponse, VideoStatus, VideoStatusResponse,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "NexusHub Media Service API",
        version = "1.0.0",
        description = "Video ingestion for NexusHub. Accepts uploads, transcodes them to adaptive HLS with a thumbnail, publishes both to object storage and reports progress live over WebSockets. The record returned by the status endpoint is authoritative when live events are missed.",
        contact(
            name = "NexusHub Team",
            email = "team@nexushub.dev"
        ),
        license(
            name = "MIT"
        )
    ),
    servers(
        (url = "http://localhost:8082", description = "Development server"),
    ),
    components(schemas(
        VideoStatus,
        VideoCategory,
        VideoResponse,
        VideoStatusResponse,
        VideoListResponse,
        Pagination,
        UpdateVideoRequest,
        UploadAcceptedResponse,
    )),
    tags(
        (name = "health", description = "Service health checks"),
        (name = "videos", description = "Video upload, listing and metadata"),
        (name = "progress", description = "Live ingestion progress over WebSocket"),
        (name = "presence", description = "Online user tracking"),
    ),
    modifiers(&SecurityAddon),
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("HS256 JWT Bearer token"))
                        .build(),
                ),
            )
        }
    }
}

impl ApiDoc {
    pub fn title() -> &'static str {
        "NexusHub Media Service"
    }

    pub fn version() -> &'static str {
        "1.0.0"
    }

    pub fn openapi_json_path() -> &'static str {
        "/api/v1/openapi.json"
    }
}
