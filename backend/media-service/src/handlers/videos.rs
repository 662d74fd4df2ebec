/// Video handlers - HTTP endpoints for video operations
use actix_multipart::{Field, Multipart};
use actix_web::{web, HttpResponse};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::config::IngestConfig;
use crate::db::VideoStore;
use crate::error::{AppError, Result};
use crate::middleware::UserId;
use crate::models::{
    ListVideosQuery, Pagination, UpdateVideoRequest, UploadAcceptedResponse, UploadVideoForm,
    Video, VideoListResponse, VideoResponse, VideoStatusResponse,
};
use crate::services::cleanup::remove_file;
use crate::services::storage::{AssetStore, ResourceType};
use crate::services::IngestOrchestrator;

/// Text form fields are small; anything larger is rejected
const MAX_FIELD_BYTES: usize = 16 * 1024;

fn parse_video_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::BadRequest("Invalid video ID".to_string()))
}

async fn load_video(store: &dyn VideoStore, video_id: Uuid) -> Result<Video> {
    store
        .get(video_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Video not found".to_string()))
}

async fn load_owned_video(store: &dyn VideoStore, video_id: Uuid, user: UserId) -> Result<Video> {
    let video = load_video(store, video_id).await?;
    if video.owner_id != user.0 {
        return Err(AppError::Forbidden(
            "Only the owner can modify this video".to_string(),
        ));
    }
    Ok(video)
}

/// Upload a video file and start ingestion
///
/// Responds as soon as the file is on disk and the record exists; ingestion
/// continues on a background task and reports over the progress channel.
pub async fn upload_video(
    user: UserId,
    store: web::Data<Arc<dyn VideoStore>>,
    orchestrator: web::Data<IngestOrchestrator>,
    ingest: web::Data<IngestConfig>,
    mut payload: Multipart,
) -> Result<HttpResponse> {
    let mut form = UploadVideoForm::default();
    let mut saved: Option<PathBuf> = None;

    if let Err(e) = read_upload_fields(&mut payload, &ingest, &mut form, &mut saved).await {
        if let Some(path) = &saved {
            remove_file(path).await;
        }
        return Err(e);
    }

    let path = saved.ok_or_else(|| AppError::BadRequest("No video file provided".to_string()))?;

    let new_video = match form.into_new_video(user.0, path.display().to_string()) {
        Ok(new_video) => new_video,
        Err(e) => {
            remove_file(&path).await;
            return Err(e);
        }
    };

    let video = Video::new_upload(new_video);
    if let Err(e) = store.insert(&video).await {
        remove_file(&path).await;
        return Err(e);
    }

    tracing::info!(
        video_id = %video.id,
        owner_id = %video.owner_id,
        path = %path.display(),
        "video uploaded, ingestion scheduled"
    );

    let video_id = video.id;
    orchestrator.spawn(path, video);

    Ok(HttpResponse::Created().json(UploadAcceptedResponse {
        message: "Video uploaded successfully, processing started".to_string(),
        video_id,
    }))
}

async fn read_upload_fields(
    payload: &mut Multipart,
    ingest: &IngestConfig,
    form: &mut UploadVideoForm,
    saved: &mut Option<PathBuf>,
) -> Result<()> {
    while let Some(field) = payload.next().await {
        let mut field =
            field.map_err(|e| AppError::BadRequest(format!("Multipart error: {e}")))?;
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "video" => {
                if saved.is_some() {
                    return Err(AppError::BadRequest(
                        "Only one video file may be uploaded".to_string(),
                    ));
                }
                *saved = Some(receive_video(&mut field, ingest).await?);
            }
            "title" => form.title = read_text(&mut field).await?,
            "description" => form.description = read_text(&mut field).await?,
            "category" => form.category = Some(read_text(&mut field).await?),
            "tags" => form.tags = Some(read_text(&mut field).await?),
            "isPublic" => {
                let raw = read_text(&mut field).await?;
                form.is_public = Some(!raw.trim().eq_ignore_ascii_case("false"));
            }
            _ => {
                while let Some(chunk) = field.next().await {
                    chunk.map_err(|e| AppError::BadRequest(format!("Multipart error: {e}")))?;
                }
            }
        }
    }
    Ok(())
}

async fn read_text(field: &mut Field) -> Result<String> {
    let mut data = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|e| AppError::BadRequest(format!("Multipart error: {e}")))?;
        if data.len() + chunk.len() > MAX_FIELD_BYTES {
            return Err(AppError::BadRequest("Form field too large".to_string()));
        }
        data.extend_from_slice(&chunk);
    }
    String::from_utf8(data).map_err(|_| AppError::BadRequest("Form field is not UTF-8".to_string()))
}

/// Stream the file part into `UPLOAD_DIR`, enforcing type and size limits
async fn receive_video(field: &mut Field, ingest: &IngestConfig) -> Result<PathBuf> {
    let is_video = field
        .content_type()
        .map(|mime| mime.essence_str().starts_with("video/"))
        .unwrap_or(false);
    if !is_video {
        return Err(AppError::BadRequest(
            "Only video files are allowed".to_string(),
        ));
    }

    let extension = field
        .content_disposition()
        .and_then(|cd| cd.get_filename())
        .and_then(|name| Path::new(name).extension().and_then(|ext| ext.to_str()))
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase());

    let file_name = match extension {
        Some(ext) => format!("{}.{ext}", Uuid::new_v4()),
        None => Uuid::new_v4().to_string(),
    };
    let path = ingest.upload_dir.join(file_name);

    match write_field(field, &path, ingest.max_upload_bytes).await {
        Ok(0) => {
            remove_file(&path).await;
            Err(AppError::BadRequest("Uploaded file is empty".to_string()))
        }
        Ok(_) => Ok(path),
        Err(e) => {
            remove_file(&path).await;
            Err(e)
        }
    }
}

async fn write_field(field: &mut Field, path: &Path, max_bytes: usize) -> Result<usize> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to create upload file: {e}")))?;
    let mut written = 0usize;

    while let Some(chunk) = field.next().await {
        let chunk = chunk.map_err(|e| AppError::BadRequest(format!("Upload interrupted: {e}")))?;
        written += chunk.len();
        if written > max_bytes {
            return Err(AppError::BadRequest(format!(
                "File exceeds the {} MB limit",
                max_bytes / (1024 * 1024)
            )));
        }
        file.write_all(&chunk)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to write upload: {e}")))?;
    }

    file.flush()
        .await
        .map_err(|e| AppError::Internal(format!("Failed to write upload: {e}")))?;
    Ok(written)
}

/// List processed public videos
pub async fn list_videos(
    store: web::Data<Arc<dyn VideoStore>>,
    query: web::Query<ListVideosQuery>,
) -> Result<HttpResponse> {
    let filter = query.into_inner().into_filter()?;
    let (videos, total) = store.list_public(&filter).await?;

    Ok(HttpResponse::Ok().json(VideoListResponse {
        videos: videos.into_iter().map(VideoResponse::from).collect(),
        pagination: Pagination::new(filter.page, filter.limit, total),
    }))
}

/// Get a specific video; counts as a view
pub async fn get_video(
    viewer: Option<UserId>,
    store: web::Data<Arc<dyn VideoStore>>,
    video_id: web::Path<String>,
) -> Result<HttpResponse> {
    let video_id = parse_video_id(&video_id)?;
    let mut video = load_video(store.get_ref().as_ref(), video_id).await?;

    if !video.is_visible_to(viewer.map(|v| v.0)) {
        return Err(AppError::Forbidden("This video is private".to_string()));
    }

    video.views = store.record_view(video_id).await?;
    Ok(HttpResponse::Ok().json(VideoResponse::from(video)))
}

/// Lifecycle snapshot for clients that missed live progress events
pub async fn get_video_status(
    store: web::Data<Arc<dyn VideoStore>>,
    video_id: web::Path<String>,
) -> Result<HttpResponse> {
    let video_id = parse_video_id(&video_id)?;
    let video = load_video(store.get_ref().as_ref(), video_id).await?;
    Ok(HttpResponse::Ok().json(VideoStatusResponse::from(&video)))
}

/// Update video metadata
pub async fn update_video(
    user: UserId,
    store: web::Data<Arc<dyn VideoStore>>,
    video_id: web::Path<String>,
    req: web::Json<UpdateVideoRequest>,
) -> Result<HttpResponse> {
    let video_id = parse_video_id(&video_id)?;
    load_owned_video(store.get_ref().as_ref(), video_id, user).await?;

    let update = req.into_inner().into_update()?;
    let video = store.update_metadata(video_id, &update).await?;
    Ok(HttpResponse::Ok().json(VideoResponse::from(video)))
}

/// Delete a video and, best effort, its published artifacts
pub async fn delete_video(
    user: UserId,
    store: web::Data<Arc<dyn VideoStore>>,
    assets: web::Data<Arc<dyn AssetStore>>,
    video_id: web::Path<String>,
) -> Result<HttpResponse> {
    let video_id = parse_video_id(&video_id)?;
    let video = load_owned_video(store.get_ref().as_ref(), video_id, user).await?;

    if !store.delete(video_id).await? {
        return Err(AppError::NotFound("Video not found".to_string()));
    }

    let artifacts = [
        (video.video_public_id.as_deref(), ResourceType::Video),
        (video.thumbnail_public_id.as_deref(), ResourceType::Image),
    ];
    for (public_id, resource_type) in artifacts {
        let Some(public_id) = public_id else { continue };
        if let Err(e) = assets.delete(public_id, resource_type).await {
            tracing::warn!(%video_id, %public_id, error = %e, "failed to delete stored artifact");
        }
    }

    tracing::info!(%video_id, "video deleted");
    Ok(HttpResponse::NoContent().finish())
}

/// Like a video
pub async fn like_video(
    _user: UserId,
    store: web::Data<Arc<dyn VideoStore>>,
    video_id: web::Path<String>,
) -> Result<HttpResponse> {
    let video_id = parse_video_id(&video_id)?;
    let likes = store.increment_likes(video_id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "likes": likes })))
}
