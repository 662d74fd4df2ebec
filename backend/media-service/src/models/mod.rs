/// Data models for media-service
///
/// This module defines structures for:
/// - Video: the persisted asset record and its lifecycle status
/// - Request/response DTOs for the video endpoints
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, Result};

// ========================================
// Video Models
// ========================================

/// Video status in the ingestion lifecycle
///
/// `uploaded -> processing -> processed | failed`. The last two are terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, utoipa::ToSchema,
)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum VideoStatus {
    /// File received, ingestion not started
    Uploaded,
    /// Probe, transcode and publish in progress
    Processing,
    /// Published with durable URLs
    Processed,
    /// Ingestion failed; a new upload is required to retry
    Failed,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Processing => "processing",
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Processed | Self::Failed)
    }

    pub fn can_transition_to(&self, next: VideoStatus) -> bool {
        matches!(
            (self, next),
            (Self::Uploaded, Self::Processing)
                | (Self::Processing, Self::Processed)
                | (Self::Processing, Self::Failed)
        )
    }

    /// Returns an error unless `self -> next` is a legal transition
    pub fn ensure_transition(&self, next: VideoStatus) -> Result<()> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(AppError::InvalidTransition {
                from: *self,
                to: next,
            })
        }
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Video category
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type, utoipa::ToSchema,
)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum VideoCategory {
    Gaming,
    Tutorial,
    Entertainment,
    Education,
    #[default]
    Other,
}

impl VideoCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gaming => "gaming",
            Self::Tutorial => "tutorial",
            Self::Entertainment => "entertainment",
            Self::Education => "education",
            Self::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        s.parse()
    }
}

impl FromStr for VideoCategory {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gaming" => Ok(Self::Gaming),
            "tutorial" => Ok(Self::Tutorial),
            "entertainment" => Ok(Self::Entertainment),
            "education" => Ok(Self::Education),
            "other" => Ok(Self::Other),
            _ => Err(AppError::Validation(format!(
                "Invalid category '{s}'; expected one of gaming, tutorial, entertainment, education, other"
            ))),
        }
    }
}

/// Durable locations produced by a successful publish step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedVideo {
    pub video_url: String,
    pub thumbnail_url: String,
    pub video_public_id: String,
    pub thumbnail_public_id: String,
    pub duration_seconds: f64,
}

/// Video database entity (the asset record)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Video {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: String,
    pub category: VideoCategory,
    pub tags: Vec<String>,
    pub is_public: bool,
    pub status: VideoStatus,
    pub progress: i32,
    pub temp_path: Option<String>,
    pub video_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub video_public_id: Option<String>,
    pub thumbnail_public_id: Option<String>,
    pub duration_seconds: f64,
    pub error: Option<String>,
    pub views: i64,
    pub likes: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied by the uploader when a new record is created
#[derive(Debug, Clone)]
pub struct NewVideo {
    pub owner_id: Uuid,
    pub title: String,
    pub description: String,
    pub category: VideoCategory,
    pub tags: Vec<String>,
    pub is_public: bool,
    pub temp_path: String,
}

impl Video {
    /// Build a fresh record in the `uploaded` state
    pub fn new_upload(new: NewVideo) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id: new.owner_id,
            title: new.title,
            description: new.description,
            category: new.category,
            tags: new.tags,
            is_public: new.is_public,
            status: VideoStatus::Uploaded,
            progress: 0,
            temp_path: Some(new.temp_path),
            video_url: None,
            thumbnail_url: None,
            video_public_id: None,
            thumbnail_public_id: None,
            duration_seconds: 0.0,
            error: None,
            views: 0,
            likes: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn start_processing(&mut self) -> Result<()> {
        self.status.ensure_transition(VideoStatus::Processing)?;
        self.status = VideoStatus::Processing;
        self.progress = 0;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Raise the stored progress. Lower values and non-processing records are ignored.
    pub fn advance_progress(&mut self, progress: i32) -> bool {
        let progress = progress.clamp(0, 100);
        if self.status != VideoStatus::Processing || progress <= self.progress {
            return false;
        }
        self.progress = progress;
        self.updated_at = Utc::now();
        true
    }

    pub fn complete(&mut self, published: &PublishedVideo) -> Result<()> {
        self.status.ensure_transition(VideoStatus::Processed)?;
        self.status = VideoStatus::Processed;
        self.progress = 100;
        self.video_url = Some(published.video_url.clone());
        self.thumbnail_url = Some(published.thumbnail_url.clone());
        self.video_public_id = Some(published.video_public_id.clone());
        self.thumbnail_public_id = Some(published.thumbnail_public_id.clone());
        self.duration_seconds = published.duration_seconds.max(0.0);
        self.temp_path = None;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        self.status.ensure_transition(VideoStatus::Failed)?;
        self.status = VideoStatus::Failed;
        self.error = Some(message.into());
        self.temp_path = None;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Whether `viewer` may read this record outside public listings
    pub fn is_visible_to(&self, viewer: Option<Uuid>) -> bool {
        self.is_public || viewer == Some(self.owner_id)
    }

    pub fn is_listed(&self) -> bool {
        self.is_public && self.status == VideoStatus::Processed
    }
}

// ========================================
// Request DTOs
// ========================================

/// Text fields of the multipart upload form
#[derive(Debug, Clone, Default, Validate)]
pub struct UploadVideoForm {
    #[validate(length(min = 1, max = 100, message = "Title must be 1-100 characters"))]
    pub title: String,
    #[validate(length(min = 1, max = 1000, message = "Description must be 1-1000 characters"))]
    pub description: String,
    pub category: Option<String>,
    pub tags: Option<String>,
    pub is_public: Option<bool>,
}

impl UploadVideoForm {
    pub fn into_new_video(self, owner_id: Uuid, temp_path: String) -> Result<NewVideo> {
        self.validate()?;
        let category = match self.category.as_deref() {
            Some(raw) if !raw.trim().is_empty() => VideoCategory::parse(raw)?,
            _ => VideoCategory::default(),
        };

        Ok(NewVideo {
            owner_id,
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            category,
            tags: parse_tags(self.tags.as_deref().unwrap_or_default()),
            is_public: self.is_public.unwrap_or(true),
            temp_path,
        })
    }
}

/// Split a comma-separated tag list, dropping blanks
pub fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Partial metadata update
#[derive(Debug, Clone, Default, Deserialize, Validate, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateVideoRequest {
    #[validate(length(min = 1, max = 100, message = "Title must be 1-100 characters"))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 1000, message = "Description must be 1-1000 characters"))]
    pub description: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub is_public: Option<bool>,
}

/// Validated form of [`UpdateVideoRequest`] handed to the store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoMetadataUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<VideoCategory>,
    pub tags: Option<Vec<String>>,
    pub is_public: Option<bool>,
}

impl UpdateVideoRequest {
    pub fn into_update(self) -> Result<VideoMetadataUpdate> {
        self.validate()?;
        let category = self.category.as_deref().map(VideoCategory::parse).transpose()?;
        Ok(VideoMetadataUpdate {
            title: self.title.map(|t| t.trim().to_string()),
            description: self.description.map(|d| d.trim().to_string()),
            category,
            tags: self.tags.map(|tags| {
                tags.into_iter()
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect()
            }),
            is_public: self.is_public,
        })
    }
}

/// Query string of the public listing
#[derive(Debug, Clone, Deserialize)]
pub struct ListVideosQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub category: Option<String>,
    pub search: Option<String>,
}

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE: i64 = 10_000;

/// Filter passed to the store for public listings
#[derive(Debug, Clone, Default)]
pub struct VideoListFilter {
    pub category: Option<VideoCategory>,
    pub search: Option<String>,
    pub page: i64,
    pub limit: i64,
}

impl VideoListFilter {
    pub fn offset(&self) -> i64 {
        (self.page - 1).max(0).saturating_mul(self.limit)
    }
}

impl ListVideosQuery {
    pub fn into_filter(self) -> Result<VideoListFilter> {
        let category = self
            .category
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .map(VideoCategory::parse)
            .transpose()?;
        let search = self
            .search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(VideoListFilter {
            category,
            search,
            page: self.page.unwrap_or(1).clamp(1, MAX_PAGE),
            limit: self
                .limit
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
        })
    }
}

// ========================================
// Response DTOs
// ========================================

/// Video response DTO
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoResponse {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: String,
    pub category: VideoCategory,
    pub tags: Vec<String>,
    pub is_public: bool,
    pub status: VideoStatus,
    pub progress: i32,
    pub video_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub duration: f64,
    pub error: Option<String>,
    pub views: i64,
    pub likes: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Video> for VideoResponse {
    fn from(video: Video) -> Self {
        Self {
            id: video.id,
            owner_id: video.owner_id,
            title: video.title,
            description: video.description,
            category: video.category,
            tags: video.tags,
            is_public: video.is_public,
            status: video.status,
            progress: video.progress,
            video_url: video.video_url,
            thumbnail_url: video.thumbnail_url,
            duration: video.duration_seconds,
            error: video.error,
            views: video.views,
            likes: video.likes,
            created_at: video.created_at,
            updated_at: video.updated_at,
        }
    }
}

/// Lifecycle snapshot used by clients to recover state missed on the live channel
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoStatusResponse {
    pub id: Uuid,
    pub status: VideoStatus,
    pub progress: i32,
    pub video_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub duration: f64,
    pub error: Option<String>,
}

impl From<&Video> for VideoStatusResponse {
    fn from(video: &Video) -> Self {
        Self {
            id: video.id,
            status: video.status,
            progress: video.progress,
            video_url: video.video_url.clone(),
            thumbnail_url: video.thumbnail_url.clone(),
            duration: video.duration_seconds,
            error: video.error.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: i64,
    pub total_pages: i64,
    pub total_videos: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    pub fn new(page: i64, limit: i64, total: i64) -> Self {
        let total_pages = if total == 0 { 0 } else { (total + limit - 1) / limit };
        Self {
            current_page: page,
            total_pages,
            total_videos: total,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct VideoListResponse {
    pub videos: Vec<VideoResponse>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadAcceptedResponse {
    pub message: String,
    pub video_id: Uuid,
}
