/// Database access layer
///
/// This module provides:
/// - The `VideoStore` seam used by handlers and the ingestion pipeline
/// - A Postgres implementation and an in-process one
/// - Embedded migrations
///
/// Lifecycle writes are conditional on the current status, so a terminal
/// record can never be moved again no matter which caller tries.
use async_trait::async_trait;
use sqlx::migrate::Migrator;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{PublishedVideo, Video, VideoListFilter, VideoMetadataUpdate};

pub mod memory;
pub mod video_repo;

pub use memory::MemoryVideoStore;
pub use video_repo::PgVideoStore;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[async_trait]
pub trait VideoStore: Send + Sync {
    async fn insert(&self, video: &Video) -> Result<()>;

    /// `Ok(None)` when the record does not exist
    async fn get(&self, id: Uuid) -> Result<Option<Video>>;

    /// Processed public videos, newest first, with the total match count
    async fn list_public(&self, filter: &VideoListFilter) -> Result<(Vec<Video>, i64)>;

    /// `uploaded -> processing`
    async fn mark_processing(&self, id: Uuid) -> Result<()>;

    /// Raise progress of a processing record; never lowers it
    async fn update_progress(&self, id: Uuid, progress: i32) -> Result<()>;

    /// `processing -> processed`, storing URLs and clearing the temp path
    async fn mark_processed(&self, id: Uuid, published: &PublishedVideo) -> Result<()>;

    /// `processing -> failed`, storing the error and clearing the temp path
    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()>;

    /// Returns the new view count
    async fn record_view(&self, id: Uuid) -> Result<i64>;

    /// Returns the new like count
    async fn increment_likes(&self, id: Uuid) -> Result<i64>;

    async fn update_metadata(&self, id: Uuid, update: &VideoMetadataUpdate) -> Result<Video>;

    /// Returns false when nothing was deleted
    async fn delete(&self, id: Uuid) -> Result<bool>;
}
