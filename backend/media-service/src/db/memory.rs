/// In-process `VideoStore` for tests and single-node development
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::VideoStore;
use crate::error::{AppError, Result};
use crate::models::{PublishedVideo, Video, VideoListFilter, VideoMetadataUpdate, VideoStatus};

#[derive(Clone, Default)]
pub struct MemoryVideoStore {
    videos: Arc<RwLock<HashMap<Uuid, Video>>>,
}

impl MemoryVideoStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.videos.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.videos.read().await.is_empty()
    }

    /// Apply a lifecycle change if `next` is reachable from the stored status
    async fn transition<F>(&self, id: Uuid, next: VideoStatus, apply: F) -> Result<()>
    where
        F: FnOnce(&mut Video) + Send,
    {
        let mut guard = self.videos.write().await;
        let video = guard
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Video {id} not found")))?;
        video.status.ensure_transition(next)?;
        video.status = next;
        apply(video);
        video.updated_at = Utc::now();
        Ok(())
    }
}

fn matches_search(video: &Video, search: &str) -> bool {
    let needle = search.to_lowercase();
    video.title.to_lowercase().contains(&needle)
        || video.description.to_lowercase().contains(&needle)
        || video.tags.iter().any(|t| t.to_lowercase() == needle)
}

#[async_trait]
impl VideoStore for MemoryVideoStore {
    async fn insert(&self, video: &Video) -> Result<()> {
        let mut guard = self.videos.write().await;
        if guard.contains_key(&video.id) {
            return Err(AppError::Conflict(format!(
                "Video {} already exists",
                video.id
            )));
        }
        guard.insert(video.id, video.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Video>> {
        Ok(self.videos.read().await.get(&id).cloned())
    }

    async fn list_public(&self, filter: &VideoListFilter) -> Result<(Vec<Video>, i64)> {
        let guard = self.videos.read().await;
        let mut matching: Vec<&Video> = guard
            .values()
            .filter(|v| v.is_listed())
            .filter(|v| filter.category.map_or(true, |c| v.category == c))
            .filter(|v| {
                filter
                    .search
                    .as_deref()
                    .map_or(true, |s| matches_search(v, s))
            })
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(filter.offset().max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn mark_processing(&self, id: Uuid) -> Result<()> {
        self.transition(id, VideoStatus::Processing, |v| v.progress = 0)
            .await
    }

    async fn update_progress(&self, id: Uuid, progress: i32) -> Result<()> {
        let mut guard = self.videos.write().await;
        let video = guard
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Video {id} not found")))?;
        if video.status != VideoStatus::Processing {
            return Err(AppError::Conflict(format!(
                "Video {id} is {}, progress not updated",
                video.status
            )));
        }
        video.advance_progress(progress);
        Ok(())
    }

    async fn mark_processed(&self, id: Uuid, published: &PublishedVideo) -> Result<()> {
        let published = published.clone();
        self.transition(id, VideoStatus::Processed, move |v| {
            v.progress = 100;
            v.video_url = Some(published.video_url);
            v.thumbnail_url = Some(published.thumbnail_url);
            v.video_public_id = Some(published.video_public_id);
            v.thumbnail_public_id = Some(published.thumbnail_public_id);
            v.duration_seconds = published.duration_seconds.max(0.0);
            v.temp_path = None;
        })
        .await
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()> {
        let error = error.to_string();
        self.transition(id, VideoStatus::Failed, move |v| {
            v.error = Some(error);
            v.temp_path = None;
        })
        .await
    }

    async fn record_view(&self, id: Uuid) -> Result<i64> {
        let mut guard = self.videos.write().await;
        let video = guard
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Video {id} not found")))?;
        video.views += 1;
        Ok(video.views)
    }

    async fn increment_likes(&self, id: Uuid) -> Result<i64> {
        let mut guard = self.videos.write().await;
        let video = guard
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Video {id} not found")))?;
        video.likes += 1;
        Ok(video.likes)
    }

    async fn update_metadata(&self, id: Uuid, update: &VideoMetadataUpdate) -> Result<Video> {
        let mut guard = self.videos.write().await;
        let video = guard
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Video {id} not found")))?;

        if let Some(title) = &update.title {
            video.title = title.clone();
        }
        if let Some(description) = &update.description {
            video.description = description.clone();
        }
        if let Some(category) = update.category {
            video.category = category;
        }
        if let Some(tags) = &update.tags {
            video.tags = tags.clone();
        }
        if let Some(is_public) = update.is_public {
            video.is_public = is_public;
        }
        video.updated_at = Utc::now();
        Ok(video.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        Ok(self.videos.write().await.remove(&id).is_some())
    }
}
