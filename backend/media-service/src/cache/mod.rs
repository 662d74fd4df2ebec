/// Caching layer for media-service
///
/// This module handles:
/// - Video record caching in Redis
/// - A read-through `VideoStore` decorator that invalidates on every write
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db::VideoStore;
use crate::error::{AppError, Result};
use crate::models::{PublishedVideo, Video, VideoListFilter, VideoMetadataUpdate};

const DEFAULT_TTL_SECONDS: u64 = 300;

/// Redis-backed cache helper for media entities
#[derive(Clone)]
pub struct MediaCache {
    conn: Arc<Mutex<ConnectionManager>>,
    ttl_seconds: u64,
}

impl MediaCache {
    /// Initialize cache from Redis client
    pub async fn new(client: redis::Client, ttl_seconds: Option<u64>) -> Result<Self> {
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| AppError::Cache(format!("Failed to connect to Redis: {e}")))?;

        Ok(Self::with_manager(Arc::new(Mutex::new(manager)), ttl_seconds))
    }

    pub fn with_manager(
        manager: Arc<Mutex<ConnectionManager>>,
        ttl_seconds: Option<u64>,
    ) -> Self {
        Self {
            conn: manager,
            ttl_seconds: ttl_seconds.unwrap_or(DEFAULT_TTL_SECONDS),
        }
    }

    /// Cache a video record
    pub async fn cache_video(&self, video: &Video) -> Result<()> {
        self.set_json(&Self::video_key(video.id), video, None).await
    }

    /// Retrieve cached video if available
    pub async fn get_video(&self, video_id: Uuid) -> Result<Option<Video>> {
        self.get_json(&Self::video_key(video_id)).await
    }

    /// Invalidate video cache entry
    pub async fn invalidate_video(&self, video_id: Uuid) -> Result<()> {
        self.delete(&Self::video_key(video_id)).await
    }

    /// Store arbitrary JSON payload in Redis
    pub async fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<u64>,
    ) -> Result<()> {
        let payload = serde_json::to_string(value)
            .map_err(|e| AppError::Cache(format!("Failed to serialize cache value: {e}")))?;

        let mut conn = self.conn.lock().await;
        let ttl = ttl.unwrap_or(self.ttl_seconds);
        conn.set_ex(key, payload, ttl)
            .await
            .map_err(|e| AppError::Cache(format!("Failed to write to cache: {e}")))
    }

    /// Retrieve JSON payload from Redis
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.conn.lock().await;
        let value: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| AppError::Cache(format!("Failed to read from cache: {e}")))?;

        match value {
            Some(raw) => {
                let parsed = serde_json::from_str(&raw).map_err(|e| {
                    AppError::Cache(format!("Failed to deserialize cache value: {e}"))
                })?;
                Ok(Some(parsed))
            }
            None => Ok(None),
        }
    }

    /// Delete cache key
    pub async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.lock().await;
        conn.del(key)
            .await
            .map(|_: usize| ())
            .map_err(|e| AppError::Cache(format!("Failed to delete cache key: {e}")))
    }

    fn video_key(id: Uuid) -> String {
        format!("media:video:{id}")
    }
}

/// `VideoStore` decorator that serves `get` from Redis
///
/// Only records in a terminal status are cached. An in-flight record is
/// always read from the inner store, so a fill racing with the
/// orchestrator's writes can never pin a stale lifecycle state.
/// Cache failures never fail the request; they are logged and the inner
/// store is used directly.
#[derive(Clone)]
pub struct CachedVideoStore {
    inner: Arc<dyn VideoStore>,
    cache: MediaCache,
}

impl CachedVideoStore {
    pub fn new(inner: Arc<dyn VideoStore>, cache: MediaCache) -> Self {
        Self { inner, cache }
    }

    fn is_cacheable(video: &Video) -> bool {
        video.status.is_terminal()
    }

    async fn invalidate(&self, id: Uuid) {
        if let Err(e) = self.cache.invalidate_video(id).await {
            tracing::warn!(video_id = %id, error = %e, "cache invalidation failed");
        }
    }
}

#[async_trait]
impl VideoStore for CachedVideoStore {
    async fn insert(&self, video: &Video) -> Result<()> {
        self.inner.insert(video).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Video>> {
        match self.cache.get_video(id).await {
            Ok(Some(video)) if Self::is_cacheable(&video) => return Ok(Some(video)),
            Ok(Some(_)) => {}
            Ok(None) => {}
            Err(e) => tracing::warn!(video_id = %id, error = %e, "cache read failed"),
        }

        let video = self.inner.get(id).await?;
        if let Some(video) = video.as_ref().filter(|v| Self::is_cacheable(v)) {
            if let Err(e) = self.cache.cache_video(video).await {
                tracing::warn!(video_id = %id, error = %e, "cache write failed");
            }
        }
        Ok(video)
    }

    async fn list_public(&self, filter: &VideoListFilter) -> Result<(Vec<Video>, i64)> {
        self.inner.list_public(filter).await
    }

    async fn mark_processing(&self, id: Uuid) -> Result<()> {
        let result = self.inner.mark_processing(id).await;
        self.invalidate(id).await;
        result
    }

    async fn update_progress(&self, id: Uuid, progress: i32) -> Result<()> {
        let result = self.inner.update_progress(id, progress).await;
        self.invalidate(id).await;
        result
    }

    async fn mark_processed(&self, id: Uuid, published: &PublishedVideo) -> Result<()> {
        let result = self.inner.mark_processed(id, published).await;
        self.invalidate(id).await;
        result
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()> {
        let result = self.inner.mark_failed(id, error).await;
        self.invalidate(id).await;
        result
    }

    async fn record_view(&self, id: Uuid) -> Result<i64> {
        let result = self.inner.record_view(id).await;
        self.invalidate(id).await;
        result
    }

    async fn increment_likes(&self, id: Uuid) -> Result<i64> {
        let result = self.inner.increment_likes(id).await;
        self.invalidate(id).await;
        result
    }

    async fn update_metadata(&self, id: Uuid, update: &VideoMetadataUpdate) -> Result<Video> {
        let result = self.inner.update_metadata(id, update).await;
        self.invalidate(id).await;
        result
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = self.inner.delete(id).await;
        self.invalidate(id).await;
        result
    }
}
