/// Video repository - Postgres operations for the videos table
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::VideoStore;
use crate::error::{AppError, Result};
use crate::models::{PublishedVideo, Video, VideoListFilter, VideoMetadataUpdate, VideoStatus};

const VIDEO_COLUMNS: &str = "id, owner_id, title, description, category, tags, is_public, \
     status, progress, temp_path, video_url, thumbnail_url, video_public_id, \
     thumbnail_public_id, duration_seconds, error, views, likes, created_at, updated_at";

const PUBLIC_FILTER: &str = "status = 'processed' AND is_public \
     AND ($1::varchar IS NULL OR category = $1) \
     AND ($2::text IS NULL OR title ILIKE $2 OR description ILIKE $2 \
          OR EXISTS (SELECT 1 FROM unnest(tags) t WHERE lower(t) = lower($3)))";

#[derive(Clone)]
pub struct PgVideoStore {
    pool: PgPool,
}

impl PgVideoStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn current_status(&self, id: Uuid) -> Result<Option<VideoStatus>> {
        let row = sqlx::query("SELECT status FROM videos WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<VideoStatus, _>("status")))
    }

    /// Explain why a guarded update touched no rows
    async fn rejected_transition(&self, id: Uuid, to: VideoStatus) -> AppError {
        match self.current_status(id).await {
            Ok(Some(from)) => AppError::InvalidTransition { from, to },
            Ok(None) => AppError::NotFound(format!("Video {id} not found")),
            Err(e) => e,
        }
    }
}

fn like_pattern(search: &str) -> String {
    let escaped = search
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

#[async_trait]
impl VideoStore for PgVideoStore {
    async fn insert(&self, video: &Video) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO videos (
                id, owner_id, title, description, category, tags, is_public,
                status, progress, temp_path, duration_seconds, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(video.id)
        .bind(video.owner_id)
        .bind(&video.title)
        .bind(&video.description)
        .bind(video.category)
        .bind(&video.tags)
        .bind(video.is_public)
        .bind(video.status)
        .bind(video.progress)
        .bind(&video.temp_path)
        .bind(video.duration_seconds)
        .bind(video.created_at)
        .bind(video.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict(format!("Video {} already exists", video.id))
            }
            _ => AppError::from(e),
        })?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Video>> {
        let sql = format!("SELECT {VIDEO_COLUMNS} FROM videos WHERE id = $1");
        let video = sqlx::query_as::<_, Video>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(video)
    }

    async fn list_public(&self, filter: &VideoListFilter) -> Result<(Vec<Video>, i64)> {
        let pattern = filter.search.as_deref().map(like_pattern);

        let count_sql = format!("SELECT COUNT(*) AS total FROM videos WHERE {PUBLIC_FILTER}");
        let total: i64 = sqlx::query(&count_sql)
            .bind(filter.category)
            .bind(&pattern)
            .bind(&filter.search)
            .fetch_one(&self.pool)
            .await?
            .get("total");

        let list_sql = format!(
            "SELECT {VIDEO_COLUMNS} FROM videos WHERE {PUBLIC_FILTER} \
             ORDER BY created_at DESC LIMIT $4 OFFSET $5"
        );
        let videos = sqlx::query_as::<_, Video>(&list_sql)
            .bind(filter.category)
            .bind(&pattern)
            .bind(&filter.search)
            .bind(filter.limit)
            .bind(filter.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok((videos, total))
    }

    async fn mark_processing(&self, id: Uuid) -> Result<()> {
        let res = sqlx::query(
            r#"
            UPDATE videos SET status = 'processing', progress = 0, updated_at = NOW()
            WHERE id = $1 AND status = 'uploaded'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 0 {
            return Err(self.rejected_transition(id, VideoStatus::Processing).await);
        }
        Ok(())
    }

    async fn update_progress(&self, id: Uuid, progress: i32) -> Result<()> {
        let res = sqlx::query(
            r#"
            UPDATE videos SET progress = GREATEST(progress, $2), updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(progress.clamp(0, 100))
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 0 {
            return match self.current_status(id).await? {
                Some(status) => Err(AppError::Conflict(format!(
                    "Video {id} is {status}, progress not updated"
                ))),
                None => Err(AppError::NotFound(format!("Video {id} not found"))),
            };
        }
        Ok(())
    }

    async fn mark_processed(&self, id: Uuid, published: &PublishedVideo) -> Result<()> {
        let res = sqlx::query(
            r#"
            UPDATE videos SET
                status = 'processed',
                progress = 100,
                video_url = $2,
                thumbnail_url = $3,
                video_public_id = $4,
                thumbnail_public_id = $5,
                duration_seconds = $6,
                temp_path = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(&published.video_url)
        .bind(&published.thumbnail_url)
        .bind(&published.video_public_id)
        .bind(&published.thumbnail_public_id)
        .bind(published.duration_seconds.max(0.0))
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 0 {
            return Err(self.rejected_transition(id, VideoStatus::Processed).await);
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()> {
        let res = sqlx::query(
            r#"
            UPDATE videos SET status = 'failed', error = $2, temp_path = NULL, updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 0 {
            return Err(self.rejected_transition(id, VideoStatus::Failed).await);
        }
        Ok(())
    }

    async fn record_view(&self, id: Uuid) -> Result<i64> {
        let row = sqlx::query("UPDATE videos SET views = views + 1 WHERE id = $1 RETURNING views")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Video {id} not found")))?;
        Ok(row.get("views"))
    }

    async fn increment_likes(&self, id: Uuid) -> Result<i64> {
        let row = sqlx::query("UPDATE videos SET likes = likes + 1 WHERE id = $1 RETURNING likes")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Video {id} not found")))?;
        Ok(row.get("likes"))
    }

    async fn update_metadata(&self, id: Uuid, update: &VideoMetadataUpdate) -> Result<Video> {
        let sql = format!(
            r#"
            UPDATE videos SET
                title = COALESCE($2, title),
                description = COALESCE($3, description),
                category = COALESCE($4, category),
                tags = COALESCE($5, tags),
                is_public = COALESCE($6, is_public),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {VIDEO_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Video>(&sql)
            .bind(id)
            .bind(&update.title)
            .bind(&update.description)
            .bind(update.category)
            .bind(&update.tags)
            .bind(update.is_public)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Video {id} not found")))
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let res = sqlx::query("DELETE FROM videos WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}
