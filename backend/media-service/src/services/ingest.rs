/// Ingestion orchestrator
///
/// Drives one uploaded file from local temp storage to a published HLS asset:
/// mark processing, probe, transcode (with thumbnail), publish both artifacts
/// in parallel, finalize the record, then always clean up local files.
///
/// Any failure after the record enters `processing` marks it `failed`, emits a
/// `video-error` event and is returned to the caller, who only logs it; the
/// uploader learns the outcome from the progress channel or the record.
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{Config, TranscodeConfig};
use crate::db::VideoStore;
use crate::error::{AppError, Result};
use crate::metrics::IngestRunGuard;
use crate::models::{PublishedVideo, Video, VideoStatus};
use crate::services::cleanup::cleanup_ingest_files;
use crate::services::progress::{ProgressRelay, VideoEvent};
use crate::services::storage::{AssetStore, ResourceType, StoredAsset, UploadOptions};
use crate::services::transcoder::{
    scale_transcode_progress, MediaProbe, MediaToolkit, TranscodeJob, TranscodeOutput,
};

const PROGRESS_CHANNEL_CAPACITY: usize = 64;

#[derive(Clone, Debug)]
pub struct IngestSettings {
    pub transcode: TranscodeConfig,
    /// Parent of the per-video work directories
    pub work_dir: PathBuf,
    /// Unbounded when `None`
    pub max_concurrent_transcodes: Option<usize>,
}

impl IngestSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            transcode: config.transcode.clone(),
            work_dir: config.ingest.work_dir.clone(),
            max_concurrent_transcodes: config.ingest.max_concurrent_transcodes,
        }
    }
}

#[derive(Clone)]
pub struct IngestOrchestrator {
    store: Arc<dyn VideoStore>,
    toolkit: Arc<dyn MediaToolkit>,
    assets: Arc<dyn AssetStore>,
    relay: ProgressRelay,
    transcode: TranscodeConfig,
    work_dir: PathBuf,
    transcode_gate: Option<Arc<Semaphore>>,
}

/// Emits progress for one run and keeps it non-decreasing
struct RunProgress<'a> {
    relay: &'a ProgressRelay,
    video_id: Uuid,
    last: i32,
}

impl<'a> RunProgress<'a> {
    fn new(relay: &'a ProgressRelay, video_id: Uuid) -> Self {
        Self {
            relay,
            video_id,
            last: 0,
        }
    }

    async fn emit(&mut self, progress: i32, stage: impl Into<String>) {
        if progress < self.last {
            return;
        }
        self.last = progress;
        self.relay
            .emit(VideoEvent::progress(self.video_id, progress, stage))
            .await;
    }
}

impl IngestOrchestrator {
    pub fn new(
        store: Arc<dyn VideoStore>,
        toolkit: Arc<dyn MediaToolkit>,
        assets: Arc<dyn AssetStore>,
        relay: ProgressRelay,
        settings: IngestSettings,
    ) -> Self {
        Self {
            store,
            toolkit,
            assets,
            relay,
            transcode: settings.transcode,
            work_dir: settings.work_dir,
            transcode_gate: settings
                .max_concurrent_transcodes
                .map(|limit| Arc::new(Semaphore::new(limit))),
        }
    }

    pub fn relay(&self) -> &ProgressRelay {
        &self.relay
    }

    /// Per-video scratch directory for transcoder output
    pub fn work_dir_for(&self, video_id: Uuid) -> PathBuf {
        self.work_dir.join(video_id.to_string())
    }

    /// Run ingestion on a detached task. Errors are logged, never returned.
    pub fn spawn(&self, local_path: PathBuf, mut video: Video) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let video_id = video.id;
            if let Err(e) = this.ingest(&local_path, &mut video, &this.relay).await {
                error!(%video_id, error = %e, "video ingestion failed");
            }
        })
    }

    /// Ingest one upload. `video` must be `uploaded` and is updated in place.
    pub async fn ingest(
        &self,
        local_path: &Path,
        video: &mut Video,
        relay: &ProgressRelay,
    ) -> Result<()> {
        video.status.ensure_transition(VideoStatus::Processing)?;

        let run = IngestRunGuard::start();
        let video_id = video.id;
        let work_dir = self.work_dir_for(video_id);
        let mut progress = RunProgress::new(relay, video_id);

        info!(%video_id, path = %local_path.display(), "starting ingestion");

        // Step 1: the in-memory record only moves once the store accepted it
        if let Err(e) = self.store.mark_processing(video_id).await {
            error!(%video_id, error = %e, "failed to mark video processing");
            relay.emit(VideoEvent::error(video_id, e.to_string())).await;
            cleanup_ingest_files(local_path, &work_dir).await;
            run.finish("rejected");
            return Err(e);
        }
        video.start_processing()?;
        progress.emit(0, "Starting transcoding...").await;

        let outcome = self
            .run_pipeline(local_path, &work_dir, video, &mut progress)
            .await;

        let result = match outcome {
            Ok(()) => {
                info!(
                    %video_id,
                    duration = video.duration_seconds,
                    "video processed"
                );
                run.finish("processed");
                Ok(())
            }
            Err(e) => {
                self.record_failure(video, &e, relay).await;
                run.finish("failed");
                Err(e)
            }
        };

        // Step 7
        cleanup_ingest_files(local_path, &work_dir).await;
        result
    }

    /// Steps 2 to 6
    async fn run_pipeline(
        &self,
        local_path: &Path,
        work_dir: &Path,
        video: &mut Video,
        progress: &mut RunProgress<'_>,
    ) -> Result<()> {
        let video_id = video.id;

        // Step 2: probe
        let probe = match self.toolkit.probe(local_path).await {
            Ok(probe) => probe,
            Err(e) => {
                progress.emit(0, "Failed to analyze video").await;
                return Err(e);
            }
        };
        progress.emit(5, "Video analyzed, starting transcoding...").await;
        self.persist_progress(video, 5).await;

        // Steps 3 and 4: transcode and thumbnail
        let output = self.transcode(local_path, work_dir, &probe, video, progress).await?;
        progress.emit(80, "Transcoding completed").await;
        self.persist_progress(video, 80).await;

        // Step 5: publish
        progress.emit(90, "Uploading to cloud...").await;
        self.persist_progress(video, 90).await;
        let (video_asset, thumbnail_asset) = self.publish(video_id, &output).await?;

        // Step 6: finalize
        let published = PublishedVideo {
            video_url: video_asset.secure_url.clone(),
            thumbnail_url: thumbnail_asset.secure_url.clone(),
            video_public_id: video_asset.public_id.clone(),
            thumbnail_public_id: thumbnail_asset.public_id.clone(),
            duration_seconds: probe.duration_seconds,
        };
        let mut finalized = video.clone();
        finalized.complete(&published)?;

        if let Err(e) = self.store.mark_processed(video_id, &published).await {
            self.discard(&video_asset, ResourceType::Video).await;
            self.discard(&thumbnail_asset, ResourceType::Image).await;
            return Err(e);
        }
        *video = finalized;

        progress.emit(100, "Completed").await;
        if let Some(event) = VideoEvent::complete(video) {
            progress.relay.emit(event).await;
        }
        Ok(())
    }

    async fn transcode(
        &self,
        local_path: &Path,
        work_dir: &Path,
        probe: &MediaProbe,
        video: &mut Video,
        progress: &mut RunProgress<'_>,
    ) -> Result<TranscodeOutput> {
        let _permit = match &self.transcode_gate {
            Some(gate) => Some(
                gate.clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| AppError::Internal("Transcode gate closed".to_string()))?,
            ),
            None => None,
        };

        progress.emit(10, "Transcoding started...").await;
        self.persist_progress(video, 10).await;

        let job = TranscodeJob::new(local_path, work_dir, &self.transcode, probe);
        let (tx, mut rx) = mpsc::channel::<f64>(PROGRESS_CHANNEL_CAPACITY);

        let transcode = self.toolkit.transcode(&job, tx);
        let relay_progress = async {
            while let Some(tool_percent) = rx.recv().await {
                let overall = scale_transcode_progress(tool_percent);
                progress
                    .emit(overall, format!("Transcoding: {:.0}% done", tool_percent.clamp(0.0, 100.0)))
                    .await;
                if overall / 10 > video.progress / 10 {
                    self.persist_progress(video, overall).await;
                }
            }
        };

        let (result, ()) = tokio::join!(transcode, relay_progress);
        result
    }

    /// Upload package and thumbnail in parallel
    ///
    /// If exactly one upload succeeds, the surviving artifact is deleted on a
    /// best-effort basis before the error is returned.
    async fn publish(
        &self,
        video_id: Uuid,
        output: &TranscodeOutput,
    ) -> Result<(StoredAsset, StoredAsset)> {
        let video_options = UploadOptions::video(video_id);
        let thumbnail_options = UploadOptions::thumbnail(video_id);

        let (video_upload, thumbnail_upload) = tokio::join!(
            self.assets.upload(&output.master_playlist, &video_options),
            self.assets.upload(&output.thumbnail, &thumbnail_options),
        );

        match (video_upload, thumbnail_upload) {
            (Ok(video_asset), Ok(thumbnail_asset)) => Ok((video_asset, thumbnail_asset)),
            (Ok(video_asset), Err(e)) => {
                self.discard(&video_asset, ResourceType::Video).await;
                Err(e)
            }
            (Err(e), Ok(thumbnail_asset)) => {
                self.discard(&thumbnail_asset, ResourceType::Image).await;
                Err(e)
            }
            (Err(e), Err(other)) => {
                warn!(%video_id, error = %other, "thumbnail upload also failed");
                Err(e)
            }
        }
    }

    async fn discard(&self, asset: &StoredAsset, resource_type: ResourceType) {
        match self.assets.delete(&asset.public_id, resource_type).await {
            Ok(()) => info!(public_id = %asset.public_id, %resource_type, "removed orphaned artifact"),
            Err(e) => warn!(
                public_id = %asset.public_id,
                %resource_type,
                error = %e,
                "failed to remove orphaned artifact"
            ),
        }
    }

    /// Progress writes are cosmetic: failures are logged only
    async fn persist_progress(&self, video: &mut Video, progress: i32) {
        if !video.advance_progress(progress) {
            return;
        }
        if let Err(e) = self.store.update_progress(video.id, progress).await {
            warn!(video_id = %video.id, progress, error = %e, "failed to persist progress");
        }
    }

    async fn record_failure(&self, video: &mut Video, err: &AppError, relay: &ProgressRelay) {
        let video_id = video.id;
        let message = err.to_string();
        error!(%video_id, error = %message, "ingestion failed");

        if let Err(e) = video.fail(message.clone()) {
            warn!(%video_id, error = %e, "in-memory record not marked failed");
        }
        if let Err(e) = self.store.mark_failed(video_id, &message).await {
            error!(%video_id, error = %e, "failed to persist failed status");
        }
        relay.emit(VideoEvent::error(video_id, message)).await;
    }
}
