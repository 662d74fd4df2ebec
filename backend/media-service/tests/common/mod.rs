//! Test doubles for ingestion tests
//!
//! Scripted implementations of the media toolkit, the asset store and a
//! persistence wrapper that fails selected writes. None of them touch real
//! tools, buckets or databases.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use uuid::Uuid;

use media_service::config::TranscodeConfig;
use media_service::db::{MemoryVideoStore, VideoStore};
use media_service::error::{AppError, Result};
use media_service::models::{
    NewVideo, PublishedVideo, Video, VideoCategory, VideoListFilter, VideoMetadataUpdate,
};
use media_service::services::storage::{AssetStore, ResourceType, StoredAsset, UploadOptions};
use media_service::services::transcoder::{MediaProbe, MediaToolkit, TranscodeJob, TranscodeOutput};
use media_service::services::{IngestOrchestrator, IngestSettings, ProgressRelay, VideoEvent};

/// Media toolkit that writes placeholder artifacts instead of running ffmpeg
#[derive(Clone)]
pub struct FakeToolkit {
    pub fail_probe: bool,
    pub fail_transcode: bool,
    pub progress_steps: Vec<f64>,
    pub transcode_delay: Duration,
    durations: Arc<Mutex<HashMap<PathBuf, f64>>>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
    transcodes: Arc<AtomicUsize>,
}

impl Default for FakeToolkit {
    fn default() -> Self {
        Self {
            fail_probe: false,
            fail_transcode: false,
            progress_steps: vec![0.0, 12.5, 25.0, 50.0, 49.0, 75.0, 100.0],
            transcode_delay: Duration::ZERO,
            durations: Arc::new(Mutex::new(HashMap::new())),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
            transcodes: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl FakeToolkit {
    pub fn failing_probe() -> Self {
        Self {
            fail_probe: true,
            ..Self::default()
        }
    }

    pub fn failing_transcode() -> Self {
        Self {
            fail_transcode: true,
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            transcode_delay: delay,
            ..Self::default()
        }
    }

    /// Report `seconds` when `input` is probed instead of the default 42.5
    pub fn set_duration(&self, input: &Path, seconds: f64) {
        self.durations
            .lock()
            .unwrap()
            .insert(input.to_path_buf(), seconds);
    }

    /// Highest number of transcodes observed running at once
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn transcode_count(&self) -> usize {
        self.transcodes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaToolkit for FakeToolkit {
    async fn probe(&self, input: &Path) -> Result<MediaProbe> {
        if self.fail_probe {
            return Err(AppError::MediaTool("ffprobe: invalid data found".to_string()));
        }
        if !input.exists() {
            return Err(AppError::MediaTool(format!(
                "input {} does not exist",
                input.display()
            )));
        }
        let duration_seconds = self
            .durations
            .lock()
            .unwrap()
            .get(input)
            .copied()
            .unwrap_or(42.5);
        Ok(MediaProbe {
            duration_seconds,
            width: 1920,
            height: 1080,
            has_audio: true,
            format: "mov,mp4".to_string(),
        })
    }

    async fn transcode(
        &self,
        job: &TranscodeJob,
        progress: mpsc::Sender<f64>,
    ) -> Result<TranscodeOutput> {
        self.transcodes.fetch_add(1, Ordering::SeqCst);
        let running = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(running, Ordering::SeqCst);

        let result = self.run(job, progress).await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl FakeToolkit {
    async fn run(&self, job: &TranscodeJob, progress: mpsc::Sender<f64>) -> Result<TranscodeOutput> {
        let package_dir = job.package_dir();
        tokio::fs::create_dir_all(package_dir.join("720p"))
            .await
            .map_err(|e| AppError::MediaTool(e.to_string()))?;

        for step in &self.progress_steps {
            let _ = progress.send(*step).await;
        }
        if !self.transcode_delay.is_zero() {
            tokio::time::sleep(self.transcode_delay).await;
        }
        if self.fail_transcode {
            return Err(AppError::MediaTool("ffmpeg exited with status 1".to_string()));
        }

        let master_playlist = package_dir.join("master.m3u8");
        write(&master_playlist, b"#EXTM3U\n").await?;
        write(&package_dir.join("720p/segment_000.ts"), b"ts").await?;
        let thumbnail = job.thumbnail_path();
        write(&thumbnail, b"jpeg").await?;

        Ok(TranscodeOutput {
            package_dir,
            master_playlist,
            thumbnail,
        })
    }
}

async fn write(path: &Path, contents: &[u8]) -> Result<()> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| AppError::MediaTool(e.to_string()))
}

/// Asset store with scripted upload failures and a log of every call
#[derive(Clone, Default)]
pub struct ScriptedAssetStore {
    pub fail_video: bool,
    pub fail_thumbnail: bool,
    pub fail_delete: bool,
    pub(crate) uploads: Arc<Mutex<Vec<(PathBuf, UploadOptions)>>>,
    pub(crate) deletes: Arc<Mutex<Vec<(String, ResourceType)>>>,
}

impl ScriptedAssetStore {
    pub fn failing_video() -> Self {
        Self {
            fail_video: true,
            ..Self::default()
        }
    }

    pub fn failing_thumbnail() -> Self {
        Self {
            fail_thumbnail: true,
            ..Self::default()
        }
    }

    pub fn uploads(&self) -> Vec<(PathBuf, UploadOptions)> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> Vec<(String, ResourceType)> {
        self.deletes.lock().unwrap().clone()
    }
}

#[async_trait]
impl AssetStore for ScriptedAssetStore {
    async fn upload(&self, local_path: &Path, options: &UploadOptions) -> Result<StoredAsset> {
        self.uploads
            .lock()
            .unwrap()
            .push((local_path.to_path_buf(), options.clone()));

        let fail = match options.resource_type {
            ResourceType::Video => self.fail_video,
            ResourceType::Image => self.fail_thumbnail,
        };
        if fail {
            return Err(AppError::Storage(format!(
                "upload to {} rejected",
                options.folder
            )));
        }

        let file_name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("artifact");
        let public_id = match options.resource_type {
            ResourceType::Video => options.folder.clone(),
            ResourceType::Image => format!("{}/{file_name}", options.folder),
        };
        Ok(StoredAsset {
            secure_url: format!("https://cdn.test/{}/{file_name}", options.folder),
            public_id,
        })
    }

    async fn delete(&self, public_id: &str, resource_type: ResourceType) -> Result<()> {
        self.deletes
            .lock()
            .unwrap()
            .push((public_id.to_string(), resource_type));
        if self.fail_delete {
            return Err(AppError::Storage("delete rejected".to_string()));
        }
        Ok(())
    }
}

/// Wraps [`MemoryVideoStore`] and fails the selected writes
#[derive(Clone, Default)]
pub struct FlakyStore {
    pub inner: MemoryVideoStore,
    pub fail_mark_processing: Arc<AtomicBool>,
    pub fail_mark_processed: Arc<AtomicBool>,
    pub fail_progress: Arc<AtomicBool>,
}

impl FlakyStore {
    pub fn new(inner: MemoryVideoStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    fn check(flag: &AtomicBool, what: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(AppError::Database(format!("{what}: connection reset")));
        }
        Ok(())
    }
}

#[async_trait]
impl VideoStore for FlakyStore {
    async fn insert(&self, video: &Video) -> Result<()> {
        self.inner.insert(video).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Video>> {
        self.inner.get(id).await
    }

    async fn list_public(&self, filter: &VideoListFilter) -> Result<(Vec<Video>, i64)> {
        self.inner.list_public(filter).await
    }

    async fn mark_processing(&self, id: Uuid) -> Result<()> {
        Self::check(&self.fail_mark_processing, "mark_processing")?;
        self.inner.mark_processing(id).await
    }

    async fn update_progress(&self, id: Uuid, progress: i32) -> Result<()> {
        Self::check(&self.fail_progress, "update_progress")?;
        self.inner.update_progress(id, progress).await
    }

    async fn mark_processed(&self, id: Uuid, published: &PublishedVideo) -> Result<()> {
        Self::check(&self.fail_mark_processed, "mark_processed")?;
        self.inner.mark_processed(id, published).await
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()> {
        self.inner.mark_failed(id, error).await
    }

    async fn record_view(&self, id: Uuid) -> Result<i64> {
        self.inner.record_view(id).await
    }

    async fn increment_likes(&self, id: Uuid) -> Result<i64> {
        self.inner.increment_likes(id).await
    }

    async fn update_metadata(&self, id: Uuid, update: &VideoMetadataUpdate) -> Result<Video> {
        self.inner.update_metadata(id, update).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        self.inner.delete(id).await
    }
}

/// One orchestrator wired to fakes, with its scratch directories
pub struct Harness {
    pub dir: TempDir,
    pub memory: MemoryVideoStore,
    pub store: FlakyStore,
    pub toolkit: FakeToolkit,
    pub assets: ScriptedAssetStore,
    pub relay: ProgressRelay,
    pub orchestrator: IngestOrchestrator,
}

impl Harness {
    pub fn new(toolkit: FakeToolkit, assets: ScriptedAssetStore) -> Self {
        Self::with_limit(toolkit, assets, None)
    }

    pub fn with_limit(
        toolkit: FakeToolkit,
        assets: ScriptedAssetStore,
        max_concurrent_transcodes: Option<usize>,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let memory = MemoryVideoStore::new();
        let store = FlakyStore::new(memory.clone());
        let relay = ProgressRelay::new();

        let orchestrator = IngestOrchestrator::new(
            Arc::new(store.clone()),
            Arc::new(toolkit.clone()),
            Arc::new(assets.clone()),
            relay.clone(),
            IngestSettings {
                transcode: TranscodeConfig::default(),
                work_dir: dir.path().join("work"),
                max_concurrent_transcodes,
            },
        );

        Self {
            dir,
            memory,
            store,
            toolkit,
            assets,
            relay,
            orchestrator,
        }
    }

    /// Write a source file and insert an `uploaded` record pointing at it
    pub async fn upload(&self) -> (Video, PathBuf) {
        self.upload_bytes(b"not really an mp4").await
    }

    pub async fn upload_bytes(&self, contents: &[u8]) -> (Video, PathBuf) {
        let uploads = self.dir.path().join("uploads");
        tokio::fs::create_dir_all(&uploads).await.unwrap();
        let path = uploads.join(format!("{}.mp4", Uuid::new_v4()));
        tokio::fs::write(&path, contents).await.unwrap();

        let video = Video::new_upload(NewVideo {
            owner_id: Uuid::new_v4(),
            title: "Launch trailer".to_string(),
            description: "First cut".to_string(),
            category: VideoCategory::Entertainment,
            tags: vec!["trailer".to_string()],
            is_public: true,
            temp_path: path.display().to_string(),
        });
        self.memory.insert(&video).await.unwrap();
        (video, path)
    }

    pub async fn stored(&self, id: Uuid) -> Video {
        self.memory.get(id).await.unwrap().expect("video record")
    }

    pub fn work_dir(&self, id: Uuid) -> PathBuf {
        self.orchestrator.work_dir_for(id)
    }
}

/// Everything currently queued on a subscription
pub fn drain(receiver: &mut mpsc::UnboundedReceiver<VideoEvent>) -> Vec<VideoEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

pub fn progress_values(events: &[VideoEvent]) -> Vec<i32> {
    events.iter().filter_map(VideoEvent::progress_value).collect()
}

pub fn event_names(events: &[VideoEvent]) -> Vec<&'static str> {
    events.iter().map(VideoEvent::name).collect()
}
