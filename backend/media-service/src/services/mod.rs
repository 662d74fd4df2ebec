/// Service layer for video ingestion
///
/// This module provides:
/// - Ingest: the orchestrator driving an upload to a published asset
/// - Transcoder: probe and HLS packaging through external media tools
/// - Storage: the remote asset store
/// - Progress: per-video event channels
/// - Presence: online-user registry
pub mod cleanup;
pub mod ingest;
pub mod presence;
pub mod progress;
pub mod storage;
pub mod transcoder;

pub use ingest::{IngestOrchestrator, IngestSettings};
pub use presence::{PresenceEvent, PresenceRegistry};
pub use progress::{ProgressRelay, VideoEvent};
pub use storage::{AssetStore, ResourceType, S3AssetStore, StoredAsset, UploadOptions};
pub use transcoder::{FfmpegToolkit, MediaProbe, MediaToolkit, TranscodeJob, TranscodeOutput};
