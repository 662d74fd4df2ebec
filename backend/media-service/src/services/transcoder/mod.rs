/// Media probe and transcode invoker
///
/// The ingestion pipeline talks to the external media tool only through
/// [`MediaToolkit`]. [`FfmpegToolkit`] is the production implementation.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

use crate::config::TranscodeConfig;
use crate::error::Result;

pub mod ffmpeg;

pub use ffmpeg::FfmpegToolkit;

/// Lower bound of the progress band reserved for transcoding
pub const TRANSCODE_PROGRESS_FLOOR: i32 = 10;
/// Upper bound of the progress band reserved for transcoding
pub const TRANSCODE_PROGRESS_CEILING: i32 = 80;

/// One rung of the HLS resolution ladder
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rendition {
    pub name: String,
    pub height: u32,
    pub video_bitrate_kbps: u32,
    pub audio_bitrate_kbps: u32,
}

impl Rendition {
    fn new(name: &str, height: u32, video_bitrate_kbps: u32, audio_bitrate_kbps: u32) -> Self {
        Self {
            name: name.to_string(),
            height,
            video_bitrate_kbps,
            audio_bitrate_kbps,
        }
    }

    /// Known rendition by name (`1080p`, `720p`, `480p`, `360p`)
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "1080p" => Some(Self::new("1080p", 1080, 5000, 192)),
            "720p" => Some(Self::new("720p", 720, 2800, 128)),
            "480p" => Some(Self::new("480p", 480, 1400, 128)),
            "360p" => Some(Self::new("360p", 360, 800, 96)),
            _ => None,
        }
    }

    pub fn default_ladder() -> Vec<Self> {
        ["1080p", "720p", "480p"]
            .iter()
            .filter_map(|name| Self::from_name(name))
            .collect()
    }
}

/// What the probe learned about a source file
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MediaProbe {
    pub duration_seconds: f64,
    pub width: u32,
    pub height: u32,
    pub has_audio: bool,
    pub format: String,
}

/// Input to a single transcode invocation
#[derive(Clone, Debug)]
pub struct TranscodeJob {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub renditions: Vec<Rendition>,
    pub segment_seconds: u32,
    pub duration_seconds: f64,
    pub has_audio: bool,
    pub thumbnail_at_seconds: f64,
    pub thumbnail_width: u32,
    pub thumbnail_height: u32,
}

impl TranscodeJob {
    pub fn new(input: &Path, output_dir: &Path, config: &TranscodeConfig, probe: &MediaProbe) -> Self {
        let duration = probe.duration_seconds.max(0.0);
        Self {
            input: input.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            renditions: config.renditions.clone(),
            segment_seconds: config.hls_segment_seconds,
            duration_seconds: duration,
            has_audio: probe.has_audio,
            thumbnail_at_seconds: duration / 2.0,
            thumbnail_width: config.thumbnail_width,
            thumbnail_height: config.thumbnail_height,
        }
    }

    pub fn package_dir(&self) -> PathBuf {
        self.output_dir.join("hls")
    }

    pub fn thumbnail_path(&self) -> PathBuf {
        self.output_dir.join("thumbnail.jpg")
    }
}

/// Artifacts produced by a successful transcode
#[derive(Clone, Debug, PartialEq)]
pub struct TranscodeOutput {
    /// Directory holding the master playlist and every rendition
    pub package_dir: PathBuf,
    pub master_playlist: PathBuf,
    pub thumbnail: PathBuf,
}

#[async_trait]
pub trait MediaToolkit: Send + Sync {
    /// Inspect a source file. Unreadable or empty input is an error.
    async fn probe(&self, input: &Path) -> Result<MediaProbe>;

    /// Produce the HLS package and the thumbnail.
    ///
    /// Tool progress is reported on `progress` as a percentage in `0.0..=100.0`.
    /// A dropped receiver does not abort the transcode.
    async fn transcode(
        &self,
        job: &TranscodeJob,
        progress: mpsc::Sender<f64>,
    ) -> Result<TranscodeOutput>;
}

/// Map a tool percentage onto the `[10, 80]` band of overall progress
pub fn scale_transcode_progress(tool_percent: f64) -> i32 {
    let pct = if tool_percent.is_finite() {
        tool_percent.clamp(0.0, 100.0)
    } else {
        0.0
    };
    let band = f64::from(TRANSCODE_PROGRESS_CEILING - TRANSCODE_PROGRESS_FLOOR);
    (f64::from(TRANSCODE_PROGRESS_FLOOR) + pct * band / 100.0).round() as i32
}
