/// ffmpeg/ffprobe backed [`MediaToolkit`]
///
/// Probe uses ffprobe's JSON output. Transcoding produces one multi-variant
/// HLS package (a `split` filter feeding one scaled encoder per rendition)
/// and then grabs a single frame for the thumbnail.
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::{MediaProbe, MediaToolkit, TranscodeJob, TranscodeOutput};
use crate::config::TranscodeConfig;
use crate::error::{AppError, Result};

const MASTER_PLAYLIST: &str = "master.m3u8";
const STDERR_TAIL_CHARS: usize = 600;

#[derive(Clone, Debug)]
pub struct FfmpegToolkit {
    ffmpeg_path: String,
    ffprobe_path: String,
}

impl FfmpegToolkit {
    pub fn new(ffmpeg_path: impl Into<String>, ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
        }
    }

    pub fn from_config(config: &TranscodeConfig) -> Self {
        Self::new(&config.ffmpeg_path, &config.ffprobe_path)
    }

    async fn run_hls(&self, job: &TranscodeJob, progress: mpsc::Sender<f64>) -> Result<()> {
        let package_dir = job.package_dir();
        for rendition in &job.renditions {
            tokio::fs::create_dir_all(package_dir.join(&rendition.name))
                .await
                .map_err(|e| AppError::MediaTool(format!("Failed to create output dir: {e}")))?;
        }

        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.args(hls_args(job))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| AppError::MediaTool(format!("Failed to start ffmpeg: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::MediaTool("ffmpeg stdout unavailable".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AppError::MediaTool("ffmpeg stderr unavailable".to_string()))?;

        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = BufReader::new(stderr).read_to_string(&mut buf).await;
            buf
        });

        let mut parser = ProgressParser::new(job.duration_seconds);
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines
            .next_line()
            .await
            .map_err(|e| AppError::MediaTool(format!("Failed to read ffmpeg progress: {e}")))?
        {
            if let Some(pct) = parser.feed(&line) {
                // Receiver may be gone; keep draining so ffmpeg never blocks on a full pipe.
                let _ = progress.send(pct).await;
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| AppError::MediaTool(format!("Failed to wait for ffmpeg: {e}")))?;
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(AppError::MediaTool(format!(
                "Transcoding failed ({status}): {}",
                tail(&stderr)
            )));
        }
        Ok(())
    }

    async fn extract_thumbnail(&self, job: &TranscodeJob) -> Result<()> {
        let output = Command::new(&self.ffmpeg_path)
            .args(thumbnail_args(job))
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| AppError::MediaTool(format!("Failed to start ffmpeg: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::MediaTool(format!(
                "Thumbnail generation failed: {}",
                tail(&stderr)
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl MediaToolkit for FfmpegToolkit {
    async fn probe(&self, input: &Path) -> Result<MediaProbe> {
        let metadata = tokio::fs::metadata(input).await.map_err(|e| {
            AppError::MediaTool(format!("Input file unreadable {}: {e}", input.display()))
        })?;
        if metadata.len() == 0 {
            return Err(AppError::MediaTool(format!(
                "Input file is empty: {}",
                input.display()
            )));
        }

        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(input)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| AppError::MediaTool(format!("Failed to start ffprobe: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::MediaTool(format!(
                "ffprobe failed ({}): {}",
                output.status,
                tail(&stderr)
            )));
        }

        let probe = parse_probe_output(&String::from_utf8_lossy(&output.stdout))?;
        debug!(
            duration = probe.duration_seconds,
            width = probe.width,
            height = probe.height,
            has_audio = probe.has_audio,
            "probed {}",
            input.display()
        );
        Ok(probe)
    }

    async fn transcode(
        &self,
        job: &TranscodeJob,
        progress: mpsc::Sender<f64>,
    ) -> Result<TranscodeOutput> {
        if job.renditions.is_empty() {
            return Err(AppError::MediaTool("No renditions configured".to_string()));
        }

        info!(
            input = %job.input.display(),
            renditions = job.renditions.len(),
            "starting HLS transcode"
        );
        self.run_hls(job, progress).await?;
        self.extract_thumbnail(job).await?;

        let output = TranscodeOutput {
            package_dir: job.package_dir(),
            master_playlist: job.package_dir().join(MASTER_PLAYLIST),
            thumbnail: job.thumbnail_path(),
        };

        for artifact in [&output.master_playlist, &output.thumbnail] {
            if tokio::fs::metadata(artifact).await.is_err() {
                return Err(AppError::MediaTool(format!(
                    "Expected output missing: {}",
                    artifact.display()
                )));
            }
        }
        Ok(output)
    }
}

/// Arguments for the multi-variant HLS encode
fn hls_args(job: &TranscodeJob) -> Vec<String> {
    let count = job.renditions.len();
    let package_dir = job.package_dir();

    let mut filter = format!("[0:v]split={count}");
    for i in 0..count {
        filter.push_str(&format!("[v{i}]"));
    }
    for (i, rendition) in job.renditions.iter().enumerate() {
        filter.push_str(&format!(";[v{i}]scale=-2:{}[v{i}out]", rendition.height));
    }

    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-y".into(),
        "-i".into(),
        job.input.to_string_lossy().into_owned(),
        "-filter_complex".into(),
        filter,
    ];

    let mut stream_map = Vec::with_capacity(count);
    for (i, rendition) in job.renditions.iter().enumerate() {
        args.extend([
            "-map".into(),
            format!("[v{i}out]"),
            format!("-c:v:{i}"),
            "libx264".into(),
            format!("-b:v:{i}"),
            format!("{}k", rendition.video_bitrate_kbps),
        ]);
        if job.has_audio {
            args.extend([
                "-map".into(),
                "0:a:0".into(),
                format!("-c:a:{i}"),
                "aac".into(),
                format!("-b:a:{i}"),
                format!("{}k", rendition.audio_bitrate_kbps),
            ]);
            stream_map.push(format!("v:{i},a:{i},name:{}", rendition.name));
        } else {
            stream_map.push(format!("v:{i},name:{}", rendition.name));
        }
    }

    args.extend([
        "-preset".into(),
        "veryfast".into(),
        "-f".into(),
        "hls".into(),
        "-hls_time".into(),
        job.segment_seconds.to_string(),
        "-hls_playlist_type".into(),
        "vod".into(),
        "-hls_segment_filename".into(),
        package_dir
            .join("%v")
            .join("segment_%03d.ts")
            .to_string_lossy()
            .into_owned(),
        "-master_pl_name".into(),
        MASTER_PLAYLIST.into(),
        "-var_stream_map".into(),
        stream_map.join(" "),
        "-progress".into(),
        "pipe:1".into(),
        "-nostats".into(),
        package_dir
            .join("%v")
            .join("index.m3u8")
            .to_string_lossy()
            .into_owned(),
    ]);
    args
}

fn thumbnail_args(job: &TranscodeJob) -> Vec<String> {
    let (w, h) = (job.thumbnail_width, job.thumbnail_height);
    vec![
        "-hide_banner".into(),
        "-y".into(),
        "-ss".into(),
        format!("{:.3}", job.thumbnail_at_seconds),
        "-i".into(),
        job.input.to_string_lossy().into_owned(),
        "-frames:v".into(),
        "1".into(),
        "-vf".into(),
        format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2"
        ),
        job.thumbnail_path().to_string_lossy().into_owned(),
    ]
}

/// Parse ffprobe JSON output
pub fn parse_probe_output(json_str: &str) -> Result<MediaProbe> {
    let json: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| AppError::MediaTool(format!("Failed to parse ffprobe output: {e}")))?;

    let format = json.get("format");

    let streams = json
        .get("streams")
        .and_then(|s| s.as_array())
        .cloned()
        .unwrap_or_default();

    let video = streams
        .iter()
        .find(|s| s.get("codec_type").and_then(|c| c.as_str()) == Some("video"))
        .ok_or_else(|| AppError::MediaTool("No video stream found".to_string()))?;
    let has_audio = streams
        .iter()
        .any(|s| s.get("codec_type").and_then(|c| c.as_str()) == Some("audio"));

    // Some WebM/MKV containers carry no duration; fall back to the stream, then 0.
    let duration_seconds = format
        .and_then(duration_field)
        .or_else(|| duration_field(video))
        .unwrap_or(0.0);

    let format_name = format
        .and_then(|f| f.get("format_name"))
        .and_then(|f| f.as_str())
        .unwrap_or("unknown")
        .to_string();

    Ok(MediaProbe {
        duration_seconds,
        width: video.get("width").and_then(|w| w.as_u64()).unwrap_or(0) as u32,
        height: video.get("height").and_then(|h| h.as_u64()).unwrap_or(0) as u32,
        has_audio,
        format: format_name,
    })
}

fn duration_field(value: &serde_json::Value) -> Option<f64> {
    value
        .get("duration")
        .and_then(|d| d.as_str())
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
}

/// Incremental parser for `-progress pipe:1` key/value blocks
#[derive(Debug)]
pub struct ProgressParser {
    duration_seconds: f64,
    current_seconds: f64,
}

impl ProgressParser {
    pub fn new(duration_seconds: f64) -> Self {
        Self {
            duration_seconds,
            current_seconds: 0.0,
        }
    }

    /// Feed one line; returns a percentage at the end of each progress block
    pub fn feed(&mut self, line: &str) -> Option<f64> {
        let line = line.trim();
        // Both keys carry microseconds.
        if let Some(value) = line
            .strip_prefix("out_time_us=")
            .or_else(|| line.strip_prefix("out_time_ms="))
        {
            if let Ok(us) = value.trim().parse::<i64>() {
                self.current_seconds = us.max(0) as f64 / 1_000_000.0;
            }
            None
        } else if let Some(state) = line.strip_prefix("progress=") {
            if state.trim() == "end" {
                return Some(100.0);
            }
            if self.duration_seconds <= 0.0 {
                return None;
            }
            Some((self.current_seconds / self.duration_seconds * 100.0).clamp(0.0, 100.0))
        } else {
            None
        }
    }
}

fn tail(s: &str) -> String {
    let trimmed = s.trim();
    let count = trimmed.chars().count();
    if count <= STDERR_TAIL_CHARS {
        trimmed.to_string()
    } else {
        trimmed.chars().skip(count - STDERR_TAIL_CHARS).collect()
    }
}
