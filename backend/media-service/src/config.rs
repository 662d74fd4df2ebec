/// Configuration management for media-service
///
/// Loads configuration from environment variables with sensible defaults.
use serde::Deserialize;
use std::path::PathBuf;

use crate::services::transcoder::Rendition;

const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub s3: S3Config,
    pub transcode: TranscodeConfig,
    pub ingest: IngestConfig,
    pub auth: AuthConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub env: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CacheConfig {
    /// Cache is disabled when unset
    pub redis_url: Option<String>,
    pub ttl_seconds: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub endpoint: Option<String>,
    /// CDN or bucket origin used to build public URLs
    pub public_base_url: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct TranscodeConfig {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub renditions: Vec<Rendition>,
    pub hls_segment_seconds: u32,
    pub thumbnail_width: u32,
    pub thumbnail_height: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct IngestConfig {
    pub upload_dir: PathBuf,
    pub work_dir: PathBuf,
    pub max_upload_bytes: usize,
    /// Admission gate in front of transcoding; unbounded when unset
    pub max_concurrent_transcodes: Option<usize>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            renditions: Rendition::default_ladder(),
            hls_segment_seconds: 10,
            thumbnail_width: 640,
            thumbnail_height: 360,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let defaults = TranscodeConfig::default();

        let renditions = match std::env::var("TRANSCODE_RENDITIONS") {
            Ok(raw) => parse_renditions(&raw)?,
            Err(_) => defaults.renditions,
        };

        let explicit_env = std::env::var("APP_ENV").ok();
        let jwt_secret = resolve_jwt_secret(
            std::env::var("JWT_SECRET").ok(),
            explicit_env.as_deref(),
        )?;

        Ok(Config {
            app: AppConfig {
                host: std::env::var("MEDIA_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_parse("MEDIA_SERVICE_PORT", 8082),
                env: explicit_env.unwrap_or_else(|| "development".to_string()),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "postgresql://localhost/nexushub".to_string()),
                max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 10),
            },
            cache: CacheConfig {
                redis_url: std::env::var("REDIS_URL").ok().filter(|v| !v.is_empty()),
                ttl_seconds: env_parse("CACHE_TTL_SECONDS", 300),
            },
            s3: S3Config {
                bucket: std::env::var("S3_BUCKET")
                    .unwrap_or_else(|_| "nexushub-media".to_string()),
                region: std::env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
                access_key_id: std::env::var("AWS_ACCESS_KEY_ID").ok(),
                secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").ok(),
                endpoint: std::env::var("S3_ENDPOINT").ok(),
                public_base_url: std::env::var("S3_PUBLIC_BASE_URL")
                    .ok()
                    .map(|url| url.trim_end_matches('/').to_string()),
            },
            transcode: TranscodeConfig {
                ffmpeg_path: std::env::var("FFMPEG_PATH").unwrap_or(defaults.ffmpeg_path),
                ffprobe_path: std::env::var("FFPROBE_PATH").unwrap_or(defaults.ffprobe_path),
                renditions,
                hls_segment_seconds: env_parse("HLS_SEGMENT_SECONDS", defaults.hls_segment_seconds),
                thumbnail_width: env_parse("THUMBNAIL_WIDTH", defaults.thumbnail_width),
                thumbnail_height: env_parse("THUMBNAIL_HEIGHT", defaults.thumbnail_height),
            },
            ingest: IngestConfig {
                upload_dir: std::env::var("UPLOAD_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| std::env::temp_dir().join("nexushub-uploads")),
                work_dir: std::env::var("MEDIA_WORK_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| std::env::temp_dir().join("nexushub-transcode")),
                max_upload_bytes: env_parse("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
                max_concurrent_transcodes: parse_concurrency_limit(
                    std::env::var("INGEST_MAX_CONCURRENT_TRANSCODES").ok().as_deref(),
                ),
            },
            auth: AuthConfig { jwt_secret },
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parse a comma-separated rendition list such as `1080p,720p,480p`
pub fn parse_renditions(raw: &str) -> Result<Vec<Rendition>, String> {
    let renditions = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|name| {
            Rendition::from_name(name).ok_or_else(|| format!("Unknown rendition '{name}'"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if renditions.is_empty() {
        return Err("TRANSCODE_RENDITIONS must name at least one rendition".to_string());
    }
    Ok(renditions)
}

/// `None`, empty and zero all mean "no limit"
pub fn parse_concurrency_limit(raw: Option<&str>) -> Option<usize> {
    raw.and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|limit| *limit > 0)
}

const DEV_JWT_SECRET: &str = "dev-secret-change-me";

/// The development secret is only accepted when `APP_ENV=development` is set explicitly
fn resolve_jwt_secret(secret: Option<String>, app_env: Option<&str>) -> Result<String, String> {
    match secret.filter(|s| !s.trim().is_empty()) {
        Some(secret) => Ok(secret),
        None if app_env == Some("development") => {
            tracing::warn!("JWT_SECRET not set; using development secret");
            Ok(DEV_JWT_SECRET.to_string())
        }
        None => Err(format!(
            "JWT_SECRET must be set when APP_ENV is {}",
            app_env.unwrap_or("unset")
        )),
    }
}
