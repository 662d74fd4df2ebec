/// S3 implementation of the remote asset store
///
/// Video packages are published as every file under the playlist's directory,
/// keyed `{folder}/{relative path}`; their `public_id` is the folder prefix.
/// Images are a single object whose key is the `public_id`.
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{AssetStore, ResourceType, StoredAsset, UploadOptions};
use crate::config::S3Config;
use crate::error::{AppError, Result};

#[derive(Clone)]
pub struct S3AssetStore {
    client: Client,
    bucket: String,
    region: String,
    endpoint: Option<String>,
    public_base_url: Option<String>,
}

impl S3AssetStore {
    pub fn new(client: Client, config: &S3Config) -> Self {
        Self {
            client,
            bucket: config.bucket.clone(),
            region: config.region.clone(),
            endpoint: config.endpoint.clone(),
            public_base_url: config.public_base_url.clone(),
        }
    }

    pub fn public_url(&self, key: &str) -> String {
        public_url(
            self.public_base_url.as_deref(),
            self.endpoint.as_deref(),
            &self.bucket,
            &self.region,
            key,
        )
    }

    async fn put_file(&self, path: &Path, key: &str) -> Result<()> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to read file {}: {e}", path.display())))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type_for(path))
            // Artifacts are immutable, versioned by path
            .cache_control("max-age=31536000")
            .send()
            .await
            .map_err(|e| {
                let error_msg = e.to_string();
                if error_msg.contains("403") || error_msg.contains("Forbidden") {
                    AppError::Storage("S3 auth failed (403): Check AWS credentials".to_string())
                } else if error_msg.contains("NoSuchBucket") {
                    AppError::Storage(format!("S3 bucket not found: {}", self.bucket))
                } else {
                    AppError::Storage(format!("S3 upload failed for {key}: {e}"))
                }
            })?;

        debug!(key, "uploaded object");
        Ok(())
    }

    async fn delete_key(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("S3 delete failed for {key}: {e}")))?;
        Ok(())
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let resp = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| AppError::Storage(format!("S3 list failed for {prefix}: {e}")))?;

            keys.extend(
                resp.contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(str::to_string)),
            );

            match resp.next_continuation_token() {
                Some(token) if resp.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }
        Ok(keys)
    }
}

#[async_trait]
impl AssetStore for S3AssetStore {
    async fn upload(&self, local_path: &Path, options: &UploadOptions) -> Result<StoredAsset> {
        let file_name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                AppError::Storage(format!("Invalid upload path: {}", local_path.display()))
            })?;
        let folder = options.folder.trim_end_matches('/');

        match options.resource_type {
            ResourceType::Image => {
                let key = format!("{folder}/{file_name}");
                self.put_file(local_path, &key).await?;
                Ok(StoredAsset {
                    secure_url: self.public_url(&key),
                    public_id: key,
                })
            }
            ResourceType::Video => {
                let root = local_path.parent().ok_or_else(|| {
                    AppError::Storage(format!("Invalid package path: {}", local_path.display()))
                })?;
                let files = collect_files(root).await?;
                info!(folder, files = files.len(), "publishing video package");

                let mut uploads = Vec::with_capacity(files.len());
                for file in files {
                    let key = format!("{folder}/{}", relative_key(root, &file)?);
                    uploads.push((file, key));
                }

                put_all_or_rollback(
                    uploads,
                    |file, key| async move { self.put_file(&file, &key).await },
                    || self.delete(folder, ResourceType::Video),
                )
                .await?;

                Ok(StoredAsset {
                    secure_url: self.public_url(&format!("{folder}/{file_name}")),
                    public_id: folder.to_string(),
                })
            }
        }
    }

    async fn delete(&self, public_id: &str, resource_type: ResourceType) -> Result<()> {
        match resource_type {
            ResourceType::Image => self.delete_key(public_id).await,
            ResourceType::Video => {
                let prefix = format!("{}/", public_id.trim_end_matches('/'));
                let keys = self.list_prefix(&prefix).await?;
                for key in &keys {
                    self.delete_key(key).await?;
                }
                info!(public_id, objects = keys.len(), "deleted video package");
                Ok(())
            }
        }
    }
}

/// Initialize AWS S3 client with credentials from config
///
/// Falls back to the default credential chain when no keys are configured.
pub async fn get_s3_client(config: &S3Config) -> Client {
    use aws_sdk_s3::config::Region;

    let mut aws_config_builder = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new(config.region.clone()));

    if let (Some(access_key_id), Some(secret_access_key)) =
        (&config.access_key_id, &config.secret_access_key)
    {
        use aws_sdk_s3::config::Credentials;

        let credentials = Credentials::new(
            access_key_id,
            secret_access_key,
            None,
            None,
            "media_service_s3",
        );
        aws_config_builder = aws_config_builder.credentials_provider(credentials);
    }

    // S3-compatible storage such as MinIO
    if let Some(endpoint) = &config.endpoint {
        aws_config_builder = aws_config_builder.endpoint_url(endpoint);
    }

    let aws_config = aws_config_builder.load().await;
    let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
        .force_path_style(config.endpoint.is_some())
        .build();

    Client::from_conf(s3_config)
}

fn public_url(
    public_base_url: Option<&str>,
    endpoint: Option<&str>,
    bucket: &str,
    region: &str,
    key: &str,
) -> String {
    match (public_base_url, endpoint) {
        (Some(base), _) => format!("{}/{key}", base.trim_end_matches('/')),
        (None, Some(endpoint)) => format!("{}/{bucket}/{key}", endpoint.trim_end_matches('/')),
        (None, None) => format!("https://{bucket}.s3.{region}.amazonaws.com/{key}"),
    }
}

fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("m3u8") => "application/vnd.apple.mpegurl",
        Some("ts") => "video/mp2t",
        Some("m4s") => "video/iso.segment",
        Some("mp4") => "video/mp4",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

fn relative_key(root: &Path, file: &Path) -> Result<String> {
    let relative = file.strip_prefix(root).map_err(|_| {
        AppError::Storage(format!(
            "{} is outside package {}",
            file.display(),
            root.display()
        ))
    })?;
    Ok(relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}

/// Upload every `(file, key)` pair in order. The first failure stops the
/// batch and runs `rollback` so no partial package is left behind.
async fn put_all_or_rollback<P, PF, R, RF>(
    uploads: Vec<(PathBuf, String)>,
    mut put: P,
    rollback: R,
) -> Result<()>
where
    P: FnMut(PathBuf, String) -> PF,
    PF: Future<Output = Result<()>>,
    R: FnOnce() -> RF,
    RF: Future<Output = Result<()>>,
{
    let total = uploads.len();
    for (done, (file, key)) in uploads.into_iter().enumerate() {
        if let Err(e) = put(file, key).await {
            warn!(uploaded = done, total, error = %e, "package upload failed, removing partial objects");
            if let Err(cleanup) = rollback().await {
                warn!(error = %cleanup, "failed to remove partial package");
            }
            return Err(e);
        }
    }
    Ok(())
}

/// All regular files under `root`, sorted for deterministic upload order
async fn collect_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to read {}: {e}", dir.display())))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AppError::Storage(format!("Failed to read {}: {e}", dir.display())))?
        {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }
    }

    files.sort();
    Ok(files)
}
