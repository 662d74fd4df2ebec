/// Remote asset store
///
/// Finished artifacts are handed to an [`AssetStore`] which returns a durable
/// public URL and a `public_id` handle used for later deletion.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use uuid::Uuid;

use crate::error::Result;

pub mod s3;

pub use s3::S3AssetStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    /// An HLS package: the upload path names the master playlist and every
    /// file in its directory is published.
    Video,
    /// A single image file
    Image,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Image => "image",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadOptions {
    pub resource_type: ResourceType,
    pub folder: String,
}

impl UploadOptions {
    pub fn video(video_id: Uuid) -> Self {
        Self {
            resource_type: ResourceType::Video,
            folder: video_folder(video_id),
        }
    }

    pub fn thumbnail(video_id: Uuid) -> Self {
        Self {
            resource_type: ResourceType::Image,
            folder: format!("{}/thumbs", video_folder(video_id)),
        }
    }
}

/// Durable location of an uploaded artifact
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredAsset {
    pub secure_url: String,
    pub public_id: String,
}

#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn upload(&self, local_path: &Path, options: &UploadOptions) -> Result<StoredAsset>;

    async fn delete(&self, public_id: &str, resource_type: ResourceType) -> Result<()>;
}

pub fn video_folder(video_id: Uuid) -> String {
    format!("videos/{video_id}")
}
