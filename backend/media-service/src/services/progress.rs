/// Per-video progress channel
///
/// Best-effort fan-out of ingestion events to whoever is subscribed to a
/// video right now. There is no buffering or replay: a late subscriber only
/// sees later events and recovers earlier state from the video record.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    RwLock,
};
use uuid::Uuid;

use crate::metrics;
use crate::models::{Video, VideoStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressPayload {
    pub video_id: Uuid,
    pub progress: i32,
    pub stage: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletePayload {
    pub video_id: Uuid,
    pub status: VideoStatus,
    pub video_url: String,
    pub thumbnail_url: String,
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub video_id: Uuid,
    pub status: VideoStatus,
    pub error: String,
}

/// Event published on a video's channel
///
/// Serialized as `{"event": "video-progress", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum VideoEvent {
    #[serde(rename = "video-progress")]
    Progress(ProgressPayload),
    #[serde(rename = "video-complete")]
    Complete(CompletePayload),
    #[serde(rename = "video-error")]
    Error(ErrorPayload),
}

impl VideoEvent {
    pub fn progress(video_id: Uuid, progress: i32, stage: impl Into<String>) -> Self {
        Self::Progress(ProgressPayload {
            video_id,
            progress: progress.clamp(0, 100),
            stage: stage.into(),
            timestamp: Utc::now(),
        })
    }

    /// Completion event for a processed video; `None` if URLs are missing
    pub fn complete(video: &Video) -> Option<Self> {
        Some(Self::Complete(CompletePayload {
            video_id: video.id,
            status: VideoStatus::Processed,
            video_url: video.video_url.clone()?,
            thumbnail_url: video.thumbnail_url.clone()?,
            duration: video.duration_seconds,
        }))
    }

    pub fn error(video_id: Uuid, error: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            video_id,
            status: VideoStatus::Failed,
            error: error.into(),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Progress(_) => "video-progress",
            Self::Complete(_) => "video-complete",
            Self::Error(_) => "video-error",
        }
    }

    pub fn video_id(&self) -> Uuid {
        match self {
            Self::Progress(p) => p.video_id,
            Self::Complete(c) => c.video_id,
            Self::Error(e) => e.video_id,
        }
    }

    pub fn progress_value(&self) -> Option<i32> {
        match self {
            Self::Progress(p) => Some(p.progress),
            _ => None,
        }
    }
}

/// Unique identifier for a progress subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

struct Subscriber {
    id: SubscriberId,
    sender: UnboundedSender<VideoEvent>,
}

/// Registry of progress subscribers keyed by video id
#[derive(Default, Clone)]
pub struct ProgressRelay {
    inner: Arc<RwLock<HashMap<Uuid, Vec<Subscriber>>>>,
}

impl ProgressRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the broadcast topic for one video
    pub fn channel_name(video_id: Uuid) -> String {
        format!("video_{video_id}")
    }

    pub async fn subscribe(&self, video_id: Uuid) -> (SubscriberId, UnboundedReceiver<VideoEvent>) {
        let (tx, rx) = unbounded_channel();
        let subscriber_id = SubscriberId::new();

        let mut guard = self.inner.write().await;
        guard.entry(video_id).or_default().push(Subscriber {
            id: subscriber_id,
            sender: tx,
        });

        tracing::debug!(
            channel = %Self::channel_name(video_id),
            subscribers = guard.get(&video_id).map(|v| v.len()).unwrap_or(0),
            "progress subscriber added"
        );

        (subscriber_id, rx)
    }

    /// Must be called when a subscriber goes away
    pub async fn unsubscribe(&self, video_id: Uuid, subscriber_id: SubscriberId) {
        let mut guard = self.inner.write().await;

        if let Some(subscribers) = guard.get_mut(&video_id) {
            subscribers.retain(|s| s.id != subscriber_id);
            if subscribers.is_empty() {
                guard.remove(&video_id);
            }
        }
    }

    /// Fire-and-forget delivery to current subscribers. Dead ones are pruned.
    pub async fn emit(&self, event: VideoEvent) {
        let video_id = event.video_id();
        metrics::record_relay_event(event.name());

        let mut guard = self.inner.write().await;
        let Some(subscribers) = guard.get_mut(&video_id) else {
            return;
        };

        let before = subscribers.len();
        subscribers.retain(|subscriber| subscriber.sender.send(event.clone()).is_ok());
        let after = subscribers.len();

        if before != after {
            tracing::debug!(
                channel = %Self::channel_name(video_id),
                dropped = before - after,
                active = after,
                "pruned dead progress subscribers"
            );
        }
        if subscribers.is_empty() {
            guard.remove(&video_id);
        }
    }

    pub async fn subscriber_count(&self, video_id: Uuid) -> usize {
        let guard = self.inner.read().await;
        guard.get(&video_id).map(|v| v.len()).unwrap_or(0)
    }
}
