use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::app::store::{ObjectStore, VideoStore};
use crate::domain::video::{VideoAsset, UNKNOWN_DURATION};

#[derive(Debug, Clone, Serialize)]
pub struct VideoCard {
    pub id: Uuid,
    pub title: String,
    pub thumbnail_url: Option<String>,
    pub duration: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<VideoAsset> for VideoCard {
    fn from(video: VideoAsset) -> Self {
        Self {
            id: video.id,
            title: video.title,
            thumbnail_url: video.thumbnail_url,
            duration: video
                .duration
                .unwrap_or_else(|| UNKNOWN_DURATION.to_string()),
            created_at: video.created_at,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog store did not answer within {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Clone)]
pub struct CatalogService {
    videos: Arc<dyn VideoStore>,
    objects: Arc<dyn ObjectStore>,
    video_bucket: String,
    timeout: Duration,
}

impl CatalogService {
    pub fn new(
        videos: Arc<dyn VideoStore>,
        objects: Arc<dyn ObjectStore>,
        video_bucket: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            videos,
            objects,
            video_bucket: video_bucket.into(),
            timeout,
        }
    }

    /// Newest-first cards whose title matches `query`.
    pub async fn list(&self, query: &str) -> Result<Vec<VideoCard>, CatalogError> {
        let videos = self.timed(self.videos.select()).await?;
        Ok(filter_by_title(videos, query)
            .into_iter()
            .map(VideoCard::from)
            .collect())
    }

    pub async fn playback_url(&self, id: Uuid) -> Result<Option<String>, CatalogError> {
        let Some(video) = self.timed(self.videos.get(id)).await? else {
            return Ok(None);
        };
        let url = self.objects.public_url(&self.video_bucket, &video.file_path)?;
        Ok(Some(url))
    }

    pub async fn ping(&self) -> Result<(), CatalogError> {
        self.timed(self.videos.ping()).await
    }

    async fn timed<T>(
        &self,
        call: impl Future<Output = anyhow::Result<T>>,
    ) -> Result<T, CatalogError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| CatalogError::Timeout(self.timeout))?
            .map_err(CatalogError::Store)
    }
}

/// Case-insensitive substring match on the title; an empty query keeps all.
pub fn filter_by_title(videos: Vec<VideoAsset>, query: &str) -> Vec<VideoAsset> {
    if query.is_empty() {
        return videos;
    }
    let needle = query.to_lowercase();
    videos
        .into_iter()
        .filter(|video| video.title.to_lowercase().contains(&needle))
        .collect()
}
