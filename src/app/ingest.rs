//! Turns a batch of selected files into catalog entries.
//!
//! Files are processed one after another; each one goes through
//! validate → probe → thumbnail upload → video upload → record insert.
//! A failing file is reported and skipped, the rest of the batch continues.

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

use crate::app::notify::{Notification, Notifier};
use crate::app::probe::MediaProber;
use crate::app::store::{ObjectBody, ObjectStore, VideoStore};
use crate::domain::video::{
    content_type_from_extension, file_extension, NewVideoAsset, UploadCandidate, VideoAsset,
    THUMBNAIL_CONTENT_TYPE,
};

/// What to do with objects already written when a later step of the same
/// file fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrphanPolicy {
    #[default]
    Retain,
    Compensate,
}

impl FromStr for OrphanPolicy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "retain" => Ok(Self::Retain),
            "compensate" => Ok(Self::Compensate),
            other => Err(anyhow!("unknown orphan policy: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoredObject {
    Thumbnail,
    Video,
}

impl fmt::Display for StoredObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoredObject::Thumbnail => f.write_str("thumbnail"),
            StoredObject::Video => f.write_str("video"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("{0}")]
    Validation(String),
    #[error("failed to probe video: {cause:#}")]
    Probe { cause: anyhow::Error },
    #[error("failed to upload {object}: {cause:#}")]
    StorageWrite {
        object: StoredObject,
        cause: anyhow::Error,
    },
    #[error("failed to save video record: {cause:#}")]
    MetadataPersist { cause: anyhow::Error },
    #[error("unexpected failure: {cause:#}")]
    Unexpected { cause: anyhow::Error },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    Probe,
    StorageWrite,
    MetadataPersist,
    Unexpected,
}

impl IngestError {
    pub fn kind(&self) -> FailureKind {
        match self {
            IngestError::Validation(_) => FailureKind::Validation,
            IngestError::Probe { .. } => FailureKind::Probe,
            IngestError::StorageWrite { .. } => FailureKind::StorageWrite,
            IngestError::MetadataPersist { .. } => FailureKind::MetadataPersist,
            IngestError::Unexpected { .. } => FailureKind::Unexpected,
        }
    }

    fn user_message(&self, file_name: &str) -> String {
        match self {
            IngestError::Validation(reason) => reason.clone(),
            IngestError::Probe { .. } => format!("Could not read video metadata from {}", file_name),
            IngestError::StorageWrite { object, .. } => {
                format!("Failed to upload {} for {}", object, file_name)
            }
            IngestError::MetadataPersist { .. } => {
                format!("Failed to save video details for {}", file_name)
            }
            IngestError::Unexpected { .. } => format!("Failed to process {}", file_name),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    Ingested {
        file_name: String,
        video: VideoAsset,
    },
    Failed {
        file_name: String,
        kind: FailureKind,
        error: String,
    },
}

impl FileOutcome {
    pub fn file_name(&self) -> &str {
        match self {
            FileOutcome::Ingested { file_name, .. } | FileOutcome::Failed { file_name, .. } => {
                file_name
            }
        }
    }

    pub fn is_ingested(&self) -> bool {
        matches!(self, FileOutcome::Ingested { .. })
    }
}

/// Per-file results of one batch, in submission order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub outcomes: Vec<FileOutcome>,
    pub notifications: Vec<Notification>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ingested()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub video_bucket: String,
    pub thumbnail_bucket: String,
    pub store_timeout: Duration,
    pub max_bytes: Option<u64>,
    pub orphan_policy: OrphanPolicy,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            video_bucket: "videos".to_string(),
            thumbnail_bucket: "thumbnails".to_string(),
            store_timeout: Duration::from_secs(120),
            max_bytes: None,
            orphan_policy: OrphanPolicy::Retain,
        }
    }
}

pub struct IngestService {
    objects: Arc<dyn ObjectStore>,
    videos: Arc<dyn VideoStore>,
    prober: MediaProber,
    notifier: Arc<dyn Notifier>,
    settings: IngestSettings,
    busy: watch::Sender<bool>,
    batch_lock: Mutex<()>,
}

impl IngestService {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        videos: Arc<dyn VideoStore>,
        prober: MediaProber,
        notifier: Arc<dyn Notifier>,
        settings: IngestSettings,
    ) -> Self {
        let (busy, _) = watch::channel(false);
        Self {
            objects,
            videos,
            prober,
            notifier,
            settings,
            busy,
            batch_lock: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &IngestSettings {
        &self.settings
    }

    /// True while a batch is being processed.
    pub fn is_busy(&self) -> bool {
        *self.busy.borrow()
    }

    pub fn subscribe_busy(&self) -> watch::Receiver<bool> {
        self.busy.subscribe()
    }

    /// Processes the batch sequentially. Never fails as a whole: every file
    /// gets an outcome and a notification.
    pub async fn ingest(&self, files: Vec<UploadCandidate>) -> BatchReport {
        let _batch = self.batch_lock.lock().await;
        let _busy = BusyGuard::set(&self.busy);

        info!(files = files.len(), "ingest batch started");
        let mut report = BatchReport::default();
        for file in files {
            let (outcome, notification) = match self.ingest_one(&file).await {
                Ok(video) => {
                    info!(file = %file.file_name, video_id = %video.id, key = %video.file_path, "video ingested");
                    let notification = Notification::success(
                        &file.file_name,
                        format!("Uploaded {}", file.file_name),
                    );
                    let outcome = FileOutcome::Ingested {
                        file_name: file.file_name.clone(),
                        video,
                    };
                    (outcome, notification)
                }
                Err(err) => {
                    warn!(file = %file.file_name, kind = ?err.kind(), error = %err, "video ingest failed");
                    let notification =
                        Notification::error(&file.file_name, err.user_message(&file.file_name));
                    let outcome = FileOutcome::Failed {
                        file_name: file.file_name.clone(),
                        kind: err.kind(),
                        error: err.to_string(),
                    };
                    (outcome, notification)
                }
            };

            self.notifier.notify(&notification);
            report.outcomes.push(outcome);
            report.notifications.push(notification);
        }

        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "ingest batch finished"
        );
        report
    }

    async fn ingest_one(&self, file: &UploadCandidate) -> Result<VideoAsset, IngestError> {
        self.validate(file)?;

        let probed = self
            .prober
            .probe(file)
            .await
            .map_err(|cause| IngestError::Probe { cause })?;

        let thumbnail_bucket = self.settings.thumbnail_bucket.as_str();
        let thumbnail_key = format!("{}.jpg", Uuid::new_v4());
        self.timed(self.objects.put(
            thumbnail_bucket,
            &thumbnail_key,
            ObjectBody::Bytes(probed.thumbnail.data),
            THUMBNAIL_CONTENT_TYPE,
        ))
        .await
        .map_err(|cause| IngestError::StorageWrite {
            object: StoredObject::Thumbnail,
            cause,
        })?;

        let thumbnail_url = match self.objects.public_url(thumbnail_bucket, &thumbnail_key) {
            Ok(url) => url,
            Err(cause) => {
                self.cleanup(&[(thumbnail_bucket, thumbnail_key.as_str())]).await;
                return Err(IngestError::Unexpected { cause });
            }
        };

        let video_bucket = self.settings.video_bucket.as_str();
        let video_key = video_key(file);
        let upload = self
            .timed(self.objects.put(
                video_bucket,
                &video_key,
                ObjectBody::File(file.path.clone()),
                &file.content_type,
            ))
            .await;
        if let Err(cause) = upload {
            self.cleanup(&[(thumbnail_bucket, thumbnail_key.as_str())]).await;
            return Err(IngestError::StorageWrite {
                object: StoredObject::Video,
                cause,
            });
        }

        let record = NewVideoAsset {
            title: file.file_name.clone(),
            file_path: video_key.clone(),
            thumbnail_url: Some(thumbnail_url),
            duration: Some(probed.duration),
        };
        match self.timed(self.videos.insert(record)).await {
            Ok(video) => Ok(video),
            Err(cause) => {
                self.cleanup(&[
                    (thumbnail_bucket, thumbnail_key.as_str()),
                    (video_bucket, video_key.as_str()),
                ])
                    .await;
                Err(IngestError::MetadataPersist { cause })
            }
        }
    }

    fn validate(&self, file: &UploadCandidate) -> Result<(), IngestError> {
        if !file.is_video() {
            return Err(IngestError::Validation(format!(
                "{} is not a video file",
                file.file_name
            )));
        }
        if file.bytes == 0 {
            return Err(IngestError::Validation(format!("{} is empty", file.file_name)));
        }
        if let Some(max) = self.settings.max_bytes {
            if file.bytes > max {
                return Err(IngestError::Validation(format!(
                    "{} exceeds the maximum upload size",
                    file.file_name
                )));
            }
        }
        Ok(())
    }

    async fn timed<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.settings.store_timeout, call)
            .await
            .map_err(|_| anyhow!("timed out after {:?}", self.settings.store_timeout))?
    }

    async fn cleanup(&self, written: &[(&str, &str)]) {
        if self.settings.orphan_policy == OrphanPolicy::Retain {
            for (bucket, key) in written {
                warn!(bucket = %bucket, key = %key, "leaving orphaned object");
            }
            return;
        }

        for (bucket, key) in written {
            match self.timed(self.objects.delete(bucket, key)).await {
                Ok(()) => info!(bucket = %bucket, key = %key, "deleted orphaned object"),
                Err(err) => {
                    warn!(bucket = %bucket, key = %key, error = ?err, "failed to delete orphaned object")
                }
            }
        }
    }
}

struct BusyGuard<'a> {
    busy: &'a watch::Sender<bool>,
}

impl<'a> BusyGuard<'a> {
    fn set(busy: &'a watch::Sender<bool>) -> Self {
        busy.send_replace(true);
        Self { busy }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.busy.send_replace(false);
    }
}

/// Fresh random key that keeps the original extension.
pub fn video_key(file: &UploadCandidate) -> String {
    match file.extension() {
        Some(ext) => format!("{}.{}", Uuid::new_v4(), ext),
        None => Uuid::new_v4().to_string(),
    }
}

/// Builds a candidate for a local file, declaring its type from the extension.
pub async fn candidate_from_path(path: &Path) -> Result<UploadCandidate> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|err| anyhow!("cannot read {}: {}", path.display(), err))?;
    if !metadata.is_file() {
        return Err(anyhow!("{} is not a regular file", path.display()));
    }

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("{} has no file name", path.display()))?;
    let content_type = file_extension(&file_name)
        .map(content_type_from_extension)
        .unwrap_or("application/octet-stream");

    Ok(UploadCandidate::new(
        file_name,
        content_type,
        path,
        metadata.len(),
    ))
}
