#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use http_body_util::BodyExt;
use image::{DynamicImage, RgbImage};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::watch;
use tower::ServiceExt;
use uuid::Uuid;

use reelbox::app::catalog::CatalogService;
use reelbox::app::ingest::{IngestService, IngestSettings, OrphanPolicy};
use reelbox::app::notify::{Notification, Notifier};
use reelbox::app::probe::{MediaDecoder, MediaProber, ProbeInfo};
use reelbox::app::store::{ObjectBody, ObjectStore, VideoStore};
use reelbox::domain::video::{NewVideoAsset, UploadCandidate, VideoAsset};
use reelbox::AppState;

pub const VIDEO_BUCKET: &str = "videos";
pub const THUMBNAIL_BUCKET: &str = "thumbnails";
pub const PUBLIC_BASE: &str = "https://storage.test";

// ---------------------------------------------------------------------------
// Journal: ordered log of every remote call, shared by the fakes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Put { bucket: String, key: String },
    Delete { bucket: String, key: String },
    Insert { title: String },
    Select,
    Get,
}

#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<Call>>>);

impl Journal {
    fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub fn puts_to(&self, bucket: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Put { bucket: b, key } if b == bucket => Some(key),
                _ => None,
            })
            .collect()
    }

    pub fn deletes(&self) -> Vec<(String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Delete { bucket, key } => Some((bucket, key)),
                _ => None,
            })
            .collect()
    }

    pub fn inserts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Insert { title } => Some(title),
                _ => None,
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Object store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bucket: String,
    pub key: String,
    pub content_type: String,
    pub data: Bytes,
}

pub struct FakeObjectStore {
    journal: Journal,
    objects: Mutex<Vec<StoredObject>>,
    failing_buckets: Mutex<HashSet<String>>,
}

impl FakeObjectStore {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            objects: Mutex::new(Vec::new()),
            failing_buckets: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_bucket(&self, bucket: &str) {
        self.failing_buckets.lock().unwrap().insert(bucket.to_string());
    }

    pub fn heal_bucket(&self, bucket: &str) {
        self.failing_buckets.lock().unwrap().remove(bucket);
    }

    pub fn objects(&self) -> Vec<StoredObject> {
        self.objects.lock().unwrap().clone()
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects()
            .into_iter()
            .find(|o| o.bucket == bucket && o.key == key)
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: ObjectBody,
        content_type: &str,
    ) -> Result<()> {
        self.journal.push(Call::Put {
            bucket: bucket.to_string(),
            key: key.to_string(),
        });
        if self.failing_buckets.lock().unwrap().contains(bucket) {
            return Err(anyhow!("bucket {} rejected the write", bucket));
        }

        let data = match body {
            ObjectBody::Bytes(bytes) => bytes,
            // Spooled files are read back; paths that do not exist stand in
            // for files the decoder fakes.
            ObjectBody::File(path) => Bytes::from(std::fs::read(&path).unwrap_or_default()),
        };
        self.objects.lock().unwrap().push(StoredObject {
            bucket: bucket.to_string(),
            key: key.to_string(),
            content_type: content_type.to_string(),
            data,
        });
        Ok(())
    }

    fn public_url(&self, bucket: &str, key: &str) -> Result<String> {
        Ok(format!("{}/{}/{}", PUBLIC_BASE, bucket, key))
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.journal.push(Call::Delete {
            bucket: bucket.to_string(),
            key: key.to_string(),
        });
        self.objects
            .lock()
            .unwrap()
            .retain(|o| !(o.bucket == bucket && o.key == key));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Record store
// ---------------------------------------------------------------------------

pub struct FakeVideoStore {
    journal: Journal,
    rows: Mutex<Vec<VideoAsset>>,
    fail_inserts: Mutex<bool>,
    read_delay: Mutex<Duration>,
    base_time: OffsetDateTime,
}

impl FakeVideoStore {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            rows: Mutex::new(Vec::new()),
            fail_inserts: Mutex::new(false),
            read_delay: Mutex::new(Duration::ZERO),
            base_time: OffsetDateTime::now_utc(),
        }
    }

    pub fn fail_inserts(&self, fail: bool) {
        *self.fail_inserts.lock().unwrap() = fail;
    }

    /// Delays `select` and `get`, standing in for an unresponsive table.
    pub fn set_read_delay(&self, delay: Duration) {
        *self.read_delay.lock().unwrap() = delay;
    }

    async fn read_pause(&self) {
        let delay = *self.read_delay.lock().unwrap();
        tokio::time::sleep(delay).await;
    }

    pub fn rows(&self) -> Vec<VideoAsset> {
        self.rows.lock().unwrap().clone()
    }

    /// Seeds a record created `age_secs` before the store was built.
    pub fn seed(&self, title: &str, duration: Option<&str>, age_secs: i64) -> VideoAsset {
        let video = VideoAsset {
            id: Uuid::new_v4(),
            title: title.to_string(),
            file_path: format!("{}.mp4", Uuid::new_v4()),
            thumbnail_url: Some(format!("{}/{}/{}.jpg", PUBLIC_BASE, THUMBNAIL_BUCKET, Uuid::new_v4())),
            duration: duration.map(str::to_string),
            created_at: self.base_time - time::Duration::seconds(age_secs),
        };
        self.rows.lock().unwrap().push(video.clone());
        video
    }
}

#[async_trait]
impl VideoStore for FakeVideoStore {
    async fn insert(&self, video: NewVideoAsset) -> Result<VideoAsset> {
        self.journal.push(Call::Insert {
            title: video.title.clone(),
        });
        if *self.fail_inserts.lock().unwrap() {
            return Err(anyhow!("insert rejected"));
        }

        let mut rows = self.rows.lock().unwrap();
        let created = VideoAsset {
            id: Uuid::new_v4(),
            title: video.title,
            file_path: video.file_path,
            thumbnail_url: video.thumbnail_url,
            duration: video.duration,
            created_at: self.base_time + time::Duration::seconds(rows.len() as i64 + 1),
        };
        rows.push(created.clone());
        Ok(created)
    }

    async fn select(&self) -> Result<Vec<VideoAsset>> {
        self.journal.push(Call::Select);
        self.read_pause().await;
        let mut rows = self.rows();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn get(&self, id: Uuid) -> Result<Option<VideoAsset>> {
        self.journal.push(Call::Get);
        self.read_pause().await;
        Ok(self.rows().into_iter().find(|v| v.id == id))
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

pub struct FakeDecoder {
    info: Mutex<ProbeInfo>,
    broken: Mutex<HashSet<PathBuf>>,
    probe_delay: Mutex<Duration>,
    frame_delay: Mutex<Duration>,
    busy: Mutex<Option<watch::Receiver<bool>>>,
    busy_seen: Mutex<Vec<bool>>,
    offsets: Mutex<Vec<f64>>,
}

impl FakeDecoder {
    pub fn new(duration_secs: f64, width: u32, height: u32) -> Self {
        Self {
            info: Mutex::new(ProbeInfo {
                duration_secs: Some(duration_secs),
                width,
                height,
            }),
            broken: Mutex::new(HashSet::new()),
            probe_delay: Mutex::new(Duration::ZERO),
            frame_delay: Mutex::new(Duration::ZERO),
            busy: Mutex::new(None),
            busy_seen: Mutex::new(Vec::new()),
            offsets: Mutex::new(Vec::new()),
        }
    }

    pub fn set_duration(&self, duration_secs: f64) {
        self.info.lock().unwrap().duration_secs = Some(duration_secs);
    }

    /// Containers that report no duration at all.
    pub fn clear_duration(&self) {
        self.info.lock().unwrap().duration_secs = None;
    }

    pub fn break_file(&self, path: impl Into<PathBuf>) {
        self.broken.lock().unwrap().insert(path.into());
    }

    /// Delays both the metadata read and the frame decode.
    pub fn set_delay(&self, delay: Duration) {
        self.set_probe_delay(delay);
        *self.frame_delay.lock().unwrap() = delay;
    }

    /// Delays only the metadata read.
    pub fn set_probe_delay(&self, delay: Duration) {
        *self.probe_delay.lock().unwrap() = delay;
    }

    pub fn watch_busy(&self, busy: watch::Receiver<bool>) {
        *self.busy.lock().unwrap() = Some(busy);
    }

    pub fn busy_seen(&self) -> Vec<bool> {
        self.busy_seen.lock().unwrap().clone()
    }

    pub fn offsets(&self) -> Vec<f64> {
        self.offsets.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaDecoder for FakeDecoder {
    async fn probe(&self, path: &Path) -> Result<ProbeInfo> {
        let busy = self.busy.lock().unwrap().as_ref().map(|rx| *rx.borrow());
        if let Some(busy) = busy {
            self.busy_seen.lock().unwrap().push(busy);
        }

        let delay = *self.probe_delay.lock().unwrap();
        tokio::time::sleep(delay).await;

        if self.broken.lock().unwrap().contains(path) {
            return Err(anyhow!("moov atom not found"));
        }
        Ok(*self.info.lock().unwrap())
    }

    async fn frame_at(&self, path: &Path, offset_secs: f64) -> Result<DynamicImage> {
        let delay = *self.frame_delay.lock().unwrap();
        tokio::time::sleep(delay).await;

        if self.broken.lock().unwrap().contains(path) {
            return Err(anyhow!("invalid data found when processing input"));
        }
        self.offsets.lock().unwrap().push(offset_secs);
        let info = *self.info.lock().unwrap();
        Ok(DynamicImage::ImageRgb8(RgbImage::new(info.width, info.height)))
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn seen(&self) -> Vec<Notification> {
        self.seen.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: &Notification) {
        self.seen.lock().unwrap().push(notification.clone());
    }
}

// ---------------------------------------------------------------------------
// TestBed: one fully wired service per test
// ---------------------------------------------------------------------------

pub struct TestBed {
    pub journal: Journal,
    pub objects: Arc<FakeObjectStore>,
    pub videos: Arc<FakeVideoStore>,
    pub decoder: Arc<FakeDecoder>,
    pub notifier: Arc<RecordingNotifier>,
    pub ingest: Arc<IngestService>,
    pub state: AppState,
    router: Router,
}

pub struct TestResponse {
    pub status: StatusCode,
    body_bytes: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body_bytes).unwrap_or(Value::Null)
    }

    pub fn error_message(&self) -> String {
        self.json()["error"].as_str().unwrap_or("").to_string()
    }
}

impl TestBed {
    pub fn new() -> Self {
        Self::with_settings(settings(OrphanPolicy::Retain))
    }

    pub fn with_policy(policy: OrphanPolicy) -> Self {
        Self::with_settings(settings(policy))
    }

    pub fn with_settings(settings: IngestSettings) -> Self {
        Self::build(settings, Duration::from_secs(5))
    }

    pub fn with_probe_timeout(timeout: Duration) -> Self {
        Self::build(settings(OrphanPolicy::Retain), timeout)
    }

    fn build(settings: IngestSettings, probe_timeout: Duration) -> Self {
        let journal = Journal::default();
        let objects = Arc::new(FakeObjectStore::new(journal.clone()));
        let videos = Arc::new(FakeVideoStore::new(journal.clone()));
        let decoder = Arc::new(FakeDecoder::new(10.0, 1280, 720));
        let notifier = Arc::new(RecordingNotifier::default());

        let prober = MediaProber::new(decoder.clone(), probe_timeout);
        let store_timeout = settings.store_timeout;
        let ingest = Arc::new(IngestService::new(
            objects.clone(),
            videos.clone(),
            prober,
            notifier.clone(),
            settings,
        ));
        decoder.watch_busy(ingest.subscribe_busy());

        let state = AppState {
            catalog: CatalogService::new(
                videos.clone(),
                objects.clone(),
                VIDEO_BUCKET,
                store_timeout,
            ),
            ingest: ingest.clone(),
        };
        let router = reelbox::http::router(state.clone());

        Self {
            journal,
            objects,
            videos,
            decoder,
            notifier,
            ingest,
            state,
            router,
        }
    }

    // ------------------------------------------------------------------
    // HTTP helpers
    // ------------------------------------------------------------------

    pub async fn request(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("oneshot failed");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("failed to collect body")
            .to_bytes();

        TestResponse { status, body_bytes }
    }

    pub async fn get(&self, path: &str) -> TestResponse {
        let request = Request::builder()
            .method(Method::GET)
            .uri(path)
            .header("host", "localhost")
            .body(Body::empty())
            .unwrap();
        self.request(request).await
    }

    /// Posts `files` as `(field name, file name, content type, bytes)` parts.
    pub async fn post_multipart(
        &self,
        path: &str,
        files: &[(&str, &str, &str, &[u8])],
    ) -> TestResponse {
        const BOUNDARY: &str = "reelbox-test-boundary";
        let mut body = Vec::new();
        for (field, file_name, content_type, data) in files {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                    field, file_name
                )
                .as_bytes(),
            );
            body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header("host", "localhost")
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap();
        self.request(request).await
    }
}

pub fn settings(policy: OrphanPolicy) -> IngestSettings {
    IngestSettings {
        video_bucket: VIDEO_BUCKET.to_string(),
        thumbnail_bucket: THUMBNAIL_BUCKET.to_string(),
        store_timeout: Duration::from_secs(5),
        max_bytes: Some(50 * 1024 * 1024),
        orphan_policy: policy,
    }
}

/// Candidate for a file the fake decoder understands; nothing is read from disk.
pub fn video_file(name: &str) -> UploadCandidate {
    UploadCandidate::new(name, "video/mp4", format!("/fake/{}", name), 4096)
}

pub fn file_of_type(name: &str, content_type: &str) -> UploadCandidate {
    UploadCandidate::new(name, content_type, format!("/fake/{}", name), 4096)
}

pub fn fake_path(name: &str) -> PathBuf {
    PathBuf::from(format!("/fake/{}", name))
}
