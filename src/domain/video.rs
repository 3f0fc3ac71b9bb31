use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use time::OffsetDateTime;
use uuid::Uuid;

pub const THUMBNAIL_CONTENT_TYPE: &str = "image/jpeg";
pub const UNKNOWN_DURATION: &str = "0:00";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoAsset {
    pub id: Uuid,
    pub title: String,
    /// Storage key of the video object, unique across the catalog.
    pub file_path: String,
    pub thumbnail_url: Option<String>,
    pub duration: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVideoAsset {
    pub title: String,
    pub file_path: String,
    pub thumbnail_url: Option<String>,
    pub duration: Option<String>,
}

/// A file handed to the ingestion pipeline. Spooled uploads keep their
/// temporary file alive until the candidate is dropped.
#[derive(Debug)]
pub struct UploadCandidate {
    pub file_name: String,
    pub content_type: String,
    pub path: PathBuf,
    pub bytes: u64,
    spool: Option<TempPath>,
}

impl UploadCandidate {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        path: impl Into<PathBuf>,
        bytes: u64,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            path: path.into(),
            bytes,
            spool: None,
        }
    }

    pub fn spooled(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        spool: TempPath,
        bytes: u64,
    ) -> Self {
        let path = spool.to_path_buf();
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            path,
            bytes,
            spool: Some(spool),
        }
    }

    pub fn is_video(&self) -> bool {
        self.content_type.starts_with("video/")
    }

    /// Extension of the original file name, without the dot.
    pub fn extension(&self) -> Option<&str> {
        file_extension(&self.file_name)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_spooled(&self) -> bool {
        self.spool.is_some()
    }
}

/// Derived frame written to storage before the catalog entry references it.
#[derive(Debug, Clone)]
pub struct ThumbnailAsset {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
}

/// Formats a duration in seconds as `M:SS`, truncating fractional seconds.
pub fn format_duration(total_seconds: f64) -> String {
    let total = if total_seconds.is_finite() && total_seconds > 0.0 {
        total_seconds.floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}

pub fn file_extension(file_name: &str) -> Option<&str> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext)
}

pub fn content_type_from_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "mp4" => "video/mp4",
        "m4v" => "video/x-m4v",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "ogv" => "video/ogg",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        _ => "application/octet-stream",
    }
}
