//! Local, network-free extraction of duration and thumbnail from a video file.
//!
//! Decoding goes through [`MediaDecoder`]; the shipped backend shells out to
//! `ffprobe`/`ffmpeg`. Metadata that never loads degrades to an unknown
//! duration; a frame that never decodes fails the file instead of hanging.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::domain::video::{format_duration, ThumbnailAsset, UploadCandidate, UNKNOWN_DURATION};

/// Preferred thumbnail position, clamped to the file's duration.
pub const THUMBNAIL_OFFSET_SECS: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeInfo {
    /// `None` when the container does not report a usable duration.
    pub duration_secs: Option<f64>,
    pub width: u32,
    pub height: u32,
}

#[async_trait]
pub trait MediaDecoder: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<ProbeInfo>;

    /// Decodes the frame shown at `offset_secs`, at the source's native size.
    async fn frame_at(&self, path: &Path, offset_secs: f64) -> Result<DynamicImage>;
}

#[derive(Debug, Clone)]
pub struct ProbedMetadata {
    pub duration: String,
    pub thumbnail: ThumbnailAsset,
}

/// Metadata read and frame decode are bounded separately by `timeout`.
#[derive(Clone)]
pub struct MediaProber {
    decoder: Arc<dyn MediaDecoder>,
    timeout: Duration,
}

impl MediaProber {
    pub fn new(decoder: Arc<dyn MediaDecoder>, timeout: Duration) -> Self {
        Self { decoder, timeout }
    }

    /// Duration as `M:SS`. Unknown or timed-out metadata yields `"0:00"`;
    /// a file the decoder cannot open is an error.
    pub async fn probe_duration(&self, file: &UploadCandidate) -> Result<String> {
        let duration_secs = self.read_metadata(file).await?;
        Ok(display_duration(duration_secs))
    }

    pub async fn capture_thumbnail(&self, file: &UploadCandidate) -> Result<ThumbnailAsset> {
        let duration_secs = self.read_metadata(file).await?;
        self.capture(file, duration_secs).await
    }

    /// Reads the metadata once and derives both duration and thumbnail from it.
    pub async fn probe(&self, file: &UploadCandidate) -> Result<ProbedMetadata> {
        let duration_secs = self.read_metadata(file).await?;
        let thumbnail = self.capture(file, duration_secs).await?;
        Ok(ProbedMetadata {
            duration: display_duration(duration_secs),
            thumbnail,
        })
    }

    async fn read_metadata(&self, file: &UploadCandidate) -> Result<Option<f64>> {
        match tokio::time::timeout(self.timeout, self.decoder.probe(file.path())).await {
            Ok(info) => {
                let info = info.with_context(|| format!("failed to probe {}", file.file_name))?;
                if info.duration_secs.is_none() {
                    debug!(file = %file.file_name, "container reports no duration");
                }
                Ok(info.duration_secs)
            }
            Err(_) => {
                warn!(file = %file.file_name, timeout = ?self.timeout, "metadata probe timed out");
                Ok(None)
            }
        }
    }

    async fn capture(
        &self,
        file: &UploadCandidate,
        duration_secs: Option<f64>,
    ) -> Result<ThumbnailAsset> {
        tokio::time::timeout(self.timeout, self.decode_frame(file, duration_secs))
            .await
            .map_err(|_| anyhow!("thumbnail capture timed out after {:?}", self.timeout))?
    }

    async fn decode_frame(
        &self,
        file: &UploadCandidate,
        duration_secs: Option<f64>,
    ) -> Result<ThumbnailAsset> {
        let offset = thumbnail_offset(duration_secs);
        let frame = self
            .decoder
            .frame_at(file.path(), offset)
            .await
            .with_context(|| format!("failed to decode frame of {}", file.file_name))?;

        debug!(
            file = %file.file_name,
            offset,
            width = frame.width(),
            height = frame.height(),
            "decoded thumbnail frame"
        );

        tokio::task::spawn_blocking(move || encode_jpeg(&frame)).await?
    }
}

fn display_duration(duration_secs: Option<f64>) -> String {
    duration_secs
        .map(format_duration)
        .unwrap_or_else(|| UNKNOWN_DURATION.to_string())
}

/// Seek position for the thumbnail; 0 when the duration is unknown.
pub fn thumbnail_offset(duration_secs: Option<f64>) -> f64 {
    match duration_secs {
        Some(secs) if secs.is_finite() && secs > 0.0 => THUMBNAIL_OFFSET_SECS.min(secs),
        _ => 0.0,
    }
}

pub fn encode_jpeg(frame: &DynamicImage) -> Result<ThumbnailAsset> {
    let rgb = frame.to_rgb8();
    let mut data = Vec::new();
    let mut encoder = JpegEncoder::new(&mut data);
    encoder
        .encode_image(&rgb)
        .map_err(|err| anyhow!("failed to encode thumbnail: {}", err))?;

    Ok(ThumbnailAsset {
        data: Bytes::from(data),
        width: rgb.width(),
        height: rgb.height(),
    })
}

pub struct FfmpegDecoder {
    ffprobe_path: String,
    ffmpeg_path: String,
}

impl FfmpegDecoder {
    pub fn new(ffprobe_path: impl Into<String>, ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffprobe_path: ffprobe_path.into(),
            ffmpeg_path: ffmpeg_path.into(),
        }
    }

    async fn grab_frame(&self, path: &Path, offset_secs: f64) -> Result<Vec<u8>> {
        let offset = format!("{:.3}", offset_secs);
        let output = Command::new(&self.ffmpeg_path)
            .args(["-v", "error", "-ss"])
            .arg(&offset)
            .arg("-i")
            .arg(path)
            .args(["-frames:v", "1", "-f", "image2pipe", "-vcodec", "png", "pipe:1"])
            .kill_on_drop(true)
            .output()
            .await
            .context("failed to execute ffmpeg")?;

        if !output.status.success() {
            return Err(anyhow!(
                "ffmpeg failed: {}",
                String::from_utf8_lossy(&output.stderr)
            ));
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl MediaDecoder for FfmpegDecoder {
    async fn probe(&self, path: &Path) -> Result<ProbeInfo> {
        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
                "-select_streams",
                "v:0",
            ])
            .arg(path)
            .kill_on_drop(true)
            .output()
            .await
            .context("failed to execute ffprobe")?;

        if !output.status.success() {
            return Err(anyhow!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr)
            ));
        }

        parse_ffprobe_output(&output.stdout)
    }

    async fn frame_at(&self, path: &Path, offset_secs: f64) -> Result<DynamicImage> {
        let mut data = self.grab_frame(path, offset_secs).await?;
        // Seeking to the clamped offset can land past the last decodable frame.
        if data.is_empty() && offset_secs > 0.0 {
            debug!(path = %path.display(), offset_secs, "no frame at offset, retrying at start");
            data = self.grab_frame(path, 0.0).await?;
        }
        if data.is_empty() {
            return Err(anyhow!("no decodable video frame"));
        }

        image::load_from_memory_with_format(&data, ImageFormat::Png)
            .map_err(|err| anyhow!("failed to decode frame: {}", err))
    }
}

pub fn parse_ffprobe_output(stdout: &[u8]) -> Result<ProbeInfo> {
    let probe: serde_json::Value =
        serde_json::from_slice(stdout).context("failed to parse ffprobe output")?;

    let stream = probe["streams"]
        .get(0)
        .ok_or_else(|| anyhow!("no video stream found"))?;

    // Streamed containers often report "N/A" at the format level.
    let duration_secs = parse_seconds(&probe["format"]["duration"])
        .or_else(|| parse_seconds(&stream["duration"]));

    let width = stream["width"]
        .as_u64()
        .ok_or_else(|| anyhow!("could not parse width"))? as u32;
    let height = stream["height"]
        .as_u64()
        .ok_or_else(|| anyhow!("could not parse height"))? as u32;

    Ok(ProbeInfo {
        duration_secs,
        width,
        height,
    })
}

fn parse_seconds(value: &serde_json::Value) -> Option<f64> {
    let secs = match value {
        serde_json::Value::String(text) => text.trim().parse::<f64>().ok()?,
        serde_json::Value::Number(number) => number.as_f64()?,
        _ => return None,
    };
    (secs.is_finite() && secs >= 0.0).then_some(secs)
}
