use anyhow::{anyhow, Result};
use std::net::SocketAddr;
use std::str::FromStr;

use crate::app::ingest::OrphanPolicy;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub http_addr: String,
    pub app_mode: String,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_connect_timeout_seconds: u64,
    pub db_idle_timeout_seconds: u64,
    pub db_max_lifetime_seconds: u64,
    pub db_run_migrations: bool,
    pub s3_endpoint: String,
    pub s3_public_endpoint: Option<String>,
    pub s3_region: String,
    pub video_bucket: String,
    pub thumbnail_bucket: String,
    pub ffprobe_path: String,
    pub ffmpeg_path: String,
    pub probe_timeout_seconds: u64,
    pub store_timeout_seconds: u64,
    pub upload_max_bytes: u64,
    pub orphan_policy: OrphanPolicy,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let http_addr = env_or("HTTP_ADDR", "0.0.0.0:8080");
        let _parsed_http_addr = SocketAddr::from_str(&http_addr)
            .map_err(|err| anyhow!("invalid HTTP_ADDR: {}", err))?;
        let app_mode = env_or("APP_MODE", "api");

        Ok(Self {
            http_addr,
            app_mode,
            database_url: env_or_err("DATABASE_URL")?,
            db_max_connections: env_or_parse("DB_MAX_CONNECTIONS", "10")?,
            db_connect_timeout_seconds: env_or_parse("DB_CONNECT_TIMEOUT_SECONDS", "5")?,
            db_idle_timeout_seconds: env_or_parse("DB_IDLE_TIMEOUT_SECONDS", "300")?,
            db_max_lifetime_seconds: env_or_parse("DB_MAX_LIFETIME_SECONDS", "1800")?,
            db_run_migrations: env_or_parse("DB_RUN_MIGRATIONS", "false")?,
            s3_endpoint: env_or_err("S3_ENDPOINT")?,
            s3_public_endpoint: std::env::var("S3_PUBLIC_ENDPOINT").ok(),
            s3_region: env_or("S3_REGION", "us-east-1"),
            video_bucket: env_or("VIDEO_BUCKET", "videos"),
            thumbnail_bucket: env_or("THUMBNAIL_BUCKET", "thumbnails"),
            ffprobe_path: env_or("FFPROBE_PATH", "ffprobe"),
            ffmpeg_path: env_or("FFMPEG_PATH", "ffmpeg"),
            probe_timeout_seconds: env_or_parse("PROBE_TIMEOUT_SECONDS", "30")?,
            store_timeout_seconds: env_or_parse("STORE_TIMEOUT_SECONDS", "120")?,
            upload_max_bytes: env_or_parse("UPLOAD_MAX_BYTES", "2147483648")?,
            orphan_policy: env_or_parse("ORPHAN_POLICY", "retain")?,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or_err(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| anyhow!("missing required env var: {}", key))
}

fn env_or_parse<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    let value = std::env::var(key).unwrap_or_else(|_| default.to_string());
    value
        .parse::<T>()
        .map_err(|err| anyhow!("invalid {}: {}", key, err))
}
