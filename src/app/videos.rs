use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use crate::app::store::VideoStore;
use crate::domain::video::{NewVideoAsset, VideoAsset};
use crate::infra::db::Db;

#[derive(Clone)]
pub struct VideoRepository {
    db: Db,
}

impl VideoRepository {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl VideoStore for VideoRepository {
    async fn insert(&self, video: NewVideoAsset) -> Result<VideoAsset> {
        let row = sqlx::query(
            "INSERT INTO videos (title, file_path, thumbnail_url, duration) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, title, file_path, thumbnail_url, duration, created_at",
        )
        .bind(&video.title)
        .bind(&video.file_path)
        .bind(&video.thumbnail_url)
        .bind(&video.duration)
        .fetch_one(self.db.pool())
        .await?;

        Ok(video_from_row(&row))
    }

    async fn select(&self) -> Result<Vec<VideoAsset>> {
        let rows = sqlx::query(
            "SELECT id, title, file_path, thumbnail_url, duration, created_at \
             FROM videos \
             ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.iter().map(video_from_row).collect())
    }

    async fn get(&self, id: Uuid) -> Result<Option<VideoAsset>> {
        let row = sqlx::query(
            "SELECT id, title, file_path, thumbnail_url, duration, created_at \
             FROM videos WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.as_ref().map(video_from_row))
    }

    async fn ping(&self) -> Result<()> {
        self.db.ping().await
    }
}

fn video_from_row(row: &PgRow) -> VideoAsset {
    VideoAsset {
        id: row.get("id"),
        title: row.get("title"),
        file_path: row.get("file_path"),
        thumbnail_url: row.get("thumbnail_url"),
        duration: row.get("duration"),
        created_at: row.get("created_at"),
    }
}
