//! Contract of the remote object store and record table the pipeline talks to.
//!
//! Both sides are fallible and independent: nothing here spans a storage
//! write and a table insert.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use uuid::Uuid;

use crate::domain::video::{NewVideoAsset, VideoAsset};

#[derive(Debug, Clone)]
pub enum ObjectBody {
    Bytes(Bytes),
    /// Local file streamed from disk.
    File(PathBuf),
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, bucket: &str, key: &str, body: ObjectBody, content_type: &str)
        -> Result<()>;

    fn public_url(&self, bucket: &str, key: &str) -> Result<String>;

    async fn delete(&self, bucket: &str, key: &str) -> Result<()>;
}

#[async_trait]
pub trait VideoStore: Send + Sync {
    async fn insert(&self, video: NewVideoAsset) -> Result<VideoAsset>;

    /// All records, newest first.
    async fn select(&self) -> Result<Vec<VideoAsset>>;

    async fn get(&self, id: Uuid) -> Result<Option<VideoAsset>>;

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
