pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod infra;

use std::sync::Arc;

use crate::app::catalog::CatalogService;
use crate::app::ingest::IngestService;

#[derive(Clone)]
pub struct AppState {
    pub catalog: CatalogService,
    pub ingest: Arc<IngestService>,
}
