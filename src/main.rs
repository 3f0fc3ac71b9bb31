use anyhow::anyhow;
use axum::Router;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reelbox::app::catalog::CatalogService;
use reelbox::app::ingest::{candidate_from_path, IngestService, IngestSettings};
use reelbox::app::notify::TracingNotifier;
use reelbox::app::probe::{FfmpegDecoder, MediaProber};
use reelbox::app::videos::VideoRepository;
use reelbox::config::AppConfig;
use reelbox::http;
use reelbox::infra::{db::Db, storage::ObjectStorage};
use reelbox::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let db = Db::connect(&config).await?;
    if config.db_run_migrations {
        db.migrate().await?;
        tracing::info!("database migrations applied");
    }
    let storage = Arc::new(ObjectStorage::new(&config).await?);
    let videos = Arc::new(VideoRepository::new(db));

    let decoder = Arc::new(FfmpegDecoder::new(
        config.ffprobe_path.clone(),
        config.ffmpeg_path.clone(),
    ));
    let prober = MediaProber::new(decoder, Duration::from_secs(config.probe_timeout_seconds));
    let settings = IngestSettings {
        video_bucket: config.video_bucket.clone(),
        thumbnail_bucket: config.thumbnail_bucket.clone(),
        store_timeout: Duration::from_secs(config.store_timeout_seconds),
        max_bytes: Some(config.upload_max_bytes),
        orphan_policy: config.orphan_policy,
    };

    let state = AppState {
        catalog: CatalogService::new(
            videos.clone(),
            storage.clone(),
            config.video_bucket.clone(),
            Duration::from_secs(config.store_timeout_seconds),
        ),
        ingest: Arc::new(IngestService::new(
            storage,
            videos,
            prober,
            Arc::new(TracingNotifier),
            settings,
        )),
    };

    match config.app_mode.as_str() {
        "api" => {
            let app: Router = http::router(state).layer(TraceLayer::new_for_http());
            let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
            tracing::info!("listening on {}", config.http_addr);

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        "ingest" => {
            let paths: Vec<PathBuf> = std::env::args_os().skip(1).map(PathBuf::from).collect();
            if paths.is_empty() {
                return Err(anyhow!("ingest mode needs at least one file path"));
            }

            let mut files = Vec::with_capacity(paths.len());
            for path in &paths {
                match candidate_from_path(path).await {
                    Ok(candidate) => files.push(candidate),
                    Err(err) => tracing::error!(error = %err, "skipping unreadable file"),
                }
            }

            let report = state.ingest.ingest(files).await;
            let failed = report.failed() + (paths.len() - report.outcomes.len());
            println!("{}", serde_json::to_string_pretty(&report)?);
            if failed > 0 {
                return Err(anyhow!("{} of {} files failed", failed, paths.len()));
            }
        }
        other => return Err(anyhow!("unknown APP_MODE: {}", other)),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
