//! mirrorsync-server: WebSocket sync server for one watched directory.

use clap::Parser;
use mirrorsync::cli::ServerArgs;
use mirrorsync::engine::watcher::FsWatcher;
use mirrorsync::{SyncConfig, SyncEngine};
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    let args = ServerArgs::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Canonicalize so watcher events and wire paths agree on one form.
    let watch_dir = match tokio::fs::canonicalize(&args.watch_dir).await {
        Ok(dir) => dir,
        Err(e) => {
            tracing::error!("cannot access {}: {}", args.watch_dir.display(), e);
            std::process::exit(1);
        }
    };
    let project_root = match &args.project_root {
        Some(root) => match tokio::fs::canonicalize(root).await {
            Ok(root) => root,
            Err(e) => {
                tracing::error!("cannot access {}: {}", root.display(), e);
                std::process::exit(1);
            }
        },
        None => watch_dir.clone(),
    };

    let mut config = SyncConfig::new(&watch_dir, &project_root);
    config.debounce = Duration::from_millis(args.debounce_ms);
    config.tracked_extensions = args.extensions.clone();

    let engine = SyncEngine::new(config);
    engine.clone().spawn_rebuild_loop();

    let _watcher = match FsWatcher::spawn(&engine) {
        Ok(w) => w,
        Err(e) => {
            tracing::error!("failed to watch {}: {}", watch_dir.display(), e);
            std::process::exit(1);
        }
    };

    // Warm the registry so the first connection's snapshot is cheap.
    engine.schedule_rebuild(true);

    let app = mirrorsync::ws::router(engine).layer(TraceLayer::new_for_http());

    let listener = match tokio::net::TcpListener::bind(&args.bind).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("failed to bind {}: {}", args.bind, e);
            std::process::exit(1);
        }
    };
    tracing::info!(
        "serving sync channel for {} on ws://{}/sync",
        watch_dir.display(),
        args.bind
    );

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("server error: {}", e);
        std::process::exit(1);
    }
}
