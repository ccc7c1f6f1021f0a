use std::{net::SocketAddr, sync::Arc};

use anyhow::Context as _;
use log::info;
use recipe_api::{
    config::Config,
    media::MediaStorage,
    postgres::{self, PgStore},
    routes::{self, Context},
    store::SharedStore,
};
use tokio::signal::ctrl_c;
use tracing_subscriber::{fmt, EnvFilter};
use warp::{filters::BoxedFilter, fs::File, Filter};

/// Serves uploads back when `MEDIA_URL` is a local single-segment path like `/media/`.
fn media_files(media: &MediaStorage) -> BoxedFilter<(File,)> {
    let segment = media.base_url().trim_matches('/').to_string();
    if segment.is_empty() || segment.contains(['/', ':']) {
        info!("Media files under {} are not served by this process", media.base_url());
        return warp::any()
            .and_then(|| async { Err::<File, _>(warp::reject::not_found()) })
            .boxed();
    }

    warp::get()
        .and(warp::path(segment))
        .and(warp::fs::dir(media.root().to_path_buf()))
        .boxed()
}

async fn shutdown_signal() {
    if let Err(e) = ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {e}");
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = Config::load().context("loading configuration")?;

    info!("Connecting to database...");
    let pool = postgres::connect(&config.database_url, config.db_max_connections)
        .await
        .context("connecting to database")?;

    if config.run_migrations {
        info!("Running migrations...");
        postgres::migrate(&pool).await.context("running migrations")?;
    }

    let store: SharedStore = Arc::new(PgStore::new(pool));
    let media = MediaStorage::new(&config.media_root, &config.media_url);
    let api = routes::api(Context::new(store, media.clone(), config.max_upload_bytes));

    let app = media_files(&media).or(api);

    let address = SocketAddr::new(config.bind_addr, config.port);
    let (bound, server) = warp::serve(app).try_bind_with_graceful_shutdown(address, shutdown_signal())?;
    info!("Server running on {bound}");

    server.await;
    info!("Server shut down");
    Ok(())
}
