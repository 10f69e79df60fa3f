use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;

mod config;
mod controllers;
mod db;
mod logging;
mod offline;
mod pads;

use config::Config;
use db::KvStore;
use offline::{manifest, CacheStorage, HttpFetcher, Registration};
use pads::{Autosaver, LegacyStorage, PadSession, PadStore};

pub struct AppState {
    pub config: Config,
    /// Pad list plus the editor buffer; every pad operation takes this lock
    pub session: Arc<Mutex<PadSession>>,
    /// Offline cache manager for the asset route
    pub offline: Arc<Registration>,
}

/// Import the pre-database flat storage, if any is left on disk
fn migrate_legacy_storage(store: &PadStore, path: &Path, log: &logging::Logger) {
    match LegacyStorage::load(path) {
        Ok(Some(mut legacy)) => match pads::legacy::migrate(store, &mut legacy, log) {
            Ok(Some(pads)) => log.info(format_args!("Legacy pads imported: {:?}", pads)),
            Ok(None) => log.trace(format_args!("No legacy pad list in {}", path.display())),
            Err(e) => log.error(format_args!("Legacy migration failed: {}", e)),
        },
        Ok(None) => {}
        Err(e) => log.warn(format_args!("Could not read legacy storage: {}", e)),
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env();
    let port = config.port;
    let log = logging::Logger::new("PADS", config.verbose);

    log::info!("mdpad v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Pad database: {}", config.database_url);

    // Pads
    let kv = Arc::new(KvStore::new(&config.database_url, log.with_tag("KV")));
    let store = PadStore::new(kv, config.pad_keys.clone(), log.clone());
    migrate_legacy_storage(&store, &config.legacy_storage_path, &log);

    let session = PadSession::open(store, log.clone())
        .map_err(|e| std::io::Error::other(format!("Failed to open pads: {}", e)))?;
    log::info!(
        "Loaded {} pads, editing \"{}\"",
        session.pads().len(),
        session.active().pad
    );
    let session = Arc::new(Mutex::new(session));

    let autosaver = Autosaver::start(
        Arc::clone(&session),
        config.autosave_interval,
        log.with_tag("AUTOSAVE"),
    );

    // Offline cache
    let storage = CacheStorage::open(Path::new(&config.offline_cache_db))
        .map_err(|e| std::io::Error::other(format!("Failed to open offline cache: {}", e)))?;
    let fetcher = Arc::new(HttpFetcher::new(config.asset_origin.clone()));
    log::info!("Asset origin: {}", fetcher.origin());
    let registration = Arc::new(
        Registration::new(Arc::new(storage), fetcher, log.with_tag("OFFLINE"))
            .map_err(|e| std::io::Error::other(format!("Failed to resume offline cache: {}", e)))?,
    );

    // Install in the background; the previous version keeps serving meanwhile
    {
        let registration = Arc::clone(&registration);
        let version = config.cache_version.clone();
        tokio::spawn(async move {
            match registration.register(&version, manifest::MANIFEST).await {
                Ok(Some(report)) if !report.failed.is_empty() => log::warn!(
                    "[OFFLINE] {} active, {} stale regions could not be purged",
                    version,
                    report.failed.len()
                ),
                Ok(_) => log::info!("[OFFLINE] Cache version {} active", version),
                Err(e) => log::error!("[OFFLINE] Registration of {} failed: {}", version, e),
            }
        });
    }

    log::info!("Starting server on port {}", port);

    let app_session = Arc::clone(&session);
    let app_registration = Arc::clone(&registration);
    let app_config = config.clone();

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(AppState {
                config: app_config.clone(),
                session: Arc::clone(&app_session),
                offline: Arc::clone(&app_registration),
            }))
            .wrap(Logger::default())
            .configure(controllers::health::config_routes)
            .configure(controllers::pads::config)
            .configure(controllers::offline::config)
            // Everything else is an editor asset
            .default_service(web::to(controllers::offline::serve_asset))
    })
    .disable_signals()
    .bind(("0.0.0.0", port))?
    .run();

    let server_handle = server.handle();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        log::info!("Received Ctrl+C, shutting down...");

        log::info!("Stopping HTTP server...");
        let server_stop = server_handle.stop(true);
        if tokio::time::timeout(std::time::Duration::from_secs(5), server_stop)
            .await
            .is_err()
        {
            log::warn!("Timeout waiting for HTTP server to stop, forcing exit...");
        }
    });

    server.await?;

    log::info!("Saving pads...");
    autosaver.stop().await;
    registration.settle().await;

    log::info!("Shutdown complete");
    Ok(())
}
