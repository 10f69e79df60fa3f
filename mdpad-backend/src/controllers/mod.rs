pub mod health;
pub mod offline;
pub mod pads;

#[cfg(test)]
pub(crate) fn test_state(
    dir: &tempfile::TempDir,
) -> (
    actix_web::web::Data<crate::AppState>,
    std::sync::Arc<crate::offline::worker::tests::StubFetcher>,
) {
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::config::{Config, PadKeys};
    use crate::db::KvStore;
    use crate::logging::Logger;
    use crate::offline::{manifest, worker::tests::StubFetcher, CacheStorage, Registration};
    use crate::pads::{PadSession, PadStore};

    let config = Config {
        port: 0,
        database_url: dir.path().join("mdpad.db").display().to_string(),
        offline_cache_db: dir.path().join("offline-cache.db").display().to_string(),
        asset_origin: "http://127.0.0.1:9".to_string(),
        cache_version: manifest::VERSION.to_string(),
        autosave_interval: Duration::from_secs(3600),
        legacy_storage_path: dir.path().join("legacy.json"),
        pad_keys: PadKeys::default(),
        verbose: false,
    };

    let kv = Arc::new(KvStore::new(&config.database_url, Logger::quiet("KV")));
    let store = PadStore::new(kv, config.pad_keys.clone(), Logger::quiet("PADS"));
    let session = PadSession::open(store, Logger::quiet("PADS")).unwrap();

    let fetcher = Arc::new(StubFetcher::default());
    let storage = Arc::new(CacheStorage::open_in_memory().unwrap());
    let offline =
        Registration::new(storage, fetcher.clone(), Logger::quiet("OFFLINE")).unwrap();

    let state = actix_web::web::Data::new(crate::AppState {
        config,
        session: Arc::new(Mutex::new(session)),
        offline: Arc::new(offline),
    });
    (state, fetcher)
}
